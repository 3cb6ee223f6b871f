//! Module status and dashboard summaries.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::light::Light;
use crate::protocol::ModuleInfo;
use crate::stats::{Counters, format_uptime};

/// Connection state of the link to the lighting module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Reachability {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl Reachability {
    pub fn is_connected(&self) -> bool {
        matches!(self, Reachability::Connected)
    }
}

/// What the reconciler knows about the lighting hardware unit.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Module {
    pub module_id: Option<String>,
    pub address: Option<String>,
    pub firmware_version: Option<String>,
    pub mac: Option<String>,
    pub signal_strength: Option<i32>,
    pub reachability: Reachability,
}

impl Module {
    pub(crate) fn with_address(address: Option<String>) -> Self {
        Module {
            address,
            ..Self::default()
        }
    }

    pub(crate) fn apply_info(&mut self, info: &ModuleInfo) {
        self.module_id = Some(info.module_id.clone());
        if let Some(fw) = &info.fw_version {
            self.firmware_version = Some(fw.clone());
        }
        if let Some(mac) = &info.mac {
            self.mac = Some(mac.clone());
        }
        if info.rssi.is_some() {
            self.signal_strength = info.rssi;
        }
    }
}

/// Status block served to the dashboard.
///
/// Field names follow the dashboard's `module_status` object.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleStatus {
    pub module_id: Option<String>,
    pub firmware_version: Option<String>,
    pub ip_address: Option<String>,
    pub signal_strength: Option<i32>,
    pub total_commands: u64,
    pub successful_commands: u64,
    pub failed_commands: u64,
    pub superseded_commands: u64,
    pub uptime: Option<String>,
    pub reachability: Reachability,
    /// The light table may lag behind the hardware.
    pub stale: bool,
}

impl ModuleStatus {
    pub(crate) fn new(
        module: &Module,
        counters: &Counters,
        uptime: Option<std::time::Duration>,
        stale: bool,
    ) -> Self {
        ModuleStatus {
            module_id: module.module_id.clone(),
            firmware_version: module.firmware_version.clone(),
            ip_address: module.address.clone(),
            signal_strength: module.signal_strength,
            total_commands: counters.commands_sent,
            successful_commands: counters.commands_succeeded,
            failed_commands: counters.commands_failed,
            superseded_commands: counters.commands_superseded,
            uptime: uptime.map(format_uptime),
            reachability: module.reachability,
            stale,
        }
    }

    /// Share of sent commands that succeeded, in percent.
    pub fn success_rate(&self) -> Option<f64> {
        (self.total_commands > 0)
            .then(|| self.successful_commands as f64 * 100.0 / self.total_commands as f64)
    }
}

/// Aggregate numbers for the dashboard header cards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightingSummary {
    pub total_lights: usize,
    pub active_lights: usize,
    /// Rounded mean brightness of the lights that are on; 0 when none are.
    pub average_brightness: u8,
    pub power_watts: u32,
}

impl LightingSummary {
    /// # Examples
    ///
    /// ```
    /// use cuehall_lights::LightingSummary;
    ///
    /// let summary = LightingSummary::from_lights(std::iter::empty(), 12);
    /// assert_eq!(summary.total_lights, 0);
    /// assert_eq!(summary.average_brightness, 0);
    /// ```
    pub fn from_lights<'a>(lights: impl IntoIterator<Item = &'a Light>, watts_per_light: u32) -> Self {
        let mut total = 0usize;
        let mut active = 0usize;
        let mut brightness_sum = 0u32;
        for light in lights {
            total += 1;
            if light.is_on() {
                active += 1;
                brightness_sum += u32::from(light.brightness().value());
            }
        }

        let average = if active == 0 {
            0
        } else {
            let active = u32::try_from(active).unwrap_or(u32::MAX);
            u8::try_from((brightness_sum + active / 2) / active).unwrap_or(100)
        };

        LightingSummary {
            total_lights: total,
            active_lights: active,
            average_brightness: average,
            power_watts: u32::try_from(active)
                .unwrap_or(u32::MAX)
                .saturating_mul(watts_per_light),
        }
    }
}
