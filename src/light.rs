//! Light records held by the reconciler.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::protocol::DeviceLight;
use crate::types::{Brightness, LightId, LightState, PowerState, Zone};

/// Last known state of one light.
///
/// Records are created from the first poll that reports the light and are
/// only ever updated in place afterwards. A light that drops out of a poll is
/// kept with `reachable` cleared.
#[derive(Debug, Clone)]
pub struct Light {
    id: LightId,
    name: String,
    zone: Zone,
    state: LightState,
    confirmed_at: Instant,
    pending: bool,
    reachable: bool,
}

impl Light {
    pub(crate) fn from_device(device: &DeviceLight, confirmed_at: Instant) -> Self {
        Light {
            id: device.id,
            name: device.name.clone(),
            zone: device.zone,
            state: device.light_state(),
            confirmed_at,
            pending: false,
            reachable: true,
        }
    }

    pub fn id(&self) -> LightId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn zone(&self) -> Zone {
        self.zone
    }

    pub fn state(&self) -> LightState {
        self.state
    }

    pub fn is_on(&self) -> bool {
        self.state.is_on()
    }

    /// Brightness as last confirmed. Kept while the light is off.
    pub fn brightness(&self) -> Brightness {
        self.state.brightness
    }

    /// When the module last confirmed this state.
    pub fn confirmed_at(&self) -> Instant {
        self.confirmed_at
    }

    /// Whether a command for this light is in flight.
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Whether the last poll still listed this light.
    pub fn is_reachable(&self) -> bool {
        self.reachable
    }

    /// Take a poll reading. Name and zone may change on the module side.
    pub(crate) fn update_from_poll(&mut self, device: &DeviceLight, taken_at: Instant) {
        self.name.clone_from(&device.name);
        self.zone = device.zone;
        self.state = device.light_state();
        self.confirmed_at = taken_at;
        self.reachable = true;
    }

    pub(crate) fn update_from_ack(&mut self, state: LightState, acked_at: Instant) {
        self.state = state;
        self.confirmed_at = acked_at;
    }

    /// Refresh the parts of a poll that are not state (name, zone, presence).
    pub(crate) fn touch_from_poll(&mut self, device: &DeviceLight) {
        self.name.clone_from(&device.name);
        self.zone = device.zone;
        self.reachable = true;
    }

    pub(crate) fn set_pending(&mut self, pending: bool) {
        self.pending = pending;
    }

    pub(crate) fn mark_unreachable(&mut self) {
        self.reachable = false;
    }

    pub fn view(&self) -> LightView {
        LightView {
            id: self.id,
            name: self.name.clone(),
            zone: self.zone,
            status: self.state.power,
            brightness: self.state.brightness.value(),
            pending: self.pending,
            reachable: self.reachable,
        }
    }
}

/// What the dashboard receives for each light.
///
/// # Examples
///
/// ```
/// use cuehall_lights::{LightId, LightView, PowerState, Zone};
///
/// let view = LightView {
///     id: LightId(4),
///     name: "Table 4".into(),
///     zone: Zone::Table,
///     status: PowerState::Off,
///     brightness: 60,
///     pending: false,
///     reachable: true,
/// };
/// let json = serde_json::to_value(&view).unwrap();
/// assert_eq!(json["status"], "off");
/// assert_eq!(json["brightness"], 60);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightView {
    pub id: LightId,
    pub name: String,
    pub zone: Zone,
    pub status: PowerState,
    pub brightness: u8,
    pub pending: bool,
    pub reachable: bool,
}
