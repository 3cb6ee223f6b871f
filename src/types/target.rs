//! Requested and confirmed light states.

use serde::{Deserialize, Serialize};

use crate::types::{Brightness, PowerState};

/// A requested change for one light.
///
/// Either field may be left out; the module keeps whatever is not mentioned.
/// Targets for the same light merge field by field, newer values winning,
/// which is how bursts of intents collapse into one write.
///
/// # Examples
///
/// ```
/// use cuehall_lights::{Brightness, LightTarget, PowerState};
///
/// let mut target = LightTarget::power(PowerState::On);
/// assert!(target.is_valid());
///
/// target.merge(&LightTarget::brightness(Brightness::create(40).unwrap()));
/// assert_eq!(target.power_state(), Some(PowerState::On));
/// assert_eq!(target.brightness_level().map(|b| b.value()), Some(40));
///
/// assert!(!LightTarget::new().is_valid());
/// ```
#[serde_with::skip_serializing_none]
#[derive(Default, Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct LightTarget {
    pub(crate) power: Option<PowerState>,
    pub(crate) brightness: Option<Brightness>,
}

impl LightTarget {
    /// Create an empty target. At least one attribute must be set for it to
    /// be submitted.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn power(power: PowerState) -> Self {
        LightTarget {
            power: Some(power),
            brightness: None,
        }
    }

    pub fn brightness(brightness: Brightness) -> Self {
        LightTarget {
            power: None,
            brightness: Some(brightness),
        }
    }

    /// Switch on at the given level.
    pub fn on_at(brightness: Brightness) -> Self {
        LightTarget {
            power: Some(PowerState::On),
            brightness: Some(brightness),
        }
    }

    pub fn with_power(mut self, power: PowerState) -> Self {
        self.power = Some(power);
        self
    }

    pub fn with_brightness(mut self, brightness: Brightness) -> Self {
        self.brightness = Some(brightness);
        self
    }

    pub fn power_state(&self) -> Option<PowerState> {
        self.power
    }

    pub fn brightness_level(&self) -> Option<Brightness> {
        self.brightness
    }

    pub fn is_valid(&self) -> bool {
        self.power.is_some() || self.brightness.is_some()
    }

    /// Overlay `newer` on top of this target.
    pub fn merge(&mut self, newer: &LightTarget) {
        if let Some(power) = newer.power {
            self.power = Some(power);
        }
        if let Some(brightness) = newer.brightness {
            self.brightness = Some(brightness);
        }
    }
}

/// The state of a light as confirmed by the module.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct LightState {
    pub power: PowerState,
    pub brightness: Brightness,
}

impl LightState {
    pub fn new(power: PowerState, brightness: Brightness) -> Self {
        LightState { power, brightness }
    }

    pub fn is_on(&self) -> bool {
        self.power.is_on()
    }
}
