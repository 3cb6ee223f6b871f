//! Named lighting presets.

use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

use crate::errors::Error;
use crate::types::{Brightness, LightTarget, PowerState, Zone};

/// The fixed preset catalog.
///
/// Names are spelled in snake case on the wire (`all_on`, `tables_only`, ...).
///
/// # Examples
///
/// ```
/// use cuehall_lights::PresetName;
///
/// assert_eq!(PresetName::parse("tables_only").unwrap(), PresetName::TablesOnly);
/// assert!(PresetName::parse("disco").is_err());
/// assert_eq!(PresetName::AllOff.to_string(), "all_off");
/// ```
#[derive(
    Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PresetName {
    AllOn,
    AllOff,
    TablesOnly,
    Ambient,
}

impl PresetName {
    /// Look a preset up by its catalog name.
    pub fn parse(name: &str) -> Result<Self, Error> {
        name.parse()
            .map_err(|_| Error::UnknownPreset(name.to_string()))
    }

    /// Every preset in the catalog.
    pub fn catalog() -> Vec<Self> {
        PresetName::iter().collect()
    }

    /// What this preset asks of a light in `zone`.
    ///
    /// # Examples
    ///
    /// ```
    /// use cuehall_lights::{PowerState, PresetName, Zone};
    ///
    /// let target = PresetName::Ambient.target_for(Zone::Table);
    /// assert_eq!(target.power_state(), Some(PowerState::On));
    /// assert_eq!(target.brightness_level().map(|b| b.value()), Some(20));
    ///
    /// // switching off leaves the level alone
    /// assert!(PresetName::AllOff.target_for(Zone::Table).brightness_level().is_none());
    /// ```
    pub fn target_for(&self, zone: Zone) -> LightTarget {
        const FULL: Brightness = Brightness { value: 100 };
        const ROOM_GLOW: Brightness = Brightness { value: 40 };
        const TABLE_GLOW: Brightness = Brightness { value: 20 };

        match (self, zone) {
            (PresetName::AllOn, _) => LightTarget::on_at(FULL),
            (PresetName::AllOff, _) => LightTarget::power(PowerState::Off),
            (PresetName::TablesOnly, Zone::Table) => LightTarget::on_at(FULL),
            (PresetName::TablesOnly, _) => LightTarget::power(PowerState::Off),
            (PresetName::Ambient, Zone::Table) => LightTarget::on_at(TABLE_GLOW),
            (PresetName::Ambient, _) => LightTarget::on_at(ROOM_GLOW),
        }
    }
}
