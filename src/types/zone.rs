//! Where a light hangs in the hall.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Area of the hall a light belongs to, as reported by the module.
///
/// Presets select lights by zone. Unknown zone names map to [`Zone::Other`].
///
/// # Examples
///
/// ```
/// use std::str::FromStr;
/// use cuehall_lights::Zone;
///
/// assert_eq!(Zone::from_str("table").unwrap(), Zone::Table);
/// assert_eq!(Zone::from_label("bar"), Zone::Other);
/// ```
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Zone {
    /// Lamp over a billiard table
    Table,
    /// Room or wall lighting
    Ambient,
    #[default]
    #[serde(other)]
    Other,
}

impl Zone {
    pub fn from_label(label: &str) -> Self {
        label.parse().unwrap_or_default()
    }
}
