//! Brightness control for hall lights.

use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// Brightness level from 0 to 100 percent.
///
/// The value is only meaningful while the light is on; an off light keeps
/// the level it had so that switching it back on restores it.
#[derive(Default, Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(try_from = "i64", into = "u8")]
pub struct Brightness {
    pub(crate) value: u8,
}

impl Brightness {
    const MAX: u8 = 100;

    /// Full brightness.
    pub fn new() -> Self {
        Brightness { value: Self::MAX }
    }

    pub fn value(&self) -> u8 {
        self.value
    }

    /// Returns None if value is above 100.
    ///
    /// # Examples
    ///
    /// ```
    /// use cuehall_lights::Brightness;
    ///
    /// assert!(Brightness::create(0).is_some());
    /// assert!(Brightness::create(100).is_some());
    /// assert!(Brightness::create(101).is_none());
    /// ```
    pub fn create(value: u8) -> Option<Self> {
        (value <= Self::MAX).then_some(Brightness { value })
    }
}

/// Validates levels coming from callers that speak plain integers
/// (sliders, JSON bodies).
///
/// # Examples
///
/// ```
/// use cuehall_lights::{Brightness, Error};
///
/// assert_eq!(Brightness::try_from(70).unwrap().value(), 70);
/// assert!(matches!(Brightness::try_from(-5), Err(Error::InvalidBrightness(-5))));
/// assert!(matches!(Brightness::try_from(105), Err(Error::InvalidBrightness(105))));
/// ```
impl TryFrom<i64> for Brightness {
    type Error = Error;

    fn try_from(level: i64) -> Result<Self, Self::Error> {
        u8::try_from(level)
            .ok()
            .and_then(Brightness::create)
            .ok_or(Error::InvalidBrightness(level))
    }
}

impl From<Brightness> for u8 {
    fn from(brightness: Brightness) -> Self {
        brightness.value
    }
}

impl std::fmt::Display for Brightness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.value)
    }
}
