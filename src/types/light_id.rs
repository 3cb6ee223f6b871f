//! Light identity.

use serde::{Deserialize, Serialize};

/// Stable id of a light as reported by the lighting module.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct LightId(pub u16);

impl LightId {
    pub fn value(&self) -> u16 {
        self.0
    }
}

impl From<u16> for LightId {
    fn from(id: u16) -> Self {
        LightId(id)
    }
}

impl std::fmt::Display for LightId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
