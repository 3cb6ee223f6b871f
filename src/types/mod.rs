//! Value types for light control parameters.

mod brightness;
mod light_id;
mod power;
mod preset;
mod target;
mod zone;

pub use brightness::Brightness;
pub use light_id::LightId;
pub use power::PowerState;
pub use preset::PresetName;
pub use target::{LightState, LightTarget};
pub use zone::Zone;
