//! # cuehall_lights
//!
//! An async Rust library that drives the lighting module of a billiard hall
//! and keeps a consistent view of every light for a point-of-sale backend.
//!
//! The module (an ESP32-class controller) answers JSON requests over UDP. This
//! crate owns that conversation: it bounds every request with a timeout,
//! reconnects with backoff when the module drops off the network, collapses
//! bursts of commands for the same light, and reconciles command
//! acknowledgements with periodic polls so that an old reading never
//! overwrites a newer one.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use cuehall_lights::{Controller, ControllerConfig, LightId, PowerState};
//!
//! // Works with any async runtime!
//! async fn open_table() -> Result<(), Box<dyn std::error::Error>> {
//!     let addr = "192.168.1.100:38899".parse()?;
//!     let controller = Arc::new(Controller::udp(addr, ControllerConfig::default()));
//!     let _tasks = controller.start();
//!
//!     controller.refresh().await?;
//!     controller.set_power(LightId(3), PowerState::On).await?;
//!     controller.set_brightness(LightId(3), 70).await?;
//!
//!     for light in controller.lights() {
//!         println!("{} {} {}%", light.name, light.status, light.brightness);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Runtime Agnostic**: Works with tokio, async-std, or smol async runtimes
//! - **Command Coalescing**: At most one in-flight and one queued write per
//!   light; newer intents supersede older ones ([`CommandOutcome::Superseded`])
//! - **Reconciliation**: Lock-free [`Snapshot`]s, last-writer-wins by
//!   timestamp, staleness flag while the module is unreachable
//! - **Presets**: `all_on`, `all_off`, `tables_only`, `ambient` via
//!   [`Controller::apply_preset`], with per-light failure reporting
//! - **Status**: counters, uptime and a transaction history for the
//!   dashboard's [`ModuleStatus`] and [`LightingSummary`]
//! - **Discovery**: Find modules on your network with [`discover_modules`]
//!
//! ## Communication
//!
//! All communication with the module occurs over UDP on port 38899, one
//! request per datagram and one reply per request. See [`Request`] for the
//! message shapes.
//!
//! ## Runtime Selection
//!
//! ### Using tokio (default)
//!
//! ```toml
//! [dependencies]
//! cuehall-lights = "0.1"
//! tokio = { version = "1", features = ["rt-multi-thread", "macros"] }
//! ```
//!
//! ### Using async-std
//!
//! ```toml
//! [dependencies]
//! cuehall-lights = { version = "0.1", default-features = false, features = ["runtime-async-std"] }
//! async-std = { version = "1.12", features = ["attributes"] }
//! ```
//!
//! ### Using smol
//!
//! ```toml
//! [dependencies]
//! cuehall-lights = { version = "0.1", default-features = false, features = ["runtime-smol"] }
//! smol = "2"
//! ```
//!
//! ## Logging
//!
//! Diagnostics go through the [`log`](https://docs.rs/log) facade; install
//! any logger in the embedding application to see them.

mod coalescer;
mod command;
mod config;
mod controller;
mod discovery;
mod errors;
mod history;
mod light;
mod link;
mod preset;
mod protocol;
mod reconciler;
pub mod runtime;
mod stats;
mod status;
#[cfg(test)]
mod testing;
mod transport;
mod types;

use std::sync::{Mutex, MutexGuard, PoisonError};

// Re-export public API
pub use coalescer::CommandCoalescer;
pub use command::{Command, CommandOutcome, CommandStatus, CommandTicket};
pub use config::{BackoffConfig, ControllerConfig};
pub use controller::{BackgroundTasks, Controller};
pub use discovery::{DiscoveredModule, discover_modules};
pub use errors::Error;
pub use history::{HistoryEntry, TransactionHistory, TransactionKind, TransactionResult};
pub use light::{Light, LightView};
pub use link::{DeviceLink, LinkObserver};
pub use preset::{PresetEngine, PresetOutcome};
pub use protocol::{DeviceLight, LightsReport, ModuleInfo, Request, SetLightParams, decode_reply};
pub use reconciler::{Snapshot, StateReconciler};
pub use stats::{Counters, StatusAggregator, format_uptime};
pub use status::{LightingSummary, Module, ModuleStatus, Reachability};
pub use transport::{MODULE_PORT, Transport, UdpTransport};
pub use types::{Brightness, LightId, LightState, LightTarget, PowerState, PresetName, Zone};

/// Lock a std mutex, carrying on with the data if a holder panicked.
pub(crate) fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
