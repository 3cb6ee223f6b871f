//! Single source of truth for light and module state.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use arc_swap::ArcSwap;
use log::{debug, warn};

use crate::light::{Light, LightView};
use crate::link::LinkObserver;
use crate::locked;
use crate::protocol::{LightsReport, ModuleInfo};
use crate::status::{Module, Reachability};
use crate::types::{LightId, LightState};

/// A consistent, point-in-time view of every light and the module.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    lights: BTreeMap<LightId, Light>,
    module: Module,
    stale: bool,
    last_poll: Option<Instant>,
}

impl Snapshot {
    pub fn light(&self, id: LightId) -> Option<&Light> {
        self.lights.get(&id)
    }

    /// Lights ordered by id.
    pub fn lights(&self) -> impl Iterator<Item = &Light> {
        self.lights.values()
    }

    pub fn light_views(&self) -> Vec<LightView> {
        self.lights.values().map(Light::view).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    /// True while the table may not match the hardware: before the first
    /// poll, and from a disconnect until the next successful poll.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// When the last applied poll was taken.
    pub fn last_poll(&self) -> Option<Instant> {
        self.last_poll
    }
}

/// Owns the canonical light/module table.
///
/// Readers get lock-free `Arc<Snapshot>` loads. Writers funnel through one
/// mutex, copy the table, change it and publish the copy, so no reader ever
/// sees a half-applied update.
#[derive(Debug)]
pub struct StateReconciler {
    current: ArcSwap<Snapshot>,
    writer: Mutex<()>,
    stale_readings: AtomicU64,
    deferred_readings: AtomicU64,
}

impl StateReconciler {
    pub fn new(address: Option<String>) -> Self {
        let initial = Snapshot {
            module: Module::with_address(address),
            stale: true,
            ..Snapshot::default()
        };
        StateReconciler {
            current: ArcSwap::from_pointee(initial),
            writer: Mutex::new(()),
            stale_readings: AtomicU64::new(0),
            deferred_readings: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    /// Readings dropped because something newer was already recorded.
    pub fn stale_readings(&self) -> u64 {
        self.stale_readings.load(Ordering::Relaxed)
    }

    /// Poll readings skipped because a command was in flight for the light.
    pub fn deferred_readings(&self) -> u64 {
        self.deferred_readings.load(Ordering::Relaxed)
    }

    fn update<R>(&self, f: impl FnOnce(&mut Snapshot) -> R) -> R {
        let _guard = locked(&self.writer);
        let mut next = Snapshot::clone(&self.current.load());
        let out = f(&mut next);
        self.current.store(Arc::new(next));
        out
    }

    /// Merge a full poll taken at `taken_at` (the moment the request left).
    ///
    /// A light keeps its current state when a command is pending for it or
    /// when its state was confirmed after the poll was taken. Lights missing
    /// from the poll are marked unreachable.
    pub fn apply_poll(&self, report: &LightsReport, taken_at: Instant) {
        self.update(|snap| {
            let mut seen = Vec::with_capacity(report.lights.len());
            for device in &report.lights {
                seen.push(device.id);
                match snap.lights.get_mut(&device.id) {
                    None => {
                        debug!("discovered light {} ({})", device.id, device.name);
                        snap.lights.insert(device.id, Light::from_device(device, taken_at));
                    }
                    Some(light) if light.is_pending() => {
                        self.deferred_readings.fetch_add(1, Ordering::Relaxed);
                        debug!("light {}: poll deferred to in-flight command", device.id);
                        light.touch_from_poll(device);
                    }
                    Some(light) if taken_at <= light.confirmed_at() => {
                        self.stale_readings.fetch_add(1, Ordering::Relaxed);
                        debug!("light {}: poll older than last confirmation, ignored", device.id);
                        light.touch_from_poll(device);
                    }
                    Some(light) => light.update_from_poll(device, taken_at),
                }
            }

            for (id, light) in snap.lights.iter_mut() {
                if !seen.contains(id) && light.is_reachable() {
                    warn!("light {} missing from poll", id);
                    light.mark_unreachable();
                }
            }

            if report.rssi.is_some() {
                snap.module.signal_strength = report.rssi;
            }
            snap.stale = false;
            snap.last_poll = Some(taken_at);
        });
    }

    /// Record a command acknowledgement. Returns `false` when the ack was
    /// older than what is already recorded, or the light is unknown.
    pub fn apply_ack(&self, id: LightId, state: LightState, acked_at: Instant) -> bool {
        self.update(|snap| {
            let Some(light) = snap.lights.get_mut(&id) else {
                warn!("ack for unknown light {}", id);
                return false;
            };
            if acked_at < light.confirmed_at() {
                self.stale_readings.fetch_add(1, Ordering::Relaxed);
                debug!("light {}: out-of-order ack ignored", id);
                return false;
            }
            light.update_from_ack(state, acked_at);
            true
        })
    }

    pub fn set_pending(&self, id: LightId, pending: bool) {
        self.update(|snap| {
            if let Some(light) = snap.lights.get_mut(&id) {
                light.set_pending(pending);
            }
        });
    }

    pub fn apply_module_info(&self, info: &ModuleInfo) {
        self.update(|snap| snap.module.apply_info(info));
    }

    /// Track the link state. Anything but `Connected` marks the table stale;
    /// only a successful poll clears it again.
    pub fn set_reachability(&self, reachability: Reachability) {
        self.update(|snap| {
            snap.module.reachability = reachability;
            if !reachability.is_connected() {
                snap.stale = true;
            }
        });
    }
}

impl LinkObserver for StateReconciler {
    fn reachability_changed(&self, reachability: Reachability) {
        self.set_reachability(reachability);
    }

    fn module_identified(&self, info: &ModuleInfo) {
        self.apply_module_info(info);
    }
}
