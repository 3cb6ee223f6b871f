//! In-memory lighting module for tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::{Value, json};

use crate::errors::Error;
use crate::locked;
use crate::protocol::{DeviceLight, Request};
use crate::runtime::{self, BoxFuture};
use crate::transport::Transport;
use crate::types::{Brightness, LightId, Zone};

type Result<T> = std::result::Result<T, Error>;

/// Answers requests the way the firmware does, with knobs for delays,
/// hangs, rejections and outages.
#[derive(Default)]
pub(crate) struct MockModule {
    lights: Mutex<BTreeMap<LightId, DeviceLight>>,
    offline: AtomicBool,
    delays: Mutex<HashMap<LightId, Duration>>,
    silent: Mutex<HashSet<LightId>>,
    rejected: Mutex<HashSet<LightId>>,
    garbled: Mutex<HashSet<LightId>>,
    poll_delay: Mutex<Option<Duration>>,
    writes: Mutex<HashMap<LightId, usize>>,
    polls: AtomicUsize,
    handshakes: AtomicUsize,
}

impl MockModule {
    /// `count` table lights, all off at 50.
    pub(crate) fn with_tables(count: u16) -> Self {
        let module = Self::default();
        for id in 1..=count {
            module.add_light(id, Zone::Table, false, 50);
        }
        module
    }

    pub(crate) fn add_light(&self, id: u16, zone: Zone, on: bool, level: u8) {
        let name = match zone {
            Zone::Table => format!("Table {id}"),
            _ => format!("Light {id}"),
        };
        locked(&self.lights).insert(
            LightId(id),
            DeviceLight {
                id: LightId(id),
                name,
                zone,
                state: on,
                brightness: Brightness::create(level).unwrap_or_default(),
            },
        );
    }

    pub(crate) fn remove_light(&self, id: u16) {
        locked(&self.lights).remove(&LightId(id));
    }

    /// Flip the hardware behind the controller's back.
    pub(crate) fn set_hardware(&self, id: u16, on: bool, level: u8) {
        if let Some(light) = locked(&self.lights).get_mut(&LightId(id)) {
            light.state = on;
            light.brightness = Brightness::create(level).unwrap_or_default();
        }
    }

    pub(crate) fn light(&self, id: u16) -> Option<DeviceLight> {
        locked(&self.lights).get(&LightId(id)).cloned()
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub(crate) fn delay_light(&self, id: u16, delay: Duration) {
        locked(&self.delays).insert(LightId(id), delay);
    }

    /// Writes to this light never get an answer.
    pub(crate) fn silence_light(&self, id: u16) {
        locked(&self.silent).insert(LightId(id));
    }

    pub(crate) fn reject_light(&self, id: u16) {
        locked(&self.rejected).insert(LightId(id));
    }

    /// Writes to this light are answered with a `result` of the wrong shape.
    pub(crate) fn garble_light(&self, id: u16) {
        locked(&self.garbled).insert(LightId(id));
    }

    pub(crate) fn delay_polls(&self, delay: Duration) {
        *locked(&self.poll_delay) = Some(delay);
    }

    pub(crate) fn writes(&self, id: u16) -> usize {
        locked(&self.writes).get(&LightId(id)).copied().unwrap_or(0)
    }

    pub(crate) fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub(crate) fn handshakes(&self) -> usize {
        self.handshakes.load(Ordering::SeqCst)
    }

    async fn answer(&self, request: &Request) -> Result<Value> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::socket(
                "send",
                io::Error::new(io::ErrorKind::ConnectionRefused, "module offline"),
            ));
        }

        let method = request.method();
        match request {
            Request::GetModuleInfo => {
                self.handshakes.fetch_add(1, Ordering::SeqCst);
                Ok(json!({
                    "method": method,
                    "result": {
                        "moduleId": "ESP32-BILLIARD-001",
                        "fwVersion": "v2.1.3",
                        "mac": "a8032a1b2c3d",
                        "rssi": -45
                    }
                }))
            }
            Request::GetLights => {
                self.polls.fetch_add(1, Ordering::SeqCst);
                let lights: Vec<DeviceLight> = locked(&self.lights).values().cloned().collect();
                let delay = *locked(&self.poll_delay);
                if let Some(delay) = delay {
                    runtime::sleep(delay).await;
                }
                Ok(json!({
                    "method": method,
                    "result": { "lights": lights, "rssi": -47 }
                }))
            }
            Request::SetLight(params) => {
                *locked(&self.writes).entry(params.id).or_default() += 1;

                let delay = locked(&self.delays).get(&params.id).copied();
                if let Some(delay) = delay {
                    runtime::sleep(delay).await;
                }
                if locked(&self.silent).contains(&params.id) {
                    futures::future::pending::<()>().await;
                }
                if locked(&self.rejected).contains(&params.id) {
                    return Ok(json!({
                        "method": method,
                        "error": { "code": -32602, "message": "Invalid params" }
                    }));
                }
                if locked(&self.garbled).contains(&params.id) {
                    return Ok(json!({ "method": method, "result": { "unexpected": 1 } }));
                }

                let mut lights = locked(&self.lights);
                let Some(light) = lights.get_mut(&params.id) else {
                    return Ok(json!({
                        "method": method,
                        "error": { "code": -32001, "message": "Unknown light" }
                    }));
                };
                if let Some(on) = params.state {
                    light.state = on;
                }
                if let Some(brightness) = params.brightness {
                    light.brightness = brightness;
                }
                Ok(json!({ "method": method, "result": light }))
            }
        }
    }
}

impl Transport for MockModule {
    fn request<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Value>> {
        Box::pin(self.answer(request))
    }

    fn peer(&self) -> Option<String> {
        Some("192.168.1.100".to_string())
    }
}
