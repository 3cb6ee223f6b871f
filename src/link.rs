//! Connection to the lighting module: timeouts, reachability and reconnects.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::ControllerConfig;
use crate::errors::Error;
use crate::history::TransactionKind;
use crate::locked;
use crate::protocol::{ModuleInfo, Request, decode_reply, parse_result};
use crate::runtime;
use crate::stats::StatusAggregator;
use crate::status::Reachability;
use crate::transport::Transport;

type Result<T> = std::result::Result<T, Error>;

/// Receives link events. The reconciler is the production observer.
pub trait LinkObserver: Send + Sync {
    fn reachability_changed(&self, _reachability: Reachability) {}

    fn module_identified(&self, _info: &ModuleInfo) {}
}

#[derive(Debug)]
struct LinkState {
    reachability: Reachability,
    /// Failed reconnects since the link was last up.
    attempt: u32,
    /// While set and in the future, no I/O is attempted.
    retry_at: Option<Instant>,
    consecutive_timeouts: u32,
}

/// Owns the exchange with the module.
///
/// Every request is bounded by the configured timeout and reported to the
/// [`StatusAggregator`] exactly once. After the link breaks, requests fail
/// fast with [`Error::Unreachable`] until the backoff delay has passed; the
/// next request after that, or the supervisor, performs the handshake.
pub struct DeviceLink {
    transport: Arc<dyn Transport>,
    config: ControllerConfig,
    stats: Arc<StatusAggregator>,
    observer: Arc<dyn LinkObserver>,
    state: Mutex<LinkState>,
    handshake: runtime::Mutex<()>,
}

impl DeviceLink {
    pub fn new(
        transport: Arc<dyn Transport>,
        config: ControllerConfig,
        stats: Arc<StatusAggregator>,
        observer: Arc<dyn LinkObserver>,
    ) -> Self {
        DeviceLink {
            transport,
            config,
            stats,
            observer,
            state: Mutex::new(LinkState {
                reachability: Reachability::Disconnected,
                attempt: 0,
                retry_at: None,
                consecutive_timeouts: 0,
            }),
            handshake: runtime::Mutex::new(()),
        }
    }

    pub fn reachability(&self) -> Reachability {
        locked(&self.state).reachability
    }

    /// Time left before the next reconnect may be tried.
    pub fn retry_in(&self) -> Option<Duration> {
        let state = locked(&self.state);
        state
            .retry_at
            .map(|at| at.saturating_duration_since(Instant::now()))
            .filter(|left| !left.is_zero())
    }

    /// Send one request and return the decoded `result`.
    pub async fn send(&self, request: &Request) -> Result<Value> {
        self.send_parsed(request).await
    }

    /// Send one request and deserialize its `result` into `T`.
    ///
    /// A reply that does not fit `T` counts as a bad reply, not a success.
    /// Requests refused while the link is down never reach the wire and are
    /// only counted as unreachable.
    pub async fn send_parsed<T: DeserializeOwned>(&self, request: &Request) -> Result<T> {
        if let Err(e) = self.ensure_connected().await {
            self.stats.record_refused(kind_of(request), request.method(), request.light());
            return Err(e);
        }

        let started = Instant::now();
        let result = self.exchange(request).await.and_then(parse_result::<T>);
        self.stats.record(
            kind_of(request),
            request.method(),
            request.light(),
            &result,
            started.elapsed(),
        );
        result
    }

    /// Handshake with the module unless the link is already up.
    ///
    /// Fails with [`Error::Unreachable`] while the backoff delay is running
    /// or when the handshake itself fails.
    pub async fn connect(&self) -> Result<()> {
        let _guard = self.handshake.lock().await;
        if self.reachability().is_connected() {
            return Ok(());
        }
        if self.retry_in().is_some() {
            return Err(Error::Unreachable);
        }

        self.transition(|state| {
            if state.reachability == Reachability::Disconnected {
                state.reachability = Reachability::Connecting;
            }
        });

        let started = Instant::now();
        let result = self
            .exchange(&Request::GetModuleInfo)
            .await
            .and_then(parse_result::<ModuleInfo>);
        self.stats.record(
            TransactionKind::Handshake,
            Request::GetModuleInfo.method(),
            None,
            &result,
            started.elapsed(),
        );

        match result {
            Ok(info) => {
                info!(
                    "connected to module {} ({})",
                    info.module_id,
                    info.fw_version.as_deref().unwrap_or("unknown firmware")
                );
                self.observer.module_identified(&info);
                self.stats.mark_connected();
                self.transition(|state| {
                    state.reachability = Reachability::Connected;
                    state.attempt = 0;
                    state.retry_at = None;
                    state.consecutive_timeouts = 0;
                });
                Ok(())
            }
            Err(e) => {
                let delay = self.transition(|state| {
                    let delay = self.config.backoff.delay(state.attempt);
                    state.attempt = state.attempt.saturating_add(1);
                    state.retry_at = Some(Instant::now() + delay);
                    state.reachability = Reachability::Disconnected;
                    delay
                });
                warn!("handshake failed: {}; next attempt in {:?}", e, delay);
                Err(Error::Unreachable)
            }
        }
    }

    /// Keep reconnecting in the background until `running` is cleared.
    pub async fn supervise(&self, running: Arc<AtomicBool>) {
        while running.load(Ordering::Relaxed) {
            if self.reachability().is_connected() {
                runtime::sleep(self.config.backoff.base).await;
                continue;
            }
            match self.retry_in() {
                Some(left) => runtime::sleep(left).await,
                None => {
                    if let Err(e) = self.connect().await {
                        debug!("supervisor reconnect: {}", e);
                    }
                }
            }
        }
    }

    async fn ensure_connected(&self) -> Result<()> {
        if self.reachability().is_connected() {
            return Ok(());
        }
        if self.retry_in().is_some() {
            return Err(Error::Unreachable);
        }
        self.connect().await
    }

    async fn exchange(&self, request: &Request) -> Result<Value> {
        let reply =
            match runtime::timeout(self.config.request_timeout, self.transport.request(request))
                .await
            {
                Ok(reply) => reply,
                Err(_) => Err(Error::Timeout),
            };
        match reply.and_then(decode_reply) {
            Err(Error::Timeout) => {
                let threshold = self.config.timeouts_before_reconnect.max(1);
                let broken = self.transition(|state| {
                    state.consecutive_timeouts += 1;
                    state.consecutive_timeouts >= threshold
                });
                if broken {
                    warn!("{} consecutive timeouts from the module", threshold);
                    self.lose_link();
                }
                Err(Error::Timeout)
            }
            Err(e) if e.is_transport() => {
                warn!("link to module broke: {}", e);
                self.lose_link();
                Err(Error::Unreachable)
            }
            other => {
                self.transition(|state| state.consecutive_timeouts = 0);
                other
            }
        }
    }

    fn lose_link(&self) {
        self.transition(|state| {
            if state.reachability == Reachability::Connected {
                let delay = self.config.backoff.delay(0);
                state.reachability = Reachability::Reconnecting;
                state.attempt = 1;
                state.retry_at = Some(Instant::now() + delay);
                state.consecutive_timeouts = 0;
            }
        });
    }

    /// Apply `f` to the state and notify the observer if reachability moved.
    fn transition<R>(&self, f: impl FnOnce(&mut LinkState) -> R) -> R {
        let (out, before, after) = {
            let mut state = locked(&self.state);
            let before = state.reachability;
            let out = f(&mut state);
            (out, before, state.reachability)
        };
        if before != after {
            debug!("link {} -> {}", before, after);
            self.observer.reachability_changed(after);
        }
        out
    }
}

fn kind_of(request: &Request) -> TransactionKind {
    match request {
        Request::GetModuleInfo => TransactionKind::Handshake,
        Request::GetLights => TransactionKind::Poll,
        Request::SetLight(_) => TransactionKind::Command,
    }
}
