//! The entry point used by the point-of-sale backend.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use log::{debug, warn};

use crate::coalescer::CommandCoalescer;
use crate::command::CommandTicket;
use crate::config::ControllerConfig;
use crate::errors::Error;
use crate::history::TransactionHistory;
use crate::light::LightView;
use crate::link::DeviceLink;
use crate::preset::{PresetEngine, PresetOutcome};
use crate::protocol::{LightsReport, Request};
use crate::reconciler::{Snapshot, StateReconciler};
use crate::runtime::{self, JoinHandle};
use crate::stats::{Counters, StatusAggregator};
use crate::status::{LightingSummary, ModuleStatus, Reachability};
use crate::transport::{Transport, UdpTransport};
use crate::types::{Brightness, LightId, LightState, LightTarget, PowerState};

type Result<T> = std::result::Result<T, Error>;

/// Wires the link, coalescer, reconciler, presets and aggregator together.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use cuehall_lights::{Controller, ControllerConfig, LightId, PowerState};
///
/// # async fn run() -> Result<(), cuehall_lights::Error> {
/// let addr = "192.168.1.100:38899".parse().unwrap();
/// let controller = Arc::new(Controller::udp(addr, ControllerConfig::default()));
/// let mut tasks = controller.start();
///
/// controller.refresh().await?;
/// controller.set_power(LightId(3), PowerState::On).await?;
/// controller.apply_preset("tables_only").await?;
/// println!("{:?}", controller.summary());
///
/// tasks.stop();
/// # Ok(())
/// # }
/// ```
pub struct Controller {
    config: ControllerConfig,
    link: Arc<DeviceLink>,
    reconciler: Arc<StateReconciler>,
    stats: Arc<StatusAggregator>,
    coalescer: Arc<CommandCoalescer>,
    presets: PresetEngine,
    last_poll: runtime::Mutex<Option<PollRecord>>,
    /// Polls finished so far, readable without the lock.
    polls_finished: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollOutcome {
    Fresh,
    TimedOut,
    Failed,
}

#[derive(Debug, Clone, Copy)]
struct PollRecord {
    finished_at: Instant,
    outcome: PollOutcome,
}

impl PollRecord {
    /// What a caller that waited on this poll gets back.
    fn shared(&self, snapshot: Arc<Snapshot>) -> Result<Arc<Snapshot>> {
        match self.outcome {
            PollOutcome::Fresh => Ok(snapshot),
            PollOutcome::TimedOut => Err(Error::Timeout),
            PollOutcome::Failed => Err(Error::Unreachable),
        }
    }
}

impl Controller {
    pub fn new(config: ControllerConfig, transport: Arc<dyn Transport>) -> Self {
        let stats = Arc::new(StatusAggregator::new(config.history_capacity));
        let reconciler = Arc::new(StateReconciler::new(transport.peer()));
        let link = Arc::new(DeviceLink::new(
            transport,
            config.clone(),
            stats.clone(),
            reconciler.clone(),
        ));
        let coalescer = Arc::new(CommandCoalescer::new(
            link.clone(),
            reconciler.clone(),
            stats.clone(),
        ));
        let presets = PresetEngine::new(coalescer.clone(), reconciler.clone());

        Controller {
            config,
            link,
            reconciler,
            stats,
            coalescer,
            presets,
            last_poll: runtime::Mutex::new(None),
            polls_finished: AtomicU64::new(0),
        }
    }

    /// Talk to a module over UDP.
    pub fn udp(addr: SocketAddr, config: ControllerConfig) -> Self {
        Self::new(config, Arc::new(UdpTransport::new(addr)))
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// The last-known state, without touching the network.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.reconciler.snapshot()
    }

    pub fn lights(&self) -> Vec<LightView> {
        self.reconciler.snapshot().light_views()
    }

    pub fn module_status(&self) -> ModuleStatus {
        let snapshot = self.reconciler.snapshot();
        ModuleStatus::new(
            snapshot.module(),
            &self.stats.counters(),
            self.stats.uptime(),
            snapshot.is_stale(),
        )
    }

    pub fn summary(&self) -> LightingSummary {
        LightingSummary::from_lights(self.reconciler.snapshot().lights(), self.config.watts_per_light)
    }

    pub fn reachability(&self) -> Reachability {
        self.link.reachability()
    }

    pub fn counters(&self) -> Counters {
        self.stats.counters()
    }

    /// Recent link transactions.
    pub fn history(&self) -> TransactionHistory {
        self.stats.history()
    }

    /// Poll the module unless a poll finished within the cache window.
    ///
    /// Concurrent callers wait for the same poll instead of issuing their own
    /// and share its outcome. When that poll failed they get
    /// [`Error::Timeout`] or [`Error::Unreachable`]; only a successful poll is
    /// served from the cache afterwards.
    pub async fn refresh(&self) -> Result<Arc<Snapshot>> {
        let seen = self.polls_finished.load(Ordering::Acquire);
        let mut last_poll = self.last_poll.lock().await;
        if let Some(record) = *last_poll {
            if self.polls_finished.load(Ordering::Acquire) != seen {
                debug!("sharing the poll that finished while waiting");
                return record.shared(self.reconciler.snapshot());
            }
            if record.outcome == PollOutcome::Fresh
                && record.finished_at.elapsed() < self.config.poll_cache_window
            {
                debug!("poll served from cache");
                return Ok(self.reconciler.snapshot());
            }
        }

        let taken_at = Instant::now();
        let result = self.link.send_parsed::<LightsReport>(&Request::GetLights).await;
        *last_poll = Some(PollRecord {
            finished_at: Instant::now(),
            outcome: match &result {
                Ok(_) => PollOutcome::Fresh,
                Err(Error::Timeout) => PollOutcome::TimedOut,
                Err(_) => PollOutcome::Failed,
            },
        });
        self.polls_finished.fetch_add(1, Ordering::Release);

        self.reconciler.apply_poll(&result?, taken_at);
        Ok(self.reconciler.snapshot())
    }

    /// Refresh if due and return whatever is known. On failure the previous
    /// snapshot comes back with its staleness flag.
    pub async fn query(&self) -> Arc<Snapshot> {
        match self.refresh().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("serving last-known state: {}", e);
                self.reconciler.snapshot()
            }
        }
    }

    /// Queue a change and return the ticket without waiting.
    pub fn submit(&self, light: LightId, target: LightTarget) -> Result<CommandTicket> {
        self.coalescer.submit(light, target)
    }

    pub async fn set_power(&self, light: LightId, power: PowerState) -> Result<LightState> {
        self.execute(light, LightTarget::power(power)).await
    }

    /// Set the level of a light. Out-of-range levels are rejected before
    /// anything is sent.
    pub async fn set_brightness(&self, light: LightId, level: i64) -> Result<LightState> {
        let brightness = Brightness::try_from(level)?;
        self.execute(light, LightTarget::brightness(brightness)).await
    }

    /// Flip a light relative to the newest intent for it: the power of a
    /// command still queued or in flight, otherwise the confirmed state.
    pub async fn toggle(&self, light: LightId) -> Result<LightState> {
        let confirmed = self
            .reconciler
            .snapshot()
            .light(light)
            .map(|l| l.state().power)
            .ok_or(Error::LightNotFound(light))?;
        let current = self.coalescer.pending_power(light).unwrap_or(confirmed);
        self.set_power(light, current.flipped()).await
    }

    pub async fn apply_preset(&self, name: &str) -> Result<PresetOutcome> {
        self.presets.apply(name).await
    }

    async fn execute(&self, light: LightId, target: LightTarget) -> Result<LightState> {
        self.coalescer.submit(light, target)?.outcome().await.into_result()
    }

    /// Spawn the poller and the link supervisor.
    pub fn start(self: &Arc<Self>) -> BackgroundTasks {
        let running = Arc::new(AtomicBool::new(true));

        let poller = runtime::spawn({
            let controller = Arc::clone(self);
            let running = running.clone();
            async move { controller.poll_loop(running).await }
        });
        let supervisor = runtime::spawn({
            let link = self.link.clone();
            let running = running.clone();
            async move { link.supervise(running).await }
        });

        BackgroundTasks {
            running,
            handles: vec![poller, supervisor],
        }
    }

    async fn poll_loop(&self, running: Arc<AtomicBool>) {
        while running.load(Ordering::Relaxed) {
            if let Err(e) = self.refresh().await {
                debug!("background poll failed: {}", e);
            }
            runtime::sleep(self.config.poll_interval).await;
        }
    }
}

/// Handles to the tasks started by [`Controller::start`]. Dropping it stops
/// them too.
pub struct BackgroundTasks {
    running: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundTasks {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        for handle in &mut self.handles {
            handle.abort();
        }
        self.handles.clear();
    }
}

impl Drop for BackgroundTasks {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackoffConfig;
    use crate::testing::MockModule;
    use std::time::Duration;

    fn quick_config() -> ControllerConfig {
        ControllerConfig {
            request_timeout: Duration::from_millis(100),
            poll_interval: Duration::from_millis(20),
            poll_cache_window: Duration::from_millis(200),
            backoff: BackoffConfig {
                base: Duration::from_millis(10),
                cap: Duration::from_millis(50),
            },
            ..ControllerConfig::default()
        }
    }

    fn controller(module: &Arc<MockModule>) -> Arc<Controller> {
        Arc::new(Controller::new(quick_config(), module.clone()))
    }

    #[tokio::test]
    async fn test_brightness_range_checked_before_link() {
        let module = Arc::new(MockModule::with_tables(1));
        let controller = controller(&module);
        controller.refresh().await.unwrap();

        assert_eq!(
            controller.set_brightness(LightId(1), -5).await.unwrap_err(),
            Error::InvalidBrightness(-5)
        );
        assert_eq!(
            controller.set_brightness(LightId(1), 105).await.unwrap_err(),
            Error::InvalidBrightness(105)
        );
        assert_eq!(module.writes(1), 0);
        assert_eq!(controller.counters().commands_sent, 0);

        assert_eq!(controller.set_brightness(LightId(1), 0).await.unwrap().brightness.value(), 0);
        assert_eq!(controller.set_brightness(LightId(1), 100).await.unwrap().brightness.value(), 100);
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_share_one_poll() {
        let module = Arc::new(MockModule::with_tables(3));
        module.delay_polls(Duration::from_millis(20));
        let controller = controller(&module);

        let (a, b, c) = tokio::join!(controller.refresh(), controller.refresh(), controller.refresh());
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(module.polls(), 1);
        assert_eq!(controller.lights().len(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_share_a_timed_out_poll() {
        let module = Arc::new(MockModule::with_tables(3));
        module.delay_polls(Duration::from_millis(150));
        let controller = controller(&module);

        let started = Instant::now();
        let (a, b, c) = tokio::join!(controller.refresh(), controller.refresh(), controller.refresh());
        assert_eq!(a.unwrap_err(), Error::Timeout);
        assert_eq!(b.unwrap_err(), Error::Timeout);
        assert_eq!(c.unwrap_err(), Error::Timeout);
        assert_eq!(module.polls(), 1);
        assert!(started.elapsed() < Duration::from_millis(250));
        assert!(controller.lights().is_empty());

        // a failure is not cached for later callers
        module.delay_polls(Duration::ZERO);
        controller.refresh().await.unwrap();
        assert_eq!(module.polls(), 2);
        assert_eq!(controller.lights().len(), 3);
    }

    #[tokio::test]
    async fn test_quick_toggles_cancel_out() {
        let module = Arc::new(MockModule::with_tables(1));
        module.delay_light(1, Duration::from_millis(20));
        let controller = controller(&module);
        controller.refresh().await.unwrap();

        let (first, second) = tokio::join!(controller.toggle(LightId(1)), controller.toggle(LightId(1)));
        assert_eq!(first.unwrap_err(), Error::Superseded);
        assert!(!second.unwrap().is_on());
        assert!(!controller.snapshot().light(LightId(1)).unwrap().is_on());
        assert!(!module.light(1).unwrap().state);
    }

    #[tokio::test]
    async fn test_toggle_and_summary() {
        let module = Arc::new(MockModule::with_tables(2));
        module.set_hardware(1, true, 80);
        let controller = controller(&module);
        controller.refresh().await.unwrap();

        assert_eq!(controller.summary().active_lights, 1);
        assert!(controller.toggle(LightId(2)).await.unwrap().is_on());

        let summary = controller.summary();
        assert_eq!(summary.active_lights, 2);
        assert_eq!(summary.average_brightness, 65);
        assert_eq!(summary.power_watts, 24);

        assert!(!controller.toggle(LightId(1)).await.unwrap().is_on());
        assert!(matches!(
            controller.toggle(LightId(7)).await,
            Err(Error::LightNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_link_loss_keeps_stale_snapshot() {
        let module = Arc::new(MockModule::with_tables(2));
        module.set_hardware(2, true, 75);
        let controller = controller(&module);
        controller.refresh().await.unwrap();
        assert!(!controller.snapshot().is_stale());

        module.set_offline(true);
        runtime::sleep(Duration::from_millis(250)).await;
        let snapshot = controller.query().await;
        assert!(snapshot.is_stale());
        assert_eq!(snapshot.light(LightId(2)).unwrap().brightness().value(), 75);
        assert!(controller.module_status().stale);

        assert_eq!(
            controller.set_power(LightId(1), PowerState::On).await.unwrap_err(),
            Error::Unreachable
        );

        module.set_offline(false);
        runtime::sleep(Duration::from_millis(60)).await;
        controller.refresh().await.unwrap();
        assert!(!controller.snapshot().is_stale());
        assert_eq!(controller.reachability(), Reachability::Connected);
    }

    #[tokio::test]
    async fn test_module_status_after_handshake() {
        let module = Arc::new(MockModule::with_tables(1));
        let controller = controller(&module);
        controller.refresh().await.unwrap();
        controller.set_power(LightId(1), PowerState::On).await.unwrap();

        let status = controller.module_status();
        assert_eq!(status.module_id.as_deref(), Some("ESP32-BILLIARD-001"));
        assert_eq!(status.firmware_version.as_deref(), Some("v2.1.3"));
        assert_eq!(status.ip_address.as_deref(), Some("192.168.1.100"));
        assert_eq!(status.signal_strength, Some(-47));
        assert_eq!(status.total_commands, 1);
        assert_eq!(status.successful_commands, 1);
        assert_eq!(status.uptime.as_deref(), Some("0m"));
        assert_eq!(status.reachability, Reachability::Connected);
    }

    #[tokio::test]
    async fn test_vanished_light_is_kept() {
        let module = Arc::new(MockModule::with_tables(3));
        let controller = Arc::new(Controller::new(
            ControllerConfig {
                poll_cache_window: Duration::ZERO,
                ..quick_config()
            },
            module.clone(),
        ));
        controller.refresh().await.unwrap();

        module.remove_light(2);
        controller.refresh().await.unwrap();

        let lights = controller.lights();
        assert_eq!(lights.len(), 3);
        assert!(!lights[1].reachable);
        assert!(lights[0].reachable && lights[2].reachable);
    }

    #[tokio::test]
    async fn test_background_poller_picks_up_hardware_changes() {
        let module = Arc::new(MockModule::with_tables(1));
        let controller = Arc::new(Controller::new(
            ControllerConfig {
                poll_cache_window: Duration::ZERO,
                ..quick_config()
            },
            module.clone(),
        ));
        let mut tasks = controller.start();

        runtime::sleep(Duration::from_millis(60)).await;
        assert_eq!(controller.lights().len(), 1);

        module.set_hardware(1, true, 33);
        module.add_light(2, crate::types::Zone::Ambient, false, 0);
        runtime::sleep(Duration::from_millis(80)).await;

        let lights = controller.lights();
        assert_eq!(lights.len(), 2);
        assert_eq!(lights[0].status, PowerState::On);
        assert_eq!(lights[0].brightness, 33);

        tasks.stop();
        assert!(!tasks.is_running());
    }
}
