//! Per-light command queues that collapse bursts of intents.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures::channel::oneshot;
use log::debug;

use crate::command::{Command, CommandOutcome, CommandStatus, CommandTicket};
use crate::errors::Error;
use crate::link::DeviceLink;
use crate::locked;
use crate::protocol::{DeviceLight, Request};
use crate::reconciler::StateReconciler;
use crate::runtime;
use crate::stats::StatusAggregator;
use crate::types::{LightId, LightTarget, PowerState};

type Result<T> = std::result::Result<T, Error>;

struct Slot {
    command: Command,
    /// Taken once the ticket has been answered.
    reply: Option<oneshot::Sender<CommandOutcome>>,
}

impl Slot {
    fn is_superseded(&self) -> bool {
        self.command.status == CommandStatus::Superseded
    }

    fn resolve(&mut self, outcome: CommandOutcome) {
        self.command.status = outcome.status();
        debug!(
            "command {} for light {}: {:?}",
            self.command.id, self.command.light, self.command.status
        );
        if let Some(reply) = self.reply.take() {
            // the caller may have stopped waiting
            let _ = reply.send(outcome);
        }
    }
}

#[derive(Default)]
struct LightQueue {
    in_flight: Option<Slot>,
    queued: Option<Slot>,
}

/// Serializes writes per light while letting different lights proceed in
/// parallel.
///
/// Each light has at most one command on the wire and one waiting. A newer
/// submit takes over from whatever has not been confirmed yet: the older
/// ticket resolves [`CommandOutcome::Superseded`] at once and the waiting
/// command carries the merged target, so a burst of N intents costs at most
/// two writes.
pub struct CommandCoalescer {
    link: Arc<DeviceLink>,
    reconciler: Arc<StateReconciler>,
    stats: Arc<StatusAggregator>,
    queues: Mutex<HashMap<LightId, LightQueue>>,
}

impl CommandCoalescer {
    pub fn new(
        link: Arc<DeviceLink>,
        reconciler: Arc<StateReconciler>,
        stats: Arc<StatusAggregator>,
    ) -> Self {
        CommandCoalescer {
            link,
            reconciler,
            stats,
            queues: Mutex::new(HashMap::new()),
        }
    }

    /// Queue a change for one light.
    ///
    /// Validation failures return immediately; everything else is reported
    /// through the ticket.
    pub fn submit(self: &Arc<Self>, light: LightId, target: LightTarget) -> Result<CommandTicket> {
        if !target.is_valid() {
            return Err(Error::EmptyTarget);
        }
        if self.reconciler.snapshot().light(light).is_none() {
            return Err(Error::LightNotFound(light));
        }

        let mut command = Command::new(light, target);
        let (start, ticket) = {
            let mut queues = locked(&self.queues);
            let queue = queues.entry(light).or_default();

            if let Some(mut older) = queue.queued.take() {
                command.target = merged(older.command.target, &target);
                older.resolve(CommandOutcome::Superseded);
                self.stats.record_superseded();
            } else if let Some(in_flight) = queue.in_flight.as_mut()
                && !in_flight.is_superseded()
            {
                // keeps its place on the wire; the reply will be discarded
                command.target = merged(in_flight.command.target, &target);
                in_flight.resolve(CommandOutcome::Superseded);
                self.stats.record_superseded();
            }

            let (ticket, reply) = CommandTicket::new(&command);
            let slot = Slot {
                command,
                reply: Some(reply),
            };
            let start = queue.in_flight.is_none();
            if start {
                queue.in_flight = Some(slot);
                self.reconciler.set_pending(light, true);
            } else {
                queue.queued = Some(slot);
            }
            (start, ticket)
        };

        if start {
            runtime::spawn(Arc::clone(self).dispatch(light)).detach();
        }
        Ok(ticket)
    }

    /// Whether a command for `light` is on the wire or waiting.
    pub fn is_busy(&self, light: LightId) -> bool {
        locked(&self.queues).contains_key(&light)
    }

    /// The power the newest unconfirmed command for `light` asks for.
    pub fn pending_power(&self, light: LightId) -> Option<PowerState> {
        let queues = locked(&self.queues);
        let queue = queues.get(&light)?;
        queue
            .queued
            .iter()
            .chain(queue.in_flight.iter().filter(|slot| !slot.is_superseded()))
            .find_map(|slot| slot.command.target.power)
    }

    async fn dispatch(self: Arc<Self>, light: LightId) {
        loop {
            let target = {
                let queues = locked(&self.queues);
                match queues.get(&light).and_then(|q| q.in_flight.as_ref()) {
                    Some(slot) => slot.command.target,
                    None => return,
                }
            };

            let request = Request::set_light(light, &target);
            let result = self.link.send_parsed::<DeviceLight>(&request).await;
            let acked_at = Instant::now();

            let (finished, more) = {
                let mut queues = locked(&self.queues);
                let Some(queue) = queues.get_mut(&light) else {
                    return;
                };
                let finished = queue.in_flight.take();
                queue.in_flight = queue.queued.take();
                let more = queue.in_flight.is_some();

                let superseded = finished.as_ref().is_none_or(Slot::is_superseded);
                if !superseded && let Ok(device) = &result {
                    self.reconciler.apply_ack(light, device.light_state(), acked_at);
                }
                if !more {
                    queues.remove(&light);
                    self.reconciler.set_pending(light, false);
                }
                (finished, more)
            };

            match finished {
                Some(slot) if slot.is_superseded() => {
                    debug!("light {}: reply to superseded command discarded", light);
                }
                Some(mut slot) => slot.resolve(match result {
                    Ok(device) => CommandOutcome::Acked(device.light_state()),
                    Err(e) => CommandOutcome::Failed(e),
                }),
                None => {}
            }

            if !more {
                return;
            }
        }
    }
}

fn merged(mut older: LightTarget, newer: &LightTarget) -> LightTarget {
    older.merge(newer);
    older
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackoffConfig, ControllerConfig};
    use crate::protocol::LightsReport;
    use crate::testing::MockModule;
    use crate::types::Brightness;
    use std::time::Duration;

    struct Rig {
        module: Arc<MockModule>,
        reconciler: Arc<StateReconciler>,
        stats: Arc<StatusAggregator>,
        coalescer: Arc<CommandCoalescer>,
    }

    async fn rig(lights: u16) -> Rig {
        let module = Arc::new(MockModule::with_tables(lights));
        let stats = Arc::new(StatusAggregator::default());
        let reconciler = Arc::new(StateReconciler::new(None));
        let config = ControllerConfig {
            request_timeout: Duration::from_millis(100),
            backoff: BackoffConfig {
                base: Duration::from_millis(10),
                cap: Duration::from_millis(50),
            },
            ..ControllerConfig::default()
        };
        let link = Arc::new(DeviceLink::new(
            module.clone(),
            config,
            stats.clone(),
            reconciler.clone(),
        ));

        let taken_at = Instant::now();
        let report: LightsReport = link.send_parsed(&Request::GetLights).await.unwrap();
        reconciler.apply_poll(&report, taken_at);

        let coalescer = Arc::new(CommandCoalescer::new(link, reconciler.clone(), stats.clone()));
        Rig {
            module,
            reconciler,
            stats,
            coalescer,
        }
    }

    fn level(value: u8) -> LightTarget {
        LightTarget::brightness(Brightness::create(value).unwrap())
    }

    #[tokio::test]
    async fn test_burst_collapses_to_two_writes() {
        let rig = rig(1).await;
        rig.module.delay_light(1, Duration::from_millis(20));

        let mut tickets = Vec::new();
        for value in [10, 20, 30, 40, 50, 60, 70] {
            tickets.push(rig.coalescer.submit(LightId(1), level(value)).unwrap());
        }

        let last = tickets.pop().unwrap();
        for ticket in tickets {
            assert!(ticket.outcome().await.is_superseded());
        }
        let state = last.outcome().await.into_result().unwrap();
        assert_eq!(state.brightness.value(), 70);

        assert!(rig.module.writes(1) <= 2);
        assert_eq!(rig.module.light(1).unwrap().brightness.value(), 70);

        let snap = rig.reconciler.snapshot();
        let light = snap.light(LightId(1)).unwrap();
        assert_eq!(light.brightness().value(), 70);
        assert!(!light.is_pending());
        assert_eq!(rig.stats.counters().commands_superseded, 6);
    }

    #[tokio::test]
    async fn test_superseded_fields_are_merged() {
        let rig = rig(1).await;
        rig.module.delay_light(1, Duration::from_millis(20));

        let first = rig.coalescer.submit(LightId(1), LightTarget::power(PowerState::On)).unwrap();
        let second = rig.coalescer.submit(LightId(1), level(35)).unwrap();

        assert!(first.outcome().await.is_superseded());
        let state = second.outcome().await.into_result().unwrap();
        assert!(state.is_on());
        assert_eq!(state.brightness.value(), 35);
    }

    #[tokio::test]
    async fn test_lights_proceed_independently() {
        let rig = rig(2).await;
        rig.module.delay_light(1, Duration::from_millis(80));

        let slow = rig.coalescer.submit(LightId(1), LightTarget::power(PowerState::On)).unwrap();
        let fast = rig.coalescer.submit(LightId(2), LightTarget::power(PowerState::On)).unwrap();

        let started = Instant::now();
        assert!(fast.outcome().await.is_acked());
        assert!(started.elapsed() < Duration::from_millis(60));
        assert!(rig.coalescer.is_busy(LightId(1)));

        assert!(slow.outcome().await.is_acked());
        assert!(!rig.coalescer.is_busy(LightId(1)));
    }

    #[tokio::test]
    async fn test_failure_is_not_retried() {
        let rig = rig(1).await;
        rig.module.reject_light(1);

        let ticket = rig.coalescer.submit(LightId(1), LightTarget::power(PowerState::On)).unwrap();
        match ticket.outcome().await {
            CommandOutcome::Failed(Error::Device { code, .. }) => assert_eq!(code, -32602),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(rig.module.writes(1), 1);
        assert!(!rig.reconciler.snapshot().light(LightId(1)).unwrap().is_on());
    }

    #[tokio::test]
    async fn test_garbled_ack_fails_without_touching_state() {
        let rig = rig(1).await;
        rig.module.garble_light(1);

        let ticket = rig.coalescer.submit(LightId(1), LightTarget::power(PowerState::On)).unwrap();
        assert!(matches!(
            ticket.outcome().await,
            CommandOutcome::Failed(Error::JsonLoad(_))
        ));
        assert!(!rig.reconciler.snapshot().light(LightId(1)).unwrap().is_on());

        let counters = rig.stats.counters();
        assert_eq!(counters.commands_succeeded, 0);
        assert_eq!(counters.commands_failed, 1);
        assert_eq!(counters.bad_replies, 1);
    }

    #[tokio::test]
    async fn test_pending_power_follows_newest_intent() {
        let rig = rig(1).await;
        rig.module.delay_light(1, Duration::from_millis(30));
        assert_eq!(rig.coalescer.pending_power(LightId(1)), None);

        let first = rig.coalescer.submit(LightId(1), LightTarget::power(PowerState::On)).unwrap();
        assert_eq!(rig.coalescer.pending_power(LightId(1)), Some(PowerState::On));

        let second = rig.coalescer.submit(LightId(1), level(20)).unwrap();
        assert_eq!(rig.coalescer.pending_power(LightId(1)), Some(PowerState::On));

        let third = rig.coalescer.submit(LightId(1), LightTarget::power(PowerState::Off)).unwrap();
        assert_eq!(rig.coalescer.pending_power(LightId(1)), Some(PowerState::Off));

        assert!(first.outcome().await.is_superseded());
        assert!(second.outcome().await.is_superseded());
        assert!(!third.outcome().await.into_result().unwrap().is_on());
        assert_eq!(rig.coalescer.pending_power(LightId(1)), None);
    }

    #[tokio::test]
    async fn test_pending_marker_tracks_dispatch() {
        let rig = rig(1).await;
        rig.module.delay_light(1, Duration::from_millis(30));

        let ticket = rig.coalescer.submit(LightId(1), LightTarget::power(PowerState::On)).unwrap();
        assert!(rig.reconciler.snapshot().light(LightId(1)).unwrap().is_pending());

        ticket.outcome().await;
        let snap = rig.reconciler.snapshot();
        assert!(!snap.light(LightId(1)).unwrap().is_pending());
        assert!(snap.light(LightId(1)).unwrap().is_on());
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let rig = rig(1).await;
        assert_eq!(
            rig.coalescer.submit(LightId(9), LightTarget::power(PowerState::On)).unwrap_err(),
            Error::LightNotFound(LightId(9))
        );
        assert_eq!(
            rig.coalescer.submit(LightId(1), LightTarget::new()).unwrap_err(),
            Error::EmptyTarget
        );
        assert_eq!(rig.module.writes(1), 0);
    }
}
