//! Applying named presets across every known light.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use log::{info, warn};

use crate::coalescer::CommandCoalescer;
use crate::command::CommandOutcome;
use crate::errors::Error;
use crate::reconciler::StateReconciler;
use crate::types::{LightId, PresetName};

type Result<T> = std::result::Result<T, Error>;

/// Result of a preset run.
#[derive(Debug)]
pub enum PresetOutcome {
    FullySucceeded,
    /// Lights whose command failed. The rest were applied; nothing is rolled
    /// back.
    PartiallyFailed(BTreeMap<LightId, Error>),
}

impl PresetOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PresetOutcome::FullySucceeded)
    }

    pub fn failures(&self) -> Option<&BTreeMap<LightId, Error>> {
        match self {
            PresetOutcome::FullySucceeded => None,
            PresetOutcome::PartiallyFailed(failures) => Some(failures),
        }
    }
}

/// Expands presets into per-light commands.
pub struct PresetEngine {
    coalescer: Arc<CommandCoalescer>,
    reconciler: Arc<StateReconciler>,
}

impl PresetEngine {
    pub fn new(coalescer: Arc<CommandCoalescer>, reconciler: Arc<StateReconciler>) -> Self {
        PresetEngine {
            coalescer,
            reconciler,
        }
    }

    /// Apply a preset by catalog name and wait for every light.
    ///
    /// A light whose command was superseded by a newer intent has been handed
    /// over to that intent and is not reported as failed.
    pub async fn apply(&self, name: &str) -> Result<PresetOutcome> {
        let preset = PresetName::parse(name)?;
        self.apply_preset(preset).await
    }

    pub async fn apply_preset(&self, preset: PresetName) -> Result<PresetOutcome> {
        let snapshot = self.reconciler.snapshot();
        if snapshot.is_empty() {
            return Err(Error::NoLights);
        }

        let mut failures = BTreeMap::new();
        let mut tickets = Vec::new();
        for light in snapshot.lights() {
            match self.coalescer.submit(light.id(), preset.target_for(light.zone())) {
                Ok(ticket) => tickets.push(ticket),
                Err(e) => {
                    failures.insert(light.id(), e);
                }
            }
        }

        let lights: Vec<LightId> = tickets.iter().map(|t| t.light()).collect();
        let outcomes = join_all(tickets.into_iter().map(|t| t.outcome())).await;
        for (light, outcome) in lights.into_iter().zip(outcomes) {
            if let CommandOutcome::Failed(e) = outcome {
                warn!("preset {}: light {} failed: {}", preset, light, e);
                failures.insert(light, e);
            }
        }

        if failures.is_empty() {
            info!("preset {} applied", preset);
            Ok(PresetOutcome::FullySucceeded)
        } else {
            Ok(PresetOutcome::PartiallyFailed(failures))
        }
    }
}
