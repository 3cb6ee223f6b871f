//! Commands and their outcomes.

use std::time::Instant;

use futures::channel::oneshot;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::Error;
use crate::types::{LightId, LightState, LightTarget};

/// Where a command is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Pending,
    Acked,
    Failed,
    Superseded,
}

/// A requested change for one light, owned by the coalescer until resolved.
#[derive(Debug, Clone)]
pub struct Command {
    pub(crate) id: Uuid,
    pub(crate) light: LightId,
    pub(crate) target: LightTarget,
    pub(crate) submitted_at: Instant,
    pub(crate) status: CommandStatus,
}

impl Command {
    pub(crate) fn new(light: LightId, target: LightTarget) -> Self {
        Command {
            id: Uuid::new_v4(),
            light,
            target,
            submitted_at: Instant::now(),
            status: CommandStatus::Pending,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn light(&self) -> LightId {
        self.light
    }

    pub fn target(&self) -> LightTarget {
        self.target
    }

    pub fn submitted_at(&self) -> Instant {
        self.submitted_at
    }

    pub fn status(&self) -> CommandStatus {
        self.status
    }
}

/// How a submitted command ended.
#[derive(Debug)]
pub enum CommandOutcome {
    /// The module confirmed the write with this state.
    Acked(LightState),
    /// The write did not happen, or its result is unknown. Never retried.
    Failed(Error),
    /// A newer command for the same light took over.
    Superseded,
}

impl CommandOutcome {
    pub fn is_acked(&self) -> bool {
        matches!(self, CommandOutcome::Acked(_))
    }

    pub fn is_superseded(&self) -> bool {
        matches!(self, CommandOutcome::Superseded)
    }

    pub fn status(&self) -> CommandStatus {
        match self {
            CommandOutcome::Acked(_) => CommandStatus::Acked,
            CommandOutcome::Failed(_) => CommandStatus::Failed,
            CommandOutcome::Superseded => CommandStatus::Superseded,
        }
    }

    /// Flatten into a `Result`, with supersession as [`Error::Superseded`].
    pub fn into_result(self) -> Result<LightState, Error> {
        match self {
            CommandOutcome::Acked(state) => Ok(state),
            CommandOutcome::Failed(e) => Err(e),
            CommandOutcome::Superseded => Err(Error::Superseded),
        }
    }
}

/// Handle returned by a submit; resolves once the command has an outcome.
#[derive(Debug)]
pub struct CommandTicket {
    id: Uuid,
    light: LightId,
    receiver: oneshot::Receiver<CommandOutcome>,
}

impl CommandTicket {
    pub(crate) fn new(command: &Command) -> (Self, oneshot::Sender<CommandOutcome>) {
        let (sender, receiver) = oneshot::channel();
        let ticket = CommandTicket {
            id: command.id,
            light: command.light,
            receiver,
        };
        (ticket, sender)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn light(&self) -> LightId {
        self.light
    }

    /// Wait for the outcome. A command dropped without one (controller shut
    /// down) reports [`Error::Cancelled`].
    pub async fn outcome(self) -> CommandOutcome {
        self.receiver
            .await
            .unwrap_or(CommandOutcome::Failed(Error::Cancelled))
    }
}
