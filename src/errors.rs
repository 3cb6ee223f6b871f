use std::string::FromUtf8Error;

use crate::types::LightId;

/// All error types that can occur while driving the lighting module.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The module is not connected, or the reconnect backoff has not elapsed yet.
    #[error("lighting module unreachable")]
    Unreachable,

    /// No reply arrived within the request timeout.
    #[error("lighting module did not answer in time")]
    Timeout,

    /// The module rejected the request.
    #[error("lighting module rejected the request ({code}): {message}")]
    Device { code: i32, message: String },

    /// The preset name is not part of the catalog.
    #[error("unknown preset {0:?}")]
    UnknownPreset(String),

    /// A newer command for the same light voided this one.
    #[error("command superseded by a newer one")]
    Superseded,

    /// Brightness outside of 0..=100.
    #[error("brightness {0} is outside 0..=100")]
    InvalidBrightness(i64),

    /// Attempted to submit a [`crate::LightTarget`] with nothing set.
    #[error("invalid target; no attributes set")]
    EmptyTarget,

    /// The light has never been reported by the module.
    #[error("light {0} not found")]
    LightNotFound(LightId),

    /// No light has been discovered yet.
    #[error("no lights known yet")]
    NoLights,

    /// The command was dropped before reaching an outcome.
    #[error("command cancelled before completion")]
    Cancelled,

    /// Failed to serialize data to JSON.
    #[error("failed to dump json: {0:?}")]
    JsonDump(serde_json::Error),

    /// Failed to deserialize JSON data.
    #[error("failed to load json: {0:?}")]
    JsonLoad(serde_json::Error),

    /// A network socket operation failed while talking to the module.
    #[error("socket {action} error: {err:?}")]
    Socket { action: String, err: std::io::Error },

    /// The UDP reply from the module contained invalid UTF-8.
    #[error("utf8 decoding error: {0:?}")]
    Utf8Decode(FromUtf8Error),
}

impl Error {
    /// Create a new socket error
    pub fn socket(action: &str, err: std::io::Error) -> Self {
        Error::Socket {
            action: action.to_string(),
            err,
        }
    }

    /// Create a new device error
    pub fn device(code: i32, message: &str) -> Self {
        Error::Device {
            code,
            message: message.to_string(),
        }
    }

    /// Whether the transport itself broke, as opposed to the module answering
    /// with something we did not like.
    pub(crate) fn is_transport(&self) -> bool {
        matches!(self, Error::Socket { .. })
    }
}

/// Hacky implementation of PartialEq for testing
#[cfg(test)]
impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}
