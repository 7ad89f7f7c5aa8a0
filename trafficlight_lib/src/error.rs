//! Errors returned by the phase controller.

use std::time::Duration;

use thiserror::Error;

/// Controller error type.
#[derive(Debug, Error)]
pub enum Error {
    /// The configuration cannot drive a controller.
    #[error("invalid controller config: {0}")]
    InvalidConfig(String),

    /// `start` was called on a controller whose toggler is already running.
    #[error("controller {0} was already started")]
    AlreadyStarted(usize),

    /// The controller shut down while a waiter was blocked.
    #[error("controller shut down")]
    Shutdown,

    /// No green transition arrived in time.
    #[error("no green phase within {0:?}")]
    Timeout(Duration),

    /// The toggler thread could not be spawned.
    #[error("failed to spawn toggler: {0}")]
    Spawn(#[from] std::io::Error),

    /// The JSON configuration could not be parsed.
    #[error(transparent)]
    Config(#[from] serde_json::Error),
}
