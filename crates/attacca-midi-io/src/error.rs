//! Error types for the MIDI delivery subsystem.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("scheduler is already running")]
    AlreadyRunning,

    #[error("scheduler is not running")]
    NotRunning,

    #[error("failed to spawn scheduler thread: {0}")]
    Spawn(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
