//! Error types for MIDI wire parsing.

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("empty MIDI message")]
    Empty,

    #[error("invalid status byte: {0:#04x}")]
    InvalidStatus(u8),

    #[error("truncated MIDI message: status {status:#04x} needs {expected} bytes, got {actual}")]
    Truncated {
        status: u8,
        expected: usize,
        actual: usize,
    },

    #[error("unterminated SysEx message")]
    UnterminatedSysEx,
}

pub type Result<T> = std::result::Result<T, Error>;
