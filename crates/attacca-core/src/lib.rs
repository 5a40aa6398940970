//! Real-time kernel primitives for the Attacca audio engine.
//!
//! Two building blocks shared by the audio and MIDI subsystems:
//! - [`FixedBlockReservoir`]: bridges host callbacks of arbitrary length to
//!   a processor that requires fixed-size blocks
//! - [`WaitFreeNotifier`]: listener fan-out that is safe to invoke from the
//!   real-time thread
//!
//! Nothing in this crate spawns threads or performs I/O.

mod notifier;
mod reservoir;

pub use notifier::{notifier, NotifierCaller, WaitFreeNotifier};
pub use reservoir::FixedBlockReservoir;
