//! MIDI wire types for the Attacca audio engine.
//!
//! - [`Message`]: legacy bytestream MIDI message
//! - [`Packet`]: Universal MIDI Packet (1, 2 or 4 words)
//! - [`ProtocolConverter`]: bidirectional bytestream <-> packet translation
//!   with a fixed packet protocol per instance
//! - [`scale`]: 7/14-bit <-> 8/16/32-bit resolution scaling
//!
//! Everything here is pure data and state machines: no threads, no I/O.

pub mod error;
pub use error::{Error, Result};

mod message;
pub use message::Message;

mod packet;
pub use packet::Packet;

pub mod scale;

pub mod convert;
pub use convert::{midi2_to_midi1, Midi1ToMidi2Translator, PacketProtocol, ProtocolConverter};
