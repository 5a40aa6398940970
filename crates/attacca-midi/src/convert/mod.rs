//! Bidirectional conversion between bytestream MIDI and Universal MIDI
//! Packets.
//!
//! A [`ProtocolConverter`] is constructed for one group and one packet
//! protocol and owns all translation state for that connection. Both
//! directions are deterministic and order-preserving for a fixed input
//! sequence; [`ProtocolConverter::reset`] must be called when the
//! underlying connection is reestablished so partial SysEx or parameter-
//! number state cannot leak across a reconnect.

mod bytestream;
mod midi1_to_midi2;
mod midi2_to_midi1;

pub(crate) use bytestream::bytestream_to_midi1;
pub use bytestream::UmpToBytestream;
pub use midi1_to_midi2::Midi1ToMidi2Translator;
pub use midi2_to_midi1::midi2_to_midi1;

use crate::{Message, Packet};

/// Packet wire format spoken by the far side of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketProtocol {
    /// Universal packets carrying MIDI 1.0 channel voice messages.
    Midi1,
    /// Universal packets carrying MIDI 2.0 channel voice messages.
    Midi2,
}

/// Stateful two-way translator between bytestream messages and packets.
pub struct ProtocolConverter {
    group: u8,
    protocol: PacketProtocol,
    midi1_to_midi2: Midi1ToMidi2Translator,
    ump_to_bytes: UmpToBytestream,
}

impl ProtocolConverter {
    pub fn new(group: u8, protocol: PacketProtocol) -> Self {
        Self {
            group: group & 0xF,
            protocol,
            midi1_to_midi2: Midi1ToMidi2Translator::new(),
            ump_to_bytes: UmpToBytestream::new(),
        }
    }

    pub fn group(&self) -> u8 {
        self.group
    }

    pub fn protocol(&self) -> PacketProtocol {
        self.protocol
    }

    /// Converts one bytestream message to zero or more packets in this
    /// converter's protocol.
    pub fn to_packets<F>(&mut self, message: &Message, mut emit: F)
    where
        F: FnMut(Packet),
    {
        match self.protocol {
            PacketProtocol::Midi1 => bytestream_to_midi1(self.group, message, emit),
            PacketProtocol::Midi2 => {
                let translator = &mut self.midi1_to_midi2;
                bytestream_to_midi1(self.group, message, |packet| {
                    translator.dispatch(&packet, &mut emit);
                });
            }
        }
    }

    /// Converts one packet to zero or more bytestream messages. SysEx
    /// spanning several packets is emitted once complete.
    pub fn to_bytestream<F>(&mut self, packet: &Packet, mut emit: F)
    where
        F: FnMut(Message),
    {
        match self.protocol {
            PacketProtocol::Midi1 => self.ump_to_bytes.dispatch(packet, emit),
            PacketProtocol::Midi2 => {
                let assembler = &mut self.ump_to_bytes;
                midi2_to_midi1(packet, |midi1| {
                    assembler.dispatch(&midi1, &mut emit);
                });
            }
        }
    }

    /// Drops all partial translation state. Call on reconnect.
    pub fn reset(&mut self) {
        self.midi1_to_midi2.reset();
        self.ump_to_bytes.reset();
    }
}
