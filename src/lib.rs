//! # Attacca - real-time audio re-blocking and scheduled MIDI delivery
//!
//! Umbrella crate coordinating three subsystems:
//! - **attacca-core** - real-time primitives: the fixed-block reservoir and
//!   the wait-free listener fan-out
//! - **attacca-midi** - wire types: bytestream messages, Universal MIDI
//!   Packets, protocol conversion and resolution scaling
//! - **attacca-midi-io** - delivery: the timed event scheduler, lock-free
//!   output collection and the protocol-converting output pipeline
//!
//! ## Quick start
//!
//! ```
//! use attacca::{FixedBlockReservoir, Message, PacketProtocol, ScheduleConfig, UmpOutput};
//! use std::time::{Duration, Instant};
//!
//! // Re-block a host callback into 64-sample multiples.
//! let mut reservoir = FixedBlockReservoir::new(2, 2, 64, 4);
//! let mut left = vec![0.0f32; 100];
//! let mut right = vec![0.0f32; 100];
//! let mut io = [left.as_mut_slice(), right.as_mut_slice()];
//! reservoir.push(&mut io, |channels, len| {
//!     assert_eq!(len % 64, 0);
//!     for channel in channels.iter_mut() {
//!         for sample in channel.iter_mut() {
//!             *sample *= 0.5;
//!         }
//!     }
//! });
//!
//! // Schedule a note for delivery as Universal MIDI Packets.
//! let output = UmpOutput::new(0, PacketProtocol::Midi1, ScheduleConfig::default(), |_packet: attacca::Packet| {});
//! output.start().unwrap();
//! output.send_at(Message::note_on(0, 60, 100), Instant::now() + Duration::from_millis(5));
//! output.stop();
//! ```

/// Re-export of attacca-core for direct access
pub use attacca_core as core;

/// Re-export of attacca-midi for direct access
pub use attacca_midi as midi;

/// Re-export of attacca-midi-io for direct access
pub use attacca_midi_io as midi_io;

// Real-time primitives
pub use attacca_core::{notifier, FixedBlockReservoir, NotifierCaller, WaitFreeNotifier};

// Wire types and conversion
pub use attacca_midi::{
    midi2_to_midi1, scale, Message, Midi1ToMidi2Translator, Packet, PacketProtocol,
    ProtocolConverter,
};

// Scheduled delivery
pub use attacca_midi_io::{
    output_channel, output_channel_with_capacity, ConnectionEvent, EventScheduler, EventSink,
    OutputAggregator, OutputConsumer, OutputProducer, PacketSink, ScheduleConfig, TimedMessage,
    UmpOutput,
};
