//! Timed MIDI delivery for the Attacca audio engine.
//!
//! - [`EventScheduler`]: dedicated thread that dispatches timestamped
//!   messages at (or near) their due time
//! - [`output_channel`]: lock-free collection of timestamped messages from
//!   the audio thread
//! - [`UmpOutput`]: scheduler + protocol converter composed into a
//!   packet-emitting output

pub mod error;
pub use error::{Error, Result};

mod scheduler;
pub use scheduler::{EventScheduler, EventSink, ScheduleConfig};

mod channel;
pub use channel::{
    output_channel, output_channel_with_capacity, OutputAggregator, OutputConsumer,
    OutputProducer, TimedMessage,
};

mod pipeline;
pub use pipeline::{ConnectionEvent, ConnectionListener, PacketSink, UmpOutput};
