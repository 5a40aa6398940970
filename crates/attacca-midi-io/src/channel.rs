//! Lock-free collection of timestamped messages from the audio thread.
//!
//! The audio callback cannot touch the scheduler's mutex, so it pushes into
//! an SPSC ring instead; a control-side thread drains the ring and feeds
//! the scheduler.

use crate::EventScheduler;
use attacca_midi::Message;
use parking_lot::Mutex;
use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};
use std::time::Instant;

const DEFAULT_CAPACITY: usize = 256;

/// A wire message paired with its intended delivery time.
#[derive(Debug, Clone)]
pub struct TimedMessage {
    pub message: Message,
    pub due: Instant,
}

/// Producer side -- push timestamped messages from the audio thread.
pub struct OutputProducer {
    producer: HeapProd<TimedMessage>,
}

impl OutputProducer {
    /// Returns `false` if the ring buffer is full.
    #[inline]
    pub fn push(&mut self, message: Message, due: Instant) -> bool {
        self.producer.try_push(TimedMessage { message, due }).is_ok()
    }
}

/// Consumer side -- drain messages from the control thread.
pub struct OutputConsumer {
    consumer: HeapCons<TimedMessage>,
}

impl OutputConsumer {
    #[inline]
    pub fn pop(&mut self) -> Option<TimedMessage> {
        self.consumer.try_pop()
    }

    pub fn drain_all(&mut self) -> Vec<TimedMessage> {
        let count = self.consumer.occupied_len();
        let mut messages = Vec::with_capacity(count);
        while let Some(m) = self.consumer.try_pop() {
            messages.push(m);
        }
        messages
    }

    #[inline]
    pub fn has_pending(&self) -> bool {
        !self.consumer.is_empty()
    }

    #[inline]
    pub fn pending_count(&self) -> usize {
        self.consumer.occupied_len()
    }
}

pub fn output_channel() -> (OutputProducer, OutputConsumer) {
    output_channel_with_capacity(DEFAULT_CAPACITY)
}

pub fn output_channel_with_capacity(capacity: usize) -> (OutputProducer, OutputConsumer) {
    let rb = HeapRb::new(capacity);
    let (producer, consumer) = rb.split();
    (
        OutputProducer { producer },
        OutputConsumer { consumer },
    )
}

/// Merges multiple `OutputConsumer`s into a single drain point.
pub struct OutputAggregator {
    consumers: Mutex<Vec<OutputConsumer>>,
}

impl OutputAggregator {
    pub fn new() -> Self {
        Self {
            consumers: Mutex::new(Vec::new()),
        }
    }

    pub fn add_consumer(&self, consumer: OutputConsumer) {
        self.consumers.lock().push(consumer);
    }

    /// Uses `try_lock` to avoid blocking the audio thread.
    pub fn drain_all(&self) -> Vec<TimedMessage> {
        let mut consumers = match self.consumers.try_lock() {
            Some(guard) => guard,
            None => return Vec::new(),
        };
        let mut all = Vec::new();
        for consumer in consumers.iter_mut() {
            all.extend(consumer.drain_all());
        }
        all
    }

    /// Drains every consumer straight into a scheduler's pending set.
    /// Returns the number of messages handed over.
    pub fn flush_into(&self, scheduler: &EventScheduler) -> usize {
        let drained = self.drain_all();
        let count = drained.len();
        for timed in drained {
            scheduler.add_event(timed.message, timed.due);
        }
        count
    }

    /// Uses `try_lock` to avoid blocking the audio thread.
    pub fn has_pending(&self) -> bool {
        match self.consumers.try_lock() {
            Some(consumers) => consumers.iter().any(|c| c.has_pending()),
            None => false,
        }
    }
}

impl Default for OutputAggregator {
    fn default() -> Self {
        Self::new()
    }
}
