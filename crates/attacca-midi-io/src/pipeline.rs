//! Protocol-converting scheduled output.
//!
//! [`UmpOutput`] ties the pieces together: messages scheduled in bytestream
//! form are converted to the connection's packet protocol at dispatch time
//! and handed to the packet sink. When the underlying connection is torn
//! down and reestablished, [`UmpOutput::reset_connection`] drops pending
//! messages, clears converter state and fans the event out to listeners.

use crate::scheduler::{EventScheduler, ScheduleConfig};
use crate::Result;
use attacca_core::{notifier, NotifierCaller, WaitFreeNotifier};
use attacca_midi::{Message, Packet, PacketProtocol, ProtocolConverter};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Receives converted packets on the scheduler thread.
pub trait PacketSink: Send + Sync {
    fn deliver(&self, packet: Packet);
}

impl<F> PacketSink for F
where
    F: Fn(Packet) + Send + Sync,
{
    fn deliver(&self, packet: Packet) {
        self(packet)
    }
}

/// Connection-state changes fanned out to listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The connection was dropped and reestablished; stale state is gone.
    Reinitialized,
}

pub type ConnectionListener = Box<dyn Fn(ConnectionEvent) + Send + Sync>;

/// Scheduled, protocol-converted packet output.
pub struct UmpOutput {
    scheduler: EventScheduler,
    converter: Arc<Mutex<ProtocolConverter>>,
    listeners: WaitFreeNotifier<ConnectionListener>,
    caller: NotifierCaller<ConnectionListener>,
}

impl UmpOutput {
    pub fn new(
        group: u8,
        protocol: PacketProtocol,
        config: ScheduleConfig,
        sink: impl PacketSink + 'static,
    ) -> Self {
        let converter = Arc::new(Mutex::new(ProtocolConverter::new(group, protocol)));
        let dispatch_converter = Arc::clone(&converter);
        let scheduler = EventScheduler::new(config, move |message: Message| {
            let mut converter = dispatch_converter.lock();
            converter.to_packets(&message, |packet| sink.deliver(packet));
        });
        let (listeners, caller) = notifier();

        Self {
            scheduler,
            converter,
            listeners,
            caller,
        }
    }

    pub fn start(&self) -> Result<()> {
        self.scheduler.start()
    }

    pub fn stop(&self) {
        self.scheduler.stop()
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Schedules a bytestream message for conversion and delivery at `due`.
    pub fn send_at(&self, message: Message, due: Instant) {
        self.scheduler.add_event(message, due);
    }

    pub fn send_now(&self, message: Message) {
        self.scheduler.add_event(message, Instant::now());
    }

    pub fn clear_pending(&self) {
        self.scheduler.clear_pending();
    }

    pub fn pending_len(&self) -> usize {
        self.scheduler.pending_len()
    }

    /// Management handle for connection-state listeners.
    pub fn listeners(&self) -> WaitFreeNotifier<ConnectionListener> {
        self.listeners.clone()
    }

    /// Call when the underlying connection was dropped and reopened:
    /// pending messages are meaningless on the new connection, and partial
    /// translator state (SysEx in flight, latched parameter numbers) must
    /// not leak across.
    pub fn reset_connection(&mut self) {
        self.scheduler.clear_pending();
        self.converter.lock().reset();
        debug!("output connection reinitialized");
        self.caller
            .call(|listener| listener(ConnectionEvent::Reinitialized));
    }
}

impl Drop for UmpOutput {
    fn drop(&mut self) {
        self.scheduler.stop();
    }
}
