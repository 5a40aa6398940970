//! Timed message delivery on a dedicated thread.
//!
//! Producers hand the scheduler timestamped messages; its thread sleeps
//! until the earliest one is close to due, catches up to the exact due
//! time, and delivers it to the sink. Messages that surface far past their
//! due time (after a stall such as system sleep) are dropped rather than
//! flooding the sink with backlog.

use crate::error::{Error, Result};
use attacca_midi::Message;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};
use tracing::debug;

/// Timing policy for a scheduler.
///
/// The defaults match common OS scheduler granularities, but the right
/// values are platform- and use-case-dependent, so they are configuration
/// rather than constants.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleConfig {
    /// The thread wakes this far ahead of an event's due time and then
    /// waits out the remainder precisely.
    pub look_ahead: Duration,
    /// An event this far past due when it surfaces is dropped, not
    /// delivered.
    pub stale_after: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            look_ahead: Duration::from_millis(20),
            stale_after: Duration::from_millis(200),
        }
    }
}

/// Delivery end of a scheduler. Implemented for any `Fn(Message)`.
///
/// Called on the scheduler thread; failures belong to the sink (delivery is
/// fire-and-forget from the scheduler's point of view).
pub trait EventSink: Send + Sync {
    fn deliver(&self, message: Message);
}

impl<F> EventSink for F
where
    F: Fn(Message) + Send + Sync,
{
    fn deliver(&self, message: Message) {
        self(message)
    }
}

struct Pending {
    due: Instant,
    seq: u64,
    message: Message,
}

// Ordered by due time; the insertion sequence number breaks ties so equal
// timestamps dispatch in insertion order.
impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.due, self.seq).cmp(&(other.due, other.seq))
    }
}

#[derive(Default)]
struct Queue {
    heap: BinaryHeap<Reverse<Pending>>,
    next_seq: u64,
    shutdown: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    available: Condvar,
    config: ScheduleConfig,
    sink: Box<dyn EventSink>,
    worker_id: Mutex<Option<ThreadId>>,
}

// The worker thread owns only `shared`, never `Inner`, so dropping the last
// scheduler handle can observe and join it.
struct Inner {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
    running: AtomicBool,
}

/// Dispatches timestamped messages from a dedicated thread.
///
/// Clone freely; all clones drive the same scheduler. Dropping the last
/// handle stops the thread.
#[derive(Clone)]
pub struct EventScheduler {
    inner: Arc<Inner>,
}

impl EventScheduler {
    pub fn new(config: ScheduleConfig, sink: impl EventSink + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                shared: Arc::new(Shared {
                    queue: Mutex::new(Queue::default()),
                    available: Condvar::new(),
                    config,
                    sink: Box::new(sink),
                    worker_id: Mutex::new(None),
                }),
                thread: Mutex::new(None),
                running: AtomicBool::new(false),
            }),
        }
    }

    /// Spawns the dispatch thread. Errors if already running.
    pub fn start(&self) -> Result<()> {
        let mut thread = self.inner.thread.lock();
        if thread.is_some() {
            return Err(Error::AlreadyRunning);
        }

        self.inner.shared.queue.lock().shutdown = false;
        let shared = Arc::clone(&self.inner.shared);
        let handle = thread::Builder::new()
            .name("attacca-scheduler".to_string())
            .spawn(move || {
                *shared.worker_id.lock() = Some(thread::current().id());
                run(&shared);
                *shared.worker_id.lock() = None;
            })?;
        *thread = Some(handle);
        self.inner.running.store(true, Ordering::SeqCst);
        debug!("scheduler started");
        Ok(())
    }

    /// Signals shutdown, wakes the thread and joins it; after `stop`
    /// returns no further dispatches occur and the pending set is drained.
    ///
    /// Safe to call from the sink callback on the scheduler's own thread:
    /// that case marks shutdown and returns without joining (the thread
    /// exits once the callback returns).
    pub fn stop(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        {
            let mut queue = self.inner.shared.queue.lock();
            queue.shutdown = true;
        }
        self.inner.shared.available.notify_all();

        let self_stop = *self.inner.shared.worker_id.lock() == Some(thread::current().id());
        if self_stop {
            debug!("scheduler stop requested from its own thread");
            return;
        }
        if let Some(handle) = self.inner.thread.lock().take() {
            let _ = handle.join();
            debug!("scheduler stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Queues `message` for delivery at `due`. Safe from any number of
    /// producer threads. Scheduling on a stopped scheduler is a programmer
    /// error (debug assertion); the message is queued but will not be
    /// delivered until `start`.
    pub fn add_event(&self, message: Message, due: Instant) {
        debug_assert!(self.is_running(), "add_event on a stopped scheduler");
        {
            let mut queue = self.inner.shared.queue.lock();
            let seq = queue.next_seq;
            queue.next_seq += 1;
            queue.heap.push(Reverse(Pending { due, seq, message }));
        }
        self.inner.shared.available.notify_one();
    }

    /// Empties the pending set without stopping the thread.
    pub fn clear_pending(&self) {
        self.inner.shared.queue.lock().heap.clear();
    }

    pub fn pending_len(&self) -> usize {
        self.inner.shared.queue.lock().heap.len()
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Last handle gone; the worker owns only `shared`, so signal it and
        // join unless we are the worker (a sink holding the final clone).
        self.running.store(false, Ordering::SeqCst);
        self.shared.queue.lock().shutdown = true;
        self.shared.available.notify_all();

        let self_stop = *self.shared.worker_id.lock() == Some(thread::current().id());
        if self_stop {
            return;
        }
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }
}

fn run(shared: &Shared) {
    let mut queue = shared.queue.lock();
    'main: loop {
        if queue.shutdown {
            break;
        }

        let now = Instant::now();
        let next_due = match queue.heap.peek() {
            Some(Reverse(head)) => head.due,
            None => {
                shared.available.wait(&mut queue);
                continue;
            }
        };

        // Not close enough to be worth popping: sleep until the look-ahead
        // window opens, or until a producer inserts something earlier.
        if next_due > now + shared.config.look_ahead {
            let wake_at = next_due - shared.config.look_ahead;
            shared.available.wait_until(&mut queue, wake_at);
            continue;
        }

        let Some(Reverse(mut event)) = queue.heap.pop() else {
            continue;
        };

        // Catch up to the exact due time, interruptible by shutdown, and
        // yielding to any event inserted meanwhile with an earlier due.
        loop {
            if queue.shutdown {
                break 'main;
            }
            if event.due <= Instant::now() {
                break;
            }
            let has_earlier =
                matches!(queue.heap.peek(), Some(Reverse(head)) if head.due < event.due);
            if has_earlier {
                if let Some(Reverse(earlier)) = queue.heap.pop() {
                    queue.heap.push(Reverse(event));
                    event = earlier;
                }
                continue;
            }
            shared.available.wait_until(&mut queue, event.due);
        }

        MutexGuard::unlocked(&mut queue, || {
            let late = Instant::now().saturating_duration_since(event.due);
            if late > shared.config.stale_after {
                debug!(late_ms = late.as_millis() as u64, "dropping stale event");
            } else {
                shared.sink.deliver(event.message);
            }
        });
    }

    // Drained: nothing queued survives a stop.
    queue.heap.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{unbounded, Sender};

    fn collecting_scheduler(config: ScheduleConfig) -> (EventScheduler, crossbeam_channel::Receiver<(Message, Instant)>) {
        let (tx, rx): (Sender<(Message, Instant)>, _) = unbounded();
        let scheduler = EventScheduler::new(config, move |message: Message| {
            let _ = tx.send((message, Instant::now()));
        });
        (scheduler, rx)
    }

    #[test]
    fn test_events_dispatch_in_timestamp_order() {
        let (scheduler, rx) = collecting_scheduler(ScheduleConfig::default());
        scheduler.start().unwrap();

        let origin = Instant::now();
        // Inserted out of order.
        scheduler.add_event(Message::note_on(0, 62, 100), origin + Duration::from_millis(60));
        scheduler.add_event(Message::note_on(0, 60, 100), origin + Duration::from_millis(20));
        scheduler.add_event(Message::note_on(0, 61, 100), origin + Duration::from_millis(40));

        let first = rx.recv_timeout(Duration::from_secs(2)).unwrap().0;
        let second = rx.recv_timeout(Duration::from_secs(2)).unwrap().0;
        let third = rx.recv_timeout(Duration::from_secs(2)).unwrap().0;
        scheduler.stop();

        assert_eq!(first.bytes[1], 60);
        assert_eq!(second.bytes[1], 61);
        assert_eq!(third.bytes[1], 62);
    }

    #[test]
    fn test_equal_timestamps_keep_insertion_order() {
        let (scheduler, rx) = collecting_scheduler(ScheduleConfig::default());
        scheduler.start().unwrap();

        let due = Instant::now() + Duration::from_millis(30);
        for note in [10u8, 11, 12, 13] {
            scheduler.add_event(Message::note_on(0, note, 1), due);
        }

        let notes: Vec<u8> = (0..4)
            .map(|_| rx.recv_timeout(Duration::from_secs(2)).unwrap().0.bytes[1])
            .collect();
        scheduler.stop();

        assert_eq!(notes, vec![10, 11, 12, 13]);
    }

    #[test]
    fn test_stale_events_are_dropped() {
        let (scheduler, rx) = collecting_scheduler(ScheduleConfig {
            look_ahead: Duration::from_millis(20),
            stale_after: Duration::from_millis(50),
        });
        scheduler.start().unwrap();

        // Already a second past due at insertion: must never reach the sink.
        scheduler.add_event(
            Message::note_on(0, 1, 1),
            Instant::now() - Duration::from_secs(1),
        );
        // A fresh event still gets through.
        scheduler.add_event(Message::note_on(0, 2, 2), Instant::now());

        let delivered = rx.recv_timeout(Duration::from_secs(2)).unwrap().0;
        assert_eq!(delivered.bytes[1], 2);
        assert!(rx.try_recv().is_err());
        scheduler.stop();
    }

    #[test]
    fn test_dispatch_waits_for_due_time() {
        let (scheduler, rx) = collecting_scheduler(ScheduleConfig::default());
        scheduler.start().unwrap();

        let due = Instant::now() + Duration::from_millis(80);
        scheduler.add_event(Message::note_on(0, 60, 100), due);

        let (_, delivered_at) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        scheduler.stop();

        assert!(delivered_at >= due, "dispatched before due time");
    }

    #[test]
    fn test_stop_prevents_pending_dispatch_and_drains() {
        let (scheduler, rx) = collecting_scheduler(ScheduleConfig::default());
        scheduler.start().unwrap();

        scheduler.add_event(
            Message::note_on(0, 60, 100),
            Instant::now() + Duration::from_secs(60),
        );
        assert_eq!(scheduler.pending_len(), 1);

        scheduler.stop();
        assert_eq!(scheduler.pending_len(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_clear_pending_keeps_running() {
        let (scheduler, rx) = collecting_scheduler(ScheduleConfig::default());
        scheduler.start().unwrap();

        scheduler.add_event(
            Message::note_on(0, 1, 1),
            Instant::now() + Duration::from_secs(60),
        );
        scheduler.clear_pending();
        assert_eq!(scheduler.pending_len(), 0);
        assert!(scheduler.is_running());

        scheduler.add_event(Message::note_on(0, 2, 2), Instant::now());
        let delivered = rx.recv_timeout(Duration::from_secs(2)).unwrap().0;
        assert_eq!(delivered.bytes[1], 2);
        scheduler.stop();
    }

    #[test]
    fn test_start_twice_errors() {
        let (scheduler, _rx) = collecting_scheduler(ScheduleConfig::default());
        scheduler.start().unwrap();
        assert!(matches!(scheduler.start(), Err(Error::AlreadyRunning)));
        scheduler.stop();
    }

    #[test]
    fn test_restart_after_stop() {
        let (scheduler, rx) = collecting_scheduler(ScheduleConfig::default());
        scheduler.start().unwrap();
        scheduler.stop();

        scheduler.start().unwrap();
        scheduler.add_event(Message::note_on(0, 42, 1), Instant::now());
        let delivered = rx.recv_timeout(Duration::from_secs(2)).unwrap().0;
        assert_eq!(delivered.bytes[1], 42);
        scheduler.stop();
    }

    #[test]
    fn test_concurrent_producers_all_deliver() {
        let (scheduler, rx) = collecting_scheduler(ScheduleConfig::default());
        scheduler.start().unwrap();

        let origin = Instant::now() + Duration::from_millis(10);
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let scheduler = scheduler.clone();
                thread::spawn(move || {
                    for i in 0..25 {
                        scheduler.add_event(
                            Message::note_on(t, i, 1),
                            origin + Duration::from_millis(i as u64),
                        );
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let mut deliveries = Vec::new();
        for _ in 0..100 {
            deliveries.push(rx.recv_timeout(Duration::from_secs(5)).unwrap());
        }
        scheduler.stop();

        // Delivery times never regress.
        for pair in deliveries.windows(2) {
            assert!(pair[0].1 <= pair[1].1);
        }
    }

    #[test]
    fn test_self_stop_from_sink_does_not_deadlock() {
        let (tx, rx) = unbounded();
        let holder: Arc<Mutex<Option<EventScheduler>>> = Arc::new(Mutex::new(None));
        let holder_clone = Arc::clone(&holder);

        let scheduler = EventScheduler::new(ScheduleConfig::default(), move |message: Message| {
            if let Some(s) = holder_clone.lock().as_ref() {
                s.stop();
            }
            let _ = tx.send(message);
        });
        *holder.lock() = Some(scheduler.clone());

        scheduler.start().unwrap();
        scheduler.add_event(Message::note_on(0, 60, 100), Instant::now());

        let delivered = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(delivered.bytes[1], 60);

        // The worker observed shutdown after the callback; a later external
        // stop joins it.
        thread::sleep(Duration::from_millis(50));
        scheduler.stop();
        assert!(!scheduler.is_running());
    }
}
