//! Wait-free listener fan-out.
//!
//! A registry whose `call` side can be driven from a real-time thread:
//! it never takes the management lock, never allocates, and completes in a
//! bounded number of steps regardless of concurrent `add`/`remove` activity.
//! Management operations run on ordinary threads and may block briefly.
//!
//! Each registered listener is exposed through a shared, reference-counted
//! atomic slot holding the listener's address with the low bit reserved as
//! an "in use" tag. `remove` clears the slot (waiting out any in-flight
//! invocation) before the listener is dropped, so the calling side can
//! never observe a dangling pointer.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::trace;

const IN_USE_BIT: usize = 1;

/// Pointer-sized slot: 0 = empty, otherwise the listener address, with the
/// low bit set while the calling side is inside the listener.
struct ListenerSlot {
    ptr: AtomicUsize,
}

struct Registration<L> {
    listener: Arc<L>,
    slot: Arc<ListenerSlot>,
}

struct Shared<L> {
    /// Management side only. Never touched by `call`.
    members: Mutex<HashMap<usize, Registration<L>>>,
    /// Snapshot prepared by `add`/`remove`, adopted by `call` via try-lock.
    staged: Mutex<Option<Arc<[Arc<ListenerSlot>]>>>,
}

/// Creates a connected management handle / calling handle pair.
///
/// The split encodes the concurrency contract in the types: any number of
/// threads may `add`/`remove` through (clones of) the [`WaitFreeNotifier`],
/// while the single [`NotifierCaller`] is moved to the real-time thread.
pub fn notifier<L: Send + Sync>() -> (WaitFreeNotifier<L>, NotifierCaller<L>) {
    let shared = Arc::new(Shared {
        members: Mutex::new(HashMap::new()),
        staged: Mutex::new(None),
    });
    let caller = NotifierCaller {
        shared: Arc::clone(&shared),
        active: Arc::new([]),
        _not_sync: PhantomData,
    };
    (WaitFreeNotifier { shared }, caller)
}

/// Management side: registration and removal of listeners.
pub struct WaitFreeNotifier<L> {
    shared: Arc<Shared<L>>,
}

impl<L> Clone for WaitFreeNotifier<L> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<L: Send + Sync> WaitFreeNotifier<L> {
    /// Registers a listener. Identity is the `Arc` address; registering the
    /// same `Arc` twice is a programmer error (debug assertion, no-op in
    /// release).
    ///
    /// Panics if the listener address has its low bit set; the tag bit
    /// requires at least 2-byte-aligned listener storage.
    pub fn add(&self, listener: Arc<L>) {
        let addr = Arc::as_ptr(&listener) as usize;
        assert_eq!(
            addr & IN_USE_BIT,
            0,
            "listener storage must be at least 2-byte aligned"
        );

        let mut members = self.shared.members.lock();
        if members.contains_key(&addr) {
            debug_assert!(false, "listener is already registered");
            return;
        }
        let slot = Arc::new(ListenerSlot {
            ptr: AtomicUsize::new(addr),
        });
        members.insert(addr, Registration { listener, slot });
        trace!(listeners = members.len(), "listener added");
        self.stage_snapshot(&members);
    }

    /// Unregisters a listener, waiting out any invocation that is currently
    /// running on the calling side. May block briefly; never blocks the
    /// calling side. Unknown listeners are ignored.
    pub fn remove(&self, listener: &Arc<L>) {
        let addr = Arc::as_ptr(listener) as usize;

        let mut members = self.shared.members.lock();
        let Some(registration) = members.remove(&addr) else {
            return;
        };

        // Clear the shared slot first. If the calling side is mid-invocation
        // the CAS fails against the tagged value; back off until it clears.
        loop {
            match registration.slot.ptr.compare_exchange(
                addr,
                0,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(0) => break,
                Err(current) => {
                    debug_assert_eq!(current, addr | IN_USE_BIT);
                    std::hint::spin_loop();
                    std::thread::yield_now();
                }
            }
        }

        trace!(listeners = members.len(), "listener removed");
        self.stage_snapshot(&members);
        // The listener Arc drops here, after the slot no longer exposes it.
        drop(registration);
    }

    pub fn len(&self) -> usize {
        self.shared.members.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.members.lock().is_empty()
    }

    fn stage_snapshot(&self, members: &HashMap<usize, Registration<L>>) {
        let snapshot: Arc<[Arc<ListenerSlot>]> =
            members.values().map(|r| Arc::clone(&r.slot)).collect();
        *self.shared.staged.lock() = Some(snapshot);
    }
}

/// Calling side: owned by exactly one thread (typically the real-time one).
pub struct NotifierCaller<L> {
    shared: Arc<Shared<L>>,
    active: Arc<[Arc<ListenerSlot>]>,
    // `call` takes &mut self; keep the type !Sync so a shared reference
    // cannot be used to smuggle calls onto a second thread.
    _not_sync: PhantomData<std::cell::Cell<()>>,
}

impl<L: Send + Sync> NotifierCaller<L> {
    /// Invokes `f` once per registered listener.
    ///
    /// Never blocks and never allocates: the freshest snapshot is adopted
    /// only if its lock is free (otherwise the previous active list is
    /// used -- a listener removed in the meantime is still skipped, because
    /// removal clears the shared slot itself). Bounded work per listener.
    pub fn call<F>(&mut self, mut f: F)
    where
        F: FnMut(&L),
    {
        if let Some(mut staged) = self.shared.staged.try_lock() {
            if let Some(next) = staged.take() {
                self.active = next;
            }
        }

        for slot in self.active.iter() {
            let ptr = slot.ptr.load(Ordering::Acquire);
            if ptr == 0 || ptr & IN_USE_BIT != 0 {
                continue;
            }
            if slot
                .ptr
                .compare_exchange(ptr, ptr | IN_USE_BIT, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                // Safety: the registration holds the Arc<L> alive and
                // `remove` cannot clear the slot while the tag bit is set.
                let listener = unsafe { &*(ptr as *const L) };
                f(listener);
                slot.ptr.store(ptr, Ordering::Release);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;
    use std::thread;

    struct Counter {
        hits: AtomicUsize,
    }

    impl Counter {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                hits: AtomicUsize::new(0),
            })
        }

        fn hits(&self) -> usize {
            self.hits.load(Ordering::SeqCst)
        }
    }

    fn bump(c: &Counter) {
        c.hits.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn added_listeners_are_invoked() {
        let (notifier, mut caller) = notifier::<Counter>();
        let a = Counter::new();
        let b = Counter::new();
        notifier.add(Arc::clone(&a));
        notifier.add(Arc::clone(&b));

        caller.call(bump);
        caller.call(bump);

        assert_eq!(a.hits(), 2);
        assert_eq!(b.hits(), 2);
    }

    #[test]
    fn removed_listener_is_not_invoked() {
        let (notifier, mut caller) = notifier::<Counter>();
        let a = Counter::new();
        let b = Counter::new();
        notifier.add(Arc::clone(&a));
        notifier.add(Arc::clone(&b));

        caller.call(bump);
        notifier.remove(&a);
        caller.call(bump);

        assert_eq!(a.hits(), 1);
        assert_eq!(b.hits(), 2);
    }

    #[test]
    fn removal_is_seen_even_with_a_stale_active_list() {
        // Hold the staged-snapshot lock so `call` cannot adopt the fresh
        // snapshot and must iterate its previous active list. The removed
        // listener's slot has been cleared, so it is skipped anyway.
        let (notifier, mut caller) = notifier::<Counter>();
        let a = Counter::new();
        notifier.add(Arc::clone(&a));
        caller.call(bump);
        assert_eq!(a.hits(), 1);

        notifier.remove(&a);
        let guard = notifier.shared.staged.lock();
        caller.call(bump);
        drop(guard);

        assert_eq!(a.hits(), 1);
    }

    #[test]
    fn call_on_empty_registry_is_a_no_op() {
        let (_notifier, mut caller) = notifier::<Counter>();
        caller.call(bump);
    }

    #[test]
    fn remove_unknown_listener_is_ignored() {
        let (notifier, mut caller) = notifier::<Counter>();
        let a = Counter::new();
        notifier.remove(&a);
        caller.call(bump);
        assert_eq!(a.hits(), 0);
        assert!(notifier.is_empty());
    }

    #[test]
    fn concurrent_add_remove_during_calls() {
        let (notifier, mut caller) = notifier::<Counter>();
        let seed = Counter::new();
        notifier.add(Arc::clone(&seed));

        let barrier = Arc::new(Barrier::new(2));
        let manage = {
            let notifier = notifier.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..500 {
                    let l = Counter::new();
                    notifier.add(Arc::clone(&l));
                    notifier.remove(&l);
                }
            })
        };

        barrier.wait();
        for _ in 0..2000 {
            caller.call(bump);
        }
        manage.join().unwrap();

        assert_eq!(seed.hits(), 2000);
        assert_eq!(notifier.len(), 1);
    }
}
