//! Keyed trailing-edge debouncer.
//!
//! Each key holds at most one pending value. A push replaces the pending
//! value and restarts that key's quiet period; the value is emitted once the
//! key has been quiet for the whole period. Once emitted the value is gone,
//! so a push arriving while the previous value is being handled starts a new
//! cycle instead of cancelling it.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

/// Quiet period for code-block edits.
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(1000);

struct Pending<V> {
    generation: u64,
    value: V,
}

struct Slots<K, V> {
    next_generation: u64,
    pending: HashMap<K, Pending<V>>,
}

/// Debounces values per key onto an output channel.
pub struct Debouncer<K, V> {
    quiet: Duration,
    output: mpsc::UnboundedSender<V>,
    slots: Arc<Mutex<Slots<K, V>>>,
}

impl<K, V> Debouncer<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Send + 'static,
{
    /// Create a debouncer emitting onto `output` after `quiet`.
    pub fn new(quiet: Duration, output: mpsc::UnboundedSender<V>) -> Self {
        Self {
            quiet,
            output,
            slots: Arc::new(Mutex::new(Slots {
                next_generation: 0,
                pending: HashMap::new(),
            })),
        }
    }

    /// The configured quiet period.
    #[must_use]
    pub const fn quiet_period(&self) -> Duration {
        self.quiet
    }

    /// Replace the pending value for `key` and restart its quiet period.
    ///
    /// Must be called within a Tokio runtime.
    pub fn push(&self, key: K, value: V) {
        let generation = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.next_generation += 1;
            let generation = slots.next_generation;
            slots
                .pending
                .insert(key.clone(), Pending { generation, value });
            generation
        };

        let deadline = Instant::now() + self.quiet;
        let slots = Arc::clone(&self.slots);
        let output = self.output.clone();
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let ready = {
                let mut slots = slots.lock().unwrap_or_else(PoisonError::into_inner);
                match slots.pending.get(&key) {
                    Some(pending) if pending.generation == generation => {
                        slots.pending.remove(&key).map(|p| p.value)
                    }
                    // Superseded by a later push, or already flushed.
                    _ => None,
                }
            };
            if let Some(value) = ready {
                let _ = output.send(value);
            }
        });
    }

    /// Drop the pending value for `key`. Returns whether one was pending.
    pub fn cancel(&self, key: &K) -> bool {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .remove(key)
            .is_some()
    }

    /// Drop every pending value. Returns how many were pending.
    pub fn clear(&self) -> usize {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let count = slots.pending.len();
        slots.pending.clear();
        count
    }

    /// Number of keys with a pending value.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .len()
    }
}

impl<K, V> std::fmt::Debug for Debouncer<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debouncer")
            .field("quiet", &self.quiet)
            .finish_non_exhaustive()
    }
}
