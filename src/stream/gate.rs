//! Per-user stream concurrency gate
//!
//! Bounds how many streaming sessions a single user may hold open at once.
//! Admission is check-then-increment under one lock, so two racing
//! connections can never both slip past the ceiling. Slots are released
//! through an RAII guard, which keeps the count correct on every exit path
//! including panics and abrupt disconnects.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Tracks active stream counts per user
pub struct ConcurrencyGate {
    max_per_user: usize,
    active: Mutex<HashMap<u64, usize>>,
}

impl ConcurrencyGate {
    /// Create a gate with the given per-user ceiling
    #[must_use]
    pub fn new(max_per_user: usize) -> Self {
        Self {
            max_per_user,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Try to claim a stream slot for `user_id`
    ///
    /// Returns `None` when the user is already at the ceiling. The returned
    /// slot releases itself on drop.
    #[must_use]
    pub fn try_acquire(self: &Arc<Self>, user_id: u64) -> Option<StreamSlot> {
        let mut active = self.active.lock().ok()?;
        let count = active.entry(user_id).or_insert(0);
        if *count >= self.max_per_user {
            tracing::warn!(user_id, active = *count, "stream ceiling reached");
            return None;
        }
        *count += 1;
        tracing::debug!(user_id, active = *count, "stream slot acquired");

        Some(StreamSlot {
            gate: Arc::clone(self),
            user_id,
        })
    }

    /// Current number of active streams for a user
    #[must_use]
    pub fn active_count(&self, user_id: u64) -> usize {
        self.active
            .lock()
            .map(|active| active.get(&user_id).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    fn release(&self, user_id: u64) {
        let Ok(mut active) = self.active.lock() else {
            return;
        };
        if let Some(count) = active.get_mut(&user_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                active.remove(&user_id);
            }
        }
        tracing::debug!(user_id, "stream slot released");
    }
}

/// RAII guard for one admitted stream
///
/// Dropping the slot returns it to the gate exactly once.
pub struct StreamSlot {
    gate: Arc<ConcurrencyGate>,
    user_id: u64,
}

impl StreamSlot {
    /// User this slot was issued to
    #[must_use]
    pub const fn user_id(&self) -> u64 {
        self.user_id
    }
}

impl Drop for StreamSlot {
    fn drop(&mut self) {
        self.gate.release(self.user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_ceiling_then_rejects() {
        let gate = Arc::new(ConcurrencyGate::new(2));

        let a = gate.try_acquire(7).unwrap();
        let b = gate.try_acquire(7).unwrap();
        assert!(gate.try_acquire(7).is_none());
        assert_eq!(gate.active_count(7), 2);

        drop(a);
        let c = gate.try_acquire(7);
        assert!(c.is_some());

        drop(b);
        drop(c);
        assert_eq!(gate.active_count(7), 0);
    }

    #[test]
    fn users_are_gated_independently() {
        let gate = Arc::new(ConcurrencyGate::new(1));

        let _a = gate.try_acquire(1).unwrap();
        assert!(gate.try_acquire(1).is_none());
        assert!(gate.try_acquire(2).is_some());
    }

    #[test]
    fn slot_drop_releases_exactly_once() {
        let gate = Arc::new(ConcurrencyGate::new(1));
        drop(gate.try_acquire(3).unwrap());
        drop(gate.try_acquire(3).unwrap());
        assert_eq!(gate.active_count(3), 0);
    }

    #[test]
    fn concurrent_admissions_never_exceed_ceiling() {
        let gate = Arc::new(ConcurrencyGate::new(2));
        let admitted = Arc::new(Mutex::new(0usize));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let gate = Arc::clone(&gate);
                let admitted = Arc::clone(&admitted);
                std::thread::spawn(move || {
                    if let Some(slot) = gate.try_acquire(42) {
                        *admitted.lock().unwrap() += 1;
                        std::thread::sleep(std::time::Duration::from_millis(20));
                        drop(slot);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        // At most 2 held at once, so at most 2 in the first wave; count of
        // active streams must always end at zero.
        assert_eq!(gate.active_count(42), 0);
        assert!(*admitted.lock().unwrap() >= 2);
    }
}
