//! crates/progress_core/src/gate.rs
//!
//! A keyed "already in progress" gate. Holding a `GateGuard` marks its key as
//! busy; dropping the guard frees it again, optionally after a cooldown.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    #[error("an identical request is already in progress")]
    InFlight,
    #[error("please wait before trying again")]
    CoolingDown,
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Busy,
    ReleasedAt(Instant),
}

#[derive(Debug)]
struct Inner<K> {
    slots: Mutex<HashMap<K, Slot>>,
    cooldown: Duration,
}

impl<K> Inner<K> {
    fn slots(&self) -> MutexGuard<'_, HashMap<K, Slot>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Cheap to clone; clones share the same set of keys.
#[derive(Debug)]
pub struct InFlightGate<K> {
    inner: Arc<Inner<K>>,
}

impl<K> Clone for InFlightGate<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: Eq + Hash + Clone> InFlightGate<K> {
    pub fn new() -> Self {
        Self::with_cooldown(Duration::ZERO)
    }

    /// Keeps a key blocked for `cooldown` after its guard is dropped.
    pub fn with_cooldown(cooldown: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                slots: Mutex::new(HashMap::new()),
                cooldown,
            }),
        }
    }

    pub fn try_acquire(&self, key: K) -> Result<GateGuard<K>, GateError> {
        self.try_acquire_at(key, Instant::now())
    }

    pub fn try_acquire_at(&self, key: K, now: Instant) -> Result<GateGuard<K>, GateError> {
        let mut slots = self.inner.slots();
        let cooldown = self.inner.cooldown;
        slots.retain(|_, slot| match slot {
            Slot::Busy => true,
            Slot::ReleasedAt(at) => now.saturating_duration_since(*at) < cooldown,
        });
        match slots.get(&key) {
            Some(Slot::Busy) => return Err(GateError::InFlight),
            Some(Slot::ReleasedAt(_)) => return Err(GateError::CoolingDown),
            _ => {}
        }
        slots.insert(key.clone(), Slot::Busy);
        Ok(GateGuard {
            inner: Arc::clone(&self.inner),
            key: Some(key),
        })
    }

    pub fn is_busy(&self, key: &K) -> bool {
        matches!(self.inner.slots().get(key), Some(Slot::Busy))
    }
}

impl<K: Eq + Hash + Clone> Default for InFlightGate<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases its key when dropped.
#[derive(Debug)]
pub struct GateGuard<K: Eq + Hash> {
    inner: Arc<Inner<K>>,
    key: Option<K>,
}

impl<K: Eq + Hash> GateGuard<K> {
    /// Releases the key as of `now`, which starts the cooldown from that instant.
    pub fn release_at(mut self, now: Instant) {
        self.release(now);
    }

    fn release(&mut self, now: Instant) {
        if let Some(key) = self.key.take() {
            let mut slots = self.inner.slots();
            if self.inner.cooldown.is_zero() {
                slots.remove(&key);
            } else {
                slots.insert(key, Slot::ReleasedAt(now));
            }
        }
    }
}

impl<K: Eq + Hash> Drop for GateGuard<K> {
    fn drop(&mut self) {
        self.release(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_request_for_same_key_is_rejected_while_in_flight() {
        let gate = InFlightGate::new();
        let guard = gate.try_acquire("conv-1").unwrap();
        assert_eq!(gate.try_acquire("conv-1").unwrap_err(), GateError::InFlight);
        assert!(gate.is_busy(&"conv-1"));
        drop(guard);
        assert!(!gate.is_busy(&"conv-1"));
        assert!(gate.try_acquire("conv-1").is_ok());
    }

    #[test]
    fn different_keys_do_not_block_each_other() {
        let gate = InFlightGate::new();
        let _a = gate.try_acquire(("user", "like")).unwrap();
        assert!(gate.try_acquire(("user", "dislike")).is_ok());
    }

    #[test]
    fn cooldown_starts_when_the_guard_is_released() {
        let gate = InFlightGate::with_cooldown(Duration::from_secs(1));
        let start = Instant::now();
        let guard = gate.try_acquire_at(7u32, start).unwrap();
        guard.release_at(start + Duration::from_millis(200));

        let too_soon = start + Duration::from_millis(900);
        assert_eq!(gate.try_acquire_at(7, too_soon).unwrap_err(), GateError::CoolingDown);

        let later = start + Duration::from_millis(1_300);
        assert!(gate.try_acquire_at(7, later).is_ok());
    }

    #[test]
    fn expired_cooldowns_are_forgotten() {
        let gate = InFlightGate::with_cooldown(Duration::from_secs(1));
        let start = Instant::now();
        for key in 0..100u32 {
            gate.try_acquire_at(key, start).unwrap().release_at(start);
        }
        assert_eq!(gate.inner.slots().len(), 100);

        let busy = gate.try_acquire_at(500, start + Duration::from_secs(2)).unwrap();
        assert_eq!(gate.inner.slots().len(), 1);
        assert!(gate.is_busy(&500));
        drop(busy);
    }

    #[test]
    fn clones_share_state() {
        let gate = InFlightGate::new();
        let other = gate.clone();
        let _guard = gate.try_acquire(1u8).unwrap();
        assert!(other.is_busy(&1));
    }
}
