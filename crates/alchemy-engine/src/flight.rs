//! Per-key single-flight.
//!
//! The first caller to acquire a key leads; later callers for the same key
//! wait until the leader's guard drops and then re-check the store, where
//! the leader's result now lives. Dropping a guard (including through
//! cancellation) hands leadership to the next waiter.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One key's lock and the number of leaders plus waiters that hold it.
struct Slot {
    lock: Arc<AsyncMutex<()>>,
    users: usize,
}

type Slots = Arc<Mutex<HashMap<String, Slot>>>;

#[derive(Clone, Default)]
pub struct Flight {
    slots: Slots,
}

/// Counted use of a slot. The last one out removes the slot, whether it
/// led, waited, or was cancelled while waiting.
struct Membership {
    key: String,
    slots: Slots,
}

impl Drop for Membership {
    fn drop(&mut self) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(slot) = slots.get_mut(&self.key) {
            slot.users = slot.users.saturating_sub(1);
            if slot.users == 0 {
                slots.remove(&self.key);
            }
        }
    }
}

pub struct FlightGuard {
    _held: OwnedMutexGuard<()>,
    _membership: Membership,
}

impl Flight {
    pub async fn acquire(&self, key: &str) -> FlightGuard {
        let (lock, membership) = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            let slot = slots.entry(key.to_string()).or_insert_with(|| Slot {
                lock: Arc::default(),
                users: 0,
            });
            slot.users += 1;
            let membership = Membership {
                key: key.to_string(),
                slots: self.slots.clone(),
            };
            (slot.lock.clone(), membership)
        };
        let held = lock.lock_owned().await;
        FlightGuard {
            _held: held,
            _membership: membership,
        }
    }

    /// Keys with a leader or waiters.
    pub fn in_flight(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
