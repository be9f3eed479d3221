//! Mutual exclusion for application submissions.
//!
//! Submitting the same order to a bank twice creates two real loan applications, so at most one
//! submission per order may be in flight at a time. The guard is owned by the submission API
//! instance and shared across server workers by cloning; it is process-local and does NOT protect
//! against a second gateway instance submitting concurrently.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex, PoisonError},
};

use crate::db_types::OrderId;

#[derive(Debug, Clone, Default)]
pub struct SubmissionGuard {
    in_flight: Arc<Mutex<HashSet<OrderId>>>,
}

impl SubmissionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the submission slot for an order. Returns `None` while another submission for the
    /// same order holds the slot. The returned permit frees the slot when dropped, so the slot is
    /// released on every exit path, including unwinds.
    pub fn acquire(&self, order_id: OrderId) -> Option<SubmissionPermit> {
        let mut held = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if held.insert(order_id) {
            Some(SubmissionPermit { order_id, in_flight: Arc::clone(&self.in_flight) })
        } else {
            None
        }
    }

    pub fn is_held(&self, order_id: OrderId) -> bool {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner).contains(&order_id)
    }
}

#[derive(Debug)]
pub struct SubmissionPermit {
    order_id: OrderId,
    in_flight: Arc<Mutex<HashSet<OrderId>>>,
}

impl Drop for SubmissionPermit {
    fn drop(&mut self) {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner).remove(&self.order_id);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn second_acquire_fails_while_held() {
        let guard = SubmissionGuard::new();
        let permit = guard.acquire(OrderId(42));
        assert!(permit.is_some());
        assert!(guard.acquire(OrderId(42)).is_none());
        assert!(guard.acquire(OrderId(43)).is_some());
    }

    #[test]
    fn permit_drop_releases_the_slot() {
        let guard = SubmissionGuard::new();
        {
            let _permit = guard.acquire(OrderId(7));
            assert!(guard.is_held(OrderId(7)));
        }
        assert!(!guard.is_held(OrderId(7)));
        assert!(guard.acquire(OrderId(7)).is_some());
    }

    #[test]
    fn released_even_when_the_holder_panics() {
        let guard = SubmissionGuard::new();
        let inner = guard.clone();
        let result = std::panic::catch_unwind(move || {
            let _permit = inner.acquire(OrderId(9));
            panic!("submission blew up");
        });
        assert!(result.is_err());
        assert!(!guard.is_held(OrderId(9)));
    }

    #[test]
    fn clones_share_the_same_slot_set() {
        let guard = SubmissionGuard::new();
        let clone = guard.clone();
        let _permit = guard.acquire(OrderId(1));
        assert!(clone.acquire(OrderId(1)).is_none());
    }
}
