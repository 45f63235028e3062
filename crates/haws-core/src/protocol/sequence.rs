//! Lock-free message-id allocation for one session.
//!
//! # Why ids are inactive before authentication
//!
//! The hub only accepts id-carrying commands after the handshake.  Until then
//! the allocator is *inactive* and refuses to hand out ids, which is what
//! makes "send while not authenticated" observable as a rejected send rather
//! than a frame the hub would drop.
//!
//! `auth_ok` activates the allocator with a last-used id of 0, so the first
//! request of a connection carries id 1.  Deactivation (on close) is
//! permanent in practice: a new session gets a new allocator, so ids never
//! leak across reconnects.
//!
//! # Thread safety
//!
//! The counter is one `AtomicI64`: `-1` means inactive, any other value is
//! the last id handed out.  Allocation is a single compare-and-swap loop, so
//! concurrent callers never receive the same id.

use std::sync::atomic::{AtomicI64, Ordering};

use crate::protocol::messages::MessageId;

/// Sentinel for "no authenticated connection".
const INACTIVE: i64 = -1;

/// A thread-safe, strictly increasing message-id counter scoped to one
/// session instance.
///
/// # Examples
///
/// ```rust
/// use haws_core::protocol::MessageIdAllocator;
///
/// let ids = MessageIdAllocator::new();
/// assert_eq!(ids.next(), None);
///
/// ids.activate();
/// assert_eq!(ids.next(), Some(1));
/// assert_eq!(ids.next(), Some(2));
/// ```
#[derive(Debug)]
pub struct MessageIdAllocator {
    last: AtomicI64,
}

impl MessageIdAllocator {
    /// Creates an inactive allocator.
    pub fn new() -> Self {
        Self {
            last: AtomicI64::new(INACTIVE),
        }
    }

    /// Starts allocation.  Id 0 counts as used (it marks the `auth_ok`
    /// transition), so the next id handed out is 1.
    pub fn activate(&self) {
        self.last.store(0, Ordering::SeqCst);
    }

    /// Stops allocation; every later [`next`](Self::next) returns `None`.
    pub fn deactivate(&self) {
        self.last.store(INACTIVE, Ordering::SeqCst);
    }

    /// Returns `true` while ids are being handed out.
    pub fn is_active(&self) -> bool {
        self.last.load(Ordering::SeqCst) >= 0
    }

    /// Allocates the next id, or returns `None` when inactive.
    ///
    /// Saturates at `i64::MAX` instead of wrapping, so a stale id can never be
    /// reissued within one connection.
    pub fn next(&self) -> Option<MessageId> {
        self.last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                last.checked_add(1).filter(|_| last >= 0)
            })
            .ok()
            .map(|previous| (previous + 1) as MessageId)
    }

    /// Records `id` as used when a caller supplied it explicitly, so later
    /// [`next`](Self::next) calls never hand it out.
    ///
    /// Has no effect while inactive or when `id` is not above the last id.
    /// Ids beyond `i64::MAX` saturate the allocator.
    pub fn observe(&self, id: MessageId) {
        let id = i64::try_from(id).unwrap_or(i64::MAX);
        // Err only means there was nothing to advance.
        let _ = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                (last >= 0 && id > last).then_some(id)
            });
    }

    /// Returns the last id handed out, or `None` when inactive.
    ///
    /// Useful for logging only: another task may allocate right after.
    pub fn current(&self) -> Option<MessageId> {
        let last = self.last.load(Ordering::SeqCst);
        (last >= 0).then_some(last as MessageId)
    }
}

impl Default for MessageIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_new_allocator_is_inactive() {
        // Arrange
        let ids = MessageIdAllocator::new();

        // Act / Assert
        assert!(!ids.is_active());
        assert_eq!(ids.next(), None);
        assert_eq!(ids.current(), None);
    }

    #[test]
    fn test_first_id_after_activation_is_one() {
        let ids = MessageIdAllocator::new();
        ids.activate();
        assert_eq!(ids.current(), Some(0));
        assert_eq!(ids.next(), Some(1));
    }

    #[test]
    fn test_ids_increase_strictly() {
        // Arrange
        let ids = MessageIdAllocator::new();
        ids.activate();

        // Act
        let values: Vec<MessageId> = (0..100).filter_map(|_| ids.next()).collect();

        // Assert
        assert_eq!(values.len(), 100);
        for window in values.windows(2) {
            assert!(window[1] > window[0], "ids must be strictly increasing");
        }
    }

    #[test]
    fn test_deactivate_stops_allocation() {
        let ids = MessageIdAllocator::new();
        ids.activate();
        ids.next();
        ids.deactivate();
        assert_eq!(ids.next(), None);
        assert!(!ids.is_active());
    }

    #[test]
    fn test_reactivation_restarts_at_one() {
        let ids = MessageIdAllocator::new();
        ids.activate();
        ids.next();
        ids.next();
        ids.activate();
        assert_eq!(ids.next(), Some(1));
    }

    #[test]
    fn test_saturates_instead_of_wrapping() {
        let ids = MessageIdAllocator::new();
        ids.last.store(i64::MAX - 1, Ordering::SeqCst);
        assert_eq!(ids.next(), Some(i64::MAX as MessageId));
        assert_eq!(ids.next(), None);
    }

    #[test]
    fn test_observed_id_is_never_allocated() {
        // Arrange
        let ids = MessageIdAllocator::new();
        ids.activate();

        // Act
        ids.observe(2);
        let next = ids.next();
        ids.observe(1);

        // Assert
        assert_eq!(next, Some(3));
        assert_eq!(ids.next(), Some(4), "a lower id does not move the counter back");
    }

    #[test]
    fn test_observe_while_inactive_is_ignored() {
        let ids = MessageIdAllocator::new();
        ids.observe(10);
        assert_eq!(ids.current(), None);
        ids.activate();
        assert_eq!(ids.next(), Some(1));
    }

    #[test]
    fn test_observe_beyond_range_saturates() {
        let ids = MessageIdAllocator::new();
        ids.activate();
        ids.observe(u64::MAX);
        assert_eq!(ids.next(), None);
    }

    #[test]
    fn test_concurrent_allocation_yields_unique_ids() {
        // Arrange
        let ids = Arc::new(MessageIdAllocator::new());
        ids.activate();

        // Act: 8 threads × 500 allocations
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ids = Arc::clone(&ids);
                thread::spawn(move || (0..500).filter_map(|_| ids.next()).collect::<Vec<_>>())
            })
            .collect();
        let all: Vec<MessageId> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();

        // Assert
        let unique: HashSet<_> = all.iter().copied().collect();
        assert_eq!(all.len(), 4000);
        assert_eq!(unique.len(), 4000);
    }
}
