//! Bounded record of granted permits.

use std::time::Duration;
use tokio::time::Instant;

/// Slots allocated up front; the ring grows on demand up to the permit limit.
const INITIAL_SLOTS: usize = 64;

/// Timestamps of granted permits, oldest first.
///
/// Backed by a ring buffer indexed by head and length. Slots are allocated
/// lazily, doubling up to `limit`, so a large limit costs nothing until the
/// permits are actually granted. Timestamps are kept non-decreasing: a
/// timestamp older than the newest entry is clamped up to it.
#[derive(Debug)]
pub(crate) struct PermitHistory {
    slots: Vec<Option<Instant>>,
    head: usize,
    len: usize,
    limit: usize,
}

impl PermitHistory {
    /// Create an empty history holding at most `limit` permits.
    pub(crate) fn with_limit(limit: usize) -> Self {
        Self {
            slots: vec![None; limit.min(INITIAL_SLOTS)],
            head: 0,
            len: 0,
            limit,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn is_full(&self) -> bool {
        self.len >= self.limit
    }

    /// The oldest recorded permit.
    pub(crate) fn oldest(&self) -> Option<Instant> {
        if self.is_empty() {
            return None;
        }
        self.slots[self.head]
    }

    /// The most recently recorded permit.
    pub(crate) fn newest(&self) -> Option<Instant> {
        if self.is_empty() {
            return None;
        }
        self.slots[self.index(self.len - 1)]
    }

    /// Record a permit granted at `at` and return the timestamp actually stored.
    ///
    /// Returns `None` when the history is full; the caller must evict first.
    pub(crate) fn record(&mut self, at: Instant) -> Option<Instant> {
        if self.is_full() {
            return None;
        }
        if self.len == self.slots.len() {
            self.grow();
        }

        let at = match self.newest() {
            Some(newest) if newest > at => newest,
            _ => at,
        };
        let tail = self.index(self.len);
        self.slots[tail] = Some(at);
        self.len += 1;
        Some(at)
    }

    /// Drop every permit that has left the window `(now - window, now]`.
    ///
    /// Returns the number of evicted entries.
    pub(crate) fn evict_expired(&mut self, now: Instant, window: Duration) -> usize {
        let mut evicted = 0;
        while let Some(oldest) = self.oldest() {
            match expiry(oldest, window) {
                Some(expires_at) if expires_at <= now => {
                    self.slots[self.head] = None;
                    self.head = self.index(1);
                    self.len -= 1;
                    evicted += 1;
                }
                _ => break,
            }
        }
        evicted
    }

    /// When the oldest permit leaves the window.
    ///
    /// `None` when the history is empty or the expiry is not representable.
    pub(crate) fn next_expiry(&self, window: Duration) -> Option<Instant> {
        self.oldest().and_then(|oldest| expiry(oldest, window))
    }

    /// Count the permits still inside `(now - window, now]` without evicting.
    pub(crate) fn live_at(&self, now: Instant, window: Duration) -> usize {
        self.iter()
            .filter(|&at| expiry(at, window).map_or(true, |expires_at| expires_at > now))
            .count()
    }

    /// Iterate over recorded permits, oldest first.
    pub(crate) fn iter(&self) -> impl Iterator<Item = Instant> + '_ {
        (0..self.len).filter_map(move |offset| self.slots[self.index(offset)])
    }

    /// Double the allocated slots (capped at the limit), unrolling the ring so head is 0.
    fn grow(&mut self) {
        let target = self.slots.len().saturating_mul(2).max(1).min(self.limit);
        let mut slots = Vec::with_capacity(target);
        slots.extend(self.iter().map(Some));
        slots.resize(target, None);
        self.slots = slots;
        self.head = 0;
    }

    fn index(&self, offset: usize) -> usize {
        (self.head + offset) % self.slots.len()
    }
}

fn expiry(at: Instant, window: Duration) -> Option<Instant> {
    at.checked_add(window)
}
