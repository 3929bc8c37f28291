//! Records shown before the server confirmed them.
//!
//! A provisional record carries the key it was created with. When the server
//! answers, every entry still pending under that key is swapped for the
//! authoritative record. When the server never answers, the provisional record
//! stays for the rest of the session: nothing is retried or queued.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

/// Provisional key, derived from the creation time in milliseconds.
pub type TempId = i64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Optimistic<T> {
    Pending { key: TempId, value: T },
    Confirmed(T),
}

impl<T> Optimistic<T> {
    pub fn pending(key: TempId, value: T) -> Self {
        Optimistic::Pending { key, value }
    }

    pub fn value(&self) -> &T {
        match self {
            Optimistic::Pending { value, .. } | Optimistic::Confirmed(value) => value,
        }
    }

    pub fn value_mut(&mut self) -> &mut T {
        match self {
            Optimistic::Pending { value, .. } | Optimistic::Confirmed(value) => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Optimistic::Pending { value, .. } | Optimistic::Confirmed(value) => value,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Optimistic::Pending { .. })
    }

    pub fn key(&self) -> Option<TempId> {
        match self {
            Optimistic::Pending { key, .. } => Some(*key),
            Optimistic::Confirmed(_) => None,
        }
    }
}

impl<T> From<T> for Optimistic<T> {
    fn from(value: T) -> Self {
        Optimistic::Confirmed(value)
    }
}

/// Replaces every pending entry created under `key` with `authoritative`.
/// Returns `false` when nothing matched (the entry was already reconciled or
/// the list was replaced in the meantime).
pub fn reconcile<T: Clone>(entries: &mut [Optimistic<T>], key: TempId, authoritative: T) -> bool {
    let mut matched = false;
    for entry in entries.iter_mut().filter(|entry| entry.key() == Some(key)) {
        *entry = Optimistic::Confirmed(authoritative.clone());
        matched = true;
    }
    matched
}

/// Hands out provisional keys from the wall clock, never repeating one.
#[derive(Debug, Default)]
pub struct TempIds {
    last: AtomicI64,
}

impl TempIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> TempId {
        self.next_at(Utc::now().timestamp_millis())
    }

    fn next_at(&self, now_ms: i64) -> TempId {
        let mut current = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now_ms.max(current + 1);
            match self.last.compare_exchange_weak(current, candidate, Ordering::Relaxed, Ordering::Relaxed) {
                Ok(_) => return candidate,
                Err(observed) => current = observed,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconcile_swaps_the_matching_pending_entry() {
        let mut entries = vec![
            Optimistic::Confirmed("a"),
            Optimistic::pending(10, "draft"),
            Optimistic::pending(11, "other"),
        ];

        assert!(reconcile(&mut entries, 10, "saved"));

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1], Optimistic::Confirmed("saved"));
        assert!(entries[2].is_pending());
    }

    #[test]
    fn reconcile_without_a_match_changes_nothing() {
        let mut entries = vec![Optimistic::Confirmed(1), Optimistic::pending(5, 2)];
        let before = entries.clone();

        assert!(!reconcile(&mut entries, 6, 3));
        assert_eq!(entries, before);
    }

    #[test]
    fn colliding_keys_all_take_the_later_write() {
        let mut entries = vec![Optimistic::pending(7, "x"), Optimistic::pending(7, "y")];

        reconcile(&mut entries, 7, "server");

        assert!(entries.iter().all(|e| e == &Optimistic::Confirmed("server")));
    }

    #[test]
    fn temp_ids_follow_the_clock_and_never_repeat() {
        let ids = TempIds::new();
        assert_eq!(ids.next_at(1_000), 1_000);
        assert_eq!(ids.next_at(1_000), 1_001);
        assert_eq!(ids.next_at(900), 1_002);
        assert_eq!(ids.next_at(5_000), 5_000);
    }
}
