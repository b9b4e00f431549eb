//! Claiming units of work so cooperating workers do not repeat each other.
//!
//! A tracker maps a work key (usually a region) to the owner that claimed
//! it. The engine only needs the [`OwnershipTracker`] trait; [`InMemoryTracker`]
//! covers workers inside one process.

use std::sync::Mutex;

use log::warn;
use rustc_hash::FxHashMap;

use crate::interval::GenomicInterval;
use crate::shard::IntervalShard;

/// Outcome of a claim attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// The key was free and now belongs to the caller.
    Granted,
    /// The caller already held the key.
    AlreadyOwned,
    /// Someone else holds the key.
    Conflict { holder: String },
}

impl Claim {
    /// True if the caller may process the unit.
    pub fn is_owned(&self) -> bool {
        matches!(self, Claim::Granted | Claim::AlreadyOwned)
    }
}

/// Shared record of who is processing what.
pub trait OwnershipTracker: Send + Sync {
    fn claim(&self, key: &str, owner: &str) -> Claim;

    fn owner_of(&self, key: &str) -> Option<String>;

    /// Give a key back. Returns false if `owner` did not hold it.
    fn release(&self, key: &str, owner: &str) -> bool;
}

/// Something that can be claimed.
pub trait LeaseKey {
    fn lease_key(&self) -> String;
}

impl LeaseKey for GenomicInterval {
    fn lease_key(&self) -> String {
        self.to_string()
    }
}

impl LeaseKey for IntervalShard {
    fn lease_key(&self) -> String {
        match (self.intervals().first(), self.intervals().last()) {
            (Some(first), Some(last)) => format!("{}..{}", first, last),
            _ => format!("partition-{}", self.id()),
        }
    }
}

/// Mutex-guarded claims for workers in one process.
#[derive(Debug, Default)]
pub struct InMemoryTracker {
    claims: Mutex<FxHashMap<String, String>>,
}

impl InMemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.claims.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl OwnershipTracker for InMemoryTracker {
    fn claim(&self, key: &str, owner: &str) -> Claim {
        let mut claims = self.claims.lock().unwrap_or_else(|e| e.into_inner());
        match claims.get(key) {
            Some(holder) if holder == owner => Claim::AlreadyOwned,
            Some(holder) => Claim::Conflict {
                holder: holder.clone(),
            },
            None => {
                claims.insert(key.to_string(), owner.to_string());
                Claim::Granted
            }
        }
    }

    fn owner_of(&self, key: &str) -> Option<String> {
        self.claims
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn release(&self, key: &str, owner: &str) -> bool {
        let mut claims = self.claims.lock().unwrap_or_else(|e| e.into_inner());
        if claims.get(key).is_some_and(|holder| holder == owner) {
            claims.remove(key);
            true
        } else {
            false
        }
    }
}

/// Pull items until one can be claimed by `owner`.
pub fn claim_next_available<I, T>(
    tracker: &dyn OwnershipTracker,
    items: &mut I,
    owner: &str,
) -> Option<T>
where
    I: Iterator<Item = T>,
    T: LeaseKey,
{
    items.find(|item| tracker.claim(&item.lease_key(), owner).is_owned())
}

/// Yields only the items `owner` manages to claim.
pub struct OwnedOnly<'t, I> {
    inner: I,
    tracker: &'t dyn OwnershipTracker,
    owner: String,
    skipped: usize,
}

impl<'t, I> OwnedOnly<'t, I>
where
    I: Iterator,
    I::Item: LeaseKey,
{
    pub fn new(inner: I, tracker: &'t dyn OwnershipTracker, owner: impl Into<String>) -> Self {
        Self {
            inner,
            tracker,
            owner: owner.into(),
            skipped: 0,
        }
    }

    /// Items passed over because another owner held them.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl<I> Iterator for OwnedOnly<'_, I>
where
    I: Iterator,
    I::Item: LeaseKey,
{
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        for item in self.inner.by_ref() {
            let key = item.lease_key();
            match self.tracker.claim(&key, &self.owner) {
                Claim::Granted | Claim::AlreadyOwned => return Some(item),
                Claim::Conflict { holder } => {
                    warn!("Skipping {}: already claimed by {}", key, holder);
                    self.skipped += 1;
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iv(start: u64, stop: u64) -> GenomicInterval {
        GenomicInterval::new(0, start, stop).unwrap()
    }

    #[test]
    fn test_claim_states() {
        let tracker = InMemoryTracker::new();
        assert_eq!(tracker.claim("0:1-10", "w1"), Claim::Granted);
        assert_eq!(tracker.claim("0:1-10", "w1"), Claim::AlreadyOwned);
        assert_eq!(
            tracker.claim("0:1-10", "w2"),
            Claim::Conflict {
                holder: "w1".to_string()
            }
        );
        assert_eq!(tracker.owner_of("0:1-10"), Some("w1".to_string()));
        assert_eq!(tracker.owner_of("0:11-20"), None);
    }

    #[test]
    fn test_release() {
        let tracker = InMemoryTracker::new();
        tracker.claim("k", "w1");
        assert!(!tracker.release("k", "w2"));
        assert!(tracker.release("k", "w1"));
        assert!(tracker.is_empty());
        assert_eq!(tracker.claim("k", "w2"), Claim::Granted);
    }

    #[test]
    fn test_claim_next_available() {
        let tracker = InMemoryTracker::new();
        tracker.claim(&iv(1, 10).lease_key(), "other");

        let mut items = vec![iv(1, 10), iv(11, 20), iv(21, 30)].into_iter();
        let claimed = claim_next_available(&tracker, &mut items, "me");
        assert_eq!(claimed, Some(iv(11, 20)));
        assert_eq!(items.next(), Some(iv(21, 30)));
    }

    #[test]
    fn test_owned_only_skips_conflicts() {
        let tracker = InMemoryTracker::new();
        tracker.claim(&iv(11, 20).lease_key(), "other");

        let items = vec![iv(1, 10), iv(11, 20), iv(21, 30)];
        let mut owned = OwnedOnly::new(items.into_iter(), &tracker, "me");
        let mine: Vec<_> = owned.by_ref().collect();
        assert_eq!(mine, vec![iv(1, 10), iv(21, 30)]);
        assert_eq!(owned.skipped(), 1);
    }

    #[test]
    fn test_interval_shard_key() {
        let shard = IntervalShard::new(3, vec![iv(1, 10), iv(50, 60)]);
        assert_eq!(shard.lease_key(), "0:1-10..0:50-60");
        assert_eq!(IntervalShard::new(4, Vec::new()).lease_key(), "partition-4");
    }
}
