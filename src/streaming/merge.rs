//! K-way merge of individually sorted record streams.
//!
//! A binary min-heap holds at most one pending element per source, keyed by
//! `(locus, source index)`. Ties at the same locus are broken by source index,
//! so the merge is deterministic.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::interval::{Located, Locus};

/// Wrapper for min-heap (BinaryHeap is max-heap by default).
#[derive(Debug)]
struct HeapEntry<T> {
    locus: Locus,
    source: usize,
    item: T,
}

impl<T> PartialEq for HeapEntry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.locus == other.locus && self.source == other.source
    }
}

impl<T> Eq for HeapEntry<T> {}

impl<T> Ord for HeapEntry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap
        other
            .locus
            .cmp(&self.locus)
            .then(other.source.cmp(&self.source))
    }
}

impl<T> PartialOrd for HeapEntry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Merges `k` sorted sources into one sorted stream.
///
/// Each source must already be sorted by locus. An unsorted source shows up
/// as a descent in the merged output, which [`VerifyingIterator`](super::VerifyingIterator)
/// reports.
pub struct MergingIterator<I: Iterator> {
    sources: Vec<I>,
    heap: BinaryHeap<HeapEntry<I::Item>>,
}

impl<I> MergingIterator<I>
where
    I: Iterator,
    I::Item: Located,
{
    pub fn new<S: IntoIterator<Item = I>>(sources: S) -> Self {
        let sources: Vec<I> = sources.into_iter().collect();
        let mut merger = Self {
            heap: BinaryHeap::with_capacity(sources.len()),
            sources,
        };
        for source in 0..merger.sources.len() {
            merger.refill(source);
        }
        merger
    }

    fn refill(&mut self, source: usize) {
        if let Some(item) = self.sources[source].next() {
            self.heap.push(HeapEntry {
                locus: item.locus(),
                source,
                item,
            });
        }
    }

    /// Number of sources, exhausted ones included.
    pub fn num_sources(&self) -> usize {
        self.sources.len()
    }

    /// The next element without consuming it.
    pub fn peek(&self) -> Option<&I::Item> {
        self.heap.peek().map(|entry| &entry.item)
    }

    pub fn peek_locus(&self) -> Option<Locus> {
        self.heap.peek().map(|entry| entry.locus)
    }

    /// Drain every element at or before `locus` across all sources.
    pub fn collect_all_at_or_before(&mut self, locus: Locus) -> Vec<I::Item> {
        let mut collected = Vec::new();
        while self.peek_locus().is_some_and(|next| next <= locus) {
            if let Some(item) = self.next() {
                collected.push(item);
            }
        }
        collected
    }
}

impl<I> Iterator for MergingIterator<I>
where
    I: Iterator,
    I::Item: Located,
{
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.heap.pop()?;
        self.refill(entry.source);
        Some(entry.item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let pending = self.heap.len();
        let (lower, upper) = self
            .sources
            .iter()
            .map(Iterator::size_hint)
            .fold((0usize, Some(0usize)), |(lo, hi), (l, h)| {
                (lo.saturating_add(l), hi.zip(h).and_then(|(a, b)| a.checked_add(b)))
            });
        (
            lower.saturating_add(pending),
            upper.and_then(|u| u.checked_add(pending)),
        )
    }
}
