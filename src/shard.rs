//! Record-count-capped shards over a sorted record stream.
//!
//! A shard never spans two contigs and never splits the records at one
//! position, so a shard may exceed its cap when a position is deep.
//! Unmapped records are collected in a single unbounded tail shard.

use log::debug;

use crate::error::{Result, TraversalError};
use crate::interval::{GenomicInterval, Located, Locus};
use crate::set_ops::interval_size;

/// Which part of the genome a shard belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShardKind {
    Mapped { contig: u32 },
    Unmapped,
}

impl ShardKind {
    #[inline]
    pub fn of(locus: Locus) -> Self {
        match locus {
            Locus::Mapped(pos) => ShardKind::Mapped { contig: pos.contig },
            Locus::Unmapped => ShardKind::Unmapped,
        }
    }
}

/// An ordered group of records on one contig (or the unmapped tail).
#[derive(Debug, Clone)]
pub struct Shard<R> {
    id: usize,
    kind: ShardKind,
    records: Vec<R>,
}

impl<R: Located> Shard<R> {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn kind(&self) -> ShardKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[R] {
        &self.records
    }

    pub fn into_records(self) -> Vec<R> {
        self.records
    }

    pub fn first_locus(&self) -> Option<Locus> {
        self.records.first().map(Located::locus)
    }

    pub fn last_locus(&self) -> Option<Locus> {
        self.records.last().map(Located::locus)
    }

    /// Region from the first to the last record position.
    pub fn span(&self) -> Option<GenomicInterval> {
        match (self.first_locus()?, self.last_locus()?) {
            (Locus::Mapped(first), Locus::Mapped(last)) => {
                GenomicInterval::new(first.contig, first.offset, last.offset).ok()
            }
            _ => Some(GenomicInterval::UNMAPPED),
        }
    }
}

impl<R> IntoIterator for Shard<R> {
    type Item = R;
    type IntoIter = std::vec::IntoIter<R>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

/// A partition's intervals, before any records are bound to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalShard {
    id: usize,
    intervals: Vec<GenomicInterval>,
}

impl IntervalShard {
    pub fn new(id: usize, intervals: Vec<GenomicInterval>) -> Self {
        Self { id, intervals }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn intervals(&self) -> &[GenomicInterval] {
        &self.intervals
    }

    pub fn into_intervals(self) -> Vec<GenomicInterval> {
        self.intervals
    }

    /// Total bases covered.
    pub fn size(&self) -> u64 {
        interval_size(&self.intervals)
    }
}

/// Cut a sorted record stream into [`Shard`]s of roughly `cap` records.
///
/// A record starts a new shard when the current shard is full and the
/// record sits at a new position, or when it is on a different contig.
/// Iteration stops after the first ordering error.
pub struct ShardBalancer<I: Iterator> {
    source: I,
    cap: usize,
    carry: Option<I::Item>,
    last_seen: Option<Locus>,
    failed: bool,
    shards_emitted: usize,
    largest_shard: usize,
}

impl<I> ShardBalancer<I>
where
    I: Iterator,
    I::Item: Located,
{
    pub fn new(source: I, cap: usize) -> Result<Self> {
        if cap == 0 {
            return Err(TraversalError::Config(
                "shard cap must be positive".to_string(),
            ));
        }
        Ok(Self {
            source,
            cap,
            carry: None,
            last_seen: None,
            failed: false,
            shards_emitted: 0,
            largest_shard: 0,
        })
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Number of shards emitted so far.
    pub fn shards_emitted(&self) -> usize {
        self.shards_emitted
    }

    /// Record count of the largest shard emitted so far.
    pub fn largest_shard(&self) -> usize {
        self.largest_shard
    }

    fn fill(&mut self) -> Result<Option<Shard<I::Item>>> {
        let mut records = Vec::new();
        let mut kind = None;
        let mut last_locus = None;

        if let Some(record) = self.carry.take() {
            let locus = record.locus();
            kind = Some(ShardKind::of(locus));
            last_locus = Some(locus);
            records.push(record);
        }

        for record in self.source.by_ref() {
            let locus = record.locus();
            if let Some(previous) = self.last_seen {
                if locus < previous {
                    return Err(TraversalError::unsorted(previous, locus));
                }
            }
            self.last_seen = Some(locus);

            let record_kind = ShardKind::of(locus);
            if let Some(current) = kind {
                let full = current != ShardKind::Unmapped
                    && records.len() >= self.cap
                    && last_locus != Some(locus);
                if record_kind != current || full {
                    self.carry = Some(record);
                    break;
                }
            } else {
                kind = Some(record_kind);
            }

            last_locus = Some(locus);
            records.push(record);
        }

        let Some(kind) = kind else {
            return Ok(None);
        };

        let shard = Shard {
            id: self.shards_emitted,
            kind,
            records,
        };
        self.shards_emitted += 1;
        self.largest_shard = self.largest_shard.max(shard.len());
        debug!(
            "Closed shard {} ({:?}) with {} records",
            shard.id,
            shard.kind,
            shard.len()
        );
        Ok(Some(shard))
    }
}

impl<I> Iterator for ShardBalancer<I>
where
    I: Iterator,
    I::Item: Located,
{
    type Item = Result<Shard<I::Item>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.fill() {
            Ok(shard) => shard.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::Record;

    fn at(contig: u32, offset: u64) -> Record {
        Record::mapped(contig, offset, "g", ())
    }

    fn shard_sizes(records: Vec<Record>, cap: usize) -> Vec<usize> {
        ShardBalancer::new(records.into_iter(), cap)
            .unwrap()
            .map(|s| s.unwrap().len())
            .collect()
    }

    #[test]
    fn test_cap_respected_at_distinct_positions() {
        let records: Vec<_> = (1..=10).map(|i| at(0, i)).collect();
        assert_eq!(shard_sizes(records, 4), vec![4, 4, 2]);
    }

    #[test]
    fn test_deep_position_is_never_split() {
        let mut records = vec![at(0, 1)];
        records.extend((0..5).map(|_| at(0, 2)));
        records.push(at(0, 3));
        // position 2 overflows the cap of 3 rather than being split
        assert_eq!(shard_sizes(records, 3), vec![6, 1]);
    }

    #[test]
    fn test_contig_change_closes_shard() {
        let records = vec![at(0, 1), at(0, 2), at(1, 1), at(1, 2)];
        let shards: Vec<_> = ShardBalancer::new(records.into_iter(), 100)
            .unwrap()
            .map(|s| s.unwrap())
            .collect();
        assert_eq!(shards.len(), 2);
        assert_eq!(shards[0].kind(), ShardKind::Mapped { contig: 0 });
        assert_eq!(shards[1].kind(), ShardKind::Mapped { contig: 1 });
        assert_eq!(shards[1].id(), 1);
    }

    #[test]
    fn test_unmapped_tail_is_unbounded() {
        let mut records = vec![at(0, 1), at(0, 2)];
        records.extend((0..7).map(|_| Record::unmapped("g", ())));
        let shards: Vec<_> = ShardBalancer::new(records.into_iter(), 2)
            .unwrap()
            .map(|s| s.unwrap())
            .collect();
        assert_eq!(shards.len(), 2);
        assert_eq!(shards[1].kind(), ShardKind::Unmapped);
        assert_eq!(shards[1].len(), 7);
        assert_eq!(shards[1].span(), Some(GenomicInterval::UNMAPPED));
    }

    #[test]
    fn test_unsorted_input_stops_balancer() {
        let records = vec![at(0, 5), at(0, 6), at(0, 2), at(0, 9)];
        let mut balancer = ShardBalancer::new(records.into_iter(), 10).unwrap();
        let err = balancer.next().unwrap().unwrap_err();
        assert!(matches!(err, TraversalError::UnsortedInput { .. }));
        assert!(balancer.next().is_none());
    }

    #[test]
    fn test_zero_cap_rejected() {
        let records: Vec<Record> = Vec::new();
        assert!(ShardBalancer::new(records.into_iter(), 0).is_err());
    }

    #[test]
    fn test_stats_and_span() {
        let records: Vec<_> = (1..=5).map(|i| at(2, i * 10)).collect();
        let mut balancer = ShardBalancer::new(records.into_iter(), 3).unwrap();
        let first = balancer.next().unwrap().unwrap();
        assert_eq!(first.span(), Some(GenomicInterval::new(2, 10, 30).unwrap()));
        assert!(balancer.next().unwrap().is_ok());
        assert!(balancer.next().is_none());
        assert_eq!(balancer.shards_emitted(), 2);
        assert_eq!(balancer.largest_shard(), 3);
    }

    #[test]
    fn test_empty_input() {
        let records: Vec<Record> = Vec::new();
        assert!(shard_sizes(records, 5).is_empty());
    }
}
