//! The per-worker traversal chain: merge, verify, downsample, filter, walk.
//!
//! Each call builds its own private chain, so any number of traversals can
//! run side by side on different regions.

use std::fmt;

use log::debug;

use crate::config::TraversalConfig;
use crate::downsample::{Downsampler, DownsamplerKind, DownsamplingIterator};
use crate::error::Result;
use crate::filter::{FilterCounts, FilterPipeline};
use crate::interval::{GenomicInterval, Grouped, Located, Locus};
use crate::streaming::{
    CheckedSource, ErrorSlot, IntervalScoped, MergingIterator, VerifyingIterator,
};

/// Consumer of the records a traversal delivers.
pub trait Walker<R> {
    type Summary;

    /// Called once per surviving record, in locus order.
    fn visit(&mut self, record: R);

    fn finish(self) -> Self::Summary;
}

/// Counts records and distinct positions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CountingWalker {
    records: u64,
    loci: u64,
    last: Option<Locus>,
}

impl CountingWalker {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Output of [`CountingWalker`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LocusCounts {
    pub records: u64,
    pub loci: u64,
}

impl<R: Located> Walker<R> for CountingWalker {
    type Summary = LocusCounts;

    fn visit(&mut self, record: R) {
        let locus = record.locus();
        self.records += 1;
        if self.last != Some(locus) {
            self.loci += 1;
            self.last = Some(locus);
        }
    }

    fn finish(self) -> LocusCounts {
        LocusCounts {
            records: self.records,
            loci: self.loci,
        }
    }
}

/// Keeps every record it is handed.
#[derive(Debug)]
pub struct CollectingWalker<R> {
    records: Vec<R>,
}

impl<R> Default for CollectingWalker<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> CollectingWalker<R> {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }
}

impl<R> Walker<R> for CollectingWalker<R> {
    type Summary = Vec<R>;

    fn visit(&mut self, record: R) {
        self.records.push(record);
    }

    fn finish(self) -> Vec<R> {
        self.records
    }
}

/// Counters for one traversal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraversalStats {
    /// Records handed to the downsampler.
    pub records_read: u64,
    pub records_downsampled: u64,
    pub filter_counts: FilterCounts,
    pub records_visited: u64,
}

impl TraversalStats {
    /// Fold another worker's counters into these.
    pub fn combine(&mut self, other: &TraversalStats) {
        self.records_read += other.records_read;
        self.records_downsampled += other.records_downsampled;
        self.filter_counts.combine(&other.filter_counts);
        self.records_visited += other.records_visited;
    }
}

impl fmt::Display for TraversalStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "read={} downsampled={} filtered={} visited={}",
            self.records_read,
            self.records_downsampled,
            self.filter_counts.total_rejected(),
            self.records_visited
        )
    }
}

/// What one worker produced for one shard or partition.
#[derive(Debug, Clone)]
pub struct ShardResult<S> {
    pub shard_id: usize,
    pub summary: S,
    pub stats: TraversalStats,
}

/// Merge several sorted sources and traverse the merged stream.
pub fn traverse<S, R, W>(
    sources: Vec<S>,
    config: &TraversalConfig,
    walker: W,
) -> Result<(W::Summary, TraversalStats)>
where
    S: Iterator<Item = R>,
    R: Located + Grouped + 'static,
    W: Walker<R>,
{
    traverse_sorted(MergingIterator::new(sources), config, walker)
}

/// Traverse only the records inside `intervals` (sorted, non-overlapping).
///
/// Order is checked on the whole merged stream, including records outside
/// the intervals.
pub fn traverse_intervals<S, R, W>(
    sources: Vec<S>,
    intervals: &[GenomicInterval],
    config: &TraversalConfig,
    walker: W,
) -> Result<(W::Summary, TraversalStats)>
where
    S: Iterator<Item = R>,
    R: Located + Grouped + 'static,
    W: Walker<R>,
{
    let slot = ErrorSlot::new();
    let scoped = CheckedSource::new(
        IntervalScoped::verified(MergingIterator::new(sources), intervals.to_vec()),
        slot.clone(),
    );
    let outcome = traverse_sorted(scoped, config, walker)?;
    slot.check()?;
    Ok(outcome)
}

/// Run one sorted record stream through downsampling and filtering into a walker.
pub fn traverse_sorted<I, R, W>(
    records: I,
    config: &TraversalConfig,
    mut walker: W,
) -> Result<(W::Summary, TraversalStats)>
where
    I: Iterator<Item = R>,
    R: Located + Grouped + 'static,
    W: Walker<R>,
{
    config.validate()?;

    let slot = ErrorSlot::new();
    let verified = CheckedSource::new(VerifyingIterator::new(records), slot.clone());
    let downsampler = DownsamplerKind::from_method(config.downsampling, config.seed)?;
    let mut downsampled = DownsamplingIterator::new(verified, downsampler);
    let mut filters = FilterPipeline::from_specs(&config.filters);

    let mut visited = 0u64;
    for record in downsampled.by_ref() {
        let record = record?;
        if filters.passes(&record) {
            walker.visit(record);
            visited += 1;
        }
    }
    slot.check()?;

    let downsampler = downsampled.downsampler();
    let stats = TraversalStats {
        records_read: downsampler.num_submitted(),
        records_downsampled: downsampler.num_discarded(),
        filter_counts: filters.counts(),
        records_visited: visited,
    };
    debug!("Traversal finished: {}", stats);
    Ok((walker.finish(), stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DownsamplingMethod, FilterSpec};
    use crate::interval::Record;

    fn stream(group: &str, offsets: &[u64]) -> std::vec::IntoIter<Record> {
        offsets
            .iter()
            .map(|&o| Record::mapped(0, o, group, ()))
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn test_traverse_merges_and_counts() {
        let sources = vec![stream("a", &[1, 3, 5]), stream("b", &[2, 3, 6])];
        let (counts, stats) =
            traverse(sources, &TraversalConfig::new(), CountingWalker::new()).unwrap();
        assert_eq!(counts, LocusCounts { records: 6, loci: 5 });
        assert_eq!(stats.records_read, 6);
        assert_eq!(stats.records_visited, 6);
    }

    #[test]
    fn test_traverse_downsamples_then_filters() {
        let sources = vec![stream("a", &[1, 1, 1, 1, 2]), stream("b", &[1, 2, 2])];
        let config = TraversalConfig::new()
            .with_downsampling(DownsamplingMethod::Positional(2))
            .with_filter(FilterSpec::ExcludeGroups(vec!["b".to_string()]));
        let (records, stats) = traverse(sources, &config, CollectingWalker::new()).unwrap();

        assert_eq!(stats.records_read, 8);
        assert_eq!(stats.records_downsampled, 4);
        assert_eq!(
            stats.records_visited + stats.filter_counts.total_rejected(),
            4
        );
        assert!(records.iter().all(|r| r.group == "a"));
        assert!(records.windows(2).all(|w| w[0].locus <= w[1].locus));
    }

    #[test]
    fn test_traverse_intervals() {
        let sources = vec![stream("a", &[1, 5, 10, 15, 20])];
        let intervals = [GenomicInterval::new(0, 5, 15).unwrap()];
        let (records, _) =
            traverse_intervals(sources, &intervals, &TraversalConfig::new(), CollectingWalker::new())
                .unwrap();
        let loci: Vec<_> = records.iter().map(|r| r.locus).collect();
        assert_eq!(loci, vec![Locus::at(0, 5), Locus::at(0, 10), Locus::at(0, 15)]);
    }

    #[test]
    fn test_traverse_intervals_rejects_backward_record() {
        let sources = vec![stream("a", &[50, 5])];
        let intervals = [
            GenomicInterval::new(0, 1, 10).unwrap(),
            GenomicInterval::new(0, 40, 60).unwrap(),
        ];
        let result =
            traverse_intervals(sources, &intervals, &TraversalConfig::new(), CountingWalker::new());
        assert!(matches!(
            result,
            Err(crate::error::TraversalError::UnsortedInput { .. })
        ));
    }

    #[test]
    fn test_traverse_rejects_unsorted_source() {
        let records = vec![Record::mapped(0, 5, "a", ()), Record::mapped(0, 4, "a", ())];
        let result = traverse_sorted(records.into_iter(), &TraversalConfig::new(), CountingWalker::new());
        assert!(result.is_err());
    }

    #[test]
    fn test_stats_combine() {
        let mut a = TraversalStats {
            records_read: 10,
            records_downsampled: 2,
            filter_counts: FilterCounts::default(),
            records_visited: 8,
        };
        let b = a.clone();
        a.combine(&b);
        assert_eq!(a.records_read, 20);
        assert_eq!(a.records_visited, 16);
    }
}
