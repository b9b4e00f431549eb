//! Ordered record filters with per-filter rejection counts.
//!
//! A record is rejected by the first filter that says so; later filters
//! are not consulted and their counters do not move.

use std::fmt;
use std::marker::PhantomData;

use rustc_hash::FxHashSet;

use crate::config::FilterSpec;
use crate::interval::{GenomicInterval, Grouped, Located, Locus};

/// A predicate over records.
pub trait RecordFilter<R>: Send + Sync {
    /// Name used in the rejection report.
    fn name(&self) -> &str;

    /// `true` to drop the record.
    fn filter_out(&self, record: &R) -> bool;
}

/// Drops unmapped records.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnmappedFilter;

impl<R: Located> RecordFilter<R> for UnmappedFilter {
    fn name(&self) -> &str {
        "unmapped"
    }

    fn filter_out(&self, record: &R) -> bool {
        record.locus().is_unmapped()
    }
}

/// Drops records whose group is in the exclusion set.
#[derive(Debug, Clone)]
pub struct GroupFilter {
    excluded: FxHashSet<String>,
}

impl GroupFilter {
    pub fn new<I, S>(groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            excluded: groups.into_iter().map(Into::into).collect(),
        }
    }
}

impl<R: Grouped> RecordFilter<R> for GroupFilter {
    fn name(&self) -> &str {
        "excluded-group"
    }

    fn filter_out(&self, record: &R) -> bool {
        self.excluded.contains(record.group())
    }
}

/// Drops records that fall outside a sorted, non-overlapping interval list.
#[derive(Debug, Clone)]
pub struct IntervalFilter {
    intervals: Vec<GenomicInterval>,
    keeps_unmapped: bool,
}

impl IntervalFilter {
    pub fn new(intervals: Vec<GenomicInterval>) -> Self {
        let keeps_unmapped = intervals.iter().any(GenomicInterval::is_unmapped);
        Self {
            intervals,
            keeps_unmapped,
        }
    }

    fn covers(&self, locus: Locus) -> bool {
        match locus {
            Locus::Unmapped => self.keeps_unmapped,
            Locus::Mapped(pos) => {
                // first interval not entirely before the position
                let idx = self
                    .intervals
                    .partition_point(|iv| (iv.contig(), iv.stop()) < (pos.contig, pos.offset));
                self.intervals
                    .get(idx)
                    .is_some_and(|iv| iv.contains_position(&pos))
            }
        }
    }
}

impl<R: Located> RecordFilter<R> for IntervalFilter {
    fn name(&self) -> &str {
        "outside-intervals"
    }

    fn filter_out(&self, record: &R) -> bool {
        !self.covers(record.locus())
    }
}

/// A named closure.
pub struct PredicateFilter<R, F> {
    name: String,
    predicate: F,
    _record: PhantomData<fn(&R)>,
}

impl<R, F> PredicateFilter<R, F>
where
    F: Fn(&R) -> bool + Send + Sync,
{
    /// `predicate` returns `true` for records to drop.
    pub fn new(name: impl Into<String>, predicate: F) -> Self {
        Self {
            name: name.into(),
            predicate,
            _record: PhantomData,
        }
    }
}

impl<R, F> RecordFilter<R> for PredicateFilter<R, F>
where
    F: Fn(&R) -> bool + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn filter_out(&self, record: &R) -> bool {
        (self.predicate)(record)
    }
}

/// Rejections per filter, in pipeline order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterCounts {
    pub seen: u64,
    pub counts: Vec<(String, u64)>,
}

impl FilterCounts {
    pub fn rejected(&self, name: &str) -> u64 {
        self.counts
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, c)| *c)
            .sum()
    }

    pub fn total_rejected(&self) -> u64 {
        self.counts.iter().map(|(_, c)| *c).sum()
    }

    /// Fold another worker's counts into these, matching filters by name.
    pub fn combine(&mut self, other: &FilterCounts) {
        self.seen += other.seen;
        for (name, count) in &other.counts {
            match self.counts.iter_mut().find(|(n, _)| n == name) {
                Some((_, existing)) => *existing += count,
                None => self.counts.push((name.clone(), *count)),
            }
        }
    }
}

impl fmt::Display for FilterCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} records seen", self.seen)?;
        for (name, count) in &self.counts {
            write!(f, ", {} rejected by {}", count, name)?;
        }
        Ok(())
    }
}

/// Ordered chain of filters.
pub struct FilterPipeline<R> {
    filters: Vec<Box<dyn RecordFilter<R>>>,
    counts: Vec<u64>,
    seen: u64,
}

impl<R> Default for FilterPipeline<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> FilterPipeline<R> {
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
            counts: Vec::new(),
            seen: 0,
        }
    }

    /// Append a filter to the end of the chain.
    pub fn with_filter<F: RecordFilter<R> + 'static>(mut self, filter: F) -> Self {
        self.push(Box::new(filter));
        self
    }

    pub fn push(&mut self, filter: Box<dyn RecordFilter<R>>) {
        self.filters.push(filter);
        self.counts.push(0);
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// `true` if every filter accepts the record.
    #[inline]
    pub fn passes(&mut self, record: &R) -> bool {
        self.seen += 1;
        for (filter, count) in self.filters.iter().zip(self.counts.iter_mut()) {
            if filter.filter_out(record) {
                *count += 1;
                return false;
            }
        }
        true
    }

    /// Lazily drop rejected records from a stream.
    pub fn apply<'a, I>(&'a mut self, records: I) -> impl Iterator<Item = R> + 'a
    where
        I: IntoIterator<Item = R>,
        I::IntoIter: 'a,
    {
        records.into_iter().filter(move |r| self.passes(r))
    }

    pub fn counts(&self) -> FilterCounts {
        FilterCounts {
            seen: self.seen,
            counts: self
                .filters
                .iter()
                .zip(&self.counts)
                .map(|(f, c)| (f.name().to_string(), *c))
                .collect(),
        }
    }
}

impl<R: Located + Grouped + 'static> FilterPipeline<R> {
    /// Build the chain a configuration describes.
    pub fn from_specs(specs: &[FilterSpec]) -> Self {
        let mut pipeline = Self::new();
        for spec in specs {
            match spec {
                FilterSpec::ExcludeUnmapped => pipeline.push(Box::new(UnmappedFilter)),
                FilterSpec::ExcludeGroups(groups) => {
                    pipeline.push(Box::new(GroupFilter::new(groups.iter().cloned())))
                }
                FilterSpec::WithinIntervals(intervals) => {
                    pipeline.push(Box::new(IntervalFilter::new(intervals.clone())))
                }
            }
        }
        pipeline
    }
}
