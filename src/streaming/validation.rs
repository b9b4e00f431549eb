//! Sort validation for streaming operations.
//!
//! Every stage of the engine assumes input sorted by locus. These adaptors
//! check that as records flow, instead of reading the input twice.

use crate::error::{Result, TraversalError};
use crate::interval::{GenomicInterval, Located, Locus};

/// Inline sort validator for use within streaming loops.
#[derive(Debug, Default)]
pub struct SortValidator {
    previous: Option<Locus>,
    record_count: usize,
}

impl SortValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate that the given locus maintains sort order.
    #[inline]
    pub fn validate(&mut self, locus: Locus) -> Result<()> {
        self.record_count += 1;
        if let Some(previous) = self.previous {
            if locus < previous {
                return Err(TraversalError::unsorted(previous, locus));
            }
        }
        self.previous = Some(locus);
        Ok(())
    }

    pub fn record_count(&self) -> usize {
        self.record_count
    }

    pub fn last_locus(&self) -> Option<Locus> {
        self.previous
    }
}

/// Yields `Ok(record)` while the input stays sorted, then one error.
pub struct VerifyingIterator<I> {
    inner: I,
    validator: SortValidator,
    failed: bool,
}

impl<I> VerifyingIterator<I>
where
    I: Iterator,
    I::Item: Located,
{
    pub fn new(inner: I) -> Self {
        Self {
            inner,
            validator: SortValidator::new(),
            failed: false,
        }
    }
}

impl<I> Iterator for VerifyingIterator<I>
where
    I: Iterator,
    I::Item: Located,
{
    type Item = Result<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let record = self.inner.next()?;
        match self.validator.validate(record.locus()) {
            Ok(()) => Some(Ok(record)),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Restricts a verified record stream to a sorted, non-overlapping interval list.
///
/// Takes the `Result` stream of a [`VerifyingIterator`], so a record that goes
/// backwards is reported before it can fall outside the current interval and
/// be skipped. Errors pass straight through. Stops pulling from the source once
/// the stream is past the last interval. Unmapped records are kept only when the
/// list contains [`GenomicInterval::UNMAPPED`].
pub struct IntervalScoped<I> {
    inner: I,
    intervals: Vec<GenomicInterval>,
    current: usize,
}

impl<I, R> IntervalScoped<I>
where
    I: Iterator<Item = Result<R>>,
    R: Located,
{
    pub fn new(inner: I, intervals: Vec<GenomicInterval>) -> Self {
        Self {
            inner,
            intervals,
            current: 0,
        }
    }

    pub fn intervals(&self) -> &[GenomicInterval] {
        &self.intervals
    }
}

impl<S> IntervalScoped<VerifyingIterator<S>>
where
    S: Iterator,
    S::Item: Located,
{
    /// Verify the order of `records`, then scope them to `intervals`.
    pub fn verified(records: S, intervals: Vec<GenomicInterval>) -> Self {
        Self::new(VerifyingIterator::new(records), intervals)
    }
}

impl<I, R> Iterator for IntervalScoped<I>
where
    I: Iterator<Item = Result<R>>,
    R: Located,
{
    type Item = Result<R>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let interval = self.intervals.get(self.current)?;
            let record = match self.inner.next()? {
                Ok(record) => record,
                Err(e) => return Some(Err(e)),
            };

            match record.locus() {
                Locus::Unmapped => {
                    // unmapped sorts last, so only the trailing sentinel can match
                    if self.intervals.last().is_some_and(GenomicInterval::is_unmapped) {
                        self.current = self.intervals.len() - 1;
                        return Some(Ok(record));
                    }
                    self.current = self.intervals.len();
                    return None;
                }
                Locus::Mapped(pos) => {
                    let mut interval = interval;
                    while !interval.is_unmapped()
                        && (interval.contig() < pos.contig
                            || (interval.contig() == pos.contig && interval.stop() < pos.offset))
                    {
                        self.current += 1;
                        interval = self.intervals.get(self.current)?;
                    }
                    if interval.contains_position(&pos) {
                        return Some(Ok(record));
                    }
                }
            }
        }
    }
}
