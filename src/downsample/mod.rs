//! Downsampling policies.
//!
//! Every policy follows the same contract: records are submitted in sorted
//! order, become *pending* while the policy is still deciding, and are either
//! *finalized* (kept) or *discarded*. At any point
//! `kept + pending + discarded == submitted`.

pub mod fractional;
pub mod per_group;
pub mod positional;
pub mod reservoir;

use std::collections::VecDeque;

use log::debug;

pub use fractional::{FractionalDownsampler, PassThroughDownsampler};
pub use per_group::PerGroupDownsampler;
pub use positional::PositionalDownsampler;
pub use reservoir::ReservoirDownsampler;

use crate::config::DownsamplingMethod;
use crate::error::Result;
use crate::interval::{Grouped, Located};

/// Common contract of all downsampling policies.
pub trait Downsampler<R> {
    /// Offer one record.
    fn submit(&mut self, item: R) -> Result<()>;

    fn submit_all<I: IntoIterator<Item = R>>(&mut self, items: I) -> Result<()>
    where
        Self: Sized,
    {
        for item in items {
            self.submit(item)?;
        }
        Ok(())
    }

    fn has_finalized_items(&self) -> bool;

    /// Take every finalized record, in order.
    fn consume_finalized_items(&mut self) -> Vec<R>;

    fn peek_finalized(&self) -> Option<&R>;

    fn has_pending_items(&self) -> bool;

    fn peek_pending(&self) -> Option<&R>;

    /// Close every open unit so all pending records are decided.
    fn signal_end_of_input(&mut self);

    fn num_submitted(&self) -> u64;

    fn num_discarded(&self) -> u64;

    fn reset_stats(&mut self);

    /// Drop pending and finalized records. Counters are kept.
    fn clear(&mut self);
}

/// The closed set of policies, dispatched statically.
#[derive(Debug)]
pub enum DownsamplerKind<R> {
    PassThrough(PassThroughDownsampler<R>),
    Fractional(FractionalDownsampler<R>),
    Reservoir(ReservoirDownsampler<R>),
    Positional(PositionalDownsampler<R>),
    PerGroup(PerGroupDownsampler<R>),
}

impl<R: Located + Grouped> DownsamplerKind<R> {
    /// Build the policy a configuration asks for.
    pub fn from_method(method: DownsamplingMethod, seed: u64) -> Result<Self> {
        Ok(match method {
            DownsamplingMethod::None => DownsamplerKind::PassThrough(PassThroughDownsampler::new()),
            DownsamplingMethod::Fraction(p) => {
                DownsamplerKind::Fractional(FractionalDownsampler::new(p, seed)?)
            }
            DownsamplingMethod::Reservoir(n) => {
                DownsamplerKind::Reservoir(ReservoirDownsampler::new(n, seed))
            }
            DownsamplingMethod::Positional(t) => {
                DownsamplerKind::Positional(PositionalDownsampler::new(t, seed)?)
            }
            DownsamplingMethod::PerGroup(t) => {
                DownsamplerKind::PerGroup(PerGroupDownsampler::new(t, seed)?)
            }
        })
    }
}

macro_rules! dispatch {
    ($self:expr, $ds:ident => $body:expr) => {
        match $self {
            DownsamplerKind::PassThrough($ds) => $body,
            DownsamplerKind::Fractional($ds) => $body,
            DownsamplerKind::Reservoir($ds) => $body,
            DownsamplerKind::Positional($ds) => $body,
            DownsamplerKind::PerGroup($ds) => $body,
        }
    };
}

impl<R: Located + Grouped> Downsampler<R> for DownsamplerKind<R> {
    #[inline]
    fn submit(&mut self, item: R) -> Result<()> {
        dispatch!(self, ds => ds.submit(item))
    }

    fn has_finalized_items(&self) -> bool {
        dispatch!(self, ds => ds.has_finalized_items())
    }

    fn consume_finalized_items(&mut self) -> Vec<R> {
        dispatch!(self, ds => ds.consume_finalized_items())
    }

    fn peek_finalized(&self) -> Option<&R> {
        dispatch!(self, ds => ds.peek_finalized())
    }

    fn has_pending_items(&self) -> bool {
        dispatch!(self, ds => ds.has_pending_items())
    }

    fn peek_pending(&self) -> Option<&R> {
        dispatch!(self, ds => ds.peek_pending())
    }

    fn signal_end_of_input(&mut self) {
        dispatch!(self, ds => ds.signal_end_of_input())
    }

    fn num_submitted(&self) -> u64 {
        dispatch!(self, ds => ds.num_submitted())
    }

    fn num_discarded(&self) -> u64 {
        dispatch!(self, ds => ds.num_discarded())
    }

    fn reset_stats(&mut self) {
        dispatch!(self, ds => ds.reset_stats())
    }

    fn clear(&mut self) {
        dispatch!(self, ds => ds.clear())
    }
}

/// Pulls records through a downsampler.
///
/// Yields kept records in order. An ordering error is yielded once and ends
/// the stream.
pub struct DownsamplingIterator<I: Iterator, D> {
    source: I,
    downsampler: D,
    buffer: VecDeque<I::Item>,
    done: bool,
}

impl<I, D> DownsamplingIterator<I, D>
where
    I: Iterator,
    D: Downsampler<I::Item>,
{
    pub fn new(source: I, downsampler: D) -> Self {
        Self {
            source,
            downsampler,
            buffer: VecDeque::new(),
            done: false,
        }
    }

    pub fn downsampler(&self) -> &D {
        &self.downsampler
    }

    pub fn into_downsampler(self) -> D {
        self.downsampler
    }
}

impl<I, D> Iterator for DownsamplingIterator<I, D>
where
    I: Iterator,
    D: Downsampler<I::Item>,
{
    type Item = Result<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok(item));
            }
            if self.done {
                return None;
            }

            match self.source.next() {
                Some(item) => {
                    if let Err(e) = self.downsampler.submit(item) {
                        self.done = true;
                        return Some(Err(e));
                    }
                    if self.downsampler.has_finalized_items() {
                        self.buffer.extend(self.downsampler.consume_finalized_items());
                    }
                }
                None => {
                    self.downsampler.signal_end_of_input();
                    self.buffer.extend(self.downsampler.consume_finalized_items());
                    self.done = true;
                    debug!(
                        "Downsampling finished: {} submitted, {} discarded",
                        self.downsampler.num_submitted(),
                        self.downsampler.num_discarded()
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::{Locus, Record};

    fn pileup() -> Vec<Record> {
        let mut records = Vec::new();
        for offset in 1..=5 {
            records.extend((0..20).map(|_| Record::mapped(0, offset, "s", ())));
        }
        records
    }

    #[test]
    fn test_iterator_with_positional() {
        let ds = DownsamplerKind::from_method(DownsamplingMethod::Positional(4), 11).unwrap();
        let mut iter = DownsamplingIterator::new(pileup().into_iter(), ds);
        let kept: Vec<_> = iter.by_ref().map(|r| r.unwrap()).collect();

        assert_eq!(kept.len(), 20);
        assert!(kept.windows(2).all(|w| w[0].locus <= w[1].locus));
        assert_eq!(iter.downsampler().num_submitted(), 100);
        assert_eq!(iter.downsampler().num_discarded(), 80);
    }

    #[test]
    fn test_iterator_pass_through() {
        let ds = DownsamplerKind::from_method(DownsamplingMethod::None, 0).unwrap();
        assert_eq!(DownsamplingIterator::new(pileup().into_iter(), ds).count(), 100);
    }

    #[test]
    fn test_iterator_reports_unsorted_once() {
        let records = vec![
            Record::mapped(0, 5, "s", ()),
            Record::mapped(0, 3, "s", ()),
            Record::mapped(0, 9, "s", ()),
        ];
        let ds = DownsamplerKind::from_method(DownsamplingMethod::Positional(10), 1).unwrap();
        let results: Vec<_> = DownsamplingIterator::new(records.into_iter(), ds).collect();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }

    #[test]
    fn test_kind_rejects_bad_config() {
        assert!(DownsamplerKind::<Record>::from_method(DownsamplingMethod::Fraction(2.0), 1).is_err());
        assert!(DownsamplerKind::<Record>::from_method(DownsamplingMethod::PerGroup(0), 1).is_err());
    }

    #[test]
    fn test_kind_conservation() {
        let mut ds = DownsamplerKind::from_method(DownsamplingMethod::Reservoir(7), 5).unwrap();
        ds.submit_all(pileup()).unwrap();
        let pending_before_end = 7;
        assert_eq!(ds.num_discarded() + pending_before_end, ds.num_submitted());
        ds.signal_end_of_input();
        let kept = ds.consume_finalized_items();
        assert_eq!(kept.len() as u64 + ds.num_discarded(), ds.num_submitted());
        assert!(kept.iter().all(|r| r.locus != Locus::Unmapped));
    }
}
