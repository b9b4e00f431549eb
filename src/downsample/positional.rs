//! Positional downsampling: cap the number of records sharing one locus.

use std::collections::VecDeque;

use log::trace;
use rand::rngs::SmallRng;
use rand::SeedableRng;

use super::reservoir::ReservoirBuffer;
use super::Downsampler;
use crate::error::{Result, TraversalError};
use crate::interval::{Located, Locus};

/// Keeps a uniform sample of at most `target` records at each position.
///
/// A position's group closes when a record at a later locus arrives (a new
/// contig counts) or at end of input. Unmapped records are never sampled;
/// they are finalized in arrival order.
#[derive(Debug)]
pub struct PositionalDownsampler<R> {
    target: usize,
    rng: SmallRng,
    current: Option<Locus>,
    group: ReservoirBuffer<R>,
    finalized: VecDeque<R>,
    last_submitted: Option<Locus>,
    submitted: u64,
    discarded: u64,
}

impl<R: Located> PositionalDownsampler<R> {
    pub fn new(target: usize, seed: u64) -> Result<Self> {
        if target == 0 {
            return Err(TraversalError::Config(
                "positional downsampling target must be positive".to_string(),
            ));
        }
        Ok(Self {
            target,
            rng: SmallRng::seed_from_u64(seed),
            current: None,
            group: ReservoirBuffer::new(target),
            finalized: VecDeque::new(),
            last_submitted: None,
            submitted: 0,
            discarded: 0,
        })
    }

    pub fn target(&self) -> usize {
        self.target
    }

    /// Locus of the open group, if any.
    pub fn pending_locus(&self) -> Option<Locus> {
        if self.group.is_empty() {
            None
        } else {
            self.current
        }
    }

    /// Close the open group if it sits before `locus`.
    ///
    /// Callers that see a globally sorted stream use this to close groups
    /// that will receive no more records.
    pub fn close_before(&mut self, locus: Locus) {
        if self.current.is_some_and(|current| current < locus) {
            self.close_group();
        }
    }

    fn close_group(&mut self) {
        if let Some(locus) = self.current.take() {
            let kept = self.group.drain_in_order();
            trace!("Closed position group at {} keeping {}", locus, kept.len());
            self.finalized.extend(kept);
        }
    }
}

impl<R: Located> Downsampler<R> for PositionalDownsampler<R> {
    fn submit(&mut self, item: R) -> Result<()> {
        let locus = item.locus();
        if let Some(previous) = self.last_submitted {
            if locus < previous {
                return Err(TraversalError::unsorted(previous, locus));
            }
        }
        self.last_submitted = Some(locus);
        self.submitted += 1;

        if locus.is_unmapped() {
            self.close_group();
            self.finalized.push_back(item);
            return Ok(());
        }

        if self.current != Some(locus) {
            self.close_group();
            self.current = Some(locus);
        }
        if self.group.offer(item, &mut self.rng) {
            self.discarded += 1;
        }
        Ok(())
    }

    fn has_finalized_items(&self) -> bool {
        !self.finalized.is_empty()
    }

    fn consume_finalized_items(&mut self) -> Vec<R> {
        self.finalized.drain(..).collect()
    }

    fn peek_finalized(&self) -> Option<&R> {
        self.finalized.front()
    }

    fn has_pending_items(&self) -> bool {
        !self.group.is_empty()
    }

    fn peek_pending(&self) -> Option<&R> {
        self.group.peek()
    }

    fn signal_end_of_input(&mut self) {
        self.close_group();
    }

    fn num_submitted(&self) -> u64 {
        self.submitted
    }

    fn num_discarded(&self) -> u64 {
        self.discarded
    }

    fn reset_stats(&mut self) {
        self.submitted = 0;
        self.discarded = 0;
    }

    fn clear(&mut self) {
        self.group.clear();
        self.current = None;
        self.finalized.clear();
        self.last_submitted = None;
    }
}

impl<R: Located> PositionalDownsampler<R> {
    /// Pop finalized items from the front while they sit at or before `bound`.
    pub(crate) fn take_finalized_through(&mut self, bound: Option<Locus>) -> Vec<R> {
        match bound {
            None => self.finalized.drain(..).collect(),
            Some(bound) => {
                let mut taken = Vec::new();
                while self
                    .finalized
                    .front()
                    .is_some_and(|item| item.locus() <= bound)
                {
                    if let Some(item) = self.finalized.pop_front() {
                        taken.push(item);
                    }
                }
                taken
            }
        }
    }
}
