//! Unbiased reservoir sampling.
//!
//! [`ReservoirBuffer`] is the sampling core shared with the positional
//! downsampler; [`ReservoirDownsampler`] applies it to the whole stream.

use std::collections::VecDeque;

use log::debug;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::Downsampler;
use crate::error::Result;

/// Keeps a uniform sample of at most `target` items, remembering arrival order.
#[derive(Debug)]
pub(crate) struct ReservoirBuffer<R> {
    target: usize,
    seen: u64,
    slots: Vec<(u64, R)>,
}

impl<R> ReservoirBuffer<R> {
    pub(crate) fn new(target: usize) -> Self {
        Self {
            target,
            seen: 0,
            slots: Vec::with_capacity(target.min(1024)),
        }
    }

    /// Offer an item; returns true if an item was discarded as a result.
    pub(crate) fn offer(&mut self, item: R, rng: &mut SmallRng) -> bool {
        let seq = self.seen;
        self.seen += 1;

        if self.slots.len() < self.target {
            self.slots.push((seq, item));
            return false;
        }
        let j = rng.gen_range(0..self.seen);
        if (j as usize) < self.target {
            self.slots[j as usize] = (seq, item);
        }
        true
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Earliest-arrived item still held.
    pub(crate) fn peek(&self) -> Option<&R> {
        self.slots
            .iter()
            .min_by_key(|(seq, _)| *seq)
            .map(|(_, item)| item)
    }

    /// Survivors in arrival order; resets the buffer for the next unit.
    pub(crate) fn drain_in_order(&mut self) -> Vec<R> {
        self.seen = 0;
        let mut slots = std::mem::take(&mut self.slots);
        slots.sort_unstable_by_key(|(seq, _)| *seq);
        slots.into_iter().map(|(_, item)| item).collect()
    }

    pub(crate) fn clear(&mut self) {
        self.seen = 0;
        self.slots.clear();
    }
}

/// Keeps exactly `min(target, submitted)` records of the whole stream.
///
/// Nothing is finalized until end of input.
#[derive(Debug)]
pub struct ReservoirDownsampler<R> {
    buffer: ReservoirBuffer<R>,
    finalized: VecDeque<R>,
    rng: SmallRng,
    submitted: u64,
    discarded: u64,
}

impl<R> ReservoirDownsampler<R> {
    pub fn new(target: usize, seed: u64) -> Self {
        Self {
            buffer: ReservoirBuffer::new(target),
            finalized: VecDeque::new(),
            rng: SmallRng::seed_from_u64(seed),
            submitted: 0,
            discarded: 0,
        }
    }
}

impl<R> Downsampler<R> for ReservoirDownsampler<R> {
    fn submit(&mut self, item: R) -> Result<()> {
        self.submitted += 1;
        if self.buffer.offer(item, &mut self.rng) {
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
        !self.buffer.is_empty()
    }

    fn peek_pending(&self) -> Option<&R> {
        self.buffer.peek()
    }

    fn signal_end_of_input(&mut self) {
        let kept = self.buffer.drain_in_order();
        debug!(
            "Reservoir closed: kept {} of {} records",
            kept.len(),
            self.submitted
        );
        self.finalized.extend(kept);
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
        self.buffer.clear();
        self.finalized.clear();
    }
}
