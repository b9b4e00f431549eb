//! Independent per-record sampling, plus the no-op policy.

use std::collections::VecDeque;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::Downsampler;
use crate::error::{Result, TraversalError};

/// Keeps each record with probability `fraction`. Records are finalized on submit.
#[derive(Debug)]
pub struct FractionalDownsampler<R> {
    fraction: f64,
    rng: SmallRng,
    finalized: VecDeque<R>,
    submitted: u64,
    discarded: u64,
}

impl<R> FractionalDownsampler<R> {
    pub fn new(fraction: f64, seed: u64) -> Result<Self> {
        if !(0.0..=1.0).contains(&fraction) {
            return Err(TraversalError::Config(format!(
                "downsampling fraction must be between 0.0 and 1.0, got {}",
                fraction
            )));
        }
        Ok(Self {
            fraction,
            rng: SmallRng::seed_from_u64(seed),
            finalized: VecDeque::new(),
            submitted: 0,
            discarded: 0,
        })
    }

    pub fn fraction(&self) -> f64 {
        self.fraction
    }
}

impl<R> Downsampler<R> for FractionalDownsampler<R> {
    fn submit(&mut self, item: R) -> Result<()> {
        self.submitted += 1;
        if self.rng.gen::<f64>() < self.fraction {
            self.finalized.push_back(item);
        } else {
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
        false
    }

    fn peek_pending(&self) -> Option<&R> {
        None
    }

    fn signal_end_of_input(&mut self) {}

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
        self.finalized.clear();
    }
}

/// Keeps everything.
#[derive(Debug)]
pub struct PassThroughDownsampler<R> {
    finalized: VecDeque<R>,
    submitted: u64,
}

impl<R> Default for PassThroughDownsampler<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> PassThroughDownsampler<R> {
    pub fn new() -> Self {
        Self {
            finalized: VecDeque::new(),
            submitted: 0,
        }
    }
}

impl<R> Downsampler<R> for PassThroughDownsampler<R> {
    fn submit(&mut self, item: R) -> Result<()> {
        self.submitted += 1;
        self.finalized.push_back(item);
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
        false
    }

    fn peek_pending(&self) -> Option<&R> {
        None
    }

    fn signal_end_of_input(&mut self) {}

    fn num_submitted(&self) -> u64 {
        self.submitted
    }

    fn num_discarded(&self) -> u64 {
        0
    }

    fn reset_stats(&mut self) {
        self.submitted = 0;
    }

    fn clear(&mut self) {
        self.finalized.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kept_count(fraction: f64) -> usize {
        let mut ds = FractionalDownsampler::new(fraction, 12345).unwrap();
        ds.submit_all(0..10_000u32).unwrap();
        ds.signal_end_of_input();
        let kept = ds.consume_finalized_items().len();
        assert_eq!(kept as u64 + ds.num_discarded(), 10_000);
        kept
    }

    #[test]
    fn test_half_fraction_within_tolerance() {
        let kept = kept_count(0.5);
        assert!((4750..=5250).contains(&kept), "kept {}", kept);
    }

    #[test]
    fn test_fraction_extremes() {
        assert_eq!(kept_count(0.0), 0);
        assert_eq!(kept_count(1.0), 10_000);
    }

    #[test]
    fn test_invalid_fraction() {
        assert!(FractionalDownsampler::<u32>::new(-0.1, 1).is_err());
        assert!(FractionalDownsampler::<u32>::new(1.5, 1).is_err());
        assert!(FractionalDownsampler::<u32>::new(f64::NAN, 1).is_err());
    }

    #[test]
    fn test_finalized_immediately_in_order() {
        let mut ds = FractionalDownsampler::new(1.0, 1).unwrap();
        ds.submit(1).unwrap();
        ds.submit(2).unwrap();
        assert!(!ds.has_pending_items());
        assert_eq!(ds.peek_finalized(), Some(&1));
        assert_eq!(ds.consume_finalized_items(), vec![1, 2]);
    }

    #[test]
    fn test_pass_through() {
        let mut ds = PassThroughDownsampler::new();
        ds.submit_all(vec!["a", "b"]).unwrap();
        assert_eq!(ds.num_submitted(), 2);
        assert_eq!(ds.num_discarded(), 0);
        assert_eq!(ds.consume_finalized_items(), vec!["a", "b"]);
    }
}
