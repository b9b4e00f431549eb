//! Positional downsampling applied independently to each group.

use std::collections::VecDeque;

use log::debug;
use rustc_hash::FxHashMap;

use super::positional::PositionalDownsampler;
use super::Downsampler;
use crate::error::{Result, TraversalError};
use crate::interval::{Grouped, Located, Locus};
use crate::streaming::MergingIterator;

/// One [`PositionalDownsampler`] per group key, re-merged into one sorted stream.
///
/// A group's survivor is released only once no group still holds a pending
/// record at a smaller locus, so the output stays sorted.
#[derive(Debug)]
pub struct PerGroupDownsampler<R> {
    target: usize,
    base_seed: u64,
    groups: Vec<PositionalDownsampler<R>>,
    index: FxHashMap<String, usize>,
    ready: VecDeque<R>,
    last_submitted: Option<Locus>,
    submitted: u64,
}

impl<R: Located + Grouped> PerGroupDownsampler<R> {
    pub fn new(target: usize, seed: u64) -> Result<Self> {
        if target == 0 {
            return Err(TraversalError::Config(
                "per-group downsampling target must be positive".to_string(),
            ));
        }
        Ok(Self {
            target,
            base_seed: seed,
            groups: Vec::new(),
            index: FxHashMap::default(),
            ready: VecDeque::new(),
            last_submitted: None,
            submitted: 0,
        })
    }

    /// Number of distinct groups seen so far.
    pub fn num_groups(&self) -> usize {
        self.groups.len()
    }

    fn group_for(&mut self, key: &str) -> Result<usize> {
        if let Some(&idx) = self.index.get(key) {
            return Ok(idx);
        }
        let idx = self.groups.len();
        let seed = self.base_seed.wrapping_add(idx as u64);
        self.groups.push(PositionalDownsampler::new(self.target, seed)?);
        self.index.insert(key.to_string(), idx);
        debug!("Started downsampling group '{}' (#{})", key, idx);
        Ok(idx)
    }

    /// Smallest locus any group still holds open.
    fn min_pending_locus(&self) -> Option<Locus> {
        self.groups
            .iter()
            .filter_map(PositionalDownsampler::pending_locus)
            .min()
    }

    /// Move every survivor that can no longer be preceded into `ready`.
    fn release(&mut self) {
        let bound = self.min_pending_locus();
        let released: Vec<Vec<R>> = self
            .groups
            .iter_mut()
            .map(|group| group.take_finalized_through(bound))
            .filter(|items| !items.is_empty())
            .collect();

        match released.len() {
            0 => {}
            1 => self.ready.extend(released.into_iter().flatten()),
            _ => self
                .ready
                .extend(MergingIterator::new(released.into_iter().map(Vec::into_iter))),
        }
    }
}

impl<R: Located + Grouped> Downsampler<R> for PerGroupDownsampler<R> {
    fn submit(&mut self, item: R) -> Result<()> {
        let locus = item.locus();
        if let Some(previous) = self.last_submitted {
            if locus < previous {
                return Err(TraversalError::unsorted(previous, locus));
            }
        }

        // the input is globally sorted: nothing else will land before `locus`
        if self.last_submitted != Some(locus) {
            for group in &mut self.groups {
                group.close_before(locus);
            }
        }
        self.last_submitted = Some(locus);

        let idx = self.group_for(item.group())?;
        self.groups[idx].submit(item)?;
        self.submitted += 1;
        self.release();
        Ok(())
    }

    fn has_finalized_items(&self) -> bool {
        !self.ready.is_empty()
    }

    fn consume_finalized_items(&mut self) -> Vec<R> {
        self.ready.drain(..).collect()
    }

    fn peek_finalized(&self) -> Option<&R> {
        self.ready.front()
    }

    /// Includes survivors held back for ordering.
    fn has_pending_items(&self) -> bool {
        self.groups
            .iter()
            .any(|g| g.has_pending_items() || g.has_finalized_items())
    }

    fn peek_pending(&self) -> Option<&R> {
        self.groups
            .iter()
            .filter_map(|g| g.peek_pending())
            .min_by_key(|item| item.locus())
    }

    fn signal_end_of_input(&mut self) {
        for group in &mut self.groups {
            group.signal_end_of_input();
        }
        self.release();
        debug!(
            "Per-group downsampling finished: {} groups, {} submitted, {} discarded",
            self.groups.len(),
            self.submitted,
            self.num_discarded()
        );
    }

    fn num_submitted(&self) -> u64 {
        self.submitted
    }

    fn num_discarded(&self) -> u64 {
        self.groups.iter().map(|g| g.num_discarded()).sum()
    }

    fn reset_stats(&mut self) {
        self.submitted = 0;
        for group in &mut self.groups {
            group.reset_stats();
        }
    }

    fn clear(&mut self) {
        for group in &mut self.groups {
            group.clear();
        }
        self.ready.clear();
        self.last_submitted = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::Record;

    fn at(offset: u64, group: &str) -> Record {
        Record::mapped(0, offset, group, ())
    }

    fn run(records: Vec<Record>, target: usize) -> (Vec<Record>, PerGroupDownsampler<Record>) {
        let mut ds = PerGroupDownsampler::new(target, 3).unwrap();
        let mut out = Vec::new();
        for record in records {
            ds.submit(record).unwrap();
            out.extend(ds.consume_finalized_items());
        }
        ds.signal_end_of_input();
        out.extend(ds.consume_finalized_items());
        (out, ds)
    }

    #[test]
    fn test_each_group_capped_independently() {
        let mut records = Vec::new();
        for offset in [1, 2] {
            records.extend((0..6).map(|_| at(offset, "A")));
            records.extend((0..2).map(|_| at(offset, "B")));
        }
        let (out, ds) = run(records, 3);

        for offset in [1, 2] {
            let a = out.iter().filter(|r| r.group == "A" && r.locus == Locus::at(0, offset)).count();
            let b = out.iter().filter(|r| r.group == "B" && r.locus == Locus::at(0, offset)).count();
            assert_eq!(a, 3);
            assert_eq!(b, 2);
        }
        assert_eq!(ds.num_groups(), 2);
        assert_eq!(ds.num_submitted(), 16);
        assert_eq!(ds.num_discarded(), 6);
        assert_eq!(out.len() as u64 + ds.num_discarded(), ds.num_submitted());
    }

    #[test]
    fn test_output_sorted_across_groups() {
        let records = vec![
            at(1, "A"),
            at(1, "B"),
            at(2, "B"),
            at(3, "A"),
            at(3, "C"),
            at(5, "B"),
            Record::unmapped("A", ()),
        ];
        let (out, _) = run(records, 10);
        assert_eq!(out.len(), 7);
        assert!(out.windows(2).all(|w| w[0].locus <= w[1].locus));
    }

    #[test]
    fn test_survivors_held_until_safe() {
        let mut ds = PerGroupDownsampler::new(5, 1).unwrap();
        ds.submit(at(10, "A")).unwrap();
        ds.submit(at(10, "B")).unwrap();
        assert!(!ds.has_finalized_items());
        assert!(ds.has_pending_items());
        assert_eq!(ds.peek_pending().map(|r| r.locus), Some(Locus::at(0, 10)));

        ds.submit(at(11, "A")).unwrap();
        let released = ds.consume_finalized_items();
        assert_eq!(released.len(), 2);
        assert_eq!(released[0].group, "A");
        assert_eq!(released[1].group, "B");
    }

    #[test]
    fn test_rejects_unsorted() {
        let mut ds = PerGroupDownsampler::new(5, 1).unwrap();
        ds.submit(at(10, "A")).unwrap();
        assert!(ds.submit(at(9, "B")).is_err());
    }
}
