//! Operations over lists of intervals.
//!
//! Uses O(n log n) sort + O(n) single-pass sweeps. Functions that take two
//! lists expect each to be sorted and free of overlaps, which is exactly what
//! [`sort_and_merge`] produces.

use log::debug;

use crate::error::{Result, TraversalError};
use crate::interval::GenomicInterval;

/// How [`sort_and_merge`] treats intervals that abut without overlapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergingRule {
    /// Merge overlapping and abutting intervals.
    #[default]
    All,
    /// Merge only overlapping intervals; abutting ones stay separate.
    OverlappingOnly,
}

/// How [`combine`] joins two interval lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetRule {
    #[default]
    Union,
    Intersection,
}

impl MergingRule {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "all" | "merge_adjacent" | "adjacent" => Some(MergingRule::All),
            "overlapping_only" | "overlapping" => Some(MergingRule::OverlappingOnly),
            _ => None,
        }
    }
}

impl SetRule {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "union" => Some(SetRule::Union),
            "intersection" | "intersect" => Some(SetRule::Intersection),
            _ => None,
        }
    }
}

/// Sort intervals and fold them into a minimal, non-overlapping list.
pub fn sort_and_merge(
    mut intervals: Vec<GenomicInterval>,
    rule: MergingRule,
) -> Result<Vec<GenomicInterval>> {
    intervals.sort_unstable();
    merge_sorted(&intervals, rule)
}

/// Fold already-sorted intervals left to right.
pub fn merge_sorted(intervals: &[GenomicInterval], rule: MergingRule) -> Result<Vec<GenomicInterval>> {
    let Some((first, rest)) = intervals.split_first() else {
        return Ok(Vec::new());
    };

    let mut result = Vec::new();
    let mut current = *first;

    for interval in rest {
        if interval < &current {
            return Err(TraversalError::unsorted(current, interval));
        }
        if current.overlaps(interval)
            || (rule == MergingRule::All && current.contiguous(interval))
            || (current.is_unmapped() && interval.is_unmapped())
        {
            current = current.merge(interval)?;
        } else {
            result.push(current);
            current = *interval;
        }
    }

    result.push(current);
    Ok(result)
}

/// Join two sorted, non-overlapping interval lists.
///
/// An empty list imposes no restriction: if either side is empty the other
/// is returned as is. A non-empty pair whose intersection is empty is an
/// error, since it almost always means the lists were built against
/// different regions.
pub fn combine(
    set_one: Vec<GenomicInterval>,
    set_two: Vec<GenomicInterval>,
    set_rule: SetRule,
    merging_rule: MergingRule,
) -> Result<Vec<GenomicInterval>> {
    if set_one.is_empty() {
        return Ok(set_two);
    }
    if set_two.is_empty() {
        return Ok(set_one);
    }

    match set_rule {
        SetRule::Union => {
            let mut all = set_one;
            all.extend(set_two);
            sort_and_merge(all, merging_rule)
        }
        SetRule::Intersection => intersect_sorted(&set_one, &set_two),
    }
}

fn intersect_sorted(
    set_one: &[GenomicInterval],
    set_two: &[GenomicInterval],
) -> Result<Vec<GenomicInterval>> {
    ensure_sorted_disjoint(set_one)?;
    ensure_sorted_disjoint(set_two)?;

    let mut result = Vec::new();
    let (mut i, mut j) = (0, 0);

    while i < set_one.len() && j < set_two.len() {
        let a = &set_one[i];
        let b = &set_two[j];

        if a.is_unmapped() && b.is_unmapped() {
            result.push(GenomicInterval::UNMAPPED);
            i += 1;
            j += 1;
        } else if b.is_before(a) {
            j += 1;
        } else if a.is_before(b) {
            i += 1;
        } else {
            result.push(a.intersect(b)?);
            // drop whichever interval ends first
            if a.stop() < b.stop() {
                i += 1;
            } else {
                j += 1;
            }
        }
    }

    if result.is_empty() {
        return Err(TraversalError::EmptyIntersection);
    }
    debug!(
        "Intersected {} and {} intervals into {}",
        set_one.len(),
        set_two.len(),
        result.len()
    );
    Ok(result)
}

/// Remove every base covered by `subtrahend` from `minuend`.
///
/// Both lists must be sorted and non-overlapping.
pub fn subtract_all(
    minuend: &[GenomicInterval],
    subtrahend: &[GenomicInterval],
) -> Result<Vec<GenomicInterval>> {
    ensure_sorted_disjoint(minuend)?;
    ensure_sorted_disjoint(subtrahend)?;

    let removes_unmapped = subtrahend.last().is_some_and(|iv| iv.is_unmapped());
    let mut result = Vec::with_capacity(minuend.len());
    let mut j = 0;

    for interval in minuend {
        if interval.is_unmapped() {
            if !removes_unmapped {
                result.push(*interval);
            }
            continue;
        }

        let mut remaining = Some(*interval);
        while let Some(current) = remaining.take() {
            while j < subtrahend.len() && subtrahend[j].is_before(&current) {
                j += 1;
            }
            match subtrahend.get(j) {
                Some(cut) if cut.overlaps(&current) => {
                    for piece in current.subtract(cut)? {
                        if piece.stop() < cut.start() {
                            result.push(piece);
                        } else {
                            remaining = Some(piece);
                        }
                    }
                }
                _ => result.push(current),
            }
        }
    }

    Ok(result)
}

/// Total number of bases covered by a list.
pub fn interval_size(intervals: &[GenomicInterval]) -> u64 {
    intervals.iter().map(GenomicInterval::size).sum()
}

/// Check that `test` tiles every base of `master` exactly once.
///
/// `master` must be merged (no overlapping or abutting intervals). Returns
/// `None` when the lists are equivalent, otherwise a description of the first
/// difference found.
pub fn equate_intervals(master: &[GenomicInterval], test: &[GenomicInterval]) -> Option<String> {
    let mut test_iter = test.iter();
    let mut pending: Vec<GenomicInterval> = master.iter().rev().copied().collect();

    while let Some(master_head) = pending.pop() {
        let Some(test_head) = test_iter.next() else {
            return Some(format!("Bases missing from test: first={}", master_head));
        };

        let tiles = test_head.on_same_contig(&master_head)
            && test_head.start() == master_head.start()
            && test_head.stop() <= master_head.stop();
        if !tiles {
            return Some(format!(
                "Incompatible intervals detected masterHead={}, testHead={}",
                master_head, test_head
            ));
        }
        if test_head.stop() < master_head.stop() {
            // the tail of master still needs covering
            if let Ok((_, tail)) = master_head.split(test_head.stop() + 1) {
                pending.push(tail);
            }
        }
    }

    test_iter
        .next()
        .map(|extra| format!("Remaining elements found in test: first={}", extra))
}

/// Fail unless the list is sorted and no two intervals share a base.
pub fn ensure_sorted_disjoint(intervals: &[GenomicInterval]) -> Result<()> {
    for pair in intervals.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        if next < prev || prev.overlaps(next) {
            return Err(TraversalError::unsorted(prev, next));
        }
    }
    Ok(())
}
