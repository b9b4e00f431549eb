//! Split a sorted interval list into contiguous sub-lists for parallel work.
//!
//! Every function here preserves order: concatenating the returned parts
//! gives back the input (for [`split_by_base_count`], after re-joining the
//! intervals it cut).

use log::info;

use crate::config::PartitionStrategy;
use crate::error::{Result, TraversalError};
use crate::interval::GenomicInterval;
use crate::set_ops::interval_size;
use crate::shard::IntervalShard;

/// Split into exactly `n` groups of whole intervals with similar base counts.
///
/// Recursive binary split: the left side takes `ceil(n / 2)` parts and the
/// right side the rest. Intervals are never cut.
pub fn split_by_count(intervals: &[GenomicInterval], n: usize) -> Result<Vec<Vec<GenomicInterval>>> {
    if n == 0 {
        return Err(TraversalError::Config(
            "number of partitions must be positive".to_string(),
        ));
    }
    if intervals.len() < n {
        return Err(TraversalError::Config(format!(
            "Cannot scatter {} intervals into {} parts",
            intervals.len(),
            n
        )));
    }

    let total = interval_size(intervals);
    let mut split_points = Vec::with_capacity(n);
    add_fixed_split(&mut split_points, intervals, total, 0, intervals.len(), n);
    split_points.sort_unstable();
    split_points.push(intervals.len());

    let mut parts = Vec::with_capacity(n);
    let mut start = 0;
    for stop in split_points {
        parts.push(intervals[start..stop].to_vec());
        start = stop;
    }

    info!(
        "Split {} intervals ({} bp) into {} parts by interval count",
        intervals.len(),
        total,
        parts.len()
    );
    Ok(parts)
}

fn add_fixed_split(
    split_points: &mut Vec<usize>,
    intervals: &[GenomicInterval],
    size: u64,
    start_index: usize,
    stop_index: usize,
    num_parts: usize,
) {
    if num_parts < 2 {
        return;
    }
    let half_parts = num_parts.div_ceil(2);
    let (split_index, split_size) = fixed_split_point(
        intervals,
        size,
        start_index,
        stop_index,
        half_parts,
        num_parts - half_parts,
    );
    split_points.push(split_index);
    add_fixed_split(split_points, intervals, split_size, start_index, split_index, half_parts);
    add_fixed_split(
        split_points,
        intervals,
        size - split_size,
        split_index,
        stop_index,
        num_parts - half_parts,
    );
}

/// First index past `min_left` intervals whose left side reaches half of `size`,
/// leaving at least `min_right` intervals on the right.
fn fixed_split_point(
    intervals: &[GenomicInterval],
    size: u64,
    start_index: usize,
    stop_index: usize,
    min_left: usize,
    min_right: usize,
) -> (usize, u64) {
    let mut split_index = start_index + min_left;
    let mut split_size = interval_size(&intervals[start_index..split_index]);
    let half = size / 2;

    while split_index < stop_index - min_right && split_size < half {
        split_size += intervals[split_index].size();
        split_index += 1;
    }
    (split_index, split_size)
}

/// Split into `n` parts of `max(total / n, 1)` bases each, cutting intervals
/// where a part boundary falls inside one. The last part takes the remainder.
pub fn split_by_base_count(intervals: &[GenomicInterval], n: usize) -> Result<Vec<Vec<GenomicInterval>>> {
    if n == 0 {
        return Err(TraversalError::Config(
            "number of partitions must be positive".to_string(),
        ));
    }
    let total = interval_size(intervals);
    if total < n as u64 {
        return Err(TraversalError::Config(format!(
            "Cannot split {} bp into {} parts",
            total, n
        )));
    }

    let ideal = (total / n as u64).max(1);
    let mut remaining: Vec<GenomicInterval> = intervals.iter().rev().copied().collect();
    let mut parts = Vec::with_capacity(n);

    while !remaining.is_empty() {
        if parts.len() + 1 == n {
            remaining.reverse();
            parts.push(std::mem::take(&mut remaining));
            break;
        }

        let mut part = Vec::new();
        let mut size = 0u64;
        while let Some(head) = remaining.pop() {
            let new_size = size + head.size();
            if new_size == ideal {
                part.push(head);
                break;
            } else if new_size > ideal {
                let (left, right) = head.split(head.start() + (ideal - size))?;
                remaining.push(right);
                remaining.push(left);
            } else {
                part.push(head);
                size = new_size;
            }
        }
        parts.push(part);
    }

    info!(
        "Split {} intervals ({} bp) into {} parts of ~{} bp",
        intervals.len(),
        total,
        parts.len(),
        ideal
    );
    Ok(parts)
}

/// One part per contig run until `n - 1` parts are open; the last part takes
/// every remaining contig.
pub fn split_by_contig(intervals: &[GenomicInterval], n: usize) -> Result<Vec<Vec<GenomicInterval>>> {
    if n == 0 {
        return Err(TraversalError::Config(
            "number of partitions must be positive".to_string(),
        ));
    }

    let mut parts: Vec<Vec<GenomicInterval>> = Vec::with_capacity(n);
    let mut current_contig = None;

    for interval in intervals {
        let contig = interval.contig();
        if parts.len() < n && current_contig != Some(contig) {
            parts.push(Vec::new());
            current_contig = Some(contig);
        }
        if let Some(part) = parts.last_mut() {
            part.push(*interval);
        }
    }

    if parts.len() != n {
        return Err(TraversalError::Config(format!(
            "Only able to place contigs into {} of {} parts",
            parts.len(),
            n
        )));
    }
    info!("Split {} intervals into {} contig parts", intervals.len(), n);
    Ok(parts)
}

/// Number of distinct contig runs in a sorted list.
pub fn count_contig_intervals(intervals: &[GenomicInterval]) -> usize {
    let mut count = 0;
    let mut current = None;
    for interval in intervals {
        if current != Some(interval.contig()) {
            count += 1;
            current = Some(interval.contig());
        }
    }
    count
}

/// Concatenate parts back into one list.
pub fn flatten(parts: &[Vec<GenomicInterval>]) -> Vec<GenomicInterval> {
    parts.iter().flatten().copied().collect()
}

/// Partition according to a configured strategy and wrap each part as a shard.
pub fn partition(intervals: &[GenomicInterval], strategy: PartitionStrategy) -> Result<Vec<IntervalShard>> {
    let parts = match strategy {
        PartitionStrategy::IntervalCount(n) => split_by_count(intervals, n)?,
        PartitionStrategy::BaseCount(n) => split_by_base_count(intervals, n)?,
        PartitionStrategy::TargetBases(target) => {
            if target == 0 {
                return Err(TraversalError::Config(
                    "target bases per partition must be positive".to_string(),
                ));
            }
            let total = interval_size(intervals);
            let n = total.div_ceil(target).max(1) as usize;
            split_by_base_count(intervals, n)?
        }
        PartitionStrategy::Contig(n) => split_by_contig(intervals, n)?,
    };

    Ok(parts
        .into_iter()
        .enumerate()
        .map(|(id, intervals)| IntervalShard::new(id, intervals))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iv(contig: u32, start: u64, stop: u64) -> GenomicInterval {
        GenomicInterval::new(contig, start, stop).unwrap()
    }

    fn ten_equal() -> Vec<GenomicInterval> {
        (0..10).map(|i| iv(0, i * 100 + 1, i * 100 + 50)).collect()
    }

    #[test]
    fn test_split_by_count_preserves_order() {
        let intervals = ten_equal();
        let parts = split_by_count(&intervals, 5).unwrap();
        assert_eq!(parts.len(), 5);
        assert!(parts.iter().all(|p| !p.is_empty() && p.len() <= 3));
        assert_eq!(flatten(&parts), intervals);
    }

    #[test]
    fn test_split_by_count_is_deterministic() {
        let intervals = ten_equal();
        assert_eq!(
            split_by_count(&intervals, 3).unwrap(),
            split_by_count(&intervals, 3).unwrap()
        );
    }

    #[test]
    fn test_split_by_count_never_leaves_empty_part() {
        let intervals = vec![iv(0, 1, 1_000_000), iv(0, 2_000_000, 2_000_001), iv(1, 1, 2)];
        let parts = split_by_count(&intervals, 3).unwrap();
        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|p| !p.is_empty()));
    }

    #[test]
    fn test_split_by_count_errors() {
        let intervals = ten_equal();
        assert!(split_by_count(&intervals, 0).is_err());
        assert!(split_by_count(&intervals, 11).is_err());
        assert_eq!(split_by_count(&intervals, 10).unwrap().len(), 10);
    }

    #[test]
    fn test_split_by_base_count_cuts_intervals() {
        let intervals = vec![iv(0, 1, 100)];
        let parts = split_by_base_count(&intervals, 4).unwrap();
        assert_eq!(
            parts,
            vec![
                vec![iv(0, 1, 25)],
                vec![iv(0, 26, 50)],
                vec![iv(0, 51, 75)],
                vec![iv(0, 76, 100)],
            ]
        );
    }

    #[test]
    fn test_split_by_base_count_last_part_takes_remainder() {
        let intervals = vec![iv(0, 1, 10), iv(1, 1, 3)];
        let parts = split_by_base_count(&intervals, 3).unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(interval_size(&parts[0]), 4);
        assert_eq!(interval_size(&parts[1]), 4);
        assert_eq!(interval_size(&parts[2]), 5);
        assert_eq!(interval_size(&flatten(&parts)), 13);
    }

    #[test]
    fn test_split_by_base_count_errors() {
        let intervals = vec![iv(0, 1, 3)];
        assert!(split_by_base_count(&intervals, 0).is_err());
        assert!(split_by_base_count(&intervals, 4).is_err());
        assert_eq!(split_by_base_count(&intervals, 3).unwrap().len(), 3);
    }

    #[test]
    fn test_split_by_contig() {
        let intervals = vec![iv(0, 1, 10), iv(0, 20, 30), iv(1, 1, 10), iv(2, 1, 10), iv(3, 1, 5)];
        let parts = split_by_contig(&intervals, 3).unwrap();
        assert_eq!(parts[0], vec![iv(0, 1, 10), iv(0, 20, 30)]);
        assert_eq!(parts[1], vec![iv(1, 1, 10)]);
        assert_eq!(parts[2], vec![iv(2, 1, 10), iv(3, 1, 5)]);
        assert!(split_by_contig(&intervals, 5).is_err());
    }

    #[test]
    fn test_count_contig_intervals() {
        let intervals = vec![iv(0, 1, 10), iv(0, 20, 30), iv(1, 1, 10), iv(3, 1, 5)];
        assert_eq!(count_contig_intervals(&intervals), 3);
        assert_eq!(count_contig_intervals(&[]), 0);
    }

    #[test]
    fn test_partition_target_bases() {
        let intervals = vec![iv(0, 1, 1000)];
        let shards = partition(&intervals, PartitionStrategy::TargetBases(300)).unwrap();
        assert_eq!(shards.len(), 4);
        assert_eq!(shards[0].id(), 0);
        assert_eq!(shards[3].size(), 250);
    }
}
