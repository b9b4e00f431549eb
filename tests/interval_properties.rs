//! Property-based tests for interval algebra, partitioning, merging and sharding.

use proptest::prelude::*;
use trek_genomics::interval::{GenomicInterval, Locus, Record};
use trek_genomics::partition::{flatten, split_by_base_count, split_by_count};
use trek_genomics::set_ops::{sort_and_merge, MergingRule};
use trek_genomics::shard::ShardBalancer;
use trek_genomics::streaming::MergingIterator;

/// An interval on one of three contigs.
fn arb_interval() -> impl Strategy<Value = GenomicInterval> {
    (0u32..3, 1u64..10_000, 0u64..500).prop_map(|(contig, start, len)| {
        GenomicInterval::new(contig, start, start + len).unwrap()
    })
}

/// A pair of intervals on one contig that overlap or abut.
fn arb_touching_pair() -> impl Strategy<Value = (GenomicInterval, GenomicInterval)> {
    (0u32..3, 1u64..10_000, 0u64..500, 0u64..=500, 0u64..500).prop_map(
        |(contig, start, len_a, offset, len_b)| {
            let a = GenomicInterval::new(contig, start, start + len_a).unwrap();
            // b starts inside a or right after it
            let b_start = start + offset.min(len_a + 1);
            let b = GenomicInterval::new(contig, b_start, b_start + len_b).unwrap();
            (a, b)
        },
    )
}

/// A sorted, disjoint interval list.
fn arb_interval_list() -> impl Strategy<Value = Vec<GenomicInterval>> {
    prop::collection::vec(arb_interval(), 1..60)
        .prop_map(|intervals| sort_and_merge(intervals, MergingRule::OverlappingOnly).unwrap())
}

/// A sorted record stream on two contigs.
fn arb_sorted_stream() -> impl Strategy<Value = Vec<Record<u32>>> {
    prop::collection::vec((0u32..2, 1u64..200, 0u32..1000), 0..100).prop_map(|mut raw| {
        raw.sort_by_key(|&(contig, offset, _)| (contig, offset));
        raw.into_iter()
            .map(|(contig, offset, id)| Record::mapped(contig, offset, "g", id))
            .collect()
    })
}

proptest! {
    #[test]
    fn prop_merge_contains_both((a, b) in arb_touching_pair()) {
        let merged = a.merge(&b).unwrap();
        prop_assert!(merged.contains(&a));
        prop_assert!(merged.contains(&b));
    }

    #[test]
    fn prop_merge_commutative((a, b) in arb_touching_pair()) {
        prop_assert_eq!(a.merge(&b).unwrap(), b.merge(&a).unwrap());
    }

    #[test]
    fn prop_merged_list_is_disjoint(intervals in prop::collection::vec(arb_interval(), 0..80)) {
        let merged = sort_and_merge(intervals.clone(), MergingRule::All).unwrap();
        for w in merged.windows(2) {
            prop_assert!(w[0] < w[1]);
            prop_assert!(!w[0].overlaps(&w[1]));
            prop_assert!(!w[0].contiguous(&w[1]));
        }
        // every input interval is covered by exactly one merged interval
        for iv in &intervals {
            prop_assert_eq!(merged.iter().filter(|m| m.contains(iv)).count(), 1);
        }
    }

    #[test]
    fn prop_split_by_count_reconstructs(intervals in arb_interval_list(), n in 1usize..20) {
        prop_assume!(n <= intervals.len());
        let parts = split_by_count(&intervals, n).unwrap();
        prop_assert_eq!(parts.len(), n);
        prop_assert!(parts.iter().all(|p| !p.is_empty()));
        prop_assert_eq!(flatten(&parts), intervals);
    }

    #[test]
    fn prop_split_by_base_count_preserves_bases(intervals in arb_interval_list(), n in 1usize..10) {
        let total: u64 = intervals.iter().map(|iv| iv.size()).sum();
        prop_assume!(n as u64 <= total);
        let parts = split_by_base_count(&intervals, n).unwrap();
        let rejoined = sort_and_merge(flatten(&parts), MergingRule::All).unwrap();
        let expected = sort_and_merge(intervals, MergingRule::All).unwrap();
        prop_assert_eq!(rejoined, expected);
        let split_total: u64 = parts.iter().flatten().map(|iv| iv.size()).sum();
        prop_assert_eq!(split_total, total);
    }

    #[test]
    fn prop_merging_iterator_is_sorted_interleave(
        streams in prop::collection::vec(arb_sorted_stream(), 1..6)
    ) {
        let mut expected: Vec<u32> = streams.iter().flatten().map(|r| r.payload).collect();
        let merged: Vec<Record<u32>> =
            MergingIterator::new(streams.into_iter().map(Vec::into_iter)).collect();

        prop_assert!(merged.windows(2).all(|w| w[0].locus <= w[1].locus));
        let mut got: Vec<u32> = merged.iter().map(|r| r.payload).collect();
        expected.sort_unstable();
        got.sort_unstable();
        prop_assert_eq!(got, expected);
    }

    #[test]
    fn prop_shards_never_split_a_position(
        stream in arb_sorted_stream(),
        pileup in 0usize..40,
        cap in 1usize..15,
    ) {
        // splice a deep pileup at one position into the stream
        let mut records = stream;
        records.extend((0..pileup).map(|i| Record::mapped(0, 100, "g", i as u32)));
        records.sort_by_key(|r| r.locus);
        let total = records.len();

        let shards: Vec<_> = ShardBalancer::new(records.into_iter(), cap)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        let mut owner: Vec<(Locus, usize)> = Vec::new();
        for shard in &shards {
            for record in shard.records() {
                match owner.last() {
                    Some(&(locus, id)) if locus == record.locus => prop_assert_eq!(id, shard.id()),
                    _ => owner.push((record.locus, shard.id())),
                }
            }
        }
        prop_assert_eq!(shards.iter().map(|s| s.len()).sum::<usize>(), total);
    }
}
