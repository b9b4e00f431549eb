//! Parallel traversal using Rayon.
//!
//! Work is split up front (interval partitions) or on the fly (record
//! shards). Every worker builds its own traversal chain; the only shared
//! state is the optional ownership tracker. Finished results travel over a
//! bounded channel and are handed to the caller in sequence order, so output
//! can be written while later work is still running.

use std::collections::BTreeMap;
use std::io;
use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender};
use log::info;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

use crate::config::TraversalConfig;
use crate::error::{Result, TraversalError};
use crate::interval::{Grouped, Located};
use crate::lease::{LeaseKey, OwnershipTracker};
use crate::shard::{IntervalShard, Shard};
use crate::traversal::{traverse_intervals, traverse_sorted, ShardResult, TraversalStats, Walker};

/// Claims partitions on behalf of one owner.
#[derive(Clone, Copy)]
pub struct Ownership<'t> {
    pub tracker: &'t dyn OwnershipTracker,
    pub owner: &'t str,
}

/// A finished unit of work tagged with its sequence number; `None` marks a skipped unit.
type Sequenced<S> = (usize, Option<ShardResult<S>>);

/// Traverse each interval partition on its own worker.
///
/// `open_sources` opens fresh sorted record sources for a partition; records
/// outside the partition's intervals are skipped. Partitions another owner
/// holds are left out of the result. Results come back in partition order.
pub fn traverse_partitions<S, R, W, OpenFn, WalkerFn>(
    partitions: Vec<IntervalShard>,
    open_sources: OpenFn,
    config: &TraversalConfig,
    make_walker: WalkerFn,
    ownership: Option<Ownership<'_>>,
) -> Result<Vec<ShardResult<W::Summary>>>
where
    S: Iterator<Item = R>,
    R: Located + Grouped + 'static,
    W: Walker<R>,
    W::Summary: Send,
    OpenFn: Fn(&IntervalShard) -> Result<Vec<S>> + Sync,
    WalkerFn: Fn() -> W + Sync,
{
    let mut results = Vec::new();
    traverse_partitions_with(partitions, open_sources, config, make_walker, ownership, |r| {
        results.push(r);
        Ok(())
    })?;
    Ok(results)
}

/// Like [`traverse_partitions`], but hands each result to `sink` in partition
/// order as soon as every earlier partition has been delivered.
///
/// Returns the combined counters of the delivered results. An error from
/// `sink` stops the remaining work and is returned.
pub fn traverse_partitions_with<S, R, W, OpenFn, WalkerFn, SinkFn>(
    partitions: Vec<IntervalShard>,
    open_sources: OpenFn,
    config: &TraversalConfig,
    make_walker: WalkerFn,
    ownership: Option<Ownership<'_>>,
    mut sink: SinkFn,
) -> Result<TraversalStats>
where
    S: Iterator<Item = R>,
    R: Located + Grouped + 'static,
    W: Walker<R>,
    W::Summary: Send,
    OpenFn: Fn(&IntervalShard) -> Result<Vec<S>> + Sync,
    WalkerFn: Fn() -> W + Sync,
    SinkFn: FnMut(ShardResult<W::Summary>) -> Result<()>,
{
    config.validate()?;
    let total = partitions.len();
    let (open_sources, make_walker) = (&open_sources, &make_walker);

    let (delivered, stats) = run_ordered(config.threads, &mut sink, move |tx| {
        partitions
            .into_par_iter()
            .enumerate()
            .try_for_each_with(tx, |tx, (seq, partition)| {
                if let Some(own) = ownership {
                    if !own.tracker.claim(&partition.lease_key(), own.owner).is_owned() {
                        return send(tx, (seq, None));
                    }
                }
                let sources = open_sources(&partition)?;
                let (summary, stats) =
                    traverse_intervals(sources, partition.intervals(), config, make_walker())?;
                let result = ShardResult {
                    shard_id: partition.id(),
                    summary,
                    stats,
                };
                send(tx, (seq, Some(result)))
            })
    })?;

    info!("Traversed {} of {} partitions: {}", delivered, total, stats);
    Ok(stats)
}

/// Traverse record shards in parallel as the balancer produces them.
///
/// Results come back sorted by shard id.
pub fn traverse_shards<I, R, W, WalkerFn>(
    shards: I,
    config: &TraversalConfig,
    make_walker: WalkerFn,
) -> Result<Vec<ShardResult<W::Summary>>>
where
    I: Iterator<Item = Result<Shard<R>>> + Send,
    R: Located + Grouped + Send + 'static,
    W: Walker<R>,
    W::Summary: Send,
    WalkerFn: Fn() -> W + Sync,
{
    let mut results = Vec::new();
    traverse_shards_with(shards, config, make_walker, |r| {
        results.push(r);
        Ok(())
    })?;
    Ok(results)
}

/// Like [`traverse_shards`], but hands each result to `sink` in shard id
/// order while later shards are still being cut and traversed.
pub fn traverse_shards_with<I, R, W, WalkerFn, SinkFn>(
    shards: I,
    config: &TraversalConfig,
    make_walker: WalkerFn,
    mut sink: SinkFn,
) -> Result<TraversalStats>
where
    I: Iterator<Item = Result<Shard<R>>> + Send,
    R: Located + Grouped + Send + 'static,
    W: Walker<R>,
    W::Summary: Send,
    WalkerFn: Fn() -> W + Sync,
    SinkFn: FnMut(ShardResult<W::Summary>) -> Result<()>,
{
    config.validate()?;
    let make_walker = &make_walker;

    let (delivered, stats) = run_ordered(config.threads, &mut sink, move |tx| {
        shards.par_bridge().try_for_each_with(tx, |tx, shard| {
            let shard = shard?;
            let shard_id = shard.id();
            let (summary, stats) = traverse_sorted(shard.into_iter(), config, make_walker())?;
            let result = ShardResult {
                shard_id,
                summary,
                stats,
            };
            send(tx, (shard_id, Some(result)))
        })
    })?;

    info!("Traversed {} shards: {}", delivered, stats);
    Ok(stats)
}

/// Sum the counters of every result.
pub fn combined_stats<S>(results: &[ShardResult<S>]) -> TraversalStats {
    let mut stats = TraversalStats::default();
    for result in results {
        stats.combine(&result.stats);
    }
    stats
}

fn send<S>(tx: &Sender<Sequenced<S>>, item: Sequenced<S>) -> Result<()> {
    tx.send(item).map_err(|_| {
        TraversalError::Io(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "traversal results are no longer being received",
        ))
    })
}

/// Run `work` on a producer thread and deliver its results on this one.
///
/// `work` must tag results with consecutive sequence numbers from 0. A sink
/// error wins over the producer error it causes.
fn run_ordered<S, Work, SinkFn>(
    threads: usize,
    sink: &mut SinkFn,
    work: Work,
) -> Result<(usize, TraversalStats)>
where
    S: Send,
    Work: FnOnce(Sender<Sequenced<S>>) -> Result<()> + Send,
    SinkFn: FnMut(ShardResult<S>) -> Result<()>,
{
    let pool = if threads > 0 {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| TraversalError::Config(format!("failed to build thread pool: {}", e)))?;
        Some(pool)
    } else {
        None
    };
    let queue_size = 2 * pool
        .as_ref()
        .map_or_else(rayon::current_num_threads, |p| p.current_num_threads());
    let (tx, rx) = bounded::<Sequenced<S>>(queue_size);

    thread::scope(|scope| {
        let producer = scope.spawn(move || match &pool {
            Some(pool) => pool.install(|| work(tx)),
            None => work(tx),
        });
        let delivered = deliver_in_order(rx, sink);
        let produced = match producer.join() {
            Ok(produced) => produced,
            Err(panic) => std::panic::resume_unwind(panic),
        };
        let delivered = delivered?;
        produced?;
        Ok(delivered)
    })
}

/// Hand results to `sink` in sequence order, holding back any that finish early.
fn deliver_in_order<S, SinkFn>(
    results: Receiver<Sequenced<S>>,
    sink: &mut SinkFn,
) -> Result<(usize, TraversalStats)>
where
    SinkFn: FnMut(ShardResult<S>) -> Result<()>,
{
    let mut next_expected = 0;
    let mut pending: BTreeMap<usize, Option<ShardResult<S>>> = BTreeMap::new();
    let mut delivered = 0;
    let mut stats = TraversalStats::default();

    while let Ok((seq, result)) = results.recv() {
        pending.insert(seq, result);
        while let Some(result) = pending.remove(&next_expected) {
            next_expected += 1;
            if let Some(result) = result {
                stats.combine(&result.stats);
                delivered += 1;
                sink(result)?;
            }
        }
    }
    // anything still pending sits behind a unit that failed
    Ok((delivered, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DownsamplingMethod;
    use crate::interval::{GenomicInterval, Record};
    use crate::lease::InMemoryTracker;
    use crate::shard::ShardBalancer;
    use crate::traversal::CountingWalker;

    fn records() -> Vec<Record> {
        let mut records = Vec::new();
        for contig in 0..3 {
            for offset in 1..=100 {
                records.push(Record::mapped(contig, offset, "g", ()));
            }
        }
        records
    }

    fn partitions() -> Vec<IntervalShard> {
        (0..3)
            .map(|c| IntervalShard::new(c as usize, vec![GenomicInterval::new(c, 1, 100).unwrap()]))
            .collect()
    }

    #[test]
    fn test_traverse_partitions() {
        let all = records();
        let results = traverse_partitions(
            partitions(),
            |_| Ok(vec![all.clone().into_iter()]),
            &TraversalConfig::new(),
            CountingWalker::new,
            None,
        )
        .unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results.iter().map(|r| r.shard_id).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert!(results.iter().all(|r| r.summary.records == 100));
        assert_eq!(combined_stats(&results).records_visited, 300);
    }

    #[test]
    fn test_traverse_partitions_skips_claimed() {
        let all = records();
        let tracker = InMemoryTracker::new();
        let parts = partitions();
        tracker.claim(&parts[1].lease_key(), "someone-else");

        let results = traverse_partitions(
            parts,
            |_| Ok(vec![all.clone().into_iter()]),
            &TraversalConfig::new(),
            CountingWalker::new,
            Some(Ownership {
                tracker: &tracker,
                owner: "me",
            }),
        )
        .unwrap();
        assert_eq!(results.iter().map(|r| r.shard_id).collect::<Vec<_>>(), vec![0, 2]);
    }

    #[test]
    fn test_traverse_shards() {
        let balancer = ShardBalancer::new(records().into_iter(), 40).unwrap();
        let config = TraversalConfig::new().with_downsampling(DownsamplingMethod::Positional(1));
        let results = traverse_shards(balancer, &config, CountingWalker::new).unwrap();

        // 100 records per contig, cap 40, contig changes close shards
        assert_eq!(results.len(), 9);
        assert_eq!(combined_stats(&results).records_visited, 300);
        assert!(results.windows(2).all(|w| w[0].shard_id < w[1].shard_id));
    }

    #[test]
    fn test_deliver_in_order_holds_back_early_results() {
        let (tx, rx) = bounded(8);
        let done = |seq: usize| {
            Some(ShardResult {
                shard_id: seq,
                summary: (),
                stats: TraversalStats::default(),
            })
        };
        for seq in [2, 0, 3, 1, 5] {
            tx.send((seq, done(seq))).unwrap();
        }
        tx.send((4, None)).unwrap();
        drop(tx);

        let mut seen = Vec::new();
        let (delivered, _) = deliver_in_order(rx, &mut |r: ShardResult<()>| {
            seen.push(r.shard_id);
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec![0, 1, 2, 3, 5]);
        assert_eq!(delivered, 5);
    }

    #[test]
    fn test_traverse_partitions_on_own_pool() {
        let all = records();
        let config = TraversalConfig::new().with_threads(2);
        let results = traverse_partitions(
            partitions(),
            |_| Ok(vec![all.clone().into_iter()]),
            &config,
            CountingWalker::new,
            None,
        )
        .unwrap();
        assert_eq!(combined_stats(&results).records_visited, 300);
    }
}
