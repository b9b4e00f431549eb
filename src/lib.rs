// Clippy allows for the whole crate
#![allow(clippy::type_complexity)]

//! TREK: Traversal Engine Kit
//!
//! Ordered, sharded and downsampled traversal of coordinate-sorted genomic
//! record streams.
//!
//! # Features
//!
//! - **Interval algebra**: merge, intersect, subtract and split 1-based intervals
//! - **Partitioning**: scatter interval lists into balanced parts
//! - **Sharding**: cut record streams into size-capped shards at safe boundaries
//! - **Downsampling**: fractional, reservoir, positional and per-group strategies
//! - **Parallel processing**: Uses Rayon to traverse shards on many cores
//!
//! # Example
//!
//! ```rust,no_run
//! use trek_genomics::prelude::*;
//!
//! let order = ContigOrder::from_file("ref.genome").unwrap();
//! let reader = RecordReader::from_path("reads.tsv", &order).unwrap();
//! let records = reader.records().collect::<Result<Vec<_>>>().unwrap();
//!
//! let config = TraversalConfig::new().with_downsampling(DownsamplingMethod::Positional(50));
//! let (counts, stats) = traverse(vec![records.into_iter()], &config, CountingWalker::new()).unwrap();
//! println!("{} records at {} loci ({})", counts.records, counts.loci, stats);
//! ```

pub mod config;
pub mod downsample;
pub mod error;
pub mod filter;
pub mod genome;
pub mod interval;
pub mod io;
pub mod lease;
pub mod parallel;
pub mod partition;
pub mod set_ops;
pub mod shard;
pub mod streaming;
pub mod traversal;

// Re-export commonly used types
pub use error::{Result, TraversalError};
pub use genome::ContigOrder;
pub use interval::{GenomicInterval, GenomicPosition, Locus, Record};
pub use io::{read_intervals, IntervalReader, RecordReader};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{DownsamplingMethod, FilterSpec, PartitionStrategy, TraversalConfig};
    pub use crate::downsample::{Downsampler, DownsamplerKind, DownsamplingIterator};
    pub use crate::error::{Result, TraversalError};
    pub use crate::filter::{FilterPipeline, RecordFilter};
    pub use crate::genome::ContigOrder;
    pub use crate::interval::{GenomicInterval, GenomicPosition, Grouped, Located, Locus, Record};
    pub use crate::io::{read_intervals, IntervalReader, RecordReader};
    pub use crate::partition::partition;
    pub use crate::set_ops::{combine, sort_and_merge, MergingRule, SetRule};
    pub use crate::shard::{IntervalShard, Shard, ShardBalancer};
    pub use crate::traversal::{
        traverse, traverse_intervals, traverse_sorted, CollectingWalker, CountingWalker, Walker,
    };
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;

    #[test]
    fn test_basic_workflow() {
        let order = ContigOrder::from_lengths([("chr1", 1000u64)]);
        let content = b"chr1\t99\t200\nchr1\t150\t250\nchr1\t299\t400\n";
        let intervals: Vec<_> = IntervalReader::new(&content[..], &order)
            .intervals()
            .collect::<Result<_>>()
            .unwrap();

        let merged = sort_and_merge(intervals, MergingRule::All).unwrap();

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].start(), 100);
        assert_eq!(merged[0].stop(), 250);
    }

    #[test]
    fn test_traversal_workflow() {
        let order = ContigOrder::from_lengths([("chr1", 1000u64)]);
        let content = b"chr1\t1\ta\nchr1\t1\tb\nchr1\t2\ta\n*\t0\ta\n";
        let records = RecordReader::new(&content[..], &order)
            .records()
            .collect::<Result<Vec<_>>>()
            .unwrap();

        let (counts, stats) = traverse(
            vec![records.into_iter()],
            &TraversalConfig::new(),
            CountingWalker::new(),
        )
        .unwrap();

        assert_eq!(counts.records, 4);
        assert_eq!(counts.loci, 3);
        assert_eq!(stats.records_visited, 4);
    }
}
