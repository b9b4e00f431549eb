//! Error types for the traversal engine.
//!
//! Every fatal condition the engine can detect is a distinct variant so that
//! callers can tell a caller-contract violation from a configuration mistake
//! or an I/O failure. Nothing here is retried and nothing is folded into the
//! downsampling or filtering counters.

use std::io;
use thiserror::Error;

/// Errors raised by interval algebra, partitioning, sharding and traversal.
#[derive(Error, Debug)]
pub enum TraversalError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Contig '{0}' is not part of the contig order")]
    UnknownContig(String),

    #[error("Invalid interval {start}-{stop}: coordinates are 1-based and start must not exceed stop")]
    InvalidInterval { start: u64, stop: u64 },

    #[error("Cannot {op} a mapped and an unmapped interval")]
    MixedMapping { op: &'static str },

    #[error("Cannot {op} {a} and {b}: intervals do not overlap")]
    NotOverlapping {
        op: &'static str,
        a: String,
        b: String,
    },

    #[error("Cannot merge {a} and {b}: intervals are neither overlapping nor contiguous")]
    NotContiguous { a: String, b: String },

    #[error("Cannot span {a} and {b}: intervals lie on different contigs")]
    DifferentContigs { a: String, b: String },

    #[error("Unable to split {interval} at {point}: split point is not inside the interval")]
    SplitOutOfRange { interval: String, point: u64 },

    #[error("The INTERSECTION of the interval lists produced no intervals")]
    EmptyIntersection,

    #[error("Input not sorted: {current} comes after {previous}")]
    UnsortedInput { previous: String, current: String },
}

pub type Result<T> = std::result::Result<T, TraversalError>;

impl TraversalError {
    /// Build an [`TraversalError::UnsortedInput`] from anything displayable.
    pub fn unsorted(previous: impl ToString, current: impl ToString) -> Self {
        TraversalError::UnsortedInput {
            previous: previous.to_string(),
            current: current.to_string(),
        }
    }

    /// True for errors that indicate the caller broke an ordering or addressing contract.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            TraversalError::InvalidInterval { .. }
                | TraversalError::MixedMapping { .. }
                | TraversalError::NotOverlapping { .. }
                | TraversalError::NotContiguous { .. }
                | TraversalError::DifferentContigs { .. }
                | TraversalError::SplitOutOfRange { .. }
                | TraversalError::EmptyIntersection
                | TraversalError::UnsortedInput { .. }
        )
    }
}
