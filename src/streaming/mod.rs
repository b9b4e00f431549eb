//! Streaming building blocks shared by the traversal stages.
//!
//! This module provides:
//! - Zero-allocation TSV parsing
//! - Sort validation and interval scoping
//! - K-way merging of sorted sources
//! - Adaptors for fallible sources
//! - Efficient output formatting
//!
//! Nothing here buffers more than one pending element per source.

pub mod merge;
pub mod output;
pub mod parsing;
pub mod source;
pub mod validation;

pub use merge::MergingIterator;
pub use output::TsvWriter;
pub use parsing::{parse_bed3_bytes, parse_record_bytes, parse_u64_fast, should_skip_line, RawRecord};
pub use source::{CheckedSource, ErrorSlot};
pub use validation::{IntervalScoped, SortValidator, VerifyingIterator};
