//! Core genomic coordinate types.
//!
//! Coordinates are 1-based and both ends of an interval are inclusive.
//! Contigs are referenced by their index in a [`ContigOrder`](crate::genome::ContigOrder),
//! so comparing two positions never needs the contig names.

use std::cmp::Ordering;
use std::fmt;

use crate::error::{Result, TraversalError};

/// Contig index reserved for the unmapped sentinel. It sorts after every real contig.
const UNMAPPED_CONTIG: u32 = u32::MAX;

/// A single base on a contig.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GenomicPosition {
    pub contig: u32,
    pub offset: u64,
}

impl GenomicPosition {
    #[inline]
    pub fn new(contig: u32, offset: u64) -> Self {
        Self { contig, offset }
    }
}

impl fmt::Display for GenomicPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.contig, self.offset)
    }
}

/// Where a record sits: at a mapped position, or nowhere.
///
/// `Unmapped` sorts after every mapped position, so unmapped records
/// always form the tail of a sorted stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Locus {
    Mapped(GenomicPosition),
    Unmapped,
}

impl Locus {
    #[inline]
    pub fn at(contig: u32, offset: u64) -> Self {
        Locus::Mapped(GenomicPosition::new(contig, offset))
    }

    #[inline]
    pub fn is_unmapped(&self) -> bool {
        matches!(self, Locus::Unmapped)
    }

    #[inline]
    pub fn position(&self) -> Option<GenomicPosition> {
        match self {
            Locus::Mapped(pos) => Some(*pos),
            Locus::Unmapped => None,
        }
    }

    #[inline]
    pub fn contig(&self) -> Option<u32> {
        self.position().map(|p| p.contig)
    }
}

impl From<GenomicPosition> for Locus {
    fn from(pos: GenomicPosition) -> Self {
        Locus::Mapped(pos)
    }
}

impl fmt::Display for Locus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locus::Mapped(pos) => write!(f, "{}", pos),
            Locus::Unmapped => write!(f, "unmapped"),
        }
    }
}

/// Anything with a genomic address.
pub trait Located {
    fn locus(&self) -> Locus;
}

/// Anything carrying a group key (sample, read group, track name).
pub trait Grouped {
    fn group(&self) -> &str;
}

impl<T: Located + ?Sized> Located for &T {
    #[inline]
    fn locus(&self) -> Locus {
        (**self).locus()
    }
}

impl<T: Grouped + ?Sized> Grouped for &T {
    #[inline]
    fn group(&self) -> &str {
        (**self).group()
    }
}

/// A contiguous, immutable range `[start, stop]` on one contig.
///
/// The only instance with `start > stop` is [`GenomicInterval::UNMAPPED`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GenomicInterval {
    contig: u32,
    start: u64,
    stop: u64,
}

impl GenomicInterval {
    /// Sentinel standing for "all unmapped data".
    pub const UNMAPPED: GenomicInterval = GenomicInterval {
        contig: UNMAPPED_CONTIG,
        start: 1,
        stop: 0,
    };

    /// Create a new interval, rejecting empty or 0-based ranges.
    pub fn new(contig: u32, start: u64, stop: u64) -> Result<Self> {
        if start == 0 || start > stop || contig == UNMAPPED_CONTIG {
            return Err(TraversalError::InvalidInterval { start, stop });
        }
        Ok(Self {
            contig,
            start,
            stop,
        })
    }

    /// A one-base interval.
    pub fn point(position: GenomicPosition) -> Result<Self> {
        Self::new(position.contig, position.offset, position.offset)
    }

    #[inline]
    pub fn contig(&self) -> u32 {
        self.contig
    }

    #[inline]
    pub fn start(&self) -> u64 {
        self.start
    }

    #[inline]
    pub fn stop(&self) -> u64 {
        self.stop
    }

    #[inline]
    pub fn is_unmapped(&self) -> bool {
        self.contig == UNMAPPED_CONTIG
    }

    /// Number of bases covered. Zero for the unmapped sentinel.
    #[inline]
    pub fn size(&self) -> u64 {
        if self.is_unmapped() {
            0
        } else {
            self.stop - self.start + 1
        }
    }

    pub fn start_position(&self) -> GenomicPosition {
        GenomicPosition::new(self.contig, self.start)
    }

    pub fn stop_position(&self) -> GenomicPosition {
        GenomicPosition::new(self.contig, self.stop)
    }

    #[inline]
    pub fn on_same_contig(&self, other: &GenomicInterval) -> bool {
        self.contig == other.contig
    }

    /// True if the two intervals share at least one base.
    #[inline]
    pub fn overlaps(&self, other: &GenomicInterval) -> bool {
        !self.is_unmapped()
            && !other.is_unmapped()
            && self.contig == other.contig
            && self.start <= other.stop
            && other.start <= self.stop
    }

    /// True if the intervals abut without sharing a base.
    #[inline]
    pub fn contiguous(&self, other: &GenomicInterval) -> bool {
        !self.is_unmapped()
            && !other.is_unmapped()
            && self.contig == other.contig
            && (self.stop.checked_add(1) == Some(other.start)
                || other.stop.checked_add(1) == Some(self.start))
    }

    /// True if this interval ends before `other` starts.
    #[inline]
    pub fn is_before(&self, other: &GenomicInterval) -> bool {
        match self.contig.cmp(&other.contig) {
            Ordering::Less => true,
            Ordering::Equal => self.stop < other.start,
            Ordering::Greater => false,
        }
    }

    /// True if this interval starts after `other` ends.
    #[inline]
    pub fn is_past(&self, other: &GenomicInterval) -> bool {
        match self.contig.cmp(&other.contig) {
            Ordering::Less => false,
            Ordering::Equal => self.start > other.stop,
            Ordering::Greater => true,
        }
    }

    #[inline]
    pub fn starts_before(&self, other: &GenomicInterval) -> bool {
        (self.contig, self.start) < (other.contig, other.start)
    }

    #[inline]
    pub fn contains(&self, other: &GenomicInterval) -> bool {
        self.on_same_contig(other) && self.start <= other.start && self.stop >= other.stop
    }

    /// True if the position falls inside this interval.
    #[inline]
    pub fn contains_position(&self, position: &GenomicPosition) -> bool {
        self.contig == position.contig && self.start <= position.offset && position.offset <= self.stop
    }

    /// Distance between the two start positions, `None` across contigs.
    pub fn distance(&self, other: &GenomicInterval) -> Option<u64> {
        if !self.on_same_contig(other) || self.is_unmapped() {
            return None;
        }
        Some(self.start.abs_diff(other.start))
    }

    /// Gap between the closest ends; 0 when overlapping, `None` across contigs.
    pub fn min_distance(&self, other: &GenomicInterval) -> Option<u64> {
        if !self.on_same_contig(other) || self.is_unmapped() {
            return None;
        }
        if self.overlaps(other) {
            return Some(0);
        }
        if self.stop < other.start {
            Some(other.start - self.stop)
        } else {
            Some(self.start - other.stop)
        }
    }

    /// Smallest interval covering both. Requires overlap or contiguity.
    pub fn merge(&self, other: &GenomicInterval) -> Result<GenomicInterval> {
        if let Some(both_unmapped) = self.unmapped_pair(other, "merge")? {
            return Ok(both_unmapped);
        }
        if !self.overlaps(other) && !self.contiguous(other) {
            return Err(TraversalError::NotContiguous {
                a: self.to_string(),
                b: other.to_string(),
            });
        }
        Ok(self.span_unchecked(other))
    }

    /// The shared bases of two overlapping intervals.
    pub fn intersect(&self, other: &GenomicInterval) -> Result<GenomicInterval> {
        if let Some(both_unmapped) = self.unmapped_pair(other, "intersect")? {
            return Ok(both_unmapped);
        }
        if !self.overlaps(other) {
            return Err(self.not_overlapping("intersect", other));
        }
        Ok(GenomicInterval {
            contig: self.contig,
            start: self.start.max(other.start),
            stop: self.stop.min(other.stop),
        })
    }

    /// Pieces of `self` not covered by `other`, in coordinate order.
    ///
    /// Returns zero, one or two intervals. The intervals must overlap.
    pub fn subtract(&self, other: &GenomicInterval) -> Result<Vec<GenomicInterval>> {
        if let Some(both_unmapped) = self.unmapped_pair(other, "subtract")? {
            return Ok(vec![both_unmapped]);
        }
        if !self.overlaps(other) {
            return Err(self.not_overlapping("subtract", other));
        }

        let mut pieces = Vec::with_capacity(2);
        if self.start < other.start {
            pieces.push(GenomicInterval {
                contig: self.contig,
                start: self.start,
                stop: other.start - 1,
            });
        }
        if self.stop > other.stop {
            pieces.push(GenomicInterval {
                contig: self.contig,
                start: other.stop + 1,
                stop: self.stop,
            });
        }
        Ok(pieces)
    }

    /// Cut into `[start, at - 1]` and `[at, stop]`. Both halves must be non-empty.
    pub fn split(&self, at: u64) -> Result<(GenomicInterval, GenomicInterval)> {
        if self.is_unmapped() || at <= self.start || at > self.stop {
            return Err(TraversalError::SplitOutOfRange {
                interval: self.to_string(),
                point: at,
            });
        }
        Ok((
            GenomicInterval {
                contig: self.contig,
                start: self.start,
                stop: at - 1,
            },
            GenomicInterval {
                contig: self.contig,
                start: at,
                stop: self.stop,
            },
        ))
    }

    /// Region between the outer endpoints of two intervals on the same contig.
    pub fn endpoint_span(&self, other: &GenomicInterval) -> Result<GenomicInterval> {
        if self.is_unmapped() || other.is_unmapped() {
            return Err(TraversalError::MixedMapping { op: "span" });
        }
        if !self.on_same_contig(other) {
            return Err(TraversalError::DifferentContigs {
                a: self.to_string(),
                b: other.to_string(),
            });
        }
        Ok(self.span_unchecked(other))
    }

    #[inline]
    fn span_unchecked(&self, other: &GenomicInterval) -> GenomicInterval {
        GenomicInterval {
            contig: self.contig,
            start: self.start.min(other.start),
            stop: self.stop.max(other.stop),
        }
    }

    /// `Some(UNMAPPED)` if both are unmapped, an error if only one is.
    fn unmapped_pair(
        &self,
        other: &GenomicInterval,
        op: &'static str,
    ) -> Result<Option<GenomicInterval>> {
        match (self.is_unmapped(), other.is_unmapped()) {
            (true, true) => Ok(Some(GenomicInterval::UNMAPPED)),
            (false, false) => Ok(None),
            _ => Err(TraversalError::MixedMapping { op }),
        }
    }

    fn not_overlapping(&self, op: &'static str, other: &GenomicInterval) -> TraversalError {
        TraversalError::NotOverlapping {
            op,
            a: self.to_string(),
            b: other.to_string(),
        }
    }
}

impl Located for GenomicInterval {
    fn locus(&self) -> Locus {
        if self.is_unmapped() {
            Locus::Unmapped
        } else {
            Locus::Mapped(self.start_position())
        }
    }
}

impl fmt::Display for GenomicInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unmapped() {
            write!(f, "unmapped")
        } else if self.start == self.stop {
            write!(f, "{}:{}", self.contig, self.start)
        } else {
            write!(f, "{}:{}-{}", self.contig, self.start, self.stop)
        }
    }
}

impl Ord for GenomicInterval {
    fn cmp(&self, other: &Self) -> Ordering {
        self.contig
            .cmp(&other.contig)
            .then(self.start.cmp(&other.start))
            .then(self.stop.cmp(&other.stop))
    }
}

impl PartialOrd for GenomicInterval {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A positioned record with an opaque payload.
///
/// The engine only ever looks at `locus` and `group`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record<P = ()> {
    pub locus: Locus,
    pub group: String,
    pub payload: P,
}

impl<P> Record<P> {
    pub fn new(locus: Locus, group: impl Into<String>, payload: P) -> Self {
        Self {
            locus,
            group: group.into(),
            payload,
        }
    }

    /// A record at `contig:offset`.
    pub fn mapped(contig: u32, offset: u64, group: impl Into<String>, payload: P) -> Self {
        Self::new(Locus::at(contig, offset), group, payload)
    }

    pub fn unmapped(group: impl Into<String>, payload: P) -> Self {
        Self::new(Locus::Unmapped, group, payload)
    }
}

impl<P> Located for Record<P> {
    #[inline]
    fn locus(&self) -> Locus {
        self.locus
    }
}

impl<P> Grouped for Record<P> {
    #[inline]
    fn group(&self) -> &str {
        &self.group
    }
}
