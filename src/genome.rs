//! Contig ordering for a run.
//!
//! A [`ContigOrder`] is built once at startup (from a `.genome` file, a
//! sequence dictionary, or a plain list of names) and handed explicitly to
//! every parser that turns contig names into indices. Positions and intervals
//! only store the index, so their ordering follows the order given here.

use rustc_hash::FxHashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{Result, TraversalError};
use crate::interval::{GenomicInterval, GenomicPosition, Locus};

/// Immutable total order over contig names, with optional lengths.
#[derive(Debug, Clone, Default)]
pub struct ContigOrder {
    names: Vec<String>,
    lengths: Vec<Option<u64>>,
    index: FxHashMap<String, u32>,
}

impl ContigOrder {
    /// Build an order from names, without lengths. Duplicates keep their first slot.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut order = Self::default();
        for name in names {
            order.push(name.into(), None);
        }
        order
    }

    /// Build an order from `(name, length)` pairs.
    pub fn from_lengths<I, S>(contigs: I) -> Self
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        let mut order = Self::default();
        for (name, length) in contigs {
            order.push(name.into(), Some(length));
        }
        order
    }

    /// Load from a file.
    ///
    /// Accepts either `.genome` lines (`name<TAB>length`) or sequence
    /// dictionary `@SQ` lines carrying `SN:` and `LN:` tags. Blank lines,
    /// `#` comments and other `@` header lines are skipped.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut order = Self::default();

        for (line_num, line_result) in reader.lines().enumerate() {
            let line = line_result?;
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (name, length) = if line.starts_with("@SQ") {
                parse_dictionary_line(line, line_num + 1)?
            } else if line.starts_with('@') {
                continue;
            } else {
                parse_genome_line(line, line_num + 1)?
            };

            if order.index.contains_key(&name) {
                return Err(TraversalError::Parse {
                    line: line_num + 1,
                    message: format!("Contig '{}' listed twice", name),
                });
            }
            order.push(name, Some(length));
        }

        Ok(order)
    }

    fn push(&mut self, name: String, length: Option<u64>) {
        if self.index.contains_key(&name) {
            return;
        }
        self.index.insert(name.clone(), self.names.len() as u32);
        self.names.push(name);
        self.lengths.push(length);
    }

    /// Index of a contig name.
    #[inline]
    pub fn index_of(&self, name: &str) -> Result<u32> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| TraversalError::UnknownContig(name.to_string()))
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Name at an index.
    #[inline]
    pub fn name(&self, index: u32) -> Option<&str> {
        self.names.get(index as usize).map(String::as_str)
    }

    /// Length at an index, if the order was built with lengths.
    #[inline]
    pub fn length(&self, index: u32) -> Option<u64> {
        self.lengths.get(index as usize).copied().flatten()
    }

    /// Contig names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Position on a named contig.
    pub fn position(&self, contig: &str, offset: u64) -> Result<GenomicPosition> {
        Ok(GenomicPosition::new(self.index_of(contig)?, offset))
    }

    /// Interval on a named contig, checked against the contig length when known.
    pub fn interval(&self, contig: &str, start: u64, stop: u64) -> Result<GenomicInterval> {
        let index = self.index_of(contig)?;
        if let Some(length) = self.length(index) {
            if stop > length {
                return Err(TraversalError::Config(format!(
                    "Interval {}:{}-{} extends past the end of the contig ({} bp)",
                    contig, start, stop, length
                )));
            }
        }
        GenomicInterval::new(index, start, stop)
    }

    /// The whole of a contig. Requires a known length.
    pub fn whole_contig(&self, contig: &str) -> Result<GenomicInterval> {
        let index = self.index_of(contig)?;
        let length = self.length(index).ok_or_else(|| {
            TraversalError::Config(format!("Length of contig '{}' is unknown", contig))
        })?;
        GenomicInterval::new(index, 1, length)
    }

    /// Every contig as one whole-contig interval, in order.
    pub fn whole_genome(&self) -> Result<Vec<GenomicInterval>> {
        self.names.iter().map(|name| self.whole_contig(name)).collect()
    }

    /// [`whole_genome`](Self::whole_genome) followed by the unmapped sentinel,
    /// so that scoping to it drops no record.
    pub fn everything(&self) -> Result<Vec<GenomicInterval>> {
        let mut intervals = self.whole_genome()?;
        intervals.push(GenomicInterval::UNMAPPED);
        Ok(intervals)
    }

    /// Parse an interval string.
    ///
    /// Accepted forms: `contig`, `contig:pos`, `contig:start-stop`,
    /// `contig:start+` (through the end of the contig) and `unmapped`.
    /// Thousands separators (`1,000`) are allowed in numbers.
    pub fn parse_interval(&self, text: &str) -> Result<GenomicInterval> {
        let text = text.trim();
        if text.eq_ignore_ascii_case("unmapped") {
            return Ok(GenomicInterval::UNMAPPED);
        }
        // Contig names may themselves contain ':' (e.g. HLA alleles)
        if self.contains(text) {
            return self.whole_contig(text);
        }

        let (contig, range) = text.rsplit_once(':').ok_or_else(|| bad_interval(text))?;
        if let Some(start) = range.strip_suffix('+') {
            let start = parse_coordinate(start, text)?;
            let index = self.index_of(contig)?;
            let length = self.length(index).ok_or_else(|| {
                TraversalError::Config(format!("Length of contig '{}' is unknown", contig))
            })?;
            return GenomicInterval::new(index, start, length);
        }

        match range.split_once('-') {
            Some((start, stop)) => {
                let start = parse_coordinate(start, text)?;
                let stop = parse_coordinate(stop, text)?;
                self.interval(contig, start, stop)
            }
            None => {
                let pos = parse_coordinate(range, text)?;
                self.interval(contig, pos, pos)
            }
        }
    }

    /// Display wrapper that prints contig names instead of indices.
    pub fn display<'a>(&'a self, interval: &'a GenomicInterval) -> NamedInterval<'a> {
        NamedInterval {
            order: self,
            interval,
        }
    }

    /// Human-readable locus using contig names.
    pub fn describe_locus(&self, locus: &Locus) -> String {
        match locus {
            Locus::Unmapped => "unmapped".to_string(),
            Locus::Mapped(pos) => match self.name(pos.contig) {
                Some(name) => format!("{}:{}", name, pos.offset),
                None => pos.to_string(),
            },
        }
    }
}

/// An interval rendered with its contig name (`chr1:100-200`).
pub struct NamedInterval<'a> {
    order: &'a ContigOrder,
    interval: &'a GenomicInterval,
}

impl fmt::Display for NamedInterval<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let iv = self.interval;
        if iv.is_unmapped() {
            return write!(f, "unmapped");
        }
        match self.order.name(iv.contig()) {
            Some(name) if iv.start() == iv.stop() => write!(f, "{}:{}", name, iv.start()),
            Some(name) => write!(f, "{}:{}-{}", name, iv.start(), iv.stop()),
            None => write!(f, "{}", iv),
        }
    }
}

fn parse_genome_line(line: &str, line_num: usize) -> Result<(String, u64)> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 2 {
        return Err(TraversalError::Parse {
            line: line_num,
            message: "Genome file requires two columns: contig and length".to_string(),
        });
    }
    let length = fields[1].trim().parse().map_err(|_| TraversalError::Parse {
        line: line_num,
        message: format!("Invalid contig length: {}", fields[1]),
    })?;
    Ok((fields[0].to_string(), length))
}

fn parse_dictionary_line(line: &str, line_num: usize) -> Result<(String, u64)> {
    let mut name = None;
    let mut length = None;
    for field in line.split('\t').skip(1) {
        if let Some(sn) = field.strip_prefix("SN:") {
            name = Some(sn.to_string());
        } else if let Some(ln) = field.strip_prefix("LN:") {
            length = Some(ln.parse().map_err(|_| TraversalError::Parse {
                line: line_num,
                message: format!("Invalid LN tag: {}", ln),
            })?);
        }
    }
    match (name, length) {
        (Some(name), Some(length)) => Ok((name, length)),
        _ => Err(TraversalError::Parse {
            line: line_num,
            message: "@SQ line requires SN and LN tags".to_string(),
        }),
    }
}

fn parse_coordinate(text: &str, whole: &str) -> Result<u64> {
    let digits: String = text.chars().filter(|&c| c != ',').collect();
    digits.trim().parse().map_err(|_| bad_interval(whole))
}

fn bad_interval(text: &str) -> TraversalError {
    TraversalError::Config(format!("Unable to parse interval '{}'", text))
}
