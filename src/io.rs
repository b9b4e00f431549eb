//! Streaming readers for interval lists and record files.
//!
//! Interval lists are either BED (0-based, half-open) or one
//! `contig:start-stop` per line. Record files hold one record per line as
//! `contig<TAB>pos<TAB>group[<TAB>payload]` with `*` for unmapped records.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crate::error::{Result, TraversalError};
use crate::genome::ContigOrder;
use crate::interval::{GenomicInterval, Locus, Record};
use crate::streaming::{parse_bed3_bytes, parse_record_bytes, should_skip_line};

/// Record type produced by [`RecordReader`].
pub type TextRecord = Record<String>;

/// A streaming interval list reader.
pub struct IntervalReader<'g, R: Read> {
    reader: BufReader<R>,
    order: &'g ContigOrder,
    line_number: usize,
    buffer: Vec<u8>,
}

impl<'g> IntervalReader<'g, File> {
    pub fn from_path<P: AsRef<Path>>(path: P, order: &'g ContigOrder) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(file, order))
    }
}

impl<'g, R: Read> IntervalReader<'g, R> {
    pub fn new(reader: R, order: &'g ContigOrder) -> Self {
        Self {
            reader: BufReader::new(reader),
            order,
            line_number: 0,
            buffer: Vec::with_capacity(256),
        }
    }

    /// Read the next interval.
    pub fn read_interval(&mut self) -> Result<Option<GenomicInterval>> {
        loop {
            self.buffer.clear();
            let bytes_read = self.reader.read_until(b'\n', &mut self.buffer)?;
            if bytes_read == 0 {
                return Ok(None);
            }
            self.line_number += 1;

            if should_skip_line(&self.buffer) {
                continue;
            }
            return self.parse_line().map(Some);
        }
    }

    fn parse_line(&self) -> Result<GenomicInterval> {
        if let Some((chrom, start, end)) = parse_bed3_bytes(&self.buffer) {
            let chrom = std::str::from_utf8(chrom).map_err(|_| self.error("contig name is not UTF-8"))?;
            if end <= start {
                return Err(self.error(&format!("empty BED interval {}-{}", start, end)));
            }
            return self
                .order
                .interval(chrom, start + 1, end)
                .map_err(|e| self.wrap(e));
        }

        let text = std::str::from_utf8(&self.buffer).map_err(|_| self.error("line is not UTF-8"))?;
        self.order.parse_interval(text).map_err(|e| self.wrap(e))
    }

    fn error(&self, message: &str) -> TraversalError {
        TraversalError::Parse {
            line: self.line_number,
            message: message.to_string(),
        }
    }

    /// Attach the line number to errors that do not carry one.
    fn wrap(&self, e: TraversalError) -> TraversalError {
        match e {
            TraversalError::Parse { .. } | TraversalError::Io(_) => e,
            other => self.error(&other.to_string()),
        }
    }

    pub fn intervals(self) -> IntervalIter<'g, R> {
        IntervalIter { reader: self }
    }
}

/// Iterator over intervals.
pub struct IntervalIter<'g, R: Read> {
    reader: IntervalReader<'g, R>,
}

impl<R: Read> Iterator for IntervalIter<'_, R> {
    type Item = Result<GenomicInterval>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.read_interval().transpose()
    }
}

/// Read a whole interval list.
pub fn read_intervals<P: AsRef<Path>>(path: P, order: &ContigOrder) -> Result<Vec<GenomicInterval>> {
    IntervalReader::from_path(path, order)?.intervals().collect()
}

/// A streaming record reader.
pub struct RecordReader<'g, R: Read> {
    reader: BufReader<R>,
    order: &'g ContigOrder,
    line_number: usize,
    buffer: Vec<u8>,
}

impl<'g> RecordReader<'g, File> {
    pub fn from_path<P: AsRef<Path>>(path: P, order: &'g ContigOrder) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(file, order))
    }
}

impl<'g, R: Read> RecordReader<'g, R> {
    pub fn new(reader: R, order: &'g ContigOrder) -> Self {
        Self {
            reader: BufReader::new(reader),
            order,
            line_number: 0,
            buffer: Vec::with_capacity(512),
        }
    }

    /// Read the next record.
    pub fn read_record(&mut self) -> Result<Option<TextRecord>> {
        loop {
            self.buffer.clear();
            let bytes_read = self.reader.read_until(b'\n', &mut self.buffer)?;
            if bytes_read == 0 {
                return Ok(None);
            }
            self.line_number += 1;

            if should_skip_line(&self.buffer) {
                continue;
            }
            return self.parse_line().map(Some);
        }
    }

    fn parse_line(&self) -> Result<TextRecord> {
        let raw = parse_record_bytes(&self.buffer).ok_or_else(|| TraversalError::Parse {
            line: self.line_number,
            message: "Expected contig, position and group columns".to_string(),
        })?;

        let locus = match raw.contig {
            None => Locus::Unmapped,
            Some(contig) => {
                let name = std::str::from_utf8(contig).map_err(|_| TraversalError::Parse {
                    line: self.line_number,
                    message: "contig name is not UTF-8".to_string(),
                })?;
                if raw.position == 0 {
                    return Err(TraversalError::Parse {
                        line: self.line_number,
                        message: "positions are 1-based; got 0".to_string(),
                    });
                }
                let contig = self.order.index_of(name).map_err(|e| TraversalError::Parse {
                    line: self.line_number,
                    message: e.to_string(),
                })?;
                Locus::at(contig, raw.position)
            }
        };

        Ok(Record::new(
            locus,
            String::from_utf8_lossy(raw.group),
            String::from_utf8_lossy(raw.payload).into_owned(),
        ))
    }

    pub fn records(self) -> RecordIter<'g, R> {
        RecordIter { reader: self }
    }
}

/// Iterator over records.
pub struct RecordIter<'g, R: Read> {
    reader: RecordReader<'g, R>,
}

impl<R: Read> Iterator for RecordIter<'_, R> {
    type Item = Result<TextRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.read_record().transpose()
    }
}
