//! Efficient output formatting for intervals and records.
//!
//! Uses itoa for integer formatting to avoid allocation in the hot path.

use std::io::{BufWriter, Write};

use crate::error::{Result, TraversalError};
use crate::genome::ContigOrder;
use crate::interval::{GenomicInterval, Locus, Record};
use crate::streaming::parsing::UNMAPPED_CONTIG_FIELD;

/// Buffer size for TsvWriter (8MB default).
const DEFAULT_BUFFER_SIZE: usize = 8 * 1024 * 1024;

/// Buffered writer for interval lists and record streams.
///
/// Contig indices are written back as names from the [`ContigOrder`].
pub struct TsvWriter<'g, W: Write> {
    writer: BufWriter<W>,
    order: &'g ContigOrder,
    itoa_buf: itoa::Buffer,
}

impl<'g, W: Write> TsvWriter<'g, W> {
    /// Create a new TsvWriter with default 8MB buffer.
    pub fn new(output: W, order: &'g ContigOrder) -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE, output, order)
    }

    pub fn with_capacity(capacity: usize, output: W, order: &'g ContigOrder) -> Self {
        Self {
            writer: BufWriter::with_capacity(capacity, output),
            order,
            itoa_buf: itoa::Buffer::new(),
        }
    }

    fn contig_name(&self, contig: u32) -> Result<&'g str> {
        self.order.name(contig).ok_or_else(|| {
            TraversalError::UnknownContig(format!("#{}", contig))
        })
    }

    /// Write an interval as `contig:start-stop` (1-based, inclusive).
    #[inline]
    pub fn write_interval(&mut self, interval: &GenomicInterval) -> Result<()> {
        if interval.is_unmapped() {
            self.writer.write_all(b"unmapped\n")?;
            return Ok(());
        }
        let name = self.contig_name(interval.contig())?;
        self.writer.write_all(name.as_bytes())?;
        self.writer.write_all(b":")?;
        self.writer
            .write_all(self.itoa_buf.format(interval.start()).as_bytes())?;
        self.writer.write_all(b"-")?;
        self.writer
            .write_all(self.itoa_buf.format(interval.stop()).as_bytes())?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    /// Write an interval as a BED3 line (0-based, half-open).
    ///
    /// The unmapped sentinel has no BED form and is skipped.
    #[inline]
    pub fn write_interval_bed(&mut self, interval: &GenomicInterval) -> Result<()> {
        if interval.is_unmapped() {
            return Ok(());
        }
        let name = self.contig_name(interval.contig())?;
        self.writer.write_all(name.as_bytes())?;
        self.writer.write_all(b"\t")?;
        self.writer
            .write_all(self.itoa_buf.format(interval.start() - 1).as_bytes())?;
        self.writer.write_all(b"\t")?;
        self.writer
            .write_all(self.itoa_buf.format(interval.stop()).as_bytes())?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    /// Write `contig<TAB>pos<TAB>group[<TAB>payload]`.
    #[inline]
    pub fn write_record<P: AsRef<[u8]>>(&mut self, record: &Record<P>) -> Result<()> {
        match record.locus {
            Locus::Mapped(pos) => {
                let name = self.contig_name(pos.contig)?;
                self.writer.write_all(name.as_bytes())?;
                self.writer.write_all(b"\t")?;
                self.writer
                    .write_all(self.itoa_buf.format(pos.offset).as_bytes())?;
            }
            Locus::Unmapped => {
                self.writer.write_all(UNMAPPED_CONTIG_FIELD)?;
                self.writer.write_all(b"\t0")?;
            }
        }
        self.writer.write_all(b"\t")?;
        self.writer.write_all(record.group.as_bytes())?;

        let payload = record.payload.as_ref();
        if !payload.is_empty() {
            self.writer.write_all(b"\t")?;
            self.writer.write_all(payload)?;
        }
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    /// Write a full line as-is with newline.
    #[inline]
    pub fn write_line(&mut self, line: &[u8]) -> Result<()> {
        self.writer.write_all(line)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    /// Write an integer using itoa.
    #[inline]
    pub fn write_int<I: itoa::Integer>(&mut self, n: I) -> Result<()> {
        self.writer.write_all(self.itoa_buf.format(n).as_bytes())?;
        Ok(())
    }

    /// Write raw bytes.
    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes)?;
        Ok(())
    }

    /// Flush the output buffer.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
