//! Zero-allocation line parsing for the TSV formats.
//!
//! These functions only split and convert bytes; mapping contig names to
//! indices happens in [`crate::io`], which owns the [`ContigOrder`](crate::genome::ContigOrder).

use memchr::memchr;

/// Contig field marking an unmapped record.
pub const UNMAPPED_CONTIG_FIELD: &[u8] = b"*";

/// Fast u64 parsing - no allocation, no error formatting.
///
/// Returns None if the input is empty or contains non-digit characters.
#[inline(always)]
pub fn parse_u64_fast(bytes: &[u8]) -> Option<u64> {
    if bytes.is_empty() || bytes.len() > 20 {
        return None;
    }
    let mut n: u64 = 0;
    for &b in bytes {
        let d = b.wrapping_sub(b'0');
        if d > 9 {
            return None;
        }
        n = n.checked_mul(10)?.checked_add(d as u64)?;
    }
    Some(n)
}

/// Fields of one record line, borrowed from the line buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawRecord<'a> {
    /// `None` for unmapped records.
    pub contig: Option<&'a [u8]>,
    pub position: u64,
    pub group: &'a [u8],
    pub payload: &'a [u8],
}

/// Parse `contig<TAB>pos<TAB>group[<TAB>payload]`.
///
/// A contig of `*` marks an unmapped record; its position field is ignored.
/// Everything after the third tab is the payload, tabs included.
#[inline]
pub fn parse_record_bytes(line: &[u8]) -> Option<RawRecord<'_>> {
    let line = trim_line_end(line);

    let tab1 = memchr(b'\t', line)?;
    let contig = &line[..tab1];

    let rest1 = &line[tab1 + 1..];
    let tab2 = memchr(b'\t', rest1)?;
    let pos_field = &rest1[..tab2];

    let rest2 = &rest1[tab2 + 1..];
    let (group, payload) = match memchr(b'\t', rest2) {
        Some(tab3) => (&rest2[..tab3], &rest2[tab3 + 1..]),
        None => (rest2, &rest2[rest2.len()..]),
    };
    if contig.is_empty() {
        return None;
    }

    if contig == UNMAPPED_CONTIG_FIELD {
        return Some(RawRecord {
            contig: None,
            position: 0,
            group,
            payload,
        });
    }

    Some(RawRecord {
        contig: Some(contig),
        position: parse_u64_fast(pos_field)?,
        group,
        payload,
    })
}

/// Parse BED3 fields using memchr - zero allocation.
///
/// Returns (chrom_bytes, start, end) in BED's 0-based half-open coordinates.
#[inline(always)]
pub fn parse_bed3_bytes(line: &[u8]) -> Option<(&[u8], u64, u64)> {
    let line = trim_line_end(line);

    let tab1 = memchr(b'\t', line)?;
    let chrom = &line[..tab1];

    let rest1 = &line[tab1 + 1..];
    let tab2 = memchr(b'\t', rest1)?;
    let start = parse_u64_fast(&rest1[..tab2])?;

    let rest2 = &rest1[tab2 + 1..];
    let end_len = memchr(b'\t', rest2).unwrap_or(rest2.len());
    let end = parse_u64_fast(&rest2[..end_len])?;

    Some((chrom, start, end))
}

/// Check if a line should be skipped (empty, comment, or header).
#[inline(always)]
pub fn should_skip_line(line: &[u8]) -> bool {
    let line = trim_line_end(line);
    line.is_empty()
        || line[0] == b'#'
        || line[0] == b'@'
        || line.starts_with(b"track")
        || line.starts_with(b"browser")
}

#[inline(always)]
fn trim_line_end(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && (line[end - 1] == b'\n' || line[end - 1] == b'\r') {
        end -= 1;
    }
    &line[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_u64_fast() {
        assert_eq!(parse_u64_fast(b"248956422"), Some(248_956_422));
        assert_eq!(parse_u64_fast(b"0"), Some(0));
        assert!(parse_u64_fast(b"").is_none());
        assert!(parse_u64_fast(b"1,000").is_none());
        assert_eq!(parse_u64_fast(b"18446744073709551615"), Some(u64::MAX));
        assert_eq!(parse_u64_fast(b"18446744073709551616"), None);
    }

    #[test]
    fn test_parse_record_bytes() {
        let rec = parse_record_bytes(b"chr1\t100\tsampleA\tread1\tflag").unwrap();
        assert_eq!(rec.contig, Some(&b"chr1"[..]));
        assert_eq!(rec.position, 100);
        assert_eq!(rec.group, b"sampleA");
        assert_eq!(rec.payload, b"read1\tflag");

        let rec = parse_record_bytes(b"chr2\t5\tB\n").unwrap();
        assert_eq!(rec.group, b"B");
        assert!(rec.payload.is_empty());
    }

    #[test]
    fn test_parse_unmapped_record() {
        let rec = parse_record_bytes(b"*\t0\tsampleA\tread9").unwrap();
        assert_eq!(rec.contig, None);
        assert_eq!(rec.payload, b"read9");
    }

    #[test]
    fn test_parse_record_rejects_malformed() {
        assert!(parse_record_bytes(b"chr1\t100").is_none());
        assert!(parse_record_bytes(b"chr1\tabc\tA").is_none());
        assert!(parse_record_bytes(b"\t1\tA").is_none());
    }

    #[test]
    fn test_parse_bed3_bytes() {
        assert_eq!(
            parse_bed3_bytes(b"chrX\t0\t155\ttarget_1\r\n"),
            Some((&b"chrX"[..], 0, 155))
        );
        assert!(parse_bed3_bytes(b"chrX:1-155").is_none());
        assert!(parse_bed3_bytes(b"chrX\t0").is_none());
    }

    #[test]
    fn test_should_skip_line() {
        assert!(should_skip_line(b""));
        assert!(should_skip_line(b"\n"));
        assert!(should_skip_line(b"#comment"));
        assert!(should_skip_line(b"@HD\tVN:1.6"));
        assert!(should_skip_line(b"browser position chr1"));
        assert!(!should_skip_line(b"chr1\t10\tsampleA"));
    }
}
