//! Pattern scan over a module's address range.

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::host::NativeRuntime;
use crate::memory::ReadMemory;
use crate::pattern::parse_pattern;
use crate::profile::ScanSpec;

const SCAN_CHUNK: usize = 4096;

/// One pattern hit plus the byte window dumped at it.
#[derive(Debug, Clone)]
pub struct ScanMatch {
    pub address: u64,
    pub window: Vec<u8>,
}

/// Scan `[start, end)` for `pattern`, returning every match address.
///
/// Reads happen in fixed chunks with a pattern-length overlap so matches that
/// straddle a chunk boundary are still found. Unreadable chunks are skipped.
pub fn scan_range<R: ReadMemory + ?Sized>(
    reader: &R,
    start: u64,
    end: u64,
    pattern: &[Option<u8>],
) -> Result<Vec<u64>> {
    if pattern.is_empty() {
        return Err(Error::InvalidPattern("Pattern is empty".to_string()));
    }

    let mut hits = Vec::new();
    if end <= start {
        return Ok(hits);
    }

    let tail = pattern.len() - 1;
    let mut pos = start;
    while pos < end {
        let remain = (end - pos) as usize;
        let span = SCAN_CHUNK.min(remain);
        let read_len = remain.min(span + tail);

        if let Ok(buffer) = reader.read_bytes(pos, read_len) {
            find_matches(&buffer, pattern, span, pos, &mut hits);
        }

        pos += span as u64;
    }

    Ok(hits)
}

/// Collect matches whose start index falls inside `span`; the overlap region
/// beyond it belongs to the next chunk.
fn find_matches(
    buffer: &[u8],
    pattern: &[Option<u8>],
    span: usize,
    base: u64,
    hits: &mut Vec<u64>,
) {
    let limit = span.min(buffer.len());
    match pattern[0] {
        Some(anchor) => {
            for index in memchr::memchr_iter(anchor, buffer) {
                if index >= limit {
                    break;
                }
                if matches_at(buffer, index, pattern) {
                    hits.push(base + index as u64);
                }
            }
        }
        None => {
            for index in 0..limit {
                if matches_at(buffer, index, pattern) {
                    hits.push(base + index as u64);
                }
            }
        }
    }
}

fn matches_at(buffer: &[u8], index: usize, pattern: &[Option<u8>]) -> bool {
    if index + pattern.len() > buffer.len() {
        return false;
    }
    pattern
        .iter()
        .zip(&buffer[index..])
        .all(|(p, b)| p.is_none_or(|v| v == *b))
}

/// Resolve the scan range from the profile and dump a window at every hit.
pub fn run_scan<N: NativeRuntime + ?Sized>(rt: &N, spec: &ScanSpec) -> Result<Vec<ScanMatch>> {
    let pattern = parse_pattern(&spec.pattern)?;
    let base = rt.module_base(&spec.module)?;
    let end = rt.export_address(&spec.module, &spec.end_export)?;
    debug!(
        "scanning {} from {:#x} to {:#x} for {}",
        spec.module, base, end, spec.pattern
    );

    let mut matches = Vec::new();
    for address in scan_range(rt, base, end, &pattern)? {
        info!("pattern hit at {address:#x}");
        matches.push(ScanMatch {
            address,
            window: read_window(rt, address, end, spec.window),
        });
    }
    Ok(matches)
}

fn read_window<N: NativeRuntime + ?Sized>(rt: &N, address: u64, end: u64, want: usize) -> Vec<u8> {
    if let Ok(bytes) = rt.read_bytes(address, want) {
        return bytes;
    }
    // The full window may run past the mapped range; fall back to what is left.
    let rest = usize::try_from(end.saturating_sub(address))
        .unwrap_or(0)
        .min(want);
    match rt.read_bytes(address, rest) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!("window read at {address:#x} failed: {e}");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ImageReader;
    use crate::standin::StandInTarget;

    const BASE: u64 = 0x10000;

    fn image_with(pattern_at: &[(usize, &[u8])], len: usize) -> ImageReader {
        let mut image = vec![0u8; len];
        for (offset, bytes) in pattern_at {
            image[*offset..*offset + bytes.len()].copy_from_slice(bytes);
        }
        ImageReader::new(BASE, image)
    }

    #[test]
    fn test_scan_finds_match() {
        let reader = image_with(&[(0x20, b"APIIT{")], 0x100);
        let pattern = parse_pattern("41 50 49 49 54 7B").unwrap();
        let hits = scan_range(&reader, BASE, BASE + 0x100, &pattern).unwrap();
        assert_eq!(hits, vec![BASE + 0x20]);
    }

    #[test]
    fn test_scan_absent_pattern_reports_nothing() {
        let reader = image_with(&[], 0x100);
        let pattern = parse_pattern("41 50 49 49 54 7B").unwrap();
        let hits = scan_range(&reader, BASE, BASE + 0x100, &pattern).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_scan_match_straddling_chunk_boundary() {
        // Pattern starts two bytes before the 4 KiB chunk edge.
        let offset = SCAN_CHUNK - 2;
        let reader = image_with(&[(offset, b"APIIT{")], SCAN_CHUNK * 2);
        let pattern = parse_pattern("41 50 49 49 54 7B").unwrap();
        let hits = scan_range(&reader, BASE, BASE + (SCAN_CHUNK as u64) * 2, &pattern).unwrap();
        assert_eq!(hits, vec![BASE + offset as u64]);
    }

    #[test]
    fn test_scan_multiple_and_wildcard_matches() {
        let reader = image_with(&[(0x10, b"APIIT{"), (0x80, b"APXIT{")], 0x100);
        let pattern = parse_pattern("41 50 ?? 49 54 7B").unwrap();
        let hits = scan_range(&reader, BASE, BASE + 0x100, &pattern).unwrap();
        assert_eq!(hits, vec![BASE + 0x10, BASE + 0x80]);
    }

    #[test]
    fn test_scan_ignores_match_past_range_end() {
        let reader = image_with(&[(0xFC, b"APIIT{")], 0x200);
        let pattern = parse_pattern("41 50 49 49 54 7B").unwrap();
        // Range ends mid-pattern.
        let hits = scan_range(&reader, BASE, BASE + 0x100, &pattern).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_scan_empty_range() {
        let reader = image_with(&[], 0x100);
        let pattern = parse_pattern("41").unwrap();
        assert!(scan_range(&reader, BASE, BASE, &pattern).unwrap().is_empty());
    }

    #[test]
    fn test_run_scan_against_secureapp_standin() {
        let target = StandInTarget::secureapp();
        let profile = crate::profile::builtin_profile();

        let matches = run_scan(&target, &profile.scan).unwrap();
        assert_eq!(matches.len(), 1);
        assert!(matches[0].window.starts_with(b"APIIT{"));
        assert_eq!(matches[0].window.len(), profile.scan.window);
    }

    #[test]
    fn test_run_scan_unresolvable_module() {
        let target = StandInTarget::secureapp();
        let mut spec = crate::profile::builtin_profile().scan;
        spec.module = "libmissing.so".to_string();

        assert!(run_scan(&target, &spec).unwrap_err().is_resolution());
    }
}
