//! Console presentation helpers: the framed secret banner and hexdumps of
//! scan windows.

use owo_colors::OwoColorize;

const BANNER_WIDTH: usize = 60;
const ROW: usize = 16;

/// Frame the recovered secret between separator bars, matching the highlighted
/// block the log stream promises.
pub fn secret_banner(secret: &str) -> String {
    let bar = "=".repeat(BANNER_WIDTH);
    format!(
        "{bar}\nSECRET RECOVERED:\n{}\n{bar}",
        secret.bright_green().bold()
    )
}

/// Render bytes as 16-per-row hex with an ASCII gutter, addressed from `base`.
pub fn hexdump(base: u64, bytes: &[u8]) -> String {
    let mut out = String::new();
    for (row, chunk) in bytes.chunks(ROW).enumerate() {
        let address = base + (row * ROW) as u64;
        out.push_str(&format!("{address:#012x}: "));

        for col in 0..ROW {
            if col == ROW / 2 {
                out.push(' ');
            }
            match chunk.get(col) {
                Some(byte) => out.push_str(&format!("{byte:02X} ")),
                None => out.push_str("   "),
            }
        }

        out.push('|');
        for byte in chunk {
            if (0x20..0x7F).contains(byte) {
                out.push(*byte as char);
            } else {
                out.push('.');
            }
        }
        out.push('|');
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_banner_frames_value() {
        let banner = secret_banner("APIIT{x}");
        let bar = "=".repeat(60);
        assert!(banner.starts_with(&bar));
        assert!(banner.ends_with(&bar));
        assert!(banner.contains("APIIT{x}"));
    }

    #[test]
    fn test_hexdump_row_format() {
        let dump = hexdump(0x7400_0800, b"APIIT{\x00\x01");
        let line = dump.lines().next().unwrap();
        assert!(line.starts_with("0x0074000800: 41 50 49 49 54 7B 00 01"));
        assert!(line.ends_with("|APIIT{..|"));
    }

    #[test]
    fn test_hexdump_multiple_rows() {
        let dump = hexdump(0x1000, &[0u8; 20]);
        let lines: Vec<_> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("0x0000001010: "));
    }

    #[test]
    fn test_hexdump_empty() {
        assert_eq!(hexdump(0, &[]), "");
    }
}
