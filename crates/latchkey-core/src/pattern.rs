//! Byte-pattern parsing for the memory scan.
//!
//! Patterns are space-separated hex tokens; `??` (or `?`) marks a wildcard byte.

use crate::error::{Error, Result};

pub fn parse_pattern(pattern: &str) -> Result<Vec<Option<u8>>> {
    let mut bytes = Vec::new();
    for token in pattern.split_whitespace() {
        if token == "??" || token == "?" {
            bytes.push(None);
            continue;
        }

        let value = u8::from_str_radix(token, 16)
            .map_err(|e| Error::InvalidPattern(format!("Invalid pattern token '{}': {}", token, e)))?;
        bytes.push(Some(value));
    }

    if bytes.is_empty() {
        return Err(Error::InvalidPattern("Pattern is empty".to_string()));
    }

    Ok(bytes)
}

pub fn format_pattern(bytes: &[Option<u8>]) -> String {
    bytes
        .iter()
        .map(|b| match b {
            Some(value) => format!("{:02X}", value),
            None => "??".to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pattern_plain() {
        let bytes = parse_pattern("41 50 49 49 54 7B").unwrap();
        assert_eq!(bytes.len(), 6);
        assert_eq!(bytes[0], Some(0x41));
        assert_eq!(bytes[5], Some(0x7B));
    }

    #[test]
    fn test_parse_pattern_with_wildcards() {
        let bytes = parse_pattern("41 ?? 49 ? 54").unwrap();
        assert_eq!(bytes, vec![Some(0x41), None, Some(0x49), None, Some(0x54)]);
    }

    #[test]
    fn test_parse_pattern_rejects_garbage() {
        assert!(parse_pattern("41 zz").is_err());
        assert!(parse_pattern("").is_err());
        assert!(parse_pattern("   ").is_err());
    }

    #[test]
    fn test_format_pattern_roundtrip() {
        let pattern = vec![Some(0x41), Some(0x50), None, Some(0xFF)];
        let formatted = format_pattern(&pattern);
        assert_eq!(formatted, "41 50 ?? FF");
        let parsed = parse_pattern(&formatted).unwrap();
        assert_eq!(parsed, pattern);
    }
}
