//! Cleanup for the Local Law 84 disclosure CSV.
//!
//! Free-text cells in the export may contain raw newlines. Such a cell is
//! wrapped in double quotes but nothing else is escaped, so a physical line
//! carrying exactly one quote opens a record that continues on the following
//! lines until one of them carries a quote. The sanitizer joins those pieces
//! with single spaces so that every logical record sits on one line, and
//! tidies whitespace (`' +'` -> `' '`, `", "` -> `","`) on every record.
//!
//! The quote-count heuristic cannot tell a stray literal quote from an opening
//! one. A record still open at end of input is reported as malformed, and the
//! CSV reader downstream rejects rows whose field count drifts.

use regex::Regex;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};

/// Counters reported after a sanitize pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SanitizeStats {
    /// Physical lines read
    pub lines_read: usize,
    /// Logical records written
    pub records_emitted: usize,
    /// Records assembled from more than one physical line
    pub records_joined: usize,
}

/// Record held open by an unmatched quote
struct Held {
    text: String,
    started_at: usize,
}

/// Line-by-line sanitizer state
pub struct CsvSanitizer {
    spaces: Regex,
    comma_space: Regex,
    held: Option<Held>,
    stats: SanitizeStats,
}

impl Default for CsvSanitizer {
    fn default() -> Self {
        Self::new()
    }
}

impl CsvSanitizer {
    pub fn new() -> Self {
        CsvSanitizer {
            spaces: Regex::new(" +").expect("static regex"),
            comma_space: Regex::new(", ").expect("static regex"),
            held: None,
            stats: SanitizeStats::default(),
        }
    }

    fn normalize(&self, line: &str) -> String {
        let collapsed = self.spaces.replace_all(line, " ");
        self.comma_space.replace_all(&collapsed, ",").into_owned()
    }

    /// Feed one physical line (without its terminator).
    /// Returns a complete logical record when one is ready.
    pub fn push_line(&mut self, line: &str) -> Option<String> {
        self.stats.lines_read += 1;
        let line = self.normalize(line);

        match self.held.take() {
            None => {
                if line.matches('"').count() == 1 {
                    self.held = Some(Held {
                        text: line.trim().to_string(),
                        started_at: self.stats.lines_read,
                    });
                    None
                } else {
                    self.stats.records_emitted += 1;
                    Some(line)
                }
            }
            Some(mut held) => {
                if line.contains('"') {
                    debug!(
                        started_at = held.started_at,
                        ended_at = self.stats.lines_read,
                        "Joined multi-line record"
                    );
                    // a space between pieces, so "FIFTH\nAVENUE" reads "FIFTH AVENUE"
                    let joined = format!("{} {}", held.text, line.trim());
                    self.stats.records_emitted += 1;
                    self.stats.records_joined += 1;
                    Some(self.normalize(&joined))
                } else {
                    held.text.push(' ');
                    held.text.push_str(line.trim());
                    self.held = Some(held);
                    None
                }
            }
        }
    }

    /// Close the pass. A record still held at end of input is an error.
    pub fn finish(self, input: &str) -> Result<SanitizeStats> {
        if let Some(held) = self.held {
            return Err(PipelineError::malformed(
                input,
                held.started_at,
                "quoted field opened here is never closed",
            ));
        }
        Ok(self.stats)
    }
}

/// Sanitize a whole text, one logical record per output line
pub fn sanitize_str(text: &str, input: &str) -> Result<(String, SanitizeStats)> {
    let mut sanitizer = CsvSanitizer::new();
    let mut cleaned = String::with_capacity(text.len());

    for line in text.lines() {
        if let Some(record) = sanitizer.push_line(line) {
            cleaned.push_str(&record);
            cleaned.push('\n');
        }
    }

    let stats = sanitizer.finish(input)?;
    Ok((cleaned, stats))
}

/// Decode raw bytes as UTF-8, falling back to Windows-1252 for legacy exports
pub fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.strip_prefix('\u{feff}').unwrap_or(text).to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Read `input`, sanitize it and write the cleaned text to `output`
pub fn sanitize_file(input: &Path, output: &Path) -> Result<SanitizeStats> {
    if !input.exists() {
        return Err(PipelineError::InputNotFound(input.to_path_buf()));
    }

    let bytes = fs::read(input)?;
    let text = decode_text(&bytes);
    let (cleaned, stats) = sanitize_str(&text, &input.display().to_string())?;
    fs::write(output, cleaned)?;

    info!(
        input = %input.display(),
        output = %output.display(),
        lines = stats.lines_read,
        records = stats.records_emitted,
        joined = stats.records_joined,
        "Sanitized energy CSV"
    );

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MULTILINE: &str = "BBL,Street Name,Notes\n\
        1000010001,BROADWAY,\"first line\n\
        second   line\n\
        third line\"\n\
        1000010002,  WALL   STREET, plain\n";

    #[test]
    fn test_joins_multiline_field() {
        let (cleaned, stats) = sanitize_str(MULTILINE, "test").unwrap();
        let lines: Vec<&str> = cleaned.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[1],
            "1000010001,BROADWAY,\"first line second line third line\""
        );
        assert_eq!(lines[2], "1000010002,WALL STREET,plain");
        assert_eq!(stats.lines_read, 5);
        assert_eq!(stats.records_emitted, 3);
        assert_eq!(stats.records_joined, 1);
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let input = "a,b\n1,\"x,\n y\"\n2,  \"p\", \"q\"\n";
        let (once, _) = sanitize_str(input, "test").unwrap();
        let (twice, _) = sanitize_str(&once, "test").unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_line_with_two_quotes_passes_through() {
        let (cleaned, stats) = sanitize_str("1,\"quoted\",2\n", "test").unwrap();
        assert_eq!(cleaned, "1,\"quoted\",2\n");
        assert_eq!(stats.records_joined, 0);
    }

    #[test]
    fn test_unterminated_quote_is_malformed() {
        let err = sanitize_str("a,b\n1,\"open\nnever closed\n", "energy.csv").unwrap_err();
        match err {
            PipelineError::MalformedRecord { input, record, .. } => {
                assert_eq!(input, "energy.csv");
                assert_eq!(record, 2);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_crlf_input() {
        let (cleaned, _) = sanitize_str("a,b\r\n1,\"x\r\ny\"\r\n", "test").unwrap();
        assert_eq!(cleaned, "a,b\n1,\"x y\"\n");
    }

    #[test]
    fn test_decode_text_falls_back_to_windows_1252() {
        let bytes = b"caf\xe9";
        assert_eq!(decode_text(bytes), "café");
        assert_eq!(decode_text("\u{feff}BBL".as_bytes()), "BBL");
    }
}
