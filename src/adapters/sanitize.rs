//! PII filtering for log output.
//!
//! Patient requests arrive as free-form JSON, so identifiers can leak into
//! formatted log lines (echoed payloads, error details). Everything written
//! through [`SanitizingMakeWriter`] has the following redacted:
//! - UUID-shaped identifiers
//! - SSN and MRN patterns
//! - e-mail addresses and phone numbers
//! - name and date-of-birth fields in echoed key/value or JSON text
//! - long hex strings (tokens, digests of identifiers)
//!
//! Input longer than `THYROCASE_SANITIZE_MAX_BYTES` (default 16 KiB) is cut
//! before scanning.

use regex::{Regex, RegexSet};
use std::sync::OnceLock;
use tracing_subscriber::fmt::MakeWriter;

static PII_PATTERNS: OnceLock<PiiPatterns> = OnceLock::new();

const DEFAULT_SANITIZE_MAX_BYTES: usize = 16 * 1024;

const MAX_BYTES_ENV: &str = "THYROCASE_SANITIZE_MAX_BYTES";

struct PiiPattern {
    regex: Regex,
    replacement: &'static str,
}

struct PiiPatterns {
    any: RegexSet,
    rules: Vec<PiiPattern>,
}

fn truncate_to_char_boundary(input: &str, max_bytes: usize) -> (&str, bool) {
    if input.len() <= max_bytes {
        return (input, false);
    }
    let mut end = max_bytes;
    while end > 0 && !input.is_char_boundary(end) {
        end -= 1;
    }
    (&input[..end], true)
}

fn max_sanitize_bytes() -> usize {
    std::env::var(MAX_BYTES_ENV)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|&v| v > 0)
        .unwrap_or(DEFAULT_SANITIZE_MAX_BYTES)
}

fn get_patterns() -> &'static PiiPatterns {
    PII_PATTERNS.get_or_init(|| {
        // Order matters: field-level rules run before the generic ones so a
        // redacted name never leaves a partial match behind.
        let rules: Vec<(&'static str, &'static str)> = vec![
            (
                r#"(?i)"(?:patient_?name|full_?name|first_?name|last_?name|name)"\s*:\s*"[^"]{0,256}""#,
                r#""name":"[REDACTED-NAME]""#,
            ),
            (
                r"(?i)\b(?:patient_?name|full_?name|first_?name|last_?name|name)\s*[:=]\s*[A-Za-z][A-Za-z .'-]{0,80}",
                "name=[REDACTED-NAME]",
            ),
            (
                r#"(?i)"(?:dob|date_?of_?birth|birth_?date)"\s*:\s*"[^"]{0,64}""#,
                r#""dob":"[REDACTED-DOB]""#,
            ),
            (
                r"(?i)\b(?:dob|date_?of_?birth|birth_?date)\s*[:=]\s*\d{1,4}[-/.]\d{1,2}[-/.]\d{1,4}",
                "dob=[REDACTED-DOB]",
            ),
            (
                r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
                "[REDACTED-UUID]",
            ),
            (r"\b\d{3}-\d{2}-\d{4}\b", "[REDACTED-SSN]"),
            (r"(?i)\bMRN[:\s#]?\s*\d{6,10}\b", "[REDACTED-MRN]"),
            (
                r"(?i)\b[a-z0-9](?:[a-z0-9._%+-]{0,62}[a-z0-9])?@(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,}\b",
                "[REDACTED-EMAIL]",
            ),
            (
                r"\b(?:\+?1[-.\s]?)?\(?[0-9]{3}\)?[-.\s][0-9]{3}[-.\s][0-9]{4}\b",
                "[REDACTED-PHONE]",
            ),
            (r"\b[0-9a-fA-F]{32,}\b", "[REDACTED-HEX]"),
        ];

        let any = RegexSet::new(rules.iter().map(|(p, _)| *p)).expect("Valid regex set");
        let rules = rules
            .into_iter()
            .map(|(pattern, replacement)| PiiPattern {
                regex: Regex::new(pattern).expect("Valid regex"),
                replacement,
            })
            .collect();

        PiiPatterns { any, rules }
    })
}

/// Replace every PII pattern in `input`.
#[must_use]
pub fn sanitize(input: &str) -> String {
    sanitize_with_limit(input, max_sanitize_bytes())
}

fn sanitize_with_limit(input: &str, max_bytes: usize) -> String {
    let patterns = get_patterns();
    let (prefix, truncated) = truncate_to_char_boundary(input, max_bytes);

    let mut result = prefix.to_string();
    if patterns.any.is_match(prefix) {
        for idx in patterns.any.matches(prefix).into_iter() {
            let pattern = &patterns.rules[idx];
            result = pattern
                .regex
                .replace_all(&result, pattern.replacement)
                .to_string();
        }
    }

    if truncated {
        result.push_str(" [TRUNCATED]");
    }
    result
}

#[must_use]
pub fn contains_pii(input: &str) -> bool {
    let (prefix, _) = truncate_to_char_boundary(input, max_sanitize_bytes());
    get_patterns().any.is_match(prefix)
}

/// `MakeWriter` wrapper that sanitizes each formatted line before it
/// reaches the inner sink.
#[derive(Debug, Clone)]
pub struct SanitizingMakeWriter<M> {
    inner: M,
}

impl<M> SanitizingMakeWriter<M> {
    #[must_use]
    pub fn new(inner: M) -> Self {
        Self { inner }
    }
}

pub struct SanitizingWriter<W> {
    inner: W,
    buffer: Vec<u8>,
}

impl<W> SanitizingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
        }
    }
}

impl<W: std::io::Write> SanitizingWriter<W> {
    fn flush_lines(&mut self) -> std::io::Result<()> {
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let sanitized = sanitize(&String::from_utf8_lossy(&line));
            self.inner.write_all(sanitized.as_bytes())?;
        }
        Ok(())
    }

    fn flush_remainder(&mut self) -> std::io::Result<()> {
        if !self.buffer.is_empty() {
            let sanitized = sanitize(&String::from_utf8_lossy(&self.buffer));
            self.inner.write_all(sanitized.as_bytes())?;
            self.buffer.clear();
        }
        Ok(())
    }
}

impl<W: std::io::Write> std::io::Write for SanitizingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);

        // A single line may not grow without bound.
        if self.buffer.len() > max_sanitize_bytes().saturating_mul(2) {
            self.flush_remainder()?;
            self.inner.write_all(b"\n[TRUNCATED]\n")?;
            return Ok(buf.len());
        }

        self.flush_lines()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_lines()?;
        self.flush_remainder()?;
        self.inner.flush()
    }
}

impl<'a, M> MakeWriter<'a> for SanitizingMakeWriter<M>
where
    M: MakeWriter<'a>,
{
    type Writer = SanitizingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        SanitizingWriter::new(self.inner.make_writer())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_sanitize_identifiers() {
        let sanitized = sanitize("request 550e8400-e29b-41d4-a716-446655440000 SSN 123-45-6789 MRN:12345678");
        assert!(sanitized.contains("[REDACTED-UUID]"));
        assert!(sanitized.contains("[REDACTED-SSN]"));
        assert!(sanitized.contains("[REDACTED-MRN]"));
        assert!(!sanitized.contains("123-45-6789"));
    }

    #[test]
    fn test_sanitize_contact_details() {
        let sanitized = sanitize("contact patient@clinic.org or 555-123-4567");
        assert!(sanitized.contains("[REDACTED-EMAIL]"));
        assert!(sanitized.contains("[REDACTED-PHONE]"));
    }

    #[test]
    fn test_sanitize_echoed_payload_fields() {
        let input = r#"payload {"name": "Jane Roe", "dob": "1980-02-11", "Age": 44, "TSH": 6.1}"#;
        let sanitized = sanitize(input);
        assert!(!sanitized.contains("Jane Roe"));
        assert!(!sanitized.contains("1980-02-11"));
        assert!(sanitized.contains(r#""Age": 44"#));
        assert!(sanitized.contains(r#""TSH": 6.1"#));
    }

    #[test]
    fn test_clinical_values_untouched() {
        let line = "Prediction: Hypothyroid (confidence 86.0, TSH mIU/L=9.5, FTI=60)";
        assert!(!contains_pii(line));
        assert_eq!(sanitize(line), line);
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let input = "ééééééééé 0123456789abcdef0123456789abcdef";
        let sanitized = sanitize_with_limit(input, 5);
        assert!(sanitized.ends_with(" [TRUNCATED]"));
        assert!(sanitized.starts_with("éé"));
    }

    #[test]
    fn test_writer_sanitizes_each_line() {
        let mut sink = Vec::new();
        {
            let mut writer = SanitizingWriter::new(&mut sink);
            writer.write_all(b"first 123-45-").expect("write");
            writer.write_all(b"6789\nsecond line\n").expect("write");
            writer.flush().expect("flush");
        }
        let out = String::from_utf8(sink).expect("utf8");
        assert_eq!(out, "first [REDACTED-SSN]\nsecond line\n");
    }
}
