// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Secret redaction for log output and error messages.
//!
//! Two complementary mechanisms:
//! 1. **Regex-based**: catches known credential shapes (JWTs, Bearer tokens,
//!    `apikey` header values, `?apikey=` query parameters).
//! 2. **Exact-match**: catches configured keys registered at startup.

use std::io::Write;
use std::sync::{Arc, LazyLock, RwLock};

use regex::Regex;

/// Known secret patterns to redact from output.
static REDACTION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        // Bearer tokens in Authorization headers
        Regex::new(r"Bearer\s+[a-zA-Z0-9._\-]{10,}").unwrap(),
        // JWTs (backend anon/service keys, access tokens): header.payload.signature
        Regex::new(r"eyJ[a-zA-Z0-9_\-]{5,}\.[a-zA-Z0-9_\-]{5,}\.[a-zA-Z0-9_\-]*").unwrap(),
        // apikey header or field values: `apikey: xyz`, `"apikey":"xyz"`, `apikey=xyz`
        Regex::new(r#"(?i)(apikey"?\s*[:=]\s*"?)[^\s",&}]{6,}"#).unwrap(),
        // Refresh tokens in auth responses
        Regex::new(r#"("refresh_token"\s*:\s*")[^"]+"#).unwrap(),
    ]
});

/// The redaction placeholder.
const REDACTED: &str = "[REDACTED]";

/// Redact secrets from a string using regex patterns and exact-match values.
pub fn redact(input: &str, secret_values: &[String]) -> String {
    let mut result = input.to_string();

    for pattern in REDACTION_PATTERNS.iter() {
        // Patterns with a capture group keep the prefix (`apikey: `) visible.
        result = if pattern.captures_len() > 1 {
            pattern
                .replace_all(&result, format!("${{1}}{REDACTED}").as_str())
                .to_string()
        } else {
            pattern.replace_all(&result, REDACTED).to_string()
        };
    }

    // Longest first so a key is not partially replaced by its own prefix.
    let mut sorted_values: Vec<&String> = secret_values.iter().collect();
    sorted_values.sort_by_key(|v| std::cmp::Reverse(v.len()));
    for value in sorted_values {
        if !value.is_empty() {
            result = result.replace(value.as_str(), REDACTED);
        }
    }

    result
}

/// Shared list of exact secret values, filled from configuration at startup.
#[derive(Debug, Clone, Default)]
pub struct SecretRegistry {
    values: Arc<RwLock<Vec<String>>>,
}

impl SecretRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a value. Empty and short values are ignored; redacting a
    /// two-character key would mangle ordinary text.
    pub fn add(&self, value: impl Into<String>) {
        let value = value.into();
        if value.len() < 4 {
            return;
        }
        if let Ok(mut values) = self.values.write()
            && !values.contains(&value)
        {
            values.push(value);
        }
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.values.read().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.values.read().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A writer wrapper that redacts secrets from output.
///
/// Wraps any `Write` implementor and replaces known secret patterns and
/// registered values with `[REDACTED]`.
pub struct RedactingWriter<W> {
    inner: W,
    registry: SecretRegistry,
}

impl<W: Write> RedactingWriter<W> {
    pub fn new(inner: W, registry: SecretRegistry) -> Self {
        Self { inner, registry }
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let input = String::from_utf8_lossy(buf);
        let redacted = redact(&input, &self.registry.snapshot());
        self.inner.write_all(redacted.as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
