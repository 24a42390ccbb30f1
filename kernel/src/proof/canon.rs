//! Canonical JSON bytes: the single serialization-for-hashing implementation.
//!
//! Every hashed JSON surface in the workspace (registry snapshots, schema
//! bundles, trace headers and footers, tape events, bundle reports) is
//! produced by [`canonical_json_bytes`]. There is no second serializer.
//!
//! # Canonicalization rules
//!
//! 1. Object keys sorted lexicographically by byte value.
//! 2. Compact form: no whitespace, no trailing commas.
//! 3. Strings escaped per RFC 8259 section 7; non-ASCII passes through as UTF-8.
//! 4. Numbers must be integers (`i64` or `u64`). Floats, NaN and Infinity are
//!    rejected so the hashed surface cannot drift with platform formatting.
//! 5. `null`, `true`, `false` written literally.

use std::io::Write;

/// Error type for canonical JSON serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanonError {
    /// A JSON number was not representable as `i64` or `u64`.
    NonIntegerNumber { raw: String },
}

impl std::fmt::Display for CanonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonIntegerNumber { raw } => {
                write!(f, "non-integer number in canonical JSON: {raw}")
            }
        }
    }
}

impl std::error::Error for CanonError {}

/// Produce canonical JSON bytes from a `serde_json::Value`.
///
/// # Errors
///
/// Returns [`CanonError::NonIntegerNumber`] if any number in the value tree
/// is a float, NaN, or Infinity.
pub fn canonical_json_bytes(value: &serde_json::Value) -> Result<Vec<u8>, CanonError> {
    let mut out = CanonWriter::default();
    out.value(value)?;
    Ok(out.buf)
}

/// Check whether `bytes` are already in canonical form.
///
/// Parses and re-serializes; returns `false` for invalid JSON or any byte
/// deviation (whitespace, key order, float formatting).
#[must_use]
pub fn is_canonical(bytes: &[u8]) -> bool {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(bytes) else {
        return false;
    };
    match canonical_json_bytes(&value) {
        Ok(canonical) => canonical == bytes,
        Err(_) => false,
    }
}

/// Streaming canonical writer. Kept private so the rules above cannot be
/// bypassed piecemeal.
#[derive(Default)]
struct CanonWriter {
    buf: Vec<u8>,
}

impl CanonWriter {
    fn value(&mut self, value: &serde_json::Value) -> Result<(), CanonError> {
        match value {
            serde_json::Value::Null => self.buf.extend_from_slice(b"null"),
            serde_json::Value::Bool(true) => self.buf.extend_from_slice(b"true"),
            serde_json::Value::Bool(false) => self.buf.extend_from_slice(b"false"),
            serde_json::Value::Number(n) => self.number(n)?,
            serde_json::Value::String(s) => self.string(s),
            serde_json::Value::Array(items) => {
                self.buf.push(b'[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.buf.push(b',');
                    }
                    self.value(item)?;
                }
                self.buf.push(b']');
            }
            serde_json::Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                self.buf.push(b'{');
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        self.buf.push(b',');
                    }
                    self.string(key);
                    self.buf.push(b':');
                    self.value(&map[*key])?;
                }
                self.buf.push(b'}');
            }
        }
        Ok(())
    }

    fn number(&mut self, n: &serde_json::Number) -> Result<(), CanonError> {
        if let Some(i) = n.as_i64() {
            let _ = write!(self.buf, "{i}");
            Ok(())
        } else if let Some(u) = n.as_u64() {
            let _ = write!(self.buf, "{u}");
            Ok(())
        } else {
            Err(CanonError::NonIntegerNumber { raw: n.to_string() })
        }
    }

    fn string(&mut self, s: &str) {
        self.buf.push(b'"');
        for ch in s.chars() {
            match ch {
                '"' => self.buf.extend_from_slice(b"\\\""),
                '\\' => self.buf.extend_from_slice(b"\\\\"),
                '\n' => self.buf.extend_from_slice(b"\\n"),
                '\r' => self.buf.extend_from_slice(b"\\r"),
                '\t' => self.buf.extend_from_slice(b"\\t"),
                c if c < '\u{0020}' => {
                    let _ = write!(self.buf, "\\u{:04x}", c as u32);
                }
                c => {
                    let mut utf8 = [0u8; 4];
                    self.buf.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
                }
            }
        }
        self.buf.push(b'"');
    }
}
