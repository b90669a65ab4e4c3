//! Canonical JSON encoder.

use crate::error::{CodecError, CodecResult};
use crate::value::{Number, Value};

/// Encode a value to canonical JSON bytes.
///
/// The output is deterministic: no whitespace, object fields in the
/// order the caller placed them, shortest round-tripping number forms,
/// and a fixed escape policy for strings. Two values that are equal
/// field-for-field produce byte-identical output, which is what makes
/// the content hash comparable across replicas.
///
/// # Errors
///
/// Returns an error if the value contains a non-finite float.
pub fn to_canonical_json(value: &Value) -> CodecResult<Vec<u8>> {
    let mut encoder = CanonicalEncoder::new();
    encoder.encode(value)?;
    Ok(encoder.into_bytes())
}

/// A canonical JSON encoder.
pub struct CanonicalEncoder {
    buffer: Vec<u8>,
}

impl CanonicalEncoder {
    /// Create a new encoder.
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Create a new encoder with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Encode a value.
    pub fn encode(&mut self, value: &Value) -> CodecResult<()> {
        match value {
            Value::Null => {
                self.buffer.extend_from_slice(b"null");
                Ok(())
            }
            Value::Bool(b) => {
                self.buffer
                    .extend_from_slice(if *b { b"true" } else { b"false" });
                Ok(())
            }
            Value::Number(n) => self.encode_number(*n),
            Value::Text(s) => {
                self.encode_string(s);
                Ok(())
            }
            Value::Array(items) => self.encode_array(items),
            Value::Object(fields) => self.encode_object(fields),
        }
    }

    /// Consume this encoder and return the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Get a reference to the encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    fn encode_number(&mut self, number: Number) -> CodecResult<()> {
        match number {
            Number::Int(n) => {
                self.buffer.extend_from_slice(n.to_string().as_bytes());
            }
            Number::Float(f) => {
                if !f.is_finite() {
                    return Err(CodecError::NonFiniteNumber);
                }
                // Rust's Display for f64 is the shortest string that
                // round-trips, which keeps the form deterministic.
                let mut text = f.to_string();
                if !text.contains(['.', 'e', 'E']) {
                    text.push_str(".0");
                }
                self.buffer.extend_from_slice(text.as_bytes());
            }
        }
        Ok(())
    }

    fn encode_string(&mut self, text: &str) {
        self.buffer.push(b'"');
        for ch in text.chars() {
            match ch {
                '"' => self.buffer.extend_from_slice(b"\\\""),
                '\\' => self.buffer.extend_from_slice(b"\\\\"),
                '\n' => self.buffer.extend_from_slice(b"\\n"),
                '\r' => self.buffer.extend_from_slice(b"\\r"),
                '\t' => self.buffer.extend_from_slice(b"\\t"),
                '\u{08}' => self.buffer.extend_from_slice(b"\\b"),
                '\u{0c}' => self.buffer.extend_from_slice(b"\\f"),
                c if (c as u32) < 0x20 => {
                    let escaped = format!("\\u{:04x}", c as u32);
                    self.buffer.extend_from_slice(escaped.as_bytes());
                }
                c => {
                    let mut utf8 = [0u8; 4];
                    self.buffer
                        .extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
                }
            }
        }
        self.buffer.push(b'"');
    }

    fn encode_array(&mut self, items: &[Value]) -> CodecResult<()> {
        self.buffer.push(b'[');
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.buffer.push(b',');
            }
            self.encode(item)?;
        }
        self.buffer.push(b']');
        Ok(())
    }

    fn encode_object(&mut self, fields: &[(String, Value)]) -> CodecResult<()> {
        self.buffer.push(b'{');
        for (i, (key, value)) in fields.iter().enumerate() {
            if i > 0 {
                self.buffer.push(b',');
            }
            self.encode_string(key);
            self.buffer.push(b':');
            self.encode(value)?;
        }
        self.buffer.push(b'}');
        Ok(())
    }
}

impl Default for CanonicalEncoder {
    fn default() -> Self {
        Self::new()
    }
}
