//! No-log enforcement for sensitive data.
//!
//! This module provides mechanisms to prevent sensitive data from appearing
//! in logs, output, and error messages.

use parking_lot::RwLock;
use std::collections::HashSet;
use std::fmt;
use std::io;
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;

const REDACTED: &str = "[REDACTED]";

/// A string wrapper that prevents the value from being logged.
///
/// When used in format strings or logging, this type will display
/// `[REDACTED]` instead of the actual value. Use `expose()` to
/// access the underlying value when needed.
///
/// # Example
///
/// ```rust
/// use azvm::secrets::SensitiveString;
///
/// let password = SensitiveString::new("secret123");
/// assert_eq!(format!("{}", password), "[REDACTED]");
/// assert_eq!(password.expose(), "secret123");
/// ```
#[derive(Clone)]
pub struct SensitiveString {
    value: String,
}

impl SensitiveString {
    /// Create a new sensitive string.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// Expose the underlying value.
    ///
    /// Only call this where the value leaves the process on purpose, such as
    /// the body of a secret-store write or a provisioning request.
    pub fn expose(&self) -> &str {
        &self.value
    }

    /// Length of the value in characters.
    pub fn char_count(&self) -> usize {
        self.value.chars().count()
    }

    /// Check if the value is empty.
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

impl fmt::Display for SensitiveString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl fmt::Debug for SensitiveString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SensitiveString({})", REDACTED)
    }
}

// No Deref to str: callers must go through expose().

impl From<String> for SensitiveString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SensitiveString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl PartialEq for SensitiveString {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for SensitiveString {}

// Serializes as the redaction marker; request payloads opt in to the real
// value with `serialize_exposed`.
impl serde::Serialize for SensitiveString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(REDACTED)
    }
}

impl<'de> serde::Deserialize<'de> for SensitiveString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(Self::new(value))
    }
}

/// Serialize the plaintext of a [`SensitiveString`].
///
/// For use with `#[serde(serialize_with = "...")]` on wire payloads only.
pub fn serialize_exposed<S>(value: &SensitiveString, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(value.expose())
}

/// Registry for sensitive values that should be redacted.
///
/// Every secret minted during a run is registered here; the CLI output and
/// the tracing writer pass all text through [`NoLogRegistry::redact`].
pub struct NoLogRegistry {
    values: RwLock<HashSet<String>>,
    max_values: usize,
}

impl NoLogRegistry {
    /// Create a new registry.
    pub fn new() -> Self {
        Self::with_max_values(1024)
    }

    /// Create a registry with a custom max size.
    pub fn with_max_values(max_values: usize) -> Self {
        Self {
            values: RwLock::new(HashSet::new()),
            max_values,
        }
    }

    /// Register a sensitive value.
    ///
    /// The JSON-escaped form is registered as well, since structured log
    /// output escapes quotes and backslashes.
    pub fn register(&self, value: impl Into<String>) {
        let value = value.into();
        if value.is_empty() {
            return;
        }

        let escaped = serde_json::to_string(&value)
            .ok()
            .map(|quoted| quoted[1..quoted.len() - 1].to_string())
            .filter(|escaped| *escaped != value);

        let mut values = self.values.write();
        if values.len() >= self.max_values {
            return;
        }
        values.insert(value);
        if let Some(escaped) = escaped {
            values.insert(escaped);
        }
    }

    /// Register the plaintext of a sensitive string.
    pub fn register_sensitive(&self, value: &SensitiveString) {
        self.register(value.expose());
    }

    /// Check if a text contains any registered sensitive values.
    pub fn contains_sensitive(&self, text: &str) -> bool {
        let values = self.values.read();
        values.iter().any(|v| text.contains(v.as_str()))
    }

    /// Redact all registered sensitive values from text.
    pub fn redact(&self, text: &str) -> String {
        let values = self.values.read();
        if values.is_empty() {
            return text.to_string();
        }

        // Longest first so an escaped form is not half-replaced by its raw prefix.
        let mut ordered: Vec<&String> = values.iter().collect();
        ordered.sort_by_key(|v| std::cmp::Reverse(v.len()));

        let mut result = text.to_string();
        for value in ordered {
            if result.contains(value.as_str()) {
                result = result.replace(value.as_str(), REDACTED);
            }
        }
        result
    }

    /// Get the number of registered values.
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

impl Default for NoLogRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NoLogRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NoLogRegistry")
            .field("registered_values", &self.len())
            .field("max_values", &self.max_values)
            .finish()
    }
}

/// A [`MakeWriter`] that redacts registered secrets from every log record.
///
/// Wraps another writer factory (stderr in the binary, a buffer in tests).
/// Each record is buffered and redacted as a whole when the writer is
/// dropped, so a secret split across several `write` calls is still caught.
#[derive(Debug, Clone)]
pub struct RedactingMakeWriter<M> {
    inner: M,
    registry: Arc<NoLogRegistry>,
}

impl<M> RedactingMakeWriter<M> {
    /// Wrap `inner`, redacting everything registered in `registry`.
    pub fn new(inner: M, registry: Arc<NoLogRegistry>) -> Self {
        Self { inner, registry }
    }
}

impl<'a, M> MakeWriter<'a> for RedactingMakeWriter<M>
where
    M: MakeWriter<'a>,
{
    type Writer = RedactingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter {
            inner: self.inner.make_writer(),
            registry: Arc::clone(&self.registry),
            buffer: Vec::new(),
        }
    }
}

/// Writer produced by [`RedactingMakeWriter`].
pub struct RedactingWriter<W: io::Write> {
    inner: W,
    registry: Arc<NoLogRegistry>,
    buffer: Vec<u8>,
}

impl<W: io::Write> RedactingWriter<W> {
    fn flush_redacted(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let text = String::from_utf8_lossy(&self.buffer);
        let redacted = self.registry.redact(&text);
        self.buffer.clear();
        self.inner.write_all(redacted.as_bytes())?;
        self.inner.flush()
    }
}

impl<W: io::Write> io::Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        // Records are emitted whole on drop.
        Ok(())
    }
}

impl<W: io::Write> Drop for RedactingWriter<W> {
    fn drop(&mut self) {
        let _ = self.flush_redacted();
    }
}
