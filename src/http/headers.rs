//! Response header map with case-insensitive name lookup.
//!
//! HTTP header names are case-insensitive per [RFC 9110 §5.1]; servers send
//! `ETag`, `Etag` and `etag` interchangeably.
//!
//! [RFC 9110 §5.1]: https://www.rfc-editor.org/rfc/rfc9110#section-5.1

use std::fmt;

/// A case-insensitive, order-preserving, multi-value header map.
///
/// # Examples
///
/// ```
/// use routeload::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.insert("Etag", "\"abc\"");
/// headers.insert("Transfer-Encoding", "gzip, chunked");
///
/// assert_eq!(headers.etag(), Some("\"abc\""));
/// assert!(headers.is_chunked());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Headers {
    inner: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a header map with room for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Vec::with_capacity(capacity),
        }
    }

    /// Appends a header entry. Repeated names are kept.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.push((name.into(), value.into()));
    }

    /// Returns the first value for `name` (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns `true` if at least one entry has the given name.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// The entity tag, if the server sent one.
    pub fn etag(&self) -> Option<&str> {
        self.get("etag")
    }

    /// Declared body length, if present and numeric.
    pub fn content_length(&self) -> Option<usize> {
        self.get("content-length")?.trim().parse().ok()
    }

    /// Returns `true` when `chunked` is the final transfer coding.
    pub fn is_chunked(&self) -> bool {
        self.get("transfer-encoding").is_some_and(|te| {
            te.rsplit(',')
                .next()
                .is_some_and(|last| last.trim().eq_ignore_ascii_case("chunked"))
        })
    }

    /// Number of header entries (not unique names).
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// All `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.inner {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn etag_any_case() {
        for name in ["ETag", "Etag", "etag"] {
            let mut h = Headers::new();
            h.insert(name, "W/\"1\"");
            assert_eq!(h.etag(), Some("W/\"1\""));
        }
        assert_eq!(Headers::new().etag(), None);
    }

    #[test]
    fn content_length_parsing() {
        let mut h = Headers::new();
        h.insert("Content-Length", " 42 ");
        assert_eq!(h.content_length(), Some(42));

        let mut bad = Headers::new();
        bad.insert("Content-Length", "lots");
        assert_eq!(bad.content_length(), None);
    }

    #[test]
    fn chunked_must_be_last_coding() {
        let mut h = Headers::new();
        h.insert("Transfer-Encoding", "chunked, gzip");
        assert!(!h.is_chunked());

        let mut h = Headers::new();
        h.insert("transfer-encoding", "Chunked");
        assert!(h.is_chunked());
    }

    #[test]
    fn display_wire_format() {
        let mut h = Headers::with_capacity(2);
        h.insert("Host", "localhost");
        h.insert("Accept", "*/*");
        assert_eq!(h.to_string(), "Host: localhost\r\nAccept: */*\r\n");
        assert_eq!(h.len(), 2);
        assert!(h.contains("host"));
    }
}
