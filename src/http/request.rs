//! Outgoing HTTP/1.1 `GET` request serialization.

use bytes::{BufMut, BytesMut};

use super::Headers;

/// A `GET` request for a single resource, ready to be written to a socket.
///
/// # Examples
///
/// ```
/// use routeload::http::Request;
///
/// let bytes = Request::get("localhost:8080", "/src/view/todo.jsx?v=1")
///     .header("Cache-Control", "no-store")
///     .into_bytes();
///
/// let text = std::str::from_utf8(&bytes).unwrap();
/// assert!(text.starts_with("GET /src/view/todo.jsx?v=1 HTTP/1.1\r\n"));
/// assert!(text.contains("Host: localhost:8080\r\n"));
/// assert!(text.ends_with("Connection: close\r\n\r\n"));
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    target: String,
    headers: Headers,
}

impl Request {
    /// Builds a `GET` for `target` against the server at `authority`.
    pub fn get(authority: &str, target: &str) -> Self {
        let target = if target.starts_with('/') {
            target.to_owned()
        } else {
            format!("/{target}")
        };

        let mut headers = Headers::with_capacity(4);
        headers.insert("Host", authority);
        Self { target, headers }
    }

    /// Appends a request header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// The request target (path and query).
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Serializes the request. `Connection: close` is always written last, so
    /// the response body ends at EOF when the server sends no length.
    pub fn into_bytes(self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(64 + self.target.len() + self.headers.len() * 48);
        buf.put(format!("GET {} HTTP/1.1\r\n", self.target).as_bytes());
        buf.put(self.headers.to_string().as_bytes());
        buf.put(&b"Connection: close\r\n\r\n"[..]);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_string(bytes: BytesMut) -> String {
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn relative_target_gets_leading_slash() {
        let r = Request::get("example.com", "src/view/a.jsx");
        assert_eq!(r.target(), "/src/view/a.jsx");
    }

    #[test]
    fn custom_headers_precede_connection() {
        let s = to_string(
            Request::get("example.com", "/a")
                .header("Accept", "text/plain")
                .into_bytes(),
        );
        assert_eq!(
            s,
            "GET /a HTTP/1.1\r\nHost: example.com\r\nAccept: text/plain\r\nConnection: close\r\n\r\n"
        );
    }
}
