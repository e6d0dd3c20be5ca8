//! HTTP/1.1 response parsing using the [`httparse`] crate.
//!
//! The fetcher reads a `Connection: close` response to EOF and hands the
//! whole buffer to [`Response::parse`]. Bodies framed by `Content-Length` or
//! `Transfer-Encoding: chunked` are both supported; without either, the body
//! runs to the end of the buffer.

use bytes::{Bytes, BytesMut};
use thiserror::Error;

use super::{Headers, StatusCode};

/// Errors that can occur while parsing an HTTP/1.1 response.
#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("response head is incomplete")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid chunked body encoding")]
    InvalidChunk,

    #[error("body truncated: expected {expected} bytes, got {received}")]
    Truncated { expected: usize, received: usize },
}

/// A fully received HTTP/1.1 response.
///
/// # Examples
///
/// ```
/// use routeload::http::{Response, StatusCode};
///
/// let raw = b"HTTP/1.1 200 OK\r\nETag: \"v1\"\r\nContent-Length: 5\r\n\r\nhello";
/// let response = Response::parse(raw).unwrap();
///
/// assert_eq!(response.status(), StatusCode::OK);
/// assert_eq!(response.headers().etag(), Some("\"v1\""));
/// assert_eq!(&response.body()[..], b"hello");
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Bytes,
}

impl Response {
    /// Maximum number of headers we accept per response.
    const MAX_HEADERS: usize = 64;

    /// Parses a complete response from `buf`.
    ///
    /// # Errors
    ///
    /// - [`ResponseError::Incomplete`]: the head is not terminated.
    /// - [`ResponseError::Parse`]: the head is malformed.
    /// - [`ResponseError::InvalidChunk`] / [`ResponseError::Truncated`]: the
    ///   body does not match its declared framing.
    pub fn parse(buf: &[u8]) -> Result<Self, ResponseError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw = httparse::Response::new(&mut headers);

        let body_offset = match raw.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(ResponseError::Incomplete),
        };

        let status = StatusCode::from_u16(
            raw.code
                .ok_or(ResponseError::MissingField { field: "status" })?,
        );

        let mut header_map = Headers::with_capacity(raw.headers.len());
        for header in raw.headers.iter() {
            if let Ok(value) = std::str::from_utf8(header.value) {
                header_map.insert(header.name, value);
            }
        }

        let rest = &buf[body_offset..];
        let body = if status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED {
            Bytes::new()
        } else if header_map.is_chunked() {
            decode_chunked(rest)?
        } else if let Some(expected) = header_map.content_length() {
            if rest.len() < expected {
                return Err(ResponseError::Truncated {
                    expected,
                    received: rest.len(),
                });
            }
            Bytes::copy_from_slice(&rest[..expected])
        } else {
            Bytes::copy_from_slice(rest)
        };

        Ok(Self {
            status,
            headers: header_map,
            body,
        })
    }

    /// Returns the status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the response headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the decoded body bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Consumes the response, returning the body.
    pub fn into_body(self) -> Bytes {
        self.body
    }
}

// Decode a `Transfer-Encoding: chunked` body. Trailers after the last chunk
// are ignored.
fn decode_chunked(mut buf: &[u8]) -> Result<Bytes, ResponseError> {
    let mut out = BytesMut::with_capacity(buf.len());

    loop {
        let (offset, size) = match httparse::parse_chunk_size(buf) {
            Ok(httparse::Status::Complete(pair)) => pair,
            Ok(httparse::Status::Partial) | Err(_) => return Err(ResponseError::InvalidChunk),
        };
        let size = usize::try_from(size).map_err(|_| ResponseError::InvalidChunk)?;
        buf = &buf[offset..];

        if size == 0 {
            return Ok(out.freeze());
        }
        let end = size.checked_add(2).ok_or(ResponseError::InvalidChunk)?;
        if buf.len() < end || &buf[size..end] != b"\r\n" {
            return Err(ResponseError::InvalidChunk);
        }

        out.extend_from_slice(&buf[..size]);
        buf = &buf[end..];
    }
}
