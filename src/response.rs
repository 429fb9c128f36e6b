//! Outgoing HTTP response type and the [`IntoResponse`] conversion trait.
//!
//! Build a [`Response`] in your handler and return it. The dispatcher hands it
//! to hyper once the middleware chain has finished.

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderValue};
use http::{HeaderMap, StatusCode};
use http_body_util::Full;
use serde::Serialize;

use crate::error::Error;

const APPLICATION_JSON: &str = "application/json";

/// An outgoing HTTP response.
///
/// ```rust
/// use http::StatusCode;
/// use ward::Response;
///
/// # fn main() -> Result<(), ward::Error> {
/// Response::json(StatusCode::OK, &serde_json::json!({"status": "ok"}))?;
/// Response::status(StatusCode::NO_CONTENT);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Response {
    /// Serializes `data` as the JSON body and sets `status`.
    ///
    /// A `204 No Content` never carries a body, so `data` is ignored for it.
    pub fn json<T: Serialize + ?Sized>(status: StatusCode, data: &T) -> Result<Self, Error> {
        if status == StatusCode::NO_CONTENT {
            return Ok(Self::status(status));
        }
        let body = serde_json::to_vec(data)?;
        Ok(Self::json_bytes(status, body))
    }

    /// A JSON response from bytes that are already encoded.
    pub fn json_bytes(status: StatusCode, body: impl Into<Bytes>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
        Self { status, headers, body: body.into() }
    }

    /// Response with no body.
    pub fn status(status: StatusCode) -> Self {
        Self { status, headers: HeaderMap::new(), body: Bytes::new() }
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Converts into the hyper response type.
    pub fn into_inner(self) -> http::Response<Full<Bytes>> {
        let mut res = http::Response::new(Full::new(self.body));
        *res.status_mut() = self.status;
        *res.headers_mut() = self.headers;
        res
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`].
///
/// Handlers return `Result<impl IntoResponse, Error>`; implement this on your
/// own types to return them directly.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

/// Return a bare status from a handler: `Ok(StatusCode::NO_CONTENT)`
impl IntoResponse for StatusCode {
    fn into_response(self) -> Response { Response::status(self) }
}
