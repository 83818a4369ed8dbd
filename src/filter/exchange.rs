//! Request and response values that flow through the filter chain.
//!
//! These are deliberately small: the chain only needs what filters inspect,
//! so the HTTP adapter copies method, path, query and headers in and maps the
//! response back out.

use std::collections::HashMap;

use axum::body::{Body, Bytes};
use axum::http::{header::HeaderName, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use url::form_urlencoded;

/// An inbound request as seen by filters.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    method: Method,
    path: String,
    query: HashMap<String, String>,
    headers: HeaderMap,
}

impl GatewayRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: HashMap::new(),
            headers: HeaderMap::new(),
        }
    }

    /// Build a request from a raw query string such as `a=1&authorization=admin`.
    ///
    /// Keys and values are percent-decoded. When a key repeats, the first
    /// value wins.
    pub fn with_query_string(mut self, raw: &str) -> Self {
        for (key, value) in form_urlencoded::parse(raw.as_bytes()) {
            self.query
                .entry(key.into_owned())
                .or_insert_with(|| value.into_owned());
        }
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.entry(key.into()).or_insert_with(|| value.into());
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// First value of a query parameter.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    /// Header value by case-insensitive name. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn into_headers(self) -> HeaderMap {
        self.headers
    }
}

/// What the host should do with a response leaving the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The response is final and goes straight back to the client.
    Complete,
    /// The chain let the request through; the host dispatches it downstream
    /// and merges this response's headers into the result.
    Forward,
}

/// A response produced by a filter or by the terminal handler.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    disposition: Disposition,
}

impl GatewayResponse {
    /// A final response with an empty body.
    pub fn status(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            disposition: Disposition::Complete,
        }
    }

    /// The request passed every filter and should be dispatched downstream.
    pub fn forward() -> Self {
        Self {
            disposition: Disposition::Forward,
            ..Self::status(StatusCode::OK)
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn disposition(&self) -> Disposition {
        self.disposition
    }

    pub fn is_forward(&self) -> bool {
        self.disposition == Disposition::Forward
    }
}

impl IntoResponse for GatewayResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}
