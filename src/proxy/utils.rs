//! Hyper ↔ descriptor conversions and response-writing helpers for the
//! front listener (§4.8, §6 "Core → listener"). Keeps the `is_closed`
//! connection-health check; the CA/MITM/plugin conversions had no
//! counterpart here and are gone.

use crate::error::WikiProxyError;
use crate::http::{HeaderTable, ResponseDescriptor};
use bytes::Bytes;
use http_body_util::Full;
use hyper::{HeaderMap, Response, StatusCode};

/// Copies a hyper request's headers into a `HeaderTable`, preserving
/// multi-valued fields (e.g. repeated `Cookie`).
pub fn hyper_headers_to_table(headers: &HeaderMap) -> HeaderTable {
    let mut table = HeaderTable::new();
    for (name, value) in headers.iter() {
        if let Ok(value) = value.to_str() {
            table.append(name.as_str(), value.to_string());
        }
    }
    table
}

/// Writes a `ResponseDescriptor` out as a hyper response. Malformed header
/// values are dropped rather than failing the whole response.
pub fn write_response(resp: ResponseDescriptor) -> Response<Full<Bytes>> {
    let status = StatusCode::from_u16(resp.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut builder = Response::builder().status(status);
    for (name, values) in resp.headers.iter() {
        for value in values {
            builder = builder.header(name, value.as_str());
        }
    }
    builder
        .body(Full::new(Bytes::from(resp.body)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}

/// Collapses any subsystem error into the single user-visible response per
/// §7's propagation policy.
pub fn error_response(err: &WikiProxyError) -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::BAD_REQUEST))
        .body(Full::new(Bytes::from(err.status_line())))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}

pub fn is_closed<E: std::fmt::Display>(e: &E) -> bool {
    let s = e.to_string().to_lowercase();
    s.contains("broken pipe")
        || s.contains("connection reset")
        || s.contains("connection aborted")
        || s.contains("unexpected eof")
}
