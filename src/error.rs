//! Crate-wide error aggregation.
//!
//! Each subsystem owns its own `thiserror` enum; `WikiProxyError` folds them
//! into the single shape the orchestrator needs to pick a response status,
//! the same way `proxy::utils::ProxyError` aggregates `io`/`tls`/`http`/`cert`
//! errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AddrError {
    #[error("invalid address: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no address found for {0}")]
    NoAddress(String),
    #[error("dns lookup failed: {0}")]
    Lookup(#[from] hickory_resolver::error::ResolveError),
    #[error(transparent)]
    Addr(#[from] AddrError),
}

#[derive(Debug, Error)]
pub enum GzipError {
    #[error("gzip decode error: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum SocksError {
    #[error("proxy unreachable: {0}")]
    ProxyUnreachable(#[from] std::io::Error),
    #[error("socks protocol error: {0}")]
    ProtocolError(String),
    #[error("unsupported auth method")]
    UnsupportedAuth,
    #[error("connect refused: rep={0}")]
    ConnectRefused(u8),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Addr(#[from] AddrError),
}

#[derive(Debug, Error)]
pub enum HttpClientError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("tls error: {0}")]
    Tls(#[from] rustls::Error),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Socks(#[from] SocksError),
    #[error("malformed upstream response: {0}")]
    MalformedResponse(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// The single error shape the orchestrator deals with. Every fallible
/// subsystem call collapses into this, which is in turn collapsed by
/// `proxy::mod` into the one user-visible 400 (or 404 for routing) per
/// the error propagation policy.
#[derive(Debug, Error)]
pub enum WikiProxyError {
    /// §4.6: the admission gate rejected a request with no `User-Agent`.
    #[error("bad request: missing User-Agent")]
    MissingUserAgent,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unknown host: {0}")]
    UnknownHost(String),
    #[error(transparent)]
    Http(#[from] HttpClientError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Socks(#[from] SocksError),
    #[error(transparent)]
    Addr(#[from] AddrError),
    #[error(transparent)]
    Gzip(#[from] GzipError),
}

impl WikiProxyError {
    /// Status code the orchestrator writes back for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            WikiProxyError::UnknownHost(_) => 404,
            _ => 400,
        }
    }

    /// Status line text, matching the wording in the error design (§7): the
    /// admission gate's own "bad request" for a missing `User-Agent`, routing's
    /// "not found", and every collapsed subsystem failure's "cannot proxy
    /// request".
    pub fn status_line(&self) -> &'static str {
        match self {
            WikiProxyError::MissingUserAgent => "bad request",
            WikiProxyError::UnknownHost(_) => "not found",
            _ => "cannot proxy request",
        }
    }
}
