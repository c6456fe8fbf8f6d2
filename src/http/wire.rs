//! Request serialization and response parsing (§4.5). The status-line and
//! chunk-framing byte offsets are exact enough that hand-rolling over a
//! buffered reader is the right call — an off-the-shelf HTTP crate would
//! hide exactly the offsets under test here.

use crate::error::HttpClientError;
use crate::http::headers::HeaderTable;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};

#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub method: String,
    pub path: String,
    pub query: String,
    pub headers: HeaderTable,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ResponseDescriptor {
    pub version: String,
    pub status: u16,
    pub reason: String,
    pub headers: HeaderTable,
    pub trailers: HeaderTable,
    pub body: Vec<u8>,
}

/// Serializes `req` to the `METHOD SP path[?query] SP HTTP/1.1 CRLF headers
/// CRLF` wire form, computing `Content-Length` when missing and stripping it
/// when `Transfer-Encoding: chunked` is set (request smuggling guard).
pub fn serialize_request(req: &RequestDescriptor) -> Vec<u8> {
    let mut headers = req.headers.clone();

    let method = req.method.to_ascii_uppercase();
    let path = if req.path.is_empty() { "/" } else { req.path.as_str() };

    let chunked = headers
        .get("transfer-encoding")
        .map(|v| v.eq_ignore_ascii_case("chunked"))
        .unwrap_or(false);

    if chunked {
        headers.remove("content-length");
    } else if !headers.contains("content-length") {
        headers.set("content-length", req.body.len().to_string());
    }

    if !headers.contains("user-agent") {
        headers.set("user-agent", "WikiProxy/1.0");
    }

    let target = if req.query.is_empty() {
        path.to_string()
    } else {
        format!("{path}?{}", req.query)
    };

    let mut out = Vec::with_capacity(req.body.len() + 256);
    out.extend_from_slice(format!("{method} {target} HTTP/1.1\r\n").as_bytes());
    for (name, values) in headers.iter() {
        for value in values {
            out.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(&req.body);
    out
}

/// Parses a response from `reader`. Returns the descriptor plus whether the
/// connection may be pooled (false once `Connection: close` is seen on
/// HTTP/1.1, or the response isn't HTTP/1.1 at all).
pub async fn parse_response<R: AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
    method: &str,
) -> Result<(ResponseDescriptor, bool), HttpClientError> {
    let mut status_line = String::new();
    reader.read_line(&mut status_line).await?;
    if status_line.is_empty() {
        return Err(HttpClientError::MalformedResponse(
            "connection closed before a status line arrived".into(),
        ));
    }

    let trimmed = status_line.trim_end_matches(['\r', '\n']);
    let bytes = trimmed.as_bytes();
    if bytes.len() < 13 {
        return Err(HttpClientError::MalformedResponse(format!(
            "status line too short: {trimmed:?}"
        )));
    }

    // Fixed offsets per spec: "HTTP/x.y SP code SP reason".
    let version = String::from_utf8_lossy(&bytes[5..8]).into_owned();
    let status: u16 = std::str::from_utf8(&bytes[9..12])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| HttpClientError::MalformedResponse(format!("bad status code in {trimmed:?}")))?;
    let reason = if bytes.len() > 13 {
        String::from_utf8_lossy(&bytes[13..]).into_owned()
    } else {
        String::new()
    };

    let headers = read_header_block(reader).await?;

    let keep_alive = if version == "1.1" {
        !headers
            .get("connection")
            .map(|v| v.eq_ignore_ascii_case("close"))
            .unwrap_or(false)
    } else {
        false
    };

    let has_body = !method.eq_ignore_ascii_case("HEAD")
        && !(100..200).contains(&status)
        && status != 204
        && status != 304;

    let mut body = Vec::new();
    let mut trailers = HeaderTable::new();

    if has_body {
        let is_chunked = headers
            .get("transfer-encoding")
            .map(|v| v.to_ascii_lowercase().contains("chunked"))
            .unwrap_or(false);

        if is_chunked {
            body = read_chunked_body(reader).await?;
            trailers = read_header_block(reader).await?;
        } else if let Some(len) = headers.get("content-length") {
            let len: usize = len
                .parse()
                .map_err(|_| HttpClientError::MalformedResponse(format!("bad content-length: {len}")))?;
            body.resize(len, 0);
            reader.read_exact(&mut body).await?;
        } else {
            reader.read_to_end(&mut body).await?;
        }
    }

    let mut headers = headers;
    headers.merge_missing(&trailers);

    Ok((
        ResponseDescriptor {
            version,
            status,
            reason,
            headers,
            trailers,
            body,
        },
        keep_alive,
    ))
}

async fn read_header_block<R: AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
) -> Result<HeaderTable, HttpClientError> {
    let mut headers = HeaderTable::new();
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            break;
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }
        match trimmed.split_once(':') {
            Some((name, value)) => headers.append(name.trim(), value.trim().to_string()),
            None => tracing::warn!("skipping malformed header line: {trimmed:?}"),
        }
    }
    Ok(headers)
}

/// Hex size line, data, CRLF, terminate on a zero-size chunk. Leaves the
/// trailer block (possibly just the terminating blank line) for the caller
/// to read with `read_header_block`.
async fn read_chunked_body<R: AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
) -> Result<Vec<u8>, HttpClientError> {
    let mut body = Vec::new();
    loop {
        let mut size_line = String::new();
        reader.read_line(&mut size_line).await?;
        let size_str = size_line
            .trim_end_matches(['\r', '\n'])
            .split(';')
            .next()
            .unwrap_or("")
            .trim();
        let size = usize::from_str_radix(size_str, 16).map_err(|_| {
            HttpClientError::MalformedResponse(format!("bad chunk size line: {size_str:?}"))
        })?;

        if size == 0 {
            break;
        }

        let mut chunk = vec![0u8; size];
        reader.read_exact(&mut chunk).await?;
        body.extend_from_slice(&chunk);

        let mut crlf = [0u8; 2];
        reader.read_exact(&mut crlf).await?;
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn serializes_request_with_computed_content_length() {
        let req = RequestDescriptor {
            scheme: "https".into(),
            host: "en.wikipedia.org".into(),
            port: 443,
            method: "post".into(),
            path: "/w/index.php".into(),
            query: "title=Foo".into(),
            headers: HeaderTable::new(),
            body: b"abc".to_vec(),
        };
        let wire = serialize_request(&req);
        let text = String::from_utf8(wire).unwrap();
        assert!(text.starts_with("POST /w/index.php?title=Foo HTTP/1.1\r\n"));
        assert!(text.contains("content-length: 3\r\n"));
        assert!(text.contains("user-agent: WikiProxy/1.0\r\n"));
        assert!(text.ends_with("\r\n\r\nabc"));
    }

    #[test]
    fn chunked_transfer_encoding_strips_content_length() {
        let mut headers = HeaderTable::new();
        headers.set("transfer-encoding", "chunked");
        headers.set("content-length", "999");
        let req = RequestDescriptor {
            scheme: "http".into(),
            host: "en.wikipedia.org".into(),
            port: 80,
            method: "GET".into(),
            path: "".into(),
            query: "".into(),
            headers,
            body: Vec::new(),
        };
        let text = String::from_utf8(serialize_request(&req)).unwrap();
        assert!(text.starts_with("GET / HTTP/1.1\r\n"));
        assert!(!text.contains("content-length"));
    }

    #[tokio::test]
    async fn parses_status_line_by_fixed_offset() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello".to_vec();
        let mut reader = BufReader::new(Cursor::new(raw));
        let (resp, keep_alive) = parse_response(&mut reader, "GET").await.unwrap();
        assert_eq!(resp.version, "1.1");
        assert_eq!(resp.status, 200);
        assert_eq!(resp.reason, "OK");
        assert_eq!(resp.body, b"hello");
        assert!(keep_alive);
    }

    #[tokio::test]
    async fn connection_close_clears_keep_alive() {
        let raw = b"HTTP/1.1 200 OK\r\nConnection: close\r\nContent-Length: 0\r\n\r\n".to_vec();
        let mut reader = BufReader::new(Cursor::new(raw));
        let (_, keep_alive) = parse_response(&mut reader, "GET").await.unwrap();
        assert!(!keep_alive);
    }

    #[tokio::test]
    async fn decodes_chunked_body() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n5\r\nhello\r\n0\r\n\r\n".to_vec();
        let mut reader = BufReader::new(Cursor::new(raw));
        let (resp, _) = parse_response(&mut reader, "GET").await.unwrap();
        assert_eq!(resp.body, b"abchello");
    }

    #[tokio::test]
    async fn head_and_204_have_no_body() {
        let raw = b"HTTP/1.1 204 No Content\r\n\r\n".to_vec();
        let mut reader = BufReader::new(Cursor::new(raw));
        let (resp, _) = parse_response(&mut reader, "GET").await.unwrap();
        assert!(resp.body.is_empty());
    }

    #[tokio::test]
    async fn trailers_are_visible_through_header_lookup_without_overwriting() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nTrailer: X-Checksum\r\nX-Checksum: a\r\n\r\n3\r\nabc\r\n0\r\nX-Checksum: z\r\nX-Extra: new\r\n\r\n".to_vec();
        let mut reader = BufReader::new(Cursor::new(raw));
        let (resp, _) = parse_response(&mut reader, "GET").await.unwrap();
        assert_eq!(resp.headers.get("x-checksum"), Some("a"));
        assert_eq!(resp.headers.get("x-extra"), Some("new"));
    }
}
