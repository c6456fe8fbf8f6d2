//! §4.4 SOCKS5 dialer. Hand-rolled per RFC 1928 — the exact greeting/
//! negotiation/CONNECT byte sequences are under test, which rules out
//! reaching for a crate like `tokio-socks`/`fast-socks5` here. The
//! control-flow shape (typed error per failed step, no retry) follows
//! `proxy::utils::ProxyError`'s per-variant style.

use crate::addr::{be16, is_ipv4, is_ipv6, pack_ipv4, pack_ipv6};
use crate::error::SocksError;
use crate::resolver::Resolver;
use rand::seq::SliceRandom;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// A dialer bound to one SOCKS5 proxy, resolved once at construction.
pub struct SocksDialer {
    proxy_addr: SocketAddr,
    proxy_host: String,
    proxy_port: u16,
    remote_resolve: bool,
    resolver: Arc<Resolver>,
}

impl SocksDialer {
    /// `proxy_url` is `socks5(h)?://host:port[/]`.
    pub async fn new(proxy_url: &str, resolver: Arc<Resolver>) -> Result<Self, SocksError> {
        let (remote_resolve, rest) = if let Some(rest) = proxy_url.strip_prefix("socks5h://") {
            (true, rest)
        } else if let Some(rest) = proxy_url.strip_prefix("socks5://") {
            (false, rest)
        } else {
            return Err(SocksError::ProtocolError(format!(
                "unsupported proxy scheme: {proxy_url}"
            )));
        };

        let rest = rest.trim_end_matches('/');
        let (host, port_str) = rest.rsplit_once(':').ok_or_else(|| {
            SocksError::ProtocolError(format!("missing port in proxy url: {proxy_url}"))
        })?;
        let port: u16 = port_str
            .parse()
            .map_err(|_| SocksError::ProtocolError(format!("invalid proxy port: {port_str}")))?;

        let addresses = resolver.resolve(host).await?;
        let chosen = addresses
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| SocksError::ProtocolError(format!("could not resolve proxy host: {host}")))?;
        let ip_text = chosen.trim_start_matches('[').trim_end_matches(']');
        let ip: std::net::IpAddr = ip_text.parse().map_err(|_| {
            SocksError::ProtocolError(format!("unparseable resolved proxy address: {chosen}"))
        })?;

        Ok(Self {
            proxy_addr: SocketAddr::new(ip, port),
            proxy_host: host.to_string(),
            proxy_port: port,
            remote_resolve,
            resolver,
        })
    }

    /// True iff the proxy scheme is `socks5h` (the proxy resolves the target
    /// name itself).
    pub fn is_remote_resolve(&self) -> bool {
        self.remote_resolve
    }

    pub async fn connect(
        &self,
        target_host: &str,
        target_port: u16,
    ) -> Result<SocksSession, SocksError> {
        let mut socket = TcpStream::connect(self.proxy_addr)
            .await
            .map_err(SocksError::ProxyUnreachable)?;

        // Greeting: version, method-count, no-auth, gssapi filler.
        socket
            .write_all(&[0x05, 0x02, 0x00, 0x01])
            .await
            .map_err(SocksError::ProxyUnreachable)?;

        let mut greeting_reply = [0u8; 2];
        socket
            .read_exact(&mut greeting_reply)
            .await
            .map_err(SocksError::ProxyUnreachable)?;
        if greeting_reply[0] != 0x05 {
            return Err(SocksError::ProtocolError(format!(
                "unexpected socks version in greeting reply: {}",
                greeting_reply[0]
            )));
        }
        if greeting_reply[1] != 0x00 {
            return Err(SocksError::UnsupportedAuth);
        }

        let connect_request = self.build_connect_request(target_host, target_port).await?;
        socket
            .write_all(&connect_request)
            .await
            .map_err(SocksError::ProxyUnreachable)?;

        let mut head = [0u8; 4];
        socket
            .read_exact(&mut head)
            .await
            .map_err(SocksError::ProxyUnreachable)?;
        if head[0] != 0x05 {
            return Err(SocksError::ProtocolError(format!(
                "unexpected socks version in connect reply: {}",
                head[0]
            )));
        }
        if head[1] != 0x00 {
            return Err(SocksError::ConnectRefused(head[1]));
        }

        let remaining = match head[3] {
            0x01 => 6,  // IPv4 address(4) + port(2)
            0x04 => 18, // IPv6 address(16) + port(2)
            0x03 => {
                let mut len_byte = [0u8; 1];
                socket
                    .read_exact(&mut len_byte)
                    .await
                    .map_err(SocksError::ProxyUnreachable)?;
                len_byte[0] as usize + 2
            }
            other => {
                return Err(SocksError::ProtocolError(format!(
                    "unknown ATYPE in connect reply: {other}"
                )));
            }
        };
        let mut tail = vec![0u8; remaining];
        socket
            .read_exact(&mut tail)
            .await
            .map_err(SocksError::ProxyUnreachable)?;

        Ok(SocksSession {
            socket,
            remote_resolve: self.remote_resolve,
            proxy_host: self.proxy_host.clone(),
            proxy_port: self.proxy_port,
        })
    }

    async fn build_connect_request(
        &self,
        target_host: &str,
        target_port: u16,
    ) -> Result<Vec<u8>, SocksError> {
        let mut req = vec![0x05, 0x01, 0x00];

        if is_ipv4(target_host) {
            req.push(0x01);
            req.extend_from_slice(&pack_ipv4(target_host)?);
        } else if is_ipv6(target_host, true) {
            req.push(0x04);
            req.extend_from_slice(&pack_ipv6(target_host)?);
        } else if self.remote_resolve {
            req.push(0x03);
            req.push(target_host.len() as u8);
            req.extend_from_slice(target_host.as_bytes());
        } else {
            let addresses = self.resolver.resolve(target_host).await?;
            let chosen = addresses.choose(&mut rand::thread_rng()).cloned().ok_or_else(|| {
                SocksError::ProtocolError(format!("could not resolve target host: {target_host}"))
            })?;
            if is_ipv4(&chosen) {
                req.push(0x01);
                req.extend_from_slice(&pack_ipv4(&chosen)?);
            } else {
                req.push(0x04);
                req.extend_from_slice(&pack_ipv6(&chosen)?);
            }
        }

        req.extend_from_slice(&be16(target_port));
        Ok(req)
    }
}

/// The post-CONNECT tunnel. Transparently exposes read/write (and, once
/// wrapped, TLS handshake) on the underlying socket.
pub struct SocksSession {
    socket: TcpStream,
    remote_resolve: bool,
    proxy_host: String,
    proxy_port: u16,
}

impl SocksSession {
    pub fn is_remote_resolve(&self) -> bool {
        self.remote_resolve
    }

    pub fn proxy_host(&self) -> &str {
        &self.proxy_host
    }

    pub fn proxy_port(&self) -> u16 {
        self.proxy_port
    }

    pub fn into_inner(self) -> TcpStream {
        self.socket
    }
}

impl std::ops::Deref for SocksSession {
    type Target = TcpStream;
    fn deref(&self) -> &TcpStream {
        &self.socket
    }
}

impl std::ops::DerefMut for SocksSession {
    fn deref_mut(&mut self) -> &mut TcpStream {
        &mut self.socket
    }
}
