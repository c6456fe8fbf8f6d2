//! §4.5 HTTP/1.1 client: connect (direct or via a configured SOCKS5 dialer),
//! serialize, parse, pool. The pieces live in `headers`/`wire`/`pool`; this
//! module is the facade that ties connect+dispatch together in one place.

pub mod headers;
pub mod pool;
pub mod wire;

pub use headers::HeaderTable;
pub use pool::{ConnectionPool, PoolKey, PooledStream};
pub use wire::{parse_response, serialize_request, RequestDescriptor, ResponseDescriptor};

use crate::error::HttpClientError;
use crate::resolver::Resolver;
use crate::socks5::SocksDialer;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

const MAX_IDLE_PER_KEY: usize = 4;
const IDLE_TIMEOUT: Duration = Duration::from_secs(90);

pub struct HttpClient {
    resolver: Arc<Resolver>,
    dialer: Option<Arc<SocksDialer>>,
    pool: ConnectionPool,
    tls_connector: TlsConnector,
}

impl HttpClient {
    pub fn new(resolver: Arc<Resolver>, dialer: Option<Arc<SocksDialer>>) -> Result<Self, HttpClientError> {
        let mut roots = RootCertStore::empty();
        let native = rustls_native_certs::load_native_certs();
        for cert in native.certs {
            let _ = roots.add(cert);
        }
        let client_config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();

        Ok(Self {
            resolver,
            dialer,
            pool: ConnectionPool::new(MAX_IDLE_PER_KEY, IDLE_TIMEOUT),
            tls_connector: TlsConnector::from(Arc::new(client_config)),
        })
    }

    /// Connect, send, parse, and either pool or drop the socket. The SNI is
    /// the lowercased `Host` header without port, per §4.5.
    pub async fn send(&self, req: RequestDescriptor) -> Result<ResponseDescriptor, HttpClientError> {
        let tls = req.scheme.eq_ignore_ascii_case("https");
        let sni = req.host.to_lowercase();
        let key: PoolKey = (req.scheme.clone(), req.host.clone(), req.port, tls, sni.clone());

        let stream = match self.pool.checkout(&key).await {
            Some(stream) => stream,
            None => self.dial(&req.host, req.port, tls, &sni).await?,
        };

        let wire = serialize_request(&req);
        let mut stream = stream;
        stream.write_all(&wire).await?;

        let mut reader = BufReader::new(stream);
        let (response, keep_alive) = parse_response(&mut reader, &req.method).await?;
        let stream = reader.into_inner();

        if keep_alive {
            self.pool.checkin(key, stream).await;
        }

        Ok(response)
    }

    async fn dial(
        &self,
        host: &str,
        port: u16,
        tls: bool,
        sni: &str,
    ) -> Result<Box<dyn PooledStream>, HttpClientError> {
        let tcp = match &self.dialer {
            Some(dialer) => dialer.connect(host, port).await?.into_inner(),
            None => {
                let resolved = self.resolver.resolve_one(host).await?;
                let ip = resolved.trim_start_matches('[').trim_end_matches(']');
                let addr: SocketAddr = format!("{ip}:{port}")
                    .parse()
                    .map_err(|_| HttpClientError::InvalidRequest(format!("bad resolved address: {resolved}")))?;
                TcpStream::connect(addr).await?
            }
        };

        if tls {
            let server_name = ServerName::try_from(sni.to_string())
                .map_err(|_| HttpClientError::InvalidRequest(format!("invalid SNI: {sni}")))?;
            let tls_stream = self.tls_connector.connect(server_name, tcp).await?;
            Ok(Box::new(tls_stream))
        } else {
            Ok(Box::new(tcp))
        }
    }
}
