//! §4.8 orchestrator behind a thin hyper HTTP/1.1 front listener. The
//! listener speaks plaintext to its client — whatever terminates client TLS
//! in a full deployment sits in front of it (out of scope, §1). Uses the
//! familiar accept-loop shape (`tokio::select!`, `http1::Builder`,
//! `service_fn`, per-connection spawn) with the reverse-proxy pipeline in
//! place of an MITM/plugin pipeline.

use crate::admission::{AdmissionConfig, AdmissionGate, Decision};
use crate::config::AppConfig;
use crate::error::WikiProxyError;
use crate::http::{HttpClient, RequestDescriptor};
use crate::mapper::WikiBinding;
use crate::resolver::{Resolver, ResolverConfigOpts};
use crate::socks5::SocksDialer;

mod utils;
pub use utils::{error_response, hyper_headers_to_table, is_closed, write_response};


use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::HOST;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{debug, error, warn};

#[derive(Clone)]
pub struct ProxyServer {
    bindings: Arc<HashMap<String, Arc<WikiBinding>>>,
    admission: Arc<AdmissionGate>,
    http_client: Arc<HttpClient>,
    bind_addr: String,
    listen_addr: Option<SocketAddr>,
    shutdown_notify: Arc<Notify>,
}

impl ProxyServer {
    pub async fn new(config: &AppConfig) -> Result<Self, WikiProxyError> {
        let resolver = Arc::new(Resolver::new(ResolverConfigOpts {
            nameservers: Vec::new(),
            timeout: Duration::from_secs(config.dns.timeout_s),
            retrans: config.dns.retrans,
            prefer_ipv6: config.dns.prefer_ipv6,
            cache_size: config.dns.cache_size,
            cache_ttl: Duration::from_secs(config.dns.cache_ttl_s),
        }));

        let dialer = match &config.proxy.socks5_url {
            Some(url) => Some(Arc::new(SocksDialer::new(url, resolver.clone()).await?)),
            None => None,
        };

        let http_client = Arc::new(HttpClient::new(resolver, dialer)?);

        let bindings = config
            .wikis
            .iter()
            .map(|wiki| (wiki.host.clone(), Arc::new(WikiBinding::compile(wiki))))
            .collect();

        let admission = Arc::new(AdmissionGate::new(AdmissionConfig {
            status_code: config.auth.code,
            retries: config.auth.retries,
            wait_time: Duration::from_secs(config.auth.wait_time_s),
            ttl: Duration::from_secs(config.auth.ttl_s),
        }));

        Ok(Self {
            bindings: Arc::new(bindings),
            admission,
            http_client,
            bind_addr: config.proxy.listen_addr.clone(),
            listen_addr: None,
            shutdown_notify: Arc::new(Notify::new()),
        })
    }

    pub fn listen_addr(&self) -> Option<SocketAddr> {
        self.listen_addr
    }

    /// Binds the listener and spawns the accept loop. Returns once the
    /// listener is bound.
    pub async fn start(&mut self) -> Result<(), WikiProxyError> {
        let bind_addr: SocketAddr = self
            .bind_addr
            .parse()
            .map_err(|_| WikiProxyError::BadRequest(format!("invalid listen address: {}", self.bind_addr)))?;

        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|e| WikiProxyError::Http(crate::error::HttpClientError::Io(e)))?;
        self.listen_addr = Some(listener.local_addr().map_err(|e| {
            WikiProxyError::Http(crate::error::HttpClientError::Io(e))
        })?);

        let shutdown = self.shutdown_notify.clone();
        let server = self.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.notified() => break,
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok((io, peer)) => {
                                debug!("accepted connection from {}", peer);
                                let server = server.clone();
                                tokio::spawn(async move {
                                    let svc = service_fn(move |req: Request<Incoming>| {
                                        let server = server.clone();
                                        let client_ip = peer.ip().to_string();
                                        async move { Ok::<_, std::io::Error>(server.handle_request(req, client_ip).await) }
                                    });

                                    if let Err(e) = http1::Builder::new()
                                        .preserve_header_case(true)
                                        .title_case_headers(true)
                                        .serve_connection(TokioIo::new(io), svc)
                                        .await
                                    {
                                        if is_closed(&e) {
                                            debug!("client closed: {}", e);
                                        } else {
                                            error!("conn error: {}", e);
                                        }
                                    }
                                });
                            }
                            Err(e) => error!("accept error: {}", e),
                        }
                    }
                }
            }
        });

        Ok(())
    }

    pub async fn join(&self) {
        self.shutdown_notify.notified().await;
    }

    pub async fn shutdown(&self) {
        self.shutdown_notify.notify_waiters();
    }

    /// §4.8, steps 1–10. Never fails — every subsystem error collapses into
    /// a response (§7).
    async fn handle_request(&self, req: Request<Incoming>, client_ip: String) -> Response<Full<Bytes>> {
        let user_agent = req
            .headers()
            .get(hyper::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        match self.admission.check(&client_ip, &user_agent) {
            Decision::MissingUserAgent => {
                return error_response(&WikiProxyError::MissingUserAgent);
            }
            Decision::Challenge { status_code, remaining } => {
                return Response::builder()
                    .status(status_code)
                    .body(Full::new(Bytes::from(remaining.to_string())))
                    .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())));
            }
            Decision::Admitted => {}
        }

        let host_header = req
            .headers()
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let (host_part, hport) = match host_header.split_once(':') {
            Some((h, p)) => (h.to_string(), format!(":{p}")),
            None => (host_header.clone(), String::new()),
        };

        let binding = match self.bindings.get(&host_part) {
            Some(binding) => binding.clone(),
            None => return error_response(&WikiProxyError::UnknownHost(host_part)),
        };

        match self.proxy_to_upstream(req, &binding, &host_part, &hport).await {
            Ok(resp) => resp,
            Err(err) => {
                warn!(host = %host_part, error = %err, "request failed");
                error_response(&err)
            }
        }
    }

    async fn proxy_to_upstream(
        &self,
        req: Request<Incoming>,
        binding: &WikiBinding,
        proxy_host: &str,
        hport: &str,
    ) -> Result<Response<Full<Bytes>>, WikiProxyError> {
        let method = req.method().as_str().to_string();
        let path = req.uri().path().to_string();
        let query = req.uri().query().unwrap_or("").to_string();

        let mut headers = hyper_headers_to_table(req.headers());
        let body = req
            .into_body()
            .collect()
            .await
            .map_err(|e| WikiProxyError::BadRequest(e.to_string()))?
            .to_bytes()
            .to_vec();

        let (upstream_domain, upstream_path) = binding.resolve_path(&path);

        headers.set("host", upstream_domain.clone());
        headers.remove("accept-encoding");

        let request = RequestDescriptor {
            scheme: "https".to_string(),
            host: upstream_domain,
            port: 443,
            method,
            path: upstream_path,
            query,
            headers,
            body,
        };

        let mut response = self.http_client.send(request).await?;

        response.headers.remove("connection");
        response.headers.remove("trailer");

        if let Some(location) = response.headers.get("location").map(str::to_string) {
            response
                .headers
                .set("location", binding.rewrite_text(&location, proxy_host, hport));
        }

        let content_type = response
            .headers
            .get("content-type")
            .map(|v| v.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
            .unwrap_or_default();

        if matches!(content_type.as_str(), "text/html" | "text/javascript" | "text/css") {
            let text = String::from_utf8_lossy(&response.body).into_owned();
            let rewritten = binding.rewrite_text(&text, proxy_host, hport);
            response.body = rewritten.into_bytes();
            response.headers.set("content-length", response.body.len().to_string());
        }

        Ok(write_response(response))
    }
}
