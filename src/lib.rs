//! WikiProxy: a reverse proxy that exposes Wikipedia's multi-domain sites
//! (primary + mobile/alternate domains) behind a single proxy host per
//! language, rewriting links and dialing egress through an optional SOCKS5
//! tunnel.

pub mod addr;
pub mod admission;
pub mod cli;
pub mod config;
pub mod error;
pub mod gzip;
pub mod http;
pub mod mapper;
pub mod proxy;
pub mod resolver;
pub mod socks5;

#[cfg(test)]
pub mod test_utils;

pub use admission::{AdmissionConfig, AdmissionGate};
pub use config::AppConfig;
pub use error::WikiProxyError;
pub use mapper::{WikiBinding, WikiConfig, WikiMap};
pub use proxy::ProxyServer;

use anyhow::Result;
use std::net::SocketAddr;
use tokio::sync::Notify;
use std::sync::Arc;
use tracing::info;

/// Owns the proxy server's lifecycle: start, wait for a shutdown signal,
/// shut down. No web server, no plugin registry, no certificate authority —
/// WikiProxy's listener never terminates client TLS (§1).
pub struct WikiProxy {
    config: AppConfig,
    proxy_server: Option<ProxyServer>,
    shutdown_notify: Arc<Notify>,
}

impl WikiProxy {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            proxy_server: None,
            shutdown_notify: Arc::new(Notify::new()),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Listen address, available once `start()` has returned.
    pub fn listen_addr(&self) -> Option<SocketAddr> {
        self.proxy_server.as_ref().and_then(|s| s.listen_addr())
    }

    pub async fn start(&mut self) -> Result<()> {
        let _ = rustls::crypto::ring::default_provider().install_default();
        info!("starting wikiproxy");

        let mut proxy_server = ProxyServer::new(&self.config).await?;
        proxy_server.start().await?;
        let addr = proxy_server
            .listen_addr()
            .ok_or_else(|| anyhow::anyhow!("proxy server did not bind a listen address"))?;
        info!("proxy listening on {}", addr);

        self.proxy_server = Some(proxy_server);
        Ok(())
    }

    /// Blocks until a shutdown signal (SIGINT/SIGTERM) or explicit
    /// `shutdown()` call.
    pub async fn join(&self) -> Result<()> {
        if let Some(proxy_server) = &self.proxy_server {
            tokio::select! {
                _ = proxy_server.join() => {},
                _ = self.listen_shutdown_signal() => {},
            };
        }
        Ok(())
    }

    pub async fn shutdown(&mut self) {
        info!("shutting down");
        if let Some(proxy_server) = &self.proxy_server {
            proxy_server.shutdown().await;
        }
        self.shutdown_notify.notify_waiters();
    }

    pub async fn run(&mut self) -> Result<()> {
        self.start().await?;
        self.join().await?;
        self.shutdown().await;
        Ok(())
    }

    async fn listen_shutdown_signal(&self) {
        #[cfg(unix)]
        let terminate = async {
            if let Ok(mut sigterm) =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            {
                sigterm.recv().await;
            } else {
                tracing::warn!("failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(windows)]
        let terminate = async {
            tokio::signal::windows::ctrl_break()
                .expect("failed to install ctrl-break handler")
                .recv()
                .await;
        };

        tokio::select! {
            _ = terminate => {},
            _ = tokio::signal::ctrl_c() => {},
            _ = self.shutdown_notify.notified() => {},
        };
    }
}
