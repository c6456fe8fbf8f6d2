//! Test harness: binding fixtures and a helper that boots a real
//! `ProxyServer` and talks to it over a raw TCP socket — no CA, no WASM
//! component, no reqwest client, just what WikiProxy's tests actually need.

use crate::config::AppConfig;
use crate::mapper::{WikiConfig, WikiMap};
use crate::proxy::ProxyServer;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// The binding used throughout §8's scenarios.
pub fn en_wiki_config() -> WikiConfig {
    WikiConfig {
        host: "en.p".to_string(),
        domain: "en.wikipedia.org".to_string(),
        maps: vec![WikiMap {
            wiki_domain: "en.m.wikipedia.org".to_string(),
            path_prefix: "/.wp-m/".to_string(),
        }],
    }
}

pub async fn spawn_test_proxy(wikis: Vec<WikiConfig>) -> ProxyServer {
    spawn_test_proxy_with(wikis, |_| {}).await
}

/// Like `spawn_test_proxy`, but lets the caller tweak the config first (e.g.
/// lower `auth.retries` to match a specific scenario).
pub async fn spawn_test_proxy_with(wikis: Vec<WikiConfig>, configure: impl FnOnce(&mut AppConfig)) -> ProxyServer {
    let mut config = AppConfig::default();
    config.proxy.listen_addr = "127.0.0.1:0".to_string();
    config.wikis = wikis;
    configure(&mut config);

    let mut server = ProxyServer::new(&config).await.expect("proxy construction");
    server.start().await.expect("proxy start");
    server
}

/// Sends a raw HTTP/1.1 request over a fresh connection and returns the full
/// response text. Requests should set `Connection: close` so the server
/// closes the socket once the response is written.
pub async fn raw_request(addr: std::net::SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.expect("connect to test proxy");
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.unwrap();
    String::from_utf8_lossy(&buf).into_owned()
}
