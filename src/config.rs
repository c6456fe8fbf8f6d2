//! Layered configuration (§6): `confique` merges env vars and an optional
//! TOML file into `AppConfig`. `proxy`/`auth`/`dns` double as `clap::Args`
//! (flattened into the CLI); `wikis` has no sane single-flag CLI form and is
//! file/env-only.

use crate::mapper::WikiConfig;
use anyhow::Result;
use clap::Args;
use confique::Config;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Config, Clone, Default, Serialize, Deserialize)]
#[config(partial_attr(derive(Args, Serialize, Clone)))]
pub struct AppConfig {
    #[config(nested, partial_attr(command(flatten)))]
    pub proxy: ProxyConfig,

    #[config(nested, partial_attr(command(flatten)))]
    pub auth: AuthConfig,

    #[config(nested, partial_attr(command(flatten)))]
    pub dns: DnsConfig,

    /// Per-host bindings. File/env-driven only.
    #[config(default = [], partial_attr(arg(skip)))]
    pub wikis: Vec<WikiConfig>,
}

#[derive(Clone, Config, Deserialize, Serialize)]
#[config(partial_attr(derive(Args, Clone, Serialize)))]
pub struct ProxyConfig {
    /// The address the proxy's HTTP listener binds to.
    #[config(
        env = "WIKIPROXY_LISTEN_ADDR",
        default = "127.0.0.1:8080",
        partial_attr(arg(long, default_value = "127.0.0.1:8080"))
    )]
    pub listen_addr: String,

    /// Optional `socks5://` or `socks5h://` egress proxy for upstream dials.
    #[config(env = "WIKIPROXY_SOCKS5_URL", partial_attr(arg(long)))]
    pub socks5_url: Option<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            socks5_url: None,
        }
    }
}

/// §4.6 admission gate defaults, matching §6 exactly.
#[derive(Clone, Config, Deserialize, Serialize)]
#[config(partial_attr(derive(Args, Clone, Serialize)))]
pub struct AuthConfig {
    #[config(default = 404, partial_attr(arg(long, default_value = "404")))]
    pub code: u16,

    #[config(default = 6, partial_attr(arg(long, default_value = "6")))]
    pub retries: u32,

    #[config(default = 10, partial_attr(arg(long, default_value = "10")))]
    pub wait_time_s: u64,

    #[config(default = 3600, partial_attr(arg(long, default_value = "3600")))]
    pub ttl_s: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            code: 404,
            retries: 6,
            wait_time_s: 10,
            ttl_s: 3600,
        }
    }
}

/// §4.2 resolver defaults, matching §6 exactly.
#[derive(Clone, Config, Deserialize, Serialize)]
#[config(partial_attr(derive(Args, Clone, Serialize)))]
pub struct DnsConfig {
    #[config(default = [], partial_attr(arg(long, value_delimiter = ',')))]
    pub nameservers: Vec<String>,

    #[config(default = 2, partial_attr(arg(long, default_value = "2")))]
    pub timeout_s: u64,

    #[config(default = 2, partial_attr(arg(long, default_value = "2")))]
    pub retrans: usize,

    #[config(default = false, partial_attr(arg(long, default_value = "false")))]
    pub prefer_ipv6: bool,

    #[config(default = 256, partial_attr(arg(long, default_value = "256")))]
    pub cache_size: usize,

    #[config(default = 600, partial_attr(arg(long, default_value = "600")))]
    pub cache_ttl_s: u64,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            nameservers: Vec::new(),
            timeout_s: 2,
            retrans: 2,
            prefer_ipv6: false,
            cache_size: 256,
            cache_ttl_s: 600,
        }
    }
}

impl AppConfig {
    /// Loads `AppConfig`, layering (lowest to highest precedence) defaults,
    /// an optional TOML file, then environment variables.
    pub fn load_layered<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let mut builder = AppConfig::builder().env();
        if let Some(path) = path {
            builder = builder.file(path.as_ref());
        }
        Ok(builder.load()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let auth = AuthConfig::default();
        assert_eq!(auth.code, 404);
        assert_eq!(auth.retries, 6);
        assert_eq!(auth.wait_time_s, 10);
        assert_eq!(auth.ttl_s, 3600);

        let dns = DnsConfig::default();
        assert_eq!(dns.cache_size, 256);
        assert_eq!(dns.cache_ttl_s, 600);
        assert_eq!(dns.timeout_s, 2);
        assert_eq!(dns.retrans, 2);
        assert!(!dns.prefer_ipv6);
    }

    #[test]
    fn loads_wikis_from_toml_file() {
        let toml = r#"
            [[wikis]]
            host = "en.p"
            domain = "en.wikipedia.org"

            [[wikis.maps]]
            wiki_domain = "en.m.wikipedia.org"
            path_prefix = "/.wp-m/"
        "#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, toml).unwrap();

        let config = AppConfig::load_layered(Some(&path)).unwrap();
        assert_eq!(config.wikis.len(), 1);
        assert_eq!(config.wikis[0].host, "en.p");
        assert_eq!(config.wikis[0].maps[0].path_prefix, "/.wp-m/");
    }
}
