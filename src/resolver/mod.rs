//! §4.2 resolver: name → address list with an LRU+TTL cache and family
//! preference. The cache is a `HashMap` keyed by lowercased name holding
//! `CacheEntry{addresses, expires_at}`, with lazy expiry-on-read and
//! eviction under a size bound. The resolver itself is rebuilt per call
//! rather than held, per §5's "DNS resolver per call" policy.

use crate::addr::{is_ipv4, is_ipv6, unbracket_ipv6};
use crate::error::ResolveError;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use rand::seq::SliceRandom;
use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ResolverConfigOpts {
    pub nameservers: Vec<SocketAddr>,
    pub timeout: Duration,
    pub retrans: usize,
    pub prefer_ipv6: bool,
    pub cache_size: usize,
    pub cache_ttl: Duration,
}

impl Default for ResolverConfigOpts {
    fn default() -> Self {
        Self {
            nameservers: Vec::new(),
            timeout: Duration::from_secs(2),
            retrans: 2,
            prefer_ipv6: false,
            cache_size: 256,
            cache_ttl: Duration::from_secs(600),
        }
    }
}

struct CacheEntry {
    addresses: Vec<String>,
    expires_at: Instant,
}

/// Name → address-list resolver. The cache is shared/multi-reader; the
/// underlying DNS resolver is never held across calls (§5).
pub struct Resolver {
    config: ResolverConfigOpts,
    cache: RwLock<HashMap<String, CacheEntry>>,
    order: RwLock<VecDeque<String>>,
}

impl Resolver {
    pub fn new(config: ResolverConfigOpts) -> Self {
        Self {
            config,
            cache: RwLock::new(HashMap::new()),
            order: RwLock::new(VecDeque::new()),
        }
    }

    /// Resolves `name` to a list of address strings (IPv6 bracketed).
    pub async fn resolve(&self, name: &str) -> Result<Vec<String>, ResolveError> {
        if is_ipv4(name) {
            return Ok(vec![name.to_string()]);
        }
        if is_ipv6(name, true) {
            let canonical: Ipv6Addr = unbracket_ipv6(name)
                .parse()
                .map_err(|_| crate::error::AddrError::Invalid(name.to_string()))?;
            return Ok(vec![format!("[{}]", canonical)]);
        }

        let lower = name.to_lowercase();
        if let Some(cached) = self.get_cached(&lower) {
            debug!(name = %lower, "resolver cache hit");
            return Ok(cached);
        }

        let resolver = self.build_resolver();
        let lookup = resolver
            .lookup_ip(lower.as_str())
            .await
            .map_err(ResolveError::Lookup)?;
        let all: Vec<IpAddr> = lookup.iter().collect();
        let (v4, v6): (Vec<IpAddr>, Vec<IpAddr>) = all.into_iter().partition(|a| a.is_ipv4());
        let families = if self.config.prefer_ipv6 {
            [v6, v4]
        } else {
            [v4, v6]
        };

        let chosen = families
            .into_iter()
            .find(|group| !group.is_empty())
            .ok_or_else(|| ResolveError::NoAddress(lower.clone()))?;

        let addresses: Vec<String> = chosen
            .into_iter()
            .map(|a| match a {
                IpAddr::V4(v4) => v4.to_string(),
                IpAddr::V6(v6) => format!("[{}]", v6),
            })
            .collect();

        self.cache_addresses(&lower, &addresses);
        Ok(addresses)
    }

    /// Resolves and picks one address at random — the policy used by both
    /// the SOCKS5 dialer and the HTTP client's connect step.
    pub async fn resolve_one(&self, name: &str) -> Result<String, ResolveError> {
        let addresses = self.resolve(name).await?;
        addresses
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| ResolveError::NoAddress(name.to_string()))
    }

    fn build_resolver(&self) -> TokioAsyncResolver {
        let mut opts = ResolverOpts::default();
        opts.timeout = self.config.timeout;
        opts.attempts = self.config.retrans;

        let cfg = if self.config.nameservers.is_empty() {
            ResolverConfig::default()
        } else {
            let ips: Vec<IpAddr> = self.config.nameservers.iter().map(|s| s.ip()).collect();
            let port = self.config.nameservers[0].port();
            let group = NameServerConfigGroup::from_ips_clear(&ips, port, true);
            ResolverConfig::from_parts(None, vec![], group)
        };

        TokioAsyncResolver::tokio(cfg, opts)
    }

    fn get_cached(&self, name: &str) -> Option<Vec<String>> {
        let cache = self.cache.read().unwrap();
        let entry = cache.get(name)?;
        if entry.expires_at > Instant::now() {
            Some(entry.addresses.clone())
        } else {
            None
        }
    }

    fn cache_addresses(&self, name: &str, addresses: &[String]) {
        let mut cache = self.cache.write().unwrap();
        let mut order = self.order.write().unwrap();

        if !cache.contains_key(name) {
            if cache.len() >= self.config.cache_size {
                if let Some(oldest) = order.pop_front() {
                    cache.remove(&oldest);
                }
            }
            order.push_back(name.to_string());
        }

        cache.insert(
            name.to_string(),
            CacheEntry {
                addresses: addresses.to_vec(),
                expires_at: Instant::now() + self.config.cache_ttl,
            },
        );
    }
}
