//! §4.6 admission gate: a TTL-keyed shared counter table that requires N
//! repeat requests from `(client_ip, user_agent)` before granting a
//! time-limited admission token. Lazy expiry-on-read, the same style
//! `resolver::Resolver`'s cache uses.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    pub status_code: u16,
    pub retries: u32,
    pub wait_time: Duration,
    pub ttl: Duration,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            status_code: 404,
            retries: 6,
            wait_time: Duration::from_secs(10),
            ttl: Duration::from_secs(3600),
        }
    }
}

enum Entry {
    Authing { count: u32, expires_at: Instant },
    Authed { expires_at: Instant },
}

/// The outcome the orchestrator acts on for one request.
pub enum Decision {
    /// No `User-Agent` header at all.
    MissingUserAgent,
    /// Pass the request through to the rest of the pipeline.
    Admitted,
    /// Write `status_code` with this body (the remaining challenge count)
    /// and stop.
    Challenge { status_code: u16, remaining: u32 },
}

pub struct AdmissionGate {
    config: AdmissionConfig,
    table: RwLock<HashMap<String, Entry>>,
}

impl AdmissionGate {
    pub fn new(config: AdmissionConfig) -> Self {
        Self {
            config,
            table: RwLock::new(HashMap::new()),
        }
    }

    pub fn check(&self, client_ip: &str, user_agent: &str) -> Decision {
        if user_agent.is_empty() {
            return Decision::MissingUserAgent;
        }

        let authed_key = format!("authed:{client_ip}:{user_agent}");
        let authing_key = format!("authing:{client_ip}:{user_agent}");
        let now = Instant::now();

        {
            let table = self.table.read().unwrap();
            if let Some(Entry::Authed { expires_at }) = table.get(&authed_key) {
                if *expires_at > now {
                    return Decision::Admitted;
                }
            }
        }

        let mut table = self.table.write().unwrap();
        // Re-check under the write lock: another request may have promoted
        // or expired this key between the read above and here.
        if let Some(Entry::Authed { expires_at }) = table.get(&authed_key) {
            if *expires_at > now {
                return Decision::Admitted;
            }
        }

        let count = match table.get(&authing_key) {
            Some(Entry::Authing { count, expires_at }) if *expires_at > now => count + 1,
            _ => 1,
        };

        if count <= self.config.retries {
            table.insert(
                authing_key,
                Entry::Authing {
                    count,
                    expires_at: now + self.config.wait_time,
                },
            );
            Decision::Challenge {
                status_code: self.config.status_code,
                remaining: self.config.retries + 1 - count,
            }
        } else {
            table.remove(&authing_key);
            table.insert(
                authed_key,
                Entry::Authed {
                    expires_at: now + self.config.ttl,
                },
            );
            Decision::Admitted
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_user_agent_is_always_rejected() {
        let gate = AdmissionGate::new(AdmissionConfig::default());
        assert!(matches!(gate.check("1.2.3.4", ""), Decision::MissingUserAgent));
    }

    #[test]
    fn retries_then_admits_with_counting_down_remaining() {
        let gate = AdmissionGate::new(AdmissionConfig {
            retries: 2,
            ..AdmissionConfig::default()
        });

        for expected_remaining in [2, 1] {
            match gate.check("1.2.3.4", "UA") {
                Decision::Challenge { remaining, .. } => assert_eq!(remaining, expected_remaining),
                _ => panic!("expected a challenge"),
            }
        }

        assert!(matches!(gate.check("1.2.3.4", "UA"), Decision::Admitted));
        // Once authed, further requests from the same (ip, ua) pass too.
        assert!(matches!(gate.check("1.2.3.4", "UA"), Decision::Admitted));
    }

    #[test]
    fn distinct_clients_get_independent_counters() {
        let gate = AdmissionGate::new(AdmissionConfig {
            retries: 1,
            ..AdmissionConfig::default()
        });
        assert!(matches!(
            gate.check("1.1.1.1", "UA"),
            Decision::Challenge { remaining: 1, .. }
        ));
        assert!(matches!(
            gate.check("2.2.2.2", "UA"),
            Decision::Challenge { remaining: 1, .. }
        ));
    }
}
