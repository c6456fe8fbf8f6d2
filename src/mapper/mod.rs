//! §4.7 URL mapper: per-binding compiled regex over the set of proxied
//! domains, plus forward (response rewrite) and reverse (request path)
//! mapping. All state here is computed once at load and frozen — "read-only
//! module objects" (§9) becomes structural immutability in Rust rather than
//! runtime write-guards.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WikiMap {
    pub wiki_domain: String,
    pub path_prefix: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WikiConfig {
    pub host: String,
    pub domain: String,
    #[serde(default)]
    pub maps: Vec<WikiMap>,
}

/// Immutable, once-compiled view of one binding (§3 "WikiBinding").
pub struct WikiBinding {
    pub host: String,
    pub primary_domain: String,
    regex: Regex,
    replacements: HashMap<String, String>,
    prefixes: Vec<(String, String)>,
    domains: HashSet<String>,
}

impl WikiBinding {
    pub fn compile(cfg: &WikiConfig) -> Self {
        let mut domains = HashSet::new();
        domains.insert(cfg.domain.clone());

        let mut replacements = HashMap::new();
        replacements.insert(cfg.domain.clone(), String::new());

        let mut prefixes = Vec::new();
        let mut domain_order = vec![cfg.domain.clone()];

        for map in &cfg.maps {
            // Stored without the trailing `/`: the regex boundary capture
            // supplies the separator on rewrite, and resolve_path re-appends
            // it explicitly, so the prefix itself stays bare.
            let prefix = map.path_prefix.trim_end_matches('/').to_string();
            domains.insert(map.wiki_domain.clone());
            replacements.insert(map.wiki_domain.clone(), prefix.clone());
            prefixes.push((map.wiki_domain.clone(), prefix));
            domain_order.push(map.wiki_domain.clone());
        }

        let escaped: Vec<String> = domain_order.iter().map(|d| regex::escape(d)).collect();
        let pattern = format!(r"(https?:)?//({})(?:$|([^a-zA-Z0-9_.]))", escaped.join("|"));
        let regex = Regex::new(&pattern).expect("per-binding domain regex is well-formed");

        Self {
            host: cfg.host.clone(),
            primary_domain: cfg.domain.clone(),
            regex,
            replacements,
            prefixes,
            domains,
        }
    }

    pub fn domains(&self) -> &HashSet<String> {
        &self.domains
    }

    /// Forward mapping (`rewrite_text`): substitutes every `//domain`
    /// (optionally scheme-prefixed) occurrence in `text` with the
    /// proxy-origin form, preserving the original scheme capture and the
    /// boundary character that follows the domain.
    pub fn rewrite_text(&self, text: &str, proxy_host: &str, hport: &str) -> String {
        self.regex
            .replace_all(text, |caps: &Captures| {
                let scheme = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                let domain = caps.get(2).map(|m| m.as_str()).unwrap_or("");
                let boundary = caps.get(3).map(|m| m.as_str()).unwrap_or("");
                let replacement_path = self.replacements.get(domain).map(String::as_str).unwrap_or("");
                format!("{scheme}//{proxy_host}{hport}{replacement_path}{boundary}")
            })
            .into_owned()
    }

    /// Reverse mapping (`resolve_path`): prefixes are tried in configuration
    /// order; the first exact or prefix match wins, falling through to the
    /// primary domain with the path unchanged.
    pub fn resolve_path(&self, path: &str) -> (String, String) {
        for (wiki_domain, prefix) in &self.prefixes {
            if path == prefix || path == format!("{prefix}/") {
                return (wiki_domain.clone(), "/".to_string());
            }
            if let Some(rest) = path.strip_prefix(&format!("{prefix}/")) {
                return (wiki_domain.clone(), format!("/{rest}"));
            }
        }
        (self.primary_domain.clone(), path.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn en_binding() -> WikiBinding {
        WikiBinding::compile(&WikiConfig {
            host: "en.p".to_string(),
            domain: "en.wikipedia.org".to_string(),
            maps: vec![WikiMap {
                wiki_domain: "en.m.wikipedia.org".to_string(),
                path_prefix: "/.wp-m/".to_string(),
            }],
        })
    }

    #[test]
    fn reverse_map_primary() {
        let binding = en_binding();
        let (domain, path) = binding.resolve_path("/wiki/Foo");
        assert_eq!(domain, "en.wikipedia.org");
        assert_eq!(path, "/wiki/Foo");
    }

    #[test]
    fn reverse_map_prefixed_exact_and_suffixed() {
        let binding = en_binding();
        assert_eq!(binding.resolve_path("/.wp-m/"), ("en.m.wikipedia.org".to_string(), "/".to_string()));
        assert_eq!(
            binding.resolve_path("/.wp-m/bar"),
            ("en.m.wikipedia.org".to_string(), "/bar".to_string())
        );
    }

    #[test]
    fn reverse_map_prefix_without_trailing_slash() {
        let binding = en_binding();
        assert_eq!(binding.resolve_path("/.wp-m"), ("en.m.wikipedia.org".to_string(), "/".to_string()));
    }

    #[test]
    fn forward_rewrite_body_preserves_boundary() {
        let binding = en_binding();
        let out = binding.rewrite_text(r#"<a href="https://en.m.wikipedia.org/x">"#, "en.p", "");
        assert_eq!(out, r#"<a href="https://en.p/.wp-m/x">"#);
    }

    #[test]
    fn forward_rewrite_with_port_and_no_scheme() {
        let binding = en_binding();
        let out = binding.rewrite_text("//en.wikipedia.org/y ", "en.p", ":8443");
        assert_eq!(out, "//en.p:8443/y ");
    }

    #[test]
    fn reverse_is_left_inverse_of_forward_for_embedded_urls() {
        let binding = en_binding();
        for (wiki_domain, prefix) in [
            ("en.wikipedia.org", ""),
            ("en.m.wikipedia.org", "/.wp-m/"),
        ] {
            let source = format!("https://{wiki_domain}/X ");
            let rewritten = binding.rewrite_text(&source, "en.p", "");
            let path_start = rewritten.find("/X").unwrap();
            let path = &rewritten[path_start..rewritten.len() - 1];
            let (resolved_domain, resolved_path) = binding.resolve_path(path);
            assert_eq!(resolved_domain, wiki_domain);
            assert_eq!(resolved_path, "/X");
            let _ = prefix;
        }
    }
}
