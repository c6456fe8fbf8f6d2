//! Command-line entry point: `clap::Parser` flattens `AppConfig`'s
//! confique-generated partial struct for CLI overrides, covering
//! `proxy`/`auth`/`dns` (`wikis` stays file/env-only, §B.3).

use crate::config::confique_partial_app_config::PartialAppConfig;
use crate::{AppConfig, WikiProxy};
use anyhow::Result;
use clap::Parser;
use confique::Config;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "wikiproxy")]
#[command(about = "A reverse proxy that exposes Wikipedia's multi-domain sites behind a single proxy host")]
pub struct Cli {
    /// Configuration file path (TOML)
    #[arg(short, long, default_value = "$HOME/.wikiproxy/config.toml")]
    config_path: PathBuf,

    /// Configuration overrides
    #[command(flatten)]
    config: PartialAppConfig,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    pub async fn run(&self) -> Result<()> {
        let log_level = if self.verbose { "debug" } else { "info" };
        tracing_subscriber::fmt()
            .with_env_filter(format!("wikiproxy={log_level},{log_level}"))
            .init();

        let config = self.load_config()?;
        let mut proxy = WikiProxy::new(config);
        proxy.run().await
    }

    fn load_config(&self) -> Result<AppConfig> {
        let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let config_path = self
            .config_path
            .to_str()
            .unwrap_or("")
            .replace("$HOME", home_dir.to_str().unwrap_or("."));
        let config_path = PathBuf::from(config_path);

        let mut builder = AppConfig::builder().preloaded(self.config.clone()).env();
        if config_path.exists() {
            builder = builder.file(&config_path);
        }
        Ok(builder.load()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parses_with_no_arguments() {
        let cli = Cli::parse_from(["wikiproxy"]);
        assert!(!cli.verbose);
    }

    #[test]
    fn parses_verbose_and_listen_addr_override() {
        let cli = Cli::parse_from(["wikiproxy", "--verbose", "--listen-addr", "0.0.0.0:9090"]);
        assert!(cli.verbose);
        assert_eq!(cli.config.proxy.listen_addr, Some("0.0.0.0:9090".to_string()));
    }

    #[test]
    fn default_config_path_expands_home_placeholder() {
        let cli = Cli::parse_from(["wikiproxy"]);
        assert!(cli.config_path.to_string_lossy().contains("$HOME"));
    }
}
