pub mod inspect_cmd;
pub mod replay_cmd;
pub mod run_cmd;

use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use clap::Args;
use factory_bridge_core::BridgeConfig;

/// `--config` shared by every subcommand.
#[derive(Debug, Default, Args)]
pub struct ConfigArgs {
    /// TOML file overriding the built-in defaults. Environment variables
    /// (and a `.env` file) are applied on top.
    #[arg(long = "config", value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,
}

impl ConfigArgs {
    pub fn load(&self) -> Result<BridgeConfig> {
        let mut config = match &self.config {
            Some(path) => BridgeConfig::load(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => BridgeConfig::default(),
        };
        config
            .apply_env(|name| std::env::var(name).ok())
            .context("invalid environment override")?;
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

/// Logs go to stderr so command output on stdout stays parseable.
pub fn setup_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
