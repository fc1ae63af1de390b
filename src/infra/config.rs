use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cli::{AppContext, InitArgs};

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config
{
    /// Server address, host:port
    pub server: Option<String>,

    /// Default user name for server sessions
    pub user: Option<String>,

    /// Polling bound in seconds
    pub timeout_secs: u64,

    /// Seconds between status polls
    pub poll_interval_secs: u64,
}

impl Default for Config
{
    fn default() -> Self
    {
        Self {
            server: None,
            user: None,
            timeout_secs: 60 * 60,
            poll_interval_secs: 5,
        }
    }
}

impl Config
{
    pub fn timeout(&self) -> Duration
    {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration
    {
        Duration::from_secs(self.poll_interval_secs)
    }
}

pub fn load_config() -> Result<Config>
{
    let mut builder = config::Config::builder();

    // Load from config files in priority order
    let config_paths = ["preflight.toml", ".preflight.toml"];

    for path in &config_paths
    {
        if Path::new(path).exists()
        {
            builder = builder.add_source(config::File::with_name(path));
            break;
        }
    }

    // Environment variables with PREFLIGHT_ prefix override file values.
    // No separator: the keys themselves contain underscores.
    builder = builder.add_source(config::Environment::with_prefix("PREFLIGHT"));

    let cfg = builder
        .build()
        .context("Failed to load configuration")?;
    let parsed: Config = cfg
        .try_deserialize()
        .context("Failed to parse configuration")?;

    Ok(parsed)
}

pub fn init(
    args: InitArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let config_path = args
        .path
        .join("preflight.toml");

    if config_path.exists() && !args.force
    {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    let config = Config::default();
    let toml_string =
        toml::to_string_pretty(&config).context("Failed to serialize default config")?;

    std::fs::write(&config_path, toml_string).context("Failed to write config file")?;

    if !ctx.quiet
    {
        println!("Created config file at {}", config_path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn defaults_match_documented_bounds()
    {
        let config = Config::default();
        assert_eq!(config.timeout(), Duration::from_secs(3600));
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert!(config.server.is_none());
    }

    #[test]
    fn partial_file_fills_in_defaults()
    {
        let parsed: Config = toml::from_str("server = \"ci.example.com:9955\"").unwrap();
        assert_eq!(parsed.server.as_deref(), Some("ci.example.com:9955"));
        assert_eq!(parsed.poll_interval_secs, 5);
    }
}
