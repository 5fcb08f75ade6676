use anyhow::{Context, Result};
use clap::Parser;
use std::{env, fmt::Display, str::FromStr, time::Duration};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub public_base_url: String,
    pub max_connections: u32,
    pub store_timeout: Duration,
    pub reaper_interval: Duration,
    pub max_content_bytes: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Self-destructing paste service")]
pub struct Args {
    /// Host to bind to (overrides PASTE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides PASTE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides PASTE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Origin used in returned paste links (overrides PASTE_PUBLIC_BASE_URL)
    #[arg(long)]
    pub public_base_url: Option<String>,

    /// Maximum pooled SQLite connections (overrides PASTE_MAX_CONNECTIONS)
    #[arg(long)]
    pub max_connections: Option<u32>,

    /// Per-operation storage timeout in milliseconds (overrides PASTE_STORE_TIMEOUT_MS)
    #[arg(long)]
    pub store_timeout_ms: Option<u64>,

    /// Seconds between purges of dead pastes (overrides PASTE_REAPER_INTERVAL_SECS)
    #[arg(long)]
    pub reaper_interval_secs: Option<u64>,

    /// Largest accepted paste in bytes (overrides PASTE_MAX_CONTENT_BYTES)
    #[arg(long)]
    pub max_content_bytes: Option<usize>,

    /// Initialise the database schema and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();
        let migrate = args.migrate;
        let cfg = Self::resolve(args, |key| env::var(key))?;
        Ok((cfg, migrate))
    }

    /// Merge CLI args over values looked up through `lookup`, falling back to
    /// defaults.
    fn resolve<F>(args: Args, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        let env_host = lookup("PASTE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = parse_var(&lookup, "PASTE_PORT", 3000)?;
        let env_db = lookup("PASTE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/pastes.db".into());
        let env_max_connections = parse_var(&lookup, "PASTE_MAX_CONNECTIONS", 8)?;
        let env_timeout_ms = parse_var(&lookup, "PASTE_STORE_TIMEOUT_MS", 5_000)?;
        let env_reaper_secs = parse_var(&lookup, "PASTE_REAPER_INTERVAL_SECS", 300)?;
        let env_max_bytes = parse_var(&lookup, "PASTE_MAX_CONTENT_BYTES", 512 * 1024)?;

        let port = args.port.unwrap_or(env_port);
        let env_public = lookup("PASTE_PUBLIC_BASE_URL")
            .unwrap_or_else(|_| format!("http://localhost:{}", port));

        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port,
            database_url: args.database_url.unwrap_or(env_db),
            public_base_url: args.public_base_url.unwrap_or(env_public),
            max_connections: args.max_connections.unwrap_or(env_max_connections),
            store_timeout: Duration::from_millis(args.store_timeout_ms.unwrap_or(env_timeout_ms)),
            reaper_interval: Duration::from_secs(
                args.reaper_interval_secs.unwrap_or(env_reaper_secs),
            ),
            max_content_bytes: args.max_content_bytes.unwrap_or(env_max_bytes),
        };

        if cfg.max_connections == 0 {
            anyhow::bail!("max connections must be at least 1");
        }
        if cfg.store_timeout.is_zero() || cfg.reaper_interval.is_zero() {
            anyhow::bail!("store timeout and reaper interval must be non-zero");
        }

        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parse an optional variable, using `default` when it is unset.
fn parse_var<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Result<String, env::VarError>,
{
    match lookup(key) {
        Ok(value) => value
            .parse::<T>()
            .map_err(|err| anyhow::anyhow!("{}", err))
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(
        vars: &[(&str, &str)],
    ) -> impl Fn(&str) -> Result<String, env::VarError> + use<> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned().ok_or(env::VarError::NotPresent)
    }

    #[test]
    fn defaults_apply_without_env_or_args() {
        let cfg = AppConfig::resolve(Args::default(), lookup_from(&[])).unwrap();
        assert_eq!(cfg.addr(), "0.0.0.0:3000");
        assert_eq!(cfg.database_url, "sqlite://./data/pastes.db");
        assert_eq!(cfg.public_base_url, "http://localhost:3000");
        assert_eq!(cfg.store_timeout, Duration::from_secs(5));
        assert_eq!(cfg.reaper_interval, Duration::from_secs(300));
        assert_eq!(cfg.max_content_bytes, 512 * 1024);
    }

    #[test]
    fn cli_overrides_env() {
        let args = Args {
            port: Some(9000),
            reaper_interval_secs: Some(10),
            ..Args::default()
        };
        let lookup = lookup_from(&[
            ("PASTE_PORT", "8080"),
            ("PASTE_HOST", "127.0.0.1"),
            ("PASTE_REAPER_INTERVAL_SECS", "60"),
            ("PASTE_STORE_TIMEOUT_MS", "250"),
        ]);

        let cfg = AppConfig::resolve(args, lookup).unwrap();
        assert_eq!(cfg.addr(), "127.0.0.1:9000");
        assert_eq!(cfg.reaper_interval, Duration::from_secs(10));
        assert_eq!(cfg.store_timeout, Duration::from_millis(250));
    }

    #[test]
    fn malformed_numbers_are_reported() {
        let err = AppConfig::resolve(Args::default(), lookup_from(&[("PASTE_PORT", "eighty")]))
            .unwrap_err();
        assert!(format!("{:#}", err).contains("PASTE_PORT"));
    }

    #[test]
    fn zero_intervals_are_rejected() {
        let lookup = lookup_from(&[("PASTE_REAPER_INTERVAL_SECS", "0")]);
        assert!(AppConfig::resolve(Args::default(), lookup).is_err());
    }
}
