/*!
common/src/lib.rs

Shared configuration types and store helpers for blognotif.

This file provides:
- Config data structures (deserialized from TOML)
- A layered loader that deep-merges several TOML files
- A helper to open the SQLite store used for blog definitions and state
*/

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, error};

/// User agent sent with every page request unless overridden in `[fetch]`.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:83.0) Gecko/20100101 Firefox/83.0";

pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";

pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

/// Database configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the sqlite database file (e.g. "data/blogs.db")
    #[serde(alias = "Database")]
    pub path: String,
}

/// Messaging destination and credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(alias = "ChatId")]
    pub chat_id: String,
    #[serde(alias = "BotToken")]
    pub bot_token: Option<String>,
    /// Name of an environment variable holding the token; takes precedence over `bot_token`
    pub bot_token_env: Option<String>,
    pub api_url: Option<String>,
    pub timeout_seconds: Option<u64>,
}

impl TelegramConfig {
    /// Resolve the bot token, preferring the environment variable named by `bot_token_env`.
    pub fn resolve_bot_token(&self) -> Result<String> {
        if let Some(var) = self.bot_token_env.as_deref() {
            match std::env::var(var) {
                Ok(token) if !token.is_empty() => return Ok(token),
                _ => debug!(env = var, "bot token env var not set, falling back to bot_token"),
            }
        }

        self.bot_token
            .clone()
            .filter(|t| !t.is_empty())
            .context("no bot token configured (set telegram.bot_token or telegram.bot_token_env)")
    }

    pub fn api_url(&self) -> &str {
        self.api_url.as_deref().unwrap_or(DEFAULT_TELEGRAM_API_URL)
    }
}

/// Page fetching configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchConfig {
    pub timeout_seconds: Option<u64>,
    pub user_agent: Option<String>,
}

impl FetchConfig {
    pub fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds.unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS)
    }

    pub fn user_agent(&self) -> &str {
        self.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT)
    }
}

/// Top-level application configuration (deserialized from config.toml)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
}

impl Config {
    /// Config files to load, in merge order: `config.default.toml` in `base_dir` (if present),
    /// then every file in `explicit`, or `config.toml` in `base_dir` when none were named.
    /// A named file that does not exist is an error.
    pub fn resolve_layers(base_dir: &Path, explicit: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut layers = Vec::new();

        let default_path = base_dir.join("config.default.toml");
        if default_path.exists() {
            layers.push(default_path);
        }

        if explicit.is_empty() {
            let p = base_dir.join("config.toml");
            if p.exists() {
                layers.push(p);
            }
        } else {
            for p in explicit {
                if !p.exists() {
                    error!(path = ?p, "specified config file not found");
                    anyhow::bail!("Config file not found: {}", p.display());
                }
                layers.push(p.clone());
            }
        }

        if layers.is_empty() {
            anyhow::bail!(
                "no configuration found in {} (looked for config.default.toml and config.toml)",
                base_dir.display()
            );
        }

        Ok(layers)
    }

    /// Load configuration from several layers. Later files override earlier ones,
    /// tables are merged key by key. Every path given must exist.
    pub async fn load_layered(paths: &[PathBuf]) -> Result<Self> {
        if paths.is_empty() {
            anyhow::bail!("no configuration file given");
        }

        let mut config_value = toml::Value::Table(toml::map::Map::new());

        for path in paths {
            let data = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let val: toml::Value = toml::from_str(&data)
                .with_context(|| format!("Failed to parse configuration: {}", path.display()))?;
            merge_toml(&mut config_value, val);
            debug!(path = %path.display(), "configuration layer applied");
        }

        let cfg: Config = config_value
            .try_into()
            .context("Failed to parse merged configuration")?;
        Ok(cfg)
    }
}

fn merge_toml(a: &mut toml::Value, b: toml::Value) {
    match (a, b) {
        (toml::Value::Table(a_map), toml::Value::Table(b_map)) => {
            for (k, v) in b_map {
                if let Some(a_val) = a_map.get_mut(&k) {
                    merge_toml(a_val, v);
                } else {
                    a_map.insert(k, v);
                }
            }
        }
        (a_val, b_val) => *a_val = b_val,
    }
}

/// Open the SQLite store.
///
/// Creates the parent directory and the database file if needed. The pool is capped at a
/// single connection: the run is strictly sequential and owns the store for its lifetime.
/// Callers close it with `pool.close().await` at the end of the run.
///
/// Example:
///   let pool = init_db_pool("data/blogs.db").await?;
pub async fn init_db_pool(path: &str) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.with_context(|| {
            format!("Failed to create DB parent directory: {}", parent.display())
        })?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to connect to sqlite database at path: {}", path))?;

    Ok(pool)
}
