//! Configuration management

use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub visitors: VisitorsConfig,
    pub archive: ArchiveConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory with the site's static files, served for any unmatched path
    pub public_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            public_dir: PathBuf::from("public"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub stats_file: String,
    pub posts_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            stats_file: "visitor-stats.json".to_string(),
            posts_file: "telegram-posts.json".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn stats_path(&self) -> PathBuf {
        self.data_dir.join(&self.stats_file)
    }

    pub fn posts_path(&self) -> PathBuf {
        self.data_dir.join(&self.posts_file)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VisitorsConfig {
    /// Persist the stats after every Nth recorded visit
    pub flush_every: u64,
    /// Days of per-day buckets kept by the cleanup pass
    pub retention_days: u32,
    pub cleanup_interval_hours: u64,
}

impl Default for VisitorsConfig {
    fn default() -> Self {
        Self {
            flush_every: 10,
            retention_days: 30,
            cleanup_interval_hours: 24,
        }
    }
}

impl VisitorsConfig {
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_hours * 3600)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub max_posts: usize,
    /// Shared secret for `POST /api/posts`; ingestion over HTTP is off when unset
    pub ingest_token: Option<String>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            max_posts: 50,
            ingest_token: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = "config";

        let builder = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(config::Environment::with_prefix("SITEKEEPER").separator("__"));

        let settings = builder.build()?;
        let config: Config = settings.try_deserialize()?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Invalid port: 0 is not allowed");
        }
        if self.server.host.is_empty() {
            anyhow::bail!("Server host cannot be empty");
        }

        if self.storage.stats_file.is_empty() || self.storage.posts_file.is_empty() {
            anyhow::bail!("Storage file names cannot be empty");
        }

        if self.visitors.flush_every == 0 {
            anyhow::bail!("visitors.flush_every must be at least 1");
        }
        if self.visitors.retention_days == 0 {
            anyhow::bail!("visitors.retention_days must be at least 1");
        }
        if self.visitors.cleanup_interval_hours == 0 {
            anyhow::bail!("visitors.cleanup_interval_hours must be at least 1");
        }

        if self.archive.max_posts == 0 {
            anyhow::bail!("archive.max_posts must be at least 1");
        }
        if matches!(self.archive.ingest_token.as_deref(), Some(t) if t.trim().is_empty()) {
            anyhow::bail!("archive.ingest_token cannot be blank; remove it to disable ingestion");
        }

        // Validate logging level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!("Invalid logging level '{}'. Must be one of: {:?}", self.logging.level, valid_levels);
        }

        Ok(())
    }

    pub fn ingestion_enabled(&self) -> bool {
        self.archive.ingest_token.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.visitors.flush_every, 10);
        assert_eq!(config.archive.max_posts, 50);
        assert_eq!(config.storage.stats_path(), PathBuf::from("data/visitor-stats.json"));
        assert_eq!(config.visitors.cleanup_interval(), Duration::from_secs(86_400));
        assert!(!config.ingestion_enabled());
    }

    #[test]
    fn zero_flush_interval_is_rejected() {
        let mut config = Config::default();
        config.visitors.flush_every = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_log_level_is_rejected() {
        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn blank_ingest_token_is_rejected() {
        let mut config = Config::default();
        config.archive.ingest_token = Some("  ".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_toml_keeps_defaults_for_the_rest() {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(
                "[visitors]\nflush_every = 5\n[server]\nport = 8080\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();
        let config: Config = settings.try_deserialize().unwrap();

        assert_eq!(config.visitors.flush_every, 5);
        assert_eq!(config.visitors.retention_days, 30);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
    }
}
