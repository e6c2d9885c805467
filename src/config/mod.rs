//! Configuration management for CLI, environment variables, and config files.

use crate::error::{MostReadError, ValidationIssue};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Longest relative expiry a memcached-style cache accepts (30 days).
pub const MAX_CACHE_TTL_SECS: u64 = 2_592_000;

/// Main configuration for most-read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub counters: CounterConfig,
    #[serde(default)]
    pub listing: ListingConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Hit aggregation and flush policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CounterConfig {
    pub flush_after_x_hits: u64,
    pub flush_grace_period_ms: u64,
}

/// The most-read listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingConfig {
    pub most_read_in_x_days: u32,
    pub posts_to_display: usize,
    pub output_cache_expires_minutes: u64,
    pub title: String,
}

/// Retention options. `ignore_return_within_x_minutes` is carried for the
/// transport layer's dedup window and is not acted on here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub days_to_keep_hits: u64,
    pub ignore_return_within_x_minutes: u64,
}

/// Shared cache layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub key_prefix: String,
    pub max_entries: u64,
}

/// Hit token settings. Without a secret every token is accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub secret: Option<String>,
    pub nonce_lifetime_secs: u64,
}

/// Configuration for logging output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            flush_after_x_hits: 10,
            flush_grace_period_ms: 1000,
        }
    }
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            most_read_in_x_days: 7,
            posts_to_display: 5,
            output_cache_expires_minutes: 10,
            title: "Most Read".to_string(),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            days_to_keep_hits: 100,
            ignore_return_within_x_minutes: 60,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            key_prefix: "most_read".to_string(),
            max_entries: 10_000,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: None,
            nonce_lifetime_secs: 86_400,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Names of the three cache entries this crate owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKeys {
    pub counters: String,
    pub hits_since_write: String,
    pub rendering: String,
}

impl CacheKeys {
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            counters: format!("{prefix}:counters"),
            hits_since_write: format!("{prefix}:hits_since_write"),
            rendering: format!("{prefix}:rendering"),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expiry of the counter batch and the hit tally.
    pub fn counter_ttl(&self) -> Duration {
        let secs = self
            .retention
            .days_to_keep_hits
            .saturating_mul(24 * 60 * 60)
            .min(MAX_CACHE_TTL_SECS);
        Duration::from_secs(secs)
    }

    /// Expiry of the rendered listing.
    pub fn listing_ttl(&self) -> Duration {
        Duration::from_secs(self.listing.output_cache_expires_minutes.saturating_mul(60))
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.counters.flush_grace_period_ms)
    }

    pub fn keys(&self) -> CacheKeys {
        CacheKeys::with_prefix(&self.cache.key_prefix)
    }

    pub fn from_file(path: &PathBuf) -> Result<Self, MostReadError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| MostReadError::IoError(e.to_string()))?;

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());
        match ext.as_deref() {
            Some("json") => Ok(serde_json::from_str(&content)?),
            _ => Ok(toml::from_str(&content)?),
        }
    }

    pub fn from_default_locations() -> Result<Self, MostReadError> {
        let config_dirs = [
            dirs::config_dir().map(|d| d.join("most-read/config.toml")),
            Some(PathBuf::from("/etc/most-read/config.toml")),
            Some(PathBuf::from("./most-read.toml")),
        ];

        for path in config_dirs.iter().flatten() {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(path);
            }
        }

        Ok(Self::default())
    }

    pub fn merge_from_env(mut self) -> Result<Self, MostReadError> {
        fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>, MostReadError> {
            match std::env::var(name) {
                Ok(val) => val.trim().parse().map(Some).map_err(|_| {
                    MostReadError::InvalidArgument(format!("{name} has invalid format"))
                }),
                Err(_) => Ok(None),
            }
        }

        if let Some(v) = parse_env("MOST_READ_FLUSH_AFTER_X_HITS")? {
            self.counters.flush_after_x_hits = v;
        }
        if let Some(v) = parse_env("MOST_READ_FLUSH_GRACE_PERIOD_MS")? {
            self.counters.flush_grace_period_ms = v;
        }
        if let Some(v) = parse_env("MOST_READ_IN_X_DAYS")? {
            self.listing.most_read_in_x_days = v;
        }
        if let Some(v) = parse_env("MOST_READ_POSTS_TO_DISPLAY")? {
            self.listing.posts_to_display = v;
        }
        if let Some(v) = parse_env("MOST_READ_OUTPUT_CACHE_EXPIRES_MINUTES")? {
            self.listing.output_cache_expires_minutes = v;
        }
        if let Some(v) = parse_env("MOST_READ_DAYS_TO_KEEP_HITS")? {
            self.retention.days_to_keep_hits = v;
        }
        if let Some(v) = parse_env("MOST_READ_IGNORE_RETURN_WITHIN_X_MINUTES")? {
            self.retention.ignore_return_within_x_minutes = v;
        }
        if let Ok(val) = std::env::var("MOST_READ_KEY_PREFIX") {
            self.cache.key_prefix = val;
        }
        if let Ok(val) = std::env::var("MOST_READ_AUTH_SECRET") {
            self.auth.secret = Some(val);
        }
        if let Ok(val) = std::env::var("MOST_READ_LOG_LEVEL") {
            self.logging.level = val;
        }

        Ok(self)
    }

    pub fn merge_from_cli(mut self, cli: &CliArgs) -> Self {
        if let Some(hits) = cli.flush_after_x_hits {
            self.counters.flush_after_x_hits = hits;
        }

        if let Some(grace) = cli.flush_grace_period_ms {
            self.counters.flush_grace_period_ms = grace;
        }

        if let Some(posts) = cli.posts_to_display {
            self.listing.posts_to_display = posts;
        }

        if let Some(days) = cli.most_read_in_x_days {
            self.listing.most_read_in_x_days = days;
        }

        if let Some(ref level) = cli.log_level {
            self.logging.level = level.clone();
        }

        self
    }

    pub fn load_with_cli(cli: &CliArgs) -> Result<Self, MostReadError> {
        let base = match cli.config_file {
            Some(ref path) => Self::from_file(path)?,
            None => Self::from_default_locations()?,
        };
        Ok(base.merge_from_env()?.merge_from_cli(cli))
    }

    pub fn validate(&self) -> Result<(), MostReadError> {
        let mut issues = Vec::new();
        let mut issue = |field: &str, message: String| {
            issues.push(ValidationIssue {
                field: field.to_string(),
                message,
            })
        };

        if self.counters.flush_after_x_hits == 0 {
            issue(
                "counters.flush_after_x_hits",
                "Must be at least 1".to_string(),
            );
        }
        if self.counters.flush_grace_period_ms > 60_000 {
            issue(
                "counters.flush_grace_period_ms",
                format!(
                    "Grace period of {}ms exceeds the 60000ms limit",
                    self.counters.flush_grace_period_ms
                ),
            );
        }
        if self.listing.most_read_in_x_days == 0 {
            issue("listing.most_read_in_x_days", "Must be at least 1".to_string());
        }
        if self.listing.posts_to_display == 0 {
            issue("listing.posts_to_display", "Must be at least 1".to_string());
        }
        if self.listing.output_cache_expires_minutes == 0 {
            issue(
                "listing.output_cache_expires_minutes",
                "Must be at least 1".to_string(),
            );
        }
        if self.listing.output_cache_expires_minutes > 43_200 {
            issue(
                "listing.output_cache_expires_minutes",
                "Must not exceed 43200 minutes (30 days)".to_string(),
            );
        }
        if self.retention.days_to_keep_hits == 0 {
            issue("retention.days_to_keep_hits", "Must be at least 1".to_string());
        }
        if self.cache.key_prefix.is_empty() {
            issue("cache.key_prefix", "Key prefix cannot be empty".to_string());
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            issue(
                "logging.level",
                format!(
                    "Invalid log level '{}'. Valid levels: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            );
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(MostReadError::ValidationError(issues))
        }
    }
}

/// Command-line arguments that override configuration values.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config_file: Option<PathBuf>,
    pub flush_after_x_hits: Option<u64>,
    pub flush_grace_period_ms: Option<u64>,
    pub posts_to_display: Option<usize>,
    pub most_read_in_x_days: Option<u32>,
    pub log_level: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.counters.flush_after_x_hits, 10);
        assert_eq!(config.listing.most_read_in_x_days, 7);
        assert_eq!(config.listing.posts_to_display, 5);
        assert_eq!(config.listing.output_cache_expires_minutes, 10);
        assert_eq!(config.retention.days_to_keep_hits, 100);
        assert_eq!(config.retention.ignore_return_within_x_minutes, 60);
        assert!(config.auth.secret.is_none());
    }

    #[test]
    fn test_counter_ttl_is_capped() {
        let config = Config::default();
        assert_eq!(config.counter_ttl(), Duration::from_secs(MAX_CACHE_TTL_SECS));

        let mut config = Config::default();
        config.retention.days_to_keep_hits = 2;
        assert_eq!(config.counter_ttl(), Duration::from_secs(2 * 86_400));
    }

    #[test]
    fn test_listing_ttl_and_keys() {
        let mut config = Config::default();
        config.listing.output_cache_expires_minutes = 3;
        config.cache.key_prefix = "site7".to_string();
        assert_eq!(config.listing_ttl(), Duration::from_secs(180));

        let keys = config.keys();
        assert_eq!(keys.counters, "site7:counters");
        assert_eq!(keys.hits_since_write, "site7:hits_since_write");
        assert_eq!(keys.rendering, "site7:rendering");
    }

    fn parse_config_content(content: &str, ext: &str) -> Config {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();
        let mut path = temp_file.path().to_path_buf();
        path.set_extension(ext);
        std::fs::rename(temp_file.path(), &path).unwrap();
        Config::from_file(&path).unwrap()
    }

    #[test]
    fn test_toml_config_parsing() {
        let c = parse_config_content(
            r#"[counters]
flush_after_x_hits = 25
flush_grace_period_ms = 250

[listing]
most_read_in_x_days = 3
posts_to_display = 8

[cache]
key_prefix = "blog""#,
            "toml",
        );
        assert_eq!(c.counters.flush_after_x_hits, 25);
        assert_eq!(c.counters.flush_grace_period_ms, 250);
        assert_eq!(c.listing.most_read_in_x_days, 3);
        assert_eq!(c.listing.posts_to_display, 8);
        assert_eq!(c.listing.output_cache_expires_minutes, 10);
        assert_eq!(c.cache.key_prefix, "blog");
    }

    #[test]
    fn test_json_config_parsing() {
        let c = parse_config_content(
            r#"{"counters": {"flush_after_x_hits": 3}, "listing": {"posts_to_display": 2}}"#,
            "json",
        );
        assert_eq!(c.counters.flush_after_x_hits, 3);
        assert_eq!(c.counters.flush_grace_period_ms, 1000);
        assert_eq!(c.listing.posts_to_display, 2);
    }

    #[rstest::rstest]
    #[case("json", 11)]
    #[case("JSON", 12)]
    #[case("toml", 13)]
    #[case("TOML", 14)]
    #[case("Toml", 15)]
    fn test_file_extension_case_handling(#[case] ext: &str, #[case] hits: u64) {
        let content = if ext.eq_ignore_ascii_case("json") {
            format!(r#"{{"counters": {{"flush_after_x_hits": {}}}}}"#, hits)
        } else {
            format!("[counters]\nflush_after_x_hits = {}", hits)
        };

        let config = parse_config_content(&content, ext);
        assert_eq!(config.counters.flush_after_x_hits, hits);
    }

    #[test]
    fn test_unparseable_file_is_parse_error() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"[counters\nbroken").unwrap();
        let mut path = temp_file.path().to_path_buf();
        path.set_extension("toml");
        std::fs::rename(temp_file.path(), &path).unwrap();

        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, MostReadError::ParseError(_)));
    }

    #[test]
    fn test_merge_from_cli() {
        let config = Config::default();
        let cli = CliArgs {
            flush_after_x_hits: Some(50),
            posts_to_display: Some(3),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };

        let merged = config.merge_from_cli(&cli);

        assert_eq!(merged.counters.flush_after_x_hits, 50);
        assert_eq!(merged.listing.posts_to_display, 3);
        assert_eq!(merged.logging.level, "debug");
        assert_eq!(merged.listing.most_read_in_x_days, 7);
    }

    #[test]
    fn test_validate_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_collects_every_issue() {
        let mut config = Config::default();
        config.counters.flush_after_x_hits = 0;
        config.listing.posts_to_display = 0;
        config.cache.key_prefix = String::new();

        match config.validate() {
            Err(MostReadError::ValidationError(issues)) => {
                let fields: Vec<_> = issues.iter().map(|i| i.field.as_str()).collect();
                assert_eq!(
                    fields,
                    vec![
                        "counters.flush_after_x_hits",
                        "listing.posts_to_display",
                        "cache.key_prefix"
                    ]
                );
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[rstest::rstest]
    #[case(0, true)]
    #[case(1000, true)]
    #[case(60_000, true)]
    #[case(60_001, false)]
    fn test_validate_grace_period(#[case] grace_ms: u64, #[case] should_pass: bool) {
        let mut config = Config::default();
        config.counters.flush_grace_period_ms = grace_ms;
        assert_eq!(config.validate().is_ok(), should_pass);
    }

    #[rstest::rstest]
    #[case("error", true)]
    #[case("warn", true)]
    #[case("info", true)]
    #[case("debug", true)]
    #[case("trace", true)]
    #[case("invalid", false)]
    #[case("ERROR", false)]
    fn test_validate_log_level(#[case] level: &str, #[case] should_pass: bool) {
        let mut config = Config::default();
        config.logging.level = level.to_string();
        let result = config.validate();
        if should_pass {
            assert!(result.is_ok(), "Level {} should be valid", level);
        } else {
            assert!(result.is_err(), "Level {} should be invalid", level);
        }
    }
}
