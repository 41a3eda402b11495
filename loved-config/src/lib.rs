use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

/// Milliseconds in one minute, used to turn a per-minute budget into an interval.
const MS_PER_MINUTE: u64 = 60_000;

/// Bare level names accepted for `logging.level`.
const KNOWN_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

#[derive(Debug, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub limiter: Option<LimiterSection>,
    #[serde(default)]
    pub logging: Option<LoggingSection>,
}

#[derive(Debug, Deserialize)]
pub struct LimiterSection {
    #[serde(default)]
    pub min_interval_ms: Option<u64>,
    #[serde(default)]
    pub requests_per_minute: Option<u64>,
    #[serde(default)]
    pub concurrency: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub json: Option<bool>,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Load a RawConfigFile from a path. The format is inferred from the extension: .toml, .yaml/.yml, .json
pub fn load_raw_from_file<P: AsRef<Path>>(path: P) -> Result<RawConfigFile, ConfigError> {
    let path = path.as_ref();
    let s = fs::read_to_string(path)?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase());
    parse_config_str(&s, ext.as_deref())
}

#[inline]
fn parse_config_str(s: &str, ext: Option<&str>) -> Result<RawConfigFile, ConfigError> {
    match ext {
        #[cfg(feature = "toml")]
        Some("toml") => toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string())),
        #[cfg(feature = "yaml")]
        Some("yaml" | "yml") => {
            serde_yaml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
        }
        #[cfg(feature = "json")]
        Some("json") => serde_json::from_str(s).map_err(|e| ConfigError::Parse(e.to_string())),
        _ => parse_config_auto(s),
    }
}

/// Try each enabled format in turn.
#[inline]
fn parse_config_auto(s: &str) -> Result<RawConfigFile, ConfigError> {
    #[cfg(feature = "toml")]
    if let Ok(cfg) = toml::from_str(s) {
        return Ok(cfg);
    }

    #[cfg(feature = "json")]
    if let Ok(cfg) = serde_json::from_str(s) {
        return Ok(cfg);
    }

    // YAML last: it accepts almost any scalar text.
    #[cfg(feature = "yaml")]
    if let Ok(cfg) = serde_yaml::from_str(s) {
        return Ok(cfg);
    }

    #[cfg(any(feature = "yaml", feature = "toml", feature = "json"))]
    {
        Err(ConfigError::Parse(
            "failed to parse config as any supported format".into(),
        ))
    }

    #[cfg(not(any(feature = "yaml", feature = "toml", feature = "json")))]
    {
        let _ = s;
        Err(ConfigError::Parse("no config format enabled".into()))
    }
}

/// Concrete configuration with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Config {
    pub limiter: LimiterConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LimiterConfig {
    /// Minimum delay between the starts of two consecutive jobs.
    pub min_interval_ms: u64,
    /// Number of jobs allowed to hold a slot at once.
    pub concurrency: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // osu! API v2 asks clients to stay at or below 60 requests per minute.
            limiter: LimiterConfig {
                min_interval_ms: 1000,
                concurrency: 1,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                json: false,
            },
        }
    }
}

/// Interval that keeps a caller at or under `per_minute` requests per minute.
pub fn interval_for_rate(per_minute: u64) -> Result<u64, ConfigError> {
    if per_minute == 0 {
        return Err(ConfigError::Validation(
            "limiter.requests_per_minute must be > 0".into(),
        ));
    }
    Ok(MS_PER_MINUTE.div_ceil(per_minute))
}

#[inline]
fn parse_bool(s: &str) -> Result<bool, ()> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" => Ok(true),
        "0" | "false" | "no" | "n" => Ok(false),
        _ => Err(()),
    }
}

/// Helper macro to apply optional value if present
macro_rules! apply_opt {
    ($target:expr, $source:expr) => {
        if let Some(v) = $source {
            $target = v;
        }
    };
}

/// Load concrete `Config` from optional file and environment variables.
/// Environment variables take precedence over file values and defaults.
pub fn load_config<P: AsRef<Path>>(path: Option<P>) -> Result<Config, ConfigError> {
    let mut cfg = Config::default();

    if let Some(p) = path {
        let raw = load_raw_from_file(p)?;
        if let Some(limiter) = raw.limiter {
            apply_opt!(cfg.limiter.min_interval_ms, limiter.min_interval_ms);
            if let Some(rpm) = limiter.requests_per_minute {
                cfg.limiter.min_interval_ms = interval_for_rate(rpm)?;
            }
            apply_opt!(cfg.limiter.concurrency, limiter.concurrency);
        }
        if let Some(logging) = raw.logging {
            apply_opt!(cfg.logging.level, logging.level);
            apply_opt!(cfg.logging.json, logging.json);
        }
    }

    apply_env_overrides(&mut cfg)?;

    Ok(cfg)
}

/// Helper to parse env var as a specific type
#[inline]
fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(v) => v
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::Parse(format!("invalid {}: {}", key, e))),
        Err(_) => Ok(None),
    }
}

#[inline]
fn env_bool(key: &str) -> Result<Option<bool>, ConfigError> {
    match env::var(key) {
        Ok(v) => parse_bool(&v)
            .map(Some)
            .map_err(|_| ConfigError::Parse(format!("invalid {}", key))),
        Err(_) => Ok(None),
    }
}

#[inline]
fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn apply_env_overrides(cfg: &mut Config) -> Result<(), ConfigError> {
    // Limiter
    if let Some(v) = env_parse::<u64>("LOVED_LIMITER_MIN_INTERVAL_MS")? {
        cfg.limiter.min_interval_ms = v;
    }
    if let Some(v) = env_parse::<u64>("LOVED_LIMITER_REQUESTS_PER_MINUTE")? {
        cfg.limiter.min_interval_ms = interval_for_rate(v)?;
    }
    if let Some(v) = env_parse::<usize>("LOVED_LIMITER_CONCURRENCY")? {
        cfg.limiter.concurrency = v;
    }

    // Logging
    if let Some(v) = env_str("LOVED_LOG_LEVEL") {
        cfg.logging.level = v;
    }
    if let Some(v) = env_bool("LOVED_LOG_JSON")? {
        cfg.logging.json = v;
    }

    Ok(())
}

/// Validate higher-level constraints on the resolved configuration.
pub fn validate_config(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.limiter.concurrency == 0 {
        return Err(ConfigError::Validation(
            "limiter.concurrency must be >= 1".into(),
        ));
    }

    let level = cfg.logging.level.trim();
    if level.is_empty() {
        return Err(ConfigError::Validation("logging.level must be set".into()));
    }
    // Filter directives such as `loved_limiter=debug,info` are left to the subscriber.
    let is_directive = level.contains('=') || level.contains(',');
    if !is_directive && !KNOWN_LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
        return Err(ConfigError::Validation(format!(
            "unknown logging.level: {}",
            level
        )));
    }

    Ok(())
}
