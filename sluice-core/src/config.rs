//! Gateway configuration
//!
//! Model aliases, quota buckets, pacing constants, and runner settings.
//! Loaded once at startup and passed by reference into every component;
//! nothing here is mutable after `load()`.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors raised while loading or consulting the configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Requested model alias is not configured
    #[error("unknown model alias: {0}")]
    UnknownAlias(String),

    /// Config file was present but unreadable
    #[error("failed to read config file {path}: {source}")]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Config file was present but not valid JSON for this schema
    #[error("failed to parse config file {path}: {source}")]
    Invalid {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Semantic validation failed
    #[error("invalid configuration: {0}")]
    Validation(String),
}

/// A group of model aliases drawing against one shared backend quota.
///
/// Member order is the spread order used by batch assignment and must stay
/// stable across invocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelBucket {
    pub name: String,
    pub members: Vec<String>,
}

/// Gateway configuration
///
/// All pacing constants are tunable through the optional config file so a
/// deployment can adapt to its backend's actual quota behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Alias -> concrete model name.
    pub models: HashMap<String, String>,

    /// Quota buckets over aliases. Every alias belongs to exactly one bucket.
    pub buckets: Vec<ModelBucket>,

    /// Gap seeded into a fresh pacing row, in milliseconds.
    pub initial_gap_ms: i64,

    /// Hard per-alias lower bound for the pacing gap.
    pub floor_ms: HashMap<String, i64>,

    /// Hard global upper bound for the pacing gap.
    pub ceiling_ms: i64,

    /// Multiplicative gap decrease applied on an ordinary success.
    pub speedup_factor: f64,

    /// More aggressive decrease once `streak_threshold` successes accumulate.
    pub streak_speedup: f64,

    /// Consecutive successes required before `streak_speedup` kicks in.
    pub streak_threshold: i64,

    /// Multiplicative gap increase applied on a rate limit.
    pub backoff_growth: f64,

    /// Additive backoff added per rate-limit event, in milliseconds.
    pub backoff_penalty_ms: i64,

    /// Fixed backoff drained per success, in milliseconds.
    pub backoff_drain_ms: i64,

    /// Exit code the runner uses to signal a backend rate limit.
    pub rate_limit_exit_code: i64,

    /// Case-sensitive substrings in captured output that signal a rate limit.
    pub rate_limit_markers: Vec<String>,

    /// Rate-limited requeues allowed before a job is failed for good.
    pub max_retries: i64,

    /// Days a terminal job is kept before the retention sweep deletes it.
    pub retention_days: i64,

    /// Backend executable handed (model, prompt) per invocation.
    pub runner_program: String,

    /// Arguments placed before the model/prompt pair.
    pub runner_args: Vec<String>,

    /// Location of the sqlite store.
    pub db_path: PathBuf,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let models = HashMap::from([
            ("lite".to_string(), "gemini-2.5-flash-lite".to_string()),
            ("quick".to_string(), "gemini-2.0-flash".to_string()),
            ("fast".to_string(), "gemini-2.5-flash".to_string()),
            ("think".to_string(), "gemini-2.5-pro".to_string()),
        ]);

        let buckets = vec![
            ModelBucket {
                name: "flash".to_string(),
                members: vec![
                    "lite".to_string(),
                    "quick".to_string(),
                    "fast".to_string(),
                ],
            },
            ModelBucket {
                name: "pro".to_string(),
                members: vec!["think".to_string()],
            },
        ];

        let floor_ms = HashMap::from([
            ("lite".to_string(), 500),
            ("quick".to_string(), 750),
            ("fast".to_string(), 1000),
            ("think".to_string(), 2000),
        ]);

        Self {
            models,
            buckets,
            initial_gap_ms: 2000,
            floor_ms,
            ceiling_ms: 60_000,
            speedup_factor: 0.90,
            streak_speedup: 0.75,
            streak_threshold: 5,
            backoff_growth: 1.8,
            backoff_penalty_ms: 5000,
            backoff_drain_ms: 500,
            rate_limit_exit_code: 130,
            rate_limit_markers: vec![
                "RESOURCE_EXHAUSTED".to_string(),
                "429".to_string(),
                "Too Many Requests".to_string(),
                "rateLimitExceeded".to_string(),
                "Quota exceeded".to_string(),
            ],
            max_retries: 3,
            retention_days: 7,
            runner_program: "gemini".to_string(),
            runner_args: vec!["--yolo".to_string()],
            db_path: default_db_path(),
        }
    }
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_db_path() -> PathBuf {
    home_dir().join(".local/share/sluice/sluice.db")
}

fn default_config_path() -> PathBuf {
    home_dir().join(".config/sluice/config.json")
}

impl GatewayConfig {
    /// Loads configuration: defaults, overlaid by the optional JSON config
    /// file (SLUICE_CONFIG or ~/.config/sluice/config.json), with SLUICE_DB
    /// overriding the store location.
    pub fn load() -> Result<Self> {
        let path = std::env::var_os("SLUICE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(default_config_path);

        let mut config = if path.is_file() {
            let raw = std::fs::read_to_string(&path).map_err(|source| {
                ConfigError::Unreadable {
                    path: path.clone(),
                    source,
                }
            })?;
            serde_json::from_str(&raw)
                .map_err(|source| ConfigError::Invalid { path, source })?
        } else {
            Self::default()
        };

        if let Some(db) = std::env::var_os("SLUICE_DB") {
            config.db_path = PathBuf::from(db);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if self.models.is_empty() {
            return Err(ConfigError::Validation("no models configured".into()));
        }

        for alias in self.models.keys() {
            let owners = self
                .buckets
                .iter()
                .filter(|b| b.members.iter().any(|m| m == alias))
                .count();
            if owners != 1 {
                return Err(ConfigError::Validation(format!(
                    "alias '{}' must belong to exactly one bucket (found {})",
                    alias, owners
                )));
            }
        }

        for bucket in &self.buckets {
            for member in &bucket.members {
                if !self.models.contains_key(member) {
                    return Err(ConfigError::Validation(format!(
                        "bucket '{}' references unconfigured alias '{}'",
                        bucket.name, member
                    )));
                }
            }
        }

        for (alias, floor) in &self.floor_ms {
            if *floor > self.ceiling_ms {
                return Err(ConfigError::Validation(format!(
                    "floor for '{}' ({}ms) exceeds ceiling ({}ms)",
                    alias, floor, self.ceiling_ms
                )));
            }
        }

        if self.speedup_factor <= 0.0 || self.speedup_factor >= 1.0 {
            return Err(ConfigError::Validation(
                "speedup_factor must be in (0, 1)".into(),
            ));
        }

        if self.streak_speedup >= self.speedup_factor {
            return Err(ConfigError::Validation(
                "streak_speedup must be more aggressive than speedup_factor".into(),
            ));
        }

        if self.backoff_growth <= 1.0 {
            return Err(ConfigError::Validation(
                "backoff_growth must be greater than 1".into(),
            ));
        }

        Ok(())
    }

    /// Maps an alias to its concrete model name.
    pub fn resolve(&self, alias: &str) -> Result<&str> {
        self.models
            .get(alias)
            .map(String::as_str)
            .ok_or_else(|| ConfigError::UnknownAlias(alias.to_string()))
    }

    /// Reverse lookup: concrete model name back to its alias.
    pub fn alias_for(&self, model: &str) -> Option<&str> {
        self.models
            .iter()
            .find(|(_, concrete)| concrete.as_str() == model)
            .map(|(alias, _)| alias.as_str())
    }

    /// The bucket an alias belongs to, if it is configured.
    pub fn bucket_for(&self, alias: &str) -> Option<&ModelBucket> {
        self.buckets
            .iter()
            .find(|b| b.members.iter().any(|m| m == alias))
    }

    /// Pacing floor for a concrete model, falling back to the initial gap
    /// when the model has no configured floor.
    pub fn floor_for_model(&self, model: &str) -> i64 {
        self.alias_for(model)
            .and_then(|alias| self.floor_ms.get(alias).copied())
            .unwrap_or(self.initial_gap_ms)
    }

    /// All concrete model names, in stable alias order.
    pub fn concrete_models(&self) -> Vec<&str> {
        let mut aliases: Vec<&String> = self.models.keys().collect();
        aliases.sort();
        aliases
            .into_iter()
            .filter_map(|a| self.models.get(a).map(String::as_str))
            .collect()
    }

    /// Aliases in stable order, for reporting.
    pub fn aliases(&self) -> Vec<&str> {
        let mut aliases: Vec<&str> = self.models.keys().map(String::as_str).collect();
        aliases.sort();
        aliases
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(GatewayConfig::default().validate().is_ok());
    }

    #[test]
    fn resolve_maps_aliases() {
        let config = GatewayConfig::default();
        assert_eq!(config.resolve("fast").unwrap(), "gemini-2.5-flash");
        assert_eq!(config.resolve("think").unwrap(), "gemini-2.5-pro");
        assert!(matches!(
            config.resolve("nonexistent"),
            Err(ConfigError::UnknownAlias(_))
        ));
    }

    #[test]
    fn alias_round_trip() {
        let config = GatewayConfig::default();
        for alias in config.aliases() {
            let concrete = config.resolve(alias).unwrap();
            assert_eq!(config.alias_for(concrete), Some(alias));
        }
    }

    #[test]
    fn bucket_lookup() {
        let config = GatewayConfig::default();
        let bucket = config.bucket_for("fast").unwrap();
        assert_eq!(bucket.name, "flash");
        assert!(bucket.members.iter().any(|m| m == "lite"));
        assert!(config.bucket_for("think").is_some());
        assert!(config.bucket_for("nonexistent").is_none());
    }

    #[test]
    fn floors_resolve_through_aliases() {
        let config = GatewayConfig::default();
        assert_eq!(config.floor_for_model("gemini-2.5-flash"), 1000);
        assert_eq!(config.floor_for_model("gemini-2.5-pro"), 2000);
        // Unconfigured models fall back to the initial gap
        assert_eq!(config.floor_for_model("mystery"), 2000);
    }

    #[test]
    fn validation_rejects_orphan_alias() {
        let mut config = GatewayConfig::default();
        config
            .models
            .insert("extra".to_string(), "gemini-extra".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_rejects_floor_above_ceiling() {
        let mut config = GatewayConfig::default();
        config.floor_ms.insert("fast".to_string(), 120_000);
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_rejects_soft_streak_speedup() {
        let mut config = GatewayConfig::default();
        config.streak_speedup = 0.95;
        assert!(config.validate().is_err());
    }
}
