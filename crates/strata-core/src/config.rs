//! Engine configuration.
//!
//! Loaded from a TOML file (path in `STRATA_CONFIG`) and then overridden
//! field by field from `STRATA_*` environment variables. Every field has a
//! default, so an empty file or no file at all is a valid configuration.
//!
//! ```toml
//! lookback_days = 35
//! max_parallel = 4
//! cycle_interval_secs = 3600
//! kinds = ["metrics", "audit", "traces", "conversations", "tasks"]
//! extra_exempt_kinds = []
//!
//! [retention]
//! raw_hours = 24
//! summary_hours = 168
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::model::RecordKind;

pub const CONFIG_PATH_VAR: &str = "STRATA_CONFIG";

/// Upper bound on retention settings (100 years).
const MAX_RETENTION_HOURS: u64 = 876_000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{var}={value:?} is not valid")]
    InvalidEnv { var: &'static str, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Minimum ages before superseded data may be purged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Raw records, counted from the end of their basic period.
    pub raw_hours: u64,
    /// Basic summaries, counted from the end of their day.
    pub summary_hours: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            raw_hours: 24,
            summary_hours: 168,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How far back each cycle looks for due periods.
    pub lookback_days: u32,
    /// Lineages consolidated concurrently.
    pub max_parallel: usize,
    /// Daemon cycle interval.
    pub cycle_interval_secs: u64,
    pub retention: RetentionConfig,
    /// Kinds the engine consolidates.
    pub kinds: Vec<RecordKind>,
    /// Purge exemptions on top of the static ones. Audit is always exempt.
    pub extra_exempt_kinds: Vec<RecordKind>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lookback_days: 35,
            max_parallel: 4,
            cycle_interval_secs: 3600,
            retention: RetentionConfig::default(),
            kinds: RecordKind::ALL.to_vec(),
            extra_exempt_kinds: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Read and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// File named by `STRATA_CONFIG` (defaults when unset), then
    /// `STRATA_*` overrides from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) => Self::read(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Apply `STRATA_*` overrides looked up through `lookup`.
    ///
    /// Reads:
    /// - STRATA_LOOKBACK_DAYS
    /// - STRATA_MAX_PARALLEL
    /// - STRATA_CYCLE_INTERVAL_SECS
    /// - STRATA_RAW_RETENTION_HOURS
    /// - STRATA_SUMMARY_RETENTION_HOURS
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        override_with(&lookup, "STRATA_LOOKBACK_DAYS", &mut self.lookback_days)?;
        override_with(&lookup, "STRATA_MAX_PARALLEL", &mut self.max_parallel)?;
        override_with(
            &lookup,
            "STRATA_CYCLE_INTERVAL_SECS",
            &mut self.cycle_interval_secs,
        )?;
        override_with(
            &lookup,
            "STRATA_RAW_RETENTION_HOURS",
            &mut self.retention.raw_hours,
        )?;
        override_with(
            &lookup,
            "STRATA_SUMMARY_RETENTION_HOURS",
            &mut self.retention.summary_hours,
        )?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lookback_days == 0 {
            return Err(ConfigError::Invalid("lookback_days must be at least 1".into()));
        }
        if self.max_parallel == 0 {
            return Err(ConfigError::Invalid("max_parallel must be at least 1".into()));
        }
        if self.cycle_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "cycle_interval_secs must be at least 1".into(),
            ));
        }
        if self.kinds.is_empty() {
            return Err(ConfigError::Invalid("kinds must not be empty".into()));
        }
        if self.retention.raw_hours > MAX_RETENTION_HOURS
            || self.retention.summary_hours > MAX_RETENTION_HOURS
        {
            return Err(ConfigError::Invalid(format!(
                "retention hours must not exceed {MAX_RETENTION_HOURS}"
            )));
        }
        if self.retention.raw_hours > self.retention.summary_hours {
            // Basic summaries would be deleted while their raw records remain,
            // and the next cycle would rebuild them.
            return Err(ConfigError::Invalid(
                "retention.raw_hours must not exceed retention.summary_hours".into(),
            ));
        }
        let unique: BTreeSet<_> = self.kinds.iter().collect();
        if unique.len() != self.kinds.len() {
            return Err(ConfigError::Invalid("kinds contains duplicates".into()));
        }
        Ok(())
    }

    pub fn lookback(&self) -> Duration {
        Duration::days(i64::from(self.lookback_days))
    }

    pub fn raw_retention(&self) -> Duration {
        hours(self.retention.raw_hours)
    }

    pub fn summary_retention(&self) -> Duration {
        hours(self.retention.summary_hours)
    }

    pub fn cycle_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cycle_interval_secs)
    }

    /// Static exemptions plus configured ones.
    pub fn exempt_kinds(&self) -> BTreeSet<RecordKind> {
        RecordKind::ALL
            .into_iter()
            .filter(|kind| kind.exempt_from_purge())
            .chain(self.extra_exempt_kinds.iter().copied())
            .collect()
    }
}

fn hours(h: u64) -> Duration {
    Duration::hours(h.min(MAX_RETENTION_HOURS) as i64)
}

fn override_with<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    target: &mut T,
) -> Result<(), ConfigError> {
    if let Some(value) = lookup(var) {
        *target = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidEnv { var, value })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.lookback_days, 35);
        assert_eq!(config.max_parallel, 4);
        assert_eq!(config.raw_retention(), Duration::hours(24));
        assert_eq!(config.summary_retention(), Duration::hours(168));
        assert_eq!(config.kinds.len(), 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            max_parallel = 2
            extra_exempt_kinds = ["traces"]

            [retention]
            raw_hours = 48
            "#,
        )
        .unwrap();
        assert_eq!(config.max_parallel, 2);
        assert_eq!(config.retention.raw_hours, 48);
        assert_eq!(config.retention.summary_hours, 168);
        assert_eq!(config.lookback_days, 35);
        let exempt: Vec<_> = config.exempt_kinds().into_iter().collect();
        assert_eq!(exempt, vec![RecordKind::Audit, RecordKind::Traces]);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "lookback_days = 7\nkinds = [\"metrics\", \"tasks\"]").unwrap();
        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.lookback_days, 7);
        assert_eq!(config.kinds, vec![RecordKind::Metrics, RecordKind::Tasks]);
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_parallel = 0").unwrap();
        assert!(matches!(
            EngineConfig::load(file.path()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("STRATA_LOOKBACK_DAYS", "10"),
            ("STRATA_RAW_RETENTION_HOURS", " 12 "),
        ]
        .into_iter()
        .collect();
        let mut config = EngineConfig::default();
        config
            .apply_overrides(|var| env.get(var).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.lookback_days, 10);
        assert_eq!(config.retention.raw_hours, 12);
        assert_eq!(config.max_parallel, 4);
    }

    #[test]
    fn test_bad_env_value_names_the_variable() {
        let mut config = EngineConfig::default();
        let err = config
            .apply_overrides(|var| (var == "STRATA_MAX_PARALLEL").then(|| "many".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("STRATA_MAX_PARALLEL"));
    }

    #[test]
    fn test_raw_retention_cannot_outlive_summaries() {
        let config = EngineConfig {
            retention: RetentionConfig {
                raw_hours: 200,
                summary_hours: 168,
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_audit_exemption_cannot_be_configured_away() {
        let config = EngineConfig {
            extra_exempt_kinds: vec![],
            ..Default::default()
        };
        assert!(config.exempt_kinds().contains(&RecordKind::Audit));
    }
}
