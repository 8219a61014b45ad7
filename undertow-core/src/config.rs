use crate::error::{ConfigError, CoreError};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Pipeline configuration, loaded from a TOML file. Every cadence has a
/// default so an empty file (or no file at all) yields a runnable setup.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Cadence for the Reddit post ingestion job.
    #[serde(default = "default_reddit_interval")]
    pub reddit_interval_minutes: u64,

    /// Cadence for the Twitter trending-topic ingestion job.
    #[serde(default = "default_trends_interval")]
    pub trends_interval_minutes: u64,

    /// Cadence for the Twitter region discovery job.
    #[serde(default = "default_regions_interval")]
    pub regions_interval_hours: u64,

    /// Ceiling on a single job run; a run exceeding it is failed.
    #[serde(default = "default_job_timeout")]
    pub job_timeout_minutes: u64,
}

fn default_database_url() -> String {
    "sqlite://undertow.db".to_string()
}

fn default_reddit_interval() -> u64 {
    60
}

fn default_trends_interval() -> u64 {
    60
}

fn default_regions_interval() -> u64 {
    24
}

fn default_job_timeout() -> u64 {
    10
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            reddit_interval_minutes: default_reddit_interval(),
            trends_interval_minutes: default_trends_interval(),
            regions_interval_hours: default_regions_interval(),
            job_timeout_minutes: default_job_timeout(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file. `UNDERTOW_DATABASE_URL` in the
    /// environment overrides the file's database URL.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CoreError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CoreError::Config(ConfigError::FileNotFound {
                path: path.display().to_string(),
            }));
        }
        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let mut config: AppConfig = toml::from_str(raw).map_err(ConfigError::Parse)?;
        if let Ok(url) = std::env::var("UNDERTOW_DATABASE_URL") {
            config.database_url = url;
        }
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), CoreError> {
        for (field, value) in [
            ("reddit_interval_minutes", self.reddit_interval_minutes),
            ("trends_interval_minutes", self.trends_interval_minutes),
            ("regions_interval_hours", self.regions_interval_hours),
            ("job_timeout_minutes", self.job_timeout_minutes),
        ] {
            if value == 0 {
                return Err(CoreError::Config(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: value.to_string(),
                }));
            }
        }
        Ok(())
    }

    pub fn reddit_interval(&self) -> Duration {
        Duration::from_secs(self.reddit_interval_minutes * 60)
    }

    pub fn trends_interval(&self) -> Duration {
        Duration::from_secs(self.trends_interval_minutes * 60)
    }

    pub fn regions_interval(&self) -> Duration {
        Duration::from_secs(self.regions_interval_hours * 3600)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_minutes * 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config.reddit_interval_minutes, 60);
        assert_eq!(config.regions_interval_hours, 24);
        assert_eq!(config.job_timeout_minutes, 10);
    }

    #[test]
    fn test_partial_config_overrides() {
        let config = AppConfig::parse(
            r#"
            database_url = "sqlite:///tmp/custom.db"
            trends_interval_minutes = 15
            "#,
        )
        .unwrap();
        assert_eq!(config.database_url, "sqlite:///tmp/custom.db");
        assert_eq!(config.trends_interval_minutes, 15);
        // Untouched fields keep their defaults
        assert_eq!(config.reddit_interval_minutes, 60);
    }

    #[test]
    fn test_zero_cadence_rejected() {
        let result = AppConfig::parse("reddit_interval_minutes = 0");
        assert!(matches!(
            result,
            Err(CoreError::Config(ConfigError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn test_malformed_toml_rejected() {
        let result = AppConfig::parse("not valid toml [[[");
        assert!(matches!(
            result,
            Err(CoreError::Config(ConfigError::Parse(_)))
        ));
    }

    #[test]
    fn test_durations() {
        let config = AppConfig::default();
        assert_eq!(config.reddit_interval(), Duration::from_secs(3600));
        assert_eq!(config.regions_interval(), Duration::from_secs(86400));
        assert_eq!(config.job_timeout(), Duration::from_secs(600));
    }
}
