//! Configuration file (`config.toml`).
//!
//! Every field is optional. A missing file gives the defaults; a file that cannot be
//! read or parsed also gives the defaults, plus a warning for the caller to report.

use qbe_engine::QoS;
use qbe_engine::engine::{Language, Locale};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::Result;

const MAX_CONFIG_FILE_BYTES: u64 = 1_048_576; // 1 MiB
const MIN_TIME_LIMIT: f64 = 0.25;
const MAX_TIME_LIMIT: f64 = 3600.0;
/// Search cost grows exponentially with the level.
pub const MAX_LEVEL: usize = 6;

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub level: usize,
    /// Seconds before a suggestion search is expired.
    pub time_limit: f64,
    pub max_suggestions: usize,
    pub locale: Language,
    pub qos: QoS,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            level: 3,
            time_limit: 1.5,
            max_suggestions: 10,
            locale: Language::En,
            qos: QoS::UserInitiated,
        }
    }
}

impl Config {
    /// Parse TOML text. Out-of-range values are corrected, see [`Config::normalize`].
    pub fn parse(text: &str) -> Result<Config> {
        let mut config: Config = toml::from_str(text)?;
        for warning in config.normalize() {
            tracing::warn!("{warning}");
        }
        Ok(config)
    }

    /// Clamp fields into their usable range, returning one warning per correction.
    pub fn normalize(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();
        if !self.time_limit.is_finite() {
            warnings.push(format!(
                "time_limit must be a finite number of seconds, using {}",
                Config::default().time_limit
            ));
            self.time_limit = Config::default().time_limit;
        } else if self.time_limit < MIN_TIME_LIMIT {
            warnings.push(format!(
                "time_limit {} is below the minimum, using {MIN_TIME_LIMIT}",
                self.time_limit
            ));
            self.time_limit = MIN_TIME_LIMIT;
        } else if self.time_limit > MAX_TIME_LIMIT {
            warnings.push(format!(
                "time_limit {} is above the maximum, using {MAX_TIME_LIMIT}",
                self.time_limit
            ));
            self.time_limit = MAX_TIME_LIMIT;
        }
        if self.level > MAX_LEVEL {
            warnings.push(format!("level {} is above the maximum, using {MAX_LEVEL}", self.level));
            self.level = MAX_LEVEL;
        }
        if self.max_suggestions == 0 {
            warnings.push("max_suggestions must be at least 1, using 1".to_string());
            self.max_suggestions = 1;
        }
        warnings
    }

    /// The search time limit. A value that was never normalized and is out of range gives
    /// the default.
    pub fn time_limit(&self) -> Duration {
        Duration::try_from_secs_f64(self.time_limit)
            .unwrap_or_else(|_| Duration::from_secs_f64(Config::default().time_limit))
    }

    pub fn locale(&self) -> Locale {
        Locale::for_language(self.locale)
    }
}

/// Load the config at `path`. Never fails: problems are returned as warnings.
pub fn load_config(path: Option<&Path>) -> (Config, Vec<String>) {
    let mut warnings = Vec::new();
    let Some(path) = path else {
        return (Config::default(), warnings);
    };
    if !path.exists() {
        return (Config::default(), warnings);
    }

    let content = match std::fs::metadata(path) {
        Ok(meta) if meta.len() > MAX_CONFIG_FILE_BYTES => {
            warnings.push(format!(
                "Refusing to read {}: file too large ({} bytes, max {})",
                path.display(),
                meta.len(),
                MAX_CONFIG_FILE_BYTES
            ));
            None
        }
        Ok(_) => match std::fs::read_to_string(path) {
            Ok(content) => Some(content),
            Err(err) => {
                warnings.push(format!("Failed to read {}: {}", path.display(), err));
                None
            }
        },
        Err(err) => {
            warnings.push(format!("Failed to read metadata for {}: {}", path.display(), err));
            None
        }
    };

    let mut config = match content.map(|c| toml::from_str::<Config>(&c)) {
        Some(Ok(config)) => config,
        Some(Err(err)) => {
            warnings.push(format!("Failed to parse {}: {}", path.display(), err));
            Config::default()
        }
        None => Config::default(),
    };
    warnings.extend(
        config
            .normalize()
            .into_iter()
            .map(|w| format!("{}: {}", path.display(), w)),
    );
    (config, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(text: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.level, 3);
        assert_eq!(config.time_limit(), Duration::from_millis(1500));
        assert_eq!(config.max_suggestions, 10);
        assert_eq!(config.locale().language, Language::En);
        assert_eq!(config.qos, QoS::UserInitiated);
    }

    #[test]
    fn test_parse_partial() {
        let config = Config::parse("level = 2\nlocale = \"nl\"\nqos = \"background\"").unwrap();
        assert_eq!(config.level, 2);
        assert_eq!(config.locale, Language::Nl);
        assert_eq!(config.qos, QoS::Background);
        assert_eq!(config.max_suggestions, 10);
    }

    #[test]
    fn test_parse_rejects_unknown_fields() {
        assert!(Config::parse("depth = 4").is_err());
    }

    #[test]
    fn test_parse_clamps_time_limit() {
        let config = Config::parse("time_limit = 0.01").unwrap();
        assert_eq!(config.time_limit, 0.25);
    }

    #[test]
    fn test_parse_caps_huge_time_limit() {
        let config = Config::parse("time_limit = 1e300").unwrap();
        assert_eq!(config.time_limit, MAX_TIME_LIMIT);
        assert_eq!(config.time_limit(), Duration::from_secs(3600));
    }

    #[test]
    fn test_unnormalized_time_limit_falls_back() {
        let config = Config {
            time_limit: 1e300,
            ..Config::default()
        };
        assert_eq!(config.time_limit(), Duration::from_millis(1500));
        let config = Config {
            time_limit: -1.0,
            ..Config::default()
        };
        assert_eq!(config.time_limit(), Duration::from_millis(1500));
    }

    #[test]
    fn test_normalize_reports_corrections() {
        let mut config = Config {
            level: 40,
            time_limit: f64::INFINITY,
            max_suggestions: 0,
            ..Config::default()
        };
        let warnings = config.normalize();
        assert_eq!(warnings.len(), 3);
        assert_eq!(config.level, MAX_LEVEL);
        assert_eq!(config.time_limit, 1.5);
        assert_eq!(config.max_suggestions, 1);
    }

    #[test]
    fn test_load_missing_file_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let (config, warnings) = load_config(Some(&dir.path().join("config.toml")));
        assert_eq!(config, Config::default());
        assert!(warnings.is_empty());
        let (config, warnings) = load_config(None);
        assert_eq!(config, Config::default());
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_load_file() {
        let file = write_config("level = 4\ntime_limit = 3.0\nmax_suggestions = 5\n");
        let (config, warnings) = load_config(Some(file.path()));
        assert!(warnings.is_empty(), "{warnings:?}");
        assert_eq!(config.level, 4);
        assert_eq!(config.time_limit(), Duration::from_secs(3));
        assert_eq!(config.max_suggestions, 5);
    }

    #[test]
    fn test_load_malformed_file_warns() {
        let file = write_config("level = \"deep\"");
        let (config, warnings) = load_config(Some(file.path()));
        assert_eq!(config, Config::default());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("Failed to parse"));
    }

    #[test]
    fn test_load_oversized_file_warns() {
        let file = write_config(&"#".repeat(MAX_CONFIG_FILE_BYTES as usize + 1));
        let (config, warnings) = load_config(Some(file.path()));
        assert_eq!(config, Config::default());
        assert!(warnings[0].contains("file too large"));
    }

    #[test]
    fn test_load_clamped_value_warns() {
        let file = write_config("level = 99");
        let (config, warnings) = load_config(Some(file.path()));
        assert_eq!(config.level, MAX_LEVEL);
        assert_eq!(warnings.len(), 1);
    }
}
