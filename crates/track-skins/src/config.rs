//! Compositor configuration

use crate::error::CompositionError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default quiet period before a pass starts
pub const DEFAULT_DEBOUNCE_MS: u64 = 200;
/// Default attempts per filesystem operation
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
/// Default pause between attempts
pub const DEFAULT_RETRY_DELAY_MS: u64 = 100;
/// Default number of failures a pass tolerates before aborting
pub const DEFAULT_FAILURE_BUDGET: u32 = 7;
/// Default manifest file name inside the output directory
pub const DEFAULT_MANIFEST_FILE: &str = "cm_skins_active.json";

/// Configuration shared by the provider, composer and scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositorConfig {
    /// Quiet period the scheduler waits for before starting a pass
    pub debounce_ms: u64,
    /// Attempts per filesystem operation
    pub retry_attempts: u32,
    /// Pause between attempts of the same operation
    pub retry_delay_ms: u64,
    /// Failures tolerated in one pass; exceeding it aborts the pass
    pub failure_budget: u32,
    /// Manifest file name inside the output directory
    pub manifest_file: String,
    /// Folder under `skins/` holding one folder per skin
    pub sources_dir: String,
    /// Folder under `skins/` the game reads
    pub output_dir: String,
    /// Where recycled files go; defaults to `skins/.cm_recycled`
    pub recycle_dir: Option<PathBuf>,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            failure_budget: DEFAULT_FAILURE_BUDGET,
            manifest_file: DEFAULT_MANIFEST_FILE.to_string(),
            sources_dir: "cm_skins".to_string(),
            output_dir: "default".to_string(),
            recycle_dir: None,
        }
    }
}

impl CompositorConfig {
    /// Load configuration from a JSON file; missing keys take defaults
    ///
    /// # Errors
    ///
    /// Returns [`CompositionError::Config`] if the file cannot be read,
    /// parsed, or fails validation.
    pub fn from_json_file(path: &Path) -> Result<Self, CompositionError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            CompositionError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|e| {
            CompositionError::Config(format!("cannot parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Set the debounce quiet period
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce_ms = duration_ms(debounce);
        self
    }

    /// Set the pause between retries
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_ms = duration_ms(delay);
        self
    }

    /// Set attempts per operation
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Set the per-pass failure budget
    pub fn with_failure_budget(mut self, budget: u32) -> Self {
        self.failure_budget = budget;
        self
    }

    /// Send recycled files to a specific folder
    pub fn with_recycle_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.recycle_dir = Some(dir.into());
        self
    }

    /// Debounce period as a [`Duration`]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Retry pause as a [`Duration`]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Check that the configuration is usable
    ///
    /// # Errors
    ///
    /// Returns [`CompositionError::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<(), CompositionError> {
        if self.retry_attempts == 0 {
            return Err(CompositionError::Config(
                "retry_attempts must be at least 1".to_string(),
            ));
        }
        for (field, value) in [
            ("manifest_file", &self.manifest_file),
            ("sources_dir", &self.sources_dir),
            ("output_dir", &self.output_dir),
        ] {
            if !is_plain_name(value) {
                return Err(CompositionError::Config(format!(
                    "{field} must be a plain file name, got {value:?}"
                )));
            }
        }
        if self.sources_dir.eq_ignore_ascii_case(&self.output_dir) {
            return Err(CompositionError::Config(
                "sources_dir and output_dir must differ".to_string(),
            ));
        }
        Ok(())
    }
}

fn is_plain_name(value: &str) -> bool {
    !value.is_empty()
        && value != "."
        && value != ".."
        && !value.contains(['/', '\\'])
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_documented_constants() {
        let config = CompositorConfig::default();
        assert_eq!(config.debounce(), Duration::from_millis(200));
        assert_eq!(config.retry_attempts, 3);
        assert_eq!(config.retry_delay(), Duration::from_millis(100));
        assert_eq!(config.failure_budget, 7);
        assert_eq!(config.manifest_file, "cm_skins_active.json");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_methods() {
        let config = CompositorConfig::default()
            .with_debounce(Duration::from_millis(5))
            .with_retry_delay(Duration::from_millis(1))
            .with_retry_attempts(2)
            .with_failure_budget(1)
            .with_recycle_dir("/tmp/recycled");
        assert_eq!(config.debounce_ms, 5);
        assert_eq!(config.retry_delay_ms, 1);
        assert_eq!(config.retry_attempts, 2);
        assert_eq!(config.failure_budget, 1);
        assert_eq!(config.recycle_dir, Some(PathBuf::from("/tmp/recycled")));
    }

    #[test]
    fn test_validate_rejects_zero_attempts_and_nested_names() {
        let config = CompositorConfig::default().with_retry_attempts(0);
        assert!(config.validate().is_err());

        let config = CompositorConfig {
            output_dir: "a/b".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = CompositorConfig {
            output_dir: "CM_SKINS".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_json_file_fills_missing_keys() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(file, r#"{{"debounce_ms": 50, "failure_budget": 3}}"#)?;

        let config = CompositorConfig::from_json_file(file.path())?;
        assert_eq!(config.debounce_ms, 50);
        assert_eq!(config.failure_budget, 3);
        assert_eq!(config.retry_attempts, DEFAULT_RETRY_ATTEMPTS);
        Ok(())
    }

    #[test]
    fn test_from_json_file_reports_parse_errors() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(file, "not json")?;

        let result = CompositorConfig::from_json_file(file.path());
        assert!(matches!(result, Err(CompositionError::Config(_))));
        Ok(())
    }
}
