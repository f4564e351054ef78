use crate::error::EngineError;
use rollcall_core::defaults;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Upper bound on `validity_days`, roughly a century.
pub const MAX_VALIDITY_DAYS: i64 = 36_500;

/// Engine configuration.
///
/// Loaded from built-in defaults, then an optional TOML file named by
/// `ROLLCALL_CONFIG`, then `ROLLCALL_*` environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Embedding dimensionality produced by the extractor.
    pub dimension: usize,
    /// Distance tolerance for enrollment self-consistency.
    pub enrollment_tolerance: f32,
    /// Distance tolerance for classroom matching.
    pub lecture_tolerance: f32,
    /// Embeddings this many days old are evicted.
    pub validity_days: i64,
    /// Identities left with fewer embeddings than this are reminded.
    pub low_coverage_threshold: usize,
    /// Required identity key length; 0 disables the rule.
    pub identity_len: usize,
    /// Period of the background sweeper.
    pub sweep_interval_secs: u64,
    /// Sweep (without notifications) before each lecture match.
    pub sweep_before_read: bool,
    /// Upper bound on one face-extraction call.
    pub detect_timeout_secs: u64,
    /// Minimum detector score for a face to count.
    pub min_face_confidence: f32,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = data_dir();
        Self {
            dimension: defaults::DIMENSION,
            enrollment_tolerance: defaults::ENROLLMENT_TOLERANCE,
            lecture_tolerance: defaults::LECTURE_TOLERANCE,
            validity_days: defaults::VALIDITY_DAYS,
            low_coverage_threshold: defaults::LOW_COVERAGE_THRESHOLD,
            identity_len: defaults::IDENTITY_LEN,
            sweep_interval_secs: 3600,
            sweep_before_read: true,
            detect_timeout_secs: 30,
            min_face_confidence: 0.5,
            db_path: data_dir.join("embeddings.db"),
            model_dir: data_dir.join("models"),
        }
    }
}

impl Config {
    /// Load the layered configuration and validate it.
    pub fn load() -> Result<Self, EngineError> {
        let mut config = match std::env::var_os("ROLLCALL_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file; missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, EngineError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml(&text).map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml(text: &str) -> Result<Self, EngineError> {
        toml::from_str(text).map_err(|e| EngineError::Config(e.to_string()))
    }

    /// Override fields from `ROLLCALL_*` variables looked up through `var`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        let var = &var;
        override_with(var, "ROLLCALL_DIMENSION", &mut self.dimension);
        override_with(var, "ROLLCALL_ENROLLMENT_TOLERANCE", &mut self.enrollment_tolerance);
        override_with(var, "ROLLCALL_LECTURE_TOLERANCE", &mut self.lecture_tolerance);
        override_with(var, "ROLLCALL_VALIDITY_DAYS", &mut self.validity_days);
        override_with(var, "ROLLCALL_LOW_COVERAGE_THRESHOLD", &mut self.low_coverage_threshold);
        override_with(var, "ROLLCALL_IDENTITY_LEN", &mut self.identity_len);
        override_with(var, "ROLLCALL_SWEEP_INTERVAL_SECS", &mut self.sweep_interval_secs);
        override_with(var, "ROLLCALL_DETECT_TIMEOUT_SECS", &mut self.detect_timeout_secs);
        override_with(var, "ROLLCALL_MIN_FACE_CONFIDENCE", &mut self.min_face_confidence);
        if let Some(v) = var("ROLLCALL_SWEEP_BEFORE_READ") {
            self.sweep_before_read = !matches!(v.trim(), "0" | "false" | "no");
        }
        if let Some(v) = var("ROLLCALL_DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
        if let Some(v) = var("ROLLCALL_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.dimension == 0 {
            return Err(EngineError::Config("dimension must be positive".into()));
        }
        for (name, value) in [
            ("enrollment_tolerance", self.enrollment_tolerance),
            ("lecture_tolerance", self.lecture_tolerance),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(EngineError::Config(format!("{name} must be positive, got {value}")));
            }
        }
        if !(1..=MAX_VALIDITY_DAYS).contains(&self.validity_days) {
            return Err(EngineError::Config(format!(
                "validity_days must be between 1 and {MAX_VALIDITY_DAYS}, got {}",
                self.validity_days
            )));
        }
        if self.sweep_interval_secs == 0 || self.detect_timeout_secs == 0 {
            return Err(EngineError::Config(
                "sweep_interval_secs and detect_timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn detect_timeout(&self) -> Duration {
        Duration::from_secs(self.detect_timeout_secs)
    }
}

fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall")
}

fn override_with<T: FromStr>(var: &dyn Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    if let Some(raw) = var(key) {
        match raw.trim().parse() {
            Ok(value) => *slot = value,
            Err(_) => tracing::warn!(key, value = %raw, "ignoring unparsable config override"),
        }
    }
}
