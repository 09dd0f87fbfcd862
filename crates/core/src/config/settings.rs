use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::Path;

use crate::config::{parse_flag, ConfigError, SettingSource};

pub const ENV_AUTO_WIRING: &str = "WIRELINK_AUTO_WIRING";
pub const ENV_PARALLEL: &str = "WIRELINK_PARALLEL";
pub const ENV_MAX_THREADS: &str = "WIRELINK_MAX_THREADS";
pub const ENV_WARNINGS_AS_ERRORS: &str = "WIRELINK_WARNINGS_AS_ERRORS";

const TRACKED_FIELDS: [&str; 4] = [
    "auto_wiring",
    "parallel",
    "max_threads",
    "warnings_as_errors",
];

/// Settings for one linker pass
///
/// `naming` is opaque pass-through configuration for the emission layer;
/// the core never interprets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkerSettings {
    /// Synthesize missing bindings from constructible types
    pub auto_wiring: bool,
    /// Resolve independent injectors on a thread pool
    pub parallel: bool,
    /// Upper bound on resolver threads, `None` lets rayon decide
    pub max_threads: Option<usize>,
    /// Treat warning diagnostics as blocking emission
    pub warnings_as_errors: bool,
    /// Naming and format settings handed through to emission
    pub naming: BTreeMap<String, String>,
    #[serde(skip)]
    sources: BTreeMap<String, SettingSource>,
}

impl Default for LinkerSettings {
    fn default() -> Self {
        let mut sources = BTreeMap::new();
        for field in TRACKED_FIELDS {
            let value = default_value(field);
            sources.insert(field.to_string(), SettingSource::Default { value });
        }

        Self {
            auto_wiring: false,
            parallel: true,
            max_threads: None,
            warnings_as_errors: false,
            naming: BTreeMap::new(),
            sources,
        }
    }
}

fn default_value(field: &str) -> String {
    match field {
        "parallel" => "true".to_string(),
        "max_threads" => "none".to_string(),
        _ => "false".to_string(),
    }
}

impl LinkerSettings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Load settings from `WIRELINK_*` environment variables on top of the defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        let settings = Self::default().with_env_overrides()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let settings: Self = serde_yaml::from_str(yaml)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from a JSON document
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a `.yaml`, `.yml` or `.json` file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let display = path.display().to_string();

        let mut settings = match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content)?,
            Some("json") => Self::from_json_str(&content)?,
            _ => return Err(ConfigError::UnsupportedFormat { path: display }),
        };

        for field in TRACKED_FIELDS {
            let path = display.clone();
            settings
                .sources
                .insert(field.to_string(), SettingSource::File { path });
        }
        Ok(settings)
    }

    /// Apply any `WIRELINK_*` environment variables that are set
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Ok(value) = env::var(ENV_AUTO_WIRING) {
            self.auto_wiring = parse_flag("auto_wiring", &value)?;
            self.record_env("auto_wiring", ENV_AUTO_WIRING);
        }

        if let Ok(value) = env::var(ENV_PARALLEL) {
            self.parallel = parse_flag("parallel", &value)?;
            self.record_env("parallel", ENV_PARALLEL);
        }

        if let Ok(value) = env::var(ENV_MAX_THREADS) {
            let threads = value.trim().parse::<usize>().map_err(|_| {
                ConfigError::invalid_value("max_threads", &value, "a positive thread count")
            })?;
            self.max_threads = Some(threads);
            self.record_env("max_threads", ENV_MAX_THREADS);
        }

        if let Ok(value) = env::var(ENV_WARNINGS_AS_ERRORS) {
            self.warnings_as_errors = parse_flag("warnings_as_errors", &value)?;
            self.record_env("warnings_as_errors", ENV_WARNINGS_AS_ERRORS);
        }

        Ok(self)
    }

    /// Enable or disable auto-wiring
    pub fn with_auto_wiring(mut self, enabled: bool) -> Self {
        self.auto_wiring = enabled;
        self.sources
            .insert("auto_wiring".to_string(), SettingSource::Override);
        self
    }

    /// Enable or disable parallel resolution
    pub fn with_parallel(mut self, enabled: bool) -> Self {
        self.parallel = enabled;
        self.sources
            .insert("parallel".to_string(), SettingSource::Override);
        self
    }

    /// Bound the resolver thread pool
    pub fn with_max_threads(mut self, threads: usize) -> Self {
        self.max_threads = Some(threads);
        self.sources
            .insert("max_threads".to_string(), SettingSource::Override);
        self
    }

    /// Treat warnings as blocking
    pub fn with_warnings_as_errors(mut self, enabled: bool) -> Self {
        self.warnings_as_errors = enabled;
        self.sources
            .insert("warnings_as_errors".to_string(), SettingSource::Override);
        self
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_threads == Some(0) {
            return Err(ConfigError::invalid_value(
                "max_threads",
                "0",
                "a positive thread count",
            ));
        }

        if let Some(key) = self.naming.keys().find(|key| key.trim().is_empty()) {
            return Err(ConfigError::invalid_value(
                "naming",
                key.clone(),
                "non-empty naming keys",
            ));
        }

        Ok(())
    }

    /// Where a tracked field's value came from
    pub fn source(&self, field: &str) -> Option<&SettingSource> {
        self.sources.get(field)
    }

    /// Sources of all tracked fields
    pub fn sources(&self) -> &BTreeMap<String, SettingSource> {
        &self.sources
    }

    fn record_env(&mut self, field: &str, var: &str) {
        let variable = var.to_string();
        self.sources
            .insert(field.to_string(), SettingSource::Environment { variable });
    }
}
