use std::fmt;

/// Origin of one linker setting, reported when a pass starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingSource {
    /// Built-in value
    Default { value: String },
    /// A `WIRELINK_*` environment variable
    Environment { variable: String },
    /// A settings file
    File { path: String },
    /// Set through a `with_*` method
    Override,
}

impl SettingSource {
    pub fn is_environment(&self) -> bool {
        matches!(self, SettingSource::Environment { .. })
    }

    pub fn is_default(&self) -> bool {
        matches!(self, SettingSource::Default { .. })
    }

    pub fn is_file(&self) -> bool {
        matches!(self, SettingSource::File { .. })
    }
}

impl fmt::Display for SettingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingSource::Default { value } => write!(f, "default ({})", value),
            SettingSource::Environment { variable } => write!(f, "env {}", variable),
            SettingSource::File { path } => write!(f, "file {}", path),
            SettingSource::Override => write!(f, "set in code"),
        }
    }
}
