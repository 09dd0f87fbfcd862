use thiserror::Error;

/// Errors raised while loading linker settings or declaration files
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid linker setting '{field}': '{value}'. Expected {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Unsupported file '{path}'. Expected a .yaml, .yml or .json file")]
    UnsupportedFormat { path: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConfigError {
    /// Create an invalid value error
    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            expected: expected.into(),
        }
    }
}

/// Parse a boolean flag the way environment variables usually spell them
pub fn parse_flag(field: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid_value(
            field,
            value,
            "one of: true, false, 1, 0, yes, no, on, off",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("auto_wiring", "TRUE").unwrap());
        assert!(parse_flag("auto_wiring", " on ").unwrap());
        assert!(!parse_flag("auto_wiring", "0").unwrap());

        let err = parse_flag("auto_wiring", "maybe").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        assert!(err.to_string().contains("auto_wiring"));
    }
}
