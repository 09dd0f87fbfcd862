use thiserror::Error;

use crate::config::ConfigError;

/// Core error type for the wirelink linker
///
/// Resolution problems caused by user declarations are never raised through
/// this type; they are collected as diagnostics. `CoreError` covers malformed
/// input records, runtime wiring failures and resolver defects.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid type reference '{input}': {message}")]
    InvalidTypeReference { input: String, message: String },

    #[error("Invalid binding key '{input}': {message}")]
    InvalidBindingKey { input: String, message: String },

    #[error("Invalid fabrication mode: {mode}")]
    InvalidFabricationMode { mode: String },

    #[error("Binding not found: {key}")]
    BindingNotFound { key: String },

    #[error("No factory registered for provider '{provider}'")]
    FactoryNotRegistered { provider: String },

    #[error("Factory for '{key}' failed: {message}")]
    FactoryFailed { key: String, message: String },

    #[error("Type mismatch resolving '{key}': expected {expected}")]
    TypeMismatch { key: String, expected: &'static str },

    #[error("Scope error: {message}")]
    Scope { message: String },

    #[error("Lock error on resource: {resource}")]
    LockError { resource: String },

    #[error("Internal resolver error: {message}")]
    Internal { message: String },
}

impl CoreError {
    /// Create a new internal (defect) error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a new binding-not-found error
    pub fn binding_not_found(key: impl std::fmt::Display) -> Self {
        Self::BindingNotFound {
            key: key.to_string(),
        }
    }

    /// Create a new scope error
    pub fn scope(message: impl Into<String>) -> Self {
        Self::Scope {
            message: message.into(),
        }
    }

    /// Create a new factory failure
    pub fn factory_failed(key: impl std::fmt::Display, message: impl Into<String>) -> Self {
        Self::FactoryFailed {
            key: key.to_string(),
            message: message.into(),
        }
    }

    /// Create a new lock error
    pub fn lock(resource: impl Into<String>) -> Self {
        Self::LockError {
            resource: resource.into(),
        }
    }

    /// Check if the error is a resolver defect
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// Check if the error is a missing binding
    pub fn is_binding_not_found(&self) -> bool {
        matches!(self, Self::BindingNotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_helpers() {
        let err = CoreError::internal("graph lost a node");
        assert!(err.is_internal());
        assert_eq!(err.to_string(), "Internal resolver error: graph lost a node");

        let err = CoreError::binding_not_found("app::Database");
        assert!(err.is_binding_not_found());
        assert!(!err.is_internal());
    }

    #[test]
    fn test_config_error_conversion() {
        let err: CoreError = ConfigError::invalid_value("max_threads", "0", "a positive thread count").into();
        assert!(matches!(err, CoreError::Config(_)));
    }
}
