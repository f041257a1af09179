//! Error types for reloadr
//!
//! Centralized error handling using thiserror. Loader failures never
//! escape the coordinator as `Err`; they are carried in the resource state
//! as a [`RawError`] next to their normalized form.

use std::sync::Arc;

use thiserror::Error;

/// Boxed error a loader may fail with
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Original loader error, shared between state snapshots
pub type RawError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// All error types that can occur in reloadr
#[derive(Debug, Error)]
pub enum LoaderError {
    /// A pending loader result could not be awaited
    #[error("No async runtime available to await the loader")]
    NoRuntime,

    /// The loader or its future panicked
    #[error("Loader panicked: {0}")]
    Panicked(String),

    /// Configuration value rejected
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl LoaderError {
    /// Build a panic error from an unwind payload
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        LoaderError::Panicked(message)
    }

    /// Convert into a shareable raw error
    pub fn into_raw(self) -> RawError {
        Arc::new(self)
    }
}

/// Result type alias for reloadr operations
pub type Result<T> = std::result::Result<T, LoaderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_runtime_error() {
        let err = LoaderError::NoRuntime;
        assert_eq!(err.to_string(), "No async runtime available to await the loader");
    }

    #[test]
    fn test_panicked_error() {
        let err = LoaderError::Panicked("boom".to_string());
        assert_eq!(err.to_string(), "Loader panicked: boom");
    }

    #[test]
    fn test_invalid_config_error() {
        let err = LoaderError::InvalidConfig("teardown_delay_ms too large".to_string());
        assert_eq!(err.to_string(), "Invalid config: teardown_delay_ms too large");
    }

    #[test]
    fn test_from_panic_str_payload() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("static message");
        let err = LoaderError::from_panic(payload);
        assert!(matches!(err, LoaderError::Panicked(ref m) if m == "static message"));
    }

    #[test]
    fn test_from_panic_string_payload() {
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned message"));
        let err = LoaderError::from_panic(payload);
        assert_eq!(err.to_string(), "Loader panicked: owned message");
    }

    #[test]
    fn test_from_panic_opaque_payload() {
        let payload: Box<dyn std::any::Any + Send> = Box::new(42_u32);
        let err = LoaderError::from_panic(payload);
        assert_eq!(err.to_string(), "Loader panicked: non-string panic payload");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: LoaderError = io_err.into();
        assert!(matches!(err, LoaderError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_yaml_error_conversion() {
        let yaml_err = serde_yaml::from_str::<u32>("not: [a number").unwrap_err();
        let err: LoaderError = yaml_err.into();
        assert!(matches!(err, LoaderError::Yaml(_)));
    }

    #[test]
    fn test_into_raw_keeps_message() {
        let raw = LoaderError::NoRuntime.into_raw();
        assert_eq!(raw.to_string(), "No async runtime available to await the loader");
    }
}
