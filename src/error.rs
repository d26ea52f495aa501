//! Central error types for capview.
//!
//! Errors implement `Serialize` (as their message) so they can travel in
//! sink events and be written to logs or handed to a host over FFI.

use capview_katsukity::KatsukityError;
use serde::Serialize;
use thiserror::Error;

/// Main error type for capview operations.
#[derive(Error, Debug)]
pub enum CapviewError {
    /// The host handed over a null or unusable view handle
    #[error("Invalid view handle: {0}")]
    InvalidView(String),

    /// GPU adapter/device setup or rendering failed (wgpu)
    #[error("GPU error: {0}")]
    Gpu(String),

    /// Surface creation or presentation on the host view failed
    #[error("Surface error: {0}")]
    Surface(String),

    /// Capture device missing or USB I/O failed
    #[error("Capture device error: {0}")]
    Device(String),

    /// Capture board answered in a way we don't understand
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Capture stream data could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Audio output failed (cpal)
    #[error("Audio error: {0}")]
    Audio(String),

    /// Configuration invalid
    #[error("Config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Serialize for CapviewError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl From<KatsukityError> for CapviewError {
    fn from(err: KatsukityError) -> Self {
        match err {
            KatsukityError::Usb(_)
            | KatsukityError::NotFound(_)
            | KatsukityError::ReenumerationTimeout => CapviewError::Device(err.to_string()),
            KatsukityError::Fpga(_) => CapviewError::Protocol(err.to_string()),
            KatsukityError::ShortFrame { .. } | KatsukityError::BadBuffer { .. } => {
                CapviewError::Parse(err.to_string())
            },
        }
    }
}

impl From<image::ImageError> for CapviewError {
    fn from(err: image::ImageError) -> Self {
        CapviewError::Image(err.to_string())
    }
}

/// Extension trait for adding context to Results.
///
/// # Example
/// ```ignore
/// use crate::error::{ResultExt, CapviewResult};
///
/// fn load_dump(path: &Path) -> CapviewResult<Vec<u8>> {
///     std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
/// }
/// ```
pub trait ResultExt<T> {
    /// Add context lazily (only evaluated on error), converting to
    /// CapviewError::Other.
    fn with_context<F: FnOnce() -> String>(self, f: F) -> CapviewResult<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn with_context<F: FnOnce() -> String>(self, f: F) -> CapviewResult<T> {
        self.map_err(|e| CapviewError::Other(format!("{}: {}", f(), e)))
    }
}

/// Type alias for Results using CapviewError.
pub type CapviewResult<T> = Result<T, CapviewError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CapviewError::InvalidView("null NSView".to_string());
        assert_eq!(err.to_string(), "Invalid view handle: null NSView");
    }

    #[test]
    fn test_error_serialization() {
        let err = CapviewError::Gpu("no adapter".to_string());
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(json, "\"GPU error: no adapter\"");
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: CapviewError = io_err.into();
        assert!(matches!(err, CapviewError::Io(_)));
    }

    #[test]
    fn test_from_driver_errors() {
        let err: CapviewError = KatsukityError::ReenumerationTimeout.into();
        assert!(matches!(err, CapviewError::Device(_)));

        let err: CapviewError = KatsukityError::Fpga("no id".to_string()).into();
        assert!(matches!(err, CapviewError::Protocol(_)));

        let err: CapviewError = KatsukityError::ShortFrame { len: 1, expected: 2 }.into();
        assert!(matches!(err, CapviewError::Parse(_)));
        assert!(err.to_string().contains("short frame"));
    }

    #[test]
    fn test_result_ext_with_context() {
        let result: Result<(), &str> = Err("inner");
        let msg = result
            .with_context(|| format!("ctx-{}", 42))
            .unwrap_err()
            .to_string();
        assert!(msg.contains("ctx-42"));
        assert!(msg.contains("inner"));
    }

    #[test]
    fn test_result_ext_ok_passthrough() {
        let result: Result<i32, &str> = Ok(42);
        assert_eq!(result.with_context(|| unreachable!()).unwrap(), 42);
    }
}
