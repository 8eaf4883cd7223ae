//! Error type shared by the builders and the index readers

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A query names a feature that is not loaded
    #[error("Feature '{feature}' not loaded. Available: {available:?}")]
    UnknownFeature {
        feature: String,
        available: Vec<String>,
    },

    /// The group table of an extended roaring container is inconsistent
    #[error("Malformed bitmap container '{}': {detail}", path.display())]
    MalformedBitmapContainer { path: PathBuf, detail: String },

    /// A narrow roaring payload could not be decoded
    #[error("Invalid roaring bitmap '{}': {source}", path.display())]
    InvalidBitmap {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A sorted array file does not contain whole 8-byte records
    #[error("Invalid sorted array '{}': length {len} is not a multiple of 8", path.display())]
    InvalidArrayLength { path: PathBuf, len: u64 },

    #[error("I/O error during {operation} on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown feature '{name}'. Available: {available}")]
    UnknownFeatureSpec { name: String, available: String },

    #[error("Invalid record at line {line}: {detail}")]
    InvalidRecord { line: usize, detail: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Manifest error: {0}")]
    Manifest(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, operation: &'static str, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            operation,
            source,
        }
    }

    pub(crate) fn malformed(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        Error::MalformedBitmapContainer {
            path: path.into(),
            detail: detail.into(),
        }
    }

    pub(crate) fn unknown_feature<'a>(
        feature: &str,
        available: impl Iterator<Item = &'a String>,
    ) -> Self {
        Error::UnknownFeature {
            feature: feature.to_string(),
            available: available.cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_feature_display() {
        let available = vec!["signals".to_string(), "stops".to_string()];
        let err = Error::unknown_feature("bogus", available.iter());
        let msg = err.to_string();
        assert!(msg.contains("'bogus'"));
        assert!(msg.contains("signals"));
        assert!(msg.contains("stops"));
    }

    #[test]
    fn test_io_display() {
        let err = Error::io(
            "/tmp/x.u64",
            "write",
            std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        );
        assert_eq!(
            err.to_string(),
            "I/O error during write on '/tmp/x.u64': disk full"
        );
    }
}
