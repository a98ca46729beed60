//! Metric logging errors.

use std::fmt;

#[derive(Debug)]
pub enum MetricError {
    /// `store` on a key that was never registered.
    UnknownKey(String),
    DuplicateKey(String),
    /// A sink saw a different key set than the one its header was written for.
    HeaderMismatch { expected: usize, got: usize },
    Io(std::io::Error),
}

impl fmt::Display for MetricError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricError::UnknownKey(key) => write!(f, "metric key '{}' was not registered", key),
            MetricError::DuplicateKey(key) => write!(f, "metric key '{}' registered twice", key),
            MetricError::HeaderMismatch { expected, got } => {
                write!(f, "metric row has {} columns, header has {}", got, expected)
            }
            MetricError::Io(e) => write!(f, "metric sink I/O error: {}", e),
        }
    }
}

impl std::error::Error for MetricError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MetricError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for MetricError {
    fn from(e: std::io::Error) -> Self {
        MetricError::Io(e)
    }
}
