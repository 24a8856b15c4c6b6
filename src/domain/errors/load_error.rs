//! Image loading error types.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Category of a failed load, reported to listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailType {
    /// Input/output error. Can be caused by network or disk trouble.
    IoError,
    /// The image data could not be decoded.
    DecodingError,
    /// A network fetch was needed while network downloads are denied.
    NetworkDenied,
    /// Decoding would exceed the memory limits.
    OutOfMemory,
    /// Anything else.
    Unknown,
}

impl fmt::Display for FailType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::IoError => "io_error",
            Self::DecodingError => "decoding_error",
            Self::NetworkDenied => "network_denied",
            Self::OutOfMemory => "out_of_memory",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Why a load failed: a [`FailType`] plus the underlying error, if any.
#[derive(Debug, Clone)]
pub struct FailReason {
    kind: FailType,
    cause: Option<Arc<LoadError>>,
}

impl FailReason {
    /// Creates a reason without an underlying error.
    #[must_use]
    pub const fn new(kind: FailType) -> Self {
        Self { kind, cause: None }
    }

    /// Returns the failure category.
    #[must_use]
    pub const fn kind(&self) -> FailType {
        self.kind
    }

    /// Returns the underlying error.
    #[must_use]
    pub fn cause(&self) -> Option<&LoadError> {
        self.cause.as_deref()
    }
}

impl From<LoadError> for FailReason {
    fn from(error: LoadError) -> Self {
        Self {
            kind: error.fail_type(),
            cause: Some(Arc::new(error)),
        }
    }
}

impl fmt::Display for FailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{}: {cause}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// Errors raised while fetching or decoding a single image.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum LoadError {
    #[error("i/o error: {message}")]
    Io { message: String },

    #[error("no image stream for {uri}")]
    NoStream { uri: String },

    #[error("failed to decode image: {message}")]
    Decoding { message: String },

    #[error("network downloads are denied, cannot fetch {uri}")]
    NetworkDenied { uri: String },

    #[error("image exceeds decoder limits: {message}")]
    OutOfMemory { message: String },

    #[error("unsupported uri scheme: {uri}")]
    UnsupportedScheme { uri: String },

    #[error("unexpected error: {message}")]
    Unexpected { message: String },
}

impl LoadError {
    /// Creates an i/o error.
    #[must_use]
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Creates a decoding error.
    #[must_use]
    pub fn decoding(message: impl Into<String>) -> Self {
        Self::Decoding {
            message: message.into(),
        }
    }

    /// Creates a network denied error.
    #[must_use]
    pub fn network_denied(uri: impl Into<String>) -> Self {
        Self::NetworkDenied { uri: uri.into() }
    }

    /// Creates an unsupported scheme error.
    #[must_use]
    pub fn unsupported_scheme(uri: impl Into<String>) -> Self {
        Self::UnsupportedScheme { uri: uri.into() }
    }

    /// Creates an unexpected error.
    #[must_use]
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected {
            message: message.into(),
        }
    }

    /// Maps the error onto the category reported to listeners.
    #[must_use]
    pub const fn fail_type(&self) -> FailType {
        match self {
            Self::Io { .. } | Self::NoStream { .. } => FailType::IoError,
            Self::Decoding { .. } => FailType::DecodingError,
            Self::NetworkDenied { .. } => FailType::NetworkDenied,
            Self::OutOfMemory { .. } => FailType::OutOfMemory,
            Self::UnsupportedScheme { .. } | Self::Unexpected { .. } => FailType::Unknown,
        }
    }
}

impl From<std::io::Error> for LoadError {
    fn from(error: std::io::Error) -> Self {
        Self::io(error.to_string())
    }
}

impl From<image::ImageError> for LoadError {
    fn from(error: image::ImageError) -> Self {
        match error {
            image::ImageError::Limits(e) => Self::OutOfMemory {
                message: e.to_string(),
            },
            image::ImageError::IoError(e) => Self::io(e.to_string()),
            other => Self::decoding(other.to_string()),
        }
    }
}

/// Errors raised while opening or maintaining a disk cache.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum DiskCacheError {
    #[error("cache directory {path} is not usable: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("disk cache i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned by the loader facade.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum LoaderError {
    #[error("image loader must be initialized with a configuration before use")]
    NotInitialized,

    #[error("image loader is already initialized, destroy it first")]
    AlreadyInitialized,

    #[error("no tokio runtime available to run load tasks")]
    NoRuntime,

    #[error("image loading failed: {0}")]
    Failed(FailReason),

    #[error("image loading was cancelled")]
    Cancelled,
}
