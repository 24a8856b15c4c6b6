//! Domain error types.

mod load_error;

pub use load_error::{DiskCacheError, FailReason, FailType, LoadError, LoaderError};
