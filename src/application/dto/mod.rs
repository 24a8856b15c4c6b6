//! Data transfer objects for the application layer.

mod display_options;

pub use display_options::{DisplayImageOptions, DisplayRequest, LoadRequest};
