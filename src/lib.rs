//! pixcache - A two-tier image cache and concurrent fetch engine.
//!
//! This crate loads images from the network or the filesystem, keeps decoded
//! images in a bounded memory cache and raw bytes in a disk cache, and delivers
//! results to display targets without duplicating work for the same resource.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Application layer containing the loader, its engine and request DTOs.
pub mod application;
/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing caches, transport, decoder and configuration.
pub mod infrastructure;

/// Current version of the application.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name.
pub const NAME: &str = "pixcache";
