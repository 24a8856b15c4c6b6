//! Port definition for the persistent image file cache.

use std::fmt;
use std::path::PathBuf;
use std::pin::Pin;

use bytes::Bytes;
use image::DynamicImage;
use tokio::io::AsyncRead;

/// Raw image bytes with an optional known length.
pub struct ImageStream {
    reader: Pin<Box<dyn AsyncRead + Send>>,
    length: Option<u64>,
}

impl ImageStream {
    /// Wraps an async reader.
    pub fn new(reader: impl AsyncRead + Send + 'static, length: Option<u64>) -> Self {
        Self {
            reader: Box::pin(reader),
            length,
        }
    }

    /// Wraps an in-memory buffer.
    #[must_use]
    pub fn from_bytes(bytes: Bytes) -> Self {
        let length = Some(bytes.len() as u64);
        Self::new(std::io::Cursor::new(bytes), length)
    }

    /// Returns the total length in bytes, if the source reported one.
    #[must_use]
    pub const fn length(&self) -> Option<u64> {
        self.length
    }

    /// Returns the underlying reader.
    pub fn reader(&mut self) -> &mut Pin<Box<dyn AsyncRead + Send>> {
        &mut self.reader
    }
}

impl fmt::Debug for ImageStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageStream")
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

/// Observes the progress of a byte copy.
pub trait CopyListener: Send {
    /// Called after each chunk. Return false to ask the copy to stop.
    ///
    /// `total` is 0 when the length is unknown.
    fn on_bytes_copied(&mut self, current: u64, total: u64) -> bool;
}

impl<F> CopyListener for F
where
    F: FnMut(u64, u64) -> bool + Send,
{
    fn on_bytes_copied(&mut self, current: u64, total: u64) -> bool {
        self(current, total)
    }
}

/// Thread-safe URI to file store.
///
/// A successful [`save`](DiskCache::save) is atomic: a reader sees either the
/// previous file, no file, or the complete new file.
#[async_trait::async_trait]
pub trait DiskCache: Send + Sync {
    /// Returns the directory files are currently stored in.
    fn directory(&self) -> PathBuf;

    /// Returns the cached file for `uri` if it exists.
    async fn get(&self, uri: &str) -> Option<PathBuf>;

    /// Copies `stream` into the cache. Returns true only if the whole stream was stored.
    async fn save(&self, uri: &str, stream: ImageStream, listener: &mut dyn CopyListener)
    -> bool;

    /// Encodes `image` and stores it for `uri`.
    async fn save_image(&self, uri: &str, image: &DynamicImage) -> bool;

    /// Removes the file for `uri`. Returns true if a file was removed.
    async fn remove(&self, uri: &str) -> bool;

    /// Removes every cached file.
    async fn clear(&self);

    /// Releases resources. Further operations behave as misses.
    async fn close(&self);
}

/// Maps an image URI to a file name inside a disk cache directory.
pub trait FileNameGenerator: Send + Sync {
    /// Returns a deterministic, filesystem-safe name for `uri`.
    fn generate(&self, uri: &str) -> String;
}
