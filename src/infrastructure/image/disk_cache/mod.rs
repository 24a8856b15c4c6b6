//! Persistent image file caches.
//!
//! All variants write through a temporary file in the cache directory and
//! rename it into place, so readers never see a partial file.

mod base;
mod limited_age;
mod lru;

use std::io;
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::domain::ports::{CopyListener, DiskCache, ImageStream};

pub use base::UnlimitedDiskCache;
pub use limited_age::LimitedAgeDiskCache;
pub use lru::{LruDiskCache, LruDiskCacheOptions};

/// Default copy buffer size.
pub const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;

/// A stop request from a copy listener is ignored once this share of the total was copied.
pub const CONTINUE_LOADING_PERCENTAGE: u64 = 75;

const TEMP_FILE_SUFFIX: &str = ".tmp";

/// Removes the cached file for `uri`. Returns true if a file was removed.
pub async fn remove_from_cache(cache: &dyn DiskCache, uri: &str) -> bool {
    let removed = cache.remove(uri).await;
    if removed {
        debug!(uri, "Removed image from disk cache");
    }
    removed
}

/// Copies `reader` into `writer`, reporting progress to `listener`.
///
/// Returns `Ok(false)` if the listener stopped the copy. A stop request is
/// only honoured while less than [`CONTINUE_LOADING_PERCENTAGE`] of a known
/// total has been copied.
pub(crate) async fn copy_stream<R, W>(
    reader: &mut R,
    writer: &mut W,
    total: Option<u64>,
    listener: &mut dyn CopyListener,
    buffer_size: usize,
) -> io::Result<bool>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let total = total.unwrap_or(0);
    let mut current = 0u64;
    if should_stop(listener, current, total) {
        return Ok(false);
    }

    let mut buffer = vec![0u8; buffer_size.max(1)];
    loop {
        let read = reader.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        writer.write_all(&buffer[..read]).await?;
        current += read as u64;
        if should_stop(listener, current, total) {
            return Ok(false);
        }
    }
    writer.flush().await?;
    Ok(true)
}

fn should_stop(listener: &mut dyn CopyListener, current: u64, total: u64) -> bool {
    if listener.on_bytes_copied(current, total) {
        return false;
    }
    total == 0 || current * 100 / total < CONTINUE_LOADING_PERCENTAGE
}

/// Streams `stream` into a temporary file inside `dir`.
///
/// Returns the temporary path and the byte count, or `None` if the listener
/// stopped the copy. The temporary file is deleted when the returned path is
/// dropped without being persisted.
pub(crate) async fn write_temp_file(
    dir: &Path,
    name: &str,
    mut stream: ImageStream,
    listener: &mut dyn CopyListener,
    buffer_size: usize,
) -> io::Result<Option<(tempfile::TempPath, u64)>> {
    let (dir, prefix) = (dir.to_path_buf(), name.to_string());
    let temp = tokio::task::spawn_blocking(move || {
        tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(TEMP_FILE_SUFFIX)
            .tempfile_in(dir)
    })
    .await
    .map_err(io::Error::other)??;
    let (file, path) = temp.into_parts();
    let mut file = tokio::fs::File::from_std(file);

    let total = stream.length();
    let copied = copy_stream(stream.reader(), &mut file, total, listener, buffer_size).await?;
    if !copied {
        return Ok(None);
    }
    file.sync_all().await?;
    let written = file.metadata().await?.len();
    Ok(Some((path, written)))
}

/// Writes `bytes` into a temporary file inside `dir`.
pub(crate) async fn write_temp_bytes(
    dir: &Path,
    name: &str,
    bytes: Vec<u8>,
) -> io::Result<(tempfile::TempPath, u64)> {
    let len = bytes.len() as u64;
    let stream = ImageStream::from_bytes(bytes.into());
    let mut always = |_: u64, _: u64| true;
    write_temp_file(dir, name, stream, &mut always, DEFAULT_BUFFER_SIZE)
        .await?
        .map(|(path, _)| (path, len))
        .ok_or_else(|| io::Error::other("in-memory copy was stopped"))
}

/// Renames a finished temporary file to `target`, replacing any previous file.
pub(crate) async fn persist_temp(temp: tempfile::TempPath, target: PathBuf) -> io::Result<()> {
    tokio::task::spawn_blocking(move || temp.persist(target).map_err(|e| e.error))
        .await
        .map_err(io::Error::other)?
}

/// Encodes `image` as PNG off the async runtime.
pub(crate) async fn encode_png(image: &DynamicImage) -> io::Result<Vec<u8>> {
    let image = image.clone();
    tokio::task::spawn_blocking(move || {
        let mut out = io::Cursor::new(Vec::new());
        image
            .write_to(&mut out, ImageFormat::Png)
            .map_err(io::Error::other)?;
        Ok(out.into_inner())
    })
    .await
    .map_err(io::Error::other)?
}

/// Creates `primary`, falling back to `reserve` once.
pub(crate) fn resolve_directory(primary: &Path, reserve: Option<&Path>) -> Option<PathBuf> {
    match ensure_directory(primary) {
        Ok(()) => Some(primary.to_path_buf()),
        Err(e) => {
            let Some(reserve) = reserve else {
                warn!(dir = %primary.display(), error = %e, "Cache directory is not usable");
                return None;
            };
            warn!(
                dir = %primary.display(),
                reserve = %reserve.display(),
                error = %e,
                "Cache directory is not usable, using reserve directory"
            );
            match ensure_directory(reserve) {
                Ok(()) => Some(reserve.to_path_buf()),
                Err(e) => {
                    warn!(dir = %reserve.display(), error = %e, "Reserve cache directory is not usable");
                    None
                }
            }
        }
    }
}

fn ensure_directory(dir: &Path) -> io::Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    std::fs::create_dir_all(dir)
}
