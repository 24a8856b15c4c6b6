//! Hand-written test doubles for the ports.

use std::collections::{HashMap, HashSet};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, ImageFormat, RgbaImage};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc;

use super::{ExtraParams, ImageAware, ImageLoadingListener, ImageStream, ProgressListener, Transport};
use crate::domain::entities::{ImageSize, ImageSource, LoadedImage, Scheme, TargetId};
use crate::domain::errors::{FailReason, FailType, LoadError};

/// Encodes a solid `width` x `height` PNG.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
        width,
        height,
        image::Rgba([200, 40, 40, 255]),
    ));
    let mut out = io::Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

/// Transport serving in-memory resources, counting every open.
#[derive(Default)]
pub struct MockTransport {
    resources: Mutex<HashMap<String, Vec<u8>>>,
    failing: Mutex<HashSet<String>>,
    opens: Mutex<Vec<String>>,
    headers: Mutex<Vec<ExtraParams>>,
    delay: Mutex<Duration>,
    chunk_size: Mutex<Option<usize>>,
}

impl MockTransport {
    /// Creates an empty transport.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Serves `bytes` for `uri`.
    pub fn insert(&self, uri: &str, bytes: Vec<u8>) {
        self.resources.lock().insert(uri.to_string(), bytes);
    }

    /// Makes `open(uri)` fail with an i/o error.
    pub fn fail(&self, uri: &str) {
        self.failing.lock().insert(uri.to_string());
    }

    /// Sleeps before answering each open.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    /// Streams bodies in chunks of `size` bytes.
    pub fn set_chunk_size(&self, size: usize) {
        *self.chunk_size.lock() = Some(size);
    }

    /// Number of opens for `uri`.
    pub fn open_count(&self, uri: &str) -> usize {
        self.opens.lock().iter().filter(|u| *u == uri).count()
    }

    /// Number of opens for remote URIs.
    pub fn remote_open_count(&self) -> usize {
        self.opens
            .lock()
            .iter()
            .filter(|u| Scheme::of(u).is_remote())
            .count()
    }

    /// Extra parameters seen by each open, in order.
    pub fn seen_headers(&self) -> Vec<ExtraParams> {
        self.headers.lock().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(
        &self,
        uri: &str,
        extra: Option<&ExtraParams>,
    ) -> Result<Option<ImageStream>, LoadError> {
        self.opens.lock().push(uri.to_string());
        if let Some(extra) = extra {
            self.headers.lock().push(extra.clone());
        }
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().contains(uri) {
            return Err(LoadError::io(format!("mock failure for {uri}")));
        }
        if Scheme::of(uri) == Scheme::File {
            let bytes = tokio::fs::read(Scheme::File.crop(uri)).await?;
            return Ok(Some(ImageStream::from_bytes(Bytes::from(bytes))));
        }
        let Some(bytes) = self.resources.lock().get(uri).cloned() else {
            return Err(LoadError::io(format!("mock resource not found: {uri}")));
        };
        let chunk_size = *self.chunk_size.lock();
        Ok(Some(match chunk_size {
            Some(size) => {
                let length = bytes.len() as u64;
                let chunks: Vec<io::Result<Bytes>> = bytes
                    .chunks(size)
                    .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
                    .collect();
                ImageStream::new(
                    tokio_util::io::StreamReader::new(futures_util::stream::iter(chunks)),
                    Some(length),
                )
            }
            None => ImageStream::from_bytes(Bytes::from(bytes)),
        }))
    }
}

/// Reader that yields `prefix` and then fails.
pub struct FailingReader {
    prefix: Vec<u8>,
    served: bool,
}

impl FailingReader {
    /// Creates a reader failing after `prefix`.
    pub fn new(prefix: Vec<u8>) -> Self {
        Self {
            prefix,
            served: false,
        }
    }
}

impl AsyncRead for FailingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.served {
            return Poll::Ready(Err(io::Error::other("simulated read failure")));
        }
        self.served = true;
        let prefix = std::mem::take(&mut self.prefix);
        buf.put_slice(&prefix);
        Poll::Ready(Ok(()))
    }
}

static NEXT_TEST_TARGET: AtomicU64 = AtomicU64::new(1);

/// Display target recording every image it is given.
pub struct TestTarget {
    id: TargetId,
    size: ImageSize,
    collected: AtomicBool,
    images: Mutex<Vec<Option<Arc<DynamicImage>>>>,
}

impl TestTarget {
    /// Creates a target with a unique id.
    pub fn new(size: ImageSize) -> Arc<Self> {
        Arc::new(Self {
            id: TargetId(NEXT_TEST_TARGET.fetch_add(1, Ordering::Relaxed)),
            size,
            collected: AtomicBool::new(false),
            images: Mutex::new(Vec::new()),
        })
    }

    /// Marks the target as collected.
    pub fn collect(&self) {
        self.collected.store(true, Ordering::SeqCst);
    }

    /// Every value passed to `set_image`, in order.
    pub fn images(&self) -> Vec<Option<Arc<DynamicImage>>> {
        self.images.lock().clone()
    }

    /// Last non-empty image shown.
    pub fn last_image(&self) -> Option<Arc<DynamicImage>> {
        self.images.lock().iter().rev().find_map(Clone::clone)
    }
}

impl ImageAware for TestTarget {
    fn id(&self) -> TargetId {
        self.id
    }

    fn size(&self) -> ImageSize {
        self.size
    }

    fn is_collected(&self) -> bool {
        self.collected.load(Ordering::SeqCst)
    }

    fn set_image(&self, image: Option<Arc<DynamicImage>>) -> bool {
        if self.is_collected() {
            return false;
        }
        self.images.lock().push(image);
        true
    }
}

/// A listener callback, flattened for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerEvent {
    /// `on_loading_started`.
    Started(String),
    /// `on_loading_failed`.
    Failed(String, FailType),
    /// `on_loading_complete` with the image source, `None` for empty URIs.
    Complete(String, Option<ImageSource>),
    /// `on_loading_cancelled`.
    Cancelled(String),
}

impl ListenerEvent {
    /// Returns true for terminal events.
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Started(_))
    }
}

/// Listener forwarding every event to a channel.
pub struct RecordingListener {
    events: mpsc::UnboundedSender<ListenerEvent>,
}

impl RecordingListener {
    /// Creates a listener and the receiving end of its events.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ListenerEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { events }), rx)
    }
}

impl ImageLoadingListener for RecordingListener {
    fn on_loading_started(&self, uri: &str) {
        let _ = self.events.send(ListenerEvent::Started(uri.to_string()));
    }

    fn on_loading_failed(&self, uri: &str, reason: &FailReason) {
        let _ = self
            .events
            .send(ListenerEvent::Failed(uri.to_string(), reason.kind()));
    }

    fn on_loading_complete(&self, uri: &str, image: Option<&LoadedImage>) {
        let _ = self.events.send(ListenerEvent::Complete(
            uri.to_string(),
            image.map(|loaded| loaded.source),
        ));
    }

    fn on_loading_cancelled(&self, uri: &str) {
        let _ = self.events.send(ListenerEvent::Cancelled(uri.to_string()));
    }
}

/// Receives the next terminal event, skipping `Started`.
pub async fn next_terminal(rx: &mut mpsc::UnboundedReceiver<ListenerEvent>) -> ListenerEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = rx.recv().await.expect("listener channel closed");
            if event.is_terminal() {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for a terminal event")
}

/// Progress listener recording every update.
#[derive(Default)]
pub struct RecordingProgress {
    updates: Mutex<Vec<(u64, u64)>>,
}

impl RecordingProgress {
    /// Recorded `(current, total)` pairs.
    pub fn updates(&self) -> Vec<(u64, u64)> {
        self.updates.lock().clone()
    }
}

impl ProgressListener for RecordingProgress {
    fn on_progress_update(&self, _uri: &str, current: u64, total: u64) {
        self.updates.lock().push((current, total));
    }
}
