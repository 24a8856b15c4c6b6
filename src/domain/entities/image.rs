//! Domain types for image loading and caching.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// Width and height of an image or a display target, in pixels.
///
/// A zero dimension means "unknown".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ImageSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl ImageSize {
    /// Creates a new size.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns true if either dimension is unknown.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Multiplies both dimensions by `factor`, rounding to the nearest pixel.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn scale(self, factor: f32) -> Self {
        Self {
            width: (self.width as f32 * factor).round() as u32,
            height: (self.height as f32 * factor).round() as u32,
        }
    }

    /// Fills unknown dimensions from `max`.
    ///
    /// Used to derive the decode size of a target that has not been laid out.
    #[must_use]
    pub const fn or_max(self, max: Self) -> Self {
        Self {
            width: if self.width == 0 { max.width } else { self.width },
            height: if self.height == 0 {
                max.height
            } else {
                self.height
            },
        }
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for ImageSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (width, height) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
        let width = width
            .trim()
            .parse()
            .map_err(|e| format!("invalid width '{width}': {e}"))?;
        let height = height
            .trim()
            .parse()
            .map_err(|e| format!("invalid height '{height}': {e}"))?;
        Ok(Self { width, height })
    }
}

/// Memory cache key: the image URI joined with the decode target size.
///
/// The same URI decoded for two different target sizes yields two keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    const URI_AND_SIZE_SEPARATOR: char = '_';

    /// Builds the key for `uri` decoded at `size`.
    #[must_use]
    pub fn new(uri: &str, size: ImageSize) -> Self {
        Self(format!(
            "{uri}{}{size}",
            Self::URI_AND_SIZE_SEPARATOR
        ))
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if `key` was built for `uri`, at any size.
    #[must_use]
    pub fn matches_uri(key: &str, uri: &str) -> bool {
        key.strip_prefix(uri)
            .and_then(|rest| rest.strip_prefix(Self::URI_AND_SIZE_SEPARATOR))
            .is_some_and(|size| size.parse::<ImageSize>().is_ok())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// How a display target fits an image into its bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewScaleType {
    /// Scale so the whole image fits inside the target.
    FitInside,
    /// Scale so the image covers the target, cropping the overflow.
    #[default]
    Crop,
}

/// How the decoder scales an image relative to its target size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageScaleType {
    /// Keep the decoded image at its original size.
    None,
    /// Scale down to the target size, never up.
    #[default]
    Exactly,
    /// Scale to the target size, up or down.
    ExactlyStretched,
}

/// Source from which an image was loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageSource {
    /// Image was in memory cache.
    MemoryCache,
    /// Image was loaded from disk cache.
    DiskCache,
    /// Image was fetched through the transport.
    Network,
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MemoryCache => write!(f, "memory"),
            Self::DiskCache => write!(f, "disk"),
            Self::Network => write!(f, "network"),
        }
    }
}

/// A decoded image handed to listeners on completion.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    /// Memory cache key the image was resolved under.
    pub key: CacheKey,
    /// The decoded image data.
    pub image: Arc<DynamicImage>,
    /// Where the image came from.
    pub source: ImageSource,
}

impl LoadedImage {
    /// Creates a new loaded image.
    #[must_use]
    pub const fn new(key: CacheKey, image: Arc<DynamicImage>, source: ImageSource) -> Self {
        Self { key, image, source }
    }

    /// Returns the image dimensions.
    #[must_use]
    pub fn size(&self) -> ImageSize {
        ImageSize::new(self.image.width(), self.image.height())
    }
}

/// Stable identity of a display target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(pub u64);

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// URI schemes understood by the default transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// `http://`
    Http,
    /// `https://`
    Https,
    /// `file://`
    File,
    /// Anything else.
    Unknown,
}

impl Scheme {
    const fn prefix(self) -> &'static str {
        match self {
            Self::Http => "http://",
            Self::Https => "https://",
            Self::File => "file://",
            Self::Unknown => "",
        }
    }

    /// Detects the scheme of `uri`, case-insensitively.
    #[must_use]
    pub fn of(uri: &str) -> Self {
        [Self::Http, Self::Https, Self::File]
            .into_iter()
            .find(|scheme| {
                let prefix = scheme.prefix();
                uri.len() >= prefix.len()
                    && uri.is_char_boundary(prefix.len())
                    && uri[..prefix.len()].eq_ignore_ascii_case(prefix)
            })
            .unwrap_or(Self::Unknown)
    }

    /// Returns true for schemes that go over the network.
    #[must_use]
    pub const fn is_remote(self) -> bool {
        matches!(self, Self::Http | Self::Https)
    }

    /// Prefixes `path` with this scheme.
    #[must_use]
    pub fn wrap(self, path: &str) -> String {
        format!("{}{path}", self.prefix())
    }

    /// Prefixes a filesystem path with this scheme.
    #[must_use]
    pub fn wrap_path(self, path: &Path) -> String {
        self.wrap(&path.to_string_lossy())
    }

    /// Strips this scheme from `uri`. Returns `uri` unchanged if it has another scheme.
    #[must_use]
    pub fn crop(self, uri: &str) -> &str {
        if Self::of(uri) == self {
            &uri[self.prefix().len()..]
        } else {
            uri
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_cache_key_format() {
        let key = CacheKey::new("https://example.com/a.png", ImageSize::new(320, 240));
        assert_eq!(key.as_str(), "https://example.com/a.png_320x240");
    }

    #[test]
    fn test_cache_key_matches_uri_only_with_size_suffix() {
        let key = CacheKey::new("http://x/a", ImageSize::new(10, 20));
        assert!(CacheKey::matches_uri(key.as_str(), "http://x/a"));
        assert!(!CacheKey::matches_uri(key.as_str(), "http://x/"));
        assert!(!CacheKey::matches_uri("http://x/a_b", "http://x/a"));
    }

    #[test_case("320x240", Some(ImageSize::new(320, 240)) ; "plain")]
    #[test_case("64X64", Some(ImageSize::new(64, 64)) ; "uppercase separator")]
    #[test_case("64", None ; "missing height")]
    #[test_case("ax1", None ; "not a number")]
    fn test_image_size_parse(input: &str, expected: Option<ImageSize>) {
        assert_eq!(input.parse::<ImageSize>().ok(), expected);
    }

    #[test]
    fn test_or_max_fills_unknown_dimensions() {
        let max = ImageSize::new(800, 600);
        assert_eq!(ImageSize::new(0, 100).or_max(max), ImageSize::new(800, 100));
        assert_eq!(ImageSize::default().or_max(max), max);
    }

    #[test_case("http://a/b", Scheme::Http)]
    #[test_case("HTTPS://a/b", Scheme::Https)]
    #[test_case("file:///tmp/x", Scheme::File)]
    #[test_case("content://x", Scheme::Unknown)]
    fn test_scheme_detection(uri: &str, expected: Scheme) {
        assert_eq!(Scheme::of(uri), expected);
    }

    #[test]
    fn test_scheme_wrap_and_crop() {
        let uri = Scheme::File.wrap("/tmp/a.png");
        assert_eq!(uri, "file:///tmp/a.png");
        assert_eq!(Scheme::File.crop(&uri), "/tmp/a.png");
        assert_eq!(Scheme::File.crop("http://a"), "http://a");
    }

    #[test]
    fn test_image_source_display() {
        assert_eq!(ImageSource::MemoryCache.to_string(), "memory");
        assert_eq!(ImageSource::DiskCache.to_string(), "disk");
        assert_eq!(ImageSource::Network.to_string(), "network");
    }
}
