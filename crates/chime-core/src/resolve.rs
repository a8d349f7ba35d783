//! Locator resolution.
//!
//! A sound is identified by a locator string. The resolver maps it to a
//! local file the backend can open:
//!
//! - `file:///music/a.wav` → `/music/a.wav`
//! - `app://com.example/sounds/a.wav` → `<resource_root>/sounds/a.wav`
//! - `sounds/a.wav` (not a URL) → `sounds/a.wav`
//!
//! Network schemes are rejected; there is no streaming.

use std::path::{Component, Path, PathBuf};

use url::Url;

use crate::error::ResolveError;

/// Maps a locator to a local resource path.
pub trait LocatorResolver: Send + Sync {
    fn resolve(&self, locator: &str) -> Result<PathBuf, ResolveError>;
}

/// Resolver for `file://`, `app://` and plain path locators.
#[derive(Debug, Clone)]
pub struct UrlResolver {
    resource_root: PathBuf,
}

impl UrlResolver {
    /// `app://` locators resolve against `resource_root`.
    pub fn new(resource_root: impl Into<PathBuf>) -> Self {
        Self {
            resource_root: resource_root.into(),
        }
    }
}

impl Default for UrlResolver {
    fn default() -> Self {
        Self::new(".")
    }
}

impl LocatorResolver for UrlResolver {
    fn resolve(&self, locator: &str) -> Result<PathBuf, ResolveError> {
        let locator = locator.trim();
        if locator.is_empty() {
            return Err(ResolveError::Empty);
        }

        let url = match Url::parse(locator) {
            Ok(url) => url,
            // Relative paths carry no scheme
            Err(_) => return Ok(PathBuf::from(locator)),
        };

        // "C:\sounds\a.wav" parses with a one-letter scheme
        if url.scheme().len() == 1 {
            return Ok(PathBuf::from(locator));
        }

        match url.scheme() {
            "file" => url
                .to_file_path()
                .map_err(|()| ResolveError::NotAFilePath(locator.to_string())),
            "app" => {
                let mut path = self.resource_root.clone();
                let segments = url
                    .path_segments()
                    .ok_or_else(|| ResolveError::NotAFilePath(locator.to_string()))?;
                for segment in segments.filter(|s| !s.is_empty()) {
                    let decoded = urlencoding::decode(segment)
                        .map_err(|_| ResolveError::NotAFilePath(locator.to_string()))?;
                    if !is_plain_segment(&decoded) {
                        return Err(ResolveError::NotAFilePath(locator.to_string()));
                    }
                    path.push(decoded.as_ref());
                }
                if path == self.resource_root {
                    return Err(ResolveError::NotAFilePath(locator.to_string()));
                }
                Ok(path)
            }
            other => Err(ResolveError::UnsupportedScheme(other.to_string())),
        }
    }
}

/// A decoded `app://` segment must name exactly one entry below the root.
fn is_plain_segment(segment: &str) -> bool {
    if segment.contains(['/', '\\', '\0']) {
        return false;
    }
    let mut components = Path::new(segment).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
