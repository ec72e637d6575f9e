//! Asynchronous resolution of external resources such as image pixels.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::surface::RasterBuffer;
use crate::{SceneError, SceneResult};

/// Resolves a source URI into decoded pixels.
///
/// Implementations decide what a source means (data URIs, files, network
/// URLs). Loads may run concurrently.
#[async_trait]
pub trait ResourceLoader: Send + Sync {
    /// Fetch and decode `src`.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::ResourceLoad`] when the source cannot be
    /// fetched or decoded.
    async fn load(&self, src: &str) -> SceneResult<RasterBuffer>;
}

/// A loader serving preloaded pixels by exact source string.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    resources: HashMap<String, RasterBuffer>,
}

impl MemoryLoader {
    /// An empty loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register pixels for `src`.
    pub fn insert(&mut self, src: impl Into<String>, pixels: RasterBuffer) {
        self.resources.insert(src.into(), pixels);
    }

    /// Builder form of [`MemoryLoader::insert`].
    #[must_use]
    pub fn with(mut self, src: impl Into<String>, pixels: RasterBuffer) -> Self {
        self.insert(src, pixels);
        self
    }
}

#[async_trait]
impl ResourceLoader for MemoryLoader {
    async fn load(&self, src: &str) -> SceneResult<RasterBuffer> {
        self.resources
            .get(src)
            .cloned()
            .ok_or_else(|| SceneError::ResourceLoad {
                src: display_src(src),
                reason: "not found".to_string(),
            })
    }
}

/// Shorten a source for log and error messages; data URIs can be huge.
#[must_use]
pub fn display_src(src: &str) -> String {
    const MAX: usize = 64;
    match src.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &src[..idx]),
        None => src.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_loader() {
        let loader = MemoryLoader::new().with("a.png", RasterBuffer::new(2, 3));
        let pixels = loader.load("a.png").await.expect("present");
        assert_eq!((pixels.width, pixels.height), (2, 3));
        let err = loader.load("b.png").await.unwrap_err();
        assert!(matches!(err, SceneError::ResourceLoad { .. }));
    }

    #[test]
    fn test_display_src_truncates() {
        let long = format!("data:image/png;base64,{}", "A".repeat(500));
        let shown = display_src(&long);
        assert!(shown.len() < 80);
        assert!(shown.ends_with("..."));
        assert_eq!(display_src("short.png"), "short.png");
    }
}
