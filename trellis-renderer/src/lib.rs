//! # Trellis Renderer
//!
//! Paint driver for Trellis scenes: walks the entity tree back to front,
//! composes transforms, applies clip paths and keeps per-entity render
//! caches current.
//!
//! ## Rendering Backends
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │        Painter  +  CacheController          │
//! ├──────────────────────┬──────────────────────┤
//! │ Raster (tiny-skia)   │ Recording            │
//! │ (pixels)             │ (operation log)      │
//! └──────────────────────┴──────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod cache;
pub mod error;
#[cfg(feature = "images")]
pub mod image;
pub mod paint;

pub use backend::recording::{DrawOp, RecordingSurface};
pub use backend::{PathSegment, RenderBackend};
pub use cache::{CacheConfig, CacheController, CacheOutcome, CacheStats, FallbackReason, Zoom};
pub use error::{RenderError, RenderResult};
pub use paint::{CacheFallback, PaintFailure, PaintReport, Painter};

#[cfg(feature = "raster")]
pub use backend::raster::RasterSurface;
#[cfg(feature = "images")]
pub use image::DataUriLoader;

use serde::{Deserialize, Serialize};
use trellis_core::Scene;

/// Configuration for painting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PaintConfig {
    /// Render-cache limits and switches.
    pub cache: CacheConfig,
    /// Filters run on the GPU; image entities are then never cached.
    pub gpu_filtering: bool,
}

/// Configuration for the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RendererConfig {
    /// Preferred backend (will fall back if unavailable).
    pub preferred_backend: BackendType,
    /// Surface width in pixels.
    pub width: u32,
    /// Surface height in pixels.
    pub height: u32,
    /// Paint driver settings.
    pub paint: PaintConfig,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            preferred_backend: BackendType::Raster,
            width: 800,
            height: 600,
            paint: PaintConfig::default(),
        }
    }
}

/// Available rendering backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// CPU rasterization via tiny-skia (requires the `raster` feature).
    Raster,
    /// Operation log, no pixels.
    Recording,
}

/// The main renderer interface.
pub struct Renderer {
    config: RendererConfig,
    backend: Box<dyn RenderBackend>,
    painter: Painter,
    frame_count: u64,
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("config", &self.config)
            .field("backend", &self.backend.backend_type())
            .field("frame_count", &self.frame_count)
            .finish_non_exhaustive()
    }
}

impl Renderer {
    /// Create a new renderer with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface size is zero or cannot be allocated.
    pub fn new(config: RendererConfig) -> RenderResult<Self> {
        let backend = Self::create_backend(&config)?;
        let painter = Painter::new(config.paint.clone());

        Ok(Self {
            config,
            backend,
            painter,
            frame_count: 0,
        })
    }

    /// Create the appropriate backend based on config and availability.
    fn create_backend(config: &RendererConfig) -> RenderResult<Box<dyn RenderBackend>> {
        if config.width == 0 || config.height == 0 {
            return Err(RenderError::Surface(format!(
                "invalid surface size {}x{}",
                config.width, config.height
            )));
        }
        match config.preferred_backend {
            BackendType::Raster => {
                #[cfg(feature = "raster")]
                {
                    match RasterSurface::new(config.width, config.height) {
                        Ok(b) => return Ok(Box::new(b)),
                        Err(e) => {
                            tracing::warn!("Raster surface unavailable, falling back: {}", e);
                        }
                    }
                }
                #[cfg(not(feature = "raster"))]
                tracing::warn!("Raster backend not compiled in, falling back to recording");
                Self::create_backend(&RendererConfig {
                    preferred_backend: BackendType::Recording,
                    ..config.clone()
                })
            }
            BackendType::Recording => Ok(Box::new(RecordingSurface::new(
                config.width,
                config.height,
            ))),
        }
    }

    /// Clear the surface and paint a frame.
    pub fn render(&mut self, scene: &mut Scene) -> PaintReport {
        self.backend.clear();
        let report = self.painter.paint(scene, self.backend.as_surface());
        self.frame_count += 1;
        report
    }

    /// Get the current frame count.
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Get the active backend type.
    #[must_use]
    pub fn active_backend(&self) -> BackendType {
        self.backend.backend_type()
    }

    /// The surface frames are painted onto.
    #[must_use]
    pub fn surface(&self) -> &dyn RenderBackend {
        self.backend.as_ref()
    }

    /// The paint driver, for cache statistics.
    #[must_use]
    pub fn painter(&self) -> &Painter {
        &self.painter
    }

    /// Get the renderer configuration.
    #[must_use]
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Resize the rendering surface.
    ///
    /// # Errors
    ///
    /// Returns an error if resize fails.
    pub fn resize(&mut self, width: u32, height: u32) -> RenderResult<()> {
        self.backend.resize(width, height)?;
        self.config.width = width;
        self.config.height = height;
        Ok(())
    }
}

/// Trellis renderer version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
