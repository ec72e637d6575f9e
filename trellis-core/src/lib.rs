//! # Trellis Core
//!
//! Retained-mode 2D scene graph: entities with affine transforms, nested
//! groups with automatic layout, dirty tracking for render caches, and a
//! serializable document format.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                trellis-core                 │
//! ├─────────────────────────────────────────────┤
//! │  Scene Arena     │  Layout Engine           │
//! │  - Entities      │  - Fit content           │
//! │  - Parent links  │  - Clip path             │
//! │  - Hit testing   │  - Batch / flush         │
//! ├─────────────────────────────────────────────┤
//! │  Matrix Utility  │  Documents               │
//! │  - Compose       │  - JSON schema           │
//! │  - Decompose     │  - Async resources       │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Painting lives in `trellis-renderer`; this crate only defines the
//! [`Surface`] contract entity draw logic is written against.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod element;
pub mod error;
pub mod geometry;
pub mod group;
mod layout;
pub mod matrix;
pub mod observer;
pub mod property;
pub mod resource;
pub mod scene;
pub mod schema;
pub mod shapes;
pub mod style;
pub mod surface;

pub use config::SceneConfig;
pub use element::{
    apply_transform_to_entity, straighten_angle, Cacheable, Corners, DirtyState, ElementId,
    Entity, EntityKind, Geometry, OriginX, OriginY, RenderCache, Transformable,
};
pub use error::{ErrorKind, SceneError, SceneResult};
pub use geometry::{bounding_box_from_points, BoundingBox, Point};
pub use group::{Container, Group, LayoutStrategy};
pub use matrix::{Matrix, TransformComponents};
pub use observer::{SceneEvent, SceneObserver};
pub use property::Property;
pub use resource::{MemoryLoader, ResourceLoader};
pub use scene::{AddChildOptions, Disposed, Placement, Scene};
pub use schema::{EntityDocument, SceneDocument};
pub use shapes::{Drawable, PathCommand};
pub use style::{FillRule, Paint, ResolvedPaint, Rgba, Style};
pub use surface::{RasterBuffer, Surface};

/// Trellis core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
