//! Raster Pipeline Integration Tests
//!
//! Tests painting onto pixels with the tiny-skia surface:
//! - Cached and direct painting produce the same pixels
//! - Clip paths mask content
//! - Data URI images load, decode and paint

#![cfg(feature = "raster")]

use trellis_core::{Entity, Paint, Property, Scene};
use trellis_renderer::{CacheConfig, PaintConfig, Painter, RasterSurface};

const RED: [u8; 4] = [255, 0, 0, 255];
const CLEAR: [u8; 4] = [0, 0, 0, 0];

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn painter(object_caching: bool) -> Painter {
    Painter::new(PaintConfig {
        cache: CacheConfig {
            object_caching,
            ..CacheConfig::default()
        },
        ..PaintConfig::default()
    })
}

fn red_rect(width: f64, height: f64) -> Entity {
    Entity::rect(width, height).with_fill(Paint::color("red"))
}

// ============================================================================
// Shapes
// ============================================================================

#[test]
fn test_rect_pixels_cached_and_direct() {
    init_tracing();
    for caching in [false, true] {
        let mut scene = Scene::new();
        scene.add(red_rect(10.0, 10.0).with_position(2.0, 2.0));
        let mut surface = RasterSurface::new(20, 20).expect("surface");
        let report = painter(caching).paint(&mut scene, &mut surface);
        assert!(report.is_ok());
        assert_eq!(report.regenerated, usize::from(caching));

        assert_eq!(surface.pixel(5, 5), Some(RED), "caching {caching}");
        assert_eq!(surface.pixel(11, 11), Some(RED), "caching {caching}");
        assert_eq!(surface.pixel(0, 0), Some(CLEAR), "caching {caching}");
        assert_eq!(surface.pixel(15, 15), Some(CLEAR), "caching {caching}");
    }
}

#[test]
fn test_cache_hit_repaints_same_pixels() {
    let mut scene = Scene::new();
    scene.add(red_rect(8.0, 8.0).with_position(4.0, 4.0));
    let mut painter = painter(true);

    let mut first = RasterSurface::new(16, 16).expect("surface");
    painter.paint(&mut scene, &mut first);
    let mut second = RasterSurface::new(16, 16).expect("surface");
    let report = painter.paint(&mut scene, &mut second);

    assert_eq!(report.cache_hits, 1);
    assert_eq!(first.pixmap().data(), second.pixmap().data());
}

#[test]
fn test_half_opacity_blends() {
    let mut scene = Scene::new();
    scene.add(
        red_rect(10.0, 10.0)
            .with(Property::Opacity(0.5))
            .expect("opacity"),
    );
    let mut surface = RasterSurface::new(10, 10).expect("surface");
    painter(false).paint(&mut scene, &mut surface);

    let [r, g, b, a] = surface.pixel(5, 5).expect("pixel");
    assert_eq!((g, b), (0, 0));
    assert!(r > 250);
    assert!((126..=129).contains(&a), "alpha {a}");
}

// ============================================================================
// Clipping
// ============================================================================

#[test]
fn test_clip_masks_content() {
    for caching in [false, true] {
        let mut scene = Scene::new();
        let clip = Entity::rect(10.0, 10.0).with_position(-5.0, -5.0);
        scene.add(red_rect(20.0, 20.0).with_clip_path(clip));
        let mut surface = RasterSurface::new(20, 20).expect("surface");
        let report = painter(caching).paint(&mut scene, &mut surface);
        assert!(report.is_ok());

        assert_eq!(surface.pixel(10, 10), Some(RED), "caching {caching}");
        assert_eq!(surface.pixel(2, 2), Some(CLEAR), "caching {caching}");
        assert_eq!(surface.pixel(17, 10), Some(CLEAR), "caching {caching}");
    }
}

// ============================================================================
// Images
// ============================================================================

#[cfg(feature = "images")]
mod images {
    use super::*;
    use base64::Engine;
    use trellis_core::{SceneConfig, SceneDocument};
    use trellis_renderer::DataUriLoader;

    fn red_png_uri(side: u32) -> String {
        let pixels = image::RgbaImage::from_pixel(side, side, image::Rgba([255, 0, 0, 255]));
        let mut bytes = Vec::new();
        pixels
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .expect("encode");
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(bytes)
        )
    }

    #[tokio::test]
    async fn test_data_uri_image_paints() {
        init_tracing();
        let json = format!(
            r#"{{"objects":[{{"type":"image","src":"{}"}}]}}"#,
            red_png_uri(4)
        );
        let document: SceneDocument = serde_json::from_str(&json).expect("document");
        let mut scene = document
            .into_scene_async(SceneConfig::default(), &DataUriLoader::new(), None)
            .await
            .expect("scene");

        let mut surface = RasterSurface::new(8, 8).expect("surface");
        let report = painter(true).paint(&mut scene, &mut surface);
        assert!(report.is_ok());
        assert_eq!(report.painted, 1);

        assert_eq!(surface.pixel(1, 1), Some(RED));
        assert_eq!(surface.pixel(6, 6), Some(CLEAR));
    }

    #[tokio::test]
    async fn test_undecodable_image_fails_scene() {
        let document: SceneDocument = serde_json::from_str(
            r#"{"objects":[{"type":"image","src":"data:image/png;base64,AAAA"}]}"#,
        )
        .expect("document");
        let result = document
            .into_scene_async(SceneConfig::default(), &DataUriLoader::new(), None)
            .await;
        assert!(matches!(
            result,
            Err(trellis_core::SceneError::ResourceLoad { .. })
        ));
    }
}
