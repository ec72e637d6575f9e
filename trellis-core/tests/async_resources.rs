//! Async Resource Integration Tests
//!
//! Tests asynchronous scene construction:
//! - Concurrent resolution of image sources
//! - Failure discards the staged tree
//! - Caller-driven abort

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::AbortHandle;
use tokio::sync::Barrier;
use trellis_core::{
    EntityKind, RasterBuffer, ResourceLoader, SceneConfig, SceneDocument, SceneError,
    SceneResult, Transformable,
};

/// Loader whose loads only complete once `parties` loads are in flight.
struct RendezvousLoader {
    barrier: Arc<Barrier>,
}

#[async_trait]
impl ResourceLoader for RendezvousLoader {
    async fn load(&self, src: &str) -> SceneResult<RasterBuffer> {
        self.barrier.wait().await;
        let side = u32::try_from(src.len()).unwrap_or(1);
        Ok(RasterBuffer::new(side, 1))
    }
}

/// Loader that fails one source and never finishes the others.
struct FailingLoader;

#[async_trait]
impl ResourceLoader for FailingLoader {
    async fn load(&self, src: &str) -> SceneResult<RasterBuffer> {
        if src == "broken.png" {
            return Err(SceneError::ResourceLoad {
                src: src.to_string(),
                reason: "corrupt".to_string(),
            });
        }
        futures::future::pending().await
    }
}

fn two_image_document() -> SceneDocument {
    serde_json::from_str(
        r#"{"objects":[
            {"type":"image","src":"a.png"},
            {"type":"group","objects":[{"type":"image","src":"broken.png"}]}
        ]}"#,
    )
    .expect("document")
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[tokio::test]
async fn test_images_resolve_concurrently() {
    init_tracing();
    let loader = RendezvousLoader {
        barrier: Arc::new(Barrier::new(2)),
    };
    let scene = two_image_document()
        .into_scene_async(SceneConfig::default(), &loader, None)
        .await
        .expect("both loads rendezvous");

    let mut widths: Vec<f64> = scene
        .entities()
        .filter(|e| matches!(&e.kind, EntityKind::Image(i) if i.is_loaded()))
        .map(|e| e.geometry().width)
        .collect();
    widths.sort_by(f64::total_cmp);
    assert_eq!(widths, vec![5.0, 10.0]);
}

#[tokio::test]
async fn test_failure_discards_tree() {
    init_tracing();
    let err = two_image_document()
        .into_scene_async(SceneConfig::default(), &FailingLoader, None)
        .await
        .unwrap_err();
    assert!(matches!(err, SceneError::ResourceLoad { src, .. } if src == "broken.png"));
}

#[tokio::test]
async fn test_abort_cancels_construction() {
    init_tracing();
    let (handle, registration) = AbortHandle::new_pair();
    handle.abort();
    let doc: SceneDocument =
        serde_json::from_str(r#"{"objects":[{"type":"image","src":"slow.png"}]}"#)
            .expect("document");
    let err = doc
        .into_scene_async(SceneConfig::default(), &FailingLoader, Some(registration))
        .await
        .unwrap_err();
    assert!(matches!(err, SceneError::Aborted));
    assert_eq!(err.kind(), trellis_core::ErrorKind::Cancelled);
}

#[tokio::test]
async fn test_load_image_on_live_scene() {
    let loader = trellis_core::MemoryLoader::new().with("logo.png", RasterBuffer::new(8, 4));
    let mut scene = trellis_core::Scene::new();
    let id = scene.add(trellis_core::Entity::image("logo.png"));
    scene.load_image(id, &loader).await.expect("load");
    let g = scene.entity(id).expect("image").geometry();
    assert_eq!((g.width, g.height), (8.0, 4.0));

    let rect = scene.add(trellis_core::Entity::rect(1.0, 1.0));
    assert!(scene.load_image(rect, &loader).await.is_err());
}
