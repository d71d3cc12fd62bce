//! End-to-end walks through the status core: sweep → cache → render,
//! with the pending tracker in the loop.

mod common;

use chrono::{Duration, Utc};
use common::{test_config, RecordingSurface, Scripted, StubGateway};
use deckhand::render::{CardKind, RenderContext};
use deckhand::{ContainerAction, ContainerId, DeckhandCore};
use std::sync::Arc;

fn control_ctx() -> RenderContext {
    RenderContext {
        expanded: true,
        allow_controls: true,
        allow_toggle: true,
    }
}

fn build_core() -> (DeckhandCore, Arc<StubGateway>, Arc<RecordingSurface>) {
    let gateway = Arc::new(StubGateway::new());
    let surface = Arc::new(RecordingSurface::new());
    let core = DeckhandCore::new(
        test_config(),
        Arc::clone(&gateway) as Arc<dyn deckhand::runtime::RuntimeGateway>,
        Arc::clone(&surface) as Arc<dyn deckhand::surface::SurfacePlatform>,
    );
    (core, gateway, surface)
}

#[tokio::test]
async fn missing_cache_entry_renders_loading_without_actions() {
    let (core, _gateway, _surface) = build_core();

    let card = core
        .get_render(&ContainerId::from("web"), &control_ctx())
        .await;

    assert_eq!(card.kind, CardKind::Loading);
    assert!(card.actions.is_empty());
}

#[tokio::test]
async fn sweep_populates_cache_and_render_shows_details() {
    let (core, gateway, _surface) = build_core();
    gateway.set_state("web-1", Scripted::Running);

    core.force_refresh_all().await.unwrap();

    let card = core
        .get_render(&ContainerId::from("web"), &control_ctx())
        .await;

    assert_eq!(card.kind, CardKind::Status);
    assert!(card.running);
    assert!(card.body.contains("CPU: 2%"));
    assert!(card.body.contains("RAM: 50MiB"));
    assert_eq!(
        card.actions,
        vec![ContainerAction::Stop, ContainerAction::Restart]
    );
}

#[tokio::test]
async fn failed_fetches_keep_the_last_good_entry() {
    let (core, gateway, _surface) = build_core();
    gateway.set_state("web-1", Scripted::Running);
    gateway.set_state("db-1", Scripted::Stopped);

    core.force_refresh_all().await.unwrap();
    let before = core.cache().get(&ContainerId::from("db")).await.unwrap();

    // db starts timing out; web keeps answering.
    gateway.set_state("db-1", Scripted::Fail);
    for _ in 0..3 {
        core.force_refresh_all().await.unwrap();
    }

    let after = core.cache().get(&ContainerId::from("db")).await.unwrap();
    assert_eq!(after.snapshot, before.snapshot);
    assert_eq!(after.fetched_at, before.fetched_at);

    // web's entry kept moving forward the whole time.
    let web = core.cache().get(&ContainerId::from("web")).await.unwrap();
    assert!(web.fetched_at > before.fetched_at);
}

#[tokio::test]
async fn not_found_renders_offline_with_start_action() {
    let (core, gateway, _surface) = build_core();
    gateway.set_state("web-1", Scripted::NotFound);

    core.force_refresh_all().await.unwrap();

    let card = core
        .get_render(&ContainerId::from("web"), &control_ctx())
        .await;

    assert_eq!(card.kind, CardKind::Status);
    assert!(!card.running);
    assert!(card.body.contains("Offline"));
    assert_eq!(card.actions, vec![ContainerAction::Start]);
}

#[tokio::test]
async fn pending_suppresses_a_fresh_contradicting_cache_entry() {
    let (core, gateway, _surface) = build_core();
    gateway.set_state("web-1", Scripted::Running);
    core.force_refresh_all().await.unwrap();

    core.pending()
        .begin(
            ContainerId::from("web"),
            ContainerAction::Stop,
            "alice",
            Utc::now(),
        )
        .await
        .unwrap();

    let card = core
        .get_render(&ContainerId::from("web"), &control_ctx())
        .await;

    assert_eq!(card.kind, CardKind::Pending);
    assert!(card.actions.is_empty());
    assert!(!card.running);
}

#[tokio::test]
async fn pending_resolves_when_the_sweep_observes_the_end_state() {
    let (core, gateway, _surface) = build_core();
    gateway.set_state("web-1", Scripted::Running);
    core.force_refresh_all().await.unwrap();

    core.pending()
        .begin(
            ContainerId::from("web"),
            ContainerAction::Stop,
            "alice",
            Utc::now(),
        )
        .await
        .unwrap();

    gateway.set_state("web-1", Scripted::Stopped);
    core.force_refresh_all().await.unwrap();

    assert!(core.pending().get(&ContainerId::from("web")).await.is_none());
    let card = core
        .get_render(&ContainerId::from("web"), &control_ctx())
        .await;
    assert!(card.body.contains("Offline"));
    assert_eq!(card.actions, vec![ContainerAction::Start]);
}

#[tokio::test]
async fn unconfirmed_pending_is_force_cleared_after_the_window() {
    let (core, gateway, _surface) = build_core();
    gateway.set_state("web-1", Scripted::Running);
    core.force_refresh_all().await.unwrap();

    // A stop requested long ago that never took effect.
    let requested = Utc::now() - Duration::seconds(deckhand::status::PENDING_TIMEOUT_SECS + 10);
    core.pending()
        .begin(
            ContainerId::from("web"),
            ContainerAction::Stop,
            "alice",
            requested,
        )
        .await
        .unwrap();

    core.force_refresh_all().await.unwrap();

    assert!(core.pending().get(&ContainerId::from("web")).await.is_none());
    let card = core
        .get_render(&ContainerId::from("web"), &control_ctx())
        .await;
    assert_eq!(card.kind, CardKind::Status);
}

#[tokio::test]
async fn expired_pending_is_cleared_even_when_its_container_cannot_be_fetched() {
    let (core, gateway, _surface) = build_core();
    gateway.set_state("web-1", Scripted::Fail);

    let requested = Utc::now() - Duration::seconds(deckhand::status::PENDING_TIMEOUT_SECS + 10);
    core.pending()
        .begin(
            ContainerId::from("web"),
            ContainerAction::Start,
            "alice",
            requested,
        )
        .await
        .unwrap();

    core.force_refresh_all().await.unwrap();

    assert!(core.pending().is_empty().await);
}

#[tokio::test]
async fn overview_reflects_the_published_generation() {
    let (core, gateway, _surface) = build_core();
    gateway.set_state("web-1", Scripted::Running);
    gateway.set_state("db-1", Scripted::Stopped);

    core.force_refresh_all().await.unwrap();
    let card = core.overview().await;

    assert_eq!(card.kind, CardKind::Overview);
    assert!(card.body.contains("🟢 Online   web"));
    assert!(card.body.contains("🔴 Offline  db"));
}

#[tokio::test]
async fn overview_marks_pending_containers() {
    let (core, gateway, _surface) = build_core();
    gateway.set_state("web-1", Scripted::Running);
    core.force_refresh_all().await.unwrap();

    core.pending()
        .begin(
            ContainerId::from("web"),
            ContainerAction::Restart,
            "alice",
            Utc::now(),
        )
        .await
        .unwrap();

    let card = core.overview().await;
    assert!(card.body.contains("🟡 Pending  web"));
}
