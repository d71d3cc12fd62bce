//! Action dispatch: validation, the one-in-flight rule, and how the
//! detached gateway call folds back into pending state and the cache.

mod common;

use common::{test_config, RecordingSurface, Scripted, StubGateway};
use deckhand::dispatch::{DispatchOrigin, DispatchRejection};
use deckhand::render::{CardKind, RenderContext};
use deckhand::surface::{LocationId, SurfaceId};
use deckhand::{ContainerAction, ContainerId, DeckhandCore};
use std::sync::Arc;
use std::time::Duration;

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

fn ops_origin(surface: &str) -> DispatchOrigin {
    DispatchOrigin::Surface {
        location: LocationId::from("ops"),
        surface: Some(SurfaceId::new(surface.to_string())),
    }
}

fn control_ctx() -> RenderContext {
    RenderContext {
        expanded: true,
        allow_controls: true,
        allow_toggle: true,
    }
}

/// Let spawned completion tasks run.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn dispatch_from_a_status_only_location_is_rejected() {
    let (core, gateway, _surface) = build_core();

    let origin = DispatchOrigin::Surface {
        location: LocationId::from("lobby"),
        surface: None,
    };
    let rejection = core
        .dispatch_action(
            &ContainerId::from("web"),
            ContainerAction::Stop,
            "alice",
            &origin,
        )
        .await
        .unwrap_err();

    assert_eq!(rejection, DispatchRejection::PermissionDenied);
    // Rejection must not mutate anything.
    assert!(core.pending().is_empty().await);
    assert!(gateway.acted().is_empty());
}

#[tokio::test]
async fn disallowed_action_is_rejected() {
    let (core, _gateway, _surface) = build_core();

    // db only allows start.
    let rejection = core
        .dispatch_action(
            &ContainerId::from("db"),
            ContainerAction::Stop,
            "alice",
            &ops_origin("s1"),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        rejection,
        DispatchRejection::ActionNotAllowed { .. }
    ));
    assert!(core.pending().is_empty().await);
}

#[tokio::test]
async fn unknown_container_is_rejected() {
    let (core, _gateway, _surface) = build_core();

    let rejection = core
        .dispatch_action(
            &ContainerId::from("ghost"),
            ContainerAction::Start,
            "alice",
            &ops_origin("s1"),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        rejection,
        DispatchRejection::UnknownContainer { .. }
    ));
}

#[tokio::test]
async fn second_action_while_pending_is_rejected() {
    let (core, gateway, _surface) = build_core();
    gateway.set_state("web-1", Scripted::Running);
    // Keep the first action unresolved.
    gateway.timeout_actions("web-1");

    core.dispatch_action(
        &ContainerId::from("web"),
        ContainerAction::Stop,
        "alice",
        &ops_origin("s1"),
    )
    .await
    .unwrap();

    let rejection = core
        .dispatch_action(
            &ContainerId::from("web"),
            ContainerAction::Restart,
            "bob",
            &ops_origin("s1"),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        rejection,
        DispatchRejection::ActionInProgress {
            action: ContainerAction::Stop,
            ..
        }
    ));
}

#[tokio::test]
async fn accepted_dispatch_pushes_pending_and_fires_the_gateway() {
    let (core, gateway, surface) = build_core();
    gateway.set_state("web-1", Scripted::Running);
    core.force_refresh_all().await.unwrap();

    let target = SurfaceId::new("chat-7");
    let origin = DispatchOrigin::Surface {
        location: LocationId::from("ops"),
        surface: Some(target.clone()),
    };

    let ack = core
        .dispatch_action(&ContainerId::from("web"), ContainerAction::Stop, "alice", &origin)
        .await
        .unwrap();
    assert_eq!(ack.action, ContainerAction::Stop);

    settle().await;

    // The gateway saw the real container name.
    assert_eq!(gateway.acted(), vec![("web-1".to_string(), ContainerAction::Stop)]);

    // First push to the surface was the pending card.
    let pushes = surface.pushes_to(&target);
    assert!(!pushes.is_empty());
    assert_eq!(pushes[0].kind, CardKind::Pending);

    // The container still reports running, so the stop stays pending
    // until a later read observes the end-state.
    assert!(core.pending().get(&ContainerId::from("web")).await.is_some());

    // Container finally stops; the next sweep resolves the action.
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
async fn definitive_gateway_failure_clears_pending_and_notifies() {
    let (core, gateway, surface) = build_core();
    gateway.set_state("web-1", Scripted::Running);
    gateway.fail_actions("web-1", "exec failed");
    core.force_refresh_all().await.unwrap();

    let target = SurfaceId::new("chat-9");
    let origin = DispatchOrigin::Surface {
        location: LocationId::from("ops"),
        surface: Some(target.clone()),
    };

    core.dispatch_action(&ContainerId::from("web"), ContainerAction::Stop, "alice", &origin)
        .await
        .unwrap();

    settle().await;

    // Failure resolved the pending state immediately.
    assert!(core.pending().is_empty().await);

    // The surface got a human-readable failure notice.
    let pushes = surface.pushes_to(&target);
    assert!(pushes.iter().any(|card| card.kind == CardKind::Error
        && card.body.contains("stop failed")));

    // The cache still holds the last truth: the container runs, and the
    // controls come back.
    let card = core
        .get_render(&ContainerId::from("web"), &control_ctx())
        .await;
    assert!(card.running);
    assert_eq!(
        card.actions,
        vec![ContainerAction::Stop, ContainerAction::Restart]
    );
}

#[tokio::test]
async fn gateway_timeout_leaves_pending_for_reconciliation() {
    let (core, gateway, _surface) = build_core();
    gateway.set_state("web-1", Scripted::Running);
    gateway.timeout_actions("web-1");

    core.dispatch_action(
        &ContainerId::from("web"),
        ContainerAction::Restart,
        "alice",
        &ops_origin("s1"),
    )
    .await
    .unwrap();

    settle().await;

    // Timed out, not failed: still pending, awaiting observed state.
    assert!(core.pending().get(&ContainerId::from("web")).await.is_some());
}

#[tokio::test]
async fn automation_origin_bypasses_location_capability() {
    let (core, gateway, _surface) = build_core();
    gateway.set_state("web-1", Scripted::Stopped);

    core.dispatch_action(
        &ContainerId::from("web"),
        ContainerAction::Start,
        "schedule:ops",
        &DispatchOrigin::Automation,
    )
    .await
    .unwrap();

    settle().await;
    assert_eq!(
        gateway.acted(),
        vec![("web-1".to_string(), ContainerAction::Start)]
    );
}
