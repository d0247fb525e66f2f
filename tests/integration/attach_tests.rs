//! Integration tests for the attach-mode secondary session.
//!
//! Covers supersession ordering (stop the old session before requesting the
//! new attach), stop-failure tolerance, and establishment failure cleanup.

use debug_marshal::models::session::DebugRequest;
use debug_marshal::AppError;

use super::test_helpers::{FakeOp, Rig};

#[tokio::test]
async fn first_attach_tracks_secondary_session() {
    let rig = Rig::new(5).await;

    let attached = rig
        .coordinator
        .attach(4242, None, &rig.cancel)
        .await
        .expect("attach establishes");

    assert_eq!(
        rig.coordinator.attached().await.map(|s| s.id),
        Some(attached.id)
    );

    let starts = rig.host.start_requests();
    assert_eq!(starts.len(), 1);
    assert_eq!(starts[0].request, DebugRequest::Attach);
    assert_eq!(starts[0].process_id, Some(4242));
    assert!(rig.host.stop_requests().is_empty());
    rig.shutdown().await;
}

#[tokio::test]
async fn second_attach_supersedes_the_first() {
    let rig = Rig::new(5).await;

    let first = rig
        .coordinator
        .attach(4242, None, &rig.cancel)
        .await
        .expect("first attach");
    let second = rig
        .coordinator
        .attach(5353, None, &rig.cancel)
        .await
        .expect("second attach");

    assert_ne!(first.id, second.id);
    assert_eq!(
        rig.coordinator.attached().await.map(|s| s.id),
        Some(second.id)
    );

    // Exactly one stop was issued, for the first handle, and it precedes
    // the second attach start request.
    let ops = rig.host.ops();
    let stop_positions: Vec<usize> = ops
        .iter()
        .enumerate()
        .filter_map(|(i, op)| match op {
            FakeOp::Stop(id) if *id == first.id => Some(i),
            _ => None,
        })
        .collect();
    assert_eq!(stop_positions.len(), 1);

    let second_start_position = ops
        .iter()
        .position(|op| matches!(op, FakeOp::Start(config) if config.process_id == Some(5353)))
        .expect("second attach start recorded");
    assert!(stop_positions[0] < second_start_position);
    rig.shutdown().await;
}

#[tokio::test]
async fn supersession_continues_when_old_stop_fails() {
    let rig = Rig::new(5).await;

    let first = rig
        .coordinator
        .attach(4242, None, &rig.cancel)
        .await
        .expect("first attach");
    rig.host.fail_stop_for(&first.id);

    let second = rig
        .coordinator
        .attach(5353, None, &rig.cancel)
        .await
        .expect("second attach despite stop failure");

    assert_eq!(
        rig.coordinator.attached().await.map(|s| s.id),
        Some(second.id)
    );
    rig.shutdown().await;
}

#[tokio::test]
async fn attach_source_root_reaches_the_host() {
    let rig = Rig::new(5).await;

    rig.coordinator
        .attach(4242, Some("/src/apphost".into()), &rig.cancel)
        .await
        .expect("attach establishes");

    let starts = rig.host.start_requests();
    assert_eq!(starts[0].source_root, Some("/src/apphost".into()));
    rig.shutdown().await;
}

#[tokio::test]
async fn attach_establishment_timeout_cleans_up() {
    let rig = Rig::new(1).await;
    rig.host.set_auto_emit_started(false);

    let result = rig.coordinator.attach(4242, None, &rig.cancel).await;

    assert!(matches!(result, Err(AppError::SessionStart(_))));
    assert!(rig.coordinator.attached().await.is_none());
    // The unestablished attach session received a best-effort stop.
    assert_eq!(rig.host.stop_requests().len(), 1);
    rig.shutdown().await;
}

#[tokio::test]
async fn external_termination_clears_the_attach_slot() {
    let rig = Rig::new(5).await;

    let attached = rig
        .coordinator
        .attach(4242, None, &rig.cancel)
        .await
        .expect("attach establishes");

    rig.coordinator
        .on_session_terminated(&attached, None)
        .await;

    assert!(rig.coordinator.attached().await.is_none());

    // A later attach starts fresh with no supersession stop.
    rig.coordinator
        .attach(5353, None, &rig.cancel)
        .await
        .expect("re-attach establishes");
    assert!(rig.host.stop_requests().is_empty());
    rig.shutdown().await;
}
