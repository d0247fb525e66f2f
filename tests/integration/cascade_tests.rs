//! Integration tests for parent/child cascade behavior.
//!
//! Covers the coordinator's tracking filter, root-termination cascade,
//! app-host bubble-up, and the quiet paths for unrelated sessions.

use debug_marshal::models::session::SessionHandle;

use super::test_helpers::Rig;

#[tokio::test]
async fn ignores_children_of_other_parents() {
    let rig = Rig::new(5).await;
    let _root = rig.establish_root().await;

    let stranger = SessionHandle::new("stranger");
    rig.coordinator
        .on_session_started(stranger, Some("some-other-root"), false)
        .await;

    assert_eq!(rig.coordinator.child_count().await, 0);
    rig.shutdown().await;
}

#[tokio::test]
async fn ignores_start_events_without_a_root() {
    let rig = Rig::new(5).await;

    let orphan = SessionHandle::new("orphan");
    rig.coordinator
        .on_session_started(orphan, Some("anything"), false)
        .await;

    assert_eq!(rig.coordinator.child_count().await, 0);
    rig.shutdown().await;
}

#[tokio::test]
async fn root_termination_stops_every_child() {
    let rig = Rig::new(5).await;
    let root = rig.establish_root().await;

    let c1 = rig.track_child(&root, "api", false).await;
    let c2 = rig.track_child(&root, "worker", false).await;
    let c3 = rig.track_child(&root, "frontend", false).await;
    assert_eq!(rig.coordinator.child_count().await, 3);

    rig.coordinator.on_session_terminated(&root, Some(0)).await;

    let mut stopped = rig.host.stop_requests();
    stopped.sort();
    let mut expected = vec![c1.id, c2.id, c3.id];
    expected.sort();
    assert_eq!(stopped, expected);

    assert_eq!(rig.coordinator.child_count().await, 0);
    assert!(rig.coordinator.root().await.is_none());
    rig.shutdown().await;
}

#[tokio::test]
async fn cascade_survives_individual_stop_failures() {
    let rig = Rig::new(5).await;
    let root = rig.establish_root().await;

    let c1 = rig.track_child(&root, "api", false).await;
    let c2 = rig.track_child(&root, "worker", false).await;
    let c3 = rig.track_child(&root, "frontend", false).await;
    rig.host.fail_stop_for(&c2.id);

    rig.coordinator.on_session_terminated(&root, None).await;

    // All three stops were attempted despite the middle one failing.
    let mut stopped = rig.host.stop_requests();
    stopped.sort();
    let mut expected = vec![c1.id, c2.id, c3.id];
    expected.sort();
    assert_eq!(stopped, expected);

    assert_eq!(rig.coordinator.child_count().await, 0);
    assert!(rig.coordinator.root().await.is_none());
    rig.shutdown().await;
}

#[tokio::test]
async fn app_host_child_termination_stops_root() {
    let rig = Rig::new(5).await;
    let root = rig.establish_root().await;

    let app_host = rig.track_child(&root, "apphost", true).await;
    let tracked = rig.coordinator.tracked_children().await;
    assert_eq!(tracked.len(), 1);
    assert!(tracked[0].app_host);
    assert_eq!(tracked[0].parent_id, root.id);

    rig.coordinator
        .on_session_terminated(&app_host, Some(1))
        .await;

    assert_eq!(rig.host.stop_requests(), vec![root.id.clone()]);
    assert_eq!(rig.coordinator.child_count().await, 0);
    // The root slot only clears once its own terminate event arrives.
    assert_eq!(rig.coordinator.root().await.map(|r| r.id), Some(root.id));
    rig.shutdown().await;
}

#[tokio::test]
async fn ordinary_child_termination_is_quiet() {
    let rig = Rig::new(5).await;
    let root = rig.establish_root().await;

    let child = rig.track_child(&root, "worker", false).await;
    rig.coordinator.on_session_terminated(&child, Some(0)).await;

    assert!(rig.host.stop_requests().is_empty());
    assert_eq!(rig.coordinator.child_count().await, 0);
    assert!(rig.coordinator.root().await.is_some());
    rig.shutdown().await;
}

#[tokio::test]
async fn unknown_termination_changes_nothing() {
    let rig = Rig::new(5).await;
    let root = rig.establish_root().await;
    let _child = rig.track_child(&root, "worker", false).await;

    let unknown = SessionHandle::new("unknown");
    rig.coordinator.on_session_terminated(&unknown, None).await;

    assert!(rig.host.stop_requests().is_empty());
    assert_eq!(rig.coordinator.child_count().await, 1);
    assert!(rig.coordinator.root().await.is_some());
    rig.shutdown().await;
}

#[tokio::test]
async fn duplicate_root_termination_is_idempotent() {
    let rig = Rig::new(5).await;
    let root = rig.establish_root().await;
    let _child = rig.track_child(&root, "api", false).await;

    rig.coordinator.on_session_terminated(&root, Some(0)).await;
    let stops_after_first = rig.host.stop_requests().len();

    // A second terminate for the same root finds nothing tracked.
    rig.coordinator.on_session_terminated(&root, Some(0)).await;

    assert_eq!(rig.host.stop_requests().len(), stops_after_first);
    rig.shutdown().await;
}

#[tokio::test]
async fn end_to_end_composite_launch() {
    let rig = Rig::new(5).await;

    // Root R starts; children A (ordinary) and B (app host) start under it.
    let root = rig.establish_root().await;
    let a = rig.track_child(&root, "A", false).await;
    let b = rig.track_child(&root, "B", true).await;
    assert_eq!(rig.coordinator.child_count().await, 2);

    // B terminates: A stays tracked, one stop request goes to R.
    rig.coordinator.on_session_terminated(&b, Some(1)).await;
    assert_eq!(rig.coordinator.child_count().await, 1);
    assert_eq!(rig.host.stop_requests(), vec![root.id.clone()]);

    // R terminates: A receives a stop request and tracking is cleared.
    rig.coordinator.on_session_terminated(&root, None).await;
    assert_eq!(
        rig.host.stop_requests(),
        vec![root.id.clone(), a.id.clone()]
    );
    assert_eq!(rig.coordinator.child_count().await, 0);
    assert!(rig.coordinator.root().await.is_none());
    rig.shutdown().await;
}
