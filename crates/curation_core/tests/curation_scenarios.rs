mod support;

use curation_core::{CurationEvent, EditStatus, FailureKind, MembershipEdit};
use shared::domain::ItemId;

use support::{ids, open, test_settings, FakeBackend};

#[tokio::test]
async fn failed_add_is_rendered_then_restored_from_the_server() {
    let backend = FakeBackend::new();
    backend.add_container("home", &["s1", "s2"]).await;
    backend.add_songs(&["s1", "s2", "s3"]).await;
    let (session, _) = open(&backend, "home", &test_settings()).await;
    backend.fail_next_updates(1);

    let status = session
        .toggle_membership("s3".into())
        .await
        .expect("add s3");
    assert_eq!(status, EditStatus::Applied);

    let optimistic = session.view();
    assert_eq!(optimistic.member_ids, ids(&["s1", "s2", "s3"]));
    assert!(optimistic.is_mutating);
    assert!(optimistic
        .candidate_items
        .iter()
        .all(|item| item.id.as_str() != "s3"));

    let settled = session.settled().await;
    assert_eq!(settled.member_ids, ids(&["s1", "s2"]));
    let failure = settled.last_error.expect("failure is surfaced");
    assert_eq!(failure.kind, FailureKind::Persist);
    assert_eq!(
        failure.discarded_edits,
        vec![MembershipEdit::Add(ItemId::from("s3"))]
    );
    assert_eq!(backend.update_calls().await, vec![ids(&["s1", "s2", "s3"])]);
    assert_eq!(backend.stored_members("home").await, ids(&["s1", "s2"]));
}

#[tokio::test]
async fn members_deleted_upstream_are_pruned_and_written_back_on_load() {
    let backend = FakeBackend::new();
    backend.add_container("home", &["a", "b", "c"]).await;
    backend.add_songs(&["a", "b", "c"]).await;
    backend.delete_item("b").await;

    let (session, report) = open(&backend, "home", &test_settings()).await;

    assert_eq!(report.pruned, ids(&["b"]));
    assert_eq!(report.member_count, 2);
    assert!(report.prune_error.is_none());
    let view = session.view();
    assert_eq!(view.member_ids, ids(&["a", "c"]));
    assert_eq!(view.resolved_members.len(), 2);
    assert!(!view.is_mutating);
    assert_eq!(backend.update_calls().await, vec![ids(&["a", "c"])]);
    assert_eq!(backend.stored_members("home").await, ids(&["a", "c"]));
}

#[tokio::test]
async fn quick_successive_edits_leave_as_one_call_with_the_final_order() {
    let backend = FakeBackend::new();
    backend.add_container("home", &["a"]).await;
    backend.add_songs(&["a", "x"]).await;
    let (session, _) = open(&backend, "home", &test_settings()).await;

    session
        .toggle_membership("x".into())
        .await
        .expect("add x");
    let status = session
        .submit(MembershipEdit::Reorder(ids(&["x", "a"])))
        .await
        .expect("reorder");
    assert_eq!(status, EditStatus::Applied);
    assert_eq!(session.view().member_ids, ids(&["x", "a"]));

    let settled = session.settled().await;

    assert_eq!(settled.member_ids, ids(&["x", "a"]));
    assert!(settled.last_error.is_none());
    assert_eq!(backend.update_calls().await, vec![ids(&["x", "a"])]);
}

#[tokio::test]
async fn dragging_onto_a_later_member_persists_the_moved_order() {
    let backend = FakeBackend::new();
    backend.add_container("home", &["A", "B", "C", "D"]).await;
    backend.add_songs(&["A", "B", "C", "D"]).await;
    let (session, _) = open(&backend, "home", &test_settings()).await;

    session
        .reorder(&"A".into(), &"C".into())
        .await
        .expect("drag");
    let settled = session.settled().await;

    assert_eq!(settled.member_ids, ids(&["B", "C", "A", "D"]));
    assert_eq!(backend.stored_members("home").await, ids(&["B", "C", "A", "D"]));
}

#[tokio::test]
async fn edits_made_while_a_call_is_out_follow_in_one_later_call() {
    let backend = FakeBackend::new();
    backend.add_container("home", &["a"]).await;
    backend.add_songs(&["a", "x", "y", "z"]).await;
    let (session, _) = open(&backend, "home", &test_settings()).await;
    backend.hold_updates().await;

    session.toggle_membership("x".into()).await.expect("add x");
    backend.update_started.notified().await;

    session.toggle_membership("y".into()).await.expect("add y");
    session.toggle_membership("z".into()).await.expect("add z");
    session.move_up(&"z".into()).await.expect("move z up");
    assert_eq!(session.view().member_ids, ids(&["a", "x", "z", "y"]));
    assert_eq!(backend.update_calls().await.len(), 1);

    backend.release_updates().await;
    let settled = session.settled().await;

    assert_eq!(settled.member_ids, ids(&["a", "x", "z", "y"]));
    assert_eq!(
        backend.update_calls().await,
        vec![ids(&["a", "x"]), ids(&["a", "x", "z", "y"])]
    );
}

#[tokio::test]
async fn member_deleted_by_another_operator_is_pruned_after_confirmation() {
    let backend = FakeBackend::new();
    backend.add_container("home", &["a"]).await;
    backend.add_songs(&["a", "x"]).await;
    let (session, _) = open(&backend, "home", &test_settings()).await;
    let mut events = session.subscribe_events();
    backend.inject_member_on_next_update("ghost").await;

    session.toggle_membership("x".into()).await.expect("add x");
    let settled = session.settled().await;

    assert_eq!(settled.member_ids, ids(&["a", "x"]));
    assert_eq!(settled.resolved_members.len(), 2);
    assert_eq!(
        backend.update_calls().await,
        vec![ids(&["a", "x"]), ids(&["a", "x"])]
    );

    let mut pruned = None;
    while let Ok(event) = events.try_recv() {
        if let CurationEvent::MembersPruned { pruned: dropped, .. } = event {
            pruned = Some(dropped);
        }
    }
    assert_eq!(pruned, Some(ids(&["ghost"])));
}

#[tokio::test]
async fn member_added_by_another_operator_is_resolved_into_the_view() {
    let backend = FakeBackend::new();
    backend.add_container("home", &["a"]).await;
    backend.add_songs(&["a", "x"]).await;
    let (session, _) = open(&backend, "home", &test_settings()).await;
    backend.add_songs(&["late"]).await;
    backend.inject_member_on_next_update("late").await;

    session.toggle_membership("x".into()).await.expect("add x");
    let settled = session.settled().await;

    assert_eq!(settled.member_ids, ids(&["a", "x", "late"]));
    let names: Vec<_> = settled
        .resolved_members
        .iter()
        .map(|item| item.name.as_str())
        .collect();
    assert_eq!(names, vec!["Song a", "Song x", "Song late"]);
    assert!(settled.candidate_items.is_empty());
}

#[tokio::test]
async fn edits_queued_during_a_call_are_replayed_on_the_servers_answer() {
    let backend = FakeBackend::new();
    backend.add_container("home", &["a"]).await;
    backend.add_songs(&["a", "x", "y"]).await;
    let (session, _) = open(&backend, "home", &test_settings()).await;
    backend.hold_updates().await;

    session.toggle_membership("x".into()).await.expect("add x");
    backend.update_started.notified().await;
    backend.add_songs(&["late"]).await;
    backend.inject_member_on_next_update("late").await;
    session.toggle_membership("y".into()).await.expect("add y");

    backend.release_updates().await;
    let settled = session.settled().await;

    assert_eq!(settled.member_ids, ids(&["a", "x", "late", "y"]));
    assert!(settled.last_error.is_none());
    assert_eq!(
        backend.update_calls().await,
        vec![ids(&["a", "x"]), ids(&["a", "x", "late", "y"])]
    );
    assert_eq!(
        backend.stored_members("home").await,
        ids(&["a", "x", "late", "y"])
    );
}

#[tokio::test]
async fn reorder_made_stale_by_the_servers_answer_is_reported_as_a_conflict() {
    let backend = FakeBackend::new();
    backend.add_container("home", &["a", "b"]).await;
    backend.add_songs(&["a", "b", "x"]).await;
    let (session, _) = open(&backend, "home", &test_settings()).await;
    let mut events = session.subscribe_events();
    backend.hold_updates().await;

    session.toggle_membership("x".into()).await.expect("add x");
    backend.update_started.notified().await;
    backend.add_songs(&["late"]).await;
    backend.inject_member_on_next_update("late").await;
    session.move_up(&"x".into()).await.expect("move x up");
    assert_eq!(session.view().member_ids, ids(&["a", "x", "b"]));

    backend.release_updates().await;
    let settled = session.settled().await;
    tokio::time::sleep(std::time::Duration::from_millis(80)).await;

    assert_eq!(settled.member_ids, ids(&["a", "b", "x", "late"]));
    let failure = settled.last_error.expect("conflict is surfaced");
    assert_eq!(failure.kind, FailureKind::Conflict);
    assert_eq!(
        failure.discarded_edits,
        vec![MembershipEdit::Reorder(ids(&["a", "x", "b"]))]
    );
    assert_eq!(backend.update_calls().await, vec![ids(&["a", "b", "x"])]);
    assert_eq!(
        backend.stored_members("home").await,
        ids(&["a", "b", "x", "late"])
    );

    let mut reported = None;
    while let Ok(event) = events.try_recv() {
        if let CurationEvent::PersistFailed { failure, .. } = event {
            reported = Some(failure.kind);
        }
    }
    assert_eq!(reported, Some(FailureKind::Conflict));
}

#[tokio::test]
async fn failed_lookup_of_a_new_member_is_surfaced() {
    let backend = FakeBackend::new();
    backend.add_container("home", &["a"]).await;
    backend.add_songs(&["a", "x"]).await;
    let (session, _) = open(&backend, "home", &test_settings()).await;
    backend.add_songs(&["late"]).await;
    backend.inject_member_on_next_update("late").await;
    backend.fail_lookups(true);

    session.toggle_membership("x".into()).await.expect("add x");
    let settled = session.settled().await;

    assert_eq!(settled.member_ids, ids(&["a", "x", "late"]));
    assert_eq!(settled.resolved_members.len(), 2);
    let failure = settled.last_error.expect("lookup failure is surfaced");
    assert_eq!(failure.kind, FailureKind::Resolve);
    assert!(!failure.is_retryable());
}
