//! End-to-end behavior of a dashboard over the in-memory backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use notification_feed::{
    AmountForm, ApprovalStatus, AuthUser, BackendError, Banner, Dashboard, DashboardError,
    FeedState, Fields, InMemoryBackend, Navigator, NotificationRecord, ParseError, SessionHandle,
};
use serde_json::{Value, json};

const COLLECTION: &str = "pays";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn fields(value: Value) -> Fields {
    let Value::Object(map) = value else {
        panic!("fixture fields must be an object");
    };
    map
}

fn ids(records: &[NotificationRecord]) -> Vec<&str> {
    records.iter().map(|r| r.id.as_str()).collect()
}

async fn wait_for(dashboard: &Dashboard, pred: impl FnMut(&FeedState) -> bool) -> FeedState {
    let mut rx = dashboard.feed().subscribe();
    let state = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(pred))
        .await
        .expect("feed should reach the expected state in time")
        .expect("feed view alive")
        .clone();
    state
}

async fn next_generation(dashboard: &Dashboard, after: u64) -> FeedState {
    wait_for(dashboard, |s| s.generation > after).await
}

/// Seed `(id, createdDate, isHidden)` records, sign in, and wait for the
/// first snapshot.
async fn signed_in(records: &[(&str, &str, bool)]) -> (Arc<InMemoryBackend>, Dashboard, SessionHandle) {
    init_tracing();
    let backend = Arc::new(InMemoryBackend::new());
    for (id, created, hidden) in records {
        backend
            .insert(
                COLLECTION,
                id,
                fields(json!({ "createdDate": created, "isHidden": hidden, "page": "home" })),
            )
            .await;
    }
    backend.sign_in(AuthUser::new("operator"));

    let dashboard = Dashboard::builder(backend.clone()).build();
    let session = dashboard.start_session().await;
    next_generation(&dashboard, 0).await;
    (backend, dashboard, session)
}

fn assert_published_invariants(state: &FeedState) {
    assert!(
        state.records.iter().all(|r| !r.is_hidden),
        "hidden record published: {:?}",
        ids(&state.records)
    );
    assert!(
        state
            .records
            .windows(2)
            .all(|w| w[0].created_date >= w[1].created_date),
        "published list not newest first: {:?}",
        ids(&state.records)
    );
}

#[tokio::test]
async fn newest_record_is_published_first() {
    let (_backend, dashboard, session) =
        signed_in(&[("B", "2026-10-16T08:00:00Z", false), ("A", "2026-10-16T09:00:00Z", false)])
            .await;

    assert_eq!(ids(&dashboard.feed().visible()), vec!["A", "B"]);
    session.shutdown().await;
}

#[tokio::test]
async fn hidden_record_is_never_published_and_order_holds() {
    let (backend, dashboard, session) = signed_in(&[
        ("A", "2026-10-16T09:00:00Z", false),
        ("H", "2026-10-16T09:30:00Z", true),
    ])
    .await;

    let mut rx = dashboard.feed().subscribe();
    let observer = tokio::spawn(async move {
        let mut seen = 0;
        while rx.changed().await.is_ok() {
            let state = rx.borrow_and_update().clone();
            assert_published_invariants(&state);
            seen += 1;
            if state.generation >= 6 {
                break;
            }
        }
        seen
    });

    for (n, hidden) in [false, true, false, true, false].into_iter().enumerate() {
        backend
            .add(
                COLLECTION,
                fields(json!({
                    "createdDate": format!("2026-10-16T1{n}:00:00Z"),
                    "isHidden": hidden
                })),
            )
            .await;
    }

    let seen = tokio::time::timeout(Duration::from_secs(5), observer)
        .await
        .expect("observer should finish")
        .expect("observer should not panic");
    assert!(seen >= 1);

    let state = dashboard.feed().state();
    assert_published_invariants(&state);
    assert_eq!(state.records.len(), 4);
    session.shutdown().await;
}

#[tokio::test]
async fn hide_removes_record_and_confirming_snapshot_keeps_it_out() {
    let (backend, dashboard, session) =
        signed_in(&[("A", "2026-10-16T09:00:00Z", false), ("B", "2026-10-16T08:00:00Z", false)])
            .await;

    dashboard.hide().hide("B").await.expect("hide should succeed");
    assert_eq!(ids(&dashboard.feed().visible()), vec!["A"]);

    // A later, unrelated write produces a fresh snapshot that still
    // carries B with isHidden = true.
    backend
        .add(COLLECTION, fields(json!({ "createdDate": "2026-10-16T07:00:00Z" })))
        .await;
    let state = wait_for(&dashboard, |s| {
        s.records
            .iter()
            .any(|r| r.created_date == "2026-10-16T07:00:00Z")
    })
    .await;

    assert_eq!(state.records.len(), 2);
    assert!(!ids(&state.records).contains(&"B"));
    assert_eq!(state.records[0].id, "A");
    session.shutdown().await;
}

#[tokio::test]
async fn single_hide_converges_with_or_without_optimistic_removal() {
    let records = [("A", "t2", false), ("B", "t1", false)];

    let (_b1, optimistic, s1) = signed_in(&records).await;
    let generation = optimistic.feed().state().generation;
    optimistic.hide().hide("B").await.expect("hide");
    let with_optimistic = next_generation(&optimistic, generation).await;

    let (b2, plain, s2) = signed_in(&records).await;
    let generation = plain.feed().state().generation;
    // Same write, but bypassing the controller's local removal.
    b2.insert(COLLECTION, "B", fields(json!({ "createdDate": "t1", "isHidden": true })))
        .await;
    let without_optimistic = next_generation(&plain, generation).await;

    assert_eq!(
        ids(&with_optimistic.records),
        ids(&without_optimistic.records)
    );
    assert_eq!(ids(&with_optimistic.records), vec!["A"]);
    s1.shutdown().await;
    s2.shutdown().await;
}

#[tokio::test]
async fn bulk_hide_is_atomic_under_mid_batch_failure() {
    let (backend, dashboard, session) =
        signed_in(&[("A", "t3", false), ("B", "t2", false), ("C", "t1", false)]).await;

    backend
        .fail_next_commit_at(2, BackendError::Aborted("injected".into()))
        .await;
    let err = dashboard
        .hide()
        .hide_all()
        .await
        .expect_err("batch should fail");

    assert!(matches!(err, DashboardError::Batch { count: 3, .. }));
    for id in ["A", "B", "C"] {
        let doc = backend.document(COLLECTION, id).await.expect("exists");
        assert_eq!(doc.fields["isHidden"], json!(false), "{id} changed");
    }
    assert_eq!(ids(&dashboard.feed().visible()), vec!["A", "B", "C"]);
    assert!(matches!(dashboard.banner().current(), Some(Banner::Failed(_))));
    session.shutdown().await;
}

#[tokio::test]
async fn bulk_hide_clears_feed() {
    let (backend, dashboard, session) = signed_in(&[("A", "t2", false), ("B", "t1", false)]).await;

    assert!(dashboard.hide().can_hide_all());
    let hidden = dashboard.hide().hide_all().await.expect("hide all");
    assert_eq!(hidden, 2);
    assert!(dashboard.feed().visible().is_empty());

    let state = wait_for(&dashboard, |s| s.records.is_empty()).await;
    assert_published_invariants(&state);
    assert_eq!(dashboard.hide().hide_all().await.expect("no-op"), 0);
    assert!(backend.document(COLLECTION, "A").await.is_some());
    session.shutdown().await;
}

#[tokio::test]
async fn saving_amounts_stores_derived_remaining() {
    let (backend, dashboard, session) = signed_in(&[]).await;

    dashboard
        .amounts()
        .save(&AmountForm::new("970.000", "152.670"))
        .await
        .expect("save should succeed");

    let doc = backend.document("projects", "main").await.expect("upserted");
    assert_eq!(doc.fields["totalAmount"], json!("970.000"));
    assert_eq!(doc.fields["paidAmount"], json!("152.670"));
    assert_eq!(doc.fields["remainingAmount"], json!("817.330"));
    assert_eq!(dashboard.banner().current(), Some(Banner::AmountsUpdated));
    session.shutdown().await;
}

#[tokio::test]
async fn non_numeric_total_is_rejected_and_stored_triple_unchanged() {
    let (backend, dashboard, session) = signed_in(&[]).await;
    dashboard
        .amounts()
        .save(&AmountForm::new("1,000", "250"))
        .await
        .expect("initial save");
    let before = backend.document("projects", "main").await;

    let err = dashboard
        .amounts()
        .save(&AmountForm::new("abc", "152.670"))
        .await
        .expect_err("garbage should be rejected");

    assert!(matches!(err, DashboardError::Parse(ParseError::Invalid { .. })));
    assert_eq!(backend.document("projects", "main").await, before);
    assert_eq!(dashboard.amounts().current().remaining_amount, "750.000");
    session.shutdown().await;
}

#[tokio::test]
async fn approving_twice_is_a_no_op_state_wise() {
    let (backend, dashboard, session) = signed_in(&[("C", "t1", false)]).await;

    dashboard.approval().approve("C").await.expect("approve");
    let after_first = backend.document(COLLECTION, "C").await;
    dashboard.approval().approve("C").await.expect("re-approve");
    let after_second = backend.document(COLLECTION, "C").await;

    assert_eq!(after_first, after_second);
    let state = wait_for(&dashboard, |s| {
        s.records
            .first()
            .is_some_and(|r| r.status == ApprovalStatus::Approved)
    })
    .await;
    assert_eq!(state.records[0].id, "C");
    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn acknowledgment_clears_after_three_seconds() {
    let (_backend, dashboard, session) = signed_in(&[("C", "t1", false)]).await;

    dashboard.approval().reject("C").await.expect("reject");
    assert_eq!(dashboard.banner().current(), Some(Banner::Submitted));

    tokio::time::sleep(Duration::from_millis(3_100)).await;
    assert_eq!(dashboard.banner().current(), None);
    session.shutdown().await;
}

#[derive(Default)]
struct CountingNavigator(AtomicUsize);

impl Navigator for CountingNavigator {
    fn redirect_to_login(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn external_sign_out_tears_down_feed_before_redirect() {
    init_tracing();
    let backend = Arc::new(InMemoryBackend::new());
    backend.sign_in(AuthUser::new("operator"));
    let navigator = Arc::new(CountingNavigator::default());
    let dashboard = Dashboard::builder(backend.clone())
        .navigator(navigator.clone())
        .build();
    let session = dashboard.start_session().await;
    next_generation(&dashboard, 0).await;
    assert_eq!(backend.active_subscriptions().await, 1);

    backend.force_sign_out();
    tokio::time::timeout(Duration::from_secs(5), async {
        while navigator.0.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("redirect should happen");

    assert_eq!(backend.active_subscriptions().await, 0);
    assert!(dashboard.feed().visible().is_empty());
    assert!(session.current_user().await.is_none());
    session.shutdown().await;
}
