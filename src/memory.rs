//! In-memory [`Backend`](crate::Backend) for tests and demos.
//!
//! Behaves like a hosted document store as far as the dashboard can tell:
//! subscriptions deliver a full, ordered snapshot on open and after every
//! write to the collection; documents lacking the `order_by` field are
//! excluded from ordered queries; ties keep insertion order; batch commits
//! are staged on a copy and only swapped in when every write succeeded.
//!
//! Faults can be injected per operation to exercise the failure paths.

use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};

use serde_json::Value;
use tokio::sync::{Mutex, mpsc, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::backend::{
    AuthBackend, AuthUser, CollectionQuery, Direction, Document, DocumentBackend, Fields,
    Snapshot, SnapshotStream, WriteBatch,
};
use crate::error::BackendError;

/// Collections keyed by name; each keeps documents in insertion order.
type Collections = HashMap<String, Vec<Document>>;

struct Subscriber {
    query: CollectionQuery,
    tx: mpsc::UnboundedSender<Result<Snapshot, BackendError>>,
}

#[derive(Default)]
struct Faults {
    /// Consumed one per `subscribe` call, oldest first.
    subscribe: VecDeque<BackendError>,
    get: Option<BackendError>,
    update: Option<BackendError>,
    set_merge: Option<BackendError>,
    commit: Option<BackendError>,
    /// Fail the next batch when it reaches the write at this index.
    commit_at: Option<(usize, BackendError)>,
    sign_out: Option<BackendError>,
}

#[derive(Default)]
struct Inner {
    collections: Collections,
    subscribers: Vec<Subscriber>,
    faults: Faults,
    write_count: u64,
    subscribe_attempts: u64,
}

/// Shared, in-process document store and auth provider.
///
/// Wrap in an `Arc` and hand it to
/// [`Dashboard::builder`](crate::Dashboard::builder); keep a clone of the
/// `Arc` to seed documents, flip auth state, and inject faults.
pub struct InMemoryBackend {
    inner: Mutex<Inner>,
    auth_tx: watch::Sender<Option<AuthUser>>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBackend")
            .field("user", &*self.auth_tx.borrow())
            .finish()
    }
}

impl InMemoryBackend {
    /// Create an empty store with nobody signed in.
    pub fn new() -> Self {
        let (auth_tx, _) = watch::channel(None);
        Self {
            inner: Mutex::new(Inner::default()),
            auth_tx,
        }
    }

    /// Sign `user` in, notifying every auth observer.
    pub fn sign_in(&self, user: AuthUser) {
        self.auth_tx.send_replace(Some(user));
    }

    /// Sign out without going through the fault-injectable trait method.
    pub fn force_sign_out(&self) {
        self.auth_tx.send_replace(None);
    }

    /// Insert a document with a generated id, as an external producer would.
    ///
    /// # Returns
    ///
    /// The new document's id.
    pub async fn add(&self, collection: &str, fields: Fields) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.insert(collection, &id, fields).await;
        id
    }

    /// Insert or replace the document `collection/id`.
    pub async fn insert(&self, collection: &str, id: &str, fields: Fields) {
        let mut inner = self.inner.lock().await;
        let docs = inner.collections.entry(collection.to_owned()).or_default();
        match docs.iter_mut().find(|d| d.id == id) {
            Some(existing) => existing.fields = fields,
            None => docs.push(Document::new(id, fields)),
        }
        inner.write_count += 1;
        broadcast(&mut inner, collection);
    }

    /// Read a document without going through fault injection.
    pub async fn document(&self, collection: &str, id: &str) -> Option<Document> {
        let inner = self.inner.lock().await;
        inner
            .collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| d.id == id))
            .cloned()
    }

    /// Number of subscriptions whose receiving end is still alive.
    pub async fn active_subscriptions(&self) -> usize {
        let mut inner = self.inner.lock().await;
        inner.subscribers.retain(|s| !s.tx.is_closed());
        inner.subscribers.len()
    }

    /// Total number of successful writes (inserts, updates, upserts, and
    /// each committed batch counted once).
    pub async fn write_count(&self) -> u64 {
        self.inner.lock().await.write_count
    }

    /// Total number of `subscribe` calls, refused ones included.
    pub async fn subscribe_attempts(&self) -> u64 {
        self.inner.lock().await.subscribe_attempts
    }

    /// Deliver `error` to every open subscription on `collection`.
    pub async fn push_subscription_error(&self, collection: &str, error: BackendError) {
        let mut inner = self.inner.lock().await;
        inner.subscribers.retain(|s| {
            if s.query.collection != collection {
                return !s.tx.is_closed();
            }
            s.tx.send(Err(error.clone())).is_ok()
        });
    }

    /// Close every open subscription on `collection`, ending their streams.
    pub async fn close_subscriptions(&self, collection: &str) {
        let mut inner = self.inner.lock().await;
        inner.subscribers.retain(|s| s.query.collection != collection);
    }

    /// Refuse the next `subscribe` call. Repeated calls queue up and
    /// refuse that many consecutive subscribes.
    pub async fn fail_next_subscribe(&self, error: BackendError) {
        self.inner.lock().await.faults.subscribe.push_back(error);
    }

    /// Fail the next `get` call.
    pub async fn fail_next_get(&self, error: BackendError) {
        self.inner.lock().await.faults.get = Some(error);
    }

    /// Fail the next `update` call.
    pub async fn fail_next_update(&self, error: BackendError) {
        self.inner.lock().await.faults.update = Some(error);
    }

    /// Fail the next `set_merge` call.
    pub async fn fail_next_set_merge(&self, error: BackendError) {
        self.inner.lock().await.faults.set_merge = Some(error);
    }

    /// Fail the next `commit` call before any write is staged.
    pub async fn fail_next_commit(&self, error: BackendError) {
        self.inner.lock().await.faults.commit = Some(error);
    }

    /// Fail the next `commit` when it reaches the write at `index`, after
    /// the earlier writes were staged.
    pub async fn fail_next_commit_at(&self, index: usize, error: BackendError) {
        self.inner.lock().await.faults.commit_at = Some((index, error));
    }

    /// Fail the next `sign_out` call.
    pub async fn fail_next_sign_out(&self, error: BackendError) {
        self.inner.lock().await.faults.sign_out = Some(error);
    }
}

#[async_trait::async_trait]
impl AuthBackend for InMemoryBackend {
    fn auth_state(&self) -> watch::Receiver<Option<AuthUser>> {
        self.auth_tx.subscribe()
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        if let Some(err) = self.inner.lock().await.faults.sign_out.take() {
            return Err(err);
        }
        self.auth_tx.send_replace(None);
        Ok(())
    }
}

#[async_trait::async_trait]
impl DocumentBackend for InMemoryBackend {
    async fn subscribe(&self, query: CollectionQuery) -> Result<SnapshotStream, BackendError> {
        let mut inner = self.inner.lock().await;
        inner.subscribe_attempts += 1;
        if let Some(err) = inner.faults.subscribe.pop_front() {
            return Err(err);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        // Initial load counts as the first snapshot.
        let _ = tx.send(Ok(snapshot(&inner.collections, &query)));
        inner.subscribers.push(Subscriber { query, tx });
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, BackendError> {
        let mut inner = self.inner.lock().await;
        if let Some(err) = inner.faults.get.take() {
            return Err(err);
        }
        Ok(inner
            .collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| d.id == id))
            .cloned())
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<(), BackendError> {
        let mut inner = self.inner.lock().await;
        if let Some(err) = inner.faults.update.take() {
            return Err(err);
        }
        apply_update(&mut inner.collections, collection, id, fields)?;
        inner.write_count += 1;
        broadcast(&mut inner, collection);
        Ok(())
    }

    async fn set_merge(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
    ) -> Result<(), BackendError> {
        let mut inner = self.inner.lock().await;
        if let Some(err) = inner.faults.set_merge.take() {
            return Err(err);
        }
        let docs = inner.collections.entry(collection.to_owned()).or_default();
        match docs.iter_mut().find(|d| d.id == id) {
            Some(existing) => existing.fields.extend(fields),
            None => docs.push(Document::new(id, fields)),
        }
        inner.write_count += 1;
        broadcast(&mut inner, collection);
        Ok(())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), BackendError> {
        let mut inner = self.inner.lock().await;
        if let Some(err) = inner.faults.commit.take() {
            return Err(err);
        }
        let fail_at = inner.faults.commit_at.take();

        let mut staged = inner.collections.clone();
        for (index, write) in batch.writes().iter().enumerate() {
            if let Some((at, err)) = &fail_at
                && *at == index
            {
                return Err(err.clone());
            }
            apply_update(
                &mut staged,
                &write.collection,
                &write.id,
                write.fields.clone(),
            )
            .map_err(|e| BackendError::Aborted(e.to_string()))?;
        }

        inner.collections = staged;
        inner.write_count += 1;
        let mut touched: Vec<&str> = batch.writes().iter().map(|w| w.collection.as_str()).collect();
        touched.sort_unstable();
        touched.dedup();
        for collection in touched {
            broadcast(&mut inner, collection);
        }
        Ok(())
    }
}

fn apply_update(
    collections: &mut Collections,
    collection: &str,
    id: &str,
    fields: Fields,
) -> Result<(), BackendError> {
    let doc = collections
        .get_mut(collection)
        .and_then(|docs| docs.iter_mut().find(|d| d.id == id))
        .ok_or_else(|| BackendError::NotFound {
            collection: collection.to_owned(),
            id: id.to_owned(),
        })?;
    doc.fields.extend(fields);
    Ok(())
}

/// Push a fresh snapshot to every live subscriber of `collection`, pruning
/// subscribers whose stream has been dropped.
fn broadcast(inner: &mut Inner, collection: &str) {
    let Inner {
        collections,
        subscribers,
        ..
    } = inner;
    subscribers.retain(|s| {
        if s.query.collection != collection {
            return !s.tx.is_closed();
        }
        s.tx.send(Ok(snapshot(collections, &s.query))).is_ok()
    });
}

/// Evaluate `query` against the current collections.
fn snapshot(collections: &Collections, query: &CollectionQuery) -> Snapshot {
    let docs = collections
        .get(&query.collection)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut documents: Vec<Document> = match &query.order_by {
        Some(field) => docs
            .iter()
            .filter(|d| d.fields.get(field).is_some_and(|v| !v.is_null()))
            .cloned()
            .collect(),
        None => docs.to_vec(),
    };

    if let Some(field) = &query.order_by {
        // `sort_by` is stable, so equal keys keep insertion order.
        documents.sort_by(|a, b| {
            let ord = compare_values(
                a.fields.get(field).unwrap_or(&Value::Null),
                b.fields.get(field).unwrap_or(&Value::Null),
            );
            match query.direction {
                Direction::Ascending => ord,
                Direction::Descending => ord.reverse(),
            }
        });
    }

    Snapshot { documents }
}

/// Total order over JSON values: booleans < numbers < strings < arrays <
/// objects, with natural ordering inside each class.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.total_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_stream::StreamExt;

    fn fields(value: Value) -> Fields {
        let Value::Object(map) = value else {
            panic!("fixture fields must be an object");
        };
        map
    }

    fn ids(snapshot: &Snapshot) -> Vec<&str> {
        snapshot.documents.iter().map(|d| d.id.as_str()).collect()
    }

    fn by_created_desc() -> CollectionQuery {
        CollectionQuery::new("pays").order_by("createdDate", Direction::Descending)
    }

    #[tokio::test]
    async fn subscribe_delivers_ordered_initial_snapshot() {
        let backend = InMemoryBackend::new();
        backend
            .insert("pays", "B", fields(json!({"createdDate": "2026-01-01"})))
            .await;
        backend
            .insert("pays", "A", fields(json!({"createdDate": "2026-01-02"})))
            .await;
        backend.insert("pays", "undated", fields(json!({}))).await;

        let mut stream = backend.subscribe(by_created_desc()).await.expect("subscribe");
        let first = stream.next().await.expect("item").expect("snapshot");
        assert_eq!(ids(&first), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn ties_keep_insertion_order() {
        let backend = InMemoryBackend::new();
        for id in ["x", "y", "z"] {
            backend
                .insert("pays", id, fields(json!({"createdDate": "same"})))
                .await;
        }
        let mut stream = backend.subscribe(by_created_desc()).await.expect("subscribe");
        let first = stream.next().await.expect("item").expect("snapshot");
        assert_eq!(ids(&first), vec!["x", "y", "z"]);
    }

    #[tokio::test]
    async fn update_pushes_new_snapshot() {
        let backend = InMemoryBackend::new();
        backend
            .insert("pays", "A", fields(json!({"createdDate": "t1"})))
            .await;
        let mut stream = backend.subscribe(by_created_desc()).await.expect("subscribe");
        let _initial = stream.next().await;

        backend
            .update("pays", "A", fields(json!({"isHidden": true})))
            .await
            .expect("update");
        let next = stream.next().await.expect("item").expect("snapshot");
        assert_eq!(next.documents[0].fields["isHidden"], json!(true));
    }

    #[tokio::test]
    async fn update_of_missing_document_is_not_found() {
        let backend = InMemoryBackend::new();
        let err = backend
            .update("pays", "nope", fields(json!({"status": "approved"})))
            .await
            .expect_err("missing document");
        assert!(matches!(err, BackendError::NotFound { .. }));
    }

    #[tokio::test]
    async fn set_merge_upserts_and_merges() {
        let backend = InMemoryBackend::new();
        backend
            .set_merge("projects", "p", fields(json!({"totalAmount": "1"})))
            .await
            .expect("create");
        backend
            .set_merge("projects", "p", fields(json!({"paidAmount": "2"})))
            .await
            .expect("merge");
        let doc = backend.document("projects", "p").await.expect("exists");
        assert_eq!(doc.fields, fields(json!({"totalAmount": "1", "paidAmount": "2"})));
    }

    #[tokio::test]
    async fn commit_failing_mid_batch_changes_nothing() {
        let backend = InMemoryBackend::new();
        for id in ["a", "b", "c"] {
            backend
                .insert("pays", id, fields(json!({"createdDate": id})))
                .await;
        }
        let writes_before = backend.write_count().await;

        let mut batch = WriteBatch::new();
        for id in ["a", "b", "c"] {
            batch.update("pays", id, fields(json!({"isHidden": true})));
        }
        backend
            .fail_next_commit_at(2, BackendError::Aborted("injected".into()))
            .await;
        backend.commit(batch).await.expect_err("injected failure");

        for id in ["a", "b", "c"] {
            let doc = backend.document("pays", id).await.expect("exists");
            assert!(doc.fields.get("isHidden").is_none(), "{id} must be untouched");
        }
        assert_eq!(backend.write_count().await, writes_before);
    }

    #[tokio::test]
    async fn commit_with_missing_target_aborts_whole_batch() {
        let backend = InMemoryBackend::new();
        backend.insert("pays", "a", fields(json!({}))).await;
        let mut batch = WriteBatch::new();
        batch
            .update("pays", "a", fields(json!({"isHidden": true})))
            .update("pays", "ghost", fields(json!({"isHidden": true})));

        let err = backend.commit(batch).await.expect_err("ghost is missing");
        assert!(matches!(err, BackendError::Aborted(_)));
        let doc = backend.document("pays", "a").await.expect("exists");
        assert!(doc.fields.get("isHidden").is_none());
    }

    #[tokio::test]
    async fn dropped_stream_unregisters_subscription() {
        let backend = InMemoryBackend::new();
        let stream = backend.subscribe(by_created_desc()).await.expect("subscribe");
        assert_eq!(backend.active_subscriptions().await, 1);
        drop(stream);
        assert_eq!(backend.active_subscriptions().await, 0);
    }

    #[tokio::test]
    async fn injected_sign_out_failure_keeps_user() {
        let backend = InMemoryBackend::new();
        backend.sign_in(AuthUser::new("op-1"));
        backend
            .fail_next_sign_out(BackendError::Unavailable("offline".into()))
            .await;
        backend.sign_out().await.expect_err("injected failure");
        assert_eq!(*backend.auth_state().borrow(), Some(AuthUser::new("op-1")));

        backend.sign_out().await.expect("second sign-out succeeds");
        assert_eq!(*backend.auth_state().borrow(), None);
    }

    #[test]
    fn compare_values_orders_within_and_across_types() {
        assert_eq!(compare_values(&json!(2), &json!(10)), Ordering::Less);
        assert_eq!(compare_values(&json!("b"), &json!("a")), Ordering::Greater);
        assert_eq!(compare_values(&json!(true), &json!("a")), Ordering::Less);
    }
}
