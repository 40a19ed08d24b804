//! Capability traits for the hosted auth + document-store backend.
//!
//! The dashboard never talks to a vendor SDK directly. Everything it needs,
//! namely observing the signed-in user, signing out, ordered full-snapshot
//! subscriptions, single-document reads and writes, and atomic batch
//! writes, is expressed here as Rust-native types so that controllers can
//! be handed an in-memory implementation in tests.

use std::pin::Pin;

use serde_json::Value;
use tokio::sync::watch;
use tokio_stream::Stream;

use crate::error::BackendError;

/// Field map of a document, as stored by the backend.
pub type Fields = serde_json::Map<String, Value>;

/// Stream of full collection snapshots delivered by a subscription.
///
/// The first item is the initial load. Dropping the stream unregisters the
/// subscription with the backend.
pub type SnapshotStream = Pin<Box<dyn Stream<Item = Result<Snapshot, BackendError>> + Send>>;

/// A single document: backend-assigned id plus its fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Backend-assigned, immutable identifier.
    pub id: String,
    /// All stored fields except the id.
    pub fields: Fields,
}

impl Document {
    /// Create a document from an id and its fields.
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }
}

/// A complete, point-in-time copy of a subscribed collection, already in
/// query order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// Every document matching the query, ordered as requested.
    pub documents: Vec<Document>,
}

/// Sort direction of a [`CollectionQuery`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Smallest value first.
    Ascending,
    /// Largest value first.
    Descending,
}

/// An ordered query over one collection.
///
/// # Examples
///
/// ```
/// use notification_feed::{CollectionQuery, Direction};
///
/// let query = CollectionQuery::new("pays").order_by("createdDate", Direction::Descending);
/// assert_eq!(query.collection, "pays");
/// assert_eq!(query.order_by.as_deref(), Some("createdDate"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionQuery {
    /// Collection to read.
    pub collection: String,
    /// Field to order by. `None` means backend insertion order.
    pub order_by: Option<String>,
    /// Direction applied to `order_by`.
    pub direction: Direction,
}

impl CollectionQuery {
    /// Query every document of `collection` in insertion order.
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            order_by: None,
            direction: Direction::Ascending,
        }
    }

    /// Order the results by `field` in the given direction.
    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some(field.into());
        self.direction = direction;
        self
    }
}

/// One queued write of a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq)]
pub struct BatchWrite {
    /// Target collection.
    pub collection: String,
    /// Target document; it must already exist.
    pub id: String,
    /// Fields merged into the document.
    pub fields: Fields,
}

/// A set of document updates committed all-or-nothing.
///
/// Built up with [`update`](WriteBatch::update) and handed to
/// [`DocumentBackend::commit`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    writes: Vec<BatchWrite>,
}

impl WriteBatch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a field update of an existing document.
    pub fn update(
        &mut self,
        collection: impl Into<String>,
        id: impl Into<String>,
        fields: Fields,
    ) -> &mut Self {
        self.writes.push(BatchWrite {
            collection: collection.into(),
            id: id.into(),
            fields,
        });
        self
    }

    /// Number of queued writes.
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// `true` when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// The queued writes in submission order.
    pub fn writes(&self) -> &[BatchWrite] {
        &self.writes
    }
}

/// The signed-in principal as reported by the auth backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    /// Stable user identifier.
    pub uid: String,
    /// Contact address, if the provider exposes one.
    pub email: Option<String>,
}

impl AuthUser {
    /// Create a user with only a uid.
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: None,
        }
    }
}

/// Authentication half of the backend.
#[async_trait::async_trait]
pub trait AuthBackend: Send + Sync {
    /// Observe the current user. `None` means signed out.
    ///
    /// The receiver's current value is the state at registration time;
    /// every later sign-in or sign-out is delivered as a change.
    fn auth_state(&self) -> watch::Receiver<Option<AuthUser>>;

    /// End the current session.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] if the backend could not be reached.
    async fn sign_out(&self) -> Result<(), BackendError>;
}

/// Document-store half of the backend.
#[async_trait::async_trait]
pub trait DocumentBackend: Send + Sync {
    /// Open a standing subscription that delivers a full [`Snapshot`] on
    /// open and after every change to the collection.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] if the subscription is refused. Errors
    /// after the subscription is open arrive as stream items.
    async fn subscribe(&self, query: CollectionQuery) -> Result<SnapshotStream, BackendError>;

    /// Read one document. `Ok(None)` if it does not exist.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, BackendError>;

    /// Merge `fields` into an existing document.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::NotFound`] if the document does not exist.
    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<(), BackendError>;

    /// Create the document or merge `fields` into it (upsert).
    async fn set_merge(&self, collection: &str, id: &str, fields: Fields)
    -> Result<(), BackendError>;

    /// Apply every write of `batch` or none of them.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] if any write fails; in that case no
    /// document was changed.
    async fn commit(&self, batch: WriteBatch) -> Result<(), BackendError>;
}

/// The full capability set injected into the dashboard.
///
/// Blanket-implemented for anything that implements both halves.
pub trait Backend: AuthBackend + DocumentBackend {}

impl<T: AuthBackend + DocumentBackend + ?Sized> Backend for T {}
