//! Live notification feed.
//!
//! This module provides [`FeedConfig`] for tuning the subscription,
//! [`FeedView`] for the locally held list that observers and controllers
//! share, and [`FeedHandle`] for controlling a running subscription.
//!
//! Every snapshot the backend delivers replaces the published list
//! wholesale. Hidden records are filtered out before publishing, so an
//! observer never sees one.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;

use crate::backend::{Backend, CollectionQuery, Direction, Snapshot, SnapshotStream};
use crate::error::{BackendError, DashboardError};
use crate::record::{CREATED_DATE_FIELD, NotificationRecord};

/// Default collection holding notifications.
pub const DEFAULT_FEED_COLLECTION: &str = "pays";

/// Audible (or otherwise user-facing) cue played when a snapshot arrives.
pub trait NotificationCue: Send + Sync {
    /// Play the cue once. Must not block.
    fn play(&self);
}

/// A cue that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentCue;

impl NotificationCue for SilentCue {
    fn play(&self) {}
}

/// Configuration for the live feed subscription.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use notification_feed::FeedConfig;
///
/// let config = FeedConfig {
///     reconnect: true,
///     reconnect_base_delay: Duration::from_millis(250),
///     ..FeedConfig::default()
/// };
/// assert_eq!(config.collection, "pays");
/// assert_eq!(config.reconnect_max_delay, Duration::from_secs(30));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Collection to subscribe to.
    ///
    /// Default: `"pays"`.
    pub collection: String,

    /// Field the backend orders by, newest first.
    ///
    /// Default: `"createdDate"`.
    pub order_by: String,

    /// Whether the snapshot delivered when the subscription opens also
    /// plays the cue.
    ///
    /// Default: `true`.
    pub cue_on_initial_snapshot: bool,

    /// Resubscribe after a subscription error or a closed stream.
    ///
    /// When `false` the loop records the error and ends.
    ///
    /// Default: `false`.
    pub reconnect: bool,

    /// Base delay for exponential backoff between resubscribe attempts.
    ///
    /// After an error the loop waits `reconnect_base_delay`, then twice
    /// that, and so on up to
    /// [`reconnect_max_delay`](FeedConfig::reconnect_max_delay). A delivered
    /// snapshot resets the backoff.
    ///
    /// Default: 1 second.
    #[serde(rename = "reconnect_base_delay_ms", with = "crate::config::duration_ms")]
    pub reconnect_base_delay: Duration,

    /// Maximum delay between resubscribe attempts.
    ///
    /// Default: 30 seconds.
    #[serde(rename = "reconnect_max_delay_ms", with = "crate::config::duration_ms")]
    pub reconnect_max_delay: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            collection: DEFAULT_FEED_COLLECTION.to_owned(),
            order_by: CREATED_DATE_FIELD.to_owned(),
            cue_on_initial_snapshot: true,
            reconnect: false,
            reconnect_base_delay: Duration::from_secs(1),
            reconnect_max_delay: Duration::from_secs(30),
        }
    }
}

impl FeedConfig {
    /// The query the feed subscribes with.
    pub fn query(&self) -> CollectionQuery {
        CollectionQuery::new(&self.collection).order_by(&self.order_by, Direction::Descending)
    }
}

/// What the feed currently publishes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedState {
    /// Visible records, newest first.
    pub records: Vec<NotificationRecord>,
    /// `true` between starting a subscription and its first snapshot or
    /// error.
    pub loading: bool,
    /// The most recent subscription error. Cleared by the next snapshot.
    pub last_error: Option<BackendError>,
    /// Number of snapshots published since the last reset.
    pub generation: u64,
}

/// The locally held feed list.
///
/// A view outlives individual subscriptions: the session guard resets it
/// and starts a new subscription on every sign-in, while controllers keep
/// the same view for optimistic edits.
///
/// `Clone` is cheap: the state lives behind an `Arc`.
#[derive(Clone, Debug)]
pub struct FeedView {
    tx: Arc<watch::Sender<FeedState>>,
}

impl Default for FeedView {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedView {
    /// Create an empty, idle view.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(FeedState::default());
        Self { tx: Arc::new(tx) }
    }

    /// Observe state changes.
    pub fn subscribe(&self) -> watch::Receiver<FeedState> {
        self.tx.subscribe()
    }

    /// A copy of the current state.
    pub fn state(&self) -> FeedState {
        self.tx.borrow().clone()
    }

    /// A copy of the currently visible records.
    pub fn visible(&self) -> Vec<NotificationRecord> {
        self.tx.borrow().records.clone()
    }

    /// Optimistically drop `id` from the local list.
    ///
    /// Returns `true` if the record was present. The next snapshot
    /// replaces the list regardless.
    pub fn remove_local(&self, id: &str) -> bool {
        self.tx.send_if_modified(|state| {
            let before = state.records.len();
            state.records.retain(|r| r.id != id);
            state.records.len() != before
        })
    }

    /// Optimistically empty the local list.
    pub fn clear_local(&self) {
        self.tx.send_if_modified(|state| {
            if state.records.is_empty() {
                return false;
            }
            state.records.clear();
            true
        });
    }

    /// Forget everything, as after sign-out.
    pub fn reset(&self) {
        self.tx.send_replace(FeedState::default());
    }

    /// Start a live subscription that publishes into this view.
    ///
    /// Spawns the feed loop onto the current tokio runtime. Call
    /// [`FeedHandle::shutdown`] to unregister the subscription.
    pub fn start(
        &self,
        backend: Arc<dyn Backend>,
        config: FeedConfig,
        cue: Arc<dyn NotificationCue>,
    ) -> FeedHandle {
        self.tx.send_modify(|state| {
            state.loading = true;
            state.last_error = None;
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_feed_loop(
            backend,
            self.clone(),
            config,
            cue,
            shutdown_rx,
        ));

        FeedHandle {
            view: self.clone(),
            shutdown_tx: Arc::new(shutdown_tx),
            task: Arc::new(Mutex::new(Some(task))),
        }
    }

    pub(crate) fn publish(&self, records: Vec<NotificationRecord>) {
        self.tx.send_modify(|state| {
            state.records = records;
            state.loading = false;
            state.last_error = None;
            state.generation += 1;
        });
    }

    fn record_error(&self, error: BackendError) {
        self.tx.send_modify(|state| {
            state.loading = false;
            state.last_error = Some(error);
        });
    }

    fn stop_loading(&self) {
        self.tx.send_if_modified(|state| std::mem::replace(&mut state.loading, false));
    }
}

/// Handle for controlling a running feed subscription.
///
/// Dropping every clone of the handle also stops the loop, since the loop
/// treats a closed shutdown channel as a shutdown request.
///
/// `Clone` is cheap: all fields are `Arc`-wrapped.
#[derive(Clone, Debug)]
pub struct FeedHandle {
    view: FeedView,
    shutdown_tx: Arc<watch::Sender<bool>>,
    /// Taken and awaited exactly once by [`shutdown`](FeedHandle::shutdown).
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl FeedHandle {
    /// The view this subscription publishes into.
    pub fn view(&self) -> &FeedView {
        &self.view
    }

    /// Observe state changes.
    pub fn subscribe(&self) -> watch::Receiver<FeedState> {
        self.view.subscribe()
    }

    /// A copy of the current state.
    pub fn state(&self) -> FeedState {
        self.view.state()
    }

    /// See [`FeedView::remove_local`].
    pub fn remove_local(&self, id: &str) -> bool {
        self.view.remove_local(id)
    }

    /// See [`FeedView::clear_local`].
    pub fn clear_local(&self) {
        self.view.clear_local();
    }

    /// `true` once the loop has exited, whether through shutdown or a
    /// terminal subscription error.
    pub async fn is_finished(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_none_or(JoinHandle::is_finished)
    }

    /// Unregister the subscription and wait for the loop to exit.
    ///
    /// Calling `shutdown` more than once is safe: later calls return
    /// immediately.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);

        let task = self.task.lock().await.take();
        if let Some(join_handle) = task
            && let Err(e) = join_handle.await
        {
            tracing::error!(error = %e, "feed loop task panicked");
        }
    }
}

/// Why a single subscription stopped delivering.
#[derive(Debug)]
enum StreamOutcome {
    /// The backend closed the stream.
    Ended,
    /// The subscription failed to open or reported an error.
    Error(BackendError),
}

/// Decode a snapshot into the list the feed publishes: backend order,
/// hidden records removed.
pub fn visible_records(snapshot: &Snapshot) -> Vec<NotificationRecord> {
    snapshot
        .documents
        .iter()
        .map(NotificationRecord::from_document)
        .filter(NotificationRecord::is_visible)
        .collect()
}

/// Run the feed loop until shutdown or, with reconnect disabled, until the
/// subscription fails or ends.
async fn run_feed_loop(
    backend: Arc<dyn Backend>,
    view: FeedView,
    config: FeedConfig,
    cue: Arc<dyn NotificationCue>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let query = config.query();
    let mut backoff_delay = config.reconnect_base_delay;
    let mut delivered: u64 = 0;

    loop {
        if *shutdown_rx.borrow() {
            return;
        }

        tracing::info!(collection = %config.collection, "feed: subscribing");
        let before = delivered;

        let outcome = match backend.subscribe(query.clone()).await {
            Ok(stream) => {
                let stream_fut =
                    process_snapshots(&view, stream, cue.as_ref(), &config, &mut delivered);
                tokio::select! {
                    outcome = stream_fut => outcome,
                    _ = shutdown_rx.changed() => {
                        tracing::info!(collection = %config.collection, "feed: unsubscribed");
                        return;
                    }
                }
            }
            Err(e) => StreamOutcome::Error(e),
        };

        if delivered > before {
            backoff_delay = config.reconnect_base_delay;
        }

        match outcome {
            StreamOutcome::Ended => {
                tracing::warn!(collection = %config.collection, "feed: stream closed by backend");
                view.stop_loading();
            }
            StreamOutcome::Error(e) => {
                let err = DashboardError::Subscription(e.clone());
                tracing::error!(collection = %config.collection, error = %err, "feed loop error");
                view.record_error(e);
            }
        }

        if !config.reconnect {
            return;
        }

        tokio::select! {
            _ = tokio::time::sleep(backoff_delay) => {}
            _ = shutdown_rx.changed() => return,
        }
        backoff_delay = (backoff_delay * 2).min(config.reconnect_max_delay);
    }
}

/// Publish every snapshot of one subscription until it errors or ends.
async fn process_snapshots(
    view: &FeedView,
    mut stream: SnapshotStream,
    cue: &dyn NotificationCue,
    config: &FeedConfig,
    delivered: &mut u64,
) -> StreamOutcome {
    while let Some(item) = stream.next().await {
        let snapshot = match item {
            Ok(snapshot) => snapshot,
            Err(e) => return StreamOutcome::Error(e),
        };

        let records = visible_records(&snapshot);
        tracing::debug!(
            collection = %config.collection,
            total = snapshot.documents.len(),
            visible = records.len(),
            "feed: snapshot"
        );
        view.publish(records);

        let initial = *delivered == 0;
        *delivered += 1;
        if !initial || config.cue_on_initial_snapshot {
            cue.play();
        }
    }

    StreamOutcome::Ended
}
