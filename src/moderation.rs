//! Operator actions on notification records: soft-hide and approval.
//!
//! Both controllers write through the same backend the feed is subscribed
//! to, so the feed observes their effect on its next snapshot. A failed
//! action is logged, raises a failure banner, and leaves local state as it
//! was.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;

use crate::backend::{Backend, Fields, WriteBatch};
use crate::banner::{Banner, BannerSignal};
use crate::error::DashboardError;
use crate::feed::FeedView;
use crate::record::{ApprovalStatus, IS_HIDDEN_FIELD, STATUS_FIELD};

/// Soft-deletes records, one at a time or everything visible at once.
#[derive(Clone)]
pub struct HideController {
    backend: Arc<dyn Backend>,
    collection: String,
    view: FeedView,
    banner: BannerSignal,
    busy: Arc<AtomicBool>,
}

impl HideController {
    /// Create a controller writing to `collection` and editing `view`.
    pub fn new(
        backend: Arc<dyn Backend>,
        collection: impl Into<String>,
        view: FeedView,
        banner: BannerSignal,
    ) -> Self {
        Self {
            backend,
            collection: collection.into(),
            view,
            banner,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Mark `id` hidden and drop it from the local list.
    ///
    /// # Errors
    ///
    /// Returns [`DashboardError::Write`] if the update fails; the local
    /// list is left unchanged.
    pub async fn hide(&self, id: &str) -> Result<(), DashboardError> {
        match self
            .backend
            .update(&self.collection, id, hidden_fields())
            .await
        {
            Ok(()) => {
                self.view.remove_local(id);
                tracing::info!(collection = %self.collection, id, "hid record");
                Ok(())
            }
            Err(source) => {
                let err = DashboardError::Write {
                    id: id.to_owned(),
                    source,
                };
                tracing::error!(collection = %self.collection, error = %err, "failed to hide record");
                self.banner.fail(&err);
                Err(err)
            }
        }
    }

    /// Hide every currently visible record in one atomic batch.
    ///
    /// Returns the number of records hidden. With nothing visible this is a
    /// no-op returning `Ok(0)`.
    ///
    /// # Errors
    ///
    /// Returns [`DashboardError::Batch`] if the commit fails; no record was
    /// changed and the local list is left unchanged.
    pub async fn hide_all(&self) -> Result<usize, DashboardError> {
        let visible = self.view.visible();
        if visible.is_empty() {
            tracing::debug!(collection = %self.collection, "hide all: nothing visible");
            return Ok(0);
        }

        let mut batch = WriteBatch::new();
        for record in &visible {
            batch.update(&self.collection, &record.id, hidden_fields());
        }
        let count = batch.len();

        self.busy.store(true, Ordering::Release);
        let result = self.backend.commit(batch).await;
        self.busy.store(false, Ordering::Release);

        match result {
            Ok(()) => {
                self.view.clear_local();
                tracing::info!(collection = %self.collection, count, "hid all visible records");
                Ok(count)
            }
            Err(source) => {
                let err = DashboardError::Batch { count, source };
                tracing::error!(collection = %self.collection, error = %err, "failed to hide all records");
                self.banner.fail(&err);
                Err(err)
            }
        }
    }

    /// `true` when there is something for [`hide_all`](Self::hide_all) to
    /// do and no bulk hide is in flight.
    pub fn can_hide_all(&self) -> bool {
        !self.is_busy() && !self.view.state().records.is_empty()
    }

    /// `true` while a bulk hide is in flight.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// An operator's approval decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decision {
    /// Approve the record.
    Approved,
    /// Reject the record.
    Rejected,
}

impl From<Decision> for ApprovalStatus {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Approved => Self::Approved,
            Decision::Rejected => Self::Rejected,
        }
    }
}

/// Writes approval decisions.
#[derive(Clone)]
pub struct ApprovalController {
    backend: Arc<dyn Backend>,
    collection: String,
    banner: BannerSignal,
}

impl ApprovalController {
    /// Create a controller writing to `collection`.
    pub fn new(
        backend: Arc<dyn Backend>,
        collection: impl Into<String>,
        banner: BannerSignal,
    ) -> Self {
        Self {
            backend,
            collection: collection.into(),
            banner,
        }
    }

    /// Set the status of `id`. The current status is not checked, so
    /// repeating a decision is harmless.
    ///
    /// # Errors
    ///
    /// Returns [`DashboardError::Write`] if the update fails.
    pub async fn set_status(&self, id: &str, decision: Decision) -> Result<(), DashboardError> {
        let status = ApprovalStatus::from(decision);
        let fields = Fields::from_iter([(
            STATUS_FIELD.to_owned(),
            Value::String(status.as_str().to_owned()),
        )]);

        match self.backend.update(&self.collection, id, fields).await {
            Ok(()) => {
                tracing::info!(
                    collection = %self.collection,
                    id,
                    status = status.as_str(),
                    "recorded decision"
                );
                self.banner.raise(Banner::Submitted);
                Ok(())
            }
            Err(source) => {
                let err = DashboardError::Write {
                    id: id.to_owned(),
                    source,
                };
                tracing::error!(collection = %self.collection, error = %err, "failed to record decision");
                self.banner.fail(&err);
                Err(err)
            }
        }
    }

    /// Shorthand for `set_status(id, Decision::Approved)`.
    pub async fn approve(&self, id: &str) -> Result<(), DashboardError> {
        self.set_status(id, Decision::Approved).await
    }

    /// Shorthand for `set_status(id, Decision::Rejected)`.
    pub async fn reject(&self, id: &str) -> Result<(), DashboardError> {
        self.set_status(id, Decision::Rejected).await
    }
}

fn hidden_fields() -> Fields {
    Fields::from_iter([(IS_HIDDEN_FIELD.to_owned(), Value::Bool(true))])
}
