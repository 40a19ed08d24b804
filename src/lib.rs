//! Live notification feed and moderation state for an operator dashboard
//! backed by a hosted auth + document store.

mod amounts;
pub use amounts::{AmountForm, AmountStore, ProjectAmounts, derive_remaining, parse_amount};
mod backend;
pub use backend::{
    AuthBackend, AuthUser, Backend, BatchWrite, CollectionQuery, Direction, Document,
    DocumentBackend, Fields, Snapshot, SnapshotStream, WriteBatch,
};
mod banner;
mod config;
mod dashboard;
mod error;
mod feed;
mod memory;
mod moderation;
mod record;
mod session;

pub use banner::{Banner, BannerSignal};
pub use config::DashboardConfig;
pub use dashboard::{Dashboard, DashboardBuilder};
pub use error::{BackendError, ConfigError, DashboardError, ParseError};
pub use feed::{
    FeedConfig, FeedHandle, FeedState, FeedView, NotificationCue, SilentCue, visible_records,
};
pub use memory::InMemoryBackend;
pub use moderation::{ApprovalController, Decision, HideController};
pub use record::{ApprovalStatus, NotificationRecord};
pub use session::{Navigator, NoopNavigator, SessionGuard, SessionHandle};
