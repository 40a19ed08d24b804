//! Composition root wiring the backend, feed, controllers, and session.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::amounts::{AmountStore, ProjectAmounts};
use crate::backend::Backend;
use crate::banner::BannerSignal;
use crate::config::DashboardConfig;
use crate::feed::{FeedConfig, FeedView, NotificationCue, SilentCue};
use crate::moderation::{ApprovalController, HideController};
use crate::session::{Navigator, NoopNavigator, SessionGuard, SessionHandle};

/// An operator dashboard over one injected backend.
///
/// Holds the shared feed view, the acknowledgment banner, and one of each
/// controller. [`start_session`](Dashboard::start_session) starts following
/// the auth state, which in turn drives the feed subscription.
///
/// `Clone` is cheap: all internal state is `Arc`-wrapped.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use notification_feed::{AuthUser, Dashboard, InMemoryBackend};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let backend = Arc::new(InMemoryBackend::new());
/// let dashboard = Dashboard::builder(backend.clone()).build();
/// let session = dashboard.start_session().await;
///
/// backend.sign_in(AuthUser::new("operator"));
/// // ... observe dashboard.feed().subscribe() ...
/// session.shutdown().await;
/// # }
/// ```
#[derive(Clone)]
pub struct Dashboard {
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) config: DashboardConfig,
    pub(crate) view: FeedView,
    pub(crate) banner: BannerSignal,
    pub(crate) hide: HideController,
    pub(crate) approval: ApprovalController,
    pub(crate) amounts: AmountStore,
    pub(crate) cue: Arc<dyn NotificationCue>,
    pub(crate) navigator: Arc<dyn Navigator>,
    pub(crate) session: Arc<Mutex<Option<SessionHandle>>>,
}

impl std::fmt::Debug for Dashboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dashboard")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Dashboard {
    /// Start configuring a dashboard over `backend`.
    pub fn builder(backend: Arc<dyn Backend>) -> DashboardBuilder {
        DashboardBuilder::new(backend)
    }

    /// Start the session guard.
    ///
    /// If a session is already running, returns a clone of its handle
    /// instead of registering a second auth observer.
    pub async fn start_session(&self) -> SessionHandle {
        let mut guard = self.session.lock().await;
        if let Some(handle) = guard.as_ref()
            && !handle.is_finished().await
        {
            return handle.clone();
        }

        let handle = SessionGuard::spawn(self);
        *guard = Some(handle.clone());
        handle
    }

    /// The locally held feed list.
    pub fn feed(&self) -> &FeedView {
        &self.view
    }

    /// The acknowledgment and failure banner.
    pub fn banner(&self) -> &BannerSignal {
        &self.banner
    }

    /// Single and bulk soft-hide.
    pub fn hide(&self) -> &HideController {
        &self.hide
    }

    /// Approve and reject.
    pub fn approval(&self) -> &ApprovalController {
        &self.approval
    }

    /// The project amount singleton.
    pub fn amounts(&self) -> &AmountStore {
        &self.amounts
    }

    /// The configuration this dashboard was built with.
    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }
}

/// Builder for [`Dashboard`].
///
/// Every setting is optional; unset ones come from
/// [`DashboardConfig::default`].
pub struct DashboardBuilder {
    backend: Arc<dyn Backend>,
    config: DashboardConfig,
    cue: Arc<dyn NotificationCue>,
    navigator: Arc<dyn Navigator>,
}

impl DashboardBuilder {
    /// Create a builder over `backend` with default settings.
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            config: DashboardConfig::default(),
            cue: Arc::new(SilentCue),
            navigator: Arc::new(NoopNavigator),
        }
    }

    /// Replace the whole configuration, e.g. one from
    /// [`DashboardConfig::load`].
    pub fn config(mut self, config: DashboardConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the feed subscription configuration.
    pub fn feed_config(mut self, config: FeedConfig) -> Self {
        self.config.feed = config;
        self
    }

    /// Set the amounts shown before the singleton is first saved.
    pub fn amount_defaults(mut self, defaults: ProjectAmounts) -> Self {
        self.config.amount_defaults = defaults;
        self
    }

    /// Set how long banners stay up.
    pub fn ack_duration(mut self, duration: Duration) -> Self {
        self.config.ack_duration = duration;
        self
    }

    /// Set the cue played when a snapshot arrives.
    pub fn cue(mut self, cue: Arc<dyn NotificationCue>) -> Self {
        self.cue = cue;
        self
    }

    /// Set where signed-out callers are sent.
    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = navigator;
        self
    }

    /// Assemble the dashboard. Nothing touches the backend until
    /// [`Dashboard::start_session`] is called.
    pub fn build(self) -> Dashboard {
        let view = FeedView::new();
        let banner = BannerSignal::new(self.config.ack_duration);
        let collection = self.config.feed.collection.clone();

        Dashboard {
            hide: HideController::new(
                Arc::clone(&self.backend),
                collection.clone(),
                view.clone(),
                banner.clone(),
            ),
            approval: ApprovalController::new(Arc::clone(&self.backend), collection, banner.clone()),
            amounts: AmountStore::new(
                Arc::clone(&self.backend),
                self.config.projects_collection.clone(),
                self.config.project_id.clone(),
                self.config.amount_defaults.clone(),
                banner.clone(),
            ),
            backend: self.backend,
            config: self.config,
            view,
            banner,
            cue: self.cue,
            navigator: self.navigator,
            session: Arc::new(Mutex::new(None)),
        }
    }
}
