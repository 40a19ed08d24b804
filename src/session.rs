//! Session guard: follows the auth state and owns the feed subscription.
//!
//! Signing in starts a feed subscription and loads the project amounts.
//! Signing out, whether observed or explicit, cancels the subscription
//! before redirecting to login. At most one subscription is live at a time.

use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use crate::amounts::AmountStore;
use crate::backend::{AuthUser, Backend};
use crate::banner::BannerSignal;
use crate::dashboard::Dashboard;
use crate::error::{BackendError, DashboardError};
use crate::feed::{FeedConfig, FeedHandle, FeedView, NotificationCue};

/// Where the dashboard sends a caller who is not signed in.
pub trait Navigator: Send + Sync {
    /// Leave the dashboard for the login entry point.
    fn redirect_to_login(&self);
}

/// A navigator that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn redirect_to_login(&self) {
        tracing::debug!("redirect to login");
    }
}

#[derive(Default)]
struct SessionState {
    user: Option<AuthUser>,
    feed: Option<FeedHandle>,
    /// Set once the signed-out redirect has fired; cleared on sign-in.
    redirected: bool,
}

/// The single auth observer of a [`Dashboard`].
///
/// Created by [`SessionGuard::spawn`], which runs it as a background task
/// and returns the controlling [`SessionHandle`].
pub struct SessionGuard {
    backend: Arc<dyn Backend>,
    view: FeedView,
    feed_config: FeedConfig,
    cue: Arc<dyn NotificationCue>,
    amounts: AmountStore,
    navigator: Arc<dyn Navigator>,
    banner: BannerSignal,
    state: Mutex<SessionState>,
}

impl SessionGuard {
    /// Register the auth observer for `dashboard` and start following it.
    ///
    /// The current auth state is applied immediately: signed out redirects,
    /// signed in starts the feed.
    pub fn spawn(dashboard: &Dashboard) -> SessionHandle {
        let guard = Arc::new(Self {
            backend: Arc::clone(&dashboard.backend),
            view: dashboard.view.clone(),
            feed_config: dashboard.config.feed.clone(),
            cue: Arc::clone(&dashboard.cue),
            amounts: dashboard.amounts.clone(),
            navigator: Arc::clone(&dashboard.navigator),
            banner: dashboard.banner.clone(),
            state: Mutex::new(SessionState::default()),
        });

        let auth_rx = guard.backend.auth_state();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_session_loop(Arc::clone(&guard), auth_rx, shutdown_rx));

        SessionHandle {
            guard,
            shutdown_tx: Arc::new(shutdown_tx),
            task: Arc::new(Mutex::new(Some(task))),
        }
    }

    async fn apply(&self, next: Option<AuthUser>) {
        let mut state = self.state.lock().await;
        match next {
            Some(user) => {
                if state.user.as_ref() == Some(&user)
                    && let Some(feed) = &state.feed
                    && !feed.is_finished().await
                {
                    return;
                }
                if let Some(feed) = state.feed.take() {
                    feed.shutdown().await;
                }
                self.view.reset();
                tracing::info!(uid = %user.uid, "session: signed in");
                self.amounts.load().await;
                state.feed = Some(self.view.start(
                    Arc::clone(&self.backend),
                    self.feed_config.clone(),
                    Arc::clone(&self.cue),
                ));
                state.user = Some(user);
                state.redirected = false;
            }
            None => {
                if state.redirected {
                    return;
                }
                if let Some(feed) = state.feed.take() {
                    feed.shutdown().await;
                }
                if let Some(user) = state.user.take() {
                    tracing::info!(uid = %user.uid, "session: signed out");
                }
                self.view.reset();
                state.redirected = true;
                self.navigator.redirect_to_login();
            }
        }
    }

    async fn teardown(&self) {
        let mut state = self.state.lock().await;
        if let Some(feed) = state.feed.take() {
            feed.shutdown().await;
        }
        state.user = None;
    }
}

/// Follow the auth state until shutdown or until the observer closes.
async fn run_session_loop(
    guard: Arc<SessionGuard>,
    mut auth_rx: watch::Receiver<Option<AuthUser>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let initial = auth_rx.borrow_and_update().clone();
    guard.apply(initial).await;

    loop {
        tokio::select! {
            changed = auth_rx.changed() => {
                if changed.is_err() {
                    let err = DashboardError::Auth(BackendError::Closed);
                    tracing::error!(error = %err, "session: auth observer closed");
                    guard.apply(None).await;
                    return;
                }
                let next = auth_rx.borrow_and_update().clone();
                guard.apply(next).await;
            }
            _ = shutdown_rx.changed() => {
                guard.teardown().await;
                tracing::info!("session: shut down");
                return;
            }
        }
    }
}

/// Handle for controlling a running [`SessionGuard`].
///
/// Dropping every clone of the handle stops the guard and its feed.
///
/// `Clone` is cheap: all fields are `Arc`-wrapped.
#[derive(Clone)]
pub struct SessionHandle {
    guard: Arc<SessionGuard>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle").finish_non_exhaustive()
    }
}

impl SessionHandle {
    /// The user the guard last saw signed in.
    pub async fn current_user(&self) -> Option<AuthUser> {
        self.guard.state.lock().await.user.clone()
    }

    /// `true` while this session owns a running feed subscription.
    pub async fn has_feed(&self) -> bool {
        match &self.guard.state.lock().await.feed {
            Some(feed) => !feed.is_finished().await,
            None => false,
        }
    }

    /// Sign out through the backend, then cancel the feed and redirect.
    ///
    /// # Errors
    ///
    /// Returns [`DashboardError::Auth`] if the backend rejects the
    /// sign-out. The session is left as it was.
    pub async fn sign_out(&self) -> Result<(), DashboardError> {
        match self.guard.backend.sign_out().await {
            Ok(()) => {
                self.guard.apply(None).await;
                Ok(())
            }
            Err(e) => {
                let err = DashboardError::Auth(e);
                tracing::error!(error = %err, "sign-out failed");
                self.guard.banner.fail(&err);
                Err(err)
            }
        }
    }

    /// Stop observing auth state and cancel the feed.
    ///
    /// Calling `shutdown` more than once is safe: later calls return
    /// immediately.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);

        let task = self.task.lock().await.take();
        if let Some(join_handle) = task {
            if let Err(e) = join_handle.await {
                tracing::error!(error = %e, "session task panicked");
            }
            self.guard.teardown().await;
        }
    }

    /// `true` once the observer task has exited.
    pub async fn is_finished(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_none_or(JoinHandle::is_finished)
    }
}
