//! Transient, self-clearing status banners.
//!
//! Successful writes raise an acknowledgment; failed actions raise a
//! failure banner carrying the error text. Every raise schedules its own
//! clear after the configured duration, so a banner raised shortly after
//! another is cleared by the earlier raise's timer.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// What the banner currently says.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Banner {
    /// An approval decision was written.
    Submitted,
    /// The project amounts were saved.
    AmountsUpdated,
    /// An action failed; carries the user-facing reason.
    Failed(String),
}

impl Banner {
    /// `true` for the acknowledgment variants.
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }
}

/// Shared banner slot with auto-clear.
///
/// `Clone` is cheap: all fields are `Arc`-wrapped.
#[derive(Clone, Debug)]
pub struct BannerSignal {
    tx: Arc<watch::Sender<Option<Banner>>>,
    duration: Duration,
}

impl BannerSignal {
    /// Create an empty banner that clears `duration` after each raise.
    pub fn new(duration: Duration) -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            tx: Arc::new(tx),
            duration,
        }
    }

    /// Show `banner` and schedule it to clear.
    ///
    /// Must be called from within a tokio runtime.
    pub fn raise(&self, banner: Banner) {
        self.tx.send_replace(Some(banner));

        let tx = Arc::clone(&self.tx);
        let duration = self.duration;
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            tx.send_replace(None);
        });
    }

    /// Show a failure banner for `error`.
    pub fn fail(&self, error: &impl std::fmt::Display) {
        self.raise(Banner::Failed(error.to_string()));
    }

    /// The banner currently shown, if any.
    pub fn current(&self) -> Option<Banner> {
        self.tx.borrow().clone()
    }

    /// Observe banner changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<Banner>> {
        self.tx.subscribe()
    }

    /// How long each banner stays up.
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn banner_clears_after_duration() {
        let signal = BannerSignal::new(Duration::from_secs(3));
        signal.raise(Banner::Submitted);
        assert_eq!(signal.current(), Some(Banner::Submitted));

        tokio::time::sleep(Duration::from_millis(2_900)).await;
        assert_eq!(signal.current(), Some(Banner::Submitted));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(signal.current(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn earliest_pending_clear_wins() {
        let signal = BannerSignal::new(Duration::from_secs(3));
        signal.raise(Banner::Submitted);
        tokio::time::sleep(Duration::from_secs(2)).await;
        signal.raise(Banner::AmountsUpdated);
        assert_eq!(signal.current(), Some(Banner::AmountsUpdated));

        // The first raise's timer clears the second banner too.
        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert_eq!(signal.current(), None);

        // The second timer fires later and leaves it cleared.
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(signal.current(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn banner_raised_after_a_clear_gets_a_fresh_timer() {
        let signal = BannerSignal::new(Duration::from_secs(3));
        signal.raise(Banner::Submitted);
        tokio::time::sleep(Duration::from_millis(3_100)).await;
        assert_eq!(signal.current(), None);

        signal.raise(Banner::AmountsUpdated);
        tokio::time::sleep(Duration::from_millis(2_900)).await;
        assert_eq!(signal.current(), Some(Banner::AmountsUpdated));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(signal.current(), None);
    }

    #[tokio::test]
    async fn fail_carries_error_text() {
        let signal = BannerSignal::new(Duration::from_secs(3));
        signal.fail(&"backend unavailable: offline");
        let banner = signal.current().expect("banner raised");
        assert!(!banner.is_success());
        assert_eq!(
            banner,
            Banner::Failed("backend unavailable: offline".to_string())
        );
    }
}
