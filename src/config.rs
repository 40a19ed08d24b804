//! Dashboard configuration.
//!
//! [`DashboardConfig`] has sensible defaults for every field and can be
//! overridden in code through [`DashboardBuilder`](crate::DashboardBuilder)
//! or loaded from a JSON file with [`DashboardConfig::load`]. Every field is
//! optional in the file; durations are given in milliseconds.
//!
//! ```json
//! {
//!   "feed": { "collection": "pays", "cue_on_initial_snapshot": false },
//!   "project_id": "main",
//!   "amount_defaults": {
//!     "totalAmount": "970.000",
//!     "paidAmount": "152.670",
//!     "remainingAmount": "817.330"
//!   },
//!   "ack_duration_ms": 3000
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::amounts::{ProjectAmounts, derive_remaining};
use crate::error::ConfigError;
use crate::feed::FeedConfig;

/// Default collection holding the project amount singleton.
pub const DEFAULT_PROJECTS_COLLECTION: &str = "projects";

/// Default document id of the project amount singleton.
pub const DEFAULT_PROJECT_ID: &str = "main";

/// How long acknowledgment and failure banners stay up by default.
pub const DEFAULT_ACK_DURATION: Duration = Duration::from_secs(3);

/// Top-level configuration for a [`Dashboard`](crate::Dashboard).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use notification_feed::DashboardConfig;
///
/// let config = DashboardConfig {
///     ack_duration: Duration::from_secs(5),
///     ..DashboardConfig::default()
/// };
/// assert_eq!(config.feed.collection, "pays");
/// assert_eq!(config.amount_defaults.total_amount, "970.000");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Live feed subscription settings, including the notification
    /// collection that the moderation controllers write to.
    pub feed: FeedConfig,

    /// Collection holding the project amount singleton.
    pub projects_collection: String,

    /// Document id of the project amount singleton.
    pub project_id: String,

    /// Amounts shown when the singleton does not exist yet or a field is
    /// missing from it.
    ///
    /// Default: `970.000` total, `152.670` paid, `817.330` remaining. A
    /// `remainingAmount` given in a config file is ignored and derived from
    /// the other two on [`load`](DashboardConfig::load).
    pub amount_defaults: ProjectAmounts,

    /// How long acknowledgment and failure banners stay up.
    ///
    /// Default: 3 seconds.
    #[serde(rename = "ack_duration_ms", with = "duration_ms")]
    pub ack_duration: Duration,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            feed: FeedConfig::default(),
            projects_collection: DEFAULT_PROJECTS_COLLECTION.to_owned(),
            project_id: DEFAULT_PROJECT_ID.to_owned(),
            amount_defaults: ProjectAmounts::default(),
            ack_duration: DEFAULT_ACK_DURATION,
        }
    }
}

impl DashboardConfig {
    /// Load configuration from a JSON file.
    ///
    /// Fields absent from the file keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Invalid`] if it is not valid configuration JSON, and
    /// [`ConfigError::Amounts`] if the default amounts are not numbers.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&content)?;
        let defaults = &mut config.amount_defaults;
        defaults.remaining_amount =
            derive_remaining(&defaults.total_amount, &defaults.paid_amount)?;
        tracing::debug!(path = %path.display(), "loaded dashboard config");
        Ok(config)
    }
}

/// Serde adapter storing a [`Duration`] as whole milliseconds.
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
