//! Crate-level error types for backend calls, dashboard actions, amount
//! parsing, and configuration loading.

/// Error reported by a [`Backend`](crate::Backend) implementation.
///
/// These map onto the failure classes a hosted document store exposes:
/// missing documents, rejected credentials, transport outages, and aborted
/// (all-or-nothing) batch commits.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The addressed document does not exist.
    #[error("document {collection}/{id} not found")]
    NotFound {
        /// Collection the lookup ran against.
        collection: String,
        /// Document identifier that was not found.
        id: String,
    },

    /// The caller is not allowed to perform the operation.
    ///
    /// Typically returned when the session expired or security rules
    /// reject the read or write.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The backend could not be reached.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// A batch commit was aborted and none of its writes were applied.
    #[error("batch aborted: {0}")]
    Aborted(String),

    /// The backend side of a channel (auth observer, subscription) has
    /// gone away.
    #[error("backend channel closed")]
    Closed,
}

/// Error returned when an operator-entered amount cannot be used in
/// arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The field was empty after stripping separators and whitespace.
    #[error("{field} is empty")]
    Empty {
        /// Name of the offending form field.
        field: &'static str,
    },

    /// The field is not a decimal number.
    #[error("{field} is not a number: {input:?}")]
    Invalid {
        /// Name of the offending form field.
        field: &'static str,
        /// The raw text the operator entered.
        input: String,
    },

    /// The amounts parse, but their difference cannot be represented with
    /// three decimal places.
    #[error("{total} - {paid} is out of range")]
    OutOfRange {
        /// The total as entered.
        total: String,
        /// The paid amount as entered.
        paid: String,
    },
}

/// Error returned by a dashboard action.
///
/// Every variant wraps the underlying cause. A failed action never leaves
/// partially applied local state behind: the caller may rely on the feed
/// list and amount state being exactly what they were before the call.
#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    /// Session observation or sign-out failed.
    #[error("auth error: {0}")]
    Auth(#[source] BackendError),

    /// The live feed subscription could not be opened or broke.
    #[error("subscription error: {0}")]
    Subscription(#[source] BackendError),

    /// A single-document write failed.
    #[error("write to {id} failed: {source}")]
    Write {
        /// Document the write targeted.
        id: String,
        /// Backend failure.
        #[source]
        source: BackendError,
    },

    /// A bulk-hide batch failed; no record was changed.
    #[error("batch of {count} writes failed: {source}")]
    Batch {
        /// Number of writes the batch carried.
        count: usize,
        /// Backend failure.
        #[source]
        source: BackendError,
    },

    /// An amount could not be parsed; nothing was written.
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Error returned when loading a [`DashboardConfig`](crate::DashboardConfig)
/// from disk fails.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid configuration JSON.
    #[error("invalid config: {0}")]
    Invalid(#[from] serde_json::Error),

    /// The configured default amounts cannot be used in arithmetic.
    #[error("invalid amount defaults: {0}")]
    Amounts(#[from] ParseError),
}
