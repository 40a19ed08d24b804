//! Project amount singleton: load, validate, derive, and save.
//!
//! `remainingAmount` is never entered by the operator. It is derived from
//! the total and paid amounts by [`derive_remaining`], both when saving and
//! when previewing an edit.

use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;

use crate::backend::{Backend, Fields};
use crate::banner::{Banner, BannerSignal};
use crate::error::{DashboardError, ParseError};

/// Stored field name of the total amount.
pub const TOTAL_AMOUNT_FIELD: &str = "totalAmount";
/// Stored field name of the paid amount.
pub const PAID_AMOUNT_FIELD: &str = "paidAmount";
/// Stored field name of the derived remaining amount.
pub const REMAINING_AMOUNT_FIELD: &str = "remainingAmount";

/// Total shown before the singleton is first saved.
pub const DEFAULT_TOTAL_AMOUNT: &str = "970.000";
/// Paid amount shown before the singleton is first saved.
pub const DEFAULT_PAID_AMOUNT: &str = "152.670";
/// Remaining amount shown before the singleton is first saved.
pub const DEFAULT_REMAINING_AMOUNT: &str = "817.330";

/// Decimal places the remaining amount is rounded and rendered to.
const REMAINING_SCALE: u32 = 3;

/// The stored amount triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectAmounts {
    /// Operator-entered total.
    pub total_amount: String,
    /// Operator-entered paid amount.
    pub paid_amount: String,
    /// `total_amount - paid_amount`, rounded to three decimals.
    #[serde(default)]
    pub remaining_amount: String,
}

impl Default for ProjectAmounts {
    fn default() -> Self {
        Self {
            total_amount: DEFAULT_TOTAL_AMOUNT.to_owned(),
            paid_amount: DEFAULT_PAID_AMOUNT.to_owned(),
            remaining_amount: DEFAULT_REMAINING_AMOUNT.to_owned(),
        }
    }
}

/// The operator-editable part of [`ProjectAmounts`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AmountForm {
    /// Total as typed, possibly with grouping separators.
    pub total_amount: String,
    /// Paid amount as typed, possibly with grouping separators.
    pub paid_amount: String,
}

impl AmountForm {
    /// Create a form from raw input.
    pub fn new(total_amount: impl Into<String>, paid_amount: impl Into<String>) -> Self {
        Self {
            total_amount: total_amount.into(),
            paid_amount: paid_amount.into(),
        }
    }

    /// Prefill a form from stored amounts.
    pub fn from_amounts(amounts: &ProjectAmounts) -> Self {
        Self::new(&amounts.total_amount, &amounts.paid_amount)
    }

    /// What `remainingAmount` would become if this form were saved.
    pub fn preview_remaining(&self) -> Result<String, ParseError> {
        derive_remaining(&self.total_amount, &self.paid_amount)
    }
}

/// Parse an operator-entered amount.
///
/// `,` grouping separators and surrounding whitespace are ignored.
///
/// # Errors
///
/// [`ParseError::Empty`] if nothing is left after stripping, and
/// [`ParseError::Invalid`] if the rest is not a decimal number. Only `,`
/// counts as a separator: `1_000` is invalid.
pub fn parse_amount(field: &'static str, input: &str) -> Result<Decimal, ParseError> {
    let cleaned: String = input.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return Err(ParseError::Empty { field });
    }
    let invalid = || ParseError::Invalid {
        field,
        input: input.to_owned(),
    };
    if cleaned.contains('_') {
        return Err(invalid());
    }
    Decimal::from_str(&cleaned).map_err(|_| invalid())
}

/// Compute `total - paid`, rounded half away from zero to three decimals
/// and rendered with exactly three decimals.
///
/// # Examples
///
/// ```
/// use notification_feed::derive_remaining;
///
/// assert_eq!(derive_remaining("970.000", "152.670").unwrap(), "817.330");
/// assert_eq!(derive_remaining("1,000", "0.25").unwrap(), "999.750");
/// assert!(derive_remaining("abc", "1").is_err());
/// ```
///
/// # Errors
///
/// Any [`parse_amount`] error, or [`ParseError::OutOfRange`] if the
/// difference overflows or is too large to carry three decimals.
pub fn derive_remaining(total_input: &str, paid_input: &str) -> Result<String, ParseError> {
    let total = parse_amount(TOTAL_AMOUNT_FIELD, total_input)?;
    let paid = parse_amount(PAID_AMOUNT_FIELD, paid_input)?;
    let out_of_range = || ParseError::OutOfRange {
        total: total_input.to_owned(),
        paid: paid_input.to_owned(),
    };

    let mut remaining = total
        .checked_sub(paid)
        .ok_or_else(out_of_range)?
        .round_dp_with_strategy(REMAINING_SCALE, RoundingStrategy::MidpointAwayFromZero);
    remaining.rescale(REMAINING_SCALE);
    if remaining.scale() != REMAINING_SCALE {
        return Err(out_of_range());
    }
    Ok(remaining.to_string())
}

/// Loads and saves the project amount singleton and holds the local copy.
///
/// `Clone` is cheap: all fields are `Arc`-wrapped.
#[derive(Clone)]
pub struct AmountStore {
    backend: Arc<dyn Backend>,
    collection: String,
    id: String,
    defaults: ProjectAmounts,
    state: Arc<watch::Sender<ProjectAmounts>>,
    updating: Arc<AtomicBool>,
    banner: BannerSignal,
}

impl std::fmt::Debug for AmountStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmountStore")
            .field("collection", &self.collection)
            .field("id", &self.id)
            .field("current", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl AmountStore {
    /// Create a store for `collection/id` whose local copy starts at
    /// `defaults`.
    pub fn new(
        backend: Arc<dyn Backend>,
        collection: impl Into<String>,
        id: impl Into<String>,
        defaults: ProjectAmounts,
        banner: BannerSignal,
    ) -> Self {
        let (tx, _) = watch::channel(defaults.clone());
        Self {
            backend,
            collection: collection.into(),
            id: id.into(),
            defaults,
            state: Arc::new(tx),
            updating: Arc::new(AtomicBool::new(false)),
            banner,
        }
    }

    /// Read the singleton once and publish it locally.
    ///
    /// A missing document, or a missing or empty field, falls back to the
    /// configured defaults. A read failure is logged and leaves the local
    /// copy untouched.
    pub async fn load(&self) -> ProjectAmounts {
        match self.backend.get(&self.collection, &self.id).await {
            Ok(doc) => {
                let fields = doc.map(|d| d.fields).unwrap_or_default();
                let amounts = ProjectAmounts {
                    total_amount: field_or(&fields, TOTAL_AMOUNT_FIELD, &self.defaults.total_amount),
                    paid_amount: field_or(&fields, PAID_AMOUNT_FIELD, &self.defaults.paid_amount),
                    remaining_amount: field_or(
                        &fields,
                        REMAINING_AMOUNT_FIELD,
                        &self.defaults.remaining_amount,
                    ),
                };
                tracing::debug!(
                    collection = %self.collection,
                    id = %self.id,
                    total = %amounts.total_amount,
                    paid = %amounts.paid_amount,
                    "loaded project amounts"
                );
                self.state.send_replace(amounts.clone());
                amounts
            }
            Err(e) => {
                tracing::error!(
                    collection = %self.collection,
                    id = %self.id,
                    error = %e,
                    "failed to load project amounts"
                );
                self.current()
            }
        }
    }

    /// Validate `form`, derive the remaining amount, and merge-write all
    /// three fields.
    ///
    /// Local state changes only after the write succeeds.
    ///
    /// # Errors
    ///
    /// [`DashboardError::Parse`] if either amount is not a number; nothing
    /// is written. [`DashboardError::Write`] if the backend rejects the
    /// write.
    pub async fn save(&self, form: &AmountForm) -> Result<ProjectAmounts, DashboardError> {
        let remaining_amount = match form.preview_remaining() {
            Ok(remaining) => remaining,
            Err(e) => {
                tracing::error!(error = %e, "rejected project amounts");
                self.banner.fail(&e);
                return Err(e.into());
            }
        };
        let amounts = ProjectAmounts {
            total_amount: form.total_amount.trim().to_owned(),
            paid_amount: form.paid_amount.trim().to_owned(),
            remaining_amount,
        };

        self.updating.store(true, Ordering::Release);
        let result = self
            .backend
            .set_merge(&self.collection, &self.id, to_fields(&amounts))
            .await;
        self.updating.store(false, Ordering::Release);

        match result {
            Ok(()) => {
                tracing::info!(
                    collection = %self.collection,
                    id = %self.id,
                    remaining = %amounts.remaining_amount,
                    "saved project amounts"
                );
                self.state.send_replace(amounts.clone());
                self.banner.raise(Banner::AmountsUpdated);
                Ok(amounts)
            }
            Err(source) => {
                let err = DashboardError::Write {
                    id: self.id.clone(),
                    source,
                };
                tracing::error!(error = %err, "failed to save project amounts");
                self.banner.fail(&err);
                Err(err)
            }
        }
    }

    /// The local copy.
    pub fn current(&self) -> ProjectAmounts {
        self.state.borrow().clone()
    }

    /// Observe changes to the local copy.
    pub fn subscribe(&self) -> watch::Receiver<ProjectAmounts> {
        self.state.subscribe()
    }

    /// `true` while a save is in flight.
    pub fn is_updating(&self) -> bool {
        self.updating.load(Ordering::Acquire)
    }

    /// Put the local copy back to the configured defaults.
    pub fn reset(&self) {
        self.state.send_replace(self.defaults.clone());
    }
}

fn field_or(fields: &Fields, name: &str, default: &str) -> String {
    match fields.get(name) {
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => default.to_owned(),
    }
}

fn to_fields(amounts: &ProjectAmounts) -> Fields {
    Fields::from_iter([
        (
            TOTAL_AMOUNT_FIELD.to_owned(),
            Value::String(amounts.total_amount.clone()),
        ),
        (
            PAID_AMOUNT_FIELD.to_owned(),
            Value::String(amounts.paid_amount.clone()),
        ),
        (
            REMAINING_AMOUNT_FIELD.to_owned(),
            Value::String(amounts.remaining_amount.clone()),
        ),
    ])
}
