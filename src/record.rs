//! Notification records as decoded from backend documents.
//!
//! Only the fields this crate acts on are typed: the sort key, the approval
//! status, and the soft-hide flag. Everything else a producer submitted is
//! carried through untouched in [`NotificationRecord::payload`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::{Document, Fields};

/// Field holding the creation timestamp; the feed's sort key.
pub const CREATED_DATE_FIELD: &str = "createdDate";
/// Field holding the approval status.
pub const STATUS_FIELD: &str = "status";
/// Field holding the soft-hide flag.
pub const IS_HIDDEN_FIELD: &str = "isHidden";

/// Approval state of a notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    /// No decision yet. Also used when the field is absent.
    #[default]
    Pending,
    /// Accepted by an operator.
    Approved,
    /// Declined by an operator.
    Rejected,
}

impl ApprovalStatus {
    /// The wire representation stored in the `status` field.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Decode a stored `status` value. Absent or unrecognized values are
    /// [`Pending`](ApprovalStatus::Pending).
    pub fn from_value(value: Option<&Value>) -> Self {
        match value.and_then(Value::as_str) {
            Some("approved") => Self::Approved,
            Some("rejected") => Self::Rejected,
            _ => Self::Pending,
        }
    }
}

/// One submitted notification.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRecord {
    /// Backend-assigned identifier.
    pub id: String,
    /// Creation timestamp as stored. Empty if the producer omitted it.
    pub created_date: String,
    /// Operator decision.
    pub status: ApprovalStatus,
    /// Soft-delete flag. Hidden records are never published by the feed.
    pub is_hidden: bool,
    /// All remaining producer fields, uninterpreted.
    pub payload: Fields,
}

impl NotificationRecord {
    /// Decode a backend document.
    ///
    /// Decoding is total: missing or mistyped tracked fields fall back to
    /// their defaults rather than dropping the record. `isHidden` uses
    /// truthiness so that a producer writing `"true"` or `1` still hides.
    pub fn from_document(doc: &Document) -> Self {
        let mut payload = doc.fields.clone();
        let created_date = match payload.remove(CREATED_DATE_FIELD) {
            Some(Value::String(s)) => s,
            Some(other) if !other.is_null() => other.to_string(),
            _ => String::new(),
        };
        let status = ApprovalStatus::from_value(payload.remove(STATUS_FIELD).as_ref());
        let is_hidden = payload
            .remove(IS_HIDDEN_FIELD)
            .as_ref()
            .is_some_and(is_truthy);

        Self {
            id: doc.id.clone(),
            created_date,
            status,
            is_hidden,
            payload,
        }
    }

    /// `true` if the record may appear in the feed.
    pub fn is_visible(&self) -> bool {
        !self.is_hidden
    }

    /// Parse [`created_date`](Self::created_date) as an RFC 3339 timestamp.
    ///
    /// Used for display ("5 minutes ago"); ordering always follows the
    /// backend's ordering of the raw string.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.created_date)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Look up a producer field by name.
    pub fn payload_field(&self, name: &str) -> Option<&Value> {
        self.payload.get(name)
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, fields: Value) -> Document {
        let Value::Object(map) = fields else {
            panic!("fixture fields must be an object");
        };
        Document::new(id, map)
    }

    #[test]
    fn decodes_tracked_fields_and_keeps_payload() {
        let record = NotificationRecord::from_document(&doc(
            "A",
            json!({
                "createdDate": "2026-10-16T09:00:00Z",
                "status": "approved",
                "isHidden": false,
                "page": "checkout",
                "country": "KW"
            }),
        ));
        assert_eq!(record.id, "A");
        assert_eq!(record.created_date, "2026-10-16T09:00:00Z");
        assert_eq!(record.status, ApprovalStatus::Approved);
        assert!(record.is_visible());
        assert_eq!(record.payload.len(), 2);
        assert_eq!(record.payload_field("page"), Some(&json!("checkout")));
        assert!(record.payload_field("status").is_none());
    }

    #[test]
    fn absent_fields_use_defaults() {
        let record = NotificationRecord::from_document(&doc("B", json!({})));
        assert_eq!(record.created_date, "");
        assert_eq!(record.status, ApprovalStatus::Pending);
        assert!(!record.is_hidden);
    }

    #[test]
    fn truthy_hidden_values_hide() {
        for value in [json!(true), json!("true"), json!(1)] {
            let record = NotificationRecord::from_document(&doc("C", json!({ "isHidden": value })));
            assert!(record.is_hidden, "{value} should hide the record");
        }
        for value in [json!(false), json!(null), json!(0), json!("")] {
            let record = NotificationRecord::from_document(&doc("C", json!({ "isHidden": value })));
            assert!(!record.is_hidden, "{value} should not hide the record");
        }
    }

    #[test]
    fn unknown_status_is_pending() {
        let record = NotificationRecord::from_document(&doc("D", json!({ "status": "escalated" })));
        assert_eq!(record.status, ApprovalStatus::Pending);
    }

    #[test]
    fn created_at_parses_rfc3339_only() {
        let ok = NotificationRecord::from_document(&doc(
            "E",
            json!({ "createdDate": "2026-10-16T12:30:00+03:00" }),
        ));
        let parsed = ok.created_at().expect("valid timestamp");
        assert_eq!(parsed.to_rfc3339(), "2026-10-16T09:30:00+00:00");

        let bad = NotificationRecord::from_document(&doc("F", json!({ "createdDate": "yesterday" })));
        assert!(bad.created_at().is_none());
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(ApprovalStatus::Rejected).expect("serialize"),
            json!("rejected")
        );
        assert_eq!(ApprovalStatus::Approved.as_str(), "approved");
    }
}
