//! Record data model: categories, statuses, processed-email records and edits.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

/// Structured fields extracted from an email, keyed by field name.
pub type ExtractedFields = BTreeMap<String, String>;

/// Fallback subject when the email carries no `Subject:` line.
pub const NO_SUBJECT: &str = "No Subject";

/// Business intent of an email.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Customer asking for pricing.
    QuoteRequest,
    /// Customer placing an order.
    NewOrder,
    /// Customer asking about delivery status or dates.
    DeliveryQuestion,
    /// Anything else.
    #[default]
    Other,
}

/// Follow-up priority derived from the category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
        }
    }
}

impl Category {
    pub const ALL: [Category; 4] = [
        Self::QuoteRequest,
        Self::NewOrder,
        Self::DeliveryQuestion,
        Self::Other,
    ];

    /// Stable identifier used in the store file.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QuoteRequest => "quote_request",
            Self::NewOrder => "new_order",
            Self::DeliveryQuestion => "delivery_question",
            Self::Other => "other",
        }
    }

    /// Human-readable label, also used in prompts.
    pub fn label(&self) -> &'static str {
        match self {
            Self::QuoteRequest => "Quote Request",
            Self::NewOrder => "New Order",
            Self::DeliveryQuestion => "Delivery Question",
            Self::Other => "Other",
        }
    }

    pub fn priority(&self) -> Priority {
        match self {
            Self::NewOrder => Priority::High,
            Self::QuoteRequest | Self::DeliveryQuestion => Priority::Medium,
            Self::Other => Priority::Low,
        }
    }

    /// Match a free-form label ("Quote Request", "new-order", "Delivery Follow-up", ...).
    pub fn from_label(raw: &str) -> Option<Self> {
        match normalize_label(raw).as_str() {
            "quote_request" | "quote" | "quotation" | "quote_refresh" | "rfq"
            | "request_for_quote" | "request_for_quotation" | "pricing_request" => {
                Some(Self::QuoteRequest)
            }
            "new_order" | "new_order_received" | "order" | "order_received"
            | "purchase_order" | "po" => Some(Self::NewOrder),
            "delivery_question" | "delivery_follow_up" | "delivery_followup" | "delivery"
            | "delivery_inquiry" | "delivery_enquiry" | "delivery_status" | "shipping"
            | "shipping_question" => Some(Self::DeliveryQuestion),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    /// Like `from_label`, but anything unrecognized becomes `Other`.
    pub fn coerce(raw: &str) -> Self {
        Self::from_label(raw).unwrap_or(Self::Other)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_label(s).ok_or_else(|| format!("Unknown category: {}", s))
    }
}

/// Review status of a record, managed by humans.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Freshly processed, nobody has looked at it.
    #[default]
    New,
    /// Someone is working on the reply.
    InProgress,
    /// Handled.
    Done,
    /// Parked, waiting on something external.
    OnHold,
}

impl RecordStatus {
    pub const ALL: [RecordStatus; 4] = [Self::New, Self::InProgress, Self::Done, Self::OnHold];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::OnHold => "on_hold",
        }
    }

    /// Whether the record still needs attention.
    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Done)
    }
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RecordStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_label(s).as_str() {
            "new" | "pending" => Ok(Self::New),
            "in_progress" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            "on_hold" => Ok(Self::OnHold),
            _ => Err(format!("Unknown status: {}", s)),
        }
    }
}

/// Lowercase, collapse every run of non-alphanumerics into `_`, trim `_`.
fn normalize_label(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.trim().chars() {
        if ch.is_alphanumeric() {
            out.extend(ch.to_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}

/// A processed email: original text, classification, draft and review state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailRecord {
    /// Unique record ID, never reused.
    pub id: Uuid,
    /// The email exactly as submitted.
    pub received_text: String,
    /// Classified intent (human-editable).
    pub category: Category,
    /// Fields extracted during classification.
    pub extracted_fields: ExtractedFields,
    /// Suggested reply (human-editable).
    pub draft_reply: String,
    /// Review status (human-editable).
    pub status: RecordStatus,
    /// Free-text annotation (human-editable).
    pub notes: String,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
}

impl EmailRecord {
    /// Create a fresh record with a new ID, `new` status and empty notes.
    pub fn new(
        received_text: impl Into<String>,
        category: Category,
        extracted_fields: ExtractedFields,
        draft_reply: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            received_text: received_text.into(),
            category,
            extracted_fields,
            draft_reply: draft_reply.into(),
            status: RecordStatus::default(),
            notes: String::new(),
            created_at: Utc::now(),
        }
    }

    /// Subject line, from extracted fields.
    pub fn subject(&self) -> &str {
        self.extracted_fields
            .get("subject")
            .map(String::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(NO_SUBJECT)
    }

    /// Subject for a reply: `Re: <subject>` unless already prefixed.
    pub fn reply_subject(&self) -> String {
        let subject = self.subject();
        if subject.to_lowercase().starts_with("re:") {
            subject.to_string()
        } else {
            format!("Re: {}", subject)
        }
    }

    pub fn priority(&self) -> Priority {
        self.category.priority()
    }
}

/// A partial edit to a record. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPatch {
    pub category: Option<Category>,
    pub status: Option<RecordStatus>,
    pub notes: Option<String>,
    pub draft_reply: Option<String>,
}

impl RecordPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_status(mut self, status: RecordStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_draft_reply(mut self, draft_reply: impl Into<String>) -> Self {
        self.draft_reply = Some(draft_reply.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.category.is_none()
            && self.status.is_none()
            && self.notes.is_none()
            && self.draft_reply.is_none()
    }

    /// Build a patch from name/value pairs, as a table editor would send them.
    pub fn from_fields<I, K, V>(fields: I) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut patch = Self::default();
        for (name, value) in fields {
            let name = name.as_ref();
            let value: String = value.into();
            match name {
                "category" => {
                    patch.category = Some(value.parse().map_err(|_| StoreError::InvalidValue {
                        field: name.to_string(),
                        value: value.clone(),
                    })?);
                }
                "status" => {
                    patch.status = Some(value.parse().map_err(|_| StoreError::InvalidValue {
                        field: name.to_string(),
                        value: value.clone(),
                    })?);
                }
                "notes" => patch.notes = Some(value),
                "draft_reply" => patch.draft_reply = Some(value),
                "id" | "received_text" | "extracted_fields" | "created_at" => {
                    return Err(StoreError::ImmutableField {
                        field: name.to_string(),
                    });
                }
                _ => {
                    return Err(StoreError::UnknownField {
                        field: name.to_string(),
                    });
                }
            }
        }
        Ok(patch)
    }

    /// Apply the patch in place.
    pub fn apply(&self, record: &mut EmailRecord) {
        if let Some(category) = self.category {
            record.category = category;
        }
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(ref notes) = self.notes {
            record.notes = notes.clone();
        }
        if let Some(ref draft) = self.draft_reply {
            record.draft_reply = draft.clone();
        }
    }
}
