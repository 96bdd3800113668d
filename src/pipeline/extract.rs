//! Regex field extraction that runs alongside the LLM classifier.
//!
//! Pure string parsing, no LLM calls. Results only fill keys the
//! classifier backend left empty.

use std::sync::LazyLock;

use regex::Regex;

use crate::store::record::ExtractedFields;

static SUBJECT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t]*subject:[ \t]*(.*?)[ \t]*\r?$").expect("valid regex")
});

static FROM_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t]*from:[ \t]*(.*?)[ \t]*\r?$").expect("valid regex")
});

static ANGLE_ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<([^>]+)>").expect("valid regex"));

static BARE_ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\w.\-+]+@[\w.\-]+").expect("valid regex"));

/// "50 units of part X", "200 pcs of SC-3100-D Power Converters".
static QUANTITY_OF_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(\d[\d,]*)\s+(?:units?|pieces?|pcs|items?|sets?|boxes|cases|rolls?)\s+of\s+(?:the\s+)?([^\n.,;:!?]+)",
    )
    .expect("valid regex")
});

/// "QUANTITY: 10 units"
static QUANTITY_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t]*(?:quantity|qty)[ \t]*:[ \t]*(\d[\d,]*)").expect("valid regex")
});

/// "ITEM: AI-ML-V4, Industrial Motor Looms"
static ITEM_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t]*(?:item|part|product)[ \t]*:[ \t]*(.*?)[ \t]*\r?$")
        .expect("valid regex")
});

/// "PO2025-095", "PO-PW-1134", "PO-2025-790".
static ORDER_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(PO-?[A-Z]*-?\d[\d-]*\d|PO-?[A-Z]*-?\d)\b").expect("valid regex")
});

/// Subject line text, if the email has a non-empty `Subject:` header.
pub fn extract_subject(text: &str) -> Option<String> {
    SUBJECT_LINE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Sender display name and address from the `From:` line.
///
/// Handles `Name <addr>`, `"Name" <addr>`, bare `addr` and bare names.
pub fn extract_sender(text: &str) -> (Option<String>, Option<String>) {
    let Some(from_line) = FROM_LINE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
    else {
        return (None, None);
    };

    let clean_name = |rest: String| {
        let name = rest.replace('"', "").trim().to_string();
        if name.is_empty() { None } else { Some(name) }
    };

    if let Some(caps) = ANGLE_ADDRESS.captures(from_line)
        && let (Some(whole), Some(addr)) = (caps.get(0), caps.get(1))
    {
        let name = from_line.replace(whole.as_str(), "");
        return (clean_name(name), Some(addr.as_str().trim().to_string()));
    }

    if let Some(addr) = BARE_ADDRESS.find(from_line) {
        let name = from_line.replace(addr.as_str(), "");
        return (clean_name(name), Some(addr.as_str().to_string()));
    }

    (Some(from_line.to_string()), None)
}

/// Quantity and item, from prose ("50 units of part X") or labelled lines.
pub fn extract_quantity_and_item(text: &str) -> (Option<String>, Option<String>) {
    if let Some(caps) = QUANTITY_OF_ITEM.captures(text) {
        let quantity = caps.get(1).map(|m| m.as_str().replace(',', ""));
        let item = caps
            .get(2)
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty());
        return (quantity, item);
    }

    let quantity = QUANTITY_LABEL
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().replace(',', ""));
    let item = ITEM_LABEL
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty());
    (quantity, item)
}

/// First purchase-order reference in the text.
pub fn extract_order_reference(text: &str) -> Option<String> {
    ORDER_REFERENCE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// All heuristic fields found in `text`.
pub fn heuristic_fields(text: &str) -> ExtractedFields {
    let mut fields = ExtractedFields::new();

    if let Some(subject) = extract_subject(text) {
        fields.insert("subject".to_string(), subject);
    }

    let (name, email) = extract_sender(text);
    if let Some(name) = name {
        fields.insert("sender_name".to_string(), name);
    }
    if let Some(email) = email {
        fields.insert("sender_email".to_string(), email);
    }

    let (quantity, item) = extract_quantity_and_item(text);
    if let Some(quantity) = quantity {
        fields.insert("quantity".to_string(), quantity);
    }
    if let Some(item) = item {
        fields.insert("item".to_string(), item);
    }

    if let Some(reference) = extract_order_reference(text) {
        fields.insert("order_reference".to_string(), reference);
    }

    fields
}
