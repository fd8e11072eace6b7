use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One line item as read off the scanned invoice.
///
/// `name` is the raw invoice text; canonical material resolution happens
/// later, in the intake pipeline, never here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedLine {
    pub name: String,
    pub quantity: i64,
    /// Unit price in integer cents.
    pub unit_price: i64,
}

/// Structured fields an extractor reads from a stored invoice scan.
///
/// Everything here is untrusted: the intake validation path treats an
/// extracted draft exactly like a manually entered one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedInvoice {
    pub provider_name: String,
    pub provider_tax_id: String,
    pub invoice_number: String,
    pub issue_date: Option<DateTime<Utc>>,
    /// Declared invoice total in cents. When present it is carried into the
    /// document as-is instead of recomputing net + tax.
    pub total_amount: Option<i64>,
    pub lines: Vec<ExtractedLine>,
    #[serde(default)]
    pub purchase_order_ref: Option<String>,
    #[serde(default)]
    pub delivery_note_ref: Option<String>,
    #[serde(default)]
    pub vehicle_plate: Option<String>,
}
