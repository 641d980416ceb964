//! The canonical transaction record produced by the pipeline.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QuantityUnit {
    Tons,
    Cy,
    Loads,
}

impl QuantityUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tons => "TONS",
            Self::Cy => "CY",
            Self::Loads => "LOADS",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "TONS" | "TON" => Some(Self::Tons),
            "CY" | "YD" | "YDS" | "CUYD" => Some(Self::Cy),
            "LOADS" | "LOAD" | "LD" | "LDS" => Some(Self::Loads),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TicketType {
    Import,
    Export,
}

impl TicketType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Import => "IMPORT",
            Self::Export => "EXPORT",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "IMPORT" => Some(Self::Import),
            "EXPORT" => Some(Self::Export),
            _ => None,
        }
    }
}

/// A validated, deduplicated truck ticket.
///
/// Constructed by the per-page processor after extraction; `duplicate_of`
/// and `review_required` are the only fields mutated during validation.
/// Immutable once committed to the system of record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TruckTicket {
    /// Database id, set on commit.
    pub id: Option<i64>,
    pub ticket_number: String,
    pub ticket_date: NaiveDate,
    pub quantity: Option<f64>,
    pub quantity_unit: Option<QuantityUnit>,
    pub job_id: i64,
    pub material_id: i64,
    pub source_id: Option<i64>,
    pub destination_id: Option<i64>,
    pub vendor_id: Option<i64>,
    pub ticket_type: TicketType,
    pub manifest_number: Option<String>,
    pub truck_number: Option<String>,
    pub file_id: PathBuf,
    pub file_page: u32,
    /// SHA-256 of the source file, lowercase hex.
    pub file_hash: String,
    pub duplicate_of: Option<i64>,
    pub review_required: bool,
    /// Aggregate extraction confidence over the required fields, 0.0–1.0.
    pub confidence: f32,
    pub created_at: DateTime<Utc>,
}

impl TruckTicket {
    /// One-line operator-facing summary, used when attaching both sides
    /// of a duplicate pair to a review entry.
    pub fn summary(&self) -> String {
        format!(
            "#{} {} vendor={} qty={} page={}:{}",
            self.ticket_number,
            self.ticket_date,
            self.vendor_id.map_or("-".to_string(), |v| v.to_string()),
            self.quantity.map_or("-".to_string(), |q| q.to_string()),
            self.file_id.display(),
            self.file_page,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantity_unit_parsing() {
        assert_eq!(QuantityUnit::from_str("tons"), Some(QuantityUnit::Tons));
        assert_eq!(QuantityUnit::from_str("TON"), Some(QuantityUnit::Tons));
        assert_eq!(QuantityUnit::from_str(" cy "), Some(QuantityUnit::Cy));
        assert_eq!(QuantityUnit::from_str("loads"), Some(QuantityUnit::Loads));
        assert_eq!(QuantityUnit::from_str("gallons"), None);
    }

    #[test]
    fn test_ticket_type_parsing() {
        assert_eq!(TicketType::from_str("import"), Some(TicketType::Import));
        assert_eq!(TicketType::from_str("EXPORT"), Some(TicketType::Export));
        assert_eq!(TicketType::from_str("transfer"), None);
    }

    #[test]
    fn test_summary_includes_key_fields() {
        let ticket = TruckTicket {
            id: Some(7),
            ticket_number: "12345678".to_string(),
            ticket_date: NaiveDate::from_ymd_opt(2024, 10, 17).unwrap(),
            quantity: Some(14.5),
            quantity_unit: Some(QuantityUnit::Tons),
            job_id: 1,
            material_id: 2,
            source_id: None,
            destination_id: None,
            vendor_id: Some(3),
            ticket_type: TicketType::Import,
            manifest_number: None,
            truck_number: None,
            file_id: PathBuf::from("scan.pdf"),
            file_page: 2,
            file_hash: "0".repeat(64),
            duplicate_of: None,
            review_required: false,
            confidence: 0.92,
            created_at: Utc::now(),
        };

        let s = ticket.summary();
        assert!(s.contains("12345678"));
        assert!(s.contains("2024-10-17"));
        assert!(s.contains("vendor=3"));
        assert!(s.contains("scan.pdf:2"));
    }
}
