//! Reference entities: the canonical names tickets resolve against.

use serde::{Deserialize, Serialize};

/// The reference-data categories known to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefCategory {
    Job,
    Material,
    Source,
    Destination,
    Vendor,
    TicketType,
}

impl RefCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Job => "job",
            Self::Material => "material",
            Self::Source => "source",
            Self::Destination => "destination",
            Self::Vendor => "vendor",
            Self::TicketType => "ticket_type",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "job" => Some(Self::Job),
            "material" => Some(Self::Material),
            "source" => Some(Self::Source),
            "destination" => Some(Self::Destination),
            "vendor" => Some(Self::Vendor),
            "ticket_type" => Some(Self::TicketType),
            _ => None,
        }
    }
}

impl std::fmt::Display for RefCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row of reference data. Created at seed time, read-mostly afterwards.
#[derive(Debug, Clone)]
pub struct ReferenceEntity {
    pub id: i64,
    pub category: RefCategory,
    /// Unique within its category.
    pub canonical_name: String,
    /// Only meaningful for materials: whether disposal of this material
    /// is regulated and must carry a manifest number.
    pub requires_manifest: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_round_trip() {
        for cat in [
            RefCategory::Job,
            RefCategory::Material,
            RefCategory::Source,
            RefCategory::Destination,
            RefCategory::Vendor,
            RefCategory::TicketType,
        ] {
            assert_eq!(RefCategory::from_str(cat.as_str()), Some(cat));
        }
        assert_eq!(RefCategory::from_str("unknown"), None);
    }
}
