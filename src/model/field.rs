//! Typed content schema used for hashing and diffing

use crate::model::record::Price;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Names of the content fields of a catalog item
///
/// Variants are declared in lexicographic order of their names, so `ALL`
/// and the derived `Ord` both give the canonical field order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldName {
    Availability,
    Category,
    Description,
    ImageUrl,
    PriceExclTax,
    PriceInclTax,
    Rating,
    ReviewCount,
    Title,
}

impl FieldName {
    /// Every content field, in canonical order
    pub const ALL: [FieldName; 9] = [
        FieldName::Availability,
        FieldName::Category,
        FieldName::Description,
        FieldName::ImageUrl,
        FieldName::PriceExclTax,
        FieldName::PriceInclTax,
        FieldName::Rating,
        FieldName::ReviewCount,
        FieldName::Title,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Availability => "availability",
            Self::Category => "category",
            Self::Description => "description",
            Self::ImageUrl => "image_url",
            Self::PriceExclTax => "price_excl_tax",
            Self::PriceInclTax => "price_incl_tax",
            Self::Rating => "rating",
            Self::ReviewCount => "review_count",
            Self::Title => "title",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.as_str() == s)
    }

    /// True for either of the two price fields
    pub fn is_price(&self) -> bool {
        matches!(self, Self::PriceExclTax | Self::PriceInclTax)
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value of one content field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    /// An optional field that was absent on the page
    Missing,
    Money(Price),
    Count(u32),
    Stars(u8),
}

impl FieldValue {
    pub fn from_optional(value: Option<&str>) -> Self {
        match value {
            Some(s) => Self::Text(s.to_string()),
            None => Self::Missing,
        }
    }

    /// Stable textual encoding used in the canonical serialization
    ///
    /// Each variant carries a distinct prefix so that, say, the text `"5"`
    /// and the count `5` never encode identically.
    pub fn canonical(&self) -> String {
        match self {
            Self::Text(s) => format!("s:{}", serde_json::Value::from(s.as_str())),
            Self::Missing => "null".to_string(),
            Self::Money(p) => format!("m:{}", p.minor()),
            Self::Count(n) => format!("n:{}", n),
            Self::Stars(n) => format!("r:{}", n),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Missing => f.write_str("-"),
            Self::Money(p) => write!(f, "{}", p),
            Self::Count(n) => write!(f, "{}", n),
            Self::Stars(n) => write!(f, "{}", n),
        }
    }
}

/// One differing field between the stored and the incoming version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: FieldName,
    pub old: FieldValue,
    pub new: FieldValue,
}

impl fmt::Display for FieldChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} -> {}", self.field, self.old, self.new)
    }
}
