use crate::model::field::{FieldName, FieldValue};
use crate::model::hash::{content_hash, ContentHash};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable external key of a catalog item, derived from its source URL
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one crawl run; reused when the run is resumed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Generates a fresh random run identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A monetary amount in minor units (pence, cents)
///
/// Prices are kept as integers so that hashing and comparison never depend on
/// floating point formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(i64);

impl Price {
    pub fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    pub fn minor(&self) -> i64 {
        self.0
    }

    /// Parses a displayed price such as `£51.77`, `51.7` or `12`
    ///
    /// Currency symbols and surrounding whitespace are ignored. More than two
    /// fractional digits, or no digits at all, yields `None`.
    pub fn parse(text: &str) -> Option<Self> {
        let cleaned: String = text
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
            .collect();

        let (negative, digits) = match cleaned.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, cleaned.as_str()),
        };

        let (whole, fraction) = match digits.split_once('.') {
            Some((w, f)) => (w, f),
            None => (digits, ""),
        };

        if whole.is_empty() || fraction.len() > 2 || fraction.contains('.') {
            return None;
        }

        let whole: i64 = whole.parse().ok()?;
        let fraction: i64 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<i64>().ok()? * 10,
            _ => fraction.parse().ok()?,
        };

        let minor = whole.checked_mul(100)?.checked_add(fraction)?;
        Some(Self(if negative { -minor } else { minor }))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

/// The content fields of a catalog item
///
/// Everything in here participates in the content hash; provenance and
/// timestamps live on `Record`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookContent {
    pub title: String,
    pub category: String,
    pub description: Option<String>,
    pub price_incl_tax: Price,
    pub price_excl_tax: Price,
    pub availability: u32,
    pub review_count: u32,
    /// Star rating, 1 to 5
    pub rating: u8,
    pub image_url: Option<String>,
}

impl BookContent {
    /// Returns the typed value of one content field
    pub fn value(&self, field: FieldName) -> FieldValue {
        match field {
            FieldName::Availability => FieldValue::Count(self.availability),
            FieldName::Category => FieldValue::Text(self.category.clone()),
            FieldName::Description => FieldValue::from_optional(self.description.as_deref()),
            FieldName::ImageUrl => FieldValue::from_optional(self.image_url.as_deref()),
            FieldName::PriceExclTax => FieldValue::Money(self.price_excl_tax),
            FieldName::PriceInclTax => FieldValue::Money(self.price_incl_tax),
            FieldName::Rating => FieldValue::Stars(self.rating),
            FieldName::ReviewCount => FieldValue::Count(self.review_count),
            FieldName::Title => FieldValue::Text(self.title.clone()),
        }
    }

    pub fn content_hash(&self) -> ContentHash {
        content_hash(self)
    }
}

/// A freshly extracted item that has not been classified yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateRecord {
    pub identity: Identity,
    pub source_url: String,
    pub content: BookContent,
    /// Raw payload the content was extracted from
    pub raw_snapshot: String,
}

/// A stored catalog item with provenance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub identity: Identity,
    pub source_url: String,
    pub content: BookContent,
    pub raw_snapshot: String,
    pub content_hash: ContentHash,
    /// Set once, on the first successful extraction of this identity
    pub first_seen: DateTime<Utc>,
    /// Bumped only when the content actually changes
    pub last_updated: DateTime<Utc>,
}
