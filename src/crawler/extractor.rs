//! Record extraction from product pages
//!
//! Extraction is the schema boundary: a page either yields a fully typed
//! `CandidateRecord` or an `ExtractionError`, never a partially filled record.

use crate::model::{BookContent, CandidateRecord, Price};
use crate::url::{derive_identity, resolve_link};
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use url::Url;

/// Why a payload could not be turned into a record
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("required field '{0}' is missing")]
    MissingField(&'static str),

    #[error("field '{field}' has unparseable value '{value}'")]
    InvalidField { field: &'static str, value: String },

    #[error("no identity can be derived from {0}")]
    NoIdentity(String),

    #[error("invalid selector: {0}")]
    Selector(String),
}

/// Turns a raw payload into a candidate record
///
/// Implementations are pure: the same payload and URL always give the same
/// result.
pub trait Extractor: Send + Sync {
    fn extract(&self, raw: &str, source_url: &Url) -> Result<CandidateRecord, ExtractionError>;
}

/// Extractor for catalog product pages
///
/// # Field Rules
///
/// | Field | Source | Required |
/// |-------|--------|----------|
/// | title | `h1` | yes |
/// | category | second-to-last breadcrumb item | yes |
/// | description | `#product_description + p` | no |
/// | prices | `Price (excl. tax)` / `Price (incl. tax)` table rows | yes |
/// | availability | `Availability` row, `Out of stock` is 0 | yes |
/// | review count | `Number of reviews` row | yes |
/// | rating | `.star-rating` class word, `Zero` to `Five` | yes |
/// | image | `#product_gallery img[src]`, made absolute | no |
#[derive(Debug, Clone, Default)]
pub struct BookPageExtractor;

impl BookPageExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Extractor for BookPageExtractor {
    fn extract(&self, raw: &str, source_url: &Url) -> Result<CandidateRecord, ExtractionError> {
        let identity = derive_identity(source_url)
            .map_err(|_| ExtractionError::NoIdentity(source_url.to_string()))?;

        let document = Html::parse_document(raw);

        let title = select_text(&document, "h1")?.ok_or(ExtractionError::MissingField("title"))?;
        let category = extract_category(&document)?;
        let description = select_text(&document, "#product_description + p")?;

        let price_excl_tax = parse_price("price_excl_tax", &table_value(&document, "Price (excl. tax)")?)?;
        let price_incl_tax = parse_price("price_incl_tax", &table_value(&document, "Price (incl. tax)")?)?;
        let availability = parse_availability(&table_value(&document, "Availability")?)?;
        let review_count = parse_count("review_count", &table_value(&document, "Number of reviews")?)?;
        let rating = extract_rating(&document)?;
        let image_url = extract_image(&document, source_url)?;

        Ok(CandidateRecord {
            identity,
            source_url: source_url.to_string(),
            content: BookContent {
                title,
                category,
                description,
                price_incl_tax,
                price_excl_tax,
                availability,
                review_count,
                rating,
                image_url,
            },
            raw_snapshot: raw.to_string(),
        })
    }
}

fn selector(css: &str) -> Result<Selector, ExtractionError> {
    Selector::parse(css).map_err(|e| ExtractionError::Selector(format!("{}: {:?}", css, e)))
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text of the first match, `None` if absent or blank
fn select_text(document: &Html, css: &str) -> Result<Option<String>, ExtractionError> {
    let sel = selector(css)?;
    Ok(document
        .select(&sel)
        .next()
        .map(element_text)
        .filter(|s| !s.is_empty()))
}

fn extract_category(document: &Html) -> Result<String, ExtractionError> {
    let sel = selector(".breadcrumb li")?;
    let items: Vec<String> = document.select(&sel).map(element_text).collect();

    // The last item is the product itself
    if items.len() < 2 {
        return Err(ExtractionError::MissingField("category"));
    }
    let category = items[items.len() - 2].clone();
    if category.is_empty() {
        return Err(ExtractionError::MissingField("category"));
    }
    Ok(category)
}

/// Value cell of the product table row whose header is `label`
fn table_value(document: &Html, label: &'static str) -> Result<String, ExtractionError> {
    let row_sel = selector("table.table-striped tr")?;
    let th_sel = selector("th")?;
    let td_sel = selector("td")?;

    document
        .select(&row_sel)
        .find(|row| {
            row.select(&th_sel)
                .next()
                .map(|th| element_text(th).eq_ignore_ascii_case(label))
                .unwrap_or(false)
        })
        .and_then(|row| row.select(&td_sel).next())
        .map(element_text)
        .ok_or(ExtractionError::MissingField(label))
}

fn parse_price(field: &'static str, text: &str) -> Result<Price, ExtractionError> {
    Price::parse(text).ok_or_else(|| ExtractionError::InvalidField {
        field,
        value: text.to_string(),
    })
}

fn parse_count(field: &'static str, text: &str) -> Result<u32, ExtractionError> {
    text.trim().parse().map_err(|_| ExtractionError::InvalidField {
        field,
        value: text.to_string(),
    })
}

/// Parses `In stock (22 available)` into 22 and `Out of stock` into 0
fn parse_availability(text: &str) -> Result<u32, ExtractionError> {
    let invalid = || ExtractionError::InvalidField {
        field: "availability",
        value: text.to_string(),
    };

    if text.to_ascii_lowercase().starts_with("out of stock") {
        return Ok(0);
    }

    let digits: String = text
        .split_once('(')
        .map(|(_, rest)| rest.chars().take_while(|c| c.is_ascii_digit()).collect())
        .ok_or_else(invalid)?;
    digits.parse().map_err(|_| invalid())
}

fn extract_rating(document: &Html) -> Result<u8, ExtractionError> {
    let sel = selector(".star-rating")?;
    let element = document
        .select(&sel)
        .next()
        .ok_or(ExtractionError::MissingField("rating"))?;

    element
        .value()
        .classes()
        .find_map(rating_word)
        .ok_or_else(|| ExtractionError::InvalidField {
            field: "rating",
            value: element.value().attr("class").unwrap_or("").to_string(),
        })
}

fn rating_word(word: &str) -> Option<u8> {
    match word.to_ascii_lowercase().as_str() {
        "zero" => Some(0),
        "one" => Some(1),
        "two" => Some(2),
        "three" => Some(3),
        "four" => Some(4),
        "five" => Some(5),
        _ => None,
    }
}

fn extract_image(document: &Html, source_url: &Url) -> Result<Option<String>, ExtractionError> {
    let sel = selector("#product_gallery img")?;
    Ok(document
        .select(&sel)
        .next()
        .and_then(|img| img.value().attr("src"))
        .and_then(|src| resolve_link(src, source_url))
        .map(|url| url.to_string()))
}
