//! Target URL resolution
//!
//! A run resolves its full target set once, during initialization. The
//! catalog resolver walks the site the way a reader would: index page,
//! category listings, then each listing's pagination.

use crate::crawler::fetcher::Fetch;
use crate::crawler::retry::{fetch_with_retry, FetchError, RetryPolicy};
use crate::crawler::stop::StopHandle;
use crate::url::{normalize_url, resolve_link};
use crate::ShelfError;
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

const CATEGORY_SELECTOR: &str = ".side_categories ul ul li a";
const PRODUCT_SELECTOR: &str = "h3 a";
const NEXT_PAGE_SELECTOR: &str = "li.next a";

/// Supplies the full set of target URLs of a run
#[async_trait]
pub trait TargetResolver: Send + Sync {
    /// Resolves every target, normalized, de-duplicated and in a stable order
    ///
    /// Failing to produce a target set is a run initialization error.
    async fn resolve(&self) -> Result<Vec<Url>, ShelfError>;
}

/// Serves an explicit list of targets
#[derive(Debug, Clone)]
pub struct StaticTargets {
    targets: Vec<String>,
}

impl StaticTargets {
    pub fn new(targets: Vec<String>) -> Self {
        Self { targets }
    }
}

#[async_trait]
impl TargetResolver for StaticTargets {
    async fn resolve(&self) -> Result<Vec<Url>, ShelfError> {
        let mut resolved = BTreeMap::new();
        for target in &self.targets {
            let url = normalize_url(target).map_err(|e| {
                ShelfError::Initialization(format!("invalid target '{}': {}", target, e))
            })?;
            resolved.insert(url.to_string(), url);
        }

        if resolved.is_empty() {
            return Err(ShelfError::Initialization(
                "target list is empty".to_string(),
            ));
        }
        Ok(resolved.into_values().collect())
    }
}

/// One parsed listing page
#[derive(Debug, Default)]
struct Listing {
    products: Vec<Url>,
    next: Option<Url>,
}

/// Enumerates product pages through category listings and their pagination
pub struct PaginatedCatalogResolver {
    fetcher: Arc<dyn Fetch>,
    policy: RetryPolicy,
    index_url: Url,
    stop: StopHandle,
}

impl PaginatedCatalogResolver {
    /// # Arguments
    ///
    /// * `fetcher` - Source of listing pages
    /// * `policy` - Retry policy for listing fetches
    /// * `index_url` - Page that lists the categories
    pub fn new(fetcher: Arc<dyn Fetch>, policy: RetryPolicy, index_url: Url) -> Self {
        Self {
            fetcher,
            policy,
            index_url,
            stop: StopHandle::new(),
        }
    }

    /// Uses `stop` to abandon listing retries when the run is stopped
    pub fn with_stop(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    async fn fetch_page(&self, url: &Url) -> Result<String, FetchError> {
        let payload = fetch_with_retry(self.fetcher.as_ref(), url, &self.policy, &self.stop).await?;
        Ok(payload.body)
    }

    /// Walks one category through its pagination, collecting product links
    ///
    /// A page that fails after retries ends the walk; products found on
    /// earlier pages are kept.
    async fn walk_category(
        &self,
        start: Url,
        first_page: Option<String>,
    ) -> Result<Vec<Url>, ShelfError> {
        let mut products = Vec::new();
        let mut visited = HashSet::new();
        let mut next = Some(start);
        let mut prefetched = first_page;

        while let Some(page_url) = next.take() {
            if !visited.insert(page_url.to_string()) {
                warn!(url = %page_url, "pagination loops back; stopping");
                break;
            }

            let body = match prefetched.take() {
                Some(body) => body,
                None => match self.fetch_page(&page_url).await {
                    Ok(body) => body,
                    Err(e) => {
                        warn!(url = %page_url, "skipping listing page: {}", e);
                        break;
                    }
                },
            };

            let listing = parse_listing(&body, &page_url)?;
            debug!(url = %page_url, products = listing.products.len(), "parsed listing page");
            products.extend(listing.products);
            next = listing.next;
        }

        Ok(products)
    }
}

#[async_trait]
impl TargetResolver for PaginatedCatalogResolver {
    async fn resolve(&self) -> Result<Vec<Url>, ShelfError> {
        let index_body = self.fetch_page(&self.index_url).await.map_err(|e| {
            ShelfError::Initialization(format!(
                "failed to fetch catalog index {}: {}",
                self.index_url, e
            ))
        })?;

        let categories = parse_categories(&index_body, &self.index_url)?;
        let mut resolved = BTreeMap::new();

        if categories.is_empty() {
            info!(url = %self.index_url, "index lists no categories; treating it as a listing");
            for url in self
                .walk_category(self.index_url.clone(), Some(index_body))
                .await?
            {
                resolved.insert(url.to_string(), url);
            }
        } else {
            info!(count = categories.len(), "found catalog categories");
            for category in categories {
                for url in self.walk_category(category, None).await? {
                    resolved.insert(url.to_string(), url);
                }
            }
        }

        if resolved.is_empty() {
            return Err(ShelfError::Initialization(format!(
                "no targets found under {}",
                self.index_url
            )));
        }

        info!(targets = resolved.len(), "resolved target set");
        Ok(resolved.into_values().collect())
    }
}

fn parse_selector(css: &str) -> Result<Selector, ShelfError> {
    Selector::parse(css)
        .map_err(|e| ShelfError::Initialization(format!("invalid selector {}: {:?}", css, e)))
}

/// Resolves and normalizes every `href` matched by `selector`
fn collect_links(document: &Html, selector: &Selector, base: &Url) -> Vec<Url> {
    document
        .select(selector)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| resolve_link(href, base))
        .filter_map(|url| normalize_url(url.as_str()).ok())
        .collect()
}

fn parse_categories(body: &str, base: &Url) -> Result<Vec<Url>, ShelfError> {
    let document = Html::parse_document(body);
    let selector = parse_selector(CATEGORY_SELECTOR)?;
    Ok(collect_links(&document, &selector, base))
}

fn parse_listing(body: &str, base: &Url) -> Result<Listing, ShelfError> {
    let document = Html::parse_document(body);
    let products = collect_links(&document, &parse_selector(PRODUCT_SELECTOR)?, base);
    let next = collect_links(&document, &parse_selector(NEXT_PAGE_SELECTOR)?, base)
        .into_iter()
        .next();
    Ok(Listing { products, next })
}
