//! HTTP fetcher implementation
//!
//! This module issues the network requests of a run. A fetch never retries
//! on its own: it reports one of three explicit outcomes and the retry loop
//! in `crawler::retry` decides what to do next.

use crate::config::{CrawlerConfig, UserAgentConfig};
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client, StatusCode};
use url::Url;

/// Raw page returned by a successful fetch
#[derive(Debug, Clone)]
pub struct Payload {
    /// URL that was requested
    pub url: Url,
    /// Final URL after redirects
    pub final_url: String,
    pub status_code: u16,
    /// Content-Type header value, empty if absent
    pub content_type: String,
    pub body: String,
}

/// Result of a single fetch attempt
#[derive(Debug)]
pub enum FetchOutcome {
    /// The page was retrieved with a success status
    Fetched(Payload),

    /// Network error, timeout, 5xx or 429; worth another attempt
    Retryable {
        status_code: Option<u16>,
        reason: String,
    },

    /// Any other failure; retrying would not help
    Fatal {
        status_code: Option<u16>,
        reason: String,
    },
}

/// A source of raw pages
///
/// Implementations must not mutate shared run state.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &Url) -> FetchOutcome;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `crawler` - Timeouts
/// * `user_agent` - The user agent configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(
    crawler: &CrawlerConfig,
    user_agent: &UserAgentConfig,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.header_value())
        .timeout(crawler.request_timeout())
        .connect_timeout(crawler.connect_timeout())
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Classifies a non-success HTTP status
///
/// | Status | Outcome |
/// |--------|---------|
/// | 429 | Retryable |
/// | 5xx | Retryable |
/// | anything else | Fatal |
pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Fetcher backed by a `reqwest` client
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a fetcher with a client configured from the crawler settings
    pub fn from_config(
        crawler: &CrawlerConfig,
        user_agent: &UserAgentConfig,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self::new(build_http_client(crawler, user_agent)?))
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &Url) -> FetchOutcome {
        let response = match self.client.get(url.clone()).send().await {
            Ok(response) => response,
            Err(e) => return classify_request_error(&e),
        };

        let status = response.status();
        if !status.is_success() {
            let reason = format!("HTTP {}", status);
            return if is_retryable_status(status) {
                FetchOutcome::Retryable {
                    status_code: Some(status.as_u16()),
                    reason,
                }
            } else {
                FetchOutcome::Fatal {
                    status_code: Some(status.as_u16()),
                    reason,
                }
            };
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        match response.text().await {
            Ok(body) => FetchOutcome::Fetched(Payload {
                url: url.clone(),
                final_url,
                status_code: status.as_u16(),
                content_type,
                body,
            }),
            // Connection dropped mid-body
            Err(e) => FetchOutcome::Retryable {
                status_code: Some(status.as_u16()),
                reason: format!("failed to read body: {}", e),
            },
        }
    }
}

fn classify_request_error(e: &reqwest::Error) -> FetchOutcome {
    if e.is_redirect() || e.is_builder() {
        return FetchOutcome::Fatal {
            status_code: None,
            reason: e.to_string(),
        };
    }

    let reason = if e.is_timeout() {
        "request timeout".to_string()
    } else if e.is_connect() {
        format!("connection failed: {}", e)
    } else {
        e.to_string()
    };

    FetchOutcome::Retryable {
        status_code: None,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_configs() -> (CrawlerConfig, UserAgentConfig) {
        (
            CrawlerConfig {
                max_concurrent_fetches: 2,
                request_timeout_secs: 5,
                connect_timeout_secs: 2,
            },
            UserAgentConfig {
                crawler_name: "TestCrawler".to_string(),
                crawler_version: "1.0".to_string(),
                contact_url: "https://example.com/about".to_string(),
                contact_email: "admin@example.com".to_string(),
            },
        )
    }

    fn fetcher() -> HttpFetcher {
        let (crawler, ua) = create_test_configs();
        HttpFetcher::from_config(&crawler, &ua).unwrap()
    }

    #[test]
    fn test_status_classification() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
        assert!(!is_retryable_status(StatusCode::FORBIDDEN));
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/book/index.html"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html><h1>Hi</h1></html>")
                    .insert_header("content-type", "text/html"),
            )
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/book/index.html", server.uri())).unwrap();
        match fetcher().fetch(&url).await {
            FetchOutcome::Fetched(payload) => {
                assert_eq!(payload.status_code, 200);
                assert!(payload.content_type.contains("text/html"));
                assert!(payload.body.contains("<h1>Hi</h1>"));
            }
            other => panic!("expected Fetched, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_classifies_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/busy"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/slow-down"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let base = Url::parse(&server.uri()).unwrap();
        let f = fetcher();

        assert!(matches!(
            f.fetch(&base.join("/missing").unwrap()).await,
            FetchOutcome::Fatal { status_code: Some(404), .. }
        ));
        assert!(matches!(
            f.fetch(&base.join("/busy").unwrap()).await,
            FetchOutcome::Retryable { status_code: Some(503), .. }
        ));
        assert!(matches!(
            f.fetch(&base.join("/slow-down").unwrap()).await,
            FetchOutcome::Retryable { status_code: Some(429), .. }
        ));
    }

    #[tokio::test]
    async fn test_connection_refused_is_retryable() {
        // Port 9 (discard) is closed on test machines
        let url = Url::parse("http://127.0.0.1:9/").unwrap();
        assert!(matches!(
            fetcher().fetch(&url).await,
            FetchOutcome::Retryable { status_code: None, .. }
        ));
    }
}
