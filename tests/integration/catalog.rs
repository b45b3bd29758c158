//! A mock catalog: one category spread over two listing pages, three books

use shelfwatch::config::{parse_config, Config};
use std::path::Path;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const BOOKS: [&str; 3] = ["a-light-in-the-attic_1000", "tipping-the-velvet_999", "soumission_998"];

const INDEX: &str = r#"<html><body>
<div class="side_categories"><ul class="nav nav-list"><li>
  <a href="catalogue/category/books_1/index.html">Books</a>
  <ul>
    <li><a href="catalogue/category/books/poetry_23/index.html">Poetry</a></li>
  </ul>
</li></ul></div>
</body></html>"#;

fn listing(books: &[&str], next: Option<&str>) -> String {
    let items: String = books
        .iter()
        .map(|b| {
            format!(
                r#"<li><article class="product_pod"><h3><a href="../../../{}/index.html">{}</a></h3></article></li>"#,
                b, b
            )
        })
        .collect();
    let pager = next
        .map(|n| format!(r#"<ul class="pager"><li class="next"><a href="{}">next</a></li></ul>"#, n))
        .unwrap_or_default();
    format!("<html><body><ol class=\"row\">{}</ol>{}</body></html>", items, pager)
}

pub fn book_page(title: &str, price: &str) -> String {
    format!(
        r#"<html><body>
<ul class="breadcrumb">
  <li><a href="../../index.html">Home</a></li>
  <li><a href="../category/books_1/index.html">Books</a></li>
  <li><a href="../category/books/poetry_23/index.html">Poetry</a></li>
  <li class="active">{title}</li>
</ul>
<article class="product_page">
  <div id="product_gallery"><img src="../../media/cache/cover.jpg" alt="{title}" /></div>
  <h1>{title}</h1>
  <p class="star-rating Four"></p>
  <div id="product_description"><h2>Product Description</h2></div>
  <p>Dark and sharp.</p>
  <table class="table table-striped">
    <tr><th>Price (excl. tax)</th><td>£{price}</td></tr>
    <tr><th>Price (incl. tax)</th><td>£{price}</td></tr>
    <tr><th>Availability</th><td>In stock (7 available)</td></tr>
    <tr><th>Number of reviews</th><td>2</td></tr>
  </table>
</article>
</body></html>"#,
        title = title,
        price = price
    )
}

pub fn book_path(book: &str) -> String {
    format!("/catalogue/{}/index.html", book)
}

async fn mount_html(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;
}

/// Mounts the index, both listing pages and every book not in `skip`
///
/// `prices` gives the displayed price of each entry of `BOOKS`.
pub async fn mount_catalog(server: &MockServer, prices: [&str; 3], skip: &[&str]) {
    mount_html(server, "/index.html", INDEX.to_string()).await;
    mount_html(
        server,
        "/catalogue/category/books/poetry_23/index.html",
        listing(&BOOKS[..2], Some("page-2.html")),
    )
    .await;
    mount_html(
        server,
        "/catalogue/category/books/poetry_23/page-2.html",
        listing(&BOOKS[2..], None),
    )
    .await;

    for (book, price) in BOOKS.iter().zip(prices) {
        if skip.contains(book) {
            continue;
        }
        mount_html(server, &book_path(book), book_page(book, price)).await;
    }
}

/// Makes `book` answer 503 to every request
pub async fn mount_unavailable(server: &MockServer, book: &str) {
    Mock::given(method("GET"))
        .and(path(book_path(book)))
        .respond_with(ResponseTemplate::new(503))
        .mount(server)
        .await;
}

/// Builds a validated config pointing at `base_url`, storing state in `dir`
pub fn test_config(base_url: &str, dir: &Path) -> Config {
    let toml = format!(
        r#"
[crawler]
max-concurrent-fetches = 2
request-timeout-secs = 5
connect-timeout-secs = 2

[retry]
max-attempts = 2
base-delay-ms = 1
multiplier = 2.0
max-delay-ms = 5
jitter = false

[user-agent]
crawler-name = "ShelfwatchTest"
crawler-version = "0.1"
contact-url = "https://example.com/about"
contact-email = "ops@example.com"

[catalog]
base-url = "{base}/"
index-path = "index.html"

[output]
database-path = "{db}"
summary-path = "{summary}"
changelog-limit = 2
"#,
        base = base_url,
        db = dir.join("shelfwatch.db").display(),
        summary = dir.join("summary.md").display(),
    );
    parse_config(&toml).expect("test config is valid")
}
