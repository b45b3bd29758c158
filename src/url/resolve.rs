use url::Url;

/// Resolves an `href` or `src` attribute against the page it appeared on
///
/// Returns None if the link should be ignored:
/// - empty values and same-page `#anchors`
/// - `javascript:`, `mailto:`, `tel:` and `data:` schemes
/// - values that do not resolve to an HTTP(S) URL
pub fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let mut absolute = base_url.join(href).ok()?;
    if absolute.scheme() != "http" && absolute.scheme() != "https" {
        return None;
    }
    absolute.set_fragment(None);
    Some(absolute)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://books.example/catalogue/category/books/poetry_23/index.html").unwrap()
    }

    #[test]
    fn test_relative_parent_links() {
        let url = resolve_link("../../../a-light-in-the-attic_1000/index.html", &base()).unwrap();
        assert_eq!(
            url.as_str(),
            "https://books.example/catalogue/a-light-in-the-attic_1000/index.html"
        );
    }

    #[test]
    fn test_sibling_link() {
        let url = resolve_link("page-2.html", &base()).unwrap();
        assert_eq!(
            url.as_str(),
            "https://books.example/catalogue/category/books/poetry_23/page-2.html"
        );
    }

    #[test]
    fn test_ignored_links() {
        assert!(resolve_link("", &base()).is_none());
        assert!(resolve_link("#top", &base()).is_none());
        assert!(resolve_link("javascript:void(0)", &base()).is_none());
        assert!(resolve_link("mailto:a@b.c", &base()).is_none());
        assert!(resolve_link("ftp://books.example/x", &base()).is_none());
    }

    #[test]
    fn test_fragment_is_dropped() {
        let url = resolve_link("/x/index.html#reviews", &base()).unwrap();
        assert_eq!(url.as_str(), "https://books.example/x/index.html");
    }
}
