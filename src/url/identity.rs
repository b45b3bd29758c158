use crate::model::Identity;
use crate::UrlError;
use url::Url;

/// Path segments that name a directory's default document rather than the item
const INDEX_DOCUMENTS: &[&str] = &["index.html", "index.htm"];

/// Derives a record identity from its source URL
///
/// The identity is the last meaningful path segment: a trailing
/// `index.html` is skipped and an `.html` extension dropped, so
/// `/catalogue/a-light-in-the-attic_1000/index.html` and
/// `/catalogue/a-light-in-the-attic_1000.html` both yield
/// `a-light-in-the-attic_1000`. Re-crawls of the same page therefore map back
/// to the same logical item.
///
/// # Examples
///
/// ```
/// use shelfwatch::url::derive_identity;
/// use url::Url;
///
/// let url = Url::parse("https://books.example/catalogue/book-42/index.html").unwrap();
/// assert_eq!(derive_identity(&url).unwrap().as_str(), "book-42");
/// ```
pub fn derive_identity(url: &Url) -> Result<Identity, UrlError> {
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    let candidate = segments
        .iter()
        .rev()
        .find(|seg| !INDEX_DOCUMENTS.contains(&seg.to_ascii_lowercase().as_str()))
        .ok_or_else(|| UrlError::NoIdentity(url.to_string()))?;

    let stem = candidate
        .strip_suffix(".html")
        .or_else(|| candidate.strip_suffix(".htm"))
        .unwrap_or(candidate);

    if stem.is_empty() {
        return Err(UrlError::NoIdentity(url.to_string()));
    }

    Ok(Identity::new(stem))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(url: &str) -> Result<Identity, UrlError> {
        derive_identity(&Url::parse(url).unwrap())
    }

    #[test]
    fn test_index_document_is_skipped() {
        let id = identity("https://books.example/catalogue/a-light-in-the-attic_1000/index.html");
        assert_eq!(id.unwrap().as_str(), "a-light-in-the-attic_1000");
    }

    #[test]
    fn test_html_extension_is_dropped() {
        let id = identity("https://books.example/catalogue/book-42.html");
        assert_eq!(id.unwrap().as_str(), "book-42");
    }

    #[test]
    fn test_trailing_slash() {
        let id = identity("https://books.example/catalogue/book-42/");
        assert_eq!(id.unwrap().as_str(), "book-42");
    }

    #[test]
    fn test_same_item_same_identity() {
        let a = identity("https://books.example/catalogue/book-42/index.html").unwrap();
        let b = identity("https://books.example/catalogue/book-42/").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_root_has_no_identity() {
        assert!(matches!(
            identity("https://books.example/"),
            Err(UrlError::NoIdentity(_))
        ));
        assert!(matches!(
            identity("https://books.example/index.html"),
            Err(UrlError::NoIdentity(_))
        ));
    }
}
