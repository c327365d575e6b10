//! Form input validation.

use url::Url;

/// Parses the submitted `url` field into an absolute `http(s)` URL.
///
/// Returns a short reason on rejection; callers turn any rejection into a
/// redirect back to the form without touching the network or spawning anything.
pub fn validate_url(raw: Option<&str>) -> Result<Url, &'static str> {
    let raw = raw.map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Err("missing url");
    }

    // `Url::parse` only accepts absolute URLs, so relative input fails here.
    let url = Url::parse(raw).map_err(|_| "malformed url")?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err("unsupported scheme");
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err("missing host");
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_absolute_http_urls() {
        let url = validate_url(Some("https://example.com/video123")).unwrap();
        assert_eq!(url.as_str(), "https://example.com/video123");

        let url = validate_url(Some("  http://www.youtube.com/watch?v=abc  ")).unwrap();
        assert_eq!(url.host_str(), Some("www.youtube.com"));
    }

    #[test]
    fn rejects_non_urls() {
        let rejected = [
            None,
            Some(""),
            Some("   "),
            Some("not-a-url"),
            Some("/relative/path"),
            Some("example.com/video"),
            Some("https://"),
            Some("mailto:someone@example.com"),
            Some("ftp://example.com/file"),
            Some("file:///etc/passwd"),
            Some("javascript:alert(1)"),
        ];

        for input in rejected {
            assert!(validate_url(input).is_err(), "accepted {:?}", input);
        }
    }
}
