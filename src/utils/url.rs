//! URL utilities for consistent URL handling
//!
//! Endpoint construction for the model API plus the link classification the
//! retrieval pipeline uses to route sources.

/// Normalize a base URL by removing trailing slashes
///
/// # Examples
///
/// ```
/// use refchat::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("https://api.example.com/v1/"), "https://api.example.com/v1");
/// assert_eq!(normalize_base_url("https://api.example.com/v1///"), "https://api.example.com/v1");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Construct a complete API endpoint URL from a base URL and endpoint path
///
/// # Examples
///
/// ```
/// use refchat::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("https://api.example.com/v1/", "/chat/completions"),
///     "https://api.example.com/v1/chat/completions"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", normalized_base, endpoint)
}

/// Whether a link points at arXiv, which is served through its export API
/// instead of being scraped.
pub fn is_arxiv_link(link: &str) -> bool {
    url::Url::parse(link)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_ascii_lowercase))
        .map(|host| host == "arxiv.org" || host.ends_with(".arxiv.org"))
        .unwrap_or(false)
}

/// The arXiv record identifier of a link: its last path segment without a
/// `.pdf` suffix (`https://arxiv.org/pdf/2401.01234v2.pdf` → `2401.01234v2`).
///
/// # Examples
///
/// ```
/// use refchat::utils::url::arxiv_id;
///
/// assert_eq!(arxiv_id("https://arxiv.org/abs/2401.01234").as_deref(), Some("2401.01234"));
/// assert_eq!(arxiv_id("https://example.com/abs/1"), None);
/// ```
pub fn arxiv_id(link: &str) -> Option<String> {
    if !is_arxiv_link(link) {
        return None;
    }
    let parsed = url::Url::parse(link).ok()?;
    let segment = parsed
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()?;
    let id = segment.strip_suffix(".pdf").unwrap_or(segment);
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}
