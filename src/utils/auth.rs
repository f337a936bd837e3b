//! Authentication helpers for outgoing model API requests.

/// Add the bearer token used by OpenAI-compatible endpoints.
///
/// An empty key leaves the request untouched so local endpoints that do not
/// require authentication keep working.
pub fn add_auth_headers(request: reqwest::RequestBuilder, api_key: &str) -> reqwest::RequestBuilder {
    if api_key.is_empty() {
        return request;
    }
    request.header("Authorization", format!("Bearer {api_key}"))
}
