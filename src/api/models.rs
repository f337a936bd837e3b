use crate::api::ModelsResponse;
use crate::utils::auth::add_auth_headers;
use crate::utils::url::construct_api_url;

pub async fn fetch_models(
    client: &reqwest::Client,
    base_url: &str,
    api_key: &str,
) -> Result<ModelsResponse, Box<dyn std::error::Error>> {
    let models_url = construct_api_url(base_url, "models");
    let request = client
        .get(models_url)
        .header("Content-Type", "application/json");
    let response = add_auth_headers(request, api_key).send().await?;

    if !response.status().is_success() {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(format!("API request failed with status {status}: {error_text}").into());
    }

    let models_response = response.json::<ModelsResponse>().await?;
    Ok(models_response)
}

pub fn sort_models(models: &mut [crate::api::ModelInfo]) {
    // Newest first; `created` is OpenAI-style, `created_at` Anthropic-style
    models.sort_by(|a, b| {
        match (&a.created, &b.created, &a.created_at, &b.created_at) {
            (Some(a_created), Some(b_created), _, _) => b_created.cmp(a_created),
            (Some(_), None, _, _) => std::cmp::Ordering::Less,
            (None, Some(_), _, _) => std::cmp::Ordering::Greater,
            (None, None, Some(a_created_at), Some(b_created_at)) => {
                b_created_at.cmp(a_created_at)
            }
            (None, None, Some(_), None) => std::cmp::Ordering::Less,
            (None, None, None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None, None, None) => b.id.cmp(&a.id),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ModelInfo;

    fn model(id: &str, created: Option<u64>) -> ModelInfo {
        ModelInfo {
            id: id.to_string(),
            created,
            created_at: None,
            owned_by: None,
            display_name: None,
        }
    }

    #[test]
    fn dated_models_sort_newest_first_before_undated() {
        let mut models = vec![
            model("a", None),
            model("old", Some(10)),
            model("new", Some(20)),
        ];
        sort_models(&mut models);
        let ids: Vec<&str> = models.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old", "a"]);
    }
}
