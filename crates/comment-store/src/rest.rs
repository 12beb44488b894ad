use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use comment_types::{Comment, CommentId, CommentPatch, CommentThread, EditorUpdate, NewComment};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use reqwest::{RequestBuilder, Response, Url};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, StorageAdapter};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// Connection settings for [`RestApiAdapter`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestConfig {
    pub base_url: String,
    /// Extra headers sent with every request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Sent as `Authorization: Bearer {token}` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl RestConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            headers: BTreeMap::new(),
            bearer_token: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Thin JSON proxy to a comment REST API.
///
/// | Operation | Endpoint |
/// |---|---|
/// | get / save all | `GET` / `PUT /comments` |
/// | add | `POST /comments` |
/// | update / delete | `PATCH` / `DELETE /comments/{id}` |
/// | rich-text add | `POST /comments/lexical` |
/// | rich-text update | `PATCH /comments/{id}/lexical` |
/// | threads | `GET /comments/threads?sourceId&sourceType` |
/// | clear | `DELETE /storage/clear` |
pub struct RestApiAdapter {
    client: reqwest::Client,
    base_url: Url,
}

impl RestApiAdapter {
    pub fn new(config: &RestConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|err| {
            Error::Internal(format!("invalid base url {}: {}", config.base_url, err))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Internal(format!(
                "base url cannot carry a path: {}",
                config.base_url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(build_headers(config)?)
            .build()?;

        log::info!("REST comment adapter targeting {}", base_url);
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Join `segments` onto the base url, percent-encoding each one.
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Internal(format!("base url cannot carry a path: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub(crate) fn threads_endpoint(
        &self,
        source_id: Option<&str>,
        source_type: Option<&str>,
    ) -> Result<Url> {
        let mut url = self.endpoint(&["comments", "threads"])?;
        if source_id.is_some() || source_type.is_some() {
            let mut query = url.query_pairs_mut();
            if let Some(source_id) = source_id {
                query.append_pair("sourceId", source_id);
            }
            if let Some(source_type) = source_type {
                query.append_pair("sourceType", source_type);
            }
        }
        Ok(url)
    }

    /// Send `request`, mapping non-2xx responses to [`Error::Status`].
    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let url = response.url().clone();
        let body = response.text().await.unwrap_or_default();
        log::error!("comment API request to {} failed with {}", url, status);
        Err(Error::Status {
            status: status.as_u16(),
            body,
        })
    }
}

fn build_headers(config: &RestConfig) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (name, value) in &config.headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| Error::Internal(format!("invalid header name: {}", name)))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|_| Error::Internal(format!("invalid value for header {}", name)))?;
        headers.insert(header_name, header_value);
    }
    if let Some(token) = &config.bearer_token {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| Error::Internal("invalid bearer token".to_string()))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }
    Ok(headers)
}

#[async_trait]
impl StorageAdapter for RestApiAdapter {
    async fn get_comments(&self) -> Result<Vec<Comment>> {
        let url = self.endpoint(&["comments"])?;
        Ok(self.send(self.client.get(url)).await?.json().await?)
    }

    async fn save_comments(&self, comments: &[Comment]) -> Result<()> {
        let url = self.endpoint(&["comments"])?;
        self.send(self.client.put(url).json(comments)).await?;
        Ok(())
    }

    async fn add_comment(&self, comment: &Comment) -> Result<()> {
        let url = self.endpoint(&["comments"])?;
        self.send(self.client.post(url).json(comment)).await?;
        Ok(())
    }

    async fn update_comment(&self, id: &CommentId, patch: &CommentPatch) -> Result<()> {
        let url = self.endpoint(&["comments", id.as_str()])?;
        self.send(self.client.patch(url).json(patch)).await?;
        Ok(())
    }

    async fn delete_comment(&self, id: &CommentId) -> Result<()> {
        let url = self.endpoint(&["comments", id.as_str()])?;
        self.send(self.client.delete(url)).await?;
        Ok(())
    }

    async fn clear_all_storage(&self) -> Result<()> {
        let url = self.endpoint(&["storage", "clear"])?;
        self.send(self.client.delete(url)).await?;
        Ok(())
    }

    async fn add_lexical_comment(&self, new: NewComment) -> Result<Comment> {
        let url = self.endpoint(&["comments", "lexical"])?;
        Ok(self.send(self.client.post(url).json(&new)).await?.json().await?)
    }

    async fn update_comment_with_editor_state(
        &self,
        id: &CommentId,
        update: EditorUpdate,
    ) -> Result<()> {
        let url = self.endpoint(&["comments", id.as_str(), "lexical"])?;
        self.send(self.client.patch(url).json(&update)).await?;
        Ok(())
    }

    async fn get_comment_threads(
        &self,
        source_id: Option<&str>,
        source_type: Option<&str>,
    ) -> Result<Vec<CommentThread>> {
        let url = self.threads_endpoint(source_id, source_type)?;
        Ok(self.send(self.client.get(url)).await?.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(base: &str) -> RestApiAdapter {
        RestApiAdapter::new(&RestConfig::new(base)).unwrap()
    }

    #[test]
    fn test_endpoint_joins_segments_onto_base_path() {
        let api = adapter("https://example.com/api/");
        assert_eq!(
            api.endpoint(&["comments", "abc", "lexical"]).unwrap().as_str(),
            "https://example.com/api/comments/abc/lexical"
        );

        let api = adapter("https://example.com/api");
        assert_eq!(
            api.endpoint(&["storage", "clear"]).unwrap().as_str(),
            "https://example.com/api/storage/clear"
        );
    }

    #[test]
    fn test_endpoint_encodes_ids() {
        let api = adapter("https://example.com");
        assert_eq!(
            api.endpoint(&["comments", "a/b c"]).unwrap().as_str(),
            "https://example.com/comments/a%2Fb%20c"
        );
    }

    #[test]
    fn test_threads_endpoint_query() {
        let api = adapter("https://example.com");
        assert_eq!(
            api.threads_endpoint(None, None).unwrap().as_str(),
            "https://example.com/comments/threads"
        );
        assert_eq!(
            api.threads_endpoint(Some("doc 1"), Some("demo")).unwrap().as_str(),
            "https://example.com/comments/threads?sourceId=doc+1&sourceType=demo"
        );
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        assert!(RestApiAdapter::new(&RestConfig::new("not a url")).is_err());
        assert!(RestApiAdapter::new(&RestConfig::new("mailto:someone@example.com")).is_err());
    }

    #[test]
    fn test_headers_include_bearer_token() {
        let mut config = RestConfig::new("https://example.com");
        config.headers.insert("X-Tenant".into(), "acme".into());
        config.bearer_token = Some("secret".into());

        let headers = build_headers(&config).unwrap();
        assert_eq!(headers.get("x-tenant").unwrap(), "acme");
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer secret");
        assert!(headers.get(AUTHORIZATION).unwrap().is_sensitive());
    }

    #[test]
    fn test_invalid_header_name_is_rejected() {
        let mut config = RestConfig::new("https://example.com");
        config.headers.insert("bad header".into(), "x".into());
        assert!(build_headers(&config).is_err());
    }

    #[test]
    fn test_config_defaults_from_json() {
        let config: RestConfig =
            serde_json::from_str(r#"{ "baseUrl": "https://example.com" }"#).unwrap();
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert!(config.headers.is_empty());
        assert_eq!(config.bearer_token, None);
    }
}
