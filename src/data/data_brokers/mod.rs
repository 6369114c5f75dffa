pub mod finnhub;
pub mod polygon;

use reqwest::{Client, Request};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::DataError;

/// Static API-key authentication, the only kind either provider needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiAuth {
    Query { name: String, value: String },
    Header { name: String, value: String },
}

/// Something that answers `GET {path}?{query}` with a JSON document.
///
/// Provider wrappers are generic over this so tests can feed canned pages.
pub trait JsonApi {
    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, DataError>;
}

/// One reqwest client bound to a provider's base URL and key.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    auth: ApiAuth,
}

impl ApiClient {
    pub fn new(base_url: &str, auth: ApiAuth) -> Result<Self, DataError> {
        let client = Client::builder()
            .user_agent(concat!("mdarchive/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self::with_client(client, base_url, auth))
    }

    /// Uses a caller-built reqwest client instead of the default one.
    pub fn with_client(client: Client, base_url: &str, auth: ApiAuth) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// GET request for `path` with `query` and the provider key attached
    pub fn request(&self, path: &str, query: &[(&str, String)]) -> Result<Request, DataError> {
        let builder = self.client.get(self.url(path)).query(query);
        let builder = match &self.auth {
            ApiAuth::Query { name, value } => builder.query(&[(name, value)]),
            ApiAuth::Header { name, value } => builder.header(name.as_str(), value.as_str()),
        };
        Ok(builder.build()?)
    }
}

impl JsonApi for ApiClient {
    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, DataError> {
        let request = self.request(path, query)?;
        debug!("GET {} {query:?}", self.url(path));

        let resp = self.client.execute(request).await?;
        let status = resp.status();
        debug!("Response status: {status}");
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DataError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.json::<Value>().await?)
    }
}

/// Rejects an empty key before any request goes out
pub(crate) fn require_key(
    api_key: &str,
    provider: &'static str,
    env_name: &'static str,
) -> Result<String, DataError> {
    let key = api_key.trim();
    if key.is_empty() {
        return Err(DataError::MissingApiKey(provider, env_name));
    }
    Ok(key.to_string())
}
