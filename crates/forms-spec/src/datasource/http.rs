use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use url::Url;

use super::adapter::{AdapterError, AdapterRequest, AdapterResponse, DataSourceAdapter};
use super::HttpMethod;
use crate::value::display_string;

/// Settings for the default [`HttpAdapter`].
#[derive(Debug, Clone)]
pub struct HttpAdapterConfig {
    /// Base URL that relative source URLs are joined onto.
    pub base_url: Option<String>,
    /// Headers sent with every request; request headers override them.
    pub headers: BTreeMap<String, String>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for HttpAdapterConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            headers: BTreeMap::new(),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Adapter performing real HTTP requests with `reqwest`.
///
/// GET and DELETE send params as the query string, other methods as a JSON
/// body.
#[derive(Debug, Clone)]
pub struct HttpAdapter {
    base_url: Option<Url>,
    headers: BTreeMap<String, String>,
    client: Client,
}

impl HttpAdapter {
    /// Builds the adapter and its HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError`] when the base URL is invalid or the client
    /// cannot be built.
    pub fn new(config: HttpAdapterConfig) -> Result<Self, AdapterError> {
        let base_url = config
            .base_url
            .as_deref()
            .map(|base| {
                let normalized = if base.ends_with('/') {
                    base.to_owned()
                } else {
                    format!("{base}/")
                };
                Url::parse(&normalized)
                    .map_err(|err| AdapterError::InvalidRequest(format!("base url '{base}': {err}")))
            })
            .transpose()?;
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| AdapterError::Transport(err.to_string()))?;
        Ok(Self {
            base_url,
            headers: config.headers,
            client,
        })
    }

    fn resolve_url(&self, raw: &str) -> Result<Url, AdapterError> {
        if let Ok(url) = Url::parse(raw) {
            return Ok(url);
        }
        let Some(base) = &self.base_url else {
            return Err(AdapterError::InvalidRequest(format!(
                "relative url '{raw}' without a base url"
            )));
        };
        base.join(raw.trim_start_matches('/'))
            .map_err(|err| AdapterError::InvalidRequest(format!("url '{raw}': {err}")))
    }
}

#[async_trait]
impl DataSourceAdapter for HttpAdapter {
    async fn fetch(&self, request: AdapterRequest) -> Result<AdapterResponse, AdapterError> {
        let url = self.resolve_url(&request.url)?;
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(url),
            HttpMethod::Post => self.client.post(url),
            HttpMethod::Put => self.client.put(url),
            HttpMethod::Patch => self.client.patch(url),
            HttpMethod::Delete => self.client.delete(url),
        };
        let mut headers = self.headers.clone();
        headers.extend(request.headers);
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = if request.method.uses_query() {
            let query: Vec<(&str, String)> = request
                .params
                .iter()
                .map(|(key, value)| (key.as_str(), display_string(value)))
                .collect();
            builder.query(&query)
        } else {
            builder.json(&request.params)
        };

        let response = builder
            .send()
            .await
            .map_err(|err| AdapterError::Transport(err.to_string()))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| AdapterError::Transport(err.to_string()))?;
        let data = if body.is_empty() {
            Value::Null
        } else {
            match serde_json::from_slice(&body) {
                Ok(data) => data,
                Err(_) if !status.is_success() => {
                    Value::String(String::from_utf8_lossy(&body).into_owned())
                }
                Err(err) => return Err(AdapterError::Decode(err.to_string())),
            }
        };
        tracing::debug!(method = %request.method, status = status.as_u16(), "data source request completed");
        Ok(AdapterResponse {
            data,
            status: status.as_u16(),
            ok: status.is_success(),
        })
    }
}
