use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::HttpMethod;

/// Request handed to a [`DataSourceAdapter`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterRequest {
    pub url: String,
    pub method: HttpMethod,
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

/// Response returned by a [`DataSourceAdapter`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterResponse {
    pub data: Value,
    pub status: u16,
    pub ok: bool,
}

impl AdapterResponse {
    /// Successful `200` response.
    pub fn ok(data: Value) -> Self {
        Self::with_status(200, data)
    }

    /// Response whose `ok` flag follows the 2xx range.
    pub fn with_status(status: u16, data: Value) -> Self {
        Self {
            data,
            status,
            ok: (200..300).contains(&status),
        }
    }
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("invalid response body: {0}")]
    Decode(String),
}

/// Network boundary of the resolver. Hosts plug in their own transport;
/// tests plug in recording mocks.
#[async_trait]
pub trait DataSourceAdapter: Send + Sync {
    /// Performs the request.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError`] when no response could be obtained. A
    /// response with a non-2xx status is not an error at this level.
    async fn fetch(&self, request: AdapterRequest) -> Result<AdapterResponse, AdapterError>;
}
