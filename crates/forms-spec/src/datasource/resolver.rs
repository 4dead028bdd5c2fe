use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use thiserror::Error;

use super::adapter::{AdapterError, AdapterRequest, DataSourceAdapter};
use super::http::{HttpAdapter, HttpAdapterConfig};
use super::{DataSource, HttpMethod, resolve_params};
use crate::expr::{Evaluator, ExpressionError};
use crate::path::{get_path, set_path};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("request to '{url}' failed: {source}")]
    Adapter {
        url: String,
        #[source]
        source: AdapterError,
    },
    #[error("request to '{url}' returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("transform for '{url}' failed: {source}")]
    Transform {
        url: String,
        #[source]
        source: ExpressionError,
    },
}

/// Outcome of [`DataSourceResolver::fetch_for_field`].
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    /// Result of the most recent fetch for the field.
    Fresh(Value),
    /// A newer fetch for the same field started while this one was in flight.
    Superseded,
}

/// Resolves [`DataSource`] descriptions through an adapter, caching results.
///
/// Each resolver owns its adapter slot and cache; nothing is process-wide.
pub struct DataSourceResolver {
    initial_adapter: Arc<dyn DataSourceAdapter>,
    adapter: RwLock<Arc<dyn DataSourceAdapter>>,
    cache: Mutex<BTreeMap<String, Value>>,
    generations: Mutex<HashMap<String, u64>>,
    evaluator: Evaluator,
}

impl DataSourceResolver {
    pub fn new(adapter: Arc<dyn DataSourceAdapter>) -> Self {
        Self {
            initial_adapter: Arc::clone(&adapter),
            adapter: RwLock::new(adapter),
            cache: Mutex::new(BTreeMap::new()),
            generations: Mutex::new(HashMap::new()),
            evaluator: Evaluator::new(),
        }
    }

    /// Resolver backed by the default [`HttpAdapter`].
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError`] when the HTTP adapter cannot be built.
    pub fn with_http(config: HttpAdapterConfig) -> Result<Self, AdapterError> {
        Ok(Self::new(Arc::new(HttpAdapter::new(config)?)))
    }

    pub fn adapter(&self) -> Arc<dyn DataSourceAdapter> {
        Arc::clone(&self.adapter.read())
    }

    pub fn set_adapter(&self, adapter: Arc<dyn DataSourceAdapter>) {
        *self.adapter.write() = adapter;
    }

    /// Restores the adapter the resolver was constructed with.
    pub fn reset_adapter(&self) {
        *self.adapter.write() = Arc::clone(&self.initial_adapter);
    }

    /// Resolves `source` against the current form values.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] when a remote request fails, answers with a
    /// non-2xx status or its transform cannot be evaluated. Computed sources
    /// never fail; evaluation errors resolve to `null`.
    pub async fn fetch(&self, source: &DataSource, values: &Value) -> Result<Value, ResolveError> {
        match source {
            DataSource::Static { options } => Ok(Value::Array(
                options
                    .iter()
                    .map(|option| {
                        let mut entry = Map::new();
                        entry.insert("label".into(), Value::String(option.label.clone()));
                        entry.insert("value".into(), option.value.clone());
                        if option.disabled {
                            entry.insert("disabled".into(), Value::Bool(true));
                        }
                        Value::Object(entry)
                    })
                    .collect(),
            )),
            DataSource::Fetch {
                url,
                method,
                transform,
                params,
            } => {
                self.fetch_remote(url, *method, params, transform.as_deref(), values)
                    .await
            }
            DataSource::Remote {
                endpoint,
                method,
                params,
                transform,
            } => {
                self.fetch_remote(endpoint, *method, params, transform.as_deref(), values)
                    .await
            }
            DataSource::Computed {
                dependency,
                compute,
            } => Ok(self.resolve_computed(dependency, compute, values)),
        }
    }

    /// Like [`DataSourceResolver::fetch`], but reports [`Fetched::Superseded`]
    /// when another fetch for `field` started before this one completed, so a
    /// stale response never replaces a newer one.
    ///
    /// # Errors
    ///
    /// Same as [`DataSourceResolver::fetch`], for the latest fetch only.
    pub async fn fetch_for_field(
        &self,
        field: &str,
        source: &DataSource,
        values: &Value,
    ) -> Result<Fetched, ResolveError> {
        let generation = {
            let mut generations = self.generations.lock();
            let counter = generations.entry(field.to_owned()).or_insert(0);
            *counter += 1;
            *counter
        };
        let result = self.fetch(source, values).await;
        let latest = self.generations.lock().get(field).copied();
        if latest != Some(generation) {
            tracing::debug!(field, generation, "discarding superseded data source result");
            return Ok(Fetched::Superseded);
        }
        result.map(Fetched::Fresh)
    }

    /// Clears every cache entry, or only those whose key contains `pattern`.
    /// Returns the number of removed entries.
    pub fn clear_cache(&self, pattern: Option<&str>) -> usize {
        let mut cache = self.cache.lock();
        let before = cache.len();
        match pattern {
            None => cache.clear(),
            Some(pattern) => cache.retain(|key, _| !key.contains(pattern)),
        }
        before - cache.len()
    }

    pub fn cache_keys(&self) -> Vec<String> {
        self.cache.lock().keys().cloned().collect()
    }

    pub fn cached(&self, key: &str) -> Option<Value> {
        self.cache.lock().get(key).cloned()
    }

    async fn fetch_remote(
        &self,
        url: &str,
        method: HttpMethod,
        params: &BTreeMap<String, Value>,
        transform: Option<&str>,
        values: &Value,
    ) -> Result<Value, ResolveError> {
        let params = resolve_params(params, values);
        let key = request_cache_key(method, url, &params, transform);
        if let Some(hit) = self.cached(&key) {
            tracing::trace!(key = %key, "data source cache hit");
            return Ok(hit);
        }

        let request = AdapterRequest {
            url: url.to_owned(),
            method,
            params: params.clone(),
            headers: BTreeMap::new(),
        };
        let adapter = self.adapter();
        let response = adapter
            .fetch(request)
            .await
            .map_err(|source| ResolveError::Adapter {
                url: url.to_owned(),
                source,
            })?;
        if !response.ok {
            return Err(ResolveError::Status {
                url: url.to_owned(),
                status: response.status,
            });
        }

        let resolved = match transform {
            Some(transform) => {
                let mut scope = Map::new();
                scope.insert("data".into(), response.data);
                scope.insert("params".into(), Value::Object(params.into_iter().collect()));
                self.evaluator
                    .evaluate(transform, &Value::Object(scope))
                    .map_err(|source| ResolveError::Transform {
                        url: url.to_owned(),
                        source,
                    })?
            }
            None => response.data,
        };
        self.cache.lock().insert(key, resolved.clone());
        Ok(resolved)
    }

    fn resolve_computed(&self, dependency: &[String], compute: &str, values: &Value) -> Value {
        let expression = match self.evaluator.compile(compute) {
            Ok(expression) => expression,
            Err(err) => {
                tracing::warn!(expression = compute, error = %err, "computed data source failed");
                return Value::Null;
            }
        };
        // Without declared dependencies, scope to the top-level fields read.
        let paths: BTreeSet<String> = if dependency.is_empty() {
            expression
                .dependencies()
                .iter()
                .filter_map(|path| path.split('.').next())
                .map(str::to_owned)
                .collect()
        } else {
            dependency.iter().cloned().collect()
        };
        let mut scope = Value::Object(Map::new());
        for path in &paths {
            if let Some(value) = get_path(values, path) {
                set_path(&mut scope, path, value.clone());
            }
        }
        let key = format!("computed:{compute} {scope}");
        if let Some(hit) = self.cached(&key) {
            return hit;
        }
        match expression.evaluate(&scope) {
            Ok(value) => {
                self.cache.lock().insert(key, value.clone());
                value
            }
            Err(err) => {
                tracing::warn!(expression = compute, error = %err, "computed data source failed");
                Value::Null
            }
        }
    }
}

/// Deterministic cache key for a remote request after param substitution.
pub(crate) fn request_cache_key(
    method: HttpMethod,
    url: &str,
    params: &BTreeMap<String, Value>,
    transform: Option<&str>,
) -> String {
    let query = params
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");
    let mut key = format!("{method} {url}?{query}");
    if let Some(transform) = transform {
        key.push_str(" | ");
        key.push_str(transform);
    }
    key
}
