//! Declarative option sources and their resolution.

mod adapter;
mod http;
mod resolver;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use adapter::{AdapterError, AdapterRequest, AdapterResponse, DataSourceAdapter};
pub use http::{HttpAdapter, HttpAdapterConfig};
pub use resolver::{DataSourceResolver, Fetched, ResolveError};

use crate::expr::Expression;
use crate::path::get_path;

/// Prefix marking a `params` value as a reference to a field value.
pub const DEPENDENCY_SIGIL: char = '$';

/// HTTP verb used by `fetch` and `remote` sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Methods whose params travel in the query string.
    pub fn uses_query(&self) -> bool {
        matches!(self, HttpMethod::Get | HttpMethod::Delete)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entry of a static option list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FieldOption {
    pub label: String,
    pub value: Value,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disabled: bool,
}

impl FieldOption {
    pub fn new(label: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
            disabled: false,
        }
    }
}

/// How a field obtains its option list or computed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DataSource {
    Static {
        options: Vec<FieldOption>,
    },
    Fetch {
        url: String,
        #[serde(default)]
        method: HttpMethod,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        transform: Option<String>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        params: BTreeMap<String, Value>,
    },
    Remote {
        endpoint: String,
        #[serde(default)]
        method: HttpMethod,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        params: BTreeMap<String, Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        transform: Option<String>,
    },
    Computed {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        dependency: Vec<String>,
        compute: String,
    },
}

impl DataSource {
    pub fn kind(&self) -> &'static str {
        match self {
            DataSource::Static { .. } => "static",
            DataSource::Fetch { .. } => "fetch",
            DataSource::Remote { .. } => "remote",
            DataSource::Computed { .. } => "computed",
        }
    }

    /// Field paths whose values change what this source resolves to.
    pub fn dependencies(&self) -> BTreeSet<String> {
        match self {
            DataSource::Static { .. } => BTreeSet::new(),
            DataSource::Fetch { params, .. } | DataSource::Remote { params, .. } => params
                .values()
                .filter_map(|value| value.as_str().and_then(dependency_reference))
                .map(str::to_owned)
                .collect(),
            DataSource::Computed {
                dependency,
                compute,
            } => {
                if !dependency.is_empty() {
                    return dependency.iter().cloned().collect();
                }
                Expression::parse(compute)
                    .map(|expression| expression.dependencies())
                    .unwrap_or_default()
            }
        }
    }
}

/// Field path named by a `$path` reference; `$$` escapes a literal dollar.
pub fn dependency_reference(raw: &str) -> Option<&str> {
    let path = raw.strip_prefix(DEPENDENCY_SIGIL)?;
    if path.is_empty() || path.starts_with(DEPENDENCY_SIGIL) {
        return None;
    }
    Some(path)
}

/// Substitutes `$path` references with the current values (missing → null).
pub fn resolve_params(params: &BTreeMap<String, Value>, values: &Value) -> BTreeMap<String, Value> {
    params
        .iter()
        .map(|(key, raw)| (key.clone(), resolve_param(raw, values)))
        .collect()
}

fn resolve_param(raw: &Value, values: &Value) -> Value {
    let Some(text) = raw.as_str() else {
        return raw.clone();
    };
    if let Some(path) = dependency_reference(text) {
        return get_path(values, path).cloned().unwrap_or(Value::Null);
    }
    match text.strip_prefix(DEPENDENCY_SIGIL) {
        Some(escaped) if escaped.starts_with(DEPENDENCY_SIGIL) => Value::String(escaped.to_owned()),
        _ => raw.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn params_substitute_references() {
        let params = BTreeMap::from([
            ("country".to_string(), json!("$countryId")),
            ("state".to_string(), json!("$address.state")),
            ("limit".to_string(), json!(10)),
            ("currency".to_string(), json!("$$USD")),
            ("missing".to_string(), json!("$nope")),
        ]);
        let values = json!({"countryId": "US", "address": {"state": "WA"}});
        let resolved = resolve_params(&params, &values);
        assert_eq!(resolved["country"], json!("US"));
        assert_eq!(resolved["state"], json!("WA"));
        assert_eq!(resolved["limit"], json!(10));
        assert_eq!(resolved["currency"], json!("$USD"));
        assert_eq!(resolved["missing"], Value::Null);
    }

    #[test]
    fn source_dependencies() {
        let remote: DataSource = serde_json::from_value(json!({
            "type": "remote",
            "endpoint": "/cities",
            "params": {"country": "$countryId", "kind": "city"}
        }))
        .unwrap();
        assert_eq!(
            remote.dependencies().into_iter().collect::<Vec<_>>(),
            vec!["countryId"]
        );

        let computed = DataSource::Computed {
            dependency: vec![],
            compute: "price * qty".into(),
        };
        assert_eq!(
            computed.dependencies().into_iter().collect::<Vec<_>>(),
            vec!["price", "qty"]
        );
    }

    #[test]
    fn method_defaults_to_get() {
        let source: DataSource =
            serde_json::from_value(json!({"type": "fetch", "url": "https://example.test/a"})).unwrap();
        match source {
            DataSource::Fetch { method, .. } => assert_eq!(method, HttpMethod::Get),
            other => panic!("expected fetch, got {other:?}"),
        }
    }
}
