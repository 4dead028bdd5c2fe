//! Declarative validation configs and their compiled validators.

mod validator;

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub use validator::{FieldError, Validator, compile};

/// Flat, JSON-safe validation settings for one field.
///
/// `messages` overrides the default message per constraint, keyed by the
/// constraint name (`minLength`, `pattern`, `required`, ...).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integer: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub positive: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_items: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,
    /// Upper bound in bytes for each uploaded file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_file_size: Option<u64>,
    /// MIME globs (`image/*`) or extensions (`.pdf`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_types: Option<Vec<String>>,
    /// Expression with `value` and `values` bound; falsy fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub messages: BTreeMap<String, String>,
}

impl ValidationConfig {
    pub fn required() -> Self {
        Self {
            required: Some(true),
            ..Self::default()
        }
    }

    /// Right-biased merge: every key `other` sets wins, messages merge per key.
    pub fn merge(&mut self, other: &ValidationConfig) {
        macro_rules! take {
            ($($field:ident),* $(,)?) => {
                $(
                    if other.$field.is_some() {
                        self.$field.clone_from(&other.$field);
                    }
                )*
            };
        }
        take!(
            required,
            min_length,
            max_length,
            pattern,
            email,
            url,
            min,
            max,
            integer,
            positive,
            negative,
            min_items,
            max_items,
            max_file_size,
            allowed_types,
            custom,
        );
        self.messages
            .extend(other.messages.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    /// Message configured for `constraint`, if any.
    pub fn message(&self, constraint: &str) -> Option<&str> {
        self.messages.get(constraint).map(String::as_str)
    }
}

/// Merges `overrides` onto a copy of `base`.
pub fn merge_validation_configs(
    base: &ValidationConfig,
    overrides: &ValidationConfig,
) -> ValidationConfig {
    let mut merged = base.clone();
    merged.merge(overrides);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_is_right_biased() {
        let base: ValidationConfig = serde_json::from_value(json!({
            "required": false,
            "minLength": 2,
            "messages": {"minLength": "too short", "required": "needed"}
        }))
        .unwrap();
        let overrides: ValidationConfig = serde_json::from_value(json!({
            "required": true,
            "maxLength": 10,
            "messages": {"required": "please fill in"}
        }))
        .unwrap();
        let merged = merge_validation_configs(&base, &overrides);
        assert_eq!(merged.required, Some(true));
        assert_eq!(merged.min_length, Some(2));
        assert_eq!(merged.max_length, Some(10));
        assert_eq!(merged.message("minLength"), Some("too short"));
        assert_eq!(merged.message("required"), Some("please fill in"));
    }

    #[test]
    fn keys_are_camel_case() {
        let config = ValidationConfig {
            min_items: Some(1),
            max_file_size: Some(1024),
            ..ValidationConfig::default()
        };
        assert_eq!(
            serde_json::to_value(&config).unwrap(),
            json!({"minItems": 1, "maxFileSize": 1024})
        );
    }
}
