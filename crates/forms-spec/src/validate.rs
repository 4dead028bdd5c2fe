use std::collections::BTreeSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::path::get_path;
use crate::rules::RuleEngine;
use crate::spec::FormSchema;
use crate::state::resolve_field_state;
use crate::validation::compile;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ValidationError {
    pub field: String,
    pub path: String,
    pub message: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(default)]
    pub errors: Vec<ValidationError>,
    #[serde(default)]
    pub missing_required: Vec<String>,
    #[serde(default)]
    pub unknown_fields: Vec<String>,
}

/// Validates submitted `values` against `schema`. Hidden fields are skipped.
pub fn validate_form(engine: &RuleEngine, schema: &FormSchema, values: &Value) -> ValidationResult {
    let mut errors = Vec::new();
    let mut missing_required = Vec::new();

    for field in &schema.fields {
        let state = resolve_field_state(engine, field, values);
        if !state.visible {
            continue;
        }

        let value = get_path(values, &field.name);
        let validator = compile(state.validation.as_ref(), field.kind);
        if state.required && validator.is_missing(value) {
            missing_required.push(field.name.clone());
            continue;
        }

        if let Err(failures) = validator.validate_with(value, values) {
            errors.extend(failures.into_iter().map(|failure| ValidationError {
                field: field.name.clone(),
                path: format!("/{}", field.name.replace('.', "/")),
                message: failure.message,
                code: failure.code,
            }));
        }
    }

    let roots: BTreeSet<&str> = schema
        .fields
        .iter()
        .map(|field| field.name.split('.').next().unwrap_or_default())
        .collect();
    let unknown_fields: Vec<String> = values
        .as_object()
        .map(|map| {
            map.keys()
                .filter(|key| !roots.contains(key.as_str()))
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    let valid = errors.is_empty() && missing_required.is_empty() && unknown_fields.is_empty();
    tracing::debug!(
        form = %schema.id,
        valid,
        errors = errors.len(),
        missing = missing_required.len(),
        "validated form values"
    );
    ValidationResult {
        valid,
        errors,
        missing_required,
        unknown_fields,
    }
}
