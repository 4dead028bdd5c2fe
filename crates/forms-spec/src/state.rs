use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::datasource::DataSource;
use crate::rules::{RuleEngine, resolve_visibility};
use crate::spec::{FieldSpec, FormSchema};
use crate::validation::ValidationConfig;

/// Effective state of a field for the current values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FieldState {
    pub visible: bool,
    pub required: bool,
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<DataSource>,
}

pub type FormState = BTreeMap<String, FieldState>;

pub fn resolve_field_state(engine: &RuleEngine, field: &FieldSpec, values: &Value) -> FieldState {
    let applied = engine.apply_rules(&field.rules, values, None);
    let visible = if field.rules.is_empty() {
        field.visible_by_default.unwrap_or(true)
    } else {
        resolve_visibility(&field.rules, &applied, field.visible_by_default)
    };

    let mut validation = field.validation.clone().unwrap_or_default();
    if let Some(overrides) = &applied.validate {
        validation.merge(overrides);
    }
    let required = applied.required.or(validation.required).unwrap_or(false);
    if required || validation.required.is_some() {
        validation.required = Some(required);
    }

    FieldState {
        visible,
        required,
        disabled: applied.disabled.unwrap_or(false),
        value: applied.value.or_else(|| field.default_value.clone()),
        validation: (validation != ValidationConfig::default()).then_some(validation),
        options: applied.options.or_else(|| field.data_source.clone()),
    }
}

pub fn resolve_form_state(engine: &RuleEngine, schema: &FormSchema, values: &Value) -> FormState {
    schema
        .fields
        .iter()
        .map(|field| (field.name.clone(), resolve_field_state(engine, field, values)))
        .collect()
}
