use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::datasource::DataSource;
use crate::validation::ValidationConfig;

/// Single predicate over the form values.
///
/// Only one operator decides the result, picked in the order `custom`, `is`,
/// `isNot`, `in`, `notIn`, `matches`. A condition without operators is false.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Dotted path into the values; empty when only `custom` is used.
    #[serde(default)]
    pub when: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "explicit_null"
    )]
    #[schemars(with = "Option<Value>")]
    pub is: Option<Value>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "explicit_null"
    )]
    #[schemars(with = "Option<Value>")]
    pub is_not: Option<Value>,
    #[serde(default, rename = "in", skip_serializing_if = "Option::is_none")]
    pub in_list: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_in: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matches: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<String>,
}

impl Condition {
    pub fn is(when: impl Into<String>, value: Value) -> Self {
        Self {
            when: when.into(),
            is: Some(value),
            ..Self::default()
        }
    }

    pub fn is_not(when: impl Into<String>, value: Value) -> Self {
        Self {
            when: when.into(),
            is_not: Some(value),
            ..Self::default()
        }
    }

    pub fn one_of(when: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            when: when.into(),
            in_list: Some(values),
            ..Self::default()
        }
    }

    pub fn matches(when: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            when: when.into(),
            matches: Some(pattern.into()),
            ..Self::default()
        }
    }

    pub fn custom(expression: impl Into<String>) -> Self {
        Self {
            custom: Some(expression.into()),
            ..Self::default()
        }
    }
}

/// How a rule combines its conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum RuleOperator {
    #[default]
    And,
    Or,
}

/// Partial field state applied when a rule matches.
///
/// Also used as the accumulated result of applying a rule list.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Effects {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "explicit_null"
    )]
    #[schemars(with = "Option<Value>")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validate: Option<ValidationConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<DataSource>,
}

impl Effects {
    /// Overwrites every key that `other` sets; keys it leaves unset survive.
    pub fn overlay(&mut self, other: &Effects) {
        if other.visible.is_some() {
            self.visible = other.visible;
        }
        if other.disabled.is_some() {
            self.disabled = other.disabled;
        }
        if other.required.is_some() {
            self.required = other.required;
        }
        if other.value.is_some() {
            self.value.clone_from(&other.value);
        }
        if other.validate.is_some() {
            self.validate.clone_from(&other.validate);
        }
        if other.options.is_some() {
            self.options.clone_from(&other.options);
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Effects::default()
    }
}

/// Ordered conditions plus the effects applied when they hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub operator: RuleOperator,
    #[serde(default)]
    pub effects: Effects,
}

impl Rule {
    pub fn new(id: impl Into<String>, conditions: Vec<Condition>, effects: Effects) -> Self {
        Self {
            id: id.into(),
            conditions,
            operator: RuleOperator::And,
            effects,
        }
    }

    pub fn with_operator(mut self, operator: RuleOperator) -> Self {
        self.operator = operator;
        self
    }
}

/// Keeps an explicit JSON `null` as `Some(Value::Null)`; absence stays `None`
/// through `#[serde(default)]`.
fn explicit_null<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}
