use std::sync::{Arc, LazyLock};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use super::ValidationConfig;
use crate::expr::Expression;
use crate::spec::FieldType;
use crate::value::{format_number, is_truthy};

static EMAIL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok());

/// One failed constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub code: String,
    pub message: String,
}

impl FieldError {
    fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_owned(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Text,
    Number,
    Boolean,
    StringList,
    Date,
    File,
    Any,
}

impl Shape {
    fn of(field_type: FieldType) -> Self {
        match field_type {
            FieldType::Text
            | FieldType::Textarea
            | FieldType::Email
            | FieldType::Select
            | FieldType::Radio => Shape::Text,
            FieldType::Number | FieldType::Slider => Shape::Number,
            FieldType::Checkbox | FieldType::Switch => Shape::Boolean,
            FieldType::Multiselect => Shape::StringList,
            FieldType::Date | FieldType::Datetime => Shape::Date,
            FieldType::File => Shape::File,
            FieldType::Custom => Shape::Any,
        }
    }

    fn expected(self) -> &'static str {
        match self {
            Shape::Text => "a string",
            Shape::Number => "a number",
            Shape::Boolean => "a boolean",
            Shape::StringList => "a list of strings",
            Shape::Date => "a date",
            Shape::File | Shape::Any => "a value",
        }
    }
}

#[derive(Debug, Clone)]
enum Constraint {
    MinLength(usize),
    MaxLength(usize),
    Pattern(Regex),
    Email,
    Url,
    Min(f64),
    Max(f64),
    Integer,
    Positive,
    Negative,
    MinItems(usize),
    MaxItems(usize),
    MaxFileSize(u64),
    AllowedTypes(GlobSet),
    Custom(Arc<Expression>),
}

#[derive(Debug, Clone)]
struct Check {
    code: &'static str,
    message: String,
    constraint: Constraint,
}

/// Compiled validator for one field.
#[derive(Debug, Clone)]
pub struct Validator {
    shape: Shape,
    required: bool,
    required_message: String,
    type_message: String,
    checks: Vec<Check>,
}

/// Compiles `config` for a field of `field_type`.
///
/// Invalid patterns, globs and custom expressions are logged and skipped.
pub fn compile(config: Option<&ValidationConfig>, field_type: FieldType) -> Validator {
    let default = ValidationConfig::default();
    let config = config.unwrap_or(&default);
    let shape = Shape::of(field_type);
    let message = |key: &str, fallback: String| {
        config.message(key).map(str::to_owned).unwrap_or(fallback)
    };
    let mut checks = Vec::new();
    let mut push = |code: &'static str, key: &str, fallback: String, constraint: Constraint| {
        checks.push(Check {
            code,
            message: message(key, fallback),
            constraint,
        });
    };

    if shape == Shape::Text {
        if let Some(min) = config.min_length {
            push(
                "min_length",
                "minLength",
                format!("Must be at least {min} characters"),
                Constraint::MinLength(min),
            );
        }
        if let Some(max) = config.max_length {
            push(
                "max_length",
                "maxLength",
                format!("Must be at most {max} characters"),
                Constraint::MaxLength(max),
            );
        }
        if let Some(pattern) = &config.pattern {
            match Regex::new(pattern) {
                Ok(regex) => push(
                    "pattern",
                    "pattern",
                    "Invalid format".into(),
                    Constraint::Pattern(regex),
                ),
                Err(err) => {
                    tracing::warn!(pattern = %pattern, error = %err, "skipping invalid validation pattern");
                }
            }
        }
        if field_type == FieldType::Email || config.email == Some(true) {
            push(
                "email",
                "email",
                "Must be a valid email address".into(),
                Constraint::Email,
            );
        }
        if config.url == Some(true) {
            push("url", "url", "Must be a valid URL".into(), Constraint::Url);
        }
    }

    if shape == Shape::Number {
        if let Some(min) = config.min {
            push(
                "min",
                "min",
                format!("Must be at least {}", format_number(min)),
                Constraint::Min(min),
            );
        }
        if let Some(max) = config.max {
            push(
                "max",
                "max",
                format!("Must be at most {}", format_number(max)),
                Constraint::Max(max),
            );
        }
        if config.integer == Some(true) {
            push(
                "integer",
                "integer",
                "Must be a whole number".into(),
                Constraint::Integer,
            );
        }
        if config.positive == Some(true) {
            push(
                "positive",
                "positive",
                "Must be positive".into(),
                Constraint::Positive,
            );
        }
        if config.negative == Some(true) {
            push(
                "negative",
                "negative",
                "Must be negative".into(),
                Constraint::Negative,
            );
        }
    }

    if shape == Shape::StringList {
        if let Some(min) = config.min_items {
            push(
                "min_items",
                "minItems",
                format!("Select at least {min} items"),
                Constraint::MinItems(min),
            );
        }
        if let Some(max) = config.max_items {
            push(
                "max_items",
                "maxItems",
                format!("Select at most {max} items"),
                Constraint::MaxItems(max),
            );
        }
    }

    if shape == Shape::File {
        if let Some(max) = config.max_file_size {
            push(
                "max_file_size",
                "maxFileSize",
                format!("File must be at most {max} bytes"),
                Constraint::MaxFileSize(max),
            );
        }
        if let Some(patterns) = &config.allowed_types
            && let Some(globs) = build_type_globs(patterns)
        {
            push(
                "allowed_types",
                "allowedTypes",
                format!("File type must be one of: {}", patterns.join(", ")),
                Constraint::AllowedTypes(globs),
            );
        }
    }

    if let Some(custom) = &config.custom {
        match Expression::parse(custom) {
            Ok(expression) => push(
                "custom",
                "custom",
                "Invalid value".into(),
                Constraint::Custom(Arc::new(expression)),
            ),
            Err(err) => {
                tracing::warn!(expression = %custom, error = %err, "skipping invalid custom validation");
            }
        }
    }

    Validator {
        shape,
        required: config.required == Some(true),
        required_message: message("required", "This field is required".into()),
        type_message: message("type", format!("Must be {}", shape.expected())),
        checks,
    }
}

impl Validator {
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Validates a single value without access to the other form values.
    ///
    /// # Errors
    ///
    /// Returns every failed constraint, or a single `required` /
    /// `invalid_type` error when those fail.
    pub fn validate(&self, value: Option<&Value>) -> Result<(), Vec<FieldError>> {
        self.validate_with(value, &Value::Object(Map::new()))
    }

    /// Validates `value` with `values` bound for custom expressions.
    ///
    /// # Errors
    ///
    /// Same as [`Validator::validate`].
    pub fn validate_with(&self, value: Option<&Value>, values: &Value) -> Result<(), Vec<FieldError>> {
        if self.required && self.is_missing(value) {
            return Err(vec![FieldError::new("required", &self.required_message)]);
        }
        let Some(value) = value.filter(|value| !self.is_absent(value)) else {
            return Ok(());
        };
        if !self.shape_matches(value) {
            return Err(vec![FieldError::new("invalid_type", &self.type_message)]);
        }

        let errors: Vec<FieldError> = self
            .checks
            .iter()
            .filter(|check| !check.passes(value, values))
            .map(|check| FieldError::new(check.code, &check.message))
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// True when `value` does not satisfy a required constraint. An empty
    /// string counts as missing unless `minLength` governs the length.
    pub fn is_missing(&self, value: Option<&Value>) -> bool {
        match value {
            None => true,
            Some(value) if self.is_absent(value) => true,
            Some(Value::String(text)) => {
                text.is_empty()
                    && !self
                        .checks
                        .iter()
                        .any(|check| matches!(check.constraint, Constraint::MinLength(_)))
            }
            Some(_) => false,
        }
    }

    fn is_absent(&self, value: &Value) -> bool {
        match value {
            Value::Null => true,
            Value::String(text) => text.is_empty() && self.shape != Shape::Text,
            _ => false,
        }
    }

    fn shape_matches(&self, value: &Value) -> bool {
        match self.shape {
            Shape::Text => value.is_string(),
            Shape::Number => numeric(value).is_some(),
            Shape::Boolean => value.is_boolean(),
            Shape::StringList => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
            Shape::Date => parse_date(value).is_some(),
            Shape::File | Shape::Any => true,
        }
    }
}

impl Check {
    fn passes(&self, value: &Value, values: &Value) -> bool {
        let text = value.as_str().unwrap_or_default();
        match &self.constraint {
            Constraint::MinLength(min) => text.chars().count() >= *min,
            Constraint::MaxLength(max) => text.chars().count() <= *max,
            Constraint::Pattern(regex) => regex.is_match(text),
            Constraint::Email => EMAIL.as_ref().is_none_or(|regex| regex.is_match(text)),
            Constraint::Url => Url::parse(text).is_ok(),
            Constraint::Min(min) => numeric(value).is_some_and(|n| n >= *min),
            Constraint::Max(max) => numeric(value).is_some_and(|n| n <= *max),
            Constraint::Integer => numeric(value).is_some_and(|n| n.fract() == 0.0),
            Constraint::Positive => numeric(value).is_some_and(|n| n > 0.0),
            Constraint::Negative => numeric(value).is_some_and(|n| n < 0.0),
            Constraint::MinItems(min) => value.as_array().is_some_and(|items| items.len() >= *min),
            Constraint::MaxItems(max) => value.as_array().is_some_and(|items| items.len() <= *max),
            Constraint::MaxFileSize(max) => files(value).all(|file| {
                file.get("size")
                    .and_then(Value::as_f64)
                    .is_none_or(|size| size <= *max as f64)
            }),
            Constraint::AllowedTypes(globs) => files(value).all(|file| {
                ["type", "name"]
                    .iter()
                    .filter_map(|key| file.get(*key).and_then(Value::as_str))
                    .any(|candidate| globs.is_match(candidate))
            }),
            Constraint::Custom(expression) => {
                let mut scope = Map::new();
                scope.insert("value".into(), value.clone());
                scope.insert("values".into(), values.clone());
                match expression.evaluate(&Value::Object(scope)) {
                    Ok(result) => is_truthy(&result),
                    Err(err) => {
                        tracing::warn!(expression = expression.source(), error = %err, "custom validation failed");
                        false
                    }
                }
            }
        }
    }
}

/// Numbers, and strings holding a finite number.
fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

/// Accepts RFC 3339, `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM[:SS]` or epoch milliseconds.
pub(crate) fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis),
        Value::String(text) => {
            let text = text.trim();
            if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
                return Some(parsed.with_timezone(&Utc));
            }
            for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
                if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
                    return Some(parsed.and_utc());
                }
            }
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|parsed| parsed.and_utc())
        }
        _ => None,
    }
}

fn files(value: &Value) -> impl Iterator<Item = &Map<String, Value>> {
    let items: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    items.into_iter().filter_map(Value::as_object)
}

fn build_type_globs(patterns: &[String]) -> Option<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let pattern = pattern.trim();
        let glob = if pattern.starts_with('.') {
            format!("*{pattern}")
        } else {
            pattern.to_owned()
        };
        match GlobBuilder::new(&glob).case_insensitive(true).build() {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(err) => {
                tracing::warn!(pattern = %pattern, error = %err, "skipping invalid file type pattern");
            }
        }
    }
    builder
        .build()
        .inspect_err(|err| tracing::warn!(error = %err, "file type patterns unusable"))
        .ok()
}
