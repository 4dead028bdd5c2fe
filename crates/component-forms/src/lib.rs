use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;

use forms_spec::{
    Expression, ExpressionError, FormSchema, RuleEngine, resolve_form_state, validate_form,
};

const DEFAULT_SCHEMA: &str = include_str!("../../forms-spec/tests/fixtures/sample_form.json");

#[derive(Debug, Error)]
enum ComponentError {
    #[error("failed to parse config/{0}")]
    ConfigParse(#[source] serde_json::Error),
    #[error("failed to parse values: {0}")]
    ValuesParse(#[source] serde_json::Error),
    #[error("json encode error: {0}")]
    JsonEncode(#[source] serde_json::Error),
    #[error("expression error: {0}")]
    Expression(#[from] ExpressionError),
}

#[derive(Debug, Deserialize, Serialize, Default)]
struct ComponentConfig {
    #[serde(default)]
    form_schema_json: Option<String>,
}

fn load_form_schema(config_json: &str) -> Result<FormSchema, ComponentError> {
    let config = if config_json.trim().is_empty() {
        ComponentConfig::default()
    } else {
        serde_json::from_str(config_json).map_err(ComponentError::ConfigParse)?
    };

    let schema_json = config.form_schema_json.as_deref().unwrap_or(DEFAULT_SCHEMA);

    serde_json::from_str(schema_json).map_err(ComponentError::ConfigParse)
}

fn parse_values(values_json: &str) -> Result<Value, ComponentError> {
    if values_json.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_str(values_json).map_err(ComponentError::ValuesParse)
}

fn encode<T: Serialize>(value: &T) -> Result<Value, ComponentError> {
    serde_json::to_value(value).map_err(ComponentError::JsonEncode)
}

fn respond(result: Result<Value, ComponentError>) -> String {
    match result {
        Ok(value) => serde_json::to_string(&value).unwrap_or_else(|error| {
            json!({"error": format!("json encode: {}", error)}).to_string()
        }),
        Err(err) => json!({ "error": err.to_string() }).to_string(),
    }
}

pub fn describe(config_json: &str) -> String {
    respond(load_form_schema(config_json).and_then(|schema| encode(&schema)))
}

pub fn evaluate(expression: &str, values_json: &str) -> String {
    respond(parse_values(values_json).and_then(|values| {
        let value = Expression::parse(expression)?.evaluate(&values)?;
        Ok(json!({ "value": value }))
    }))
}

pub fn field_states(config_json: &str, values_json: &str) -> String {
    respond(load_form_schema(config_json).and_then(|schema| {
        let values = parse_values(values_json)?;
        encode(&resolve_form_state(&RuleEngine::new(), &schema, &values))
    }))
}

pub fn validate_values(config_json: &str, values_json: &str) -> String {
    respond(load_form_schema(config_json).and_then(|schema| {
        let values = parse_values(values_json)?;
        encode(&validate_form(&RuleEngine::new(), &schema, &values))
    }))
}

pub fn dependency_graph(config_json: &str) -> String {
    respond(load_form_schema(config_json).and_then(|schema| encode(&schema.dependency_graph())))
}

pub fn affected_fields(config_json: &str, changed_path: &str) -> String {
    respond(load_form_schema(config_json).map(|schema| {
        json!({
            "changed": changed_path,
            "fields": schema.fields_affected_by(changed_path),
        })
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(payload: &str) -> Value {
        serde_json::from_str(payload).expect("json")
    }

    #[test]
    fn describe_returns_bundled_schema() {
        let schema = parse(&describe(""));
        assert_eq!(schema["id"], "shipping");
        assert!(schema["fields"].as_array().is_some_and(|fields| !fields.is_empty()));
    }

    #[test]
    fn describe_uses_configured_schema() {
        let schema = json!({
            "id": "tiny",
            "title": "Tiny",
            "version": "1.0",
            "fields": [{ "name": "q1", "type": "text" }]
        });
        let config = json!({ "form_schema_json": schema.to_string() });
        let parsed = parse(&describe(&config.to_string()));
        assert_eq!(parsed["id"], "tiny");
        assert_eq!(parsed["fields"][0]["type"], "text");
    }

    #[test]
    fn broken_config_reports_error() {
        let parsed = parse(&describe("{not json"));
        assert!(parsed["error"].as_str().unwrap().contains("failed to parse config"));
    }

    #[test]
    fn evaluate_returns_value() {
        let parsed = parse(&evaluate("a * 2 + 1", r#"{"a": 4}"#));
        assert_eq!(parsed["value"], 9);
    }

    #[test]
    fn evaluate_reports_expression_errors() {
        let parsed = parse(&evaluate("a +", "{}"));
        assert!(parsed["error"].as_str().unwrap().starts_with("expression error"));
        let parsed = parse(&evaluate("1 / 0", ""));
        assert!(parsed["error"].as_str().unwrap().contains("division by zero"));
    }

    #[test]
    fn field_states_follow_rules() {
        let parsed = parse(&field_states("", r#"{"country": "US"}"#));
        assert_eq!(parsed["state"]["visible"], true);
        assert_eq!(parsed["zip"]["required"], true);
        assert_eq!(parsed["quantity"]["value"], 1);
    }

    #[test]
    fn validate_values_reports_missing_fields() {
        let parsed = parse(&validate_values("", "{}"));
        assert_eq!(parsed["valid"], false);
        assert_eq!(parsed["missingRequired"][0], "name");
    }

    #[test]
    fn validate_values_rejects_bad_json() {
        let parsed = parse(&validate_values("", "[1,"));
        assert!(parsed["error"].as_str().unwrap().contains("failed to parse values"));
    }

    #[test]
    fn dependency_graph_lists_paths() {
        let parsed = parse(&dependency_graph(""));
        assert_eq!(parsed["country"], json!(["state:north-america", "zip:us-zip"]));
    }

    #[test]
    fn affected_fields_for_changed_path() {
        let parsed = parse(&affected_fields("", "country"));
        assert_eq!(parsed["fields"], json!(["state", "zip"]));
    }
}
