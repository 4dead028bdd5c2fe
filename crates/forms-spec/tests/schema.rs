use std::collections::BTreeSet;

use serde_json::{Value, json};

use forms_spec::{DataSource, FieldType, FormSchema, HttpMethod};

const SAMPLE_FORM: &str = include_str!("fixtures/sample_form.json");

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|item| item.to_string()).collect()
}

#[test]
fn sample_form_round_trips() {
    let raw: Value = serde_json::from_str(SAMPLE_FORM).unwrap();
    let schema: FormSchema = serde_json::from_value(raw.clone()).unwrap();
    let encoded = serde_json::to_value(&schema).unwrap();
    let decoded: FormSchema = serde_json::from_value(encoded.clone()).unwrap();
    assert_eq!(schema, decoded);
    assert_eq!(encoded["fields"][3]["dataSource"]["params"], json!({"country": "$country"}));
    assert_eq!(encoded["fields"][5]["defaultValue"], json!(1));
}

#[test]
fn field_types_and_sources_decode() {
    let schema: FormSchema = serde_json::from_str(SAMPLE_FORM).unwrap();
    let state = schema.field("state").unwrap();
    assert_eq!(state.kind, FieldType::Select);
    assert!(state.kind.has_options());
    match state.data_source.as_ref().unwrap() {
        DataSource::Remote {
            endpoint, method, ..
        } => {
            assert_eq!(endpoint, "/regions");
            assert_eq!(*method, HttpMethod::Get);
        }
        other => panic!("expected remote source, got {other:?}"),
    }
    assert_eq!(schema.field("total").unwrap().data_source.as_ref().unwrap().kind(), "computed");
    assert!(schema.field("nope").is_none());
}

#[test]
fn unknown_field_type_is_rejected() {
    let err = serde_json::from_value::<FormSchema>(json!({
        "id": "x",
        "title": "X",
        "version": "1",
        "fields": [{"name": "a", "type": "colour"}]
    }));
    assert!(err.is_err());
}

#[test]
fn dependency_graph_qualifies_rule_ids() {
    let schema: FormSchema = serde_json::from_str(SAMPLE_FORM).unwrap();
    let graph = schema.dependency_graph();
    assert_eq!(
        graph.rules_for("country").cloned().unwrap_or_default(),
        set(&["state:north-america", "zip:us-zip"])
    );
    assert_eq!(
        graph.rules_for("quantity").cloned().unwrap_or_default(),
        set(&["express:bulk-lock"])
    );
}

#[test]
fn affected_fields_include_data_source_dependents() {
    let schema: FormSchema = serde_json::from_str(SAMPLE_FORM).unwrap();
    assert_eq!(schema.fields_affected_by("country"), set(&["state", "zip"]));
    assert_eq!(schema.fields_affected_by("quantity"), set(&["express", "total"]));
    assert!(schema.fields_affected_by("email").is_empty());
}

#[test]
fn json_schema_describes_form_documents() {
    let schema = schemars::schema_for!(FormSchema);
    let value = serde_json::to_value(&schema).unwrap();
    let properties = value.get("properties").expect("properties");
    assert!(properties.get("fields").is_some());
    assert!(properties.get("title").is_some());
}
