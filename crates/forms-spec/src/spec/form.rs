use std::collections::BTreeSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::path::paths_overlap;
use crate::rules::DependencyGraph;
use crate::spec::field::FieldSpec;

/// Top-level form definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FormSchema {
    pub id: String,
    pub title: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub fields: Vec<FieldSpec>,
}

impl FormSchema {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Graph over every field's rules; rule ids are qualified as
    /// `field:ruleId`.
    pub fn dependency_graph(&self) -> DependencyGraph {
        let mut graph = DependencyGraph::default();
        for field in &self.fields {
            graph.add_rules(&field.rules, Some(&field.name));
        }
        graph
    }

    /// Names of the fields whose state may change when `changed` changes:
    /// fields with rules reading it and fields whose data source depends on it.
    pub fn fields_affected_by(&self, changed: &str) -> BTreeSet<String> {
        let mut affected: BTreeSet<String> = self
            .dependency_graph()
            .affected_rules(changed)
            .into_iter()
            .filter_map(|rule| rule.split_once(':').map(|(field, _)| field.to_owned()))
            .collect();
        for field in &self.fields {
            let Some(source) = &field.data_source else {
                continue;
            };
            if source
                .dependencies()
                .iter()
                .any(|dependency| paths_overlap(dependency, changed))
            {
                affected.insert(field.name.clone());
            }
        }
        affected
    }
}
