use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use super::model::Rule;
use crate::expr::Expression;
use crate::path::paths_overlap;

/// Value path → ids of the rules whose conditions read that path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DependencyGraph {
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn build(rules: &[Rule]) -> Self {
        let mut graph = Self::default();
        graph.add_rules(rules, None);
        graph
    }

    /// Records the dependencies of `rules`. With a `scope`, rule ids are
    /// stored as `scope:id` so rules of different fields stay distinct.
    pub fn add_rules(&mut self, rules: &[Rule], scope: Option<&str>) {
        for rule in rules {
            let rule_id = match scope {
                Some(scope) => format!("{scope}:{}", rule.id),
                None => rule.id.clone(),
            };
            for condition in &rule.conditions {
                if !condition.when.is_empty() {
                    self.insert(&condition.when, &rule_id);
                }
                let Some(custom) = &condition.custom else {
                    continue;
                };
                match Expression::parse(custom) {
                    Ok(expression) => {
                        for path in expression.dependencies() {
                            self.insert(&path, &rule_id);
                        }
                    }
                    Err(err) => {
                        tracing::warn!(rule = %rule_id, error = %err, "skipping dependencies of unparsable custom condition");
                    }
                }
            }
        }
    }

    pub fn insert(&mut self, path: &str, rule_id: &str) {
        self.edges
            .entry(path.to_owned())
            .or_default()
            .insert(rule_id.to_owned());
    }

    /// Rules that read exactly `path`.
    pub fn rules_for(&self, path: &str) -> Option<&BTreeSet<String>> {
        self.edges.get(path)
    }

    /// Rules to re-evaluate after `changed` was written: rules reading the
    /// path itself, one of its ancestors or one of its descendants.
    pub fn affected_rules(&self, changed: &str) -> BTreeSet<String> {
        self.edges
            .iter()
            .filter(|(path, _)| paths_overlap(path, changed))
            .flat_map(|(_, rules)| rules.iter().cloned())
            .collect()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.edges.keys().map(String::as_str)
    }

    pub fn as_map(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// Builds the dependency graph of a single rule list.
pub fn build_dependency_graph(rules: &[Rule]) -> DependencyGraph {
    DependencyGraph::build(rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{Condition, Effects};
    use serde_json::json;

    #[test]
    fn custom_conditions_contribute_identifier_paths() {
        let rules = vec![
            Rule::new(
                "adult",
                vec![Condition::custom("user.age >= 18 && consent")],
                Effects::default(),
            ),
            Rule::new(
                "us",
                vec![Condition::is("country", json!("US"))],
                Effects::default(),
            ),
        ];
        let graph = build_dependency_graph(&rules);
        let fields: Vec<_> = graph.fields().collect();
        assert_eq!(fields, vec!["consent", "country", "user.age"]);
        assert!(graph.rules_for("user.age").unwrap().contains("adult"));
        assert!(graph.rules_for("").is_none());
    }

    #[test]
    fn affected_rules_follow_ancestors_and_descendants() {
        let rules = vec![
            Rule::new(
                "age",
                vec![Condition::is("user.age", json!(1))],
                Effects::default(),
            ),
            Rule::new(
                "whole",
                vec![Condition::is("user", json!({}))],
                Effects::default(),
            ),
            Rule::new(
                "other",
                vec![Condition::is("username", json!("x"))],
                Effects::default(),
            ),
        ];
        let graph = DependencyGraph::build(&rules);
        let affected: Vec<_> = graph.affected_rules("user").into_iter().collect();
        assert_eq!(affected, vec!["age", "whole"]);
        let affected: Vec<_> = graph.affected_rules("user.age").into_iter().collect();
        assert_eq!(affected, vec!["age", "whole"]);
    }

    #[test]
    fn scoped_ids_keep_fields_apart() {
        let rules = vec![Rule::new(
            "show",
            vec![Condition::is("t", json!(true))],
            Effects::default(),
        )];
        let mut graph = DependencyGraph::default();
        graph.add_rules(&rules, Some("email"));
        graph.add_rules(&rules, Some("phone"));
        let ids: Vec<_> = graph.rules_for("t").unwrap().iter().cloned().collect();
        assert_eq!(ids, vec!["email:show", "phone:show"]);
    }
}
