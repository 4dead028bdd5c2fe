use std::borrow::Cow;
use std::collections::HashMap;

use parking_lot::Mutex;
use regex::Regex;
use serde_json::{Map, Value};

use super::model::{Condition, Effects, Rule, RuleOperator};
use crate::expr::Evaluator;
use crate::path::get_path;
use crate::value::{display_string, strict_equals};

/// Root under which the optional evaluation context is exposed to conditions.
pub const CONTEXT_ROOT: &str = "$context";

/// Upper bound on compiled `matches` patterns per [`RuleEngine`].
const MAX_CACHED_PATTERNS: usize = 256;

/// Evaluates conditions and applies rule effects.
///
/// Holds the parsed-expression cache and the compiled `matches` patterns so
/// repeated re-evaluation does not re-parse anything.
#[derive(Debug, Default)]
pub struct RuleEngine {
    evaluator: Evaluator,
    patterns: Mutex<HashMap<String, Option<Regex>>>,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    /// Evaluates one condition; the first operator present decides.
    pub fn evaluate_condition(&self, condition: &Condition, values: &Value) -> bool {
        if let Some(custom) = &condition.custom {
            return self.evaluator.test(custom, values);
        }
        let resolved = get_path(values, &condition.when);
        if let Some(expected) = &condition.is {
            return resolved.is_some_and(|value| strict_equals(value, expected));
        }
        if let Some(unexpected) = &condition.is_not {
            return !resolved.is_some_and(|value| strict_equals(value, unexpected));
        }
        if let Some(allowed) = &condition.in_list {
            return contains(allowed, resolved);
        }
        if let Some(denied) = &condition.not_in {
            return !contains(denied, resolved);
        }
        if let Some(pattern) = &condition.matches {
            let text = resolved.map(display_string).unwrap_or_default();
            return self.pattern_matches(pattern, &text);
        }
        false
    }

    /// Combines conditions with AND or OR; an empty list is always true.
    pub fn evaluate_conditions(
        &self,
        conditions: &[Condition],
        values: &Value,
        operator: RuleOperator,
    ) -> bool {
        match operator {
            RuleOperator::And => conditions
                .iter()
                .all(|condition| self.evaluate_condition(condition, values)),
            RuleOperator::Or => {
                conditions.is_empty()
                    || conditions
                        .iter()
                        .any(|condition| self.evaluate_condition(condition, values))
            }
        }
    }

    /// Applies rules in declaration order. Each matching rule overwrites the
    /// keys it sets, so the last matching rule wins per effect key.
    ///
    /// `context` is reachable from conditions as `$context.<path>`.
    pub fn apply_rules(&self, rules: &[Rule], values: &Value, context: Option<&Value>) -> Effects {
        let scope = with_context(values, context);
        let mut state = Effects::default();
        for rule in rules {
            if self.evaluate_conditions(&rule.conditions, &scope, rule.operator) {
                tracing::trace!(rule = %rule.id, "rule matched");
                state.overlay(&rule.effects);
            }
        }
        state
    }

    /// Visibility of a field governed by `rules`.
    ///
    /// Without an explicit `visible` from a matching rule the field is hidden
    /// when any rule can show it, and visible otherwise.
    pub fn is_field_visible(&self, rules: &[Rule], values: &Value) -> bool {
        self.is_field_visible_with_default(rules, values, None)
    }

    /// Like [`RuleEngine::is_field_visible`] with an explicit fallback that
    /// replaces the show-rule heuristic when no rule decides visibility.
    pub fn is_field_visible_with_default(
        &self,
        rules: &[Rule],
        values: &Value,
        default: Option<bool>,
    ) -> bool {
        if rules.is_empty() {
            return default.unwrap_or(true);
        }
        let applied = self.apply_rules(rules, values, None);
        resolve_visibility(rules, &applied, default)
    }

    fn pattern_matches(&self, pattern: &str, text: &str) -> bool {
        let mut patterns = self.patterns.lock();
        if patterns.len() >= MAX_CACHED_PATTERNS && !patterns.contains_key(pattern) {
            patterns.clear();
        }
        let compiled = patterns.entry(pattern.to_owned()).or_insert_with(|| {
            Regex::new(pattern)
                .inspect_err(|err| {
                    tracing::warn!(pattern, error = %err, "invalid condition pattern");
                })
                .ok()
        });
        compiled.as_ref().is_some_and(|regex| regex.is_match(text))
    }

    pub fn cached_patterns(&self) -> usize {
        self.patterns.lock().len()
    }
}

/// Final visibility from the applied effects of `rules`.
pub(crate) fn resolve_visibility(rules: &[Rule], applied: &Effects, default: Option<bool>) -> bool {
    if let Some(visible) = applied.visible {
        return visible;
    }
    if let Some(default) = default {
        return default;
    }
    let has_show_rule = rules.iter().any(|rule| rule.effects.visible == Some(true));
    !has_show_rule
}

fn contains(list: &[Value], resolved: Option<&Value>) -> bool {
    resolved.is_some_and(|value| list.iter().any(|item| strict_equals(item, value)))
}

fn with_context<'a>(values: &'a Value, context: Option<&Value>) -> Cow<'a, Value> {
    let Some(context) = context else {
        return Cow::Borrowed(values);
    };
    let mut scope = values.as_object().cloned().unwrap_or_else(Map::new);
    scope.insert(CONTEXT_ROOT.to_owned(), context.clone());
    Cow::Owned(Value::Object(scope))
}
