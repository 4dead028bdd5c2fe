//! Restricted expression language used by custom conditions, computed data
//! sources, response transforms and custom validators.
//!
//! The grammar covers literals, identifiers, member access, unary, binary,
//! logical and ternary operators. Anything else (calls, assignment,
//! statements, object or array literals) fails to parse.

mod ast;
mod error;
mod eval;
mod grammar;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

pub use ast::{BinaryOp, Expr, LogicalOp, Property, UnaryOp};
pub use error::ExpressionError;

use crate::value::is_truthy;

/// Upper bound on cached ASTs per [`Evaluator`].
const MAX_CACHED_EXPRESSIONS: usize = 512;

/// A parsed expression together with its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    ast: Expr,
}

impl Expression {
    /// Parses `source` into an expression.
    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        let ast = grammar::parse_expression(source)?;
        Ok(Self {
            source: source.to_owned(),
            ast,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn ast(&self) -> &Expr {
        &self.ast
    }

    /// Evaluates the expression against a JSON value context.
    pub fn evaluate(&self, values: &Value) -> Result<Value, ExpressionError> {
        eval::evaluate(&self.ast, values)
    }

    /// Evaluates the expression and reduces the result to its truthiness.
    pub fn evaluate_bool(&self, values: &Value) -> Result<bool, ExpressionError> {
        self.evaluate(values).map(|value| is_truthy(&value))
    }

    /// Dotted value paths the expression reads, e.g. `user.age`.
    pub fn dependencies(&self) -> BTreeSet<String> {
        let mut paths = BTreeSet::new();
        self.ast.collect_paths(&mut paths);
        paths
    }
}

/// Parses expressions once and reuses their ASTs across evaluations.
#[derive(Debug, Default)]
pub struct Evaluator {
    cache: Mutex<HashMap<String, Arc<Expression>>>,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached parse of `source`, parsing it on first use.
    ///
    /// Parse failures are not cached.
    pub fn compile(&self, source: &str) -> Result<Arc<Expression>, ExpressionError> {
        if let Some(expression) = self.cache.lock().get(source).cloned() {
            return Ok(expression);
        }
        let expression = Arc::new(Expression::parse(source)?);
        let mut cache = self.cache.lock();
        if cache.len() >= MAX_CACHED_EXPRESSIONS {
            cache.clear();
        }
        cache.insert(source.to_owned(), Arc::clone(&expression));
        Ok(expression)
    }

    pub fn evaluate(&self, source: &str, values: &Value) -> Result<Value, ExpressionError> {
        self.compile(source)?.evaluate(values)
    }

    /// Boundary evaluation: any failure is logged and becomes `false`.
    pub fn evaluate_or_false(&self, source: &str, values: &Value) -> Value {
        self.evaluate(source, values).unwrap_or_else(|err| {
            tracing::warn!(expression = source, error = %err, "expression evaluation failed");
            Value::Bool(false)
        })
    }

    /// Boundary evaluation in a boolean context.
    pub fn test(&self, source: &str, values: &Value) -> bool {
        is_truthy(&self.evaluate_or_false(source, values))
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }
}

/// Parses and evaluates `source`; failures are logged and yield `false`.
pub fn evaluate_expression(source: &str, values: &Value) -> Value {
    Expression::parse(source)
        .and_then(|expression| expression.evaluate(values))
        .unwrap_or_else(|err| {
            tracing::warn!(expression = source, error = %err, "expression evaluation failed");
            Value::Bool(false)
        })
}

/// Boolean-context variant of [`evaluate_expression`].
pub fn evaluate_condition_expression(source: &str, values: &Value) -> bool {
    is_truthy(&evaluate_expression(source, values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn evaluator_caches_successful_parses() {
        let evaluator = Evaluator::new();
        assert_eq!(evaluator.evaluate("a + 1", &json!({"a": 1})).unwrap(), json!(2));
        assert_eq!(evaluator.evaluate("a + 1", &json!({"a": 2})).unwrap(), json!(3));
        assert!(evaluator.evaluate("a +", &json!({})).is_err());
        assert_eq!(evaluator.cached_len(), 1);
    }

    #[test]
    fn dependencies_collapse_member_chains() {
        let expression =
            Expression::parse("user.age >= 18 && items[idx].price > limit ? 1 : fallback")
                .unwrap();
        let deps: Vec<_> = expression.dependencies().into_iter().collect();
        assert_eq!(deps, vec!["fallback", "idx", "items", "limit", "user.age"]);
    }

    #[test]
    fn boundary_turns_failures_into_false() {
        assert_eq!(evaluate_expression("foo(", &json!({})), json!(false));
        assert_eq!(evaluate_expression("1 / 0", &json!({})), json!(false));
        assert!(!evaluate_condition_expression("constructor()", &json!({})));
        assert!(evaluate_condition_expression("flag", &json!({"flag": true})));
    }
}
