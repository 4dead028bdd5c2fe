use serde_json::Value;

use super::ast::{BinaryOp, Expr, LogicalOp, Property, UnaryOp};
use super::error::ExpressionError;
use crate::path::step;
use crate::value::{
    display_string, is_truthy, number_value, strict_equals, to_number, type_name,
};

/// Maximum recursion depth for evaluation; long operator chains nest deeper
/// than the parser's bracket limit.
const MAX_EVAL_DEPTH: usize = 256;

type EvalResult = Result<Value, ExpressionError>;

pub(crate) fn evaluate(expr: &Expr, scope: &Value) -> EvalResult {
    eval_with_depth(expr, scope, 0)
}

fn eval_with_depth(expr: &Expr, scope: &Value, depth: usize) -> EvalResult {
    if depth > MAX_EVAL_DEPTH {
        return Err(ExpressionError::DepthExceeded(MAX_EVAL_DEPTH));
    }
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Identifier(name) => Ok(step(scope, name).cloned().unwrap_or(Value::Null)),
        Expr::Member { object, property } => {
            let object = eval_with_depth(object, scope, depth + 1)?;
            let key = match property {
                Property::Static(name) => Some(name.clone()),
                Property::Computed(index) => member_key(&eval_with_depth(index, scope, depth + 1)?),
            };
            Ok(key.map(|key| property_of(&object, &key)).unwrap_or(Value::Null))
        }
        Expr::Unary { op, operand } => {
            let value = eval_with_depth(operand, scope, depth + 1)?;
            eval_unary(*op, &value)
        }
        Expr::Binary { op, left, right } => {
            let left = eval_with_depth(left, scope, depth + 1)?;
            let right = eval_with_depth(right, scope, depth + 1)?;
            eval_binary(*op, &left, &right)
        }
        Expr::Logical { op, left, right } => {
            let left = eval_with_depth(left, scope, depth + 1)?;
            match (op, is_truthy(&left)) {
                (LogicalOp::And, false) | (LogicalOp::Or, true) => Ok(left),
                _ => eval_with_depth(right, scope, depth + 1),
            }
        }
        Expr::Conditional {
            test,
            consequent,
            alternate,
        } => {
            let branch = if is_truthy(&eval_with_depth(test, scope, depth + 1)?) {
                consequent
            } else {
                alternate
            };
            eval_with_depth(branch, scope, depth + 1)
        }
    }
}

fn member_key(index: &Value) -> Option<String> {
    match index {
        Value::String(key) => Some(key.clone()),
        Value::Number(_) | Value::Bool(_) => Some(display_string(index)),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn property_of(object: &Value, key: &str) -> Value {
    match (object, key) {
        (Value::Array(items), "length") => Value::from(items.len()),
        (Value::String(text), "length") => Value::from(text.chars().count()),
        _ => step(object, key).cloned().unwrap_or(Value::Null),
    }
}

fn eval_unary(op: UnaryOp, value: &Value) -> EvalResult {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!is_truthy(value))),
        UnaryOp::Negate | UnaryOp::Plus => {
            let number = to_number(value).ok_or(ExpressionError::InvalidOperand {
                op: op.symbol(),
                operand: type_name(value),
            })?;
            let result = if op == UnaryOp::Negate { -number } else { number };
            number_value(result).ok_or(ExpressionError::NonFinite)
        }
    }
}

fn eval_binary(op: BinaryOp, left: &Value, right: &Value) -> EvalResult {
    match op {
        BinaryOp::Eq | BinaryOp::StrictEq => Ok(Value::Bool(strict_equals(left, right))),
        BinaryOp::NotEq | BinaryOp::StrictNotEq => Ok(Value::Bool(!strict_equals(left, right))),
        BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Lte | BinaryOp::Gte => {
            Ok(Value::Bool(compare(op, left, right)))
        }
        BinaryOp::Add if left.is_string() || right.is_string() => Ok(Value::String(format!(
            "{}{}",
            display_string(left),
            display_string(right)
        ))),
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            arithmetic(op, left, right)
        }
    }
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> bool {
    let ordering = match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => match (to_number(left), to_number(right)) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
    };
    let Some(ordering) = ordering else {
        return false;
    };
    match op {
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::Gt => ordering.is_gt(),
        BinaryOp::Lte => ordering.is_le(),
        BinaryOp::Gte => ordering.is_ge(),
        _ => false,
    }
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> EvalResult {
    let (Some(a), Some(b)) = (to_number(left), to_number(right)) else {
        return Err(ExpressionError::TypeMismatch {
            op: op.symbol(),
            left: type_name(left),
            right: type_name(right),
        });
    };
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div | BinaryOp::Rem if b == 0.0 => {
            return Err(ExpressionError::DivisionByZero);
        }
        BinaryOp::Div => a / b,
        _ => a % b,
    };
    number_value(result).ok_or(ExpressionError::NonFinite)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::grammar::parse_expression;
    use serde_json::json;

    fn eval(source: &str, scope: Value) -> EvalResult {
        evaluate(&parse_expression(source).expect("parse"), &scope)
    }

    #[test]
    fn test_eval_arithmetic() {
        assert_eq!(eval("2 + 3 * 4", json!({})).unwrap(), json!(14));
        assert_eq!(eval("(2 + 3) * 4", json!({})).unwrap(), json!(20));
        assert_eq!(eval("7 % 4", json!({})).unwrap(), json!(3));
        assert_eq!(eval("7 / 2", json!({})).unwrap(), json!(3.5));
        assert_eq!(eval("-price", json!({"price": 5})).unwrap(), json!(-5));
        assert_eq!(eval("+qty", json!({"qty": "3"})).unwrap(), json!(3));
    }

    #[test]
    fn test_string_concatenation() {
        assert_eq!(
            eval("first + ' ' + last", json!({"first": "Ada", "last": "Lovelace"})).unwrap(),
            json!("Ada Lovelace")
        );
        assert_eq!(eval("'n' + 1", json!({})).unwrap(), json!("n1"));
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(
            eval("1 / zero", json!({"zero": 0})),
            Err(ExpressionError::DivisionByZero)
        );
    }

    #[test]
    fn test_arithmetic_on_objects_is_rejected() {
        assert!(matches!(
            eval("user * 2", json!({"user": {"a": 1}})),
            Err(ExpressionError::TypeMismatch { op: "*", .. })
        ));
    }

    #[test]
    fn test_member_access() {
        let scope = json!({"user": {"tags": ["a", "b"], "name": "Ada"}, "i": 1});
        assert_eq!(eval("user.tags[i]", scope.clone()).unwrap(), json!("b"));
        assert_eq!(eval("user['name']", scope.clone()).unwrap(), json!("Ada"));
        assert_eq!(eval("user.tags.length", scope.clone()).unwrap(), json!(2));
        assert_eq!(eval("user.missing.deeper", scope).unwrap(), Value::Null);
    }

    #[test]
    fn test_logical_operators_return_operands() {
        assert_eq!(eval("nick || 'anon'", json!({})).unwrap(), json!("anon"));
        assert_eq!(eval("nick || 'anon'", json!({"nick": "ada"})).unwrap(), json!("ada"));
        assert_eq!(eval("a && b", json!({"a": 1, "b": 0})).unwrap(), json!(0));
    }

    #[test]
    fn test_short_circuit_skips_failing_operand() {
        assert_eq!(eval("false && 1 / 0", json!({})).unwrap(), json!(false));
        assert_eq!(eval("true || 1 / 0", json!({})).unwrap(), json!(true));
    }

    #[test]
    fn test_strict_equality_does_not_coerce() {
        assert_eq!(eval("age == '21'", json!({"age": 21})).unwrap(), json!(false));
        assert_eq!(eval("age === 21", json!({"age": 21.0})).unwrap(), json!(true));
        assert_eq!(eval("age != 21", json!({"age": 21})).unwrap(), json!(false));
    }

    #[test]
    fn test_relational_comparisons() {
        assert_eq!(eval("age >= 18", json!({"age": 18})).unwrap(), json!(true));
        assert_eq!(eval("'b' > 'a'", json!({})).unwrap(), json!(true));
        assert_eq!(eval("missing < 3", json!({})).unwrap(), json!(false));
    }

    #[test]
    fn test_ternary_evaluates_chosen_branch_only() {
        assert_eq!(
            eval("ok ? 'yes' : 1 / 0", json!({"ok": true})).unwrap(),
            json!("yes")
        );
    }

    #[test]
    fn test_deep_operator_chain_hits_depth_limit() {
        let source = vec!["1"; 400].join(" + ");
        assert_eq!(
            eval(&source, json!({})),
            Err(ExpressionError::DepthExceeded(MAX_EVAL_DEPTH))
        );
    }
}
