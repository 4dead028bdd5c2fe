use serde_json::Value;
use winnow::combinator::{alt, cut_err, opt};
use winnow::error::{ErrMode, ModalResult, StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::token::{any, take_while};

use super::ast::{BinaryOp, Expr, LogicalOp, Property, UnaryOp};
use super::error::ExpressionError;
use crate::value::number_value;

/// Nesting limit shared by parentheses, brackets, ternaries and unary chains.
pub(crate) const MAX_DEPTH: usize = 64;

/// Tree height limit for operator and member chains, which are built in loops
/// and so escape `MAX_DEPTH`.
pub(crate) const MAX_HEIGHT: usize = 256;

type Operand = fn(&mut &str, usize) -> ModalResult<Expr>;

/// Parses a complete expression; trailing input is an error.
pub(crate) fn parse_expression(source: &str) -> Result<Expr, ExpressionError> {
    expression
        .parse(source)
        .map_err(|err| ExpressionError::Parse(err.to_string()))
}

fn expression(input: &mut &str) -> ModalResult<Expr> {
    let expr = conditional(input, 0)?;
    ws.parse_next(input)?;
    Ok(expr)
}

// -- Whitespace & tokens ----------------------------------------------------

fn ws(input: &mut &str) -> ModalResult<()> {
    take_while(0.., |c: char| c.is_whitespace())
        .void()
        .parse_next(input)
}

fn identifier<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    (
        take_while(1.., |c: char| c.is_ascii_alphabetic() || c == '_' || c == '$'),
        take_while(0.., |c: char| {
            c.is_ascii_alphanumeric() || c == '_' || c == '$'
        }),
    )
        .take()
        .parse_next(input)
}

fn string_literal(input: &mut &str) -> ModalResult<String> {
    let quote = alt(('"', '\'')).parse_next(input)?;
    let mut text = String::new();
    loop {
        let ch = cut_err(any).parse_next(input)?;
        match ch {
            c if c == quote => return Ok(text),
            '\\' => {
                let escaped = cut_err(any).parse_next(input)?;
                match escaped {
                    'n' => text.push('\n'),
                    't' => text.push('\t'),
                    'r' => text.push('\r'),
                    '0' => text.push('\0'),
                    other => text.push(other),
                }
            }
            c => text.push(c),
        }
    }
}

fn number_literal(input: &mut &str) -> ModalResult<Value> {
    let digits = |c: char| c.is_ascii_digit();
    let text = (
        take_while(1.., digits),
        opt(('.', take_while(1.., digits))),
        opt((
            alt(('e', 'E')),
            opt(alt(('+', '-'))),
            take_while(1.., digits),
        )),
    )
        .take()
        .parse_next(input)?;
    parse_number(text).ok_or_else(|| ErrMode::from_input(input).cut())
}

fn parse_number(text: &str) -> Option<Value> {
    if !text.contains(['.', 'e', 'E'])
        && let Ok(int) = text.parse::<i64>()
    {
        return Some(Value::from(int));
    }
    text.parse::<f64>().ok().and_then(number_value)
}

// -- Operators --------------------------------------------------------------

fn or_op(input: &mut &str) -> ModalResult<LogicalOp> {
    "||".value(LogicalOp::Or).parse_next(input)
}

fn and_op(input: &mut &str) -> ModalResult<LogicalOp> {
    "&&".value(LogicalOp::And).parse_next(input)
}

fn equality_op(input: &mut &str) -> ModalResult<BinaryOp> {
    alt((
        "===".value(BinaryOp::StrictEq),
        "!==".value(BinaryOp::StrictNotEq),
        "==".value(BinaryOp::Eq),
        "!=".value(BinaryOp::NotEq),
    ))
    .parse_next(input)
}

fn relational_op(input: &mut &str) -> ModalResult<BinaryOp> {
    alt((
        "<=".value(BinaryOp::Lte),
        ">=".value(BinaryOp::Gte),
        "<".value(BinaryOp::Lt),
        ">".value(BinaryOp::Gt),
    ))
    .parse_next(input)
}

fn additive_op(input: &mut &str) -> ModalResult<BinaryOp> {
    alt(('+'.value(BinaryOp::Add), '-'.value(BinaryOp::Sub))).parse_next(input)
}

fn multiplicative_op(input: &mut &str) -> ModalResult<BinaryOp> {
    alt((
        '*'.value(BinaryOp::Mul),
        '/'.value(BinaryOp::Div),
        '%'.value(BinaryOp::Rem),
    ))
    .parse_next(input)
}

fn unary_op(input: &mut &str) -> ModalResult<UnaryOp> {
    alt((
        '!'.value(UnaryOp::Not),
        '-'.value(UnaryOp::Negate),
        '+'.value(UnaryOp::Plus),
    ))
    .parse_next(input)
}

// -- Expressions (precedence: ternary < || < && < equality < relational
//    < additive < multiplicative < unary < member < primary) ---------------

fn conditional(input: &mut &str, depth: usize) -> ModalResult<Expr> {
    let test = logical_or(input, depth)?;
    ws.parse_next(input)?;
    if opt('?').parse_next(input)?.is_none() {
        return Ok(test);
    }
    let consequent = conditional(input, depth + 1)?;
    ws.parse_next(input)?;
    cut_err(':')
        .context(StrContext::Expected(StrContextValue::CharLiteral(':')))
        .parse_next(input)?;
    let alternate = conditional(input, depth + 1)?;
    Ok(Expr::Conditional {
        test: Box::new(test),
        consequent: Box::new(consequent),
        alternate: Box::new(alternate),
    })
}

fn chain<T>(
    input: &mut &str,
    depth: usize,
    operand: Operand,
    operator: fn(&mut &str) -> ModalResult<T>,
    build: fn(T, Expr, Expr) -> Expr,
) -> ModalResult<Expr> {
    let mut left = operand(input, depth)?;
    let mut height = left.height();
    loop {
        ws.parse_next(input)?;
        let Some(op) = opt(operator).parse_next(input)? else {
            return Ok(left);
        };
        let right = operand(input, depth)?;
        height = height.max(right.height()) + 1;
        if height > MAX_HEIGHT {
            return Err(ErrMode::from_input(input).cut());
        }
        left = build(op, left, right);
    }
}

fn logical_or(input: &mut &str, depth: usize) -> ModalResult<Expr> {
    chain(input, depth, logical_and, or_op, Expr::logical)
}

fn logical_and(input: &mut &str, depth: usize) -> ModalResult<Expr> {
    chain(input, depth, equality, and_op, Expr::logical)
}

fn equality(input: &mut &str, depth: usize) -> ModalResult<Expr> {
    chain(input, depth, relational, equality_op, Expr::binary)
}

fn relational(input: &mut &str, depth: usize) -> ModalResult<Expr> {
    chain(input, depth, additive, relational_op, Expr::binary)
}

fn additive(input: &mut &str, depth: usize) -> ModalResult<Expr> {
    chain(input, depth, multiplicative, additive_op, Expr::binary)
}

fn multiplicative(input: &mut &str, depth: usize) -> ModalResult<Expr> {
    chain(input, depth, unary, multiplicative_op, Expr::binary)
}

fn unary(input: &mut &str, depth: usize) -> ModalResult<Expr> {
    if depth > MAX_DEPTH {
        return Err(ErrMode::from_input(input).cut());
    }
    ws.parse_next(input)?;
    match opt(unary_op).parse_next(input)? {
        Some(op) => {
            let operand = unary(input, depth + 1)?;
            Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
            })
        }
        None => member(input, depth),
    }
}

fn member(input: &mut &str, depth: usize) -> ModalResult<Expr> {
    let mut expr = primary(input, depth)?;
    let mut height = expr.height();
    loop {
        if height > MAX_HEIGHT {
            return Err(ErrMode::from_input(input).cut());
        }
        ws.parse_next(input)?;
        if opt('.').parse_next(input)?.is_some() {
            ws.parse_next(input)?;
            let name = cut_err(identifier)
                .context(StrContext::Expected(StrContextValue::Description(
                    "property name",
                )))
                .parse_next(input)?;
            expr = Expr::Member {
                object: Box::new(expr),
                property: Property::Static(name.to_owned()),
            };
            height += 1;
        } else if opt('[').parse_next(input)?.is_some() {
            let index = conditional(input, depth + 1)?;
            ws.parse_next(input)?;
            cut_err(']')
                .context(StrContext::Expected(StrContextValue::CharLiteral(']')))
                .parse_next(input)?;
            height = height.max(index.height()) + 1;
            expr = Expr::Member {
                object: Box::new(expr),
                property: Property::Computed(Box::new(index)),
            };
        } else {
            return Ok(expr);
        }
    }
}

fn primary(input: &mut &str, depth: usize) -> ModalResult<Expr> {
    ws.parse_next(input)?;
    if opt('(').parse_next(input)?.is_some() {
        let inner = conditional(input, depth + 1)?;
        ws.parse_next(input)?;
        cut_err(')')
            .context(StrContext::Expected(StrContextValue::CharLiteral(')')))
            .parse_next(input)?;
        return Ok(inner);
    }
    alt((
        number_literal.map(Expr::Literal),
        string_literal.map(|text| Expr::Literal(Value::String(text))),
        identifier.map(keyword_or_identifier),
    ))
    .context(StrContext::Expected(StrContextValue::Description(
        "expression",
    )))
    .parse_next(input)
}

fn keyword_or_identifier(name: &str) -> Expr {
    match name {
        "true" => Expr::Literal(Value::Bool(true)),
        "false" => Expr::Literal(Value::Bool(false)),
        "null" | "undefined" => Expr::Literal(Value::Null),
        other => Expr::Identifier(other.to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ident(name: &str) -> Expr {
        Expr::Identifier(name.into())
    }

    #[test]
    fn parse_literals() {
        let cases = [
            ("42", json!(42)),
            ("3.5", json!(3.5)),
            ("1e3", json!(1000)),
            ("true", json!(true)),
            ("null", Value::Null),
            (r#""hi""#, json!("hi")),
            ("'it\\'s'", json!("it's")),
        ];
        for (source, expected) in cases {
            assert_eq!(
                parse_expression(source).unwrap(),
                Expr::Literal(expected),
                "failed for {source}"
            );
        }
    }

    #[test]
    fn parse_dotted_member_chain() {
        let expr = parse_expression("user.address.city").unwrap();
        assert_eq!(expr.static_path().as_deref(), Some("user.address.city"));
    }

    #[test]
    fn parse_computed_member() {
        let expr = parse_expression("items[index + 1]").unwrap();
        match expr {
            Expr::Member {
                object,
                property: Property::Computed(index),
            } => {
                assert_eq!(*object, ident("items"));
                assert!(matches!(*index, Expr::Binary { op: BinaryOp::Add, .. }));
            }
            other => panic!("expected computed member, got {other:?}"),
        }
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let expr = parse_expression("a + b * c").unwrap();
        match expr {
            Expr::Binary {
                op: BinaryOp::Add,
                right,
                ..
            } => assert!(matches!(*right, Expr::Binary { op: BinaryOp::Mul, .. })),
            other => panic!("expected Add, got {other:?}"),
        }
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let expr = parse_expression("a || b && c").unwrap();
        match expr {
            Expr::Logical {
                op: LogicalOp::Or,
                right,
                ..
            } => assert!(matches!(*right, Expr::Logical { op: LogicalOp::And, .. })),
            other => panic!("expected Or, got {other:?}"),
        }
    }

    #[test]
    fn strict_operators_take_precedence_over_loose() {
        let expr = parse_expression("a !== 1").unwrap();
        assert!(matches!(expr, Expr::Binary { op: BinaryOp::StrictNotEq, .. }));
        let expr = parse_expression("a <= 1").unwrap();
        assert!(matches!(expr, Expr::Binary { op: BinaryOp::Lte, .. }));
    }

    #[test]
    fn parse_nested_ternary() {
        let expr = parse_expression("a ? b : c ? d : e").unwrap();
        match expr {
            Expr::Conditional { alternate, .. } => {
                assert!(matches!(*alternate, Expr::Conditional { .. }))
            }
            other => panic!("expected Conditional, got {other:?}"),
        }
    }

    #[test]
    fn reject_constructs_outside_the_grammar() {
        for source in [
            "",
            "alert(1)",
            "a = 1",
            "a; b",
            "[1, 2]",
            "{a: 1}",
            "a ?? b",
            "x => x",
            "a &",
            "(a",
            "'unterminated",
        ] {
            assert!(
                parse_expression(source).is_err(),
                "expected parse failure for {source:?}"
            );
        }
    }

    #[test]
    fn excessive_nesting_is_rejected() {
        let source = format!("{}1{}", "(".repeat(400), ")".repeat(400));
        assert!(parse_expression(&source).is_err());
        let source = format!("{}x", "!".repeat(400));
        assert!(parse_expression(&source).is_err());
    }

    #[test]
    fn long_operator_chains_are_rejected() {
        for separator in [" + ", " && ", " || ", " * ", " === "] {
            let source = vec!["a"; 50_000].join(separator);
            assert!(
                parse_expression(&source).is_err(),
                "expected rejection for {separator:?} chain"
            );
        }
        let source = format!("a{}", ".b".repeat(50_000));
        assert!(parse_expression(&source).is_err());
        let nested = format!("({})", vec!["a"; 200].join(" + "));
        let source = vec![nested.as_str(); 200].join(" + ");
        assert!(parse_expression(&source).is_err());
    }

    #[test]
    fn chains_within_the_height_limit_parse() {
        let source = vec!["a"; 200].join(" + ");
        let expr = parse_expression(&source).unwrap();
        assert_eq!(expr.height(), 200);
    }
}
