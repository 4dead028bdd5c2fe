use std::collections::BTreeSet;
use std::fmt;

use serde_json::Value;

/// Closed syntax tree for the restricted expression language.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Identifier(String),
    Member {
        object: Box<Expr>,
        property: Property,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
}

/// Property access: `a.b` or `a[expr]`.
#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    Static(String),
    Computed(Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    StrictEq,
    NotEq,
    StrictNotEq,
    Lt,
    Gt,
    Lte,
    Gte,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Not => "!",
            UnaryOp::Negate => "-",
            UnaryOp::Plus => "+",
        }
    }
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Eq => "==",
            BinaryOp::StrictEq => "===",
            BinaryOp::NotEq => "!=",
            BinaryOp::StrictNotEq => "!==",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Lte => "<=",
            BinaryOp::Gte => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl Expr {
    pub(crate) fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub(crate) fn logical(op: LogicalOp, left: Expr, right: Expr) -> Expr {
        Expr::Logical {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Dotted path for an identifier followed only by static member accesses.
    pub fn static_path(&self) -> Option<String> {
        match self {
            Expr::Identifier(name) => Some(name.clone()),
            Expr::Member {
                object,
                property: Property::Static(name),
            } => object.static_path().map(|path| format!("{path}.{name}")),
            _ => None,
        }
    }

    /// Number of nodes on the longest root-to-leaf path.
    pub(crate) fn height(&self) -> usize {
        let below = match self {
            Expr::Literal(_) | Expr::Identifier(_) => 0,
            Expr::Member { object, property } => match property {
                Property::Static(_) => object.height(),
                Property::Computed(index) => object.height().max(index.height()),
            },
            Expr::Unary { operand, .. } => operand.height(),
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                left.height().max(right.height())
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => test
                .height()
                .max(consequent.height())
                .max(alternate.height()),
        };
        below + 1
    }

    /// Collects every value path the expression reads.
    pub fn collect_paths(&self, paths: &mut BTreeSet<String>) {
        if let Some(path) = self.static_path() {
            paths.insert(path);
            return;
        }
        match self {
            Expr::Literal(_) | Expr::Identifier(_) => {}
            Expr::Member { object, property } => {
                object.collect_paths(paths);
                if let Property::Computed(index) = property {
                    index.collect_paths(paths);
                }
            }
            Expr::Unary { operand, .. } => operand.collect_paths(paths),
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                left.collect_paths(paths);
                right.collect_paths(paths);
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                test.collect_paths(paths);
                consequent.collect_paths(paths);
                alternate.collect_paths(paths);
            }
        }
    }
}
