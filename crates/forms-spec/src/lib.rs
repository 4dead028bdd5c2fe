#![allow(missing_docs)]

pub mod datasource;
pub mod expr;
pub mod path;
pub mod rules;
pub mod spec;
pub mod state;
pub mod validate;
pub mod validation;
pub mod value;

pub use datasource::{
    AdapterError, AdapterRequest, AdapterResponse, DataSource, DataSourceAdapter,
    DataSourceResolver, FieldOption, Fetched, HttpAdapter, HttpAdapterConfig, HttpMethod,
    ResolveError,
};
pub use expr::{
    Evaluator, Expr, Expression, ExpressionError, evaluate_condition_expression,
    evaluate_expression,
};
pub use rules::{
    CONTEXT_ROOT, Condition, DependencyGraph, Effects, Rule, RuleEngine, RuleOperator,
    build_dependency_graph,
};
pub use spec::{FieldSpec, FieldType, FormSchema};
pub use state::{FieldState, FormState, resolve_field_state, resolve_form_state};
pub use validate::{ValidationError, ValidationResult, validate_form};
pub use validation::{
    FieldError, ValidationConfig, Validator, compile as compile_validation,
    merge_validation_configs,
};
