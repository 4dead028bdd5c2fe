//! Conditions, rules and the dependency graph used for incremental
//! re-evaluation.

mod engine;
mod graph;
mod model;

pub use engine::{CONTEXT_ROOT, RuleEngine};
pub(crate) use engine::resolve_visibility;
pub use graph::{DependencyGraph, build_dependency_graph};
pub use model::{Condition, Effects, Rule, RuleOperator};
