//! Pre-resolved parameter bindings for command descriptors.
//!
//! Script expressions may reference live variables ("show {speaker}
//! smiling"). The compiler resolves each placeholder to a named field
//! and an evaluator closure once, at playlist construction; at
//! execution time a descriptor just runs its evaluators against the
//! current registry. No per-access field discovery happens after
//! construction.

use std::fmt;

use crate::state::ServiceRegistry;

/// Evaluator resolving one placeholder against live service state.
pub type ParamEvaluator = Box<dyn Fn(&ServiceRegistry) -> String + Send + Sync>;

/// One bound placeholder on a descriptor: which field it fills and how
/// to compute its value.
pub struct BoundParam {
    field: String,
    evaluator: ParamEvaluator,
}

impl BoundParam {
    /// Bind `field` to the given evaluator.
    pub fn new(field: impl Into<String>, evaluator: ParamEvaluator) -> Self {
        Self {
            field: field.into(),
            evaluator,
        }
    }

    /// Bind `field` to a constant value.
    pub fn constant(field: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        Self::new(field, Box::new(move |_| value.clone()))
    }

    /// The descriptor field this binding fills.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Evaluate the binding against current service state.
    pub fn evaluate(&self, services: &ServiceRegistry) -> String {
        (self.evaluator)(services)
    }
}

impl fmt::Debug for BoundParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundParam")
            .field("field", &self.field)
            .finish_non_exhaustive()
    }
}

/// The bindings a descriptor carries, fixed at construction.
#[derive(Debug, Default)]
pub struct BoundParams {
    params: Vec<BoundParam>,
}

impl BoundParams {
    /// An empty binding set, for descriptors without placeholders.
    pub fn none() -> Self {
        Self::default()
    }

    /// Build from a list of bindings.
    pub fn from_vec(params: Vec<BoundParam>) -> Self {
        Self { params }
    }

    /// Whether the descriptor has any placeholders.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Evaluate every binding, yielding `(field, value)` pairs in
    /// declaration order.
    pub fn resolve(&self, services: &ServiceRegistry) -> Vec<(String, String)> {
        self.params
            .iter()
            .map(|p| (p.field.clone(), p.evaluate(services)))
            .collect()
    }
}
