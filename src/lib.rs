//! # arqlite
//!
//! Jena-style SPARQL algebra evaluation over abstract RDF datasets.
//!
//! The crate accepts a previously parsed algebra tree (built by an external
//! parser) and evaluates it against any [`Dataset`] implementation,
//! producing a multiset of variable bindings, an RDF graph, or a boolean.
//! Evaluation follows SPARQL bag semantics: optional joins keep every
//! outer row, filters silently exclude solutions whose expressions fail to
//! evaluate, and EXISTS/NOT EXISTS re-enter the engine seeded with the
//! current binding.

use anyhow::Result;

pub mod algebra;
pub mod executor;
pub mod expression;
pub mod optimizer;
pub mod results;
pub mod solution;
pub mod term;

// Re-export main types for convenience
pub use algebra::{
    Aggregate, Algebra, Binding, BinaryOperator, Expression, GroundTriple, GroupCondition, Iri,
    Literal, OrderCondition, Solution, Term, TriplePattern, UnaryOperator, Variable,
};
pub use executor::{Dataset, ExecutionContext, QueryExecutor};
pub use expression::{ExpressionError, ExpressionEvaluator};
pub use optimizer::{OptimizerConfig, QueryOptimizer};
pub use results::QueryResult;

/// High-level engine: optimize once, then evaluate.
pub struct QueryEngine {
    executor: QueryExecutor,
    optimizer: QueryOptimizer,
}

impl QueryEngine {
    /// Create a new engine with default configuration
    pub fn new() -> Self {
        Self {
            executor: QueryExecutor::new(),
            optimizer: QueryOptimizer::new(),
        }
    }

    /// Create a new engine with custom configuration
    pub fn with_config(context: ExecutionContext, config: OptimizerConfig) -> Self {
        Self {
            executor: QueryExecutor::with_context(context),
            optimizer: QueryOptimizer::with_config(config),
        }
    }

    /// Evaluate a SELECT-shaped tree to its solution multiset.
    pub fn evaluate(&self, algebra: &Algebra, dataset: &dyn Dataset) -> Result<Solution> {
        let optimized = self.optimizer.optimize(algebra.clone())?;
        self.executor.execute(&optimized, dataset)
    }

    /// ASK form: true iff the tree has at least one solution.
    pub fn ask(&self, algebra: &Algebra, dataset: &dyn Dataset) -> Result<bool> {
        let optimized = self.optimizer.optimize(algebra.clone())?;
        self.executor.ask(&optimized, dataset)
    }

    /// CONSTRUCT form: instantiate `template` once per solution.
    pub fn construct(
        &self,
        template: &[TriplePattern],
        algebra: &Algebra,
        dataset: &dyn Dataset,
    ) -> Result<Vec<GroundTriple>> {
        let optimized = self.optimizer.optimize(algebra.clone())?;
        self.executor.construct(template, &optimized, dataset)
    }

    /// DESCRIBE form: concise bounded description of the matched resources.
    pub fn describe(
        &self,
        targets: &[Term],
        algebra: &Algebra,
        dataset: &dyn Dataset,
    ) -> Result<Vec<GroundTriple>> {
        let optimized = self.optimizer.optimize(algebra.clone())?;
        self.executor.describe(targets, &optimized, dataset)
    }
}

impl Default for QueryEngine {
    fn default() -> Self {
        Self::new()
    }
}
