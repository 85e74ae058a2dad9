//! Query Result Types
//!
//! Terminal shapes produced by the engine: a boolean for ASK, variable
//! bindings for SELECT-shaped trees, and an RDF graph for
//! CONSTRUCT/DESCRIBE.

use crate::algebra::{Binding, GroundTriple, Solution, Variable};

/// Result of evaluating a query form
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    /// Boolean result (for ASK queries)
    Boolean(bool),
    /// Variable bindings (for SELECT queries)
    Bindings {
        variables: Vec<Variable>,
        solutions: Vec<Binding>,
    },
    /// RDF graph (for CONSTRUCT/DESCRIBE queries)
    Graph(Vec<GroundTriple>),
}

impl QueryResult {
    /// Wrap a solution multiset, deriving the variable list from the
    /// bindings' union domain in sorted order.
    pub fn from_solution(solution: Solution) -> Self {
        let mut variables: Vec<Variable> = solution
            .iter()
            .flat_map(|binding| binding.keys().cloned())
            .collect();
        variables.sort();
        variables.dedup();
        QueryResult::Bindings {
            variables,
            solutions: solution,
        }
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, QueryResult::Boolean(_))
    }

    pub fn is_graph(&self) -> bool {
        matches!(self, QueryResult::Graph(_))
    }

    /// Number of solutions or triples carried by this result
    pub fn len(&self) -> usize {
        match self {
            QueryResult::Boolean(_) => 1,
            QueryResult::Bindings { solutions, .. } => solutions.len(),
            QueryResult::Graph(triples) => triples.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            QueryResult::Boolean(_) => false,
            QueryResult::Bindings { solutions, .. } => solutions.is_empty(),
            QueryResult::Graph(triples) => triples.is_empty(),
        }
    }
}
