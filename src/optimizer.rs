//! Query Optimization Module
//!
//! Pure tree-to-tree rewrites that preserve the evaluation multiset for
//! every conforming dataset. The optimizer never mutates nodes in place:
//! it consumes the tree and reconstructs it bottom-up, so subtrees shared
//! by other owners are never touched.

use anyhow::Result;

use crate::algebra::{
    Aggregate, Algebra, Expression, GroundTriple, GroupCondition, OrderCondition, Solution, Term,
    TriplePattern,
};
use crate::executor::{Dataset, ExecutionContext, QueryExecutor};
use crate::expression::ExpressionEvaluator;

/// Optimization pass toggles
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Fold expressions with no free variables into constants
    pub constant_folding: bool,
    /// Apply algebraic identities (unit/zero elimination)
    pub simplify_identities: bool,
    /// Reorder BGP patterns by estimated selectivity
    pub reorder_bgp: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            constant_folding: true,
            simplify_identities: true,
            reorder_bgp: true,
        }
    }
}

/// Rule-based algebra optimizer
pub struct QueryOptimizer {
    config: OptimizerConfig,
}

impl Default for QueryOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryOptimizer {
    pub fn new() -> Self {
        Self {
            config: OptimizerConfig::default(),
        }
    }

    pub fn with_config(config: OptimizerConfig) -> Self {
        Self { config }
    }

    /// Optimize an algebra tree. The identity rewrite is always a valid
    /// outcome; every enabled pass preserves the evaluation multiset.
    pub fn optimize(&self, algebra: Algebra) -> Result<Algebra> {
        self.rewrite(algebra)
    }

    fn rewrite(&self, algebra: Algebra) -> Result<Algebra> {
        Ok(match algebra {
            Algebra::Bgp(patterns) => {
                if self.config.reorder_bgp {
                    Algebra::Bgp(reorder_by_selectivity(patterns))
                } else {
                    Algebra::Bgp(patterns)
                }
            }

            Algebra::Join { left, right } => {
                let left = self.rewrite(*left)?;
                let right = self.rewrite(*right)?;
                if self.config.simplify_identities {
                    match (left, right) {
                        (Algebra::Zero, _) | (_, Algebra::Zero) => Algebra::Zero,
                        (Algebra::Table, other) | (other, Algebra::Table) => other,
                        (left, right) => Algebra::join(left, right),
                    }
                } else {
                    Algebra::join(left, right)
                }
            }

            Algebra::LeftJoin {
                left,
                right,
                filter,
            } => Algebra::left_join(
                self.rewrite(*left)?,
                self.rewrite(*right)?,
                filter.map(|e| self.rewrite_expr(e)).transpose()?,
            ),

            Algebra::Union { left, right } => {
                let left = self.rewrite(*left)?;
                let right = self.rewrite(*right)?;
                if self.config.simplify_identities {
                    match (left, right) {
                        (Algebra::Zero, other) | (other, Algebra::Zero) => other,
                        (left, right) => Algebra::union(left, right),
                    }
                } else {
                    Algebra::union(left, right)
                }
            }

            Algebra::Minus { left, right } => {
                Algebra::minus(self.rewrite(*left)?, self.rewrite(*right)?)
            }

            Algebra::Filter { condition, pattern } => {
                let pattern = self.rewrite(*pattern)?;
                let condition = self.rewrite_expr(condition)?;
                if self.config.simplify_identities {
                    if let Expression::Literal(lit) = &condition {
                        match Term::Literal(lit.clone()).effective_boolean_value() {
                            Ok(true) => return Ok(pattern),
                            Ok(false) => return Ok(Algebra::Zero),
                            Err(_) => {}
                        }
                    }
                }
                Algebra::filter(condition, pattern)
            }

            Algebra::Extend {
                pattern,
                variable,
                expr,
            } => Algebra::extend(self.rewrite(*pattern)?, variable, self.rewrite_expr(expr)?),

            Algebra::Graph { graph, pattern } => {
                Algebra::graph(graph, self.rewrite(*pattern)?)
            }

            Algebra::Project { pattern, variables } => {
                Algebra::project(self.rewrite(*pattern)?, variables)
            }

            Algebra::Distinct { pattern } => Algebra::distinct(self.rewrite(*pattern)?),

            Algebra::Reduced { pattern } => Algebra::reduced(self.rewrite(*pattern)?),

            Algebra::Slice {
                pattern,
                offset,
                limit,
            } => Algebra::slice(self.rewrite(*pattern)?, offset, limit),

            Algebra::OrderBy {
                pattern,
                conditions,
            } => {
                let conditions = conditions
                    .into_iter()
                    .map(|c| {
                        Ok(OrderCondition {
                            expr: self.rewrite_expr(c.expr)?,
                            ascending: c.ascending,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Algebra::order_by(self.rewrite(*pattern)?, conditions)
            }

            Algebra::Group {
                pattern,
                variables,
                aggregates,
            } => {
                let variables = variables
                    .into_iter()
                    .map(|c| {
                        Ok(GroupCondition {
                            expr: self.rewrite_expr(c.expr)?,
                            alias: c.alias,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                let aggregates = aggregates
                    .into_iter()
                    .map(|(var, agg)| Ok((var, self.rewrite_aggregate(agg)?)))
                    .collect::<Result<Vec<_>>>()?;
                Algebra::group(self.rewrite(*pattern)?, variables, aggregates)
            }

            Algebra::Having { pattern, condition } => Algebra::Having {
                pattern: Box::new(self.rewrite(*pattern)?),
                condition: self.rewrite_expr(condition)?,
            },

            Algebra::Dataset {
                default,
                named,
                pattern,
            } => Algebra::Dataset {
                default,
                named,
                pattern: Box::new(self.rewrite(*pattern)?),
            },

            leaf @ (Algebra::Values { .. } | Algebra::Table | Algebra::Zero) => leaf,
        })
    }

    fn rewrite_aggregate(&self, aggregate: Aggregate) -> Result<Aggregate> {
        Ok(match aggregate {
            Aggregate::Count { distinct, expr } => Aggregate::Count {
                distinct,
                expr: expr.map(|e| self.rewrite_expr(e)).transpose()?,
            },
            Aggregate::Sum { distinct, expr } => Aggregate::Sum {
                distinct,
                expr: self.rewrite_expr(expr)?,
            },
            Aggregate::Min { distinct, expr } => Aggregate::Min {
                distinct,
                expr: self.rewrite_expr(expr)?,
            },
            Aggregate::Max { distinct, expr } => Aggregate::Max {
                distinct,
                expr: self.rewrite_expr(expr)?,
            },
            Aggregate::Avg { distinct, expr } => Aggregate::Avg {
                distinct,
                expr: self.rewrite_expr(expr)?,
            },
            Aggregate::Sample { distinct, expr } => Aggregate::Sample {
                distinct,
                expr: self.rewrite_expr(expr)?,
            },
            Aggregate::GroupConcat {
                distinct,
                expr,
                separator,
            } => Aggregate::GroupConcat {
                distinct,
                expr: self.rewrite_expr(expr)?,
                separator,
            },
        })
    }

    /// Rebuild an expression, folding closed deterministic subexpressions
    /// into literal constants. Expressions that fail to evaluate are left
    /// untouched so their failure still happens at the proper boundary.
    fn rewrite_expr(&self, expr: Expression) -> Result<Expression> {
        let rebuilt = match expr {
            Expression::Function { name, args } => Expression::Function {
                name,
                args: args
                    .into_iter()
                    .map(|a| self.rewrite_expr(a))
                    .collect::<Result<Vec<_>>>()?,
            },
            Expression::Binary { op, left, right } => Expression::Binary {
                op,
                left: Box::new(self.rewrite_expr(*left)?),
                right: Box::new(self.rewrite_expr(*right)?),
            },
            Expression::Unary { op, expr } => Expression::Unary {
                op,
                expr: Box::new(self.rewrite_expr(*expr)?),
            },
            Expression::Conditional {
                condition,
                then_expr,
                else_expr,
            } => Expression::Conditional {
                condition: Box::new(self.rewrite_expr(*condition)?),
                then_expr: Box::new(self.rewrite_expr(*then_expr)?),
                else_expr: Box::new(self.rewrite_expr(*else_expr)?),
            },
            Expression::Exists(algebra) => Expression::Exists(Box::new(self.rewrite(*algebra)?)),
            Expression::NotExists(algebra) => {
                Expression::NotExists(Box::new(self.rewrite(*algebra)?))
            }
            leaf => leaf,
        };

        if self.config.constant_folding && foldable(&rebuilt) {
            if let Some(folded) = const_eval(&rebuilt) {
                return Ok(folded);
            }
        }
        Ok(rebuilt)
    }
}

/// A closed expression with no nondeterministic built-in anywhere in it.
fn foldable(expr: &Expression) -> bool {
    fn deterministic(expr: &Expression) -> bool {
        match expr {
            Expression::Function { name, args } => {
                !matches!(name.as_str(), "now" | "NOW" | "bnode" | "BNODE" | "rand" | "RAND")
                    && args.iter().all(deterministic)
            }
            Expression::Binary { left, right, .. } => deterministic(left) && deterministic(right),
            Expression::Unary { expr, .. } => deterministic(expr),
            Expression::Conditional {
                condition,
                then_expr,
                else_expr,
            } => deterministic(condition) && deterministic(then_expr) && deterministic(else_expr),
            _ => true,
        }
    }
    !matches!(expr, Expression::Literal(_) | Expression::Iri(_))
        && expr.is_closed()
        && deterministic(expr)
}

/// Evaluate a closed expression against the empty binding. The dataset is
/// never consulted because closed expressions contain no EXISTS.
fn const_eval(expr: &Expression) -> Option<Expression> {
    struct NullDataset;

    impl Dataset for NullDataset {
        fn find_triples(
            &self,
            _pattern: &TriplePattern,
            _graph: Option<&Term>,
        ) -> Result<Vec<GroundTriple>> {
            Ok(Vec::new())
        }

        fn evaluate_delegated(&self, _algebra: &Algebra, _seed: &Solution) -> Option<Solution> {
            None
        }
    }

    let executor = QueryExecutor::new();
    let dataset = NullDataset;
    let context = ExecutionContext::default();
    let evaluator = ExpressionEvaluator::new(&executor, &dataset, &context);
    match evaluator.evaluate(expr, &Default::default()).ok()? {
        Term::Literal(lit) => Some(Expression::Literal(lit)),
        Term::Iri(iri) => Some(Expression::Iri(iri)),
        _ => None,
    }
}

/// Order BGP patterns most-selective first: a ground slot narrows the scan
/// far more than a variable does. Stable, multiset-preserving.
fn reorder_by_selectivity(patterns: Vec<TriplePattern>) -> Vec<TriplePattern> {
    let score = |pattern: &TriplePattern| -> f64 {
        let slot = |term: &Term| if term.is_variable() { 0.8 } else { 0.1 };
        slot(&pattern.subject) * slot(&pattern.predicate) * slot(&pattern.object)
    };
    let mut ordered = patterns;
    ordered.sort_by(|a, b| {
        score(a)
            .partial_cmp(&score(b))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::{BinaryOperator, Iri, Literal};
    use crate::term::xsd;

    fn int_lit(i: i64) -> Expression {
        Expression::Literal(Literal {
            value: i.to_string(),
            language: None,
            datatype: Some(Iri(xsd::INTEGER.to_string())),
        })
    }

    #[test]
    fn folds_constant_arithmetic() {
        let optimizer = QueryOptimizer::new();
        let tree = Algebra::filter(
            Expression::Binary {
                op: BinaryOperator::Equal,
                left: Box::new(Expression::Binary {
                    op: BinaryOperator::Add,
                    left: Box::new(int_lit(1)),
                    right: Box::new(int_lit(2)),
                }),
                right: Box::new(Expression::Variable("x".into())),
            },
            Algebra::Bgp(vec![]),
        );
        let optimized = optimizer.optimize(tree).unwrap();
        match optimized {
            Algebra::Filter { condition, .. } => match condition {
                Expression::Binary { left, .. } => {
                    assert_eq!(*left, int_lit(3));
                }
                other => panic!("expected binary condition, got {:?}", other),
            },
            other => panic!("expected filter, got {:?}", other),
        }
    }

    #[test]
    fn eliminates_constant_true_filter() {
        let optimizer = QueryOptimizer::new();
        let inner = Algebra::Bgp(vec![TriplePattern::new(
            Term::variable("s"),
            Term::iri("http://example.org/p"),
            Term::variable("o"),
        )]);
        let tree = Algebra::filter(
            Expression::Binary {
                op: BinaryOperator::Equal,
                left: Box::new(int_lit(1)),
                right: Box::new(int_lit(1)),
            },
            inner.clone(),
        );
        assert_eq!(optimizer.optimize(tree).unwrap(), inner);

        let never = Algebra::filter(
            Expression::Binary {
                op: BinaryOperator::Equal,
                left: Box::new(int_lit(1)),
                right: Box::new(int_lit(2)),
            },
            inner,
        );
        assert_eq!(optimizer.optimize(never).unwrap(), Algebra::Zero);
    }

    #[test]
    fn join_identities() {
        let optimizer = QueryOptimizer::new();
        let bgp = Algebra::Bgp(vec![TriplePattern::new(
            Term::variable("s"),
            Term::variable("p"),
            Term::variable("o"),
        )]);
        assert_eq!(
            optimizer
                .optimize(Algebra::join(Algebra::Table, bgp.clone()))
                .unwrap(),
            bgp
        );
        assert_eq!(
            optimizer
                .optimize(Algebra::join(Algebra::Zero, bgp.clone()))
                .unwrap(),
            Algebra::Zero
        );
        assert_eq!(
            optimizer
                .optimize(Algebra::union(Algebra::Zero, bgp.clone()))
                .unwrap(),
            bgp
        );
    }

    #[test]
    fn leaves_open_expressions_alone() {
        let optimizer = QueryOptimizer::new();
        let condition = Expression::Binary {
            op: BinaryOperator::Greater,
            left: Box::new(Expression::Variable("x".into())),
            right: Box::new(int_lit(5)),
        };
        let tree = Algebra::filter(condition.clone(), Algebra::Table);
        match optimizer.optimize(tree).unwrap() {
            Algebra::Filter { condition: c, .. } => assert_eq!(c, condition),
            other => panic!("expected filter, got {:?}", other),
        }
    }

    #[test]
    fn reorders_bgp_by_selectivity() {
        let optimizer = QueryOptimizer::new();
        let open = TriplePattern::new(
            Term::variable("s"),
            Term::variable("p"),
            Term::variable("o"),
        );
        let narrow = TriplePattern::new(
            Term::iri("http://example.org/s"),
            Term::iri("http://example.org/p"),
            Term::variable("o"),
        );
        let tree = Algebra::Bgp(vec![open.clone(), narrow.clone()]);
        match optimizer.optimize(tree).unwrap() {
            Algebra::Bgp(patterns) => assert_eq!(patterns, vec![narrow, open]),
            other => panic!("expected bgp, got {:?}", other),
        }
    }
}
