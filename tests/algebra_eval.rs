//! Algebra Evaluation Tests
//!
//! End-to-end evaluation of operator trees against an in-memory mock
//! dataset, covering the operator semantics, the error-suppression
//! discipline, and the optimizer's equivalence guarantee.

use std::collections::HashMap;
use std::time::Duration;

use arqlite::solution::binding_key;
use arqlite::term::xsd;
use arqlite::{
    iri, literal, triple, var, Aggregate, Algebra, Binding, BinaryOperator, Dataset,
    ExecutionContext, Expression, GroundTriple, GroupCondition, Iri, OrderCondition,
    OptimizerConfig, QueryEngine, QueryExecutor, QueryOptimizer, Solution, Term, TriplePattern,
};

/// Mock dataset with a default graph and optional named graphs
#[derive(Default)]
struct MockDataset {
    default: Vec<GroundTriple>,
    named: HashMap<Term, Vec<GroundTriple>>,
}

impl MockDataset {
    fn new() -> Self {
        Self::default()
    }

    fn add(&mut self, s: Term, p: Term, o: Term) {
        self.default.push((s, p, o));
    }

    fn add_named(&mut self, graph: Term, s: Term, p: Term, o: Term) {
        self.named.entry(graph).or_default().push((s, p, o));
    }
}

fn slot_matches(pattern: &Term, actual: &Term) -> bool {
    match pattern {
        Term::Variable(_) => true,
        other => other == actual,
    }
}

impl Dataset for MockDataset {
    fn find_triples(
        &self,
        pattern: &TriplePattern,
        graph: Option<&Term>,
    ) -> anyhow::Result<Vec<GroundTriple>> {
        static EMPTY: Vec<GroundTriple> = Vec::new();
        let triples = match graph {
            None => &self.default,
            Some(g) => self.named.get(g).unwrap_or(&EMPTY),
        };
        Ok(triples
            .iter()
            .filter(|(s, p, o)| {
                slot_matches(&pattern.subject, s)
                    && slot_matches(&pattern.predicate, p)
                    && slot_matches(&pattern.object, o)
            })
            .cloned()
            .collect())
    }

    fn named_graphs(&self) -> anyhow::Result<Vec<Term>> {
        let mut graphs: Vec<Term> = self.named.keys().cloned().collect();
        graphs.sort();
        Ok(graphs)
    }
}

fn small_store() -> MockDataset {
    let mut store = MockDataset::new();
    store.add(iri!("http://example/s1"), iri!("http://example/p"), iri!("http://example/o1"));
    store.add(iri!("http://example/s2"), iri!("http://example/p"), iri!("http://example/o2"));
    store
}

fn int_term(i: i64) -> Term {
    literal!(i, datatype: xsd::INTEGER)
}

fn int_expr(i: i64) -> Expression {
    match int_term(i) {
        Term::Literal(lit) => Expression::Literal(lit),
        _ => unreachable!(),
    }
}

fn binary(op: BinaryOperator, left: Expression, right: Expression) -> Expression {
    Expression::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn as_multiset(solution: &Solution) -> Vec<Vec<(String, Term)>> {
    let mut keys: Vec<_> = solution.iter().map(binding_key).collect();
    keys.sort();
    keys
}

fn execute(algebra: &Algebra, dataset: &dyn Dataset) -> Solution {
    QueryExecutor::new().execute(algebra, dataset).unwrap()
}

#[test]
fn bgp_binds_variables() {
    let store = small_store();
    let tree = Algebra::bgp(vec![triple!(
        var!("s"),
        iri!("http://example/p"),
        var!("o")
    )]);
    let solutions = execute(&tree, &store);
    assert_eq!(solutions.len(), 2);
    assert!(solutions
        .iter()
        .any(|b| b.get("s") == Some(&iri!("http://example/s1"))
            && b.get("o") == Some(&iri!("http://example/o1"))));
}

#[test]
fn bgp_joins_patterns_left_to_right() {
    let mut store = MockDataset::new();
    store.add(iri!("http://example/s1"), iri!("http://example/p1"), iri!("http://example/x"));
    store.add(iri!("http://example/x"), iri!("http://example/p2"), iri!("http://example/y"));
    let tree = Algebra::bgp(vec![
        triple!(var!("a"), iri!("http://example/p1"), var!("b")),
        triple!(var!("b"), iri!("http://example/p2"), var!("c")),
    ]);
    let solutions = execute(&tree, &store);
    assert_eq!(solutions.len(), 1);
    assert_eq!(solutions[0].get("c"), Some(&iri!("http://example/y")));
}

#[test]
fn filter_equality_keeps_matching_solution() {
    // Filter(= ?o <o2>, BGP(?s <p> ?o)) over {(s1,p,o1), (s2,p,o2)}
    let store = small_store();
    let tree = Algebra::filter(
        binary(
            BinaryOperator::Equal,
            Expression::Variable("o".into()),
            Expression::Iri(Iri("http://example/o2".into())),
        ),
        Algebra::bgp(vec![triple!(var!("s"), iri!("http://example/p"), var!("o"))]),
    );
    let solutions = execute(&tree, &store);
    assert_eq!(solutions.len(), 1);
    assert_eq!(solutions[0].get("s"), Some(&iri!("http://example/s2")));
    assert_eq!(solutions[0].get("o"), Some(&iri!("http://example/o2")));
}

#[test]
fn filter_suppresses_expression_errors() {
    // ?o + 1 fails on IRIs; solutions drop out silently instead of erroring.
    let store = small_store();
    let tree = Algebra::filter(
        binary(
            BinaryOperator::Greater,
            binary(
                BinaryOperator::Add,
                Expression::Variable("o".into()),
                int_expr(1),
            ),
            int_expr(0),
        ),
        Algebra::bgp(vec![triple!(var!("s"), iri!("http://example/p"), var!("o"))]),
    );
    let solutions = execute(&tree, &store);
    assert!(solutions.is_empty());
}

#[test]
fn filter_subset_property() {
    let mut store = small_store();
    store.add(iri!("http://example/s3"), iri!("http://example/q"), int_term(5));
    let inner = Algebra::bgp(vec![triple!(var!("s"), var!("p"), var!("o"))]);
    let filtered = Algebra::filter(
        binary(
            BinaryOperator::Greater,
            Expression::Variable("o".into()),
            int_expr(1),
        ),
        inner.clone(),
    );
    let all = as_multiset(&execute(&inner, &store));
    let kept = execute(&filtered, &store);
    for binding in &kept {
        assert!(all.contains(&binding_key(binding)));
    }
}

#[test]
fn unknown_function_in_filter_is_fatal() {
    let store = small_store();
    let tree = Algebra::filter(
        Expression::Function {
            name: "frobnicate".into(),
            args: vec![],
        },
        Algebra::bgp(vec![triple!(var!("s"), iri!("http://example/p"), var!("o"))]),
    );
    assert!(QueryExecutor::new().execute(&tree, &store).is_err());
}

#[test]
fn join_equals_pairwise_compatible_merges() {
    let mut store = MockDataset::new();
    let p1 = iri!("http://example/p1");
    let p2 = iri!("http://example/p2");
    store.add(iri!("http://example/s1"), p1.clone(), int_term(1));
    store.add(iri!("http://example/s2"), p1.clone(), int_term(2));
    store.add(iri!("http://example/s1"), p2.clone(), int_term(10));

    let left = Algebra::bgp(vec![triple!(var!("s"), p1.clone(), var!("a"))]);
    let right = Algebra::bgp(vec![triple!(var!("s"), p2.clone(), var!("b"))]);
    let joined = execute(&Algebra::join(left.clone(), right.clone()), &store);

    let lhs = execute(&left, &store);
    let rhs = execute(&right, &store);
    let mut expected = Vec::new();
    for a in &lhs {
        for b in &rhs {
            if let Some(m) = arqlite::solution::merge(a, b) {
                expected.push(m);
            }
        }
    }
    assert_eq!(as_multiset(&joined), as_multiset(&expected));
    assert_eq!(joined.len(), 1);
    assert_eq!(joined[0].get("b"), Some(&int_term(10)));
}

#[test]
fn left_join_keeps_every_outer_row() {
    // s1 has p1 and p2, s2 only p1: one merged row, one standalone row.
    let mut store = MockDataset::new();
    let p1 = iri!("http://example/p1");
    let p2 = iri!("http://example/p2");
    store.add(iri!("http://example/s1"), p1.clone(), iri!("http://example/a"));
    store.add(iri!("http://example/s2"), p1.clone(), iri!("http://example/b"));
    store.add(iri!("http://example/s1"), p2.clone(), iri!("http://example/c"));

    let left = Algebra::bgp(vec![triple!(var!("s"), p1, var!("o1"))]);
    let right = Algebra::bgp(vec![triple!(var!("s"), p2, var!("o2"))]);
    let tree = Algebra::left_join(left.clone(), right, None);
    let solutions = execute(&tree, &store);

    assert!(solutions.len() >= execute(&left, &store).len());
    assert_eq!(solutions.len(), 2);
    let s1_row = solutions
        .iter()
        .find(|b| b.get("s") == Some(&iri!("http://example/s1")))
        .unwrap();
    assert_eq!(s1_row.get("o2"), Some(&iri!("http://example/c")));
    let s2_row = solutions
        .iter()
        .find(|b| b.get("s") == Some(&iri!("http://example/s2")))
        .unwrap();
    assert!(s2_row.get("o2").is_none());
}

#[test]
fn left_join_condition_failure_leaves_outer_row() {
    let mut store = MockDataset::new();
    let p1 = iri!("http://example/p1");
    let p2 = iri!("http://example/p2");
    store.add(iri!("http://example/s1"), p1.clone(), int_term(1));
    store.add(iri!("http://example/s1"), p2.clone(), iri!("http://example/not-a-number"));

    let tree = Algebra::left_join(
        Algebra::bgp(vec![triple!(var!("s"), p1, var!("o1"))]),
        Algebra::bgp(vec![triple!(var!("s"), p2, var!("o2"))]),
        // ?o2 > 0 cannot evaluate on an IRI: treated as false, not fatal
        Some(binary(
            BinaryOperator::Greater,
            Expression::Variable("o2".into()),
            int_expr(0),
        )),
    );
    let solutions = execute(&tree, &store);
    assert_eq!(solutions.len(), 1);
    assert!(solutions[0].get("o2").is_none());
}

#[test]
fn union_concatenates_without_dedup() {
    let store = small_store();
    let arm = Algebra::bgp(vec![triple!(var!("s"), iri!("http://example/p"), var!("o"))]);
    let tree = Algebra::union(arm.clone(), arm.clone());
    let solutions = execute(&tree, &store);
    assert_eq!(solutions.len(), 4);

    let deduped = execute(&Algebra::distinct(tree), &store);
    assert_eq!(deduped.len(), 2);
}

#[test]
fn minus_removes_domain_sharing_compatible_rows() {
    let mut store = MockDataset::new();
    let p1 = iri!("http://example/p1");
    let p2 = iri!("http://example/p2");
    store.add(iri!("http://example/s1"), p1.clone(), int_term(1));
    store.add(iri!("http://example/s2"), p1.clone(), int_term(2));
    store.add(iri!("http://example/s1"), p2.clone(), int_term(3));

    let tree = Algebra::minus(
        Algebra::bgp(vec![triple!(var!("s"), p1, var!("a"))]),
        Algebra::bgp(vec![triple!(var!("s"), p2, var!("b"))]),
    );
    let solutions = execute(&tree, &store);
    assert_eq!(solutions.len(), 1);
    assert_eq!(solutions[0].get("s"), Some(&iri!("http://example/s2")));
}

#[test]
fn not_exists_is_complement_of_exists() {
    let mut store = small_store();
    store.add(
        iri!("http://example/s2"),
        iri!("http://example/p2"),
        iri!("http://example/special"),
    );
    let outer = Algebra::bgp(vec![triple!(var!("s"), iri!("http://example/p"), var!("o"))]);
    let subquery = Algebra::bgp(vec![triple!(
        var!("s"),
        iri!("http://example/p2"),
        iri!("http://example/special")
    )]);

    let exists = execute(
        &Algebra::filter(Expression::Exists(Box::new(subquery.clone())), outer.clone()),
        &store,
    );
    let not_exists = execute(
        &Algebra::filter(Expression::NotExists(Box::new(subquery)), outer.clone()),
        &store,
    );

    // The two sides partition the outer solutions.
    let all = execute(&outer, &store);
    assert_eq!(exists.len() + not_exists.len(), all.len());
    assert!(exists
        .iter()
        .all(|b| b.get("s") == Some(&iri!("http://example/s2"))));
    // No (s1, p2, special) triple exists, so NOT EXISTS holds for s1.
    assert!(not_exists
        .iter()
        .all(|b| b.get("s") == Some(&iri!("http://example/s1"))));
}

#[test]
fn extend_binds_or_leaves_unbound() {
    let mut store = MockDataset::new();
    let p = iri!("http://example/p");
    store.add(iri!("http://example/s1"), p.clone(), int_term(41));
    store.add(iri!("http://example/s2"), p.clone(), iri!("http://example/nan"));

    let tree = Algebra::extend(
        Algebra::bgp(vec![triple!(var!("s"), p, var!("o"))]),
        "next".into(),
        binary(
            BinaryOperator::Add,
            Expression::Variable("o".into()),
            int_expr(1),
        ),
    );
    let solutions = execute(&tree, &store);
    assert_eq!(solutions.len(), 2);
    let bound = solutions
        .iter()
        .find(|b| b.get("s") == Some(&iri!("http://example/s1")))
        .unwrap();
    assert_eq!(bound.get("next"), Some(&int_term(42)));
    let unbound = solutions
        .iter()
        .find(|b| b.get("s") == Some(&iri!("http://example/s2")))
        .unwrap();
    assert!(unbound.get("next").is_none());
}

#[test]
fn project_restricts_binding_domains() {
    let store = small_store();
    let tree = Algebra::project(
        Algebra::bgp(vec![triple!(var!("s"), iri!("http://example/p"), var!("o"))]),
        vec!["s".into()],
    );
    let solutions = execute(&tree, &store);
    assert_eq!(solutions.len(), 2);
    assert!(solutions.iter().all(|b| b.len() == 1 && b.contains_key("s")));
}

#[test]
fn distinct_is_idempotent_over_evaluation() {
    let store = small_store();
    let arm = Algebra::bgp(vec![triple!(var!("s"), iri!("http://example/p"), var!("o"))]);
    let once = Algebra::distinct(Algebra::union(arm.clone(), arm));
    let twice = Algebra::distinct(once.clone());
    assert_eq!(
        as_multiset(&execute(&once, &store)),
        as_multiset(&execute(&twice, &store))
    );
}

#[test]
fn reduced_output_is_bounded() {
    let store = small_store();
    let arm = Algebra::bgp(vec![triple!(var!("s"), iri!("http://example/p"), var!("o"))]);
    let union = Algebra::union(arm.clone(), arm);
    let raw = execute(&union, &store);
    let reduced = execute(&Algebra::reduced(union.clone()), &store);
    let distinct = execute(&Algebra::distinct(union), &store);
    assert!(reduced.len() <= raw.len());
    assert!(reduced.len() >= distinct.len());
}

#[test]
fn order_by_slice_pages_without_loss() {
    let mut store = MockDataset::new();
    let p = iri!("http://example/p");
    for (name, value) in [("a", 3i64), ("b", 1), ("c", 2), ("d", 5), ("e", 4)] {
        store.add(iri!(format!("http://example/{name}")), p.clone(), int_term(value));
    }
    let bgp = Algebra::bgp(vec![triple!(var!("s"), p, var!("o"))]);
    let by_o = vec![OrderCondition::asc(Expression::Variable("o".into()))];

    let sorted = execute(&Algebra::order_by(bgp.clone(), by_o.clone()), &store);
    let values: Vec<_> = sorted.iter().map(|b| b.get("o").unwrap().clone()).collect();
    assert_eq!(values, (1..=5i64).map(int_term).collect::<Vec<_>>());

    let window = execute(
        &Algebra::slice(Algebra::order_by(bgp.clone(), by_o), Some(1), Some(2)),
        &store,
    );
    assert_eq!(window, sorted[1..3].to_vec());

    let descending = execute(
        &Algebra::order_by(
            bgp,
            vec![OrderCondition::desc(Expression::Variable("o".into()))],
        ),
        &store,
    );
    assert_eq!(
        descending.first().unwrap().get("o"),
        Some(&int_term(5))
    );
}

#[test]
fn order_by_sorts_failing_comparators_least() {
    let mut store = MockDataset::new();
    let p = iri!("http://example/p");
    store.add(iri!("http://example/s1"), p.clone(), int_term(7));
    store.add(iri!("http://example/s2"), p.clone(), iri!("http://example/thing"));

    // ?o + 0 errors on the IRI-valued row; it sorts first instead of failing.
    let tree = Algebra::order_by(
        Algebra::bgp(vec![triple!(var!("s"), p, var!("o"))]),
        vec![OrderCondition::asc(binary(
            BinaryOperator::Add,
            Expression::Variable("o".into()),
            int_expr(0),
        ))],
    );
    let solutions = execute(&tree, &store);
    assert_eq!(solutions.len(), 2);
    assert_eq!(
        solutions[0].get("s"),
        Some(&iri!("http://example/s2"))
    );
}

#[test]
fn group_partitions_and_aggregates() {
    let mut store = MockDataset::new();
    let score = iri!("http://example/score");
    let alice = iri!("http://example/alice");
    let bob = iri!("http://example/bob");
    store.add(alice.clone(), score.clone(), int_term(1));
    store.add(alice.clone(), score.clone(), int_term(2));
    store.add(bob.clone(), score.clone(), int_term(3));

    let tree = Algebra::group(
        Algebra::bgp(vec![triple!(var!("s"), score, var!("v"))]),
        vec![GroupCondition {
            expr: Expression::Variable("s".into()),
            alias: None,
        }],
        vec![
            (
                "count".into(),
                Aggregate::Count {
                    distinct: false,
                    expr: Some(Expression::Variable("v".into())),
                },
            ),
            (
                "total".into(),
                Aggregate::Sum {
                    distinct: false,
                    expr: Expression::Variable("v".into()),
                },
            ),
            (
                "top".into(),
                Aggregate::Max {
                    distinct: false,
                    expr: Expression::Variable("v".into()),
                },
            ),
        ],
    );
    let solutions = execute(&tree, &store);
    assert_eq!(solutions.len(), 2);

    let alice_row = solutions.iter().find(|b| b.get("s") == Some(&alice)).unwrap();
    assert_eq!(alice_row.get("count"), Some(&int_term(2)));
    assert_eq!(alice_row.get("total"), Some(&int_term(3)));
    assert_eq!(alice_row.get("top"), Some(&int_term(2)));

    let bob_row = solutions.iter().find(|b| b.get("s") == Some(&bob)).unwrap();
    assert_eq!(bob_row.get("count"), Some(&int_term(1)));
    assert_eq!(bob_row.get("total"), Some(&int_term(3)));
}

#[test]
fn group_all_over_empty_input_counts_zero() {
    let store = MockDataset::new();
    let tree = Algebra::group(
        Algebra::bgp(vec![triple!(var!("s"), var!("p"), var!("o"))]),
        vec![],
        vec![(
            "n".into(),
            Aggregate::Count {
                distinct: false,
                expr: None,
            },
        )],
    );
    let solutions = execute(&tree, &store);
    assert_eq!(solutions.len(), 1);
    assert_eq!(solutions[0].get("n"), Some(&int_term(0)));
}

#[test]
fn graph_variable_iterates_named_graphs() {
    let mut store = MockDataset::new();
    let g1 = iri!("http://example/g1");
    let g2 = iri!("http://example/g2");
    let p = iri!("http://example/p");
    store.add_named(g1.clone(), iri!("http://example/a"), p.clone(), int_term(1));
    store.add_named(g2.clone(), iri!("http://example/b"), p.clone(), int_term(2));

    let tree = Algebra::graph(
        var!("g"),
        Algebra::bgp(vec![triple!(var!("s"), p.clone(), var!("o"))]),
    );
    let solutions = execute(&tree, &store);
    assert_eq!(solutions.len(), 2);
    assert!(solutions.iter().any(|b| b.get("g") == Some(&g1)));
    assert!(solutions.iter().any(|b| b.get("g") == Some(&g2)));

    // A concrete graph term narrows evaluation to that graph.
    let only_g2 = execute(
        &Algebra::graph(g2.clone(), Algebra::bgp(vec![triple!(var!("s"), p, var!("o"))])),
        &store,
    );
    assert_eq!(only_g2.len(), 1);
    assert_eq!(only_g2[0].get("o"), Some(&int_term(2)));
}

#[test]
fn dataset_composition_restricts_graphs() {
    let mut store = MockDataset::new();
    let g1 = iri!("http://example/g1");
    let g2 = iri!("http://example/g2");
    let p = iri!("http://example/p");
    store.add(iri!("http://example/d"), p.clone(), int_term(0));
    store.add_named(g1.clone(), iri!("http://example/a"), p.clone(), int_term(1));
    store.add_named(g2.clone(), iri!("http://example/b"), p.clone(), int_term(2));

    // FROM <g1>: the default graph becomes g1, the named universe empty.
    let tree = Algebra::Dataset {
        default: vec![Iri("http://example/g1".into())],
        named: vec![],
        pattern: Box::new(Algebra::bgp(vec![triple!(var!("s"), p.clone(), var!("o"))])),
    };
    let solutions = execute(&tree, &store);
    assert_eq!(solutions.len(), 1);
    assert_eq!(solutions[0].get("o"), Some(&int_term(1)));

    // With an empty named universe, GRAPH ?g finds nothing.
    let graph_tree = Algebra::Dataset {
        default: vec![Iri("http://example/g1".into())],
        named: vec![],
        pattern: Box::new(Algebra::graph(
            var!("g"),
            Algebra::bgp(vec![triple!(var!("s"), p, var!("o"))]),
        )),
    };
    assert!(execute(&graph_tree, &store).is_empty());
}

#[test]
fn values_joins_inline_data() {
    let store = small_store();
    let mut row = Binding::new();
    row.insert("s".into(), iri!("http://example/s1"));
    let tree = Algebra::join(
        Algebra::bgp(vec![triple!(var!("s"), iri!("http://example/p"), var!("o"))]),
        Algebra::Values {
            variables: vec!["s".into()],
            bindings: vec![row],
        },
    );
    let solutions = execute(&tree, &store);
    assert_eq!(solutions.len(), 1);
    assert_eq!(solutions[0].get("o"), Some(&iri!("http://example/o1")));
}

#[test]
fn ask_construct_describe_forms() {
    let mut store = small_store();
    let executor = QueryExecutor::new();
    let pattern = Algebra::bgp(vec![triple!(var!("s"), iri!("http://example/p"), var!("o"))]);

    assert!(executor.ask(&pattern, &store).unwrap());
    assert!(!executor
        .ask(
            &Algebra::bgp(vec![triple!(var!("s"), iri!("http://example/q"), var!("o"))]),
            &store
        )
        .unwrap());

    let template = vec![triple!(var!("o"), iri!("http://example/inverse"), var!("s"))];
    let graph = executor.construct(&template, &pattern, &store).unwrap();
    assert_eq!(graph.len(), 2);
    assert!(graph.contains(&(
        iri!("http://example/o1"),
        iri!("http://example/inverse"),
        iri!("http://example/s1")
    )));

    // DESCRIBE expands blank-node objects into the description.
    let blank = Term::blank_node("addr");
    store.add(iri!("http://example/s1"), iri!("http://example/addr"), blank.clone());
    store.add(blank, iri!("http://example/city"), literal!("Osaka"));
    let description = executor
        .describe(
            &[iri!("http://example/s1")],
            &Algebra::Table,
            &store,
        )
        .unwrap();
    assert_eq!(description.len(), 3);
    assert!(description
        .iter()
        .any(|(_, p, o)| p == &iri!("http://example/city") && o == &literal!("Osaka")));
}

#[test]
fn timeout_aborts_whole_evaluation() {
    let store = small_store();
    let executor = QueryExecutor::with_context(ExecutionContext::with_timeout(Duration::ZERO));
    let tree = Algebra::bgp(vec![triple!(var!("s"), iri!("http://example/p"), var!("o"))]);
    let err = executor.execute(&tree, &store).unwrap_err();
    assert!(err.to_string().contains("timeout"));
}

#[test]
fn optimizer_preserves_evaluation_multiset() {
    let mut store = small_store();
    store.add(iri!("http://example/s1"), iri!("http://example/q"), int_term(4));
    store.add(iri!("http://example/s2"), iri!("http://example/q"), int_term(9));

    let tree = Algebra::slice(
        Algebra::order_by(
            Algebra::filter(
                binary(
                    BinaryOperator::Greater,
                    Expression::Variable("n".into()),
                    binary(BinaryOperator::Add, int_expr(1), int_expr(2)),
                ),
                Algebra::union(
                    Algebra::join(
                        Algebra::bgp(vec![triple!(var!("s"), iri!("http://example/p"), var!("o"))]),
                        Algebra::bgp(vec![triple!(var!("s"), iri!("http://example/q"), var!("n"))]),
                    ),
                    Algebra::left_join(
                        Algebra::bgp(vec![triple!(var!("s"), iri!("http://example/q"), var!("n"))]),
                        Algebra::bgp(vec![triple!(var!("s"), iri!("http://example/p"), var!("o"))]),
                        None,
                    ),
                ),
            ),
            vec![OrderCondition::asc(Expression::Variable("n".into()))],
        ),
        None,
        Some(3),
    );

    let raw = QueryExecutor::new().execute(&tree, &store).unwrap();
    let optimized_tree = QueryOptimizer::new().optimize(tree.clone()).unwrap();
    let optimized = QueryExecutor::new().execute(&optimized_tree, &store).unwrap();
    assert_eq!(as_multiset(&raw), as_multiset(&optimized));

    // The engine façade runs the same pipeline.
    let engine = QueryEngine::with_config(
        ExecutionContext::default(),
        OptimizerConfig::default(),
    );
    let via_engine = engine.evaluate(&tree, &store).unwrap();
    assert_eq!(as_multiset(&raw), as_multiset(&via_engine));
}

#[test]
fn query_result_wraps_terminal_shapes() {
    let store = small_store();
    let tree = Algebra::bgp(vec![triple!(var!("s"), iri!("http://example/p"), var!("o"))]);
    let result = arqlite::QueryResult::from_solution(execute(&tree, &store));
    match &result {
        arqlite::QueryResult::Bindings { variables, solutions } => {
            assert_eq!(variables, &vec!["o".to_string(), "s".to_string()]);
            assert_eq!(solutions.len(), 2);
        }
        other => panic!("expected bindings, got {:?}", other),
    }
    assert_eq!(result.len(), 2);
    assert!(!result.is_empty());
    assert!(arqlite::QueryResult::Boolean(true).is_boolean());
}

#[test]
fn evaluation_is_repeatable_on_the_same_tree() {
    let store = small_store();
    let tree = Algebra::distinct(Algebra::bgp(vec![triple!(
        var!("s"),
        iri!("http://example/p"),
        var!("o")
    )]));
    let first = execute(&tree, &store);
    let second = execute(&tree, &store);
    assert_eq!(first, second);
}
