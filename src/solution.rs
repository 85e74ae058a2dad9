//! Solution Multiset Operations
//!
//! Bindings are immutable partial mappings from variables to terms;
//! solutions are bags of bindings. This module holds the pure multiset
//! algebra: compatibility, merge, projection, dedup, and slicing. Sorting
//! and grouping live in the executor because they evaluate expressions.

use std::collections::HashSet;

use crate::algebra::{Binding, Solution, Term, Variable};

/// Two bindings are compatible iff every variable present in both maps to
/// an equal term.
pub fn compatible(a: &Binding, b: &Binding) -> bool {
    a.iter().all(|(var, term)| match b.get(var) {
        Some(other) => other == term,
        None => true,
    })
}

/// Merge two bindings into the union of their mappings. Undefined for
/// incompatible bindings, hence the `Option`.
pub fn merge(a: &Binding, b: &Binding) -> Option<Binding> {
    if !compatible(a, b) {
        return None;
    }
    let mut merged = a.clone();
    for (var, term) in b {
        merged.insert(var.clone(), term.clone());
    }
    Some(merged)
}

/// Restrict each binding's domain to `variables`.
pub fn project(solution: Solution, variables: &[Variable]) -> Solution {
    let keep: HashSet<&Variable> = variables.iter().collect();
    solution
        .into_iter()
        .map(|binding| {
            binding
                .into_iter()
                .filter(|(var, _)| keep.contains(var))
                .collect()
        })
        .collect()
}

/// Remove duplicate bindings by structural equality, keeping the first
/// occurrence of each.
pub fn distinct(solution: Solution) -> Solution {
    let mut seen: HashSet<Vec<(Variable, Term)>> = HashSet::new();
    solution
        .into_iter()
        .filter(|binding| seen.insert(binding_key(binding)))
        .collect()
}

/// Permissive dedup: collapses adjacent duplicates only, which keeps the
/// output between `distinct`'s size and the input size.
pub fn reduced(solution: Solution) -> Solution {
    let mut out: Solution = Vec::with_capacity(solution.len());
    for binding in solution {
        if out.last() != Some(&binding) {
            out.push(binding);
        }
    }
    out
}

/// The contiguous sub-sequence `[offset, offset + limit)`.
pub fn slice(solution: Solution, offset: Option<usize>, limit: Option<usize>) -> Solution {
    let start = offset.unwrap_or(0);
    let take = limit.unwrap_or(usize::MAX);
    solution.into_iter().skip(start).take(take).collect()
}

/// Canonical hashable form of a binding, sorted by variable name.
pub fn binding_key(binding: &Binding) -> Vec<(Variable, Term)> {
    let mut key: Vec<(Variable, Term)> = binding
        .iter()
        .map(|(var, term)| (var.clone(), term.clone()))
        .collect();
    key.sort();
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::xsd;

    fn binding(pairs: &[(&str, Term)]) -> Binding {
        pairs
            .iter()
            .map(|(var, term)| (var.to_string(), term.clone()))
            .collect()
    }

    #[test]
    fn compatibility_and_merge() {
        let a = binding(&[("x", Term::iri("http://example.org/1"))]);
        let b = binding(&[
            ("x", Term::iri("http://example.org/1")),
            ("y", Term::literal("v")),
        ]);
        let c = binding(&[("x", Term::iri("http://example.org/2"))]);

        assert!(compatible(&a, &b));
        assert!(!compatible(&b, &c));
        assert!(merge(&b, &c).is_none());

        let merged = merge(&a, &b).unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.get("y"), Some(&Term::literal("v")));
    }

    #[test]
    fn merge_is_commutative_and_associative() {
        let a = binding(&[("x", Term::literal("1"))]);
        let b = binding(&[("y", Term::literal("2"))]);
        let c = binding(&[("z", Term::literal("3")), ("x", Term::literal("1"))]);

        let ab = merge(&a, &b).unwrap();
        let ba = merge(&b, &a).unwrap();
        assert_eq!(ab, ba);

        let ab_c = merge(&ab, &c).unwrap();
        let bc = merge(&b, &c).unwrap();
        let a_bc = merge(&a, &bc).unwrap();
        assert_eq!(ab_c, a_bc);
    }

    #[test]
    fn distinct_is_idempotent() {
        let dup = binding(&[("x", Term::typed_literal("1", xsd::INTEGER))]);
        let other = binding(&[("x", Term::typed_literal("2", xsd::INTEGER))]);
        let solution = vec![dup.clone(), other.clone(), dup.clone(), dup];

        let once = distinct(solution);
        assert_eq!(once.len(), 2);
        assert_eq!(once[0].get("x"), Some(&Term::typed_literal("1", xsd::INTEGER)));

        let twice = distinct(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn reduced_stays_within_bounds() {
        let a = binding(&[("x", Term::literal("a"))]);
        let b = binding(&[("x", Term::literal("b"))]);
        let solution = vec![a.clone(), a.clone(), b.clone(), a.clone()];

        let out = reduced(solution.clone());
        assert!(out.len() <= solution.len());
        assert!(out.len() >= distinct(solution).len());
        assert_eq!(out, vec![a.clone(), b, a]);
    }

    #[test]
    fn slicing() {
        let rows: Solution = (0..5)
            .map(|i| binding(&[("x", Term::typed_literal(i.to_string(), xsd::INTEGER))]))
            .collect();
        let window = slice(rows.clone(), Some(1), Some(2));
        assert_eq!(window, rows[1..3].to_vec());
        assert_eq!(slice(rows.clone(), Some(10), None), vec![]);
        assert_eq!(slice(rows.clone(), None, None), rows);
    }
}
