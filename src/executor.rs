//! Query Execution Engine
//!
//! Recursively interprets an algebra tree against an abstract [`Dataset`],
//! producing a solution multiset. Dispatch is a single exhaustive match over
//! the operator enum. Expression failures are recovered at the
//! Filter/Extend/OrderBy/aggregate boundaries; malformed trees, timeouts,
//! and store failures abort the whole evaluation.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Result};
use tracing::{debug, trace};

use crate::algebra::{
    Aggregate, Algebra, Binding, Expression, GroundTriple, GroupCondition, OrderCondition,
    Solution, Term, TriplePattern, Variable,
};
use crate::expression::{ExpressionError, ExpressionEvaluator};
use crate::solution;
use crate::term::{xsd, NumericValue};

/// Abstract queryable dataset the engine evaluates patterns against.
///
/// Implementations may block on I/O inside `find_triples`; the engine
/// checks its deadline before every call and never retries. Store errors
/// propagate to the caller unmodified.
pub trait Dataset {
    /// Return the triples matching `pattern` in the given graph, `None`
    /// meaning the default graph. Variables in the pattern match anything.
    fn find_triples(
        &self,
        pattern: &TriplePattern,
        graph: Option<&Term>,
    ) -> Result<Vec<GroundTriple>>;

    /// Enumerate the named graphs of the dataset.
    fn named_graphs(&self) -> Result<Vec<Term>> {
        Ok(Vec::new())
    }

    /// Optional whole-sub-operator delegation. A store that can answer an
    /// entire algebra subtree (given the seed solutions flowing into it)
    /// may return `Some`; the engine then uses that answer verbatim
    /// instead of recursing.
    fn evaluate_delegated(&self, _algebra: &Algebra, _seed: &Solution) -> Option<Solution> {
        None
    }
}

/// Query execution context: graph selection, deadline, and recursion
/// depth. Passed by value down the call tree, never stored in shared
/// state, so concurrent evaluations are independent by construction.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Maximum execution time for one `execute` call
    pub timeout: Option<Duration>,
    /// Maximum operator-tree recursion depth
    pub max_depth: usize,
    deadline: Option<Instant>,
    active_graph: Option<Term>,
    default_graphs: Option<Vec<Term>>,
    named_graphs: Option<Vec<Term>>,
    depth: usize,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self {
            timeout: None,
            max_depth: 128,
            deadline: None,
            active_graph: None,
            default_graphs: None,
            named_graphs: None,
            depth: 0,
        }
    }
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Self::default()
        }
    }

    /// Arm the deadline at the start of a top-level evaluation.
    fn begin(&self) -> Self {
        let mut ctx = self.clone();
        if ctx.deadline.is_none() {
            ctx.deadline = ctx.timeout.map(|t| Instant::now() + t);
        }
        ctx
    }

    fn check_deadline(&self, operator: &'static str) -> Result<()> {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                bail!(
                    "query timeout in {} at depth {}, no partial result returned",
                    operator,
                    self.depth
                );
            }
        }
        Ok(())
    }

    /// Enter a child operator: deadline check plus depth accounting.
    fn descend(&self, operator: &'static str) -> Result<Self> {
        self.check_deadline(operator)?;
        if self.depth >= self.max_depth {
            bail!(
                "operator tree depth {} exceeded in {}",
                self.max_depth,
                operator
            );
        }
        let mut child = self.clone();
        child.depth += 1;
        Ok(child)
    }
}

/// Recursive algebra evaluator
pub struct QueryExecutor {
    context: ExecutionContext,
}

impl Default for QueryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryExecutor {
    pub fn new() -> Self {
        Self {
            context: ExecutionContext::default(),
        }
    }

    pub fn with_context(context: ExecutionContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Evaluate an algebra tree to its solution multiset.
    pub fn execute(&self, algebra: &Algebra, dataset: &dyn Dataset) -> Result<Solution> {
        let ctx = self.context.begin();
        self.eval(algebra, dataset, &ctx, &vec![Binding::new()])
    }

    /// ASK form: true iff the pattern has at least one solution.
    pub fn ask(&self, algebra: &Algebra, dataset: &dyn Dataset) -> Result<bool> {
        Ok(!self.execute(algebra, dataset)?.is_empty())
    }

    /// CONSTRUCT form: instantiate the template once per solution into an
    /// output graph. Triples left incomplete by unbound variables, or
    /// ill-formed (literal subject, non-IRI predicate), are dropped.
    pub fn construct(
        &self,
        template: &[TriplePattern],
        algebra: &Algebra,
        dataset: &dyn Dataset,
    ) -> Result<Vec<GroundTriple>> {
        let solutions = self.execute(algebra, dataset)?;
        let mut seen = HashSet::new();
        let mut graph = Vec::new();
        for binding in &solutions {
            for pattern in template {
                let t = substitute(pattern, binding);
                let well_formed = !t.subject.is_variable()
                    && !t.subject.is_literal()
                    && t.predicate.is_iri()
                    && t.object.is_ground();
                if !well_formed {
                    continue;
                }
                let triple = (t.subject, t.predicate, t.object);
                if seen.insert(triple.clone()) {
                    graph.push(triple);
                }
            }
        }
        Ok(graph)
    }

    /// DESCRIBE form: resolve each target against the solutions, then emit
    /// the concise bounded description of every matched resource (its
    /// subject triples, expanding blank-node objects recursively).
    pub fn describe(
        &self,
        targets: &[Term],
        algebra: &Algebra,
        dataset: &dyn Dataset,
    ) -> Result<Vec<GroundTriple>> {
        let ctx = self.context.begin();
        let solutions = self.eval(algebra, dataset, &ctx, &vec![Binding::new()])?;

        let mut queue = Vec::new();
        let mut enqueued = HashSet::new();
        for target in targets {
            match target {
                Term::Variable(var) => {
                    for binding in &solutions {
                        if let Some(term) = binding.get(var) {
                            if enqueued.insert(term.clone()) {
                                queue.push(term.clone());
                            }
                        }
                    }
                }
                ground => {
                    if enqueued.insert(ground.clone()) {
                        queue.push(ground.clone());
                    }
                }
            }
        }

        let mut graph = Vec::new();
        let mut emitted = HashSet::new();
        let mut visited = HashSet::new();
        while let Some(resource) = queue.pop() {
            if !visited.insert(resource.clone()) {
                continue;
            }
            let pattern =
                TriplePattern::new(resource, Term::variable("p"), Term::variable("o"));
            for (s, p, o) in self.scan(dataset, &pattern, &ctx)? {
                if o.is_blank_node() {
                    queue.push(o.clone());
                }
                let triple = (s, p, o);
                if emitted.insert(triple.clone()) {
                    graph.push(triple);
                }
            }
        }
        Ok(graph)
    }

    /// Evaluate with explicit seed solutions; used by the expression
    /// evaluator to run EXISTS subqueries seeded with the outer binding.
    pub(crate) fn eval_seeded(
        &self,
        algebra: &Algebra,
        dataset: &dyn Dataset,
        ctx: &ExecutionContext,
        seed: &Solution,
    ) -> Result<Solution> {
        self.eval(algebra, dataset, ctx, seed)
    }

    fn eval(
        &self,
        algebra: &Algebra,
        dataset: &dyn Dataset,
        ctx: &ExecutionContext,
        seed: &Solution,
    ) -> Result<Solution> {
        if let Some(delegated) = dataset.evaluate_delegated(algebra, seed) {
            return Ok(delegated);
        }

        match algebra {
            Algebra::Bgp(patterns) => {
                let ctx = ctx.descend("bgp")?;
                self.eval_bgp(patterns, dataset, &ctx, seed)
            }

            Algebra::Join { left, right } => {
                let ctx = ctx.descend("join")?;
                let lhs = self.eval(left, dataset, &ctx, seed)?;
                let rhs = self.eval(right, dataset, &ctx, seed)?;
                let mut out = Vec::new();
                for a in &lhs {
                    ctx.check_deadline("join")?;
                    for b in &rhs {
                        if let Some(merged) = solution::merge(a, b) {
                            out.push(merged);
                        }
                    }
                }
                Ok(out)
            }

            Algebra::LeftJoin {
                left,
                right,
                filter,
            } => {
                let ctx = ctx.descend("leftjoin")?;
                let lhs = self.eval(left, dataset, &ctx, seed)?;
                let rhs = self.eval(right, dataset, &ctx, seed)?;
                let evaluator = ExpressionEvaluator::new(self, dataset, &ctx);
                let mut out = Vec::new();
                for a in &lhs {
                    ctx.check_deadline("leftjoin")?;
                    let mut extended = false;
                    for b in &rhs {
                        if let Some(merged) = solution::merge(a, b) {
                            let keep = match filter {
                                None => true,
                                Some(condition) => {
                                    match evaluator.effective_boolean(condition, &merged) {
                                        Ok(pass) => pass,
                                        Err(e) if e.is_value_error() => {
                                            trace!("(leftjoin) condition failed, no extension: {e}");
                                            false
                                        }
                                        Err(e) => return Err(engine_error("leftjoin", &ctx, e)),
                                    }
                                }
                            };
                            if keep {
                                out.push(merged);
                                extended = true;
                            }
                        }
                    }
                    // Every outer row survives.
                    if !extended {
                        out.push(a.clone());
                    }
                }
                Ok(out)
            }

            Algebra::Union { left, right } => {
                let ctx = ctx.descend("union")?;
                let mut out = self.eval(left, dataset, &ctx, seed)?;
                out.extend(self.eval(right, dataset, &ctx, seed)?);
                Ok(out)
            }

            Algebra::Minus { left, right } => {
                let ctx = ctx.descend("minus")?;
                let lhs = self.eval(left, dataset, &ctx, seed)?;
                let rhs = self.eval(right, dataset, &ctx, seed)?;
                Ok(lhs
                    .into_iter()
                    .filter(|a| {
                        !rhs.iter()
                            .any(|b| shares_domain(a, b) && solution::compatible(a, b))
                    })
                    .collect())
            }

            Algebra::Filter { condition, pattern } => {
                let ctx = ctx.descend("filter")?;
                let solutions = self.eval(pattern, dataset, &ctx, seed)?;
                self.apply_filter("filter", condition, solutions, dataset, &ctx)
            }

            Algebra::Having { pattern, condition } => {
                let ctx = ctx.descend("having")?;
                let solutions = self.eval(pattern, dataset, &ctx, seed)?;
                self.apply_filter("having", condition, solutions, dataset, &ctx)
            }

            Algebra::Extend {
                pattern,
                variable,
                expr,
            } => {
                let ctx = ctx.descend("extend")?;
                let solutions = self.eval(pattern, dataset, &ctx, seed)?;
                let evaluator = ExpressionEvaluator::new(self, dataset, &ctx);
                let mut out = Vec::with_capacity(solutions.len());
                for mut binding in solutions {
                    match evaluator.evaluate(expr, &binding) {
                        Ok(term) => {
                            binding.insert(variable.clone(), term);
                        }
                        Err(e) if e.is_value_error() => {
                            trace!("(extend) ?{variable} left unbound: {e}");
                        }
                        Err(e) => return Err(engine_error("extend", &ctx, e)),
                    }
                    out.push(binding);
                }
                Ok(out)
            }

            Algebra::Graph { graph, pattern } => {
                let ctx = ctx.descend("graph")?;
                match graph {
                    Term::Variable(var) => {
                        let mut out = Vec::new();
                        for g in self.graph_universe(dataset, &ctx)? {
                            let mut scoped = ctx.clone();
                            scoped.active_graph = Some(g.clone());
                            for binding in self.eval(pattern, dataset, &scoped, seed)? {
                                let mut ext = Binding::new();
                                ext.insert(var.clone(), g.clone());
                                if let Some(merged) = solution::merge(&binding, &ext) {
                                    out.push(merged);
                                }
                            }
                        }
                        Ok(out)
                    }
                    term => {
                        let mut scoped = ctx.clone();
                        scoped.active_graph = Some(term.clone());
                        self.eval(pattern, dataset, &scoped, seed)
                    }
                }
            }

            Algebra::Project { pattern, variables } => {
                let ctx = ctx.descend("project")?;
                Ok(solution::project(
                    self.eval(pattern, dataset, &ctx, seed)?,
                    variables,
                ))
            }

            Algebra::Distinct { pattern } => {
                let ctx = ctx.descend("distinct")?;
                Ok(solution::distinct(self.eval(pattern, dataset, &ctx, seed)?))
            }

            Algebra::Reduced { pattern } => {
                let ctx = ctx.descend("reduced")?;
                Ok(solution::reduced(self.eval(pattern, dataset, &ctx, seed)?))
            }

            Algebra::Slice {
                pattern,
                offset,
                limit,
            } => {
                let ctx = ctx.descend("slice")?;
                Ok(solution::slice(
                    self.eval(pattern, dataset, &ctx, seed)?,
                    *offset,
                    *limit,
                ))
            }

            Algebra::OrderBy {
                pattern,
                conditions,
            } => {
                let ctx = ctx.descend("orderby")?;
                let solutions = self.eval(pattern, dataset, &ctx, seed)?;
                self.apply_order_by(conditions, solutions, dataset, &ctx)
            }

            Algebra::Group {
                pattern,
                variables,
                aggregates,
            } => {
                let ctx = ctx.descend("group")?;
                let solutions = self.eval(pattern, dataset, &ctx, seed)?;
                self.apply_group(variables, aggregates, solutions, dataset, &ctx)
            }

            Algebra::Values { bindings, .. } => {
                ctx.descend("values")?;
                let mut out = Vec::new();
                for base in seed {
                    for row in bindings {
                        if let Some(merged) = solution::merge(base, row) {
                            out.push(merged);
                        }
                    }
                }
                Ok(out)
            }

            Algebra::Dataset {
                default,
                named,
                pattern,
            } => {
                let ctx = ctx.descend("dataset")?;
                let mut scoped = ctx.clone();
                scoped.default_graphs =
                    Some(default.iter().cloned().map(Term::Iri).collect());
                scoped.named_graphs = Some(named.iter().cloned().map(Term::Iri).collect());
                self.eval(pattern, dataset, &scoped, seed)
            }

            Algebra::Table => {
                ctx.check_deadline("table")?;
                Ok(seed.clone())
            }

            Algebra::Zero => Ok(Vec::new()),
        }
    }

    /// Match a BGP's patterns left to right, extending the accumulated
    /// bindings with every consistent store match.
    fn eval_bgp(
        &self,
        patterns: &[TriplePattern],
        dataset: &dyn Dataset,
        ctx: &ExecutionContext,
        seed: &Solution,
    ) -> Result<Solution> {
        debug!("bgp with {} patterns, {} seeds", patterns.len(), seed.len());
        let mut solutions = seed.clone();
        for pattern in patterns {
            let mut next = Vec::new();
            for binding in &solutions {
                let bound = substitute(pattern, binding);
                for triple in self.scan(dataset, &bound, ctx)? {
                    if let Some(ext) = match_triple(&bound, &triple) {
                        if let Some(merged) = solution::merge(binding, &ext) {
                            next.push(merged);
                        }
                    }
                }
            }
            solutions = next;
            if solutions.is_empty() {
                break;
            }
        }
        Ok(solutions)
    }

    /// Query the store for one pattern under the context's graph selection.
    fn scan(
        &self,
        dataset: &dyn Dataset,
        pattern: &TriplePattern,
        ctx: &ExecutionContext,
    ) -> Result<Vec<GroundTriple>> {
        ctx.check_deadline("scan")?;
        match (&ctx.active_graph, &ctx.default_graphs) {
            (Some(graph), _) => dataset.find_triples(pattern, Some(graph)),
            (None, Some(defaults)) => {
                let mut out = Vec::new();
                for graph in defaults {
                    out.extend(dataset.find_triples(pattern, Some(graph))?);
                }
                Ok(out)
            }
            (None, None) => dataset.find_triples(pattern, None),
        }
    }

    /// The named graphs visible under the context's dataset selection.
    fn graph_universe(
        &self,
        dataset: &dyn Dataset,
        ctx: &ExecutionContext,
    ) -> Result<Vec<Term>> {
        let graphs = dataset.named_graphs()?;
        Ok(match &ctx.named_graphs {
            Some(allowed) => graphs
                .into_iter()
                .filter(|g| allowed.contains(g))
                .collect(),
            None => graphs,
        })
    }

    /// Keep the solutions whose condition has EBV true. Value errors
    /// exclude the solution silently; anything else is fatal.
    fn apply_filter(
        &self,
        operator: &'static str,
        condition: &Expression,
        solutions: Solution,
        dataset: &dyn Dataset,
        ctx: &ExecutionContext,
    ) -> Result<Solution> {
        let evaluator = ExpressionEvaluator::new(self, dataset, ctx);
        let mut out = Vec::with_capacity(solutions.len());
        for binding in solutions {
            ctx.check_deadline(operator)?;
            match evaluator.effective_boolean(condition, &binding) {
                Ok(true) => out.push(binding),
                Ok(false) => {}
                Err(e) if e.is_value_error() => {
                    trace!("({operator}) suppressed solution: {e}");
                }
                Err(e) => return Err(engine_error(operator, ctx, e)),
            }
        }
        Ok(out)
    }

    /// Stable multi-key sort. A comparator that fails to evaluate sorts
    /// its solution as unbound, i.e. least.
    fn apply_order_by(
        &self,
        conditions: &[OrderCondition],
        solutions: Solution,
        dataset: &dyn Dataset,
        ctx: &ExecutionContext,
    ) -> Result<Solution> {
        let evaluator = ExpressionEvaluator::new(self, dataset, ctx);
        let mut keyed: Vec<(Vec<Option<Term>>, Binding)> = Vec::with_capacity(solutions.len());
        for binding in solutions {
            let mut keys = Vec::with_capacity(conditions.len());
            for condition in conditions {
                match evaluator.evaluate(&condition.expr, &binding) {
                    Ok(term) => keys.push(Some(term)),
                    Err(e) if e.is_value_error() => keys.push(None),
                    Err(e) => return Err(engine_error("orderby", ctx, e)),
                }
            }
            keyed.push((keys, binding));
        }
        keyed.sort_by(|(a, _), (b, _)| {
            for (i, condition) in conditions.iter().enumerate() {
                let ord = a[i].cmp(&b[i]);
                let ord = if condition.ascending {
                    ord
                } else {
                    ord.reverse()
                };
                if ord != std::cmp::Ordering::Equal {
                    return ord;
                }
            }
            std::cmp::Ordering::Equal
        });
        Ok(keyed.into_iter().map(|(_, binding)| binding).collect())
    }

    /// Partition by the evaluated group key and fold each partition with
    /// the requested aggregates. An aggregate that fails leaves its
    /// variable unbound in the partition's solution.
    fn apply_group(
        &self,
        variables: &[GroupCondition],
        aggregates: &[(Variable, Aggregate)],
        solutions: Solution,
        dataset: &dyn Dataset,
        ctx: &ExecutionContext,
    ) -> Result<Solution> {
        let evaluator = ExpressionEvaluator::new(self, dataset, ctx);
        let mut order: Vec<Vec<Option<Term>>> = Vec::new();
        let mut groups: HashMap<Vec<Option<Term>>, Vec<Binding>> = HashMap::new();
        for binding in solutions {
            ctx.check_deadline("group")?;
            let mut key = Vec::with_capacity(variables.len());
            for condition in variables {
                match evaluator.evaluate(&condition.expr, &binding) {
                    Ok(term) => key.push(Some(term)),
                    Err(e) if e.is_value_error() => key.push(None),
                    Err(e) => return Err(engine_error("group", ctx, e)),
                }
            }
            groups
                .entry(key.clone())
                .or_insert_with(|| {
                    order.push(key);
                    Vec::new()
                })
                .push(binding);
        }

        // Aggregating everything over empty input still yields one row.
        if groups.is_empty() && variables.is_empty() {
            order.push(Vec::new());
            groups.insert(Vec::new(), Vec::new());
        }

        let mut out = Vec::with_capacity(order.len());
        for key in order {
            let members = &groups[&key];
            let mut row = Binding::new();
            for (condition, value) in variables.iter().zip(&key) {
                if let (Some(var), Some(term)) = (condition.key_variable(), value) {
                    row.insert(var.clone(), term.clone());
                }
            }
            for (var, aggregate) in aggregates {
                if let Some(term) = self.eval_aggregate(aggregate, members, &evaluator, ctx)? {
                    row.insert(var.clone(), term);
                }
            }
            out.push(row);
        }
        Ok(out)
    }

    fn eval_aggregate(
        &self,
        aggregate: &Aggregate,
        members: &[Binding],
        evaluator: &ExpressionEvaluator,
        ctx: &ExecutionContext,
    ) -> Result<Option<Term>> {
        use Aggregate::*;

        match aggregate {
            Count {
                distinct,
                expr: None,
            } => {
                let count = if *distinct {
                    solution::distinct(members.to_vec()).len()
                } else {
                    members.len()
                };
                Ok(Some(Term::typed_literal(count.to_string(), xsd::INTEGER)))
            }
            Count {
                distinct,
                expr: Some(expr),
            } => {
                let values = self.aggregate_values(expr, members, *distinct, evaluator, ctx)?;
                Ok(Some(Term::typed_literal(
                    values.len().to_string(),
                    xsd::INTEGER,
                )))
            }
            Sum { distinct, expr } => {
                let values = self.aggregate_values(expr, members, *distinct, evaluator, ctx)?;
                Ok(numeric_fold(&values).map(|n| n.to_term()))
            }
            Avg { distinct, expr } => {
                let values = self.aggregate_values(expr, members, *distinct, evaluator, ctx)?;
                if values.is_empty() {
                    return Ok(Some(NumericValue::Integer(0).to_term()));
                }
                Ok(numeric_fold(&values).map(|sum| {
                    NumericValue::Decimal(sum.as_f64() / values.len() as f64).to_term()
                }))
            }
            Min { distinct, expr } => {
                let values = self.aggregate_values(expr, members, *distinct, evaluator, ctx)?;
                Ok(values.into_iter().min())
            }
            Max { distinct, expr } => {
                let values = self.aggregate_values(expr, members, *distinct, evaluator, ctx)?;
                Ok(values.into_iter().max())
            }
            Sample { expr, .. } => {
                let values = self.aggregate_values(expr, members, false, evaluator, ctx)?;
                Ok(values.into_iter().next())
            }
            GroupConcat {
                distinct,
                expr,
                separator,
            } => {
                let values = self.aggregate_values(expr, members, *distinct, evaluator, ctx)?;
                let sep = separator.as_deref().unwrap_or(" ");
                let parts: Vec<String> = values
                    .iter()
                    .filter_map(|term| match term {
                        Term::Literal(lit) => Some(lit.value.clone()),
                        Term::Iri(iri) => Some(iri.as_str().to_string()),
                        _ => None,
                    })
                    .collect();
                Ok(Some(Term::literal(parts.join(sep))))
            }
        }
    }

    /// Evaluate an aggregate operand over every member of a partition,
    /// skipping members whose evaluation fails with a value error.
    fn aggregate_values(
        &self,
        expr: &Expression,
        members: &[Binding],
        distinct: bool,
        evaluator: &ExpressionEvaluator,
        ctx: &ExecutionContext,
    ) -> Result<Vec<Term>> {
        let mut values = Vec::with_capacity(members.len());
        for binding in members {
            match evaluator.evaluate(expr, binding) {
                Ok(term) => values.push(term),
                Err(e) if e.is_value_error() => {
                    trace!("(aggregate) skipped member: {e}");
                }
                Err(e) => return Err(engine_error("aggregate", ctx, e)),
            }
        }
        if distinct {
            let mut seen = HashSet::new();
            values.retain(|term| seen.insert(term.clone()));
        }
        Ok(values)
    }
}

fn engine_error(
    operator: &'static str,
    ctx: &ExecutionContext,
    error: ExpressionError,
) -> anyhow::Error {
    anyhow!(
        "fatal expression failure in {} at depth {}: {}",
        operator,
        ctx.depth,
        error
    )
}

/// Replace the pattern's variables already bound in `binding`.
fn substitute(pattern: &TriplePattern, binding: &Binding) -> TriplePattern {
    let subst = |term: &Term| match term {
        Term::Variable(var) => binding.get(var).cloned().unwrap_or_else(|| term.clone()),
        other => other.clone(),
    };
    TriplePattern::new(
        subst(&pattern.subject),
        subst(&pattern.predicate),
        subst(&pattern.object),
    )
}

/// Bind the pattern's remaining variables against one concrete triple.
/// Repeated variables must match the same term; ground slots must agree.
fn match_triple(pattern: &TriplePattern, triple: &GroundTriple) -> Option<Binding> {
    let mut ext = Binding::new();
    let (s, p, o) = triple;
    if bind_slot(&mut ext, &pattern.subject, s)
        && bind_slot(&mut ext, &pattern.predicate, p)
        && bind_slot(&mut ext, &pattern.object, o)
    {
        Some(ext)
    } else {
        None
    }
}

fn bind_slot(ext: &mut Binding, pattern: &Term, actual: &Term) -> bool {
    match pattern {
        Term::Variable(var) => match ext.get(var) {
            Some(previous) => previous == actual,
            None => {
                ext.insert(var.clone(), actual.clone());
                true
            }
        },
        ground => ground == actual,
    }
}

/// True iff the bindings share at least one variable.
fn shares_domain(a: &Binding, b: &Binding) -> bool {
    a.keys().any(|var| b.contains_key(var))
}

/// Sum with numeric promotion; `None` if any value is non-numeric.
fn numeric_fold(values: &[Term]) -> Option<NumericValue> {
    let mut acc = NumericValue::Integer(0);
    for term in values {
        let num = term.to_numeric().ok()?;
        let (a, b) = acc.promote_with(&num);
        acc = match (a, b) {
            (NumericValue::Integer(x), NumericValue::Integer(y)) => {
                NumericValue::Integer(x.wrapping_add(y))
            }
            (NumericValue::Decimal(x), NumericValue::Decimal(y)) => NumericValue::Decimal(x + y),
            (NumericValue::Float(x), NumericValue::Float(y)) => NumericValue::Float(x + y),
            (NumericValue::Double(x), NumericValue::Double(y)) => NumericValue::Double(x + y),
            _ => unreachable!("operands promoted to a common type"),
        };
    }
    Some(acc)
}
