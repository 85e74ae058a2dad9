//! Expression Evaluation System
//!
//! Evaluates scalar expression nodes against a single binding, producing a
//! term or a typed evaluation failure. Failures come in two flavors: value
//! errors (unbound variable, type mismatch, division by zero, malformed
//! literal) that callers suppress at their Filter/Extend/OrderBy/aggregate
//! boundary, and fatal errors (unknown function, bad arity, nested engine
//! failure) that abort the whole evaluation.

use std::cmp::Ordering;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use thiserror::Error;

use crate::algebra::{
    Algebra, Binding, BinaryOperator, Expression, Iri, Term, UnaryOperator, Variable,
};
use crate::executor::{Dataset, ExecutionContext, QueryExecutor};
use crate::term::{xsd, NumericValue, RDF_LANG_STRING};

/// Typed expression evaluation failure
#[derive(Debug, Error)]
pub enum ExpressionError {
    #[error("unbound variable: ?{0}")]
    UnboundVariable(Variable),

    #[error("type error: {0}")]
    TypeError(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("malformed literal \"{lexical}\"^^<{datatype}>")]
    MalformedLiteral { lexical: String, datatype: String },

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("{name} expects {expected} arguments, got {actual}")]
    BadArity {
        name: &'static str,
        expected: &'static str,
        actual: usize,
    },

    #[error("engine failure in subquery: {0}")]
    Engine(String),
}

impl ExpressionError {
    /// True for the failure kinds that filter-like boundaries suppress.
    /// Everything else indicates a malformed tree or an engine fault and
    /// stays fatal.
    pub fn is_value_error(&self) -> bool {
        matches!(
            self,
            ExpressionError::UnboundVariable(_)
                | ExpressionError::TypeError(_)
                | ExpressionError::DivisionByZero
                | ExpressionError::MalformedLiteral { .. }
        )
    }
}

/// Expression evaluator scoped to one engine invocation
pub struct ExpressionEvaluator<'a> {
    executor: &'a QueryExecutor,
    dataset: &'a dyn Dataset,
    context: &'a ExecutionContext,
}

impl<'a> ExpressionEvaluator<'a> {
    pub fn new(
        executor: &'a QueryExecutor,
        dataset: &'a dyn Dataset,
        context: &'a ExecutionContext,
    ) -> Self {
        Self {
            executor,
            dataset,
            context,
        }
    }

    /// Evaluate an expression against one binding.
    pub fn evaluate(&self, expr: &Expression, binding: &Binding) -> Result<Term, ExpressionError> {
        match expr {
            Expression::Variable(var) => binding
                .get(var)
                .cloned()
                .ok_or_else(|| ExpressionError::UnboundVariable(var.clone())),

            Expression::Literal(lit) => Ok(Term::Literal(lit.clone())),

            Expression::Iri(iri) => Ok(Term::Iri(iri.clone())),

            Expression::Function { name, args } => self.evaluate_function(name, args, binding),

            Expression::Binary { op, left, right } => {
                self.evaluate_binary_op(*op, left, right, binding)
            }

            Expression::Unary { op, expr } => {
                let val = self.evaluate(expr, binding)?;
                self.evaluate_unary_op(*op, &val)
            }

            Expression::Conditional {
                condition,
                then_expr,
                else_expr,
            } => {
                if self.effective_boolean(condition, binding)? {
                    self.evaluate(then_expr, binding)
                } else {
                    self.evaluate(else_expr, binding)
                }
            }

            Expression::Bound(var) => Ok(Term::boolean(binding.contains_key(var))),

            Expression::Exists(algebra) => Ok(Term::boolean(self.exists(algebra, binding)?)),

            Expression::NotExists(algebra) => Ok(Term::boolean(!self.exists(algebra, binding)?)),
        }
    }

    /// Evaluate an expression and coerce the result to its EBV.
    pub fn effective_boolean(
        &self,
        expr: &Expression,
        binding: &Binding,
    ) -> Result<bool, ExpressionError> {
        self.evaluate(expr, binding)?.effective_boolean_value()
    }

    /// Execute an existential subquery seeded with the current binding.
    /// EXISTS holds iff the seeded evaluation yields at least one solution,
    /// so EXISTS and NOT EXISTS are complementary by construction.
    fn exists(&self, algebra: &Algebra, binding: &Binding) -> Result<bool, ExpressionError> {
        let seed = vec![binding.clone()];
        let solutions = self
            .executor
            .eval_seeded(algebra, self.dataset, self.context, &seed)
            .map_err(|e| ExpressionError::Engine(e.to_string()))?;
        Ok(!solutions.is_empty())
    }

    fn evaluate_binary_op(
        &self,
        op: BinaryOperator,
        left: &Expression,
        right: &Expression,
        binding: &Binding,
    ) -> Result<Term, ExpressionError> {
        use BinaryOperator::*;

        // AND/OR are three-valued: a decisive operand settles the result
        // even when the other operand fails with a value error.
        match op {
            And | Or => {
                let lhs = self.effective_boolean(left, binding);
                let rhs = self.effective_boolean(right, binding);
                return three_valued(op, lhs, rhs).map(Term::boolean);
            }
            _ => {}
        }

        let lhs = self.evaluate(left, binding)?;
        let rhs = self.evaluate(right, binding)?;

        match op {
            Add | Subtract | Multiply | Divide => self.arithmetic(op, &lhs, &rhs),
            Equal => Ok(Term::boolean(self.value_eq(&lhs, &rhs)?)),
            NotEqual => Ok(Term::boolean(!self.value_eq(&lhs, &rhs)?)),
            Less => Ok(Term::boolean(self.value_cmp(&lhs, &rhs)? == Ordering::Less)),
            LessEqual => Ok(Term::boolean(self.value_cmp(&lhs, &rhs)? != Ordering::Greater)),
            Greater => Ok(Term::boolean(
                self.value_cmp(&lhs, &rhs)? == Ordering::Greater,
            )),
            GreaterEqual => Ok(Term::boolean(self.value_cmp(&lhs, &rhs)? != Ordering::Less)),
            SameTerm => Ok(Term::boolean(lhs == rhs)),
            And | Or => unreachable!("handled above"),
        }
    }

    fn arithmetic(
        &self,
        op: BinaryOperator,
        left: &Term,
        right: &Term,
    ) -> Result<Term, ExpressionError> {
        use BinaryOperator::*;
        use NumericValue::*;

        let (a, b) = left.to_numeric()?.promote_with(&right.to_numeric()?);
        let result = match (op, a, b) {
            (Add, Integer(x), Integer(y)) => Integer(x.wrapping_add(y)),
            (Add, Decimal(x), Decimal(y)) => Decimal(x + y),
            (Add, Float(x), Float(y)) => Float(x + y),
            (Add, Double(x), Double(y)) => Double(x + y),

            (Subtract, Integer(x), Integer(y)) => Integer(x.wrapping_sub(y)),
            (Subtract, Decimal(x), Decimal(y)) => Decimal(x - y),
            (Subtract, Float(x), Float(y)) => Float(x - y),
            (Subtract, Double(x), Double(y)) => Double(x - y),

            (Multiply, Integer(x), Integer(y)) => Integer(x.wrapping_mul(y)),
            (Multiply, Decimal(x), Decimal(y)) => Decimal(x * y),
            (Multiply, Float(x), Float(y)) => Float(x * y),
            (Multiply, Double(x), Double(y)) => Double(x * y),

            // Integer division produces a decimal, per the operator mapping
            (Divide, Integer(x), Integer(y)) => {
                if y == 0 {
                    return Err(ExpressionError::DivisionByZero);
                }
                Decimal(x as f64 / y as f64)
            }
            (Divide, Decimal(x), Decimal(y)) => {
                if y == 0.0 {
                    return Err(ExpressionError::DivisionByZero);
                }
                Decimal(x / y)
            }
            (Divide, Float(x), Float(y)) => {
                if y == 0.0 {
                    return Err(ExpressionError::DivisionByZero);
                }
                Float(x / y)
            }
            (Divide, Double(x), Double(y)) => {
                if y == 0.0 {
                    return Err(ExpressionError::DivisionByZero);
                }
                Double(x / y)
            }

            _ => unreachable!("operands promoted to a common type"),
        };
        Ok(result.to_term())
    }

    fn evaluate_unary_op(&self, op: UnaryOperator, term: &Term) -> Result<Term, ExpressionError> {
        use UnaryOperator::*;

        match op {
            Not => Ok(Term::boolean(!term.effective_boolean_value()?)),
            Plus => Ok(term.to_numeric()?.to_term()),
            Minus => {
                let negated = match term.to_numeric()? {
                    NumericValue::Integer(i) => NumericValue::Integer(-i),
                    NumericValue::Decimal(d) => NumericValue::Decimal(-d),
                    NumericValue::Float(f) => NumericValue::Float(-f),
                    NumericValue::Double(d) => NumericValue::Double(-d),
                };
                Ok(negated.to_term())
            }
            IsIri => Ok(Term::boolean(term.is_iri())),
            IsBlank => Ok(Term::boolean(term.is_blank_node())),
            IsLiteral => Ok(Term::boolean(term.is_literal())),
            IsNumeric => Ok(Term::boolean(term.is_numeric())),
        }
    }

    /// SPARQL value equality: numeric literals compare by value, everything
    /// else by structural term equality.
    fn value_eq(&self, left: &Term, right: &Term) -> Result<bool, ExpressionError> {
        if let (Ok(a), Ok(b)) = (left.to_numeric(), right.to_numeric()) {
            return Ok(a.as_f64() == b.as_f64());
        }
        Ok(left == right)
    }

    /// Value comparison for the ordering operators. Comparable pairs are
    /// numerics, strings, booleans, and dates/dateTimes; anything else is a
    /// type error.
    fn value_cmp(&self, left: &Term, right: &Term) -> Result<Ordering, ExpressionError> {
        if let (Ok(a), Ok(b)) = (left.to_numeric(), right.to_numeric()) {
            return a
                .as_f64()
                .partial_cmp(&b.as_f64())
                .ok_or_else(|| ExpressionError::TypeError("NaN is not comparable".into()));
        }
        if let (Some(a), Some(b)) = (string_value(left), string_value(right)) {
            return Ok(a.cmp(b));
        }
        if let (Ok(a), Ok(b)) = (
            left.effective_boolean_value(),
            right.effective_boolean_value(),
        ) {
            if is_boolean_literal(left) && is_boolean_literal(right) {
                return Ok(a.cmp(&b));
            }
        }
        if let (Some(a), Some(b)) = (date_value(left), date_value(right)) {
            return Ok(a.cmp(&b));
        }
        Err(ExpressionError::TypeError(format!(
            "cannot compare {} with {}",
            left, right
        )))
    }

    fn evaluate_function(
        &self,
        name: &str,
        args: &[Expression],
        binding: &Binding,
    ) -> Result<Term, ExpressionError> {
        // COALESCE and IF short-circuit over unevaluated arguments.
        match name {
            "coalesce" | "COALESCE" => {
                for arg in args {
                    match self.evaluate(arg, binding) {
                        Ok(term) => return Ok(term),
                        Err(e) if e.is_value_error() => continue,
                        Err(e) => return Err(e),
                    }
                }
                return Err(ExpressionError::TypeError(
                    "COALESCE: no argument evaluated successfully".into(),
                ));
            }
            "if" | "IF" => {
                if args.len() != 3 {
                    return Err(bad_arity("IF", "3", args.len()));
                }
                return if self.effective_boolean(&args[0], binding)? {
                    self.evaluate(&args[1], binding)
                } else {
                    self.evaluate(&args[2], binding)
                };
            }
            _ => {}
        }

        let vals: Vec<Term> = args
            .iter()
            .map(|arg| self.evaluate(arg, binding))
            .collect::<Result<Vec<_>, _>>()?;

        match name {
            // String accessors
            "str" | "STR" => builtin_str(&vals),
            "lang" | "LANG" => builtin_lang(&vals),
            "langMatches" | "LANGMATCHES" => builtin_lang_matches(&vals),
            "datatype" | "DATATYPE" => builtin_datatype(&vals),

            // String manipulation
            "strlen" | "STRLEN" => builtin_strlen(&vals),
            "substr" | "SUBSTR" => builtin_substr(&vals),
            "ucase" | "UCASE" => builtin_ucase(&vals),
            "lcase" | "LCASE" => builtin_lcase(&vals),
            "strstarts" | "STRSTARTS" => builtin_strstarts(&vals),
            "strends" | "STRENDS" => builtin_strends(&vals),
            "contains" | "CONTAINS" => builtin_contains(&vals),
            "concat" | "CONCAT" => builtin_concat(&vals),
            "replace" | "REPLACE" => builtin_replace(&vals),
            "regex" | "REGEX" => builtin_regex(&vals),
            "encode_for_uri" | "ENCODE_FOR_URI" => builtin_encode_for_uri(&vals),

            // Type checks
            "isIRI" | "isURI" => unary_predicate("isIRI", &vals, Term::is_iri),
            "isBlank" | "isBLANK" => unary_predicate("isBlank", &vals, Term::is_blank_node),
            "isLiteral" | "isLITERAL" => unary_predicate("isLiteral", &vals, Term::is_literal),
            "isNumeric" | "isNUMERIC" => unary_predicate("isNumeric", &vals, Term::is_numeric),
            "sameTerm" | "SAMETERM" => {
                if vals.len() != 2 {
                    return Err(bad_arity("sameTerm", "2", vals.len()));
                }
                Ok(Term::boolean(vals[0] == vals[1]))
            }

            // Numeric
            "abs" | "ABS" => numeric_unary("ABS", &vals, |n| match n {
                NumericValue::Integer(i) => NumericValue::Integer(i.abs()),
                NumericValue::Decimal(d) => NumericValue::Decimal(d.abs()),
                NumericValue::Float(f) => NumericValue::Float(f.abs()),
                NumericValue::Double(d) => NumericValue::Double(d.abs()),
            }),
            "round" | "ROUND" => numeric_unary("ROUND", &vals, |n| match n {
                NumericValue::Integer(i) => NumericValue::Integer(i),
                NumericValue::Decimal(d) => NumericValue::Decimal(d.round()),
                NumericValue::Float(f) => NumericValue::Float(f.round()),
                NumericValue::Double(d) => NumericValue::Double(d.round()),
            }),
            "ceil" | "CEIL" => numeric_unary("CEIL", &vals, |n| match n {
                NumericValue::Integer(i) => NumericValue::Integer(i),
                NumericValue::Decimal(d) => NumericValue::Decimal(d.ceil()),
                NumericValue::Float(f) => NumericValue::Float(f.ceil()),
                NumericValue::Double(d) => NumericValue::Double(d.ceil()),
            }),
            "floor" | "FLOOR" => numeric_unary("FLOOR", &vals, |n| match n {
                NumericValue::Integer(i) => NumericValue::Integer(i),
                NumericValue::Decimal(d) => NumericValue::Decimal(d.floor()),
                NumericValue::Float(f) => NumericValue::Float(f.floor()),
                NumericValue::Double(d) => NumericValue::Double(d.floor()),
            }),

            // Date/time
            "now" | "NOW" => {
                if !vals.is_empty() {
                    return Err(bad_arity("NOW", "0", vals.len()));
                }
                Ok(Term::typed_literal(
                    chrono::Utc::now().to_rfc3339(),
                    xsd::DATE_TIME,
                ))
            }
            "year" | "YEAR" => date_component("YEAR", &vals, |d| d.0),
            "month" | "MONTH" => date_component("MONTH", &vals, |d| d.1 as i32),
            "day" | "DAY" => date_component("DAY", &vals, |d| d.2 as i32),

            // Constructors
            "iri" | "IRI" | "uri" | "URI" => {
                let s = single_string("IRI", &vals)?;
                Ok(Term::iri(s))
            }
            "bnode" | "BNODE" => match vals.len() {
                0 => Ok(Term::fresh_blank_node()),
                1 => Ok(Term::blank_node(single_string("BNODE", &vals)?)),
                n => Err(bad_arity("BNODE", "0 or 1", n)),
            },
            "strdt" | "STRDT" => {
                if vals.len() != 2 {
                    return Err(bad_arity("STRDT", "2", vals.len()));
                }
                match (&vals[0], &vals[1]) {
                    (Term::Literal(lit), Term::Iri(dt)) => {
                        Ok(Term::typed_literal(lit.value.clone(), dt.as_str()))
                    }
                    _ => Err(ExpressionError::TypeError(
                        "STRDT expects a string and an IRI".into(),
                    )),
                }
            }
            "strlang" | "STRLANG" => {
                if vals.len() != 2 {
                    return Err(bad_arity("STRLANG", "2", vals.len()));
                }
                match (&vals[0], &vals[1]) {
                    (Term::Literal(a), Term::Literal(b)) => {
                        Ok(Term::lang_literal(a.value.clone(), &b.value))
                    }
                    _ => Err(ExpressionError::TypeError(
                        "STRLANG expects two strings".into(),
                    )),
                }
            }

            other => Err(ExpressionError::UnknownFunction(other.to_string())),
        }
    }
}

/// Three-valued logic for AND/OR. Fatal errors always win; a decisive
/// operand (false for AND, true for OR) settles the result even when the
/// other side fails with a value error; remaining failures propagate.
fn three_valued(
    op: BinaryOperator,
    lhs: Result<bool, ExpressionError>,
    rhs: Result<bool, ExpressionError>,
) -> Result<bool, ExpressionError> {
    if let Err(e) = &lhs {
        if !e.is_value_error() {
            return lhs;
        }
    }
    if let Err(e) = &rhs {
        if !e.is_value_error() {
            return rhs;
        }
    }
    match op {
        BinaryOperator::And => match (lhs, rhs) {
            (Ok(false), _) | (_, Ok(false)) => Ok(false),
            (Ok(true), Ok(true)) => Ok(true),
            (Err(e), _) | (_, Err(e)) => Err(e),
        },
        BinaryOperator::Or => match (lhs, rhs) {
            (Ok(true), _) | (_, Ok(true)) => Ok(true),
            (Ok(false), Ok(false)) => Ok(false),
            (Err(e), _) | (_, Err(e)) => Err(e),
        },
        _ => unreachable!("three_valued is only called for AND/OR"),
    }
}

fn bad_arity(name: &'static str, expected: &'static str, actual: usize) -> ExpressionError {
    ExpressionError::BadArity {
        name,
        expected,
        actual,
    }
}

/// The string value of a term usable in string contexts: plain and
/// xsd:string literals only.
fn string_value(term: &Term) -> Option<&str> {
    match term {
        Term::Literal(lit)
            if lit.language.is_none()
                && lit
                    .datatype
                    .as_ref()
                    .map(|dt| dt.as_str() == xsd::STRING)
                    .unwrap_or(true) =>
        {
            Some(&lit.value)
        }
        _ => None,
    }
}

fn is_boolean_literal(term: &Term) -> bool {
    matches!(term, Term::Literal(lit)
        if lit.datatype.as_ref().map(|dt| dt.as_str() == xsd::BOOLEAN).unwrap_or(false))
}

fn date_value(term: &Term) -> Option<NaiveDateTime> {
    let lit = match term {
        Term::Literal(lit) => lit,
        _ => return None,
    };
    let datatype = lit.datatype.as_ref()?.as_str();
    if !matches!(datatype, xsd::DATE | xsd::DATE_TIME | xsd::DATE_TIME_STAMP) {
        return None;
    }
    parse_date_time(&lit.value).map(|(dt, _)| dt)
}

/// Parse a date or dateTime lexical form, trying RFC 3339 first and then
/// the bare date / bare dateTime shapes.
fn parse_date_time(lexical: &str) -> Option<(NaiveDateTime, bool)> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(lexical) {
        return Some((dt.naive_utc(), true));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(lexical, "%Y-%m-%dT%H:%M:%S") {
        return Some((dt, true));
    }
    if let Ok(d) = NaiveDate::parse_from_str(lexical, "%Y-%m-%d") {
        return Some((d.and_hms_opt(0, 0, 0)?, false));
    }
    None
}

fn date_component(
    name: &'static str,
    args: &[Term],
    pick: fn((i32, u32, u32)) -> i32,
) -> Result<Term, ExpressionError> {
    if args.len() != 1 {
        return Err(bad_arity(name, "1", args.len()));
    }
    let lit = match &args[0] {
        Term::Literal(lit) => lit,
        other => {
            return Err(ExpressionError::TypeError(format!(
                "{} expects a date/dateTime literal, got {}",
                name, other
            )))
        }
    };
    let datatype = lit.datatype.as_ref().map(Iri::as_str).unwrap_or("");
    if !matches!(datatype, xsd::DATE | xsd::DATE_TIME | xsd::DATE_TIME_STAMP) {
        return Err(ExpressionError::TypeError(format!(
            "{} expects a date/dateTime literal, got {}",
            name, args[0]
        )));
    }
    let (dt, _) = parse_date_time(&lit.value).ok_or_else(|| ExpressionError::MalformedLiteral {
        lexical: lit.value.clone(),
        datatype: datatype.to_string(),
    })?;
    let parts = (dt.year(), dt.month(), dt.day());
    Ok(Term::typed_literal(pick(parts).to_string(), xsd::INTEGER))
}

// Built-in function implementations

fn builtin_str(args: &[Term]) -> Result<Term, ExpressionError> {
    if args.len() != 1 {
        return Err(bad_arity("STR", "1", args.len()));
    }
    match &args[0] {
        Term::Iri(iri) => Ok(Term::literal(iri.as_str())),
        Term::Literal(lit) => Ok(Term::literal(lit.value.clone())),
        other => Err(ExpressionError::TypeError(format!(
            "STR is undefined for {}",
            other
        ))),
    }
}

fn lexical_arg(name: &'static str, args: &[Term], index: usize) -> Result<String, ExpressionError> {
    let arg = args.get(index).ok_or(bad_arity(name, "more", args.len()))?;
    match builtin_str(std::slice::from_ref(arg))? {
        Term::Literal(lit) => Ok(lit.value),
        _ => unreachable!("STR always yields a literal"),
    }
}

fn single_string(name: &'static str, args: &[Term]) -> Result<String, ExpressionError> {
    if args.len() != 1 {
        return Err(bad_arity(name, "1", args.len()));
    }
    lexical_arg(name, args, 0)
}

fn builtin_lang(args: &[Term]) -> Result<Term, ExpressionError> {
    if args.len() != 1 {
        return Err(bad_arity("LANG", "1", args.len()));
    }
    match &args[0] {
        Term::Literal(lit) => Ok(Term::literal(lit.language.clone().unwrap_or_default())),
        other => Err(ExpressionError::TypeError(format!(
            "LANG expects a literal, got {}",
            other
        ))),
    }
}

fn builtin_lang_matches(args: &[Term]) -> Result<Term, ExpressionError> {
    if args.len() != 2 {
        return Err(bad_arity("LANGMATCHES", "2", args.len()));
    }
    let tag = lexical_arg("LANGMATCHES", args, 0)?.to_ascii_lowercase();
    let range = lexical_arg("LANGMATCHES", args, 1)?.to_ascii_lowercase();
    let matched = if range == "*" {
        !tag.is_empty()
    } else {
        tag == range || tag.starts_with(&format!("{}-", range))
    };
    Ok(Term::boolean(matched))
}

fn builtin_datatype(args: &[Term]) -> Result<Term, ExpressionError> {
    if args.len() != 1 {
        return Err(bad_arity("DATATYPE", "1", args.len()));
    }
    match &args[0] {
        Term::Literal(lit) => {
            let dt = if let Some(dt) = &lit.datatype {
                dt.as_str().to_string()
            } else if lit.language.is_some() {
                RDF_LANG_STRING.to_string()
            } else {
                xsd::STRING.to_string()
            };
            Ok(Term::iri(dt))
        }
        other => Err(ExpressionError::TypeError(format!(
            "DATATYPE expects a literal, got {}",
            other
        ))),
    }
}

fn builtin_strlen(args: &[Term]) -> Result<Term, ExpressionError> {
    let s = single_string("STRLEN", args)?;
    Ok(Term::typed_literal(
        s.chars().count().to_string(),
        xsd::INTEGER,
    ))
}

fn builtin_substr(args: &[Term]) -> Result<Term, ExpressionError> {
    if args.len() < 2 || args.len() > 3 {
        return Err(bad_arity("SUBSTR", "2 or 3", args.len()));
    }
    let s = lexical_arg("SUBSTR", args, 0)?;
    let start = match args[1].to_numeric()? {
        NumericValue::Integer(i) if i >= 1 => i as usize,
        NumericValue::Integer(_) => 1,
        other => other.as_f64().max(1.0) as usize,
    };
    let chars: Vec<char> = s.chars().collect();
    let result = if args.len() == 3 {
        let len = args[2].to_numeric()?.as_f64().max(0.0) as usize;
        chars.iter().skip(start - 1).take(len).collect::<String>()
    } else {
        chars.iter().skip(start - 1).collect::<String>()
    };
    Ok(Term::literal(result))
}

fn builtin_ucase(args: &[Term]) -> Result<Term, ExpressionError> {
    Ok(Term::literal(single_string("UCASE", args)?.to_uppercase()))
}

fn builtin_lcase(args: &[Term]) -> Result<Term, ExpressionError> {
    Ok(Term::literal(single_string("LCASE", args)?.to_lowercase()))
}

fn builtin_strstarts(args: &[Term]) -> Result<Term, ExpressionError> {
    if args.len() != 2 {
        return Err(bad_arity("STRSTARTS", "2", args.len()));
    }
    let a = lexical_arg("STRSTARTS", args, 0)?;
    let b = lexical_arg("STRSTARTS", args, 1)?;
    Ok(Term::boolean(a.starts_with(&b)))
}

fn builtin_strends(args: &[Term]) -> Result<Term, ExpressionError> {
    if args.len() != 2 {
        return Err(bad_arity("STRENDS", "2", args.len()));
    }
    let a = lexical_arg("STRENDS", args, 0)?;
    let b = lexical_arg("STRENDS", args, 1)?;
    Ok(Term::boolean(a.ends_with(&b)))
}

fn builtin_contains(args: &[Term]) -> Result<Term, ExpressionError> {
    if args.len() != 2 {
        return Err(bad_arity("CONTAINS", "2", args.len()));
    }
    let a = lexical_arg("CONTAINS", args, 0)?;
    let b = lexical_arg("CONTAINS", args, 1)?;
    Ok(Term::boolean(a.contains(&b)))
}

fn builtin_concat(args: &[Term]) -> Result<Term, ExpressionError> {
    let mut result = String::new();
    for (i, _) in args.iter().enumerate() {
        result.push_str(&lexical_arg("CONCAT", args, i)?);
    }
    Ok(Term::literal(result))
}

fn builtin_encode_for_uri(args: &[Term]) -> Result<Term, ExpressionError> {
    let s = single_string("ENCODE_FOR_URI", args)?;
    Ok(Term::literal(urlencoding::encode(&s).into_owned()))
}

fn build_regex(pattern: &str, flags: &str) -> Result<regex::Regex, ExpressionError> {
    let mut builder = regex::RegexBuilder::new(pattern);
    for flag in flags.chars() {
        match flag {
            'i' => {
                builder.case_insensitive(true);
            }
            'm' => {
                builder.multi_line(true);
            }
            's' => {
                builder.dot_matches_new_line(true);
            }
            'x' => {
                builder.ignore_whitespace(true);
            }
            other => {
                return Err(ExpressionError::TypeError(format!(
                    "unknown regex flag: {}",
                    other
                )))
            }
        }
    }
    builder
        .build()
        .map_err(|e| ExpressionError::TypeError(format!("invalid regex pattern: {}", e)))
}

fn builtin_regex(args: &[Term]) -> Result<Term, ExpressionError> {
    if args.len() < 2 || args.len() > 3 {
        return Err(bad_arity("REGEX", "2 or 3", args.len()));
    }
    let text = lexical_arg("REGEX", args, 0)?;
    let pattern = lexical_arg("REGEX", args, 1)?;
    let flags = if args.len() == 3 {
        lexical_arg("REGEX", args, 2)?
    } else {
        String::new()
    };
    let regex = build_regex(&pattern, &flags)?;
    Ok(Term::boolean(regex.is_match(&text)))
}

fn builtin_replace(args: &[Term]) -> Result<Term, ExpressionError> {
    if args.len() < 3 || args.len() > 4 {
        return Err(bad_arity("REPLACE", "3 or 4", args.len()));
    }
    let input = lexical_arg("REPLACE", args, 0)?;
    let pattern = lexical_arg("REPLACE", args, 1)?;
    let replacement = lexical_arg("REPLACE", args, 2)?;
    let flags = if args.len() == 4 {
        lexical_arg("REPLACE", args, 3)?
    } else {
        String::new()
    };
    let regex = build_regex(&pattern, &flags)?;
    Ok(Term::literal(
        regex.replace_all(&input, replacement.as_str()).into_owned(),
    ))
}

fn unary_predicate(
    name: &'static str,
    args: &[Term],
    predicate: fn(&Term) -> bool,
) -> Result<Term, ExpressionError> {
    if args.len() != 1 {
        return Err(bad_arity(name, "1", args.len()));
    }
    Ok(Term::boolean(predicate(&args[0])))
}

fn numeric_unary(
    name: &'static str,
    args: &[Term],
    apply: fn(NumericValue) -> NumericValue,
) -> Result<Term, ExpressionError> {
    if args.len() != 1 {
        return Err(bad_arity(name, "1", args.len()));
    }
    Ok(apply(args[0].to_numeric()?).to_term())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{Dataset, ExecutionContext, QueryExecutor};
    use crate::term::xsd;

    struct EmptyDataset;

    impl Dataset for EmptyDataset {
        fn find_triples(
            &self,
            _pattern: &crate::algebra::TriplePattern,
            _graph: Option<&Term>,
        ) -> anyhow::Result<Vec<crate::algebra::GroundTriple>> {
            Ok(vec![])
        }
    }

    fn eval(expr: &Expression, binding: &Binding) -> Result<Term, ExpressionError> {
        let executor = QueryExecutor::new();
        let dataset = EmptyDataset;
        let context = ExecutionContext::default();
        ExpressionEvaluator::new(&executor, &dataset, &context).evaluate(expr, binding)
    }

    fn int_lit(i: i64) -> Expression {
        Expression::Literal(crate::algebra::Literal {
            value: i.to_string(),
            language: None,
            datatype: Some(Iri(xsd::INTEGER.to_string())),
        })
    }

    fn binary(op: BinaryOperator, left: Expression, right: Expression) -> Expression {
        Expression::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    #[test]
    fn arithmetic_with_promotion() {
        let binding = Binding::new();
        let sum = eval(&binary(BinaryOperator::Add, int_lit(40), int_lit(2)), &binding).unwrap();
        assert_eq!(sum, Term::typed_literal("42", xsd::INTEGER));

        let quotient = eval(
            &binary(BinaryOperator::Divide, int_lit(1), int_lit(0)),
            &binding,
        );
        assert!(matches!(quotient, Err(ExpressionError::DivisionByZero)));
    }

    #[test]
    fn unbound_variable_is_a_value_error() {
        let binding = Binding::new();
        let err = eval(&Expression::Variable("missing".into()), &binding).unwrap_err();
        assert!(err.is_value_error());

        let bound = eval(&Expression::Bound("missing".into()), &binding).unwrap();
        assert_eq!(bound, Term::boolean(false));
    }

    #[test]
    fn three_valued_and_or() {
        let binding = Binding::new();
        let unbound = Expression::Variable("missing".into());
        let t = Expression::Literal(crate::algebra::Literal {
            value: "true".into(),
            language: None,
            datatype: Some(Iri(xsd::BOOLEAN.to_string())),
        });
        let f = Expression::Literal(crate::algebra::Literal {
            value: "false".into(),
            language: None,
            datatype: Some(Iri(xsd::BOOLEAN.to_string())),
        });

        // false AND error -> false; true OR error -> true
        let and = eval(&binary(BinaryOperator::And, f.clone(), unbound.clone()), &binding);
        assert_eq!(and.unwrap(), Term::boolean(false));
        let or = eval(&binary(BinaryOperator::Or, unbound.clone(), t.clone()), &binding);
        assert_eq!(or.unwrap(), Term::boolean(true));

        // true AND error -> error; false OR error -> error
        assert!(eval(&binary(BinaryOperator::And, t, unbound.clone()), &binding).is_err());
        assert!(eval(&binary(BinaryOperator::Or, f, unbound), &binding).is_err());
    }

    #[test]
    fn unknown_function_is_fatal() {
        let binding = Binding::new();
        let err = eval(
            &Expression::Function {
                name: "frobnicate".into(),
                args: vec![],
            },
            &binding,
        )
        .unwrap_err();
        assert!(!err.is_value_error());
    }

    #[test]
    fn string_builtins() {
        let binding = Binding::new();
        let call = |name: &str, args: Vec<Expression>| Expression::Function {
            name: name.into(),
            args,
        };
        let hello = Expression::Literal(crate::algebra::Literal {
            value: "hello".into(),
            language: None,
            datatype: None,
        });

        assert_eq!(
            eval(&call("STRLEN", vec![hello.clone()]), &binding).unwrap(),
            Term::typed_literal("5", xsd::INTEGER)
        );
        assert_eq!(
            eval(&call("UCASE", vec![hello.clone()]), &binding).unwrap(),
            Term::literal("HELLO")
        );
        assert_eq!(
            eval(
                &call(
                    "REGEX",
                    vec![
                        hello,
                        Expression::Literal(crate::algebra::Literal {
                            value: "^H".into(),
                            language: None,
                            datatype: None,
                        }),
                        Expression::Literal(crate::algebra::Literal {
                            value: "i".into(),
                            language: None,
                            datatype: None,
                        }),
                    ],
                ),
                &binding,
            )
            .unwrap(),
            Term::boolean(true)
        );
    }

    #[test]
    fn coalesce_skips_value_errors() {
        let binding = Binding::new();
        let expr = Expression::Function {
            name: "COALESCE".into(),
            args: vec![Expression::Variable("missing".into()), int_lit(7)],
        };
        assert_eq!(eval(&expr, &binding).unwrap(), Term::typed_literal("7", xsd::INTEGER));
    }
}
