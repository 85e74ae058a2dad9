//! Term Value System
//!
//! Value-space behavior of RDF terms: XSD datatype handling, numeric
//! promotion, effective boolean values, and the total order used by
//! ORDER BY.

use std::cmp::Ordering;

use crate::algebra::{Iri, Literal, Term};
use crate::expression::ExpressionError;

/// Common XSD datatype IRIs
pub mod xsd {
    pub const STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
    pub const BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";
    pub const INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
    pub const INT: &str = "http://www.w3.org/2001/XMLSchema#int";
    pub const LONG: &str = "http://www.w3.org/2001/XMLSchema#long";
    pub const SHORT: &str = "http://www.w3.org/2001/XMLSchema#short";
    pub const BYTE: &str = "http://www.w3.org/2001/XMLSchema#byte";
    pub const NON_NEGATIVE_INTEGER: &str =
        "http://www.w3.org/2001/XMLSchema#nonNegativeInteger";
    pub const DECIMAL: &str = "http://www.w3.org/2001/XMLSchema#decimal";
    pub const FLOAT: &str = "http://www.w3.org/2001/XMLSchema#float";
    pub const DOUBLE: &str = "http://www.w3.org/2001/XMLSchema#double";
    pub const DATE: &str = "http://www.w3.org/2001/XMLSchema#date";
    pub const DATE_TIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";
    pub const DATE_TIME_STAMP: &str = "http://www.w3.org/2001/XMLSchema#dateTimeStamp";

    /// True for the integer-family datatypes
    pub fn is_integer(datatype: &str) -> bool {
        matches!(
            datatype,
            INTEGER | INT | LONG | SHORT | BYTE | NON_NEGATIVE_INTEGER
        )
    }

    /// True for any numeric datatype
    pub fn is_numeric(datatype: &str) -> bool {
        is_integer(datatype) || matches!(datatype, DECIMAL | FLOAT | DOUBLE)
    }
}

/// The language-tagged string datatype
pub const RDF_LANG_STRING: &str =
    "http://www.w3.org/1999/02/22-rdf-syntax-ns#langString";

/// Numeric value with XSD type promotion
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumericValue {
    Integer(i64),
    Decimal(f64),
    Float(f32),
    Double(f64),
}

impl NumericValue {
    /// Promote two values to their common type: integer < decimal < float < double.
    pub fn promote_with(&self, other: &NumericValue) -> (NumericValue, NumericValue) {
        use NumericValue::*;
        let rank = |v: &NumericValue| match v {
            Integer(_) => 0,
            Decimal(_) => 1,
            Float(_) => 2,
            Double(_) => 3,
        };
        let target = rank(self).max(rank(other));
        let promote = |v: &NumericValue| match (v, target) {
            (Integer(i), 0) => Integer(*i),
            (Integer(i), 1) => Decimal(*i as f64),
            (Integer(i), 2) => Float(*i as f32),
            (Integer(i), _) => Double(*i as f64),
            (Decimal(d), 1) => Decimal(*d),
            (Decimal(d), 2) => Float(*d as f32),
            (Decimal(d), _) => Double(*d),
            (Float(f), 2) => Float(*f),
            (Float(f), _) => Double(*f as f64),
            (Double(d), _) => Double(*d),
        };
        (promote(self), promote(other))
    }

    /// Lossy view for comparisons
    pub fn as_f64(&self) -> f64 {
        match self {
            NumericValue::Integer(i) => *i as f64,
            NumericValue::Decimal(d) => *d,
            NumericValue::Float(f) => *f as f64,
            NumericValue::Double(d) => *d,
        }
    }

    pub fn is_nan(&self) -> bool {
        match self {
            NumericValue::Integer(_) => false,
            NumericValue::Decimal(d) | NumericValue::Double(d) => d.is_nan(),
            NumericValue::Float(f) => f.is_nan(),
        }
    }

    /// Render back to a typed literal term
    pub fn to_term(&self) -> Term {
        match self {
            NumericValue::Integer(i) => Term::typed_literal(i.to_string(), xsd::INTEGER),
            NumericValue::Decimal(d) => Term::typed_literal(format_decimal(*d), xsd::DECIMAL),
            NumericValue::Float(f) => Term::typed_literal(f.to_string(), xsd::FLOAT),
            NumericValue::Double(d) => Term::typed_literal(d.to_string(), xsd::DOUBLE),
        }
    }
}

fn format_decimal(d: f64) -> String {
    if d.fract() == 0.0 && d.is_finite() {
        format!("{:.1}", d)
    } else {
        d.to_string()
    }
}

impl Term {
    /// Create an IRI term
    pub fn iri(value: impl Into<String>) -> Self {
        Term::Iri(Iri(value.into()))
    }

    /// Create a plain literal term
    pub fn literal(value: impl Into<String>) -> Self {
        Term::Literal(Literal {
            value: value.into(),
            language: None,
            datatype: None,
        })
    }

    /// Create a typed literal term
    pub fn typed_literal(value: impl Into<String>, datatype: &str) -> Self {
        Term::Literal(Literal {
            value: value.into(),
            language: None,
            datatype: Some(Iri(datatype.to_string())),
        })
    }

    /// Create a language-tagged literal term
    pub fn lang_literal(value: impl Into<String>, language: &str) -> Self {
        Term::Literal(Literal {
            value: value.into(),
            language: Some(language.to_string()),
            datatype: None,
        })
    }

    /// Create a blank node term
    pub fn blank_node(id: impl Into<String>) -> Self {
        Term::BlankNode(id.into())
    }

    /// Create a fresh blank node with a unique label
    pub fn fresh_blank_node() -> Self {
        Term::BlankNode(format!("b{}", uuid::Uuid::new_v4().simple()))
    }

    /// Create a variable term
    pub fn variable(name: impl Into<String>) -> Self {
        Term::Variable(name.into())
    }

    /// Create an xsd:boolean literal
    pub fn boolean(value: bool) -> Self {
        Term::typed_literal(if value { "true" } else { "false" }, xsd::BOOLEAN)
    }

    pub fn is_iri(&self) -> bool {
        matches!(self, Term::Iri(_))
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Term::Literal(_))
    }

    pub fn is_blank_node(&self) -> bool {
        matches!(self, Term::BlankNode(_))
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, Term::Variable(_))
    }

    /// A term with no variable in it
    pub fn is_ground(&self) -> bool {
        !self.is_variable()
    }

    /// Interpret this term as a numeric value.
    pub fn to_numeric(&self) -> Result<NumericValue, ExpressionError> {
        let lit = match self {
            Term::Literal(lit) => lit,
            other => {
                return Err(ExpressionError::TypeError(format!(
                    "not a numeric literal: {}",
                    other
                )))
            }
        };
        let datatype = lit.datatype.as_ref().map(Iri::as_str).unwrap_or("");
        let malformed = || ExpressionError::MalformedLiteral {
            lexical: lit.value.clone(),
            datatype: datatype.to_string(),
        };
        if xsd::is_integer(datatype) {
            lit.value
                .trim()
                .parse::<i64>()
                .map(NumericValue::Integer)
                .map_err(|_| malformed())
        } else if datatype == xsd::DECIMAL {
            lit.value
                .trim()
                .parse::<f64>()
                .map(NumericValue::Decimal)
                .map_err(|_| malformed())
        } else if datatype == xsd::FLOAT {
            lit.value
                .trim()
                .parse::<f32>()
                .map(NumericValue::Float)
                .map_err(|_| malformed())
        } else if datatype == xsd::DOUBLE {
            lit.value
                .trim()
                .parse::<f64>()
                .map(NumericValue::Double)
                .map_err(|_| malformed())
        } else {
            Err(ExpressionError::TypeError(format!(
                "not a numeric literal: {}",
                self
            )))
        }
    }

    /// Effective boolean value, per the SPARQL EBV rules.
    ///
    /// Booleans yield their value, numerics are false iff zero or NaN,
    /// strings are false iff empty. Every other term kind is an EBV type
    /// error, which the caller suppresses at its filter boundary.
    pub fn effective_boolean_value(&self) -> Result<bool, ExpressionError> {
        let lit = match self {
            Term::Literal(lit) => lit,
            other => {
                return Err(ExpressionError::TypeError(format!(
                    "no effective boolean value for {}",
                    other
                )))
            }
        };
        let datatype = lit.datatype.as_ref().map(Iri::as_str).unwrap_or("");
        if datatype == xsd::BOOLEAN {
            match lit.value.trim() {
                "true" | "1" => Ok(true),
                "false" | "0" => Ok(false),
                _ => Err(ExpressionError::MalformedLiteral {
                    lexical: lit.value.clone(),
                    datatype: datatype.to_string(),
                }),
            }
        } else if xsd::is_numeric(datatype) {
            let num = self.to_numeric()?;
            Ok(!num.is_nan() && num.as_f64() != 0.0)
        } else if lit.language.is_some() || datatype.is_empty() || datatype == xsd::STRING {
            Ok(!lit.value.is_empty())
        } else {
            Err(ExpressionError::TypeError(format!(
                "no effective boolean value for {}",
                self
            )))
        }
    }

    /// True for literals with a numeric datatype and a well-formed lexical form
    pub fn is_numeric(&self) -> bool {
        self.to_numeric().is_ok()
    }
}

impl Literal {
    pub fn is_numeric(&self) -> bool {
        self.datatype
            .as_ref()
            .map(|dt| xsd::is_numeric(dt.as_str()))
            .unwrap_or(false)
    }
}

/// Total order over terms used by ORDER BY and MIN/MAX.
///
/// Kind order: variable < blank node < IRI < literal. Numeric literals
/// compare by value; ties and non-numeric literals fall back to lexical
/// form, language, and datatype so the order stays antisymmetric.
impl Ord for Term {
    fn cmp(&self, other: &Self) -> Ordering {
        fn rank(term: &Term) -> u8 {
            match term {
                Term::Variable(_) => 0,
                Term::BlankNode(_) => 1,
                Term::Iri(_) => 2,
                Term::Literal(_) => 3,
            }
        }

        match (self, other) {
            (Term::Variable(a), Term::Variable(b)) => a.cmp(b),
            (Term::BlankNode(a), Term::BlankNode(b)) => a.cmp(b),
            (Term::Iri(a), Term::Iri(b)) => a.cmp(b),
            (Term::Literal(a), Term::Literal(b)) => {
                if let (Ok(x), Ok(y)) = (self.to_numeric(), other.to_numeric()) {
                    let by_value = x
                        .as_f64()
                        .partial_cmp(&y.as_f64())
                        .unwrap_or(Ordering::Equal);
                    if by_value != Ordering::Equal {
                        return by_value;
                    }
                }
                (&a.value, &a.language, &a.datatype).cmp(&(&b.value, &b.language, &b.datatype))
            }
            (a, b) => rank(a).cmp(&rank(b)),
        }
    }
}

impl PartialOrd for Term {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
