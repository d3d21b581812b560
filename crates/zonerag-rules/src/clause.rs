//! Typed rule clauses and their evaluation against a property.

use std::collections::BTreeMap;
use std::fmt;

use zonerag_core::types::{normalize_city, PropertyContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Attribute {
    City,
    ZoningLabel,
    LotSize,
    ExistingUnits,
    IsHistoric,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Text,
    Number,
    Bool,
}

impl Attribute {
    pub const ALL: [Attribute; 5] =
        [Attribute::City, Attribute::ZoningLabel, Attribute::LotSize, Attribute::ExistingUnits, Attribute::IsHistoric];

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.name() == name.trim())
    }

    pub fn name(self) -> &'static str {
        match self {
            Attribute::City => "city",
            Attribute::ZoningLabel => "zoning_label",
            Attribute::LotSize => "lot_size",
            Attribute::ExistingUnits => "existing_units",
            Attribute::IsHistoric => "is_historic",
        }
    }

    pub fn kind(self) -> ValueKind {
        match self {
            Attribute::City | Attribute::ZoningLabel => ValueKind::Text,
            Attribute::LotSize | Attribute::ExistingUnits => ValueKind::Number,
            Attribute::IsHistoric => ValueKind::Bool,
        }
    }

    /// The property's value for this attribute; `None` when unknown.
    pub fn read(self, ctx: &PropertyContext) -> Option<Value> {
        match self {
            Attribute::City => ctx.city().map(|c| Value::Text(c.to_string())),
            Attribute::ZoningLabel => ctx.zoning_label().map(|z| Value::Text(z.trim().to_string())),
            Attribute::LotSize => ctx.lot_size.filter(|v| v.is_finite()).map(Value::Number),
            Attribute::ExistingUnits => ctx.existing_units.map(|u| Value::Number(f64::from(u))),
            Attribute::IsHistoric => ctx.is_historic.map(Value::Bool),
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Number(f64),
    Bool(bool),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Text(_) => ValueKind::Text,
            Value::Number(_) => ValueKind::Number,
            Value::Bool(_) => ValueKind::Bool,
        }
    }

    fn equals(&self, other: &Value, attribute: Attribute) -> bool {
        match (self, other) {
            (Value::Text(a), Value::Text(b)) if attribute == Attribute::City => normalize_city(a) == normalize_city(b),
            (Value::Text(a), Value::Text(b)) => a.trim() == b.trim(),
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "\"{s}\""),
            Value::Number(n) => write!(f, "{n}"),
            Value::Bool(b) => write!(f, "{b}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Gte(f64),
    Gt(f64),
    Lte(f64),
    Lt(f64),
    Eq(Value),
    Ne(Value),
    In(Vec<Value>),
    Prefix(String),
    /// Case-insensitive substring match.
    Contains(String),
    /// Minimum value keyed by the property's zoning label.
    GteByZoning(BTreeMap<String, f64>),
    /// Passes when any alternative passes on the same attribute.
    AnyOf(Vec<Op>),
}

impl Op {
    pub const NAMES: [&'static str; 11] =
        ["gte", "gt", "lte", "lt", "eq", "ne", "in", "prefix", "contains", "gte_by_zoning", "any_of"];

    fn reads_zoning(&self) -> bool {
        match self {
            Op::GteByZoning(_) => true,
            Op::AnyOf(alternatives) => alternatives.iter().any(Op::reads_zoning),
            _ => false,
        }
    }

    /// Whether `actual` satisfies the op, and how to describe the test.
    fn check(&self, attribute: Attribute, actual: &Value, ctx: &PropertyContext) -> (bool, String) {
        match (self, actual) {
            (Op::Gte(t), Value::Number(v)) => (*v >= *t, format!("{attribute} >= {t}")),
            (Op::Gt(t), Value::Number(v)) => (*v > *t, format!("{attribute} > {t}")),
            (Op::Lte(t), Value::Number(v)) => (*v <= *t, format!("{attribute} <= {t}")),
            (Op::Lt(t), Value::Number(v)) => (*v < *t, format!("{attribute} < {t}")),
            (Op::Eq(expected), _) => (actual.equals(expected, attribute), format!("{attribute} == {expected}")),
            (Op::Ne(expected), _) => (!actual.equals(expected, attribute), format!("{attribute} != {expected}")),
            (Op::In(options), _) => {
                let listed = options.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
                (options.iter().any(|o| actual.equals(o, attribute)), format!("{attribute} in [{listed}]"))
            }
            (Op::Prefix(prefix), Value::Text(v)) => {
                (v.starts_with(prefix.as_str()), format!("{attribute} starts with \"{prefix}\""))
            }
            (Op::Contains(needle), Value::Text(v)) => (
                v.to_lowercase().contains(&needle.to_lowercase()),
                format!("{attribute} contains \"{needle}\""),
            ),
            (Op::GteByZoning(table), Value::Number(v)) => match Attribute::ZoningLabel.read(ctx) {
                Some(Value::Text(zoning)) => match table.get(&zoning) {
                    Some(t) => (*v >= *t, format!("{attribute} >= {t} (zoning {zoning})")),
                    None => (false, format!("{attribute}: no threshold for zoning {zoning}")),
                },
                _ => (false, format!("{attribute}: zoning unknown")),
            },
            (Op::AnyOf(alternatives), _) => {
                let checks: Vec<(bool, String)> = alternatives.iter().map(|op| op.check(attribute, actual, ctx)).collect();
                let passed = checks.iter().any(|(p, _)| *p);
                let description = checks.into_iter().map(|(_, d)| d).collect::<Vec<_>>().join(" or ");
                (passed, description)
            }
            // Validation rules out the remaining type combinations.
            _ => (false, format!("{attribute}: operand type does not match value {actual}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub attribute: Attribute,
    pub op: Op,
}

/// Outcome of one clause against one property.
#[derive(Debug, Clone, PartialEq)]
pub enum ClauseOutcome {
    Pass(String),
    Fail(String),
    /// These attributes are unknown for the property.
    Missing(Vec<Attribute>),
}

impl Clause {
    /// Attributes the clause reads.
    pub fn attributes(&self) -> Vec<Attribute> {
        if self.op.reads_zoning() && self.attribute != Attribute::ZoningLabel {
            vec![self.attribute, Attribute::ZoningLabel]
        } else {
            vec![self.attribute]
        }
    }

    pub fn evaluate(&self, ctx: &PropertyContext) -> ClauseOutcome {
        let missing: Vec<Attribute> = self.attributes().into_iter().filter(|a| a.read(ctx).is_none()).collect();
        if !missing.is_empty() {
            return ClauseOutcome::Missing(missing);
        }
        let Some(actual) = self.attribute.read(ctx) else {
            return ClauseOutcome::Missing(vec![self.attribute]);
        };

        let (passed, description) = self.op.check(self.attribute, &actual, ctx);
        let description = format!("{description} (actual {actual})");
        if passed {
            ClauseOutcome::Pass(description)
        } else {
            ClauseOutcome::Fail(description)
        }
    }
}
