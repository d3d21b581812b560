//! Rule table loading and validation.
//!
//! Rules are read from TOML into loosely typed records and then checked into a
//! [`RuleTable`]. Any inconsistency is a [`RuleConfigurationError`]; the table
//! is only ever built at startup.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use figment::providers::{Format, Toml};
use figment::Figment;
use serde::Deserialize;

use zonerag_core::error::RuleConfigurationError;

use crate::clause::{Attribute, Clause, Op, Value, ValueKind};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRuleFile {
    #[serde(default, rename = "strategy")]
    pub strategies: Vec<RawStrategy>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawStrategy {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub citation_topics: Vec<String>,
    #[serde(default, rename = "clause")]
    pub clauses: Vec<RawClause>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawClause {
    pub attribute: String,
    pub op: String,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    #[serde(default)]
    pub thresholds: Option<BTreeMap<String, f64>>,
    #[serde(default)]
    pub any_of: Option<Vec<RawAlternative>>,
}

/// One alternative of an `any_of` clause; it tests the clause's attribute.
#[derive(Debug, Clone, Deserialize)]
pub struct RawAlternative {
    pub op: String,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

/// A named eligibility strategy: a conjunction of clauses plus the topics to
/// cite when explaining it.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyRule {
    pub name: String,
    pub description: String,
    pub citation_topics: Vec<String>,
    pub clauses: Vec<Clause>,
}

impl StrategyRule {
    /// Every attribute the predicate reads, in first-use order.
    pub fn referenced_attributes(&self) -> Vec<Attribute> {
        let mut seen = HashSet::new();
        self.clauses.iter().flat_map(Clause::attributes).filter(|a| seen.insert(*a)).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleTable {
    strategies: Vec<StrategyRule>,
}

impl RuleTable {
    pub fn from_toml_str(toml: &str) -> Result<Self, RuleConfigurationError> {
        Self::from_figment(Figment::from(Toml::string(toml)))
    }

    pub fn from_path(path: &Path) -> Result<Self, RuleConfigurationError> {
        if !path.is_file() {
            return Err(RuleConfigurationError::new(None, format!("rule file {} not found", path.display())));
        }
        Self::from_figment(Figment::from(Toml::file(path)))
    }

    fn from_figment(figment: Figment) -> Result<Self, RuleConfigurationError> {
        let raw: RawRuleFile = figment.extract().map_err(|e| RuleConfigurationError::new(None, e.to_string()))?;
        Self::from_raw(raw)
    }

    pub fn from_raw(raw: RawRuleFile) -> Result<Self, RuleConfigurationError> {
        let mut names = HashSet::new();
        let mut strategies = Vec::with_capacity(raw.strategies.len());
        for s in raw.strategies {
            let name = s.name.trim().to_string();
            if name.is_empty() {
                return Err(RuleConfigurationError::new(None, "strategy name is empty"));
            }
            if !names.insert(name.to_lowercase()) {
                return Err(RuleConfigurationError::new(Some(&name), "duplicate strategy name"));
            }
            let clauses =
                s.clauses.iter().map(|c| parse_clause(&name, c)).collect::<Result<Vec<_>, _>>()?;
            check_conflicts(&name, &clauses)?;
            let citation_topics = s
                .citation_topics
                .iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
            strategies.push(StrategyRule { name, description: s.description.trim().to_string(), citation_topics, clauses });
        }
        tracing::debug!(target: "rules", "loaded {} strategies", strategies.len());
        Ok(Self { strategies })
    }

    pub fn strategies(&self) -> &[StrategyRule] {
        &self.strategies
    }

    pub fn get(&self, name: &str) -> Option<&StrategyRule> {
        self.strategies.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Distinct citation topics across all strategies, in first-use order.
    pub fn citation_topics(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.strategies
            .iter()
            .flat_map(|s| s.citation_topics.iter())
            .filter(|t| seen.insert(t.as_str()))
            .cloned()
            .collect()
    }
}

fn parse_clause(rule: &str, raw: &RawClause) -> Result<Clause, RuleConfigurationError> {
    let err = |reason: String| RuleConfigurationError::new(Some(rule), reason);
    let attribute = Attribute::parse(&raw.attribute).ok_or_else(|| err(format!("unknown attribute '{}'", raw.attribute)))?;
    let op_name = raw.op.trim();

    match op_name {
        "gte_by_zoning" => {
            check_kind(attribute, op_name).map_err(err)?;
            let thresholds = raw
                .thresholds
                .clone()
                .filter(|t| !t.is_empty())
                .ok_or_else(|| err(format!("'{attribute} gte_by_zoning' needs a non-empty thresholds table")))?;
            if let Some((zone, t)) = thresholds.iter().find(|(_, t)| !t.is_finite()) {
                return Err(err(format!("threshold for zoning {zone} is not a number: {t}")));
            }
            let thresholds = thresholds.into_iter().map(|(k, v)| (k.trim().to_string(), v)).collect();
            Ok(Clause { attribute, op: Op::GteByZoning(thresholds) })
        }
        "any_of" => {
            let alternatives = raw
                .any_of
                .as_ref()
                .filter(|a| !a.is_empty())
                .ok_or_else(|| err(format!("'{attribute} any_of' needs a non-empty list of alternatives")))?;
            let ops = alternatives
                .iter()
                .map(|alt| match alt.op.trim() {
                    "any_of" | "gte_by_zoning" => Err(format!("'{attribute} any_of' cannot nest '{}'", alt.op.trim())),
                    name => parse_op(attribute, name, alt.value.as_ref()),
                })
                .collect::<Result<Vec<_>, _>>()
                .map_err(err)?;
            Ok(Clause { attribute, op: Op::AnyOf(ops) })
        }
        _ => Ok(Clause { attribute, op: parse_op(attribute, op_name, raw.value.as_ref()).map_err(err)? }),
    }
}

fn check_kind(attribute: Attribute, op_name: &str) -> Result<(), String> {
    if !Op::NAMES.contains(&op_name) {
        return Err(format!("unknown op '{op_name}'"));
    }
    let numeric_only = matches!(op_name, "gte" | "gt" | "lte" | "lt" | "gte_by_zoning");
    if numeric_only && attribute.kind() != ValueKind::Number {
        return Err(format!("op '{op_name}' needs a numeric attribute, '{attribute}' is not"));
    }
    if matches!(op_name, "prefix" | "contains") && attribute.kind() != ValueKind::Text {
        return Err(format!("op '{op_name}' needs a text attribute, '{attribute}' is not"));
    }
    Ok(())
}

/// Parse a single-operand op.
fn parse_op(attribute: Attribute, op_name: &str, operand: Option<&serde_json::Value>) -> Result<Op, String> {
    check_kind(attribute, op_name)?;
    let operand = operand.ok_or_else(|| format!("'{attribute} {op_name}' is missing its value"))?;
    let op = match op_name {
        "gte" | "gt" | "lte" | "lt" => {
            let Value::Number(n) = scalar(operand, attribute)? else {
                return Err(format!("'{attribute} {op_name}' needs a number"));
            };
            match op_name {
                "gte" => Op::Gte(n),
                "gt" => Op::Gt(n),
                "lte" => Op::Lte(n),
                _ => Op::Lt(n),
            }
        }
        "eq" => Op::Eq(scalar(operand, attribute)?),
        "ne" => Op::Ne(scalar(operand, attribute)?),
        "in" => {
            let items = operand.as_array().ok_or_else(|| format!("'{attribute} in' needs a list"))?;
            if items.is_empty() {
                return Err(format!("'{attribute} in' has an empty list"));
            }
            Op::In(items.iter().map(|v| scalar(v, attribute)).collect::<Result<Vec<_>, _>>()?)
        }
        "prefix" | "contains" => {
            let Value::Text(text) = scalar(operand, attribute)? else {
                return Err(format!("'{attribute} {op_name}' needs a string"));
            };
            if text.is_empty() {
                return Err(format!("'{attribute} {op_name}' is empty"));
            }
            if op_name == "prefix" {
                Op::Prefix(text)
            } else {
                Op::Contains(text)
            }
        }
        other => return Err(format!("op '{other}' needs more than a value")),
    };
    Ok(op)
}

/// Convert a TOML operand to a value of the attribute's type.
fn scalar(v: &serde_json::Value, attribute: Attribute) -> Result<Value, String> {
    let value = match v {
        serde_json::Value::String(s) => Value::Text(s.trim().to_string()),
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => match n.as_f64() {
            Some(f) if f.is_finite() => Value::Number(f),
            _ => return Err(format!("'{attribute}' operand {n} is not a finite number")),
        },
        other => return Err(format!("'{attribute}' operand {other} is not a scalar")),
    };
    if value.kind() != attribute.kind() {
        return Err(format!("'{attribute}' cannot be compared with {value}"));
    }
    Ok(value)
}

/// Reject clause sets that no property could satisfy.
fn check_conflicts(rule: &str, clauses: &[Clause]) -> Result<(), RuleConfigurationError> {
    let err = |reason: String| RuleConfigurationError::new(Some(rule), reason);
    for attribute in Attribute::ALL {
        let mut lower: Option<(f64, bool)> = None;
        let mut upper: Option<(f64, bool)> = None;
        let mut eq: Option<&Value> = None;
        let mut by_zoning: BTreeMap<&str, f64> = BTreeMap::new();

        for clause in clauses.iter().filter(|c| c.attribute == attribute) {
            match &clause.op {
                Op::Gte(v) => tighten_lower(&mut lower, *v, false),
                Op::Gt(v) => tighten_lower(&mut lower, *v, true),
                Op::Lte(v) => tighten_upper(&mut upper, *v, false),
                Op::Lt(v) => tighten_upper(&mut upper, *v, true),
                Op::Eq(v) => match eq {
                    Some(prev) if prev != v => {
                        return Err(err(format!("'{attribute}' must equal both {prev} and {v}")));
                    }
                    _ => eq = Some(v),
                },
                Op::GteByZoning(table) => {
                    for (zone, t) in table {
                        match by_zoning.insert(zone.as_str(), *t) {
                            Some(prev) if prev != *t => {
                                return Err(err(format!(
                                    "'{attribute}' has conflicting thresholds for zoning {zone}: {prev} and {t}"
                                )));
                            }
                            _ => {}
                        }
                    }
                }
                Op::Ne(_) | Op::In(_) | Op::Prefix(_) | Op::Contains(_) | Op::AnyOf(_) => {}
            }
        }

        if let (Some((lo, lo_strict)), Some((hi, hi_strict))) = (lower, upper) {
            if lo > hi || (lo == hi && (lo_strict || hi_strict)) {
                return Err(err(format!("'{attribute}' has an empty range: lower bound {lo}, upper bound {hi}")));
            }
        }
    }
    Ok(())
}

fn tighten_lower(bound: &mut Option<(f64, bool)>, v: f64, strict: bool) {
    let tighter = matches!(*bound, Some((cur, cur_strict)) if cur > v || (cur == v && cur_strict));
    if !tighter {
        *bound = Some((v, strict));
    }
}

fn tighten_upper(bound: &mut Option<(f64, bool)>, v: f64, strict: bool) {
    let tighter = matches!(*bound, Some((cur, cur_strict)) if cur < v || (cur == v && cur_strict));
    if !tighter {
        *bound = Some((v, strict));
    }
}
