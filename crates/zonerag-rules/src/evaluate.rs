use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use zonerag_core::traits::CitationSource;
use zonerag_core::types::{Citation, PropertyContext};

use crate::clause::{Attribute, ClauseOutcome};
use crate::table::{RuleTable, StrategyRule};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Eligibility {
    Yes,
    No,
    /// A referenced property attribute is unknown.
    Indeterminate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyVerdict {
    pub strategy_name: String,
    pub description: String,
    pub eligible: Eligibility,
    pub matched_rule_clauses: Vec<String>,
    pub failed_rule_clauses: Vec<String>,
    pub missing_attributes: Vec<String>,
    pub supporting_citations: Vec<Citation>,
}

/// One verdict per strategy, in table order.
///
/// Total over any property context: unknown attributes make a verdict
/// `Indeterminate`, even when another clause already fails.
pub fn evaluate(ctx: &PropertyContext, rules: &RuleTable, citations: &dyn CitationSource) -> Vec<StrategyVerdict> {
    rules.strategies().iter().map(|rule| evaluate_rule(ctx, rule, citations)).collect()
}

pub fn evaluate_rule(ctx: &PropertyContext, rule: &StrategyRule, citations: &dyn CitationSource) -> StrategyVerdict {
    let mut matched = Vec::new();
    let mut failed = Vec::new();
    let mut missing: Vec<Attribute> = Vec::new();
    for clause in &rule.clauses {
        match clause.evaluate(ctx) {
            ClauseOutcome::Pass(d) => matched.push(d),
            ClauseOutcome::Fail(d) => failed.push(d),
            ClauseOutcome::Missing(attrs) => {
                for a in attrs {
                    if !missing.contains(&a) {
                        missing.push(a);
                    }
                }
            }
        }
    }

    let eligible = if !missing.is_empty() {
        Eligibility::Indeterminate
    } else if failed.is_empty() {
        Eligibility::Yes
    } else {
        Eligibility::No
    };

    let mut seen = HashSet::new();
    let supporting_citations: Vec<Citation> = rule
        .citation_topics
        .iter()
        .flat_map(|topic| citations.citations_for(topic).iter())
        .filter(|c| seen.insert(c.chunk_id.clone()))
        .cloned()
        .collect();

    tracing::debug!(
        target: "rules",
        "{}: {:?} ({} matched, {} failed, {} missing, {} citations)",
        rule.name,
        eligible,
        matched.len(),
        failed.len(),
        missing.len(),
        supporting_citations.len()
    );

    StrategyVerdict {
        strategy_name: rule.name.clone(),
        description: rule.description.clone(),
        eligible,
        matched_rule_clauses: matched,
        failed_rule_clauses: failed,
        missing_attributes: missing.into_iter().map(|a| a.name().to_string()).collect(),
        supporting_citations,
    }
}

/// A citation source with nothing in it.
pub struct NoCitations;

impl CitationSource for NoCitations {
    fn citations_for(&self, _topic: &str) -> &[Citation] {
        &[]
    }
}
