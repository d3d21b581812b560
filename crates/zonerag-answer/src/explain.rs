//! Per-strategy explanations: each verdict, its clause outcomes and the
//! excerpts cited for it go to the generator, which explains feasibility from
//! that text alone.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use zonerag_core::types::{Citation, PropertyContext};
use zonerag_rules::{Eligibility, StrategyVerdict};

use crate::assemble::{source_file_name, Evidence};
use crate::generate::{GenerationError, GenerationService};

pub const STRATEGY_RULES: &str = "You are a regulation analysis assistant. Analyze the provided regulation text and \
explain whether a development strategy is feasible.

Rules:
- Use ONLY the provided regulation text
- Cite page numbers and line numbers when referencing regulations
- If information is missing, say \"NOT FOUND\"
- Do not make legal claims beyond what the regulations state
- Be specific about requirements and constraints";

pub const NO_CITATIONS_EXPLANATION: &str =
    "NOT FOUND: no regulation excerpts were retrieved for this strategy, so the verdict rests on the rule table alone.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyExplanation {
    pub verdict: StrategyVerdict,
    pub explanation: String,
    pub evidence: Vec<Evidence>,
}

fn eligibility_label(verdict: &StrategyVerdict) -> String {
    match verdict.eligible {
        Eligibility::Yes => "ELIGIBLE".to_string(),
        Eligibility::No => "NOT ELIGIBLE".to_string(),
        Eligibility::Indeterminate => format!("UNDETERMINED (unknown: {})", verdict.missing_attributes.join(", ")),
    }
}

pub fn evidence_from_citations(citations: &[Citation]) -> Vec<Evidence> {
    citations
        .iter()
        .map(|c| Evidence {
            chunk_id: c.chunk_id.clone(),
            source_file: source_file_name(&c.source_document_id),
            page_number: c.page_number,
            line_range: c.line_range,
            score: c.score,
            excerpt: c.excerpt.clone(),
        })
        .collect()
}

pub fn strategy_prompt(verdict: &StrategyVerdict, ctx: &PropertyContext) -> String {
    let unknown = || "Unknown".to_string();
    let mut prompt = String::with_capacity(2048);
    prompt.push_str(STRATEGY_RULES);
    prompt.push_str("\n\nProperty Context:\n");
    let _ = writeln!(prompt, "- Address: {}", if ctx.address.trim().is_empty() { "Unknown" } else { ctx.address.as_str() });
    let _ = writeln!(prompt, "- City: {}", ctx.city().unwrap_or("Unknown"));
    let _ = writeln!(prompt, "- Zoning: {}", ctx.zoning_label().unwrap_or("Unknown"));
    let _ = writeln!(prompt, "- Lot Size: {} sqft", ctx.lot_size.map(|v| v.to_string()).unwrap_or_else(unknown));
    let _ = writeln!(prompt, "- Existing Units: {}", ctx.existing_units.map(|v| v.to_string()).unwrap_or_else(unknown));

    let _ = writeln!(prompt, "\nStrategy: {}", verdict.strategy_name);
    if !verdict.description.is_empty() {
        let _ = writeln!(prompt, "Description: {}", verdict.description);
    }
    let _ = writeln!(prompt, "Hard Rule Eligibility: {}", eligibility_label(verdict));
    let reasons: Vec<String> = verdict
        .matched_rule_clauses
        .iter()
        .map(|c| format!("met: {c}"))
        .chain(verdict.failed_rule_clauses.iter().map(|c| format!("not met: {c}")))
        .collect();
    let _ = writeln!(prompt, "Hard Rule Reasons: {}", if reasons.is_empty() { "none".to_string() } else { reasons.join("; ") });

    prompt.push_str("\nRelevant Regulations:\n");
    for (i, c) in verdict.supporting_citations.iter().enumerate() {
        let _ = write!(
            prompt,
            "\n--- Regulation Excerpt {} ---\nSource: {}\nPage: {}\nLines: {}\nText:\n{}\n",
            i + 1,
            source_file_name(&c.source_document_id),
            c.page_number,
            c.line_range,
            c.excerpt
        );
    }
    prompt.push_str(
        "\nPlease explain:\n\
         1. Why this strategy is or is not feasible based on the regulations\n\
         2. Specific requirements and constraints from the regulations\n\
         3. Cite page numbers for all claims\n\
         4. If information is missing, state \"NOT FOUND\" for that aspect\n",
    );
    prompt
}

/// Explain one verdict from its supporting citations. A verdict without
/// citations gets a fixed explanation and the generator is not called.
pub async fn explain_strategy(
    generator: &dyn GenerationService,
    verdict: &StrategyVerdict,
    ctx: &PropertyContext,
) -> Result<StrategyExplanation, GenerationError> {
    let evidence = evidence_from_citations(&verdict.supporting_citations);
    if evidence.is_empty() {
        tracing::info!(target: "answer", "{}: no citations; skipping explanation", verdict.strategy_name);
        return Ok(StrategyExplanation {
            verdict: verdict.clone(),
            explanation: NO_CITATIONS_EXPLANATION.to_string(),
            evidence,
        });
    }
    let prompt = strategy_prompt(verdict, ctx);
    tracing::debug!(
        target: "answer",
        "{}: explanation prompt {} chars, {} excerpts",
        verdict.strategy_name,
        prompt.len(),
        evidence.len()
    );
    let text = generator.generate(&prompt).await?;
    Ok(StrategyExplanation { verdict: verdict.clone(), explanation: text.trim().to_string(), evidence })
}

/// Explain every verdict in order; the first generation failure stops the run.
pub async fn explain_strategies(
    generator: &dyn GenerationService,
    verdicts: &[StrategyVerdict],
    ctx: &PropertyContext,
) -> Result<Vec<StrategyExplanation>, GenerationError> {
    let mut out = Vec::with_capacity(verdicts.len());
    for v in verdicts {
        out.push(explain_strategy(generator, v, ctx).await?);
    }
    Ok(out)
}
