//! Grounded prompt assembly and the answer flow around it.
//!
//! The prompt carries the property facts, the rule verdicts and every
//! retrieved excerpt with its source file, page and line range. The model is
//! told to answer from that text alone and to mark gaps as "NOT FOUND".

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use zonerag_core::types::{LineRange, PropertyContext, ScoredChunk};
use zonerag_rules::StrategyVerdict;

use crate::generate::{GenerationError, GenerationService};

pub const EVIDENCE_EXCERPT_CHARS: usize = 500;

pub const NO_EXCERPTS_ANSWER: &str = "No relevant regulation excerpts were found for your property and question. \
Check that the address is in a supported city and that the regulation index has been built.";

pub const SYSTEM_RULES: &str = "You are a regulation Q&A assistant. Answer the user's question using ONLY the provided \
property information, eligibility verdicts and regulation excerpts.

RULES:
1. Use ONLY the provided regulation text. Do not use outside knowledge.
2. Cite the source of every claim or requirement: file name, page number and line range \
(e.g. \"Source: SF_Zoning.pdf, Page 10, Lines 1-15\").
3. If part of the answer is not in the provided text, say \"NOT FOUND in the provided regulations\" for that part.
4. Do not give legal advice; only summarize what the regulations state.
5. Quote exact numbers (lot size, setbacks, unit counts) and cite where they come from.";

/// Where an excerpt came from, for display next to the answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub chunk_id: String,
    pub source_file: String,
    pub page_number: u32,
    pub line_range: LineRange,
    pub score: f32,
    pub excerpt: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssembledPrompt {
    pub prompt: String,
    pub evidence: Vec<Evidence>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub evidence: Vec<Evidence>,
    pub verdicts: Vec<StrategyVerdict>,
}

/// Display name of a source document: its id with a `.pdf` suffix.
pub fn source_file_name(document_id: &str) -> String {
    let id = document_id.trim();
    if id.is_empty() {
        "Unknown".to_string()
    } else if id.to_ascii_lowercase().ends_with(".pdf") {
        id.to_string()
    } else {
        format!("{id}.pdf")
    }
}

pub fn evidence_for(hits: &[ScoredChunk]) -> Vec<Evidence> {
    hits.iter()
        .map(|h| Evidence {
            chunk_id: h.chunk.id.clone(),
            source_file: source_file_name(&h.chunk.source_document_id),
            page_number: h.chunk.page_number,
            line_range: h.chunk.line_range,
            score: h.score,
            excerpt: h.chunk.preview(EVIDENCE_EXCERPT_CHARS).to_string(),
        })
        .collect()
}

pub fn assemble(
    question: &str,
    ctx: &PropertyContext,
    verdicts: &[StrategyVerdict],
    hits: &[ScoredChunk],
) -> AssembledPrompt {
    let mut prompt = String::with_capacity(4096);
    prompt.push_str(SYSTEM_RULES);
    prompt.push_str("\n\nProperty information:\n");
    let unknown = || "Unknown".to_string();
    let _ = writeln!(prompt, "- Address: {}", if ctx.address.trim().is_empty() { "Unknown" } else { ctx.address.as_str() });
    let _ = writeln!(prompt, "- City: {}", ctx.city().unwrap_or("Unknown"));
    let _ = writeln!(prompt, "- Zoning: {}", ctx.zoning_label().unwrap_or("Unknown"));
    let _ = writeln!(prompt, "- Lot size: {} sqft", ctx.lot_size.map(|v| v.to_string()).unwrap_or_else(unknown));
    let _ = writeln!(prompt, "- Existing units: {}", ctx.existing_units.map(|v| v.to_string()).unwrap_or_else(unknown));
    let _ = writeln!(prompt, "- Historic: {}", ctx.is_historic.map(|v| v.to_string()).unwrap_or_else(unknown));

    if !verdicts.is_empty() {
        prompt.push_str("\nEligibility verdicts from the rule table:\n");
        for v in verdicts {
            let _ = writeln!(prompt, "- {}: {:?}", v.strategy_name, v.eligible);
            if !v.matched_rule_clauses.is_empty() {
                let _ = writeln!(prompt, "  met: {}", v.matched_rule_clauses.join("; "));
            }
            if !v.failed_rule_clauses.is_empty() {
                let _ = writeln!(prompt, "  not met: {}", v.failed_rule_clauses.join("; "));
            }
            if !v.missing_attributes.is_empty() {
                let _ = writeln!(prompt, "  unknown: {}", v.missing_attributes.join(", "));
            }
        }
    }

    let _ = writeln!(prompt, "\nUser question: {}", question.trim());
    prompt.push_str("\nRelevant regulation excerpts (with source file, page and line info):\n");
    for (i, h) in hits.iter().enumerate() {
        let _ = write!(
            prompt,
            "\n--- Source {} ---\nSource file: {}\nPage: {}\nLines: {}\nText:\n{}\n",
            i + 1,
            source_file_name(&h.chunk.source_document_id),
            h.chunk.page_number,
            h.chunk.line_range,
            h.chunk.text
        );
    }
    prompt.push_str(
        "\nProvide a clear answer that:\n\
         1. Directly addresses the user's question.\n\
         2. Cites source file name, page and line numbers for every factual claim.\n\
         3. Notes when information is missing from the provided excerpts.\n",
    );

    AssembledPrompt { prompt, evidence: evidence_for(hits) }
}

/// Answer `question` from `hits`. With no hits the generator is not called.
pub async fn answer(
    generator: &dyn GenerationService,
    question: &str,
    ctx: &PropertyContext,
    verdicts: Vec<StrategyVerdict>,
    hits: &[ScoredChunk],
) -> Result<Answer, GenerationError> {
    if hits.is_empty() {
        tracing::info!(target: "answer", "no excerpts for '{}'; returning canned answer", question.trim());
        return Ok(Answer { answer: NO_EXCERPTS_ANSWER.to_string(), evidence: Vec::new(), verdicts });
    }
    let assembled = assemble(question, ctx, &verdicts, hits);
    tracing::debug!(
        target: "answer",
        "prompt: {} chars, {} excerpts, model {}",
        assembled.prompt.len(),
        assembled.evidence.len(),
        generator.model()
    );
    let text = generator.generate(&assembled.prompt).await?;
    Ok(Answer { answer: text.trim().to_string(), evidence: assembled.evidence, verdicts })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_file_names() {
        assert_eq!(source_file_name("SF_Zoning"), "SF_Zoning.pdf");
        assert_eq!(source_file_name("oakland_adu.PDF"), "oakland_adu.PDF");
        assert_eq!(source_file_name(" "), "Unknown");
    }
}
