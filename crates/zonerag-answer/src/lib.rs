//! zonerag-answer
//!
//! Turns retrieved excerpts and rule verdicts into a grounded prompt, and the
//! generator's reply into an answer with traceable evidence.

pub mod assemble;
pub mod explain;
pub mod generate;

pub use assemble::{
    answer, assemble, evidence_for, source_file_name, Answer, AssembledPrompt, Evidence, EVIDENCE_EXCERPT_CHARS,
    NO_EXCERPTS_ANSWER, SYSTEM_RULES,
};
pub use explain::{
    evidence_from_citations, explain_strategies, explain_strategy, strategy_prompt, StrategyExplanation,
    NO_CITATIONS_EXPLANATION, STRATEGY_RULES,
};
pub use generate::{GeminiGenerator, GenerationError, GenerationService};
