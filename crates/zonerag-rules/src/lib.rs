//! zonerag-rules
//!
//! Static eligibility rules and their evaluation. Evaluation is a pure
//! function of the property context, the rule table and pre-fetched
//! citations; configuration errors surface once, when the table is loaded.

use std::path::Path;

use zonerag_core::error::RuleConfigurationError;

pub mod clause;
pub mod defaults;
pub mod evaluate;
pub mod table;

pub use clause::{Attribute, Clause, ClauseOutcome, Op, Value};
pub use evaluate::{evaluate, evaluate_rule, Eligibility, NoCitations, StrategyVerdict};
pub use table::{RawRuleFile, RuleTable, StrategyRule};

/// Load the rule table at `path`, or the built-in rules when `path` is `None`.
pub fn load_rules(path: Option<&Path>) -> Result<RuleTable, RuleConfigurationError> {
    match path {
        Some(p) => {
            let table = RuleTable::from_path(p)?;
            tracing::info!(target: "rules", "loaded {} strategies from {}", table.strategies().len(), p.display());
            Ok(table)
        }
        None => RuleTable::builtin(),
    }
}
