use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Zoning regulation retrieval and eligibility checks
#[derive(Parser)]
#[command(
    name = "zonerag",
    version = env!("CARGO_PKG_VERSION"),
    about = "Index zoning regulations, retrieve cited excerpts and check development eligibility"
)]
pub struct Cli {
    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Chunk parsed documents, embed them and publish a new index
    Index {
        /// Directory of parsed-document JSON (overrides data.parsed_dir)
        #[arg(long, value_name = "DIR")]
        parsed_dir: Option<PathBuf>,
    },

    /// Search the index within one city
    Query {
        /// Query text
        text: String,

        /// City the property is in
        #[arg(long)]
        city: String,

        /// Zoning label to narrow the search
        #[arg(long)]
        zoning: Option<String>,

        /// Number of hits (overrides retrieval.top_k)
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Evaluate every strategy in the rule table for a property
    Evaluate {
        /// Property context as inline JSON or a path to a JSON file
        #[arg(long, value_name = "JSON")]
        property: String,

        /// Ask the generator to explain each verdict from its citations
        #[arg(long)]
        explain: bool,
    },

    /// Answer a question about a property from cited regulation text
    Ask {
        /// The question, e.g. "Can I build an ADU?"
        question: String,

        /// Property context as inline JSON or a path to a JSON file
        #[arg(long, value_name = "JSON")]
        property: String,

        /// Number of excerpts (overrides retrieval.top_k)
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Show configuration, index and rule table state
    Status,
}
