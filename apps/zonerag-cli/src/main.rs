mod args;
mod commands;
mod logging;

use clap::Parser;

use zonerag_core::config::Config;

use crate::args::{Cli, Commands};
use crate::commands::App;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = match Config::load().and_then(|c| c.settings()) {
        Ok(s) => s,
        Err(e) => {
            logging::init();
            tracing::error!("error loading config: {e:#}");
            return Err(e);
        }
    };
    logging::init_with_config(&settings.logging);

    let app = App { settings, base: std::env::current_dir()?, json: cli.json };
    match cli.command {
        Commands::Index { parsed_dir } => commands::index(&app, parsed_dir).await,
        Commands::Query { text, city, zoning, k } => commands::query(&app, &text, &city, zoning.as_deref(), k).await,
        Commands::Evaluate { property, explain } => commands::evaluate_property(&app, &property, explain).await,
        Commands::Ask { question, property, k } => commands::ask(&app, &question, &property, k).await,
        Commands::Status => commands::status(&app),
    }
}
