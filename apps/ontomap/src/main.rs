//! # ontomap - RDF Persistence Administration
//!
//! Command line access to the stores an ontomap deployment writes to.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────┐
//! │          apps/ontomap (THE BINARY)             │
//! │                                                │
//! │   CLI (clap) ──▶ config (ontomap.toml)         │
//! │        │                                       │
//! │        ▼                                       │
//! │   ontomap-core (THE LOGIC)                     │
//! │        │                                       │
//! │        ▼                                       │
//! │   redb files / RDF4J server                    │
//! └────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! ontomap init
//! ontomap load ontology.nt --graph http://example.org/graphs/ontology
//! ontomap exists http://example.org/data/sample/1 --type http://example.org/onto#Sample
//! ontomap --json status
//! ```

mod cli;
mod config;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // ONTOMAP_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("ONTOMAP_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let cli = cli::Cli::parse();

    let default_filter = if cli.verbose {
        "ontomap=debug,ontomap_core=debug"
    } else {
        "ontomap=info,ontomap_core=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}
