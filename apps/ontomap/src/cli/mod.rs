//! # ontomap CLI Module
//!
//! Administration commands over the stores named in `ontomap.toml`.
//!
//! ## Available Commands
//!
//! - `init` - Write a default config and create the embedded stores
//! - `load` - Insert the triples of an N-Triples file
//! - `describe` - Print every triple of a resource
//! - `exists` - Check that a resource exists, optionally with a type
//! - `clear-graph` - Remove every triple of a named graph
//! - `status` - Show backend and store statistics
//! - `documents` - List the documents of a collection

mod commands;

use crate::config::AppError;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// ontomap - typed RDF persistence, administration tool
#[derive(Parser, Debug)]
#[command(name = "ontomap")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = "ontomap.toml")]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress informational output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a default configuration and create the embedded stores
    Init {
        /// Overwrite an existing configuration file
        #[arg(short, long)]
        force: bool,
    },

    /// Load an N-Triples file into the triple store
    Load {
        /// Path to the N-Triples file
        file: PathBuf,

        /// Named graph receiving the triples (default graph if absent)
        #[arg(short, long)]
        graph: Option<String>,
    },

    /// Print every triple with the resource as subject
    Describe {
        /// Resource IRI
        uri: String,
    },

    /// Check whether a resource exists
    Exists {
        /// Resource IRI
        uri: String,

        /// Require the resource to be an instance of this class (or a subclass)
        #[arg(short = 't', long = "type")]
        rdf_type: Option<String>,
    },

    /// Remove every triple of a named graph
    ClearGraph {
        /// Graph IRI
        graph: String,
    },

    /// Show backend and store statistics
    Status,

    /// List the documents of a collection
    Documents {
        /// Collection name
        collection: String,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), AppError> {
    let output = Output {
        json: cli.json,
        quiet: cli.quiet,
        verbose: cli.verbose,
    };

    match cli.command {
        Some(Commands::Init { force }) => cmd_init(&cli.config, force, output),
        Some(Commands::Load { file, graph }) => {
            cmd_load(&cli.config, &file, graph.as_deref(), output)
        }
        Some(Commands::Describe { uri }) => cmd_describe(&cli.config, &uri, output),
        Some(Commands::Exists { uri, rdf_type }) => {
            cmd_exists(&cli.config, &uri, rdf_type.as_deref(), output)
        }
        Some(Commands::ClearGraph { graph }) => cmd_clear_graph(&cli.config, &graph, output),
        Some(Commands::Documents { collection }) => {
            cmd_documents(&cli.config, &collection, output)
        }
        Some(Commands::Status) | None => cmd_status(&cli.config, output),
    }
}
