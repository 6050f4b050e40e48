//! # CLI Command Implementations

use crate::config::{AppConfig, AppError, Backend, DEFAULT_CONFIG};
use ontomap_core::store::read_ntriples;
use ontomap_core::{DocumentCollections, Repository};
use oxrdf::NamedNode;
use serde_json::json;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Maximum size of a file given to `load` (500 MB).
const MAX_LOAD_FILE_SIZE: u64 = 500 * 1024 * 1024;

/// Output flags shared by every command.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub json: bool,
    pub quiet: bool,
    pub verbose: bool,
}

impl Output {
    fn emit(&self, value: &serde_json::Value, text: impl FnOnce() -> String) {
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(value).unwrap_or_default()
            );
        } else if !self.quiet {
            println!("{}", text());
        }
    }
}

fn iri(value: &str) -> Result<NamedNode, AppError> {
    NamedNode::new(value).map_err(|e| AppError::Argument(format!("'{value}' is not an IRI: {e}")))
}

/// Canonicalize an input path and check it is a readable, bounded file.
fn validate_input_file(path: &Path, max_size: u64) -> Result<PathBuf, AppError> {
    let canonical = path.canonicalize().map_err(|e| AppError::io(path, e))?;
    if !canonical.is_file() {
        return Err(AppError::io(path, "not a regular file"));
    }
    let size = std::fs::metadata(&canonical)
        .map_err(|e| AppError::io(path, e))?
        .len();
    if size > max_size {
        return Err(AppError::io(
            path,
            format!("file size {size} bytes exceeds maximum allowed {max_size} bytes"),
        ));
    }
    Ok(canonical)
}

fn open(config_path: &Path) -> Result<(AppConfig, Backend), AppError> {
    let config = AppConfig::load(config_path)?;
    let backend = config.backend()?;
    tracing::debug!(
        config = %config_path.display(),
        backend = backend.connection().backend(),
        "stores opened"
    );
    Ok((config, backend))
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Write the default config next to the requested path and create the
/// embedded stores it names.
pub fn cmd_init(config_path: &Path, force: bool, output: Output) -> Result<(), AppError> {
    if config_path.exists() && !force {
        return Err(AppError::Config {
            path: config_path.to_path_buf(),
            message: "already exists, use --force to overwrite".to_string(),
        });
    }
    std::fs::write(config_path, DEFAULT_CONFIG).map_err(|e| AppError::io(config_path, e))?;

    let config = AppConfig::load(config_path)?;
    config.backend()?;
    config.documents()?;

    let triple_store = config
        .triple_store_path()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let document_store = config.document_store_path().display().to_string();
    output.emit(
        &json!({
            "config": config_path.display().to_string(),
            "triple_store": triple_store,
            "document_store": document_store,
        }),
        || {
            format!(
                "Initialized {}\n  triple store:   {triple_store}\n  document store: {document_store}",
                config_path.display()
            )
        },
    );
    Ok(())
}

// =============================================================================
// LOAD COMMAND
// =============================================================================

/// Insert the triples of an N-Triples file in one update.
pub fn cmd_load(
    config_path: &Path,
    file: &Path,
    graph: Option<&str>,
    output: Output,
) -> Result<(), AppError> {
    let graph = graph.map(iri).transpose()?;
    let path = validate_input_file(file, MAX_LOAD_FILE_SIZE)?;
    let reader = std::fs::File::open(&path).map_err(|e| AppError::io(&path, e))?;
    let triples = read_ntriples(BufReader::new(reader))?;
    if output.verbose {
        tracing::info!(file = %path.display(), triples = triples.len(), "parsed");
    }

    let (config, backend) = open(config_path)?;
    let service = config.service(&backend)?;
    let inserted = service.insert_triples(graph.as_ref(), triples)?;

    let target = graph
        .as_ref()
        .map(|g| g.as_str().to_string())
        .unwrap_or_else(|| "default graph".to_string());
    output.emit(
        &json!({ "file": path.display().to_string(), "graph": graph.as_ref().map(NamedNode::as_str), "inserted": inserted }),
        || format!("Loaded {inserted} triples into {target}"),
    );
    Ok(())
}

// =============================================================================
// INSPECTION COMMANDS
// =============================================================================

/// Print the triples with `uri` as subject, one N-Triples line each.
pub fn cmd_describe(config_path: &Path, uri: &str, output: Output) -> Result<(), AppError> {
    let uri = iri(uri)?;
    let (config, backend) = open(config_path)?;
    let triples = config.service(&backend)?.describe(&uri)?;

    let lines: Vec<String> = triples.iter().map(|t| format!("{t} .")).collect();
    output.emit(
        &json!({ "uri": uri.as_str(), "triples": lines }),
        || {
            if lines.is_empty() {
                format!("No triples for {uri}")
            } else {
                lines.join("\n")
            }
        },
    );
    Ok(())
}

pub fn cmd_exists(
    config_path: &Path,
    uri: &str,
    rdf_type: Option<&str>,
    output: Output,
) -> Result<(), AppError> {
    let uri = iri(uri)?;
    let rdf_type = rdf_type.map(iri).transpose()?;
    let (config, backend) = open(config_path)?;
    let service = config.service(&backend)?;
    let exists = match &rdf_type {
        Some(rdf_type) => service.exists_with_type(rdf_type, &uri)?,
        None => service.exists(&uri)?,
    };

    output.emit(
        &json!({
            "uri": uri.as_str(),
            "type": rdf_type.as_ref().map(NamedNode::as_str),
            "exists": exists,
        }),
        || match (&rdf_type, exists) {
            (Some(t), true) => format!("{uri} exists as {t}"),
            (Some(t), false) => format!("{uri} is not an instance of {t}"),
            (None, true) => format!("{uri} exists"),
            (None, false) => format!("{uri} does not exist"),
        },
    );
    Ok(())
}

// =============================================================================
// MAINTENANCE COMMANDS
// =============================================================================

pub fn cmd_clear_graph(config_path: &Path, graph: &str, output: Output) -> Result<(), AppError> {
    let graph = iri(graph)?;
    let (config, backend) = open(config_path)?;
    config.service(&backend)?.clear_graph(&graph)?;
    output.emit(&json!({ "cleared": graph.as_str() }), || {
        format!("Cleared graph {graph}")
    });
    Ok(())
}

/// Show the configured backend and, for embedded stores, their contents.
pub fn cmd_status(config_path: &Path, output: Output) -> Result<(), AppError> {
    let (config, backend) = open(config_path)?;
    let collections_ok = config.documents().is_ok();

    let (backend_name, location, quads, graphs) = match &backend {
        Backend::Embedded(store) => (
            "embedded",
            config
                .triple_store_path()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            Some(store.quad_count()),
            Some(store.graphs()),
        ),
        Backend::Rdf4j(connection) => ("rdf4j", connection.repository_url().to_string(), None, None),
    };
    let document_store = config.document_store_path().display().to_string();

    output.emit(
        &json!({
            "config": config_path.display().to_string(),
            "base_namespace": config.service.base_namespace,
            "backend": backend_name,
            "triple_store": location,
            "quads": quads,
            "named_graphs": graphs,
            "document_store": document_store,
            "document_store_ok": collections_ok,
        }),
        || {
            let mut text = String::from("ontomap Status\n==============\n");
            text.push_str(&format!("Config:         {}\n", config_path.display()));
            text.push_str(&format!("Namespace:      {}\n", config.service.base_namespace));
            text.push_str(&format!("Backend:        {backend_name}\n"));
            text.push_str(&format!("Triple store:   {location}\n"));
            if let Some(quads) = quads {
                text.push_str(&format!("Quads:          {quads}\n"));
            }
            if let Some(graphs) = &graphs {
                text.push_str(&format!("Named graphs:   {}\n", graphs.len()));
                for graph in graphs {
                    text.push_str(&format!("  {graph}\n"));
                }
            }
            text.push_str(&format!("Document store: {document_store}"));
            if !collections_ok {
                text.push_str(" (unreadable)");
            }
            text
        },
    );
    Ok(())
}

/// Print every document of a collection.
pub fn cmd_documents(config_path: &Path, collection: &str, output: Output) -> Result<(), AppError> {
    let config = AppConfig::load(config_path)?;
    let documents = config.documents()?.list(collection)?;

    let listed: serde_json::Map<String, serde_json::Value> = documents.into_iter().collect();
    output.emit(
        &json!({ "collection": collection, "count": listed.len(), "documents": listed }),
        || {
            let mut text = format!("{collection}: {} documents", listed.len());
            for (id, document) in &listed {
                text.push_str(&format!("\n  {id}: {document}"));
            }
            text
        },
    );
    Ok(())
}
