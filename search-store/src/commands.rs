//! Commands run against a collection.

use std::future::Future;
use std::io::Write;

use clap::Subcommand;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::errors::AppError;
use search_store_repository::Model;
use search_store_shared::{SearchRequest, SourceMode};

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Create the versioned index and its alias unless it exists
    EnsureIndex,

    /// Count documents matching a query
    Count {
        /// Query as JSON (default: match_all)
        #[arg(short, long)]
        query: Option<String>,
    },

    /// Write matching documents to stdout as newline-delimited JSON
    Export {
        /// Query as JSON (default: match_all)
        #[arg(short, long)]
        query: Option<String>,

        /// Offset of the first document
        #[arg(long)]
        from: Option<u64>,

        /// Number of documents; every match when omitted
        #[arg(long)]
        size: Option<u64>,

        /// Only export these source fields
        #[arg(long, value_delimiter = ',')]
        fields: Vec<String>,
    },
}

/// Run `command` against `model`, writing its output to `out`.
pub async fn run<W: Write>(
    model: &Model<Value>,
    command: &Command,
    out: &mut W,
) -> Result<(), AppError> {
    match command {
        Command::EnsureIndex => {
            let created = model.ensure_index().await?;
            info!(
                index = %model.config().index_name(),
                alias = %model.alias(),
                created,
                "Index ensured"
            );
            writeln!(out, "{}", json!({ "index": model.config().index_name(), "created": created }))?;
        }
        Command::Count { query } => {
            let count = model.count(parse_query(query.as_deref())?).await?;
            writeln!(out, "{}", count)?;
        }
        Command::Export {
            query,
            from,
            size,
            fields,
        } => {
            let mut request =
                SearchRequest::new(json!({ "query": parse_query(query.as_deref())? }));
            if let Some(from) = from {
                request = request.from(*from);
            }
            if let Some(size) = size {
                request = request.size(*size);
            }
            if !fields.is_empty() {
                request = request.source(SourceMode::Fields(fields.clone()));
            }

            let window = model.search_hits(request).await?;
            for hit in &window.items {
                let line = serde_json::to_string(hit)
                    .map_err(|e| AppError::input(format!("Unserializable hit {}: {}", hit.id, e)))?;
                writeln!(out, "{}", line)?;
            }
            info!(
                exported = window.len(),
                total = ?window.total,
                calls = window.stats.calls,
                bytes = window.stats.bytes,
                "Export finished"
            );
        }
    }
    out.flush()?;
    Ok(())
}

/// Drive `command` to completion, even if `interrupt` resolves first.
///
/// Dropping a running search would leave its point-in-time cursor open on the
/// backend until the keep-alive expires, so an interrupt is only logged.
pub async fn run_to_completion<C, I>(command: C, interrupt: I) -> Result<(), AppError>
where
    C: Future<Output = Result<(), AppError>>,
    I: Future<Output = ()>,
{
    tokio::pin!(command);
    tokio::select! {
        result = &mut command => result,
        _ = interrupt => {
            warn!("Interrupt received, waiting for the running command to finish");
            command.await
        }
    }
}

/// Parse a JSON query argument, defaulting to `match_all`.
pub fn parse_query(raw: Option<&str>) -> Result<Value, AppError> {
    match raw {
        None => Ok(json!({ "match_all": {} })),
        Some(raw) => {
            let query: Value = serde_json::from_str(raw)
                .map_err(|e| AppError::input(format!("Query is not valid JSON: {}", e)))?;
            if !query.is_object() {
                return Err(AppError::input("Query must be a JSON object"));
            }
            Ok(query)
        }
    }
}
