//! Output formatting for CLI commands.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cli::args::{OutputFormat, StratumArgs};
use crate::error::Result;

/// Result of a bulk indexing run.
#[derive(Debug, Serialize, Deserialize)]
pub struct IndexingResult {
    pub documents_added: usize,
    pub segments: usize,
    pub duration_ms: u64,
    pub docs_per_second: f64,
}

/// Result structure for index optimization.
#[derive(Debug, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub segments_before: usize,
    pub segments_after: usize,
    pub duration_ms: u64,
}

/// Per-segment statistics.
#[derive(Debug, Serialize, Deserialize)]
pub struct SegmentStats {
    pub name: String,
    pub doc_count: u32,
    pub has_deletions: bool,
}

/// Index statistics.
#[derive(Debug, Serialize, Deserialize)]
pub struct IndexStats {
    pub live_documents: u32,
    pub max_doc: u32,
    pub deleted_documents: u32,
    pub total_terms: u64,
    pub index_size_bytes: u64,
    pub segments: Vec<SegmentStats>,
    pub field_terms: Option<BTreeMap<String, u64>>,
}

/// Result of deleting by term.
#[derive(Debug, Serialize, Deserialize)]
pub struct DeletionResult {
    pub field: String,
    pub text: String,
    pub documents_deleted: u32,
}

/// Result of merging indexes.
#[derive(Debug, Serialize, Deserialize)]
pub struct AddIndexesResult {
    pub sources: usize,
    pub documents: u64,
    pub duration_ms: u64,
}

/// Output a result in the specified format.
pub fn output_result<T: Serialize>(message: &str, result: &T, args: &StratumArgs) -> Result<()> {
    match args.output_format {
        OutputFormat::Human => output_human(message, result, args),
        OutputFormat::Json => output_json(result, args),
    }
}

/// Output in human-readable format.
fn output_human<T: Serialize>(message: &str, result: &T, args: &StratumArgs) -> Result<()> {
    if args.verbosity() > 0 {
        println!("{message}");
        println!();
    }

    let value = serde_json::to_value(result)?;
    print_value_human(&value, 0);
    Ok(())
}

fn print_value_human(value: &serde_json::Value, indent: usize) {
    let pad = "  ".repeat(indent);
    match value {
        serde_json::Value::Object(map) => {
            for (key, value) in map {
                let label = key.replace('_', " ");
                match value {
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        println!("{pad}{label}:");
                        print_value_human(value, indent + 1);
                    }
                    serde_json::Value::Null => {}
                    _ => println!("{pad}{label}: {}", scalar(value)),
                }
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                match item {
                    serde_json::Value::Object(map) => {
                        let line: Vec<String> = map
                            .iter()
                            .map(|(k, v)| format!("{k}={}", scalar(v)))
                            .collect();
                        println!("{pad}- {}", line.join(" "));
                    }
                    _ => println!("{pad}- {}", scalar(item)),
                }
            }
        }
        _ => println!("{pad}{}", scalar(value)),
    }
}

fn scalar(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() => format!("{f:.2}"),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// Output in JSON format.
fn output_json<T: Serialize>(result: &T, args: &StratumArgs) -> Result<()> {
    let json = if args.pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };
    println!("{json}");
    Ok(())
}
