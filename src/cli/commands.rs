//! Command implementations for the Stratum CLI.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, UNIX_EPOCH};

use anyhow::Context;
use log::{debug, info};

use crate::analysis::analyzer::StandardAnalyzer;
use crate::cli::args::*;
use crate::cli::output::*;
use crate::document::document::Document;
use crate::error::{Result, StratumError};
use crate::index::lock::with_commit_lock;
use crate::index::reader::open_reader;
use crate::index::segment_infos::{SEGMENTS_FILE, SegmentInfos};
use crate::index::segment_reader::SegmentReader;
use crate::index::term::Term;
use crate::index::writer::{IndexWriter, IndexWriterConfig};
use crate::storage::file::FileStorageConfig;
use crate::storage::{Storage, StorageConfig, StorageFactory};

/// Execute a CLI command.
pub fn execute_command(args: StratumArgs) -> Result<()> {
    match &args.command {
        Command::Index(index_args) => index_documents(index_args.clone(), &args),
        Command::Optimize(optimize_args) => optimize_index(optimize_args.clone(), &args),
        Command::Stats(stats_args) => show_stats(stats_args.clone(), &args),
        Command::Delete(delete_args) => delete_documents(delete_args.clone(), &args),
        Command::AddIndexes(add_args) => add_indexes(add_args.clone(), &args),
    }
}

/// Open an index directory, creating it if needed.
fn open_storage(path: &Path) -> Result<Arc<dyn Storage>> {
    StorageFactory::create(StorageConfig::File(FileStorageConfig::new(path)))
}

/// Open an index directory that must already exist.
fn open_existing_storage(path: &Path) -> Result<Arc<dyn Storage>> {
    if !path.is_dir() {
        return Err(StratumError::invalid_argument(format!(
            "'{}' is not an index directory",
            path.display()
        )));
    }
    open_storage(path)
}

fn open_writer(storage: Arc<dyn Storage>, mut config: IndexWriterConfig) -> Result<IndexWriter> {
    if !storage.file_exists(SEGMENTS_FILE) {
        config.create = true;
    }
    IndexWriter::new(storage, Arc::new(StandardAnalyzer::new()), config)
}

/// Index a file or a directory tree of `.txt` files.
fn index_documents(args: IndexArgs, cli_args: &StratumArgs) -> Result<()> {
    let config = load_config(&args)?;

    if cli_args.verbosity() > 1 {
        println!("Indexing {} into {}", args.source.display(), args.index_path.display());
    }

    let start_time = Instant::now();
    let mut writer = open_writer(open_storage(&args.index_path)?, config)?;
    let documents_added = index_path(&mut writer, &args.source)?;
    if !args.no_optimize {
        writer.optimize()?;
    }
    let segments = writer.segment_count();
    writer.close()?;

    let duration = start_time.elapsed();
    output_result(
        "Documents indexed successfully",
        &IndexingResult {
            documents_added,
            segments,
            duration_ms: duration.as_millis() as u64,
            docs_per_second: if duration.as_secs_f64() > 0.0 {
                documents_added as f64 / duration.as_secs_f64()
            } else {
                0.0
            },
        },
        cli_args,
    )
}

/// Writer configuration from the optional JSON file plus command line
/// overrides.
pub fn load_config(args: &IndexArgs) -> Result<IndexWriterConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            IndexWriterConfig::from_json(&json)?
        }
        None => IndexWriterConfig::default(),
    };
    config.create |= args.create;
    if let Some(merge_factor) = args.merge_factor {
        config.merge_factor = merge_factor;
        config.validate()?;
    }
    Ok(config)
}

/// Index `path`, which must be a file or a directory.
pub fn index_path(writer: &mut IndexWriter, path: &Path) -> Result<usize> {
    if path.is_file() {
        writer.add_document(&file_document(path)?)?;
        Ok(1)
    } else if path.is_dir() {
        index_directory(writer, path)
    } else {
        Err(StratumError::invalid_argument(format!(
            "'{}' is not a valid file or directory",
            path.display()
        )))
    }
}

/// Index the `.txt` files of `dir`, then recurse into its subdirectories.
fn index_directory(writer: &mut IndexWriter, dir: &Path) -> Result<usize> {
    let mut files: Vec<PathBuf> = Vec::new();
    let mut subdirs: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            subdirs.push(path);
        } else if path.extension().is_some_and(|ext| ext == "txt") {
            files.push(path);
        }
    }
    files.sort();
    subdirs.sort();

    let mut count = 0;
    for file in &files {
        debug!("indexing {}", file.display());
        writer.add_document(&file_document(file)?)?;
        count += 1;
    }
    for subdir in &subdirs {
        count += index_directory(writer, subdir)?;
    }
    Ok(count)
}

/// Build the document for a text file: its path, modification time and
/// contents.
pub fn file_document(path: &Path) -> Result<Document> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let contents = String::from_utf8_lossy(&bytes).into_owned();
    let modified = fs::metadata(path)?
        .modified()
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);

    Ok(Document::builder()
        .add_keyword("path", path.display().to_string())
        .add_keyword("modified", modified.to_string())
        .add_unstored("contents", contents)
        .build())
}

/// Optimize an index.
fn optimize_index(args: OptimizeArgs, cli_args: &StratumArgs) -> Result<()> {
    if cli_args.verbosity() > 1 {
        println!("Optimizing index: {}", args.index_path.display());
    }

    let start_time = Instant::now();
    let storage = open_existing_storage(&args.index_path)?;
    let mut writer = IndexWriter::new(
        storage,
        Arc::new(StandardAnalyzer::new()),
        IndexWriterConfig::default(),
    )?;
    let segments_before = writer.segment_count();
    writer.optimize()?;
    let segments_after = writer.segment_count();
    writer.close()?;

    output_result(
        "Index optimized successfully",
        &OptimizationResult {
            segments_before,
            segments_after,
            duration_ms: start_time.elapsed().as_millis() as u64,
        },
        cli_args,
    )
}

/// Show index statistics.
fn show_stats(args: StatsArgs, cli_args: &StratumArgs) -> Result<()> {
    let storage = open_existing_storage(&args.index_path)?;
    let stats = collect_stats(&storage, args.detailed)?;
    output_result("Index statistics", &stats, cli_args)
}

/// Gather statistics for the index in `storage`.
pub fn collect_stats(storage: &Arc<dyn Storage>, detailed: bool) -> Result<IndexStats> {
    let infos = with_commit_lock(storage.as_ref(), || SegmentInfos::read(Arc::clone(storage)))?;
    let segments = infos
        .iter()
        .map(|info| SegmentStats {
            name: info.name.clone(),
            doc_count: info.doc_count,
            has_deletions: SegmentReader::has_deletions_in(info),
        })
        .collect();

    let mut reader = open_reader(Arc::clone(storage))?;
    let mut total_terms = 0u64;
    let mut field_terms: BTreeMap<String, u64> = BTreeMap::new();
    let mut terms = reader.terms()?;
    while terms.next()? {
        total_terms += 1;
        if detailed && let Some(term) = terms.term() {
            *field_terms.entry(term.field.clone()).or_default() += 1;
        }
    }
    let live_documents = reader.num_docs();
    let max_doc = reader.max_doc();
    reader.close()?;

    let mut index_size_bytes = 0;
    for file in storage.list_files()? {
        index_size_bytes += storage.file_size(&file)?;
    }

    Ok(IndexStats {
        live_documents,
        max_doc,
        deleted_documents: max_doc - live_documents,
        total_terms,
        index_size_bytes,
        segments,
        field_terms: detailed.then_some(field_terms),
    })
}

/// Delete every document containing a term.
fn delete_documents(args: DeleteArgs, cli_args: &StratumArgs) -> Result<()> {
    let storage = open_existing_storage(&args.index_path)?;
    let term = Term::new(args.field.clone(), args.text.clone());
    let documents_deleted = delete_by_term(storage, &term)?;
    info!("deleted {documents_deleted} documents containing {term}");

    output_result(
        "Documents deleted",
        &DeletionResult {
            field: args.field,
            text: args.text,
            documents_deleted,
        },
        cli_args,
    )
}

/// Mark every live document containing `term` deleted. Returns the count.
pub fn delete_by_term(storage: Arc<dyn Storage>, term: &Term) -> Result<u32> {
    let mut reader = open_reader(storage)?;
    let mut docs = Vec::new();
    let mut positions = reader.term_positions(term)?;
    while positions.next()? {
        docs.push(positions.doc());
    }
    drop(positions);

    for &doc in &docs {
        reader.delete(doc)?;
    }
    reader.close()?;
    Ok(docs.len() as u32)
}

/// Merge other indexes into an index.
fn add_indexes(args: AddIndexesArgs, cli_args: &StratumArgs) -> Result<()> {
    let start_time = Instant::now();
    let stores = args
        .sources
        .iter()
        .map(|path| open_existing_storage(path))
        .collect::<Result<Vec<_>>>()?;

    let mut writer = open_writer(open_storage(&args.index_path)?, IndexWriterConfig::default())?;
    writer.add_indexes(&stores)?;
    let documents = writer.doc_count();
    writer.close()?;

    output_result(
        "Indexes merged successfully",
        &AddIndexesResult {
            sources: stores.len(),
            documents,
            duration_ms: start_time.elapsed().as_millis() as u64,
        },
        cli_args,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, contents: &str) {
        if let Some(parent) = dir.join(name).parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(dir.join(name), contents).unwrap();
    }

    fn writer_for(dir: &Path) -> IndexWriter {
        open_writer(open_storage(dir).unwrap(), IndexWriterConfig::default()).unwrap()
    }

    #[test]
    fn test_index_directory_tree() {
        let docs = TempDir::new().unwrap();
        write_file(docs.path(), "a.txt", "alpha bravo");
        write_file(docs.path(), "skip.md", "not indexed");
        write_file(docs.path(), "sub/b.txt", "bravo charlie");
        write_file(docs.path(), "sub/deeper/c.txt", "charlie delta");

        let index = TempDir::new().unwrap();
        let mut writer = writer_for(index.path());
        assert_eq!(index_path(&mut writer, docs.path()).unwrap(), 3);
        writer.close().unwrap();

        let storage = open_storage(index.path()).unwrap();
        let stats = collect_stats(&storage, true).unwrap();
        assert_eq!(stats.live_documents, 3);
        assert_eq!(stats.deleted_documents, 0);
        let field_terms = stats.field_terms.unwrap();
        assert_eq!(field_terms["contents"], 4);
        assert_eq!(field_terms["path"], 3);
    }

    #[test]
    fn test_invalid_source_path() {
        let index = TempDir::new().unwrap();
        let mut writer = writer_for(index.path());
        let missing = index.path().join("does-not-exist");
        let err = index_path(&mut writer, &missing).unwrap_err();
        assert!(matches!(err, StratumError::InvalidArgument(_)));
        writer.close().unwrap();
    }

    #[test]
    fn test_delete_by_term() {
        let docs = TempDir::new().unwrap();
        write_file(docs.path(), "a.txt", "shared unique");
        write_file(docs.path(), "b.txt", "shared");

        let index = TempDir::new().unwrap();
        let mut writer = writer_for(index.path());
        index_path(&mut writer, docs.path()).unwrap();
        writer.close().unwrap();

        let storage = open_storage(index.path()).unwrap();
        let deleted = delete_by_term(Arc::clone(&storage), &Term::new("contents", "unique")).unwrap();
        assert_eq!(deleted, 1);

        let stats = collect_stats(&storage, false).unwrap();
        assert_eq!(stats.live_documents, 1);
        assert_eq!(stats.deleted_documents, 1);
        assert!(stats.segments.iter().any(|s| s.has_deletions));
    }

    fn index_args(config: Option<PathBuf>, merge_factor: Option<u32>) -> IndexArgs {
        IndexArgs {
            index_path: PathBuf::from("unused"),
            source: PathBuf::from("unused"),
            create: false,
            config,
            merge_factor,
            no_optimize: false,
        }
    }

    #[test]
    fn test_load_config() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "config.json", r#"{"merge_factor": 4, "max_field_length": 50}"#);

        let config = load_config(&index_args(Some(dir.path().join("config.json")), None)).unwrap();
        assert_eq!(config.merge_factor, 4);
        assert_eq!(config.max_field_length, 50);

        let config = load_config(&index_args(Some(dir.path().join("config.json")), Some(20))).unwrap();
        assert_eq!(config.merge_factor, 20);

        assert!(load_config(&index_args(None, Some(1))).is_err());

        let err = load_config(&index_args(Some(dir.path().join("missing.json")), None)).unwrap_err();
        assert!(matches!(err, StratumError::Anyhow(_)));
        assert!(err.to_string().contains("missing.json"));
    }

    #[test]
    fn test_file_document_fields() {
        let docs = TempDir::new().unwrap();
        write_file(docs.path(), "a.txt", "hello");
        let doc = file_document(&docs.path().join("a.txt")).unwrap();
        assert!(doc.get("path").unwrap().ends_with("a.txt"));
        assert!(doc.get("modified").is_some());
        assert!(!doc.get_field("contents").unwrap().is_stored());
    }
}
