use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use stratum::analysis::analyzer::StandardAnalyzer;
use stratum::document::document::Document;
use stratum::error::{Result, StratumError};
use stratum::index::reader::open_reader;
use stratum::index::writer::{IndexWriter, IndexWriterConfig};
use stratum::storage::memory::MemoryStorage;
use stratum::storage::structured::open_input;
use stratum::storage::{FileMetadata, Storage, StorageInput, StorageLock, StorageOutput};

/// A store whose deletes fail while `refuse_deletes` is set, the way an
/// open file blocks deletion on some platforms. While `refuse_postings` is
/// set, creating a `.prx` file fails as on a full disk.
#[derive(Debug)]
struct StubbornStorage {
    inner: MemoryStorage,
    refuse_deletes: AtomicBool,
    refuse_postings: AtomicBool,
}

impl StubbornStorage {
    fn new() -> Self {
        StubbornStorage {
            inner: MemoryStorage::new_default(),
            refuse_deletes: AtomicBool::new(false),
            refuse_postings: AtomicBool::new(false),
        }
    }
}

impl Storage for StubbornStorage {
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        self.inner.open_input(name)
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        if self.refuse_postings.load(Ordering::SeqCst) && name.ends_with(".prx") {
            return Err(StratumError::storage(format!("no space left for {name}")));
        }
        self.inner.create_output(name)
    }

    fn file_exists(&self, name: &str) -> bool {
        self.inner.file_exists(name)
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        if self.refuse_deletes.load(Ordering::SeqCst) {
            return Err(StratumError::storage(format!("{name} is in use")));
        }
        self.inner.delete_file(name)
    }

    fn list_files(&self) -> Result<Vec<String>> {
        self.inner.list_files()
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        self.inner.file_size(name)
    }

    fn metadata(&self, name: &str) -> Result<FileMetadata> {
        self.inner.metadata(name)
    }

    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()> {
        self.inner.rename_file(old_name, new_name)
    }

    fn try_lock(&self, name: &str) -> Result<Option<Box<dyn StorageLock>>> {
        self.inner.try_lock(name)
    }

    fn lock_exists(&self, name: &str) -> bool {
        self.inner.lock_exists(name)
    }

    fn close(&self) -> Result<()> {
        self.inner.close()
    }
}

fn read_deletable(storage: &dyn Storage) -> Vec<String> {
    let mut input = open_input(storage, "deletable").unwrap();
    let count = input.read_i32().unwrap();
    (0..count).map(|_| input.read_string().unwrap()).collect()
}

fn doc(i: usize) -> Document {
    Document::builder()
        .add_keyword("id", i.to_string())
        .add_text("body", "some body text")
        .build()
}

#[test]
fn test_failed_deletes_are_retried_on_next_merge() {
    let stubborn = Arc::new(StubbornStorage::new());
    let storage: Arc<dyn Storage> = stubborn.clone();

    let config = IndexWriterConfig {
        merge_factor: 2,
        create: true,
        ..Default::default()
    };
    let mut writer =
        IndexWriter::new(Arc::clone(&storage), Arc::new(StandardAnalyzer::new()), config).unwrap();

    stubborn.refuse_deletes.store(true, Ordering::SeqCst);
    // two durable segments of 2 merge into one of 4
    for i in 0..4 {
        writer.add_document(&doc(i)).unwrap();
    }
    let counts: Vec<u32> = writer.segment_infos().iter().map(|s| s.doc_count).collect();
    assert_eq!(counts, vec![4]);

    let pending = read_deletable(storage.as_ref());
    assert!(!pending.is_empty());
    assert!(pending.iter().all(|file| storage.file_exists(file)));

    stubborn.refuse_deletes.store(false, Ordering::SeqCst);
    for i in 4..6 {
        writer.add_document(&doc(i)).unwrap();
    }
    assert!(read_deletable(storage.as_ref()).is_empty());
    assert!(pending.iter().all(|file| !storage.file_exists(file)));
    writer.close().unwrap();

    let mut reader = open_reader(storage).unwrap();
    assert_eq!(reader.num_docs(), 6);
    reader.close().unwrap();
}

fn sorted_files(storage: &dyn Storage) -> Vec<String> {
    let mut files = storage.list_files().unwrap();
    files.sort();
    files
}

fn read_segments(storage: &dyn Storage) -> Vec<u8> {
    let mut input = open_input(storage, "segments").unwrap();
    let size = input.size() as usize;
    input.read_raw(size).unwrap()
}

#[test]
fn test_failed_merge_removes_partial_segment() {
    let stubborn = Arc::new(StubbornStorage::new());
    let storage: Arc<dyn Storage> = stubborn.clone();

    let config = IndexWriterConfig {
        merge_factor: 2,
        create: true,
        ..Default::default()
    };
    let mut writer =
        IndexWriter::new(Arc::clone(&storage), Arc::new(StandardAnalyzer::new()), config).unwrap();
    writer.add_document(&doc(0)).unwrap();
    writer.add_document(&doc(1)).unwrap();
    assert_eq!(writer.segment_count(), 1);

    let segments_before = read_segments(storage.as_ref());
    let files_before = sorted_files(storage.as_ref());

    stubborn.refuse_postings.store(true, Ordering::SeqCst);
    writer.add_document(&doc(2)).unwrap();
    let err = writer.add_document(&doc(3)).unwrap_err();
    assert!(matches!(err, StratumError::Storage(_)));

    assert_eq!(read_segments(storage.as_ref()), segments_before);
    assert_eq!(sorted_files(storage.as_ref()), files_before);
    assert_eq!(writer.segment_count(), 3);

    stubborn.refuse_postings.store(false, Ordering::SeqCst);
    writer.add_document(&doc(4)).unwrap();
    writer.close().unwrap();

    let mut reader = open_reader(storage).unwrap();
    assert_eq!(reader.num_docs(), 5);
    reader.close().unwrap();
}
