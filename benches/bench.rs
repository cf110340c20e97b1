//! Criterion benchmarks for Stratum.
//!
//! Covers text analysis, document indexing with incremental merges,
//! optimize, and term dictionary lookups.

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BatchSize, Criterion, Throughput, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use stratum::analysis::analyzer::{Analyzer, StandardAnalyzer};
use stratum::document::document::Document;
use stratum::index::reader::open_reader;
use stratum::index::term::Term;
use stratum::index::writer::{IndexWriter, IndexWriterConfig};
use stratum::storage::Storage;
use stratum::storage::memory::MemoryStorage;

const WORDS: &[&str] = &[
    "search", "engine", "full", "text", "index", "query", "document", "field", "term", "phrase",
    "segment", "merge", "posting", "position", "norm", "dictionary", "analysis", "token",
    "storage", "retrieval", "ranking", "filtering", "memory", "optimization",
];

/// Generate test documents for benchmarking.
fn generate_test_documents(count: usize) -> Vec<String> {
    let mut documents = Vec::with_capacity(count);
    for i in 0..count {
        let doc_length = 50 + (i % 100);
        let doc_words: Vec<String> = (0..doc_length)
            .map(|j| format!("{}{}", WORDS[(i * 7 + j * 13) % WORDS.len()], j % 17))
            .collect();
        documents.push(doc_words.join(" "));
    }
    documents
}

fn to_document(id: usize, text: &str) -> Document {
    Document::builder()
        .add_keyword("id", id.to_string())
        .add_text("body", text)
        .build()
}

fn build_index(texts: &[String], config: IndexWriterConfig) -> Arc<dyn Storage> {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
    let mut writer = IndexWriter::new(
        Arc::clone(&storage),
        Arc::new(StandardAnalyzer::new()),
        IndexWriterConfig {
            create: true,
            ..config
        },
    )
    .unwrap();
    for (id, text) in texts.iter().enumerate() {
        writer.add_document(&to_document(id, text)).unwrap();
    }
    writer.close().unwrap();
    storage
}

/// Benchmark text analysis and tokenization.
fn bench_text_analysis(c: &mut Criterion) {
    let mut group = c.benchmark_group("text_analysis");

    let analyzer = StandardAnalyzer::new();
    let texts = generate_test_documents(100);

    group.throughput(Throughput::Elements(100));
    group.bench_function("analyze_batch_documents", |b| {
        b.iter(|| {
            for text in &texts {
                let tokens = analyzer.analyze(black_box(text)).unwrap().count();
                black_box(tokens);
            }
        })
    });

    group.finish();
}

/// Benchmark indexing with incremental merges and a final optimize.
fn bench_indexing(c: &mut Criterion) {
    let mut group = c.benchmark_group("indexing");
    group.sample_size(20);

    let texts = generate_test_documents(500);

    group.throughput(Throughput::Elements(texts.len() as u64));
    group.bench_function("add_documents_merge_factor_10", |b| {
        b.iter(|| black_box(build_index(&texts, IndexWriterConfig::default())))
    });

    group.bench_function("optimize_many_segments", |b| {
        b.iter_batched(
            || build_index(&texts, IndexWriterConfig::default()),
            |storage| {
                let mut writer = IndexWriter::new(
                    storage,
                    Arc::new(StandardAnalyzer::new()),
                    IndexWriterConfig::default(),
                )
                .unwrap();
                writer.optimize().unwrap();
                writer.close().unwrap();
            },
            BatchSize::LargeInput,
        )
    });

    group.finish();
}

/// Benchmark term dictionary lookups on an optimized index.
fn bench_term_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("term_lookup");

    let texts = generate_test_documents(1000);
    let storage = build_index(&texts, IndexWriterConfig::default());
    let reader = open_reader(storage).unwrap();

    let mut rng = StdRng::seed_from_u64(42);
    let terms: Vec<Term> = (0..1000)
        .map(|_| {
            let word = WORDS[rng.random_range(0..WORDS.len())];
            Term::new("body", format!("{word}{}", rng.random_range(0..20)))
        })
        .collect();

    group.throughput(Throughput::Elements(terms.len() as u64));
    group.bench_function("doc_freq_random_terms", |b| {
        b.iter(|| {
            for term in &terms {
                black_box(reader.doc_freq(black_box(term)).unwrap());
            }
        })
    });

    group.bench_function("scan_postings", |b| {
        b.iter(|| {
            let mut total = 0u64;
            for term in terms.iter().take(50) {
                let mut positions = reader.term_positions(term).unwrap();
                while positions.next().unwrap() {
                    total += positions.freq() as u64;
                }
            }
            black_box(total)
        })
    });

    group.finish();
}

criterion_group!(benches, bench_text_analysis, bench_indexing, bench_term_lookup);
criterion_main!(benches);
