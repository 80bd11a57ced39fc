//! Indexing and query benchmarks over a synthetic corpus.
//!
//! Run with: `cargo bench`
//! Save baseline: `cargo bench -- --save-baseline main`
//! Compare: `cargo bench -- --baseline main`

use criterion::{Criterion, criterion_group, criterion_main};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;
use trix::index::{IndexReader, IndexWriter};
use trix::query::Searcher;

const DOC_COUNT: usize = 500;

/// Deterministic pseudo-source files: enough trigram variety to exercise
/// the posting lists without hitting the per-document limits.
fn synthetic_corpus(dir: &TempDir) -> Vec<(PathBuf, String)> {
    let words = [
        "index", "search", "trigram", "segment", "posting", "commit", "reader", "writer",
        "buffer", "stream", "parse", "decode", "encode", "verify", "snippet", "needle",
    ];
    let mut docs = Vec::with_capacity(DOC_COUNT);
    for i in 0..DOC_COUNT {
        let mut content = String::new();
        for line in 0..40 {
            let a = words[(i + line) % words.len()];
            let b = words[(i * 7 + line * 3) % words.len()];
            content.push_str(&format!("fn {a}_{b}_{line}() {{ let x_{i} = {line}; }}\n"));
        }
        let path = dir.path().join(format!("file_{i:04}.rs"));
        fs::write(&path, &content).unwrap();
        docs.push((path, content));
    }
    docs
}

fn bench_index_build(c: &mut Criterion) {
    let files = TempDir::new().unwrap();
    let docs = synthetic_corpus(&files);

    c.bench_function("index_500_files", |b| {
        b.iter(|| {
            let index = TempDir::new().unwrap();
            let mut writer = IndexWriter::open(index.path()).unwrap();
            for (path, content) in &docs {
                writer
                    .add(path.to_string_lossy().as_bytes(), content.as_bytes())
                    .unwrap();
            }
            writer.commit().unwrap();
        })
    });
}

fn bench_literal_search(c: &mut Criterion) {
    let files = TempDir::new().unwrap();
    let docs = synthetic_corpus(&files);
    let index = TempDir::new().unwrap();
    let mut writer = IndexWriter::open(index.path()).unwrap();
    for (path, content) in &docs {
        writer
            .add(path.to_string_lossy().as_bytes(), content.as_bytes())
            .unwrap();
    }
    writer.commit().unwrap();

    let reader = IndexReader::open(index.path()).unwrap();
    let searcher = Searcher::new(&reader).unwrap();

    c.bench_function("search_literal", |b| {
        b.iter(|| searcher.search("trigram_segment", 20).unwrap())
    });

    c.bench_function("search_regex", |b| {
        b.iter(|| searcher.search_regex(r"fn needle_\w+", 20).unwrap())
    });
}

criterion_group!(benches, bench_index_build, bench_literal_search);
criterion_main!(benches);
