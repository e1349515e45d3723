#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end index lifecycle against a deterministic in-process embedder

use sales_retrieval::embeddings::{ChunkingConfig, Embedder, SeparatorMode, TextSplitter};
use sales_retrieval::index_manager::IndexManager;
use sales_retrieval::vector::{FlatIndex, RelevanceFn, VectorIndex};
use sales_retrieval::{Result, RetrievalError};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const CORPUS: &str = "1. Does the X100 phone support 5G?\n\
2. Yes, the X100 supports all 5G bands.\n\
3. How long is the laptop warranty?\n\
4. Every laptop ships with a two year warranty.\n\
5. Can I pay in instalments?\n\
6. Instalments are available for orders over 300 dollars.\n";

/// Character trigram counts hashed into 128 buckets
struct TrigramEmbedder;

impl Embedder for TrigramEmbedder {
    fn model_id(&self) -> &str {
        "trigram-128"
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0; 128];
        let chars: Vec<char> = text.to_lowercase().chars().collect();
        for window in chars.windows(3) {
            let hash = window
                .iter()
                .fold(17_u32, |h, c| h.wrapping_mul(31).wrapping_add(*c as u32));
            vector[(hash % 128) as usize] += 1.0;
        }
        Ok(vector)
    }
}

fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok();
}

fn manager() -> IndexManager<FlatIndex> {
    let splitter = TextSplitter::new(ChunkingConfig::default()).expect("default config is valid");
    IndexManager::new(Arc::new(TrigramEmbedder), splitter, RelevanceFn::default())
}

fn write_corpus(dir: &Path, name: &str, text: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, text).expect("should write corpus");
    path
}

fn snapshot(index: &FlatIndex, query: &str) -> Vec<(usize, f32)> {
    index
        .query(query, 0.0)
        .expect("query should succeed")
        .into_iter()
        .map(|hit| (hit.chunk.position, hit.score))
        .collect()
}

#[test]
fn persist_load_cycles_are_idempotent() {
    init_test_tracing();
    let temp_dir = TempDir::new().expect("should create temp dir");
    let chunks = TextSplitter::new(ChunkingConfig::default())
        .and_then(|s| s.split(CORPUS))
        .expect("corpus should split");

    let built = FlatIndex::build(chunks, Arc::new(TrigramEmbedder), RelevanceFn::default())
        .expect("index should build");
    let first = temp_dir.path().join("first.db");
    built.persist(&first).expect("persist should succeed");
    let loaded = FlatIndex::load(&first, Arc::new(TrigramEmbedder), RelevanceFn::default())
        .expect("load should succeed");

    let second = temp_dir.path().join("second.db");
    loaded.persist(&second).expect("persist should succeed");
    let reloaded = FlatIndex::load(&second, Arc::new(TrigramEmbedder), RelevanceFn::default())
        .expect("load should succeed");

    for query in ["5G support", "warranty length", "pay in instalments", "unrelated"] {
        let expected = snapshot(&built, query);
        for (label, index) in [("loaded", &loaded), ("reloaded", &reloaded)] {
            let actual = snapshot(index, query);
            assert_eq!(actual.len(), expected.len(), "{label}: {query}");
            for ((ep, es), (ap, as_)) in expected.iter().zip(&actual) {
                assert_eq!(ep, ap, "{label}: order differs for {query}");
                assert!((es - as_).abs() < 1e-6, "{label}: score differs for {query}");
            }
        }
    }
}

#[test]
fn result_count_never_grows_with_threshold() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let source = write_corpus(temp_dir.path(), "qa.txt", CORPUS);
    let index = manager()
        .get_or_build(&source, false)
        .expect("build should succeed");

    for query in ["Does the phone support 5G?", "warranty", "instalments"] {
        let mut previous = usize::MAX;
        for step in 0..=20 {
            let threshold = step as f32 * 0.05;
            let count = index
                .query(query, threshold)
                .expect("query should succeed")
                .len();
            assert!(count <= previous, "{query} grew at {threshold}");
            previous = count;
        }
    }
}

#[test]
fn exact_chunk_text_is_top_result() {
    for relevance in [RelevanceFn::default(), RelevanceFn::UnitEuclidean] {
        let chunks = TextSplitter::new(ChunkingConfig::default())
            .and_then(|s| s.split(CORPUS))
            .expect("corpus should split");
        let index = FlatIndex::build(chunks, Arc::new(TrigramEmbedder), relevance)
            .expect("index should build");

        for entry in index.entries() {
            let hits = index
                .query(&entry.chunk.text, 0.0)
                .expect("query should succeed");
            assert_eq!(hits[0].chunk, entry.chunk, "{}", relevance.describe());
            assert!(hits[0].score >= 0.95, "{}", relevance.describe());
        }
    }
}

#[test]
fn out_of_range_and_zero_thresholds() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let source = write_corpus(temp_dir.path(), "qa.txt", CORPUS);
    let index = manager()
        .get_or_build(&source, false)
        .expect("build should succeed");

    assert!(index.query("warranty", 1.01).expect("query").is_empty());

    let all = index.query("warranty", 0.0).expect("query");
    assert_eq!(all.len(), index.len());
    for pair in all.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[test]
fn chunks_cover_the_corpus() {
    let discard = TextSplitter::new(ChunkingConfig::default()).expect("valid config");
    let joined: String = discard
        .split(CORPUS)
        .expect("split should succeed")
        .iter()
        .map(|c| c.text.as_str())
        .collect();
    let without_markers: String = CORPUS
        .lines()
        .map(|line| line.split_once('.').map_or(line, |(_, rest)| rest))
        .map(|line| format!("{line}\n"))
        .collect();
    assert_eq!(joined, without_markers);

    let leading = TextSplitter::new(ChunkingConfig {
        keep_separator: SeparatorMode::Leading,
        ..ChunkingConfig::default()
    })
    .expect("valid config");
    let joined: String = leading
        .split(CORPUS)
        .expect("split should succeed")
        .iter()
        .map(|c| c.text.as_str())
        .collect();
    assert_eq!(joined, CORPUS);
}

#[test]
fn build_then_load_from_derived_artifact() {
    init_test_tracing();
    let temp_dir = TempDir::new().expect("should create temp dir");
    let source = write_corpus(
        temp_dir.path(),
        "qa.txt",
        "1. What's the price?\n2. It depends on the config.",
    );
    let manager = manager();

    let built = manager
        .get_or_build(&source, false)
        .expect("build should succeed");
    assert_eq!(built.len(), 2);
    assert!(temp_dir.path().join("qa.db").is_dir());

    // Sentinel: a load must not see this
    fs::write(&source, "1. Changed\n2. Changed\n3. Changed").expect("should mutate corpus");

    let loaded = manager
        .get_or_build(&source, false)
        .expect("load should succeed");
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded.entries(), built.entries());
}

#[test]
fn missing_source_without_artifact() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let source = temp_dir.path().join("missing.txt");

    let result = manager().get_or_build(&source, false);

    assert!(matches!(result, Err(RetrievalError::SourceNotFound(_))));
}
