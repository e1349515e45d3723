use super::*;
use crate::embeddings::TextSplitter;
use crate::vector::SearchOptions;
use tempfile::TempDir;

const CORPUS: &str = "1. What's the price of the X100 phone?\n\
2. The X100 costs 499 dollars.\n\
3. Is the laptop battery replaceable?\n\
4. Yes, the battery can be swapped at any service centre.\n";

/// Bag-of-words embedder hashing each word into one of 64 buckets
struct WordHashEmbedder {
    id: String,
}

impl WordHashEmbedder {
    fn shared(id: &str) -> Arc<dyn Embedder> {
        Arc::new(Self { id: id.to_string() })
    }
}

impl Embedder for WordHashEmbedder {
    fn model_id(&self) -> &str {
        &self.id
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0; 64];
        for word in text.split_whitespace() {
            let hash = word
                .to_lowercase()
                .bytes()
                .fold(0xcbf2_9ce4_8422_2325_u64, |h, b| {
                    (h ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
                });
            vector[(hash % 64) as usize] += 1.0;
        }
        Ok(vector)
    }
}

/// Returns vectors of the wrong length after the first call
struct ShrinkingEmbedder {
    calls: std::sync::atomic::AtomicUsize,
}

impl Embedder for ShrinkingEmbedder {
    fn model_id(&self) -> &str {
        "shrinking"
    }

    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        let n = self
            .calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(vec![1.0; if n == 0 { 8 } else { 4 }])
    }
}

struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn model_id(&self) -> &str {
        "failing"
    }

    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RetrievalError::Embedding("backend down".to_string()))
    }
}

fn corpus_chunks() -> Vec<Chunk> {
    TextSplitter::new(Default::default())
        .and_then(|s| s.split(CORPUS))
        .expect("corpus should split")
}

fn build_index() -> FlatIndex {
    FlatIndex::build(
        corpus_chunks(),
        WordHashEmbedder::shared("hash-64"),
        RelevanceFn::default(),
    )
    .expect("index should build")
}

#[test]
fn build_normalises_vectors() {
    let index = build_index();

    assert_eq!(index.len(), 4);
    assert_eq!(index.dimension(), 64);
    for entry in index.entries() {
        let norm: f32 = entry.vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }
}

#[test]
fn exact_chunk_text_scores_highest() {
    let index = build_index();
    let chunk = &index.entries()[1].chunk;

    let hits = index.query(&chunk.text, 0.0).expect("query should succeed");

    assert_eq!(hits[0].chunk, *chunk);
    assert!(hits[0].score >= 0.95);
}

#[test]
fn threshold_extremes() {
    let index = build_index();

    let none = index
        .query("battery", 1.01)
        .expect("query should succeed");
    assert!(none.is_empty());

    let all = index.query("battery", 0.0).expect("query should succeed");
    assert_eq!(all.len(), index.len());
}

#[test]
fn results_are_sorted_and_thresholded() {
    let index = build_index();

    let hits = index
        .query("Is the laptop battery replaceable?", 0.1)
        .expect("query should succeed");

    for pair in hits.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    for hit in &hits {
        assert!(hit.score >= 0.1);
    }
}

#[test]
fn raising_threshold_yields_subset() {
    let index = build_index();
    let question = "how much does the X100 phone cost";

    let loose = index.query(question, 0.05).expect("query should succeed");
    let strict = index.query(question, 0.5).expect("query should succeed");

    assert!(strict.len() <= loose.len());
    for hit in &strict {
        assert!(loose.iter().any(|h| h.chunk == hit.chunk));
    }
}

#[test]
fn ties_keep_insertion_order() {
    let chunks: Vec<Chunk> = ["same words", "same words", "same words"]
        .iter()
        .enumerate()
        .map(|(position, text)| Chunk {
            text: (*text).to_string(),
            position,
            offset: position * 10,
        })
        .collect();
    let index = FlatIndex::build(
        chunks,
        WordHashEmbedder::shared("hash-64"),
        RelevanceFn::UnitEuclidean,
    )
    .expect("index should build");

    let hits = index.query("same words", 0.0).expect("query should succeed");

    let positions: Vec<usize> = hits.iter().map(|h| h.chunk.position).collect();
    assert_eq!(positions, vec![0, 1, 2]);
}

#[test]
fn search_applies_limit() {
    let index = build_index();
    let options = SearchOptions {
        threshold: 0.0,
        limit: Some(2),
    };

    let hits = index.search("battery", &options).expect("search should succeed");
    assert_eq!(hits.len(), 2);
}

#[test]
fn build_rejects_empty_corpus() {
    let result = FlatIndex::build(
        Vec::new(),
        WordHashEmbedder::shared("hash-64"),
        RelevanceFn::default(),
    );
    assert!(matches!(result, Err(RetrievalError::Build(_))));
}

#[test]
fn build_rejects_inconsistent_dimensions() {
    let embedder = Arc::new(ShrinkingEmbedder {
        calls: Default::default(),
    });
    let result = FlatIndex::build(corpus_chunks(), embedder, RelevanceFn::default());
    assert!(matches!(result, Err(RetrievalError::Build(_))));
}

#[test]
fn build_surfaces_embedding_failure() {
    let result = FlatIndex::build(
        corpus_chunks(),
        Arc::new(FailingEmbedder),
        RelevanceFn::default(),
    );
    assert!(matches!(result, Err(RetrievalError::Build(_))));
}

#[test]
fn persist_then_load_preserves_entries() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let artifact = temp_dir.path().join("qa.db");
    let index = build_index();

    index.persist(&artifact).expect("persist should succeed");
    assert!(artifact.join(MANIFEST_FILE).is_file());
    assert!(artifact.join(ENTRIES_FILE).is_file());
    assert!(!artifact.join("entries.json.tmp").exists());

    let loaded = FlatIndex::load(
        &artifact,
        WordHashEmbedder::shared("hash-64"),
        RelevanceFn::default(),
    )
    .expect("load should succeed");

    assert_eq!(loaded.entries(), index.entries());
    assert_eq!(loaded.manifest(), index.manifest());

    let before = index.query("battery", 0.2).expect("query should succeed");
    let after = loaded.query("battery", 0.2).expect("query should succeed");
    assert_eq!(before, after);
}

#[test]
fn load_missing_artifact() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let result = FlatIndex::load(
        &temp_dir.path().join("absent.db"),
        WordHashEmbedder::shared("hash-64"),
        RelevanceFn::default(),
    );
    assert!(matches!(result, Err(RetrievalError::Load { .. })));
}

#[test]
fn load_corrupt_entries() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let artifact = temp_dir.path().join("qa.db");
    build_index()
        .persist(&artifact)
        .expect("persist should succeed");
    fs::write(artifact.join(ENTRIES_FILE), "[{\"chunk\":").expect("should write");

    let result = FlatIndex::load(
        &artifact,
        WordHashEmbedder::shared("hash-64"),
        RelevanceFn::default(),
    );
    assert!(matches!(result, Err(RetrievalError::Load { .. })));
}

#[test]
fn load_rejects_other_model() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let artifact = temp_dir.path().join("qa.db");
    build_index()
        .persist(&artifact)
        .expect("persist should succeed");

    let result = FlatIndex::load(
        &artifact,
        WordHashEmbedder::shared("another-model"),
        RelevanceFn::default(),
    );
    assert!(matches!(result, Err(RetrievalError::ConfigMismatch { .. })));
}

#[test]
fn load_rejects_other_relevance_fn() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let artifact = temp_dir.path().join("qa.db");
    build_index()
        .persist(&artifact)
        .expect("persist should succeed");

    let result = FlatIndex::load(
        &artifact,
        WordHashEmbedder::shared("hash-64"),
        RelevanceFn::UnitEuclidean,
    );
    assert!(matches!(result, Err(RetrievalError::ConfigMismatch { .. })));
}

#[test]
fn persist_failure_keeps_index_usable() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let blocker = temp_dir.path().join("qa.db");
    fs::write(&blocker, "not a directory").expect("should write");
    let index = build_index();

    let result = index.persist(&blocker);

    assert!(matches!(result, Err(RetrievalError::Persist { .. })));
    assert!(!index.query("battery", 0.0).expect("query should succeed").is_empty());
}

#[test]
fn failed_overwrite_invalidates_previous_artifact() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let artifact = temp_dir.path().join("qa.db");
    build_index()
        .persist(&artifact)
        .expect("first persist should succeed");
    fs::create_dir(artifact.join("entries.json.tmp")).expect("should block entries write");

    let result = build_index().persist(&artifact);
    assert!(matches!(result, Err(RetrievalError::Persist { .. })));

    assert!(!artifact.join(MANIFEST_FILE).exists());
    let reloaded = FlatIndex::load(
        &artifact,
        WordHashEmbedder::shared("hash-64"),
        RelevanceFn::default(),
    );
    assert!(matches!(reloaded, Err(RetrievalError::Load { .. })));
}

/// Produces a NaN component for every text
struct NanEmbedder;

impl Embedder for NanEmbedder {
    fn model_id(&self) -> &str {
        "nan"
    }

    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![f32::NAN, 1.0])
    }
}

#[test]
fn build_rejects_non_finite_embeddings() {
    let result = FlatIndex::build(corpus_chunks(), Arc::new(NanEmbedder), RelevanceFn::default());
    assert!(matches!(result, Err(RetrievalError::Build(_))));
}
