use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use crate::config::Config;
use crate::embeddings::{Embedder, EmbedderCell, OllamaClient, TextSplitter};
use crate::generation::CompletionClient;
use crate::index_manager::{IndexHandle, IndexIntent, IndexManager, artifact_path_for, plan_index};
use crate::qa::{Answer, RetrievalQa};
use crate::vector::{FlatIndex, SearchOptions, VectorIndex};

/// Composition root for the CLI: owns the configuration and the one
/// embedding client shared by every component.
pub struct App {
    config: Config,
    embedder: EmbedderCell<OllamaClient>,
}

impl App {
    #[inline]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            embedder: EmbedderCell::new(),
        }
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The shared embedding client, connecting on first use
    #[inline]
    pub fn embedder(&self) -> crate::Result<Arc<OllamaClient>> {
        self.embedder
            .get_or_try_init(|| OllamaClient::connect(&self.config.ollama))
    }

    #[inline]
    pub fn index_manager(&self) -> crate::Result<IndexManager<FlatIndex>> {
        let embedder: Arc<dyn Embedder> = self.embedder()?;
        let splitter = TextSplitter::new(self.config.chunking.clone())?;
        Ok(
            IndexManager::new(embedder, splitter, self.config.retrieval.relevance)
                .with_recover_corrupt(self.config.corpus.recover_corrupt),
        )
    }

    /// Build or load the configured corpus index
    #[inline]
    pub fn open_index(&self, rebuild: bool) -> Result<IndexHandle<FlatIndex>> {
        let manager = self.index_manager()?;
        let source = &self.config.corpus.source_path;

        let artifact = artifact_path_for(source)?;
        let verb = match plan_index(artifact.exists(), rebuild) {
            IndexIntent::Build => "Building",
            IndexIntent::Load => "Loading",
        };

        let bar = spinner(&format!("{} index for {}", verb, source.display()));
        let result = manager.open(source, rebuild);
        bar.finish_and_clear();

        result.with_context(|| format!("Failed to open index for {}", source.display()))
    }
}

fn spinner(message: &str) -> ProgressBar {
    if !console::user_attended_stderr() {
        return ProgressBar::hidden();
    }
    let style = ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    let bar = ProgressBar::new_spinner().with_style(style);
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

/// Build the index, or load it when it is already present
#[inline]
pub fn build_index(app: &App, rebuild: bool) -> Result<()> {
    let started = Instant::now();
    let handle = app.open_index(rebuild)?;
    let index = handle.snapshot();
    let artifact = artifact_path_for(&app.config().corpus.source_path)?;

    info!("Index ready in {:?}", started.elapsed());
    println!(
        "{} {} chunks of dimension {}",
        style("✓ Index ready:").green(),
        index.len(),
        index.dimension()
    );
    println!("  Artifact: {}", style(artifact.display()).cyan());
    println!("  Took: {:.2?}", started.elapsed());

    Ok(())
}

/// Print the chunks matching `text`
#[inline]
pub fn run_query(
    app: &App,
    text: &str,
    threshold: Option<f32>,
    limit: Option<usize>,
) -> Result<()> {
    let options = search_options(app.config(), threshold, limit)?;
    let handle = app.open_index(false)?;

    let hits = handle
        .snapshot()
        .search(text, &options)
        .context("Query failed")?;

    if hits.is_empty() {
        println!(
            "No chunk scored at least {}.",
            style(options.threshold).yellow()
        );
        return Ok(());
    }

    println!("🔍 {} result(s) for \"{}\"", hits.len(), text);
    println!();
    for (rank, hit) in hits.iter().enumerate() {
        println!(
            "{}. [{}] chunk #{} at byte {}",
            rank + 1,
            style(format!("{:.3}", hit.score)).cyan(),
            hit.chunk.position,
            hit.chunk.offset
        );
        println!("   {}", hit.chunk.text.trim());
    }

    Ok(())
}

/// Answer a customer question from the index
#[inline]
pub fn ask_question(app: &App, question: &str, threshold: Option<f32>) -> Result<()> {
    let options = search_options(app.config(), threshold, None)?;
    let generator = CompletionClient::new(&app.config().generation)?;
    let handle = Arc::new(app.open_index(false)?);

    let qa = RetrievalQa::new(handle, Arc::new(generator), options);
    match qa.answer(question)? {
        Answer::Grounded { text, sources } => {
            println!("{}", text);
            println!();
            println!(
                "{}",
                style(format!("Based on {} indexed chunk(s)", sources.len())).dim()
            );
        }
        Answer::NoRelevantResult => {
            println!(
                "{}",
                style("No relevant answer found in the sales Q&A corpus.").yellow()
            );
        }
    }

    Ok(())
}

/// Report corpus, index and service status
#[inline]
pub fn show_status(config: &Config) -> Result<()> {
    println!("📊 Sales Retrieval Status Report");
    println!("{}", "=".repeat(50));
    println!();

    let source = &config.corpus.source_path;
    println!("📄 Corpus:");
    if source.is_file() {
        println!("   ✅ Source: {}", source.display());
    } else {
        println!("   ❌ Source: {} (missing)", source.display());
    }

    println!("🔍 Index:");
    match artifact_path_for(source) {
        Ok(artifact) if artifact.is_dir() => match FlatIndex::read_manifest(&artifact) {
            Ok(manifest) => {
                println!("   ✅ Artifact: {}", artifact.display());
                println!("   📋 Entries: {}", manifest.count);
                println!("   🔢 Dimension: {}", manifest.dimension);
                println!("   🤖 Model: {}", manifest.model_id);
                println!("   📐 Relevance: {}", manifest.relevance.describe());
                println!("   🕒 Built: {}", manifest.created_at.to_rfc3339());
                if manifest.relevance != config.retrieval.relevance {
                    println!(
                        "   ⚠️  Configured relevance is {}; rebuild with `index --rebuild`",
                        config.retrieval.relevance.describe()
                    );
                }
            }
            Err(e) => println!("   ❌ Artifact unreadable - {}", e),
        },
        Ok(artifact) => println!("   ⚪ Not built yet ({})", artifact.display()),
        Err(e) => println!("   ❌ {}", e),
    }

    println!("🤖 Ollama Status:");
    match OllamaClient::new(&config.ollama) {
        Ok(client) => match client.health_check() {
            Ok(()) => {
                println!(
                    "   ✅ Ollama: Connected ({}:{})",
                    config.ollama.host, config.ollama.port
                );
                println!("   📋 Model: {}", config.ollama.model);
                println!("   🔢 Batch Size: {}", config.ollama.batch_size);
            }
            Err(e) => {
                println!("   ⚠️  Ollama: Unhealthy - {:#}", e);
            }
        },
        Err(e) => {
            println!("   ❌ Ollama: Failed to connect - {}", e);
        }
    }

    println!("💬 Generation:");
    println!(
        "   Endpoint: {} ({})",
        config.generation.api_base, config.generation.model
    );
    if config.generation.api_key.is_some() {
        println!("   ✅ API key configured");
    } else {
        println!("   ⚠️  No API key; `ask` is unavailable");
    }

    Ok(())
}

/// Configured search options with command-line overrides applied
fn search_options(
    config: &Config,
    threshold: Option<f32>,
    limit: Option<usize>,
) -> Result<SearchOptions> {
    let mut retrieval = config.retrieval;
    if let Some(threshold) = threshold {
        retrieval.score_threshold = threshold;
    }
    if let Some(limit) = limit {
        retrieval.max_results = limit;
    }
    retrieval.validate()?;
    Ok(retrieval.search_options())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_options_overrides() {
        let config = Config::default();

        let defaults = search_options(&config, None, None).expect("defaults are valid");
        assert_eq!(defaults, config.retrieval.search_options());

        let overridden =
            search_options(&config, Some(0.2), Some(10)).expect("overrides are valid");
        assert!((overridden.threshold - 0.2).abs() < f32::EPSILON);
        assert_eq!(overridden.limit, Some(10));
    }

    #[test]
    fn search_options_reject_invalid_overrides() {
        let config = Config::default();

        assert!(search_options(&config, Some(f32::NAN), None).is_err());
        assert!(search_options(&config, Some(1.5), None).is_err());
        assert!(search_options(&config, Some(-0.1), None).is_err());
        assert!(search_options(&config, None, Some(0)).is_err());
    }

    #[test]
    fn status_without_artifact_does_not_fail() {
        let temp_dir = tempfile::TempDir::new().expect("should create temp dir");
        let mut config = Config::default();
        config.corpus.source_path = temp_dir.path().join("qa.txt");
        config.ollama.port = 1;

        assert!(show_status(&config).is_ok());
    }
}
