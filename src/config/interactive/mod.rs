
use std::path::PathBuf;

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};

use super::{Config, ConfigError, OllamaConfig, RetrievalConfig};
use crate::embeddings::OllamaClient;
use crate::index_manager::artifact_path_for;

#[inline]
pub fn run_interactive_config() -> Result<()> {
    eprintln!("{}", style("🔧 Sales Retrieval Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config()?;

    eprintln!("{}", style("Corpus").bold().yellow());
    eprintln!("The Q&A file to index. The index is stored next to it.");
    eprintln!();

    configure_corpus(&mut config)?;

    eprintln!();
    eprintln!("{}", style("Ollama Configuration").bold().yellow());
    eprintln!("Configure your local Ollama instance for embedding generation.");
    eprintln!();

    configure_ollama(&mut config.ollama)?;

    eprintln!();
    eprintln!("{}", style("Retrieval").bold().yellow());
    eprintln!();

    configure_retrieval(&mut config.retrieval)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    if test_ollama_connection(&config.ollama) {
        eprintln!("{}", style("✓ Ollama connection successful!").green());
    } else {
        eprintln!(
            "{}",
            style("⚠ Warning: Could not connect to Ollama").yellow()
        );
        eprintln!("You can continue, but make sure Ollama is running before indexing.");
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());

        let config_path = config
            .config_file_path()
            .context("Failed to get config file path")?;
        eprintln!(
            "Configuration saved to: {}",
            style(config_path.display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    for line in render_config(&config) {
        eprintln!("{}", line);
    }

    Ok(())
}

/// Styled summary lines for `config`
fn render_config(config: &Config) -> Vec<String> {
    let mut lines = vec![
        style("📋 Current Configuration").bold().cyan().to_string(),
        String::new(),
        style("Corpus:").bold().yellow().to_string(),
        format!(
            "  Source: {}",
            style(config.corpus.source_path.display()).cyan()
        ),
    ];
    match artifact_path_for(&config.corpus.source_path) {
        Ok(artifact) => lines.push(format!("  Index: {}", style(artifact.display()).cyan())),
        Err(e) => lines.push(format!("  Index: {} ({})", style("Invalid").red(), e)),
    }
    lines.push(format!(
        "  Recover corrupt index: {}",
        style(config.corpus.recover_corrupt).cyan()
    ));

    lines.push(String::new());
    lines.push(style("Ollama Settings:").bold().yellow().to_string());
    lines.push(format!("  Host: {}", style(&config.ollama.host).cyan()));
    lines.push(format!("  Port: {}", style(config.ollama.port).cyan()));
    lines.push(format!("  Model: {}", style(&config.ollama.model).cyan()));
    lines.push(format!(
        "  Batch Size: {}",
        style(config.ollama.batch_size).cyan()
    ));
    lines.push(format!(
        "  Dimension: {}",
        style(config.ollama.embedding_dimension).cyan()
    ));
    match config.ollama_url() {
        Ok(url) => lines.push(format!("  Ollama URL: {}", style(url).cyan())),
        Err(e) => lines.push(format!("  Ollama URL: {} ({})", style("Invalid").red(), e)),
    }

    lines.push(String::new());
    lines.push(style("Chunking:").bold().yellow().to_string());
    lines.push(format!(
        "  Separator: {} ({})",
        style(&config.chunking.separator).cyan(),
        if config.chunking.is_regex {
            "regex"
        } else {
            "literal"
        }
    ));
    lines.push(format!(
        "  Chunk Size: {} (overlap {})",
        style(config.chunking.chunk_size).cyan(),
        config.chunking.chunk_overlap
    ));

    lines.push(String::new());
    lines.push(style("Retrieval:").bold().yellow().to_string());
    lines.push(format!(
        "  Score Threshold: {}",
        style(config.retrieval.score_threshold).cyan()
    ));
    lines.push(format!(
        "  Max Results: {}",
        style(config.retrieval.max_results).cyan()
    ));
    lines.push(format!(
        "  Relevance: {}",
        style(config.retrieval.relevance.describe()).cyan()
    ));

    lines.push(String::new());
    lines.push(style("Generation:").bold().yellow().to_string());
    lines.push(format!(
        "  Endpoint: {}",
        style(&config.generation.api_base).cyan()
    ));
    lines.push(format!("  Model: {}", style(&config.generation.model).cyan()));
    lines.push(format!(
        "  API Key: {}",
        if config.generation.api_key.is_some() {
            style("set").green()
        } else {
            style("not set").red()
        }
    ));

    if let Ok(config_path) = config.config_file_path() {
        lines.push(String::new());
        lines.push(format!(
            "Config file: {}",
            style(config_path.display()).dim()
        ));
    }

    lines
}

fn load_existing_config() -> Result<Config> {
    Config::load().map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No existing configuration found. Using defaults.").yellow()
            );
            Ok(Config::default())
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            Ok(config)
        },
    )
}

fn configure_corpus(config: &mut Config) -> Result<()> {
    let source: String = Input::new()
        .with_prompt("Corpus file")
        .default(config.corpus.source_path.display().to_string())
        .validate_with(|input: &String| -> Result<(), String> {
            artifact_path_for(PathBuf::from(input).as_path())
                .map(|_| ())
                .map_err(|e| e.to_string())
        })
        .interact_text()?;

    let recover_corrupt = Confirm::new()
        .with_prompt("Rebuild automatically when the stored index is unreadable?")
        .default(config.corpus.recover_corrupt)
        .interact()?;

    config.corpus.source_path = PathBuf::from(source);
    config.corpus.recover_corrupt = recover_corrupt;
    Ok(())
}

fn configure_ollama(ollama: &mut OllamaConfig) -> Result<()> {
    let protocols = &["http", "https"];
    let default_index = protocols
        .iter()
        .position(|&p| p == ollama.protocol)
        .unwrap_or(0);

    let protocol_index = Select::new()
        .with_prompt("Ollama protocol")
        .default(default_index)
        .items(protocols)
        .interact()?;

    let protocol = protocols[protocol_index].to_string();

    let host: String = Input::new()
        .with_prompt("Ollama host")
        .default(ollama.host.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = OllamaConfig {
                protocol: protocol.clone(),
                host: input.clone(),
                ..OllamaConfig::default()
            };
            temp_config.validate()
        })
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("Ollama port")
        .default(ollama.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let model: String = Input::new()
        .with_prompt("Embedding model")
        .default(ollama.model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let embedding_dimension: u32 = Input::new()
        .with_prompt("Embedding dimension")
        .default(ollama.embedding_dimension)
        .interact_text()?;

    let batch_size: u32 = Input::new()
        .with_prompt("Batch size for embedding generation")
        .default(ollama.batch_size)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if *input == 0 {
                Err("Batch size must be greater than 0")
            } else if *input > 1000 {
                Err("Batch size must be 1000 or less")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    ollama.set_protocol(protocol)?;
    ollama.set_host(host)?;
    ollama.set_port(port)?;
    ollama.set_model(model)?;
    ollama.set_embedding_dimension(embedding_dimension)?;
    ollama.set_batch_size(batch_size)?;

    Ok(())
}

fn configure_retrieval(retrieval: &mut RetrievalConfig) -> Result<()> {
    let score_threshold: f32 = Input::new()
        .with_prompt("Minimum relevance score (0.0 - 1.0)")
        .default(retrieval.score_threshold)
        .validate_with(|input: &f32| -> Result<(), &str> {
            if (0.0..=1.0).contains(input) {
                Ok(())
            } else {
                Err("Score must be between 0.0 and 1.0")
            }
        })
        .interact_text()?;

    let max_results: usize = Input::new()
        .with_prompt("Maximum chunks per answer")
        .default(retrieval.max_results)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if *input == 0 {
                Err("Must keep at least one chunk")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    retrieval.score_threshold = score_threshold;
    retrieval.max_results = max_results;
    Ok(())
}

fn test_ollama_connection(ollama: &OllamaConfig) -> bool {
    OllamaClient::new(ollama)
        .map(|client| {
            client
                .with_timeout(std::time::Duration::from_secs(5))
                .with_retry_attempts(1)
        })
        .is_ok_and(|client| client.ping().is_ok())
}
