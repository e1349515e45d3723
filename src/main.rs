use clap::{Parser, Subcommand};
use sales_retrieval::Result;
use sales_retrieval::commands::{App, ask_question, build_index, run_query, show_status};
use sales_retrieval::config::{Config, run_interactive_config, show_config};

#[derive(Parser)]
#[command(name = "sales-retrieval")]
#[command(about = "Retrieval layer for a sales Q&A chatbot: index a Q&A corpus and answer from it")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure corpus, Ollama connection and retrieval settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Build the corpus index, or load it if it already exists
    Index {
        /// Re-read the corpus and overwrite the stored index
        #[arg(long)]
        rebuild: bool,
    },
    /// Search the index and print matching chunks with their scores
    Query {
        /// Text to search for
        text: String,
        /// Minimum relevance score, overriding the configured one
        #[arg(long)]
        threshold: Option<f32>,
        /// Maximum number of results
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Answer a customer question using the indexed corpus
    Ask {
        /// The customer's question
        question: String,
        /// Minimum relevance score, overriding the configured one
        #[arg(long)]
        threshold: Option<f32>,
    },
    /// Show corpus, index and service status
    Status,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Index { rebuild } => {
            build_index(&App::new(Config::load()?), rebuild)?;
        }
        Commands::Query {
            text,
            threshold,
            limit,
        } => {
            run_query(&App::new(Config::load()?), &text, threshold, limit)?;
        }
        Commands::Ask {
            question,
            threshold,
        } => {
            ask_question(&App::new(Config::load()?), &question, threshold)?;
        }
        Commands::Status => {
            show_status(&Config::load()?)?;
        }
    }

    Ok(())
}
