// Retrieval-augmented answering: search the index, stuff hits into a prompt


use std::sync::Arc;

use itertools::Itertools;
use tracing::{debug, info, warn};

use crate::Result;
use crate::generation::TextGenerator;
use crate::index_manager::IndexHandle;
use crate::vector::{FlatIndex, ScoredChunk, SearchOptions, VectorIndex};

const PERSONA: &str = "You are a polite and experienced consumer electronics salesperson.";
const INSTRUCTIONS: &str = "Use the following pieces of context to answer the customer's question at the end. \
If the context does not contain the answer, say that you don't know rather than making one up.";

/// Outcome of [`RetrievalQa::answer`]
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    /// Generated from indexed chunks
    Grounded {
        text: String,
        sources: Vec<ScoredChunk>,
    },
    /// Nothing in the index cleared the threshold, or the search failed.
    /// Callers should try another source.
    NoRelevantResult,
}

impl Answer {
    #[inline]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Grounded { text, .. } => Some(text),
            Self::NoRelevantResult => None,
        }
    }
}

/// Question answering over a shared index
pub struct RetrievalQa<I: VectorIndex = FlatIndex> {
    index: Arc<IndexHandle<I>>,
    generator: Arc<dyn TextGenerator>,
    options: SearchOptions,
}

impl<I: VectorIndex> RetrievalQa<I> {
    #[inline]
    pub fn new(
        index: Arc<IndexHandle<I>>,
        generator: Arc<dyn TextGenerator>,
        options: SearchOptions,
    ) -> Self {
        Self {
            index,
            generator,
            options,
        }
    }

    #[inline]
    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    /// Answer `question` from the index.
    ///
    /// Search failures degrade to [`Answer::NoRelevantResult`]; only a failing
    /// generator is reported as an error.
    #[inline]
    pub fn answer(&self, question: &str) -> Result<Answer> {
        let index = self.index.snapshot();
        let hits = match index.search(question, &self.options) {
            Ok(hits) => hits,
            Err(e) => {
                warn!("Index search failed, treating as no result: {}", e);
                return Ok(Answer::NoRelevantResult);
            }
        };

        if hits.is_empty() {
            info!(
                "No chunk scored at least {} for the question",
                self.options.threshold
            );
            return Ok(Answer::NoRelevantResult);
        }

        debug!(
            "Answering from {} chunks (best score {:.3})",
            hits.len(),
            hits[0].score
        );
        let prompt = build_prompt(question, &hits);
        let text = self.generator.generate(&prompt)?;

        Ok(Answer::Grounded {
            text,
            sources: hits,
        })
    }
}

/// Prompt with every hit's text as context, followed by the question
#[inline]
pub fn build_prompt(question: &str, hits: &[ScoredChunk]) -> String {
    let context = hits.iter().map(|hit| hit.chunk.text.trim()).join("\n\n");
    format!(
        "{PERSONA}\n{INSTRUCTIONS}\n\n{context}\n\nQuestion: {question}\nHelpful Answer:",
        question = question.trim()
    )
}
