
use fancy_regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Result, RetrievalError};

/// Matches a leading enumeration marker such as `1.` or `12.`.
pub const DEFAULT_SEPARATOR: &str = r"\d+\.";
pub const DEFAULT_CHUNK_SIZE: usize = 100;

/// A contiguous span of the source corpus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// The chunk text, byte-for-byte as it appeared in the source
    pub text: String,
    /// Sequence position of this chunk within the corpus
    pub position: usize,
    /// Byte offset of the first character of `text` in the source
    pub offset: usize,
}

/// What happens to the text matched by the separator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeparatorMode {
    /// The separator is removed from the output
    #[default]
    Discard,
    /// The separator is kept at the start of the chunk that follows it
    Leading,
}

/// Configuration for corpus chunking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Pattern that marks chunk boundaries
    pub separator: String,
    /// Whether `separator` is a regular expression or a literal string
    pub is_regex: bool,
    /// Maximum chunk size in characters
    pub chunk_size: usize,
    /// Characters shared between adjacent windows of an oversized segment
    pub chunk_overlap: usize,
    /// Separator retention policy
    pub keep_separator: SeparatorMode,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            separator: DEFAULT_SEPARATOR.to_string(),
            is_regex: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: 0,
            keep_separator: SeparatorMode::Discard,
        }
    }
}

/// Splits a raw corpus into [`Chunk`]s.
///
/// The corpus is cut at every separator match. Empty segments are dropped and
/// whitespace-only segments are attached to their neighbour, so with zero
/// overlap the chunks concatenate back to the corpus minus the discarded
/// separators. Segments longer than `chunk_size` characters are windowed,
/// preferring to cut after whitespace.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    separator: Regex,
    config: ChunkingConfig,
}

impl TextSplitter {
    #[inline]
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        if config.separator.is_empty() {
            return Err(RetrievalError::Config(
                "Chunk separator cannot be empty".to_string(),
            ));
        }
        if config.chunk_size == 0 {
            return Err(RetrievalError::Config(
                "Chunk size must be greater than zero".to_string(),
            ));
        }
        if config.chunk_overlap >= config.chunk_size {
            return Err(RetrievalError::Config(format!(
                "Chunk overlap ({}) must be smaller than chunk size ({})",
                config.chunk_overlap, config.chunk_size
            )));
        }

        let pattern = if config.is_regex {
            config.separator.clone()
        } else {
            fancy_regex::escape(&config.separator).into_owned()
        };
        let separator = Regex::new(&pattern).map_err(|e| {
            RetrievalError::Config(format!(
                "Invalid separator pattern '{}': {}",
                config.separator, e
            ))
        })?;

        Ok(Self { separator, config })
    }

    #[inline]
    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Split `text` into chunks
    #[inline]
    pub fn split(&self, text: &str) -> Result<Vec<Chunk>> {
        let segments = self.segments(text)?;
        let pieces = attach_whitespace(segments);

        let mut windows = Vec::new();
        for (offset, piece) in &pieces {
            self.window(*offset, piece, &mut windows);
        }

        let chunks: Vec<Chunk> = windows
            .into_iter()
            .enumerate()
            .map(|(position, (offset, text))| Chunk {
                text,
                position,
                offset,
            })
            .collect();

        debug!(
            "Split {} bytes into {} chunks (avg {} chars)",
            text.len(),
            chunks.len(),
            chunks.iter().map(|c| c.text.chars().count()).sum::<usize>() / chunks.len().max(1)
        );

        Ok(chunks)
    }

    /// Cut the text at separator matches, returning `(byte offset, segment)` pairs
    fn segments<'t>(&self, text: &'t str) -> Result<Vec<(usize, &'t str)>> {
        let mut segments = Vec::new();
        let mut start = 0;

        for found in self.separator.find_iter(text) {
            let found = found.map_err(|e| {
                RetrievalError::Config(format!("Separator matching failed: {}", e))
            })?;
            if found.start() == found.end() {
                continue;
            }

            segments.push((start, &text[start..found.start()]));
            start = match self.config.keep_separator {
                SeparatorMode::Discard => found.end(),
                SeparatorMode::Leading => found.start(),
            };
        }
        segments.push((start, &text[start..]));

        Ok(segments)
    }

    /// Cut an oversized piece into windows of at most `chunk_size` characters
    fn window(&self, offset: usize, piece: &str, out: &mut Vec<(usize, String)>) {
        let size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;

        let chars: Vec<(usize, char)> = piece.char_indices().collect();
        let total = chars.len();
        if total <= size {
            out.push((offset, piece.to_string()));
            return;
        }

        let byte_at = |k: usize| chars.get(k).map_or(piece.len(), |(i, _)| *i);

        let mut start = 0;
        loop {
            let mut end = (start + size).min(total);
            if end < total {
                // Cut just after the last whitespace in the second half of the window
                let floor = start + size / 2;
                if let Some(k) = (floor + 1..=end)
                    .rev()
                    .find(|&k| chars[k - 1].1.is_whitespace())
                {
                    end = k;
                }
            }

            let (from, to) = (byte_at(start), byte_at(end));
            out.push((offset + from, piece[from..to].to_string()));

            if end >= total {
                break;
            }
            let next = end.saturating_sub(overlap);
            start = if next > start { next } else { end };
        }
    }
}

/// Drop empty segments and glue whitespace-only ones onto a neighbour
fn attach_whitespace(segments: Vec<(usize, &str)>) -> Vec<(usize, String)> {
    let mut pieces: Vec<(usize, String)> = Vec::new();
    let mut leading: Option<(usize, String)> = None;

    for (offset, segment) in segments {
        if segment.is_empty() {
            continue;
        }

        if segment.trim().is_empty() {
            if let Some((_, last)) = pieces.last_mut() {
                last.push_str(segment);
            } else if let Some((_, prefix)) = leading.as_mut() {
                prefix.push_str(segment);
            } else {
                leading = Some((offset, segment.to_string()));
            }
            continue;
        }

        match leading.take() {
            Some((prefix_offset, mut prefix)) => {
                prefix.push_str(segment);
                pieces.push((prefix_offset, prefix));
            }
            None => pieces.push((offset, segment.to_string())),
        }
    }

    // Whitespace-only input still yields its single chunk
    if let Some(prefix) = leading {
        pieces.push(prefix);
    }

    pieces
}
