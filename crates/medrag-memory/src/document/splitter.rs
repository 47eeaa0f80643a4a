use super::error::ChunkingError;
use super::types::Chunk;
use crate::tokens::estimate_tokens;

#[derive(Debug, Clone)]
pub struct SplitterConfig {
    /// Target chunk size in characters.
    pub chunk_size: usize,
    /// Characters repeated from the end of each chunk at the start of the next.
    pub chunk_overlap: usize,
    /// Embedding model input limit; larger chunks are rejected.
    pub max_chunk_tokens: usize,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            max_chunk_tokens: 8191,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TextSplitter {
    config: SplitterConfig,
}

impl TextSplitter {
    /// # Errors
    ///
    /// Returns [`ChunkingError::InvalidConfig`] if `chunk_size` is zero or the
    /// overlap is not smaller than the chunk size.
    pub fn new(config: SplitterConfig) -> Result<Self, ChunkingError> {
        if config.chunk_size == 0 {
            return Err(ChunkingError::InvalidConfig(
                "chunk_size must be greater than zero".into(),
            ));
        }
        if config.chunk_overlap >= config.chunk_size {
            return Err(ChunkingError::InvalidConfig(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                config.chunk_overlap, config.chunk_size
            )));
        }
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> &SplitterConfig {
        &self.config
    }

    /// Split text into ordered, overlapping chunks.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkingError::ChunkTooLarge`] if a chunk exceeds the
    /// embedding input limit.
    pub fn split(&self, text: &str) -> Result<Vec<Chunk>, ChunkingError> {
        let spans = split_spans(text, self.config.chunk_size, self.config.chunk_overlap);
        let chars: Vec<char> = text.chars().collect();

        let mut chunks = Vec::with_capacity(spans.len());
        for (index, (start, end)) in spans.into_iter().enumerate() {
            let content: String = chars[start..end].iter().collect();
            let tokens = estimate_tokens(&content);
            if tokens > self.config.max_chunk_tokens {
                return Err(ChunkingError::ChunkTooLarge {
                    index,
                    tokens,
                    limit: self.config.max_chunk_tokens,
                });
            }
            chunks.push(Chunk {
                content,
                chunk_index: index,
                overlap: if index == 0 {
                    0
                } else {
                    self.config.chunk_overlap
                },
            });
        }
        Ok(chunks)
    }
}

/// Normalize line endings and strip surrounding whitespace before chunking.
#[must_use]
pub fn clean_text(text: &str) -> String {
    text.replace("\r\n", "\n").trim().to_owned()
}

/// Character spans `[start, end)` of each chunk. Requires `overlap < size`.
fn split_spans(text: &str, size: usize, overlap: usize) -> Vec<(usize, usize)> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    if len == 0 {
        return Vec::new();
    }

    let mut spans = Vec::new();
    let mut start = 0;
    loop {
        let limit = (start + size).min(len);
        let end = if limit == len {
            len
        } else {
            find_boundary(&chars, start, limit, size, overlap).unwrap_or(limit)
        };
        spans.push((start, end));
        if end == len {
            break;
        }
        start = end - overlap;
    }
    spans
}

/// Last paragraph break, else last sentence end, in `chars[start..limit]` that
/// falls in the second half of the window and past the overlap.
fn find_boundary(
    chars: &[char],
    start: usize,
    limit: usize,
    size: usize,
    overlap: usize,
) -> Option<usize> {
    let min_cut = start + (size / 2).max(overlap + 1);
    if min_cut > limit {
        return None;
    }

    let mut sentence_cut = None;
    for i in (start..limit.saturating_sub(1)).rev() {
        let next = chars[i + 1];
        // cut points: after "\n\n" or right after the sentence terminator
        if chars[i] == '\n' && next == '\n' && i + 2 <= limit && i + 2 >= min_cut {
            return Some(i + 2);
        }
        if sentence_cut.is_none()
            && matches!(chars[i], '.' | '?' | '!')
            && next.is_whitespace()
            && i + 1 >= min_cut
        {
            sentence_cut = Some(i + 1);
        }
        if i + 2 < min_cut {
            break;
        }
    }
    sentence_cut
}
