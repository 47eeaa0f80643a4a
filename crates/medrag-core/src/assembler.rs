//! Token-budgeted context assembly over ranked hits.

use medrag_memory::estimate_tokens;
use medrag_memory::vector_store::ScoredChunk;

#[derive(Debug, Clone, PartialEq)]
pub struct ContextEntry {
    pub hit: ScoredChunk,
    pub tokens: usize,
}

/// Ranked chunks selected for a prompt, within the token budget.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryContext {
    pub entries: Vec<ContextEntry>,
    pub total_tokens: usize,
}

impl QueryContext {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Take hits in rank order while they fit in `budget` tokens.
///
/// Stops at the first hit that does not fit; chunks are never truncated.
#[must_use]
pub fn assemble(hits: &[ScoredChunk], budget: usize) -> QueryContext {
    let mut context = QueryContext::default();
    for hit in hits {
        let tokens = estimate_tokens(&hit.content);
        if context.total_tokens + tokens > budget {
            break;
        }
        context.total_tokens += tokens;
        context.entries.push(ContextEntry {
            hit: hit.clone(),
            tokens,
        });
    }
    context
}
