//! Question answering over retrieved context.
//!
//! An ask runs through a fixed sequence of stages tracked by [`AskProgress`].
//! A stage is never re-entered: once the query is embedded and the search has
//! run, a completion failure ends the ask instead of repeating earlier work.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use medrag_llm::provider::LlmProvider;
use medrag_llm::with_timeout;
use medrag_memory::document::MetadataFilter;
use medrag_memory::{Caller, estimate_tokens};

use crate::assembler::assemble;
use crate::error::RagError;
use crate::prompt::{NO_CONTEXT_NOTE, build_messages};
use crate::retriever::Retriever;
use crate::types::{Answer, SearchResult};

#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub timeout: Duration,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AskStage {
    EmbeddingQuery,
    RetrievingContext,
    AssemblingPrompt,
    AwaitingCompletion,
    Done,
    Failed(String),
}

impl AskStage {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }

    fn next(&self) -> Option<Self> {
        match self {
            Self::EmbeddingQuery => Some(Self::RetrievingContext),
            Self::RetrievingContext => Some(Self::AssemblingPrompt),
            Self::AssemblingPrompt => Some(Self::AwaitingCompletion),
            Self::AwaitingCompletion => Some(Self::Done),
            Self::Done | Self::Failed(_) => None,
        }
    }
}

impl fmt::Display for AskStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmbeddingQuery => f.write_str("embedding_query"),
            Self::RetrievingContext => f.write_str("retrieving_context"),
            Self::AssemblingPrompt => f.write_str("assembling_prompt"),
            Self::AwaitingCompletion => f.write_str("awaiting_completion"),
            Self::Done => f.write_str("done"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Forward-only stage tracker. There is no way to name a target stage, so
/// progress can only move to the successor or to `Failed`.
#[derive(Debug, Clone)]
pub struct AskProgress {
    history: Vec<AskStage>,
}

impl Default for AskProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl AskProgress {
    #[must_use]
    pub fn new() -> Self {
        Self {
            history: vec![AskStage::EmbeddingQuery],
        }
    }

    #[must_use]
    pub fn current(&self) -> &AskStage {
        // history always holds the initial stage
        &self.history[self.history.len() - 1]
    }

    #[must_use]
    pub fn history(&self) -> &[AskStage] {
        &self.history
    }

    /// Move to the next stage. Returns `false` if the ask already ended.
    pub fn advance(&mut self) -> bool {
        let Some(next) = self.current().next() else {
            tracing::warn!(stage = %self.current(), "ask already finished, ignoring advance");
            return false;
        };
        tracing::debug!(from = %self.current(), to = %next, "ask stage");
        self.history.push(next);
        true
    }

    /// End the ask with `reason`. Returns `false` if it already ended.
    pub fn fail(&mut self, reason: impl Into<String>) -> bool {
        if self.current().is_terminal() {
            return false;
        }
        let failed = AskStage::Failed(reason.into());
        tracing::warn!(from = %self.current(), to = %failed, "ask stage");
        self.history.push(failed);
        true
    }
}

/// Runs the ask flow: embed, retrieve, assemble, prompt and complete.
pub struct CompletionOrchestrator<P> {
    retriever: Retriever<P>,
    provider: Arc<P>,
    config: CompletionConfig,
}

impl<P: LlmProvider> CompletionOrchestrator<P> {
    #[must_use]
    pub fn new(retriever: Retriever<P>, provider: Arc<P>, config: CompletionConfig) -> Self {
        Self {
            retriever,
            provider,
            config,
        }
    }

    #[must_use]
    pub fn retriever(&self) -> &Retriever<P> {
        &self.retriever
    }

    /// Answer `question` for `caller`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Embedding`] or [`RagError::Store`] if retrieval fails
    /// and [`RagError::CompletionFailure`] if the completion model fails.
    pub async fn ask(
        &self,
        caller: &Caller,
        question: &str,
        filter: MetadataFilter,
        limit: Option<usize>,
    ) -> Result<Answer, RagError> {
        let mut progress = AskProgress::new();
        let result = self
            .run(&mut progress, caller, question, filter, limit)
            .await;
        if let Err(e) = &result {
            progress.fail(e.to_string());
        }
        result
    }

    async fn run(
        &self,
        progress: &mut AskProgress,
        caller: &Caller,
        question: &str,
        filter: MetadataFilter,
        limit: Option<usize>,
    ) -> Result<Answer, RagError> {
        let vector = self.retriever.embed_query(question).await?;
        progress.advance();

        let hits = self
            .retriever
            .retrieve(caller, vector, filter, limit)
            .await?;
        progress.advance();

        let context = assemble(&hits, self.retriever.config().max_context_tokens);
        let messages = build_messages(caller.role, &context, question);
        progress.advance();

        let mut response = with_timeout(
            "chat",
            self.config.timeout,
            self.provider.chat(&messages),
        )
        .await
        .map_err(RagError::CompletionFailure)?;
        progress.advance();

        let context_used = !context.is_empty();
        if !context_used {
            response.push_str(NO_CONTEXT_NOTE);
        }
        tracing::info!(
            user_id = %caller.user_id,
            sources = context.len(),
            context_tokens = context.total_tokens,
            context_used,
            "question answered"
        );

        Ok(Answer {
            token_count: estimate_tokens(&response),
            response,
            sources: context
                .entries
                .into_iter()
                .map(|entry| SearchResult::from(entry.hit))
                .collect(),
            context_used,
        })
    }
}
