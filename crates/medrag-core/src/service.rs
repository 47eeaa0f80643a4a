use std::sync::Arc;

use medrag_llm::provider::LlmProvider;
use medrag_memory::document::{
    DocumentPatch, DocumentRecord, IngestionPipeline, MetadataFilter, NewDocument,
    StoredDocument, TextSplitter,
};
use medrag_memory::vector_store::{DocumentQuery, Visibility};
use medrag_memory::{AccessPolicy, Caller, DocumentId, VectorStore};

use crate::config::Config;
use crate::error::RagError;
use crate::orchestrator::CompletionOrchestrator;
use crate::retriever::Retriever;
use crate::types::{Answer, IngestReport, SearchResult};

pub const DEFAULT_LIST_LIMIT: usize = 100;
pub const MAX_LIST_LIMIT: usize = 1000;

/// Entry point for ingestion, document management, search and ask.
///
/// Every operation takes the [`Caller`] explicitly; the service holds no
/// per-request state and can be shared behind an `Arc`.
pub struct RagService<P> {
    pipeline: IngestionPipeline<P>,
    orchestrator: CompletionOrchestrator<P>,
    store: Arc<dyn VectorStore>,
    policy: Arc<dyn AccessPolicy>,
}

impl<P: LlmProvider> RagService<P> {
    /// Wire the service from loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Chunking`] if the chunking settings are invalid.
    pub fn from_config(
        config: &Config,
        provider: Arc<P>,
        store: Arc<dyn VectorStore>,
        policy: Arc<dyn AccessPolicy>,
    ) -> Result<Self, RagError> {
        let retrieval = config.retrieval_config();
        let pipeline = IngestionPipeline::new(
            TextSplitter::new(config.splitter_config())?,
            Arc::clone(&provider),
            Arc::clone(&store),
            retrieval.embedding_dimensions,
            retrieval.embed_timeout,
        );
        let retriever = Retriever::new(
            Arc::clone(&provider),
            Arc::clone(&store),
            Arc::clone(&policy),
            retrieval,
        );
        let orchestrator =
            CompletionOrchestrator::new(retriever, provider, config.completion_config());
        Ok(Self {
            pipeline,
            orchestrator,
            store,
            policy,
        })
    }

    /// Chunk, embed and store a new document owned by `caller`.
    ///
    /// # Errors
    ///
    /// [`RagError::Forbidden`] if the caller may not create documents, otherwise
    /// any ingestion failure. Nothing is stored on failure.
    pub async fn ingest(
        &self,
        caller: &Caller,
        document: NewDocument,
    ) -> Result<IngestReport, RagError> {
        if !self.policy.can_create(caller) {
            return Err(RagError::Forbidden("not authorized to create documents"));
        }
        if document.title.trim().is_empty() {
            return Err(RagError::InvalidRequest("title must not be empty".into()));
        }
        let record = self.pipeline.ingest(document, caller.user_id).await?;
        Ok(record.into())
    }

    /// Replace a document's content and rebuild its chunks.
    ///
    /// # Errors
    ///
    /// [`RagError::NotFound`], [`RagError::Forbidden`] or an ingestion failure.
    pub async fn reingest(
        &self,
        caller: &Caller,
        id: DocumentId,
        content: &str,
    ) -> Result<IngestReport, RagError> {
        self.writable(caller, id).await?;
        let record = self.pipeline.reingest(id, content).await?;
        Ok(record.into())
    }

    /// # Errors
    ///
    /// [`RagError::InvalidRequest`] for an empty patch, [`RagError::NotFound`] or
    /// [`RagError::Forbidden`].
    pub async fn update_metadata(
        &self,
        caller: &Caller,
        id: DocumentId,
        patch: DocumentPatch,
    ) -> Result<DocumentRecord, RagError> {
        if patch.is_empty() {
            return Err(RagError::InvalidRequest("no fields to update".into()));
        }
        if patch.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(RagError::InvalidRequest("title must not be empty".into()));
        }
        self.writable(caller, id).await?;
        let record = self.store.update_metadata(id, patch).await?;
        tracing::info!(
            document_id = %id,
            user_id = %caller.user_id,
            "document metadata updated"
        );
        Ok(record)
    }

    /// # Errors
    ///
    /// [`RagError::NotFound`] if the document does not exist and
    /// [`RagError::Forbidden`] if the caller may not read it.
    pub async fn get_document(
        &self,
        caller: &Caller,
        id: DocumentId,
    ) -> Result<StoredDocument, RagError> {
        let document = self.load(id).await?;
        if !self.policy.can_read(caller, &document.record) {
            return Err(RagError::Forbidden("not authorized to access this document"));
        }
        Ok(document)
    }

    /// Documents visible to `caller`, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Store`] if the store query fails.
    pub async fn list_documents(
        &self,
        caller: &Caller,
        filter: MetadataFilter,
        skip: usize,
        limit: Option<usize>,
    ) -> Result<Vec<DocumentRecord>, RagError> {
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
        let documents = self
            .store
            .list_documents(DocumentQuery {
                filter,
                visibility: Visibility::new(caller.clone(), Arc::clone(&self.policy)),
                skip,
                limit,
            })
            .await?;
        Ok(documents)
    }

    /// Delete a document and all of its chunks.
    ///
    /// # Errors
    ///
    /// [`RagError::NotFound`] or [`RagError::Forbidden`].
    pub async fn delete_document(&self, caller: &Caller, id: DocumentId) -> Result<(), RagError> {
        self.writable(caller, id).await?;
        if !self.store.delete_document(id).await? {
            return Err(RagError::NotFound(id));
        }
        tracing::info!(document_id = %id, user_id = %caller.user_id, "document deleted");
        Ok(())
    }

    /// Ranked chunks relevant to `query` that the caller is allowed to read.
    ///
    /// # Errors
    ///
    /// [`RagError::InvalidRequest`] for a blank query, otherwise embedding or
    /// store failures.
    pub async fn search(
        &self,
        caller: &Caller,
        query: &str,
        filter: MetadataFilter,
        limit: Option<usize>,
    ) -> Result<Vec<SearchResult>, RagError> {
        let query = non_blank(query, "query")?;
        let hits = self
            .orchestrator
            .retriever()
            .search(caller, query, filter, limit)
            .await?;
        Ok(hits.into_iter().map(SearchResult::from).collect())
    }

    /// Answer `question` grounded on the documents visible to `caller`.
    ///
    /// # Errors
    ///
    /// [`RagError::InvalidRequest`] for a blank question,
    /// [`RagError::CompletionFailure`] if the completion model fails, otherwise
    /// embedding or store failures.
    pub async fn ask(
        &self,
        caller: &Caller,
        question: &str,
        filter: MetadataFilter,
        limit: Option<usize>,
    ) -> Result<Answer, RagError> {
        let question = non_blank(question, "question")?;
        self.orchestrator.ask(caller, question, filter, limit).await
    }

    async fn load(&self, id: DocumentId) -> Result<StoredDocument, RagError> {
        self.store
            .get_document(id)
            .await?
            .ok_or(RagError::NotFound(id))
    }

    async fn writable(&self, caller: &Caller, id: DocumentId) -> Result<(), RagError> {
        let document = self.load(id).await?;
        if !self.policy.can_write(caller, &document.record) {
            return Err(RagError::Forbidden("not authorized to modify this document"));
        }
        Ok(())
    }
}

fn non_blank<'a>(text: &'a str, field: &str) -> Result<&'a str, RagError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(RagError::InvalidRequest(format!("{field} must not be empty")));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests;
