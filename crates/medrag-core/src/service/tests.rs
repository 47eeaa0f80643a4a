use std::sync::Arc;

use medrag_llm::mock::{MockFailure, MockProvider};
use medrag_llm::provider::Role;
use medrag_memory::document::{DocumentPatch, MetadataFilter, NewDocument};
use medrag_memory::{Caller, CallerRole, DocumentId, InMemoryVectorStore, RolePolicy};

use super::RagService;
use crate::config::Config;
use crate::error::RagError;
use crate::prompt::NO_CONTEXT_NOTE;

const DIMS: usize = 256;

fn service_with(mock: MockProvider) -> (RagService<MockProvider>, Arc<MockProvider>) {
    service_with_config(Config::default(), mock)
}

fn service_with_config(
    mut config: Config,
    mock: MockProvider,
) -> (RagService<MockProvider>, Arc<MockProvider>) {
    config.llm.embedding_dimensions = DIMS;
    let provider = Arc::new(mock.with_dimensions(DIMS));
    let service = RagService::from_config(
        &config,
        Arc::clone(&provider),
        Arc::new(InMemoryVectorStore::new(DIMS)),
        Arc::new(RolePolicy),
    )
    .unwrap();
    (service, provider)
}

fn doctor() -> Caller {
    Caller::new(1, CallerRole::Doctor, Some("cardiology"))
}

fn nurse() -> Caller {
    Caller::new(2, CallerRole::Nurse, Some("cardiology"))
}

fn document(title: &str, content: &str) -> NewDocument {
    NewDocument {
        title: title.into(),
        content: content.into(),
        document_type: "protocol".into(),
        department: None,
        is_sensitive: false,
        patient_id: None,
    }
}

fn sensitive(title: &str, content: &str) -> NewDocument {
    NewDocument {
        department: Some("cardiology".into()),
        is_sensitive: true,
        ..document(title, content)
    }
}

#[tokio::test]
async fn ingested_document_is_found_by_search() {
    let (service, _) = service_with(MockProvider::default());
    let report = service
        .ingest(
            &doctor(),
            document(
                "Hand hygiene",
                "Wash hands with soap for twenty seconds before patient contact.",
            ),
        )
        .await
        .unwrap();
    assert_eq!(report.chunk_count, 1);

    let results = service
        .search(&doctor(), "wash hands soap", MetadataFilter::default(), None)
        .await
        .unwrap();
    assert_eq!(results[0].document_id, report.document_id);
    assert_eq!(results[0].document_title, "Hand hygiene");
    assert!(results[0].similarity >= 0.3 && results[0].similarity <= 1.0);
}

#[tokio::test]
async fn multi_chunk_document_is_found_by_its_own_content() {
    let (service, _) = service_with(MockProvider::default());
    let content = [
        "Insulin pens must be stored in the refrigerator before first use. ".repeat(14),
        "Central line dressings are changed every seven days or when soiled. ".repeat(13),
        "Fall risk assessments are repeated after every transfer between wards. ".repeat(12),
    ]
    .join("\n\n");
    let report = service
        .ingest(&doctor(), document("Nursing handbook", &content))
        .await
        .unwrap();
    assert!(report.chunk_count > 1);
    service
        .ingest(
            &doctor(),
            document("Parking", "Visitor parking permits are issued at reception."),
        )
        .await
        .unwrap();

    let results = service
        .search(&doctor(), &content, MetadataFilter::default(), Some(10))
        .await
        .unwrap();
    let threshold = Config::default().rag.similarity_threshold;
    assert!(results.iter().all(|r| r.similarity >= threshold));

    let mut top: Vec<usize> = results[..report.chunk_count]
        .iter()
        .map(|r| {
            assert_eq!(r.document_id, report.document_id);
            r.chunk_index
        })
        .collect();
    top.sort_unstable();
    assert_eq!(top, (0..report.chunk_count).collect::<Vec<_>>());
}

#[tokio::test]
async fn empty_store_search_and_ask() {
    let (service, provider) = service_with(MockProvider::default());
    let results = service
        .search(&nurse(), "insulin", MetadataFilter::default(), None)
        .await
        .unwrap();
    assert!(results.is_empty());

    let answer = service
        .ask(&nurse(), "insulin storage?", MetadataFilter::default(), None)
        .await
        .unwrap();
    assert!(!answer.context_used);
    assert!(answer.sources.is_empty());
    assert!(answer.response.starts_with("mock response"));
    assert!(answer.response.ends_with(NO_CONTEXT_NOTE));
    assert_eq!(provider.chat_calls(), 1);
    assert_eq!(provider.last_messages().len(), 2);
}

#[tokio::test]
async fn ask_uses_retrieved_context() {
    let (service, provider) = service_with(MockProvider::with_responses(vec![
        "Twenty seconds.".into(),
    ]));
    service
        .ingest(
            &doctor(),
            document("Hand hygiene", "Wash hands with soap for twenty seconds."),
        )
        .await
        .unwrap();

    let answer = service
        .ask(
            &nurse(),
            "how long to wash hands with soap",
            MetadataFilter::default(),
            None,
        )
        .await
        .unwrap();
    assert!(answer.context_used);
    assert_eq!(answer.response, "Twenty seconds.");
    assert_eq!(answer.token_count, 4);
    assert_eq!(answer.sources.len(), 1);
    assert_eq!(answer.sources[0].document_title, "Hand hygiene");

    let messages = provider.last_messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[1].role, Role::System);
    assert!(
        messages[1]
            .content
            .contains("Document: Hand hygiene\nContent: Wash hands")
    );
    assert_eq!(messages[2].content, "how long to wash hands with soap");
}

#[tokio::test]
async fn unreadable_document_never_surfaces() {
    let (service, _) = service_with(MockProvider::default());
    let hidden = service
        .ingest(
            &doctor(),
            sensitive("Digoxin", "Digoxin dosing for atrial fibrillation patients."),
        )
        .await
        .unwrap();
    service
        .ingest(
            &doctor(),
            document(
                "Overview",
                "Digoxin dosing for atrial fibrillation, general staff overview.",
            ),
        )
        .await
        .unwrap();

    let query = "digoxin dosing atrial fibrillation patients";
    let for_doctor = service
        .search(&doctor(), query, MetadataFilter::default(), None)
        .await
        .unwrap();
    assert_eq!(for_doctor[0].document_id, hidden.document_id);

    let for_nurse = service
        .search(&nurse(), query, MetadataFilter::default(), None)
        .await
        .unwrap();
    assert!(!for_nurse.is_empty());
    assert!(for_nurse.iter().all(|r| r.document_id != hidden.document_id));

    let answer = service
        .ask(&nurse(), query, MetadataFilter::default(), None)
        .await
        .unwrap();
    assert!(
        answer
            .sources
            .iter()
            .all(|r| r.document_id != hidden.document_id)
    );
}

#[tokio::test]
async fn completion_failure_does_not_repeat_search() {
    let (service, provider) =
        service_with(MockProvider::default().failing_chat(MockFailure::Transient));
    service
        .ingest(&doctor(), document("Triage", "Triage levels one to five."))
        .await
        .unwrap();
    assert_eq!(provider.embed_calls(), 1);

    let err = service
        .ask(&doctor(), "triage levels", MetadataFilter::default(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::CompletionFailure(_)));
    assert_eq!(provider.embed_calls(), 2);
    assert_eq!(provider.chat_calls(), 1);
}

#[tokio::test]
async fn embedding_failure_stores_nothing() {
    let (service, _) =
        service_with(MockProvider::default().failing_embed(MockFailure::Transient));
    let err = service
        .ingest(&doctor(), document("Triage", "Triage levels."))
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::Embedding(_)));

    let listed = service
        .list_documents(&doctor(), MetadataFilter::default(), 0, None)
        .await
        .unwrap();
    assert!(listed.is_empty());
}

#[tokio::test]
async fn blank_query_is_rejected_before_embedding() {
    let (service, provider) = service_with(MockProvider::default());
    let err = service
        .search(&doctor(), "   ", MetadataFilter::default(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::InvalidRequest(_)));
    assert_eq!(provider.embed_calls(), 0);
}

#[tokio::test]
async fn over_long_query_is_rejected_before_embedding() {
    let mut config = Config::default();
    config.llm.max_input_tokens = 10;
    let (service, provider) = service_with_config(config, MockProvider::default());
    let question = "what is the maximum dose of paracetamol for adults";
    assert!(medrag_memory::estimate_tokens(question) > 10);

    let err = service
        .search(&doctor(), question, MetadataFilter::default(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::InvalidRequest(_)));
    let err = service
        .ask(&doctor(), question, MetadataFilter::default(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::InvalidRequest(_)));
    assert_eq!(provider.embed_calls(), 0);
    assert_eq!(provider.chat_calls(), 0);

    let ok = service
        .search(&doctor(), "paracetamol dose", MetadataFilter::default(), None)
        .await;
    assert!(ok.is_ok());
}

#[tokio::test]
async fn search_limit_is_clamped() {
    let (service, _) = service_with(MockProvider::default());
    for title in ["a", "b", "c"] {
        service
            .ingest(&doctor(), document(title, "Sepsis bundle checklist."))
            .await
            .unwrap();
    }
    let results = service
        .search(&doctor(), "sepsis bundle", MetadataFilter::default(), Some(0))
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    // equal scores fall back to document id order
    assert_eq!(results[0].document_title, "a");
}

#[tokio::test]
async fn nurse_cannot_create_or_modify() {
    let (service, _) = service_with(MockProvider::default());
    let err = service
        .ingest(&nurse(), document("Notes", "Shift notes."))
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::Forbidden(_)));

    let report = service
        .ingest(&doctor(), document("Notes", "Shift notes."))
        .await
        .unwrap();
    let err = service
        .delete_document(&nurse(), report.document_id)
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::Forbidden(_)));
}

#[tokio::test]
async fn get_document_checks_read_access() {
    let (service, _) = service_with(MockProvider::default());
    let report = service
        .ingest(&doctor(), sensitive("Case", "Patient history."))
        .await
        .unwrap();

    let stored = service
        .get_document(&doctor(), report.document_id)
        .await
        .unwrap();
    assert_eq!(stored.content, "Patient history.");

    let err = service
        .get_document(&nurse(), report.document_id)
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::Forbidden(_)));

    let err = service
        .get_document(&doctor(), DocumentId(999))
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::NotFound(DocumentId(999))));
}

#[tokio::test]
async fn update_metadata_and_delete() {
    let (service, _) = service_with(MockProvider::default());
    let report = service
        .ingest(&doctor(), document("Draft", "Discharge checklist."))
        .await
        .unwrap();

    let err = service
        .update_metadata(&doctor(), report.document_id, DocumentPatch::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::InvalidRequest(_)));

    let updated = service
        .update_metadata(
            &doctor(),
            report.document_id,
            DocumentPatch {
                title: Some("Discharge".into()),
                ..DocumentPatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.title, "Discharge");

    service
        .delete_document(&doctor(), report.document_id)
        .await
        .unwrap();
    let err = service
        .delete_document(&doctor(), report.document_id)
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::NotFound(_)));
}

#[tokio::test]
async fn reingest_rebuilds_chunks() {
    let (service, _) = service_with(MockProvider::default());
    let report = service
        .ingest(&doctor(), document("Guide", "Short guide."))
        .await
        .unwrap();
    assert_eq!(report.chunk_count, 1);

    let long = "a".repeat(2500);
    let report = service
        .reingest(&doctor(), report.document_id, &long)
        .await
        .unwrap();
    assert_eq!(report.chunk_count, 3);

    let err = service
        .reingest(&doctor(), report.document_id, "  ")
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::InvalidRequest(_)));
}

#[tokio::test]
async fn list_documents_respects_visibility() {
    let (service, _) = service_with(MockProvider::default());
    service
        .ingest(&doctor(), sensitive("Case", "Patient history."))
        .await
        .unwrap();
    service
        .ingest(&doctor(), document("Policy", "Visiting hours."))
        .await
        .unwrap();

    let for_doctor = service
        .list_documents(&doctor(), MetadataFilter::default(), 0, None)
        .await
        .unwrap();
    assert_eq!(for_doctor.len(), 2);

    let for_nurse = service
        .list_documents(&nurse(), MetadataFilter::default(), 0, None)
        .await
        .unwrap();
    assert_eq!(for_nurse.len(), 1);
    assert_eq!(for_nurse[0].title, "Policy");
}
