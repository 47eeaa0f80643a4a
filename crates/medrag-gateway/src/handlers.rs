use axum::Json;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use medrag_core::SearchResult;
use medrag_llm::provider::LlmProvider;
use medrag_memory::DocumentId;
use medrag_memory::document::{DocumentPatch, MetadataFilter, NewDocument};
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use super::extract::{ApiJson, ApiPath, ApiQuery};
use super::identity::Identity;
use super::server::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListParams {
    #[serde(default)]
    pub skip: usize,
    pub limit: Option<usize>,
    pub department: Option<String>,
    pub document_type: Option<String>,
    pub patient_id: Option<i64>,
}

impl ListParams {
    fn filter(&self) -> MetadataFilter {
        MetadataFilter {
            department: self.department.clone(),
            document_types: self.document_type.iter().cloned().collect(),
            patient_id: self.patient_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContentBody {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchBody {
    pub query: String,
    #[serde(default)]
    pub document_types: Vec<String>,
    pub department: Option<String>,
    pub patient_id: Option<i64>,
    pub limit: Option<usize>,
}

#[derive(Serialize)]
struct SearchResponse {
    total_results: usize,
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AskBody {
    pub message: String,
    pub context_patient_id: Option<i64>,
    pub context_department: Option<String>,
    #[serde(default)]
    pub document_types: Vec<String>,
    pub max_results: Option<usize>,
}

pub(crate) async fn health_handler<P: LlmProvider + 'static>(
    State(state): State<AppState<P>>,
) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

pub(crate) async fn create_document<P: LlmProvider + 'static>(
    State(state): State<AppState<P>>,
    Identity(caller): Identity,
    ApiJson(document): ApiJson<NewDocument>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state.service.ingest(&caller, document).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

/// `multipart/form-data` upload: a UTF-8 `file` part plus metadata fields.
pub(crate) async fn upload_document<P: LlmProvider + 'static>(
    State(state): State<AppState<P>>,
    Identity(caller): Identity,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let document = read_upload(multipart?).await?;
    let report = state.service.ingest(&caller, document).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

async fn read_upload(mut multipart: Multipart) -> Result<NewDocument, ApiError> {
    let mut title = None;
    let mut document_type = None;
    let mut department = None;
    let mut patient_id = None;
    let mut is_sensitive = false;
    let mut content = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_owned();
        if name == "file" {
            let bytes = field.bytes().await?;
            let text = std::str::from_utf8(&bytes)
                .map_err(|e| bad_request(format!("Error reading file: {e}")))?;
            content = Some(text.to_owned());
            continue;
        }
        let value = field.text().await?;
        let value = value.trim();
        match name.as_str() {
            "title" => title = Some(value.to_owned()),
            "document_type" => document_type = Some(value.to_owned()),
            "department" if !value.is_empty() => department = Some(value.to_owned()),
            "patient_id" if !value.is_empty() => {
                patient_id = Some(
                    value
                        .parse::<i64>()
                        .map_err(|_| bad_request("patient_id must be an integer"))?,
                );
            }
            "is_sensitive" => is_sensitive = parse_flag(value)?,
            _ => tracing::debug!(field = %name, "ignoring upload field"),
        }
    }

    Ok(NewDocument {
        title: title.ok_or_else(|| bad_request("title is required"))?,
        content: content.ok_or_else(|| bad_request("file is required"))?,
        document_type: document_type.ok_or_else(|| bad_request("document_type is required"))?,
        department,
        is_sensitive,
        patient_id,
    })
}

fn parse_flag(value: &str) -> Result<bool, ApiError> {
    match value.to_ascii_lowercase().as_str() {
        "" | "false" | "0" | "off" => Ok(false),
        "true" | "1" | "on" => Ok(true),
        _ => Err(bad_request("is_sensitive must be a boolean")),
    }
}

fn bad_request(detail: impl Into<String>) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, detail)
}

pub(crate) async fn list_documents<P: LlmProvider + 'static>(
    State(state): State<AppState<P>>,
    Identity(caller): Identity,
    ApiQuery(params): ApiQuery<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let documents = state
        .service
        .list_documents(&caller, params.filter(), params.skip, params.limit)
        .await?;
    Ok(Json(documents))
}

pub(crate) async fn get_document<P: LlmProvider + 'static>(
    State(state): State<AppState<P>>,
    Identity(caller): Identity,
    ApiPath(id): ApiPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let document = state.service.get_document(&caller, DocumentId(id)).await?;
    Ok(Json(document))
}

pub(crate) async fn update_document<P: LlmProvider + 'static>(
    State(state): State<AppState<P>>,
    Identity(caller): Identity,
    ApiPath(id): ApiPath<i64>,
    ApiJson(patch): ApiJson<DocumentPatch>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .service
        .update_metadata(&caller, DocumentId(id), patch)
        .await?;
    Ok(Json(record))
}

pub(crate) async fn replace_content<P: LlmProvider + 'static>(
    State(state): State<AppState<P>>,
    Identity(caller): Identity,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<ContentBody>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state
        .service
        .reingest(&caller, DocumentId(id), &body.content)
        .await?;
    Ok(Json(report))
}

pub(crate) async fn delete_document<P: LlmProvider + 'static>(
    State(state): State<AppState<P>>,
    Identity(caller): Identity,
    ApiPath(id): ApiPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state.service.delete_document(&caller, DocumentId(id)).await?;
    Ok(Json(MessageResponse {
        message: "Document deleted successfully",
    }))
}

pub(crate) async fn chat_search<P: LlmProvider + 'static>(
    State(state): State<AppState<P>>,
    Identity(caller): Identity,
    ApiJson(body): ApiJson<SearchBody>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = MetadataFilter {
        department: body.department,
        document_types: body.document_types,
        patient_id: body.patient_id,
    };
    let results = state
        .service
        .search(&caller, &body.query, filter, body.limit)
        .await?;
    Ok(Json(SearchResponse {
        total_results: results.len(),
        results,
    }))
}

pub(crate) async fn chat_ask<P: LlmProvider + 'static>(
    State(state): State<AppState<P>>,
    Identity(caller): Identity,
    ApiJson(body): ApiJson<AskBody>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = MetadataFilter {
        department: body.context_department,
        document_types: body.document_types,
        patient_id: body.context_patient_id,
    };
    let answer = state
        .service
        .ask(&caller, &body.message, filter, body.max_results)
        .await?;
    Ok(Json(answer))
}
