use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use medrag_core::RagError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("failed to bind {0}: {1}")]
    Bind(String, std::io::Error),
    #[error("server error: {0}")]
    Server(String),
}

/// Error body returned by every API route: `{"detail": "..."}`.
#[derive(Debug)]
pub(crate) struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    pub(crate) fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub(crate) fn status(&self) -> StatusCode {
        self.status
    }
}

#[derive(serde::Serialize)]
struct ErrorBody {
    detail: String,
}

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        let status = match &err {
            RagError::InvalidRequest(_) | RagError::Chunking(_) => StatusCode::BAD_REQUEST,
            RagError::Forbidden(_) => StatusCode::FORBIDDEN,
            RagError::NotFound(_) => StatusCode::NOT_FOUND,
            RagError::Embedding(_) | RagError::CompletionFailure(_) => StatusCode::BAD_GATEWAY,
            RagError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        } else {
            tracing::debug!(error = %err, "request rejected");
        }
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                detail: self.detail,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use medrag_llm::LlmError;
    use medrag_memory::{DocumentId, VectorStoreError};

    use super::*;

    #[test]
    fn rag_errors_map_to_status_codes() {
        let cases = [
            (RagError::InvalidRequest("x".into()), StatusCode::BAD_REQUEST),
            (RagError::Forbidden("no"), StatusCode::FORBIDDEN),
            (RagError::NotFound(DocumentId(1)), StatusCode::NOT_FOUND),
            (
                RagError::CompletionFailure(LlmError::Transient("t".into())),
                StatusCode::BAD_GATEWAY,
            ),
            (
                RagError::Embedding(LlmError::Transient("t".into())),
                StatusCode::BAD_GATEWAY,
            ),
            (
                RagError::Store(VectorStoreError::Unavailable("down".into())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }
}
