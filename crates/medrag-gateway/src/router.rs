use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::header::AUTHORIZATION;
use axum::http::{Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use medrag_llm::provider::LlmProvider;
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use super::error::ApiError;
use super::handlers::{
    chat_ask, chat_search, create_document, delete_document, get_document, health_handler,
    list_documents, replace_content, update_document, upload_document,
};
use super::identity::USER_ID_HEADER;
use super::server::AppState;

/// Digest of the configured service token, if any.
#[derive(Clone)]
struct AuthConfig {
    token_hash: Option<blake3::Hash>,
}

const MAX_RATE_LIMIT_ENTRIES: usize = 10_000;
const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Requests are counted per caller when the identity header is present and
/// per client address otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ClientKey {
    User(i64),
    Addr(IpAddr),
}

impl ClientKey {
    fn of(req: &Request<Body>) -> Self {
        let user = req
            .headers()
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok());
        if let Some(user) = user {
            return Self::User(user);
        }
        let addr = req
            .extensions()
            .get::<ConnectInfo<std::net::SocketAddr>>()
            .map_or(IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED), |ci| ci.0.ip());
        Self::Addr(addr)
    }
}

#[derive(Clone)]
struct RateLimitState {
    limit: u32,
    counters: Arc<Mutex<HashMap<ClientKey, (u32, Instant)>>>,
}

pub(crate) fn build_router<P: LlmProvider + 'static>(
    state: AppState<P>,
    auth_token: Option<String>,
    rate_limit: u32,
    max_body_size: usize,
) -> Router {
    let auth_cfg = AuthConfig {
        token_hash: auth_token.map(|token| blake3::hash(token.as_bytes())),
    };
    let rate_state = RateLimitState {
        limit: rate_limit,
        counters: Arc::new(Mutex::new(HashMap::new())),
    };

    let api = Router::new()
        .route(
            "/api/v1/documents",
            post(create_document::<P>).get(list_documents::<P>),
        )
        .route(
            "/api/v1/documents/{id}",
            get(get_document::<P>)
                .patch(update_document::<P>)
                .delete(delete_document::<P>),
        )
        .route("/api/v1/documents/upload", post(upload_document::<P>))
        .route("/api/v1/documents/{id}/content", put(replace_content::<P>))
        .route("/api/v1/chat/search", post(chat_search::<P>))
        .route("/api/v1/chat/ask", post(chat_ask::<P>))
        .layer(middleware::from_fn_with_state(
            rate_state,
            rate_limit_middleware,
        ))
        .layer(middleware::from_fn_with_state(auth_cfg, auth_middleware))
        .layer(RequestBodyLimitLayer::new(max_body_size));

    Router::new()
        .route("/health", get(health_handler::<P>))
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn auth_middleware(
    axum::extract::State(cfg): axum::extract::State<AuthConfig>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected) = cfg.token_hash else {
        return next.run(req).await;
    };
    let presented = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default();

    // compare fixed-length digests so timing does not depend on token length
    let presented = blake3::hash(presented.as_bytes());
    if bool::from(presented.as_bytes().ct_eq(expected.as_bytes())) {
        next.run(req).await
    } else {
        tracing::debug!(path = %req.uri().path(), "rejected request with bad service token");
        ApiError::new(StatusCode::UNAUTHORIZED, "invalid service token").into_response()
    }
}

async fn rate_limit_middleware(
    axum::extract::State(state): axum::extract::State<RateLimitState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if state.limit == 0 {
        return next.run(req).await;
    }

    let key = ClientKey::of(&req);
    let now = Instant::now();
    {
        let mut counters = state.counters.lock().await;
        if counters.len() >= MAX_RATE_LIMIT_ENTRIES && !counters.contains_key(&key) {
            counters.retain(|_, (_, window_start)| now.duration_since(*window_start) < RATE_WINDOW);
        }

        let (count, window_start) = counters.entry(key.clone()).or_insert((0, now));
        if now.duration_since(*window_start) >= RATE_WINDOW {
            *count = 0;
            *window_start = now;
        }
        *count += 1;
        if *count > state.limit {
            tracing::warn!(client = ?key, "rate limit exceeded");
            return ApiError::new(StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded")
                .into_response();
        }
    }

    next.run(req).await
}

#[cfg(test)]
mod tests;
