//! HTTP surface over the loaded index.
//!
//! - `GET /health` reports `ok` with the chunk count, or `degraded` when no index is loaded.
//! - `POST /search` embeds a query and returns the top-k snippets.
//! - `POST /qa` retrieves snippets for the latest user turn and asks the chat model.
//! - `POST /validate` checks an extracted form payload against the form template.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use hmo_rag_core::{
    form_template, render_qa_prompt, validate, ChatCompleter, ChatMessage, Embedder, IndexError,
    IndexHandle, IndexHealth, SearchHit, ServiceError, UserProfile, ValidationIssue,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

const DEFAULT_TOP_K: usize = 5;

#[derive(Clone)]
pub struct AppState {
    pub index: Arc<IndexHandle>,
    pub embedder: Arc<dyn Embedder>,
    pub completer: Option<Arc<dyn ChatCompleter>>,
    pub qa_prompt: Arc<str>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/search", post(search))
        .route("/qa", post(qa))
        .route("/validate", post(validate_form))
        .with_state(state)
}

pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await?;
    info!(port, "http service listening");
    axum::serve(listener, create_router(state)).await?;
    Ok(())
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

async fn health(State(state): State<AppState>) -> Json<IndexHealth> {
    Json(state.index.health())
}

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default = "default_top_k")]
    top_k: usize,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<SearchHit>,
}

async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    let results = state
        .index
        .search(state.embedder.as_ref(), &request.query, request.top_k)
        .await?;
    info!(top_k = request.top_k, hits = results.len(), "search request completed");
    Ok(Json(SearchResponse { results }))
}

/// Either a single `question` or a running `history` (or both; the question
/// is appended as the newest user turn).
#[derive(Deserialize)]
struct QaRequest {
    #[serde(default)]
    question: Option<String>,
    #[serde(default)]
    history: Vec<ChatMessage>,
    #[serde(default, alias = "user")]
    profile: UserProfile,
    #[serde(default = "default_top_k")]
    top_k: usize,
}

#[derive(Serialize)]
struct QaResponse {
    reply: String,
    sources: Vec<SearchHit>,
}

async fn qa(
    State(state): State<AppState>,
    Json(request): Json<QaRequest>,
) -> Result<Json<QaResponse>, AppError> {
    let index = state.index.current()?;
    let completer = state.completer.as_ref().ok_or(AppError::ChatUnavailable)?;

    let mut conversation = request.history;
    if let Some(question) = request.question.filter(|text| !text.trim().is_empty()) {
        conversation.push(ChatMessage::user(question));
    }
    let query = conversation
        .iter()
        .rev()
        .find(|message| message.role == "user")
        .map(|message| message.content.clone())
        .ok_or_else(|| AppError::BadRequest("a question or a user turn is required".to_string()))?;

    let sources = index
        .search(state.embedder.as_ref(), &query, request.top_k)
        .await?;
    let system = render_qa_prompt(&state.qa_prompt, &request.profile, &sources);

    let mut messages = Vec::with_capacity(conversation.len() + 1);
    messages.push(ChatMessage::system(system));
    messages.extend(conversation);

    let reply = completer.complete(&messages).await?;
    info!(sources = sources.len(), hmo = ?request.profile.hmo, "qa request completed");
    Ok(Json(QaResponse { reply, sources }))
}

#[derive(Deserialize)]
struct ValidateRequest {
    payload: Value,
}

#[derive(Serialize)]
struct ValidateResponse {
    valid: bool,
    issues: Vec<ValidationIssue>,
}

async fn validate_form(Json(request): Json<ValidateRequest>) -> Json<ValidateResponse> {
    let issues = validate(&request.payload, &form_template());
    Json(ValidateResponse {
        valid: issues.is_empty(),
        issues,
    })
}

#[derive(Debug)]
enum AppError {
    Index(IndexError),
    Service(ServiceError),
    ChatUnavailable,
    BadRequest(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Index(IndexError::Unavailable) | AppError::ChatUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Index(IndexError::Embedding(_)) | AppError::Service(_) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::Index(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Index(error) => write!(f, "{error}"),
            AppError::Service(error) => write!(f, "{error}"),
            AppError::ChatUnavailable => f.write_str("chat completion is not configured"),
            AppError::BadRequest(message) => f.write_str(message),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(status = status.as_u16(), error = %self, "request failed");
        }
        (status, self.to_string()).into_response()
    }
}

impl From<IndexError> for AppError {
    fn from(inner: IndexError) -> Self {
        Self::Index(inner)
    }
}

impl From<ServiceError> for AppError {
    fn from(inner: ServiceError) -> Self {
        Self::Service(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::{create_router, AppState};
    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request, StatusCode},
        Router,
    };
    use hmo_rag_core::{
        build_index, CharacterNgramEmbedder, ChatCompleter, ChatMessage, Document, IndexHandle,
        IndexOptions, ServiceError, DEFAULT_QA_PROMPT,
    };
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    /// Replies with the system prompt it was given, so tests can see the rendered context.
    struct EchoCompleter;

    #[async_trait]
    impl ChatCompleter for EchoCompleter {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ServiceError> {
            Ok(messages
                .first()
                .map(|message| message.content.clone())
                .unwrap_or_default())
        }
    }

    fn state(index: IndexHandle, completer: bool) -> AppState {
        AppState {
            index: Arc::new(index),
            embedder: Arc::new(CharacterNgramEmbedder::default()),
            completer: if completer {
                Some(Arc::new(EchoCompleter) as Arc<dyn ChatCompleter>)
            } else {
                None
            },
            qa_prompt: Arc::from(DEFAULT_QA_PROMPT),
        }
    }

    async fn loaded_index() -> IndexHandle {
        let documents = vec![
            Document::new("dental.html", "<h1>Dental</h1><p>Teeth cleaning and fillings</p>"),
            Document::new("optometry.html", "<h1>Optometry</h1><p>Eye exams and glasses</p>"),
        ];
        let index = build_index(
            documents,
            &CharacterNgramEmbedder::default(),
            &IndexOptions::default(),
        )
        .await
        .expect("index");
        IndexHandle::with_index(index)
    }

    async fn send(
        app: Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Vec<u8>) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(payload) => {
                request = request.header("content-type", "application/json");
                Body::from(payload.to_string())
            }
            None => Body::empty(),
        };
        let response = app
            .oneshot(request.body(body).expect("request"))
            .await
            .expect("router response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        (status, bytes.to_vec())
    }

    #[tokio::test]
    async fn health_is_degraded_without_index() {
        let app = create_router(state(IndexHandle::empty(), false));
        let (status, body) = send(app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_slice(&body).expect("json body");
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["chunks"], 0);
    }

    #[tokio::test]
    async fn search_without_index_is_unavailable() {
        let app = create_router(state(IndexHandle::empty(), false));
        let (status, body) =
            send(app, Method::POST, "/search", Some(json!({"query": "dental"}))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(String::from_utf8_lossy(&body), "index not loaded");
    }

    #[tokio::test]
    async fn search_returns_ranked_hits() {
        let app = create_router(state(loaded_index().await, false));
        let (status, body) = send(
            app,
            Method::POST,
            "/search",
            Some(json!({"query": "Teeth cleaning", "top_k": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_slice(&body).expect("json body");
        let results = json["results"].as_array().expect("results");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["source"], "dental.html");
    }

    #[tokio::test]
    async fn qa_renders_profile_and_numbered_context() {
        let app = create_router(state(loaded_index().await, true));
        let (status, body) = send(
            app,
            Method::POST,
            "/qa",
            Some(json!({
                "question": "Are glasses covered?",
                "profile": {"hmo": "כללית", "tier": "כסף"},
                "top_k": 2
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_slice(&body).expect("json body");
        let reply = json["reply"].as_str().expect("reply");
        assert!(reply.contains(r#"{"hmo":"כללית","tier":"כסף"}"#));
        assert!(reply.contains("[1] ("));
        assert!(reply.contains("[2] ("));
        assert_eq!(json["sources"].as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn qa_without_chat_model_is_unavailable() {
        let app = create_router(state(loaded_index().await, false));
        let (status, _) = send(app, Method::POST, "/qa", Some(json!({"question": "hi"}))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn qa_requires_a_user_turn() {
        let app = create_router(state(loaded_index().await, true));
        let (status, _) = send(
            app,
            Method::POST,
            "/qa",
            Some(json!({"history": [{"role": "assistant", "content": "Hello"}]})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn validate_reports_form_issues() {
        let app = create_router(state(IndexHandle::empty(), false));
        let (status, body) = send(
            app,
            Method::POST,
            "/validate",
            Some(json!({"payload": {"idNumber": "12"}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_slice(&body).expect("json body");
        assert_eq!(json["valid"], false);
        let issues = json["issues"].as_array().expect("issues");
        assert!(issues
            .iter()
            .any(|issue| issue == "idNumber must be exactly 9 digits (or empty)."));
        assert!(issues[0]
            .as_str()
            .is_some_and(|text| text.starts_with("Missing keys/paths: [")));
    }
}
