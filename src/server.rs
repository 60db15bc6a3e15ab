//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/{kind}` | Create a provider (`kind` is `embedding-provider` or `llm-provider`) |
//! | `GET`  | `/{kind}` | List providers (`status`, `page`, `per_page`) |
//! | `GET` `PUT` `DELETE` | `/{kind}/{id}` | Read, update, delete a provider |
//! | `PUT`  | `/{kind}/{id}/activate` | Make a provider the active one of its kind |
//! | `PUT`  | `/{kind}/{id}/deactivate` | Deactivate a provider |
//! | `POST` | `/api/v1/interactions` | Start an interaction |
//! | `GET`  | `/api/v1/interactions` | List interactions, newest first |
//! | `GET`  | `/api/v1/interactions/{id}` | One interaction with its turns |
//! | `POST` | `/api/v1/interactions/{id}/message` | Ask a question, get `{"response": ...}` |
//! | `POST` | `/api/v1/search` | Search stored documents |
//!
//! # Error Contract
//!
//! Client errors carry `{"error": "..."}`. Server-side failures carry
//! `{"message": "...", "error": "..."}` where `message` names the failed
//! step. Bodies that are not valid JSON for the route are rejected with
//! 400 before any storage access.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::interaction::{InteractionError, InteractionManager};
use crate::provider::factory;
use crate::search::{search_documents, SearchError, SearchRequest};
use crate::sqlite_store::SqliteStorage;
use ragbridge_core::models::{
    Interaction, Page, Pagination, ProviderCategory, ProviderConfig, ProviderFilter,
    ProviderStatus, SearchResults,
};
use ragbridge_core::store::Storage;

/// Shared state handed to every route handler.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    store: Arc<dyn Storage>,
    interactions: Arc<InteractionManager>,
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(store: Arc<dyn Storage>, config: Config, shutdown: CancellationToken) -> Self {
        let interactions = Arc::new(InteractionManager::from_config(store.clone(), &config));
        Self {
            config: Arc::new(config),
            store,
            interactions,
            shutdown,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/v1/interactions", post(create_interaction).get(list_interactions))
        .route("/api/v1/interactions/{id}", get(get_interaction))
        .route("/api/v1/interactions/{id}/message", post(send_message))
        .route("/api/v1/search", post(handle_search))
        .route("/{kind}", post(create_provider).get(list_providers))
        .route(
            "/{kind}/{id}",
            get(get_provider).put(update_provider).delete(delete_provider),
        )
        .route("/{kind}/{id}/activate", put(activate_provider))
        .route("/{kind}/{id}/deactivate", put(deactivate_provider))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve on `[server] bind` until `shutdown` is cancelled.
pub async fn run_server(config: &Config, shutdown: CancellationToken) -> anyhow::Result<()> {
    let pool = crate::db::connect(config).await?;
    crate::migrate::run_migrations(&pool).await?;
    let store: Arc<dyn Storage> = Arc::new(SqliteStorage::new(pool));

    let bind_addr = config.server.bind.clone();
    let app = router(AppState::new(store, config.clone(), shutdown.clone()));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "ragbridge server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

// ============ Errors ============

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("{message}: {error}")]
    Internal { message: String, error: String },
    #[error("service unavailable")]
    ServiceUnavailable,
}

impl ApiError {
    fn internal(message: &str, err: impl std::fmt::Display) -> Self {
        ApiError::Internal {
            message: message.to_string(),
            error: err.to_string(),
        }
    }

    fn storage(err: anyhow::Error) -> Self {
        Self::internal("storage error", format!("{:#}", err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()
            }
            ApiError::NotFound(msg) => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": msg }))).into_response()
            }
            ApiError::Internal { message, error } => {
                tracing::error!(%message, %error, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "message": message, "error": error })),
                )
                    .into_response()
            }
            ApiError::ServiceUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": "server is shutting down" })),
            )
                .into_response(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<InteractionError> for ApiError {
    fn from(err: InteractionError) -> Self {
        match err {
            InteractionError::NotFound(_) => ApiError::NotFound(err.to_string()),
            InteractionError::EmptyMessage => ApiError::BadRequest(err.to_string()),
            InteractionError::NoActiveProvider(_) => {
                ApiError::internal("provider not configured", &err)
            }
            InteractionError::Provider { context, error } => ApiError::internal(context, error),
            InteractionError::Storage(e) => ApiError::storage(e),
            InteractionError::Cancelled => ApiError::ServiceUnavailable,
        }
    }
}

impl From<SearchError> for ApiError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::EmptyQuery => ApiError::BadRequest(err.to_string()),
            SearchError::Provider(e) => ApiError::internal("failed to embed query", e),
            SearchError::Storage(e) => ApiError::storage(e),
        }
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Providers ============

fn category(kind: &str) -> ApiResult<ProviderCategory> {
    match kind {
        "embedding-provider" => Ok(ProviderCategory::Embedding),
        "llm-provider" => Ok(ProviderCategory::Llm),
        other => Err(ApiError::NotFound(format!("no route for /{}", other))),
    }
}

#[derive(Deserialize)]
struct CreateProviderRequest {
    name: String,
    #[serde(alias = "type")]
    provider_type: String,
    #[serde(default)]
    settings: serde_json::Value,
    #[serde(default)]
    status: Option<ProviderStatus>,
}

#[derive(Deserialize)]
struct UpdateProviderRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, alias = "type")]
    provider_type: Option<String>,
    #[serde(default)]
    settings: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct ListProvidersQuery {
    #[serde(default)]
    status: Option<ProviderStatus>,
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    per_page: Option<u32>,
}

async fn create_provider(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    body: Result<Json<CreateProviderRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ProviderConfig>)> {
    let category = category(&kind)?;
    let Json(req) = body?;

    let now = Utc::now();
    let config = ProviderConfig {
        id: uuid::Uuid::new_v4().to_string(),
        category,
        name: req.name,
        provider_type: req.provider_type,
        status: req.status.unwrap_or(ProviderStatus::Inactive),
        settings: req.settings,
        created_at: now,
        updated_at: now,
    };
    factory::validate(&config, state.config.providers.timeout())
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    state
        .store
        .create_provider(&config)
        .await
        .map_err(ApiError::storage)?;
    tracing::info!(
        %category,
        provider_id = %config.id,
        provider_type = %config.provider_type,
        "provider created"
    );
    Ok((StatusCode::CREATED, Json(config)))
}

async fn list_providers(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    query: Result<Query<ListProvidersQuery>, QueryRejection>,
) -> ApiResult<Json<Page<ProviderConfig>>> {
    let category = category(&kind)?;
    let Query(q) = query?;
    let defaults = Pagination::default();
    let page = Pagination::new(
        q.page.unwrap_or(defaults.page),
        q.per_page.unwrap_or(defaults.per_page),
    );

    let providers = state
        .store
        .list_providers(category, ProviderFilter { status: q.status }, page)
        .await
        .map_err(ApiError::storage)?;
    Ok(Json(providers))
}

async fn load_provider(
    state: &AppState,
    category: ProviderCategory,
    id: &str,
) -> ApiResult<ProviderConfig> {
    state
        .store
        .get_provider(category, id)
        .await
        .map_err(ApiError::storage)?
        .ok_or_else(|| ApiError::NotFound(format!("{} provider '{}' not found", category, id)))
}

async fn get_provider(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> ApiResult<Json<ProviderConfig>> {
    let category = category(&kind)?;
    Ok(Json(load_provider(&state, category, &id).await?))
}

async fn update_provider(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
    body: Result<Json<UpdateProviderRequest>, JsonRejection>,
) -> ApiResult<Json<ProviderConfig>> {
    let category = category(&kind)?;
    let Json(req) = body?;

    let mut config = load_provider(&state, category, &id).await?;
    if let Some(name) = req.name {
        config.name = name;
    }
    if let Some(provider_type) = req.provider_type {
        config.provider_type = provider_type;
    }
    if let Some(settings) = req.settings {
        config.settings = settings;
    }
    factory::validate(&config, state.config.providers.timeout())
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    if !state
        .store
        .update_provider(&config)
        .await
        .map_err(ApiError::storage)?
    {
        return Err(ApiError::NotFound(format!("{} provider '{}' not found", category, id)));
    }
    Ok(Json(load_provider(&state, category, &id).await?))
}

async fn delete_provider(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let category = category(&kind)?;
    let deleted = state
        .store
        .delete_provider(category, &id)
        .await
        .map_err(ApiError::storage)?;
    if !deleted {
        return Err(ApiError::NotFound(format!("{} provider '{}' not found", category, id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn activate_provider(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> ApiResult<Json<ProviderConfig>> {
    let category = category(&kind)?;
    let found = state
        .store
        .set_active(category, &id)
        .await
        .map_err(ApiError::storage)?;
    if !found {
        return Err(ApiError::NotFound(format!("{} provider '{}' not found", category, id)));
    }
    tracing::info!(%category, provider_id = %id, "provider activated");
    Ok(Json(load_provider(&state, category, &id).await?))
}

async fn deactivate_provider(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> ApiResult<Json<ProviderConfig>> {
    let category = category(&kind)?;
    let found = state
        .store
        .set_inactive(category, &id)
        .await
        .map_err(ApiError::storage)?;
    if !found {
        return Err(ApiError::NotFound(format!("{} provider '{}' not found", category, id)));
    }
    Ok(Json(load_provider(&state, category, &id).await?))
}

// ============ Interactions ============

#[derive(Deserialize)]
struct CreateInteractionRequest {
    #[serde(default)]
    query: String,
}

#[derive(Deserialize)]
struct PageQuery {
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    per_page: Option<u32>,
}

#[derive(Deserialize)]
struct MessageRequest {
    #[serde(alias = "query")]
    message: String,
}

#[derive(Serialize)]
struct MessageResponse {
    response: String,
}

async fn create_interaction(
    State(state): State<AppState>,
    body: Result<Json<CreateInteractionRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Interaction>)> {
    let Json(req) = body?;
    let interaction = state.interactions.create_interaction(&req.query).await?;
    Ok((StatusCode::CREATED, Json(interaction)))
}

async fn list_interactions(
    State(state): State<AppState>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<Json<Page<Interaction>>> {
    let Query(q) = query?;
    let defaults = Pagination::default();
    let page = Pagination::new(
        q.page.unwrap_or(defaults.page),
        q.per_page.unwrap_or(defaults.per_page),
    );
    Ok(Json(state.interactions.list_interactions(page).await?))
}

async fn get_interaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Interaction>> {
    Ok(Json(state.interactions.get_interaction(&id).await?))
}

async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<MessageRequest>, JsonRejection>,
) -> ApiResult<Json<MessageResponse>> {
    let Json(req) = body?;
    let cancel = state.shutdown.child_token();
    let reply = state
        .interactions
        .send_message(&id, &req.message, &cancel)
        .await?;
    Ok(Json(MessageResponse {
        response: reply.text,
    }))
}

// ============ POST /api/v1/search ============

async fn handle_search(
    State(state): State<AppState>,
    body: Result<Json<SearchRequest>, JsonRejection>,
) -> ApiResult<Json<SearchResults>> {
    let Json(req) = body?;
    let results = search_documents(
        state.store.as_ref(),
        state.interactions.providers(),
        &req,
        state.config.retrieval.search_limit,
    )
    .await?;
    Ok(Json(results))
}
