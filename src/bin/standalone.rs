use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, Json};
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use policychat::chat::ChatService;
use policychat::config::AppConfig;
use policychat::index::VectorIndex;
use policychat::models::{QueryRequest, QueryResponse};
use policychat::openai::OpenAiClient;
use policychat::retrieval::Retriever;
use policychat::session::SessionStore;

const CHAT_PAGE: &str = include_str!("standalone_page.html");

#[derive(Clone)]
struct AppState {
    chat: ChatService,
    sessions: SessionStore,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    dotenv::dotenv().ok();

    let config = AppConfig::from_env()?;

    let index = VectorIndex::load(&config.index_dir, &config.models.embedding_model)
        .context("failed to load the vector index; run the `ingest` binary first")?;
    tracing::info!(
        "loaded {} chunks from {}",
        index.len(),
        config.index_dir.display()
    );

    let client = OpenAiClient::new(config.api_base_url.clone(), config.api_key.clone());
    let retriever = Retriever::new(
        client.clone(),
        Arc::new(index),
        config.models.chat_model.clone(),
        config.models.embedding_model.clone(),
        config.retrieve_top_k,
        config.source_label.clone(),
    );
    let chat = ChatService::new(
        client,
        retriever,
        config.models.chat_model.clone(),
        config.source_label.clone(),
        config.stage_timeout(),
    );

    let state = AppState {
        chat,
        sessions: SessionStore::new(),
    };

    let app = Router::new()
        .route("/", get(home))
        .route("/chat", post(chat_endpoint))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = config.bind_addr.parse()?;
    tracing::info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn home() -> Html<&'static str> {
    Html(CHAT_PAGE)
}

async fn chat_endpoint(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> (StatusCode, Json<QueryResponse>) {
    let query = request.query.trim().to_string();
    if query.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(QueryResponse {
                response: "Please enter a query.".to_string(),
            }),
        );
    }

    let history = request
        .session_id
        .as_deref()
        .map(|id| state.sessions.history(id))
        .unwrap_or_default();

    match state.chat.answer(&query, &history).await {
        Ok(answer) => {
            if let Some(id) = &request.session_id {
                state.sessions.append_exchange(id, &query, &answer.answer);
            }
            (
                StatusCode::OK,
                Json(QueryResponse {
                    response: answer.answer,
                }),
            )
        }
        Err(err) => {
            tracing::error!("chat request failed: {:#}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(QueryResponse {
                    response: "An error occurred while processing your request.".to_string(),
                }),
            )
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
