use std::net::SocketAddr;

use anyhow::Result;
use askama::Template;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::chat::ChatService;
use crate::config::AppConfig;
use crate::models::{ChatRequest, ChatResponse};

#[derive(Clone)]
struct AppState {
    chat: ChatService,
    source_label: String,
}

pub async fn run_server(config: AppConfig, chat: ChatService) -> Result<()> {
    let state = AppState {
        chat,
        source_label: config.source_label.clone(),
    };

    let app = Router::new()
        .route("/", get(index_page))
        .route("/chat", post(chat_handler))
        .nest_service("/static", ServeDir::new("static"))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = config.bind_addr.parse()?;
    tracing::info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index_page(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let template = IndexTemplate {
        source_label: state.source_label.clone(),
    };
    let body = template.render().map_err(ApiError::from)?;
    Ok(Html(body))
}

async fn chat_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let message = request.message.trim();
    if message.is_empty() {
        return Err(ApiError::bad_request("message must not be empty"));
    }

    let response = state.chat.answer(message, &request.history).await?;
    Ok(Json(response))
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    source_label: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(value: anyhow::Error) -> Self {
        // Internal details stay in the logs; callers get a generic message.
        tracing::error!("request failed: {:#}", value);
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "an internal error occurred".to_string(),
        }
    }
}

impl From<askama::Error> for ApiError {
    fn from(value: askama::Error) -> Self {
        tracing::error!("template rendering failed: {}", value);
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "an internal error occurred".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}
