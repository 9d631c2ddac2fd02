//! # HTTP Surface
//!
//! The axum router that turns miners' HTTP requests into chain-engine
//! calls. This layer does no consensus work of its own: it parses, calls
//! into [`Blockchain`], and maps errors onto status codes.
//!
//! ## Endpoints
//!
//! | Method | Path                | Description                              |
//! |--------|---------------------|------------------------------------------|
//! | GET    | `/`                 | Landing page                             |
//! | POST   | `/add`              | Submit a mined block                     |
//! | GET    | `/head`             | Header of the current head               |
//! | GET    | `/next`             | Header template for miners               |
//! | GET    | `/block/{id}`       | Full block view by header id             |
//! | GET    | `/search/{needle}`  | Blocks whose payload contains `needle`   |
//! | GET    | `/scores`           | Producer leaderboard                     |
//! | GET    | `/explore`          | HTML chain-graph explorer                |
//! | GET    | `/static/*`         | Static assets                            |
//!
//! Validation failures are the submitter's problem (400 with a reason);
//! store failures are ours (500, details only in the log).

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{Method, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use tricoin_protocol::consensus::{Block, Blockchain, Hash, Header};
use tricoin_protocol::error::StoreError;

use crate::explorer::Explorer;

/// Directory of static assets, relative to the working directory.
const STATIC_DIR: &str = "static";

/// Shared application state. Cheap to clone — everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub chain: Arc<Blockchain>,
    pub explorer: Arc<Explorer>,
}

/// Build the full router with CORS and request tracing attached.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/", get(index_handler))
        .route("/add", post(add_handler))
        .route("/head", get(head_handler))
        .route("/next", get(next_handler))
        .route("/block/{id}", get(block_handler))
        .route("/search/{needle}", get(search_handler))
        .route("/scores", get(scores_handler))
        .route("/explore", get(explore_handler))
        .nest_service("/static", ServeDir::new(STATIC_DIR))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request Types
// ---------------------------------------------------------------------------

/// Body of `POST /add`: the mined header plus the payload it commits to.
#[derive(Debug, Deserialize)]
pub struct AddRequest {
    pub header: Header,
    pub block: Block,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /` — static landing page.
async fn index_handler() -> Html<&'static str> {
    Html(include_str!("../templates/index.html"))
}

/// `POST /add` — validate and record a mined block.
///
/// Returns the full explore view of the accepted block, so a miner learns
/// in one round-trip whether it made the main chain.
async fn add_handler(State(state): State<AppState>, Json(req): Json<AddRequest>) -> Response {
    let accepted = match state.chain.add_block(req.header, req.block) {
        Ok(ph) => ph,
        Err(err) if err.is_rejection() => {
            tracing::debug!(%err, "block submission rejected");
            return (StatusCode::BAD_REQUEST, format!("failed to add block: {err}"))
                .into_response();
        }
        Err(err) => {
            tracing::error!(%err, "block submission failed in the store");
            return internal_error();
        }
    };

    match state.chain.explore_block(&accepted.id()) {
        Ok(Some(full)) => Json(full).into_response(),
        Ok(None) => {
            tracing::error!(id = %accepted.id(), "accepted block missing from store");
            internal_error()
        }
        Err(err) => store_failure(err),
    }
}

/// `GET /head` — the current head's header.
async fn head_handler(State(state): State<AppState>) -> Response {
    Json(state.chain.head().header).into_response()
}

/// `GET /next` — the template miners should extend.
async fn next_handler(State(state): State<AppState>) -> Response {
    Json(state.chain.next_template()).into_response()
}

/// `GET /block/{id}` — full view of one stored block.
async fn block_handler(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let id: Hash = match id.parse() {
        Ok(id) => id,
        Err(err) => {
            return (StatusCode::BAD_REQUEST, format!("error reading hash: {err}"))
                .into_response();
        }
    };

    match state.chain.explore_block(&id) {
        Ok(Some(full)) => Json(full).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, format!("block not found: {id}")).into_response(),
        Err(err) => store_failure(err),
    }
}

/// `GET /search/{needle}` — every block whose payload contains the needle.
async fn search_handler(State(state): State<AppState>, Path(needle): Path<String>) -> Response {
    match state.chain.search(&needle) {
        Ok(matches) => Json(matches).into_response(),
        Err(err) => store_failure(err),
    }
}

/// `GET /scores` — the producer leaderboard.
async fn scores_handler(State(state): State<AppState>) -> Response {
    Json(state.chain.score_report()).into_response()
}

/// `GET /explore` — the HTML chain-graph page.
async fn explore_handler(State(state): State<AppState>) -> Response {
    match state.explorer.html(&state.chain) {
        Ok(page) => Html(page).into_response(),
        Err(err) => store_failure(err),
    }
}

// ---------------------------------------------------------------------------
// Error Mapping
// ---------------------------------------------------------------------------

fn store_failure(err: StoreError) -> Response {
    tracing::error!(%err, "store failure while serving request");
    internal_error()
}

fn internal_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
}
