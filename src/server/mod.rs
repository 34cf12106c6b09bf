//! HTTP surface over a [`Store`].
//!
//! Routes:
//! - `GET    /health`      liveness probe
//! - `GET    /v1/kv/:key`  fetch a value
//! - `DELETE /v1/kv/:key`  delete a key
//! - `PUT    /v1/kv`       store a key-value pair (POST also accepted)
//! - `GET    /v1/keys`     list all keys
//! - `GET    /v1/stats`    database statistics

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::store::{Stats, Store};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetRequest {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetResponse {
    pub key: String,
    pub value: String,
}

/// Builds the router over the given store.
pub fn router(store: Arc<Store>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/kv", put(set_key).post(set_key))
        .route("/v1/kv/:key", get(get_key).delete(delete_key))
        .route("/v1/keys", get(list_keys))
        .route("/v1/stats", get(stats))
        .with_state(store)
}

/// Binds `addr` and serves the API until the process exits.
pub async fn serve(store: Arc<Store>, addr: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "serving HTTP API");
    axum::serve(listener, router(store))
        .await
        .map_err(|e| Error::Io(e.to_string()))
}

async fn health() -> &'static str {
    "ok"
}

async fn get_key(
    State(store): State<Arc<Store>>,
    Path(key): Path<String>,
) -> std::result::Result<Json<GetResponse>, StatusCode> {
    match store.get(&key) {
        Ok(value) => Ok(Json(GetResponse { key, value })),
        Err(Error::KeyNotFound) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!(key = %key, error = %e, "get failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn set_key(State(store): State<Arc<Store>>, Json(req): Json<SetRequest>) -> StatusCode {
    if req.key.is_empty() {
        return StatusCode::BAD_REQUEST;
    }

    match store.set(&req.key, &req.value) {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(e) => {
            tracing::error!(key = %req.key, error = %e, "set failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

async fn delete_key(State(store): State<Arc<Store>>, Path(key): Path<String>) -> StatusCode {
    match store.delete(&key) {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(Error::KeyNotFound) => StatusCode::NOT_FOUND,
        Err(e) => {
            tracing::error!(key = %key, error = %e, "delete failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

async fn list_keys(
    State(store): State<Arc<Store>>,
) -> std::result::Result<Json<Vec<String>>, StatusCode> {
    match store.list() {
        Ok(keys) => Ok(Json(keys)),
        Err(e) => {
            tracing::error!(error = %e, "list failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn stats(State(store): State<Arc<Store>>) -> std::result::Result<Json<Stats>, StatusCode> {
    match store.stats() {
        Ok(stats) => Ok(Json(stats)),
        Err(e) => {
            tracing::error!(error = %e, "stats failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
