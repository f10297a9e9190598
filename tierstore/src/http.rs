//! HTTP surface for tier-transparent reads.
//!
//! `GET /records/{id}` answers 200 with the JSON document and an
//! `x-served-from` header, 400 for a missing identifier, 404 when the record
//! is unknown, and 500 for tier failures. An index entry pointing at a
//! missing blob is a 500 with code `consistency_error`, never a 404.

use crate::error::TierError;
use crate::retrieval::{Lookup, RetrievalCoordinator};
use crate::types::Tier;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

pub const SERVED_FROM_HEADER: &str = "x-served-from";

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

#[derive(Debug, Serialize)]
struct HealthStatusResponse {
    status: &'static str,
}

pub fn router(coordinator: Arc<RetrievalCoordinator>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/records", get(missing_id_handler))
        .route("/records/", get(missing_id_handler))
        .route("/records/:id", get(get_record_handler))
        .with_state(coordinator)
}

/// Serve `app` on `listener` until `shutdown` flips to true.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "retrieval server listening");
    }
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await
}

fn served_from_label(tier: Tier) -> &'static str {
    match tier {
        Tier::Hot => "hot",
        Tier::Cold => "cold",
    }
}

fn error_response(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: code,
            message: message.into(),
        }),
    )
        .into_response()
}

fn missing_id() -> Response {
    error_response(
        StatusCode::BAD_REQUEST,
        "missing_id",
        "Please pass a record ID in the URL.",
    )
}

async fn health_handler() -> Json<HealthStatusResponse> {
    Json(HealthStatusResponse { status: "ok" })
}

async fn missing_id_handler() -> Response {
    missing_id()
}

async fn get_record_handler(
    State(coordinator): State<Arc<RetrievalCoordinator>>,
    Path(id): Path<String>,
) -> Response {
    if id.trim().is_empty() {
        return missing_id();
    }

    match coordinator.get(&id).await {
        Ok(Lookup::Found(retrieved)) => (
            StatusCode::OK,
            [(SERVED_FROM_HEADER, served_from_label(retrieved.served_from))],
            Json(retrieved.document),
        )
            .into_response(),
        Ok(Lookup::NotFound) => {
            error_response(StatusCode::NOT_FOUND, "not_found", "Record not found.")
        }
        Err(TierError::Validation(message)) => {
            error_response(StatusCode::BAD_REQUEST, "invalid_id", message)
        }
        Err(e) => {
            error!(record_id = %id, error = %e, "error retrieving record");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                e.code(),
                format!("An error occurred while retrieving the record: {}", e),
            )
        }
    }
}
