//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness: blob metadata DB, blob directory I/O, and
//!   whether shutdown has begun

use crate::{services::storage_service::LocalBlobStore, state::AppState};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::HashMap;
use tokio::fs;
use uuid::Uuid;

/// `GET /healthz`
///
/// Always 200 with a plain JSON body. Performs no I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// HTTP 200 when every check passes, 503 otherwise. A worker that is
/// shutting down reports not-ready so no new deliveries are routed to it.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let mut checks = HashMap::new();
    checks.insert("sqlite", check_metadata_db(&state.store).await);
    checks.insert("disk", check_blob_dir(&state.store).await);
    checks.insert(
        "accepting_events",
        if state.shutdown.is_cancelled() {
            CheckStatus::failed("shutdown in progress")
        } else {
            CheckStatus::ok()
        },
    );

    let overall_ok = checks.values().all(|c| c.ok);
    let body = ReadyResponse {
        status: if overall_ok { "ok" } else { "error" }.into(),
        checks,
    };
    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

async fn check_metadata_db(store: &LocalBlobStore) -> CheckStatus {
    match sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&*store.db)
        .await
    {
        Ok(1) => CheckStatus::ok(),
        Ok(v) => CheckStatus::failed(format!("unexpected result: {}", v)),
        Err(e) => CheckStatus::failed(format!("error: {}", e)),
    }
}

/// Write, read back and delete a probe file under the store's base path.
async fn check_blob_dir(store: &LocalBlobStore) -> CheckStatus {
    let probe = store.base_path.join(format!(".readyz-{}", Uuid::new_v4()));

    if let Err(e) = fs::write(&probe, b"readyz").await {
        return CheckStatus::failed(format!("could not write probe file: {}", e));
    }
    let read_back = fs::read(&probe).await;
    let removed = fs::remove_file(&probe).await;

    match (read_back, removed) {
        (Ok(bytes), _) if bytes != b"readyz" => CheckStatus::failed("probe content mismatch"),
        (Ok(_), Ok(())) => CheckStatus::ok(),
        (Ok(_), Err(e)) => CheckStatus {
            ok: true,
            error: Some(format!("could not remove probe file: {}", e)),
        },
        (Err(e), _) => CheckStatus::failed(format!("could not read probe file: {}", e)),
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

impl CheckStatus {
    fn ok() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
        }
    }
}
