use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use http_body_util::BodyExt;
use serde_json::Value;
use tracing::{error, info};
use uuid::Uuid;

use super::{
    auth::AdminPrincipal,
    error::ApiError,
    models::{
        ActivityQuery, EnqueuePayload, EnqueueRejection, EnqueueResponse, HealthResponse,
        InvokeErrorResponse, ListQuery, RecordBatchRequest, ResetFailedResponse, StartRequest,
    },
    state::AppState,
    utils::{clamp_limit, parse_content_type, validate_body_size},
    validation::validate_enqueue,
};
use crate::queue::{QueueError, QueueStatus};
use crate::reporting::{ActivityEntry, ActivityKind, HealthReport, QueueStats};

/// Worker invocation endpoint (POST /functions/process-queue)
///
/// Claims up to `worker.batch_size` pending items and processes them before
/// answering. Per-item failures are part of a 200 response; only a failure
/// of the invocation itself yields 500 with a request id for log lookup.
pub async fn process_queue(State(state): State<AppState>, admin: AdminPrincipal) -> Response {
    info!(principal = %admin.name(), "Batch invocation");

    match state.worker.run_batch().await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => {
            let request_id = Uuid::now_v7().to_string();
            error!(request_id = %request_id, error = %e, "Batch invocation failed");
            state.metrics.invocation_failed();

            let body = InvokeErrorResponse {
                error: e.to_string(),
                request_id,
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

/// Enqueue endpoint (POST /admin/queue)
///
/// Accepts one item or a list. The whole request is rejected when any item
/// is malformed; duplicates are reported per item and do not block the rest.
pub async fn enqueue(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Result<impl IntoResponse, ApiError> {
    let content_type = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::InvalidPayload("missing Content-Type header".into()))?;
    parse_content_type(content_type)?;

    // Decompression already happened in RequestDecompressionLayer
    let body_bytes = read_body(body, state.config.server.max_request_bytes.as_u64() as usize).await?;

    let payload: EnqueuePayload = serde_json::from_slice(&body_bytes)?;
    let items = payload.into_items();
    validate_enqueue(&items).map_err(|e| ApiError::InvalidPayload(e.to_string()))?;

    let mut response = EnqueueResponse {
        created: Vec::new(),
        rejected: Vec::new(),
    };

    for (index, item) in items.into_iter().enumerate() {
        match state.queue.enqueue(item.with_defaults(&state.config)) {
            Ok(created) => response.created.push(created),
            Err(QueueError::DuplicateKind { existing, .. }) => {
                response.rejected.push(EnqueueRejection {
                    index,
                    reason: "duplicate".to_string(),
                    existing_id: Some(existing),
                })
            }
            Err(QueueError::InvalidItem(reason)) => response.rejected.push(EnqueueRejection {
                index,
                reason,
                existing_id: None,
            }),
            Err(e) => return Err(e.into()),
        }
    }

    info!(
        created = response.created.len(),
        rejected = response.rejected.len(),
        "Enqueue request handled"
    );

    let status = if response.created.is_empty() {
        StatusCode::CONFLICT
    } else {
        StatusCode::CREATED
    };

    Ok((status, Json(response)))
}

async fn read_body(body: axum::body::Body, max_size: usize) -> Result<Vec<u8>, ApiError> {
    let data = body
        .collect()
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?
        .to_bytes()
        .to_vec();

    validate_body_size(&data, max_size)?;

    Ok(data)
}

/// Operator listing (GET /admin/queue?status=failed&limit=50)
pub async fn list_items(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<QueueStatus>)
        .transpose()
        .map_err(ApiError::InvalidPayload)?;

    let items = state.queue.list(status, clamp_limit(query.limit))?;
    Ok(Json(items))
}

/// GET /admin/queue/{id}
pub async fn get_item(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse, ApiError> {
    let item = state
        .queue
        .get(id)?
        .ok_or_else(|| ApiError::NotFound(format!("queue item {id}")))?;
    Ok(Json(item))
}

/// POST /admin/queue/{id}/reset
pub async fn reset_item(
    State(state): State<AppState>,
    admin: AdminPrincipal,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse, ApiError> {
    let item = state.queue.reset(id)?;

    log_activity(
        &state,
        ActivityEntry::new(ActivityKind::Reset)
            .with_message(format!("item {id} reset by {}", admin.name())),
    );

    Ok(Json(item))
}

/// POST /admin/queue/reset-failed
pub async fn reset_failed(
    State(state): State<AppState>,
    admin: AdminPrincipal,
) -> Result<impl IntoResponse, ApiError> {
    let reset = state.queue.reset_failed()?;

    if !reset.is_empty() {
        log_activity(
            &state,
            ActivityEntry::new(ActivityKind::Reset)
                .with_message(format!("{} failed items reset by {}", reset.len(), admin.name())),
        );
    }

    Ok(Json(ResetFailedResponse { reset }))
}

fn log_activity(state: &AppState, entry: ActivityEntry) {
    if let Err(e) = state.ledger.append_activity(entry) {
        error!(error = %e, "Failed to append activity");
    }
}

/// GET /admin/queue/stats
pub async fn queue_stats(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(QueueStats {
        counts: state.queue.counts()?,
        control: state.ledger.control()?,
        metrics: Some(state.metrics.snapshot()),
    }))
}

/// GET /admin/control
pub async fn get_control(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.ledger.control()?))
}

/// POST /admin/control/start; 409 when a run is already active
pub async fn start_run(
    State(state): State<AppState>,
    admin: AdminPrincipal,
    Json(request): Json<StartRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = request
        .actor
        .filter(|a| !a.trim().is_empty())
        .unwrap_or_else(|| admin.name().to_string());

    Ok(Json(state.ledger.start(&actor)?))
}

/// POST /admin/control/stop
pub async fn stop_run(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.ledger.stop()?))
}

/// POST /admin/control/batches
pub async fn record_batch(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
    Json(request): Json<RecordBatchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.ledger.record_batch(request.processed)?))
}

/// GET /admin/activity?limit=N, most recent first
pub async fn recent_activity(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
    Query(query): Query<ActivityQuery>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.ledger.recent_activity(clamp_limit(query.limit))?))
}

/// PUT /admin/records/{table}/{id}
pub async fn put_record(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
    Path((table, id)): Path<(String, String)>,
    Json(record): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    state.records.put_record(&table, &id, record.clone())?;
    Ok((StatusCode::OK, Json(record)))
}

/// GET /admin/records/{table}/{id}
pub async fn get_record(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
    Path((table, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .records
        .get_record(&table, &id)?
        .ok_or_else(|| ApiError::NotFound(format!("record {table}/{id}")))?;
    Ok(Json(record))
}

/// Health check endpoint (GET /health)
///
/// Unauthenticated. Returns 503 when a store cannot be read; otherwise 200
/// with the run health report (idle, healthy, degraded or stalled).
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    use std::collections::HashMap;

    let mut components = HashMap::new();
    components.insert("api".to_string(), "healthy".to_string());

    let queue_ok = state.queue.health_check().is_ok();
    let ledger_ok = state.ledger.health_check().is_ok();
    for (name, ok) in [("queue", queue_ok), ("ledger", ledger_ok)] {
        let status = if ok { "healthy" } else { "unhealthy" };
        components.insert(name.to_string(), status.to_string());
    }

    let report = match (state.ledger.control(), state.queue.counts()) {
        (Ok(control), Ok(counts)) => Some(HealthReport::assess(
            &control,
            &counts,
            std::time::Duration::from_secs(state.config.telemetry.stall_after_secs),
            chrono::Utc::now(),
        )),
        _ => None,
    };

    let all_healthy = queue_ok && ledger_ok && report.is_some();
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if all_healthy { "healthy" } else { "unhealthy" }.to_string(),
        report,
        components,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (status_code, Json(response))
}
