//! API route definitions.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::warn;

use super::query::AnalysisQuery;
use super::state::AppState;
use crate::analysis::{self, AggregateAxis, Analysis};

type ApiResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

fn bad_request(msg: impl Into<String>) -> (StatusCode, Json<Value>) {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": msg.into() })))
}

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/alerts", get(alerts))
        .route("/summary", get(summary))
        .route("/aggregates", get(aggregates))
        .route("/aggregates/{axis}", get(aggregate_axis))
        .route("/anomalies", get(anomalies))
        .route("/analysis", get(full_analysis))
        .route("/refresh", post(refresh))
}

/// Run one analysis pass for a query against the current snapshot.
async fn analyze(state: &AppState, query: &AnalysisQuery, score: bool) -> Result<Analysis, (StatusCode, Json<Value>)> {
    let mut request = state.base_request();
    request.criteria = query.criteria().map_err(bad_request)?;
    if let Some(features) = query.features().map_err(bad_request)? {
        request.features = features;
    }
    request.score = score;
    Ok(analysis::run_bounded(state.engine.snapshot(), request).await)
}

fn meta(a: &Analysis) -> Value {
    json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "source": a.source,
        "snapshot_total": a.snapshot_total,
        "filtered_total": a.records.len(),
    })
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let snapshot = state.engine.snapshot();
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "records": snapshot.len(),
            "source": snapshot.status,
        },
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "loaded_at": snapshot.loaded_at.to_rfc3339(),
        }
    }))
}

async fn alerts(State(state): State<AppState>, Query(query): Query<AnalysisQuery>) -> ApiResult {
    let a = analyze(&state, &query, false).await?;
    let limit = query.limit.unwrap_or(usize::MAX);
    let records: Vec<_> = a.records.iter().take(limit).collect();
    Ok(Json(json!({ "data": records, "meta": meta(&a) })))
}

async fn summary(State(state): State<AppState>, Query(query): Query<AnalysisQuery>) -> ApiResult {
    let a = analyze(&state, &query, false).await?;
    Ok(Json(json!({ "data": a.summary, "meta": meta(&a) })))
}

async fn aggregates(State(state): State<AppState>, Query(query): Query<AnalysisQuery>) -> ApiResult {
    let a = analyze(&state, &query, false).await?;
    Ok(Json(json!({ "data": a.aggregates, "meta": meta(&a) })))
}

async fn aggregate_axis(
    State(state): State<AppState>,
    Path(axis): Path<String>,
    Query(query): Query<AnalysisQuery>,
) -> ApiResult {
    let axis: AggregateAxis = axis.parse().map_err(bad_request)?;
    let a = analyze(&state, &query, false).await?;
    Ok(Json(json!({ "data": a.aggregates.get(axis), "meta": meta(&a) })))
}

async fn anomalies(State(state): State<AppState>, Query(query): Query<AnalysisQuery>) -> ApiResult {
    let a = analyze(&state, &query, true).await?;
    Ok(Json(json!({ "data": a.scoring, "meta": meta(&a) })))
}

async fn full_analysis(State(state): State<AppState>, Query(query): Query<AnalysisQuery>) -> ApiResult {
    let a = analyze(&state, &query, true).await?;
    let meta = meta(&a);
    Ok(Json(json!({ "data": a, "meta": meta })))
}

async fn refresh(State(state): State<AppState>) -> ApiResult {
    match state.engine.refresh_bounded().await {
        Ok(snapshot) => Ok(Json(json!({
            "data": {
                "records": snapshot.len(),
                "diagnostics": snapshot.diagnostics.len(),
                "source": snapshot.status,
            },
            "meta": { "loaded_at": snapshot.loaded_at.to_rfc3339() }
        }))),
        Err(e) => {
            warn!(error = %e, "refresh failed, keeping previous snapshot");
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": e.to_string() })),
            ))
        }
    }
}
