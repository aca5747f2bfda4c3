use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Extension, Query, State,
    },
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::Caller;
use crate::error::ApiError;
use crate::handlers::AppState;
use crate::middleware::{ApiResponse, ApiResult};
use crate::results::{
    delete_result, query_results, resolve_scope, update_result, upsert_results, ResultFilters,
    ResultInput, ResultRecord,
};

#[derive(Debug, Deserialize)]
pub struct ResultsBody {
    pub results: Vec<ResultInput>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    pub id: Option<Uuid>,
}

/// GET /api/results - scoped, filtered, paginated listing plus role stats
pub async fn results_get(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    query: Result<Query<ResultFilters>, QueryRejection>,
) -> ApiResult<Value> {
    let Query(filters) = query.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let config = &state.config.results;

    let scope = resolve_scope(state.directory.as_ref(), &caller).await?;
    let listing = query_results(state.store.as_ref(), &scope, &filters, config).await?;
    let page = listing.page;

    let mut data = json!({
        "results": page.items,
        "pagination": {
            "page": page.page,
            "limit": page.limit,
            "total": page.total,
            "totalPages": page.total_pages,
        }
    });
    if let Some(stats) = listing.stats {
        data["stats"] = json!(stats);
    }

    Ok(ApiResponse::success(data))
}

/// POST /api/results - upsert a batch of results in one transaction
pub async fn results_post(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<ResultsBody>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(body) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let scope = resolve_scope(state.directory.as_ref(), &caller).await?;
    let summary = upsert_results(
        state.store.as_ref(),
        state.directory.as_ref(),
        &scope,
        &body.results,
        &state.config.results,
    )
    .await?;

    Ok(ApiResponse::created(json!({
        "inserted": summary.inserted,
        "updated": summary.updated,
        "count": summary.count(),
    })))
}

/// PUT /api/results - update one result by id
pub async fn results_put(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<ResultInput>, JsonRejection>,
) -> ApiResult<ResultRecord> {
    let Json(input) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let scope = resolve_scope(state.directory.as_ref(), &caller).await?;
    let record = update_result(state.store.as_ref(), &scope, input).await?;

    Ok(ApiResponse::success(record))
}

/// DELETE /api/results?id= - principal only
pub async fn results_delete(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    query: Result<Query<DeleteQuery>, QueryRejection>,
) -> ApiResult<Value> {
    let Query(query) = query.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let scope = resolve_scope(state.directory.as_ref(), &caller).await?;
    let id = query.id.ok_or_else(|| ApiError::bad_request("Result id is required"))?;

    delete_result(state.store.as_ref(), &scope, id).await?;

    Ok(ApiResponse::success(json!({ "deleted": true, "id": id })))
}
