use axum::extract::{rejection::QueryRejection, Extension, Query, State};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::Caller;
use crate::error::ApiError;
use crate::handlers::AppState;
use crate::middleware::{ApiResponse, ApiResult};
use crate::results::model::optional_text;
use crate::results::{load_rankings, resolve_scope, Scope};

#[derive(Debug, Default, Deserialize)]
pub struct RankingQuery {
    #[serde(default, deserialize_with = "optional_text")]
    pub academic_year: Option<String>,
}

/// GET /api/rankings - school, class, exam and subject standings for one year.
/// Student callers additionally receive `studentSpecificData`.
pub async fn rankings_get(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    query: Result<Query<RankingQuery>, QueryRejection>,
) -> ApiResult<Value> {
    let Query(query) = query.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let scope = resolve_scope(state.directory.as_ref(), &caller).await?;

    let year = query
        .academic_year
        .unwrap_or_else(|| state.config.results.default_academic_year.clone());
    let table = load_rankings(state.store.as_ref(), &year).await?;

    let mut data = json!(table);
    if let Scope::OwnRecordsOnly { student_id } = scope {
        data["studentSpecificData"] = json!(table.student_view(student_id));
    }

    Ok(ApiResponse::success(data))
}
