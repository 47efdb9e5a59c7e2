//! Route handlers for the HTTP API (spec §4.8).

use super::error::ApiError;
use super::filters::parse_filters;
use super::AppState;
use crate::cancel::CancellationToken;
use crate::model::{FacetAnalytics, SessionFacet};
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use std::collections::HashMap;

pub async fn get_overview(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<crate::model::Overview>, ApiError> {
    let filters = parse_filters(&params)?;
    let overview = state.query.overview(&filters, &CancellationToken::new())?;
    Ok(Json(overview))
}

pub async fn get_analytics(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<crate::model::AnalyticsOverview>, ApiError> {
    let filters = parse_filters(&params)?;
    let analytics = state.query.analytics_overview(&filters, &CancellationToken::new())?;
    Ok(Json(analytics))
}

pub async fn get_session_analytics(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<crate::model::SessionAnalytics>, ApiError> {
    if id.is_empty() {
        return Err(ApiError::BadRequest("missing session id".into()));
    }
    let analytics = state.query.session_analytics(&id, &CancellationToken::new())?;
    Ok(Json(analytics))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<crate::model::SessionDetail>, ApiError> {
    if id.is_empty() {
        return Err(ApiError::BadRequest("missing session id".into()));
    }
    let detail = state.query.session_detail(&id, &CancellationToken::new())?;
    Ok(Json(detail))
}

/// Returns the empty `FacetAnalytics` shape when facets aren't enabled,
/// rather than erroring (spec §4.8).
pub async fn get_facets(State(state): State<AppState>) -> Result<Json<FacetAnalytics>, ApiError> {
    if !state.insights_enabled {
        return Ok(Json(FacetAnalytics::default()));
    }
    let analytics = crate::facets::aggregate_facets(state.store.as_ref())?;
    Ok(Json(analytics))
}

/// Returns a zero-value `SessionFacet` with only `session_id` set when
/// none exists for the session (spec §4.8).
pub async fn get_session_facet(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionFacet>, ApiError> {
    if id.is_empty() {
        return Err(ApiError::BadRequest("missing session id".into()));
    }
    match state.store.get_facet(&id)? {
        Some(facet) => Ok(Json(facet)),
        None => Ok(Json(SessionFacet {
            session_id: id,
            underlying_goal: String::new(),
            goal_category: String::new(),
            outcome: String::new(),
            session_type: String::new(),
            friction_types: Vec::new(),
            brief_summary: String::new(),
            extracted_at: Utc::now(),
        })),
    }
}

#[derive(serde::Serialize)]
pub struct FacetStatus {
    done: u64,
    total: u64,
}

pub async fn get_facet_status(State(state): State<AppState>) -> Json<FacetStatus> {
    let (done, total) = state
        .facet_worker
        .as_ref()
        .map(|w| w.progress())
        .unwrap_or((0, 0));
    Json(FacetStatus { done, total })
}
