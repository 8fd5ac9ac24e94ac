//! Read-only rule listing.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use crate::http::response::status_response;
use crate::http::AppState;
use crate::rule::repository::DEFAULT_PAGE_LIMIT;
use crate::rule::Rule;

#[derive(Debug, Deserialize)]
pub struct Pagination {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// GET /rules
pub async fn list_rules(State(state): State<AppState>, Query(page): Query<Pagination>) -> Json<Vec<Rule>> {
    let inner = state.load();
    let rules = inner
        .rules
        .list(page.limit.unwrap_or(DEFAULT_PAGE_LIMIT), page.offset.unwrap_or(0))
        .into_iter()
        .map(|rule| rule.as_ref().clone())
        .collect();
    Json(rules)
}

/// GET /rules/{id}
pub async fn get_rule(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.load().rules.get(&id) {
        Some(rule) => Json(rule.as_ref().clone()).into_response(),
        None => status_response(StatusCode::NOT_FOUND),
    }
}
