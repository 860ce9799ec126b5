//! HTTP read API.
//!
//! ```text
//! GET /api/orders/:id                          order without items
//! GET /api/orders/:id/items?limit=&last_id=    one keyset page of items
//! GET /health                                  liveness
//! GET /metrics                                 Prometheus text
//! ```

use crate::error::ApiError;
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use metrics_exporter_prometheus::PrometheusHandle;
use order_info_core::model::{Item, Order};
use order_info_runtime::OrderQueries;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Page size when `limit` is absent.
pub const DEFAULT_PAGE_SIZE: i64 = 10;
/// Largest page size served; bigger requests are clamped.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    queries: Arc<dyn OrderQueries>,
    metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// State serving reads through `queries`.
    #[must_use]
    pub fn new(queries: Arc<dyn OrderQueries>) -> Self {
        Self {
            queries,
            metrics: None,
        }
    }

    /// Expose `handle`'s output on `/metrics`.
    #[must_use]
    pub fn with_metrics(mut self, handle: Option<PrometheusHandle>) -> Self {
        self.metrics = handle;
        self
    }
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/orders/:id", get(get_order))
        .route("/api/orders/:id/items", get(get_order_items))
        .route("/health", get(health_check))
        .route("/metrics", get(render_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Raw query parameters; parsed by hand so bad values become our 400 body.
#[derive(Debug, Default, Deserialize)]
pub struct ItemsQuery {
    limit: Option<String>,
    last_id: Option<String>,
}

impl ItemsQuery {
    /// Resolve `(last_id, limit)`.
    ///
    /// `limit` must be a positive integer and is clamped to [`MAX_PAGE_SIZE`];
    /// `last_id` must be a non-negative integer. Empty values take defaults.
    ///
    /// # Errors
    ///
    /// Returns a 400 [`ApiError`] for anything else.
    pub fn page(&self) -> Result<(i64, i64), ApiError> {
        let limit = match non_empty(self.limit.as_deref()) {
            None => DEFAULT_PAGE_SIZE,
            Some(raw) => match raw.parse::<i64>() {
                Ok(limit) if limit > 0 => limit.min(MAX_PAGE_SIZE),
                _ => return Err(ApiError::bad_request()),
            },
        };

        let last_id = match non_empty(self.last_id.as_deref()) {
            None => 0,
            Some(raw) => match raw.parse::<i64>() {
                Ok(last_id) if last_id >= 0 => last_id,
                _ => return Err(ApiError::bad_request()),
            },
        };

        Ok((last_id, limit))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn order_id(id: &str) -> Result<&str, ApiError> {
    if id.trim().is_empty() {
        Err(ApiError::bad_request())
    } else {
        Ok(id)
    }
}

async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order = state.queries.get_order_by_uid(order_id(&id)?).await?;
    Ok(Json(order))
}

async fn get_order_items(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ItemsQuery>,
) -> Result<Json<Vec<Item>>, ApiError> {
    let id = order_id(&id)?;
    let (last_id, limit) = query.page()?;
    let items = state
        .queries
        .get_items_by_order_uid(id, last_id, limit)
        .await?;
    Ok(Json(items))
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: &'static str,
    /// Service version
    pub version: &'static str,
}

#[allow(clippy::unused_async)]
async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}

#[allow(clippy::unused_async)]
async fn render_metrics(State(state): State<AppState>) -> String {
    state
        .metrics
        .as_ref()
        .map(PrometheusHandle::render)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(limit: Option<&str>, last_id: Option<&str>) -> ItemsQuery {
        ItemsQuery {
            limit: limit.map(str::to_string),
            last_id: last_id.map(str::to_string),
        }
    }

    #[test]
    fn page_defaults() {
        assert!(matches!(query(None, None).page(), Ok((0, 10))));
        assert!(matches!(query(Some(""), Some("")).page(), Ok((0, 10))));
    }

    #[test]
    fn limit_is_clamped() {
        assert!(matches!(query(Some("500"), None).page(), Ok((0, 100))));
        assert!(matches!(query(Some("100"), Some("7")).page(), Ok((7, 100))));
    }

    #[test]
    fn non_positive_or_garbage_limit_is_rejected() {
        for raw in ["0", "-3", "ten", "1.5"] {
            let err = query(Some(raw), None).page().err();
            assert_eq!(err.map(|e| e.status()), Some(StatusCode::BAD_REQUEST), "{raw}");
        }
    }

    #[test]
    fn negative_last_id_is_rejected() {
        let err = query(None, Some("-1")).page().err();
        assert_eq!(err.map(|e| e.status()), Some(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn blank_order_id_is_rejected() {
        assert!(order_id("   ").is_err());
        assert!(matches!(order_id("abc"), Ok("abc")));
    }
}
