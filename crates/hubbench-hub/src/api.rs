use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::store::{HubStore, StoreError};

/// Accept value that opts a request into the paginated response shape.
pub const PAGINATION_MEDIA_TYPE: &str = "application/jupyterhub-pagination+json";
pub const DEFAULT_PAGE_LIMIT: u64 = 50;

pub struct ApiState {
    pub(crate) store: Mutex<HubStore>,
    pub(crate) token: String,
    pub(crate) page_limit: u64,
}

impl ApiState {
    pub(crate) fn store(&self) -> MutexGuard<'_, HubStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub(crate) fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/hub/api", get(info))
        .route("/hub/api/users", get(list_users))
        .with_state(state)
}

async fn info() -> Json<Value> {
    Json(json!({ "version": env!("CARGO_PKG_VERSION") }))
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    offset: Option<u64>,
    limit: Option<u64>,
}

async fn list_users(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<PageQuery>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers, &state.token) {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "message": "missing or invalid credential" })),
        )
            .into_response();
    }

    let offset = query.offset.unwrap_or(0);
    let limit = query.limit.unwrap_or(state.page_limit);
    let (rows, total) = {
        let store = state.store();
        let total = match store.tenant_count() {
            Ok(total) => total,
            Err(err) => return internal(err),
        };
        let rows = match store.tenants_page(offset, limit) {
            Ok(rows) => rows,
            Err(err) => return internal(err),
        };
        (rows, total)
    };

    let items: Vec<Value> = rows
        .into_iter()
        .map(|tenant| {
            json!({
                "name": tenant.name,
                "session": tenant
                    .session
                    .map(|s| json!({ "ip": s.ip, "port": s.port })),
            })
        })
        .collect();

    if wants_pagination(&headers) {
        let next = if offset.saturating_add(items.len() as u64) < total {
            json!({ "offset": offset.saturating_add(limit), "limit": limit })
        } else {
            Value::Null
        };
        Json(json!({
            "items": items,
            "_pagination": {
                "offset": offset,
                "limit": limit,
                "total": total,
                "next": next,
            },
        }))
        .into_response()
    } else {
        Json(Value::Array(items)).into_response()
    }
}

fn authorized(headers: &HeaderMap, token: &str) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(|value| value == format!("token {token}"))
        .unwrap_or(false)
}

fn wants_pagination(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.contains(PAGINATION_MEDIA_TYPE))
        .unwrap_or(false)
}

fn internal(err: StoreError) -> Response {
    tracing::error!(error = %err, "tenant listing query failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "message": "backing store failure" })),
    )
        .into_response()
}
