use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use tably_db::DbPool;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ComponentCheck {
    pub component: &'static str,
    pub ready: bool,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub checks: Vec<ComponentCheck>,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let checks = vec![
        ComponentCheck {
            component: "service",
            ready: true,
            detail: "tably-server runtime initialized".to_string(),
        },
        database_check(&state.db_pool).await,
    ];
    let ready = checks.iter().all(|check| check.ready);

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        checks,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> ComponentCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => ComponentCheck {
            component: "database",
            ready: true,
            detail: "database query succeeded".to_string(),
        },
        Err(error) => ComponentCheck {
            component: "database",
            ready: false,
            detail: format!("database query failed: {error}"),
        },
    }
}
