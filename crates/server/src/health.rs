use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use textsql_core::domain::schema::ConnectionRef;
use textsql_db::{DbPool, TargetRegistry};

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    targets: TargetRegistry,
}

impl HealthState {
    pub fn new(db_pool: DbPool, targets: TargetRegistry) -> Self {
        Self { db_pool, targets }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub target: HealthCheck,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let target = target_check(&state.targets).await;
    let ready = database.status == "ready" && target.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "textsql-server runtime initialized".to_string(),
        },
        database,
        target,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "prompt store query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("prompt store query failed: {error}") }
        }
    }
}

async fn target_check(targets: &TargetRegistry) -> HealthCheck {
    match targets.ping(&ConnectionRef::default()).await {
        Ok(()) => HealthCheck { status: "ready", detail: "target database reachable".to_string() },
        Err(error) => HealthCheck { status: "degraded", detail: error.to_string() },
    }
}
