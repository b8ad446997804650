//! Local read endpoint.
//!
//! - `GET /`: latest snapshot as JSON, or `null` before the first fetch
//! - `GET /health`: scheduler state and tick counters
//!
//! No authentication. CORS follows the configured origin list; development
//! mode accepts any origin.

use axum::{
    Json, Router,
    extract::{Request, State},
    http::{HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use serde_json::json;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{error, warn};

use crate::{
    config::{Config, Environment},
    context::SharedContext,
    error::StoreError,
    model::WeatherSnapshot,
    scheduler::TickState,
};

pub fn router(ctx: SharedContext) -> Router {
    let cors = cors_layer(&ctx.config);

    Router::new()
        .route("/", get(latest_weather))
        .route("/health", get(health))
        .layer(cors)
        .layer(middleware::from_fn(preflight_no_content))
        .with_state(ctx)
}

pub fn cors_layer(config: &Config) -> CorsLayer {
    let base = CorsLayer::new().allow_methods([Method::GET, Method::OPTIONS]);

    match config.environment {
        Environment::Development => base.allow_origin(Any).allow_headers(Any),
        Environment::Production => {
            let origins: Vec<HeaderValue> = config
                .allowed_origins
                .iter()
                .filter_map(|origin| match HeaderValue::from_str(origin) {
                    Ok(value) => Some(value),
                    Err(_) => {
                        warn!(origin = %origin, "ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            base.allow_origin(AllowOrigin::list(origins))
        }
    }
}

/// Answer successful pre-flights with `204 No Content`.
async fn preflight_no_content(req: Request, next: Next) -> Response {
    let is_options = req.method() == Method::OPTIONS;
    let mut res = next.run(req).await;
    if is_options && res.status() == StatusCode::OK {
        *res.status_mut() = StatusCode::NO_CONTENT;
    }
    res
}

#[derive(Debug)]
pub struct ApiError(StoreError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(error = %self.0, "store read failed");
        let body = json!({
            "error": {
                "code": "store_error",
                "message": self.0.to_string(),
            }
        });
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError(e)
    }
}

async fn latest_weather(
    State(ctx): State<SharedContext>,
) -> Result<Json<Option<WeatherSnapshot>>, ApiError> {
    Ok(Json(ctx.cache.latest().await?))
}

#[derive(Debug, Serialize)]
struct HealthReport {
    status: &'static str,
    last_tick: TickState,
    ticks_ok: u64,
    ticks_failed: u64,
    has_snapshot: bool,
}

async fn health(State(ctx): State<SharedContext>) -> Result<Json<HealthReport>, ApiError> {
    let status = ctx.scheduler.status();
    let has_snapshot = ctx.cache.latest().await?.is_some();

    Ok(Json(HealthReport {
        status: "ok",
        last_tick: status.last_tick,
        ticks_ok: status.ticks_ok,
        ticks_failed: status.ticks_failed,
        has_snapshot,
    }))
}
