use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    middleware,
    response::Response,
    routing::get,
};

use super::{
    db_health_response, db_unconfigured_response,
    middleware::{log_responses, set_request_context},
};
use crate::{
    application::{
        error::AppError,
        forecast::{ForecastService, WeatherForecast},
    },
    cache::{ResponseCacheState, response_cache_layer},
    infra::db::PostgresCacheStore,
};

#[derive(Clone)]
pub struct HttpState {
    pub forecast: Arc<ForecastService>,
    pub db: Option<Arc<PostgresCacheStore>>,
    pub cache: ResponseCacheState,
}

pub fn build_router(state: HttpState) -> Router {
    let cached_routes = Router::new()
        .route("/weatherforecast", get(weather_forecast))
        .layer(middleware::from_fn_with_state(
            state.cache.clone(),
            response_cache_layer,
        ));

    let static_routes = Router::new().route("/_health/db", get(db_health));

    cached_routes
        .merge(static_routes)
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn weather_forecast(
    State(state): State<HttpState>,
) -> Result<Json<Vec<WeatherForecast>>, AppError> {
    state.forecast.forecast().map(Json)
}

async fn db_health(State(state): State<HttpState>) -> Response {
    match state.db.as_ref() {
        Some(db) => db_health_response(db.health_check().await),
        None => db_unconfigured_response(),
    }
}
