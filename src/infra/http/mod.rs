mod middleware;
mod public;

pub use middleware::{RequestContext, log_responses, set_request_context};
pub use public::{HttpState, build_router};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sqlx::Error as SqlxError;

use crate::application::error::ErrorReport;

const DB_HEALTH_SOURCE: &str = "infra::http::db_health";

fn db_health_response(result: Result<(), SqlxError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(DB_HEALTH_SOURCE, StatusCode::SERVICE_UNAVAILABLE, &err)
                .attach(&mut response);
            response
        }
    }
}

fn db_unconfigured_response() -> Response {
    let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
    ErrorReport::from_message(
        DB_HEALTH_SOURCE,
        StatusCode::SERVICE_UNAVAILABLE,
        "database url is not configured",
    )
    .attach(&mut response);
    response
}
