use actix_web::{error, http::StatusCode, HttpResponse};
use log::debug;
use serde_json::json;
use thiserror::Error;

/// Logs the underlying cause and answers with a generic 500.
pub fn log_error<E: std::fmt::Debug>(err: E, message: &'static str) -> error::Error {
    debug!("{:?}", err);
    error::ErrorInternalServerError(message)
}

/// Errors of the JSON API, rendered as `{"detail": ...}`.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(&'static str),
    #[error("{0}")]
    BadRequest(&'static str),
    #[error("Not authenticated")]
    Unauthorized,
    #[error("{0}")]
    BadGateway(&'static str),
    #[error("{0}")]
    Internal(&'static str),
}

impl ApiError {
    pub fn internal<E: std::fmt::Debug>(message: &'static str) -> impl FnOnce(E) -> ApiError {
        move |err| {
            debug!("{:?}", err);
            ApiError::Internal(message)
        }
    }
}

impl error::ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "detail": self.to_string() }))
    }
}
