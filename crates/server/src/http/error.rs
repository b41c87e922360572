use axum::http::StatusCode;
use domain::Error;

pub type ApiError = (StatusCode, String);

pub fn api_error(e: Error) -> ApiError {
    let status = match &e {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Unauthenticated => StatusCode::UNAUTHORIZED,
        Error::ContentTooLong { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        Error::TransportFailure(inner) => {
            tracing::error!("Storage failure: {:?}", inner);
            StatusCode::BAD_GATEWAY
        }
    };
    (status, e.to_string())
}

pub fn bad_request(message: impl Into<String>) -> ApiError {
    (StatusCode::BAD_REQUEST, message.into())
}
