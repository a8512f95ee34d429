use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

use crate::form::FormError;
use crate::session::SessionError;
use crate::store::StoreError;
use crate::upload::UploadError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("invalid id format: {0}")]
    InvalidId(String),
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl From<FormError> for ApiError {
    fn from(e: FormError) -> Self {
        ApiError::Session(SessionError::Form(e))
    }
}

impl From<UploadError> for ApiError {
    fn from(e: UploadError) -> Self {
        ApiError::Session(SessionError::Upload(e))
    }
}

fn store_status(e: &StoreError) -> StatusCode {
    match e {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Database(_) | StoreError::Unavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Session(e) => match e {
                SessionError::NotFound(_) | SessionError::Form(_) => StatusCode::NOT_FOUND,
                SessionError::NotPersisted | SessionError::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
                SessionError::Busy(_) => StatusCode::CONFLICT,
                SessionError::Store(e) => store_status(e),
                SessionError::Upload(UploadError::Io(_)) => StatusCode::INTERNAL_SERVER_ERROR,
                SessionError::Upload(UploadError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
                SessionError::Upload(_) => StatusCode::BAD_REQUEST,
            },
            ApiError::Store(e) => store_status(e),
            ApiError::InvalidId(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if let ApiError::Session(SessionError::Invalid(errors)) = self {
            return HttpResponse::build(status).json(json!({
                "message": "Invalid product",
                "errors": errors,
            }));
        }
        // Backend details stay in the logs.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        HttpResponse::build(status).json(json!({ "message": message }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::GroupId;
    use crate::session::SessionId;

    #[test]
    fn maps_domain_errors_to_status_codes() {
        let cases = [
            (ApiError::from(SessionError::NotFound(SessionId::new())), StatusCode::NOT_FOUND),
            (
                ApiError::from(SessionError::Form(FormError::GroupNotFound(GroupId::new()))),
                StatusCode::NOT_FOUND,
            ),
            (ApiError::from(SessionError::Busy("save")), StatusCode::CONFLICT),
            (ApiError::from(UploadError::Empty), StatusCode::BAD_REQUEST),
            (
                ApiError::from(UploadError::TooLarge { size: 10, max: 5 }),
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (
                ApiError::from(StoreError::Unavailable("down".to_string())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (ApiError::InvalidId("zz".to_string()), StatusCode::BAD_REQUEST),
        ];
        for (err, status) in cases {
            assert_eq!(err.status_code(), status, "{}", err);
        }
    }
}
