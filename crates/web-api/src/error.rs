use application::VerificationError;
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
    pub code: &'static str,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                success: false,
                message: message.into(),
                code,
            },
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<VerificationError> for ApiError {
    fn from(error: VerificationError) -> Self {
        use VerificationError as VErr;

        match error {
            VErr::InvalidInput(message) => {
                ApiError::new(StatusCode::BAD_REQUEST, "INVALID_INPUT", message)
            }
            VErr::InvalidPhoneNumber => ApiError::new(
                StatusCode::BAD_REQUEST,
                "INVALID_PHONE_NUMBER",
                "Invalid phone number format. Please enter a valid Indian mobile number.",
            ),
            VErr::NotFound => ApiError::new(
                StatusCode::BAD_REQUEST,
                "CODE_NOT_FOUND",
                "No verification code found for this number. Please request a new one.",
            ),
            VErr::Expired => ApiError::new(
                StatusCode::BAD_REQUEST,
                "CODE_EXPIRED",
                "Verification code has expired. Please request a new one.",
            ),
            VErr::Mismatch => ApiError::new(
                StatusCode::BAD_REQUEST,
                "CODE_MISMATCH",
                "Invalid verification code. Please try again.",
            ),
            VErr::ProviderRejected(message) => {
                ApiError::new(StatusCode::BAD_REQUEST, "SMS_REJECTED", message)
            }
            VErr::ProviderError { status, message } => {
                let status = status
                    .and_then(|code| StatusCode::from_u16(code).ok())
                    .filter(StatusCode::is_server_error)
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                tracing::error!(status = status.as_u16(), error = %message, "sms provider failure");
                ApiError::new(status, "SMS_PROVIDER_ERROR", "Failed to send verification code. Please try again later.")
            }
            VErr::Storage(err) => {
                tracing::error!(error = %err, "verification store failure");
                ApiError::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "STORAGE_ERROR",
                    "Verification service is temporarily unavailable.",
                )
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
