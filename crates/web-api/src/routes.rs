use axum::{
    extract::{rejection::JsonRejection, State, WebSocketUpgrade},
    http::{header, HeaderValue, Method, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use application::DeliveryMode;
use domain::Timestamp;

use crate::{error::ApiError, state::AppState, ws_connection::WebSocketConnection};

/// 字符串或数字，前端有时把验证码当数字提交
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TextOrNumber {
    Text(String),
    Number(u64),
}

impl TextOrNumber {
    fn into_text(self) -> String {
        match self {
            TextOrNumber::Text(text) => text,
            TextOrNumber::Number(number) => number.to_string(),
        }
    }
}

fn text_or_empty(value: Option<TextOrNumber>) -> String {
    value.map(TextOrNumber::into_text).unwrap_or_default()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendCodePayload {
    phone_number: Option<TextOrNumber>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyCodePayload {
    phone_number: Option<TextOrNumber>,
    #[serde(alias = "otp")]
    code: Option<TextOrNumber>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendCodeResponse {
    success: bool,
    message: &'static str,
    expires_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct VerifyCodeResponse {
    success: bool,
    message: &'static str,
    verified: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(websocket_upgrade))
        .nest("/api/user", verification_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn verification_routes() -> Router<AppState> {
    Router::new()
        .route("/sendotp", post(send_code))
        .route("/verifyotp", post(verify_code))
}

/// 按配置的来源列表构建 CORS 层，列表为空时允许任意来源
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    if origins.is_empty() {
        return base.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(origin = %origin, error = %err, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    base.allow_origin(AllowOrigin::list(allowed))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn send_code(
    State(state): State<AppState>,
    payload: Result<Json<SendCodePayload>, JsonRejection>,
) -> Result<Json<SendCodeResponse>, ApiError> {
    let Json(payload) = payload?;
    let issued = state
        .verification
        .issue(&text_or_empty(payload.phone_number))
        .await?;

    let message = match state.verification.policy().delivery {
        DeliveryMode::Echo => "Verification code generated (development mode)",
        DeliveryMode::Sms => "Verification code sent successfully",
    };

    Ok(Json(SendCodeResponse {
        success: true,
        message,
        expires_at: issued.expires_at,
        code: issued.code.map(|code| code.as_str().to_string()),
        message_id: issued.message_id,
    }))
}

async fn verify_code(
    State(state): State<AppState>,
    payload: Result<Json<VerifyCodePayload>, JsonRejection>,
) -> Result<Json<VerifyCodeResponse>, ApiError> {
    let Json(payload) = payload?;
    let confirmation = state
        .verification
        .confirm(
            &text_or_empty(payload.phone_number),
            &text_or_empty(payload.code),
        )
        .await?;

    Ok(Json(VerifyCodeResponse {
        success: true,
        message: "Phone number verified successfully",
        verified: confirmation.verified,
    }))
}

async fn websocket_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| WebSocketConnection::new(state).run(socket))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_accepts_string_number_and_otp_alias() {
        let payload: VerifyCodePayload =
            serde_json::from_str(r#"{"phoneNumber":"9876543210","code":123456}"#).unwrap();
        assert_eq!(text_or_empty(payload.code), "123456");

        let payload: VerifyCodePayload =
            serde_json::from_str(r#"{"phoneNumber":9876543210,"otp":"654321"}"#).unwrap();
        assert_eq!(text_or_empty(payload.phone_number), "9876543210");
        assert_eq!(text_or_empty(payload.code), "654321");
    }

    #[test]
    fn test_missing_fields_become_empty() {
        let payload: VerifyCodePayload = serde_json::from_str("{}").unwrap();
        assert_eq!(text_or_empty(payload.phone_number), "");
        assert_eq!(text_or_empty(payload.code), "");
    }

    #[test]
    fn test_send_response_omits_absent_fields() {
        let response = SendCodeResponse {
            success: true,
            message: "ok",
            expires_at: chrono::Utc::now(),
            code: None,
            message_id: Some("SM1".to_string()),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("code").is_none());
        assert_eq!(json["messageId"], "SM1");
    }
}
