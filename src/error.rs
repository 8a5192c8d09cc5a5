// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{rejection::JsonRejection, FromRequest},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::auth::{password::PasswordError, AuthError, TokenError, TotpError};
use crate::storage::StoreError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    /// Opaque 500. The cause goes to the log, never to the caller.
    pub fn internal(cause: impl std::fmt::Display) -> Self {
        tracing::error!(error = %cause, "Request failed");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
    }
}

/// JSON body extractor whose rejections are reported as [`ApiError`].
///
/// A missing content type, unparsable JSON or a missing field all answer 400.
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(reason = %rejection.body_text(), "Malformed request body");
        Self::bad_request(rejection.body_text())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::not_found(format!("not found: {what}")),
            StoreError::AlreadyExists(what) => Self::bad_request(format!("already exists: {what}")),
            StoreError::CodeAlreadyUsed => Self::forbidden("authenticated but not allowed"),
            other => Self::internal(other),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let status = err.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            return Self::internal(err);
        }
        tracing::warn!(reason = %err, "Request refused");
        match status {
            StatusCode::UNAUTHORIZED => Self::unauthorized(err.to_string()),
            _ => Self::forbidden("authenticated but not allowed"),
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        AuthError::from(err).into()
    }
}

impl From<TotpError> for ApiError {
    fn from(err: TotpError) -> Self {
        match err {
            TotpError::MissingSecret => Self::bad_request("two-factor authentication is not provisioned"),
            other => Self::internal(other),
        }
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        Self::internal(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn constructors_set_status_and_message() {
        let nf = ApiError::not_found("missing");
        assert_eq!(nf.status, StatusCode::NOT_FOUND);
        assert_eq!(nf.message, "missing");

        let bad = ApiError::bad_request("bad");
        assert_eq!(bad.status, StatusCode::BAD_REQUEST);
        assert_eq!(bad.message, "bad");

        let unauth = ApiError::unauthorized("who");
        assert_eq!(unauth.status, StatusCode::UNAUTHORIZED);

        let forbidden = ApiError::forbidden("no");
        assert_eq!(forbidden.status, StatusCode::FORBIDDEN);
    }

    #[test]
    fn internal_hides_cause() {
        let err = ApiError::internal("disk on fire");
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "internal error");
    }

    #[test]
    fn store_errors_map_to_statuses() {
        let nf: ApiError = StoreError::NotFound("user x".into()).into();
        assert_eq!(nf.status, StatusCode::NOT_FOUND);

        let dup: ApiError = StoreError::AlreadyExists("role admin".into()).into();
        assert_eq!(dup.status, StatusCode::BAD_REQUEST);

        let used: ApiError = StoreError::CodeAlreadyUsed.into();
        assert_eq!(used.status, StatusCode::FORBIDDEN);

        let io: ApiError = StoreError::Io(std::io::Error::other("boom")).into();
        assert_eq!(io.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(io.message, "internal error");
    }

    #[test]
    fn token_errors_are_generic_refusals() {
        let err: ApiError = TokenError::InvalidSignature.into();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
        assert_eq!(err.message, "authenticated but not allowed");

        let signing: ApiError = TokenError::Signing("key".into()).into();
        assert_eq!(signing.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    async fn extract_login(content_type: &str, body: &str) -> Result<ApiJson<serde_json::Value>, ApiError> {
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/api/v1/auth/authenticate")
            .header(axum::http::header::CONTENT_TYPE, content_type)
            .body(axum::body::Body::from(body.to_string()))
            .unwrap();
        ApiJson::from_request(request, &()).await
    }

    #[tokio::test]
    async fn malformed_bodies_are_bad_requests() {
        let ApiJson(value) = extract_login("application/json", r#"{"email":"a@example.com"}"#)
            .await
            .unwrap();
        assert_eq!(value["email"], "a@example.com");

        let err = extract_login("text/plain", r#"{"email":"a@example.com"}"#).await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let err = extract_login("application/json", "{not json").await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_field_is_a_bad_request() {
        #[derive(Debug, serde::Deserialize)]
        #[allow(dead_code)]
        struct Login {
            email: String,
            passphrase: String,
        }

        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/")
            .header(axum::http::header::CONTENT_TYPE, "application/json")
            .body(axum::body::Body::from(r#"{"email":"a@example.com"}"#))
            .unwrap();
        let err = ApiJson::<Login>::from_request(request, &()).await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.message.contains("passphrase"));
    }

    #[tokio::test]
    async fn into_response_returns_json_body() {
        let response = ApiError::bad_request("bad data").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert_eq!(body, r#"{"error":"bad data"}"#);
    }
}
