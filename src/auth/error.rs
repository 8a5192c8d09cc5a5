// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Access control errors.
//!
//! The `Display` text carries the precise reason and is meant for logs. The
//! HTTP body only distinguishes "no usable credential" (401) from "credential
//! refused" (403), so a caller probing the rule list cannot tell an expired
//! token from one with the wrong audience.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use super::claims::TokenType;
use super::token::TokenError;

/// Access control error type.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No authorization header present
    #[error("authorization header is required")]
    MissingAuthHeader,
    /// Header present but not `Bearer <token>`
    #[error("invalid authorization header format (expected 'Bearer <token>')")]
    InvalidAuthHeader,
    /// Token failed parsing, verification or the issuer check
    #[error("token rejected: {0}")]
    InvalidToken(#[from] TokenError),
    /// Token type does not fit the matched rule
    #[error("rule accepts {expected} tokens but got {actual}")]
    WrongTokenType { expected: TokenType, actual: TokenType },
    /// Valid token whose audience matches no rule for this request
    #[error("authenticated but not allowed")]
    InsufficientPermissions,
    /// Handler asked for an authentication context the middleware never set
    #[error("no authentication context on request")]
    MissingContext,
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingAuthHeader => "missing_auth_header",
            AuthError::InvalidAuthHeader => "invalid_auth_header",
            AuthError::MissingContext => "unauthenticated",
            AuthError::InvalidToken(_)
            | AuthError::WrongTokenType { .. }
            | AuthError::InsufficientPermissions => "forbidden",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingAuthHeader | AuthError::InvalidAuthHeader | AuthError::MissingContext => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::InvalidToken(TokenError::Signing(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            AuthError::InvalidToken(_)
            | AuthError::WrongTokenType { .. }
            | AuthError::InsufficientPermissions => StatusCode::FORBIDDEN,
        }
    }

    /// Message returned to the caller.
    fn public_message(&self) -> String {
        match self.status_code() {
            StatusCode::FORBIDDEN => "authenticated but not allowed".to_string(),
            StatusCode::INTERNAL_SERVER_ERROR => "internal error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.public_message(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}
