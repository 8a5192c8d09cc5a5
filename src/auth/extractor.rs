// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractor for the authentication context.
//!
//! Use the `Auth` extractor in handlers behind a protected rule:
//!
//! ```rust,ignore
//! async fn my_handler(Auth(ctx): Auth) -> impl IntoResponse {
//!     // ctx.subject is the caller's email
//! }
//! ```

use axum::{extract::FromRequestParts, http::request::Parts};

use super::{AuthError, AuthenticationContext};

/// Extractor for the context the access control middleware attached.
///
/// Rejects with 401 when the request went through a public rule and carries
/// no context.
pub struct Auth(pub AuthenticationContext);

impl<S> FromRequestParts<S> for Auth
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticationContext>()
            .cloned()
            .map(Auth)
            .ok_or(AuthError::MissingContext)
    }
}
