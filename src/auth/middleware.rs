// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Access control middleware for Axum.
//!
//! Runs every request through [`AccessControl::decide`](super::AccessControl::decide)
//! before routing. On grant the [`AuthenticationContext`](super::AuthenticationContext)
//! is added to the request extensions, where the [`Auth`](super::Auth)
//! extractor picks it up.
//!
//! ```rust,ignore
//! let app = Router::new()
//!     .route("/protected", get(protected_handler))
//!     .layer(axum::middleware::from_fn_with_state(state.clone(), access_control));
//! ```

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::acl::Decision;
use crate::state::AppState;

/// Access control middleware function.
pub async fn access_control(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    // a header that is not valid UTF-8 is treated like a non-bearer scheme
    let authorization = request
        .headers()
        .get(AUTHORIZATION)
        .map(|value| value.to_str().unwrap_or_default().to_string());

    match state.access_control.decide(&method, &path, authorization.as_deref()) {
        Ok(Decision::Public) => next.run(request).await,
        Ok(Decision::Granted(context)) => {
            request.extensions_mut().insert(context);
            next.run(request).await
        }
        Err(e) => {
            tracing::warn!(%method, path = %path, status = %e.status_code(), reason = %e, "Request refused");
            e.into_response()
        }
    }
}
