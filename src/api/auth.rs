// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Sign-in and token refresh endpoints.
//!
//! Unknown e-mail, wrong passphrase and wrong second factor all answer with
//! the same 404 so the endpoint cannot be used to enumerate accounts.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;

use crate::{
    auth::{password::spawn_verify, totp::hash_recovery_code, Auth},
    error::{ApiError, ApiJson},
    models::{
        AuthenticateRequest, Authenticate2faRequest, Recover2faRequest, RefreshResponse, TokenResponse,
        TwoFactorRequired,
    },
    state::AppState,
    storage::{StoreError, User},
};

const BAD_CREDENTIALS: &str = "unknown email or passphrase";

#[utoipa::path(
    post,
    path = "/api/v1/auth/authenticate",
    request_body = AuthenticateRequest,
    tag = "Auth",
    responses(
        (status = 200, description = "Signed in", body = TokenResponse),
        (status = 202, description = "Second factor required", body = TwoFactorRequired),
        (status = 403, description = "Account disabled or suspended"),
        (status = 404, description = "Unknown email or wrong passphrase"),
    )
)]
pub async fn authenticate(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<AuthenticateRequest>,
) -> Result<Response, ApiError> {
    let user = check_credentials(&state, &request.email, &request.passphrase).await?;
    if user.two_factor_enabled {
        tracing::debug!(user_id = %user.id, "Second factor required");
        return Ok((StatusCode::ACCEPTED, Json(TwoFactorRequired { required: true })).into_response());
    }
    Ok(Json(sign_in(&state, user)?).into_response())
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/authenticate2fa",
    request_body = Authenticate2faRequest,
    tag = "Auth",
    responses(
        (status = 200, description = "Signed in", body = TokenResponse),
        (status = 403, description = "Account disabled or suspended"),
        (status = 404, description = "Unknown email, wrong passphrase or wrong code"),
    )
)]
pub async fn authenticate_2fa(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<Authenticate2faRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let user = check_credentials(&state, &request.email, &request.passphrase).await?;
    let secret = second_factor_secret(&user)?;
    if !state.totp.verify_now(secret, &request.token)? {
        tracing::warn!(user_id = %user.id, "TOTP code rejected");
        return Err(ApiError::not_found(BAD_CREDENTIALS));
    }
    Ok(Json(sign_in(&state, user)?))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/recover2fa",
    request_body = Recover2faRequest,
    tag = "Auth",
    responses(
        (status = 200, description = "Signed in; the recovery code is spent", body = TokenResponse),
        (status = 403, description = "Account inactive or code already used"),
        (status = 404, description = "Unknown email, wrong passphrase or unknown code"),
    )
)]
pub async fn recover_2fa(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<Recover2faRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let user = check_credentials(&state, &request.email, &request.passphrase).await?;
    second_factor_secret(&user)?;

    match state
        .store
        .consume_recovery_code(&user.id, &hash_recovery_code(&request.recovery_code))
    {
        Ok(()) => tracing::warn!(user_id = %user.id, "Recovery code spent"),
        Err(StoreError::NotFound(_)) => {
            tracing::warn!(user_id = %user.id, "Unknown recovery code");
            return Err(ApiError::not_found(BAD_CREDENTIALS));
        }
        Err(e) => {
            if matches!(e, StoreError::CodeAlreadyUsed) {
                tracing::warn!(user_id = %user.id, "Recovery code replayed");
            }
            return Err(e.into());
        }
    }
    Ok(Json(sign_in(&state, user)?))
}

/// Exchange the refresh token that passed access control for a new access token.
#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    tag = "Auth",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "New access token", body = RefreshResponse),
        (status = 401, description = "Missing or malformed authorization header"),
        (status = 403, description = "Not a valid refresh token"),
    )
)]
pub async fn refresh(State(state): State<AppState>, Auth(context): Auth) -> Result<Json<RefreshResponse>, ApiError> {
    let access_token = state.tokens.refresh(&context.token)?;
    tracing::debug!(subject = %context.subject, "Access token refreshed");
    Ok(Json(RefreshResponse { access_token }))
}

/// Resolve the principal and check passphrase and account state.
async fn check_credentials(state: &AppState, email: &str, passphrase: &str) -> Result<User, ApiError> {
    let user = match state.store.get_user_by_email(email) {
        Ok(user) => user,
        Err(StoreError::NotFound(_)) => {
            tracing::debug!(email = %email, "Sign-in for unknown email");
            return Err(ApiError::not_found(BAD_CREDENTIALS));
        }
        Err(e) => return Err(e.into()),
    };

    if !spawn_verify(passphrase, &user.passphrase_hash).await? {
        tracing::warn!(user_id = %user.id, "Wrong passphrase");
        return Err(ApiError::not_found(BAD_CREDENTIALS));
    }
    if !user.may_sign_in() {
        tracing::warn!(user_id = %user.id, enabled = user.enabled, suspended = user.suspended, "Inactive account");
        return Err(ApiError::forbidden("account is disabled or suspended"));
    }
    Ok(user)
}

fn second_factor_secret(user: &User) -> Result<&str, ApiError> {
    match user.totp_secret.as_deref() {
        Some(secret) if user.two_factor_enabled => Ok(secret),
        _ => Err(ApiError::bad_request("two-factor authentication is not enabled")),
    }
}

/// Issue a token pair whose audience is the principal's effective role names.
fn sign_in(state: &AppState, mut user: User) -> Result<TokenResponse, ApiError> {
    let audience = state.rbac.role_names_for(&user.id)?;
    let pair = state.tokens.issue_pair(&user.email, &audience, Default::default())?;

    let now = Utc::now();
    user.last_login = Some(now);
    user.last_seen = Some(now);
    user.updated_at = now;
    state.store.save_user(&user)?;

    tracing::info!(user_id = %user.id, roles = audience.len(), "Signed in");
    Ok(pair.into())
}
