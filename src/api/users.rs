// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User management and self-service endpoints.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use subtle::ConstantTimeEq;

use crate::{
    auth::{
        password::{spawn_hash, spawn_verify},
        totp::hash_recovery_code,
        Auth, TotpEngine, TotpError,
    },
    error::{ApiError, ApiJson},
    mailer::Email,
    models::{
        Activate2faRequest, Activate2faResponse, ActivateUserRequest, ChangePassphraseRequest, CreateUserRequest,
        GroupList, PageResponse, RoleList, UpdateUserRequest, UserPageQuery, UserView, WhoAmIResponse,
    },
    state::AppState,
    storage::{database::new_activation_code, StoreError, User},
};

#[utoipa::path(
    get,
    path = "/api/v1/management/users",
    params(UserPageQuery),
    tag = "Users",
    security(("bearer" = [])),
    responses((status = 200, body = PageResponse<UserView>))
)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<UserPageQuery>,
) -> Result<Json<PageResponse<UserView>>, ApiError> {
    let page = state.store.list_users(query.into())?;
    Ok(Json(page.map(UserView::from).into()))
}

/// Create a disabled user and mail it an activation code.
#[utoipa::path(
    post,
    path = "/api/v1/management/user",
    request_body = CreateUserRequest,
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 201, body = UserView),
        (status = 400, description = "Malformed input or e-mail already registered"),
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserView>), ApiError> {
    let email = request.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::bad_request("a valid email is required"));
    }
    if request.passphrase.is_empty() {
        return Err(ApiError::bad_request("passphrase must not be empty"));
    }

    let hash = spawn_hash(&request.passphrase).await?;
    let user = state.store.create_user(email, &hash)?;
    if let Some(code) = &user.activation_code {
        state.mailer.send(Email::verify(&user.email, code));
    }
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/management/user/{user_id}",
    params(("user_id" = String, Path, description = "User identifier")),
    tag = "Users",
    security(("bearer" = [])),
    responses((status = 200, body = UserView), (status = 404))
)]
pub async fn get_user(Path(user_id): Path<String>, State(state): State<AppState>) -> Result<Json<UserView>, ApiError> {
    Ok(Json(state.store.get_user(&user_id)?.into()))
}

/// Replace the user's e-mail and flags.
///
/// Changing the e-mail of a user that stays disabled assigns a new activation
/// code and mails it. Turning 2FA on for a user without a secret provisions one.
#[utoipa::path(
    put,
    path = "/api/v1/management/user/{user_id}",
    params(("user_id" = String, Path, description = "User identifier")),
    request_body = UpdateUserRequest,
    tag = "Users",
    security(("bearer" = [])),
    responses((status = 200, body = UserView), (status = 404))
)]
pub async fn update_user(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
    ApiJson(request): ApiJson<UpdateUserRequest>,
) -> Result<Json<UserView>, ApiError> {
    let mut user = state.store.get_user(&user_id)?;
    let email = request.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::bad_request("a valid email is required"));
    }

    let send_verification = user.email != email && !request.enabled;
    if send_verification {
        user.activation_code = Some(new_activation_code());
    }
    if request.two_factor_enabled && user.totp_secret.is_none() {
        state.store.replace_recovery_codes(&user.id, &[])?;
        user.totp_secret = Some(TotpEngine::generate_secret());
    }

    user.email = email.to_string();
    user.enabled = request.enabled;
    user.suspended = request.suspended;
    user.two_factor_enabled = request.two_factor_enabled;
    user.updated_at = Utc::now();
    state.store.save_user(&user)?;

    if let (true, Some(code)) = (send_verification, &user.activation_code) {
        state.mailer.send(Email::verify(&user.email, code));
    }
    tracing::info!(user_id = %user.id, enabled = user.enabled, suspended = user.suspended, "User updated");
    Ok(Json(user.into()))
}

#[utoipa::path(
    delete,
    path = "/api/v1/management/user/{user_id}",
    params(("user_id" = String, Path, description = "User identifier")),
    tag = "Users",
    security(("bearer" = [])),
    responses((status = 204), (status = 404))
)]
pub async fn delete_user(Path(user_id): Path<String>, State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.store.delete_user(&user_id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Enable an account with the code it was mailed.
#[utoipa::path(
    post,
    path = "/api/v1/management/user/activate",
    request_body = ActivateUserRequest,
    tag = "Users",
    responses(
        (status = 200, body = UserView),
        (status = 404, description = "Email and activation code do not match"),
    )
)]
pub async fn activate_user(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ActivateUserRequest>,
) -> Result<Json<UserView>, ApiError> {
    const MISMATCH: &str = "email and activation code do not match";

    let mut user = match state.store.get_user_by_email(&request.email) {
        Ok(user) => user,
        Err(StoreError::NotFound(_)) => return Err(ApiError::not_found(MISMATCH)),
        Err(e) => return Err(e.into()),
    };
    let matches = user
        .activation_code
        .as_deref()
        .is_some_and(|code| bool::from(code.as_bytes().ct_eq(request.activation_code.trim().as_bytes())));
    if !matches {
        tracing::warn!(user_id = %user.id, "Activation code mismatch");
        return Err(ApiError::not_found(MISMATCH));
    }

    user.enabled = true;
    user.activation_code = None;
    user.updated_at = Utc::now();
    state.store.save_user(&user)?;
    tracing::info!(user_id = %user.id, "User activated");
    Ok(Json(user.into()))
}

/// The caller's own record with direct and group-inherited roles.
#[utoipa::path(
    get,
    path = "/api/v1/management/user/whoami",
    tag = "Users",
    security(("bearer" = [])),
    responses((status = 200, body = WhoAmIResponse), (status = 404))
)]
pub async fn whoami(State(state): State<AppState>, Auth(context): Auth) -> Result<Json<WhoAmIResponse>, ApiError> {
    let user = caller(&state, &context.subject)?;
    let roles = state.rbac.summarize(&user.id)?;
    let effective_roles = roles.effective_roles();
    Ok(Json(WhoAmIResponse {
        user: user.into(),
        roles,
        effective_roles,
    }))
}

/// Change a passphrase. Callers may change their own; admins anyone's.
#[utoipa::path(
    post,
    path = "/api/v1/management/user/{user_id}/passwd",
    params(("user_id" = String, Path, description = "User identifier")),
    request_body = ChangePassphraseRequest,
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 204),
        (status = 403, description = "Not the caller's account"),
        (status = 406, description = "Old passphrase does not match"),
    )
)]
pub async fn change_passphrase(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
    Auth(context): Auth,
    ApiJson(request): ApiJson<ChangePassphraseRequest>,
) -> Result<StatusCode, ApiError> {
    let mut target = state.store.get_user(&user_id)?;
    let caller = caller(&state, &context.subject)?;
    if caller.id != target.id && !state.is_admin(&caller)? {
        tracing::warn!(caller = %caller.id, target = %target.id, "Passphrase change for another account");
        return Err(ApiError::forbidden("authenticated but not allowed"));
    }
    if request.new_passphrase.is_empty() {
        return Err(ApiError::bad_request("passphrase must not be empty"));
    }
    if !spawn_verify(&request.old_passphrase, &target.passphrase_hash).await? {
        return Err(ApiError::new(StatusCode::NOT_ACCEPTABLE, "old passphrase does not match"));
    }

    target.passphrase_hash = spawn_hash(&request.new_passphrase).await?;
    target.updated_at = Utc::now();
    state.store.save_user(&target)?;
    tracing::info!(user_id = %target.id, "Passphrase changed");
    Ok(StatusCode::NO_CONTENT)
}

/// Provision a fresh TOTP secret and return it as a QR code.
///
/// 2FA stays off until the secret is confirmed through `activate2FA`.
#[utoipa::path(
    get,
    path = "/api/v1/management/user/2FAQR",
    tag = "Users",
    security(("bearer" = [])),
    responses((status = 200, description = "PNG image", content_type = "image/png"))
)]
pub async fn totp_qr(State(state): State<AppState>, Auth(context): Auth) -> Result<impl IntoResponse, ApiError> {
    let mut user = caller(&state, &context.subject)?;
    let secret = TotpEngine::generate_secret();
    let png = state.totp.provisioning_png(&secret, &user.email)?;

    // codes from the previous secret die with it
    state.store.replace_recovery_codes(&user.id, &[])?;
    user.totp_secret = Some(secret);
    user.two_factor_enabled = false;
    user.updated_at = Utc::now();
    state.store.save_user(&user)?;
    tracing::warn!(user_id = %user.id, "New TOTP secret provisioned");

    Ok(([(header::CONTENT_TYPE, "image/png")], png))
}

/// Confirm the provisioned secret, enable 2FA and hand out recovery codes.
#[utoipa::path(
    post,
    path = "/api/v1/management/user/activate2FA",
    request_body = Activate2faRequest,
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 200, body = Activate2faResponse),
        (status = 400, description = "No secret provisioned"),
        (status = 404, description = "Invalid code"),
    )
)]
pub async fn activate_2fa(
    State(state): State<AppState>,
    Auth(context): Auth,
    ApiJson(request): ApiJson<Activate2faRequest>,
) -> Result<Json<Activate2faResponse>, ApiError> {
    let mut user = caller(&state, &context.subject)?;
    let secret = user.totp_secret.clone().ok_or(TotpError::MissingSecret)?;
    if !state.totp.verify_now(&secret, &request.token)? {
        tracing::warn!(user_id = %user.id, "Invalid TOTP code on activation");
        return Err(ApiError::not_found("invalid 2FA token"));
    }

    let recovery_codes = state.totp.recovery_batch();
    let hashes: Vec<String> = recovery_codes.iter().map(|c| hash_recovery_code(c)).collect();
    state.store.replace_recovery_codes(&user.id, &hashes)?;

    user.two_factor_enabled = true;
    user.updated_at = Utc::now();
    state.store.save_user(&user)?;
    tracing::warn!(user_id = %user.id, codes = hashes.len(), "2FA activated");
    Ok(Json(Activate2faResponse { recovery_codes }))
}

// =============================================================================
// Relations
// =============================================================================

/// Directly granted roles.
#[utoipa::path(
    get,
    path = "/api/v1/management/user/{user_id}/roles",
    params(("user_id" = String, Path, description = "User identifier")),
    tag = "Users",
    security(("bearer" = [])),
    responses((status = 200, body = RoleList), (status = 404))
)]
pub async fn list_user_roles(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<RoleList>, ApiError> {
    state.store.get_user(&user_id)?;
    Ok(Json(RoleList {
        roles: state.store.roles_of_user(&user_id)?,
    }))
}

/// Direct and group-inherited roles.
#[utoipa::path(
    get,
    path = "/api/v1/management/user/{user_id}/all-roles",
    params(("user_id" = String, Path, description = "User identifier")),
    tag = "Users",
    security(("bearer" = [])),
    responses((status = 200, body = RoleList), (status = 404))
)]
pub async fn list_user_all_roles(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<RoleList>, ApiError> {
    state.store.get_user(&user_id)?;
    Ok(Json(RoleList {
        roles: state.rbac.effective_roles(&user_id)?,
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/management/user/{user_id}/groups",
    params(("user_id" = String, Path, description = "User identifier")),
    tag = "Users",
    security(("bearer" = [])),
    responses((status = 200, body = GroupList), (status = 404))
)]
pub async fn list_user_groups(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<GroupList>, ApiError> {
    state.store.get_user(&user_id)?;
    Ok(Json(GroupList {
        groups: state.rbac.effective_groups(&user_id)?,
    }))
}

#[utoipa::path(
    put,
    path = "/api/v1/management/user/{user_id}/role/{role_id}",
    params(
        ("user_id" = String, Path, description = "User identifier"),
        ("role_id" = String, Path, description = "Role identifier")
    ),
    tag = "Users",
    security(("bearer" = [])),
    responses((status = 204), (status = 400, description = "Already granted"), (status = 404))
)]
pub async fn add_user_role(
    Path((user_id, role_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    state.store.add_user_role(&user_id, &role_id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/api/v1/management/user/{user_id}/role/{role_id}",
    params(
        ("user_id" = String, Path, description = "User identifier"),
        ("role_id" = String, Path, description = "Role identifier")
    ),
    tag = "Users",
    security(("bearer" = [])),
    responses((status = 204), (status = 404))
)]
pub async fn remove_user_role(
    Path((user_id, role_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    state.store.remove_user_role(&user_id, &role_id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/api/v1/management/user/{user_id}/group/{group_id}",
    params(
        ("user_id" = String, Path, description = "User identifier"),
        ("group_id" = String, Path, description = "Group identifier")
    ),
    tag = "Users",
    security(("bearer" = [])),
    responses((status = 204), (status = 400, description = "Already a member"), (status = 404))
)]
pub async fn add_user_group(
    Path((user_id, group_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    state.store.add_user_group(&user_id, &group_id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/api/v1/management/user/{user_id}/group/{group_id}",
    params(
        ("user_id" = String, Path, description = "User identifier"),
        ("group_id" = String, Path, description = "Group identifier")
    ),
    tag = "Users",
    security(("bearer" = [])),
    responses((status = 204), (status = 404))
)]
pub async fn remove_user_group(
    Path((user_id, group_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    state.store.remove_user_group(&user_id, &group_id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// The principal a token was issued to.
fn caller(state: &AppState, subject: &str) -> Result<User, ApiError> {
    state.store.get_user_by_email(subject).map_err(|e| match e {
        StoreError::NotFound(_) => {
            tracing::warn!(subject = %subject, "Token subject no longer exists");
            ApiError::not_found("subject not found")
        }
        other => other.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::{hash_passphrase, verify_passphrase};
    use crate::auth::AuthenticationContext;
    use crate::state::test_support::{TestContext, PASSPHRASE};
    use crate::storage::{GroupStore, RecoveryCodeStore, RelationStore, RoleStore, UserStore};
    use axum::body::to_bytes;

    fn auth_as(ctx: &TestContext, user: &User) -> Auth {
        let pair = ctx.tokens_for(user);
        let claims = ctx.state.tokens.read_token(&pair.access_token).unwrap();
        Auth(AuthenticationContext::from_claims(claims, pair.access_token))
    }

    #[tokio::test]
    async fn create_user_mails_activation_code() {
        let ctx = TestContext::new();
        let (status, Json(view)) = create_user(
            State(ctx.state.clone()),
            ApiJson(CreateUserRequest {
                email: "new@example.com".into(),
                passphrase: "pw".into(),
            }),
        )
        .await
        .expect("user is created");

        assert_eq!(status, StatusCode::CREATED);
        assert!(!view.enabled);

        let stored = ctx.db.get_user(&view.id).unwrap();
        let sent = ctx.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "new@example.com");
        assert_eq!(sent[0].params["activation_code"], stored.activation_code.unwrap());
    }

    #[tokio::test]
    async fn duplicate_email_is_bad_request() {
        let ctx = TestContext::new();
        ctx.member("dup@example.com");
        let err = create_user(
            State(ctx.state.clone()),
            ApiJson(CreateUserRequest {
                email: "dup@example.com".into(),
                passphrase: "pw".into(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn activation_enables_with_matching_code() {
        let ctx = TestContext::new();
        let hash = hash_passphrase("pw").unwrap();
        let user = ctx.db.create_user("act@example.com", &hash).unwrap();
        let code = user.activation_code.clone().unwrap();

        let err = activate_user(
            State(ctx.state.clone()),
            ApiJson(ActivateUserRequest {
                email: "act@example.com".into(),
                activation_code: "WRONG1".into(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);

        let Json(view) = activate_user(
            State(ctx.state.clone()),
            ApiJson(ActivateUserRequest {
                email: "act@example.com".into(),
                activation_code: code,
            }),
        )
        .await
        .expect("activation succeeds");
        assert!(view.enabled);
        assert!(ctx.db.get_user(&user.id).unwrap().activation_code.is_none());
    }

    #[tokio::test]
    async fn email_change_of_disabled_user_sends_new_code() {
        let ctx = TestContext::new();
        let user = ctx.member("old@example.com");

        let Json(view) = update_user(
            Path(user.id.clone()),
            State(ctx.state.clone()),
            ApiJson(UpdateUserRequest {
                email: "new@example.com".into(),
                enabled: false,
                suspended: false,
                two_factor_enabled: false,
            }),
        )
        .await
        .unwrap();
        assert_eq!(view.email, "new@example.com");
        assert!(!view.enabled);

        let sent = ctx.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "new@example.com");
        assert!(ctx.db.get_user_by_email("old@example.com").is_err());
    }

    #[tokio::test]
    async fn enabling_two_factor_provisions_secret() {
        let ctx = TestContext::new();
        let user = ctx.member("tfa@example.com");
        update_user(
            Path(user.id.clone()),
            State(ctx.state.clone()),
            ApiJson(UpdateUserRequest {
                email: user.email.clone(),
                enabled: true,
                suspended: false,
                two_factor_enabled: true,
            }),
        )
        .await
        .unwrap();
        let stored = ctx.db.get_user(&user.id).unwrap();
        assert!(stored.two_factor_enabled);
        assert!(stored.totp_secret.is_some());
        assert!(ctx.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn whoami_reports_group_roles() {
        let ctx = TestContext::new();
        let user = ctx.member("who@example.com");
        let ops = ctx.db.create_group("ops", "").unwrap();
        let deploy = ctx.db.create_role("deploy", "").unwrap();
        ctx.db.add_user_group(&user.id, &ops.id).unwrap();
        ctx.db.add_group_role(&ops.id, &deploy.id).unwrap();

        let Json(me) = whoami(State(ctx.state.clone()), auth_as(&ctx, &user)).await.unwrap();
        assert_eq!(me.user.email, "who@example.com");
        assert_eq!(me.roles.direct_roles.len(), 1);
        assert_eq!(me.roles.groups[0].roles, vec![deploy]);
        let names: Vec<_> = me.effective_roles.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["deploy", "user@sentinel"]);
    }

    #[tokio::test]
    async fn passphrase_change_rules() {
        let ctx = TestContext::new();
        let alice = ctx.member("alice@example.com");
        let bob = ctx.member("bob@example.com");
        let admin = ctx.admin("admin@example.com");

        let change = |old: &str| {
            ApiJson(ChangePassphraseRequest {
                old_passphrase: old.to_string(),
                new_passphrase: "fresh".to_string(),
            })
        };

        // someone else's account
        let err = change_passphrase(
            Path(bob.id.clone()),
            State(ctx.state.clone()),
            auth_as(&ctx, &alice),
            change(PASSPHRASE),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);

        // wrong old passphrase
        let err = change_passphrase(
            Path(alice.id.clone()),
            State(ctx.state.clone()),
            auth_as(&ctx, &alice),
            change("nope"),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_ACCEPTABLE);

        let status = change_passphrase(
            Path(alice.id.clone()),
            State(ctx.state.clone()),
            auth_as(&ctx, &alice),
            change(PASSPHRASE),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
        let stored = ctx.db.get_user(&alice.id).unwrap();
        assert!(verify_passphrase("fresh", &stored.passphrase_hash).unwrap());

        // admins may change any account
        change_passphrase(
            Path(bob.id.clone()),
            State(ctx.state.clone()),
            auth_as(&ctx, &admin),
            change(PASSPHRASE),
        )
        .await
        .expect("admin changes another account");
    }

    #[tokio::test]
    async fn two_factor_enrollment_flow() {
        let ctx = TestContext::new();
        let user = ctx.member("otp@example.com");

        let response = totp_qr(State(ctx.state.clone()), auth_as(&ctx, &user))
            .await
            .unwrap()
            .into_response();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        let png = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&png[..4], b"\x89PNG");

        let stored = ctx.db.get_user(&user.id).unwrap();
        assert!(!stored.two_factor_enabled);
        let secret = stored.totp_secret.unwrap();
        let code = TotpEngine::current_code(&secret, Utc::now(), ctx.state.totp.step_seconds()).unwrap();

        let Json(activated) = activate_2fa(
            State(ctx.state.clone()),
            auth_as(&ctx, &user),
            ApiJson(Activate2faRequest { token: code }),
        )
        .await
        .expect("activation succeeds");
        assert_eq!(activated.recovery_codes.len(), ctx.state.config.totp.recovery_codes);
        assert!(ctx.db.get_user(&user.id).unwrap().two_factor_enabled);

        // each returned code is stored hashed and spendable once
        let first = hash_recovery_code(&activated.recovery_codes[0]);
        ctx.db.consume_recovery_code(&user.id, &first).unwrap();
        assert!(matches!(
            ctx.db.consume_recovery_code(&user.id, &first),
            Err(StoreError::CodeAlreadyUsed)
        ));
    }

    #[tokio::test]
    async fn new_secret_drops_old_recovery_codes() {
        let ctx = TestContext::new();
        let mut user = ctx.member("rotate@example.com");
        user.totp_secret = Some(TotpEngine::generate_secret());
        user.two_factor_enabled = true;
        ctx.db.save_user(&user).unwrap();
        let old = hash_recovery_code("AAAA-BBBB");
        ctx.db.replace_recovery_codes(&user.id, &[old.clone()]).unwrap();

        totp_qr(State(ctx.state.clone()), auth_as(&ctx, &user)).await.unwrap();
        assert!(matches!(
            ctx.db.consume_recovery_code(&user.id, &old),
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn enabling_2fa_without_secret_drops_old_recovery_codes() {
        let ctx = TestContext::new();
        let user = ctx.member("fresh2fa@example.com");
        let old = hash_recovery_code("CCCC-DDDD");
        ctx.db.replace_recovery_codes(&user.id, &[old.clone()]).unwrap();

        update_user(
            Path(user.id.clone()),
            State(ctx.state.clone()),
            ApiJson(UpdateUserRequest {
                email: user.email.clone(),
                enabled: true,
                suspended: false,
                two_factor_enabled: true,
            }),
        )
        .await
        .unwrap();
        let stored = ctx.db.get_user(&user.id).unwrap();
        assert!(stored.totp_secret.is_some());
        assert!(matches!(
            ctx.db.consume_recovery_code(&user.id, &old),
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn activate_2fa_without_secret_is_bad_request() {
        let ctx = TestContext::new();
        let user = ctx.member("nosecret@example.com");
        let err = activate_2fa(
            State(ctx.state.clone()),
            auth_as(&ctx, &user),
            ApiJson(Activate2faRequest { token: "123456".into() }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn role_and_group_relations() {
        let ctx = TestContext::new();
        let user = ctx.user("rel@example.com", None);
        let role = ctx.db.create_role("auditor", "").unwrap();
        let group = ctx.db.create_group("team", "").unwrap();
        let inherited = ctx.db.create_role("viewer", "").unwrap();
        ctx.db.add_group_role(&group.id, &inherited.id).unwrap();

        add_user_role(Path((user.id.clone(), role.id.clone())), State(ctx.state.clone()))
            .await
            .unwrap();
        let err = add_user_role(Path((user.id.clone(), role.id.clone())), State(ctx.state.clone()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        add_user_group(Path((user.id.clone(), group.id.clone())), State(ctx.state.clone()))
            .await
            .unwrap();

        let Json(direct) = list_user_roles(Path(user.id.clone()), State(ctx.state.clone())).await.unwrap();
        assert_eq!(direct.roles, vec![role.clone()]);
        let Json(all) = list_user_all_roles(Path(user.id.clone()), State(ctx.state.clone())).await.unwrap();
        assert_eq!(all.roles, vec![role.clone(), inherited]);
        let Json(groups) = list_user_groups(Path(user.id.clone()), State(ctx.state.clone())).await.unwrap();
        assert_eq!(groups.groups, vec![group.clone()]);

        remove_user_group(Path((user.id.clone(), group.id)), State(ctx.state.clone()))
            .await
            .unwrap();
        remove_user_role(Path((user.id.clone(), role.id.clone())), State(ctx.state.clone()))
            .await
            .unwrap();
        let err = remove_user_role(Path((user.id.clone(), role.id)), State(ctx.state.clone()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listing_and_deleting_users() {
        let ctx = TestContext::new();
        let a = ctx.member("a@example.com");
        ctx.member("b@example.com");

        let Json(page) = list_users(State(ctx.state.clone()), Query(UserPageQuery::default()))
            .await
            .unwrap();
        assert_eq!(page.total_items, 2);
        assert_eq!(page.items[0].email, "a@example.com");

        let status = delete_user(Path(a.id.clone()), State(ctx.state.clone())).await.unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
        let err = get_user(Path(a.id), State(ctx.state.clone())).await.unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }
}
