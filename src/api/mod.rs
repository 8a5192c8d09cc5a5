// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::HeaderName,
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::{middleware::access_control, AuthenticationContext, TokenType},
    error::ApiError,
    models::{
        Activate2faRequest, Activate2faResponse, ActivateUserRequest, Authenticate2faRequest, AuthenticateRequest,
        ChangePassphraseRequest, CreateUserRequest, GroupList, NamedRecordRequest, PageResponse, Recover2faRequest,
        RefreshResponse, RoleList, TokenResponse, TwoFactorRequired, UpdateUserRequest, UserList, UserView,
        WhoAmIResponse,
    },
    rbac::{GroupGrant, RoleSummary},
    state::AppState,
    storage::{Group, Role, SortDirection, UserOrder},
};

pub mod auth;
pub mod groups;
pub mod health;
pub mod roles;
pub mod users;

const REQUEST_ID_HEADER: &str = "x-request-id";

pub fn router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/authenticate", post(auth::authenticate))
        .route("/authenticate2fa", post(auth::authenticate_2fa))
        .route("/recover2fa", post(auth::recover_2fa))
        .route("/refresh", post(auth::refresh));

    let management_routes = Router::new()
        // users
        .route("/users", get(users::list_users))
        .route("/user", post(users::create_user))
        .route("/user/whoami", get(users::whoami))
        .route("/user/activate", post(users::activate_user))
        .route("/user/2FAQR", get(users::totp_qr))
        .route("/user/activate2FA", post(users::activate_2fa))
        .route(
            "/user/{user_id}",
            get(users::get_user).put(users::update_user).delete(users::delete_user),
        )
        .route("/user/{user_id}/passwd", post(users::change_passphrase))
        .route("/user/{user_id}/roles", get(users::list_user_roles))
        .route("/user/{user_id}/all-roles", get(users::list_user_all_roles))
        .route("/user/{user_id}/groups", get(users::list_user_groups))
        .route(
            "/user/{user_id}/role/{role_id}",
            put(users::add_user_role).delete(users::remove_user_role),
        )
        .route(
            "/user/{user_id}/group/{group_id}",
            put(users::add_user_group).delete(users::remove_user_group),
        )
        // roles
        .route("/roles", get(roles::list_roles))
        .route("/role", post(roles::create_role))
        .route(
            "/role/{role_id}",
            get(roles::get_role).put(roles::update_role).delete(roles::delete_role),
        )
        .route("/role/{role_id}/users", get(roles::role_users))
        .route("/role/{role_id}/groups", get(roles::role_groups))
        // groups
        .route("/groups", get(groups::list_groups))
        .route("/group", post(groups::create_group))
        .route(
            "/group/{group_id}",
            get(groups::get_group).put(groups::update_group).delete(groups::delete_group),
        )
        .route("/group/{group_id}/roles", get(groups::group_roles))
        .route("/group/{group_id}/users", get(groups::group_users))
        .route(
            "/group/{group_id}/role/{role_id}",
            put(groups::add_group_role).delete(groups::remove_group_role),
        );

    let v1_routes = Router::new()
        .nest("/auth", auth_routes)
        .nest("/management", management_routes);

    let x_request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    Router::new()
        .route("/health", get(health::health))
        .nest("/api/v1", v1_routes)
        .with_state(state.clone())
        .merge(SwaggerUi::new("/docs").url("/docs/openapi.json", ApiDoc::openapi()))
        .fallback(not_found)
        // every request, routed or not, goes through the rule table first
        .layer(middleware::from_fn_with_state(state, access_control))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");

                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

async fn not_found() -> ApiError {
    ApiError::not_found("no such endpoint")
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).bearer_format("JWT").build()),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        auth::authenticate,
        auth::authenticate_2fa,
        auth::recover_2fa,
        auth::refresh,
        users::list_users,
        users::create_user,
        users::get_user,
        users::update_user,
        users::delete_user,
        users::activate_user,
        users::whoami,
        users::change_passphrase,
        users::totp_qr,
        users::activate_2fa,
        users::list_user_roles,
        users::list_user_all_roles,
        users::list_user_groups,
        users::add_user_role,
        users::remove_user_role,
        users::add_user_group,
        users::remove_user_group,
        roles::list_roles,
        roles::create_role,
        roles::get_role,
        roles::update_role,
        roles::delete_role,
        roles::role_users,
        roles::role_groups,
        groups::list_groups,
        groups::create_group,
        groups::get_group,
        groups::update_group,
        groups::delete_group,
        groups::group_roles,
        groups::group_users,
        groups::add_group_role,
        groups::remove_group_role
    ),
    components(
        schemas(
            health::HealthResponse,
            health::HealthChecks,
            AuthenticateRequest,
            Authenticate2faRequest,
            Recover2faRequest,
            TokenResponse,
            TwoFactorRequired,
            RefreshResponse,
            UserView,
            CreateUserRequest,
            UpdateUserRequest,
            ActivateUserRequest,
            ChangePassphraseRequest,
            Activate2faRequest,
            Activate2faResponse,
            WhoAmIResponse,
            NamedRecordRequest,
            RoleList,
            GroupList,
            UserList,
            PageResponse<UserView>,
            PageResponse<Role>,
            PageResponse<Group>,
            Role,
            Group,
            GroupGrant,
            RoleSummary,
            SortDirection,
            UserOrder,
            AuthenticationContext,
            TokenType
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Liveness and dependency checks"),
        (name = "Auth", description = "Sign-in and token refresh"),
        (name = "Users", description = "User management and self service"),
        (name = "Roles", description = "Role management"),
        (name = "Groups", description = "Group management and group role grants")
    )
)]
struct ApiDoc;
