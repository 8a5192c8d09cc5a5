// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::{ApiError, ApiJson},
    models::{GroupList, NamedRecordRequest, PageQuery, PageResponse, UserList, UserView},
    state::AppState,
    storage::Role,
};

#[utoipa::path(
    get,
    path = "/api/v1/management/roles",
    params(PageQuery),
    tag = "Roles",
    security(("bearer" = [])),
    responses((status = 200, body = PageResponse<Role>))
)]
pub async fn list_roles(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PageResponse<Role>>, ApiError> {
    Ok(Json(state.store.list_roles(query.into())?.into()))
}

#[utoipa::path(
    post,
    path = "/api/v1/management/role",
    request_body = NamedRecordRequest,
    tag = "Roles",
    security(("bearer" = [])),
    responses((status = 201, body = Role), (status = 400, description = "Name taken or empty"))
)]
pub async fn create_role(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<NamedRecordRequest>,
) -> Result<(StatusCode, Json<Role>), ApiError> {
    let name = non_empty_name(&request.name)?;
    let role = state.store.create_role(name, &request.description)?;
    Ok((StatusCode::CREATED, Json(role)))
}

#[utoipa::path(
    get,
    path = "/api/v1/management/role/{role_id}",
    params(("role_id" = String, Path, description = "Role identifier")),
    tag = "Roles",
    security(("bearer" = [])),
    responses((status = 200, body = Role), (status = 404))
)]
pub async fn get_role(Path(role_id): Path<String>, State(state): State<AppState>) -> Result<Json<Role>, ApiError> {
    Ok(Json(state.store.get_role(&role_id)?))
}

/// Rename a role. Tokens already issued keep asserting the old name until
/// they expire.
#[utoipa::path(
    put,
    path = "/api/v1/management/role/{role_id}",
    params(("role_id" = String, Path, description = "Role identifier")),
    request_body = NamedRecordRequest,
    tag = "Roles",
    security(("bearer" = [])),
    responses(
        (status = 200, body = Role),
        (status = 400, description = "Empty name, name taken or configured role renamed"),
        (status = 404)
    )
)]
pub async fn update_role(
    Path(role_id): Path<String>,
    State(state): State<AppState>,
    ApiJson(request): ApiJson<NamedRecordRequest>,
) -> Result<Json<Role>, ApiError> {
    let mut role = state.store.get_role(&role_id)?;
    let name = non_empty_name(&request.name)?;
    if name != role.name && is_configured(&state, &role) {
        return Err(ApiError::bad_request("configured roles cannot be renamed"));
    }
    role.name = name.to_string();
    role.description = request.description;
    state.store.update_role(&role)?;
    Ok(Json(role))
}

#[utoipa::path(
    delete,
    path = "/api/v1/management/role/{role_id}",
    params(("role_id" = String, Path, description = "Role identifier")),
    tag = "Roles",
    security(("bearer" = [])),
    responses((status = 204), (status = 404))
)]
pub async fn delete_role(Path(role_id): Path<String>, State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    let role = state.store.get_role(&role_id)?;
    if is_configured(&state, &role) {
        return Err(ApiError::bad_request("configured roles cannot be deleted"));
    }
    state.store.delete_role(&role_id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Users holding the role directly.
#[utoipa::path(
    get,
    path = "/api/v1/management/role/{role_id}/users",
    params(("role_id" = String, Path, description = "Role identifier")),
    tag = "Roles",
    security(("bearer" = [])),
    responses((status = 200, body = UserList), (status = 404))
)]
pub async fn role_users(Path(role_id): Path<String>, State(state): State<AppState>) -> Result<Json<UserList>, ApiError> {
    state.store.get_role(&role_id)?;
    let users = state.store.users_of_role(&role_id)?;
    Ok(Json(UserList {
        users: users.into_iter().map(UserView::from).collect(),
    }))
}

/// Groups granting the role.
#[utoipa::path(
    get,
    path = "/api/v1/management/role/{role_id}/groups",
    params(("role_id" = String, Path, description = "Role identifier")),
    tag = "Roles",
    security(("bearer" = [])),
    responses((status = 200, body = GroupList), (status = 404))
)]
pub async fn role_groups(
    Path(role_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<GroupList>, ApiError> {
    state.store.get_role(&role_id)?;
    Ok(Json(GroupList {
        groups: state.store.groups_of_role(&role_id)?,
    }))
}

/// The admin and user roles are named in the access rules.
fn is_configured(state: &AppState, role: &Role) -> bool {
    role.name == state.config.admin_role || role.name == state.config.user_role
}

pub(crate) fn non_empty_name(name: &str) -> Result<&str, ApiError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("name must not be empty"));
    }
    Ok(name)
}
