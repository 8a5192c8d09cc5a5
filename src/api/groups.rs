// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use super::roles::non_empty_name;
use crate::{
    error::{ApiError, ApiJson},
    models::{NamedRecordRequest, PageQuery, PageResponse, RoleList, UserList, UserView},
    state::AppState,
    storage::Group,
};

#[utoipa::path(
    get,
    path = "/api/v1/management/groups",
    params(PageQuery),
    tag = "Groups",
    security(("bearer" = [])),
    responses((status = 200, body = PageResponse<Group>))
)]
pub async fn list_groups(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PageResponse<Group>>, ApiError> {
    Ok(Json(state.store.list_groups(query.into())?.into()))
}

#[utoipa::path(
    post,
    path = "/api/v1/management/group",
    request_body = NamedRecordRequest,
    tag = "Groups",
    security(("bearer" = [])),
    responses((status = 201, body = Group), (status = 400, description = "Name taken or empty"))
)]
pub async fn create_group(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<NamedRecordRequest>,
) -> Result<(StatusCode, Json<Group>), ApiError> {
    let name = non_empty_name(&request.name)?;
    let group = state.store.create_group(name, &request.description)?;
    Ok((StatusCode::CREATED, Json(group)))
}

#[utoipa::path(
    get,
    path = "/api/v1/management/group/{group_id}",
    params(("group_id" = String, Path, description = "Group identifier")),
    tag = "Groups",
    security(("bearer" = [])),
    responses((status = 200, body = Group), (status = 404))
)]
pub async fn get_group(Path(group_id): Path<String>, State(state): State<AppState>) -> Result<Json<Group>, ApiError> {
    Ok(Json(state.store.get_group(&group_id)?))
}

#[utoipa::path(
    put,
    path = "/api/v1/management/group/{group_id}",
    params(("group_id" = String, Path, description = "Group identifier")),
    request_body = NamedRecordRequest,
    tag = "Groups",
    security(("bearer" = [])),
    responses((status = 200, body = Group), (status = 400), (status = 404))
)]
pub async fn update_group(
    Path(group_id): Path<String>,
    State(state): State<AppState>,
    ApiJson(request): ApiJson<NamedRecordRequest>,
) -> Result<Json<Group>, ApiError> {
    let mut group = state.store.get_group(&group_id)?;
    group.name = non_empty_name(&request.name)?.to_string();
    group.description = request.description;
    state.store.update_group(&group)?;
    Ok(Json(group))
}

/// Delete a group. Members lose the roles it granted on their next sign-in.
#[utoipa::path(
    delete,
    path = "/api/v1/management/group/{group_id}",
    params(("group_id" = String, Path, description = "Group identifier")),
    tag = "Groups",
    security(("bearer" = [])),
    responses((status = 204), (status = 404))
)]
pub async fn delete_group(Path(group_id): Path<String>, State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.store.delete_group(&group_id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/v1/management/group/{group_id}/roles",
    params(("group_id" = String, Path, description = "Group identifier")),
    tag = "Groups",
    security(("bearer" = [])),
    responses((status = 200, body = RoleList), (status = 404))
)]
pub async fn group_roles(Path(group_id): Path<String>, State(state): State<AppState>) -> Result<Json<RoleList>, ApiError> {
    state.store.get_group(&group_id)?;
    Ok(Json(RoleList {
        roles: state.store.roles_of_group(&group_id)?,
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/management/group/{group_id}/users",
    params(("group_id" = String, Path, description = "Group identifier")),
    tag = "Groups",
    security(("bearer" = [])),
    responses((status = 200, body = UserList), (status = 404))
)]
pub async fn group_users(Path(group_id): Path<String>, State(state): State<AppState>) -> Result<Json<UserList>, ApiError> {
    state.store.get_group(&group_id)?;
    let users = state.store.users_of_group(&group_id)?;
    Ok(Json(UserList {
        users: users.into_iter().map(UserView::from).collect(),
    }))
}

#[utoipa::path(
    put,
    path = "/api/v1/management/group/{group_id}/role/{role_id}",
    params(
        ("group_id" = String, Path, description = "Group identifier"),
        ("role_id" = String, Path, description = "Role identifier")
    ),
    tag = "Groups",
    security(("bearer" = [])),
    responses((status = 204), (status = 400, description = "Already granted"), (status = 404))
)]
pub async fn add_group_role(
    Path((group_id, role_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    state.store.add_group_role(&group_id, &role_id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/api/v1/management/group/{group_id}/role/{role_id}",
    params(
        ("group_id" = String, Path, description = "Group identifier"),
        ("role_id" = String, Path, description = "Role identifier")
    ),
    tag = "Groups",
    security(("bearer" = [])),
    responses((status = 204), (status = 404))
)]
pub async fn remove_group_role(
    Path((group_id, role_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    state.store.remove_group_role(&group_id, &role_id)?;
    Ok(StatusCode::NO_CONTENT)
}
