// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! This module defines the request and response data structures used by
//! the REST API. All types derive `Serialize` or `Deserialize` plus
//! `ToSchema` for automatic JSON handling and OpenAPI documentation.
//!
//! ## Model Categories
//!
//! - **Authentication**: Sign-in requests and token pairs
//! - **Users**: Principal views, updates and 2FA enrollment
//! - **Roles / Groups**: Named records and their listings
//! - **Paging**: Query parameters and paged responses

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::TokenPair;
use crate::rbac::RoleSummary;
use crate::storage::{Group, Page, PageRequest, Role, SortDirection, User, UserOrder};

// =============================================================================
// Authentication Models
// =============================================================================

/// E-mail and passphrase sign-in.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AuthenticateRequest {
    pub email: String,
    pub passphrase: String,
}

/// Sign-in for accounts with 2FA enabled.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct Authenticate2faRequest {
    pub email: String,
    pub passphrase: String,
    /// Current six digit TOTP code
    #[serde(rename = "2FA_token")]
    pub token: String,
}

/// Sign-in with a recovery code instead of a TOTP code.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct Recover2faRequest {
    pub email: String,
    pub passphrase: String,
    /// One unused recovery code; it is spent by this request
    #[serde(rename = "2FA_recovery_token")]
    pub recovery_code: String,
}

/// Issued token pair.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

impl From<TokenPair> for TokenResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            access_expires_at: pair.access_expires_at,
            refresh_expires_at: pair.refresh_expires_at,
        }
    }
}

/// Returned with 202 when the account needs a second factor.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TwoFactorRequired {
    #[serde(rename = "2fa_required")]
    pub required: bool,
}

/// Fresh access token from a refresh token.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RefreshResponse {
    pub access_token: String,
}

// =============================================================================
// User Models
// =============================================================================

/// Public view of a principal. Never carries secrets.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct UserView {
    pub id: String,
    pub email: String,
    pub enabled: bool,
    pub suspended: bool,
    pub two_factor_enabled: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            enabled: user.enabled,
            suspended: user.suspended,
            two_factor_enabled: user.two_factor_enabled,
            last_seen: user.last_seen,
            last_login: user.last_login,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateUserRequest {
    pub email: String,
    pub passphrase: String,
}

/// Full replacement of the mutable user flags.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateUserRequest {
    pub email: String,
    pub enabled: bool,
    pub suspended: bool,
    pub two_factor_enabled: bool,
}

/// E-mail confirmation with the mailed activation code.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ActivateUserRequest {
    pub email: String,
    pub activation_code: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ChangePassphraseRequest {
    pub old_passphrase: String,
    pub new_passphrase: String,
}

/// Confirms 2FA enrollment with a code from the freshly scanned secret.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct Activate2faRequest {
    #[serde(rename = "2FA_token")]
    pub token: String,
}

/// Recovery codes, shown exactly once.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Activate2faResponse {
    pub recovery_codes: Vec<String>,
}

/// Caller's own record with its direct and inherited roles.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WhoAmIResponse {
    pub user: UserView,
    pub roles: RoleSummary,
    /// Direct and group roles combined
    pub effective_roles: Vec<Role>,
}

// =============================================================================
// Role and Group Models
// =============================================================================

/// Create or rename a role or group.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NamedRecordRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

// =============================================================================
// Paging
// =============================================================================

/// Paging parameters for role and group listings.
#[derive(Debug, Clone, Copy, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    /// 1-based page number
    pub page: Option<usize>,
    /// Items per page, at most 100
    pub size: Option<usize>,
    /// `asc` or `desc`
    pub direction: Option<SortDirection>,
}

impl From<PageQuery> for PageRequest {
    fn from(query: PageQuery) -> Self {
        let defaults = PageRequest::<()>::default();
        PageRequest {
            page: query.page.unwrap_or(defaults.page),
            size: query.size.unwrap_or(defaults.size),
            order_by: (),
            direction: query.direction.unwrap_or_default(),
        }
        .normalized()
    }
}

/// Paging parameters for user listings.
#[derive(Debug, Clone, Copy, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UserPageQuery {
    pub page: Option<usize>,
    pub size: Option<usize>,
    /// `email` or `created_at`
    pub order_by: Option<UserOrder>,
    pub direction: Option<SortDirection>,
}

impl From<UserPageQuery> for PageRequest<UserOrder> {
    fn from(query: UserPageQuery) -> Self {
        let defaults = PageRequest::<UserOrder>::default();
        PageRequest {
            page: query.page.unwrap_or(defaults.page),
            size: query.size.unwrap_or(defaults.size),
            order_by: query.order_by.unwrap_or_default(),
            direction: query.direction.unwrap_or_default(),
        }
        .normalized()
    }
}

/// One page of a listing.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PageResponse<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub size: usize,
    pub total_items: usize,
    pub total_pages: usize,
}

impl<T> From<Page<T>> for PageResponse<T> {
    fn from(page: Page<T>) -> Self {
        Self {
            items: page.items,
            page: page.page,
            size: page.size,
            total_items: page.total_items,
            total_pages: page.total_pages,
        }
    }
}

/// Unpaged list wrapper for relation listings.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoleList {
    pub roles: Vec<Role>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GroupList {
    pub groups: Vec<Group>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserList {
    pub users: Vec<UserView>,
}
