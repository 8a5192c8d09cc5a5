// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Identity records and the repository traits the service depends on.
//!
//! Every operation is synchronous and fallible. Components receive these
//! traits as `Arc<dyn ...>` so tests can swap the backing store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{StoreError, StoreResult};

// =============================================================================
// Records
// =============================================================================

/// Principal record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: String,
    /// Canonical identity, case-sensitive
    pub email: String,
    /// Argon2 PHC string
    pub passphrase_hash: String,
    pub enabled: bool,
    pub suspended: bool,
    /// Base32 TOTP secret, set when 2FA enrollment starts
    pub totp_secret: Option<String>,
    pub two_factor_enabled: bool,
    /// Pending e-mail verification code
    pub activation_code: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Only enabled, non-suspended principals may receive tokens.
    pub fn may_sign_in(&self) -> bool {
        self.enabled && !self.suspended
    }
}

/// Role record.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Role {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Group record.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Group {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

// =============================================================================
// Paging
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// User listing order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UserOrder {
    #[default]
    Email,
    CreatedAt,
}

/// Requested page, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest<O = ()> {
    pub page: usize,
    pub size: usize,
    pub order_by: O,
    pub direction: SortDirection,
}

impl<O: Default> Default for PageRequest<O> {
    fn default() -> Self {
        Self {
            page: 1,
            size: 20,
            order_by: O::default(),
            direction: SortDirection::Asc,
        }
    }
}

impl<O> PageRequest<O> {
    pub const MAX_SIZE: usize = 100;

    /// Clamp page and size into their valid ranges.
    pub fn normalized(mut self) -> Self {
        self.page = self.page.max(1);
        self.size = self.size.clamp(1, Self::MAX_SIZE);
        self
    }

    /// Cut one page out of an already ordered list.
    pub fn slice<T>(&self, mut ordered: Vec<T>) -> Page<T> {
        if self.direction == SortDirection::Desc {
            ordered.reverse();
        }
        let total_items = ordered.len();
        let total_pages = total_items.div_ceil(self.size.max(1));
        let items = ordered
            .into_iter()
            .skip(self.page.saturating_sub(1).saturating_mul(self.size))
            .take(self.size)
            .collect();
        Page {
            items,
            page: self.page,
            size: self.size,
            total_items,
            total_pages,
        }
    }
}

/// One page of results.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub size: usize,
    pub total_items: usize,
    pub total_pages: usize,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            size: self.size,
            total_items: self.total_items,
            total_pages: self.total_pages,
        }
    }
}

// =============================================================================
// Traits
// =============================================================================

pub trait UserStore: Send + Sync {
    /// Create a disabled user with a fresh activation code.
    fn create_user(&self, email: &str, passphrase_hash: &str) -> StoreResult<User>;
    fn get_user(&self, id: &str) -> StoreResult<User>;
    fn get_user_by_email(&self, email: &str) -> StoreResult<User>;
    /// Persist changes to an existing user, keeping e-mail unique.
    fn save_user(&self, user: &User) -> StoreResult<()>;
    /// Delete a user with its relations and recovery codes.
    fn delete_user(&self, id: &str) -> StoreResult<()>;
    fn list_users(&self, page: PageRequest<UserOrder>) -> StoreResult<Page<User>>;
}

pub trait RoleStore: Send + Sync {
    fn create_role(&self, name: &str, description: &str) -> StoreResult<Role>;
    fn get_role(&self, id: &str) -> StoreResult<Role>;
    fn get_role_by_name(&self, name: &str) -> StoreResult<Role>;
    fn update_role(&self, role: &Role) -> StoreResult<()>;
    /// Delete a role and every relation naming it.
    fn delete_role(&self, id: &str) -> StoreResult<()>;
    /// Ordered by name.
    fn list_roles(&self, page: PageRequest) -> StoreResult<Page<Role>>;
}

pub trait GroupStore: Send + Sync {
    fn create_group(&self, name: &str, description: &str) -> StoreResult<Group>;
    fn get_group(&self, id: &str) -> StoreResult<Group>;
    fn update_group(&self, group: &Group) -> StoreResult<()>;
    /// Delete a group and every relation naming it.
    fn delete_group(&self, id: &str) -> StoreResult<()>;
    /// Ordered by name.
    fn list_groups(&self, page: PageRequest) -> StoreResult<Page<Group>>;
}

/// The three many-to-many relations between users, groups and roles.
///
/// Adding an existing pair fails with `AlreadyExists`, removing a missing
/// one with `NotFound`. Both ends must exist.
pub trait RelationStore: Send + Sync {
    fn add_user_role(&self, user_id: &str, role_id: &str) -> StoreResult<()>;
    fn remove_user_role(&self, user_id: &str, role_id: &str) -> StoreResult<()>;
    fn add_user_group(&self, user_id: &str, group_id: &str) -> StoreResult<()>;
    fn remove_user_group(&self, user_id: &str, group_id: &str) -> StoreResult<()>;
    fn add_group_role(&self, group_id: &str, role_id: &str) -> StoreResult<()>;
    fn remove_group_role(&self, group_id: &str, role_id: &str) -> StoreResult<()>;

    /// Direct grants only.
    fn roles_of_user(&self, user_id: &str) -> StoreResult<Vec<Role>>;
    fn groups_of_user(&self, user_id: &str) -> StoreResult<Vec<Group>>;
    fn roles_of_group(&self, group_id: &str) -> StoreResult<Vec<Role>>;
    fn users_of_role(&self, role_id: &str) -> StoreResult<Vec<User>>;
    fn users_of_group(&self, group_id: &str) -> StoreResult<Vec<User>>;
    fn groups_of_role(&self, role_id: &str) -> StoreResult<Vec<Group>>;
}

/// Hashed single-use recovery codes.
pub trait RecoveryCodeStore: Send + Sync {
    /// Drop the user's current batch and store `hashes` in one transaction.
    fn replace_recovery_codes(&self, user_id: &str, hashes: &[String]) -> StoreResult<()>;

    /// Mark a code spent. Check and mark happen in the same write
    /// transaction, so two concurrent calls cannot both succeed.
    fn consume_recovery_code(&self, user_id: &str, hash: &str) -> StoreResult<()>;
}

/// Every store the service needs, as one object.
pub trait IdentityStore: UserStore + RoleStore + GroupStore + RelationStore + RecoveryCodeStore {}

impl<T> IdentityStore for T where T: UserStore + RoleStore + GroupStore + RelationStore + RecoveryCodeStore {}

/// Map a missing record to a `NotFound` naming it.
pub(crate) fn found<T>(value: Option<T>, what: impl FnOnce() -> String) -> StoreResult<T> {
    value.ok_or_else(|| StoreError::NotFound(what()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_slicing() {
        let request = PageRequest::<()> {
            page: 2,
            size: 3,
            ..Default::default()
        };
        let page = request.slice((1..=8).collect::<Vec<_>>());
        assert_eq!(page.items, vec![4, 5, 6]);
        assert_eq!(page.total_items, 8);
        assert_eq!(page.total_pages, 3);
    }

    #[test]
    fn descending_page() {
        let request = PageRequest::<()> {
            direction: SortDirection::Desc,
            size: 2,
            ..Default::default()
        };
        assert_eq!(request.slice(vec![1, 2, 3]).items, vec![3, 2]);
    }

    #[test]
    fn page_past_the_end_is_empty() {
        let request = PageRequest::<()> {
            page: 9,
            size: 5,
            ..Default::default()
        };
        let page = request.slice(vec![1, 2, 3]);
        assert!(page.items.is_empty());
        assert_eq!(page.total_pages, 1);
    }

    #[test]
    fn huge_page_number_is_empty_not_overflow() {
        let request = PageRequest::<()> {
            page: usize::MAX,
            size: PageRequest::<()>::MAX_SIZE,
            ..Default::default()
        }
        .normalized();
        let page = request.slice(vec![1, 2, 3]);
        assert!(page.items.is_empty());
        assert_eq!(page.page, usize::MAX);
        assert_eq!(page.total_items, 3);
    }

    #[test]
    fn normalization_clamps() {
        let request = PageRequest::<()> {
            page: 0,
            size: 10_000,
            ..Default::default()
        }
        .normalized();
        assert_eq!(request.page, 1);
        assert_eq!(request.size, PageRequest::<()>::MAX_SIZE);
    }
}
