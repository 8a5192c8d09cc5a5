// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Effective role resolution.
//!
//! A principal's effective roles are its direct grants plus every role
//! granted to a group it belongs to. Groups do not nest. Nothing is cached:
//! each call reads the relation tables again, so a new group grant shows up
//! on the next resolution without touching the principal.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use utoipa::ToSchema;

use crate::storage::{Group, RelationStore, Role, StoreResult};

/// A group membership and the roles it carries.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct GroupGrant {
    pub group: Group,
    pub roles: Vec<Role>,
}

/// Composed view for self-introspection.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct RoleSummary {
    pub direct_roles: Vec<Role>,
    pub groups: Vec<GroupGrant>,
}

impl RoleSummary {
    /// Union of direct and group roles, deduplicated by id, sorted by name.
    pub fn effective_roles(&self) -> Vec<Role> {
        union_by_id(
            self.direct_roles
                .iter()
                .chain(self.groups.iter().flat_map(|g| g.roles.iter()))
                .cloned(),
        )
    }
}

/// Resolves effective roles and groups from the relation store.
#[derive(Clone)]
pub struct RbacResolver {
    relations: Arc<dyn RelationStore>,
}

impl RbacResolver {
    pub fn new(relations: Arc<dyn RelationStore>) -> Self {
        Self { relations }
    }

    /// Direct roles plus roles inherited through groups, sorted by name.
    pub fn effective_roles(&self, user_id: &str) -> StoreResult<Vec<Role>> {
        let mut roles = self.relations.roles_of_user(user_id)?;
        for group in self.relations.groups_of_user(user_id)? {
            roles.extend(self.relations.roles_of_group(&group.id)?);
        }
        Ok(union_by_id(roles))
    }

    /// Direct group memberships, sorted by name.
    pub fn effective_groups(&self, user_id: &str) -> StoreResult<Vec<Group>> {
        let mut groups = self.relations.groups_of_user(user_id)?;
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(groups)
    }

    /// Direct roles and, per group, the roles that group grants.
    pub fn summarize(&self, user_id: &str) -> StoreResult<RoleSummary> {
        let direct_roles = union_by_id(self.relations.roles_of_user(user_id)?);
        let groups = self
            .effective_groups(user_id)?
            .into_iter()
            .map(|group| {
                let roles = union_by_id(self.relations.roles_of_group(&group.id)?);
                Ok(GroupGrant { group, roles })
            })
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(RoleSummary { direct_roles, groups })
    }

    /// Role names a token issued to this principal asserts as audience.
    pub fn role_names_for(&self, user_id: &str) -> StoreResult<Vec<String>> {
        Ok(self.effective_roles(user_id)?.into_iter().map(|r| r.name).collect())
    }
}

fn union_by_id(roles: impl IntoIterator<Item = Role>) -> Vec<Role> {
    let by_id: BTreeMap<String, Role> = roles.into_iter().map(|r| (r.id.clone(), r)).collect();
    let mut out: Vec<Role> = by_id.into_values().collect();
    out.sort_by(|a, b| a.name.cmp(&b.name));
    out
}
