// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded identity database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `users`: user id → serialized User
//! - `user_emails`: email → user id
//! - `roles` / `role_names`: role id → serialized Role, name → role id
//! - `groups` / `group_names`: group id → serialized Group, name → group id
//! - `user_roles`, `user_groups`, `group_roles`: (left id, right id) → granted-at
//! - `recovery_codes`: (user id, code hash) → spent-at, `0` while unused

use std::path::Path;

use chrono::Utc;
use rand::Rng;
use redb::{Database, ReadableDatabase, ReadableTable, Table, TableDefinition};
use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

use super::repository::{
    found, Group, GroupStore, Page, PageRequest, RecoveryCodeStore, RelationStore, Role, RoleStore, User,
    UserOrder, UserStore,
};
use super::{StoreError, StoreResult};

// =============================================================================
// Table Definitions
// =============================================================================

type RecordTable = TableDefinition<'static, &'static str, &'static [u8]>;
type IndexTable = TableDefinition<'static, &'static str, &'static str>;
type PairTable = TableDefinition<'static, (&'static str, &'static str), i64>;

const USERS: RecordTable = TableDefinition::new("users");
const USER_EMAILS: IndexTable = TableDefinition::new("user_emails");
const ROLES: RecordTable = TableDefinition::new("roles");
const ROLE_NAMES: IndexTable = TableDefinition::new("role_names");
const GROUPS: RecordTable = TableDefinition::new("groups");
const GROUP_NAMES: IndexTable = TableDefinition::new("group_names");

const USER_ROLES: PairTable = TableDefinition::new("user_roles");
const USER_GROUPS: PairTable = TableDefinition::new("user_groups");
const GROUP_ROLES: PairTable = TableDefinition::new("group_roles");

const RECOVERY_CODES: PairTable = TableDefinition::new("recovery_codes");

/// Activation codes are six characters of this alphabet.
const ACTIVATION_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
const ACTIVATION_LEN: usize = 6;

/// Which end of a pair table an id sits on.
#[derive(Clone, Copy)]
enum Side {
    Left,
    Right,
}

/// Roles and groups share the same shape: an id and a unique name.
trait Named: Serialize + DeserializeOwned {
    const KIND: &'static str;
    fn id(&self) -> &str;
    fn name(&self) -> &str;
}

impl Named for Role {
    const KIND: &'static str = "role";
    fn id(&self) -> &str {
        &self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for Group {
    const KIND: &'static str = "group";
    fn id(&self) -> &str {
        &self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
}

// =============================================================================
// IdentityDatabase
// =============================================================================

/// Embedded ACID identity database.
pub struct IdentityDatabase {
    db: Database,
}

impl IdentityDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            for def in [USERS, ROLES, GROUPS] {
                let _ = write_txn.open_table(def)?;
            }
            for def in [USER_EMAILS, ROLE_NAMES, GROUP_NAMES] {
                let _ = write_txn.open_table(def)?;
            }
            for def in [USER_ROLES, USER_GROUPS, GROUP_ROLES, RECOVERY_CODES] {
                let _ = write_txn.open_table(def)?;
            }
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    // =========================================================================
    // Named records (roles, groups)
    // =========================================================================

    fn create_named<T: Named>(&self, records: RecordTable, names: IndexTable, record: T) -> StoreResult<T> {
        let json = serde_json::to_vec(&record)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut name_table = write_txn.open_table(names)?;
            if name_table.get(record.name())?.is_some() {
                return Err(StoreError::AlreadyExists(format!("{} {}", T::KIND, record.name())));
            }
            name_table.insert(record.name(), record.id())?;

            let mut table = write_txn.open_table(records)?;
            table.insert(record.id(), json.as_slice())?;
        }
        write_txn.commit()?;
        tracing::info!(kind = T::KIND, id = %record.id(), name = %record.name(), "Created");
        Ok(record)
    }

    fn get_named<T: Named>(&self, records: RecordTable, id: &str) -> StoreResult<T> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(records)?;
        found(read_json(&table, id)?, || format!("{} {id}", T::KIND))
    }

    fn update_named<T: Named>(&self, records: RecordTable, names: IndexTable, record: &T) -> StoreResult<()> {
        let json = serde_json::to_vec(record)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(records)?;
            let existing: T = found(read_json(&table, record.id())?, || format!("{} {}", T::KIND, record.id()))?;

            if existing.name() != record.name() {
                let mut name_table = write_txn.open_table(names)?;
                if name_table.get(record.name())?.is_some() {
                    return Err(StoreError::AlreadyExists(format!("{} {}", T::KIND, record.name())));
                }
                name_table.remove(existing.name())?;
                name_table.insert(record.name(), record.id())?;
            }
            table.insert(record.id(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Delete a record, its name index entry and every pair naming it.
    fn delete_named<T: Named>(
        &self,
        records: RecordTable,
        names: IndexTable,
        id: &str,
        cascade: &[(PairTable, Side)],
    ) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(records)?;
            let existing: T = found(read_json(&table, id)?, || format!("{} {id}", T::KIND))?;
            table.remove(id)?;

            let mut name_table = write_txn.open_table(names)?;
            name_table.remove(existing.name())?;

            for (def, side) in cascade {
                let mut pairs = write_txn.open_table(*def)?;
                remove_pairs_with(&mut pairs, *side, id)?;
            }
        }
        write_txn.commit()?;
        tracing::info!(kind = T::KIND, id, "Deleted");
        Ok(())
    }

    fn list_named<T: Named>(&self, records: RecordTable, page: PageRequest) -> StoreResult<Page<T>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(records)?;
        let mut all: Vec<T> = scan_json(&table)?;
        all.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(page.normalized().slice(all))
    }

    // =========================================================================
    // Pairs
    // =========================================================================

    /// Insert a pair after checking both ends exist.
    fn add_pair(
        &self,
        pairs: PairTable,
        left: (RecordTable, &str, &str),
        right: (RecordTable, &str, &str),
    ) -> StoreResult<()> {
        let (left_def, left_kind, left_id) = left;
        let (right_def, right_kind, right_id) = right;

        let write_txn = self.db.begin_write()?;
        {
            let left_table = write_txn.open_table(left_def)?;
            if left_table.get(left_id)?.is_none() {
                return Err(StoreError::NotFound(format!("{left_kind} {left_id}")));
            }
            let right_table = write_txn.open_table(right_def)?;
            if right_table.get(right_id)?.is_none() {
                return Err(StoreError::NotFound(format!("{right_kind} {right_id}")));
            }

            let mut table = write_txn.open_table(pairs)?;
            if table.get((left_id, right_id))?.is_some() {
                return Err(StoreError::AlreadyExists(format!(
                    "{left_kind} {left_id} -> {right_kind} {right_id}"
                )));
            }
            table.insert((left_id, right_id), Utc::now().timestamp())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn remove_pair(&self, pairs: PairTable, left_id: &str, right_id: &str) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(pairs)?;
            if table.remove((left_id, right_id))?.is_none() {
                return Err(StoreError::NotFound(format!("relation {left_id} -> {right_id}")));
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Resolve the records on the opposite side of `id` in a pair table.
    fn related<T: DeserializeOwned>(
        &self,
        pairs: PairTable,
        side: Side,
        id: &str,
        records: RecordTable,
    ) -> StoreResult<Vec<T>> {
        let read_txn = self.db.begin_read()?;
        let pair_table = read_txn.open_table(pairs)?;
        let record_table = read_txn.open_table(records)?;

        let mut out = Vec::new();
        for other in other_ends(&pair_table, side, id)? {
            // a dangling pair means the record was deleted mid-cascade; skip it
            if let Some(record) = read_json(&record_table, &other)? {
                out.push(record);
            }
        }
        Ok(out)
    }
}

// =============================================================================
// Table Helpers
// =============================================================================

fn read_json<T: DeserializeOwned>(
    table: &impl ReadableTable<&'static str, &'static [u8]>,
    key: &str,
) -> StoreResult<Option<T>> {
    match table.get(key)? {
        Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
        None => Ok(None),
    }
}

fn scan_json<T: DeserializeOwned>(table: &impl ReadableTable<&'static str, &'static [u8]>) -> StoreResult<Vec<T>> {
    let mut out = Vec::new();
    for entry in table.iter()? {
        let (_, value) = entry?;
        out.push(serde_json::from_slice(value.value())?);
    }
    Ok(out)
}

/// Ids paired with `id`, which sits on `side`.
fn other_ends(
    table: &impl ReadableTable<(&'static str, &'static str), i64>,
    side: Side,
    id: &str,
) -> StoreResult<Vec<String>> {
    let mut out = Vec::new();
    match side {
        Side::Left => {
            // keys sort by left id first, so this is a prefix scan
            for entry in table.range((id, "")..)? {
                let (key, _) = entry?;
                let (left, right) = key.value();
                if left != id {
                    break;
                }
                out.push(right.to_string());
            }
        }
        Side::Right => {
            for entry in table.iter()? {
                let (key, _) = entry?;
                let (left, right) = key.value();
                if right == id {
                    out.push(left.to_string());
                }
            }
        }
    }
    Ok(out)
}

fn remove_pairs_with(
    table: &mut Table<'_, (&'static str, &'static str), i64>,
    side: Side,
    id: &str,
) -> StoreResult<usize> {
    let doomed: Vec<(String, String)> = other_ends(&*table, side, id)?
        .into_iter()
        .map(|other| match side {
            Side::Left => (id.to_string(), other),
            Side::Right => (other, id.to_string()),
        })
        .collect();

    for (left, right) in &doomed {
        table.remove((left.as_str(), right.as_str()))?;
    }
    Ok(doomed.len())
}

/// Random code mailed to a principal to confirm its e-mail address.
pub fn new_activation_code() -> String {
    let mut rng = rand::thread_rng();
    (0..ACTIVATION_LEN)
        .map(|_| ACTIVATION_ALPHABET[rng.gen_range(0..ACTIVATION_ALPHABET.len())] as char)
        .collect()
}

// =============================================================================
// UserStore
// =============================================================================

impl UserStore for IdentityDatabase {
    fn create_user(&self, email: &str, passphrase_hash: &str) -> StoreResult<User> {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            passphrase_hash: passphrase_hash.to_string(),
            enabled: false,
            suspended: false,
            totp_secret: None,
            two_factor_enabled: false,
            activation_code: Some(new_activation_code()),
            last_seen: None,
            last_login: None,
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_vec(&user)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut emails = write_txn.open_table(USER_EMAILS)?;
            if emails.get(email)?.is_some() {
                return Err(StoreError::AlreadyExists(format!("user {email}")));
            }
            emails.insert(email, user.id.as_str())?;

            let mut users = write_txn.open_table(USERS)?;
            users.insert(user.id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        tracing::info!(user_id = %user.id, "Created user");
        Ok(user)
    }

    fn get_user(&self, id: &str) -> StoreResult<User> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USERS)?;
        found(read_json(&table, id)?, || format!("user {id}"))
    }

    fn get_user_by_email(&self, email: &str) -> StoreResult<User> {
        let read_txn = self.db.begin_read()?;
        let emails = read_txn.open_table(USER_EMAILS)?;
        let id = found(emails.get(email)?.map(|v| v.value().to_string()), || format!("user {email}"))?;
        let users = read_txn.open_table(USERS)?;
        found(read_json(&users, &id)?, || format!("user {email}"))
    }

    fn save_user(&self, user: &User) -> StoreResult<()> {
        let mut user = user.clone();
        user.updated_at = Utc::now();
        let json = serde_json::to_vec(&user)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut users = write_txn.open_table(USERS)?;
            let existing: User = found(read_json(&users, &user.id)?, || format!("user {}", user.id))?;

            if existing.email != user.email {
                let mut emails = write_txn.open_table(USER_EMAILS)?;
                if emails.get(user.email.as_str())?.is_some() {
                    return Err(StoreError::AlreadyExists(format!("user {}", user.email)));
                }
                emails.remove(existing.email.as_str())?;
                emails.insert(user.email.as_str(), user.id.as_str())?;
            }
            users.insert(user.id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn delete_user(&self, id: &str) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut users = write_txn.open_table(USERS)?;
            let existing: User = found(read_json(&users, id)?, || format!("user {id}"))?;
            users.remove(id)?;

            let mut emails = write_txn.open_table(USER_EMAILS)?;
            emails.remove(existing.email.as_str())?;

            for def in [USER_ROLES, USER_GROUPS, RECOVERY_CODES] {
                let mut pairs = write_txn.open_table(def)?;
                remove_pairs_with(&mut pairs, Side::Left, id)?;
            }
        }
        write_txn.commit()?;
        tracing::info!(user_id = id, "Deleted user");
        Ok(())
    }

    fn list_users(&self, page: PageRequest<UserOrder>) -> StoreResult<Page<User>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USERS)?;
        let mut all: Vec<User> = scan_json(&table)?;
        match page.order_by {
            UserOrder::Email => all.sort_by(|a, b| a.email.cmp(&b.email)),
            UserOrder::CreatedAt => all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.email.cmp(&b.email))),
        }
        Ok(page.normalized().slice(all))
    }
}

// =============================================================================
// RoleStore / GroupStore
// =============================================================================

impl RoleStore for IdentityDatabase {
    fn create_role(&self, name: &str, description: &str) -> StoreResult<Role> {
        let role = Role {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: description.to_string(),
        };
        self.create_named(ROLES, ROLE_NAMES, role)
    }

    fn get_role(&self, id: &str) -> StoreResult<Role> {
        self.get_named(ROLES, id)
    }

    fn get_role_by_name(&self, name: &str) -> StoreResult<Role> {
        let id = {
            let read_txn = self.db.begin_read()?;
            let names = read_txn.open_table(ROLE_NAMES)?;
            let id = names.get(name)?.map(|v| v.value().to_string());
            found(id, || format!("role {name}"))?
        };
        self.get_role(&id)
    }

    fn update_role(&self, role: &Role) -> StoreResult<()> {
        self.update_named(ROLES, ROLE_NAMES, role)
    }

    fn delete_role(&self, id: &str) -> StoreResult<()> {
        self.delete_named::<Role>(
            ROLES,
            ROLE_NAMES,
            id,
            &[(USER_ROLES, Side::Right), (GROUP_ROLES, Side::Right)],
        )
    }

    fn list_roles(&self, page: PageRequest) -> StoreResult<Page<Role>> {
        self.list_named(ROLES, page)
    }
}

impl GroupStore for IdentityDatabase {
    fn create_group(&self, name: &str, description: &str) -> StoreResult<Group> {
        let group = Group {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: description.to_string(),
        };
        self.create_named(GROUPS, GROUP_NAMES, group)
    }

    fn get_group(&self, id: &str) -> StoreResult<Group> {
        self.get_named(GROUPS, id)
    }

    fn update_group(&self, group: &Group) -> StoreResult<()> {
        self.update_named(GROUPS, GROUP_NAMES, group)
    }

    fn delete_group(&self, id: &str) -> StoreResult<()> {
        self.delete_named::<Group>(
            GROUPS,
            GROUP_NAMES,
            id,
            &[(USER_GROUPS, Side::Right), (GROUP_ROLES, Side::Left)],
        )
    }

    fn list_groups(&self, page: PageRequest) -> StoreResult<Page<Group>> {
        self.list_named(GROUPS, page)
    }
}

// =============================================================================
// RelationStore
// =============================================================================

impl RelationStore for IdentityDatabase {
    fn add_user_role(&self, user_id: &str, role_id: &str) -> StoreResult<()> {
        self.add_pair(USER_ROLES, (USERS, "user", user_id), (ROLES, "role", role_id))
    }

    fn remove_user_role(&self, user_id: &str, role_id: &str) -> StoreResult<()> {
        self.remove_pair(USER_ROLES, user_id, role_id)
    }

    fn add_user_group(&self, user_id: &str, group_id: &str) -> StoreResult<()> {
        self.add_pair(USER_GROUPS, (USERS, "user", user_id), (GROUPS, "group", group_id))
    }

    fn remove_user_group(&self, user_id: &str, group_id: &str) -> StoreResult<()> {
        self.remove_pair(USER_GROUPS, user_id, group_id)
    }

    fn add_group_role(&self, group_id: &str, role_id: &str) -> StoreResult<()> {
        self.add_pair(GROUP_ROLES, (GROUPS, "group", group_id), (ROLES, "role", role_id))
    }

    fn remove_group_role(&self, group_id: &str, role_id: &str) -> StoreResult<()> {
        self.remove_pair(GROUP_ROLES, group_id, role_id)
    }

    fn roles_of_user(&self, user_id: &str) -> StoreResult<Vec<Role>> {
        self.related(USER_ROLES, Side::Left, user_id, ROLES)
    }

    fn groups_of_user(&self, user_id: &str) -> StoreResult<Vec<Group>> {
        self.related(USER_GROUPS, Side::Left, user_id, GROUPS)
    }

    fn roles_of_group(&self, group_id: &str) -> StoreResult<Vec<Role>> {
        self.related(GROUP_ROLES, Side::Left, group_id, ROLES)
    }

    fn users_of_role(&self, role_id: &str) -> StoreResult<Vec<User>> {
        self.related(USER_ROLES, Side::Right, role_id, USERS)
    }

    fn users_of_group(&self, group_id: &str) -> StoreResult<Vec<User>> {
        self.related(USER_GROUPS, Side::Right, group_id, USERS)
    }

    fn groups_of_role(&self, role_id: &str) -> StoreResult<Vec<Group>> {
        self.related(GROUP_ROLES, Side::Right, role_id, GROUPS)
    }
}

// =============================================================================
// RecoveryCodeStore
// =============================================================================

impl RecoveryCodeStore for IdentityDatabase {
    fn replace_recovery_codes(&self, user_id: &str, hashes: &[String]) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut codes = write_txn.open_table(RECOVERY_CODES)?;
            let dropped = remove_pairs_with(&mut codes, Side::Left, user_id)?;
            for hash in hashes {
                codes.insert((user_id, hash.as_str()), 0i64)?;
            }
            tracing::debug!(user_id, dropped, created = hashes.len(), "Replaced recovery codes");
        }
        write_txn.commit()?;
        Ok(())
    }

    fn consume_recovery_code(&self, user_id: &str, hash: &str) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut codes = write_txn.open_table(RECOVERY_CODES)?;
            let spent_at = codes.get((user_id, hash))?.map(|v| v.value());
            match spent_at {
                None => return Err(StoreError::NotFound("recovery code".to_string())),
                Some(at) if at != 0 => return Err(StoreError::CodeAlreadyUsed),
                Some(_) => {
                    codes.insert((user_id, hash), Utc::now().timestamp().max(1))?;
                }
            }
        }
        write_txn.commit()?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SortDirection;
    use std::sync::Arc;

    fn temp_db() -> (IdentityDatabase, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = IdentityDatabase::open(&dir.path().join("identity.redb")).unwrap();
        (db, dir)
    }

    #[test]
    fn create_and_get_user() {
        let (db, _dir) = temp_db();
        let user = db.create_user("alice@example.com", "$argon2id$fake").unwrap();
        assert!(!user.enabled);
        let code = user.activation_code.clone().unwrap();
        assert_eq!(code.len(), 6);
        assert!(code.bytes().all(|b| ACTIVATION_ALPHABET.contains(&b)));

        assert_eq!(db.get_user(&user.id).unwrap(), user);
        assert_eq!(db.get_user_by_email("alice@example.com").unwrap().id, user.id);
        assert!(matches!(db.get_user_by_email("Alice@example.com"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let (db, _dir) = temp_db();
        db.create_user("alice@example.com", "h").unwrap();
        assert!(matches!(
            db.create_user("alice@example.com", "h"),
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[test]
    fn save_user_moves_email_index() {
        let (db, _dir) = temp_db();
        let mut user = db.create_user("alice@example.com", "h").unwrap();
        db.create_user("bob@example.com", "h").unwrap();

        user.email = "bob@example.com".to_string();
        assert!(matches!(db.save_user(&user), Err(StoreError::AlreadyExists(_))));

        user.email = "alice@corp.example".to_string();
        user.enabled = true;
        db.save_user(&user).unwrap();
        assert!(db.get_user_by_email("alice@corp.example").unwrap().enabled);
        assert!(db.get_user_by_email("alice@example.com").is_err());
    }

    #[test]
    fn list_users_orders_and_pages() {
        let (db, _dir) = temp_db();
        for email in ["carol@x", "alice@x", "bob@x"] {
            db.create_user(email, "h").unwrap();
        }
        let page = db
            .list_users(PageRequest {
                page: 1,
                size: 2,
                order_by: UserOrder::Email,
                direction: SortDirection::Desc,
            })
            .unwrap();
        let emails: Vec<_> = page.items.iter().map(|u| u.email.as_str()).collect();
        assert_eq!(emails, vec!["carol@x", "bob@x"]);
        assert_eq!(page.total_items, 3);
        assert_eq!(page.total_pages, 2);
    }

    #[test]
    fn role_names_are_unique() {
        let (db, _dir) = temp_db();
        let admin = db.create_role("admin", "").unwrap();
        let user = db.create_role("user", "").unwrap();
        assert!(matches!(db.create_role("admin", ""), Err(StoreError::AlreadyExists(_))));

        let mut renamed = user.clone();
        renamed.name = "admin".to_string();
        assert!(matches!(db.update_role(&renamed), Err(StoreError::AlreadyExists(_))));

        renamed.name = "member".to_string();
        db.update_role(&renamed).unwrap();
        assert_eq!(db.get_role_by_name("member").unwrap().id, user.id);
        assert!(db.get_role_by_name("user").is_err());
        assert_eq!(db.get_role_by_name("admin").unwrap(), admin);
    }

    #[test]
    fn relations_are_unique_and_need_both_ends() {
        let (db, _dir) = temp_db();
        let user = db.create_user("alice@x", "h").unwrap();
        let role = db.create_role("admin", "").unwrap();

        db.add_user_role(&user.id, &role.id).unwrap();
        assert!(matches!(
            db.add_user_role(&user.id, &role.id),
            Err(StoreError::AlreadyExists(_))
        ));
        assert!(matches!(db.add_user_role("ghost", &role.id), Err(StoreError::NotFound(_))));
        assert!(matches!(db.add_user_role(&user.id, "ghost"), Err(StoreError::NotFound(_))));

        assert_eq!(db.roles_of_user(&user.id).unwrap(), vec![role.clone()]);
        assert_eq!(db.users_of_role(&role.id).unwrap()[0].id, user.id);

        db.remove_user_role(&user.id, &role.id).unwrap();
        assert!(db.roles_of_user(&user.id).unwrap().is_empty());
        assert!(matches!(
            db.remove_user_role(&user.id, &role.id),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn prefix_scan_does_not_leak_into_neighbours() {
        let (db, _dir) = temp_db();
        let g1 = db.create_group("g1", "").unwrap();
        let g2 = db.create_group("g2", "").unwrap();
        let r1 = db.create_role("r1", "").unwrap();
        let r2 = db.create_role("r2", "").unwrap();
        db.add_group_role(&g1.id, &r1.id).unwrap();
        db.add_group_role(&g2.id, &r2.id).unwrap();

        assert_eq!(db.roles_of_group(&g1.id).unwrap(), vec![r1.clone()]);
        assert_eq!(db.roles_of_group(&g2.id).unwrap(), vec![r2]);
        assert_eq!(db.groups_of_role(&r1.id).unwrap(), vec![g1]);
    }

    #[test]
    fn deleting_cascades_relations() {
        let (db, _dir) = temp_db();
        let user = db.create_user("alice@x", "h").unwrap();
        let group = db.create_group("ops", "").unwrap();
        let role = db.create_role("deploy", "").unwrap();
        db.add_user_group(&user.id, &group.id).unwrap();
        db.add_group_role(&group.id, &role.id).unwrap();
        db.add_user_role(&user.id, &role.id).unwrap();

        db.delete_role(&role.id).unwrap();
        assert!(db.roles_of_user(&user.id).unwrap().is_empty());
        assert!(db.roles_of_group(&group.id).unwrap().is_empty());

        db.delete_group(&group.id).unwrap();
        assert!(db.groups_of_user(&user.id).unwrap().is_empty());
        // the name is free again
        db.create_group("ops", "").unwrap();

        db.delete_user(&user.id).unwrap();
        assert!(matches!(db.get_user(&user.id), Err(StoreError::NotFound(_))));
        db.create_user("alice@x", "h").unwrap();
    }

    #[test]
    fn recovery_code_is_consumed_once() {
        let (db, _dir) = temp_db();
        let hashes = vec!["h1".to_string(), "h2".to_string()];
        db.replace_recovery_codes("u1", &hashes).unwrap();

        db.consume_recovery_code("u1", "h1").unwrap();
        assert!(matches!(db.consume_recovery_code("u1", "h1"), Err(StoreError::CodeAlreadyUsed)));
        assert!(matches!(db.consume_recovery_code("u2", "h2"), Err(StoreError::NotFound(_))));
        db.consume_recovery_code("u1", "h2").unwrap();
    }

    #[test]
    fn replacing_recovery_codes_invalidates_old_batch() {
        let (db, _dir) = temp_db();
        db.replace_recovery_codes("u1", &["old".to_string()]).unwrap();
        db.replace_recovery_codes("u1", &["new".to_string()]).unwrap();
        assert!(matches!(db.consume_recovery_code("u1", "old"), Err(StoreError::NotFound(_))));
        db.consume_recovery_code("u1", "new").unwrap();
    }

    #[test]
    fn concurrent_consumption_succeeds_once() {
        let (db, _dir) = temp_db();
        db.replace_recovery_codes("u1", &["race".to_string()]).unwrap();
        let db = Arc::new(db);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db = Arc::clone(&db);
                std::thread::spawn(move || db.consume_recovery_code("u1", "race").is_ok())
            })
            .collect();
        let wins = handles.into_iter().map(|h| h.join().unwrap()).filter(|ok| *ok).count();
        assert_eq!(wins, 1);
    }
}
