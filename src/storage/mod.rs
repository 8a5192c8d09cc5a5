// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Identity Storage
//!
//! Users, roles, groups, their relations and hashed recovery codes, kept in
//! an embedded redb database (pure Rust, ACID).
//!
//! ## Storage Layout
//!
//! ```text
//! {DATA_DIR}/
//!   identity.redb
//! ```
//!
//! The service only talks to the traits in [`repository`]; [`IdentityDatabase`]
//! is the production implementation.

pub mod database;
pub mod repository;

pub use database::IdentityDatabase;
pub use repository::{
    Group, GroupStore, IdentityStore, Page, PageRequest, RecoveryCodeStore, RelationStore, Role, RoleStore,
    SortDirection, User, UserOrder, UserStore,
};

/// Storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("recovery code already used")]
    CodeAlreadyUsed,

    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
