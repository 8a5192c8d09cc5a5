// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Sentinel IAM - Identity and Access Control Service
//!
//! Signs and verifies session tokens, gates every HTTP request through an
//! ordered rule table, resolves roles inherited through groups and offers a
//! TOTP second factor with single-use recovery codes.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Token service, access control engine and TOTP
//! - `rbac` - Effective role resolution over users, groups and roles
//! - `storage` - Identity records (redb)

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod mailer;
pub mod models;
pub mod rbac;
pub mod state;
pub mod storage;
