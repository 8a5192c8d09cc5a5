// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Session tokens, access control and second factors for the identity API.
//!
//! ## Auth Flow
//!
//! 1. Client posts e-mail and passphrase (plus a TOTP or recovery code when
//!    2FA is on) to `/api/v1/auth/*`
//! 2. Server issues an access/refresh pair whose audience is the principal's
//!    effective role names
//! 3. Client sends `Authorization: Bearer <access token>`
//! 4. The access control middleware walks the ordered rule list:
//!    - public rules grant without looking at the header
//!    - the token is verified once, at the first protected rule
//!    - a rule grants when its audience intersects the token's audience
//!      and its accepted token type matches
//! 5. Handlers read the granted context with the [`Auth`] extractor
//!
//! ## Security
//!
//! - Tokens are HMAC-signed with a deployment key and never valid before
//!   `nbf` or after `exp` (no leeway)
//! - Refresh tokens are only accepted on the refresh route
//! - Every refusal after a token was presented yields the same 403 body

pub mod acl;
pub mod claims;
pub mod error;
pub mod extractor;
pub mod middleware;
pub mod password;
pub mod pattern;
pub mod token;
pub mod totp;

pub use acl::{AccessControl, AccessRule, AuthorizationConfig, Decision, RuleError};
pub use claims::{AuthenticationContext, TokenClaims, TokenType};
pub use error::AuthError;
pub use extractor::Auth;
pub use pattern::{PathPattern, PatternError};
pub use token::{SigningAlgorithm, TokenError, TokenFactory, TokenPair};
pub use totp::{TotpEngine, TotpError};
