// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session token claims and the authentication context handed to handlers.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

/// Claim names owned by the token service. Extra claims may not reuse them.
pub const RESERVED_CLAIMS: [&str; 7] = ["iss", "sub", "aud", "iat", "nbf", "exp", "type"];

/// Token type tag carried in the `type` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    /// Short-lived token presented to protected endpoints
    Access,
    /// Long-lived token only exchangeable for a new access token
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full claim set of a session token.
///
/// Timestamps are Unix seconds. `aud` is always written as an array but a
/// single string is accepted on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Issuer
    pub iss: String,
    /// Subject (principal email)
    pub sub: String,
    /// Audience (role names asserted by the token)
    #[serde(default, deserialize_with = "deserialize_audience")]
    pub aud: Vec<String>,
    /// Issued at
    pub iat: i64,
    /// Not before
    pub nbf: i64,
    /// Expiration
    pub exp: i64,
    /// Token type tag
    #[serde(rename = "type")]
    pub token_type: TokenType,
    /// Caller-defined extension claims
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TokenClaims {
    /// True when the audience list shares at least one entry with `allowed`.
    pub fn audience_intersects<'a, I>(&self, allowed: I) -> bool
    where
        I: IntoIterator<Item = &'a String>,
    {
        allowed.into_iter().any(|role| self.aud.contains(role))
    }
}

fn deserialize_audience<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Audience {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Audience::deserialize(deserializer)? {
        Audience::One(aud) => vec![aud],
        Audience::Many(aud) => aud,
    })
}

/// Authentication context attached to a request once access control grants it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthenticationContext {
    /// Token subject (principal email)
    pub subject: String,
    /// Audience list of the presented token
    pub audience: Vec<String>,
    /// Type of the presented token
    pub token_type: TokenType,
    /// Raw token string, never serialized
    #[serde(skip)]
    pub token: String,
}

impl AuthenticationContext {
    pub fn from_claims(claims: TokenClaims, token: impl Into<String>) -> Self {
        Self {
            subject: claims.sub,
            audience: claims.aud,
            token_type: claims.token_type,
            token: token.into(),
        }
    }

    /// Check if the token asserts the given role name.
    pub fn has_audience(&self, role: &str) -> bool {
        self.audience.iter().any(|aud| aud == role)
    }
}
