// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ordered access control list.
//!
//! Each rule pairs an HTTP method and a [`PathPattern`] with the token
//! audiences it admits. A rule with no audiences is public. Rules are scanned
//! in declaration order; a rule whose audience does not intersect the token's
//! lets the scan continue so a path can carry several method/audience
//! combinations. If nothing grants, the request is refused.
//!
//! Audiences are checked against the token, not against live role
//! assignments: a role revoked after issuance keeps working until the token
//! expires.

use std::sync::Arc;

use axum::http::Method;

use super::claims::{AuthenticationContext, TokenClaims, TokenType};
use super::error::AuthError;
use super::pattern::{PathPattern, PatternError};
use super::token::{TokenError, TokenFactory};

/// Invalid access control configuration.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error("allow-list pattern {0} has no public rule with the same pattern")]
    UnbackedAllowListEntry(String),
}

/// One access control entry.
#[derive(Debug, Clone)]
pub struct AccessRule {
    pub method: Method,
    pub pattern: PathPattern,
    /// Empty means public
    pub audiences: Vec<String>,
    /// Token type a granting token must carry
    pub token_type: TokenType,
}

impl AccessRule {
    /// Rule admitting access tokens whose audience intersects `audiences`.
    pub fn new(method: Method, pattern: &str, audiences: Vec<String>) -> Result<Self, PatternError> {
        Ok(Self {
            method,
            pattern: PathPattern::parse(pattern)?,
            audiences,
            token_type: TokenType::Access,
        })
    }

    /// Rule that needs no token.
    pub fn public(method: Method, pattern: &str) -> Result<Self, PatternError> {
        Self::new(method, pattern, Vec::new())
    }

    /// Require a different token type.
    pub fn accepting(mut self, token_type: TokenType) -> Self {
        self.token_type = token_type;
        self
    }

    pub fn is_public(&self) -> bool {
        self.audiences.is_empty()
    }

    fn applies_to(&self, method: &Method, path: &str) -> bool {
        self.method.as_str().eq_ignore_ascii_case(method.as_str()) && self.pattern.matches(path)
    }
}

/// Authorization settings fixed at start-up.
#[derive(Debug, Clone)]
pub struct AuthorizationConfig {
    pub issuer: String,
    pub admin_role: String,
    pub user_role: String,
    pub rules: Vec<AccessRule>,
    /// Paths that skip token handling for every method
    pub allow_list: Vec<PathPattern>,
}

impl AuthorizationConfig {
    /// Build and validate a configuration.
    pub fn new(
        issuer: impl Into<String>,
        admin_role: impl Into<String>,
        user_role: impl Into<String>,
        rules: Vec<AccessRule>,
        allow_list: Vec<PathPattern>,
    ) -> Result<Self, RuleError> {
        let config = Self {
            issuer: issuer.into(),
            admin_role: admin_role.into(),
            user_role: user_role.into(),
            rules,
            allow_list,
        };
        config.validate()?;
        Ok(config)
    }

    /// The service's own route table.
    pub fn with_default_rules(
        issuer: impl Into<String>,
        admin_role: impl Into<String>,
        user_role: impl Into<String>,
    ) -> Result<Self, RuleError> {
        let admin_role = admin_role.into();
        let user_role = user_role.into();
        let admin = || vec![admin_role.clone()];
        let any_user = || vec![user_role.clone(), admin_role.clone()];

        const M: &str = "/api/v1/management";
        let rules = vec![
            AccessRule::public(Method::GET, "/docs/**")?,
            AccessRule::public(Method::GET, "/health")?,
            // authentication
            AccessRule::public(Method::POST, "/api/v1/auth/authenticate")?,
            AccessRule::new(Method::POST, "/api/v1/auth/refresh", any_user())?.accepting(TokenType::Refresh),
            AccessRule::public(Method::POST, "/api/v1/auth/authenticate2fa")?,
            AccessRule::public(Method::POST, "/api/v1/auth/recover2fa")?,
            // self service
            AccessRule::new(Method::GET, &format!("{M}/user/whoami"), any_user())?,
            AccessRule::public(Method::POST, &format!("{M}/user/activate"))?,
            // users
            AccessRule::new(Method::GET, &format!("{M}/users"), admin())?,
            AccessRule::new(Method::POST, &format!("{M}/user"), admin())?,
            AccessRule::new(Method::POST, &format!("{M}/user/*/passwd"), any_user())?,
            AccessRule::new(Method::GET, &format!("{M}/user/*"), admin())?,
            AccessRule::new(Method::DELETE, &format!("{M}/user/*"), admin())?,
            AccessRule::new(Method::PUT, &format!("{M}/user/*"), admin())?,
            AccessRule::new(Method::GET, &format!("{M}/user/*/roles"), admin())?,
            AccessRule::new(Method::GET, &format!("{M}/user/*/all-roles"), admin())?,
            AccessRule::new(Method::PUT, &format!("{M}/user/*/role/*"), admin())?,
            AccessRule::new(Method::DELETE, &format!("{M}/user/*/role/*"), admin())?,
            AccessRule::new(Method::GET, &format!("{M}/user/*/groups"), admin())?,
            AccessRule::new(Method::PUT, &format!("{M}/user/*/group/*"), admin())?,
            AccessRule::new(Method::DELETE, &format!("{M}/user/*/group/*"), admin())?,
            // listed after `user/*` on purpose: user tokens fall through the admin rule
            AccessRule::new(Method::GET, &format!("{M}/user/2FAQR"), any_user())?,
            AccessRule::new(Method::POST, &format!("{M}/user/activate2FA"), any_user())?,
            // groups
            AccessRule::new(Method::GET, &format!("{M}/groups"), admin())?,
            AccessRule::new(Method::POST, &format!("{M}/group"), admin())?,
            AccessRule::new(Method::GET, &format!("{M}/group/*"), admin())?,
            AccessRule::new(Method::DELETE, &format!("{M}/group/*"), admin())?,
            AccessRule::new(Method::PUT, &format!("{M}/group/*"), admin())?,
            AccessRule::new(Method::GET, &format!("{M}/group/*/users"), admin())?,
            AccessRule::new(Method::GET, &format!("{M}/group/*/roles"), admin())?,
            AccessRule::new(Method::PUT, &format!("{M}/group/*/role/*"), admin())?,
            AccessRule::new(Method::DELETE, &format!("{M}/group/*/role/*"), admin())?,
            // roles
            AccessRule::new(Method::GET, &format!("{M}/roles"), admin())?,
            AccessRule::new(Method::POST, &format!("{M}/role"), admin())?,
            AccessRule::new(Method::GET, &format!("{M}/role/*"), admin())?,
            AccessRule::new(Method::DELETE, &format!("{M}/role/*"), admin())?,
            AccessRule::new(Method::PUT, &format!("{M}/role/*"), admin())?,
            AccessRule::new(Method::GET, &format!("{M}/role/*/users"), admin())?,
            AccessRule::new(Method::GET, &format!("{M}/role/*/groups"), admin())?,
        ];

        let allow_list = vec![PathPattern::parse("/health")?, PathPattern::parse("/docs/**")?];

        Self::new(issuer, admin_role, user_role, rules, allow_list)
    }

    /// Every allow-list entry must be backed by a public rule with the same
    /// pattern, so skipping the scan never changes the outcome for that rule.
    pub fn validate(&self) -> Result<(), RuleError> {
        for allowed in &self.allow_list {
            let backed = self
                .rules
                .iter()
                .any(|rule| rule.is_public() && rule.pattern == *allowed);
            if !backed {
                return Err(RuleError::UnbackedAllowListEntry(allowed.to_string()));
            }
        }
        Ok(())
    }
}

/// Outcome of a granted request.
#[derive(Debug, Clone)]
pub enum Decision {
    /// Public rule or allow-listed path; no token was inspected
    Public,
    /// Token accepted by a rule
    Granted(AuthenticationContext),
}

/// Access control engine.
pub struct AccessControl {
    config: AuthorizationConfig,
    tokens: Arc<TokenFactory>,
}

impl AccessControl {
    pub fn new(config: AuthorizationConfig, tokens: Arc<TokenFactory>) -> Self {
        Self { config, tokens }
    }

    pub fn config(&self) -> &AuthorizationConfig {
        &self.config
    }

    /// Decide a request given its method, path and raw `Authorization` header.
    pub fn decide(&self, method: &Method, path: &str, authorization: Option<&str>) -> Result<Decision, AuthError> {
        if self.config.allow_list.iter().any(|p| p.matches(path)) {
            return Ok(Decision::Public);
        }

        let mut matching = self.config.rules.iter().filter(|r| r.applies_to(method, path));

        // public rules ahead of the first protected one need no token
        let first_protected = loop {
            match matching.next() {
                None => {
                    tracing::debug!(%method, path, "No rule matches");
                    return Err(AuthError::InsufficientPermissions);
                }
                Some(rule) if rule.is_public() => {
                    tracing::debug!(%method, path, rule = %rule.pattern, "Public rule");
                    return Ok(Decision::Public);
                }
                Some(rule) => break rule,
            }
        };

        let (claims, token) = self.verify(authorization)?;

        for rule in std::iter::once(first_protected).chain(matching) {
            if rule.is_public() {
                return Ok(Decision::Public);
            }

            if !claims.audience_intersects(&rule.audiences) {
                tracing::debug!(%method, path, rule = %rule.pattern, "Audience mismatch, continuing");
                continue;
            }

            if claims.token_type != rule.token_type {
                return Err(AuthError::WrongTokenType {
                    expected: rule.token_type,
                    actual: claims.token_type,
                });
            }

            tracing::debug!(%method, path, subject = %claims.sub, rule = %rule.pattern, "Granted");
            return Ok(Decision::Granted(AuthenticationContext::from_claims(claims, token)));
        }

        Err(AuthError::InsufficientPermissions)
    }

    fn verify(&self, authorization: Option<&str>) -> Result<(TokenClaims, String), AuthError> {
        let header = authorization.ok_or(AuthError::MissingAuthHeader)?;
        let token = bearer_token(header).ok_or(AuthError::InvalidAuthHeader)?;

        let claims = self.tokens.read_token(token)?;
        if claims.iss != self.config.issuer {
            return Err(TokenError::IssuerMismatch {
                claims: Box::new(claims),
            }
            .into());
        }
        Ok((claims, token.to_string()))
    }
}

/// Extract the token from `Bearer <token>`, scheme case-insensitive.
fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
