// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session token factory.
//!
//! Tokens are HMAC-signed JWTs. The signing key and algorithm are fixed for
//! the lifetime of a factory; issuing and refreshing go through one mutex so
//! claim propagation stays deterministic under concurrent refreshes.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde_json::{Map, Value};

use super::claims::{TokenClaims, TokenType, RESERVED_CLAIMS};

/// Signing key shipped for local development only.
pub const DEVELOPMENT_SIGN_KEY: &str = "th15mustb3CH@ngedINprodUCT10N";

/// Errors raised by the token factory.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("malformed token")]
    MalformedToken,

    /// Bad signature, expired, or not yet valid. The precise reason is only logged.
    #[error("invalid token signature")]
    InvalidSignature,

    /// The token verified but was minted by another issuer. The claims are
    /// kept so callers can log context.
    #[error("invalid issuer {}", .claims.iss)]
    IssuerMismatch { claims: Box<TokenClaims> },

    #[error("expected {expected} token but got {actual}")]
    WrongTokenType { expected: TokenType, actual: TokenType },

    #[error("token signing failed: {0}")]
    Signing(String),
}

/// HMAC signing algorithm, selected per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningAlgorithm {
    Hs256,
    Hs384,
    Hs512,
}

impl SigningAlgorithm {
    /// Parse a configured method name. Unrecognized values fall back to HS256.
    pub fn from_config(value: &str) -> Self {
        match value.trim().to_uppercase().as_str() {
            "HS384" => SigningAlgorithm::Hs384,
            "HS512" => SigningAlgorithm::Hs512,
            _ => SigningAlgorithm::Hs256,
        }
    }

    fn algorithm(self) -> Algorithm {
        match self {
            SigningAlgorithm::Hs256 => Algorithm::HS256,
            SigningAlgorithm::Hs384 => Algorithm::HS384,
            SigningAlgorithm::Hs512 => Algorithm::HS512,
        }
    }
}

/// Freshly issued access/refresh token pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

/// Creates, reads and refreshes session tokens.
pub struct TokenFactory {
    issuer: String,
    algorithm: SigningAlgorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
    lock: Mutex<()>,
}

impl TokenFactory {
    pub fn new(
        sign_key: &str,
        algorithm: SigningAlgorithm,
        issuer: impl Into<String>,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        if sign_key == DEVELOPMENT_SIGN_KEY {
            tracing::warn!(
                "Using the development token signing key. It is visible in the source tree; set TOKEN_SIGN_KEY in production"
            );
        }

        Self {
            issuer: issuer.into(),
            algorithm,
            encoding_key: EncodingKey::from_secret(sign_key.as_bytes()),
            decoding_key: DecodingKey::from_secret(sign_key.as_bytes()),
            access_ttl,
            refresh_ttl,
            lock: Mutex::new(()),
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Issue an access/refresh pair sharing subject, audience and extra claims.
    pub fn issue_pair(
        &self,
        subject: &str,
        audience: &[String],
        additional: Map<String, Value>,
    ) -> Result<TokenPair, TokenError> {
        self.issue_pair_at(subject, audience, additional, Utc::now())
    }

    pub(crate) fn issue_pair_at(
        &self,
        subject: &str,
        audience: &[String],
        additional: Map<String, Value>,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, TokenError> {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let extra: Map<String, Value> = additional
            .into_iter()
            .filter(|(key, _)| !RESERVED_CLAIMS.contains(&key.as_str()))
            .collect();

        let access_expires_at = now + self.access_ttl;
        let refresh_expires_at = now + self.refresh_ttl;

        let access = TokenClaims {
            iss: self.issuer.clone(),
            sub: subject.to_string(),
            aud: audience.to_vec(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: access_expires_at.timestamp(),
            token_type: TokenType::Access,
            extra: extra.clone(),
        };
        let refresh = TokenClaims {
            exp: refresh_expires_at.timestamp(),
            token_type: TokenType::Refresh,
            extra,
            ..access.clone()
        };

        Ok(TokenPair {
            access_token: self.sign(&access)?,
            refresh_token: self.sign(&refresh)?,
            access_expires_at,
            refresh_expires_at,
        })
    }

    /// Parse and verify a token.
    ///
    /// On issuer mismatch the verified claims are still returned inside
    /// [`TokenError::IssuerMismatch`].
    pub fn read_token(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let mut validation = Validation::new(self.algorithm.algorithm());
        validation.leeway = 0;
        validation.validate_nbf = true;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "sub"]);

        let data = decode::<TokenClaims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature
                | ErrorKind::ExpiredSignature
                | ErrorKind::ImmatureSignature
                | ErrorKind::InvalidAlgorithm => {
                    tracing::debug!(reason = ?e.kind(), "Token failed verification");
                    TokenError::InvalidSignature
                }
                _ => {
                    tracing::debug!(reason = ?e.kind(), "Token could not be parsed");
                    TokenError::MalformedToken
                }
            }
        })?;

        let claims = data.claims;
        if claims.iss != self.issuer {
            return Err(TokenError::IssuerMismatch {
                claims: Box::new(claims),
            });
        }
        Ok(claims)
    }

    /// Exchange a refresh token for a new access token.
    ///
    /// Subject, audience, issued-at, not-before and extra claims are carried
    /// over; only the expiry is recomputed.
    pub fn refresh(&self, refresh_token: &str) -> Result<String, TokenError> {
        self.refresh_at(refresh_token, Utc::now())
    }

    pub(crate) fn refresh_at(&self, refresh_token: &str, now: DateTime<Utc>) -> Result<String, TokenError> {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let claims = self.read_token(refresh_token)?;
        if claims.token_type != TokenType::Refresh {
            return Err(TokenError::WrongTokenType {
                expected: TokenType::Refresh,
                actual: claims.token_type,
            });
        }

        let access = TokenClaims {
            exp: (now + self.access_ttl).timestamp(),
            token_type: TokenType::Access,
            ..claims
        };
        self.sign(&access)
    }

    fn sign(&self, claims: &TokenClaims) -> Result<String, TokenError> {
        encode(&Header::new(self.algorithm.algorithm()), claims, &self.encoding_key).map_err(|e| {
            tracing::error!(error = %e, "Failed to sign token");
            TokenError::Signing(e.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

    const ISSUER: &str = "sentinel-test";

    fn factory(key: &str) -> TokenFactory {
        TokenFactory::new(
            key,
            SigningAlgorithm::Hs256,
            ISSUER,
            Duration::minutes(5),
            Duration::hours(48),
        )
    }

    fn audience() -> Vec<String> {
        vec!["user@sentinel".to_string(), "auditor".to_string()]
    }

    fn extra() -> Map<String, Value> {
        let mut extra = Map::new();
        extra.insert("tenant".to_string(), Value::from("acme"));
        extra
    }

    #[test]
    fn sign_method_parsing_defaults_to_hs256() {
        assert_eq!(SigningAlgorithm::from_config("hs384"), SigningAlgorithm::Hs384);
        assert_eq!(SigningAlgorithm::from_config("HS512"), SigningAlgorithm::Hs512);
        assert_eq!(SigningAlgorithm::from_config("RS256"), SigningAlgorithm::Hs256);
        assert_eq!(SigningAlgorithm::from_config(""), SigningAlgorithm::Hs256);
    }

    #[test]
    fn access_token_round_trip() {
        let tf = factory("k1");
        let pair = tf.issue_pair("alice@example.com", &audience(), extra()).unwrap();

        let claims = tf.read_token(&pair.access_token).unwrap();
        assert_eq!(claims.iss, ISSUER);
        assert_eq!(claims.sub, "alice@example.com");
        assert_eq!(claims.aud, audience());
        assert_eq!(claims.token_type, TokenType::Access);
        assert_eq!(claims.extra.get("tenant"), Some(&Value::from("acme")));

        let refresh = tf.read_token(&pair.refresh_token).unwrap();
        assert_eq!(refresh.token_type, TokenType::Refresh);
        assert!(refresh.exp > claims.exp);
    }

    #[test]
    fn reserved_extra_claims_are_dropped() {
        let tf = factory("k1");
        let mut additional = extra();
        additional.insert("type".to_string(), Value::from("refresh"));
        additional.insert("iss".to_string(), Value::from("someone-else"));

        let pair = tf.issue_pair("alice@example.com", &audience(), additional).unwrap();
        let claims = tf.read_token(&pair.access_token).unwrap();
        assert_eq!(claims.token_type, TokenType::Access);
        assert_eq!(claims.iss, ISSUER);
    }

    #[test]
    fn other_key_fails_validation() {
        let pair = factory("k1").issue_pair("alice@example.com", &audience(), Map::new()).unwrap();
        let result = factory("k2").read_token(&pair.access_token);
        assert!(matches!(result, Err(TokenError::InvalidSignature)));
    }

    #[test]
    fn other_algorithm_fails_validation() {
        let pair = factory("k1").issue_pair("alice@example.com", &audience(), Map::new()).unwrap();
        let hs512 = TokenFactory::new(
            "k1",
            SigningAlgorithm::Hs512,
            ISSUER,
            Duration::minutes(5),
            Duration::hours(48),
        );
        assert!(hs512.read_token(&pair.access_token).is_err());
    }

    #[test]
    fn garbage_is_malformed() {
        let result = factory("k1").read_token("not-a-token");
        assert!(matches!(result, Err(TokenError::MalformedToken)));
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let tf = factory("k1");
        let pair = tf.issue_pair("alice@example.com", &audience(), Map::new()).unwrap();
        let parts: Vec<&str> = pair.access_token.split('.').collect();

        let mut payload: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(parts[1]).unwrap()).unwrap();
        payload["aud"] = serde_json::json!(["admin@sentinel"]);
        let forged = format!(
            "{}.{}.{}",
            parts[0],
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload).unwrap()),
            parts[2]
        );

        assert!(matches!(tf.read_token(&forged), Err(TokenError::InvalidSignature)));
    }

    #[test]
    fn expired_token_is_reported_as_invalid_signature() {
        let tf = factory("k1");
        let issued = Utc::now() - Duration::minutes(10);
        let pair = tf
            .issue_pair_at("alice@example.com", &audience(), Map::new(), issued)
            .unwrap();
        assert!(matches!(tf.read_token(&pair.access_token), Err(TokenError::InvalidSignature)));
        // the refresh token outlives the access token
        assert!(tf.read_token(&pair.refresh_token).is_ok());
    }

    #[test]
    fn not_yet_valid_token_is_rejected() {
        let tf = factory("k1");
        let issued = Utc::now() + Duration::minutes(10);
        let pair = tf
            .issue_pair_at("alice@example.com", &audience(), Map::new(), issued)
            .unwrap();
        assert!(matches!(tf.read_token(&pair.access_token), Err(TokenError::InvalidSignature)));
    }

    #[test]
    fn issuer_mismatch_keeps_claims() {
        let foreign = TokenFactory::new(
            "k1",
            SigningAlgorithm::Hs256,
            "someone-else",
            Duration::minutes(5),
            Duration::hours(48),
        );
        let pair = foreign.issue_pair("mallory@example.com", &audience(), Map::new()).unwrap();

        match factory("k1").read_token(&pair.access_token) {
            Err(TokenError::IssuerMismatch { claims }) => {
                assert_eq!(claims.iss, "someone-else");
                assert_eq!(claims.sub, "mallory@example.com");
            }
            other => panic!("expected issuer mismatch, got {other:?}"),
        }
    }

    #[test]
    fn refresh_rejects_access_token() {
        let tf = factory("k1");
        let pair = tf.issue_pair("alice@example.com", &audience(), Map::new()).unwrap();
        let result = tf.refresh(&pair.access_token);
        assert!(matches!(
            result,
            Err(TokenError::WrongTokenType {
                expected: TokenType::Refresh,
                actual: TokenType::Access
            })
        ));
    }

    #[test]
    fn refresh_issues_later_expiring_access_token() {
        let tf = factory("k1");
        let issued = Utc::now() - Duration::seconds(30);
        let pair = tf
            .issue_pair_at("alice@example.com", &audience(), extra(), issued)
            .unwrap();
        let original = tf.read_token(&pair.access_token).unwrap();

        let renewed = tf.refresh(&pair.refresh_token).unwrap();
        let claims = tf.read_token(&renewed).unwrap();

        assert_eq!(claims.token_type, TokenType::Access);
        assert_eq!(claims.sub, original.sub);
        assert_eq!(claims.aud, original.aud);
        assert_eq!(claims.iat, original.iat);
        assert_eq!(claims.nbf, original.nbf);
        assert_eq!(claims.extra, original.extra);
        assert!(claims.exp > original.exp);
    }

    #[test]
    fn refresh_propagates_read_errors() {
        let tf = factory("k1");
        let pair = factory("k2").issue_pair("alice@example.com", &audience(), Map::new()).unwrap();
        assert!(matches!(tf.refresh(&pair.refresh_token), Err(TokenError::InvalidSignature)));
        assert!(matches!(tf.refresh("x.y"), Err(TokenError::MalformedToken)));
    }
}
