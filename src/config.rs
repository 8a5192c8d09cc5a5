// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values used
//! throughout the application. Configuration is loaded from the environment
//! once at startup into an [`AppConfig`].
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `DATA_DIR` | Directory holding the identity database | `./data` |
//! | `TOKEN_ISSUER` | Issuer claim of every token | `sentinel-iam` |
//! | `TOKEN_SIGN_KEY` | HMAC signing key | development key (logs a warning) |
//! | `TOKEN_SIGN_METHOD` | `HS256`, `HS384` or `HS512` | `HS256` |
//! | `TOKEN_ACCESS_AGE_MINUTES` | Access token lifetime | `5` |
//! | `TOKEN_REFRESH_AGE_HOURS` | Refresh token lifetime | `48` |
//! | `ROLE_ADMIN` | Role name granting administration | `admin@sentinel` |
//! | `ROLE_USER` | Role name granting self service | `user@sentinel` |
//! | `TOTP_ISSUER` | Label shown by authenticator apps | `Sentinel` |
//! | `TOTP_STEP_SECONDS` | TOTP time step | `30` |
//! | `TOTP_DRIFT_STEPS` | Past steps still accepted | `1` |
//! | `TOTP_RECOVERY_CODES` | Recovery codes per batch | `8` |
//! | `SETUP_ADMIN_EMAIL` | Bootstrap administrator e-mail | unset |
//! | `SETUP_ADMIN_PASSPHRASE` | Bootstrap administrator passphrase | unset |
//! | `MAILER_FROM` | Envelope sender address | `noreply@sentinel.local` |
//! | `MAILER_FROM_NAME` | Envelope sender name | `Sentinel` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::path::PathBuf;
use std::str::FromStr;

use crate::auth::token::{SigningAlgorithm, DEVELOPMENT_SIGN_KEY};

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";

/// Environment variable name for the data directory path.
///
/// The identity database lives at `{DATA_DIR}/identity.redb`.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

pub const TOKEN_ISSUER_ENV: &str = "TOKEN_ISSUER";
pub const TOKEN_SIGN_KEY_ENV: &str = "TOKEN_SIGN_KEY";
pub const TOKEN_SIGN_METHOD_ENV: &str = "TOKEN_SIGN_METHOD";
pub const TOKEN_ACCESS_AGE_ENV: &str = "TOKEN_ACCESS_AGE_MINUTES";
pub const TOKEN_REFRESH_AGE_ENV: &str = "TOKEN_REFRESH_AGE_HOURS";

pub const ROLE_ADMIN_ENV: &str = "ROLE_ADMIN";
pub const ROLE_USER_ENV: &str = "ROLE_USER";

pub const TOTP_ISSUER_ENV: &str = "TOTP_ISSUER";
pub const TOTP_STEP_ENV: &str = "TOTP_STEP_SECONDS";
pub const TOTP_DRIFT_ENV: &str = "TOTP_DRIFT_STEPS";
pub const TOTP_RECOVERY_CODES_ENV: &str = "TOTP_RECOVERY_CODES";

pub const SETUP_ADMIN_EMAIL_ENV: &str = "SETUP_ADMIN_EMAIL";
pub const SETUP_ADMIN_PASSPHRASE_ENV: &str = "SETUP_ADMIN_PASSPHRASE";

pub const MAILER_FROM_ENV: &str = "MAILER_FROM";
pub const MAILER_FROM_NAME_ENV: &str = "MAILER_FROM_NAME";

/// Environment variable selecting `json` or `pretty` log output.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

/// Name of the database file inside the data directory.
pub const DATABASE_FILE: &str = "identity.redb";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} has an invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} is set but {1} is not")]
    Incomplete(&'static str, &'static str),
}

/// Token lifetimes and signing.
#[derive(Clone)]
pub struct TokenConfig {
    pub issuer: String,
    pub sign_key: String,
    pub algorithm: SigningAlgorithm,
    pub access_age: chrono::Duration,
    pub refresh_age: chrono::Duration,
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("issuer", &self.issuer)
            .field("algorithm", &self.algorithm)
            .field("access_age", &self.access_age)
            .field("refresh_age", &self.refresh_age)
            .finish_non_exhaustive()
    }
}

/// TOTP policy.
#[derive(Debug, Clone)]
pub struct TotpConfig {
    pub issuer: String,
    pub step_seconds: u64,
    pub drift_steps: u32,
    pub recovery_codes: usize,
}

/// Administrator created at startup when missing.
#[derive(Clone)]
pub struct BootstrapAdmin {
    pub email: String,
    pub passphrase: String,
}

impl std::fmt::Debug for BootstrapAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapAdmin")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Envelope sender for outgoing mail.
#[derive(Debug, Clone)]
pub struct MailerConfig {
    pub from: String,
    pub from_name: String,
}

/// Whole process configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub token: TokenConfig,
    pub admin_role: String,
    pub user_role: String,
    pub totp: TotpConfig,
    pub bootstrap_admin: Option<BootstrapAdmin>,
    pub mailer: MailerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            token: TokenConfig {
                issuer: "sentinel-iam".to_string(),
                sign_key: DEVELOPMENT_SIGN_KEY.to_string(),
                algorithm: SigningAlgorithm::Hs256,
                access_age: chrono::Duration::minutes(5),
                refresh_age: chrono::Duration::hours(48),
            },
            admin_role: "admin@sentinel".to_string(),
            user_role: "user@sentinel".to_string(),
            totp: TotpConfig {
                issuer: "Sentinel".to_string(),
                step_seconds: 30,
                drift_steps: 1,
                recovery_codes: 8,
            },
            bootstrap_admin: None,
            mailer: MailerConfig {
                from: "noreply@sentinel.local".to_string(),
                from_name: "Sentinel".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from any key lookup; unset or empty keys take their default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let access_minutes: i64 = parse_or(&get, TOKEN_ACCESS_AGE_ENV, 5)?;
        let refresh_hours: i64 = parse_or(&get, TOKEN_REFRESH_AGE_ENV, 48)?;
        if access_minutes <= 0 {
            return Err(invalid(TOKEN_ACCESS_AGE_ENV, access_minutes, "must be positive"));
        }
        if refresh_hours <= 0 {
            return Err(invalid(TOKEN_REFRESH_AGE_ENV, refresh_hours, "must be positive"));
        }

        let step_seconds: u64 = parse_or(&get, TOTP_STEP_ENV, defaults.totp.step_seconds)?;
        if step_seconds == 0 {
            return Err(invalid(TOTP_STEP_ENV, step_seconds, "must be positive"));
        }

        let bootstrap_admin = match (get(SETUP_ADMIN_EMAIL_ENV), get(SETUP_ADMIN_PASSPHRASE_ENV)) {
            (Some(email), Some(passphrase)) => Some(BootstrapAdmin { email, passphrase }),
            (None, None) => None,
            (Some(_), None) => {
                return Err(ConfigError::Incomplete(SETUP_ADMIN_EMAIL_ENV, SETUP_ADMIN_PASSPHRASE_ENV))
            }
            (None, Some(_)) => {
                return Err(ConfigError::Incomplete(SETUP_ADMIN_PASSPHRASE_ENV, SETUP_ADMIN_EMAIL_ENV))
            }
        };

        Ok(Self {
            host: get(HOST_ENV).unwrap_or(defaults.host),
            port: parse_or(&get, PORT_ENV, defaults.port)?,
            data_dir: get(DATA_DIR_ENV).map(PathBuf::from).unwrap_or(defaults.data_dir),
            token: TokenConfig {
                issuer: get(TOKEN_ISSUER_ENV).unwrap_or(defaults.token.issuer),
                sign_key: get(TOKEN_SIGN_KEY_ENV).unwrap_or(defaults.token.sign_key),
                algorithm: get(TOKEN_SIGN_METHOD_ENV)
                    .map(|m| SigningAlgorithm::from_config(&m))
                    .unwrap_or(defaults.token.algorithm),
                access_age: chrono::Duration::minutes(access_minutes),
                refresh_age: chrono::Duration::hours(refresh_hours),
            },
            admin_role: get(ROLE_ADMIN_ENV).unwrap_or(defaults.admin_role),
            user_role: get(ROLE_USER_ENV).unwrap_or(defaults.user_role),
            totp: TotpConfig {
                issuer: get(TOTP_ISSUER_ENV).unwrap_or(defaults.totp.issuer),
                step_seconds,
                drift_steps: parse_or(&get, TOTP_DRIFT_ENV, defaults.totp.drift_steps)?,
                recovery_codes: parse_or(&get, TOTP_RECOVERY_CODES_ENV, defaults.totp.recovery_codes)?,
            },
            bootstrap_admin,
            mailer: MailerConfig {
                from: get(MAILER_FROM_ENV).unwrap_or(defaults.mailer.from),
                from_name: get(MAILER_FROM_NAME_ENV).unwrap_or(defaults.mailer.from_name),
            },
        })
    }

    /// Path of the identity database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T, G>(get: &G, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            value: raw,
            reason: e.to_string(),
        }),
    }
}

fn invalid(name: &'static str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
