// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! TOTP second factor (RFC 6238) and recovery codes.
//!
//! Secrets are 20 random bytes kept base32 encoded (RFC 4648, no padding).
//! Codes are six digits over HMAC-SHA1. Verification accepts the current
//! step and up to `drift_steps` steps in the past, never future steps.

use std::collections::HashSet;
use std::io::Cursor;

use base32::Alphabet;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use image::{DynamicImage, ImageFormat, Luma};
use qrcode::QrCode;
use rand::{Rng, RngCore};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use subtle::{Choice, ConstantTimeEq};
use url::Url;

const SECRET_BYTES: usize = 20;
const DIGITS: u32 = 6;
const SECRET_ALPHABET: Alphabet = Alphabet::RFC4648 { padding: false };

/// Recovery code characters. No 0/O, 1/I/L.
const RECOVERY_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
const RECOVERY_GROUP: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum TotpError {
    #[error("no TOTP secret provisioned")]
    MissingSecret,

    #[error("TOTP secret is not valid base32")]
    InvalidSecret,

    #[error("step size must be positive")]
    InvalidStep,

    #[error("failed to build provisioning uri: {0}")]
    ProvisioningUri(#[from] url::ParseError),

    #[error("failed to render QR code: {0}")]
    QrCode(String),
}

/// TOTP policy plus provisioning label.
#[derive(Debug, Clone)]
pub struct TotpEngine {
    issuer: String,
    step_seconds: u64,
    drift_steps: u32,
    recovery_codes: usize,
}

impl TotpEngine {
    pub fn new(issuer: impl Into<String>, step_seconds: u64, drift_steps: u32, recovery_codes: usize) -> Self {
        Self {
            issuer: issuer.into(),
            step_seconds,
            drift_steps,
            recovery_codes,
        }
    }

    pub fn step_seconds(&self) -> u64 {
        self.step_seconds
    }

    pub fn drift_steps(&self) -> u32 {
        self.drift_steps
    }

    /// Fresh random secret, base32 encoded.
    pub fn generate_secret() -> String {
        let mut bytes = [0u8; SECRET_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        base32::encode(SECRET_ALPHABET, &bytes)
    }

    /// Code for the time step containing `at`.
    pub fn current_code(secret: &str, at: DateTime<Utc>, step_seconds: u64) -> Result<String, TotpError> {
        let key = decode_secret(secret)?;
        let counter = step_counter(at, step_seconds)?;
        code_for_counter(&key, counter)
    }

    /// Accept `submitted` if it matches the step containing `at` or one of the
    /// `drift_steps` steps before it.
    ///
    /// Every candidate is compared, in constant time, so the response time
    /// does not depend on which step matched.
    pub fn verify(
        secret: &str,
        submitted: &str,
        at: DateTime<Utc>,
        step_seconds: u64,
        drift_steps: u32,
    ) -> Result<bool, TotpError> {
        let key = decode_secret(secret)?;
        let counter = step_counter(at, step_seconds)?;
        let submitted = submitted.trim();
        if submitted.len() != DIGITS as usize {
            return Ok(false);
        }

        let mut matched = Choice::from(0);
        for back in 0..=u64::from(drift_steps) {
            let Some(candidate) = counter.checked_sub(back) else {
                break;
            };
            matched |= code_for_counter(&key, candidate)?.as_bytes().ct_eq(submitted.as_bytes());
        }
        Ok(matched.into())
    }

    /// Verify against the engine's own policy at the current time.
    pub fn verify_now(&self, secret: &str, submitted: &str) -> Result<bool, TotpError> {
        Self::verify(secret, submitted, Utc::now(), self.step_seconds, self.drift_steps)
    }

    /// `otpauth://totp/<issuer>:<email>?secret=..&issuer=..` for authenticator apps.
    pub fn provisioning_uri(&self, secret: &str, email: &str) -> Result<String, TotpError> {
        if secret.is_empty() {
            return Err(TotpError::MissingSecret);
        }
        let mut uri = Url::parse("otpauth://totp/")?;
        uri.set_path(&format!("/{}:{}", self.issuer, email));
        uri.query_pairs_mut()
            .append_pair("secret", secret)
            .append_pair("issuer", &self.issuer)
            .append_pair("algorithm", "SHA1")
            .append_pair("digits", &DIGITS.to_string())
            .append_pair("period", &self.step_seconds.to_string());
        Ok(uri.to_string())
    }

    /// Provisioning URI rendered as a PNG QR image.
    pub fn provisioning_png(&self, secret: &str, email: &str) -> Result<Vec<u8>, TotpError> {
        let uri = self.provisioning_uri(secret, email)?;
        let code = QrCode::new(uri.as_bytes()).map_err(|e| TotpError::QrCode(e.to_string()))?;
        let image = code.render::<Luma<u8>>().min_dimensions(256, 256).build();

        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(image)
            .write_to(&mut buffer, ImageFormat::Png)
            .map_err(|e| TotpError::QrCode(e.to_string()))?;
        Ok(buffer.into_inner())
    }

    /// A batch of the configured number of recovery codes.
    pub fn recovery_batch(&self) -> Vec<String> {
        generate_recovery_codes(self.recovery_codes)
    }
}

/// `n` distinct recovery codes formatted `XXXX-XXXX`.
pub fn generate_recovery_codes(n: usize) -> Vec<String> {
    let mut rng = rand::thread_rng();
    let mut seen = HashSet::with_capacity(n);
    let mut codes = Vec::with_capacity(n);

    while codes.len() < n {
        let raw: String = (0..RECOVERY_GROUP * 2)
            .map(|_| RECOVERY_ALPHABET[rng.gen_range(0..RECOVERY_ALPHABET.len())] as char)
            .collect();
        if seen.insert(raw.clone()) {
            codes.push(format!("{}-{}", &raw[..RECOVERY_GROUP], &raw[RECOVERY_GROUP..]));
        }
    }
    codes
}

/// Storage form of a recovery code: SHA-256 hex of the normalized code.
pub fn hash_recovery_code(code: &str) -> String {
    let normalized: String = code
        .chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .collect::<String>()
        .to_uppercase();
    Sha256::digest(normalized.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn decode_secret(secret: &str) -> Result<Vec<u8>, TotpError> {
    if secret.is_empty() {
        return Err(TotpError::MissingSecret);
    }
    base32::decode(SECRET_ALPHABET, secret.trim_end_matches('=')).ok_or(TotpError::InvalidSecret)
}

fn step_counter(at: DateTime<Utc>, step_seconds: u64) -> Result<u64, TotpError> {
    if step_seconds == 0 {
        return Err(TotpError::InvalidStep);
    }
    Ok(u64::try_from(at.timestamp()).unwrap_or(0) / step_seconds)
}

/// HOTP value for one counter (RFC 4226 dynamic truncation).
fn code_for_counter(key: &[u8], counter: u64) -> Result<String, TotpError> {
    let mut mac = <Hmac<Sha1> as Mac>::new_from_slice(key).map_err(|_| TotpError::InvalidSecret)?;
    mac.update(&counter.to_be_bytes());
    let hash = mac.finalize().into_bytes();

    let offset = (hash[hash.len() - 1] & 0x0f) as usize;
    let binary = (u32::from(hash[offset] & 0x7f) << 24)
        | (u32::from(hash[offset + 1]) << 16)
        | (u32::from(hash[offset + 2]) << 8)
        | u32::from(hash[offset + 3]);

    Ok(format!("{:0width$}", binary % 10u32.pow(DIGITS), width = DIGITS as usize))
}
