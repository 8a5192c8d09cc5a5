// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Outgoing mail.
//!
//! Sending is fire-and-forget: a failed delivery is logged by the mailer and
//! never fails the request that triggered it.

use std::collections::BTreeMap;

use crate::config::MailerConfig;

/// Parameters that hold one-time secrets and never reach the log.
const SECRET_PARAMS: &[&str] = &["activation_code"];

/// Templates the service knows how to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailTemplate {
    /// E-mail address verification, carries `activation_code`
    EmailVerify,
}

impl EmailTemplate {
    pub fn name(&self) -> &'static str {
        match self {
            EmailTemplate::EmailVerify => "EMAIL_VERIFY",
        }
    }
}

/// A templated message addressed to one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub template: EmailTemplate,
    pub params: BTreeMap<String, String>,
}

impl Email {
    /// Verification mail for a freshly assigned activation code.
    pub fn verify(to: &str, activation_code: &str) -> Self {
        Self {
            to: to.to_string(),
            template: EmailTemplate::EmailVerify,
            params: BTreeMap::from([
                ("email".to_string(), to.to_string()),
                ("activation_code".to_string(), activation_code.to_string()),
            ]),
        }
    }

    /// Parameters with secret values masked.
    pub fn redacted_params(&self) -> BTreeMap<&str, &str> {
        self.params
            .iter()
            .map(|(key, value)| {
                let shown = if SECRET_PARAMS.contains(&key.as_str()) {
                    "[redacted]"
                } else {
                    value.as_str()
                };
                (key.as_str(), shown)
            })
            .collect()
    }
}

pub trait Mailer: Send + Sync {
    fn send(&self, email: Email);
}

/// Writes every message to the log instead of delivering it.
pub struct LogMailer {
    from: String,
    from_name: String,
}

impl LogMailer {
    pub fn new(config: &MailerConfig) -> Self {
        Self {
            from: config.from.clone(),
            from_name: config.from_name.clone(),
        }
    }
}

impl Mailer for LogMailer {
    fn send(&self, email: Email) {
        tracing::info!(
            from = %self.from,
            from_name = %self.from_name,
            to = %email.to,
            template = email.template.name(),
            params = ?email.redacted_params(),
            "Mail queued"
        );
    }
}

/// Keeps sent messages in memory for assertions.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct MemoryMailer {
    pub(crate) sent: std::sync::Mutex<Vec<Email>>,
}

#[cfg(test)]
impl MemoryMailer {
    pub(crate) fn sent(&self) -> Vec<Email> {
        self.sent.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl Mailer for MemoryMailer {
    fn send(&self, email: Email) {
        self.sent.lock().unwrap().push(email);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_mail_carries_code() {
        let email = Email::verify("bob@example.com", "ABC123");
        assert_eq!(email.template.name(), "EMAIL_VERIFY");
        assert_eq!(email.params["activation_code"], "ABC123");
        assert_eq!(email.params["email"], "bob@example.com");
    }

    #[test]
    fn logged_params_hide_the_code() {
        let email = Email::verify("bob@example.com", "ABC123");
        let shown = email.redacted_params();
        assert_eq!(shown["activation_code"], "[redacted]");
        assert_eq!(shown["email"], "bob@example.com");
        assert!(!format!("{shown:?}").contains("ABC123"));
    }

    #[test]
    fn memory_mailer_records() {
        let mailer = MemoryMailer::default();
        mailer.send(Email::verify("a@b", "X"));
        assert_eq!(mailer.sent().len(), 1);
    }
}
