// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::{password, AccessControl, AuthorizationConfig, RuleError, TokenFactory, TotpEngine};
use crate::config::{AppConfig, BootstrapAdmin};
use crate::mailer::Mailer;
use crate::rbac::RbacResolver;
use crate::storage::{IdentityStore, Role, StoreError, User};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn IdentityStore>,
    pub tokens: Arc<TokenFactory>,
    pub access_control: Arc<AccessControl>,
    pub rbac: RbacResolver,
    pub totp: Arc<TotpEngine>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    /// Wire every component from the configuration. Fails when the rule
    /// table does not validate.
    pub fn new<S>(config: AppConfig, store: Arc<S>, mailer: Arc<dyn Mailer>) -> Result<Self, RuleError>
    where
        S: IdentityStore + 'static,
    {
        let tokens = Arc::new(TokenFactory::new(
            &config.token.sign_key,
            config.token.algorithm,
            config.token.issuer.clone(),
            config.token.access_age,
            config.token.refresh_age,
        ));
        let rules = AuthorizationConfig::with_default_rules(
            config.token.issuer.clone(),
            config.admin_role.clone(),
            config.user_role.clone(),
        )?;
        let access_control = Arc::new(AccessControl::new(rules, tokens.clone()));
        let totp = Arc::new(TotpEngine::new(
            config.totp.issuer.clone(),
            config.totp.step_seconds,
            config.totp.drift_steps,
            config.totp.recovery_codes,
        ));

        Ok(Self {
            config: Arc::new(config),
            rbac: RbacResolver::new(store.clone()),
            store,
            tokens,
            access_control,
            totp,
            mailer,
        })
    }

    /// True when the principal's effective roles include the admin role.
    pub fn is_admin(&self, user: &User) -> Result<bool, StoreError> {
        let roles = self.rbac.role_names_for(&user.id)?;
        Ok(roles.iter().any(|r| *r == self.config.admin_role))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Password(#[from] password::PasswordError),
}

/// Make sure the configured roles exist and, when a bootstrap admin is
/// configured and missing, create it enabled with the admin role.
pub fn bootstrap(state: &AppState) -> Result<(), BootstrapError> {
    let config = &state.config;
    let admin_role = ensure_role(state, &config.admin_role, "Administrators")?;
    ensure_role(state, &config.user_role, "Users")?;

    let Some(BootstrapAdmin { email, passphrase }) = &config.bootstrap_admin else {
        return Ok(());
    };

    match state.store.get_user_by_email(email) {
        Ok(_) => {
            tracing::debug!(email = %email, "Bootstrap admin already present");
            Ok(())
        }
        Err(StoreError::NotFound(_)) => {
            let hash = password::hash_passphrase(passphrase)?;
            let mut user = state.store.create_user(email, &hash)?;
            user.enabled = true;
            user.activation_code = None;
            state.store.save_user(&user)?;
            state.store.add_user_role(&user.id, &admin_role.id)?;
            tracing::warn!(email = %email, "Created bootstrap admin");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn ensure_role(state: &AppState, name: &str, description: &str) -> Result<Role, StoreError> {
    match state.store.get_role_by_name(name) {
        Err(StoreError::NotFound(_)) => {
            tracing::info!(role = %name, "Creating configured role");
            state.store.create_role(name, description)
        }
        other => other,
    }
}

/// Fully wired state over a throwaway database.
#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::auth::TokenPair;
    use crate::mailer::MemoryMailer;
    use crate::storage::{IdentityDatabase, RelationStore, RoleStore, UserStore};

    pub(crate) const PASSPHRASE: &str = "open sesame";

    pub(crate) struct TestContext {
        pub(crate) state: AppState,
        pub(crate) db: Arc<IdentityDatabase>,
        pub(crate) mailer: Arc<MemoryMailer>,
        _dir: tempfile::TempDir,
    }

    impl TestContext {
        pub(crate) fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let db = Arc::new(IdentityDatabase::open(&dir.path().join("test.redb")).unwrap());
            let mailer = Arc::new(MemoryMailer::default());
            let state = AppState::new(AppConfig::default(), db.clone(), mailer.clone()).unwrap();
            bootstrap(&state).unwrap();
            Self {
                state,
                db,
                mailer,
                _dir: dir,
            }
        }

        /// Enabled user holding the named role, if any.
        pub(crate) fn user(&self, email: &str, role: Option<&str>) -> User {
            let hash = password::hash_passphrase(PASSPHRASE).unwrap();
            let mut user = self.db.create_user(email, &hash).unwrap();
            user.enabled = true;
            self.db.save_user(&user).unwrap();
            if let Some(role) = role {
                let role = self.db.get_role_by_name(role).unwrap();
                self.db.add_user_role(&user.id, &role.id).unwrap();
            }
            user
        }

        pub(crate) fn admin(&self, email: &str) -> User {
            let role = self.state.config.admin_role.clone();
            self.user(email, Some(&role))
        }

        pub(crate) fn member(&self, email: &str) -> User {
            let role = self.state.config.user_role.clone();
            self.user(email, Some(&role))
        }

        pub(crate) fn tokens_for(&self, user: &User) -> TokenPair {
            let audience = self.state.rbac.role_names_for(&user.id).unwrap();
            self.state
                .tokens
                .issue_pair(&user.email, &audience, Default::default())
                .unwrap()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::TestContext;
    use super::*;
    use crate::auth::password::verify_passphrase;
    use crate::mailer::LogMailer;
    use crate::storage::{IdentityDatabase, RelationStore, RoleStore, UserStore};

    #[test]
    fn bootstrap_creates_roles_and_admin_once() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(IdentityDatabase::open(&dir.path().join("boot.redb")).unwrap());
        let config = AppConfig {
            bootstrap_admin: Some(BootstrapAdmin {
                email: "root@example.com".to_string(),
                passphrase: "changeme".to_string(),
            }),
            ..AppConfig::default()
        };
        let mailer = Arc::new(LogMailer::new(&config.mailer));
        let state = AppState::new(config, db.clone(), mailer).unwrap();

        bootstrap(&state).unwrap();
        bootstrap(&state).unwrap();

        let admin = db.get_user_by_email("root@example.com").unwrap();
        assert!(admin.may_sign_in());
        assert!(verify_passphrase("changeme", &admin.passphrase_hash).unwrap());
        assert!(state.is_admin(&admin).unwrap());
        assert!(db.get_role_by_name("user@sentinel").is_ok());
        assert_eq!(db.roles_of_user(&admin.id).unwrap().len(), 1);
    }

    #[test]
    fn member_is_not_admin() {
        let ctx = TestContext::new();
        let member = ctx.member("m@example.com");
        assert!(!ctx.state.is_admin(&member).unwrap());
        let admin = ctx.admin("a@example.com");
        assert!(ctx.state.is_admin(&admin).unwrap());
    }
}
