use tracing::{info, warn};
use ulid::Ulid;

use crate::auth;
use crate::model::*;
use crate::store::StoreError;

use super::conflict::now;
use super::{validate, Engine, EngineError, EngineResult};

const BAD_CREDENTIALS: &str = "invalid email or password";

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl Engine {
    /// Register an account with the given role. Emails are unique, case-insensitively.
    pub async fn register(&self, name: &str, email: &str, password: &str, role: Role) -> EngineResult<User> {
        let account = NewAccount {
            name: name.trim().to_string(),
            email: normalize_email(email),
            password: password.to_string(),
        };
        validate::fields(&account)?;

        let password_hash = auth::hash_password(&account.password, self.hash_cost).await?;
        let user = User {
            id: Ulid::new(),
            name: account.name,
            email: account.email,
            password_hash,
            role,
            created_at: now(),
        };

        retry_serializable!("register", self.try_insert_user(&user).await)?;
        info!("user {} registered ({})", user.id, user.role);
        Ok(user)
    }

    async fn try_insert_user(&self, user: &User) -> EngineResult<()> {
        let mut tx = self.tx().await?;
        if tx.user_by_email(&user.email).await?.is_some() {
            return Err(EngineError::DuplicateEmail(user.email.clone()));
        }
        match tx.insert_user(user).await {
            Err(StoreError::Duplicate(_)) => return Err(EngineError::DuplicateEmail(user.email.clone())),
            other => other?,
        }
        tx.commit().await?;
        Ok(())
    }

    /// Check credentials. Unknown email and wrong password fail the same way.
    pub async fn login(&self, email: &str, password: &str) -> EngineResult<User> {
        let email = normalize_email(email);
        let mut tx = self.tx().await?;
        let Some(user) = tx.user_by_email(&email).await? else {
            warn!("login failed: unknown email");
            return Err(EngineError::Unauthorized(BAD_CREDENTIALS));
        };
        drop(tx);
        if !auth::verify_password(password, &user.password_hash).await? {
            warn!("login failed for user {}", user.id);
            return Err(EngineError::Unauthorized(BAD_CREDENTIALS));
        }
        Ok(user)
    }

    pub async fn user(&self, user_id: Ulid) -> EngineResult<User> {
        let mut tx = self.tx().await?;
        tx.user(user_id).await?.ok_or(EngineError::NotFound("user", user_id))
    }

    /// Make sure an admin account exists for `email`. An existing account is
    /// left as it is.
    pub async fn ensure_admin(&self, name: &str, email: &str, password: &str) -> EngineResult<User> {
        let normalized = normalize_email(email);
        {
            let mut tx = self.tx().await?;
            if let Some(existing) = tx.user_by_email(&normalized).await? {
                if existing.role != Role::Admin {
                    warn!("seed admin {} exists with role {}", existing.id, existing.role);
                }
                return Ok(existing);
            }
        }
        match self.register(name, email, password, Role::Admin).await {
            Err(EngineError::DuplicateEmail(_)) => {
                let mut tx = self.tx().await?;
                tx.user_by_email(&normalized)
                    .await?
                    .ok_or_else(|| EngineError::Internal(format!("seed admin {normalized} vanished")))
            }
            other => other,
        }
    }
}
