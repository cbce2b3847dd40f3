use crate::error::AppError;
use crate::sessions::SessionStore;
use crate::user_models::User;
use crate::user_storage::MetadataStore;
use anyhow::Context;
use std::sync::Arc;
use tracing::{info, warn};

pub const SESSION_COOKIE: &str = "filebox_session";

/// An authenticated user, resolved from a live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub email: String,
}

impl From<&User> for Identity {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id.clone(),
            email: user.email.clone(),
        }
    }
}

/// Per-request view of who is calling, independent of the web framework.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub session_token: Option<String>,
    pub identity: Option<Identity>,
}

impl RequestContext {
    pub fn anonymous() -> Self {
        Self::default()
    }
}

pub struct AuthGate {
    store: Arc<MetadataStore>,
    sessions: Arc<dyn SessionStore>,
    hash_cost: u32,
}

impl AuthGate {
    pub fn new(store: Arc<MetadataStore>, sessions: Arc<dyn SessionStore>, hash_cost: u32) -> Self {
        Self {
            store,
            sessions,
            hash_cost,
        }
    }

    /// Builds the request context for an optional session token. Expired
    /// sessions and sessions of vanished users yield no identity.
    pub async fn resolve(&self, token: Option<&str>) -> Result<RequestContext, AppError> {
        let Some(token) = token else {
            return Ok(RequestContext::anonymous());
        };

        let identity = match self.sessions.resolve(token).await {
            Some(user_id) => self.store.get_user(&user_id).await?.as_ref().map(Identity::from),
            None => None,
        };

        Ok(RequestContext {
            session_token: Some(token.to_string()),
            identity,
        })
    }

    pub fn require_auth(ctx: &RequestContext) -> Result<&Identity, AppError> {
        ctx.identity.as_ref().ok_or(AppError::Unauthorized)
    }

    /// Registers a new account and logs it in. Returns the identity and the
    /// new session token.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<(Identity, String), AppError> {
        let email = validate_credentials(email, password)?;

        if self.store.get_user_by_email(&email).await?.is_some() {
            return Err(AppError::DuplicateUser);
        }

        let password_hash =
            bcrypt::hash(password, self.hash_cost).context("Failed to hash password")?;
        let user = self
            .store
            .create_user(User::new(email, password_hash))
            .await?
            .ok_or(AppError::DuplicateUser)?;

        info!(user_id = %user.id, "user signed up");
        let token = self.sessions.create(&user.id).await;
        Ok((Identity::from(&user), token))
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<(Identity, String), AppError> {
        let email = validate_credentials(email, password)?;

        let Some(user) = self.store.get_user_by_email(&email).await? else {
            warn!("login for unknown email");
            return Err(AppError::InvalidCredentials);
        };

        let valid = bcrypt::verify(password, &user.password_hash)
            .context("Failed to verify password")?;
        if !valid {
            warn!(user_id = %user.id, "login with wrong password");
            return Err(AppError::InvalidCredentials);
        }

        info!(user_id = %user.id, "user logged in");
        let token = self.sessions.create(&user.id).await;
        Ok((Identity::from(&user), token))
    }

    /// Destroys the caller's session, if any.
    pub async fn logout(&self, ctx: &RequestContext) {
        if let Some(token) = &ctx.session_token {
            self.sessions.destroy(token).await;
            if let Some(identity) = &ctx.identity {
                info!(user_id = %identity.user_id, "user logged out");
            }
        }
    }
}

fn validate_credentials(email: &str, password: &str) -> Result<String, AppError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(AppError::InvalidInput("email cannot be empty".to_string()));
    }
    if password.is_empty() {
        return Err(AppError::InvalidInput("password cannot be empty".to_string()));
    }
    Ok(email.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::InMemorySessionStore;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    fn gate() -> (TempDir, AuthGate) {
        let dir = tempdir().expect("tempdir");
        let store = Arc::new(MetadataStore::open(dir.path()).expect("store"));
        let sessions = Arc::new(InMemorySessionStore::new(Duration::from_secs(60)));
        (dir, AuthGate::new(store, sessions, 4))
    }

    async fn context(gate: &AuthGate, token: &str) -> RequestContext {
        gate.resolve(Some(token)).await.expect("resolve")
    }

    #[tokio::test]
    async fn sign_up_logs_in_immediately() {
        let (_dir, gate) = gate();
        let (identity, token) = gate.sign_up("a@x.com", "p1").await.expect("sign up");

        let ctx = context(&gate, &token).await;
        assert_eq!(ctx.identity.as_ref(), Some(&identity));
        assert_eq!(identity.email, "a@x.com");
    }

    #[tokio::test]
    async fn duplicate_sign_up_is_rejected() {
        let (_dir, gate) = gate();
        gate.sign_up("a@x.com", "p1").await.expect("sign up");

        let err = gate.sign_up(" a@x.com ", "other").await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateUser));
    }

    #[tokio::test]
    async fn password_is_not_stored_in_plaintext() {
        let (dir, gate) = gate();
        gate.sign_up("a@x.com", "p1").await.expect("sign up");

        let raw = std::fs::read_to_string(dir.path().join("users.json")).unwrap();
        assert!(!raw.contains("\"p1\""));
    }

    #[tokio::test]
    async fn wrong_password_establishes_no_session() {
        let (_dir, gate) = gate();
        gate.sign_up("a@x.com", "p1").await.expect("sign up");

        let err = gate.login("a@x.com", "nope").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials));

        let err = gate.login("b@x.com", "p1").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials));

        let anonymous = gate.resolve(None).await.unwrap();
        assert!(matches!(
            AuthGate::require_auth(&anonymous),
            Err(AppError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn login_returns_fresh_session() {
        let (_dir, gate) = gate();
        let (_, first) = gate.sign_up("a@x.com", "p1").await.expect("sign up");
        let (identity, second) = gate.login("a@x.com", "p1").await.expect("login");

        assert_ne!(first, second);
        let ctx = context(&gate, &second).await;
        assert_eq!(AuthGate::require_auth(&ctx).unwrap(), &identity);
    }

    #[tokio::test]
    async fn logout_is_idempotent() {
        let (_dir, gate) = gate();
        let (_, token) = gate.sign_up("a@x.com", "p1").await.expect("sign up");

        let ctx = context(&gate, &token).await;
        gate.logout(&ctx).await;
        gate.logout(&ctx).await;
        gate.logout(&RequestContext::anonymous()).await;

        let ctx = context(&gate, &token).await;
        assert!(ctx.identity.is_none());
        assert!(AuthGate::require_auth(&ctx).is_err());
    }

    #[tokio::test]
    async fn empty_credentials_are_invalid_input() {
        let (_dir, gate) = gate();
        assert!(matches!(
            gate.sign_up("  ", "p1").await,
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            gate.login("a@x.com", "").await,
            Err(AppError::InvalidInput(_))
        ));
    }
}
