use crate::application::remote_sync::{NowProvider, TokenSource};
use crate::domain::models::{AuthSession, Identity};
use crate::infrastructure::credential_store::CredentialStore;
use crate::infrastructure::error::{AuthError, InfraError};
use crate::infrastructure::identity_client::{IdentityClient, IdentityTokens};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

pub const MIN_PASSWORD_LENGTH: usize = 6;
const TOKEN_REFRESH_SKEW_SECONDS: i64 = 60;

/// What the identity provider currently says about the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthNotice {
    /// No answer yet; the stored session has not been checked.
    Pending,
    SignedIn(Identity),
    SignedOut,
}

impl AuthNotice {
    /// `None` while pending, otherwise the notification the session machine consumes.
    pub fn as_notification(&self) -> Option<Option<Identity>> {
        match self {
            Self::Pending => None,
            Self::SignedIn(identity) => Some(Some(identity.clone())),
            Self::SignedOut => Some(None),
        }
    }
}

pub struct AuthService<S, I>
where
    S: CredentialStore,
    I: IdentityClient,
{
    credential_store: Arc<S>,
    identity_client: Arc<I>,
    now_provider: NowProvider,
    session: Mutex<Option<AuthSession>>,
    notices: watch::Sender<AuthNotice>,
}

impl<S, I> AuthService<S, I>
where
    S: CredentialStore,
    I: IdentityClient,
{
    pub fn new(credential_store: Arc<S>, identity_client: Arc<I>) -> Self {
        let (notices, _) = watch::channel(AuthNotice::Pending);
        Self {
            credential_store,
            identity_client,
            now_provider: Arc::new(Utc::now),
            session: Mutex::new(None),
            notices,
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn notifications(&self) -> watch::Receiver<AuthNotice> {
        self.notices.subscribe()
    }

    pub async fn current_identity(&self) -> Option<Identity> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|session| session.identity.clone())
    }

    /// Loads the stored session and publishes the first notice. A stored
    /// session whose refresh token is rejected counts as signed out.
    pub async fn restore(&self) -> Result<Option<Identity>, InfraError> {
        let stored = match self.credential_store.load_session() {
            Ok(stored) => stored,
            Err(error) => {
                self.publish(AuthNotice::SignedOut);
                return Err(error);
            }
        };
        let Some(stored) = stored else {
            self.publish(AuthNotice::SignedOut);
            return Ok(None);
        };

        let mut guard = self.session.lock().await;
        if stored.is_valid_at((self.now_provider)(), TOKEN_REFRESH_SKEW_SECONDS) {
            let identity = stored.identity.clone();
            *guard = Some(stored);
            drop(guard);
            self.publish(AuthNotice::SignedIn(identity.clone()));
            return Ok(Some(identity));
        }

        match self.refresh_session(&stored).await {
            Ok(session) => {
                let identity = session.identity.clone();
                *guard = Some(session);
                drop(guard);
                self.publish(AuthNotice::SignedIn(identity.clone()));
                Ok(Some(identity))
            }
            Err(InfraError::Auth(error)) => {
                tracing::info!(uid = %stored.identity.uid, %error, "stored session rejected");
                *guard = None;
                drop(guard);
                self.publish(AuthNotice::SignedOut);
                self.credential_store.delete_session()?;
                Ok(None)
            }
            Err(error) => {
                drop(guard);
                self.publish(AuthNotice::SignedOut);
                Err(error)
            }
        }
    }

    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Identity, InfraError> {
        validate_email(email)?;
        if password.is_empty() {
            return Err(InfraError::Validation("password must not be empty".to_string()));
        }
        let tokens = self
            .identity_client
            .sign_in_with_password(email, password)
            .await?;
        self.establish(tokens).await
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, InfraError> {
        validate_email(email)?;
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(InfraError::Validation(format!(
                "Password should be at least {MIN_PASSWORD_LENGTH} characters"
            )));
        }
        let tokens = self.identity_client.sign_up(email, password).await?;
        self.establish(tokens).await
    }

    pub async fn sign_in_with_idp(
        &self,
        provider_id: &str,
        provider_id_token: &str,
    ) -> Result<Identity, InfraError> {
        let tokens = self
            .identity_client
            .sign_in_with_idp(provider_id, provider_id_token)
            .await?;
        self.establish(tokens).await
    }

    pub async fn sign_out(&self) -> Result<(), InfraError> {
        *self.session.lock().await = None;
        let deleted = self.credential_store.delete_session();
        self.publish(AuthNotice::SignedOut);
        deleted
    }

    /// A currently valid id token, refreshed when it is close to expiry.
    pub async fn ensure_id_token(&self) -> Result<String, InfraError> {
        let mut guard = self.session.lock().await;
        let Some(current) = guard.clone() else {
            return Err(InfraError::Auth(AuthError::Other("Not signed in".to_string())));
        };
        if current.is_valid_at((self.now_provider)(), TOKEN_REFRESH_SKEW_SECONDS) {
            return Ok(current.id_token);
        }

        match self.refresh_session(&current).await {
            Ok(session) => {
                let id_token = session.id_token.clone();
                *guard = Some(session);
                Ok(id_token)
            }
            Err(InfraError::Auth(error)) => {
                tracing::info!(uid = %current.identity.uid, %error, "id token refresh rejected");
                *guard = None;
                drop(guard);
                self.publish(AuthNotice::SignedOut);
                self.credential_store.delete_session()?;
                Err(InfraError::Auth(AuthError::TokenExpired))
            }
            Err(error) => Err(error),
        }
    }

    async fn refresh_session(&self, current: &AuthSession) -> Result<AuthSession, InfraError> {
        if current.refresh_token.trim().is_empty() {
            return Err(InfraError::Auth(AuthError::TokenExpired));
        }
        let tokens = self.identity_client.refresh(&current.refresh_token).await?;
        let mut session = self.session_from_tokens(tokens);
        if session.identity.email.is_none() {
            session.identity.email = current.identity.email.clone();
        }
        if session.refresh_token.trim().is_empty() {
            session.refresh_token = current.refresh_token.clone();
        }
        self.credential_store.save_session(&session)?;
        tracing::debug!(uid = %session.identity.uid, "id token refreshed");
        Ok(session)
    }

    async fn establish(&self, tokens: IdentityTokens) -> Result<Identity, InfraError> {
        let session = self.session_from_tokens(tokens);
        self.credential_store.save_session(&session)?;
        let identity = session.identity.clone();
        *self.session.lock().await = Some(session);
        tracing::info!(uid = %identity.uid, "signed in");
        self.publish(AuthNotice::SignedIn(identity.clone()));
        Ok(identity)
    }

    fn session_from_tokens(&self, tokens: IdentityTokens) -> AuthSession {
        AuthSession {
            identity: tokens.identity,
            id_token: tokens.id_token,
            refresh_token: tokens.refresh_token,
            expires_at: (self.now_provider)() + Duration::seconds(tokens.expires_in.max(0)),
        }
    }

    fn publish(&self, notice: AuthNotice) {
        self.notices.send_replace(notice);
    }
}

#[async_trait]
impl<S, I> TokenSource for AuthService<S, I>
where
    S: CredentialStore,
    I: IdentityClient,
{
    async fn id_token(&self) -> Result<String, InfraError> {
        self.ensure_id_token().await
    }
}

fn validate_email(email: &str) -> Result<(), InfraError> {
    if email.trim().is_empty() {
        return Err(InfraError::Validation("email must not be empty".to_string()));
    }
    Ok(())
}
