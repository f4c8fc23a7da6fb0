use crate::domain::models::AuthSession;
use crate::infrastructure::error::InfraError;
use std::sync::Mutex;

pub const KEYRING_SERVICE: &str = "todo-sync.auth";
pub const KEYRING_ACCOUNT: &str = "default";

/// Where the signed-in session survives restarts.
pub trait CredentialStore: Send + Sync {
    fn save_session(&self, session: &AuthSession) -> Result<(), InfraError>;
    fn load_session(&self) -> Result<Option<AuthSession>, InfraError>;
    fn delete_session(&self) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct KeyringCredentialStore {
    service_name: String,
    account_name: String,
}

impl KeyringCredentialStore {
    pub fn new(service_name: impl Into<String>, account_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            account_name: account_name.into(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry, InfraError> {
        keyring::Entry::new(&self.service_name, &self.account_name)
            .map_err(|error| InfraError::Credential(error.to_string()))
    }
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new(KEYRING_SERVICE, KEYRING_ACCOUNT)
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn save_session(&self, session: &AuthSession) -> Result<(), InfraError> {
        let payload = serde_json::to_string(session)
            .map_err(|error| InfraError::Credential(error.to_string()))?;
        self.entry()?
            .set_password(&payload)
            .map_err(|error| InfraError::Credential(error.to_string()))
    }

    fn load_session(&self) -> Result<Option<AuthSession>, InfraError> {
        let payload = match self.entry()?.get_password() {
            Ok(value) => value,
            Err(keyring::Error::NoEntry) => return Ok(None),
            Err(error) => return Err(InfraError::Credential(error.to_string())),
        };

        // A payload from an older build is treated as signed out.
        match serde_json::from_str::<AuthSession>(&payload) {
            Ok(session) => Ok(Some(session)),
            Err(error) => {
                tracing::warn!(%error, "discarding unreadable stored session");
                Ok(None)
            }
        }
    }

    fn delete_session(&self) -> Result<(), InfraError> {
        match self.entry()?.delete_credential() {
            Ok(_) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(InfraError::Credential(error.to_string())),
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    session: Mutex<Option<AuthSession>>,
}

impl InMemoryCredentialStore {
    pub fn with_session(session: AuthSession) -> Self {
        Self {
            session: Mutex::new(Some(session)),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<AuthSession>>, InfraError> {
        self.session
            .lock()
            .map_err(|error| InfraError::Credential(format!("in-memory lock poisoned: {error}")))
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn save_session(&self, session: &AuthSession) -> Result<(), InfraError> {
        *self.lock()? = Some(session.clone());
        Ok(())
    }

    fn load_session(&self) -> Result<Option<AuthSession>, InfraError> {
        Ok(self.lock()?.clone())
    }

    fn delete_session(&self) -> Result<(), InfraError> {
        *self.lock()? = None;
        Ok(())
    }
}
