use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("remote store unavailable: {0}")]
    RemoteUnavailable(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),
    #[error("credential store error: {0}")]
    Credential(String),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl InfraError {
    /// Network hiccups worth another attempt; everything else is final.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RemoteUnavailable(message) => {
                let message = message.to_ascii_lowercase();
                message.contains("network error")
                    || message.contains("timed out")
                    || message.contains("timeout")
                    || message.contains("http 429")
                    || message.contains("http 502")
                    || message.contains("http 503")
                    || message.contains("http 504")
                    || message.contains("connection reset")
            }
            _ => false,
        }
    }
}

/// Identity provider failures, as shown on the sign-in screen.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("wrong password")]
    WrongPassword,
    #[error("user not found")]
    UserNotFound,
    #[error("token expired")]
    TokenExpired,
    #[error("invalid token")]
    InvalidToken,
    #[error("{0}")]
    Other(String),
}

impl AuthError {
    pub fn from_provider_code(code: &str) -> Self {
        // Codes can carry a suffix, e.g. "WEAK_PASSWORD : Password should be ...".
        let code = code.split(':').next().unwrap_or(code).trim();
        match code {
            "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" => Self::WrongPassword,
            "EMAIL_NOT_FOUND" | "USER_NOT_FOUND" => Self::UserNotFound,
            "TOKEN_EXPIRED" | "INVALID_REFRESH_TOKEN" => Self::TokenExpired,
            "INVALID_ID_TOKEN" => Self::InvalidToken,
            "EMAIL_EXISTS" => Self::Other("Email already in use".to_string()),
            "WEAK_PASSWORD" => Self::Other("Password should be at least 6 characters".to_string()),
            "INVALID_EMAIL" => Self::Other("Invalid email address".to_string()),
            "USER_DISABLED" => Self::Other("This account has been disabled".to_string()),
            "TOO_MANY_ATTEMPTS_TRY_LATER" => {
                Self::Other("Too many attempts, try again later".to_string())
            }
            other => Self::Other(other.to_string()),
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::WrongPassword => "Incorrect password".to_string(),
            Self::UserNotFound => "User not found".to_string(),
            Self::TokenExpired => "Session expired - Please login again".to_string(),
            Self::InvalidToken => "Invalid session - Please login again".to_string(),
            Self::Other(message) => message.clone(),
        }
    }
}
