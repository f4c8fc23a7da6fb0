use crate::domain::models::Identity;
use crate::infrastructure::error::{AuthError, InfraError};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use url::Url;

pub const IDENTITY_API_BASE: &str = "https://identitytoolkit.googleapis.com/v1/";
pub const SECURE_TOKEN_API_BASE: &str = "https://securetoken.googleapis.com/v1/";
const IDP_REQUEST_URI: &str = "http://localhost";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityConfig {
    pub api_key: String,
    pub identity_base: String,
    pub token_base: String,
}

impl IdentityConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            identity_base: IDENTITY_API_BASE.to_string(),
            token_base: SECURE_TOKEN_API_BASE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityTokens {
    pub identity: Identity,
    pub id_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

#[async_trait]
pub trait IdentityClient: Send + Sync {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<IdentityTokens, InfraError>;

    async fn sign_up(&self, email: &str, password: &str) -> Result<IdentityTokens, InfraError>;

    /// Exchanges a federated provider credential (e.g. a Google id token).
    async fn sign_in_with_idp(
        &self,
        provider_id: &str,
        provider_id_token: &str,
    ) -> Result<IdentityTokens, InfraError>;

    async fn refresh(&self, refresh_token: &str) -> Result<IdentityTokens, InfraError>;

    /// Resolves the account an id token belongs to.
    async fn lookup(&self, id_token: &str) -> Result<Identity, InfraError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestIdentityClient {
    client: Client,
    config: IdentityConfig,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInPayload {
    local_id: String,
    email: Option<String>,
    id_token: String,
    refresh_token: String,
    expires_in: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct RefreshPayload {
    user_id: String,
    id_token: String,
    refresh_token: String,
    expires_in: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    local_id: String,
    email: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct LookupPayload {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Debug, serde::Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, serde::Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl ReqwestIdentityClient {
    pub fn new(config: IdentityConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn ensure_non_empty(value: &str, field: &str) -> Result<(), InfraError> {
        if value.trim().is_empty() {
            return Err(InfraError::Validation(format!("{field} must not be empty")));
        }
        Ok(())
    }

    fn endpoint(&self, base: &str, method: &str) -> Result<Url, InfraError> {
        let mut url = Url::parse(base).map_err(|error| {
            InfraError::InvalidConfig(format!("invalid identity api base url: {error}"))
        })?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                InfraError::InvalidConfig("identity api base URL cannot be a base".to_string())
            })?;
            segments.pop_if_empty();
            segments.push(method);
        }
        url.query_pairs_mut().append_pair("key", &self.config.api_key);
        Ok(url)
    }

    fn expires_in(raw: Option<&str>) -> i64 {
        raw.and_then(|value| value.trim().parse::<i64>().ok())
            .unwrap_or(0)
            .max(0)
    }

    fn provider_error(status: reqwest::StatusCode, body: &str) -> InfraError {
        match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(ErrorEnvelope {
                error: ErrorBody {
                    message: Some(code),
                },
            }) => InfraError::Auth(AuthError::from_provider_code(&code)),
            _ if status.is_server_error() || status.as_u16() == 429 => {
                InfraError::RemoteUnavailable(format!("identity error: http {}", status.as_u16()))
            }
            _ => InfraError::Auth(AuthError::Other(format!(
                "identity error: http {}",
                status.as_u16()
            ))),
        }
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: Url,
        body: serde_json::Value,
        action: &str,
    ) -> Result<T, InfraError> {
        let response = self
            .client
            .post(endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|error| {
                InfraError::RemoteUnavailable(format!("network error during {action}: {error}"))
            })?;
        Self::parse_response(response, action).await
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        action: &str,
    ) -> Result<T, InfraError> {
        let status = response.status();
        let body = response.text().await.map_err(|error| {
            InfraError::RemoteUnavailable(format!("failed reading {action} response: {error}"))
        })?;
        if !status.is_success() {
            return Err(Self::provider_error(status, &body));
        }
        serde_json::from_str::<T>(&body).map_err(|error| {
            InfraError::RemoteUnavailable(format!("invalid {action} payload: {error}; body={body}"))
        })
    }

    fn into_tokens(payload: SignInPayload) -> IdentityTokens {
        IdentityTokens {
            identity: Identity {
                uid: payload.local_id,
                email: payload.email,
            },
            id_token: payload.id_token,
            refresh_token: payload.refresh_token,
            expires_in: Self::expires_in(payload.expires_in.as_deref()),
        }
    }

    async fn password_grant(
        &self,
        method: &str,
        email: &str,
        password: &str,
    ) -> Result<IdentityTokens, InfraError> {
        Self::ensure_non_empty(email, "email")?;
        Self::ensure_non_empty(password, "password")?;
        let endpoint = self.endpoint(&self.config.identity_base, method)?;
        let payload: SignInPayload = self
            .post_json(
                endpoint,
                json!({
                    "email": email.trim(),
                    "password": password,
                    "returnSecureToken": true,
                }),
                method,
            )
            .await?;
        Ok(Self::into_tokens(payload))
    }
}

#[async_trait]
impl IdentityClient for ReqwestIdentityClient {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<IdentityTokens, InfraError> {
        self.password_grant("accounts:signInWithPassword", email, password)
            .await
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<IdentityTokens, InfraError> {
        self.password_grant("accounts:signUp", email, password).await
    }

    async fn sign_in_with_idp(
        &self,
        provider_id: &str,
        provider_id_token: &str,
    ) -> Result<IdentityTokens, InfraError> {
        Self::ensure_non_empty(provider_id, "provider id")?;
        Self::ensure_non_empty(provider_id_token, "provider id token")?;

        let post_body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("id_token", provider_id_token.trim())
            .append_pair("providerId", provider_id.trim())
            .finish();
        let endpoint = self.endpoint(&self.config.identity_base, "accounts:signInWithIdp")?;
        let payload: SignInPayload = self
            .post_json(
                endpoint,
                json!({
                    "postBody": post_body,
                    "requestUri": IDP_REQUEST_URI,
                    "returnSecureToken": true,
                    "returnIdpCredential": true,
                }),
                "accounts:signInWithIdp",
            )
            .await?;
        Ok(Self::into_tokens(payload))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<IdentityTokens, InfraError> {
        Self::ensure_non_empty(refresh_token, "refresh token")?;
        let endpoint = self.endpoint(&self.config.token_base, "token")?;
        let response = self
            .client
            .post(endpoint)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.trim()),
            ])
            .send()
            .await
            .map_err(|error| {
                InfraError::RemoteUnavailable(format!("network error during token refresh: {error}"))
            })?;
        let payload: RefreshPayload = Self::parse_response(response, "token refresh").await?;

        Ok(IdentityTokens {
            identity: Identity {
                uid: payload.user_id,
                email: None,
            },
            id_token: payload.id_token,
            refresh_token: payload.refresh_token,
            expires_in: Self::expires_in(payload.expires_in.as_deref()),
        })
    }

    async fn lookup(&self, id_token: &str) -> Result<Identity, InfraError> {
        Self::ensure_non_empty(id_token, "id token")?;
        let endpoint = self.endpoint(&self.config.identity_base, "accounts:lookup")?;
        let payload: LookupPayload = self
            .post_json(endpoint, json!({ "idToken": id_token.trim() }), "accounts:lookup")
            .await?;
        payload
            .users
            .into_iter()
            .next()
            .map(|user| Identity {
                uid: user.local_id,
                email: user.email,
            })
            .ok_or_else(|| InfraError::Auth(AuthError::UserNotFound))
    }
}
