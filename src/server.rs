use crate::application::remote_sync::RemoteSync;
use crate::infrastructure::error::{AuthError, InfraError};
use crate::infrastructure::firestore_client::TaskDocumentClient;
use crate::infrastructure::identity_client::IdentityClient;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;

const NO_TOKEN: &str = "Unauthorized - No token provided";
const TOKEN_EXPIRED: &str = "Token expired - Please login again";
const INVALID_TOKEN: &str = "Invalid authentication token";

pub struct ServerState<C, I>
where
    C: TaskDocumentClient + 'static,
    I: IdentityClient,
{
    pub remote: RemoteSync<C>,
    pub identity: Arc<I>,
    /// Bearer used for the unfiltered listing; the API key alone when absent.
    pub admin_token: Option<String>,
}

pub fn router<C, I>(state: Arc<ServerState<C, I>>) -> Router
where
    C: TaskDocumentClient + 'static,
    I: IdentityClient + 'static,
{
    Router::new()
        .route("/test-firebase", get(test_firebase::<C, I>))
        .route("/tasks", get(list_tasks::<C, I>))
        .with_state(state)
}

/// Connectivity probe: every task in the collection.
pub async fn test_firebase<C, I>(
    State(state): State<Arc<ServerState<C, I>>>,
) -> (StatusCode, Json<Value>)
where
    C: TaskDocumentClient + 'static,
    I: IdentityClient,
{
    match state.remote.list_all(state.admin_token.as_deref()).await {
        Ok(tasks) => {
            tracing::info!(count = tasks.len(), "test-firebase listed tasks");
            (StatusCode::OK, Json(json!({ "tasks": tasks })))
        }
        Err(error) => {
            tracing::error!(route = "/test-firebase", %error, "listing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": error.to_string() })),
            )
        }
    }
}

/// The caller's own tasks; requires `Authorization: Bearer <idToken>`.
pub async fn list_tasks<C, I>(
    State(state): State<Arc<ServerState<C, I>>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>)
where
    C: TaskDocumentClient + 'static,
    I: IdentityClient,
{
    let Some(id_token) = bearer_token(&headers) else {
        return unauthorized(NO_TOKEN);
    };

    let identity = match state.identity.lookup(id_token).await {
        Ok(identity) => identity,
        Err(InfraError::Auth(AuthError::TokenExpired)) => return unauthorized(TOKEN_EXPIRED),
        Err(error) => {
            tracing::warn!(route = "/tasks", %error, "token verification failed");
            return unauthorized(INVALID_TOKEN);
        }
    };

    match state.remote.fetch_all(id_token, &identity.uid).await {
        Ok(tasks) => (
            StatusCode::OK,
            Json(json!({ "success": true, "tasks": tasks })),
        ),
        Err(error) => {
            tracing::error!(route = "/tasks", uid = %identity.uid, %error, "task query failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": "Failed to load tasks" })),
            )
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn unauthorized(message: &str) -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "success": false, "error": message })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::remote_sync::RetryPolicy;
    use crate::domain::models::{Identity, Task, TaskDraft, TaskPatch, ViewId};
    use crate::infrastructure::firestore_client::InMemoryTaskDocumentClient;
    use crate::infrastructure::identity_client::IdentityTokens;
    use async_trait::async_trait;
    use axum::http::HeaderValue;
    use chrono::{DateTime, Utc};

    struct FakeIdentityClient;

    #[async_trait]
    impl IdentityClient for FakeIdentityClient {
        async fn sign_in_with_password(
            &self,
            _email: &str,
            _password: &str,
        ) -> Result<IdentityTokens, InfraError> {
            Err(InfraError::Auth(AuthError::Other("not used".to_string())))
        }

        async fn sign_up(&self, _email: &str, _password: &str) -> Result<IdentityTokens, InfraError> {
            Err(InfraError::Auth(AuthError::Other("not used".to_string())))
        }

        async fn sign_in_with_idp(
            &self,
            _provider_id: &str,
            _provider_id_token: &str,
        ) -> Result<IdentityTokens, InfraError> {
            Err(InfraError::Auth(AuthError::Other("not used".to_string())))
        }

        async fn refresh(&self, _refresh_token: &str) -> Result<IdentityTokens, InfraError> {
            Err(InfraError::Auth(AuthError::Other("not used".to_string())))
        }

        async fn lookup(&self, id_token: &str) -> Result<Identity, InfraError> {
            match id_token {
                "token-u1" => Ok(Identity {
                    uid: "u1".to_string(),
                    email: None,
                }),
                "expired" => Err(InfraError::Auth(AuthError::from_provider_code("TOKEN_EXPIRED"))),
                "revoked" => Err(InfraError::Auth(AuthError::from_provider_code("USER_DISABLED"))),
                _ => Err(InfraError::Auth(AuthError::from_provider_code("INVALID_ID_TOKEN"))),
            }
        }
    }

    struct BrokenClient;

    #[async_trait]
    impl TaskDocumentClient for BrokenClient {
        async fn query_tasks(&self, _id_token: &str, _user_id: &str) -> Result<Vec<Task>, InfraError> {
            Err(InfraError::RemoteUnavailable("firestore error: http 403".to_string()))
        }

        async fn list_all_tasks(&self, _bearer_token: Option<&str>) -> Result<Vec<Task>, InfraError> {
            Err(InfraError::RemoteUnavailable("firestore error: http 403".to_string()))
        }

        async fn create_task(
            &self,
            _id_token: &str,
            _draft: &TaskDraft,
            _now: DateTime<Utc>,
        ) -> Result<Task, InfraError> {
            Err(InfraError::RemoteUnavailable("firestore error: http 403".to_string()))
        }

        async fn update_task(
            &self,
            _id_token: &str,
            _task_id: &str,
            _patch: &TaskPatch,
            _now: DateTime<Utc>,
        ) -> Result<Task, InfraError> {
            Err(InfraError::RemoteUnavailable("firestore error: http 403".to_string()))
        }

        async fn delete_task(&self, _id_token: &str, _task_id: &str) -> Result<(), InfraError> {
            Err(InfraError::RemoteUnavailable("firestore error: http 403".to_string()))
        }
    }

    async fn seeded_state() -> Arc<ServerState<InMemoryTaskDocumentClient, FakeIdentityClient>> {
        let client = Arc::new(InMemoryTaskDocumentClient::default());
        for (title, owner) in [("Mine", "u1"), ("Theirs", "u2")] {
            client
                .create_task("t", &TaskDraft::for_view(title, &ViewId::All, owner), Utc::now())
                .await
                .expect("seed task");
        }
        Arc::new(ServerState {
            remote: RemoteSync::new(client),
            identity: Arc::new(FakeIdentityClient),
            admin_token: None,
        })
    }

    fn headers_with(authorization: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(authorization).expect("header value"),
        );
        headers
    }

    #[tokio::test]
    async fn test_firebase_lists_every_task() {
        let (status, Json(body)) = test_firebase(State(seeded_state().await)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tasks"].as_array().expect("tasks array").len(), 2);
    }

    #[tokio::test]
    async fn test_firebase_reports_store_failure() {
        let state = Arc::new(ServerState {
            remote: RemoteSync::new(Arc::new(BrokenClient)).with_retry_policy(RetryPolicy {
                max_attempts: 1,
                base_delay_ms: 1,
            }),
            identity: Arc::new(FakeIdentityClient),
            admin_token: None,
        });
        let (status, Json(body)) = test_firebase(State(state)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().expect("error message").contains("403"));
    }

    #[tokio::test]
    async fn tasks_route_requires_a_bearer_token() {
        let (status, Json(body)) = list_tasks(State(seeded_state().await), HeaderMap::new()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], NO_TOKEN);

        let (status, Json(body)) =
            list_tasks(State(seeded_state().await), headers_with("Basic abc")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], NO_TOKEN);
    }

    #[tokio::test]
    async fn tasks_route_distinguishes_expired_and_invalid_tokens() {
        let (status, Json(body)) =
            list_tasks(State(seeded_state().await), headers_with("Bearer expired")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], TOKEN_EXPIRED);

        for bearer in ["Bearer forged-garbage", "Bearer revoked"] {
            let (status, Json(body)) =
                list_tasks(State(seeded_state().await), headers_with(bearer)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert_eq!(body["error"], INVALID_TOKEN, "{bearer}");
            assert_eq!(body["success"], false);
        }
    }

    #[tokio::test]
    async fn tasks_route_returns_only_the_callers_tasks() {
        let (status, Json(body)) =
            list_tasks(State(seeded_state().await), headers_with("Bearer token-u1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        let tasks = body["tasks"].as_array().expect("tasks array");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0]["title"], "Mine");
        assert_eq!(tasks[0]["userId"], "u1");
    }
}
