use crate::domain::models::{Task, TaskDraft, TaskPatch};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::task_document::{
    decode_task_document, encode_draft_fields, encode_patch_fields, owner_query,
    FirestoreDocument, TASKS_COLLECTION,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::watch;
use url::Url;

pub const FIRESTORE_API_BASE: &str = "https://firestore.googleapis.com/v1/";
pub const DEFAULT_DATABASE_ID: &str = "(default)";
const LIST_PAGE_SIZE: &str = "300";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirestoreConfig {
    pub project_id: String,
    pub database_id: String,
    pub api_key: String,
    pub api_base: String,
}

impl FirestoreConfig {
    pub fn new(project_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            database_id: DEFAULT_DATABASE_ID.to_string(),
            api_key: api_key.into(),
            api_base: FIRESTORE_API_BASE.to_string(),
        }
    }
}

/// Access to the `tasks` collection of the remote document store.
#[async_trait]
pub trait TaskDocumentClient: Send + Sync {
    async fn query_tasks(&self, id_token: &str, user_id: &str) -> Result<Vec<Task>, InfraError>;

    /// Every task in the collection, regardless of owner.
    async fn list_all_tasks(&self, bearer_token: Option<&str>) -> Result<Vec<Task>, InfraError>;

    async fn create_task(
        &self,
        id_token: &str,
        draft: &TaskDraft,
        now: DateTime<Utc>,
    ) -> Result<Task, InfraError>;

    async fn update_task(
        &self,
        id_token: &str,
        task_id: &str,
        patch: &TaskPatch,
        now: DateTime<Utc>,
    ) -> Result<Task, InfraError>;

    async fn delete_task(&self, id_token: &str, task_id: &str) -> Result<(), InfraError>;

    /// Push notifications of collection changes, when the backend offers them.
    /// Subscribers fall back to re-querying on an interval otherwise.
    fn change_notifications(&self) -> Option<watch::Receiver<u64>> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct ReqwestFirestoreClient {
    client: Client,
    config: FirestoreConfig,
}

#[derive(Debug, serde::Deserialize)]
struct ListDocumentsResponse {
    #[serde(default)]
    documents: Vec<FirestoreDocument>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct RunQueryEntry {
    document: Option<FirestoreDocument>,
}

#[derive(Debug, serde::Serialize)]
struct WriteDocumentRequest<'a> {
    fields: &'a serde_json::Map<String, Value>,
}

impl ReqwestFirestoreClient {
    pub fn new(config: FirestoreConfig) -> Self {
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

    fn http_error(status: reqwest::StatusCode, body: &str, target: &str) -> InfraError {
        if status == reqwest::StatusCode::NOT_FOUND {
            return InfraError::NotFound(target.to_string());
        }
        if body.trim().is_empty() {
            InfraError::RemoteUnavailable(format!("firestore error: http {}", status.as_u16()))
        } else {
            InfraError::RemoteUnavailable(format!(
                "firestore error: http {}; body={body}",
                status.as_u16()
            ))
        }
    }

    fn documents_endpoint(&self, trailing: &[&str]) -> Result<Url, InfraError> {
        let mut url = Url::parse(&self.config.api_base).map_err(|error| {
            InfraError::InvalidConfig(format!("invalid firestore api base url: {error}"))
        })?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                InfraError::InvalidConfig("firestore api base URL cannot be a base".to_string())
            })?;
            segments.pop_if_empty();
            segments.push("projects");
            segments.push(&self.config.project_id);
            segments.push("databases");
            segments.push(&self.config.database_id);
            for segment in trailing {
                segments.push(segment);
            }
        }
        url.query_pairs_mut().append_pair("key", &self.config.api_key);
        Ok(url)
    }

    fn authorized(
        &self,
        request: reqwest::RequestBuilder,
        bearer_token: Option<&str>,
    ) -> reqwest::RequestBuilder {
        match bearer_token.map(str::trim).filter(|token| !token.is_empty()) {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn read_body(
        response: reqwest::Response,
        action: &str,
    ) -> Result<(reqwest::StatusCode, String), InfraError> {
        let status = response.status();
        let body = response.text().await.map_err(|error| {
            InfraError::RemoteUnavailable(format!("failed reading {action} response: {error}"))
        })?;
        Ok((status, body))
    }

    fn decode_documents(documents: Vec<FirestoreDocument>) -> Vec<Task> {
        documents
            .iter()
            .filter_map(|document| match decode_task_document(document) {
                Ok(task) => task,
                Err(error) => {
                    tracing::warn!(
                        document = document.name.as_deref().unwrap_or_default(),
                        %error,
                        "skipping undecodable task document"
                    );
                    None
                }
            })
            .collect()
    }
}

#[async_trait]
impl TaskDocumentClient for ReqwestFirestoreClient {
    async fn query_tasks(&self, id_token: &str, user_id: &str) -> Result<Vec<Task>, InfraError> {
        Self::ensure_non_empty(user_id, "user id")?;

        let endpoint = self.documents_endpoint(&["documents:runQuery"])?;
        let response = self
            .authorized(self.client.post(endpoint), Some(id_token))
            .json(&owner_query(user_id))
            .send()
            .await
            .map_err(|error| {
                InfraError::RemoteUnavailable(format!("network error while querying tasks: {error}"))
            })?;

        let (status, body) = Self::read_body(response, "task query").await?;
        if !status.is_success() {
            return Err(Self::http_error(status, &body, TASKS_COLLECTION));
        }

        let entries: Vec<RunQueryEntry> = serde_json::from_str(&body).map_err(|error| {
            InfraError::RemoteUnavailable(format!("invalid task query payload: {error}; body={body}"))
        })?;
        let documents = entries.into_iter().filter_map(|entry| entry.document).collect();
        Ok(Self::decode_documents(documents)
            .into_iter()
            .filter(|task| task.user_id == user_id)
            .collect())
    }

    async fn list_all_tasks(&self, bearer_token: Option<&str>) -> Result<Vec<Task>, InfraError> {
        let endpoint = self.documents_endpoint(&["documents", TASKS_COLLECTION])?;
        let mut page_token: Option<String> = None;
        let mut documents = Vec::new();

        loop {
            let mut request = self
                .authorized(self.client.get(endpoint.clone()), bearer_token)
                .query(&[("pageSize", LIST_PAGE_SIZE)]);
            if let Some(page_token) = page_token.as_deref() {
                request = request.query(&[("pageToken", page_token)]);
            }

            let response = request.send().await.map_err(|error| {
                InfraError::RemoteUnavailable(format!("network error while listing tasks: {error}"))
            })?;
            let (status, body) = Self::read_body(response, "task list").await?;
            if !status.is_success() {
                return Err(Self::http_error(status, &body, TASKS_COLLECTION));
            }

            let mut parsed: ListDocumentsResponse = serde_json::from_str(&body).map_err(|error| {
                InfraError::RemoteUnavailable(format!("invalid task list payload: {error}; body={body}"))
            })?;
            documents.append(&mut parsed.documents);

            match parsed.next_page_token.take().filter(|token| !token.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        Ok(Self::decode_documents(documents))
    }

    async fn create_task(
        &self,
        id_token: &str,
        draft: &TaskDraft,
        now: DateTime<Utc>,
    ) -> Result<Task, InfraError> {
        let endpoint = self.documents_endpoint(&["documents", TASKS_COLLECTION])?;
        let fields = encode_draft_fields(draft, now);
        let response = self
            .authorized(self.client.post(endpoint), Some(id_token))
            .json(&WriteDocumentRequest { fields: &fields })
            .send()
            .await
            .map_err(|error| {
                InfraError::RemoteUnavailable(format!("network error while creating task: {error}"))
            })?;

        let (status, body) = Self::read_body(response, "task create").await?;
        if !status.is_success() {
            return Err(Self::http_error(status, &body, TASKS_COLLECTION));
        }

        let document: FirestoreDocument = serde_json::from_str(&body).map_err(|error| {
            InfraError::RemoteUnavailable(format!("invalid task create payload: {error}; body={body}"))
        })?;
        decode_task_document(&document)?.ok_or_else(|| {
            InfraError::RemoteUnavailable("task create response did not include a document id".to_string())
        })
    }

    async fn update_task(
        &self,
        id_token: &str,
        task_id: &str,
        patch: &TaskPatch,
        now: DateTime<Utc>,
    ) -> Result<Task, InfraError> {
        Self::ensure_non_empty(task_id, "task id")?;

        let (fields, mask) = encode_patch_fields(patch, now);
        let mut endpoint = self.documents_endpoint(&["documents", TASKS_COLLECTION, task_id])?;
        {
            let mut query = endpoint.query_pairs_mut();
            for field_path in &mask {
                query.append_pair("updateMask.fieldPaths", field_path);
            }
            query.append_pair("currentDocument.exists", "true");
        }

        let response = self
            .authorized(self.client.patch(endpoint), Some(id_token))
            .json(&WriteDocumentRequest { fields: &fields })
            .send()
            .await
            .map_err(|error| {
                InfraError::RemoteUnavailable(format!("network error while updating task: {error}"))
            })?;

        let (status, body) = Self::read_body(response, "task update").await?;
        if !status.is_success() {
            return Err(Self::http_error(
                status,
                &body,
                &format!("{TASKS_COLLECTION}/{task_id}"),
            ));
        }

        let document: FirestoreDocument = serde_json::from_str(&body).map_err(|error| {
            InfraError::RemoteUnavailable(format!("invalid task update payload: {error}; body={body}"))
        })?;
        decode_task_document(&document)?
            .ok_or_else(|| InfraError::NotFound(format!("{TASKS_COLLECTION}/{task_id}")))
    }

    async fn delete_task(&self, id_token: &str, task_id: &str) -> Result<(), InfraError> {
        Self::ensure_non_empty(task_id, "task id")?;

        let endpoint = self.documents_endpoint(&["documents", TASKS_COLLECTION, task_id])?;
        let response = self
            .authorized(self.client.delete(endpoint), Some(id_token))
            .send()
            .await
            .map_err(|error| {
                InfraError::RemoteUnavailable(format!("network error while deleting task: {error}"))
            })?;

        let (status, body) = Self::read_body(response, "task delete").await?;
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(Self::http_error(status, &body, &format!("{TASKS_COLLECTION}/{task_id}")))
    }
}

/// Process-local document store with push notifications.
#[derive(Debug)]
pub struct InMemoryTaskDocumentClient {
    tasks: Mutex<Vec<Task>>,
    next_id: AtomicU64,
    revision: watch::Sender<u64>,
}

impl Default for InMemoryTaskDocumentClient {
    fn default() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            tasks: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            revision,
        }
    }
}

impl InMemoryTaskDocumentClient {
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        let client = Self::default();
        if let Ok(mut guard) = client.tasks.lock() {
            *guard = tasks;
        }
        client
    }

    fn lock_tasks(&self) -> Result<std::sync::MutexGuard<'_, Vec<Task>>, InfraError> {
        self.tasks
            .lock()
            .map_err(|error| InfraError::RemoteUnavailable(format!("in-memory store lock poisoned: {error}")))
    }

    fn bump_revision(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }
}

#[async_trait]
impl TaskDocumentClient for InMemoryTaskDocumentClient {
    async fn query_tasks(&self, _id_token: &str, user_id: &str) -> Result<Vec<Task>, InfraError> {
        let tasks = self.lock_tasks()?;
        Ok(tasks
            .iter()
            .filter(|task| task.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_all_tasks(&self, _bearer_token: Option<&str>) -> Result<Vec<Task>, InfraError> {
        Ok(self.lock_tasks()?.clone())
    }

    async fn create_task(
        &self,
        _id_token: &str,
        draft: &TaskDraft,
        now: DateTime<Utc>,
    ) -> Result<Task, InfraError> {
        let sequence = self.next_id.fetch_add(1, Ordering::Relaxed);
        let task = Task::from_draft(format!("doc-{sequence}"), draft.clone(), now);
        self.lock_tasks()?.push(task.clone());
        self.bump_revision();
        Ok(task)
    }

    async fn update_task(
        &self,
        _id_token: &str,
        task_id: &str,
        patch: &TaskPatch,
        now: DateTime<Utc>,
    ) -> Result<Task, InfraError> {
        let updated = {
            let mut tasks = self.lock_tasks()?;
            let Some(task) = tasks.iter_mut().find(|task| task.id == task_id) else {
                return Err(InfraError::NotFound(format!("{TASKS_COLLECTION}/{task_id}")));
            };
            let mut merged = task.merged(patch);
            merged.updated_at = Some(now);
            *task = merged.clone();
            merged
        };
        self.bump_revision();
        Ok(updated)
    }

    async fn delete_task(&self, _id_token: &str, task_id: &str) -> Result<(), InfraError> {
        let removed = {
            let mut tasks = self.lock_tasks()?;
            let before = tasks.len();
            tasks.retain(|task| task.id != task_id);
            tasks.len() != before
        };
        if removed {
            self.bump_revision();
        }
        Ok(())
    }

    fn change_notifications(&self) -> Option<watch::Receiver<u64>> {
        Some(self.revision.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ViewId;

    fn fixed_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-02-16T00:00:00Z")
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    #[test]
    fn documents_endpoint_includes_project_database_and_key() {
        let client = ReqwestFirestoreClient::new(FirestoreConfig::new("demo-project", "api-key"));
        let url = client
            .documents_endpoint(&["documents", TASKS_COLLECTION, "abc"])
            .expect("endpoint");
        assert_eq!(
            url.as_str(),
            "https://firestore.googleapis.com/v1/projects/demo-project/databases/(default)/documents/tasks/abc?key=api-key"
        );
    }

    #[test]
    fn run_query_endpoint_keeps_colon_suffix() {
        let client = ReqwestFirestoreClient::new(FirestoreConfig::new("demo-project", "api-key"));
        let url = client.documents_endpoint(&["documents:runQuery"]).expect("endpoint");
        assert!(url.path().ends_with("/databases/(default)/documents:runQuery"));
    }

    #[tokio::test]
    async fn in_memory_client_scopes_queries_to_owner() {
        let client = InMemoryTaskDocumentClient::default();
        let mine = TaskDraft::for_view("Mine", &ViewId::All, "user-1");
        let theirs = TaskDraft::for_view("Theirs", &ViewId::All, "user-2");
        client.create_task("t", &mine, fixed_time()).await.expect("create mine");
        client.create_task("t", &theirs, fixed_time()).await.expect("create theirs");

        let tasks = client.query_tasks("t", "user-1").await.expect("query");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "Mine");
        assert_eq!(client.list_all_tasks(None).await.expect("list").len(), 2);
    }

    #[tokio::test]
    async fn in_memory_update_of_missing_task_is_not_found() {
        let client = InMemoryTaskDocumentClient::default();
        let result = client
            .update_task("t", "missing", &TaskPatch::completed(true), fixed_time())
            .await;
        assert!(matches!(result, Err(InfraError::NotFound(_))));
    }

    #[tokio::test]
    async fn in_memory_writes_bump_revision() {
        let client = InMemoryTaskDocumentClient::default();
        let mut changes = client.change_notifications().expect("push supported");
        let draft = TaskDraft::for_view("Ping", &ViewId::All, "user-1");
        let created = client.create_task("t", &draft, fixed_time()).await.expect("create");
        assert!(changes.has_changed().expect("sender alive"));
        let _ = changes.borrow_and_update();

        client.delete_task("t", "missing").await.expect("idempotent delete");
        assert!(!changes.has_changed().expect("sender alive"));

        client.delete_task("t", &created.id).await.expect("delete");
        assert!(changes.has_changed().expect("sender alive"));
    }
}
