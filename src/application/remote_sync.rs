use crate::domain::models::{Task, TaskDraft, TaskPatch};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::firestore_client::TaskDocumentClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration as TokioDuration};

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;

/// Supplies the bearer token for each remote call.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn id_token(&self) -> Result<String, InfraError>;
}

/// A fixed token, for service accounts and tests.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl TokenSource for StaticToken {
    async fn id_token(&self) -> Result<String, InfraError> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u8,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u8) -> TokioDuration {
        TokioDuration::from_millis(
            self.base_delay_ms
                .saturating_mul(2u64.saturating_pow(u32::from(attempt))),
        )
    }
}

/// Live query handle. Cancels on `unsubscribe` or drop.
#[derive(Debug)]
pub struct Subscription {
    user_id: String,
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn unsubscribe(self) {
        tracing::debug!(uid = %self.user_id, "task subscription cancelled");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct RemoteSync<C>
where
    C: TaskDocumentClient,
{
    client: Arc<C>,
    retry_policy: RetryPolicy,
    now_provider: NowProvider,
    poll_interval: TokioDuration,
    /// Bumped after each successful write; wakes polling subscriptions early.
    local_writes: watch::Sender<u64>,
}

impl<C> RemoteSync<C>
where
    C: TaskDocumentClient + 'static,
{
    pub fn new(client: Arc<C>) -> Self {
        Self {
            client,
            retry_policy: RetryPolicy::default(),
            now_provider: Arc::new(Utc::now),
            poll_interval: TokioDuration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            local_writes: watch::channel(0).0,
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: TokioDuration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// The owner's tasks, newest first.
    pub async fn fetch_all(&self, id_token: &str, user_id: &str) -> Result<Vec<Task>, InfraError> {
        ensure_non_empty(user_id, "user id")?;
        query_with_retry(self.client.as_ref(), &self.retry_policy, id_token, user_id).await
    }

    /// Every task in the collection, newest first.
    pub async fn list_all(&self, bearer_token: Option<&str>) -> Result<Vec<Task>, InfraError> {
        let max_attempts = self.retry_policy.max_attempts.max(1);
        let mut attempt: u8 = 0;

        loop {
            match self.client.list_all_tasks(bearer_token).await {
                Ok(mut tasks) => {
                    sort_newest_first(&mut tasks);
                    return Ok(tasks);
                }
                Err(error) if error.is_transient() && attempt + 1 < max_attempts => {
                    sleep(self.retry_policy.delay_for(attempt)).await;
                    attempt = attempt.saturating_add(1);
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// Emits the owner's full task list once, then after every change until
    /// the returned handle is cancelled.
    pub fn subscribe<T, F>(
        &self,
        tokens: Arc<T>,
        user_id: &str,
        on_change: F,
    ) -> Result<Subscription, InfraError>
    where
        T: TokenSource + ?Sized + 'static,
        F: Fn(Result<Vec<Task>, InfraError>) + Send + Sync + 'static,
    {
        ensure_non_empty(user_id, "user id")?;

        let client = Arc::clone(&self.client);
        let retry_policy = self.retry_policy.clone();
        let poll_interval = self.poll_interval;
        let owner = user_id.trim().to_string();
        let mut changes = client.change_notifications();
        let mut local_writes = self.local_writes.subscribe();

        let task = tokio::spawn({
            let owner = owner.clone();
            async move {
                let mut last_snapshot: Option<Vec<Task>> = None;
                let mut last_failed = false;
                let mut writes_open = true;

                loop {
                    let result = match tokens.id_token().await {
                        Ok(id_token) => {
                            query_with_retry(client.as_ref(), &retry_policy, &id_token, &owner).await
                        }
                        Err(error) => Err(error),
                    };

                    match result {
                        Ok(tasks) => {
                            if last_failed || last_snapshot.as_ref() != Some(&tasks) {
                                last_snapshot = Some(tasks.clone());
                                last_failed = false;
                                on_change(Ok(tasks));
                            }
                        }
                        Err(error) => {
                            if !last_failed {
                                last_failed = true;
                                on_change(Err(error));
                            }
                        }
                    }

                    match changes.as_mut() {
                        Some(receiver) => {
                            if receiver.changed().await.is_err() {
                                break;
                            }
                        }
                        None => {
                            tokio::select! {
                                _ = sleep(poll_interval) => {}
                                changed = local_writes.changed(), if writes_open => {
                                    writes_open = changed.is_ok();
                                }
                            }
                        }
                    }
                }
            }
        });

        tracing::debug!(uid = %owner, "task subscription started");
        Ok(Subscription {
            user_id: owner,
            task,
        })
    }

    pub async fn create(&self, id_token: &str, draft: &TaskDraft) -> Result<Task, InfraError> {
        draft.validate().map_err(InfraError::Validation)?;
        let created = self
            .client
            .create_task(id_token, draft, (self.now_provider)())
            .await?;
        self.announce_write();
        Ok(created)
    }

    pub async fn update(
        &self,
        id_token: &str,
        task_id: &str,
        patch: &TaskPatch,
    ) -> Result<Task, InfraError> {
        ensure_non_empty(task_id, "task id")?;
        patch.validate().map_err(InfraError::Validation)?;
        let updated = self
            .client
            .update_task(id_token, task_id, patch, (self.now_provider)())
            .await?;
        self.announce_write();
        Ok(updated)
    }

    pub async fn delete(&self, id_token: &str, task_id: &str) -> Result<(), InfraError> {
        ensure_non_empty(task_id, "task id")?;
        self.client.delete_task(id_token, task_id).await?;
        self.announce_write();
        Ok(())
    }

    fn announce_write(&self) {
        self.local_writes
            .send_modify(|revision| *revision = revision.wrapping_add(1));
    }
}

async fn query_with_retry<C>(
    client: &C,
    retry_policy: &RetryPolicy,
    id_token: &str,
    user_id: &str,
) -> Result<Vec<Task>, InfraError>
where
    C: TaskDocumentClient + ?Sized,
{
    let max_attempts = retry_policy.max_attempts.max(1);
    let mut attempt: u8 = 0;

    loop {
        match client.query_tasks(id_token, user_id).await {
            Ok(tasks) => {
                let mut owned: Vec<Task> = tasks
                    .into_iter()
                    .filter(|task| task.user_id == user_id)
                    .collect();
                sort_newest_first(&mut owned);
                return Ok(owned);
            }
            Err(error) if error.is_transient() && attempt + 1 < max_attempts => {
                tracing::warn!(uid = %user_id, attempt, %error, "task query failed, retrying");
                sleep(retry_policy.delay_for(attempt)).await;
                attempt = attempt.saturating_add(1);
            }
            Err(error) => return Err(error),
        }
    }
}

fn sort_newest_first(tasks: &mut [Task]) {
    tasks.sort_by(|left, right| right.created_at.cmp(&left.created_at));
}

fn ensure_non_empty(value: &str, field: &str) -> Result<(), InfraError> {
    if value.trim().is_empty() {
        return Err(InfraError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}
