use crate::application::auth::{AuthNotice, AuthService};
use crate::application::remote_sync::{RemoteSync, RetryPolicy, Subscription, TokenSource};
use crate::domain::models::{
    Identity, SyncMode, Task, TaskDraft, TaskList, TaskPatch, ViewId, PERSONAL_LIST_ID,
};
use crate::domain::reducer::{reduce, Action, AppState};
use crate::domain::session::{SessionState, SessionTransition};
use crate::domain::view;
use crate::infrastructure::config::{AppConfig, FirebaseConfig};
use crate::infrastructure::credential_store::KeyringCredentialStore;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::firestore_client::{ReqwestFirestoreClient, TaskDocumentClient};
use crate::infrastructure::identity_client::ReqwestIdentityClient;
use crate::infrastructure::list_repository::{ListRepository, SqliteListRepository};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

pub const LOAD_FAILED: &str = "Failed to load tasks";
pub const ADD_FAILED: &str = "Failed to add task";
pub const UPDATE_FAILED: &str = "Failed to update task";
pub const DELETE_FAILED: &str = "Failed to delete task";

pub type LiveAuthService = AuthService<KeyringCredentialStore, ReqwestIdentityClient>;
pub type LiveController =
    TaskController<ReqwestFirestoreClient, SqliteListRepository, LiveAuthService>;

/// Wires the production collaborators for one desktop session. Feed the
/// returned service's notifications into the controller's `next_event`.
pub fn live_controller(
    firebase: &FirebaseConfig,
    app_config: &AppConfig,
    database_path: &Path,
) -> (Arc<LiveAuthService>, LiveController) {
    let auth = Arc::new(AuthService::new(
        Arc::new(KeyringCredentialStore::default()),
        Arc::new(ReqwestIdentityClient::new(firebase.identity())),
    ));
    let remote = RemoteSync::new(Arc::new(ReqwestFirestoreClient::new(firebase.firestore())))
        .with_retry_policy(RetryPolicy {
            max_attempts: app_config.retry.max_attempts,
            base_delay_ms: app_config.retry.base_delay_ms,
        })
        .with_poll_interval(Duration::from_millis(app_config.poll_interval_ms));
    let controller = TaskController::new(
        remote,
        Arc::new(SqliteListRepository::new(database_path)),
        Arc::clone(&auth),
    )
    .with_sync_mode(app_config.sync_mode);
    (auth, controller)
}

/// Results posted by background subscriptions, drained through `dispatch`.
#[derive(Debug)]
pub enum SyncEvent {
    Snapshot {
        generation: u64,
        result: Result<Vec<Task>, InfraError>,
    },
}

/// One signed-in session's task screen. Every state change, whether from a
/// command, an auth notification, or a subscription, goes through `dispatch`.
pub struct TaskController<C, L, T>
where
    C: TaskDocumentClient + 'static,
    L: ListRepository,
    T: TokenSource + ?Sized + 'static,
{
    remote: RemoteSync<C>,
    list_repository: Arc<L>,
    tokens: Arc<T>,
    sync_mode: SyncMode,
    state: AppState,
    session: SessionState,
    subscription: Option<Subscription>,
    generation: u64,
    events_tx: mpsc::UnboundedSender<SyncEvent>,
    events_rx: mpsc::UnboundedReceiver<SyncEvent>,
}

impl<C, L, T> TaskController<C, L, T>
where
    C: TaskDocumentClient + 'static,
    L: ListRepository,
    T: TokenSource + ?Sized + 'static,
{
    pub fn new(remote: RemoteSync<C>, list_repository: Arc<L>, tokens: Arc<T>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            remote,
            list_repository,
            tokens,
            sync_mode: SyncMode::default(),
            state: AppState::default(),
            session: SessionState::default(),
            subscription: None,
            generation: 0,
            events_tx,
            events_rx,
        }
    }

    pub fn with_sync_mode(mut self, sync_mode: SyncMode) -> Self {
        self.sync_mode = sync_mode;
        self
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn sync_mode(&self) -> SyncMode {
        self.sync_mode
    }

    pub fn has_subscription(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn visible_tasks(&self, completed: bool) -> Vec<Task> {
        view::visible_tasks(&self.state.tasks, &self.state.active_view, completed)
    }

    pub fn count_for_view(&self, view_id: &ViewId) -> usize {
        view::count_for_view(&self.state.tasks, view_id)
    }

    pub fn view_title(&self) -> String {
        view::view_title(&self.state.active_view, &self.state.lists)
    }

    /// Applies one identity-provider notification (`None` = signed out).
    pub async fn handle_auth_notification(&mut self, notification: Option<Identity>) {
        let transition = self.session.apply(notification);
        match transition {
            SessionTransition::SignedIn(identity) => {
                tracing::info!(uid = %identity.uid, "session started");
                self.start_session(&identity).await;
            }
            SessionTransition::SwitchedUser { previous, current } => {
                tracing::info!(previous = %previous.uid, current = %current.uid, "session switched user");
                self.teardown();
                self.dispatch(Action::Reset);
                self.start_session(&current).await;
            }
            SessionTransition::SignedOut => {
                tracing::info!("session ended");
                self.teardown();
                self.dispatch(Action::Reset);
            }
            SessionTransition::Unchanged => {}
        }
    }

    pub async fn handle_auth_notice(&mut self, notice: &AuthNotice) {
        if let Some(notification) = notice.as_notification() {
            self.handle_auth_notification(notification).await;
        }
    }

    /// Waits for the next auth notice or subscription event and applies it.
    /// Returns `false` once the notice channel is closed.
    pub async fn next_event(&mut self, notices: &mut watch::Receiver<AuthNotice>) -> bool {
        tokio::select! {
            changed = notices.changed() => {
                if changed.is_err() {
                    return false;
                }
                let notice = notices.borrow_and_update().clone();
                self.handle_auth_notice(&notice).await;
                true
            }
            Some(event) = self.events_rx.recv() => {
                self.handle_sync_event(event);
                true
            }
        }
    }

    /// Applies every subscription event that is already queued.
    pub fn process_pending_events(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_sync_event(event);
            applied += 1;
        }
        applied
    }

    pub async fn add_task(&mut self, title: &str) -> Result<(), InfraError> {
        let identity = self.require_identity()?;
        let draft = TaskDraft::for_view(title, &self.state.active_view, &identity.uid);
        if let Err(message) = draft.validate() {
            return Err(self.rejected("add_task", message));
        }

        match self.create_remote(&draft).await {
            Ok(task) => {
                tracing::info!(task_id = %task.id, uid = %identity.uid, "task added");
                if self.sync_mode == SyncMode::Confirmed {
                    self.dispatch(Action::AddTask(task));
                }
                Ok(())
            }
            Err(error) => Err(self.command_error("add_task", ADD_FAILED, error)),
        }
    }

    pub async fn edit_title(&mut self, task_id: &str, title: &str) -> Result<(), InfraError> {
        self.require_identity()?;
        if title.trim().is_empty() {
            return Err(self.rejected("edit_title", "task.title must not be empty".to_string()));
        }
        self.update_remote("edit_title", task_id, TaskPatch::title(title.trim()), Action::EditTask)
            .await
    }

    /// Edits any of the task's fields (date, time, list, my day, ...).
    pub async fn update_task(&mut self, task_id: &str, patch: TaskPatch) -> Result<(), InfraError> {
        self.require_identity()?;
        if let Err(message) = patch.validate() {
            return Err(self.rejected("update_task", message));
        }
        self.update_remote("update_task", task_id, patch, Action::EditTask)
            .await
    }

    pub async fn toggle_complete(&mut self, task_id: &str) -> Result<(), InfraError> {
        self.require_identity()?;
        let current = self.known_task(task_id)?;
        self.update_remote(
            "toggle_complete",
            task_id,
            TaskPatch::completed(!current.completed),
            Action::ToggleComplete,
        )
        .await
    }

    pub async fn toggle_important(&mut self, task_id: &str) -> Result<(), InfraError> {
        self.require_identity()?;
        let current = self.known_task(task_id)?;
        self.update_remote(
            "toggle_important",
            task_id,
            TaskPatch::important(!current.important),
            Action::ToggleImportant,
        )
        .await
    }

    pub async fn delete_task(&mut self, task_id: &str) -> Result<(), InfraError> {
        self.require_identity()?;
        let result = match self.tokens.id_token().await {
            Ok(id_token) => self.remote.delete(&id_token, task_id).await,
            Err(error) => Err(error),
        };

        match result {
            Ok(()) => {
                tracing::info!(task_id, "task deleted");
                if self.sync_mode == SyncMode::Confirmed {
                    self.dispatch(Action::DeleteTask(task_id.to_string()));
                }
                Ok(())
            }
            Err(InfraError::Validation(message)) => Err(self.rejected("delete_task", message)),
            Err(error) => Err(self.command_error("delete_task", DELETE_FAILED, error)),
        }
    }

    pub fn set_active_view(&mut self, view_id: ViewId) {
        self.dispatch(Action::SetActiveView(view_id));
    }

    /// Appends a list and stores the user's lists on this device.
    pub fn add_list(&mut self, name: &str) -> Result<(), InfraError> {
        let before = self.state.lists.len();
        self.dispatch(Action::AddList(name.to_string()));
        if self.state.lists.len() == before {
            return Ok(());
        }

        let Some(identity) = self.session.identity() else {
            return Ok(());
        };
        let stored: Vec<TaskList> = self
            .state
            .lists
            .iter()
            .filter(|list| list.id != PERSONAL_LIST_ID)
            .cloned()
            .collect();
        self.list_repository
            .save(&identity.uid, &stored)
            .map_err(|error| {
                tracing::error!(command = "add_list", %error, "failed to store lists");
                error
            })
    }

    pub fn clear_error(&mut self) {
        self.dispatch(Action::ClearError);
    }

    async fn start_session(&mut self, identity: &Identity) {
        match self.list_repository.load(&identity.uid) {
            Ok(lists) => self.dispatch(Action::SetLists(lists)),
            Err(error) => tracing::warn!(uid = %identity.uid, %error, "failed to restore lists"),
        }

        self.dispatch(Action::SetLoading(true));
        match self.sync_mode {
            SyncMode::Realtime => {
                let generation = self.generation;
                let events = self.events_tx.clone();
                let subscribed = self.remote.subscribe(
                    Arc::clone(&self.tokens),
                    &identity.uid,
                    move |result| {
                        let _ = events.send(SyncEvent::Snapshot { generation, result });
                    },
                );
                match subscribed {
                    Ok(subscription) => self.subscription = Some(subscription),
                    Err(error) => {
                        let _ = self.command_error("subscribe", LOAD_FAILED, error);
                    }
                }
            }
            SyncMode::Confirmed => {
                let fetched = match self.tokens.id_token().await {
                    Ok(id_token) => self.remote.fetch_all(&id_token, &identity.uid).await,
                    Err(error) => Err(error),
                };
                match fetched {
                    Ok(tasks) => {
                        tracing::info!(uid = %identity.uid, count = tasks.len(), "tasks loaded");
                        self.dispatch(Action::ReplaceTasks(tasks));
                    }
                    Err(error) => {
                        let _ = self.command_error("fetch_all", LOAD_FAILED, error);
                    }
                }
            }
        }
    }

    /// Cancels the live subscription; queued events from it become stale.
    fn teardown(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }

    fn handle_sync_event(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::Snapshot { generation, result } => {
                if generation != self.generation || self.subscription.is_none() {
                    tracing::debug!(generation, current = self.generation, "dropping stale snapshot");
                    return;
                }
                match result {
                    Ok(tasks) => {
                        tracing::debug!(count = tasks.len(), "snapshot received");
                        self.dispatch(Action::ReplaceTasks(tasks));
                    }
                    Err(error) => {
                        let _ = self.command_error("subscription", LOAD_FAILED, error);
                    }
                }
            }
        }
    }

    async fn create_remote(&self, draft: &TaskDraft) -> Result<Task, InfraError> {
        let id_token = self.tokens.id_token().await?;
        self.remote.create(&id_token, draft).await
    }

    async fn update_remote(
        &mut self,
        command: &str,
        task_id: &str,
        patch: TaskPatch,
        confirmed: fn(Task) -> Action,
    ) -> Result<(), InfraError> {
        let result = match self.tokens.id_token().await {
            Ok(id_token) => self.remote.update(&id_token, task_id, &patch).await,
            Err(error) => Err(error),
        };

        match result {
            Ok(task) => {
                tracing::info!(command, task_id, "task updated");
                if self.sync_mode == SyncMode::Confirmed {
                    self.dispatch(confirmed(task));
                }
                Ok(())
            }
            Err(InfraError::Validation(message)) => Err(self.rejected(command, message)),
            Err(error) => Err(self.command_error(command, UPDATE_FAILED, error)),
        }
    }

    fn require_identity(&self) -> Result<Identity, InfraError> {
        self.session
            .identity()
            .cloned()
            .ok_or_else(|| InfraError::Validation("not signed in".to_string()))
    }

    fn known_task(&self, task_id: &str) -> Result<Task, InfraError> {
        self.state
            .find_task(task_id)
            .cloned()
            .ok_or_else(|| InfraError::NotFound(format!("tasks/{task_id}")))
    }

    fn dispatch(&mut self, action: Action) {
        tracing::trace!(action = action.name(), "dispatch");
        self.state = reduce(&self.state, action);
    }

    /// Logs a failed remote step once and shows `user_message` in the banner.
    fn command_error(&mut self, command: &str, user_message: &str, error: InfraError) -> InfraError {
        tracing::error!(command, %error, "command failed");
        let message = match &error {
            InfraError::Auth(auth_error) => auth_error.user_message(),
            _ => user_message.to_string(),
        };
        self.dispatch(Action::SetError(message));
        error
    }

    fn rejected(&self, command: &str, message: String) -> InfraError {
        tracing::warn!(command, %message, "command rejected");
        InfraError::Validation(message)
    }
}
