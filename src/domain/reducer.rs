use crate::domain::models::{ListColor, Task, TaskList, ViewId, PERSONAL_LIST_ID};
use serde::Serialize;

/// Everything the task screen renders from. Owned by one controller per session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    pub tasks: Vec<Task>,
    pub lists: Vec<TaskList>,
    pub active_view: ViewId,
    pub loading: bool,
    pub error: Option<String>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            tasks: Vec::new(),
            lists: vec![TaskList::personal()],
            active_view: ViewId::MyDay,
            loading: false,
            error: None,
        }
    }
}

impl AppState {
    pub fn find_task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == task_id)
    }

    pub fn find_list(&self, list_id: &str) -> Option<&TaskList> {
        self.lists.iter().find(|list| list.id == list_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    ReplaceTasks(Vec<Task>),
    AddTask(Task),
    EditTask(Task),
    DeleteTask(String),
    ToggleComplete(Task),
    ToggleImportant(Task),
    SetActiveView(ViewId),
    AddList(String),
    SetLists(Vec<TaskList>),
    SetLoading(bool),
    SetError(String),
    ClearError,
    Reset,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ReplaceTasks(_) => "replace_tasks",
            Self::AddTask(_) => "add_task",
            Self::EditTask(_) => "edit_task",
            Self::DeleteTask(_) => "delete_task",
            Self::ToggleComplete(_) => "toggle_complete",
            Self::ToggleImportant(_) => "toggle_important",
            Self::SetActiveView(_) => "set_active_view",
            Self::AddList(_) => "add_list",
            Self::SetLists(_) => "set_lists",
            Self::SetLoading(_) => "set_loading",
            Self::SetError(_) => "set_error",
            Self::ClearError => "clear_error",
            Self::Reset => "reset",
        }
    }
}

/// Pure transition. Never fails; callers filter invalid input before dispatch.
pub fn reduce(state: &AppState, action: Action) -> AppState {
    match action {
        Action::ReplaceTasks(tasks) => AppState {
            tasks,
            loading: false,
            ..state.clone()
        },
        Action::AddTask(task) => {
            let mut tasks = Vec::with_capacity(state.tasks.len() + 1);
            tasks.push(task);
            tasks.extend(state.tasks.iter().cloned());
            AppState {
                tasks,
                loading: false,
                ..state.clone()
            }
        }
        Action::EditTask(task) | Action::ToggleComplete(task) | Action::ToggleImportant(task) => {
            AppState {
                tasks: replace_by_id(&state.tasks, task),
                loading: false,
                ..state.clone()
            }
        }
        Action::DeleteTask(task_id) => AppState {
            tasks: state
                .tasks
                .iter()
                .filter(|task| task.id != task_id)
                .cloned()
                .collect(),
            loading: false,
            ..state.clone()
        },
        Action::SetActiveView(active_view) => AppState {
            active_view,
            ..state.clone()
        },
        Action::AddList(name) => {
            let name = name.trim();
            if name.is_empty() {
                return state.clone();
            }
            let mut lists = state.lists.clone();
            lists.push(TaskList {
                id: next_list_id(&state.lists),
                name: name.to_string(),
                color: ListColor::Blue,
            });
            AppState {
                lists,
                ..state.clone()
            }
        }
        Action::SetLists(stored) => {
            let mut lists = vec![TaskList::personal()];
            lists.extend(
                stored
                    .into_iter()
                    .filter(|list| list.id != PERSONAL_LIST_ID && list.validate().is_ok()),
            );
            AppState {
                lists,
                ..state.clone()
            }
        }
        Action::SetLoading(loading) => AppState {
            loading,
            ..state.clone()
        },
        Action::SetError(message) => AppState {
            error: Some(message),
            loading: false,
            ..state.clone()
        },
        Action::ClearError => AppState {
            error: None,
            ..state.clone()
        },
        Action::Reset => AppState::default(),
    }
}

/// Sequential id for the next user list: `list-{n+1}` over the current count.
pub fn next_list_id(lists: &[TaskList]) -> String {
    format!("list-{}", lists.len() + 1)
}

fn replace_by_id(tasks: &[Task], replacement: Task) -> Vec<Task> {
    tasks
        .iter()
        .map(|task| {
            if task.id == replacement.id {
                replacement.clone()
            } else {
                task.clone()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn task(id: &str, title: &str) -> Task {
        Task {
            id: id.to_string(),
            title: title.to_string(),
            completed: false,
            important: false,
            my_day: false,
            list: PERSONAL_LIST_ID.to_string(),
            date: None,
            time: None,
            user_id: "user-1".to_string(),
            created_at: None,
            updated_at: None,
        }
    }

    fn toggled_complete(task: &Task) -> Task {
        Task {
            completed: !task.completed,
            ..task.clone()
        }
    }

    fn id_pattern() -> impl Strategy<Value = String> {
        "[a-z0-9]{1,12}".prop_map(|value| value.to_string())
    }

    #[test]
    fn initial_state_has_personal_list_and_my_day_view() {
        let state = AppState::default();
        assert!(state.tasks.is_empty());
        assert_eq!(state.lists, vec![TaskList::personal()]);
        assert_eq!(state.active_view, ViewId::MyDay);
        assert!(!state.loading);
        assert!(state.error.is_none());
    }

    #[test]
    fn reduce_does_not_mutate_input() {
        let state = AppState {
            tasks: vec![task("1", "A")],
            ..AppState::default()
        };
        let before = state.clone();
        let _ = reduce(&state, Action::AddTask(task("2", "B")));
        let _ = reduce(&state, Action::DeleteTask("1".to_string()));
        assert_eq!(state, before);
    }

    #[test]
    fn replace_tasks_clears_loading() {
        let state = reduce(&AppState::default(), Action::SetLoading(true));
        assert!(state.loading);
        let state = reduce(&state, Action::ReplaceTasks(vec![task("1", "A")]));
        assert!(!state.loading);
        assert_eq!(state.tasks.len(), 1);
    }

    #[test]
    fn edit_task_replaces_matching_id_in_place() {
        let state = AppState {
            tasks: vec![task("1", "A"), task("2", "B"), task("3", "C")],
            loading: true,
            ..AppState::default()
        };
        let next = reduce(&state, Action::EditTask(task("2", "B2")));
        let titles: Vec<_> = next.tasks.iter().map(|task| task.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B2", "C"]);
        assert!(!next.loading);
    }

    #[test]
    fn edit_of_unknown_task_leaves_tasks_alone() {
        let state = AppState {
            tasks: vec![task("1", "A")],
            ..AppState::default()
        };
        let next = reduce(&state, Action::EditTask(task("9", "Z")));
        assert_eq!(next.tasks, state.tasks);
    }

    #[test]
    fn delete_removes_matching_task() {
        let state = AppState {
            tasks: vec![task("1", "A"), task("2", "B")],
            ..AppState::default()
        };
        let next = reduce(&state, Action::DeleteTask("1".to_string()));
        assert_eq!(next.tasks, vec![task("2", "B")]);
    }

    #[test]
    fn add_list_assigns_sequential_id_and_blue_color() {
        let state = reduce(&AppState::default(), Action::AddList("Groceries".to_string()));
        assert_eq!(state.lists.len(), 2);
        assert_eq!(state.lists[1].id, "list-2");
        assert_eq!(state.lists[1].name, "Groceries");
        assert_eq!(state.lists[1].color, ListColor::Blue);

        let state = reduce(&state, Action::AddList("  Work  ".to_string()));
        assert_eq!(state.lists[2].id, "list-3");
        assert_eq!(state.lists[2].name, "Work");
    }

    #[test]
    fn add_list_ignores_blank_names() {
        let state = AppState::default();
        assert_eq!(reduce(&state, Action::AddList("   ".to_string())), state);
    }

    #[test]
    fn set_lists_always_keeps_personal_first() {
        let stored = vec![
            TaskList {
                id: "list-2".to_string(),
                name: "Groceries".to_string(),
                color: ListColor::Blue,
            },
            TaskList::personal(),
        ];
        let state = reduce(&AppState::default(), Action::SetLists(stored));
        let ids: Vec<_> = state.lists.iter().map(|list| list.id.as_str()).collect();
        assert_eq!(ids, vec![PERSONAL_LIST_ID, "list-2"]);
    }

    #[test]
    fn set_error_stops_loading_and_clear_error_resets_banner() {
        let state = reduce(&AppState::default(), Action::SetLoading(true));
        let state = reduce(&state, Action::SetError("Failed to add task".to_string()));
        assert_eq!(state.error.as_deref(), Some("Failed to add task"));
        assert!(!state.loading);
        let state = reduce(&state, Action::ClearError);
        assert!(state.error.is_none());
    }

    #[test]
    fn set_active_view_keeps_loading_flag() {
        let state = reduce(&AppState::default(), Action::SetLoading(true));
        let state = reduce(&state, Action::SetActiveView(ViewId::Important));
        assert_eq!(state.active_view, ViewId::Important);
        assert!(state.loading);
    }

    #[test]
    fn reset_returns_initial_state() {
        let state = AppState {
            tasks: vec![task("1", "A")],
            active_view: ViewId::All,
            error: Some("boom".to_string()),
            ..AppState::default()
        };
        let state = reduce(&state, Action::AddList("Work".to_string()));
        assert_eq!(reduce(&state, Action::Reset), AppState::default());
    }

    proptest! {
        #[test]
        fn add_task_sequence_is_newest_first(ids in prop::collection::vec(id_pattern(), 0..20)) {
            let mut state = AppState::default();
            for (index, id) in ids.iter().enumerate() {
                state = reduce(&state, Action::AddTask(task(&format!("{index}-{id}"), id)));
            }
            let expected: Vec<String> = ids
                .iter()
                .enumerate()
                .rev()
                .map(|(index, id)| format!("{index}-{id}"))
                .collect();
            let actual: Vec<String> = state.tasks.iter().map(|task| task.id.clone()).collect();
            prop_assert_eq!(actual, expected);
        }
    }

    proptest! {
        #[test]
        fn double_toggle_complete_restores_flag(completed in any::<bool>(), id in id_pattern()) {
            let mut original = task(&id, "T");
            original.completed = completed;
            let state = AppState {
                tasks: vec![original.clone()],
                ..AppState::default()
            };

            let once = reduce(&state, Action::ToggleComplete(toggled_complete(&original)));
            let current = once.find_task(&id).cloned().expect("task present");
            let twice = reduce(&once, Action::ToggleComplete(toggled_complete(&current)));

            prop_assert_eq!(twice.find_task(&id).map(|task| task.completed), Some(completed));
        }
    }

    proptest! {
        #[test]
        fn deleting_unknown_id_is_a_no_op(
            ids in prop::collection::hash_set(id_pattern(), 0..10),
            missing in "[A-Z]{1,8}"
        ) {
            let tasks: Vec<Task> = ids.iter().map(|id| task(id, "T")).collect();
            let state = AppState {
                tasks,
                ..AppState::default()
            };
            let next = reduce(&state, Action::DeleteTask(missing));
            prop_assert_eq!(next, state);
        }
    }
}
