use crate::domain::models::{Task, TaskList, ViewId};

pub fn matches_view(task: &Task, view: &ViewId) -> bool {
    match view {
        ViewId::MyDay => task.my_day,
        ViewId::Important => task.important,
        ViewId::Planned => task.date.is_some(),
        ViewId::All => true,
        ViewId::List(list_id) => task.list == *list_id,
    }
}

/// Tasks shown under `view` in the active (`completed == false`) or completed
/// section. Input order is kept.
pub fn visible_tasks(tasks: &[Task], view: &ViewId, completed: bool) -> Vec<Task> {
    tasks
        .iter()
        .filter(|task| task.completed == completed)
        .filter(|task| matches_view(task, view))
        .cloned()
        .collect()
}

/// Sidebar badge: open tasks under `view`.
pub fn count_for_view(tasks: &[Task], view: &ViewId) -> usize {
    tasks
        .iter()
        .filter(|task| !task.completed && matches_view(task, view))
        .count()
}

pub fn view_title(view: &ViewId, lists: &[TaskList]) -> String {
    match view {
        ViewId::MyDay => "My Day".to_string(),
        ViewId::Important => "Important".to_string(),
        ViewId::Planned => "Planned".to_string(),
        ViewId::All => "All Tasks".to_string(),
        ViewId::List(list_id) => lists
            .iter()
            .find(|list| list.id == *list_id)
            .map(|list| list.name.clone())
            .unwrap_or_else(|| "Tasks".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::PERSONAL_LIST_ID;
    use chrono::NaiveDate;
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

    fn arb_task() -> impl Strategy<Value = Task> {
        (
            "[a-z0-9]{1,8}",
            any::<bool>(),
            any::<bool>(),
            any::<bool>(),
            prop::sample::select(vec!["personal", "list-2", "list-3"]),
            any::<bool>(),
        )
            .prop_map(|(id, completed, important, my_day, list, planned)| Task {
                completed,
                important,
                my_day,
                list: list.to_string(),
                date: planned.then(|| NaiveDate::from_ymd_opt(2026, 3, 1).expect("valid date")),
                ..task(&id, "T")
            })
    }

    #[test]
    fn my_day_scenario_returns_only_flagged_task() {
        let mut first = task("1", "A");
        first.my_day = true;
        let second = task("2", "B");
        let tasks = vec![first.clone(), second];

        assert_eq!(visible_tasks(&tasks, &ViewId::MyDay, false), vec![first]);
    }

    #[test]
    fn planned_view_requires_a_date() {
        let mut dated = task("1", "Dentist");
        dated.date = NaiveDate::from_ymd_opt(2026, 3, 1);
        let tasks = vec![dated.clone(), task("2", "Someday")];
        assert_eq!(visible_tasks(&tasks, &ViewId::Planned, false), vec![dated]);
    }

    #[test]
    fn list_view_filters_by_owning_list_and_keeps_order() {
        let mut first = task("1", "Eggs");
        first.list = "list-2".to_string();
        let mut third = task("3", "Bread");
        third.list = "list-2".to_string();
        let tasks = vec![first.clone(), task("2", "Other"), third.clone()];

        let visible = visible_tasks(&tasks, &ViewId::List("list-2".to_string()), false);
        assert_eq!(visible, vec![first, third]);
    }

    #[test]
    fn completed_section_only_shows_completed_tasks() {
        let mut done = task("1", "Done");
        done.completed = true;
        done.important = true;
        let mut open = task("2", "Open");
        open.important = true;
        let tasks = vec![done.clone(), open.clone()];

        assert_eq!(visible_tasks(&tasks, &ViewId::Important, true), vec![done]);
        assert_eq!(visible_tasks(&tasks, &ViewId::Important, false), vec![open]);
        assert_eq!(count_for_view(&tasks, &ViewId::Important), 1);
    }

    #[test]
    fn view_title_falls_back_for_unknown_lists() {
        let lists = vec![TaskList::personal()];
        assert_eq!(view_title(&ViewId::MyDay, &lists), "My Day");
        assert_eq!(view_title(&ViewId::All, &lists), "All Tasks");
        assert_eq!(
            view_title(&ViewId::List(PERSONAL_LIST_ID.to_string()), &lists),
            "Personal"
        );
        assert_eq!(view_title(&ViewId::List("list-9".to_string()), &lists), "Tasks");
    }

    proptest! {
        #[test]
        fn all_view_only_filters_on_completion(
            tasks in prop::collection::vec(arb_task(), 0..30),
            completed in any::<bool>()
        ) {
            let expected: Vec<Task> = tasks
                .iter()
                .filter(|task| task.completed == completed)
                .cloned()
                .collect();
            prop_assert_eq!(visible_tasks(&tasks, &ViewId::All, completed), expected);
        }
    }

    proptest! {
        #[test]
        fn my_day_count_matches_open_my_day_tasks(tasks in prop::collection::vec(arb_task(), 0..30)) {
            let expected = tasks.iter().filter(|task| task.my_day && !task.completed).count();
            prop_assert_eq!(count_for_view(&tasks, &ViewId::MyDay), expected);
        }
    }
}
