use crate::domain::models::{ListColor, TaskList};
use crate::infrastructure::error::InfraError;
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// User-created lists, kept per user on this device. The personal list is
/// implicit and never stored.
pub trait ListRepository: Send + Sync {
    fn load(&self, user_id: &str) -> Result<Vec<TaskList>, InfraError>;
    fn save(&self, user_id: &str, lists: &[TaskList]) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct SqliteListRepository {
    db_path: PathBuf,
}

impl SqliteListRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        Connection::open(&self.db_path).map_err(InfraError::from)
    }
}

fn ensure_user_id(user_id: &str) -> Result<&str, InfraError> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(InfraError::Validation("user id must not be empty".to_string()));
    }
    Ok(user_id)
}

impl ListRepository for SqliteListRepository {
    fn load(&self, user_id: &str) -> Result<Vec<TaskList>, InfraError> {
        let user_id = ensure_user_id(user_id)?;
        let connection = self.connect()?;
        let mut statement = connection.prepare(
            "SELECT id, name, color FROM task_lists WHERE user_id = ?1 ORDER BY position ASC",
        )?;
        let rows = statement.query_map(params![user_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut lists = Vec::new();
        for row in rows {
            let (id, name, color_raw) = row?;
            let color = ListColor::parse(&color_raw).ok_or_else(|| {
                InfraError::InvalidConfig(format!("invalid task_lists.color '{color_raw}'"))
            })?;
            lists.push(TaskList { id, name, color });
        }
        Ok(lists)
    }

    fn save(&self, user_id: &str, lists: &[TaskList]) -> Result<(), InfraError> {
        let user_id = ensure_user_id(user_id)?;
        let mut connection = self.connect()?;
        let transaction = connection.transaction()?;
        transaction.execute("DELETE FROM task_lists WHERE user_id = ?1", params![user_id])?;
        for (position, list) in lists.iter().enumerate() {
            transaction.execute(
                "INSERT INTO task_lists (user_id, id, name, color, position)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![user_id, list.id, list.name, list.color.as_str(), position as i64],
            )?;
        }
        transaction.commit()?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryListRepository {
    lists: Mutex<HashMap<String, Vec<TaskList>>>,
}

impl ListRepository for InMemoryListRepository {
    fn load(&self, user_id: &str) -> Result<Vec<TaskList>, InfraError> {
        let user_id = ensure_user_id(user_id)?;
        let lists = self
            .lists
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("list repository lock poisoned: {error}")))?;
        Ok(lists.get(user_id).cloned().unwrap_or_default())
    }

    fn save(&self, user_id: &str, lists: &[TaskList]) -> Result<(), InfraError> {
        let user_id = ensure_user_id(user_id)?;
        let mut guard = self
            .lists
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("list repository lock poisoned: {error}")))?;
        guard.insert(user_id.to_string(), lists.to_vec());
        Ok(())
    }
}
