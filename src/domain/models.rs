use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const PERSONAL_LIST_ID: &str = "personal";
pub const PERSONAL_LIST_NAME: &str = "Personal";

const VIEW_MY_DAY: &str = "my-day";
const VIEW_IMPORTANT: &str = "important";
const VIEW_PLANNED: &str = "planned";
const VIEW_ALL: &str = "all";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub important: bool,
    #[serde(default)]
    pub my_day: bool,
    #[serde(default = "default_list_id")]
    pub list: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default, with = "hhmm_option")]
    pub time: Option<NaiveTime>,
    pub user_id: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "task.id")?;
        validate_non_empty(&self.title, "task.title")?;
        validate_non_empty(&self.list, "task.list")?;
        validate_non_empty(&self.user_id, "task.user_id")?;
        Ok(())
    }

    /// Returns a copy carrying the fields present in `patch`.
    pub fn merged(&self, patch: &TaskPatch) -> Task {
        let mut merged = self.clone();
        if let Some(title) = patch.title.as_deref() {
            merged.title = title.trim().to_string();
        }
        if let Some(completed) = patch.completed {
            merged.completed = completed;
        }
        if let Some(important) = patch.important {
            merged.important = important;
        }
        if let Some(my_day) = patch.my_day {
            merged.my_day = my_day;
        }
        if let Some(list) = patch.list.as_deref() {
            merged.list = list.trim().to_string();
        }
        if let Some(date) = patch.date {
            merged.date = date;
        }
        if let Some(time) = patch.time {
            merged.time = time;
        }
        merged
    }

    pub fn from_draft(id: impl Into<String>, draft: TaskDraft, now: DateTime<Utc>) -> Task {
        Task {
            id: id.into(),
            title: draft.title,
            completed: draft.completed,
            important: draft.important,
            my_day: draft.my_day,
            list: draft.list,
            date: draft.date,
            time: draft.time,
            user_id: draft.user_id,
            created_at: Some(now),
            updated_at: Some(now),
        }
    }
}

/// A task that has not been written to the remote store yet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    pub title: String,
    pub completed: bool,
    pub important: bool,
    pub my_day: bool,
    pub list: String,
    pub date: Option<NaiveDate>,
    #[serde(default, with = "hhmm_option")]
    pub time: Option<NaiveTime>,
    pub user_id: String,
}

impl TaskDraft {
    /// Builds the draft for a task typed into `active_view`. Tasks added from a
    /// virtual view land in the personal list; My Day also flags `my_day`.
    pub fn for_view(title: &str, active_view: &ViewId, user_id: &str) -> TaskDraft {
        let list = match active_view {
            ViewId::List(list_id) => list_id.clone(),
            _ => PERSONAL_LIST_ID.to_string(),
        };
        TaskDraft {
            title: title.trim().to_string(),
            completed: false,
            important: false,
            my_day: *active_view == ViewId::MyDay,
            list,
            date: None,
            time: None,
            user_id: user_id.trim().to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.title, "task.title")?;
        validate_non_empty(&self.user_id, "task.user_id")?;
        validate_non_empty(&self.list, "task.list")?;
        Ok(())
    }
}

/// Partial update. `date` and `time` are doubly optional so a patch can clear them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub completed: Option<bool>,
    pub important: Option<bool>,
    pub my_day: Option<bool>,
    pub list: Option<String>,
    pub date: Option<Option<NaiveDate>>,
    pub time: Option<Option<NaiveTime>>,
}

impl TaskPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn completed(completed: bool) -> Self {
        Self {
            completed: Some(completed),
            ..Self::default()
        }
    }

    pub fn important(important: bool) -> Self {
        Self {
            important: Some(important),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(title) = self.title.as_deref() {
            validate_non_empty(title, "task.title")?;
        }
        if let Some(list) = self.list.as_deref() {
            validate_non_empty(list, "task.list")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ListColor {
    Red,
    Blue,
    Green,
}

impl ListColor {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::Blue => "blue",
            Self::Green => "green",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "red" => Some(Self::Red),
            "blue" => Some(Self::Blue),
            "green" => Some(Self::Green),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskList {
    pub id: String,
    pub name: String,
    pub color: ListColor,
}

impl TaskList {
    pub fn personal() -> Self {
        Self {
            id: PERSONAL_LIST_ID.to_string(),
            name: PERSONAL_LIST_NAME.to_string(),
            color: ListColor::Red,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "list.id")?;
        validate_non_empty(&self.name, "list.name")?;
        Ok(())
    }
}

/// The active selection: one of the four virtual views or a user list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ViewId {
    #[default]
    MyDay,
    Important,
    Planned,
    All,
    List(String),
}

impl ViewId {
    pub fn as_str(&self) -> &str {
        match self {
            Self::MyDay => VIEW_MY_DAY,
            Self::Important => VIEW_IMPORTANT,
            Self::Planned => VIEW_PLANNED,
            Self::All => VIEW_ALL,
            Self::List(list_id) => list_id,
        }
    }

    pub fn is_virtual(&self) -> bool {
        !matches!(self, Self::List(_))
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        let value = value.trim();
        match value {
            "" => Err("view id must not be empty".to_string()),
            VIEW_MY_DAY => Ok(Self::MyDay),
            VIEW_IMPORTANT => Ok(Self::Important),
            VIEW_PLANNED => Ok(Self::Planned),
            VIEW_ALL => Ok(Self::All),
            list_id => Ok(Self::List(list_id.to_string())),
        }
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for ViewId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ViewId> for String {
    fn from(value: ViewId) -> Self {
        value.as_str().to_string()
    }
}

/// How mutations reach the local store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// A live subscription is the only writer of the task list.
    #[default]
    Realtime,
    /// Each mutation waits for the remote write, then updates the store.
    Confirmed,
}

impl SyncMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Realtime => "realtime",
            Self::Confirmed => "confirmed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "realtime" => Some(Self::Realtime),
            "confirmed" => Some(Self::Confirmed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Identity {
    pub uid: String,
    pub email: Option<String>,
}

/// Credentials kept for a signed-in user between runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthSession {
    pub identity: Identity,
    pub id_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl AuthSession {
    pub fn is_valid_at(&self, now: DateTime<Utc>, skew_seconds: i64) -> bool {
        !self.id_token.trim().is_empty()
            && self.expires_at > now + chrono::Duration::seconds(skew_seconds.max(0))
    }
}

fn default_list_id() -> String {
    PERSONAL_LIST_ID.to_string()
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}

pub(crate) fn parse_hhmm(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}

pub(crate) fn format_hhmm(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

mod hhmm_option {
    use super::{format_hhmm, parse_hhmm};
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<NaiveTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(time) => serializer.serialize_str(&format_hhmm(*time)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim).filter(|value| !value.is_empty()) {
            None => Ok(None),
            Some(value) => parse_hhmm(value)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("time must be HH:MM: {value}"))),
        }
    }
}
