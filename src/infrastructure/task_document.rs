use crate::domain::models::{format_hhmm, parse_hhmm, Task, TaskDraft, TaskPatch, PERSONAL_LIST_ID};
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde_json::{json, Map, Value};

pub const TASKS_COLLECTION: &str = "tasks";

const FIELD_TITLE: &str = "title";
const FIELD_COMPLETED: &str = "completed";
const FIELD_IMPORTANT: &str = "important";
const FIELD_MY_DAY: &str = "myDay";
const FIELD_LIST: &str = "list";
const FIELD_USER_ID: &str = "userId";
const FIELD_DATE: &str = "date";
const FIELD_TIME: &str = "time";
const FIELD_CREATED_AT: &str = "createdAt";
const FIELD_UPDATED_AT: &str = "updatedAt";

/// A document as returned by the Firestore REST API.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct FirestoreDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub fields: Map<String, Value>,
    #[serde(rename = "createTime", default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
    #[serde(rename = "updateTime", default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<String>,
}

impl FirestoreDocument {
    pub fn document_id(&self) -> Option<&str> {
        self.name
            .as_deref()
            .and_then(|name| name.rsplit('/').next())
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

pub fn encode_draft_fields(draft: &TaskDraft, now: DateTime<Utc>) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert(FIELD_TITLE.to_string(), string_value(&draft.title));
    fields.insert(FIELD_COMPLETED.to_string(), bool_value(draft.completed));
    fields.insert(FIELD_IMPORTANT.to_string(), bool_value(draft.important));
    fields.insert(FIELD_MY_DAY.to_string(), bool_value(draft.my_day));
    fields.insert(FIELD_LIST.to_string(), string_value(&draft.list));
    fields.insert(FIELD_USER_ID.to_string(), string_value(&draft.user_id));
    fields.insert(FIELD_DATE.to_string(), date_value(draft.date));
    fields.insert(
        FIELD_TIME.to_string(),
        optional_string_value(draft.time.map(format_hhmm)),
    );
    fields.insert(FIELD_CREATED_AT.to_string(), timestamp_value(now));
    fields.insert(FIELD_UPDATED_AT.to_string(), timestamp_value(now));
    fields
}

/// Encodes the present fields of `patch` plus `updatedAt`, returning the
/// fields and the matching update mask.
pub fn encode_patch_fields(
    patch: &TaskPatch,
    now: DateTime<Utc>,
) -> (Map<String, Value>, Vec<String>) {
    let mut fields = Map::new();
    if let Some(title) = patch.title.as_deref() {
        fields.insert(FIELD_TITLE.to_string(), string_value(title.trim()));
    }
    if let Some(completed) = patch.completed {
        fields.insert(FIELD_COMPLETED.to_string(), bool_value(completed));
    }
    if let Some(important) = patch.important {
        fields.insert(FIELD_IMPORTANT.to_string(), bool_value(important));
    }
    if let Some(my_day) = patch.my_day {
        fields.insert(FIELD_MY_DAY.to_string(), bool_value(my_day));
    }
    if let Some(list) = patch.list.as_deref() {
        fields.insert(FIELD_LIST.to_string(), string_value(list.trim()));
    }
    if let Some(date) = patch.date {
        fields.insert(FIELD_DATE.to_string(), date_value(date));
    }
    if let Some(time) = patch.time {
        fields.insert(
            FIELD_TIME.to_string(),
            optional_string_value(time.map(format_hhmm)),
        );
    }
    fields.insert(FIELD_UPDATED_AT.to_string(), timestamp_value(now));
    let mask = fields.keys().cloned().collect();
    (fields, mask)
}

/// Decodes a task document. Documents without an id, owner or title are not
/// tasks written by this app and decode to `None`.
pub fn decode_task_document(document: &FirestoreDocument) -> Result<Option<Task>, InfraError> {
    let Some(id) = document.document_id() else {
        return Ok(None);
    };
    let fields = &document.fields;
    let Some(user_id) = read_string(fields, FIELD_USER_ID).filter(|value| !value.trim().is_empty())
    else {
        return Ok(None);
    };
    let Some(title) = read_string(fields, FIELD_TITLE).filter(|value| !value.trim().is_empty())
    else {
        return Ok(None);
    };

    let date = match read_string(fields, FIELD_DATE).filter(|value| !value.trim().is_empty()) {
        Some(raw) => Some(parse_document_date(&raw)?),
        None => None,
    };
    let time = match read_string(fields, FIELD_TIME).filter(|value| !value.trim().is_empty()) {
        Some(raw) => Some(parse_hhmm(&raw).ok_or_else(|| {
            InfraError::RemoteUnavailable(format!("invalid task time '{raw}' in document {id}"))
        })?),
        None => None,
    };

    let created_at = read_timestamp(fields, FIELD_CREATED_AT)?
        .or(parse_optional_rfc3339(document.create_time.as_deref())?);
    let updated_at = read_timestamp(fields, FIELD_UPDATED_AT)?
        .or(parse_optional_rfc3339(document.update_time.as_deref())?);

    Ok(Some(Task {
        id: id.to_string(),
        title,
        completed: read_bool(fields, FIELD_COMPLETED),
        important: read_bool(fields, FIELD_IMPORTANT),
        my_day: read_bool(fields, FIELD_MY_DAY),
        list: read_string(fields, FIELD_LIST)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| PERSONAL_LIST_ID.to_string()),
        date,
        time,
        user_id,
        created_at,
        updated_at,
    }))
}

/// `runQuery` body selecting the tasks owned by `user_id`.
pub fn owner_query(user_id: &str) -> Value {
    json!({
        "structuredQuery": {
            "from": [{ "collectionId": TASKS_COLLECTION }],
            "where": {
                "fieldFilter": {
                    "field": { "fieldPath": FIELD_USER_ID },
                    "op": "EQUAL",
                    "value": string_value(user_id)
                }
            }
        }
    })
}

fn string_value(value: &str) -> Value {
    json!({ "stringValue": value })
}

fn optional_string_value(value: Option<String>) -> Value {
    match value {
        Some(value) => string_value(&value),
        None => json!({ "nullValue": null }),
    }
}

fn bool_value(value: bool) -> Value {
    json!({ "booleanValue": value })
}

fn date_value(value: Option<NaiveDate>) -> Value {
    optional_string_value(value.map(|date| date.format("%Y-%m-%d").to_string()))
}

fn timestamp_value(value: DateTime<Utc>) -> Value {
    json!({ "timestampValue": value.to_rfc3339_opts(SecondsFormat::Micros, true) })
}

fn read_string(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields
        .get(key)
        .and_then(|value| value.get("stringValue"))
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
}

fn read_bool(fields: &Map<String, Value>, key: &str) -> bool {
    fields
        .get(key)
        .and_then(|value| value.get("booleanValue"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn read_timestamp(
    fields: &Map<String, Value>,
    key: &str,
) -> Result<Option<DateTime<Utc>>, InfraError> {
    let raw = fields
        .get(key)
        .and_then(|value| value.get("timestampValue"))
        .and_then(Value::as_str);
    parse_optional_rfc3339(raw)
}

fn parse_optional_rfc3339(raw: Option<&str>) -> Result<Option<DateTime<Utc>>, InfraError> {
    let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(None);
    };
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| Some(parsed.with_timezone(&Utc)))
        .map_err(|error| InfraError::RemoteUnavailable(format!("invalid timestamp '{raw}': {error}")))
}

fn parse_document_date(raw: &str) -> Result<NaiveDate, InfraError> {
    let raw = raw.trim();
    // Some clients store a full ISO timestamp in the date field.
    let date_part = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map_err(|error| InfraError::RemoteUnavailable(format!("invalid task date '{raw}': {error}")))
}
