use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

/// Stable in-process identity of a task.
///
/// Never persisted: the stored layout addresses tasks by position only, so a
/// fresh id is minted for every record on load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(skip)]
    pub id: TaskId,

    pub text: String,

    #[serde(default)]
    pub completed: bool,

    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(text: String, now: DateTime<Utc>) -> Self {
        Self {
            id: TaskId::new(),
            text,
            completed: false,
            created_at: Some(now),
        }
    }
}

/// Accepts RFC 3339 strings and epoch milliseconds; anything else reads as
/// absent instead of rejecting the whole record.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    let parsed = match &raw {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    };
    if parsed.is_none() && !raw.is_null() {
        debug!(value = %raw, "ignoring unreadable createdAt");
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::Task;

    #[test]
    fn serializes_with_camel_case_created_at() {
        let now = Utc
            .with_ymd_and_hms(2026, 3, 1, 9, 30, 0)
            .single()
            .expect("valid now");
        let task = Task::new("buy milk".to_string(), now);

        let json = serde_json::to_value(&task).expect("serialize task");
        assert_eq!(json["text"], "buy milk");
        assert_eq!(json["completed"], false);
        assert_eq!(json["createdAt"], "2026-03-01T09:30:00Z");
        assert!(json.get("id").is_none());
    }

    #[test]
    fn reads_records_without_created_at() {
        let task: Task =
            serde_json::from_str(r#"{"text":"walk dog","completed":true}"#).expect("parse task");
        assert_eq!(task.text, "walk dog");
        assert!(task.completed);
        assert!(task.created_at.is_none());
    }

    #[test]
    fn created_at_accepts_epoch_millis_and_ignores_junk() {
        let task: Task =
            serde_json::from_str(r#"{"text":"a","completed":false,"createdAt":1700000000000}"#)
                .expect("parse millis");
        assert_eq!(
            task.created_at.map(|dt| dt.timestamp_millis()),
            Some(1_700_000_000_000)
        );

        for junk in [r#""last tuesday""#, "null", "true", r#"{"y":2026}"#, "-1.5"] {
            let raw = format!(r#"{{"text":"a","completed":true,"createdAt":{junk}}}"#);
            let task: Task = serde_json::from_str(&raw).expect("record still parses");
            assert!(task.created_at.is_none(), "createdAt {junk} should read as absent");
            assert!(task.completed);
        }
    }

    #[test]
    fn every_load_mints_a_fresh_id() {
        let raw = r#"{"text":"same","completed":false}"#;
        let a: Task = serde_json::from_str(raw).expect("parse a");
        let b: Task = serde_json::from_str(raw).expect("parse b");
        assert_ne!(a.id, b.id);
    }
}
