//! Shape-based classification of stream records into progress events.
//!
//! The service sends no explicit discriminant, so records are recognised by
//! which fields they carry. Rules are checked in a fixed order and the first
//! match wins:
//!
//! 1. `stage` → `Status`
//! 2. `searchPlan` → `Plan`
//! 3. `currentSearch` + `searchItem` → `SearchStarted`
//! 4. `currentSearch` + `completed` → `SearchCompleted`
//! 5. `currentSearch` + `error` → `SearchFailed`
//! 6. `success` → `Complete` when `true`, otherwise `Failed`
//!
//! A record that commits to a rule but carries an unusable value for one of
//! that rule's fields is reported as malformed rather than falling through.

use research_core::{ProgressEvent, SearchItem};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::types::DEFAULT_FAILURE_MESSAGE;
use crate::Record;

const DEFAULT_SEARCH_ERROR: &str = "search failed";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassificationMiss {
    #[error("no rule matches record with keys [{}]", .keys.join(", "))]
    NoMatch { keys: Vec<String> },
    #[error("{rule} record has unusable `{field}`: {message}")]
    Malformed {
        rule: &'static str,
        field: &'static str,
        message: String,
    },
}

pub fn classify(record: &Record) -> Result<ProgressEvent, ClassificationMiss> {
    if let Some(stage) = record.get("stage") {
        return Ok(ProgressEvent::Status {
            stage: required_text("status", "stage", stage)?,
            message: text_field(record, "message"),
        });
    }

    if let Some(plan) = record.get("searchPlan") {
        return Ok(ProgressEvent::Plan {
            items: typed("plan", "searchPlan", plan)?,
            message: text_field(record, "message"),
        });
    }

    if let Some(current) = record.get("currentSearch") {
        if let Some(item) = record.get("searchItem") {
            return Ok(ProgressEvent::SearchStarted {
                index: count("search_started", "currentSearch", current)?,
                item: typed::<SearchItem>("search_started", "searchItem", item)?,
                message: text_field(record, "message"),
            });
        }
        if let Some(completed) = record.get("completed") {
            return Ok(ProgressEvent::SearchCompleted {
                index: count("search_completed", "currentSearch", current)?,
                completed: count("search_completed", "completed", completed)?,
                message: text_field(record, "message"),
            });
        }
        if record.contains_key("error") {
            return Ok(ProgressEvent::SearchFailed {
                index: count("search_failed", "currentSearch", current)?,
                error: text_field(record, "error")
                    .unwrap_or_else(|| DEFAULT_SEARCH_ERROR.to_string()),
            });
        }
    }

    if let Some(success) = record.get("success") {
        if success == &Value::Bool(true) {
            return Ok(ProgressEvent::Complete {
                query: text_field(record, "query"),
                result: record.get("result").cloned().unwrap_or(Value::Null),
            });
        }
        let message = text_field(record, "message")
            .or_else(|| text_field(record, "error"))
            .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string());
        return Ok(ProgressEvent::Failed { message });
    }

    Err(ClassificationMiss::NoMatch {
        keys: record.keys().cloned().collect(),
    })
}

/// Text view of an optional field; non-string values are rendered as JSON.
fn text_field(record: &Record, key: &str) -> Option<String> {
    match record.get(key)? {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

fn required_text(
    rule: &'static str,
    field: &'static str,
    value: &Value,
) -> Result<String, ClassificationMiss> {
    match value {
        Value::String(text) => Ok(text.clone()),
        Value::Null => Err(malformed(rule, field, "null")),
        other => Ok(other.to_string()),
    }
}

fn count(rule: &'static str, field: &'static str, value: &Value) -> Result<usize, ClassificationMiss> {
    value
        .as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| malformed(rule, field, format!("expected a non-negative integer, got {value}")))
}

fn typed<T: DeserializeOwned>(
    rule: &'static str,
    field: &'static str,
    value: &Value,
) -> Result<T, ClassificationMiss> {
    serde_json::from_value(value.clone()).map_err(|err| malformed(rule, field, err.to_string()))
}

fn malformed(rule: &'static str, field: &'static str, message: impl Into<String>) -> ClassificationMiss {
    ClassificationMiss::Malformed {
        rule,
        field,
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn status_record() {
        let event = classify(&record(json!({"stage": "planning", "message": "m"}))).unwrap();
        assert_eq!(
            event,
            ProgressEvent::Status {
                stage: "planning".into(),
                message: Some("m".into())
            }
        );
    }

    #[test]
    fn stage_wins_over_success() {
        let event = classify(&record(json!({"stage": "reporting", "success": true}))).unwrap();
        assert!(matches!(event, ProgressEvent::Status { .. }));
    }

    #[test]
    fn plan_record() {
        let event = classify(&record(json!({
            "searchPlan": [
                {"query": "a", "reason": "ra"},
                {"query": "b"}
            ],
            "message": "Created plan"
        })))
        .unwrap();
        assert_eq!(
            event,
            ProgressEvent::Plan {
                items: vec![SearchItem::new("a", "ra"), SearchItem::new("b", "")],
                message: Some("Created plan".into()),
            }
        );
    }

    #[test]
    fn search_lifecycle_records() {
        let started = classify(&record(json!({
            "currentSearch": 1,
            "totalSearches": 3,
            "searchItem": {"query": "a", "reason": "ra"},
            "message": "Searching a"
        })))
        .unwrap();
        assert_eq!(
            started,
            ProgressEvent::SearchStarted {
                index: 1,
                item: SearchItem::new("a", "ra"),
                message: Some("Searching a".into()),
            }
        );

        let completed = classify(&record(json!({"currentSearch": 1, "completed": 1}))).unwrap();
        assert_eq!(
            completed,
            ProgressEvent::SearchCompleted {
                index: 1,
                completed: 1,
                message: None
            }
        );

        let failed = classify(&record(json!({"currentSearch": 2, "error": "timeout"}))).unwrap();
        assert_eq!(
            failed,
            ProgressEvent::SearchFailed {
                index: 2,
                error: "timeout".into()
            }
        );
    }

    #[test]
    fn search_item_wins_over_completed_and_error() {
        let event = classify(&record(json!({
            "currentSearch": 1,
            "searchItem": {"query": "a", "reason": ""},
            "completed": 0,
            "error": "x"
        })))
        .unwrap();
        assert!(matches!(event, ProgressEvent::SearchStarted { .. }));
    }

    #[test]
    fn terminal_records() {
        let complete = classify(&record(json!({"success": true, "query": "q", "result": {"report": "r"}})))
            .unwrap();
        assert_eq!(
            complete,
            ProgressEvent::Complete {
                query: Some("q".into()),
                result: json!({"report": "r"}),
            }
        );

        let failed = classify(&record(json!({"success": false, "error": "E", "message": "M"}))).unwrap();
        assert_eq!(failed, ProgressEvent::failed("M"));

        let failed = classify(&record(json!({"success": false, "error": "E"}))).unwrap();
        assert_eq!(failed, ProgressEvent::failed("E"));

        let failed = classify(&record(json!({"success": "yes"}))).unwrap();
        assert_eq!(failed, ProgressEvent::failed(DEFAULT_FAILURE_MESSAGE));
    }

    #[test]
    fn current_search_alone_falls_through() {
        let miss = classify(&record(json!({"currentSearch": 1, "totalSearches": 2}))).unwrap_err();
        assert_eq!(
            miss,
            ClassificationMiss::NoMatch {
                keys: vec!["currentSearch".into(), "totalSearches".into()]
            }
        );
    }

    #[test]
    fn unknown_shape_is_a_miss() {
        let miss = classify(&record(json!({"heartbeat": 1}))).unwrap_err();
        assert_eq!(miss.to_string(), "no rule matches record with keys [heartbeat]");
    }

    #[test]
    fn committed_rule_with_bad_field_is_malformed() {
        let miss = classify(&record(json!({"searchPlan": "not a list"}))).unwrap_err();
        assert!(matches!(
            miss,
            ClassificationMiss::Malformed {
                rule: "plan",
                field: "searchPlan",
                ..
            }
        ));

        let miss = classify(&record(json!({"currentSearch": -1, "error": "x"}))).unwrap_err();
        assert!(matches!(
            miss,
            ClassificationMiss::Malformed {
                field: "currentSearch",
                ..
            }
        ));
    }
}
