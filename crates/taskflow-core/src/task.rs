use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Lowest legal priority number (highest precedence).
pub const MIN_PRIORITY: i32 = 1;
/// Highest legal priority number (lowest precedence).
pub const MAX_PRIORITY: i32 = 5;

pub const MIN_NAME_LEN: usize = 1;
pub const MAX_NAME_LEN: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "processing" => Some(TaskStatus::Processing),
            "completed" => Some(TaskStatus::Completed),
            "failed" => Some(TaskStatus::Failed),
            _ => None,
        }
    }

    /// Whether `self -> next` is an edge of the status DAG:
    /// `pending -> processing -> {completed, failed}`, `failed -> pending` (retry).
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        match (*self, next) {
            (s, n) if s == n => true,
            (Pending, Processing) => true,
            (Processing, Completed) | (Processing, Failed) => true,
            (Failed, Pending) => true,
            _ => false,
        }
    }
}

/// A durably-identified unit of work with priority, payload, status, and timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub name: String,
    pub priority: i32,
    pub payload: HashMap<String, Value>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub receipt_handle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub retry_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub max_retries: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error_message: Option<String>,
}

impl Task {
    pub fn new(
        name: String,
        priority: i32,
        payload: HashMap<String, Value>,
        retry_count: Option<u32>,
        max_retries: Option<u32>,
    ) -> Result<Self> {
        validate_name(&name)?;
        validate_priority(priority)?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            name,
            priority,
            payload,
            status: TaskStatus::Pending,
            created_at: now,
            updated_at: now,
            receipt_handle: None,
            retry_count,
            max_retries,
            error_message: None,
        })
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Move to `next` if the status DAG allows it, bumping `updated_at`. Idempotent
    /// on equal status. Returns `TransitionDisallowed` otherwise.
    pub fn transition_to(&mut self, next: TaskStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::TransitionDisallowed(format!(
                "{} -> {}",
                self.status.as_str(),
                next.as_str()
            )));
        }
        self.status = next;
        self.touch();
        Ok(())
    }
}

pub fn validate_priority(priority: i32) -> Result<()> {
    if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&priority) {
        return Err(Error::invalid_input(format!(
            "priority must be in [{MIN_PRIORITY}, {MAX_PRIORITY}], got {priority}"
        )));
    }
    Ok(())
}

pub fn validate_name(name: &str) -> Result<()> {
    let len = name.chars().count();
    if !(MIN_NAME_LEN..=MAX_NAME_LEN).contains(&len) {
        return Err(Error::invalid_input(format!(
            "name length must be in [{MIN_NAME_LEN}, {MAX_NAME_LEN}], got {len}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_dag_forbids_completed_to_pending() {
        let mut task = Task::new("t".into(), 1, HashMap::new(), None, None).unwrap();
        task.transition_to(TaskStatus::Processing).unwrap();
        task.transition_to(TaskStatus::Completed).unwrap();
        assert!(task.transition_to(TaskStatus::Pending).is_err());
    }

    #[test]
    fn failed_to_pending_is_the_only_backward_edge() {
        let mut task = Task::new("t".into(), 1, HashMap::new(), None, None).unwrap();
        task.transition_to(TaskStatus::Processing).unwrap();
        task.transition_to(TaskStatus::Failed).unwrap();
        assert!(task.transition_to(TaskStatus::Pending).is_ok());
    }

    #[test]
    fn same_status_transition_is_idempotent() {
        let mut task = Task::new("t".into(), 1, HashMap::new(), None, None).unwrap();
        assert!(task.transition_to(TaskStatus::Pending).is_ok());
    }

    #[test]
    fn rejects_priority_out_of_range() {
        assert!(Task::new("t".into(), 0, HashMap::new(), None, None).is_err());
        assert!(Task::new("t".into(), 6, HashMap::new(), None, None).is_err());
    }

    #[test]
    fn rejects_empty_or_overlong_name() {
        assert!(Task::new("".into(), 1, HashMap::new(), None, None).is_err());
        let long = "x".repeat(101);
        assert!(Task::new(long, 1, HashMap::new(), None, None).is_err());
    }

    #[test]
    fn updated_at_is_monotone_nondecreasing() {
        let mut task = Task::new("t".into(), 1, HashMap::new(), None, None).unwrap();
        let before = task.updated_at;
        task.transition_to(TaskStatus::Processing).unwrap();
        assert!(task.updated_at >= before);
    }
}
