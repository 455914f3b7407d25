use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry of the audit trail. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: String,
    pub user_id: String,
    pub action: String,
    pub resource: String,
    pub result: String,
    pub details: String,
    pub timestamp: DateTime<Utc>,
}

/// Selection criteria for `get_logs`. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub user_id: Option<String>,
    pub action: Option<String>,
    pub resource: Option<String>,
    /// Inclusive lower bound.
    pub start_time: Option<DateTime<Utc>>,
    /// Inclusive upper bound.
    pub end_time: Option<DateTime<Utc>>,
    /// Keep the first `limit` matches in append order. `None` or 0 keeps all.
    pub limit: Option<usize>,
}

impl AuditFilter {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, entry: &AuditLog) -> bool {
        if let Some(user_id) = &self.user_id {
            if &entry.user_id != user_id {
                return false;
            }
        }
        if let Some(action) = &self.action {
            if &entry.action != action {
                return false;
            }
        }
        if let Some(resource) = &self.resource {
            if &entry.resource != resource {
                return false;
            }
        }
        if let Some(start) = self.start_time {
            if entry.timestamp < start {
                return false;
            }
        }
        if let Some(end) = self.end_time {
            if entry.timestamp > end {
                return false;
            }
        }
        true
    }
}
