use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// High and critical findings warrant an automated response.
    pub fn is_actionable(&self) -> bool {
        matches!(self, Severity::High | Severity::Critical)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// A finding produced by the threat detector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreatAnalysis {
    pub id: String,
    pub threat_type: String,
    pub severity: Severity,
    pub description: String,
    pub source: String,
    pub detected_at: DateTime<Utc>,
}

impl ThreatAnalysis {
    pub fn new(threat_type: impl Into<String>, severity: Severity) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            threat_type: threat_type.into(),
            severity,
            description: String::new(),
            source: String::new(),
            detected_at: Utc::now(),
        }
    }
}
