use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionStatus {
    pub enabled: bool,
    pub running: bool,
    pub algorithm: String,
    pub active_key_id: Option<String>,
    pub key_count: usize,
    pub last_rotation: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthStatus {
    pub enabled: bool,
    pub running: bool,
    pub total_users: usize,
    pub locked_users: usize,
    /// Sessions whose expiry is still in the future.
    pub active_sessions: usize,
    pub mfa_enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStatus {
    pub enabled: bool,
    pub running: bool,
    pub total_entries: usize,
    pub retention_days: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessStatus {
    pub enabled: bool,
    pub running: bool,
    pub policy: String,
    pub allowed: u64,
    pub denied: u64,
}

/// Snapshot reported by an external governance collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollaboratorStatus {
    pub name: String,
    pub running: bool,
    pub details: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorStatus {
    pub running: bool,
    pub scans: u64,
    pub threats_seen: u64,
    pub threats_forwarded: u64,
    pub last_scan: Option<DateTime<Utc>>,
}

/// Aggregate returned by `SecurityManager::get_status`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityStatus {
    pub enabled: bool,
    pub running: bool,
    pub encryption: EncryptionStatus,
    pub auth: AuthStatus,
    pub audit: AuditStatus,
    pub access: AccessStatus,
    pub compliance: CollaboratorStatus,
    pub incident_response: CollaboratorStatus,
    pub vulnerability_scanner: CollaboratorStatus,
    pub monitor: MonitorStatus,
}
