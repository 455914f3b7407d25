use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::config::AuditConfig;
use crate::error::Result;
use crate::models::audit::{AuditFilter, AuditLog};
use crate::models::status::AuditStatus;
use crate::store::{self, Store};
use crate::worker::Lifecycle;

const AUDIT_PREFIX: &str = "audit:";

#[derive(Default)]
struct AuditState {
    entries: Vec<AuditLog>,
    sequence: u64,
}

/// Append-only accountability trail.
///
/// There is no update, delete or redact path. `retention_days` is only
/// reported; compaction belongs to whoever owns the store.
pub struct AuditLogger {
    config: AuditConfig,
    store: Arc<dyn Store>,
    state: RwLock<AuditState>,
    lifecycle: Lifecycle,
}

impl AuditLogger {
    pub fn new(config: AuditConfig, store: Arc<dyn Store>) -> Self {
        Self {
            config,
            store,
            state: RwLock::new(AuditState::default()),
            lifecycle: Lifecycle::new("audit logger"),
        }
    }

    pub async fn start(&self) -> Result<()> {
        self.lifecycle.begin_start().await?;
        tracing::info!(retention_days = self.config.retention_days, "✅ Audit logger started");
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        if self.lifecycle.stop().await? {
            tracing::info!("Audit logger stopped");
        }
        Ok(())
    }

    /// Appends a record. A no-op when auditing is disabled.
    #[tracing::instrument(skip(self, details))]
    pub async fn log_event(
        &self,
        user_id: &str,
        action: &str,
        resource: &str,
        result: &str,
        details: &str,
    ) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }

        let entry = {
            let mut state = self.state.write().await;
            state.sequence += 1;
            let now = Utc::now();
            let entry = AuditLog {
                id: format!(
                    "{:020}-{:06}",
                    now.timestamp_nanos_opt().unwrap_or_default(),
                    state.sequence
                ),
                user_id: user_id.to_string(),
                action: action.to_string(),
                resource: resource.to_string(),
                result: result.to_string(),
                details: details.to_string(),
                timestamp: now,
            };
            state.entries.push(entry.clone());
            entry
        };

        store::put_record(
            self.store.as_ref(),
            &format!("{}{}", AUDIT_PREFIX, entry.id),
            &entry,
        )?;
        tracing::debug!(audit_id = %entry.id, "Audit event recorded");
        Ok(())
    }

    /// Matching entries in append order, truncated from the front.
    ///
    /// This is the first `limit` matches, not the most recent ones.
    pub async fn get_logs(&self, filter: &AuditFilter) -> Vec<AuditLog> {
        let state = self.state.read().await;
        let matches = state.entries.iter().filter(|e| filter.matches(e)).cloned();
        match filter.limit {
            Some(limit) if limit > 0 => matches.take(limit).collect(),
            _ => matches.collect(),
        }
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn status(&self) -> Result<AuditStatus> {
        Ok(AuditStatus {
            enabled: self.config.enabled,
            running: self.lifecycle.is_running().await,
            total_entries: self.len().await,
            retention_days: self.config.retention_days,
        })
    }
}
