//! Governance collaborators driven by the security manager.
//!
//! Compliance reporting, incident response, vulnerability scanning and threat
//! detection are external concerns. The manager only needs the narrow traits
//! below; the `Basic*` types are in-memory stand-ins that track their own
//! lifecycle and nothing else.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::models::status::CollaboratorStatus;
use crate::models::threat::ThreatAnalysis;
use crate::worker::Lifecycle;

/// A component the manager starts, stops and reports on.
#[async_trait]
pub trait Collaborator: Send + Sync {
    fn name(&self) -> &str;
    async fn start(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
    async fn status(&self) -> Result<CollaboratorStatus>;
}

#[async_trait]
pub trait IncidentResponder: Collaborator {
    /// Acts on a single finding. Called under the manager's response timeout.
    async fn handle_threat(&self, threat: &ThreatAnalysis) -> Result<()>;
}

#[async_trait]
pub trait ThreatDetector: Send + Sync {
    async fn analyze_threats(&self) -> Result<Vec<ThreatAnalysis>>;
}

/// Reports no findings.
pub struct NoopThreatDetector;

#[async_trait]
impl ThreatDetector for NoopThreatDetector {
    async fn analyze_threats(&self) -> Result<Vec<ThreatAnalysis>> {
        Ok(Vec::new())
    }
}

/// Compliance manager with no frameworks attached.
pub struct BasicCompliance {
    lifecycle: Lifecycle,
}

impl BasicCompliance {
    pub fn new() -> Self {
        Self {
            lifecycle: Lifecycle::new("compliance manager"),
        }
    }
}

impl Default for BasicCompliance {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Collaborator for BasicCompliance {
    fn name(&self) -> &str {
        "compliance"
    }

    async fn start(&self) -> Result<()> {
        self.lifecycle.begin_start().await?;
        tracing::info!("✅ Compliance manager started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.lifecycle.stop().await?;
        Ok(())
    }

    async fn status(&self) -> Result<CollaboratorStatus> {
        Ok(CollaboratorStatus {
            name: self.name().to_string(),
            running: self.lifecycle.is_running().await,
            details: "no frameworks configured".to_string(),
        })
    }
}

/// Vulnerability scanner that never schedules a scan.
pub struct BasicScanner {
    lifecycle: Lifecycle,
}

impl BasicScanner {
    pub fn new() -> Self {
        Self {
            lifecycle: Lifecycle::new("vulnerability scanner"),
        }
    }
}

impl Default for BasicScanner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Collaborator for BasicScanner {
    fn name(&self) -> &str {
        "vulnerability_scanner"
    }

    async fn start(&self) -> Result<()> {
        self.lifecycle.begin_start().await?;
        tracing::info!("✅ Vulnerability scanner started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.lifecycle.stop().await?;
        Ok(())
    }

    async fn status(&self) -> Result<CollaboratorStatus> {
        Ok(CollaboratorStatus {
            name: self.name().to_string(),
            running: self.lifecycle.is_running().await,
            details: "no scans scheduled".to_string(),
        })
    }
}

/// Incident responder that logs each threat and keeps it for inspection.
pub struct LoggingIncidentResponder {
    lifecycle: Lifecycle,
    handled: RwLock<Vec<ThreatAnalysis>>,
}

impl LoggingIncidentResponder {
    pub fn new() -> Self {
        Self {
            lifecycle: Lifecycle::new("incident responder"),
            handled: RwLock::new(Vec::new()),
        }
    }

    /// Threats handled so far, oldest first.
    pub async fn handled(&self) -> Vec<ThreatAnalysis> {
        self.handled.read().await.clone()
    }
}

impl Default for LoggingIncidentResponder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Collaborator for LoggingIncidentResponder {
    fn name(&self) -> &str {
        "incident_response"
    }

    async fn start(&self) -> Result<()> {
        self.lifecycle.begin_start().await?;
        tracing::info!("✅ Incident responder started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.lifecycle.stop().await?;
        Ok(())
    }

    async fn status(&self) -> Result<CollaboratorStatus> {
        let handled = self.handled.read().await.len();
        Ok(CollaboratorStatus {
            name: self.name().to_string(),
            running: self.lifecycle.is_running().await,
            details: format!("{} incidents handled", handled),
        })
    }
}

#[async_trait]
impl IncidentResponder for LoggingIncidentResponder {
    async fn handle_threat(&self, threat: &ThreatAnalysis) -> Result<()> {
        tracing::warn!(
            threat_id = %threat.id,
            threat_type = %threat.threat_type,
            severity = %threat.severity,
            "🚨 Responding to threat"
        );
        self.handled.write().await.push(threat.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SecurityError;
    use crate::models::threat::Severity;

    #[tokio::test]
    async fn test_collaborator_lifecycle() {
        let scanner = BasicScanner::new();
        assert!(matches!(scanner.stop().await, Err(SecurityError::Lifecycle(_))));

        scanner.start().await.unwrap();
        assert!(scanner.status().await.unwrap().running);
        scanner.stop().await.unwrap();
        scanner.stop().await.unwrap();
        assert!(!scanner.status().await.unwrap().running);
    }

    #[tokio::test]
    async fn test_responder_records_threats() {
        let responder = LoggingIncidentResponder::new();
        responder
            .handle_threat(&ThreatAnalysis::new("brute_force", Severity::High))
            .await
            .unwrap();

        let handled = responder.handled().await;
        assert_eq!(handled.len(), 1);
        assert_eq!(handled[0].threat_type, "brute_force");
        assert_eq!(
            responder.status().await.unwrap().details,
            "1 incidents handled"
        );
    }

    #[tokio::test]
    async fn test_noop_detector() {
        assert!(NoopThreatDetector.analyze_threats().await.unwrap().is_empty());
    }
}
