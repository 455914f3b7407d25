use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;

use crate::config::{MonitorConfig, SecurityConfig};
use crate::error::{Result, SecurityError};
use crate::models::audit::{AuditFilter, AuditLog};
use crate::models::session::LoginResponse;
use crate::models::status::{CollaboratorStatus, MonitorStatus, SecurityStatus};
use crate::models::threat::ThreatAnalysis;
use crate::models::user::UserProfile;
use crate::services::access::{AccessController, AdminOnlyPolicy, PolicyEvaluator, Subject};
use crate::services::audit::AuditLogger;
use crate::services::auth::{AuthManager, DenyAllMfa, MfaValidator};
use crate::services::encryption::EncryptionManager;
use crate::services::governance::{
    BasicCompliance, BasicScanner, Collaborator, IncidentResponder, LoggingIncidentResponder,
    NoopThreatDetector, ThreatDetector,
};
use crate::store::{MemoryStore, Store};
use crate::worker::{self, Lifecycle};

/// User id recorded for events raised by the core itself.
pub const SYSTEM_ACTOR: &str = "system";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Audit,
    Encryption,
    Auth,
    Access,
    Compliance,
    Scanner,
    Responder,
}

impl Stage {
    /// Teardown runs this list backwards.
    const START_ORDER: [Stage; 7] = [
        Stage::Audit,
        Stage::Encryption,
        Stage::Auth,
        Stage::Access,
        Stage::Compliance,
        Stage::Scanner,
        Stage::Responder,
    ];
}

/// Periodic threat scan feeding the incident responder.
struct ThreatMonitor {
    config: MonitorConfig,
    detector: Arc<dyn ThreatDetector>,
    responder: Arc<dyn IncidentResponder>,
    audit: Arc<AuditLogger>,
    stats: RwLock<MonitorStatus>,
}

impl ThreatMonitor {
    /// One detection pass. Returns the number of threats handed to the responder.
    async fn scan(&self) -> Result<usize> {
        let threats = timeout(self.config.response_timeout, self.detector.analyze_threats())
            .await
            .map_err(|_| SecurityError::Timeout("threat detection".to_string()))??;

        let mut forwarded = 0;
        for threat in &threats {
            if !threat.severity.is_actionable() {
                tracing::debug!(threat_id = %threat.id, severity = %threat.severity, "Threat noted");
                continue;
            }
            if !self.config.auto_response {
                tracing::warn!(
                    threat_id = %threat.id,
                    threat_type = %threat.threat_type,
                    severity = %threat.severity,
                    "⚠️ Threat detected, automatic response disabled"
                );
                continue;
            }
            if self.respond(threat).await {
                forwarded += 1;
            }
        }

        let mut stats = self.stats.write().await;
        stats.scans += 1;
        stats.threats_seen += threats.len() as u64;
        stats.threats_forwarded += forwarded as u64;
        stats.last_scan = Some(Utc::now());
        Ok(forwarded)
    }

    async fn respond(&self, threat: &ThreatAnalysis) -> bool {
        let outcome = timeout(self.config.response_timeout, self.responder.handle_threat(threat)).await;
        let (handled, result) = match outcome {
            Ok(Ok(())) => (true, "forwarded"),
            Ok(Err(e)) => {
                tracing::error!(threat_id = %threat.id, "❌ Incident response failed: {}", e);
                (false, "failed")
            }
            Err(_) => {
                tracing::error!(
                    threat_id = %threat.id,
                    timeout = ?self.config.response_timeout,
                    "❌ Incident response timed out"
                );
                (false, "timeout")
            }
        };

        if let Err(e) = self
            .audit
            .log_event(
                SYSTEM_ACTOR,
                "threat_response",
                &threat.threat_type,
                result,
                &format!("{} severity {}", threat.id, threat.severity),
            )
            .await
        {
            tracing::warn!("Failed to audit threat response: {}", e);
        }
        handled
    }
}

/// Assembles a `SecurityManager`. Every collaborator has an in-memory default.
pub struct SecurityManagerBuilder {
    config: SecurityConfig,
    store: Option<Arc<dyn Store>>,
    mfa: Option<Arc<dyn MfaValidator>>,
    policy: Option<Arc<dyn PolicyEvaluator>>,
    detector: Option<Arc<dyn ThreatDetector>>,
    compliance: Option<Arc<dyn Collaborator>>,
    responder: Option<Arc<dyn IncidentResponder>>,
    scanner: Option<Arc<dyn Collaborator>>,
}

impl SecurityManagerBuilder {
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn mfa(mut self, mfa: Arc<dyn MfaValidator>) -> Self {
        self.mfa = Some(mfa);
        self
    }

    pub fn policy(mut self, policy: Arc<dyn PolicyEvaluator>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn threat_detector(mut self, detector: Arc<dyn ThreatDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn compliance(mut self, compliance: Arc<dyn Collaborator>) -> Self {
        self.compliance = Some(compliance);
        self
    }

    pub fn incident_responder(mut self, responder: Arc<dyn IncidentResponder>) -> Self {
        self.responder = Some(responder);
        self
    }

    pub fn vulnerability_scanner(mut self, scanner: Arc<dyn Collaborator>) -> Self {
        self.scanner = Some(scanner);
        self
    }

    /// Validates the configuration and wires the components together.
    ///
    /// With the master switch off, every component is built disabled.
    pub fn build(self) -> Result<SecurityManager> {
        let mut config = self.config;
        config.check()?;

        if !config.enabled {
            config.encryption.enabled = false;
            config.auth.enabled = false;
            config.audit.enabled = false;
            config.access.enabled = false;
            config.monitor.enabled = false;
        }

        let store = self.store.unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let mfa = self.mfa.unwrap_or_else(|| Arc::new(DenyAllMfa));
        let policy = self.policy.unwrap_or_else(|| Arc::new(AdminOnlyPolicy));
        let responder = self
            .responder
            .unwrap_or_else(|| Arc::new(LoggingIncidentResponder::new()));

        let audit = Arc::new(AuditLogger::new(config.audit.clone(), store.clone()));
        let monitor = Arc::new(ThreatMonitor {
            config: config.monitor.clone(),
            detector: self.detector.unwrap_or_else(|| Arc::new(NoopThreatDetector)),
            responder: responder.clone(),
            audit: audit.clone(),
            stats: RwLock::new(MonitorStatus::default()),
        });

        Ok(SecurityManager {
            encryption: EncryptionManager::new(config.encryption.clone(), store.clone()),
            auth: AuthManager::new(config.auth.clone(), store, mfa),
            audit,
            access: AccessController::with_policy(config.access.clone(), policy),
            compliance: self
                .compliance
                .unwrap_or_else(|| Arc::new(BasicCompliance::new())),
            scanner: self.scanner.unwrap_or_else(|| Arc::new(BasicScanner::new())),
            responder,
            monitor,
            config,
            lifecycle: Lifecycle::new("security manager"),
            transition: Mutex::new(()),
        })
    }
}

/// Single entry point over encryption, authentication, audit, access control
/// and the governance collaborators.
pub struct SecurityManager {
    config: SecurityConfig,
    encryption: EncryptionManager,
    auth: AuthManager,
    audit: Arc<AuditLogger>,
    access: AccessController,
    compliance: Arc<dyn Collaborator>,
    scanner: Arc<dyn Collaborator>,
    responder: Arc<dyn IncidentResponder>,
    monitor: Arc<ThreatMonitor>,
    lifecycle: Lifecycle,
    /// Serializes `start` and `stop`.
    transition: Mutex<()>,
}

impl SecurityManager {
    /// Creates a manager with default collaborators.
    pub fn new(config: SecurityConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: SecurityConfig) -> SecurityManagerBuilder {
        SecurityManagerBuilder {
            config,
            store: None,
            mfa: None,
            policy: None,
            detector: None,
            compliance: None,
            responder: None,
            scanner: None,
        }
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    pub fn encryption(&self) -> &EncryptionManager {
        &self.encryption
    }

    pub fn auth(&self) -> &AuthManager {
        &self.auth
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    pub fn access(&self) -> &AccessController {
        &self.access
    }

    /// Starts every component, then the threat monitor.
    ///
    /// If a component fails to start, the ones already running are stopped
    /// again and the manager stays stopped.
    pub async fn start(&self) -> Result<()> {
        let _guard = self.transition.lock().await;
        let shutdown = self.lifecycle.begin_start().await?;

        if !self.config.enabled {
            tracing::info!("Security core disabled, no components started");
            return Ok(());
        }

        tracing::info!("🔐 Starting security core...");
        let mut started = Vec::with_capacity(Stage::START_ORDER.len());
        for stage in Stage::START_ORDER {
            if let Err(e) = self.start_stage(stage).await {
                tracing::error!(stage = ?stage, "❌ Security core failed to start: {}", e);
                self.roll_back(&started).await;
                return Err(e);
            }
            started.push(stage);
        }

        if self.config.monitor.enabled {
            let monitor = self.monitor.clone();
            let handle = worker::spawn_periodic(
                "threat-monitor",
                self.config.monitor.interval,
                shutdown,
                move || {
                    let monitor = monitor.clone();
                    async move {
                        if let Err(e) = monitor.scan().await {
                            tracing::error!("❌ Threat scan failed: {}", e);
                        }
                    }
                },
            );
            match handle {
                Ok(handle) => self.lifecycle.attach(handle).await,
                Err(e) => {
                    tracing::error!("❌ Threat monitor failed to start: {}", e);
                    self.roll_back(&started).await;
                    return Err(e);
                }
            }
        }

        tracing::info!("✅ Security core started");
        Ok(())
    }

    /// Stops the monitor, then every component in reverse start order.
    ///
    /// A component that fails to stop is logged and skipped.
    pub async fn stop(&self) -> Result<()> {
        let _guard = self.transition.lock().await;
        if !self.lifecycle.stop().await? {
            return Ok(());
        }

        if self.config.enabled {
            for stage in Stage::START_ORDER.iter().rev() {
                if let Err(e) = self.stop_stage(*stage).await {
                    tracing::warn!(stage = ?stage, "Component failed to stop: {}", e);
                }
            }
        }

        tracing::info!("Security core stopped");
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.lifecycle.is_running().await
    }

    /// Stops `started` in reverse and leaves the manager idle.
    async fn roll_back(&self, started: &[Stage]) {
        for stage in started.iter().rev() {
            if let Err(e) = self.stop_stage(*stage).await {
                tracing::warn!(stage = ?stage, "Rollback stop failed: {}", e);
            }
        }
        self.lifecycle.abort_start().await;
    }

    async fn start_stage(&self, stage: Stage) -> Result<()> {
        match stage {
            Stage::Audit => self.audit.start().await,
            Stage::Encryption => self.encryption.start().await,
            Stage::Auth => self.auth.start().await,
            Stage::Access => self.access.start().await,
            Stage::Compliance => self.compliance.start().await,
            Stage::Scanner => self.scanner.start().await,
            Stage::Responder => self.responder.start().await,
        }
    }

    async fn stop_stage(&self, stage: Stage) -> Result<()> {
        match stage {
            Stage::Audit => self.audit.stop().await,
            Stage::Encryption => self.encryption.stop().await,
            Stage::Auth => self.auth.stop().await,
            Stage::Access => self.access.stop().await,
            Stage::Compliance => self.compliance.stop().await,
            Stage::Scanner => self.scanner.stop().await,
            Stage::Responder => self.responder.stop().await,
        }
    }

    /// Appends an audit record, logging instead of failing the caller.
    async fn record(&self, user_id: &str, action: &str, resource: &str, result: &str, details: &str) {
        if let Err(e) = self
            .audit
            .log_event(user_id, action, resource, result, details)
            .await
        {
            tracing::warn!(action, "Failed to write audit record: {}", e);
        }
    }

    pub async fn encrypt_data(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.encryption.encrypt(plaintext).await
    }

    pub async fn decrypt_data(&self, envelope: &[u8]) -> Result<Vec<u8>> {
        self.encryption.decrypt(envelope).await
    }

    /// Authenticates a user. Success and failure are both audited.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        mfa_token: Option<&str>,
    ) -> Result<LoginResponse> {
        match self.auth.login(username, password, mfa_token).await {
            Ok(response) => {
                self.record(
                    &response.user.id,
                    "login",
                    "auth",
                    "success",
                    &format!("session {}", response.session_id),
                )
                .await;
                Ok(response)
            }
            Err(e) => {
                let actor = self
                    .auth
                    .get_user_by_username(username)
                    .await
                    .map(|user| user.id)
                    .unwrap_or_else(|_| username.to_string());
                self.record(&actor, "login", "auth", e.kind(), &e.to_string())
                    .await;
                Err(e)
            }
        }
    }

    pub async fn logout(&self, session_id: &str) -> Result<()> {
        let user_id = self.auth.logout(session_id).await?;
        self.record(
            &user_id,
            "logout",
            "auth",
            "success",
            &format!("session {}", session_id),
        )
        .await;
        Ok(())
    }

    pub async fn validate_token(&self, token: &str) -> Result<UserProfile> {
        self.auth.validate_token(token).await
    }

    /// Checks whether `user_id` may perform `action` on `resource`.
    ///
    /// Unknown users are evaluated with no roles. Denials are audited.
    pub async fn check_access(&self, user_id: &str, resource: &str, action: &str) -> Result<bool> {
        let subject = match self.auth.get_user(user_id).await {
            Ok(profile) => Subject {
                user_id: profile.id,
                roles: profile.roles,
                permissions: profile.permissions,
            },
            Err(SecurityError::UserNotFound) => Subject::new(user_id),
            Err(e) => return Err(e),
        };

        let allowed = self.access.check_access(&subject, resource, action)?;
        if !allowed {
            self.record(user_id, action, resource, "denied", "access check")
                .await;
        }
        Ok(allowed)
    }

    pub async fn log_event(
        &self,
        user_id: &str,
        action: &str,
        resource: &str,
        result: &str,
        details: &str,
    ) -> Result<()> {
        self.audit
            .log_event(user_id, action, resource, result, details)
            .await
    }

    pub async fn get_audit_logs(&self, filter: &AuditFilter) -> Vec<AuditLog> {
        self.audit.get_logs(filter).await
    }

    /// Runs one threat scan now, outside the periodic schedule.
    ///
    /// # Returns
    ///
    /// The number of threats handed to the incident responder.
    pub async fn run_threat_scan(&self) -> Result<usize> {
        self.monitor.scan().await
    }

    /// Collects every component's status.
    ///
    /// A component whose status lookup fails is reported with default values.
    pub async fn get_status(&self) -> SecurityStatus {
        let mut monitor = self.monitor.stats.read().await.clone();
        let running = self.lifecycle.is_running().await;
        monitor.running = running && self.config.monitor.enabled;

        SecurityStatus {
            enabled: self.config.enabled,
            running,
            encryption: degrade("encryption", self.encryption.status().await),
            auth: degrade("auth", self.auth.status().await),
            audit: degrade("audit", self.audit.status().await),
            access: degrade("access", self.access.status().await),
            compliance: collaborator_status(self.compliance.as_ref()).await,
            incident_response: collaborator_status(self.responder.as_ref()).await,
            vulnerability_scanner: collaborator_status(self.scanner.as_ref()).await,
            monitor,
        }
    }
}

fn degrade<T: Default>(component: &str, status: Result<T>) -> T {
    status.unwrap_or_else(|e| {
        tracing::warn!(component, "Status unavailable: {}", e);
        T::default()
    })
}

async fn collaborator_status<C: Collaborator + ?Sized>(collaborator: &C) -> CollaboratorStatus {
    let name = collaborator.name().to_string();
    let status = degrade(&name, collaborator.status().await);
    if status.name.is_empty() {
        CollaboratorStatus { name, ..status }
    } else {
        status
    }
}
