use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde_json::Value;
use zeroize::Zeroizing;

use sentinel::config::{BootstrapAdmin, HashingConfig};
use sentinel::models::audit::AuditFilter;
use sentinel::models::threat::{Severity, ThreatAnalysis};
use sentinel::models::user::NewUser;
use sentinel::services::governance::{LoggingIncidentResponder, ThreatDetector};
use sentinel::{AuthFailure, SecurityConfig, SecurityError, SecurityManager, TokenFailure};

static JWT_SECRET: Lazy<Vec<u8>> = Lazy::new(|| b"integration-test-signing-secret-0123456789".to_vec());

// Shared test context
struct TestContext {
    manager: SecurityManager,
}

impl TestContext {
    fn config() -> SecurityConfig {
        let mut config = SecurityConfig::new(JWT_SECRET.clone());
        config.auth.hashing = HashingConfig {
            memory_kib: 64,
            iterations: 1,
            parallelism: 1,
        };
        config.auth.bootstrap_admin = Some(BootstrapAdmin {
            username: "admin".to_string(),
            password: Zeroizing::new("admin123".to_string()),
            email: None,
        });
        config
    }

    async fn started() -> Self {
        let manager = SecurityManager::new(Self::config()).unwrap();
        manager.start().await.unwrap();
        Self { manager }
    }

    async fn add_user(&self, username: &str, password: &str) -> String {
        self.manager
            .auth()
            .create_user(NewUser::new(username, password))
            .await
            .unwrap()
            .id
    }
}

struct FixedDetector(Vec<ThreatAnalysis>);

#[async_trait]
impl ThreatDetector for FixedDetector {
    async fn analyze_threats(&self) -> sentinel::Result<Vec<ThreatAnalysis>> {
        Ok(self.0.clone())
    }
}

struct SlowResponder;

#[async_trait]
impl sentinel::services::governance::Collaborator for SlowResponder {
    fn name(&self) -> &str {
        "slow_responder"
    }

    async fn start(&self) -> sentinel::Result<()> {
        Ok(())
    }

    async fn stop(&self) -> sentinel::Result<()> {
        Ok(())
    }

    async fn status(&self) -> sentinel::Result<sentinel::models::status::CollaboratorStatus> {
        Ok(Default::default())
    }
}

#[async_trait]
impl sentinel::services::governance::IncidentResponder for SlowResponder {
    async fn handle_threat(&self, _threat: &ThreatAnalysis) -> sentinel::Result<()> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_admin_login_and_token_validation() {
        let context = TestContext::started().await;

        // Step 1: Login with the bootstrap admin
        let response = context.manager.login("admin", "admin123", None).await.unwrap();
        assert!(!response.access_token.is_empty());
        assert!(response.user.roles.contains(&"admin".to_string()));

        // Step 2: Validate the access token
        let profile = context
            .manager
            .validate_token(&response.access_token)
            .await
            .unwrap();
        assert_eq!(profile.username, "admin");

        // Step 3: Logout revokes the token
        context.manager.logout(&response.session_id).await.unwrap();
        assert!(matches!(
            context.manager.validate_token(&response.access_token).await,
            Err(SecurityError::Token(TokenFailure::Revoked))
        ));

        let logins = context
            .manager
            .get_audit_logs(&AuditFilter::for_user(profile.id.clone()))
            .await;
        let actions: Vec<(&str, &str)> = logins
            .iter()
            .map(|l| (l.action.as_str(), l.result.as_str()))
            .collect();
        assert_eq!(actions, vec![("login", "success"), ("logout", "success")]);

        context.manager.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_encryption_round_trip_and_tamper() {
        let context = TestContext::started().await;
        let plaintext = b"card number 4111 1111 1111 1111";

        let sealed = context.manager.encrypt_data(plaintext).await.unwrap();
        assert_ne!(&sealed[..], &plaintext[..]);
        assert_eq!(
            context.manager.decrypt_data(&sealed).await.unwrap(),
            plaintext.to_vec()
        );

        // Rewriting the key id must break authentication
        let mut envelope: Value = serde_json::from_slice(&sealed).unwrap();
        envelope["key_id"] = Value::String("forged-key".to_string());
        let forged = serde_json::to_vec(&envelope).unwrap();
        assert!(matches!(
            context.manager.decrypt_data(&forged).await,
            Err(SecurityError::Encryption(_))
        ));

        context.manager.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_lockout_is_audited() {
        let context = TestContext::started().await;
        let bob = context.add_user("bob", "bobpass123").await;

        for _ in 0..5 {
            assert!(matches!(
                context.manager.login("bob", "wrong-password1", None).await,
                Err(SecurityError::Authentication(AuthFailure::InvalidCredentials))
            ));
        }
        assert!(matches!(
            context.manager.login("bob", "bobpass123", None).await,
            Err(SecurityError::Authentication(AuthFailure::AccountLocked))
        ));

        let results: Vec<String> = context
            .manager
            .get_audit_logs(&AuditFilter::for_user(bob))
            .await
            .into_iter()
            .map(|l| l.result)
            .collect();
        assert_eq!(results, vec!["denied", "denied", "denied", "denied", "denied", "locked"]);

        let status = context.manager.get_status().await;
        assert_eq!(status.auth.locked_users, 1);

        context.manager.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_access_checks() {
        let context = TestContext::started().await;
        let admin = context
            .manager
            .auth()
            .get_user_by_username("admin")
            .await
            .unwrap();
        let bob = context.add_user("bob", "bobpass123").await;

        assert!(context.manager.check_access(&admin.id, "reports", "read").await.unwrap());
        assert!(!context.manager.check_access(&bob, "reports", "read").await.unwrap());
        assert!(!context.manager.check_access("ghost", "reports", "read").await.unwrap());

        let denied = context
            .manager
            .get_audit_logs(&AuditFilter {
                resource: Some("reports".to_string()),
                ..AuditFilter::default()
            })
            .await;
        let users: Vec<&str> = denied.iter().map(|l| l.user_id.as_str()).collect();
        assert_eq!(users, vec![bob.as_str(), "ghost"]);

        let status = context.manager.get_status().await;
        assert_eq!((status.access.allowed, status.access.denied), (1, 2));

        context.manager.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_lifecycle_errors_and_double_stop() {
        let manager = SecurityManager::new(TestContext::config()).unwrap();
        assert!(matches!(manager.stop().await, Err(SecurityError::Lifecycle(_))));

        manager.start().await.unwrap();
        assert!(matches!(manager.start().await, Err(SecurityError::Lifecycle(_))));

        manager.stop().await.unwrap();
        manager.stop().await.unwrap();

        let status = manager.get_status().await;
        assert!(!status.running);
        assert!(!status.encryption.running);
        assert!(!status.auth.running);
        assert!(!status.compliance.running);
    }

    #[tokio::test]
    async fn test_disabled_core_passes_through() {
        let mut config = TestContext::config();
        config.enabled = false;
        let manager = SecurityManager::new(config).unwrap();
        manager.start().await.unwrap();

        assert_eq!(manager.encrypt_data(b"plain").await.unwrap(), b"plain".to_vec());
        assert!(matches!(
            manager.login("admin", "admin123", None).await,
            Err(SecurityError::Validation(_))
        ));
        assert!(manager.check_access("anyone", "reports", "delete").await.unwrap());
        assert!(manager.get_audit_logs(&AuditFilter::default()).await.is_empty());

        let status = manager.get_status().await;
        assert!(!status.enabled);
        assert!(status.running);
        assert!(!status.monitor.running);

        manager.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_loop_forwards_threats() {
        let mut config = TestContext::config();
        config.auth.bootstrap_admin = None;
        config.monitor.interval = Duration::from_secs(1);
        let responder = Arc::new(LoggingIncidentResponder::new());
        let manager = SecurityManager::builder(config)
            .threat_detector(Arc::new(FixedDetector(vec![
                ThreatAnalysis::new("brute_force", Severity::High),
                ThreatAnalysis::new("port_scan", Severity::Low),
            ])))
            .incident_responder(responder.clone())
            .build()
            .unwrap();
        manager.start().await.unwrap();

        tokio::time::sleep(Duration::from_millis(3500)).await;
        manager.stop().await.unwrap();

        let monitor = manager.get_status().await.monitor;
        assert_eq!(monitor.scans, 3);
        assert_eq!(monitor.threats_seen, 6);
        assert_eq!(monitor.threats_forwarded, 3);
        assert_eq!(responder.handled().await.len(), 3);

        let responses = manager
            .get_audit_logs(&AuditFilter {
                action: Some("threat_response".to_string()),
                ..AuditFilter::default()
            })
            .await;
        assert_eq!(responses.len(), 3);
        assert!(responses.iter().all(|r| r.result == "forwarded"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_responder_times_out() {
        let mut config = TestContext::config();
        config.auth.bootstrap_admin = None;
        config.monitor.response_timeout = Duration::from_secs(5);
        let manager = SecurityManager::builder(config)
            .threat_detector(Arc::new(FixedDetector(vec![ThreatAnalysis::new(
                "exfiltration",
                Severity::Critical,
            )])))
            .incident_responder(Arc::new(SlowResponder))
            .build()
            .unwrap();
        manager.start().await.unwrap();

        assert_eq!(manager.run_threat_scan().await.unwrap(), 0);

        let responses = manager
            .get_audit_logs(&AuditFilter {
                action: Some("threat_response".to_string()),
                ..AuditFilter::default()
            })
            .await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].result, "timeout");

        manager.stop().await.unwrap();
    }
}
