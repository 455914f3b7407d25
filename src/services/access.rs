use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::AccessConfig;
use crate::error::Result;
use crate::models::status::AccessStatus;
use crate::worker::Lifecycle;

/// Who is asking.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subject {
    pub user_id: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

impl Subject {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.roles = roles;
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

/// Authorization policy. RBAC or ABAC engines implement this one method.
pub trait PolicyEvaluator: Send + Sync {
    fn name(&self) -> &str;
    fn evaluate(&self, subject: &Subject, resource: &str, action: &str) -> Decision;
}

/// Allows subjects holding the `admin` role and denies everyone else.
pub struct AdminOnlyPolicy;

impl PolicyEvaluator for AdminOnlyPolicy {
    fn name(&self) -> &str {
        "admin-only"
    }

    fn evaluate(&self, subject: &Subject, _resource: &str, _action: &str) -> Decision {
        if subject.has_role("admin") {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }
}

/// Authorization gate in front of a swappable policy.
pub struct AccessController {
    config: AccessConfig,
    policy: Arc<dyn PolicyEvaluator>,
    allowed: AtomicU64,
    denied: AtomicU64,
    lifecycle: Lifecycle,
}

impl AccessController {
    /// Creates a controller using `AdminOnlyPolicy`.
    pub fn new(config: AccessConfig) -> Self {
        Self::with_policy(config, Arc::new(AdminOnlyPolicy))
    }

    pub fn with_policy(config: AccessConfig, policy: Arc<dyn PolicyEvaluator>) -> Self {
        Self {
            config,
            policy,
            allowed: AtomicU64::new(0),
            denied: AtomicU64::new(0),
            lifecycle: Lifecycle::new("access controller"),
        }
    }

    pub async fn start(&self) -> Result<()> {
        self.lifecycle.begin_start().await?;
        tracing::info!(policy = self.policy.name(), "✅ Access controller started");
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        if self.lifecycle.stop().await? {
            tracing::info!("Access controller stopped");
        }
        Ok(())
    }

    /// Decides whether `subject` may perform `action` on `resource`.
    ///
    /// Always allows when access control is disabled.
    #[tracing::instrument(skip(self, subject), fields(user_id = %subject.user_id))]
    pub fn check_access(&self, subject: &Subject, resource: &str, action: &str) -> Result<bool> {
        if !self.config.enabled {
            return Ok(true);
        }

        match self.policy.evaluate(subject, resource, action) {
            Decision::Allow => {
                self.allowed.fetch_add(1, Ordering::Relaxed);
                Ok(true)
            }
            Decision::Deny => {
                self.denied.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Access denied");
                Ok(false)
            }
        }
    }

    pub async fn status(&self) -> Result<AccessStatus> {
        Ok(AccessStatus {
            enabled: self.config.enabled,
            running: self.lifecycle.is_running().await,
            policy: self.policy.name().to_string(),
            allowed: self.allowed.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ReadOnlyPolicy;

    impl PolicyEvaluator for ReadOnlyPolicy {
        fn name(&self) -> &str {
            "read-only"
        }

        fn evaluate(&self, _subject: &Subject, _resource: &str, action: &str) -> Decision {
            if action == "read" {
                Decision::Allow
            } else {
                Decision::Deny
            }
        }
    }

    #[tokio::test]
    async fn test_default_policy() {
        let controller = AccessController::new(AccessConfig { enabled: true });
        let admin = Subject::new("1").with_roles(vec!["admin".to_string()]);
        let user = Subject::new("2").with_roles(vec!["viewer".to_string()]);

        assert!(controller.check_access(&admin, "doc", "delete").unwrap());
        assert!(!controller.check_access(&user, "doc", "read").unwrap());

        let status = controller.status().await.unwrap();
        assert_eq!(status.policy, "admin-only");
        assert_eq!((status.allowed, status.denied), (1, 1));
    }

    #[test]
    fn test_disabled_allows_everything() {
        let controller = AccessController::new(AccessConfig { enabled: false });
        assert!(controller.check_access(&Subject::new("x"), "doc", "delete").unwrap());
    }

    #[test]
    fn test_policy_is_swappable() {
        let controller =
            AccessController::with_policy(AccessConfig { enabled: true }, Arc::new(ReadOnlyPolicy));
        let user = Subject::new("2");
        assert!(controller.check_access(&user, "doc", "read").unwrap());
        assert!(!controller.check_access(&user, "doc", "write").unwrap());
    }
}
