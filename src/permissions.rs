//! Permission registry and rate limiting for AI-invoked functions.
//!
//! Deny by default: any function not registered here is rejected. Write
//! operations always require user confirmation; read operations are rate
//! limited to bound abuse and LLM spend. Rate-limit counting goes through
//! the injected `ActionAudit` store and fails closed on store errors.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use presta_agentic::ports::ActionAudit;

/// Risk tier of a function the model may invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    ReadOnly,
    Low,
    Medium,
    High,
    Critical,
}

/// When user confirmation is required before executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationPolicy {
    Never,
    Conditional,
    Always,
}

/// Per-function validation limits.
#[derive(Debug, Clone, Copy, Default)]
pub struct FunctionLimits {
    /// Maximum money amount the function may touch, in pesos.
    pub max_amount: Option<i64>,
    pub max_per_hour: Option<i64>,
    pub max_per_day: Option<i64>,
}

/// One registered AI-invokable function.
#[derive(Debug, Clone)]
pub struct FunctionPermission {
    pub name: &'static str,
    pub description: &'static str,
    pub risk: RiskLevel,
    pub confirmation: ConfirmationPolicy,
    pub limits: FunctionLimits,
    pub enabled: bool,
}

/// The dynamic text-to-SQL query function.
pub const QUERY_LOANS_DYNAMIC: &str = "query_loans_dynamic";

/// The single source of truth for what the AI may do. Any function missing
/// here is rejected.
pub fn registry() -> &'static [FunctionPermission] {
    static REGISTRY: &[FunctionPermission] = &[
        FunctionPermission {
            name: "query_loans",
            description: "Query the user's loans (predefined simple queries)",
            risk: RiskLevel::ReadOnly,
            confirmation: ConfirmationPolicy::Never,
            limits: FunctionLimits {
                max_amount: None,
                max_per_hour: Some(30),
                max_per_day: None,
            },
            enabled: true,
        },
        FunctionPermission {
            name: QUERY_LOANS_DYNAMIC,
            description: "Query loans with dynamic SQL (text-to-SQL agent)",
            risk: RiskLevel::ReadOnly,
            confirmation: ConfirmationPolicy::Never,
            // Tighter than query_loans: every call spends two LLM round trips.
            limits: FunctionLimits {
                max_amount: None,
                max_per_hour: Some(20),
                max_per_day: Some(100),
            },
            enabled: true,
        },
        FunctionPermission {
            name: "search_contacts",
            description: "Search contacts by name",
            risk: RiskLevel::ReadOnly,
            confirmation: ConfirmationPolicy::Never,
            limits: FunctionLimits {
                max_amount: None,
                max_per_hour: Some(20),
                max_per_day: None,
            },
            enabled: true,
        },
        FunctionPermission {
            name: "show_uncertainty",
            description: "Record an ambiguous request and ask for clarification",
            risk: RiskLevel::ReadOnly,
            confirmation: ConfirmationPolicy::Never,
            limits: FunctionLimits {
                max_amount: None,
                max_per_hour: None,
                max_per_day: None,
            },
            enabled: true,
        },
        FunctionPermission {
            name: "create_loan",
            description: "Create a new loan (lent or borrowed)",
            risk: RiskLevel::High,
            confirmation: ConfirmationPolicy::Always,
            limits: FunctionLimits {
                max_amount: Some(100_000_000),
                max_per_hour: None,
                max_per_day: Some(10),
            },
            enabled: true,
        },
        FunctionPermission {
            name: "mark_loan_returned",
            description: "Mark a loan as repaid",
            risk: RiskLevel::High,
            confirmation: ConfirmationPolicy::Always,
            limits: FunctionLimits {
                max_amount: None,
                max_per_hour: None,
                max_per_day: Some(20),
            },
            enabled: true,
        },
        FunctionPermission {
            name: "reschedule_loan",
            description: "Change a loan's due date",
            risk: RiskLevel::Medium,
            confirmation: ConfirmationPolicy::Always,
            limits: FunctionLimits {
                max_amount: None,
                max_per_hour: None,
                max_per_day: Some(15),
            },
            enabled: true,
        },
        FunctionPermission {
            name: "create_contact",
            description: "Create a new contact",
            risk: RiskLevel::Low,
            confirmation: ConfirmationPolicy::Conditional,
            limits: FunctionLimits {
                max_amount: None,
                max_per_hour: None,
                max_per_day: Some(15),
            },
            enabled: true,
        },
        FunctionPermission {
            name: "delete_loan",
            description: "Delete a loan",
            risk: RiskLevel::Critical,
            confirmation: ConfirmationPolicy::Always,
            limits: FunctionLimits {
                max_amount: None,
                max_per_hour: None,
                max_per_day: Some(3),
            },
            enabled: false,
        },
        FunctionPermission {
            name: "send_reminder",
            description: "Send a payment reminder",
            risk: RiskLevel::Medium,
            confirmation: ConfirmationPolicy::Conditional,
            limits: FunctionLimits {
                max_amount: None,
                max_per_hour: None,
                max_per_day: Some(5),
            },
            enabled: false,
        },
    ];
    REGISTRY
}

pub fn find(name: &str) -> Option<&'static FunctionPermission> {
    registry().iter().find(|p| p.name == name)
}

/// Outcome of a permission check.
#[derive(Debug, Clone)]
pub struct PermissionCheck {
    pub allowed: bool,
    pub reason: Option<String>,
    pub requires_confirmation: bool,
    pub risk: RiskLevel,
}

/// Check whether a function may run at all (registration, enablement,
/// amount cap). Rate limits are checked separately against the audit store.
pub fn check_permission(function_name: &str, amount: Option<i64>) -> PermissionCheck {
    let Some(permission) = find(function_name) else {
        return PermissionCheck {
            allowed: false,
            reason: Some(format!(
                "function \"{function_name}\" is not registered in the permission system"
            )),
            requires_confirmation: false,
            risk: RiskLevel::Critical,
        };
    };

    if !permission.enabled {
        return PermissionCheck {
            allowed: false,
            reason: Some(format!("function \"{function_name}\" is disabled")),
            requires_confirmation: false,
            risk: permission.risk,
        };
    }

    if let (Some(cap), Some(amount)) = (permission.limits.max_amount, amount) {
        if amount > cap {
            return PermissionCheck {
                allowed: false,
                reason: Some(format!("amount {amount} exceeds the permitted maximum ({cap})")),
                requires_confirmation: false,
                risk: permission.risk,
            };
        }
    }

    PermissionCheck {
        allowed: true,
        reason: None,
        requires_confirmation: permission.confirmation != ConfirmationPolicy::Never,
        risk: permission.risk,
    }
}

/// Result of a rate-limit check.
#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub reason: Option<String>,
}

/// Count prior invocations in the hourly/daily windows. A store failure
/// denies the call: ambiguity never results in best-effort execution.
pub async fn check_rate_limit(
    audit: &dyn ActionAudit,
    tenant_id: Uuid,
    contact_id: Uuid,
    permission: &FunctionPermission,
) -> RateLimitDecision {
    let windows = [
        (permission.limits.max_per_hour, Duration::hours(1), "hour"),
        (permission.limits.max_per_day, Duration::days(1), "day"),
    ];

    for (limit, window, label) in windows {
        let Some(limit) = limit else { continue };
        let since = Utc::now() - window;
        match audit
            .count_since(tenant_id, contact_id, permission.name, since)
            .await
        {
            Ok(count) if count >= limit => {
                return RateLimitDecision {
                    allowed: false,
                    reason: Some(format!("limit of {limit} operations per {label} exceeded")),
                };
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, function = permission.name, "rate-limit store failed, denying");
                return RateLimitDecision {
                    allowed: false,
                    reason: Some("rate limit could not be verified".to_string()),
                };
            }
        }
    }

    RateLimitDecision {
        allowed: true,
        reason: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use presta_agentic::error::{AgentError, Result};

    #[test]
    fn test_unregistered_function_denied() {
        let check = check_permission("drop_all_tables", None);
        assert!(!check.allowed);
        assert_eq!(check.risk, RiskLevel::Critical);
    }

    #[test]
    fn test_disabled_function_denied() {
        let check = check_permission("delete_loan", None);
        assert!(!check.allowed);
        assert!(check.reason.unwrap().contains("disabled"));
    }

    #[test]
    fn test_amount_cap_enforced() {
        let check = check_permission("create_loan", Some(200_000_000));
        assert!(!check.allowed);
        let check = check_permission("create_loan", Some(50_000));
        assert!(check.allowed);
        assert!(check.requires_confirmation);
    }

    #[test]
    fn test_dynamic_query_is_readonly_and_unconfirmed() {
        let check = check_permission(QUERY_LOANS_DYNAMIC, None);
        assert!(check.allowed);
        assert!(!check.requires_confirmation);
        assert_eq!(check.risk, RiskLevel::ReadOnly);
    }

    struct FixedCountAudit {
        count: i64,
    }

    #[async_trait]
    impl ActionAudit for FixedCountAudit {
        async fn record(&self, _t: Uuid, _c: Uuid, _f: &str) -> Result<()> {
            Ok(())
        }
        async fn count_since(
            &self,
            _t: Uuid,
            _c: Uuid,
            _f: &str,
            _since: DateTime<Utc>,
        ) -> Result<i64> {
            Ok(self.count)
        }
    }

    struct BrokenAudit;

    #[async_trait]
    impl ActionAudit for BrokenAudit {
        async fn record(&self, _t: Uuid, _c: Uuid, _f: &str) -> Result<()> {
            Err(AgentError::Execution("store down".into()))
        }
        async fn count_since(
            &self,
            _t: Uuid,
            _c: Uuid,
            _f: &str,
            _since: DateTime<Utc>,
        ) -> Result<i64> {
            Err(AgentError::Execution("store down".into()))
        }
    }

    #[tokio::test]
    async fn test_rate_limit_allows_under_threshold() {
        let permission = find(QUERY_LOANS_DYNAMIC).unwrap();
        let decision = check_rate_limit(
            &FixedCountAudit { count: 5 },
            Uuid::new_v4(),
            Uuid::new_v4(),
            permission,
        )
        .await;
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn test_rate_limit_denies_at_threshold() {
        let permission = find(QUERY_LOANS_DYNAMIC).unwrap();
        let decision = check_rate_limit(
            &FixedCountAudit { count: 20 },
            Uuid::new_v4(),
            Uuid::new_v4(),
            permission,
        )
        .await;
        assert!(!decision.allowed);
        assert!(decision.reason.unwrap().contains("per hour"));
    }

    #[tokio::test]
    async fn test_rate_limit_fails_closed_on_store_error() {
        let permission = find(QUERY_LOANS_DYNAMIC).unwrap();
        let decision =
            check_rate_limit(&BrokenAudit, Uuid::new_v4(), Uuid::new_v4(), permission).await;
        assert!(!decision.allowed);
    }

    #[tokio::test]
    async fn test_unlimited_function_skips_store() {
        let permission = find("show_uncertainty").unwrap();
        // BrokenAudit would deny if consulted; with no limits it never is.
        let decision =
            check_rate_limit(&BrokenAudit, Uuid::new_v4(), Uuid::new_v4(), permission).await;
        assert!(decision.allowed);
    }
}
