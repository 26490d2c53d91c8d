//! Metering Invariants Module
//!
//! Runnable consistency checks over teams and report requests. Checks only
//! read; a violation is something an operator has to look at.
//!
//! ## Checks
//!
//! 1. **known_price_reference**: every subscribed team maps to a tier
//! 2. **usage_within_limit**: no counter sits above its bounded limit
//! 3. **no_stuck_reports**: unfinished reports keep making progress

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use bizreport_shared::DynStore;

use crate::error::BillingResult;
use crate::subscriptions::SubscriptionResolver;
use crate::tiers::{Limit, TierRegistry};

const KNOWN_PRICE_REFERENCE: &str = "known_price_reference";
const USAGE_WITHIN_LIMIT: &str = "usage_within_limit";
const NO_STUCK_REPORTS: &str = "no_stuck_reports";

/// Result of running a single invariant check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantViolation {
    /// Which invariant was violated
    pub invariant: String,
    /// Team(s) affected
    pub team_ids: Vec<Uuid>,
    /// Human-readable description of the violation
    pub description: String,
    /// Additional context for debugging
    pub context: serde_json::Value,
    pub severity: ViolationSeverity,
}

/// Severity of an invariant violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationSeverity {
    /// Critical - teams may be billed or blocked incorrectly
    Critical,
    /// High - data inconsistency that needs attention
    High,
    /// Medium - potential issue, should investigate
    Medium,
    /// Low - informational
    Low,
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationSeverity::Critical => write!(f, "CRITICAL"),
            ViolationSeverity::High => write!(f, "HIGH"),
            ViolationSeverity::Medium => write!(f, "MEDIUM"),
            ViolationSeverity::Low => write!(f, "LOW"),
        }
    }
}

/// Summary of all invariant checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantCheckSummary {
    #[serde(with = "time::serde::rfc3339")]
    pub checked_at: OffsetDateTime,
    pub checks_run: usize,
    pub checks_passed: usize,
    pub checks_failed: usize,
    pub violations: Vec<InvariantViolation>,
    pub healthy: bool,
}

/// Service for running metering invariant checks
#[derive(Clone)]
pub struct InvariantChecker {
    store: DynStore,
    resolver: SubscriptionResolver,
    stale_after: Duration,
}

impl InvariantChecker {
    pub fn new(store: DynStore, tiers: Arc<TierRegistry>, stale_after: Duration) -> Self {
        Self {
            store,
            resolver: SubscriptionResolver::new(tiers),
            stale_after,
        }
    }

    /// Run all invariant checks and return summary
    pub async fn run_all_checks(&self) -> BillingResult<InvariantCheckSummary> {
        let now = OffsetDateTime::now_utc();
        let mut violations = Vec::new();

        violations.extend(self.check_known_price_reference().await?);
        violations.extend(self.check_usage_within_limit().await?);
        violations.extend(self.check_no_stuck_reports().await?);

        let checks_run = Self::available_checks().len();
        let checks_failed = violations
            .iter()
            .map(|v| &v.invariant)
            .collect::<HashSet<_>>()
            .len();

        Ok(InvariantCheckSummary {
            checked_at: now,
            checks_run,
            checks_passed: checks_run - checks_failed,
            checks_failed,
            healthy: violations.is_empty(),
            violations,
        })
    }

    /// Invariant 1: a subscribed team's product reference names a tier
    ///
    /// Such teams are silently metered as free.
    async fn check_known_price_reference(&self) -> BillingResult<Vec<InvariantViolation>> {
        let teams = self.store.list_teams().await?;
        let registry = self.resolver.registry();

        Ok(teams
            .into_iter()
            .filter_map(|team| {
                let reference = team.billing_product_reference.as_deref()?;
                team.subscription_id.as_ref()?;
                if registry.find_by_price_reference(reference).is_some() {
                    return None;
                }
                Some(InvariantViolation {
                    invariant: KNOWN_PRICE_REFERENCE.to_string(),
                    team_ids: vec![team.id],
                    description: format!(
                        "Team '{}' is subscribed to unknown price '{}'",
                        team.name, reference
                    ),
                    context: serde_json::json!({
                        "subscription_id": team.subscription_id,
                        "billing_product_reference": reference,
                    }),
                    severity: ViolationSeverity::High,
                })
            })
            .collect())
    }

    /// Invariant 2: counter never exceeds the live bounded limit
    async fn check_usage_within_limit(&self) -> BillingResult<Vec<InvariantViolation>> {
        let teams = self.store.list_teams().await?;

        Ok(teams
            .into_iter()
            .filter_map(|team| {
                let tier = self.resolver.resolve_tier(&team).tier;
                let Limit::Bounded(limit) = tier.report_limit else {
                    return None;
                };
                if team.current_messages <= limit {
                    return None;
                }
                Some(InvariantViolation {
                    invariant: USAGE_WITHIN_LIMIT.to_string(),
                    team_ids: vec![team.id],
                    description: format!(
                        "Team '{}' has used {} reports on the {} tier (limit {})",
                        team.name, team.current_messages, tier.name, limit
                    ),
                    context: serde_json::json!({
                        "tier": tier.id,
                        "current_messages": team.current_messages,
                        "limit": limit,
                    }),
                    severity: ViolationSeverity::Medium,
                })
            })
            .collect())
    }

    /// Invariant 3: no report sits unfinished past the stale threshold
    async fn check_no_stuck_reports(&self) -> BillingResult<Vec<InvariantViolation>> {
        let stale_before = OffsetDateTime::now_utc() - self.stale_after;
        let reports = self.store.list_stale_reports(stale_before).await?;

        Ok(reports
            .into_iter()
            .map(|report| InvariantViolation {
                invariant: NO_STUCK_REPORTS.to_string(),
                team_ids: vec![report.team_id],
                description: format!(
                    "Report {} has been {} since {}",
                    report.id, report.status, report.updated_at
                ),
                context: serde_json::json!({
                    "report_id": report.id,
                    "status": report.status,
                    "attempts": report.attempts,
                    "quota_reserved": report.quota_reserved,
                }),
                severity: ViolationSeverity::Medium,
            })
            .collect())
    }

    /// Run a single invariant check by name
    pub async fn run_check(&self, name: &str) -> BillingResult<Vec<InvariantViolation>> {
        match name {
            KNOWN_PRICE_REFERENCE => self.check_known_price_reference().await,
            USAGE_WITHIN_LIMIT => self.check_usage_within_limit().await,
            NO_STUCK_REPORTS => self.check_no_stuck_reports().await,
            _ => Ok(vec![]),
        }
    }

    pub fn available_checks() -> Vec<&'static str> {
        vec![KNOWN_PRICE_REFERENCE, USAGE_WITHIN_LIMIT, NO_STUCK_REPORTS]
    }
}
