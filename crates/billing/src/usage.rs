//! Usage metering
//!
//! The team's `current_messages` counter is the only usage state. Every
//! change to it goes through one atomic store operation; this module never
//! reads the counter and writes it back.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use bizreport_shared::{DynStore, ReportRequest, ReservationOutcome, Team};

use crate::error::{BillingError, BillingResult};
use crate::subscriptions::SubscriptionResolver;
use crate::tiers::{Limit, Tier};

/// Tier label reported when the limit lookup itself failed
pub const ERROR_TIER_LABEL: &str = "Error";

/// Reports left in the current period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remaining {
    Count(i64),
    Unlimited,
}

/// Answer to "may this team run another report?"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaStatus {
    pub within_limit: bool,
    pub remaining: Remaining,
    pub used: i64,
    pub tier: Tier,
}

impl QuotaStatus {
    pub fn limit(&self) -> Limit {
        self.tier.report_limit
    }
}

/// Wire form of a team's limit; `limit` is -1 for unlimited tiers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitSnapshot {
    pub limit: i64,
    pub count: i64,
    pub tier: String,
}

impl LimitSnapshot {
    /// Free-tier values labelled as an error, served when the lookup fails
    pub fn error_fallback(free: &Tier) -> Self {
        Self {
            limit: free.report_limit.to_wire(),
            count: 0,
            tier: ERROR_TIER_LABEL.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct QuotaLedger {
    store: DynStore,
    resolver: SubscriptionResolver,
}

impl QuotaLedger {
    pub fn new(store: DynStore, resolver: SubscriptionResolver) -> Self {
        Self { store, resolver }
    }

    /// Evaluate an already-loaded team against its live tier
    pub fn check_team(&self, team: &Team) -> QuotaStatus {
        let tier = self.resolver.resolve_tier(team).tier;
        let used = team.current_messages;

        let (within_limit, remaining) = match tier.report_limit {
            Limit::Unbounded => (true, Remaining::Unlimited),
            Limit::Bounded(limit) => {
                // Exactly at the limit is blocked
                let left = (limit - used).max(0);
                (left > 0, Remaining::Count(left))
            }
        };

        QuotaStatus {
            within_limit,
            remaining,
            used,
            tier,
        }
    }

    /// Pre-check before starting a report. A missing team is a hard deny,
    /// not an error.
    pub async fn check_remaining(&self, team_id: Uuid) -> BillingResult<QuotaStatus> {
        let Some(team) = self.store.get_team(team_id).await? else {
            tracing::debug!(team_id = %team_id, "Quota check for unknown team");
            return Ok(QuotaStatus {
                within_limit: false,
                remaining: Remaining::Count(0),
                used: 0,
                tier: self.resolver.registry().free().clone(),
            });
        };

        Ok(self.check_team(&team))
    }

    /// Atomically add `amount` to the team's counter. Returns the new value.
    pub async fn increment(&self, team_id: Uuid, amount: i64) -> BillingResult<i64> {
        match self.store.increment_usage(team_id, amount).await {
            Ok(Some(current)) => {
                tracing::debug!(
                    team_id = %team_id,
                    amount = amount,
                    current_messages = current,
                    "Usage incremented"
                );
                Ok(current)
            }
            Ok(None) => Err(BillingError::TeamNotFound(team_id)),
            Err(e) => {
                tracing::error!(team_id = %team_id, error = %e, "Failed to increment usage");
                Err(BillingError::IncrementFailed {
                    team_id,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Conditionally take one unit of the team's allowance for `report`.
    ///
    /// The limit comparison and the increment are a single store operation,
    /// so concurrent reservations can never push the counter past the limit.
    /// Reserving the same report twice is a no-op.
    pub async fn reserve(&self, report: &ReportRequest) -> BillingResult<ReservationOutcome> {
        let Some(team) = self.store.get_team(report.team_id).await? else {
            return Ok(ReservationOutcome::TeamNotFound);
        };

        let tier = self.resolver.resolve_tier(&team).tier;
        let outcome = self
            .store
            .reserve_quota(report.id, report.team_id, tier.report_limit.ceiling())
            .await?;

        match outcome {
            ReservationOutcome::Reserved { current_messages } => tracing::debug!(
                report_id = %report.id,
                team_id = %report.team_id,
                current_messages = current_messages,
                "Quota reserved"
            ),
            ReservationOutcome::LimitReached { current_messages } => tracing::info!(
                report_id = %report.id,
                team_id = %report.team_id,
                current_messages = current_messages,
                limit = %tier.report_limit,
                "Reservation rejected, limit reached"
            ),
            ReservationOutcome::AlreadyReserved | ReservationOutcome::TeamNotFound => {}
        }

        Ok(outcome)
    }

    /// Give back the unit held by a report. Returns whether one was held.
    pub async fn release(&self, report_id: Uuid) -> BillingResult<bool> {
        let released = self.store.release_quota(report_id).await?;
        if released {
            tracing::debug!(report_id = %report_id, "Quota reservation released");
        }
        Ok(released)
    }

    /// Current limit, count and tier name for display
    pub async fn limit_snapshot(&self, team_id: Uuid) -> BillingResult<LimitSnapshot> {
        let team = self
            .store
            .get_team(team_id)
            .await?
            .ok_or(BillingError::TeamNotFound(team_id))?;

        let tier = self.resolver.resolve_tier(&team).tier;
        Ok(LimitSnapshot {
            limit: tier.report_limit.to_wire(),
            count: team.current_messages,
            tier: tier.name,
        })
    }
}
