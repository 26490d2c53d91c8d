// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! BizReport Billing Module
//!
//! Tier catalog, subscription resolution and usage metering for report runs.
//!
//! ## Features
//!
//! - **Tier Registry**: Immutable catalog of plans and their report limits
//! - **Subscription Resolution**: Map a team's billing reference to a tier
//! - **Quota Ledger**: Limit checks and atomic usage reservations
//! - **Invariants**: Read-only consistency checks for operators

pub mod error;
pub mod invariants;
pub mod subscriptions;
pub mod tiers;
pub mod usage;

#[cfg(test)]
mod edge_case_tests;

use std::sync::Arc;

use bizreport_shared::DynStore;
use time::Duration;

// Error
pub use error::{BillingError, BillingResult};

// Invariants
pub use invariants::{
    InvariantCheckSummary, InvariantChecker, InvariantViolation, ViolationSeverity,
};

// Subscriptions
pub use subscriptions::{ResolvedTier, SubscriptionResolver, TierSource};

// Tiers
pub use tiers::{Limit, PriceIds, Tier, TierRegistry, FREE_TIER_ID, UNLIMITED_SENTINEL};

// Usage
pub use usage::{LimitSnapshot, QuotaLedger, QuotaStatus, Remaining, ERROR_TIER_LABEL};

/// Main billing service that combines all billing functionality
#[derive(Clone)]
pub struct BillingService {
    pub tiers: Arc<TierRegistry>,
    pub resolver: SubscriptionResolver,
    pub ledger: QuotaLedger,
    pub invariants: InvariantChecker,
}

impl BillingService {
    /// Create a new billing service with price references from the environment
    pub fn from_env(store: DynStore, stale_after: Duration) -> BillingResult<Self> {
        Ok(Self::new(store, TierRegistry::from_env()?, stale_after))
    }

    /// Create a new billing service with an explicit tier catalog
    pub fn new(store: DynStore, tiers: TierRegistry, stale_after: Duration) -> Self {
        let tiers = Arc::new(tiers);
        let resolver = SubscriptionResolver::new(tiers.clone());

        Self {
            ledger: QuotaLedger::new(store.clone(), resolver.clone()),
            invariants: InvariantChecker::new(store, tiers.clone(), stale_after),
            resolver,
            tiers,
        }
    }
}
