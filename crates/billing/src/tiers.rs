//! Tier registry
//!
//! The static catalog of subscription plans. A registry is built once at
//! startup and never mutated; re-provisioning a price reference produces a
//! new registry via [`TierRegistry::with_price_reference`].

use crate::error::{BillingError, BillingResult};

/// Identifier of the always-present fallback tier
pub const FREE_TIER_ID: &str = "free";

/// Wire value for an unlimited report allowance
pub const UNLIMITED_SENTINEL: i64 = -1;

/// Reports allowed per billing period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Bounded(i64),
    Unbounded,
}

impl Limit {
    /// Counter ceiling for conditional reservations (`None` = no ceiling)
    pub fn ceiling(&self) -> Option<i64> {
        match self {
            Limit::Bounded(n) => Some(*n),
            Limit::Unbounded => None,
        }
    }

    /// API representation: the bound, or -1 for unlimited
    pub fn to_wire(&self) -> i64 {
        match self {
            Limit::Bounded(n) => *n,
            Limit::Unbounded => UNLIMITED_SENTINEL,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        matches!(self, Limit::Unbounded)
    }
}

impl std::fmt::Display for Limit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Limit::Bounded(n) => write!(f, "{}", n),
            Limit::Unbounded => write!(f, "unlimited"),
        }
    }
}

/// Subscription plan definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tier {
    pub id: String,
    pub name: String,
    /// Monthly price in cents; `None` for the non-billable free tier
    pub price_monthly_cents: Option<i64>,
    pub report_limit: Limit,
    /// External billing-plan identifier; `None` for the free tier
    pub price_reference: Option<String>,
}

impl Tier {
    /// Free tier: 1 report per period, not billable
    pub fn free() -> Self {
        Self {
            id: FREE_TIER_ID.to_string(),
            name: "Free".to_string(),
            price_monthly_cents: None,
            report_limit: Limit::Bounded(1),
            price_reference: None,
        }
    }

    /// Founder tier: 25 reports per period at $49/month
    pub fn founder(price_reference: &str) -> Self {
        Self {
            id: "founder".to_string(),
            name: "Founder".to_string(),
            price_monthly_cents: Some(4_900),
            report_limit: Limit::Bounded(25),
            price_reference: Some(price_reference.to_string()),
        }
    }

    /// Pro tier: unlimited reports at $149/month
    pub fn pro(price_reference: &str) -> Self {
        Self {
            id: "pro".to_string(),
            name: "Pro".to_string(),
            price_monthly_cents: Some(14_900),
            report_limit: Limit::Unbounded,
            price_reference: Some(price_reference.to_string()),
        }
    }

    pub fn is_free(&self) -> bool {
        self.id == FREE_TIER_ID
    }
}

/// Billing-plan references for the paid tiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceIds {
    pub founder: String,
    pub pro: String,
}

impl PriceIds {
    /// Read `FOUNDER_PRICE_ID` / `PRO_PRICE_ID`, substituting a placeholder
    /// for unset values so the registry can still be built
    pub fn from_env() -> Self {
        Self {
            founder: price_from_env("FOUNDER_PRICE_ID", "founder"),
            pro: price_from_env("PRO_PRICE_ID", "pro"),
        }
    }
}

/// Placeholder used when a paid tier's price reference is not configured
pub fn placeholder_price_reference(tier_id: &str) -> String {
    format!("price_{}_unconfigured", tier_id)
}

fn price_from_env(var: &str, tier_id: &str) -> String {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => value.trim().to_string(),
        _ => {
            tracing::warn!(
                env_var = var,
                tier = tier_id,
                "Price reference not configured, using placeholder"
            );
            placeholder_price_reference(tier_id)
        }
    }
}

/// Immutable, ordered catalog of tiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierRegistry {
    tiers: Vec<Tier>,
    free_index: usize,
}

impl TierRegistry {
    /// Build a registry, validating the catalog:
    /// - exactly one tier with id `free`, and it has no price reference
    /// - tier ids are unique
    /// - every other tier has a non-empty price reference
    pub fn new(tiers: Vec<Tier>) -> BillingResult<Self> {
        let free_positions: Vec<usize> = tiers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_free())
            .map(|(i, _)| i)
            .collect();

        let free_index = match free_positions.as_slice() {
            [index] => *index,
            [] => return Err(BillingError::InvalidTier("no free tier".to_string())),
            _ => return Err(BillingError::InvalidTier("duplicate free tier".to_string())),
        };

        if tiers[free_index].price_reference.is_some() {
            return Err(BillingError::InvalidTier(
                "free tier must not have a price reference".to_string(),
            ));
        }

        for (i, tier) in tiers.iter().enumerate() {
            if tiers[..i].iter().any(|t| t.id == tier.id) {
                return Err(BillingError::InvalidTier(format!(
                    "duplicate tier id '{}'",
                    tier.id
                )));
            }
            if !tier.is_free()
                && tier
                    .price_reference
                    .as_deref()
                    .map_or(true, |r| r.trim().is_empty())
            {
                return Err(BillingError::InvalidTier(format!(
                    "tier '{}' has no price reference",
                    tier.id
                )));
            }
        }

        Ok(Self { tiers, free_index })
    }

    /// Default catalog (free, founder, pro) with the given price references
    pub fn with_prices(prices: &PriceIds) -> BillingResult<Self> {
        Self::new(vec![
            Tier::free(),
            Tier::founder(&prices.founder),
            Tier::pro(&prices.pro),
        ])
    }

    /// Default catalog with price references from the environment
    pub fn from_env() -> BillingResult<Self> {
        Self::with_prices(&PriceIds::from_env())
    }

    pub fn list_tiers(&self) -> &[Tier] {
        &self.tiers
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Tier> {
        self.tiers.iter().find(|t| t.id == id)
    }

    pub fn find_by_price_reference(&self, reference: &str) -> Option<&Tier> {
        self.tiers
            .iter()
            .find(|t| t.price_reference.as_deref() == Some(reference))
    }

    /// The fallback tier; always present
    pub fn free(&self) -> &Tier {
        &self.tiers[self.free_index]
    }

    /// Re-provisioning step: a new registry where `tier_id` carries
    /// `reference`. The receiver is left untouched.
    pub fn with_price_reference(&self, tier_id: &str, reference: &str) -> BillingResult<Self> {
        if self.find_by_id(tier_id).is_none() {
            return Err(BillingError::InvalidTier(format!(
                "unknown tier '{}'",
                tier_id
            )));
        }

        let tiers = self
            .tiers
            .iter()
            .cloned()
            .map(|mut tier| {
                if tier.id == tier_id {
                    tier.price_reference = Some(reference.to_string());
                }
                tier
            })
            .collect();

        Self::new(tiers)
    }
}
