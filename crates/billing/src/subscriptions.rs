//! Subscription resolution
//!
//! Maps a team's external billing identifiers onto a tier from the registry.

use std::sync::Arc;

use bizreport_shared::Team;

use crate::tiers::{Tier, TierRegistry};

/// How a team's tier was determined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierSource {
    /// Matched the team's billing product reference
    Subscription,
    /// Team is subscribed but its reference matches no tier
    UnknownPriceFallback,
    /// Team has no subscription
    NoSubscription,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTier {
    pub tier: Tier,
    pub source: TierSource,
}

#[derive(Clone)]
pub struct SubscriptionResolver {
    tiers: Arc<TierRegistry>,
}

impl SubscriptionResolver {
    pub fn new(tiers: Arc<TierRegistry>) -> Self {
        Self { tiers }
    }

    pub fn registry(&self) -> &TierRegistry {
        &self.tiers
    }

    /// Resolve the tier a team is entitled to. Always returns a tier:
    /// anything unrecognised falls back to free.
    pub fn resolve_tier(&self, team: &Team) -> ResolvedTier {
        let (Some(subscription_id), Some(reference)) = (
            team.subscription_id.as_deref(),
            team.billing_product_reference.as_deref(),
        ) else {
            return ResolvedTier {
                tier: self.tiers.free().clone(),
                source: TierSource::NoSubscription,
            };
        };

        match self.tiers.find_by_price_reference(reference) {
            Some(tier) => ResolvedTier {
                tier: tier.clone(),
                source: TierSource::Subscription,
            },
            None => {
                tracing::warn!(
                    team_id = %team.id,
                    subscription_id = %subscription_id,
                    price_reference = %reference,
                    "Unknown price reference, falling back to free tier"
                );
                ResolvedTier {
                    tier: self.tiers.free().clone(),
                    source: TierSource::UnknownPriceFallback,
                }
            }
        }
    }
}
