// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge Case Tests for Usage Metering
//!
//! Tests boundary conditions and race conditions in:
//! - Limit checks at, below and above the bound
//! - Concurrent counter increments
//! - Concurrent reservations against the last units of a limit
//! - Repeated reservations for the same report

#[cfg(test)]
mod metering_tests {
    use std::sync::Arc;

    use bizreport_shared::{MemoryStore, ReportRequest, ReservationOutcome, Store, Team};
    use serde_json::json;
    use time::Duration;
    use tokio::sync::Barrier;
    use uuid::Uuid;

    use crate::{BillingService, PriceIds, Remaining, TierRegistry};

    fn billing(store: &MemoryStore) -> BillingService {
        let tiers = TierRegistry::with_prices(&PriceIds {
            founder: "price_founder".to_string(),
            pro: "price_pro".to_string(),
        })
        .unwrap();
        BillingService::new(Arc::new(store.clone()), tiers, Duration::minutes(15))
    }

    async fn founder_team(store: &MemoryStore, used: i64) -> Team {
        store
            .insert_team(
                Team::new("Founder Co")
                    .with_subscription("sub_founder", "price_founder")
                    .with_usage(used),
            )
            .await
    }

    // =========================================================================
    // Counter at 0 on a fresh team: full allowance remains
    // =========================================================================
    #[tokio::test]
    async fn test_fresh_founder_team_has_full_allowance() {
        let store = MemoryStore::new();
        let team = founder_team(&store, 0).await;

        let status = billing(&store).ledger.check_remaining(team.id).await.unwrap();
        assert!(status.within_limit);
        assert_eq!(status.remaining, Remaining::Count(25));
    }

    // =========================================================================
    // Counter reset externally below the limit re-opens the allowance
    // =========================================================================
    #[tokio::test]
    async fn test_negative_adjustment_reopens_allowance() {
        let store = MemoryStore::new();
        let team = founder_team(&store, 25).await;
        let billing = billing(&store);

        assert!(!billing.ledger.check_remaining(team.id).await.unwrap().within_limit);

        let current = billing.ledger.increment(team.id, -25).await.unwrap();
        assert_eq!(current, 0);
        assert!(billing.ledger.check_remaining(team.id).await.unwrap().within_limit);
    }

    // =========================================================================
    // 100 parallel increments - no lost updates
    // =========================================================================
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_sum_exactly() {
        let store = MemoryStore::new();
        let team = founder_team(&store, 0).await;
        let team_id = team.id;
        let billing = billing(&store);

        let barrier = Arc::new(Barrier::new(100));
        let mut handles = vec![];

        for _ in 0..100 {
            let ledger = billing.ledger.clone();
            let barrier = Arc::clone(&barrier);
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                ledger.increment(team_id, 1).await.unwrap()
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        let team = store.get_team(team_id).await.unwrap().unwrap();
        assert_eq!(team.current_messages, 100);
    }

    // =========================================================================
    // 10 parallel reservations at 20/25 - exactly 5 succeed, counter == 25
    // =========================================================================
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reservations_never_overshoot() {
        let store = MemoryStore::new();
        let team = founder_team(&store, 20).await;
        let billing = billing(&store);

        let mut reports = vec![];
        for _ in 0..10 {
            let report = ReportRequest::new(Uuid::new_v4(), team.id, json!({}));
            store.insert_report(&report).await.unwrap();
            reports.push(report);
        }

        let barrier = Arc::new(Barrier::new(reports.len()));
        let mut handles = vec![];

        for report in reports {
            let ledger = billing.ledger.clone();
            let barrier = Arc::clone(&barrier);
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                ledger.reserve(&report).await.unwrap()
            }));
        }

        let mut outcomes = vec![];
        for handle in handles {
            outcomes.push(handle.await.unwrap());
        }

        let reserved = outcomes
            .iter()
            .filter(|o| matches!(o, ReservationOutcome::Reserved { .. }))
            .count();
        let rejected = outcomes
            .iter()
            .filter(|o| matches!(o, ReservationOutcome::LimitReached { .. }))
            .count();

        assert_eq!(reserved, 5, "Exactly the remaining 5 units are handed out");
        assert_eq!(rejected, 5);

        let team = store.get_team(team.id).await.unwrap().unwrap();
        assert_eq!(team.current_messages, 25);
    }

    // =========================================================================
    // Same report reserved by several runners - charged once
    // =========================================================================
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_repeated_reservation_charges_once() {
        let store = MemoryStore::new();
        let team = founder_team(&store, 3).await;
        let billing = billing(&store);

        let report = ReportRequest::new(Uuid::new_v4(), team.id, json!({}));
        store.insert_report(&report).await.unwrap();

        let mut handles = vec![];
        for _ in 0..8 {
            let ledger = billing.ledger.clone();
            let report = report.clone();
            handles.push(tokio::spawn(async move { ledger.reserve(&report).await.unwrap() }));
        }

        let mut reserved = 0;
        for handle in handles {
            match handle.await.unwrap() {
                ReservationOutcome::Reserved { .. } => reserved += 1,
                ReservationOutcome::AlreadyReserved => {}
                other => panic!("Unexpected outcome {:?}", other),
            }
        }

        assert_eq!(reserved, 1);
        let team = store.get_team(team.id).await.unwrap().unwrap();
        assert_eq!(team.current_messages, 4);
    }

    // =========================================================================
    // Unlimited tier - reservations never rejected
    // =========================================================================
    #[tokio::test]
    async fn test_unlimited_tier_reservations_always_succeed() {
        let store = MemoryStore::new();
        let team = store
            .insert_team(
                Team::new("Pro Co")
                    .with_subscription("sub_pro", "price_pro")
                    .with_usage(10_000),
            )
            .await;
        let billing = billing(&store);

        for _ in 0..5 {
            let report = ReportRequest::new(Uuid::new_v4(), team.id, json!({}));
            store.insert_report(&report).await.unwrap();
            let outcome = billing.ledger.reserve(&report).await.unwrap();
            assert!(matches!(outcome, ReservationOutcome::Reserved { .. }));
        }

        let team = store.get_team(team.id).await.unwrap().unwrap();
        assert_eq!(team.current_messages, 10_005);
    }

    // =========================================================================
    // Team whose subscription lapses to an unknown price is metered as free
    // =========================================================================
    #[tokio::test]
    async fn test_unknown_price_meters_as_free() {
        let store = MemoryStore::new();
        let team = store
            .insert_team(Team::new("Lapsed").with_subscription("sub_x", "price_legacy"))
            .await;
        let billing = billing(&store);

        let first = ReportRequest::new(Uuid::new_v4(), team.id, json!({}));
        let second = ReportRequest::new(Uuid::new_v4(), team.id, json!({}));
        store.insert_report(&first).await.unwrap();
        store.insert_report(&second).await.unwrap();

        assert!(matches!(
            billing.ledger.reserve(&first).await.unwrap(),
            ReservationOutcome::Reserved { .. }
        ));
        assert!(matches!(
            billing.ledger.reserve(&second).await.unwrap(),
            ReservationOutcome::LimitReached { .. }
        ));
    }
}
