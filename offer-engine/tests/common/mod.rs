//! Shared fixtures for the integration tests

#![allow(dead_code)]

use offer_engine::db::repository::{listing, offer, reservation};
use offer_engine::{Clock, Config, EngineState, ManualClock, NegotiationPolicy};
use shared::models::{
    Listing, ListingCreate, Money, Offer, OfferCreate, Reservation,
};
use shared::notification::{Notification, NotificationKind};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Fixed start instant (September 2026)
pub const START: i64 = 1_790_000_000_000;
pub const HOUR: i64 = shared::util::HOUR_MILLIS;

pub const SELLER: i64 = 1001;
pub const BUYER: i64 = 2001;
pub const OTHER_BUYER: i64 = 2002;
pub const STRANGER: i64 = 9999;

pub fn usd(amount: &str) -> Money {
    Money::new(amount.parse().expect("decimal literal"), "USD")
}

pub fn test_config() -> Config {
    let mut config = Config::with_work_dir("./target/test_work_dir");
    config.policy = NegotiationPolicy::default();
    config.notification_buffer = 1024;
    config.sweep_interval_secs = 3600;
    config
}

pub struct Harness {
    pub state: EngineState,
    pub clock: ManualClock,
    pub notifications: mpsc::Receiver<Notification>,
}

impl Harness {
    pub async fn new() -> Self {
        let clock = ManualClock::new(START);
        let (state, notifications) = EngineState::in_memory(test_config(), Arc::new(clock.clone()))
            .await
            .expect("in-memory engine");
        Self {
            state,
            clock,
            notifications,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.state.db.pool
    }

    pub fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    /// Active listing owned by `SELLER`
    pub async fn listing(&self, price: &str) -> Listing {
        let data = ListingCreate {
            owner_id: SELLER,
            title: "Vintage film camera".to_string(),
            price: usd(price),
        };
        listing::insert(self.pool(), shared::util::snowflake_id(), &data, self.now())
            .await
            .expect("insert listing")
    }

    /// Pending offer; panics if the engine refuses it
    pub async fn offer(&self, listing_id: i64, buyer_id: i64, amount: &str) -> i64 {
        let result = self
            .state
            .offers
            .create_offer(OfferCreate {
                listing_id,
                buyer_id,
                amount: usd(amount),
                message: Some("Would you take this?".to_string()),
            })
            .await;
        assert!(result.success, "create_offer failed: {:?}", result.error);
        result.offer_id.expect("offer id")
    }

    pub async fn reload_listing(&self, id: i64) -> Listing {
        listing::find_by_id(self.pool(), id)
            .await
            .expect("query listing")
            .expect("listing exists")
    }

    pub async fn reload_offer(&self, id: i64) -> Offer {
        offer::find_by_id(self.pool(), id)
            .await
            .expect("query offer")
            .expect("offer exists")
    }

    pub async fn reload_reservation(&self, id: i64) -> Reservation {
        reservation::find_by_id(self.pool(), id)
            .await
            .expect("query reservation")
            .expect("reservation exists")
    }

    pub async fn active_reservations(&self, listing_id: i64) -> i64 {
        reservation::count_active_for_listing(self.pool(), listing_id)
            .await
            .expect("count reservations")
    }

    /// Everything queued so far
    pub fn drain(&mut self) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(n) = self.notifications.try_recv() {
            out.push(n);
        }
        out
    }
}

/// Notifications of one kind, by recipient
pub fn recipients(notifications: &[Notification], type_name: &str) -> Vec<i64> {
    let mut ids: Vec<i64> = notifications
        .iter()
        .filter(|n| n.kind.type_name() == type_name)
        .map(|n| n.recipient_id)
        .collect();
    ids.sort_unstable();
    ids
}

pub fn kinds(notifications: &[Notification]) -> Vec<&NotificationKind> {
    notifications.iter().map(|n| &n.kind).collect()
}
