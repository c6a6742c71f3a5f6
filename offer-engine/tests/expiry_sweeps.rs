//! Scheduler sweeps, reminders, archive and the background workers

mod common;

use common::*;
use offer_engine::db::repository::{job_log, notification, offer};
use offer_engine::fanout::{Notifier, StoreNotifier};
use offer_engine::{BackgroundTasks, SweepKind};
use shared::error::ErrorCode;
use shared::models::{
    AcceptOptions, ListingStatus, OfferRejection, OfferStatus, ReservationStatus,
};
use std::time::Duration;

const DAY: i64 = 24 * HOUR;

#[tokio::test]
async fn expired_reservation_is_released_by_the_sweep() {
    let mut h = Harness::new().await;
    let item = h.listing("100").await;
    let offer_id = h.offer(item.id, BUYER, "80").await;
    let reservation_id = h
        .state
        .offers
        .accept(offer_id, SELLER, AcceptOptions::default())
        .await
        .reservation_id
        .expect("reservation id");
    h.drain();

    h.clock.advance_hours(47);
    let early = h.state.scheduler.run_once().await;
    assert_eq!(early.get(SweepKind::ReservationExpiry).map(|s| s.processed()), Some(0));
    assert_eq!(h.active_reservations(item.id).await, 1);

    h.clock.advance_hours(2);
    let report = h.state.scheduler.run_once().await;
    assert_eq!(report.total_errors(), 0);
    assert_eq!(report.get(SweepKind::ReservationExpiry).map(|s| s.processed()), Some(1));

    let held = h.reload_reservation(reservation_id).await;
    assert_eq!(held.status, ReservationStatus::Expired);
    assert_eq!(held.cancelled_by, None);

    let listing = h.reload_listing(item.id).await;
    assert_eq!(listing.status, ListingStatus::Active);
    assert_eq!(listing.reserved_until, None);
    assert_eq!(h.active_reservations(item.id).await, 0);

    assert_eq!(
        recipients(&h.drain(), "reservation_expired"),
        vec![SELLER, BUYER]
    );

    // The listing can be offered on and reserved again
    let next = h.offer(item.id, OTHER_BUYER, "90").await;
    let again = h
        .state
        .offers
        .accept(next, SELLER, AcceptOptions::default())
        .await;
    assert!(again.success, "{:?}", again.error);
}

#[tokio::test]
async fn reservation_sweep_is_idempotent() {
    let h = Harness::new().await;
    let item = h.listing("100").await;
    let offer_id = h.offer(item.id, BUYER, "80").await;
    assert!(
        h.state
            .offers
            .accept(offer_id, SELLER, AcceptOptions::default())
            .await
            .success
    );
    h.clock.advance_hours(49);

    let (first, second) = tokio::join!(
        h.state.reservations.process_expired_reservations(),
        h.state.reservations.process_expired_reservations(),
    );
    assert_eq!(first.processed + second.processed, 1);
    assert!(first.errors.is_empty() && second.errors.is_empty());

    let third = h.state.reservations.process_expired_reservations().await;
    assert_eq!(third.attempted, 0);
    assert_eq!(third.processed, 0);
    assert_eq!(h.reload_listing(item.id).await.status, ListingStatus::Active);
}

#[tokio::test]
async fn manual_expire_refuses_a_live_reservation() {
    let h = Harness::new().await;
    let item = h.listing("100").await;
    let offer_id = h.offer(item.id, BUYER, "80").await;
    let reservation_id = h
        .state
        .offers
        .accept(offer_id, SELLER, AcceptOptions::default())
        .await
        .reservation_id
        .expect("reservation id");

    let early = h.state.reservations.expire_reservation(reservation_id).await;
    assert_eq!(early.error_code, Some(ErrorCode::InvalidRequest));
    assert_eq!(h.reload_listing(item.id).await.status, ListingStatus::Reserved);

    h.clock.advance_hours(48);
    let due = h.state.reservations.expire_reservation(reservation_id).await;
    assert!(due.success);
    let twice = h.state.reservations.expire_reservation(reservation_id).await;
    assert_eq!(twice.error_code, Some(ErrorCode::ReservationNotActive));

    let missing = h.state.reservations.expire_reservation(31337).await;
    assert_eq!(missing.error_code, Some(ErrorCode::ReservationNotFound));
}

#[tokio::test]
async fn offer_sweep_expires_stale_offers_and_notifies_both_sides() {
    let mut h = Harness::new().await;
    let item = h.listing("100").await;
    let stale = h.offer(item.id, BUYER, "60").await;
    h.clock.advance_hours(10);
    let fresh = h.offer(item.id, OTHER_BUYER, "70").await;
    h.drain();

    h.clock.advance_hours(63);
    let report = h.state.scheduler.run_once().await;
    assert_eq!(report.get(SweepKind::OfferExpiry).map(|s| s.processed()), Some(1));

    assert_eq!(h.reload_offer(stale).await.status, OfferStatus::Expired);
    assert_eq!(h.reload_offer(fresh).await.status, OfferStatus::Pending);
    assert_eq!(h.reload_listing(item.id).await.status, ListingStatus::Active);

    let sent = h.drain();
    assert_eq!(recipients(&sent, "offer_expired"), vec![SELLER, BUYER]);

    let rerun = h.state.offers.process_expired_offers().await;
    assert_eq!(rerun.attempted, 0);
}

#[tokio::test]
async fn reminders_fire_once_per_party_inside_the_window() {
    let mut h = Harness::new().await;
    let item = h.listing("100").await;
    let offer_id = h.offer(item.id, BUYER, "80").await;
    h.drain();

    // 72h offer, 24h window: nothing yet at +47h
    h.clock.advance_hours(47);
    let quiet = h.state.scheduler.run_once().await;
    assert_eq!(quiet.get(SweepKind::ExpiryReminders).map(|s| s.processed()), Some(0));
    assert!(h.drain().is_empty());

    h.clock.advance_hours(2);
    let first = h.state.scheduler.run_once().await;
    assert_eq!(first.get(SweepKind::ExpiryReminders).map(|s| s.processed()), Some(1));
    h.clock.advance_hours(1);
    h.state.scheduler.run_once().await;

    let reminders: Vec<_> = h
        .drain()
        .into_iter()
        .filter(|n| n.kind.type_name() == "offer_expiring")
        .collect();
    assert_eq!(reminders.len(), 4);
    assert!(reminders.iter().all(|n| n.dedup_key.is_some()));

    let store = StoreNotifier::new(h.pool().clone(), h.state.clock.clone());
    let mut inserted = 0;
    for n in &reminders {
        if store.deliver(n).await.unwrap() {
            inserted += 1;
        }
    }
    assert_eq!(inserted, 2);

    for user in [BUYER, SELLER] {
        let rows = notification::find_for_recipient(h.pool(), user).await.unwrap();
        assert_eq!(rows.len(), 1, "user {user}");
        assert_eq!(rows[0].kind, "offer_expiring");
        assert_eq!(rows[0].title, "Offer expiring soon");
        assert_eq!(rows[0].created_at, h.now());
    }
    assert_eq!(h.reload_offer(offer_id).await.status, OfferStatus::Pending);
}

#[tokio::test]
async fn archive_moves_old_terminal_rows_on_its_own_interval() {
    let h = Harness::new().await;
    let item = h.listing("100").await;
    let rejected = h.offer(item.id, BUYER, "20").await;
    assert!(
        h.state
            .offers
            .reject(rejected, SELLER, OfferRejection::default())
            .await
            .success
    );
    let sold_offer = h.offer(item.id, OTHER_BUYER, "95").await;
    let reservation_id = h
        .state
        .offers
        .accept(sold_offer, SELLER, AcceptOptions::default())
        .await
        .reservation_id
        .expect("reservation id");
    assert!(
        h.state
            .reservations
            .complete_reservation(reservation_id, OTHER_BUYER, Default::default())
            .await
            .success
    );

    // Young rows survive the first run
    let first = h.state.scheduler.run_once().await;
    let archived = first.get(SweepKind::Archive).expect("archive sweep");
    assert!(archived.ran());
    assert_eq!(archived.processed(), 0);

    h.clock.advance_hours(181 * 24);
    let report = h.state.scheduler.run_once().await;
    // The completed reservation and the rejected offer; the accepted offer stays
    assert_eq!(report.get(SweepKind::Archive).map(|s| s.processed()), Some(2));

    assert!(offer::find_by_id(h.pool(), rejected).await.unwrap().is_none());
    let (archived_offers,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM offer_archive WHERE id = ?")
            .bind(rejected)
            .fetch_one(h.pool())
            .await
            .unwrap();
    assert_eq!(archived_offers, 1);
    let (archived_reservations,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM reservation_archive WHERE id = ?")
            .bind(reservation_id)
            .fetch_one(h.pool())
            .await
            .unwrap();
    assert_eq!(archived_reservations, 1);
    assert_eq!(h.reload_listing(item.id).await.status, ListingStatus::Sold);

    // Not due again until the interval passes
    let soon = h.state.scheduler.run_once().await;
    assert!(!soon.get(SweepKind::Archive).expect("archive sweep").ran());

    h.clock.advance_hours(7 * 24);
    let later = h.state.scheduler.run_once().await;
    assert!(later.get(SweepKind::Archive).expect("archive sweep").ran());
}

#[tokio::test]
async fn each_sweep_that_ran_is_logged() {
    let h = Harness::new().await;
    let item = h.listing("100").await;
    h.offer(item.id, BUYER, "80").await;
    h.clock.advance_hours(73);

    h.state.scheduler.run_once().await;
    h.clock.advance_millis(DAY);
    h.state.scheduler.run_once().await;

    let offers = job_log::find_recent(h.pool(), SweepKind::OfferExpiry.as_str(), 10)
        .await
        .unwrap();
    assert_eq!(offers.len(), 2);
    // Newest first
    assert_eq!(offers[0].processed, 0);
    assert_eq!(offers[1].processed, 1);
    assert_eq!(offers[1].errors, 0);

    let archive = job_log::find_recent(h.pool(), SweepKind::Archive.as_str(), 10)
        .await
        .unwrap();
    assert_eq!(archive.len(), 1);

    assert!(
        job_log::last_clean_run_at(h.pool(), SweepKind::Archive.as_str())
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn background_worker_stores_notifications_until_shutdown() {
    let Harness {
        state,
        clock: _clock,
        notifications,
    } = Harness::new().await;

    let mut tasks = BackgroundTasks::new();
    state.start_background_tasks(&mut tasks, notifications);
    assert_eq!(tasks.len(), 2);

    let created = state
        .offers
        .create_offer(shared::models::OfferCreate {
            listing_id: seed_listing(&state).await,
            buyer_id: BUYER,
            amount: usd("75"),
            message: None,
        })
        .await;
    assert!(created.success);

    tasks.shutdown(Duration::from_secs(5)).await;

    let stored = notification::find_for_recipient(&state.db.pool, SELLER)
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].kind, "offer_received");
    // Stamped by the engine clock, not the wall clock
    assert_eq!(stored[0].created_at, START);
    assert!(!stored[0].is_read);
}

async fn seed_listing(state: &offer_engine::EngineState) -> i64 {
    let data = shared::models::ListingCreate {
        owner_id: SELLER,
        title: "Road bike".to_string(),
        price: usd("120"),
    };
    offer_engine::db::repository::listing::insert(
        &state.db.pool,
        shared::util::snowflake_id(),
        &data,
        START,
    )
    .await
    .unwrap()
    .id
}
