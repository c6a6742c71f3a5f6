//! Archive Repository
//!
//! Moves terminal rows into the archive tables. Each move is an
//! INSERT ... SELECT followed by a DELETE of the same predicate, so both
//! statements must run on one transaction's connection.

use super::RepoResult;
use sqlx::SqliteConnection;

/// Archive rejected/expired/withdrawn offers last touched before `cutoff`.
/// Offers still referenced by a counter-offer or a reservation stay put.
pub async fn archive_offers(conn: &mut SqliteConnection, cutoff: i64, now: i64) -> RepoResult<u64> {
    const PREDICATE: &str = "status IN ('rejected', 'expired', 'withdrawn') AND updated_at < ?1 \
         AND NOT EXISTS (SELECT 1 FROM offer c WHERE c.parent_offer_id = offer.id) \
         AND NOT EXISTS (SELECT 1 FROM reservation r WHERE r.offer_id = offer.id)";

    let copied = sqlx::query(&format!(
        "INSERT OR IGNORE INTO offer_archive (id, listing_id, buyer_id, seller_id, amount, currency, message, \
             status, proposer, expires_at, parent_offer_id, response_message, rejection_reason, responded_at, \
             created_at, updated_at, archived_at) \
         SELECT id, listing_id, buyer_id, seller_id, amount, currency, message, status, proposer, expires_at, \
             parent_offer_id, response_message, rejection_reason, responded_at, created_at, updated_at, ?2 \
         FROM offer WHERE {PREDICATE}"
    ))
    .bind(cutoff)
    .bind(now)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    let deleted = sqlx::query(&format!("DELETE FROM offer WHERE {PREDICATE}"))
        .bind(cutoff)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    if copied != deleted {
        tracing::warn!(copied, deleted, "Offer archive copy/delete counts differ");
    }
    Ok(deleted)
}

/// Archive completed/cancelled/expired reservations last touched before `cutoff`
pub async fn archive_reservations(
    conn: &mut SqliteConnection,
    cutoff: i64,
    now: i64,
) -> RepoResult<u64> {
    const PREDICATE: &str = "status IN ('completed', 'cancelled', 'expired') AND updated_at < ?1";

    let copied = sqlx::query(&format!(
        "INSERT OR IGNORE INTO reservation_archive (id, listing_id, buyer_id, seller_id, offer_id, amount, \
             currency, status, expires_at, deposit_required, deposit_deadline, payment_reference, completed_at, \
             cancelled_at, cancelled_by, cancellation_reason, created_at, updated_at, archived_at) \
         SELECT id, listing_id, buyer_id, seller_id, offer_id, amount, currency, status, expires_at, \
             deposit_required, deposit_deadline, payment_reference, completed_at, cancelled_at, cancelled_by, \
             cancellation_reason, created_at, updated_at, ?2 \
         FROM reservation WHERE {PREDICATE}"
    ))
    .bind(cutoff)
    .bind(now)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    let deleted = sqlx::query(&format!("DELETE FROM reservation WHERE {PREDICATE}"))
        .bind(cutoff)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    if copied != deleted {
        tracing::warn!(copied, deleted, "Reservation archive copy/delete counts differ");
    }
    Ok(deleted)
}
