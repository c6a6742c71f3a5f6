//! Reservation Repository

use super::{RepoError, RepoResult, parse_decimal};
use shared::models::{Money, Party, Reservation, ReservationStatus};
use sqlx::{Executor, Sqlite};

macro_rules! reservation_columns {
    () => {
        "id, listing_id, buyer_id, seller_id, offer_id, amount, currency, status, expires_at, \
         deposit_required, deposit_deadline, payment_reference, completed_at, cancelled_at, \
         cancelled_by, cancellation_reason, created_at, updated_at"
    };
}

#[derive(Debug, sqlx::FromRow)]
struct ReservationRow {
    id: i64,
    listing_id: i64,
    buyer_id: i64,
    seller_id: i64,
    offer_id: i64,
    amount: String,
    currency: String,
    status: String,
    expires_at: i64,
    deposit_required: bool,
    deposit_deadline: Option<i64>,
    payment_reference: Option<String>,
    completed_at: Option<i64>,
    cancelled_at: Option<i64>,
    cancelled_by: Option<i64>,
    cancellation_reason: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = RepoError;

    fn try_from(row: ReservationRow) -> RepoResult<Self> {
        Ok(Reservation {
            id: row.id,
            listing_id: row.listing_id,
            buyer_id: row.buyer_id,
            seller_id: row.seller_id,
            offer_id: row.offer_id,
            amount: Money::new(parse_decimal("reservation.amount", &row.amount)?, row.currency),
            status: row.status.parse::<ReservationStatus>()?,
            expires_at: row.expires_at,
            deposit_required: row.deposit_required,
            deposit_deadline: row.deposit_deadline,
            payment_reference: row.payment_reference,
            completed_at: row.completed_at,
            cancelled_at: row.cancelled_at,
            cancelled_by: row.cancelled_by,
            cancellation_reason: row.cancellation_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn decode_all(rows: Vec<ReservationRow>) -> RepoResult<Vec<Reservation>> {
    rows.into_iter().map(Reservation::try_from).collect()
}

#[derive(Debug, Clone)]
pub struct NewReservation<'a> {
    pub id: i64,
    pub listing_id: i64,
    pub buyer_id: i64,
    pub seller_id: i64,
    pub offer_id: i64,
    pub amount: &'a Money,
    pub expires_at: i64,
}

/// Insert an active reservation. A second active row for the same listing
/// (or a second reservation for the same offer) fails with `Duplicate`.
pub async fn insert<'e, E>(ex: E, new: NewReservation<'_>, now: i64) -> RepoResult<Reservation>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, ReservationRow>(concat!(
        "INSERT INTO reservation (id, listing_id, buyer_id, seller_id, offer_id, amount, currency, status, \
         expires_at, deposit_required, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'active', ?8, 0, ?9, ?9) RETURNING ",
        reservation_columns!()
    ))
    .bind(new.id)
    .bind(new.listing_id)
    .bind(new.buyer_id)
    .bind(new.seller_id)
    .bind(new.offer_id)
    .bind(new.amount.amount.to_string())
    .bind(&new.amount.currency)
    .bind(new.expires_at)
    .bind(now)
    .fetch_one(ex)
    .await?;
    row.try_into()
}

pub async fn find_by_id<'e, E>(ex: E, id: i64) -> RepoResult<Option<Reservation>>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, ReservationRow>(concat!(
        "SELECT ",
        reservation_columns!(),
        " FROM reservation WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(ex)
    .await?
    .map(Reservation::try_from)
    .transpose()
}

/// Reservation that blocks a new hold on the listing: an unexpired active
/// one, or one completed/cancelled at or after `cooldown_since`.
pub async fn find_blocking<'e, E>(
    ex: E,
    listing_id: i64,
    now: i64,
    cooldown_since: i64,
) -> RepoResult<Option<Reservation>>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, ReservationRow>(concat!(
        "SELECT ",
        reservation_columns!(),
        " FROM reservation WHERE listing_id = ?1 AND ( \
             (status = 'active' AND expires_at > ?2) \
             OR (status IN ('completed', 'cancelled') AND updated_at >= ?3) \
         ) ORDER BY CASE status WHEN 'active' THEN 0 ELSE 1 END, updated_at DESC LIMIT 1"
    ))
    .bind(listing_id)
    .bind(now)
    .bind(cooldown_since)
    .fetch_optional(ex)
    .await?
    .map(Reservation::try_from)
    .transpose()
}

/// active → completed, only while unexpired
pub async fn complete<'e, E>(
    ex: E,
    id: i64,
    payment_reference: Option<&str>,
    now: i64,
) -> RepoResult<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "UPDATE reservation SET status = 'completed', completed_at = ?1, \
             payment_reference = COALESCE(?2, payment_reference), updated_at = ?1 \
         WHERE id = ?3 AND status = 'active' AND expires_at > ?1",
    )
    .bind(now)
    .bind(payment_reference)
    .bind(id)
    .execute(ex)
    .await?;
    Ok(result.rows_affected())
}

/// active → cancelled by a party
pub async fn cancel<'e, E>(
    ex: E,
    id: i64,
    cancelled_by: i64,
    reason: Option<&str>,
    now: i64,
) -> RepoResult<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "UPDATE reservation SET status = 'cancelled', cancelled_at = ?1, cancelled_by = ?2, \
             cancellation_reason = ?3, updated_at = ?1 \
         WHERE id = ?4 AND status = 'active'",
    )
    .bind(now)
    .bind(cancelled_by)
    .bind(reason)
    .bind(id)
    .execute(ex)
    .await?;
    Ok(result.rows_affected())
}

/// active → expired, only once the expiry has passed. Returns the expired row.
pub async fn expire<'e, E>(ex: E, id: i64, now: i64) -> RepoResult<Option<Reservation>>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, ReservationRow>(concat!(
        "UPDATE reservation SET status = 'expired', cancelled_at = ?1, cancelled_by = NULL, \
             cancellation_reason = 'expired', updated_at = ?1 \
         WHERE id = ?2 AND status = 'active' AND expires_at <= ?1 RETURNING ",
        reservation_columns!()
    ))
    .bind(now)
    .bind(id)
    .fetch_optional(ex)
    .await?
    .map(Reservation::try_from)
    .transpose()
}

/// Push an unexpired active reservation's expiry forward. Returns the new expiry.
pub async fn extend<'e, E>(ex: E, id: i64, additional_millis: i64, now: i64) -> RepoResult<Option<i64>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let expires_at = sqlx::query_scalar::<_, i64>(
        "UPDATE reservation SET expires_at = expires_at + ?1, updated_at = ?2 \
         WHERE id = ?3 AND status = 'active' AND expires_at > ?2 RETURNING expires_at",
    )
    .bind(additional_millis)
    .bind(now)
    .bind(id)
    .fetch_optional(ex)
    .await?;
    Ok(expires_at)
}

/// Mark an active reservation as gated on a deposit
pub async fn require_deposit<'e, E>(ex: E, id: i64, deadline: i64, now: i64) -> RepoResult<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "UPDATE reservation SET deposit_required = 1, deposit_deadline = ?1, updated_at = ?2 \
         WHERE id = ?3 AND status = 'active'",
    )
    .bind(deadline)
    .bind(now)
    .bind(id)
    .execute(ex)
    .await?;
    Ok(result.rows_affected())
}

/// Active reservations whose expiry has passed
pub async fn find_expired_active<'e, E>(ex: E, now: i64, limit: i64) -> RepoResult<Vec<Reservation>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, ReservationRow>(concat!(
        "SELECT ",
        reservation_columns!(),
        " FROM reservation WHERE status = 'active' AND expires_at <= ? ORDER BY expires_at LIMIT ?"
    ))
    .bind(now)
    .bind(limit)
    .fetch_all(ex)
    .await?;
    decode_all(rows)
}

pub async fn find_active_for_listing<'e, E>(ex: E, listing_id: i64) -> RepoResult<Option<Reservation>>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, ReservationRow>(concat!(
        "SELECT ",
        reservation_columns!(),
        " FROM reservation WHERE listing_id = ? AND status = 'active'"
    ))
    .bind(listing_id)
    .fetch_optional(ex)
    .await?
    .map(Reservation::try_from)
    .transpose()
}

pub async fn count_active_for_listing<'e, E>(ex: E, listing_id: i64) -> RepoResult<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM reservation WHERE listing_id = ? AND status = 'active'",
    )
    .bind(listing_id)
    .fetch_one(ex)
    .await?;
    Ok(count)
}

/// A user's reservations on one side of the deal, newest first (max 50)
pub async fn find_for_user<'e, E>(
    ex: E,
    user_id: i64,
    role: Party,
    status: Option<ReservationStatus>,
) -> RepoResult<Vec<Reservation>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = match role {
        Party::Buyer => concat!(
            "SELECT ",
            reservation_columns!(),
            " FROM reservation WHERE buyer_id = ?1 AND (?2 IS NULL OR status = ?2) \
             ORDER BY created_at DESC LIMIT 50"
        ),
        Party::Seller => concat!(
            "SELECT ",
            reservation_columns!(),
            " FROM reservation WHERE seller_id = ?1 AND (?2 IS NULL OR status = ?2) \
             ORDER BY created_at DESC LIMIT 50"
        ),
    };
    let rows = sqlx::query_as::<_, ReservationRow>(sql)
        .bind(user_id)
        .bind(status.map(|s| s.as_str()))
        .fetch_all(ex)
        .await?;
    decode_all(rows)
}
