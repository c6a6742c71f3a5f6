//! Offer Repository

use super::{RepoError, RepoResult, parse_decimal};
use shared::models::{Money, Offer, OfferStatus, Party};
use sqlx::{Executor, Sqlite};

macro_rules! offer_columns {
    () => {
        "id, listing_id, buyer_id, seller_id, amount, currency, message, status, proposer, expires_at, \
         parent_offer_id, response_message, rejection_reason, responded_at, created_at, updated_at"
    };
}

#[derive(Debug, sqlx::FromRow)]
struct OfferRow {
    id: i64,
    listing_id: i64,
    buyer_id: i64,
    seller_id: i64,
    amount: String,
    currency: String,
    message: Option<String>,
    status: String,
    proposer: String,
    expires_at: i64,
    parent_offer_id: Option<i64>,
    response_message: Option<String>,
    rejection_reason: Option<String>,
    responded_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<OfferRow> for Offer {
    type Error = RepoError;

    fn try_from(row: OfferRow) -> RepoResult<Self> {
        Ok(Offer {
            id: row.id,
            listing_id: row.listing_id,
            buyer_id: row.buyer_id,
            seller_id: row.seller_id,
            amount: Money::new(parse_decimal("offer.amount", &row.amount)?, row.currency),
            message: row.message,
            status: row.status.parse::<OfferStatus>()?,
            proposer: row.proposer.parse::<Party>()?,
            expires_at: row.expires_at,
            parent_offer_id: row.parent_offer_id,
            response_message: row.response_message,
            rejection_reason: row.rejection_reason,
            responded_at: row.responded_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn decode_all(rows: Vec<OfferRow>) -> RepoResult<Vec<Offer>> {
    rows.into_iter().map(Offer::try_from).collect()
}

/// Values of a new pending offer
#[derive(Debug, Clone)]
pub struct NewOffer<'a> {
    pub id: i64,
    pub listing_id: i64,
    pub buyer_id: i64,
    pub seller_id: i64,
    pub amount: &'a Money,
    pub message: Option<&'a str>,
    pub proposer: Party,
    pub expires_at: i64,
    pub parent_offer_id: Option<i64>,
}

pub async fn insert<'e, E>(ex: E, new: NewOffer<'_>, now: i64) -> RepoResult<Offer>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, OfferRow>(concat!(
        "INSERT INTO offer (id, listing_id, buyer_id, seller_id, amount, currency, message, status, proposer, \
         expires_at, parent_offer_id, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8, ?9, ?10, ?11, ?11) RETURNING ",
        offer_columns!()
    ))
    .bind(new.id)
    .bind(new.listing_id)
    .bind(new.buyer_id)
    .bind(new.seller_id)
    .bind(new.amount.amount.to_string())
    .bind(&new.amount.currency)
    .bind(new.message)
    .bind(new.proposer.as_str())
    .bind(new.expires_at)
    .bind(new.parent_offer_id)
    .bind(now)
    .fetch_one(ex)
    .await?;
    row.try_into()
}

pub async fn find_by_id<'e, E>(ex: E, id: i64) -> RepoResult<Option<Offer>>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, OfferRow>(concat!("SELECT ", offer_columns!(), " FROM offer WHERE id = ?"))
        .bind(id)
        .fetch_optional(ex)
        .await?
        .map(Offer::try_from)
        .transpose()
}

/// The counter-offer answering `parent_id`, if any
pub async fn find_counter<'e, E>(ex: E, parent_id: i64) -> RepoResult<Option<Offer>>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, OfferRow>(concat!(
        "SELECT ",
        offer_columns!(),
        " FROM offer WHERE parent_offer_id = ?"
    ))
    .bind(parent_id)
    .fetch_optional(ex)
    .await?
    .map(Offer::try_from)
    .transpose()
}

/// Opening offers (not counters) a buyer has made on a listing, any status
pub async fn count_opening_offers<'e, E>(ex: E, listing_id: i64, buyer_id: i64) -> RepoResult<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM offer WHERE listing_id = ? AND buyer_id = ? AND parent_offer_id IS NULL",
    )
    .bind(listing_id)
    .bind(buyer_id)
    .fetch_one(ex)
    .await?;
    Ok(count)
}

/// Guarded `pending → to` transition.
///
/// With `live_at = Some(now)` the offer must also be unexpired at `now`;
/// the scheduler's expiry passes `None`.
#[derive(Debug, Clone, Copy)]
pub struct Transition<'a> {
    pub to: OfferStatus,
    pub response_message: Option<&'a str>,
    pub rejection_reason: Option<&'a str>,
    pub live_at: Option<i64>,
}

pub async fn transition_from_pending<'e, E>(
    ex: E,
    id: i64,
    t: Transition<'_>,
    now: i64,
) -> RepoResult<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "UPDATE offer SET status = ?1, \
             response_message = COALESCE(?2, response_message), \
             rejection_reason = COALESCE(?3, rejection_reason), \
             responded_at = ?4, updated_at = ?4 \
         WHERE id = ?5 AND status = 'pending' AND (?6 IS NULL OR expires_at > ?6)",
    )
    .bind(t.to.as_str())
    .bind(t.response_message)
    .bind(t.rejection_reason)
    .bind(now)
    .bind(id)
    .bind(t.live_at)
    .execute(ex)
    .await?;
    Ok(result.rows_affected())
}

/// Pending offers whose expiry has passed
pub async fn find_expired_pending<'e, E>(ex: E, now: i64, limit: i64) -> RepoResult<Vec<Offer>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, OfferRow>(concat!(
        "SELECT ",
        offer_columns!(),
        " FROM offer WHERE status = 'pending' AND expires_at <= ? ORDER BY expires_at LIMIT ?"
    ))
    .bind(now)
    .bind(limit)
    .fetch_all(ex)
    .await?;
    decode_all(rows)
}

/// Pending offers expiring in `(now, until]`
pub async fn find_expiring_pending<'e, E>(
    ex: E,
    now: i64,
    until: i64,
    limit: i64,
) -> RepoResult<Vec<Offer>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, OfferRow>(concat!(
        "SELECT ",
        offer_columns!(),
        " FROM offer WHERE status = 'pending' AND expires_at > ? AND expires_at <= ? \
         ORDER BY expires_at LIMIT ?"
    ))
    .bind(now)
    .bind(until)
    .bind(limit)
    .fetch_all(ex)
    .await?;
    decode_all(rows)
}

/// Other pending offers on a listing
pub async fn find_competing<'e, E>(ex: E, listing_id: i64, except_id: i64) -> RepoResult<Vec<Offer>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, OfferRow>(concat!(
        "SELECT ",
        offer_columns!(),
        " FROM offer WHERE listing_id = ? AND id <> ? AND status = 'pending' ORDER BY created_at"
    ))
    .bind(listing_id)
    .bind(except_id)
    .fetch_all(ex)
    .await?;
    decode_all(rows)
}

/// Offers still in negotiation on a listing (pending or countered), newest first
pub async fn find_open_for_listing<'e, E>(ex: E, listing_id: i64) -> RepoResult<Vec<Offer>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, OfferRow>(concat!(
        "SELECT ",
        offer_columns!(),
        " FROM offer WHERE listing_id = ? AND status IN ('pending', 'countered') \
         ORDER BY created_at DESC, id DESC"
    ))
    .bind(listing_id)
    .fetch_all(ex)
    .await?;
    decode_all(rows)
}
