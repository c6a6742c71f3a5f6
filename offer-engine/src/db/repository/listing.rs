//! Listing Repository

use super::{RepoError, RepoResult, parse_decimal, parse_optional_decimal};
use rust_decimal::Decimal;
use shared::models::{Listing, ListingCreate, ListingStatus, Money};
use sqlx::{Executor, Sqlite};

macro_rules! listing_columns {
    () => {
        "id, owner_id, title, price, currency, status, reserved_until, sold_to, sold_amount, created_at, updated_at"
    };
}

#[derive(Debug, sqlx::FromRow)]
struct ListingRow {
    id: i64,
    owner_id: i64,
    title: String,
    price: String,
    currency: String,
    status: String,
    reserved_until: Option<i64>,
    sold_to: Option<i64>,
    sold_amount: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<ListingRow> for Listing {
    type Error = RepoError;

    fn try_from(row: ListingRow) -> RepoResult<Self> {
        Ok(Listing {
            id: row.id,
            owner_id: row.owner_id,
            title: row.title,
            price: Money::new(parse_decimal("listing.price", &row.price)?, row.currency),
            status: row.status.parse::<ListingStatus>()?,
            reserved_until: row.reserved_until,
            sold_to: row.sold_to,
            sold_amount: parse_optional_decimal("listing.sold_amount", row.sold_amount.as_deref())?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub async fn insert<'e, E>(ex: E, id: i64, data: &ListingCreate, now: i64) -> RepoResult<Listing>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, ListingRow>(concat!(
        "INSERT INTO listing (id, owner_id, title, price, currency, status, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, 'active', ?6, ?6) RETURNING ",
        listing_columns!()
    ))
    .bind(id)
    .bind(data.owner_id)
    .bind(&data.title)
    .bind(data.price.amount.to_string())
    .bind(&data.price.currency)
    .bind(now)
    .fetch_one(ex)
    .await?;
    row.try_into()
}

pub async fn find_by_id<'e, E>(ex: E, id: i64) -> RepoResult<Option<Listing>>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, ListingRow>(concat!(
        "SELECT ",
        listing_columns!(),
        " FROM listing WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(ex)
    .await?
    .map(Listing::try_from)
    .transpose()
}

/// active → reserved
pub async fn mark_reserved<'e, E>(ex: E, id: i64, reserved_until: i64, now: i64) -> RepoResult<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "UPDATE listing SET status = 'reserved', reserved_until = ?1, updated_at = ?2 \
         WHERE id = ?3 AND status = 'active'",
    )
    .bind(reserved_until)
    .bind(now)
    .bind(id)
    .execute(ex)
    .await?;
    Ok(result.rows_affected())
}

/// reserved → sold
pub async fn mark_sold<'e, E>(
    ex: E,
    id: i64,
    buyer_id: i64,
    amount: Decimal,
    now: i64,
) -> RepoResult<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "UPDATE listing SET status = 'sold', sold_to = ?1, sold_amount = ?2, reserved_until = NULL, updated_at = ?3 \
         WHERE id = ?4 AND status = 'reserved'",
    )
    .bind(buyer_id)
    .bind(amount.to_string())
    .bind(now)
    .bind(id)
    .execute(ex)
    .await?;
    Ok(result.rows_affected())
}

/// reserved → active
pub async fn release<'e, E>(ex: E, id: i64, now: i64) -> RepoResult<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "UPDATE listing SET status = 'active', reserved_until = NULL, updated_at = ?1 \
         WHERE id = ?2 AND status = 'reserved'",
    )
    .bind(now)
    .bind(id)
    .execute(ex)
    .await?;
    Ok(result.rows_affected())
}

pub async fn set_reserved_until<'e, E>(ex: E, id: i64, reserved_until: i64, now: i64) -> RepoResult<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "UPDATE listing SET reserved_until = ?1, updated_at = ?2 WHERE id = ?3 AND status = 'reserved'",
    )
    .bind(reserved_until)
    .bind(now)
    .bind(id)
    .execute(ex)
    .await?;
    Ok(result.rows_affected())
}
