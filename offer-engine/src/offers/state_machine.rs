use super::{ANOTHER_OFFER_ACCEPTED, MAX_CHAIN_LENGTH};
use crate::core::clock::SharedClock;
use crate::core::config::NegotiationPolicy;
use crate::core::error::{ServiceError, ServiceResult};
use crate::db::repository::{listing, offer, reservation};
use crate::db::rollback;
use crate::fanout::FanOut;
use crate::reservations::ReservationManager;
use rust_decimal::Decimal;
use serde_json::json;
use shared::error::{AppError, AppResult, ErrorCode};
use shared::models::{
    AcceptOptions, ActivityAction, CounterOffer, DepositPolicy, ListingStatus, Money, Offer,
    OfferCreate, OfferRejection, OfferStatus, Party, Reservation, ReservationRequest,
};
use shared::notification::{Notification, NotificationKind};
use shared::response::{BatchOutcome, OfferActionResult};
use shared::util::hours_after;
use sqlx::{Executor, Sqlite, SqliteConnection, SqlitePool};

/// 报价状态机
///
/// Actors are passed explicitly on every call; the machine keeps no
/// per-request state.
#[derive(Debug, Clone)]
pub struct OfferStateMachine {
    pool: SqlitePool,
    clock: SharedClock,
    policy: NegotiationPolicy,
    fanout: FanOut,
    reservations: ReservationManager,
}

/// Committed accept: the hold it produced and its deposit gate
struct Accepted {
    reservation: Reservation,
    deposit_deadline: Option<i64>,
}

fn failure(op: &'static str, err: ServiceError) -> OfferActionResult {
    let err = AppError::from(err);
    tracing::debug!(op, code = %err.code, error = %err, "Offer operation rejected");
    OfferActionResult::failed(&err)
}

/// Status checks shared by every actor-initiated transition
fn ensure_pending(current: &Offer, now: i64) -> Result<(), AppError> {
    if current.status != OfferStatus::Pending {
        return Err(AppError::new(ErrorCode::OfferNotPending)
            .with_detail("status", current.status.as_str()));
    }
    if current.is_expired_at(now) {
        return Err(AppError::new(ErrorCode::OfferExpired).with_detail("expired_at", current.expires_at));
    }
    Ok(())
}

/// Explain a guarded write that matched no row
async fn stale_offer_error<'e, E>(ex: E, offer_id: i64, now: i64) -> ServiceError
where
    E: Executor<'e, Database = Sqlite>,
{
    match offer::find_by_id(ex, offer_id).await {
        Ok(Some(current)) => ensure_pending(&current, now)
            .err()
            .unwrap_or_else(|| AppError::new(ErrorCode::OfferNotPending))
            .into(),
        Ok(None) => AppError::new(ErrorCode::OfferNotFound).into(),
        Err(e) => e.into(),
    }
}

impl OfferStateMachine {
    pub fn new(
        pool: SqlitePool,
        clock: SharedClock,
        policy: NegotiationPolicy,
        fanout: FanOut,
        reservations: ReservationManager,
    ) -> Self {
        Self {
            pool,
            clock,
            policy,
            fanout,
            reservations,
        }
    }

    // ========================================================================
    // Create
    // ========================================================================

    /// Buyer's opening offer on an active listing
    pub async fn create_offer(&self, data: OfferCreate) -> OfferActionResult {
        match self.try_create(&data).await {
            Ok(created) => OfferActionResult {
                expires_at: Some(created.expires_at),
                ..OfferActionResult::ok(created.id)
            },
            Err(e) => failure("create_offer", e),
        }
    }

    async fn try_create(&self, data: &OfferCreate) -> ServiceResult<Offer> {
        if !data.amount.is_positive() {
            return Err(AppError::new(ErrorCode::OfferInvalidAmount).into());
        }
        let now = self.clock.now_millis();
        let target = listing::find_by_id(&self.pool, data.listing_id)
            .await?
            .ok_or_else(|| AppError::new(ErrorCode::ListingNotFound))?;
        if target.status != ListingStatus::Active {
            return Err(AppError::new(ErrorCode::ListingNotAvailable)
                .with_detail("status", target.status.as_str())
                .into());
        }
        if target.owner_id == data.buyer_id {
            return Err(AppError::new(ErrorCode::SelfOffer).into());
        }
        if !data.amount.same_currency(&target.price) {
            return Err(AppError::new(ErrorCode::CurrencyMismatch)
                .with_detail("listing_currency", target.price.currency.as_str())
                .into());
        }
        let attempts = offer::count_opening_offers(&self.pool, target.id, data.buyer_id).await?;
        if attempts >= self.policy.offer_attempt_limit {
            return Err(AppError::new(ErrorCode::OfferLimitReached)
                .with_detail("limit", self.policy.offer_attempt_limit)
                .into());
        }

        let new = offer::NewOffer {
            id: shared::util::snowflake_id(),
            listing_id: target.id,
            buyer_id: data.buyer_id,
            seller_id: target.owner_id,
            amount: &data.amount,
            message: data.message.as_deref(),
            proposer: Party::Buyer,
            expires_at: now + self.policy.offer_ttl_millis(),
            parent_offer_id: None,
        };
        let created = offer::insert(&self.pool, new, now).await?;

        tracing::info!(
            offer_id = created.id,
            listing_id = created.listing_id,
            buyer_id = created.buyer_id,
            amount = %created.amount,
            "Offer created"
        );
        self.fanout
            .record(
                ActivityAction::OfferCreated,
                created.id,
                Some(created.buyer_id),
                json!({ "listing_id": created.listing_id, "amount": created.amount }),
            )
            .await;
        self.fanout.notify_all([Notification::new(
            created.seller_id,
            NotificationKind::OfferReceived {
                offer_id: created.id,
                listing_id: created.listing_id,
                amount: created.amount.clone(),
            },
        )]);
        Ok(created)
    }

    // ========================================================================
    // Accept
    // ========================================================================

    /// Accept a pending offer and reserve the listing for its buyer.
    ///
    /// The status flip, the reservation insert, the listing flip and the
    /// deposit gate commit together or not at all. After commit every other
    /// pending offer on the listing is rejected.
    pub async fn accept(
        &self,
        offer_id: i64,
        actor_id: i64,
        options: AcceptOptions,
    ) -> OfferActionResult {
        match self.try_accept(offer_id, actor_id, &options).await {
            Ok(accepted) => OfferActionResult {
                reservation_id: Some(accepted.reservation.id),
                reserved_until: Some(accepted.reservation.expires_at),
                requires_deposit: accepted.deposit_deadline.is_some(),
                deposit_deadline: accepted.deposit_deadline,
                ..OfferActionResult::ok(offer_id)
            },
            Err(e) => failure("accept", e),
        }
    }

    async fn try_accept(
        &self,
        offer_id: i64,
        actor_id: i64,
        options: &AcceptOptions,
    ) -> ServiceResult<Accepted> {
        let now = self.clock.now_millis();
        let current = self.load_for_responder(offer_id, actor_id, now).await?;
        let deposit_deadline = match options.deposit {
            DepositPolicy::NotRequired => None,
            DepositPolicy::Required { deadline_hours } if deadline_hours > 0 => {
                let deadline = hours_after(now, deadline_hours).ok_or_else(|| {
                    AppError::validation("Deposit deadline is too far in the future")
                        .with_detail("deadline_hours", deadline_hours)
                })?;
                Some(deadline)
            }
            DepositPolicy::Required { deadline_hours } => {
                return Err(AppError::validation("Deposit deadline must be a positive number of hours")
                    .with_detail("deadline_hours", deadline_hours)
                    .into());
            }
        };

        let mut tx = self.pool.begin().await?;
        let reserved = match self
            .accept_in_tx(&mut tx, &current, options.message.as_deref(), deposit_deadline, now)
            .await
        {
            Ok(reserved) => reserved,
            Err(e) => {
                rollback(tx, "accept_offer").await;
                return Err(e);
            }
        };
        tx.commit().await?;

        tracing::info!(
            offer_id,
            listing_id = current.listing_id,
            reservation_id = reserved.id,
            requires_deposit = deposit_deadline.is_some(),
            "Offer accepted"
        );
        self.fanout
            .record(
                ActivityAction::OfferAccepted,
                offer_id,
                Some(actor_id),
                json!({
                    "listing_id": current.listing_id,
                    "amount": current.amount,
                    "reservation_id": reserved.id,
                    "requires_deposit": deposit_deadline.is_some(),
                }),
            )
            .await;
        self.reservations.record_created(&reserved, Some(actor_id)).await;
        self.fanout.notify_all([Notification::new(
            current.proposer_id(),
            NotificationKind::OfferAccepted {
                offer_id,
                listing_id: current.listing_id,
                amount: current.amount.clone(),
                reservation_id: reserved.id,
                reserved_until: reserved.expires_at,
                requires_deposit: deposit_deadline.is_some(),
            },
        )]);

        self.reject_competing(&current).await;

        Ok(Accepted {
            reservation: reserved,
            deposit_deadline,
        })
    }

    async fn accept_in_tx(
        &self,
        conn: &mut SqliteConnection,
        current: &Offer,
        message: Option<&str>,
        deposit_deadline: Option<i64>,
        now: i64,
    ) -> ServiceResult<Reservation> {
        let flip = offer::Transition {
            to: OfferStatus::Accepted,
            response_message: message,
            rejection_reason: None,
            live_at: Some(now),
        };
        if offer::transition_from_pending(&mut *conn, current.id, flip, now).await? == 0 {
            return Err(stale_offer_error(&mut *conn, current.id, now).await);
        }

        let req = ReservationRequest {
            listing_id: current.listing_id,
            buyer_id: current.buyer_id,
            offer_id: current.id,
            amount: current.amount.clone(),
            duration_hours: None,
        };
        let mut reserved = self.reservations.reserve_in_tx(&mut *conn, &req, now).await?;

        if let Some(deadline) = deposit_deadline {
            if reservation::require_deposit(&mut *conn, reserved.id, deadline, now).await? == 0 {
                return Err(AppError::inconsistent("New reservation is not active").into());
            }
            reserved.deposit_required = true;
            reserved.deposit_deadline = Some(deadline);
        }
        Ok(reserved)
    }

    /// Reject every other pending offer on the listing. Each row is its own
    /// guarded write; a row that moved on in the meantime is left alone.
    async fn reject_competing(&self, accepted: &Offer) {
        let now = self.clock.now_millis();
        let competing = match offer::find_competing(&self.pool, accepted.listing_id, accepted.id).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(listing_id = accepted.listing_id, error = %e, "Failed to load competing offers");
                return;
            }
        };

        let mut rejected = 0usize;
        for other in competing {
            let flip = offer::Transition {
                to: OfferStatus::Rejected,
                response_message: None,
                rejection_reason: Some(ANOTHER_OFFER_ACCEPTED),
                live_at: None,
            };
            match offer::transition_from_pending(&self.pool, other.id, flip, now).await {
                Ok(0) => {
                    tracing::debug!(offer_id = other.id, "Competing offer already left pending");
                }
                Ok(_) => {
                    rejected += 1;
                    self.fanout
                        .record(
                            ActivityAction::OfferRejected,
                            other.id,
                            None,
                            json!({
                                "listing_id": other.listing_id,
                                "reason": ANOTHER_OFFER_ACCEPTED,
                                "accepted_offer_id": accepted.id,
                            }),
                        )
                        .await;
                    self.fanout.notify_all([Notification::new(
                        other.proposer_id(),
                        NotificationKind::OfferRejected {
                            offer_id: other.id,
                            listing_id: other.listing_id,
                            reason: Some(ANOTHER_OFFER_ACCEPTED.to_string()),
                        },
                    )]);
                }
                Err(e) => {
                    tracing::warn!(offer_id = other.id, error = %e, "Failed to reject competing offer");
                }
            }
        }

        if rejected > 0 {
            tracing::info!(
                listing_id = accepted.listing_id,
                accepted_offer_id = accepted.id,
                rejected,
                "Competing offers rejected"
            );
        }
    }

    // ========================================================================
    // Reject
    // ========================================================================

    pub async fn reject(
        &self,
        offer_id: i64,
        actor_id: i64,
        rejection: OfferRejection,
    ) -> OfferActionResult {
        match self.try_reject(offer_id, actor_id, &rejection).await {
            Ok(()) => OfferActionResult::ok(offer_id),
            Err(e) => failure("reject", e),
        }
    }

    async fn try_reject(
        &self,
        offer_id: i64,
        actor_id: i64,
        rejection: &OfferRejection,
    ) -> ServiceResult<()> {
        let now = self.clock.now_millis();
        let current = self.load_for_responder(offer_id, actor_id, now).await?;
        let flip = offer::Transition {
            to: OfferStatus::Rejected,
            response_message: rejection.message.as_deref(),
            rejection_reason: rejection.reason.as_deref(),
            live_at: Some(now),
        };
        if offer::transition_from_pending(&self.pool, offer_id, flip, now).await? == 0 {
            return Err(stale_offer_error(&self.pool, offer_id, now).await);
        }

        tracing::info!(offer_id, listing_id = current.listing_id, "Offer rejected");
        self.fanout
            .record(
                ActivityAction::OfferRejected,
                offer_id,
                Some(actor_id),
                json!({ "listing_id": current.listing_id, "reason": rejection.reason }),
            )
            .await;
        self.fanout.notify_all([Notification::new(
            current.proposer_id(),
            NotificationKind::OfferRejected {
                offer_id,
                listing_id: current.listing_id,
                reason: rejection.reason.clone(),
            },
        )]);
        Ok(())
    }

    // ========================================================================
    // Counter
    // ========================================================================

    /// Answer a pending offer with a new price. The original flips to
    /// `countered` and the counter is inserted in the same transaction.
    pub async fn counter_offer(
        &self,
        offer_id: i64,
        actor_id: i64,
        counter: CounterOffer,
    ) -> OfferActionResult {
        match self.try_counter(offer_id, actor_id, &counter).await {
            Ok(created) => OfferActionResult {
                new_offer_id: Some(created.id),
                expires_at: Some(created.expires_at),
                ..OfferActionResult::ok(offer_id)
            },
            Err(e) => failure("counter_offer", e),
        }
    }

    async fn try_counter(
        &self,
        offer_id: i64,
        actor_id: i64,
        counter: &CounterOffer,
    ) -> ServiceResult<Offer> {
        let now = self.clock.now_millis();
        let current = self.load_for_responder(offer_id, actor_id, now).await?;
        if counter.amount <= Decimal::ZERO {
            return Err(AppError::new(ErrorCode::OfferInvalidAmount).into());
        }
        let target = listing::find_by_id(&self.pool, current.listing_id)
            .await?
            .ok_or_else(|| AppError::new(ErrorCode::ListingNotFound))?;
        if target.status != ListingStatus::Active {
            return Err(AppError::new(ErrorCode::ListingNotAvailable)
                .with_detail("status", target.status.as_str())
                .into());
        }
        if counter.amount >= target.price.amount {
            return Err(AppError::new(ErrorCode::CounterExceedsPrice)
                .with_detail("listing_price", target.price.to_string())
                .into());
        }

        let amount = current.amount.with_amount(counter.amount);
        let mut tx = self.pool.begin().await?;
        let created = match self
            .counter_in_tx(&mut tx, &current, &amount, counter.message.as_deref(), now)
            .await
        {
            Ok(created) => created,
            Err(e) => {
                rollback(tx, "counter_offer").await;
                return Err(e);
            }
        };
        tx.commit().await?;

        tracing::info!(
            offer_id,
            counter_offer_id = created.id,
            proposer = created.proposer.as_str(),
            amount = %created.amount,
            "Offer countered"
        );
        self.fanout
            .record(
                ActivityAction::OfferCountered,
                offer_id,
                Some(actor_id),
                json!({
                    "listing_id": created.listing_id,
                    "counter_offer_id": created.id,
                    "amount": created.amount,
                    "proposer": created.proposer.as_str(),
                }),
            )
            .await;
        self.fanout.notify_all([Notification::new(
            current.proposer_id(),
            NotificationKind::OfferCountered {
                offer_id,
                counter_offer_id: created.id,
                listing_id: created.listing_id,
                amount: created.amount.clone(),
            },
        )]);
        Ok(created)
    }

    async fn counter_in_tx(
        &self,
        conn: &mut SqliteConnection,
        current: &Offer,
        amount: &Money,
        message: Option<&str>,
        now: i64,
    ) -> ServiceResult<Offer> {
        let flip = offer::Transition {
            to: OfferStatus::Countered,
            response_message: message,
            rejection_reason: None,
            live_at: Some(now),
        };
        if offer::transition_from_pending(&mut *conn, current.id, flip, now).await? == 0 {
            return Err(stale_offer_error(&mut *conn, current.id, now).await);
        }

        let new = offer::NewOffer {
            id: shared::util::snowflake_id(),
            listing_id: current.listing_id,
            buyer_id: current.buyer_id,
            seller_id: current.seller_id,
            amount,
            message,
            proposer: current.responder(),
            expires_at: now + self.policy.counter_ttl_millis(),
            parent_offer_id: Some(current.id),
        };
        Ok(offer::insert(&mut *conn, new, now).await?)
    }

    // ========================================================================
    // Withdraw
    // ========================================================================

    /// Proposer takes back a pending offer
    pub async fn withdraw(&self, offer_id: i64, actor_id: i64) -> OfferActionResult {
        match self.try_withdraw(offer_id, actor_id).await {
            Ok(()) => OfferActionResult::ok(offer_id),
            Err(e) => failure("withdraw", e),
        }
    }

    async fn try_withdraw(&self, offer_id: i64, actor_id: i64) -> ServiceResult<()> {
        let now = self.clock.now_millis();
        let current = self.load(offer_id).await?;
        if current.proposer_id() != actor_id {
            return Err(AppError::new(ErrorCode::NotOfferProposer).into());
        }
        ensure_pending(&current, now)?;

        let flip = offer::Transition {
            to: OfferStatus::Withdrawn,
            response_message: None,
            rejection_reason: None,
            live_at: Some(now),
        };
        if offer::transition_from_pending(&self.pool, offer_id, flip, now).await? == 0 {
            return Err(stale_offer_error(&self.pool, offer_id, now).await);
        }

        tracing::info!(offer_id, actor_id, "Offer withdrawn");
        self.fanout
            .record(
                ActivityAction::OfferWithdrawn,
                offer_id,
                Some(actor_id),
                json!({ "listing_id": current.listing_id }),
            )
            .await;
        Ok(())
    }

    // ========================================================================
    // Expire
    // ========================================================================

    /// System transition; the only precondition is that the offer is still
    /// pending when the write lands.
    pub async fn expire(&self, offer_id: i64) -> OfferActionResult {
        let now = self.clock.now_millis();
        match self.try_expire(offer_id, now).await {
            Ok(()) => OfferActionResult::ok(offer_id),
            Err(e) => failure("expire", e),
        }
    }

    async fn try_expire(&self, offer_id: i64, now: i64) -> ServiceResult<()> {
        let current = self.load(offer_id).await?;
        if current.status != OfferStatus::Pending {
            return Err(AppError::new(ErrorCode::OfferNotPending)
                .with_detail("status", current.status.as_str())
                .into());
        }

        let flip = offer::Transition {
            to: OfferStatus::Expired,
            response_message: None,
            rejection_reason: None,
            live_at: None,
        };
        if offer::transition_from_pending(&self.pool, offer_id, flip, now).await? == 0 {
            // Accepted, rejected or countered between the read and the write
            return Err(AppError::new(ErrorCode::OfferNotPending).into());
        }

        tracing::info!(offer_id, listing_id = current.listing_id, "Offer expired");
        self.fanout
            .record(
                ActivityAction::OfferExpired,
                offer_id,
                None,
                json!({ "listing_id": current.listing_id, "expires_at": current.expires_at }),
            )
            .await;
        let kind = NotificationKind::OfferExpired {
            offer_id,
            listing_id: current.listing_id,
        };
        self.fanout.notify_all([
            Notification::new(current.buyer_id, kind.clone()),
            Notification::new(current.seller_id, kind),
        ]);
        Ok(())
    }

    /// Expire every pending offer past its expiry. Offers that left `pending`
    /// before their write landed count as skipped.
    pub async fn process_expired_offers(&self) -> BatchOutcome {
        let now = self.clock.now_millis();
        let mut outcome = BatchOutcome::default();

        let overdue = match offer::find_expired_pending(&self.pool, now, self.policy.sweep_batch_limit).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load expired offers");
                outcome.errors.push(format!("query: {e}"));
                return outcome;
            }
        };

        for row in overdue {
            outcome.attempted += 1;
            match self.try_expire(row.id, now).await {
                Ok(()) => outcome.processed += 1,
                Err(ServiceError::App(e)) if e.code == ErrorCode::OfferNotPending => {
                    outcome.skipped += 1
                }
                Err(e) => {
                    let err = AppError::from(e);
                    tracing::warn!(offer_id = row.id, error = %err, "Failed to expire offer");
                    outcome.errors.push(format!("offer {}: {}", row.id, err.message));
                }
            }
        }

        if outcome.attempted > 0 {
            tracing::info!(
                attempted = outcome.attempted,
                processed = outcome.processed,
                skipped = outcome.skipped,
                errors = outcome.error_count(),
                "Expired offers processed"
            );
        }
        outcome
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn offer(&self, offer_id: i64) -> AppResult<Option<Offer>> {
        Ok(offer::find_by_id(&self.pool, offer_id)
            .await
            .map_err(ServiceError::from)?)
    }

    /// The whole negotiation an offer belongs to, oldest first
    pub async fn offer_chain(&self, offer_id: i64) -> AppResult<Vec<Offer>> {
        Ok(self.try_chain(offer_id).await?)
    }

    async fn try_chain(&self, offer_id: i64) -> ServiceResult<Vec<Offer>> {
        let start = self.load(offer_id).await?;

        let mut ancestors = Vec::new();
        let mut parent_id = start.parent_offer_id;
        while let Some(id) = parent_id {
            if ancestors.len() >= MAX_CHAIN_LENGTH {
                break;
            }
            match offer::find_by_id(&self.pool, id).await? {
                Some(parent) => {
                    parent_id = parent.parent_offer_id;
                    ancestors.push(parent);
                }
                None => break,
            }
        }
        ancestors.reverse();

        let mut chain = ancestors;
        let mut tail_id = start.id;
        chain.push(start);
        while chain.len() < MAX_CHAIN_LENGTH {
            match offer::find_counter(&self.pool, tail_id).await? {
                Some(counter) => {
                    tail_id = counter.id;
                    chain.push(counter);
                }
                None => break,
            }
        }
        Ok(chain)
    }

    /// Offers still under negotiation on a listing, for its owner
    pub async fn listing_offers(&self, listing_id: i64, seller_id: i64) -> AppResult<Vec<Offer>> {
        let target = listing::find_by_id(&self.pool, listing_id)
            .await
            .map_err(ServiceError::from)?
            .ok_or_else(|| AppError::new(ErrorCode::ListingNotFound))?;
        if target.owner_id != seller_id {
            return Err(AppError::permission_denied("Only the listing owner can view its offers"));
        }
        Ok(offer::find_open_for_listing(&self.pool, listing_id)
            .await
            .map_err(ServiceError::from)?)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn load(&self, offer_id: i64) -> ServiceResult<Offer> {
        offer::find_by_id(&self.pool, offer_id)
            .await?
            .ok_or_else(|| AppError::new(ErrorCode::OfferNotFound).into())
    }

    /// Offer the actor may accept, reject or counter right now
    async fn load_for_responder(&self, offer_id: i64, actor_id: i64, now: i64) -> ServiceResult<Offer> {
        let current = self.load(offer_id).await?;
        if current.responder_id() != actor_id {
            return Err(AppError::new(ErrorCode::NotOfferResponder)
                .with_detail("expected_party", current.responder().as_str())
                .into());
        }
        ensure_pending(&current, now)?;
        Ok(current)
    }
}
