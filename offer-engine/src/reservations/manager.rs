use crate::core::clock::SharedClock;
use crate::core::config::NegotiationPolicy;
use crate::core::error::{ServiceError, ServiceResult};
use crate::db::repository::{RepoError, listing, offer, reservation};
use crate::db::rollback;
use crate::fanout::FanOut;
use serde_json::json;
use shared::error::{AppError, AppResult, ErrorCode};
use shared::models::{
    ActivityAction, Completion, ConflictKind, ListingStatus, OfferStatus, Party, Reservation,
    ReservationConflict, ReservationRequest, ReservationStatus,
};
use shared::notification::{Notification, NotificationKind};
use shared::response::{BatchOutcome, ReservationResult};
use shared::util::{HOUR_MILLIS, hours_after};
use sqlx::{SqliteConnection, SqlitePool};

#[derive(Debug, Clone)]
pub struct ReservationManager {
    pool: SqlitePool,
    clock: SharedClock,
    policy: NegotiationPolicy,
    fanout: FanOut,
}

fn failure(op: &'static str, err: ServiceError) -> ReservationResult {
    let err = AppError::from(err);
    tracing::debug!(op, code = %err.code, error = %err, "Reservation operation rejected");
    ReservationResult::failed(&err)
}

fn conflict_kind(existing: &Reservation) -> ConflictKind {
    if existing.status == ReservationStatus::Active {
        ConflictKind::Active
    } else {
        ConflictKind::Recent
    }
}

impl ReservationManager {
    pub fn new(
        pool: SqlitePool,
        clock: SharedClock,
        policy: NegotiationPolicy,
        fanout: FanOut,
    ) -> Self {
        Self {
            pool,
            clock,
            policy,
            fanout,
        }
    }

    // ========================================================================
    // Create
    // ========================================================================

    /// Reserve a listing for the buyer of an accepted offer
    pub async fn create_reservation(&self, req: ReservationRequest) -> ReservationResult {
        match self.try_create(&req).await {
            Ok(created) => ReservationResult {
                expires_at: Some(created.expires_at),
                ..ReservationResult::ok(created.id)
            },
            Err(e) => failure("create_reservation", e),
        }
    }

    async fn try_create(&self, req: &ReservationRequest) -> ServiceResult<Reservation> {
        let now = self.clock.now_millis();
        let mut tx = self.pool.begin().await?;
        let created = match self.reserve_in_tx(&mut tx, req, now).await {
            Ok(created) => created,
            Err(e) => {
                rollback(tx, "create_reservation").await;
                return Err(e);
            }
        };
        tx.commit().await?;

        tracing::info!(
            reservation_id = created.id,
            listing_id = created.listing_id,
            buyer_id = created.buyer_id,
            expires_at = created.expires_at,
            "Reservation created"
        );
        self.record_created(&created, Some(req.buyer_id)).await;
        let kind = NotificationKind::ReservationCreated {
            reservation_id: created.id,
            listing_id: created.listing_id,
            amount: created.amount.clone(),
            expires_at: created.expires_at,
        };
        self.fanout.notify_all([
            Notification::new(created.buyer_id, kind.clone()),
            Notification::new(created.seller_id, kind),
        ]);
        Ok(created)
    }

    /// Conflict check, listing check, insert and listing flip on the caller's
    /// transaction. Any error leaves the transaction for the caller to roll back.
    pub(crate) async fn reserve_in_tx(
        &self,
        conn: &mut SqliteConnection,
        req: &ReservationRequest,
        now: i64,
    ) -> ServiceResult<Reservation> {
        let hours = req.duration_hours.unwrap_or(self.policy.reservation_hours);
        if hours <= 0 {
            return Err(AppError::validation("Reservation duration must be positive")
                .with_detail("duration_hours", hours)
                .into());
        }
        let expires_at = hours_after(now, hours).ok_or_else(|| {
            AppError::validation("Reservation duration is too long").with_detail("duration_hours", hours)
        })?;

        let cooldown_since = now - self.policy.cooldown_millis();
        if let Some(existing) =
            reservation::find_blocking(&mut *conn, req.listing_id, now, cooldown_since).await?
        {
            return Err(self.conflict_error(&existing).into());
        }

        let target = listing::find_by_id(&mut *conn, req.listing_id)
            .await?
            .ok_or_else(|| AppError::new(ErrorCode::ListingNotFound))?;
        if target.status != ListingStatus::Active {
            return Err(AppError::new(ErrorCode::ListingNotAvailable)
                .with_detail("status", target.status.as_str())
                .into());
        }

        let source = offer::find_by_id(&mut *conn, req.offer_id)
            .await?
            .ok_or_else(|| AppError::new(ErrorCode::OfferNotFound))?;
        if source.status != OfferStatus::Accepted {
            return Err(AppError::with_message(
                ErrorCode::InvalidRequest,
                "Only an accepted offer can reserve a listing",
            )
            .with_detail("offer_status", source.status.as_str())
            .into());
        }
        if source.listing_id != req.listing_id || source.buyer_id != req.buyer_id {
            return Err(AppError::with_message(
                ErrorCode::InvalidRequest,
                "Offer does not belong to this listing and buyer",
            )
            .into());
        }
        if source.amount != req.amount {
            return Err(AppError::new(ErrorCode::ReservationAmountMismatch)
                .with_detail("offer_amount", source.amount.to_string())
                .into());
        }

        let new = reservation::NewReservation {
            id: shared::util::snowflake_id(),
            listing_id: req.listing_id,
            buyer_id: req.buyer_id,
            seller_id: target.owner_id,
            offer_id: req.offer_id,
            amount: &req.amount,
            expires_at,
        };
        let created = match reservation::insert(&mut *conn, new, now).await {
            Ok(created) => created,
            Err(RepoError::Duplicate(constraint)) if constraint.contains("reservation.offer_id") => {
                return Err(AppError::with_message(
                    ErrorCode::InvalidRequest,
                    "Offer already has a reservation",
                )
                .with_detail("offer_id", req.offer_id)
                .into());
            }
            Err(RepoError::Duplicate(constraint)) => {
                tracing::info!(listing_id = req.listing_id, %constraint, "Reservation insert hit uniqueness backstop");
                let holder = reservation::find_active_for_listing(&mut *conn, req.listing_id).await?;
                return Err(AppError::reservation_conflict(holder.map(|r| r.expires_at)).into());
            }
            Err(e) => return Err(e.into()),
        };

        if listing::mark_reserved(&mut *conn, req.listing_id, expires_at, now).await? == 0 {
            tracing::warn!(
                listing_id = req.listing_id,
                reservation_id = created.id,
                "Listing changed state before it could be reserved"
            );
            return Err(AppError::new(ErrorCode::ListingNotAvailable).into());
        }

        Ok(created)
    }

    pub(crate) async fn record_created(&self, created: &Reservation, actor_id: Option<i64>) {
        self.fanout
            .record(
                ActivityAction::ReservationCreated,
                created.id,
                actor_id,
                json!({
                    "listing_id": created.listing_id,
                    "offer_id": created.offer_id,
                    "amount": created.amount,
                    "expires_at": created.expires_at,
                }),
            )
            .await;
    }

    fn conflict_error(&self, existing: &Reservation) -> AppError {
        let kind = conflict_kind(existing);
        let err = AppError::reservation_conflict(Some(existing.expires_at))
            .with_detail("reservation_id", existing.id);
        match kind {
            ConflictKind::Active => err.with_detail("kind", "active"),
            ConflictKind::Recent => err
                .with_detail("kind", "recent")
                .with_detail("available_at", existing.updated_at + self.policy.cooldown_millis()),
        }
    }

    /// Existing reservation that would block a new hold on the listing
    pub async fn check_conflict(&self, listing_id: i64) -> AppResult<Option<ReservationConflict>> {
        let now = self.clock.now_millis();
        let cooldown_since = now - self.policy.cooldown_millis();
        let found = reservation::find_blocking(&self.pool, listing_id, now, cooldown_since)
            .await
            .map_err(ServiceError::from)?;
        Ok(found.map(|r| ReservationConflict {
            reservation_id: r.id,
            kind: conflict_kind(&r),
            status: r.status,
            expires_at: r.expires_at,
        }))
    }

    // ========================================================================
    // Complete
    // ========================================================================

    pub async fn complete_reservation(
        &self,
        reservation_id: i64,
        buyer_id: i64,
        completion: Completion,
    ) -> ReservationResult {
        match self.try_complete(reservation_id, buyer_id, &completion).await {
            Ok(done) => ReservationResult::ok(done.id),
            Err(e) => failure("complete_reservation", e),
        }
    }

    async fn try_complete(
        &self,
        reservation_id: i64,
        buyer_id: i64,
        completion: &Completion,
    ) -> ServiceResult<Reservation> {
        let now = self.clock.now_millis();
        let current = self.load(reservation_id).await?;
        if current.buyer_id != buyer_id {
            return Err(AppError::permission_denied("Only the buyer can complete this reservation").into());
        }
        if current.status != ReservationStatus::Active {
            return Err(not_active(&current).into());
        }
        if current.is_expired_at(now) {
            if let Err(e) = self.try_expire(reservation_id, now).await {
                tracing::warn!(reservation_id, error = ?e, "Expiring an overdue reservation during completion failed");
            }
            return Err(AppError::new(ErrorCode::ReservationExpired)
                .with_detail("expired_at", current.expires_at)
                .into());
        }
        if current.deposit_required && !completion.deposit_captured {
            let err = AppError::new(ErrorCode::DepositRequired);
            let err = match current.deposit_deadline {
                Some(deadline) => err.with_detail("deposit_deadline", deadline),
                None => err,
            };
            return Err(err.into());
        }

        let mut tx = self.pool.begin().await?;
        if let Err(e) = self.complete_in_tx(&mut tx, &current, completion, now).await {
            rollback(tx, "complete_reservation").await;
            return Err(e);
        }
        tx.commit().await?;

        tracing::info!(reservation_id, listing_id = current.listing_id, "Reservation completed");
        self.fanout
            .record(
                ActivityAction::ReservationCompleted,
                reservation_id,
                Some(buyer_id),
                json!({
                    "listing_id": current.listing_id,
                    "amount": current.amount,
                    "payment_reference": completion.payment_reference,
                    "deposit_captured": completion.deposit_captured,
                }),
            )
            .await;
        let completed = |party| NotificationKind::ReservationCompleted {
            reservation_id,
            listing_id: current.listing_id,
            amount: current.amount.clone(),
            party,
        };
        self.fanout.notify_all([
            Notification::new(current.buyer_id, completed(Party::Buyer)),
            Notification::new(current.seller_id, completed(Party::Seller)),
        ]);

        Ok(Reservation {
            status: ReservationStatus::Completed,
            completed_at: Some(now),
            updated_at: now,
            ..current
        })
    }

    async fn complete_in_tx(
        &self,
        conn: &mut SqliteConnection,
        current: &Reservation,
        completion: &Completion,
        now: i64,
    ) -> ServiceResult<()> {
        let rows = reservation::complete(
            &mut *conn,
            current.id,
            completion.payment_reference.as_deref(),
            now,
        )
        .await?;
        if rows == 0 {
            // Cancelled or expired since the pre-check
            return Err(AppError::new(ErrorCode::ReservationNotActive).into());
        }

        let sold = listing::mark_sold(
            &mut *conn,
            current.listing_id,
            current.buyer_id,
            current.amount.amount,
            now,
        )
        .await?;
        if sold == 0 {
            tracing::error!(
                target: "alert",
                reservation_id = current.id,
                listing_id = current.listing_id,
                "Listing was not reserved while completing its active reservation"
            );
            return Err(AppError::inconsistent("Listing is not in the reserved state").into());
        }
        Ok(())
    }

    // ========================================================================
    // Cancel
    // ========================================================================

    /// Cancel by the buyer or the seller
    pub async fn cancel_reservation(
        &self,
        reservation_id: i64,
        user_id: i64,
        reason: Option<String>,
    ) -> ReservationResult {
        match self.try_cancel(reservation_id, user_id, reason.as_deref()).await {
            Ok(()) => ReservationResult::ok(reservation_id),
            Err(e) => failure("cancel_reservation", e),
        }
    }

    async fn try_cancel(
        &self,
        reservation_id: i64,
        user_id: i64,
        reason: Option<&str>,
    ) -> ServiceResult<()> {
        let now = self.clock.now_millis();
        let current = self.load(reservation_id).await?;
        if !current.is_party(user_id) {
            return Err(AppError::new(ErrorCode::NotReservationParty).into());
        }
        if current.status != ReservationStatus::Active {
            return Err(not_active(&current).into());
        }

        let mut tx = self.pool.begin().await?;
        if let Err(e) = self.cancel_in_tx(&mut tx, &current, user_id, reason, now).await {
            rollback(tx, "cancel_reservation").await;
            return Err(e);
        }
        tx.commit().await?;

        let role = if user_id == current.buyer_id {
            Party::Buyer
        } else {
            Party::Seller
        };
        tracing::info!(reservation_id, cancelled_by = role.as_str(), "Reservation cancelled");
        self.fanout
            .record(
                ActivityAction::ReservationCancelled,
                reservation_id,
                Some(user_id),
                json!({
                    "listing_id": current.listing_id,
                    "reason": reason,
                    "cancelled_by": role.as_str(),
                }),
            )
            .await;
        let kind = NotificationKind::ReservationCancelled {
            reservation_id,
            listing_id: current.listing_id,
            reason: reason.map(str::to_string),
        };
        self.fanout.notify_all([
            Notification::new(current.buyer_id, kind.clone()),
            Notification::new(current.seller_id, kind),
        ]);
        Ok(())
    }

    async fn cancel_in_tx(
        &self,
        conn: &mut SqliteConnection,
        current: &Reservation,
        user_id: i64,
        reason: Option<&str>,
        now: i64,
    ) -> ServiceResult<()> {
        if reservation::cancel(&mut *conn, current.id, user_id, reason, now).await? == 0 {
            return Err(AppError::new(ErrorCode::ReservationNotActive).into());
        }
        self.release_listing(conn, current, now).await
    }

    /// reserved → active for the listing of a reservation that just ended.
    /// A listing that is not reserved is reported but does not fail the caller.
    async fn release_listing(
        &self,
        conn: &mut SqliteConnection,
        ended: &Reservation,
        now: i64,
    ) -> ServiceResult<()> {
        if listing::release(&mut *conn, ended.listing_id, now).await? == 0 {
            tracing::error!(
                target: "alert",
                reservation_id = ended.id,
                listing_id = ended.listing_id,
                "Listing was not reserved when its reservation ended"
            );
        }
        Ok(())
    }

    // ========================================================================
    // Extend
    // ========================================================================

    /// Seller pushes the expiry forward (default 24h)
    pub async fn extend_reservation(
        &self,
        reservation_id: i64,
        seller_id: i64,
        additional_hours: Option<i64>,
    ) -> ReservationResult {
        match self.try_extend(reservation_id, seller_id, additional_hours).await {
            Ok(expires_at) => ReservationResult {
                expires_at: Some(expires_at),
                ..ReservationResult::ok(reservation_id)
            },
            Err(e) => failure("extend_reservation", e),
        }
    }

    async fn try_extend(
        &self,
        reservation_id: i64,
        seller_id: i64,
        additional_hours: Option<i64>,
    ) -> ServiceResult<i64> {
        let hours = additional_hours.unwrap_or(self.policy.extension_hours);
        if hours <= 0 {
            return Err(AppError::validation("Extension must be a positive number of hours")
                .with_detail("additional_hours", hours)
                .into());
        }
        let now = self.clock.now_millis();
        let current = self.load(reservation_id).await?;
        if current.seller_id != seller_id {
            return Err(AppError::permission_denied("Only the seller can extend this reservation").into());
        }
        if current.status != ReservationStatus::Active {
            return Err(not_active(&current).into());
        }
        if current.is_expired_at(now) {
            return Err(AppError::new(ErrorCode::ReservationExpired).into());
        }
        if hours_after(current.expires_at, hours).is_none() {
            return Err(AppError::validation("Extension is too long")
                .with_detail("additional_hours", hours)
                .into());
        }

        let mut tx = self.pool.begin().await?;
        let extended = match reservation::extend(&mut *tx, reservation_id, hours * HOUR_MILLIS, now).await {
            Ok(Some(expires_at)) => expires_at,
            Ok(None) => {
                rollback(tx, "extend_reservation").await;
                return Err(AppError::new(ErrorCode::ReservationNotActive).into());
            }
            Err(e) => {
                rollback(tx, "extend_reservation").await;
                return Err(e.into());
            }
        };
        match listing::set_reserved_until(&mut *tx, current.listing_id, extended, now).await {
            Ok(0) => tracing::error!(
                target: "alert",
                reservation_id,
                listing_id = current.listing_id,
                "Listing was not reserved while extending its reservation"
            ),
            Ok(_) => {}
            Err(e) => {
                rollback(tx, "extend_reservation").await;
                return Err(e.into());
            }
        }
        tx.commit().await?;

        tracing::info!(reservation_id, expires_at = extended, "Reservation extended");
        self.fanout
            .record(
                ActivityAction::ReservationExtended,
                reservation_id,
                Some(seller_id),
                json!({ "additional_hours": hours, "expires_at": extended }),
            )
            .await;
        Ok(extended)
    }

    // ========================================================================
    // Expire
    // ========================================================================

    /// Expire one reservation whose expiry has passed
    pub async fn expire_reservation(&self, reservation_id: i64) -> ReservationResult {
        let now = self.clock.now_millis();
        match self.try_expire(reservation_id, now).await {
            Ok(Some(_)) => ReservationResult::ok(reservation_id),
            Ok(None) => {
                let err: ServiceError = match self.load(reservation_id).await {
                    Ok(current) if current.status != ReservationStatus::Active => {
                        not_active(&current).into()
                    }
                    Ok(_) => ServiceError::App(AppError::with_message(
                        ErrorCode::InvalidRequest,
                        "Reservation has not expired yet",
                    )),
                    Err(e) => e,
                };
                failure("expire_reservation", err)
            }
            Err(e) => failure("expire_reservation", e),
        }
    }

    /// Guarded `active → expired` plus listing release. `Ok(None)` means the
    /// row was no longer an overdue active reservation.
    async fn try_expire(&self, reservation_id: i64, now: i64) -> ServiceResult<Option<Reservation>> {
        let mut tx = self.pool.begin().await?;
        let expired = match reservation::expire(&mut *tx, reservation_id, now).await {
            Ok(Some(expired)) => expired,
            Ok(None) => {
                rollback(tx, "expire_reservation").await;
                return Ok(None);
            }
            Err(e) => {
                rollback(tx, "expire_reservation").await;
                return Err(e.into());
            }
        };
        if let Err(e) = self.release_listing(&mut tx, &expired, now).await {
            rollback(tx, "expire_reservation").await;
            return Err(e);
        }
        tx.commit().await?;

        tracing::info!(
            reservation_id,
            listing_id = expired.listing_id,
            expired_at = expired.expires_at,
            "Reservation expired"
        );
        self.fanout
            .record(
                ActivityAction::ReservationExpired,
                reservation_id,
                None,
                json!({ "listing_id": expired.listing_id, "expires_at": expired.expires_at }),
            )
            .await;
        let kind = NotificationKind::ReservationExpired {
            reservation_id,
            listing_id: expired.listing_id,
        };
        self.fanout.notify_all([
            Notification::new(expired.buyer_id, kind.clone()),
            Notification::new(expired.seller_id, kind),
        ]);
        Ok(Some(expired))
    }

    /// Expire every overdue active reservation. Safe to run repeatedly and
    /// concurrently: rows another run already moved on count as skipped.
    pub async fn process_expired_reservations(&self) -> BatchOutcome {
        let now = self.clock.now_millis();
        let mut outcome = BatchOutcome::default();

        let overdue =
            match reservation::find_expired_active(&self.pool, now, self.policy.sweep_batch_limit).await {
                Ok(rows) => rows,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to load expired reservations");
                    outcome.errors.push(format!("query: {e}"));
                    return outcome;
                }
            };

        for row in overdue {
            outcome.attempted += 1;
            match self.try_expire(row.id, now).await {
                Ok(Some(_)) => outcome.processed += 1,
                Ok(None) => outcome.skipped += 1,
                Err(e) => {
                    let err = AppError::from(e);
                    tracing::warn!(reservation_id = row.id, error = %err, "Failed to expire reservation");
                    outcome.errors.push(format!("reservation {}: {}", row.id, err.message));
                }
            }
        }

        if outcome.attempted > 0 {
            tracing::info!(
                attempted = outcome.attempted,
                processed = outcome.processed,
                skipped = outcome.skipped,
                errors = outcome.error_count(),
                "Expired reservations processed"
            );
        }
        outcome
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn reservation(&self, reservation_id: i64) -> AppResult<Option<Reservation>> {
        Ok(reservation::find_by_id(&self.pool, reservation_id)
            .await
            .map_err(ServiceError::from)?)
    }

    /// A user's reservations as buyer or seller, newest first
    pub async fn user_reservations(
        &self,
        user_id: i64,
        role: Party,
        status: Option<ReservationStatus>,
    ) -> AppResult<Vec<Reservation>> {
        Ok(reservation::find_for_user(&self.pool, user_id, role, status)
            .await
            .map_err(ServiceError::from)?)
    }

    async fn load(&self, reservation_id: i64) -> ServiceResult<Reservation> {
        reservation::find_by_id(&self.pool, reservation_id)
            .await?
            .ok_or_else(|| AppError::new(ErrorCode::ReservationNotFound).into())
    }
}

fn not_active(current: &Reservation) -> AppError {
    AppError::new(ErrorCode::ReservationNotActive).with_detail("status", current.status.as_str())
}
