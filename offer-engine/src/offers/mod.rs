//! Offer State Machine
//!
//! `pending → {accepted, rejected, countered, withdrawn, expired}`, every
//! right-hand state terminal. Each transition is a single guarded UPDATE on
//! `status = 'pending'`; zero rows affected is a precondition failure.

mod state_machine;

pub use state_machine::OfferStateMachine;

/// Rejection text for pending offers that lose to an accepted one
pub const ANOTHER_OFFER_ACCEPTED: &str = "Another offer was accepted";

/// Upper bound on counter-offer chain walks
pub const MAX_CHAIN_LENGTH: usize = 64;
