//! Reservation Manager
//!
//! Creates, completes, cancels, extends and expires the listing hold produced
//! by an accepted offer. The hold and the listing status change together in
//! one transaction; a partial-unique index on active reservations is the
//! final guard against two holds on one listing.

mod manager;

pub use manager::ReservationManager;
