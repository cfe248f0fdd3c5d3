//! The building blocks the `CompetitionEngine` is assembled from.
//!
//! The roster holds who climbs, the scheduler maps a round index onto boulder
//! slots, and the clock counts the stage and turnover intervals. None of them
//! emit events; the engine decides what to publish.

pub mod clock;
pub mod roster;
pub mod scheduler;
