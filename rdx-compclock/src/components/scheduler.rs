//! Rotation scheduling: which athlete is on which boulder at a round index.
//!
//! Everything here is a pure function of `(round_index, roster, settings)`.
//! The engine recomputes the whole assignment on every advance instead of
//! patching the previous one, so a replay from index 0 always lands on the
//! same state a live round reached.

use crate::common::{Athlete, CategoryId, PerCategory};
use crate::components::roster::Roster;
use crate::config::RoundSettings;
use crate::events::{BoulderSlot, OndeckAssignment};

/// Computes the on-deck assignment for `round_index`.
///
/// Every category gets one slot per configured boulder. Negative indices are
/// the pre-start sentinel and produce all-empty slots.
pub fn compute_ondeck(round_index: i64, roster: &Roster, settings: &RoundSettings) -> OndeckAssignment {
    let finals = FinalsWindows::new(roster, settings);
    PerCategory(CategoryId::ALL.map(|category| {
        let athletes = roster.athletes(category);
        (1..=settings.boulders)
            .map(|boulder| {
                let athlete = if round_index < 0 {
                    None
                } else if settings.finals_mode {
                    finals.occupant(athletes, boulder, round_index)
                } else {
                    round_robin_occupant(athletes, boulder, round_index)
                };
                BoulderSlot {
                    boulder,
                    athlete: athlete.cloned(),
                }
            })
            .collect()
    }))
}

/// Boulder `b` receives athlete `round_index - 2*(b-1)`: climbers queue
/// through the stations two stages apart.
fn round_robin_occupant(athletes: &[Athlete], boulder: u32, round_index: i64) -> Option<&Athlete> {
    let position = round_index - 2 * (i64::from(boulder) - 1);
    usize::try_from(position)
        .ok()
        .and_then(|position| athletes.get(position))
}

/// Staggered boulder activation for finals and lead rounds.
///
/// Boulder `b` is active for `max_finalists` indices starting at
/// `(b-1) * offset`, with `offset = ceil(max_finalists / climbers_on_wall)`, so
/// roughly `climbers_on_wall` boulders are occupied at steady state even when
/// category sizes differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalsWindows {
    pub max_finalists: i64,
    pub climbers_on_wall: i64,
    pub offset: i64,
}

impl FinalsWindows {
    pub fn new(roster: &Roster, settings: &RoundSettings) -> Self {
        let max_finalists = roster.max_len() as i64;
        let climbers_on_wall = i64::from(
            settings
                .finals_climbers
                .max(1)
                .min(settings.boulders.max(1)),
        );
        let offset = ((max_finalists + climbers_on_wall - 1) / climbers_on_wall).max(1);
        Self {
            max_finalists,
            climbers_on_wall,
            offset,
        }
    }

    /// First round index at which `boulder` is active.
    pub fn start(&self, boulder: u32) -> i64 {
        (i64::from(boulder) - 1) * self.offset
    }

    /// Whether `round_index` falls inside `boulder`'s active window.
    pub fn is_active(&self, boulder: u32, round_index: i64) -> bool {
        let start = self.start(boulder);
        round_index >= start && round_index < start + self.max_finalists
    }

    fn occupant<'a>(&self, finalists: &'a [Athlete], boulder: u32, round_index: i64) -> Option<&'a Athlete> {
        if !self.is_active(boulder, round_index) {
            return None;
        }
        usize::try_from(round_index - self.start(boulder))
            .ok()
            .and_then(|local| finalists.get(local))
    }
}

/// The first round index from which every slot stays empty for good.
pub fn rotation_horizon(roster: &Roster, settings: &RoundSettings) -> i64 {
    let last_boulder = settings.boulders.max(1);
    if settings.finals_mode {
        let finals = FinalsWindows::new(roster, settings);
        finals.start(last_boulder) + finals.max_finalists
    } else {
        roster.max_len() as i64 + 2 * (i64::from(last_boulder) - 1)
    }
}

/// Advances needed from index 0 to put an athlete at `position` on `boulder`.
///
/// Finals rotate a whole category through one boulder before the next, so the
/// per-boulder stride is the category size; round-robin strides by two.
pub fn steps_for_placement(position: usize, category_size: usize, boulder: u32, finals_mode: bool) -> i64 {
    let multiplier = if finals_mode { category_size as i64 } else { 2 };
    (position as i64).saturating_add(multiplier.saturating_mul(i64::from(boulder.max(1)) - 1))
}

/// Advances needed from index 0 to reach stage number `stage`.
pub fn steps_for_stage(stage: i64) -> i64 {
    (stage - 1).max(0)
}
