//! Contains common, primitive types shared by every part of the engine.
//!
//! Categories are a small fixed set, so everything keyed by category lives in a
//! [`PerCategory`] array indexed by [`CategoryId`] rather than a map.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};

/// Number of category slots a competition can run side by side.
pub const CATEGORY_COUNT: usize = 3;

/// Identifies one of the fixed category slots.
///
/// On the wire a category is its 1-based key (`1`, `2` or `3`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum CategoryId {
    First,
    Second,
    Third,
}

impl CategoryId {
    /// All categories in rotation order.
    pub const ALL: [CategoryId; CATEGORY_COUNT] =
        [CategoryId::First, CategoryId::Second, CategoryId::Third];

    /// Zero-based position in a [`PerCategory`] array.
    pub fn index(self) -> usize {
        match self {
            CategoryId::First => 0,
            CategoryId::Second => 1,
            CategoryId::Third => 2,
        }
    }

    /// The 1-based key used by operators and display surfaces.
    pub fn key(self) -> u8 {
        self.index() as u8 + 1
    }
}

impl TryFrom<u8> for CategoryId {
    type Error = crate::error::CompetitionError;

    fn try_from(key: u8) -> Result<Self, Self::Error> {
        match key {
            1 => Ok(CategoryId::First),
            2 => Ok(CategoryId::Second),
            3 => Ok(CategoryId::Third),
            other => Err(crate::error::CompetitionError::InvalidCategory(other)),
        }
    }
}

impl From<CategoryId> for u8 {
    fn from(category: CategoryId) -> Self {
        category.key()
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// A fixed-size, ordered collection holding one value per category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PerCategory<T>(pub [T; CATEGORY_COUNT]);

impl<T> PerCategory<T> {
    /// Iterates `(category, value)` pairs in rotation order.
    pub fn iter(&self) -> impl Iterator<Item = (CategoryId, &T)> {
        CategoryId::ALL.into_iter().zip(self.0.iter())
    }

    /// Builds a new collection by applying `f` to every category.
    pub fn map<U>(&self, mut f: impl FnMut(CategoryId, &T) -> U) -> PerCategory<U> {
        PerCategory(CategoryId::ALL.map(|category| f(category, &self[category])))
    }
}

impl<T> Index<CategoryId> for PerCategory<T> {
    type Output = T;

    fn index(&self, category: CategoryId) -> &T {
        &self.0[category.index()]
    }
}

impl<T> IndexMut<CategoryId> for PerCategory<T> {
    fn index_mut(&mut self, category: CategoryId) -> &mut T {
        &mut self.0[category.index()]
    }
}

/// Display names of the groups currently loaded into each category.
pub type Groups = PerCategory<String>;

/// A competitor as uploaded for a round. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Athlete {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
}

impl fmt::Display for Athlete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} (#{})", self.first_name, self.last_name, self.id)
    }
}

/// Distinguishes the two countdowns the engine owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockKind {
    /// The active climbing interval.
    Stage,
    /// The transit/reset interval between stages.
    Turnover,
}

/// The temporal phase of the round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "resume", rename_all = "snake_case")]
pub enum Phase {
    /// The round has not been started yet.
    StagePending,
    /// The turnover clock is counting.
    Turnover,
    /// The stage clock is counting.
    Stage,
    /// A clock is halted mid-count; the remembered interval resumes on start.
    Paused(ClockKind),
}

impl Phase {
    /// The interval this phase belongs to, running or remembered.
    pub fn interval(self) -> Option<ClockKind> {
        match self {
            Phase::StagePending => None,
            Phase::Turnover => Some(ClockKind::Turnover),
            Phase::Stage => Some(ClockKind::Stage),
            Phase::Paused(kind) => Some(kind),
        }
    }

    /// The phase a clock of `kind` is actively counting in.
    pub fn running(kind: ClockKind) -> Self {
        match kind {
            ClockKind::Stage => Phase::Stage,
            ClockKind::Turnover => Phase::Turnover,
        }
    }
}
