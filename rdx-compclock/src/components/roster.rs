//! Per-category athlete lists and group names.

use crate::common::{Athlete, CategoryId, Groups, PerCategory};
use crate::error::{CompetitionError, Result};
use serde::{Deserialize, Serialize};

/// An athlete record as received from an upload, before validation.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AthleteRecord {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
}

/// A roster upload for one category.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AthleteUpload {
    /// 1-based category key.
    pub category: u8,
    pub athletes: Vec<AthleteRecord>,
    #[serde(default)]
    pub group_name: String,
}

impl AthleteUpload {
    /// Checks the payload and converts it into a category and its climbing order.
    pub fn validate(self) -> Result<(CategoryId, Vec<Athlete>)> {
        let mut athletes = Vec::with_capacity(self.athletes.len());
        for (position, record) in self.athletes.into_iter().enumerate() {
            if record.id.is_empty() || record.first_name.is_empty() || record.last_name.is_empty()
            {
                return Err(CompetitionError::InvalidRoster(format!(
                    "entry {} is missing id, first_name or last_name",
                    position + 1
                )));
            }
            athletes.push(Athlete {
                id: record.id,
                first_name: record.first_name,
                last_name: record.last_name,
            });
        }
        let category = CategoryId::try_from(self.category)?;
        Ok((category, athletes))
    }
}

/// One category's climbing order and display name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryRoster {
    pub athletes: Vec<Athlete>,
    pub group_name: String,
}

/// The athletes of every category, in rotation order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Roster(PerCategory<CategoryRoster>);

impl Roster {
    /// The climbing order of `category`.
    pub fn athletes(&self, category: CategoryId) -> &[Athlete] {
        &self.0[category].athletes
    }

    /// Iterates every category's climbing order.
    pub fn categories(&self) -> impl Iterator<Item = (CategoryId, &[Athlete])> {
        self.0
            .iter()
            .map(|(category, roster)| (category, roster.athletes.as_slice()))
    }

    /// Replaces the athletes and group name of `category`.
    pub fn replace(&mut self, category: CategoryId, athletes: Vec<Athlete>, group_name: String) {
        self.0[category] = CategoryRoster {
            athletes,
            group_name,
        };
    }

    pub fn set_group_name(&mut self, category: CategoryId, name: String) {
        self.0[category].group_name = name;
    }

    /// Empties every category.
    pub fn clear(&mut self) {
        *self = Roster::default();
    }

    /// Whether any category has athletes loaded.
    pub fn is_populated(&self) -> bool {
        self.categories().any(|(_, athletes)| !athletes.is_empty())
    }

    /// Size of the largest category.
    pub fn max_len(&self) -> usize {
        self.categories()
            .map(|(_, athletes)| athletes.len())
            .max()
            .unwrap_or(0)
    }

    /// Finds the category and 0-based climbing position of an athlete.
    pub fn position_of(&self, athlete_id: &str) -> Option<(CategoryId, usize)> {
        self.categories().find_map(|(category, athletes)| {
            athletes
                .iter()
                .position(|athlete| athlete.id == athlete_id)
                .map(|position| (category, position))
        })
    }

    /// The group names of every category.
    pub fn groups(&self) -> Groups {
        self.0.map(|_, roster| roster.group_name.clone())
    }
}
