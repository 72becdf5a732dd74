//! Faculty preference model.
//!
//! Preferred days multiply a day's placement weight; preferred time labels
//! add a slot-level bonus. Both are soft biases, never hard constraints.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::grid::Day;

/// Scheduling preferences of one faculty member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacultyPreference {
    /// Faculty identifier, matching `Subject::faculty`.
    pub faculty: String,
    /// Days this faculty prefers to teach on.
    #[serde(default)]
    pub preferred_days: Vec<Day>,
    /// Session time labels this faculty prefers (see the canonical time
    /// grid), e.g. `"8:45-9:30"`.
    #[serde(default)]
    pub preferred_time: Vec<String>,
}

impl FacultyPreference {
    /// Creates an empty preference for a faculty.
    pub fn new(faculty: impl Into<String>) -> Self {
        Self {
            faculty: faculty.into(),
            preferred_days: Vec::new(),
            preferred_time: Vec::new(),
        }
    }

    /// Adds a preferred day.
    pub fn with_day(mut self, day: Day) -> Self {
        self.preferred_days.push(day);
        self
    }

    /// Adds a preferred session time label.
    pub fn with_time(mut self, time: impl Into<String>) -> Self {
        self.preferred_time.push(time.into());
        self
    }
}

/// Faculty-indexed preference lookup, scoped to one generation call.
#[derive(Debug, Clone, Default)]
pub struct PreferenceSet {
    by_faculty: HashMap<String, FacultyPreference>,
}

impl PreferenceSet {
    /// Builds the lookup from a preference list. A later entry for the same
    /// faculty replaces the earlier one.
    pub fn new(preferences: &[FacultyPreference]) -> Self {
        let mut by_faculty = HashMap::new();
        for p in preferences {
            by_faculty.insert(p.faculty.clone(), p.clone());
        }
        Self { by_faculty }
    }

    /// Whether the faculty has at least one preferred day.
    pub fn has_day_preference(&self, faculty: &str) -> bool {
        self.by_faculty
            .get(faculty)
            .is_some_and(|p| !p.preferred_days.is_empty())
    }

    /// Whether `day` is among the faculty's preferred days.
    pub fn prefers_day(&self, faculty: &str, day: Day) -> bool {
        self.by_faculty
            .get(faculty)
            .is_some_and(|p| p.preferred_days.contains(&day))
    }

    /// Whether `time_label` is among the faculty's preferred session times.
    pub fn prefers_time(&self, faculty: &str, time_label: &str) -> bool {
        self.by_faculty
            .get(faculty)
            .is_some_and(|p| p.preferred_time.iter().any(|t| t == time_label))
    }

    /// Number of faculties with preferences.
    pub fn len(&self) -> usize {
        self.by_faculty.len()
    }

    /// Whether no preferences were supplied.
    pub fn is_empty(&self) -> bool {
        self.by_faculty.is_empty()
    }
}
