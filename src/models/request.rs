//! Generation request and output row models.
//!
//! The request mirrors the original wire contract (`camelCase` keys); the
//! output is the flat list of 55 `(day, session, label)` rows plus a
//! day-by-session matrix view for tabular consumers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::grid::{Day, FREE_PERIOD, SLOTS_PER_DAY};
use super::preference::FacultyPreference;
use super::subject::Subject;

/// Which placement algorithm a generation call runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlacerKind {
    /// Lab blocks, then weighted theory rounds, then the repair pipeline.
    #[default]
    Weighted,
    /// Whole-grid recursive search under the same constraints.
    Backtracking,
}

/// Input contract for one timetable generation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    /// Opaque passthrough.
    #[serde(default)]
    pub department: String,
    /// Opaque passthrough.
    #[serde(default)]
    pub semester: String,
    /// Subjects to schedule.
    pub subjects: Vec<Subject>,
    /// Soft per-faculty placement biases.
    #[serde(default)]
    pub faculty_preferences: Vec<FacultyPreference>,
    /// Session time labels, sessions 1..=11. Defaults to the canonical
    /// time grid; a list of any other length is rejected back to the
    /// default with a logged warning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_time_slots: Option<Vec<String>>,
    /// Break time labels. Break positions stay at sessions 4 and 8
    /// regardless of this list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub break_times: Option<Vec<String>>,
    /// Sessions of one subject allowed per day. Defaults to 2.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_sessions_per_day: Option<u32>,
    /// Exact free-period total to aim for. Defaults to the slack left by
    /// the subject hours, and is clamped to that slack.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_free_periods: Option<u32>,
    /// RNG seed. Fixed seeds make generation fully deterministic; absent
    /// means OS entropy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Placement algorithm. Defaults to the weighted placer.
    #[serde(default)]
    pub placer: PlacerKind,
}

impl GenerationRequest {
    /// Creates a request with defaults for everything optional.
    pub fn new(
        department: impl Into<String>,
        semester: impl Into<String>,
        subjects: Vec<Subject>,
    ) -> Self {
        Self {
            department: department.into(),
            semester: semester.into(),
            subjects,
            faculty_preferences: Vec::new(),
            available_time_slots: None,
            break_times: None,
            max_sessions_per_day: None,
            desired_free_periods: None,
            seed: None,
            placer: PlacerKind::default(),
        }
    }

    /// Sets faculty preferences.
    pub fn with_preferences(mut self, preferences: Vec<FacultyPreference>) -> Self {
        self.faculty_preferences = preferences;
        self
    }

    /// Sets the per-day session cap.
    pub fn with_max_sessions_per_day(mut self, max: u32) -> Self {
        self.max_sessions_per_day = Some(max);
        self
    }

    /// Sets the desired free-period total.
    pub fn with_desired_free_periods(mut self, desired: u32) -> Self {
        self.desired_free_periods = Some(desired);
        self
    }

    /// Sets the RNG seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Selects the placement algorithm.
    pub fn with_placer(mut self, placer: PlacerKind) -> Self {
        self.placer = placer;
        self
    }
}

/// One output row: the label shown at `(day, session)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimetableEntry {
    /// Teaching day.
    pub day: Day,
    /// Session number, 1..=11.
    pub session_number: u32,
    /// Display label: a subject label, a lab label, a break marker,
    /// `"Free Period"`, or `"Additional Class"`.
    pub subject: String,
}

impl TimetableEntry {
    /// Creates an output row.
    pub fn new(day: Day, session_number: u32, subject: impl Into<String>) -> Self {
        Self {
            day,
            session_number,
            subject: subject.into(),
        }
    }
}

/// Rebuilds the `day -> [label; 11]` matrix from output rows.
///
/// Missing sessions render as `"Free Period"`, so a partial row set still
/// yields a complete matrix.
pub fn day_slot_matrix(entries: &[TimetableEntry]) -> BTreeMap<Day, Vec<String>> {
    let mut by_session: BTreeMap<Day, BTreeMap<u32, &str>> = BTreeMap::new();
    for e in entries {
        by_session
            .entry(e.day)
            .or_default()
            .insert(e.session_number, &e.subject);
    }

    let mut matrix = BTreeMap::new();
    for &day in &Day::ALL {
        let sessions = by_session.get(&day);
        let row = (1..=SLOTS_PER_DAY as u32)
            .map(|n| {
                sessions
                    .and_then(|m| m.get(&n).copied())
                    .unwrap_or(FREE_PERIOD)
                    .to_string()
            })
            .collect();
        matrix.insert(day, row);
    }
    matrix
}
