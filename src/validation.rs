//! Timetable validation.
//!
//! Recomputes every hard constraint from a finished grid and reports all
//! violations at once:
//! - free-period total against the request-derived target
//! - per-day free-period cap
//! - per-subject per-day session cap
//! - per-subject hour totals (theory and lab counted separately)
//! - lab-block presence and contiguity
//! - consecutive-run limit for non-lab labels
//!
//! An invalid grid can optionally be passed through the reduced repair
//! sequence (redistribution, missing hours, run/cap fixes); the repaired
//! day-by-session matrix is returned alongside the original violations.

use std::collections::BTreeMap;
use std::fmt;

use log::info;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::models::{
    Day, Limits, PreferenceSet, SlotContent, SubjectCatalog, TimetableEntry, TimetableGrid,
    ADDITIONAL_CLASS, DEFAULT_TIME_SLOTS, FREE_PERIOD, LAB_BLOCK_LEN, LONG_BREAK, SHORT_BREAK,
    SLOTS_PER_DAY,
};
use crate::scheduler::{repair, PlacementContext};

/// Categories of timetable violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationKind {
    /// The week's free-period total differs from the target.
    FreePeriodTotal,
    /// A day holds more free periods than the cap allows.
    FreePeriodDayCap,
    /// A subject appears on one day more often than the cap allows.
    DailySessionCap,
    /// A subject's scheduled theory hours differ from its weekly budget.
    HourMismatch,
    /// A lab subject has no complete contiguous lab block.
    MissingLabBlock,
    /// A non-lab label runs longer than the consecutive limit.
    ConsecutiveRun,
}

/// A single constraint violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Violation category.
    pub kind: ViolationKind,
    /// Human-readable description.
    pub message: String,
}

impl Violation {
    fn new(kind: ViolationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Result of validating one timetable.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    /// Whether no violations were found.
    pub is_valid: bool,
    /// All violations, in detection order.
    pub violations: Vec<Violation>,
    /// Day-by-session label matrix after the reduced repair, present only
    /// when the grid was invalid and repair was requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_timetable: Option<BTreeMap<Day, Vec<String>>>,
}

impl ValidationReport {
    /// Violation messages, for callers that want plain strings.
    pub fn messages(&self) -> Vec<String> {
        self.violations.iter().map(|v| v.message.clone()).collect()
    }
}

/// Validates finished grids against the request-derived limits.
#[derive(Debug)]
pub struct Validator<'a> {
    catalog: &'a SubjectCatalog,
    limits: Limits,
    desired_free_periods: u32,
}

impl<'a> Validator<'a> {
    /// Creates a validator. The free-period target comes from the request
    /// (its default is the slack the subject hours leave), never from a
    /// fixed constant.
    pub fn new(catalog: &'a SubjectCatalog, limits: Limits, desired_free_periods: u32) -> Self {
        Self {
            catalog,
            limits,
            desired_free_periods,
        }
    }

    /// Checks every constraint and reports all violations.
    pub fn check(&self, grid: &TimetableGrid) -> ValidationReport {
        let mut violations = Vec::new();

        let free = grid.total_free();
        if free != self.desired_free_periods {
            violations.push(Violation::new(
                ViolationKind::FreePeriodTotal,
                format!(
                    "week has {free} free periods, expected {}",
                    self.desired_free_periods
                ),
            ));
        }

        for &day in &Day::ALL {
            let day_free = grid.free_count_on(day);
            if day_free > self.limits.max_free_per_day {
                violations.push(Violation::new(
                    ViolationKind::FreePeriodDayCap,
                    format!(
                        "{day} has {day_free} free periods, cap is {}",
                        self.limits.max_free_per_day
                    ),
                ));
            }
        }

        for subject in self.catalog.iter() {
            for &day in &Day::ALL {
                let count = grid.theory_count_on(day, &subject.code);
                if count > self.limits.max_sessions_per_day {
                    violations.push(Violation::new(
                        ViolationKind::DailySessionCap,
                        format!(
                            "{} appears {count} times on {day}, cap is {}",
                            subject.code, self.limits.max_sessions_per_day
                        ),
                    ));
                }
            }

            let theory = grid.theory_count(&subject.code);
            if theory != subject.hours_per_week {
                violations.push(Violation::new(
                    ViolationKind::HourMismatch,
                    format!(
                        "{} has {theory} theory hours scheduled, requires {}",
                        subject.code, subject.hours_per_week
                    ),
                ));
            }

            if subject.lab_required && grid.lab_block_day(&subject.code).is_none() {
                let lab = grid.lab_count(&subject.code);
                let message = if lab == 0 {
                    format!("{} has no lab block scheduled", subject.code)
                } else {
                    format!(
                        "{} has {lab} lab sessions but no contiguous {LAB_BLOCK_LEN}-session block",
                        subject.code
                    )
                };
                violations.push(Violation::new(ViolationKind::MissingLabBlock, message));
            }
        }

        for &day in &Day::ALL {
            for (content, run, start) in runs_on(grid, day) {
                let is_run_checked =
                    matches!(content, SlotContent::Theory(_) | SlotContent::Fallback);
                if is_run_checked && run > self.limits.max_consecutive {
                    violations.push(Violation::new(
                        ViolationKind::ConsecutiveRun,
                        format!(
                            "{} runs {run} sessions in a row on {day} from session {}",
                            self.catalog.render(&content),
                            start + 1
                        ),
                    ));
                }
            }
        }

        ValidationReport {
            is_valid: violations.is_empty(),
            violations,
            fixed_timetable: None,
        }
    }

    /// Checks the grid and, when invalid, runs the reduced repair sequence
    /// on a copy and attaches the repaired matrix to the report.
    pub fn check_and_repair(
        &self,
        grid: &TimetableGrid,
        rng: &mut dyn RngCore,
    ) -> ValidationReport {
        let mut report = self.check(grid);
        if report.is_valid {
            return report;
        }
        info!(
            "timetable has {} violations; producing a repaired copy",
            report.violations.len()
        );

        let preferences = PreferenceSet::default();
        let time_slots: Vec<String> = DEFAULT_TIME_SLOTS.iter().map(|s| s.to_string()).collect();
        let ctx = PlacementContext {
            catalog: self.catalog,
            preferences: &preferences,
            limits: self.limits,
            desired_free_periods: self.desired_free_periods,
            time_slots: &time_slots,
        };

        let mut fixed = grid.clone();
        repair::run_reduced(&mut fixed, &ctx, rng);

        let mut matrix = BTreeMap::new();
        for &day in &Day::ALL {
            let row = fixed.day(day).iter().map(|c| self.catalog.render(c)).collect();
            matrix.insert(day, row);
        }
        report.fixed_timetable = Some(matrix);
        report
    }
}

/// Maximal runs of identical content on a day: `(content, length, start)`.
fn runs_on(grid: &TimetableGrid, day: Day) -> Vec<(SlotContent, u32, usize)> {
    let slots = grid.day(day);
    let mut runs = Vec::new();
    let mut start = 0;
    for i in 1..=SLOTS_PER_DAY {
        if i == SLOTS_PER_DAY || slots[i] != slots[start] {
            runs.push((slots[start].clone(), (i - start) as u32, start));
            start = i;
        }
    }
    runs
}

/// Rebuilds a grid from stored output rows by exact label lookup.
///
/// Labels are matched against the catalog's rendered forms; there is no
/// substring parsing. A label the catalog cannot account for maps to the
/// fallback content.
pub fn grid_from_entries(entries: &[TimetableEntry], catalog: &SubjectCatalog) -> TimetableGrid {
    let mut by_label: BTreeMap<String, SlotContent> = BTreeMap::new();
    for s in catalog.iter() {
        by_label.insert(s.theory_label(), SlotContent::Theory(s.code.clone()));
        by_label.insert(s.lab_label(), SlotContent::Lab(s.code.clone()));
    }

    let mut grid = TimetableGrid::new();
    for entry in entries {
        let index = (entry.session_number.saturating_sub(1)) as usize;
        if index >= SLOTS_PER_DAY || TimetableGrid::is_break_index(index) {
            continue;
        }
        let content = match entry.subject.as_str() {
            FREE_PERIOD => SlotContent::Free,
            ADDITIONAL_CLASS => SlotContent::Fallback,
            SHORT_BREAK | LONG_BREAK => continue,
            label => by_label.get(label).cloned().unwrap_or(SlotContent::Fallback),
        };
        grid.set(entry.day, index, content);
    }
    grid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Subject;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn sample_catalog() -> SubjectCatalog {
        SubjectCatalog::new(&[
            Subject::new("CS601", "Algorithms", "Dr. Smith", 4),
            Subject::new("CS602", "Databases", "Dr. Johnson", 4).with_lab(),
        ])
    }

    /// 4 + 4 theory, one lab block, and the 34 remaining cells free.
    fn sample_grid() -> TimetableGrid {
        let mut grid = TimetableGrid::new();
        for &day in &Day::ALL {
            for i in 0..SLOTS_PER_DAY {
                if !TimetableGrid::is_break_index(i) {
                    grid.set(day, i, SlotContent::Free);
                }
            }
        }
        for &day in &[Day::Monday, Day::Tuesday, Day::Wednesday, Day::Thursday] {
            grid.set(day, 0, SlotContent::Theory("CS601".into()));
            grid.set(day, 2, SlotContent::Theory("CS602".into()));
        }
        for i in 4..7 {
            grid.set(Day::Friday, i, SlotContent::Lab("CS602".into()));
        }
        grid
    }

    fn validator_for(catalog: &SubjectCatalog, desired: u32) -> Validator<'_> {
        Validator::new(catalog, Limits::default(), desired)
    }

    #[test]
    fn test_detects_free_period_total_mismatch() {
        let catalog = sample_catalog();
        let grid = sample_grid();
        let report = validator_for(&catalog, 10).check(&grid);
        assert!(!report.is_valid);
        assert!(report
            .violations
            .iter()
            .any(|v| v.kind == ViolationKind::FreePeriodTotal));
    }

    #[test]
    fn test_detects_day_cap_violation() {
        let catalog = sample_catalog();
        let grid = sample_grid();
        // 34 frees match the target but push days over the 3-per-day cap.
        let report = validator_for(&catalog, 34).check(&grid);
        assert!(report
            .violations
            .iter()
            .any(|v| v.kind == ViolationKind::FreePeriodDayCap));
        assert!(!report
            .violations
            .iter()
            .any(|v| v.kind == ViolationKind::FreePeriodTotal));
    }

    #[test]
    fn test_detects_daily_session_cap() {
        let catalog = sample_catalog();
        let mut grid = sample_grid();
        grid.set(Day::Monday, 5, SlotContent::Theory("CS601".into()));
        grid.set(Day::Monday, 8, SlotContent::Theory("CS601".into()));
        let report = validator_for(&catalog, 32).check(&grid);
        assert!(report
            .violations
            .iter()
            .any(|v| v.kind == ViolationKind::DailySessionCap));
    }

    #[test]
    fn test_detects_hour_mismatch() {
        let catalog = sample_catalog();
        let mut grid = sample_grid();
        grid.set(Day::Monday, 0, SlotContent::Free); // drop one CS601 hour
        let report = validator_for(&catalog, 35).check(&grid);
        let mismatch = report
            .violations
            .iter()
            .find(|v| v.kind == ViolationKind::HourMismatch)
            .expect("hour mismatch expected");
        assert!(mismatch.message.contains("CS601"));
    }

    #[test]
    fn test_detects_missing_and_broken_lab() {
        let catalog = sample_catalog();

        let mut no_lab = sample_grid();
        for i in 4..7 {
            no_lab.set(Day::Friday, i, SlotContent::Free);
        }
        let report = validator_for(&catalog, 37).check(&no_lab);
        assert!(report
            .violations
            .iter()
            .any(|v| v.kind == ViolationKind::MissingLabBlock
                && v.message.contains("no lab block")));

        let mut broken = sample_grid();
        broken.set(Day::Friday, 5, SlotContent::Free); // punch a hole
        let report = validator_for(&catalog, 35).check(&broken);
        assert!(report
            .violations
            .iter()
            .any(|v| v.kind == ViolationKind::MissingLabBlock
                && v.message.contains("contiguous")));
    }

    #[test]
    fn test_detects_consecutive_run() {
        let catalog = sample_catalog();
        let mut grid = sample_grid();
        for i in 4..7 {
            grid.set(Day::Monday, i, SlotContent::Theory("CS601".into()));
        }
        let report = validator_for(&catalog, 31).check(&grid);
        assert!(report
            .violations
            .iter()
            .any(|v| v.kind == ViolationKind::ConsecutiveRun));
        // The Friday lab triple never counts as a run.
        assert!(!report
            .violations
            .iter()
            .any(|v| v.kind == ViolationKind::ConsecutiveRun && v.message.contains("Lab")));
    }

    #[test]
    fn test_free_runs_are_not_violations() {
        let catalog = sample_catalog();
        let grid = sample_grid(); // long stretches of free periods everywhere
        let report = validator_for(&catalog, 34).check(&grid);
        assert!(!report
            .violations
            .iter()
            .any(|v| v.kind == ViolationKind::ConsecutiveRun));
    }

    #[test]
    fn test_check_and_repair_attaches_matrix() {
        let catalog = sample_catalog();
        let mut grid = sample_grid();
        for i in 4..7 {
            grid.set(Day::Monday, i, SlotContent::Theory("CS601".into()));
        }
        let mut rng = SmallRng::seed_from_u64(42);
        let report = validator_for(&catalog, 31).check_and_repair(&grid, &mut rng);

        assert!(!report.is_valid);
        let matrix = report.fixed_timetable.expect("repaired matrix expected");
        assert_eq!(matrix.len(), 5);
        assert_eq!(matrix[&Day::Monday].len(), SLOTS_PER_DAY);
        // Repair broke the triple run.
        let monday = &matrix[&Day::Monday];
        assert!(
            !(monday[4] == "Dr. Smith - Algorithms"
                && monday[5] == "Dr. Smith - Algorithms"
                && monday[6] == "Dr. Smith - Algorithms")
        );
    }

    #[test]
    fn test_check_and_repair_noop_when_valid() {
        let catalog = SubjectCatalog::new(&[Subject::new("CS601", "Algorithms", "Dr. Smith", 4)]);
        let mut grid = TimetableGrid::new();
        // One CS601 session on four days, three frees per day, and the
        // fallback label scattered so no run exceeds two.
        for &day in &[Day::Monday, Day::Tuesday, Day::Wednesday, Day::Thursday] {
            grid.set(day, 0, SlotContent::Theory("CS601".into()));
        }
        grid.set(Day::Friday, 0, SlotContent::Fallback);
        for &day in &Day::ALL {
            for (i, content) in [
                (1, SlotContent::Free),
                (2, SlotContent::Fallback),
                (4, SlotContent::Fallback),
                (5, SlotContent::Free),
                (6, SlotContent::Fallback),
                (8, SlotContent::Fallback),
                (9, SlotContent::Free),
                (10, SlotContent::Fallback),
            ] {
                grid.set(day, i, content);
            }
        }

        let validator = Validator::new(&catalog, Limits::default(), 15);
        let mut rng = SmallRng::seed_from_u64(42);
        let report = validator.check_and_repair(&grid, &mut rng);
        assert!(report.is_valid, "violations: {:?}", report.messages());
        assert!(report.fixed_timetable.is_none());
    }

    #[test]
    fn test_grid_from_entries_round_trip() {
        let catalog = sample_catalog();
        let grid = sample_grid();

        let mut entries = Vec::new();
        for (day, i, content) in grid.iter() {
            entries.push(TimetableEntry::new(day, i as u32 + 1, catalog.render(content)));
        }
        let rebuilt = grid_from_entries(&entries, &catalog);
        assert_eq!(rebuilt, grid);
    }

    #[test]
    fn test_grid_from_entries_unknown_label() {
        let catalog = sample_catalog();
        let entries = vec![TimetableEntry::new(Day::Monday, 1, "Mystery - Label")];
        let rebuilt = grid_from_entries(&entries, &catalog);
        assert_eq!(rebuilt.get(Day::Monday, 0), &SlotContent::Fallback);
    }
}
