//! Generation pipeline.
//!
//! One call builds the empty grid and demand counters, runs the requested
//! placer (weighted placement plus the repair pipeline, or the
//! backtracking search), validates the result, and renders the 55 output
//! rows. The engine holds no state between calls; everything lives in
//! locals owned by the call.
//!
//! Generation is best-effort: only an empty subject list aborts. An
//! infeasible hour total, an unplaceable lab, or an exhausted search all
//! resolve to a delivered timetable plus violations from the validator.

use log::{info, warn};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::models::{
    Day, GenerationRequest, Limits, PlacerKind, PreferenceSet, Subject, SubjectCatalog,
    TimetableEntry, TimetableGrid, DEFAULT_BREAK_TIMES, DEFAULT_TIME_SLOTS,
    EFFECTIVE_SLOTS_PER_WEEK, SLOTS_PER_DAY,
};
use crate::scheduler::{
    repair, BacktrackingPlacer, DemandTable, PlacementContext, Placer, WeightedPlacer,
};
use crate::validation::{ValidationReport, Validator};

/// Error raised by a timetable store.
#[derive(Debug, Error)]
#[error("timetable store failed: {0}")]
pub struct StoreError(pub String);

/// Write-once sink for generated entries.
///
/// `replace_all` is logically one transaction: the previous result set
/// disappears and the new one lands atomically, so a reader never sees a
/// half-written week.
pub trait TimetableStore {
    /// Replaces the stored result set with `entries`.
    fn replace_all(&mut self, entries: &[TimetableEntry]) -> Result<(), StoreError>;
}

/// In-memory store, used by tests and callers without persistence.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Vec<TimetableEntry>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored entries.
    pub fn entries(&self) -> &[TimetableEntry] {
        &self.entries
    }
}

impl TimetableStore for MemoryStore {
    fn replace_all(&mut self, entries: &[TimetableEntry]) -> Result<(), StoreError> {
        self.entries = entries.to_vec();
        Ok(())
    }
}

/// Errors a generation call can surface.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The request carried no schedulable subject.
    #[error("no subjects available for scheduling")]
    NoSubjects,
    /// The external store rejected the result set.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Everything one generation call produced.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    /// Opaque passthrough from the request.
    pub department: String,
    /// Opaque passthrough from the request.
    pub semester: String,
    /// Free-period target the engine worked toward, after clamping.
    pub desired_free_periods: u32,
    /// The 55 output rows in day-major, session-ascending order.
    pub entries: Vec<TimetableEntry>,
    /// Validator verdict over the final grid.
    pub report: ValidationReport,
    /// Codes of lab subjects whose block could not be placed.
    pub unplaced_labs: Vec<String>,
    /// Whether the backtracking search hit its attempt cap.
    pub attempts_exhausted: bool,
}

/// The timetable generation engine.
///
/// Stateless; safe to share one instance across sequential calls. Under a
/// concurrent transport, give each request its own call (the engine takes
/// no locks).
#[derive(Debug, Clone, Copy, Default)]
pub struct TimetableEngine;

impl TimetableEngine {
    /// Creates the engine.
    pub fn new() -> Self {
        Self
    }

    /// Generates a timetable, seeding the RNG from the request (or OS
    /// entropy when no seed is given).
    pub fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, EngineError> {
        let mut rng = match request.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_os_rng(),
        };
        self.generate_with_rng(request, &mut rng)
    }

    /// Generates a timetable and stores the result set in one logical
    /// transaction. Store failures propagate untouched.
    pub fn generate_into<S: TimetableStore>(
        &self,
        request: &GenerationRequest,
        store: &mut S,
    ) -> Result<GenerationResult, EngineError> {
        let result = self.generate(request)?;
        store.replace_all(&result.entries)?;
        info!("stored {} timetable entries", result.entries.len());
        Ok(result)
    }

    /// Generates a timetable with a caller-supplied RNG.
    pub fn generate_with_rng<R: Rng>(
        &self,
        request: &GenerationRequest,
        rng: &mut R,
    ) -> Result<GenerationResult, EngineError> {
        let subjects = schedulable_subjects(&request.subjects)?;
        info!("scheduling {} subjects", subjects.len());

        let catalog = SubjectCatalog::new(&subjects);
        let preferences = PreferenceSet::new(&request.faculty_preferences);
        if preferences.is_empty() {
            info!("no faculty preferences provided; scheduling without them");
        } else {
            info!("loaded {} faculty preferences", preferences.len());
        }

        let time_slots = resolve_time_slots(request);
        if let Some(breaks) = &request.break_times {
            let canonical = breaks.len() == DEFAULT_BREAK_TIMES.len()
                && breaks.iter().zip(DEFAULT_BREAK_TIMES).all(|(a, b)| a == b);
            if !canonical {
                info!("custom break times accepted; break sessions stay at 4 and 8");
            }
        }

        let limits = Limits::with_max_sessions_per_day(request.max_sessions_per_day.unwrap_or(2));
        let desired_free_periods = resolve_desired_free_periods(request, &catalog);

        let mut grid = TimetableGrid::new();
        let mut demand = DemandTable::new(&catalog);
        let ctx = PlacementContext {
            catalog: &catalog,
            preferences: &preferences,
            limits,
            desired_free_periods,
            time_slots: &time_slots,
        };

        let outcome = match request.placer {
            PlacerKind::Weighted => {
                let placer = WeightedPlacer::new();
                info!("running the {} placer", placer.name());
                let outcome = placer.place(&mut grid, &mut demand, &ctx, rng);
                repair::run(&mut grid, &mut demand, &ctx, rng);
                outcome
            }
            PlacerKind::Backtracking => {
                let placer = BacktrackingPlacer::new();
                info!("running the {} placer", placer.name());
                placer.place(&mut grid, &mut demand, &ctx, rng)
            }
        };

        debug_assert_eq!(grid.total_unallocated(), 0);
        let report = Validator::new(&catalog, limits, desired_free_periods).check(&grid);
        if report.is_valid {
            info!("timetable generated with no violations");
        } else {
            warn!("timetable generated with {} violations", report.violations.len());
        }

        let entries = render_entries(&grid, &catalog);
        log_final_timetable(&entries);

        Ok(GenerationResult {
            department: request.department.clone(),
            semester: request.semester.clone(),
            desired_free_periods,
            entries,
            report,
            unplaced_labs: outcome.unplaced_labs,
            attempts_exhausted: outcome.attempts_exhausted,
        })
    }
}

/// Filters out unavailable subjects; an empty remainder is the one hard
/// failure of the pipeline.
fn schedulable_subjects(subjects: &[Subject]) -> Result<Vec<Subject>, EngineError> {
    let (available, skipped): (Vec<Subject>, Vec<Subject>) =
        subjects.iter().cloned().partition(|s| s.available);
    for s in &skipped {
        info!("skipping unavailable subject {}", s.code);
    }
    if available.is_empty() {
        warn!("no subjects available for scheduling");
        return Err(EngineError::NoSubjects);
    }
    Ok(available)
}

/// Session time labels: the caller's list when it covers all 11 sessions,
/// the canonical grid otherwise.
fn resolve_time_slots(request: &GenerationRequest) -> Vec<String> {
    match &request.available_time_slots {
        Some(slots) if slots.len() == SLOTS_PER_DAY => slots.clone(),
        Some(slots) => {
            warn!(
                "request carries {} time slots, expected {SLOTS_PER_DAY}; using the canonical grid",
                slots.len()
            );
            DEFAULT_TIME_SLOTS.iter().map(|s| s.to_string()).collect()
        }
        None => DEFAULT_TIME_SLOTS.iter().map(|s| s.to_string()).collect(),
    }
}

/// Free-period target: the requested count clamped to the slack the
/// subject hours leave, or the full slack when nothing was requested.
fn resolve_desired_free_periods(request: &GenerationRequest, catalog: &SubjectCatalog) -> u32 {
    let total_hours = catalog.total_subject_hours();
    let slack = if total_hours > EFFECTIVE_SLOTS_PER_WEEK {
        warn!(
            "subject hours ({total_hours}) exceed the {EFFECTIVE_SLOTS_PER_WEEK} teachable \
             sessions; free-period target clamped to 0"
        );
        0
    } else {
        EFFECTIVE_SLOTS_PER_WEEK - total_hours
    };

    let desired = match request.desired_free_periods {
        Some(requested) => {
            if requested > slack {
                warn!("requested {requested} free periods, only {slack} available");
            }
            requested.min(slack)
        }
        None => slack,
    };
    info!(
        "subject hours: {total_hours}, free periods available: {slack}, using: {desired}"
    );
    desired
}

/// Renders the grid to 55 rows in day-major, session-ascending order.
fn render_entries(grid: &TimetableGrid, catalog: &SubjectCatalog) -> Vec<TimetableEntry> {
    grid.iter()
        .map(|(day, index, content)| {
            TimetableEntry::new(day, index as u32 + 1, catalog.render(content))
        })
        .collect()
}

/// One log line per day, mirroring the operator-facing final report.
fn log_final_timetable(entries: &[TimetableEntry]) {
    for &day in &Day::ALL {
        let line: Vec<String> = entries
            .iter()
            .filter(|e| e.day == day)
            .map(|e| format!("[{}: {}]", e.session_number, e.subject))
            .collect();
        info!("{day}: {}", line.join(" "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{day_slot_matrix, FacultyPreference, FREE_PERIOD, LONG_BREAK, SHORT_BREAK};
    use crate::validation::ViolationKind;

    fn subject(code: &str, name: &str, faculty: &str, hours: u32) -> Subject {
        Subject::new(code, name, faculty, hours)
    }

    fn baseline_subjects() -> Vec<Subject> {
        vec![
            subject("CS601", "CS601", "Smith", 6),
            subject("CS602", "CS602", "Johnson", 6),
            subject("CS603", "CS603", "Williams", 6),
            subject("CS604", "CS604", "Brown", 6),
        ]
    }

    fn count_label(entries: &[TimetableEntry], label: &str) -> usize {
        entries.iter().filter(|e| e.subject == label).count()
    }

    fn assert_universal_invariants(result: &GenerationResult) {
        // 55 rows, sessions 1..=11 per day, breaks fixed, no UNALLOCATED.
        assert_eq!(result.entries.len(), 55);
        for &day in &Day::ALL {
            let sessions: Vec<u32> = result
                .entries
                .iter()
                .filter(|e| e.day == day)
                .map(|e| e.session_number)
                .collect();
            assert_eq!(sessions, (1..=11).collect::<Vec<u32>>());
        }
        for e in &result.entries {
            match e.session_number {
                4 => assert_eq!(e.subject, SHORT_BREAK),
                8 => assert_eq!(e.subject, LONG_BREAK),
                _ => assert_ne!(e.subject, "UNALLOCATED"),
            }
        }
    }

    #[test]
    fn test_baseline_scenario() {
        // 4 x 6h, no labs: 21 frees, 6 sessions each, all caps respected.
        let request = GenerationRequest::new("CSE", "6", baseline_subjects()).with_seed(42);
        let result = TimetableEngine::new().generate(&request).unwrap();

        assert_universal_invariants(&result);
        assert_eq!(result.desired_free_periods, 21);
        assert_eq!(count_label(&result.entries, FREE_PERIOD), 21);
        for (code, faculty) in [
            ("CS601", "Smith"),
            ("CS602", "Johnson"),
            ("CS603", "Williams"),
            ("CS604", "Brown"),
        ] {
            let label = format!("{faculty} - {code}");
            assert_eq!(count_label(&result.entries, &label), 6, "{code}");
            for &day in &Day::ALL {
                let on_day = result
                    .entries
                    .iter()
                    .filter(|e| e.day == day && e.subject == label)
                    .count();
                assert!(on_day <= 2, "{code} has {on_day} sessions on {day}");
            }
        }
        // No triple run of any subject label.
        let matrix = day_slot_matrix(&result.entries);
        for row in matrix.values() {
            for w in row.windows(3) {
                if w[0] == w[1] && w[1] == w[2] {
                    assert_eq!(w[0], FREE_PERIOD, "triple run of {}", w[0]);
                }
            }
        }
    }

    #[test]
    fn test_one_lab_scenario() {
        let subjects = vec![
            subject("CS601", "CS601", "Dr. Smith", 6).with_lab(),
            subject("CS602", "CS602", "Dr. Johnson", 6),
            subject("CS603", "CS603", "Dr. Williams", 6),
        ];
        let request = GenerationRequest::new("CSE", "6", subjects).with_seed(42);
        let result = TimetableEngine::new().generate(&request).unwrap();

        assert_universal_invariants(&result);
        assert_eq!(result.desired_free_periods, 24);
        assert!(result.unplaced_labs.is_empty());
        assert_eq!(count_label(&result.entries, "Dr. Smith - CS601 Lab"), 3);
        assert_eq!(count_label(&result.entries, "Dr. Smith - CS601"), 6);

        // The lab triple sits contiguously within one day, crossing no break.
        let matrix = day_slot_matrix(&result.entries);
        let lab_rows: Vec<(&Day, usize)> = matrix
            .iter()
            .flat_map(|(day, row)| {
                row.iter()
                    .enumerate()
                    .filter(|(_, l)| l.as_str() == "Dr. Smith - CS601 Lab")
                    .map(move |(i, _)| (day, i))
            })
            .collect();
        assert_eq!(lab_rows.len(), 3);
        let day = lab_rows[0].0;
        assert!(lab_rows.iter().all(|(d, _)| *d == day));
        let start = lab_rows[0].1;
        assert_eq!(lab_rows[1].1, start + 1);
        assert_eq!(lab_rows[2].1, start + 2);
        assert!(!(start..start + 3).any(|i| i == 3 || i == 7));
    }

    #[test]
    fn test_infeasible_scenario_clamps_and_reports() {
        // 50 subject hours cannot fit 45 teachable sessions.
        let subjects: Vec<Subject> = (1..=5)
            .map(|i| subject(&format!("CS60{i}"), &format!("CS60{i}"), &format!("F{i}"), 10))
            .collect();
        let request = GenerationRequest::new("CSE", "6", subjects).with_seed(42);
        let result = TimetableEngine::new().generate(&request).unwrap();

        assert_universal_invariants(&result);
        assert_eq!(result.desired_free_periods, 0);
        assert!(!result.report.is_valid);
        assert!(result
            .report
            .violations
            .iter()
            .any(|v| v.kind == ViolationKind::HourMismatch));
        assert!(!result
            .report
            .violations
            .iter()
            .any(|v| v.kind == ViolationKind::MissingLabBlock));
    }

    #[test]
    fn test_faculty_preference_property() {
        // Over 100 seeded runs the preferred subject lands on Wednesday
        // strictly more often than the comparator.
        let subjects = vec![
            subject("CS601", "CS601", "P", 6),
            subject("CS602", "CS602", "Q", 6),
            subject("CS603", "CS603", "R", 6),
            subject("CS604", "CS604", "S", 6),
        ];
        let preferences = vec![FacultyPreference::new("P").with_day(Day::Wednesday)];
        let engine = TimetableEngine::new();

        let mut preferred = 0usize;
        let mut comparator = 0usize;
        for seed in 0..100 {
            let request = GenerationRequest::new("CSE", "6", subjects.clone())
                .with_preferences(preferences.clone())
                .with_seed(seed);
            let result = engine.generate(&request).unwrap();
            preferred += result
                .entries
                .iter()
                .filter(|e| e.day == Day::Wednesday && e.subject == "P - CS601")
                .count();
            comparator += result
                .entries
                .iter()
                .filter(|e| e.day == Day::Wednesday && e.subject == "Q - CS602")
                .count();
        }
        assert!(
            preferred > comparator,
            "preferred {preferred} vs comparator {comparator}"
        );
    }

    #[test]
    fn test_backtracking_tight_case() {
        // 5 x 6h with exactly 15 frees solves within the attempt cap.
        let subjects: Vec<Subject> = (1..=5)
            .map(|i| subject(&format!("CS60{i}"), &format!("CS60{i}"), &format!("F{i}"), 6))
            .collect();
        let request = GenerationRequest::new("CSE", "6", subjects)
            .with_desired_free_periods(15)
            .with_placer(PlacerKind::Backtracking)
            .with_seed(42);
        let result = TimetableEngine::new().generate(&request).unwrap();

        assert_universal_invariants(&result);
        assert!(!result.attempts_exhausted);
        assert!(result.report.is_valid, "violations: {:?}", result.report.messages());
        assert_eq!(count_label(&result.entries, FREE_PERIOD), 15);
    }

    #[test]
    fn test_validator_matches_engine_flags() {
        // 5 x 6h fills the week to exactly the default 15 frees: every
        // demand-side check passes, so the only residue the validator may
        // still flag is a day the redistribution could not relieve.
        let subjects: Vec<Subject> = (1..=5)
            .map(|i| subject(&format!("CS60{i}"), &format!("CS60{i}"), &format!("F{i}"), 6))
            .collect();
        let request = GenerationRequest::new("CSE", "6", subjects).with_seed(42);
        let result = TimetableEngine::new().generate(&request).unwrap();

        assert_eq!(result.desired_free_periods, 15);
        assert_eq!(count_label(&result.entries, FREE_PERIOD), 15);
        for i in 1..=5 {
            assert_eq!(count_label(&result.entries, &format!("F{i} - CS60{i}")), 6);
        }
        for v in &result.report.violations {
            assert!(
                matches!(v.kind, ViolationKind::FreePeriodDayCap),
                "unexpected violation: {v:?}"
            );
        }
    }

    #[test]
    fn test_empty_subject_list_hard_fails() {
        let request = GenerationRequest::new("CSE", "6", vec![]);
        let err = TimetableEngine::new().generate(&request).unwrap_err();
        assert!(matches!(err, EngineError::NoSubjects));
    }

    #[test]
    fn test_unavailable_subjects_are_skipped() {
        let subjects = vec![
            subject("CS601", "CS601", "Smith", 6),
            subject("CS602", "CS602", "Johnson", 6).with_available(false),
        ];
        let request = GenerationRequest::new("CSE", "6", subjects).with_seed(42);
        let result = TimetableEngine::new().generate(&request).unwrap();
        assert_eq!(count_label(&result.entries, "Johnson - CS602"), 0);
        assert_eq!(count_label(&result.entries, "Smith - CS601"), 6);

        let all_off = vec![subject("CS601", "CS601", "Smith", 6).with_available(false)];
        let request = GenerationRequest::new("CSE", "6", all_off);
        assert!(matches!(
            TimetableEngine::new().generate(&request),
            Err(EngineError::NoSubjects)
        ));
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let engine = TimetableEngine::new();
        let request = GenerationRequest::new("CSE", "6", baseline_subjects()).with_seed(7);
        let a = engine.generate(&request).unwrap();
        let b = engine.generate(&request).unwrap();
        assert_eq!(a.entries, b.entries);
    }

    #[test]
    fn test_generate_into_stores_atomically() {
        let engine = TimetableEngine::new();
        let mut store = MemoryStore::new();
        let request = GenerationRequest::new("CSE", "6", baseline_subjects()).with_seed(42);

        let result = engine.generate_into(&request, &mut store).unwrap();
        assert_eq!(store.entries(), result.entries.as_slice());

        // A second run replaces, never appends.
        let request2 = GenerationRequest::new("CSE", "6", baseline_subjects()).with_seed(43);
        engine.generate_into(&request2, &mut store).unwrap();
        assert_eq!(store.entries().len(), 55);
    }

    #[test]
    fn test_store_failure_propagates() {
        struct FailingStore;
        impl TimetableStore for FailingStore {
            fn replace_all(&mut self, _: &[TimetableEntry]) -> Result<(), StoreError> {
                Err(StoreError("disk on fire".into()))
            }
        }
        let request = GenerationRequest::new("CSE", "6", baseline_subjects()).with_seed(42);
        let err = TimetableEngine::new()
            .generate_into(&request, &mut FailingStore)
            .unwrap_err();
        assert!(matches!(err, EngineError::Store(_)));
    }

    #[test]
    fn test_custom_time_slot_list_of_wrong_length_falls_back() {
        let mut request = GenerationRequest::new("CSE", "6", baseline_subjects()).with_seed(42);
        request.available_time_slots = Some(vec!["9:00-10:00".into()]);
        // Falls back to the canonical grid rather than panicking on slot
        // weighting.
        let result = TimetableEngine::new().generate(&request).unwrap();
        assert_universal_invariants(&result);
    }

    #[test]
    fn test_requested_free_periods_clamped_to_slack() {
        let request = GenerationRequest::new("CSE", "6", baseline_subjects())
            .with_desired_free_periods(40)
            .with_seed(42);
        let result = TimetableEngine::new().generate(&request).unwrap();
        assert_eq!(result.desired_free_periods, 21);
        assert_eq!(count_label(&result.entries, FREE_PERIOD), 21);
    }
}
