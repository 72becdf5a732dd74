//! Placement algorithms and the repair pipeline.
//!
//! Two placers fill the weekly grid behind one interface:
//!
//! - [`WeightedPlacer`]: lab blocks first, then iterative weighted theory
//!   rounds. Expects the repair pipeline ([`repair`]) to run afterwards.
//! - [`BacktrackingPlacer`]: whole-grid recursive search under the same
//!   constraints, bounded by an attempt cap.
//!
//! Both consume a [`DemandTable`] and report a [`PlacementOutcome`]; the
//! engine picks one per request, so repair and validation stay shared.

mod backtracking;
pub mod repair;
mod weighted;

pub use backtracking::BacktrackingPlacer;
pub use weighted::WeightedPlacer;

use rand::RngCore;

use crate::models::{Limits, PreferenceSet, SubjectCatalog, TimetableGrid};

/// Per-subject demand a placer must drive to zero.
///
/// Rows keep the catalog's insertion order so demand iteration is
/// deterministic under a fixed RNG seed.
#[derive(Debug, Clone)]
pub struct DemandTable {
    rows: Vec<DemandRow>,
}

#[derive(Debug, Clone)]
struct DemandRow {
    code: String,
    theory_left: u32,
    lab_left: u32,
}

impl DemandTable {
    /// Initialises demand from the catalog: `hours_per_week` theory
    /// sessions per subject, plus a 3-session lab for lab subjects.
    pub fn new(catalog: &SubjectCatalog) -> Self {
        let rows = catalog
            .iter()
            .map(|s| DemandRow {
                code: s.code.clone(),
                theory_left: s.hours_per_week,
                lab_left: if s.lab_required { 3 } else { 0 },
            })
            .collect();
        Self { rows }
    }

    /// Remaining theory sessions for `code`.
    pub fn theory_left(&self, code: &str) -> u32 {
        self.row(code).map_or(0, |r| r.theory_left)
    }

    /// Remaining lab sessions for `code` (0 or 3).
    pub fn lab_left(&self, code: &str) -> u32 {
        self.row(code).map_or(0, |r| r.lab_left)
    }

    /// Consumes `n` theory sessions of `code`.
    pub fn take_theory(&mut self, code: &str, n: u32) {
        if let Some(r) = self.row_mut(code) {
            r.theory_left = r.theory_left.saturating_sub(n);
        }
    }

    /// Consumes `n` lab sessions of `code`.
    pub fn take_lab(&mut self, code: &str, n: u32) {
        if let Some(r) = self.row_mut(code) {
            r.lab_left = r.lab_left.saturating_sub(n);
        }
    }

    /// Whether any subject still has theory demand.
    pub fn any_theory_left(&self) -> bool {
        self.rows.iter().any(|r| r.theory_left > 0)
    }

    /// Whether all counters are zero.
    pub fn all_settled(&self) -> bool {
        self.rows.iter().all(|r| r.theory_left == 0 && r.lab_left == 0)
    }

    /// Codes with remaining theory demand, in catalog order.
    pub fn codes_with_theory(&self) -> Vec<String> {
        self.rows
            .iter()
            .filter(|r| r.theory_left > 0)
            .map(|r| r.code.clone())
            .collect()
    }

    fn row(&self, code: &str) -> Option<&DemandRow> {
        self.rows.iter().find(|r| r.code == code)
    }

    fn row_mut(&mut self, code: &str) -> Option<&mut DemandRow> {
        self.rows.iter_mut().find(|r| r.code == code)
    }
}

/// Read-only context shared by placers and repair passes.
#[derive(Debug)]
pub struct PlacementContext<'a> {
    /// Subjects of this generation call.
    pub catalog: &'a SubjectCatalog,
    /// Faculty placement biases.
    pub preferences: &'a PreferenceSet,
    /// Scheduling limits.
    pub limits: Limits,
    /// Exact free-period total the week should end with.
    pub desired_free_periods: u32,
    /// Session time labels, sessions 1..=11, for preferred-time matching.
    pub time_slots: &'a [String],
}

/// What a placer achieved.
#[derive(Debug, Clone, Default)]
pub struct PlacementOutcome {
    /// Codes of lab subjects whose block could not be placed.
    pub unplaced_labs: Vec<String>,
    /// Whether the backtracking placer hit its attempt cap and padded the
    /// rest of the grid with free periods.
    pub attempts_exhausted: bool,
}

/// A placement algorithm.
///
/// Implementations mutate the grid and demand in place; they may leave
/// `Unallocated` cells behind (the weighted placer relies on repair to
/// finish the grid), but must never touch break cells or placed lab
/// blocks.
pub trait Placer {
    /// Algorithm name for logs.
    fn name(&self) -> &'static str;

    /// Runs the algorithm over the grid.
    fn place(
        &self,
        grid: &mut TimetableGrid,
        demand: &mut DemandTable,
        ctx: &PlacementContext<'_>,
        rng: &mut dyn RngCore,
    ) -> PlacementOutcome;
}

/// Weighted roulette pick: returns an index into `weights` with probability
/// proportional to each weight. Weights must be positive.
pub(crate) fn roulette_pick(weights: &[f64], rng: &mut dyn RngCore) -> usize {
    use rand::Rng;

    debug_assert!(!weights.is_empty());
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return 0;
    }
    let mut remaining = rng.random_range(0.0..total);
    for (i, w) in weights.iter().enumerate() {
        remaining -= w;
        if remaining <= 0.0 {
            return i;
        }
    }
    weights.len() - 1
}
