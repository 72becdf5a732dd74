//! Weighted greedy placer.
//!
//! # Algorithm
//!
//! 1. Place every lab subject as one contiguous 3-session, break-free
//!    block. Days are tried in shuffled order, lab-free days first; the
//!    start index is drawn from the shuffled set of valid starts.
//! 2. Run "one placement per subject" rounds until all theory demand is
//!    consumed or five consecutive rounds place nothing. Each round sorts
//!    subjects by remaining hours (desc), days covered (asc), and a small
//!    jitter, then gives every subject one placement attempt.
//!
//! A single attempt weights each day by `10 - 5 * count`, a `[-1, 1]`
//! jitter, `0.2` per open slot, and a `x2.5` multiplier on the faculty's
//! preferred days; the day is drawn from a multiset with one entry per
//! ceiling-weight unit. On a day the subject has not visited yet, a
//! consecutive pair is tried first; otherwise a single session is chosen
//! by weighted roulette over run-safe open slots (morning and
//! preferred-time slots get a bonus).
//!
//! The placer leaves surplus cells `Unallocated`; the repair pipeline
//! turns them into free periods or catch-up sessions.

use log::{debug, warn};
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};

use crate::models::{
    Day, SlotContent, TimetableGrid, LAB_BLOCK_LEN, MORNING_BREAK_INDEX, SLOTS_PER_DAY,
};

use super::{roulette_pick, DemandTable, PlacementContext, PlacementOutcome, Placer};

/// Rounds without a single placement before the theory loop gives up.
const MAX_STALE_ROUNDS: u32 = 5;

/// Lab blocks first, then weighted theory rounds.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeightedPlacer;

impl WeightedPlacer {
    /// Creates the placer.
    pub fn new() -> Self {
        Self
    }
}

impl Placer for WeightedPlacer {
    fn name(&self) -> &'static str {
        "weighted"
    }

    fn place(
        &self,
        grid: &mut TimetableGrid,
        demand: &mut DemandTable,
        ctx: &PlacementContext<'_>,
        rng: &mut dyn RngCore,
    ) -> PlacementOutcome {
        let unplaced_labs = place_lab_blocks(grid, demand, ctx, rng);
        place_theory_rounds(grid, demand, ctx, rng);
        PlacementOutcome {
            unplaced_labs,
            attempts_exhausted: false,
        }
    }
}

/// Places one contiguous lab block per lab subject. Returns the codes that
/// could not be placed.
fn place_lab_blocks(
    grid: &mut TimetableGrid,
    demand: &mut DemandTable,
    ctx: &PlacementContext<'_>,
    rng: &mut dyn RngCore,
) -> Vec<String> {
    let mut unplaced = Vec::new();

    let lab_codes: Vec<String> = ctx.catalog.lab_subjects().map(|s| s.code.clone()).collect();
    for code in lab_codes {
        if demand.lab_left(&code) == 0 {
            continue;
        }

        let mut days = Day::ALL.to_vec();
        days.shuffle(rng);

        let mut placed = None;
        'passes: for pass in 0..2 {
            for &day in &days {
                // First pass keeps to days without a lab; the fallback pass
                // accepts doubling up.
                if pass == 0 && grid.day_has_lab(day) {
                    continue;
                }
                if let Some(start) = try_place_lab_on_day(grid, day, &code, rng) {
                    placed = Some((day, start));
                    break 'passes;
                }
            }
        }

        match placed {
            Some((day, start)) => {
                demand.take_lab(&code, LAB_BLOCK_LEN as u32);
                debug!(
                    "placed lab block for {code} on {day} at sessions {}-{}",
                    start + 1,
                    start + LAB_BLOCK_LEN
                );
            }
            None => {
                warn!("could not place a contiguous lab block for {code}");
                unplaced.push(code);
            }
        }
    }

    unplaced
}

/// Writes the lab block of `code` at a random valid start on `day`.
fn try_place_lab_on_day(
    grid: &mut TimetableGrid,
    day: Day,
    code: &str,
    rng: &mut dyn RngCore,
) -> Option<usize> {
    let mut starts: Vec<usize> = (0..=SLOTS_PER_DAY - LAB_BLOCK_LEN)
        .filter(|&s| grid.block_fits(day, s, LAB_BLOCK_LEN))
        .collect();
    if starts.is_empty() {
        return None;
    }
    starts.shuffle(rng);
    let start = starts[0];
    for i in start..start + LAB_BLOCK_LEN {
        grid.set(day, i, SlotContent::Lab(code.to_string()));
    }
    Some(start)
}

/// Iterative theory placement: one attempt per subject per round, until
/// demand is settled or [`MAX_STALE_ROUNDS`] rounds pass without progress.
fn place_theory_rounds(
    grid: &mut TimetableGrid,
    demand: &mut DemandTable,
    ctx: &PlacementContext<'_>,
    rng: &mut dyn RngCore,
) {
    let mut stale = 0;
    while stale < MAX_STALE_ROUNDS && demand.any_theory_left() {
        let order = priority_order(grid, demand, ctx, rng);
        let mut placed_any = false;

        for code in &order {
            if demand.theory_left(code) == 0 {
                continue;
            }
            if place_one_session(grid, demand, code, ctx, rng) {
                placed_any = true;
            }
        }

        if placed_any {
            stale = 0;
        } else {
            stale += 1;
        }
    }
}

/// Round order: remaining hours descending, then days covered ascending,
/// then jitter.
fn priority_order(
    grid: &TimetableGrid,
    demand: &DemandTable,
    ctx: &PlacementContext<'_>,
    rng: &mut dyn RngCore,
) -> Vec<String> {
    let mut keyed: Vec<(String, u32, u32, f64)> = ctx
        .catalog
        .iter()
        .map(|s| {
            let covered = Day::ALL
                .iter()
                .filter(|&&day| {
                    grid.theory_count_on(day, &s.code) > 0
                        || grid
                            .day(day)
                            .iter()
                            .any(|c| matches!(c, SlotContent::Lab(l) if l == &s.code))
                })
                .count() as u32;
            let jitter: f64 = rng.random_range(-2.0..2.0);
            (s.code.clone(), demand.theory_left(&s.code), covered, jitter)
        })
        .collect();

    keyed.shuffle(rng);
    keyed.sort_by(|a, b| {
        b.1.cmp(&a.1)
            .then(a.2.cmp(&b.2))
            .then(a.3.partial_cmp(&b.3).unwrap_or(std::cmp::Ordering::Equal))
    });
    keyed.into_iter().map(|(code, _, _, _)| code).collect()
}

/// One placement attempt for `code`: a consecutive pair on a fresh day if
/// the demand allows it, otherwise a single roulette-weighted session.
fn place_one_session(
    grid: &mut TimetableGrid,
    demand: &mut DemandTable,
    code: &str,
    ctx: &PlacementContext<'_>,
    rng: &mut dyn RngCore,
) -> bool {
    let Some(subject) = ctx.catalog.get(code) else {
        return false;
    };
    let faculty = subject.faculty.clone();
    let max_per_day = ctx.limits.max_sessions_per_day;

    // Multiset of candidate days: one entry per ceiling-weight unit.
    let mut pool: Vec<Day> = Vec::new();
    for &day in &Day::ALL {
        let count = grid.theory_count_on(day, code);
        if count >= max_per_day {
            continue;
        }
        let mut weight = 10.0 - 5.0 * count as f64;
        weight += rng.random_range(-1.0..1.0);
        weight += 0.2 * grid.open_count_on(day) as f64;
        if ctx.preferences.prefers_day(&faculty, day) {
            weight *= 2.5;
        }
        let reps = weight.ceil();
        if reps <= 0.0 {
            continue;
        }
        for _ in 0..reps as u32 {
            pool.push(day);
        }
    }
    if pool.is_empty() {
        return false;
    }
    pool.shuffle(rng);

    for &day in &pool {
        let count = grid.theory_count_on(day, code);
        if count >= max_per_day {
            continue;
        }

        // A day the subject has not visited yet can take a pair.
        if count == 0 && demand.theory_left(code) >= 2 {
            if let Some(start) = pick_pair_start(grid, day, rng) {
                grid.set(day, start, SlotContent::Theory(code.to_string()));
                grid.set(day, start + 1, SlotContent::Theory(code.to_string()));
                demand.take_theory(code, 2);
                debug!(
                    "placed consecutive pair of {code} on {day} at sessions {}-{}",
                    start + 1,
                    start + 2
                );
                return true;
            }
        }

        // Single session by weighted roulette over run-safe open slots.
        let mut candidates = Vec::new();
        let mut weights = Vec::new();
        for i in 0..SLOTS_PER_DAY {
            if !grid.get(day, i).is_open() {
                continue;
            }
            if grid.would_exceed_run(day, i, code, ctx.limits.max_consecutive) {
                continue;
            }
            let mut weight = 1.0;
            if i < MORNING_BREAK_INDEX {
                weight += 0.3;
            }
            if ctx.preferences.prefers_time(&faculty, &ctx.time_slots[i]) {
                weight += 0.3;
            }
            weight += rng.random_range(-0.5..0.5);
            candidates.push(i);
            weights.push(weight);
        }

        if !candidates.is_empty() {
            let index = candidates[roulette_pick(&weights, rng)];
            grid.set(day, index, SlotContent::Theory(code.to_string()));
            demand.take_theory(code, 1);
            debug!("placed single session of {code} on {day} at session {}", index + 1);
            return true;
        }
    }

    false
}

/// A random start of two adjacent open non-break slots, if any exists.
fn pick_pair_start(grid: &TimetableGrid, day: Day, rng: &mut dyn RngCore) -> Option<usize> {
    let mut starts: Vec<usize> = (0..SLOTS_PER_DAY - 1)
        .filter(|&i| {
            !TimetableGrid::is_break_index(i)
                && !TimetableGrid::is_break_index(i + 1)
                && grid.get(day, i).is_open()
                && grid.get(day, i + 1).is_open()
        })
        .collect();
    if starts.is_empty() {
        return None;
    }
    starts.shuffle(rng);
    Some(starts[0])
}
