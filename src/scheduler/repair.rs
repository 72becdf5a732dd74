//! Post-placement repair passes.
//!
//! Five deterministic sub-phases run after the weighted placer:
//!
//! 1. [`fill_unallocated`]: turn leftover `Unallocated` cells into free
//!    periods (up to the target) or catch-up sessions.
//! 2. [`enforce_exact_free_periods`]: rebalance over- and under-allocated
//!    subjects, then force the free-period total to exactly match the
//!    target, substituting `Additional Class` when no subject fits.
//! 3. [`redistribute_free_periods`]: pull theory sessions from other days
//!    into the free slots of any day above the per-day free cap.
//! 4. [`fix_consecutive_and_daily_caps`]: break up triple runs and demote
//!    per-day cap violations.
//! 5. [`ensure_required_hours`]: place missing theory hours into free
//!    slots. A missing lab block is logged, never rebuilt here.
//!
//! Every mutation preserves the global invariants: break cells and lab
//! blocks are never touched, and no `Unallocated` cell survives phase 1.

use log::{debug, info, warn};
use rand::seq::{IndexedRandom, SliceRandom};
use rand::RngCore;

use crate::models::{Day, SlotContent, SlotPos, Subject, TimetableGrid, SLOTS_PER_DAY};

use super::{DemandTable, PlacementContext};

/// Runs the full pipeline (phases 1 through 5) after the weighted placer.
pub fn run(
    grid: &mut TimetableGrid,
    demand: &mut DemandTable,
    ctx: &PlacementContext<'_>,
    rng: &mut dyn RngCore,
) {
    fill_unallocated(grid, demand, ctx);
    enforce_exact_free_periods(grid, ctx, rng);
    redistribute_free_periods(grid, ctx, rng);
    fix_consecutive_and_daily_caps(grid, ctx, rng);
    ensure_required_hours(grid, ctx, rng);
}

/// Reduced sequence the validator uses on an invalid grid: redistribution,
/// missing hours, then the run/cap fixer.
pub fn run_reduced(grid: &mut TimetableGrid, ctx: &PlacementContext<'_>, rng: &mut dyn RngCore) {
    redistribute_free_periods(grid, ctx, rng);
    ensure_required_hours(grid, ctx, rng);
    fix_consecutive_and_daily_caps(grid, ctx, rng);
}

/// Phase 1: greedy fill of `Unallocated` cells in grid order.
///
/// Free periods are made until the target is met; after that, remaining
/// cells go to subjects that still owe hours (ignoring the per-day cap
/// only when no capped candidate exists), and finally to free periods.
pub fn fill_unallocated(
    grid: &mut TimetableGrid,
    demand: &mut DemandTable,
    ctx: &PlacementContext<'_>,
) {
    let desired = ctx.desired_free_periods;
    let mut free_made = grid.total_free();

    let open = grid.positions_where(|c| matches!(c, SlotContent::Unallocated));
    for (day, index) in open {
        if free_made < desired {
            grid.set(day, index, SlotContent::Free);
            free_made += 1;
            continue;
        }

        let needy = demand.codes_with_theory();
        let capped = needy
            .iter()
            .find(|code| grid.theory_count_on(day, code) < ctx.limits.max_sessions_per_day);
        match capped.or(needy.first()) {
            Some(code) => {
                let code = code.clone();
                grid.set(day, index, SlotContent::Theory(code.clone()));
                demand.take_theory(&code, 1);
            }
            None => {
                grid.set(day, index, SlotContent::Free);
                free_made += 1;
            }
        }
    }

    debug!("phase 1 left {} free periods (target {})", free_made, desired);
}

/// Phase 2: drive the free-period total to exactly the target.
pub fn enforce_exact_free_periods(
    grid: &mut TimetableGrid,
    ctx: &PlacementContext<'_>,
    rng: &mut dyn RngCore,
) {
    let desired = ctx.desired_free_periods;
    let current = grid.total_free();
    info!("free periods before enforcement: {current} (target {desired})");

    if current > desired {
        rebalance_subject_hours(grid, ctx, rng);
    } else if current < desired {
        let needed = desired - current;
        let demoted = demote_overloaded_sessions(grid, ctx, rng, needed);
        if demoted < needed {
            demote_random_sessions(grid, rng, needed - demoted);
        }
    }

    force_exact_total(grid, ctx, rng);
}

/// Strips excess occurrences of over-allocated subjects, then lets
/// under-allocated subjects consume free slots.
fn rebalance_subject_hours(
    grid: &mut TimetableGrid,
    ctx: &PlacementContext<'_>,
    rng: &mut dyn RngCore,
) {
    // Most over-allocated first.
    let mut over: Vec<(String, u32)> = ctx
        .catalog
        .iter()
        .filter_map(|s| {
            let actual = actual_hours(grid, s);
            (actual > s.total_hours()).then(|| (s.code.clone(), actual - s.total_hours()))
        })
        .collect();
    over.sort_by(|a, b| b.1.cmp(&a.1));

    for (code, mut excess) in over {
        // Days holding the most occurrences shed first; a day's only
        // occurrence stays put.
        let mut day_positions: Vec<(Day, Vec<usize>)> = Day::ALL
            .iter()
            .map(|&day| {
                let positions: Vec<usize> = (0..SLOTS_PER_DAY)
                    .filter(|&i| grid.get(day, i).is_theory_of(&code))
                    .collect();
                (day, positions)
            })
            .filter(|(_, p)| !p.is_empty())
            .collect();
        day_positions.sort_by(|a, b| b.1.len().cmp(&a.1.len()));

        for (day, positions) in day_positions {
            if positions.len() <= 1 {
                continue;
            }
            for index in positions {
                if excess == 0 {
                    break;
                }
                grid.set(day, index, SlotContent::Free);
                excess -= 1;
                debug!("released excess hour of {code} on {day} at session {}", index + 1);
            }
        }
    }

    // Largest shortfall first.
    let mut under: Vec<(String, u32)> = ctx
        .catalog
        .iter()
        .filter_map(|s| {
            let actual = actual_hours(grid, s);
            (actual < s.total_hours()).then(|| (s.code.clone(), s.total_hours() - actual))
        })
        .collect();
    under.sort_by(|a, b| b.1.cmp(&a.1));

    for (code, mut needed) in under {
        let mut open: Vec<SlotPos> = grid.positions_where(SlotContent::is_open);
        open.shuffle(rng);
        for (day, index) in open {
            if needed == 0 {
                break;
            }
            if !grid.get(day, index).is_open() {
                continue;
            }
            if grid.theory_count_on(day, &code) >= ctx.limits.max_sessions_per_day {
                continue;
            }
            grid.set(day, index, SlotContent::Theory(code.clone()));
            needed -= 1;
        }
    }
}

/// Demotes sessions of subjects that exceed the per-day cap, up to
/// `needed`. Returns the number demoted.
fn demote_overloaded_sessions(
    grid: &mut TimetableGrid,
    ctx: &PlacementContext<'_>,
    rng: &mut dyn RngCore,
    needed: u32,
) -> u32 {
    let mut candidates: Vec<SlotPos> = Vec::new();
    for &day in &Day::ALL {
        for subject in ctx.catalog.iter() {
            if grid.theory_count_on(day, &subject.code) > ctx.limits.max_sessions_per_day {
                for i in 0..SLOTS_PER_DAY {
                    if grid.get(day, i).is_theory_of(&subject.code) {
                        candidates.push((day, i));
                    }
                }
            }
        }
    }
    candidates.shuffle(rng);

    let mut demoted = 0;
    for (day, index) in candidates {
        if demoted >= needed {
            break;
        }
        grid.set(day, index, SlotContent::Free);
        demoted += 1;
    }
    demoted
}

/// Demotes arbitrary theory sessions to free periods.
fn demote_random_sessions(grid: &mut TimetableGrid, rng: &mut dyn RngCore, needed: u32) {
    let mut theory: Vec<SlotPos> =
        grid.positions_where(|c| matches!(c, SlotContent::Theory(_)));
    theory.shuffle(rng);
    for (day, index) in theory.into_iter().take(needed as usize) {
        grid.set(day, index, SlotContent::Free);
    }
}

/// Final correction: make the free-period total exactly the target.
///
/// Overshoot resolves by substituting a per-day and run-safe subject into
/// free slots, with `Additional Class` as the unconditional fallback;
/// undershoot converts theory (then fallback) slots to free periods.
fn force_exact_total(grid: &mut TimetableGrid, ctx: &PlacementContext<'_>, rng: &mut dyn RngCore) {
    let desired = ctx.desired_free_periods;
    let current = grid.total_free();

    if current > desired {
        let mut excess = current - desired;
        warn!("free periods still off target ({current} vs {desired}); forcing correction");

        let mut free_slots: Vec<SlotPos> = grid.positions_where(SlotContent::is_free);
        free_slots.shuffle(rng);
        for &(day, index) in &free_slots {
            if excess == 0 {
                break;
            }
            let valid: Vec<&Subject> = ctx
                .catalog
                .iter()
                .filter(|s| {
                    grid.theory_count_on(day, &s.code) < ctx.limits.max_sessions_per_day
                })
                .collect();
            match valid.choose(rng) {
                Some(subject) => {
                    if !grid.would_exceed_run(day, index, &subject.code, ctx.limits.max_consecutive)
                    {
                        grid.set(day, index, SlotContent::Theory(subject.code.clone()));
                        excess -= 1;
                    }
                    // A run-violating draw leaves this slot for a later pass.
                }
                None => {
                    grid.set(day, index, SlotContent::Fallback);
                    excess -= 1;
                }
            }
        }

        // Whatever survived the substitution pass becomes the fallback.
        if excess > 0 {
            let remaining: Vec<SlotPos> = grid.positions_where(SlotContent::is_free);
            for (day, index) in remaining.into_iter().take(excess as usize) {
                grid.set(day, index, SlotContent::Fallback);
            }
        }
    } else if current < desired {
        let mut short = desired - current;
        warn!("free periods still off target ({current} vs {desired}); forcing correction");

        let mut sessions: Vec<SlotPos> = grid.positions_where(|c| {
            matches!(c, SlotContent::Theory(_) | SlotContent::Fallback)
        });
        sessions.shuffle(rng);
        for (day, index) in sessions {
            if short == 0 {
                break;
            }
            grid.set(day, index, SlotContent::Free);
            short -= 1;
        }
        if short > 0 {
            warn!("could not reach the free-period target; still {short} short");
        }
    }
}

/// Phase 3: pull theory sessions into over-free days.
///
/// For every day above the per-day free cap, a session is moved from a
/// day with free headroom into one of this day's free slots, until the
/// cap holds or no donor day qualifies.
pub fn redistribute_free_periods(
    grid: &mut TimetableGrid,
    ctx: &PlacementContext<'_>,
    rng: &mut dyn RngCore,
) {
    let before = grid.total_free();

    for &day in &Day::ALL {
        while grid.free_count_on(day) > ctx.limits.max_free_per_day {
            if !pull_session_into(grid, day, ctx, rng) {
                warn!("no donor day can relieve {day} of its excess free periods");
                break;
            }
        }
    }

    debug_assert_eq!(before, grid.total_free());
    let _ = before;
}

/// Moves one theory session from a donor day into a free slot of `day`.
fn pull_session_into(
    grid: &mut TimetableGrid,
    day: Day,
    ctx: &PlacementContext<'_>,
    rng: &mut dyn RngCore,
) -> bool {
    let mut donors: Vec<Day> = Day::ALL
        .iter()
        .copied()
        .filter(|&d| d != day && grid.free_count_on(d) < ctx.limits.max_free_per_day)
        .collect();
    donors.shuffle(rng);

    for donor in donors {
        for source in 0..SLOTS_PER_DAY {
            let SlotContent::Theory(code) = grid.get(donor, source) else {
                continue;
            };
            let code = code.clone();
            if grid.theory_count_on(day, &code) >= ctx.limits.max_sessions_per_day {
                continue;
            }
            for target in 0..SLOTS_PER_DAY {
                if !grid.get(day, target).is_free() {
                    continue;
                }
                if grid.would_exceed_run(day, target, &code, ctx.limits.max_consecutive) {
                    continue;
                }
                grid.set(day, target, SlotContent::Theory(code.clone()));
                grid.set(donor, source, SlotContent::Free);
                debug!("moved a session of {code} from {donor} to {day}");
                return true;
            }
        }
    }
    false
}

/// Phase 4: break up triple runs, then demote per-day cap violations.
pub fn fix_consecutive_and_daily_caps(
    grid: &mut TimetableGrid,
    ctx: &PlacementContext<'_>,
    rng: &mut dyn RngCore,
) {
    for &day in &Day::ALL {
        // Triple runs of one subject.
        for i in 0..SLOTS_PER_DAY - 2 {
            let SlotContent::Theory(code) = grid.get(day, i) else {
                continue;
            };
            let code = code.clone();
            if !(grid.get(day, i + 1).is_theory_of(&code) && grid.get(day, i + 2).is_theory_of(&code))
            {
                continue;
            }
            warn!("three consecutive sessions of {code} on {day}; fixing");

            let mut others: Vec<String> = ctx
                .catalog
                .iter()
                .filter(|s| s.code != code)
                .filter(|s| {
                    grid.theory_count_on(day, &s.code) < ctx.limits.max_sessions_per_day
                })
                .map(|s| s.code.clone())
                .collect();
            others.shuffle(rng);

            let replacement = others
                .into_iter()
                .find(|other| {
                    !grid.would_exceed_run(day, i + 2, other, ctx.limits.max_consecutive)
                });
            match replacement {
                Some(other) => grid.set(day, i + 2, SlotContent::Theory(other)),
                None => grid.set(day, i + 2, SlotContent::Free),
            }
        }

        // Per-day cap: demote trailing occurrences.
        for subject in ctx.catalog.iter() {
            let count = grid.theory_count_on(day, &subject.code);
            if count <= ctx.limits.max_sessions_per_day {
                continue;
            }
            warn!(
                "{} appears {count} times on {day}; demoting to the cap of {}",
                subject.code, ctx.limits.max_sessions_per_day
            );
            let positions: Vec<usize> = (0..SLOTS_PER_DAY)
                .filter(|&i| grid.get(day, i).is_theory_of(&subject.code))
                .collect();
            for &index in &positions[ctx.limits.max_sessions_per_day as usize..] {
                grid.set(day, index, SlotContent::Free);
            }
        }
    }
}

/// Phase 5: place missing theory hours into free slots.
///
/// Lab shortfalls are logged only; rebuilding a lab block is out of reach
/// for a slot-by-slot repair.
pub fn ensure_required_hours(
    grid: &mut TimetableGrid,
    ctx: &PlacementContext<'_>,
    rng: &mut dyn RngCore,
) {
    for subject in ctx.catalog.iter() {
        if subject.lab_required && grid.lab_block_day(&subject.code).is_none() {
            warn!(
                "{} is missing its contiguous lab block; manual intervention needed",
                subject.code
            );
        }

        let placed = grid.theory_count(&subject.code);
        if placed >= subject.hours_per_week {
            continue;
        }
        let mut missing = subject.hours_per_week - placed;
        debug!("{} is short {missing} theory hours; repairing", subject.code);

        let mut free_slots: Vec<SlotPos> = grid.positions_where(SlotContent::is_free);
        free_slots.shuffle(rng);
        for (day, index) in free_slots {
            if missing == 0 {
                break;
            }
            if !grid.get(day, index).is_free() {
                continue;
            }
            if grid.theory_count_on(day, &subject.code) >= ctx.limits.max_sessions_per_day {
                continue;
            }
            if grid.would_exceed_run(day, index, &subject.code, ctx.limits.max_consecutive) {
                continue;
            }
            grid.set(day, index, SlotContent::Theory(subject.code.clone()));
            missing -= 1;
        }

        if missing > 0 {
            warn!("{} is still short {missing} hours after repair", subject.code);
        }
    }
}

/// Scheduled hours of a subject: theory sessions plus lab sessions.
fn actual_hours(grid: &TimetableGrid, subject: &Subject) -> u32 {
    grid.theory_count(&subject.code) + grid.lab_count(&subject.code)
}
