//! Weekly grid model.
//!
//! The scheduling week is a fixed 5x11 matrix of sessions. Two sessions per
//! day are breaks (indices 3 and 7); they are written once at construction
//! and never change afterwards. Every other cell holds a [`SlotContent`]
//! variant; the transient `Unallocated` state must be gone by the time a
//! grid leaves the engine.
//!
//! Slot content is a tagged variant keyed by subject *code*. Display labels
//! such as `"Dr. Smith - CS601 Lab"` exist only at the output boundary
//! (see `SubjectCatalog::render`), so no component ever parses a label.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Sessions per day, breaks included.
pub const SLOTS_PER_DAY: usize = 11;
/// Zero-based index of the short (morning) break, session 4.
pub const MORNING_BREAK_INDEX: usize = 3;
/// Zero-based index of the long (afternoon) break, session 8.
pub const AFTERNOON_BREAK_INDEX: usize = 7;
/// Teachable sessions in the week: 5 * 11 minus 10 break sessions.
pub const EFFECTIVE_SLOTS_PER_WEEK: u32 = 45;
/// A lab always occupies one contiguous block of this many sessions.
pub const LAB_BLOCK_LEN: usize = 3;

/// Canonical label for an intentionally empty session.
pub const FREE_PERIOD: &str = "Free Period";
/// Canonical label for the morning break session.
pub const SHORT_BREAK: &str = "Short Break (11:00-11:30)";
/// Canonical label for the afternoon break session.
pub const LONG_BREAK: &str = "Long Break (1:45-2:30)";
/// Fallback label written when free-period correction has no valid subject.
pub const ADDITIONAL_CLASS: &str = "Additional Class";

/// Canonical session time labels, sessions 1..=11.
pub const DEFAULT_TIME_SLOTS: [&str; SLOTS_PER_DAY] = [
    "8:45-9:30",
    "9:30-10:15",
    "10:15-11:00",
    "11:00-11:30",
    "11:30-12:15",
    "12:15-1:00",
    "1:00-1:45",
    "1:45-2:30",
    "2:30-3:15",
    "3:15-4:00",
    "4:00-4:45",
];

/// Default break time labels. Break *positions* in the grid are fixed at
/// sessions 4 and 8 regardless of what the caller sends here.
pub const DEFAULT_BREAK_TIMES: [&str; 2] = ["11:00-11:30", "1:45-2:30"];

/// Scheduling limits shared by the placers, the repair passes, and the
/// validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    /// Sessions of one subject allowed per day (lab blocks exempt).
    pub max_sessions_per_day: u32,
    /// Longest allowed run of identical non-lab sessions within a day.
    pub max_consecutive: u32,
    /// Free periods allowed per day.
    pub max_free_per_day: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_sessions_per_day: 2,
            max_consecutive: 2,
            max_free_per_day: 3,
        }
    }
}

impl Limits {
    /// Default limits with a caller-supplied per-day session cap.
    pub fn with_max_sessions_per_day(max_sessions_per_day: u32) -> Self {
        Self {
            max_sessions_per_day,
            ..Self::default()
        }
    }
}

/// A teaching day.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Day {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
}

impl Day {
    /// All teaching days in week order.
    pub const ALL: [Day; 5] = [
        Day::Monday,
        Day::Tuesday,
        Day::Wednesday,
        Day::Thursday,
        Day::Friday,
    ];

    /// Day name as it appears in requests and output rows.
    pub fn name(self) -> &'static str {
        match self {
            Day::Monday => "Monday",
            Day::Tuesday => "Tuesday",
            Day::Wednesday => "Wednesday",
            Day::Thursday => "Thursday",
            Day::Friday => "Friday",
        }
    }

    /// Position within the week, 0-based.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which of the two daily breaks a break slot is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakKind {
    Short,
    Long,
}

impl BreakKind {
    /// Canonical display label.
    pub fn label(self) -> &'static str {
        match self {
            BreakKind::Short => SHORT_BREAK,
            BreakKind::Long => LONG_BREAK,
        }
    }
}

/// Content of a single grid cell.
///
/// `Theory` and `Lab` carry the subject code; rendering to a display label
/// goes through the subject catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotContent {
    /// Transient marker for a cell no placer has touched yet.
    Unallocated,
    /// An intentionally empty session.
    Free,
    /// One of the two fixed daily breaks.
    Break(BreakKind),
    /// A theory session of the subject with this code.
    Theory(String),
    /// One session of a subject's lab block.
    Lab(String),
    /// The "Additional Class" fallback written by free-period correction.
    Fallback,
}

impl SlotContent {
    /// Whether this cell is a free period.
    #[inline]
    pub fn is_free(&self) -> bool {
        matches!(self, SlotContent::Free)
    }

    /// Whether a placer may write into this cell (free or untouched).
    #[inline]
    pub fn is_open(&self) -> bool {
        matches!(self, SlotContent::Free | SlotContent::Unallocated)
    }

    /// Whether this cell is one of the fixed breaks.
    #[inline]
    pub fn is_break(&self) -> bool {
        matches!(self, SlotContent::Break(_))
    }

    /// Whether this cell belongs to a lab block. Lab cells are immovable.
    #[inline]
    pub fn is_lab(&self) -> bool {
        matches!(self, SlotContent::Lab(_))
    }

    /// Whether this is a theory session of the given subject.
    #[inline]
    pub fn is_theory_of(&self, code: &str) -> bool {
        matches!(self, SlotContent::Theory(c) if c == code)
    }

    /// Subject code for a theory cell.
    pub fn theory_code(&self) -> Option<&str> {
        match self {
            SlotContent::Theory(c) => Some(c),
            _ => None,
        }
    }

    /// Subject code for a theory or lab cell.
    pub fn subject_code(&self) -> Option<&str> {
        match self {
            SlotContent::Theory(c) | SlotContent::Lab(c) => Some(c),
            _ => None,
        }
    }
}

/// A `(day, slot index)` coordinate. Used by repair passes to collect and
/// shuffle candidate positions.
pub type SlotPos = (Day, usize);

/// The 5x11 weekly grid.
///
/// Break cells are fixed at construction; [`TimetableGrid::set`] refuses to
/// overwrite them, so the break invariant holds for the grid's lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct TimetableGrid {
    slots: [[SlotContent; SLOTS_PER_DAY]; 5],
}

impl Default for TimetableGrid {
    fn default() -> Self {
        Self::new()
    }
}

impl TimetableGrid {
    /// Creates the empty weekly grid: breaks fixed, everything else
    /// `Unallocated`.
    pub fn new() -> Self {
        let day = std::array::from_fn(|i| {
            if i == MORNING_BREAK_INDEX {
                SlotContent::Break(BreakKind::Short)
            } else if i == AFTERNOON_BREAK_INDEX {
                SlotContent::Break(BreakKind::Long)
            } else {
                SlotContent::Unallocated
            }
        });
        Self {
            slots: std::array::from_fn(|_| day.clone()),
        }
    }

    /// Whether `index` is one of the two fixed break positions.
    #[inline]
    pub fn is_break_index(index: usize) -> bool {
        index == MORNING_BREAK_INDEX || index == AFTERNOON_BREAK_INDEX
    }

    /// Cell content at `(day, index)`.
    #[inline]
    pub fn get(&self, day: Day, index: usize) -> &SlotContent {
        &self.slots[day.index()][index]
    }

    /// Writes `content` at `(day, index)`. Writes to a break index are
    /// ignored; breaks are immutable after construction.
    pub fn set(&mut self, day: Day, index: usize, content: SlotContent) {
        debug_assert!(!Self::is_break_index(index), "write to a break slot");
        if Self::is_break_index(index) {
            return;
        }
        self.slots[day.index()][index] = content;
    }

    /// One day's 11 cells.
    #[inline]
    pub fn day(&self, day: Day) -> &[SlotContent; SLOTS_PER_DAY] {
        &self.slots[day.index()]
    }

    /// Iterates every cell in day-major, index-ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (Day, usize, &SlotContent)> {
        Day::ALL.iter().flat_map(move |&day| {
            self.slots[day.index()]
                .iter()
                .enumerate()
                .map(move |(i, c)| (day, i, c))
        })
    }

    /// All positions whose content satisfies `pred`, in grid order.
    pub fn positions_where<F>(&self, pred: F) -> Vec<SlotPos>
    where
        F: Fn(&SlotContent) -> bool,
    {
        self.iter()
            .filter(|(_, _, c)| pred(c))
            .map(|(d, i, _)| (d, i))
            .collect()
    }

    /// Theory sessions of `code` on `day`.
    pub fn theory_count_on(&self, day: Day, code: &str) -> u32 {
        self.day(day)
            .iter()
            .filter(|c| c.is_theory_of(code))
            .count() as u32
    }

    /// Free periods on `day`.
    pub fn free_count_on(&self, day: Day) -> u32 {
        self.day(day).iter().filter(|c| c.is_free()).count() as u32
    }

    /// Writable cells (free or unallocated) on `day`.
    pub fn open_count_on(&self, day: Day) -> u32 {
        self.day(day).iter().filter(|c| c.is_open()).count() as u32
    }

    /// Free periods in the whole week.
    pub fn total_free(&self) -> u32 {
        self.iter().filter(|(_, _, c)| c.is_free()).count() as u32
    }

    /// Unallocated cells in the whole week.
    pub fn total_unallocated(&self) -> u32 {
        self.iter()
            .filter(|(_, _, c)| matches!(c, SlotContent::Unallocated))
            .count() as u32
    }

    /// Theory sessions of `code` in the whole week.
    pub fn theory_count(&self, code: &str) -> u32 {
        self.iter().filter(|(_, _, c)| c.is_theory_of(code)).count() as u32
    }

    /// Lab sessions of `code` in the whole week.
    pub fn lab_count(&self, code: &str) -> u32 {
        self.iter()
            .filter(|(_, _, c)| matches!(c, SlotContent::Lab(l) if l == code))
            .count() as u32
    }

    /// Whether `day` already hosts any lab block.
    pub fn day_has_lab(&self, day: Day) -> bool {
        self.day(day).iter().any(|c| c.is_lab())
    }

    /// Length of the run of cells equal to `content` that placing `content`
    /// at `(day, index)` would produce (neighbours before + after + 1).
    pub fn run_with(&self, day: Day, index: usize, content: &SlotContent) -> u32 {
        let slots = self.day(day);
        let mut run = 1;
        let mut i = index;
        while i > 0 && &slots[i - 1] == content {
            run += 1;
            i -= 1;
        }
        let mut j = index;
        while j + 1 < SLOTS_PER_DAY && &slots[j + 1] == content {
            run += 1;
            j += 1;
        }
        run
    }

    /// Whether a theory session of `code` at `(day, index)` would exceed
    /// the consecutive-run limit.
    pub fn would_exceed_run(&self, day: Day, index: usize, code: &str, max_consecutive: u32) -> bool {
        self.run_with(day, index, &SlotContent::Theory(code.to_string())) > max_consecutive
    }

    /// Whether the block `[start, start + len)` on `day` avoids both break
    /// indices and is entirely open.
    pub fn block_fits(&self, day: Day, start: usize, len: usize) -> bool {
        if start + len > SLOTS_PER_DAY {
            return false;
        }
        (start..start + len)
            .all(|i| !Self::is_break_index(i) && self.get(day, i).is_open())
    }

    /// The day hosting the contiguous lab block of `code`, if the block is
    /// complete (exactly [`LAB_BLOCK_LEN`] adjacent lab cells on one day).
    pub fn lab_block_day(&self, code: &str) -> Option<Day> {
        for &day in &Day::ALL {
            let slots = self.day(day);
            let mut run = 0usize;
            let mut best = 0usize;
            for c in slots.iter() {
                if matches!(c, SlotContent::Lab(l) if l == code) {
                    run += 1;
                    best = best.max(run);
                } else {
                    run = 0;
                }
            }
            if best == LAB_BLOCK_LEN && self.lab_count_on(day, code) as usize == LAB_BLOCK_LEN {
                return Some(day);
            }
        }
        None
    }

    fn lab_count_on(&self, day: Day, code: &str) -> u32 {
        self.day(day)
            .iter()
            .filter(|c| matches!(c, SlotContent::Lab(l) if l == code))
            .count() as u32
    }
}
