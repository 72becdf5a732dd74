//! Timetabling domain models.
//!
//! Provides the core data types for representing one section's weekly
//! timetable: the subject catalog, faculty preferences, the 5x11 grid with
//! its fixed breaks, and the request/entry types at the engine boundary.
//!
//! Slot content is a tagged variant ([`SlotContent`]); canonical string
//! labels appear only in [`TimetableEntry`] rows produced at the output
//! boundary.

mod grid;
mod preference;
mod request;
mod subject;

pub use grid::{
    BreakKind, Day, Limits, SlotContent, SlotPos, TimetableGrid, ADDITIONAL_CLASS,
    AFTERNOON_BREAK_INDEX, DEFAULT_BREAK_TIMES, DEFAULT_TIME_SLOTS, EFFECTIVE_SLOTS_PER_WEEK,
    FREE_PERIOD, LAB_BLOCK_LEN, LONG_BREAK, MORNING_BREAK_INDEX, SHORT_BREAK, SLOTS_PER_DAY,
};
pub use preference::{FacultyPreference, PreferenceSet};
pub use request::{day_slot_matrix, GenerationRequest, PlacerKind, TimetableEntry};
pub use subject::{Subject, SubjectCatalog};
