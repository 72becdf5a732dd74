//! Weekly academic timetable generation engine.
//!
//! Computes one section's weekly timetable: every subject gets its weekly
//! hour budget (plus a contiguous 3-session lab block where required)
//! placed into a fixed 5x11 grid of sessions punctuated by two daily
//! breaks, under hard caps on per-day repetition, consecutive runs, and
//! free periods.
//!
//! # Modules
//!
//! - **`models`**: Domain types — `Subject`, `FacultyPreference`,
//!   `TimetableGrid`, `SlotContent`, `GenerationRequest`, `TimetableEntry`
//! - **`scheduler`**: The two placement algorithms behind one `Placer`
//!   trait (weighted greedy and bounded backtracking) plus the five-phase
//!   repair pipeline
//! - **`validation`**: Constraint validator with optional repair
//! - **`engine`**: The generation pipeline and the storage seam
//!
//! # Example
//!
//! ```
//! use timetable_engine::engine::TimetableEngine;
//! use timetable_engine::models::{GenerationRequest, Subject};
//!
//! let subjects = vec![
//!     Subject::new("CS601", "Algorithms", "Dr. Smith", 6),
//!     Subject::new("CS602", "Databases", "Dr. Johnson", 6).with_lab(),
//! ];
//! let request = GenerationRequest::new("CSE", "6", subjects).with_seed(42);
//!
//! let result = TimetableEngine::new().generate(&request).unwrap();
//! assert_eq!(result.entries.len(), 55);
//! ```
//!
//! # Determinism
//!
//! Every shuffle, jitter, and roulette draw routes through an injected
//! RNG; a request with a fixed `seed` reproduces its timetable exactly.

pub mod engine;
pub mod models;
pub mod scheduler;
pub mod validation;

pub use engine::{EngineError, GenerationResult, MemoryStore, TimetableEngine, TimetableStore};
pub use models::{
    day_slot_matrix, Day, FacultyPreference, GenerationRequest, PlacerKind, Subject,
    TimetableEntry,
};
pub use validation::{ValidationReport, Validator, Violation, ViolationKind};
