//! Subject model.
//!
//! A subject is a read-only input to the engine: a weekly hour budget, a
//! teaching faculty, and optionally a contiguous lab requirement. Identity
//! is the `code`; names and faculties exist for label rendering only.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::grid::{SlotContent, ADDITIONAL_CLASS, FREE_PERIOD};

/// A subject to be scheduled.
///
/// Wire format matches the request API: `camelCase` keys such as
/// `hoursPerWeek` and `labRequired`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    /// Unique subject code (scheduling identity).
    pub code: String,
    /// Human-readable name.
    pub name: String,
    /// Teaching faculty identifier.
    pub faculty: String,
    /// Weekly theory hour budget.
    pub hours_per_week: u32,
    /// Whether the subject needs one contiguous 3-session lab block.
    pub lab_required: bool,
    /// Owning department (opaque passthrough).
    #[serde(default)]
    pub department: String,
    /// Whether the subject may be scheduled at all.
    #[serde(default = "default_available")]
    pub available: bool,
    /// Stand-in faculty, if one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternate_faculty: Option<String>,
}

fn default_available() -> bool {
    true
}

impl Subject {
    /// Creates a theory-only subject.
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        faculty: impl Into<String>,
        hours_per_week: u32,
    ) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            faculty: faculty.into(),
            hours_per_week,
            lab_required: false,
            department: String::new(),
            available: true,
            alternate_faculty: None,
        }
    }

    /// Marks the subject as requiring a lab block.
    pub fn with_lab(mut self) -> Self {
        self.lab_required = true;
        self
    }

    /// Sets the owning department.
    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = department.into();
        self
    }

    /// Sets the stand-in faculty.
    pub fn with_alternate_faculty(mut self, faculty: impl Into<String>) -> Self {
        self.alternate_faculty = Some(faculty.into());
        self
    }

    /// Sets availability. Unavailable subjects are skipped by the engine.
    pub fn with_available(mut self, available: bool) -> Self {
        self.available = available;
        self
    }

    /// Display label for theory sessions: `"{faculty} - {name}"`.
    pub fn theory_label(&self) -> String {
        format!("{} - {}", self.faculty, self.name)
    }

    /// Display label for lab sessions: `"{faculty} - {name} Lab"`.
    pub fn lab_label(&self) -> String {
        format!("{} - {} Lab", self.faculty, self.name)
    }

    /// Weekly demand including the lab block.
    pub fn total_hours(&self) -> u32 {
        if self.lab_required {
            self.hours_per_week + 3
        } else {
            self.hours_per_week
        }
    }
}

/// Ordered, code-indexed view over the subjects of one generation call.
///
/// Iteration order is insertion order, so every pass that walks "all
/// subjects" is deterministic under a fixed RNG seed.
#[derive(Debug, Clone, Default)]
pub struct SubjectCatalog {
    subjects: Vec<Subject>,
    index: HashMap<String, usize>,
}

impl SubjectCatalog {
    /// Builds a catalog from a subject list. Later duplicates of a code are
    /// ignored.
    pub fn new(subjects: &[Subject]) -> Self {
        let mut catalog = Self::default();
        for s in subjects {
            if !catalog.index.contains_key(&s.code) {
                catalog.index.insert(s.code.clone(), catalog.subjects.len());
                catalog.subjects.push(s.clone());
            }
        }
        catalog
    }

    /// Looks a subject up by code.
    pub fn get(&self, code: &str) -> Option<&Subject> {
        self.index.get(code).map(|&i| &self.subjects[i])
    }

    /// All subjects in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Subject> {
        self.subjects.iter()
    }

    /// Subjects that require a lab block, in insertion order.
    pub fn lab_subjects(&self) -> impl Iterator<Item = &Subject> {
        self.subjects.iter().filter(|s| s.lab_required)
    }

    /// Number of subjects.
    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }

    /// Sum of weekly hours, lab blocks included.
    pub fn total_subject_hours(&self) -> u32 {
        self.subjects.iter().map(Subject::total_hours).sum()
    }

    /// Renders a slot to its canonical display label.
    ///
    /// A code missing from the catalog renders as the bare code; that can
    /// only happen if a grid was built against a different subject list.
    pub fn render(&self, content: &SlotContent) -> String {
        match content {
            SlotContent::Free => FREE_PERIOD.to_string(),
            SlotContent::Break(kind) => kind.label().to_string(),
            SlotContent::Fallback => ADDITIONAL_CLASS.to_string(),
            SlotContent::Theory(code) => self
                .get(code)
                .map(Subject::theory_label)
                .unwrap_or_else(|| code.clone()),
            SlotContent::Lab(code) => self
                .get(code)
                .map(Subject::lab_label)
                .unwrap_or_else(|| code.clone()),
            SlotContent::Unallocated => "UNALLOCATED".to_string(),
        }
    }
}
