//! Sections of the ND-JSON import document and the transition rules
//! between them.
//!
//! The document is a flat sequence of lines. A line of the exact shape
//! `{"Section": "<name>"}` starts a new section; every other non-blank line
//! is data belonging to the most recently started section. This module has
//! no I/O: it classifies single lines and computes transitions so the
//! engine's state machine can be tested in isolation.

use serde::{Deserialize, Serialize};

use crate::checkpoint::ImportJobCheckpoint;

/// A section of the import document.
///
/// `None` is the state before any marker has been read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Section {
    #[default]
    None,
    Header,
    Models,
    Twins,
    Relationships,
}

impl Section {
    /// Name as it appears in a section marker line.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Header => "Header",
            Self::Models => "Models",
            Self::Twins => "Twins",
            Self::Relationships => "Relationships",
        }
    }

    /// Resolve a marker name (case-insensitive). `None` is never a valid marker.
    pub fn from_marker_name(name: &str) -> Option<Self> {
        [Self::Header, Self::Models, Self::Twins, Self::Relationships]
            .into_iter()
            .find(|s| s.as_str().eq_ignore_ascii_case(name))
    }

    /// Whether data lines in this section are applied to the graph store.
    pub fn carries_graph_data(self) -> bool {
        matches!(self, Self::Models | Self::Twins | Self::Relationships)
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of a section marker line.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SectionMarker {
    #[serde(rename = "Section")]
    section: String,
}

/// Classification of a single raw input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    /// Empty or whitespace-only.
    Blank,
    /// A marker naming a known section.
    Marker(Section),
    /// A marker whose section name is not recognised.
    UnknownMarker(String),
    /// Anything else: a data line for the current section.
    Data,
}

/// Classify a raw line without interpreting data lines.
///
/// Only lines mentioning the `"Section"` key are parsed, so data lines are
/// not deserialized twice.
pub fn classify_line(line: &str) -> LineKind {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return LineKind::Blank;
    }
    if !trimmed.starts_with('{') || !trimmed.contains("\"Section\"") {
        return LineKind::Data;
    }
    match serde_json::from_str::<SectionMarker>(trimmed) {
        Ok(marker) => match Section::from_marker_name(&marker.section) {
            Some(section) => LineKind::Marker(section),
            None => LineKind::UnknownMarker(marker.section),
        },
        Err(_) => LineKind::Data,
    }
}

/// Result of moving from one section to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Data section that is now finished and must be flushed/marked complete.
    pub completed: Option<Section>,
    /// Section that subsequent data lines belong to.
    pub entered: Section,
}

/// Compute the transition caused by a marker for `next` while in `current`.
///
/// Re-entering the current section (a repeated marker) completes nothing.
pub fn transition(current: Section, next: Section) -> Transition {
    let completed = (current != next && current.carries_graph_data()).then_some(current);
    Transition {
        completed,
        entered: next,
    }
}

/// Whether data lines for `section` must be discarded because an earlier run
/// already finished that section.
pub fn should_skip_section(section: Section, checkpoint: &ImportJobCheckpoint) -> bool {
    match section {
        Section::Models => checkpoint.models_completed,
        Section::Twins => checkpoint.twins_completed,
        Section::Relationships => checkpoint.relationships_completed,
        Section::None | Section::Header => false,
    }
}
