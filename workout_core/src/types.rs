//! Core domain types for workout blocks.
//!
//! This module defines the structured form of a workout block:
//! - Workout-level metadata and lifecycle state
//! - Exercises, their checklist state and parameters
//! - The parsed aggregate handed between codec, mutation engine and session

use serde::{Deserialize, Serialize};

// ============================================================================
// State Types
// ============================================================================

/// Lifecycle of a whole workout
///
/// Moves forward only: planned → started → completed.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkoutState {
    #[default]
    Planned,
    Started,
    Completed,
}

impl WorkoutState {
    /// Keyword used in the `state:` metadata line
    pub fn as_str(self) -> &'static str {
        match self {
            WorkoutState::Planned => "planned",
            WorkoutState::Started => "started",
            WorkoutState::Completed => "completed",
        }
    }

    /// Parse a `state:` keyword (case-insensitive)
    pub fn from_keyword(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "planned" => Some(WorkoutState::Planned),
            "started" => Some(WorkoutState::Started),
            "completed" => Some(WorkoutState::Completed),
            _ => None,
        }
    }

    fn rank(self) -> u8 {
        match self {
            WorkoutState::Planned => 0,
            WorkoutState::Started => 1,
            WorkoutState::Completed => 2,
        }
    }

    /// Whether moving to `next` is a forward transition
    pub fn can_transition_to(self, next: WorkoutState) -> bool {
        next.rank() > self.rank()
    }
}

/// Checklist state of one exercise line
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseState {
    #[default]
    Pending,
    InProgress,
    Completed,
    Skipped,
}

impl ExerciseState {
    /// Map a checklist marker character to a state
    pub fn from_marker(marker: char) -> Option<Self> {
        match marker {
            ' ' => Some(ExerciseState::Pending),
            '\\' => Some(ExerciseState::InProgress),
            'x' | 'X' => Some(ExerciseState::Completed),
            '-' => Some(ExerciseState::Skipped),
            _ => None,
        }
    }

    /// The marker character written between the checklist brackets
    pub fn marker(self) -> char {
        match self {
            ExerciseState::Pending => ' ',
            ExerciseState::InProgress => '\\',
            ExerciseState::Completed => 'x',
            ExerciseState::Skipped => '-',
        }
    }
}

// ============================================================================
// Metadata
// ============================================================================

/// Header of a workout block (the `key: value` lines above the separator)
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkoutMetadata {
    pub title: Option<String>,
    pub state: WorkoutState,
    pub start_date: Option<String>,
    /// Human-readable elapsed time, only present once completed
    pub duration: Option<String>,
    /// Default rest length as written (e.g. `60s` or `1m 30s`)
    pub rest_duration: Option<String>,
    /// Unknown keys and free lines, re-emitted verbatim
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_lines: Vec<String>,
}

impl WorkoutMetadata {
    /// Default rest length in seconds, if set and readable
    pub fn rest_duration_secs(&self) -> Option<u64> {
        self.rest_duration
            .as_deref()
            .and_then(crate::duration::parse_duration)
    }
}

// ============================================================================
// Exercise Types
// ============================================================================

/// Whether a parameter key names the special duration parameter
pub fn is_duration_key(key: &str) -> bool {
    key.trim().eq_ignore_ascii_case("duration")
}

/// One `Key: value unit` segment of an exercise line
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExerciseParam {
    pub key: String,
    pub value: String,
    /// Still awaiting input; written as `[value]`
    pub editable: bool,
    pub unit: Option<String>,
}

impl ExerciseParam {
    pub fn new(key: impl Into<String>, value: impl Into<String>, editable: bool) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            editable,
            unit: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn is_duration(&self) -> bool {
        is_duration_key(&self.key)
    }
}

/// One checklist line of the exercise section
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Exercise {
    pub state: ExerciseState,
    pub name: String,
    pub params: Vec<ExerciseParam>,
    /// Countdown target in seconds, from a bracketed time literal
    pub target_duration: Option<u64>,
    /// Elapsed time recorded when the exercise was finished
    pub recorded_duration: Option<String>,
    /// Line offset inside the exercise section
    pub line_index: usize,
}

impl Exercise {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            state: ExerciseState::Pending,
            name: name.into(),
            params: Vec::new(),
            target_duration: None,
            recorded_duration: None,
            line_index: 0,
        }
    }

    /// First parameter whose key matches case-insensitively
    pub fn param(&self, key: &str) -> Option<&ExerciseParam> {
        self.params.iter().find(|p| p.key.eq_ignore_ascii_case(key))
    }

    pub fn duration_param(&self) -> Option<&ExerciseParam> {
        self.params.iter().find(|p| p.is_duration())
    }

    pub fn duration_param_mut(&mut self) -> Option<&mut ExerciseParam> {
        self.params.iter_mut().find(|p| p.is_duration())
    }

    /// Parameters shown by generic renderers (everything but the duration)
    pub fn display_params(&self) -> impl Iterator<Item = &ExerciseParam> {
        self.params.iter().filter(|p| !p.is_duration())
    }

    /// Equal in everything but position
    pub fn same_content(&self, other: &Exercise) -> bool {
        self.state == other.state
            && self.name == other.name
            && self.params == other.params
            && self.target_duration == other.target_duration
            && self.recorded_duration == other.recorded_duration
    }
}

/// A line in the exercise section that is not a recognizable checklist line
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnparsedLine {
    pub line_index: usize,
    pub text: String,
}

// ============================================================================
// Parsed Workout
// ============================================================================

/// The structured form of one workout block
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParsedWorkout {
    pub metadata: WorkoutMetadata,
    /// In execution order
    pub exercises: Vec<Exercise>,
    /// The block text as it was parsed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub raw_lines: Vec<String>,
    /// Line (within the block) where the exercise section starts
    pub exercise_start_line: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unparsed_lines: Vec<UnparsedLine>,
}

impl ParsedWorkout {
    /// Index of the exercise currently in progress
    pub fn active_exercise_index(&self) -> Option<usize> {
        self.exercises
            .iter()
            .position(|e| e.state == ExerciseState::InProgress)
    }

    pub fn in_progress_count(&self) -> usize {
        self.exercises
            .iter()
            .filter(|e| e.state == ExerciseState::InProgress)
            .count()
    }

    /// Next pending exercise after `index`. Exercises above it are never
    /// revisited.
    pub fn next_pending_after(&self, index: usize) -> Option<usize> {
        self.exercises
            .iter()
            .enumerate()
            .skip(index + 1)
            .find(|(_, e)| e.state == ExerciseState::Pending)
            .map(|(i, _)| i)
    }

    /// First pending exercise in the list
    pub fn first_pending(&self) -> Option<usize> {
        self.exercises
            .iter()
            .position(|e| e.state == ExerciseState::Pending)
    }

    /// Equal in every semantic field, ignoring line positions and raw text
    pub fn same_content(&self, other: &ParsedWorkout) -> bool {
        self.metadata == other.metadata
            && self.exercises.len() == other.exercises.len()
            && self
                .exercises
                .iter()
                .zip(&other.exercises)
                .all(|(a, b)| a.same_content(b))
            && self
                .unparsed_lines
                .iter()
                .map(|l| l.text.as_str())
                .eq(other.unparsed_lines.iter().map(|l| l.text.as_str()))
    }
}
