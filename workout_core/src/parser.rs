//! Parser for the workout block text format.
//!
//! ```text
//! title: Leg Day
//! state: planned
//! ---
//! - [ ] Squat | Weight: [60] kg | Reps: [10]
//! - [ ] Plank | Duration: [1m 30s]
//! ```
//!
//! Parsing is total: lines that do not fit the grammar are kept aside
//! (metadata extras, unparsed exercise-section lines) instead of failing,
//! since the block may be half-edited when we read it.

use crate::duration::DurationValue;
use crate::types::*;
use once_cell::sync::Lazy;
use regex::Regex;

/// Line separating the metadata header from the exercise checklist
pub const SEPARATOR: &str = "---";

static CHECKLIST_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*[-*]\s+\[(.)\]\s?(.*)$").expect("checklist pattern is valid")
});

static CHECKLIST_START: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[-*]\s+\[").expect("checklist start pattern is valid"));

/// Parse the inner text of a workout block
pub fn parse_workout(text: &str) -> ParsedWorkout {
    let raw_lines: Vec<String> = text
        .split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l).to_string())
        .collect();

    let separator = raw_lines.iter().position(|l| l.trim() == SEPARATOR);
    let (metadata_end, exercise_start_line) = match separator {
        Some(idx) => (idx, idx + 1),
        None => {
            let first_item = raw_lines
                .iter()
                .position(|l| CHECKLIST_START.is_match(l))
                .unwrap_or(raw_lines.len());
            tracing::debug!(
                "No separator in workout block, exercises start at line {}",
                first_item
            );
            (first_item, first_item)
        }
    };

    let metadata = parse_metadata(&raw_lines[..metadata_end]);

    let mut exercises = Vec::new();
    let mut unparsed_lines = Vec::new();
    for (offset, line) in raw_lines.iter().enumerate().skip(exercise_start_line) {
        if line.trim().is_empty() {
            continue;
        }
        let line_index = offset - exercise_start_line;
        match parse_exercise_line(line) {
            Some(mut exercise) => {
                exercise.line_index = line_index;
                exercises.push(exercise);
            }
            None => {
                tracing::debug!("Keeping unparsed exercise line {}: {:?}", line_index, line);
                unparsed_lines.push(UnparsedLine {
                    line_index,
                    text: line.trim_end().to_string(),
                });
            }
        }
    }

    ParsedWorkout {
        metadata,
        exercises,
        raw_lines,
        exercise_start_line,
        unparsed_lines,
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn parse_metadata(lines: &[String]) -> WorkoutMetadata {
    let mut metadata = WorkoutMetadata::default();

    for line in lines {
        if line.trim().is_empty() {
            continue;
        }

        let Some((key, value)) = line.split_once(':') else {
            metadata.extra_lines.push(line.trim_end().to_string());
            continue;
        };

        match key.trim().to_lowercase().as_str() {
            "title" => metadata.title = non_empty(value),
            "state" => {
                metadata.state = WorkoutState::from_keyword(value).unwrap_or_else(|| {
                    tracing::debug!("Unknown workout state {:?}, assuming planned", value);
                    WorkoutState::Planned
                })
            }
            "startdate" => metadata.start_date = non_empty(value),
            "duration" => metadata.duration = non_empty(value),
            "restduration" => metadata.rest_duration = non_empty(value),
            _ => metadata.extra_lines.push(line.trim_end().to_string()),
        }
    }

    metadata
}

/// Parse one checklist line, or `None` if it is not one
pub fn parse_exercise_line(line: &str) -> Option<Exercise> {
    let caps = CHECKLIST_LINE.captures(line)?;
    let marker = caps.get(1)?.as_str().chars().next()?;
    let state = ExerciseState::from_marker(marker)?;
    let body = caps.get(2).map(|m| m.as_str()).unwrap_or("");

    let mut segments = body.split('|');
    let name = segments.next().unwrap_or("").trim().to_string();
    let params: Vec<ExerciseParam> = segments.map(parse_param).collect();

    let mut exercise = Exercise {
        state,
        name,
        params,
        target_duration: None,
        recorded_duration: None,
        line_index: 0,
    };
    classify_duration(&mut exercise);
    Some(exercise)
}

/// Derive `target_duration` / `recorded_duration` from the duration parameter
pub(crate) fn classify_duration(exercise: &mut Exercise) {
    exercise.target_duration = None;
    exercise.recorded_duration = None;

    let Some(param) = exercise.duration_param() else {
        return;
    };
    if param.value.trim().is_empty() {
        return;
    }

    match DurationValue::classify(&param.value) {
        DurationValue::Target(secs) => exercise.target_duration = Some(secs),
        DurationValue::Recorded(text) => exercise.recorded_duration = Some(text),
    }
}

fn parse_param(segment: &str) -> ExerciseParam {
    let segment = segment.trim();
    let Some((key, rest)) = segment.split_once(':') else {
        return ExerciseParam::new(segment, "", false);
    };
    let key = key.trim().to_string();
    let rest = rest.trim();

    if let Some(inner) = rest.strip_prefix('[') {
        if let Some(close) = inner.find(']') {
            let value = inner[..close].to_string();
            let unit = non_empty(&inner[close + 1..]);
            return ExerciseParam {
                key,
                value,
                editable: true,
                unit,
            };
        }
    }

    if is_duration_key(&key) {
        return ExerciseParam::new(key, rest, false);
    }

    match rest.split_once(char::is_whitespace) {
        Some((value, unit)) => ExerciseParam {
            key,
            value: value.to_string(),
            editable: false,
            unit: non_empty(unit),
        },
        None => ExerciseParam::new(key, rest, false),
    }
}
