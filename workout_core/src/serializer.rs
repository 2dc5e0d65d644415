//! Serializer for the workout block text format.
//!
//! Output is canonical: known metadata keys in a fixed order, single spaces
//! around separators, time-literal targets in `format_duration` form.
//! Serializing an unchanged parse result twice yields identical text.

use crate::duration::{format_duration, parse_time_literal};
use crate::parser::SEPARATOR;
use crate::types::*;

/// Render a workout back into block text (without fences or trailing newline)
pub fn serialize_workout(workout: &ParsedWorkout) -> String {
    let mut lines = serialize_metadata(&workout.metadata);
    lines.push(SEPARATOR.to_string());

    let mut unparsed: Vec<&UnparsedLine> = workout.unparsed_lines.iter().collect();
    unparsed.sort_by_key(|l| l.line_index);
    let mut unparsed = unparsed.into_iter().peekable();

    for exercise in &workout.exercises {
        while let Some(line) = unparsed.next_if(|l| l.line_index < exercise.line_index) {
            lines.push(line.text.clone());
        }
        lines.push(serialize_exercise(exercise));
    }
    lines.extend(unparsed.map(|l| l.text.clone()));

    lines.join("\n")
}

fn serialize_metadata(metadata: &WorkoutMetadata) -> Vec<String> {
    let mut lines = Vec::new();

    if let Some(title) = &metadata.title {
        lines.push(format!("title: {}", title));
    }
    lines.push(format!("state: {}", metadata.state.as_str()));
    // startDate stays as an empty key so it can be filled in when started
    lines.push(key_line("startDate", metadata.start_date.as_deref()));
    if let Some(duration) = &metadata.duration {
        lines.push(format!("duration: {}", duration));
    }
    if let Some(rest) = &metadata.rest_duration {
        lines.push(format!("restDuration: {}", rest));
    }
    lines.extend(metadata.extra_lines.iter().cloned());

    lines
}

fn key_line(key: &str, value: Option<&str>) -> String {
    match value {
        Some(value) => format!("{}: {}", key, value),
        None => format!("{}:", key),
    }
}

/// Render one checklist line
pub fn serialize_exercise(exercise: &Exercise) -> String {
    let mut line = format!("- [{}] {}", exercise.state.marker(), exercise.name);
    for param in &exercise.params {
        line.push_str(" | ");
        line.push_str(&serialize_param(param));
    }
    line.trim_end().to_string()
}

fn serialize_param(param: &ExerciseParam) -> String {
    let value = if param.is_duration() {
        match parse_time_literal(&param.value) {
            Some(secs) => format_duration(secs),
            None => param.value.trim().to_string(),
        }
    } else {
        param.value.clone()
    };

    let mut out = format!("{}:", param.key);
    if param.editable {
        out.push_str(&format!(" [{}]", value));
    } else if !value.is_empty() {
        out.push(' ');
        out.push_str(&value);
    }
    if let Some(unit) = &param.unit {
        out.push(' ');
        out.push_str(unit);
    }
    out
}
