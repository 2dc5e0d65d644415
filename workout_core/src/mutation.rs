//! Functional updates on a parsed workout.
//!
//! Every function takes the workout by reference and returns a new value;
//! the input is never touched. An out-of-range index returns an unchanged
//! copy so chained updates keep working after an exercise was deleted
//! underneath us.

use crate::duration::format_duration;
use crate::parser::classify_duration;
use crate::types::*;

/// Name given to inserted rest periods
pub const REST_EXERCISE_NAME: &str = "Rest";

/// Set the value of the first parameter whose key matches exactly
pub fn update_param_value(
    workout: &ParsedWorkout,
    exercise_index: usize,
    key: &str,
    value: &str,
) -> ParsedWorkout {
    let mut next = workout.clone();
    let Some(exercise) = next.exercises.get_mut(exercise_index) else {
        return next;
    };
    let Some(param) = exercise.params.iter_mut().find(|p| p.key == key) else {
        tracing::debug!("No parameter {:?} on exercise {}", key, exercise_index);
        return next;
    };

    param.value = value.to_string();
    if is_duration_key(key) {
        classify_duration(exercise);
    }
    next
}

/// Set an exercise's state without touching any other exercise
pub fn update_exercise_state(
    workout: &ParsedWorkout,
    index: usize,
    state: ExerciseState,
) -> ParsedWorkout {
    let mut next = workout.clone();
    if let Some(exercise) = next.exercises.get_mut(index) {
        exercise.state = state;
    }
    next
}

/// Insert `exercise` right after `index`, shifting everything below it
fn insert_after(workout: &mut ParsedWorkout, index: usize, mut exercise: Exercise) {
    let anchor = workout.exercises[index].line_index;
    exercise.line_index = anchor + 1;

    for later in workout.exercises.iter_mut().skip(index + 1) {
        later.line_index += 1;
    }
    for line in workout
        .unparsed_lines
        .iter_mut()
        .filter(|l| l.line_index > anchor)
    {
        line.line_index += 1;
    }

    workout.exercises.insert(index + 1, exercise);
}

/// Duplicate an exercise as a fresh pending set right after it
///
/// A countdown exercise keeps its target as an editable value; any other
/// duration parameter belongs to the finished set and is dropped.
pub fn add_set(workout: &ParsedWorkout, index: usize) -> ParsedWorkout {
    let mut next = workout.clone();
    let Some(original) = next.exercises.get(index) else {
        return next;
    };

    let mut set = original.clone();
    set.state = ExerciseState::Pending;
    set.recorded_duration = None;

    match set.target_duration {
        Some(target) => {
            if let Some(param) = set.duration_param_mut() {
                param.value = format_duration(target);
                param.editable = true;
            }
        }
        None => set.params.retain(|p| !p.is_duration()),
    }

    insert_after(&mut next, index, set);
    next
}

/// Insert a pending countdown rest after `index`
///
/// `None` means the workout has no rest length configured; nothing is
/// inserted in that case.
pub fn add_rest(
    workout: &ParsedWorkout,
    index: usize,
    rest_duration: Option<u64>,
) -> ParsedWorkout {
    let mut next = workout.clone();
    let Some(rest_secs) = rest_duration else {
        tracing::debug!("No rest duration set, not adding a rest");
        return next;
    };
    if index >= next.exercises.len() {
        return next;
    }

    let mut rest = Exercise::new(REST_EXERCISE_NAME);
    rest.params
        .push(ExerciseParam::new("Duration", format_duration(rest_secs), true));
    rest.target_duration = Some(rest_secs);

    insert_after(&mut next, index, rest);
    next
}

/// Record the elapsed time of an exercise into its duration parameter
///
/// The recorded value replaces any target, so the exercise reads the same
/// as it will after the text is parsed again.
pub fn set_recorded_duration(
    workout: &ParsedWorkout,
    index: usize,
    duration: &str,
) -> ParsedWorkout {
    let mut next = workout.clone();
    let Some(exercise) = next.exercises.get_mut(index) else {
        return next;
    };

    match exercise.duration_param_mut() {
        Some(param) => {
            param.value = duration.to_string();
            param.editable = false;
        }
        None => exercise
            .params
            .push(ExerciseParam::new("Duration", duration, false)),
    }
    classify_duration(exercise);
    next
}

/// Lock every parameter of every exercise
pub fn lock_all_fields(workout: &ParsedWorkout) -> ParsedWorkout {
    let mut next = workout.clone();
    for param in next.exercises.iter_mut().flat_map(|e| e.params.iter_mut()) {
        param.editable = false;
    }
    next
}

/// Move the workout to `state` if that is a forward transition
pub fn set_workout_state(workout: &ParsedWorkout, state: WorkoutState) -> ParsedWorkout {
    let mut next = workout.clone();
    if next.metadata.state.can_transition_to(state) {
        next.metadata.state = state;
    } else {
        tracing::debug!(
            "Ignoring workout state change {:?} -> {:?}",
            next.metadata.state,
            state
        );
    }
    next
}

pub fn set_start_date(workout: &ParsedWorkout, start_date: &str) -> ParsedWorkout {
    let mut next = workout.clone();
    next.metadata.start_date = Some(start_date.to_string());
    next
}

/// Store the total workout duration; only a completed workout has one
pub fn set_workout_duration(workout: &ParsedWorkout, duration: &str) -> ParsedWorkout {
    let mut next = workout.clone();
    if next.metadata.state == WorkoutState::Completed {
        next.metadata.duration = Some(duration.to_string());
    }
    next
}
