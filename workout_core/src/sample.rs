//! Built-in sample workout for first-time users.

use crate::types::*;

/// Builds the sample workout inserted into an empty block
pub fn create_sample_workout() -> ParsedWorkout {
    let metadata = WorkoutMetadata {
        title: Some("Sample Workout".into()),
        state: WorkoutState::Planned,
        start_date: None,
        duration: None,
        rest_duration: Some("1m 30s".into()),
        extra_lines: Vec::new(),
    };

    let exercises = vec![
        exercise(
            "Squat",
            vec![
                ExerciseParam::new("Weight", "60", true).with_unit("kg"),
                ExerciseParam::new("Reps", "10", true),
            ],
            None,
        ),
        exercise("Push-up", vec![ExerciseParam::new("Reps", "15", true)], None),
        exercise(
            "Plank",
            vec![ExerciseParam::new("Duration", "1m 0s", true)],
            Some(60),
        ),
        exercise(
            "Dumbbell Row",
            vec![
                ExerciseParam::new("Weight", "20", true).with_unit("kg"),
                ExerciseParam::new("Reps", "12", true),
            ],
            None,
        ),
    ];

    let exercises = exercises
        .into_iter()
        .enumerate()
        .map(|(line_index, e)| Exercise { line_index, ..e })
        .collect();

    ParsedWorkout {
        metadata,
        exercises,
        raw_lines: Vec::new(),
        // title, state, startDate, restDuration, separator
        exercise_start_line: 5,
        unparsed_lines: Vec::new(),
    }
}

fn exercise(name: &str, params: Vec<ExerciseParam>, target_duration: Option<u64>) -> Exercise {
    Exercise {
        params,
        target_duration,
        ..Exercise::new(name)
    }
}
