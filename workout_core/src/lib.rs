#![forbid(unsafe_code)]

//! Core model and logic for markdown workout blocks.
//!
//! This crate provides:
//! - Domain types (workouts, exercises, parameters)
//! - Lossless block codec (parser and serializer)
//! - Pure workout mutations
//! - Timer engine with pause, countdown and overtime
//! - Host documents and the session that drives them

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod duration;
pub mod parser;
pub mod serializer;
pub mod mutation;
pub mod sample;
pub mod timer;
pub mod host;
pub mod session;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use config::Config;
pub use duration::{
    format_duration, format_duration_human, format_signed_duration, parse_duration,
    parse_time_literal,
};
pub use parser::parse_workout;
pub use serializer::serialize_workout;
pub use mutation::{
    add_rest, add_set, lock_all_fields, set_recorded_duration, set_start_date,
    set_workout_duration, set_workout_state, update_exercise_state, update_param_value,
};
pub use sample::create_sample_workout;
pub use timer::{Clock, ManualClock, SystemClock, TimerEngine, TimerState};
pub use host::{BlockLocation, HostDocument, MarkdownFile, MemoryDocument};
pub use session::{RenderContext, WorkoutCallbacks, WorkoutSession};
