//! Running a workout block: user actions in, rewritten text out.
//!
//! A `WorkoutSession` owns the parsed form of one block and drives it with
//! the mutation engine and the timer engine, then writes the serialized
//! result back through its `HostDocument`. For every exercise advance the
//! timer is reset before the new text is written, so nothing ever renders a
//! fresh exercise against the previous one's elapsed time.
//!
//! Write failures are logged and skipped; the in-memory workout stays as it
//! is and the next action re-resolves the block.

use crate::duration::format_duration_human;
use crate::host::{BlockLocation, HostDocument};
use crate::mutation;
use crate::parser::parse_workout;
use crate::sample::create_sample_workout;
use crate::serializer::serialize_workout;
use crate::timer::{TimerEngine, TimerState};
use crate::types::*;
use crate::{Config, Error, Result};
use chrono::{DateTime, Local, NaiveDateTime, Utc};

/// Actions a renderer can trigger on a workout
pub trait WorkoutCallbacks {
    fn start_workout(&mut self);
    fn finish_workout(&mut self);
    fn finish_exercise(&mut self, index: usize);
    fn skip_exercise(&mut self, index: usize);
    fn add_set(&mut self, index: usize);
    fn add_rest(&mut self, index: usize);
    fn change_param(&mut self, index: usize, key: &str, value: &str);
    fn pause_exercise(&mut self);
    fn resume_exercise(&mut self);
    fn flush_pending_edits(&mut self);
    fn add_sample(&mut self);
}

/// Everything a renderer needs for one frame
pub struct RenderContext<'a> {
    /// Copy of the workout at render time
    pub workout: ParsedWorkout,
    pub callbacks: &'a mut dyn WorkoutCallbacks,
    pub timer: Option<TimerState>,
}

/// One workout block being viewed or executed
pub struct WorkoutSession<H: HostDocument> {
    host: H,
    location: BlockLocation,
    id: String,
    timers: TimerEngine,
    workout: ParsedWorkout,
    expected_title: Option<String>,
    pending_edits: bool,
    /// Last write found the block gone from `location`
    stale: bool,
    start_date_format: String,
}

impl<H: HostDocument> WorkoutSession<H> {
    /// Read the block at `location` and line the timer up with it
    pub fn open(host: H, location: BlockLocation, timers: TimerEngine) -> Result<Self> {
        Self::open_with_config(host, location, timers, &Config::default())
    }

    /// Like `open`, writing and reading `startDate` in the configured format
    pub fn open_with_config(
        host: H,
        location: BlockLocation,
        timers: TimerEngine,
        config: &Config,
    ) -> Result<Self> {
        let text = host.read_block(&location)?;
        let mut session = Self {
            id: location.workout_id(),
            host,
            location,
            timers,
            workout: ParsedWorkout::default(),
            expected_title: None,
            pending_edits: false,
            stale: false,
            start_date_format: config.document.start_date_format.clone(),
        };
        session.sync_from_text(&text);
        Ok(session)
    }

    pub fn workout(&self) -> &ParsedWorkout {
        &self.workout
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn location(&self) -> &BlockLocation {
        &self.location
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn timers(&self) -> &TimerEngine {
        &self.timers
    }

    pub fn timer_state(&self) -> Option<TimerState> {
        self.timers.get_timer_state(&self.id)
    }

    pub fn has_pending_edits(&self) -> bool {
        self.pending_edits
    }

    pub fn render_context(&mut self) -> RenderContext<'_> {
        RenderContext {
            workout: self.workout.clone(),
            timer: self.timer_state(),
            callbacks: self,
        }
    }

    /// Re-read the block after the host document changed underneath us
    pub fn reload(&mut self) -> Result<()> {
        let text = match self.host.read_block(&self.location) {
            Err(Error::BlockNotFound(_)) if self.resolve_location() => {
                self.host.read_block(&self.location)?
            }
            other => other?,
        };
        self.stale = false;
        self.sync_from_text(&text);
        Ok(())
    }

    /// Look the block up again by title after it moved in the document
    ///
    /// Picks the block with the expected title closest to where this one
    /// used to start. Returns false if no block carries the title.
    fn resolve_location(&mut self) -> bool {
        let blocks = match self.host.blocks() {
            Ok(blocks) => blocks,
            Err(e) => {
                tracing::warn!("Cannot rescan document for workout {}: {}", self.id, e);
                return false;
            }
        };

        let previous = self.location.start_line;
        let found = blocks
            .into_iter()
            .filter(|location| {
                self.host
                    .read_block(location)
                    .map(|text| parse_workout(&text).metadata.title == self.expected_title)
                    .unwrap_or(false)
            })
            .min_by_key(|location| location.start_line.abs_diff(previous));

        match found {
            Some(location) => {
                tracing::info!(
                    "Workout {} moved from line {} to line {}",
                    self.id,
                    previous,
                    location.start_line
                );
                self.location = location;
                self.stale = false;
                true
            }
            None => {
                tracing::debug!("No block titled {:?} for workout {}", self.expected_title, self.id);
                false
            }
        }
    }

    /// Called on every user action: if the last write lost the block, find
    /// it again and write what it missed
    fn recover(&mut self) {
        if self.stale && self.resolve_location() && self.pending_edits {
            self.persist();
        }
    }

    /// Adopt `text` as the current block content and reconcile the timer
    pub fn sync_from_text(&mut self, text: &str) {
        self.workout = parse_workout(text);
        self.expected_title = self.workout.metadata.title.clone();
        self.pending_edits = false;
        self.reconcile_timer();
    }

    fn reconcile_timer(&mut self) {
        if self.workout.metadata.state != WorkoutState::Started {
            if self.timers.stop_workout_timer(&self.id) {
                tracing::info!("Workout {} is no longer running, timer stopped", self.id);
            }
            return;
        }

        let active = self.workout.active_exercise_index();
        if !self.timers.is_timer_running(&self.id) {
            let started_at = self
                .workout
                .metadata
                .start_date
                .as_deref()
                .and_then(|s| self.parse_start_date(s))
                .unwrap_or_else(|| self.timers.now());
            self.timers
                .start_workout_timer_at(&self.id, active.unwrap_or(0), started_at);
            tracing::info!("Resumed timer for started workout {}", self.id);
        } else if let Some(index) = active {
            if self.timers.get_active_exercise_index(&self.id) != Some(index) {
                tracing::debug!("Re-aligning workout {} to exercise {}", self.id, index);
                self.timers.set_active_exercise_index(&self.id, index);
            }
        }
        self.sync_timer_target();
    }

    fn sync_timer_target(&self) {
        let target = self
            .workout
            .active_exercise_index()
            .and_then(|i| self.workout.exercises[i].target_duration);
        self.timers.set_target_duration(&self.id, target);
    }

    fn format_now(&self) -> String {
        self.timers
            .now()
            .with_timezone(&Local)
            .format(&self.start_date_format)
            .to_string()
    }

    fn parse_start_date(&self, text: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(text, &self.start_date_format)
            .ok()?
            .and_local_timezone(Local)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Serialize and write the block; false if the host refused
    fn persist(&mut self) -> bool {
        let content = serialize_workout(&self.workout);
        match self
            .host
            .replace_block(&self.location, self.expected_title.as_deref(), &content)
        {
            Ok(location) => {
                self.location = location;
                self.expected_title = self.workout.metadata.title.clone();
                self.pending_edits = false;
                true
            }
            Err(e) => {
                tracing::warn!("Skipping write of workout {}: {}", self.id, e);
                self.stale = matches!(e, Error::BlockNotFound(_));
                self.pending_edits = true;
                false
            }
        }
    }

    fn is_started(&self) -> bool {
        self.workout.metadata.state == WorkoutState::Started
    }

    fn is_active(&self, index: usize) -> bool {
        self.is_started()
            && self
                .workout
                .exercises
                .get(index)
                .map_or(false, |e| e.state == ExerciseState::InProgress)
    }

    /// Elapsed seconds on `index` if it is the timer's active exercise
    fn exercise_elapsed(&self, index: usize) -> u64 {
        self.timer_state()
            .filter(|s| s.active_exercise_index == index)
            .map_or(0, |s| s.exercise_elapsed)
    }

    /// Close the active exercise as completed or skipped
    fn close_exercise(&mut self, index: usize, state: ExerciseState) {
        let elapsed = self.exercise_elapsed(index);
        if state == ExerciseState::Completed || elapsed > 0 {
            self.workout = mutation::set_recorded_duration(
                &self.workout,
                index,
                &format_duration_human(elapsed),
            );
        }
        self.workout = mutation::update_exercise_state(&self.workout, index, state);
    }

    /// Make `index` the active exercise: timer first, then text
    fn activate(&mut self, index: usize) {
        self.timers.advance_exercise(&self.id, index);
        self.workout =
            mutation::update_exercise_state(&self.workout, index, ExerciseState::InProgress);
        self.sync_timer_target();
        self.persist();
    }

    fn advance_from(&mut self, index: usize) {
        match self.workout.next_pending_after(index) {
            Some(next) => self.activate(next),
            None => self.complete_workout(),
        }
    }

    fn complete_workout(&mut self) {
        let elapsed = self.timer_state().map_or(0, |s| s.workout_elapsed);
        let duration = format_duration_human(elapsed);

        self.workout = mutation::set_workout_state(&self.workout, WorkoutState::Completed);
        self.workout = mutation::set_workout_duration(&self.workout, &duration);
        self.workout = mutation::lock_all_fields(&self.workout);
        self.timers.stop_workout_timer(&self.id);

        tracing::info!("Workout {} completed in {}", self.id, duration);
        self.persist();
    }

    /// Shared flow for add-set and add-rest on the active exercise
    fn insert_and_continue(&mut self, index: usize, inserted: ParsedWorkout) {
        if inserted.exercises.len() == self.workout.exercises.len() {
            return;
        }

        if self.is_active(index) {
            let elapsed = self.exercise_elapsed(index);
            self.workout = inserted;
            self.workout = mutation::set_recorded_duration(
                &self.workout,
                index,
                &format_duration_human(elapsed),
            );
            self.workout =
                mutation::update_exercise_state(&self.workout, index, ExerciseState::Completed);
            self.activate(index + 1);
        } else {
            self.workout = inserted;
            self.persist();
        }
    }
}

impl<H: HostDocument> WorkoutCallbacks for WorkoutSession<H> {
    fn start_workout(&mut self) {
        self.recover();
        if self.workout.metadata.state != WorkoutState::Planned {
            tracing::debug!("Workout {} already started", self.id);
            return;
        }

        let first = self.workout.first_pending();
        let start_date = self.format_now();
        self.workout = mutation::set_workout_state(&self.workout, WorkoutState::Started);
        self.workout = mutation::set_start_date(&self.workout, &start_date);
        if let Some(index) = first {
            self.workout =
                mutation::update_exercise_state(&self.workout, index, ExerciseState::InProgress);
        }

        if !self.timers.is_timer_running(&self.id) {
            self.timers.start_workout_timer(&self.id, first.unwrap_or(0));
        }
        self.sync_timer_target();

        tracing::info!("Workout {} started", self.id);
        self.persist();
    }

    fn finish_workout(&mut self) {
        self.recover();
        if !self.is_started() {
            return;
        }
        if let Some(index) = self.workout.active_exercise_index() {
            self.close_exercise(index, ExerciseState::Completed);
        }
        self.complete_workout();
    }

    fn finish_exercise(&mut self, index: usize) {
        self.recover();
        if !self.is_active(index) {
            tracing::debug!("Exercise {} is not active, ignoring finish", index);
            return;
        }
        self.close_exercise(index, ExerciseState::Completed);
        self.advance_from(index);
    }

    fn skip_exercise(&mut self, index: usize) {
        self.recover();
        if !self.is_active(index) {
            tracing::debug!("Exercise {} is not active, ignoring skip", index);
            return;
        }
        self.close_exercise(index, ExerciseState::Skipped);
        self.advance_from(index);
    }

    fn add_set(&mut self, index: usize) {
        self.recover();
        if self.workout.metadata.state == WorkoutState::Completed {
            return;
        }
        let inserted = mutation::add_set(&self.workout, index);
        self.insert_and_continue(index, inserted);
    }

    fn add_rest(&mut self, index: usize) {
        self.recover();
        if self.workout.metadata.state == WorkoutState::Completed {
            return;
        }
        let rest = self.workout.metadata.rest_duration_secs();
        if rest.is_none() {
            tracing::debug!("Workout {} has no restDuration, not adding a rest", self.id);
        }
        let inserted = mutation::add_rest(&self.workout, index, rest);
        self.insert_and_continue(index, inserted);
    }

    fn change_param(&mut self, index: usize, key: &str, value: &str) {
        self.recover();
        if self.workout.metadata.state == WorkoutState::Completed {
            return;
        }
        let updated = mutation::update_param_value(&self.workout, index, key, value);
        if updated != self.workout {
            self.workout = updated;
            self.pending_edits = true;
            if self.is_active(index) {
                self.sync_timer_target();
            }
        }
    }

    fn pause_exercise(&mut self) {
        if self.timers.pause_exercise(&self.id) {
            tracing::debug!("Paused workout {}", self.id);
        }
    }

    fn resume_exercise(&mut self) {
        if self.timers.resume_exercise(&self.id) {
            tracing::debug!("Resumed workout {}", self.id);
        }
    }

    fn flush_pending_edits(&mut self) {
        self.recover();
        if self.pending_edits {
            self.persist();
        }
    }

    fn add_sample(&mut self) {
        self.recover();
        if !self.workout.exercises.is_empty() || self.workout.metadata.title.is_some() {
            tracing::debug!("Block {} is not empty, not adding a sample", self.id);
            return;
        }
        self.workout = create_sample_workout();
        self.persist();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryDocument;
    use crate::timer::ManualClock;
    use chrono::TimeZone;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn doc(block: &str) -> MemoryDocument {
        MemoryDocument::new("test.md", format!("# Log\n\n```workout\n{}\n```\n", block))
    }

    fn open(block: &str) -> (WorkoutSession<MemoryDocument>, ManualClock) {
        crate::logging::init_test();
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap());
        let document = doc(block);
        let location = document.blocks().unwrap()[0].clone();
        let session =
            WorkoutSession::open(document, location, TimerEngine::new(clock.clone())).unwrap();
        (session, clock)
    }

    fn written(session: &WorkoutSession<MemoryDocument>) -> ParsedWorkout {
        parse_workout(&session.host().read_block(session.location()).unwrap())
    }

    fn states(workout: &ParsedWorkout) -> Vec<ExerciseState> {
        workout.exercises.iter().map(|e| e.state).collect()
    }

    const TWO: &str = "title: Two
state: planned
---
- [ ] A | Reps: [10]
- [ ] B | Reps: [5]";

    #[test]
    fn test_linear_progression() {
        let (mut session, clock) = open(TWO);

        session.start_workout();
        let w = written(&session);
        assert_eq!(w.metadata.state, WorkoutState::Started);
        assert!(w.metadata.start_date.is_some());
        assert_eq!(states(&w), vec![ExerciseState::InProgress, ExerciseState::Pending]);

        clock.advance_secs(40);
        session.finish_exercise(0);
        let w = written(&session);
        assert_eq!(states(&w), vec![ExerciseState::Completed, ExerciseState::InProgress]);
        assert_eq!(w.exercises[0].recorded_duration.as_deref(), Some("40 sec"));

        clock.advance_secs(30);
        session.finish_exercise(1);
        let w = written(&session);
        assert_eq!(states(&w), vec![ExerciseState::Completed, ExerciseState::Completed]);
        assert_eq!(w.exercises[1].recorded_duration.as_deref(), Some("30 sec"));
        assert_eq!(w.metadata.state, WorkoutState::Completed);
        assert_eq!(w.metadata.duration.as_deref(), Some("1 min 10 sec"));
        assert!(w.exercises.iter().flat_map(|e| &e.params).all(|p| !p.editable));
        assert!(!session.timers().is_timer_running(session.id()));
    }

    #[test]
    fn test_add_set_on_active_exercise() {
        let (mut session, clock) = open(
            "title: Sets
state: planned
---
- [ ] A | Weight: [60] kg | Reps: [10]
- [ ] B | Reps: [5]",
        );
        session.start_workout();
        clock.advance_secs(25);

        session.add_set(0);
        let w = written(&session);
        assert_eq!(w.exercises.len(), 3);
        assert_eq!(
            states(&w),
            vec![
                ExerciseState::Completed,
                ExerciseState::InProgress,
                ExerciseState::Pending
            ]
        );
        assert_eq!(w.exercises[0].recorded_duration.as_deref(), Some("25 sec"));
        assert_eq!(w.exercises[1].name, "A");
        assert_eq!(w.exercises[1].params[0], ExerciseParam::new("Weight", "60", true).with_unit("kg"));
        assert_eq!(w.exercises[1].recorded_duration, None);

        let lines: Vec<_> = session.workout().exercises.iter().map(|e| e.line_index).collect();
        assert_eq!(lines, vec![0, 1, 2]);
        assert_eq!(session.timer_state().unwrap().exercise_elapsed, 0);
        assert_eq!(session.timer_state().unwrap().active_exercise_index, 1);
    }

    #[test]
    fn test_add_rest_uses_workout_rest_duration() {
        let (mut session, _clock) = open(
            "title: Rest
state: planned
restDuration: 45s
---
- [ ] A
- [ ] B",
        );
        session.start_workout();
        session.add_rest(0);

        let w = written(&session);
        assert_eq!(w.exercises[1].name, "Rest");
        assert_eq!(w.exercises[1].state, ExerciseState::InProgress);
        assert_eq!(w.exercises[1].target_duration, Some(45));
        assert_eq!(session.timer_state().unwrap().remaining, Some(45));
    }

    #[test]
    fn test_add_rest_without_rest_duration_does_nothing() {
        let (mut session, _clock) = open(TWO);
        session.start_workout();
        let before = session.host().text().to_string();

        session.add_rest(0);
        assert_eq!(session.host().text(), before);
        assert_eq!(session.workout().exercises.len(), 2);
    }

    #[test]
    fn test_skip_to_completion() {
        let (mut session, _clock) = open(
            "title: Skip
state: started
startDate: 2024-06-01T09:00:00Z
---
- [\\] A | Reps: [10]
- [-] B | Reps: [5]",
        );

        session.skip_exercise(0);
        let w = written(&session);
        assert_eq!(states(&w), vec![ExerciseState::Skipped, ExerciseState::Skipped]);
        assert_eq!(w.exercises[0].recorded_duration, None);
        assert!(w.exercises[0].duration_param().is_none());
        assert_eq!(w.metadata.state, WorkoutState::Completed);
        assert!(w.metadata.duration.is_some());
    }

    #[test]
    fn test_finish_advances_timer_before_writing() {
        struct RecordingHost {
            inner: MemoryDocument,
            timers: TimerEngine,
            id: String,
            seen: Rc<RefCell<Vec<Option<TimerState>>>>,
        }

        impl HostDocument for RecordingHost {
            fn blocks(&self) -> Result<Vec<BlockLocation>> {
                self.inner.blocks()
            }

            fn read_block(&self, location: &BlockLocation) -> Result<String> {
                self.inner.read_block(location)
            }

            fn replace_block(
                &mut self,
                location: &BlockLocation,
                expected_title: Option<&str>,
                content: &str,
            ) -> Result<BlockLocation> {
                self.seen
                    .borrow_mut()
                    .push(self.timers.get_timer_state(&self.id));
                self.inner.replace_block(location, expected_title, content)
            }
        }

        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap());
        let timers = TimerEngine::new(clock.clone());
        let inner = doc("title: Order
state: planned
---
- [ ] A
- [ ] B
- [ ] C
- [ ] D");
        let location = inner.blocks().unwrap()[0].clone();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let host = RecordingHost {
            inner,
            timers: timers.clone(),
            id: location.workout_id(),
            seen: Rc::clone(&seen),
        };

        let mut session = WorkoutSession::open(host, location, timers).unwrap();
        session.start_workout();
        session.finish_exercise(0);
        session.finish_exercise(1);
        clock.advance_secs(12);
        assert_eq!(session.timer_state().unwrap().exercise_elapsed, 12);

        session.finish_exercise(2);

        let at_write = seen.borrow().last().cloned().flatten().unwrap();
        assert_eq!(at_write.active_exercise_index, 3);
        assert_eq!(at_write.exercise_elapsed, 0);
        assert_eq!(session.timer_state().unwrap().exercise_elapsed, 0);
        assert_eq!(session.timer_state().unwrap().workout_elapsed, 12);
    }

    #[test]
    fn test_single_active_invariant_holds() {
        let (mut session, clock) = open(
            "title: Mix
state: planned
restDuration: 30s
---
- [ ] A
- [ ] B | Duration: [1m]
- [ ] C",
        );

        let check = |s: &WorkoutSession<MemoryDocument>| {
            let w = written(s);
            assert!(w.in_progress_count() <= 1);
            if w.in_progress_count() == 1 {
                assert_eq!(w.metadata.state, WorkoutState::Started);
            }
        };

        session.start_workout();
        check(&session);
        clock.advance_secs(3);
        session.add_set(0);
        check(&session);
        session.add_rest(1);
        check(&session);
        session.skip_exercise(2);
        check(&session);
        session.finish_exercise(3);
        check(&session);
        session.add_set(session.workout().active_exercise_index().unwrap());
        check(&session);
        while let Some(active) = session.workout().active_exercise_index() {
            clock.advance_secs(1);
            session.finish_exercise(active);
            check(&session);
        }
        assert_eq!(session.workout().metadata.state, WorkoutState::Completed);
    }

    #[test]
    fn test_finishing_last_exercise_leaves_earlier_pending_ones() {
        let (mut session, _clock) = open(
            "title: Tail
state: started
startDate: 2024-06-01T09:00:00Z
---
- [ ] A
- [x] B | Duration: 1 min
- [\\] C",
        );

        session.finish_exercise(2);
        let w = written(&session);
        assert_eq!(
            states(&w),
            vec![ExerciseState::Pending, ExerciseState::Completed, ExerciseState::Completed]
        );
        assert_eq!(w.metadata.state, WorkoutState::Completed);
    }

    #[test]
    fn test_countdown_exercise_sets_timer_target() {
        let (mut session, clock) = open(
            "title: Hold
state: planned
---
- [ ] Plank | Duration: [30s]",
        );
        session.start_workout();
        clock.advance_secs(35);

        let state = session.timer_state().unwrap();
        assert_eq!(state.remaining, Some(-5));
        assert!(state.is_overtime);
    }

    #[test]
    fn test_pause_and_resume() {
        let (mut session, clock) = open(TWO);
        session.start_workout();
        clock.advance_secs(5);
        session.pause_exercise();
        clock.advance_secs(10);
        session.resume_exercise();
        clock.advance_secs(5);

        assert_eq!(session.timer_state().unwrap().exercise_elapsed, 10);
        session.finish_exercise(0);
        assert_eq!(
            written(&session).exercises[0].recorded_duration.as_deref(),
            Some("10 sec")
        );
    }

    #[test]
    fn test_param_edits_wait_for_flush() {
        let (mut session, _clock) = open(TWO);
        let before = session.host().text().to_string();

        session.change_param(0, "Reps", "12");
        assert!(session.has_pending_edits());
        assert_eq!(session.host().text(), before);

        session.flush_pending_edits();
        assert!(!session.has_pending_edits());
        assert_eq!(written(&session).exercises[0].params[0].value, "12");
    }

    #[test]
    fn test_title_mismatch_refuses_write() {
        let (mut session, _clock) = open(TWO);
        let other = session.host().text().replace("title: Two", "title: Someone Else");
        session.host_mut().set_text(other.clone());

        session.start_workout();
        assert_eq!(session.host().text(), other);
        assert_eq!(session.workout().metadata.state, WorkoutState::Started);
    }

    #[test]
    fn test_missing_block_skips_write() {
        let (mut session, _clock) = open(TWO);
        session.host_mut().set_text("the block is gone");

        session.start_workout();
        assert_eq!(session.host().text(), "the block is gone");
        assert!(session.reload().is_err());
    }

    #[test]
    fn test_moved_block_is_found_on_next_action() {
        let (mut session, clock) = open(TWO);
        let shifted = format!("# New heading\n{}", session.host().text());
        session.host_mut().set_text(shifted.clone());

        session.start_workout();
        assert_eq!(session.host().text(), shifted);
        assert!(session.has_pending_edits());

        clock.advance_secs(15);
        session.finish_exercise(0);
        assert_eq!(session.location().start_line, 3);
        assert!(!session.has_pending_edits());

        let w = written(&session);
        assert_eq!(w.metadata.state, WorkoutState::Started);
        assert_eq!(states(&w), vec![ExerciseState::Completed, ExerciseState::InProgress]);
        assert_eq!(w.exercises[0].recorded_duration.as_deref(), Some("15 sec"));
        assert!(session.host().text().starts_with("# New heading\n# Log\n"));
        assert!(session.reload().is_ok());
    }

    #[test]
    fn test_reload_follows_moved_block() {
        let (mut session, _clock) = open(TWO);
        let shifted = format!("intro\n\n{}", session.host().text());
        session.host_mut().set_text(shifted);

        session.reload().unwrap();
        assert_eq!(session.location().start_line, 4);
        assert_eq!(session.workout().metadata.title.as_deref(), Some("Two"));
    }

    #[test]
    fn test_two_sessions_on_one_file() {
        use crate::host::MarkdownFile;

        crate::logging::init_test();
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("log.md");
        std::fs::write(
            &path,
            "```workout\ntitle: First\n---\n- [ ] A\n```\n\n```workout\ntitle: Second\n---\n- [ ] B\n```\n",
        )
        .unwrap();

        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap());
        let timers = TimerEngine::new(clock.clone());
        let file = MarkdownFile::new(&path, "workout");
        let blocks = file.blocks().unwrap();

        let mut first =
            WorkoutSession::open(file.clone(), blocks[0].clone(), timers.clone()).unwrap();
        let mut second = WorkoutSession::open(file.clone(), blocks[1].clone(), timers).unwrap();

        first.start_workout();
        first.add_set(0);

        // the second block moved down when the first one grew
        second.start_workout();
        second.start_workout();

        let blocks = file.blocks().unwrap();
        assert_eq!(blocks.len(), 2);
        let a = parse_workout(&file.read_block(&blocks[0]).unwrap());
        let b = parse_workout(&file.read_block(&blocks[1]).unwrap());
        assert_eq!(a.exercises.len(), 2);
        assert_eq!(b.metadata.title.as_deref(), Some("Second"));
        assert_eq!(b.metadata.state, WorkoutState::Started);
        assert_eq!(b.exercises[0].state, ExerciseState::InProgress);
        assert_eq!(second.location(), &blocks[1]);
    }

    #[test]
    fn test_reload_realigns_active_exercise() {
        let (mut session, clock) = open(
            "title: Edit
state: planned
---
- [ ] A
- [ ] B
- [ ] C",
        );
        session.start_workout();
        clock.advance_secs(20);

        // external undo/edit moves the in-progress marker to C
        let edited = session
            .host()
            .text()
            .replace("- [\\] A", "- [x] A")
            .replace("- [ ] C", "- [\\] C");
        session.host_mut().set_text(edited);
        session.reload().unwrap();

        let state = session.timer_state().unwrap();
        assert_eq!(state.active_exercise_index, 2);
        assert_eq!(state.workout_elapsed, 20);
        assert_eq!(session.timers().get_active_exercise_index(session.id()), Some(2));
    }

    #[test]
    fn test_reopening_started_workout_resumes_clock() {
        crate::logging::init_test();
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 9, 10, 0).unwrap());
        let document = doc("title: Resume
state: started
startDate: 2024-06-01T09:00:00Z
---
- [x] A | Duration: 2 min
- [\\] B");
        let location = document.blocks().unwrap()[0].clone();
        let session =
            WorkoutSession::open(document, location, TimerEngine::new(clock.clone())).unwrap();

        let state = session.timer_state().unwrap();
        assert_eq!(state.workout_elapsed, 600);
        assert_eq!(state.exercise_elapsed, 0);
        assert_eq!(state.active_exercise_index, 1);
    }

    #[test]
    fn test_configured_start_date_format_survives_reopen() {
        crate::logging::init_test();
        let mut config = Config::default();
        config.document.start_date_format = "%Y%m%dT%H%M%S".into();

        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap());
        let document = doc(TWO);
        let location = document.blocks().unwrap()[0].clone();
        let mut session = WorkoutSession::open_with_config(
            document,
            location,
            TimerEngine::new(clock.clone()),
            &config,
        )
        .unwrap();
        session.start_workout();
        clock.advance_secs(90);

        let start_date = session.workout().metadata.start_date.clone().unwrap();
        assert_eq!(start_date.len(), "20240601T090000".len());

        // a fresh engine, as after the host reopened the document
        let host = session.host().clone();
        let location = session.location().clone();
        let reopened =
            WorkoutSession::open_with_config(host, location, TimerEngine::new(clock.clone()), &config)
                .unwrap();
        assert_eq!(reopened.timer_state().unwrap().workout_elapsed, 90);
    }

    #[test]
    fn test_reload_of_finished_workout_stops_timer() {
        let (mut session, _clock) = open(TWO);
        session.start_workout();
        assert!(session.timers().is_timer_running(session.id()));

        let edited = session.host().text().replace("state: started", "state: completed");
        session.host_mut().set_text(edited);
        session.reload().unwrap();
        assert!(!session.timers().is_timer_running(session.id()));
    }

    #[test]
    fn test_finish_workout_early() {
        let (mut session, clock) = open(TWO);
        session.start_workout();
        clock.advance_secs(61);
        session.finish_workout();

        let w = written(&session);
        assert_eq!(w.metadata.state, WorkoutState::Completed);
        assert_eq!(w.metadata.duration.as_deref(), Some("1 min 1 sec"));
        assert_eq!(states(&w), vec![ExerciseState::Completed, ExerciseState::Pending]);
        assert!(w.exercises.iter().flat_map(|e| &e.params).all(|p| !p.editable));
    }

    #[test]
    fn test_completed_workout_ignores_actions() {
        let (mut session, _clock) = open(TWO);
        session.start_workout();
        session.finish_workout();
        let before = session.host().text().to_string();

        session.start_workout();
        session.add_set(0);
        session.change_param(1, "Reps", "99");
        session.flush_pending_edits();
        assert_eq!(session.host().text(), before);
    }

    #[test]
    fn test_add_sample_fills_empty_block() {
        let (mut session, _clock) = open("");
        session.add_sample();

        let w = written(&session);
        assert!(w.same_content(&create_sample_workout()));

        session.add_sample();
        assert!(written(&session).same_content(&create_sample_workout()));
    }

    #[test]
    fn test_render_context_drives_callbacks() {
        let (mut session, _clock) = open(TWO);
        {
            let ctx = session.render_context();
            assert_eq!(ctx.workout.metadata.title.as_deref(), Some("Two"));
            assert!(ctx.timer.is_none());
            ctx.callbacks.start_workout();
        }
        assert_eq!(session.workout().metadata.state, WorkoutState::Started);
        assert!(session.render_context().timer.is_some());
    }
}
