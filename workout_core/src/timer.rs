//! Timer engine for running workouts.
//!
//! One `TimerInstance` per active workout identifier, owned by a single
//! `TimerEngine`. The engine is a cheap clonable handle; clones share the
//! same map. Everything is single-threaded: ticks are driven by the caller
//! through `poll()` (or `tick()` directly) and subscriber callbacks run on
//! the caller's thread.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

// ============================================================================
// Clocks
// ============================================================================

/// Source of wall-clock time for the engine
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// The real system clock
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Hand-driven clock for tests and replays; clones share the same time
#[derive(Clone, Debug)]
pub struct ManualClock {
    now: Rc<Cell<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
        }
    }

    pub fn advance_secs(&self, secs: i64) {
        self.now.set(self.now.get() + Duration::seconds(secs));
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }
}

// ============================================================================
// Timer State
// ============================================================================

/// Snapshot of a running workout timer, in whole seconds
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    /// Time since the workout started; keeps running through pauses
    pub workout_elapsed: u64,
    /// Unpaused time spent on the active exercise
    pub exercise_elapsed: u64,
    /// Countdown seconds left (negative once overtime)
    pub remaining: Option<i64>,
    pub is_overtime: bool,
    pub is_paused: bool,
    pub active_exercise_index: usize,
}

/// Callback invoked with a fresh `TimerState` on every tick
pub type Subscriber = Rc<dyn Fn(&TimerState)>;

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct TimerInstance {
    workout_start: DateTime<Utc>,
    exercise_start: DateTime<Utc>,
    exercise_paused: Duration,
    paused_since: Option<DateTime<Utc>>,
    active_exercise_index: usize,
    target_duration: Option<u64>,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
}

impl TimerInstance {
    fn new(workout_start: DateTime<Utc>, now: DateTime<Utc>, active_exercise_index: usize) -> Self {
        Self {
            workout_start,
            exercise_start: now,
            exercise_paused: Duration::zero(),
            paused_since: None,
            active_exercise_index,
            target_duration: None,
            subscribers: Vec::new(),
        }
    }

    fn reset_exercise(&mut self, now: DateTime<Utc>, index: usize) {
        self.exercise_start = now;
        self.exercise_paused = Duration::zero();
        self.paused_since = None;
        self.active_exercise_index = index;
    }

    fn state(&self, now: DateTime<Utc>) -> TimerState {
        let workout_elapsed = (now - self.workout_start).num_seconds().max(0) as u64;

        let ongoing_pause = self
            .paused_since
            .map(|since| now - since)
            .unwrap_or_else(Duration::zero);
        let exercise_elapsed = (now - self.exercise_start - self.exercise_paused - ongoing_pause)
            .num_seconds()
            .max(0) as u64;

        let remaining = self
            .target_duration
            .map(|target| target as i64 - exercise_elapsed as i64);

        TimerState {
            workout_elapsed,
            exercise_elapsed,
            remaining,
            is_overtime: remaining.map_or(false, |r| r < 0),
            is_paused: self.paused_since.is_some(),
            active_exercise_index: self.active_exercise_index,
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

#[derive(Default)]
struct EngineState {
    timers: HashMap<String, TimerInstance>,
    next_subscription: u64,
    next_tick: Option<DateTime<Utc>>,
}

/// Owner of every workout timer in the process
#[derive(Clone)]
pub struct TimerEngine {
    inner: Rc<RefCell<EngineState>>,
    clock: Rc<dyn Clock>,
    tick_interval: Duration,
}

impl fmt::Debug for TimerEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.borrow();
        f.debug_struct("TimerEngine")
            .field("timers", &state.timers.keys().collect::<Vec<_>>())
            .field("next_tick", &state.next_tick)
            .field("tick_interval", &self.tick_interval)
            .finish()
    }
}

impl TimerEngine {
    /// Create an engine ticking once per second
    pub fn new(clock: impl Clock + 'static) -> Self {
        Self {
            inner: Rc::new(RefCell::new(EngineState::default())),
            clock: Rc::new(clock),
            tick_interval: Duration::seconds(1),
        }
    }

    /// Engine on the system clock
    pub fn system() -> Self {
        Self::new(SystemClock)
    }

    pub fn with_tick_interval(mut self, interval: std::time::Duration) -> Self {
        self.tick_interval =
            Duration::from_std(interval).unwrap_or_else(|_| Duration::seconds(1));
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Start timing a workout from now
    ///
    /// Calling this again for the same id resets its timing; check
    /// `is_timer_running` first.
    pub fn start_workout_timer(&self, id: &str, active_index: usize) {
        let now = self.clock.now();
        self.start_workout_timer_at(id, active_index, now);
    }

    /// Start timing a workout whose clock began at `started_at`
    ///
    /// The exercise clock always starts now.
    pub fn start_workout_timer_at(&self, id: &str, active_index: usize, started_at: DateTime<Utc>) {
        let now = self.clock.now();
        let mut state = self.inner.borrow_mut();
        if state.timers.contains_key(id) {
            tracing::warn!("Restarting timer for workout {}", id);
        }
        state
            .timers
            .insert(id.to_string(), TimerInstance::new(started_at, now, active_index));
        if state.next_tick.is_none() {
            state.next_tick = Some(now + self.tick_interval);
        }
        tracing::debug!("Started timer for workout {} at exercise {}", id, active_index);
    }

    /// Drop a workout's timer; its subscribers get no further ticks
    pub fn stop_workout_timer(&self, id: &str) -> bool {
        let mut state = self.inner.borrow_mut();
        let removed = state.timers.remove(id).is_some();
        if state.timers.is_empty() {
            state.next_tick = None;
        }
        if removed {
            tracing::debug!("Stopped timer for workout {}", id);
        }
        removed
    }

    /// Reset the exercise clock for a new active exercise
    ///
    /// Must run before the text for the new exercise is written, so nothing
    /// renders the previous exercise's elapsed time against it.
    pub fn advance_exercise(&self, id: &str, new_index: usize) -> bool {
        let now = self.clock.now();
        self.with_timer(id, |timer| {
            timer.reset_exercise(now, new_index);
            tracing::debug!("Workout {} advanced to exercise {}", id, new_index);
        })
        .is_some()
    }

    /// Pause the exercise clock; returns false if already paused or unknown
    pub fn pause_exercise(&self, id: &str) -> bool {
        let now = self.clock.now();
        self.with_timer(id, |timer| {
            if timer.paused_since.is_some() {
                return false;
            }
            timer.paused_since = Some(now);
            true
        })
        .unwrap_or(false)
    }

    /// Resume the exercise clock; returns false if not paused or unknown
    pub fn resume_exercise(&self, id: &str) -> bool {
        let now = self.clock.now();
        self.with_timer(id, |timer| match timer.paused_since.take() {
            Some(since) => {
                timer.exercise_paused = timer.exercise_paused + (now - since);
                true
            }
            None => false,
        })
        .unwrap_or(false)
    }

    pub fn get_timer_state(&self, id: &str) -> Option<TimerState> {
        let now = self.clock.now();
        self.inner.borrow().timers.get(id).map(|t| t.state(now))
    }

    pub fn get_active_exercise_index(&self, id: &str) -> Option<usize> {
        self.inner
            .borrow()
            .timers
            .get(id)
            .map(|t| t.active_exercise_index)
    }

    /// Re-point the timer at another exercise without touching either clock
    pub fn set_active_exercise_index(&self, id: &str, index: usize) -> bool {
        self.with_timer(id, |timer| timer.active_exercise_index = index)
            .is_some()
    }

    /// Countdown target for the active exercise, `None` to count up
    pub fn set_target_duration(&self, id: &str, target: Option<u64>) -> bool {
        self.with_timer(id, |timer| timer.target_duration = target)
            .is_some()
    }

    pub fn is_timer_running(&self, id: &str) -> bool {
        self.inner.borrow().timers.contains_key(id)
    }

    pub fn active_timer_count(&self) -> usize {
        self.inner.borrow().timers.len()
    }

    pub fn subscribe(
        &self,
        id: &str,
        callback: impl Fn(&TimerState) + 'static,
    ) -> Option<SubscriptionId> {
        let mut state = self.inner.borrow_mut();
        let subscription = SubscriptionId(state.next_subscription);
        let timer = state.timers.get_mut(id)?;
        timer.subscribers.push((subscription, Rc::new(callback)));
        state.next_subscription += 1;
        Some(subscription)
    }

    pub fn unsubscribe(&self, id: &str, subscription: SubscriptionId) -> bool {
        self.with_timer(id, |timer| {
            let before = timer.subscribers.len();
            timer.subscribers.retain(|(s, _)| *s != subscription);
            timer.subscribers.len() != before
        })
        .unwrap_or(false)
    }

    /// Notify every subscriber of every timer; returns callbacks invoked
    ///
    /// States and subscriber lists are snapshotted before any callback
    /// runs, so callbacks may freely call back into the engine.
    pub fn tick(&self) -> usize {
        let now = self.clock.now();
        let snapshot: Vec<(TimerState, Vec<Subscriber>)> = {
            let state = self.inner.borrow();
            state
                .timers
                .values()
                .filter(|t| !t.subscribers.is_empty())
                .map(|t| {
                    let subscribers = t.subscribers.iter().map(|(_, s)| Rc::clone(s)).collect();
                    (t.state(now), subscribers)
                })
                .collect()
        };

        let mut notified = 0;
        for (timer_state, subscribers) in snapshot {
            for subscriber in subscribers {
                subscriber(&timer_state);
                notified += 1;
            }
        }
        notified
    }

    /// Tick if the interval has elapsed since the last tick
    pub fn poll(&self) -> bool {
        let now = self.clock.now();
        {
            let mut state = self.inner.borrow_mut();
            match state.next_tick {
                Some(due) if now >= due => {
                    state.next_tick = Some(now + self.tick_interval);
                }
                _ => return false,
            }
        }
        self.tick();
        true
    }

    /// Time until the next scheduled tick, if any timer is running
    pub fn next_tick_in(&self) -> Option<std::time::Duration> {
        let due = self.inner.borrow().next_tick?;
        Some((due - self.clock.now()).to_std().unwrap_or_default())
    }

    /// Drop every timer and cancel the tick schedule
    pub fn destroy(&self) {
        let mut state = self.inner.borrow_mut();
        let count = state.timers.len();
        state.timers.clear();
        state.next_tick = None;
        tracing::debug!("Timer engine destroyed ({} timers dropped)", count);
    }

    fn with_timer<R>(&self, id: &str, f: impl FnOnce(&mut TimerInstance) -> R) -> Option<R> {
        let mut state = self.inner.borrow_mut();
        state.timers.get_mut(id).map(f)
    }
}
