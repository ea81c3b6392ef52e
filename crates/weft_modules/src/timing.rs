//! Timing module
//!
//! Backs script timers (`setTimeout`, `setInterval`, `requestIdleCallback`)
//! with the frame clock. Every frame, all due timers are handed to script
//! in one `JSTimers.callTimers([ids])` call.
//!
//! ```text
//!  createTimer(id, duration, jsSchedulingTime, repeats)
//!        │  target = jsSchedulingTime + duration
//!        ▼
//!  timers ──► FrameClock tick(frameTime) ──► due = target <= frameTime
//!                                              │ repeating: target = frameTime + duration
//!                                              ▼
//!                                   JSTimers.callTimers([due ids])
//! ```

use crate::args::Args;
use crate::callback::JsFunctionCaller;
use crate::descriptor::{ArgKind, MethodDescriptor, MethodKind};
use crate::error::{ModuleError, ModuleResult};
use crate::module::NativeModule;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;
use weft_core::Value;
use weft_queue::{FrameCallbackId, FrameClock};

const JS_TIMERS: &str = "JSTimers";

const CREATE_TIMER: usize = 0;
const DELETE_TIMER: usize = 1;
const SET_SEND_IDLE_EVENTS: usize = 2;

#[derive(Debug, Clone)]
struct Timer {
    target_time: f64,
    interval: f64,
    repeats: bool,
}

struct TimingState {
    timers: Mutex<HashMap<i64, Timer>>,
    send_idle_events: AtomicBool,
    paused: AtomicBool,
    js: Arc<dyn JsFunctionCaller>,
    clock: Arc<FrameClock>,
    frame_callback: Mutex<Option<FrameCallbackId>>,
    idle_threshold_ms: f64,
}

impl TimingState {
    fn on_frame(&self, frame_time: f64) {
        if self.paused.load(Ordering::SeqCst) {
            return;
        }
        let started = Instant::now();

        let mut due: Vec<(f64, i64)> = Vec::new();
        {
            let mut timers = self.timers.lock();
            for (id, timer) in timers.iter_mut() {
                if timer.target_time <= frame_time {
                    due.push((timer.target_time, *id));
                    if timer.repeats {
                        timer.target_time = frame_time + timer.interval;
                    }
                }
            }
            timers.retain(|_, timer| timer.repeats || timer.target_time > frame_time);
        }

        if !due.is_empty() {
            due.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            let ids: Vec<Value> = due.into_iter().map(|(_, id)| Value::from(id)).collect();
            self.js
                .call_function(JS_TIMERS, "callTimers", vec![Value::Array(ids)]);
        }

        if self.send_idle_events.load(Ordering::SeqCst) {
            let spent_ms = started.elapsed().as_secs_f64() * 1000.0;
            let remaining = self.clock.frame_interval_ms() - spent_ms;
            if remaining >= self.idle_threshold_ms {
                self.js
                    .call_function(JS_TIMERS, "callIdleCallbacks", vec![Value::from(frame_time)]);
            }
        }
    }
}

/// The "Timing" native module
pub struct TimingModule {
    state: Arc<TimingState>,
}

impl TimingModule {
    /// Module name as seen from script
    pub const NAME: &'static str = "Timing";

    pub fn new(clock: Arc<FrameClock>, js: Arc<dyn JsFunctionCaller>, idle_threshold_ms: f64) -> Self {
        Self {
            state: Arc::new(TimingState {
                timers: Mutex::new(HashMap::new()),
                send_idle_events: AtomicBool::new(false),
                paused: AtomicBool::new(false),
                js,
                clock,
                frame_callback: Mutex::new(None),
                idle_threshold_ms,
            }),
        }
    }

    /// Schedule timer `callback_id` to fire `duration` ms after
    /// `js_scheduling_time`. One-shot timers with zero duration fire now.
    pub fn create_timer(&self, callback_id: i64, duration: f64, js_scheduling_time: f64, repeats: bool) {
        if duration <= 0.0 && !repeats {
            self.state.js.call_function(
                JS_TIMERS,
                "callTimers",
                vec![Value::Array(vec![Value::from(callback_id)])],
            );
            return;
        }

        self.state.timers.lock().insert(
            callback_id,
            Timer {
                target_time: js_scheduling_time + duration,
                interval: duration,
                repeats,
            },
        );
    }

    /// Cancel a timer. Returns false if it was not pending.
    pub fn delete_timer(&self, callback_id: i64) -> bool {
        self.state.timers.lock().remove(&callback_id).is_some()
    }

    pub fn set_send_idle_events(&self, enabled: bool) {
        self.state.send_idle_events.store(enabled, Ordering::SeqCst);
    }

    pub fn has_active_timers(&self) -> bool {
        !self.state.timers.lock().is_empty()
    }

    pub fn timer_count(&self) -> usize {
        self.state.timers.lock().len()
    }

    /// Whether frame ticks are currently ignored (host paused)
    pub fn is_paused(&self) -> bool {
        self.state.paused.load(Ordering::SeqCst)
    }

    fn descriptor(name: &str, signature: Vec<ArgKind>) -> MethodDescriptor {
        MethodDescriptor {
            name: name.to_string(),
            signature,
            kind: MethodKind::Async,
        }
    }
}

impl NativeModule for TimingModule {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn methods(&self) -> Vec<MethodDescriptor> {
        vec![
            Self::descriptor(
                "createTimer",
                vec![ArgKind::Integer, ArgKind::Number, ArgKind::Number, ArgKind::Boolean],
            ),
            Self::descriptor("deleteTimer", vec![ArgKind::Integer]),
            Self::descriptor("setSendIdleEvents", vec![ArgKind::Boolean]),
        ]
    }

    fn invoke(&self, method_index: usize, args: Args) -> ModuleResult<Value> {
        match method_index {
            CREATE_TIMER => {
                self.create_timer(args.integer(0)?, args.number(1)?, args.number(2)?, args.boolean(3)?);
            }
            DELETE_TIMER => {
                self.delete_timer(args.integer(0)?);
            }
            SET_SEND_IDLE_EVENTS => self.set_send_idle_events(args.boolean(0)?),
            index => {
                return Err(ModuleError::UnknownMethod {
                    module: Self::NAME.to_string(),
                    index,
                })
            }
        }
        Ok(Value::Null)
    }

    fn initialize(&self) {
        let weak: Weak<TimingState> = Arc::downgrade(&self.state);
        let id = self.state.clock.post_frame_callback(Arc::new(move |frame_time: f64| {
            if let Some(state) = weak.upgrade() {
                state.on_frame(frame_time);
            }
        }));
        *self.state.frame_callback.lock() = Some(id);
    }

    fn on_instance_destroy(&self) {
        if let Some(id) = self.state.frame_callback.lock().take() {
            self.state.clock.remove_frame_callback(id);
        }
        self.state.timers.lock().clear();
    }

    fn observes_lifecycle(&self) -> bool {
        true
    }

    fn on_host_resume(&self) {
        self.state.paused.store(false, Ordering::SeqCst);
    }

    fn on_host_pause(&self) {
        self.state.paused.store(true, Ordering::SeqCst);
    }

    fn on_host_destroy(&self) {
        self.state.paused.store(true, Ordering::SeqCst);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingJs {
        calls: Mutex<Vec<(String, Vec<Value>)>>,
    }

    impl RecordingJs {
        fn timer_calls(&self) -> Vec<Vec<Value>> {
            self.calls
                .lock()
                .iter()
                .filter(|(method, _)| method == "callTimers")
                .map(|(_, args)| args.clone())
                .collect()
        }

        fn idle_calls(&self) -> usize {
            self.calls
                .lock()
                .iter()
                .filter(|(method, _)| method == "callIdleCallbacks")
                .count()
        }
    }

    impl JsFunctionCaller for RecordingJs {
        fn call_function(&self, module: &str, method: &str, args: Vec<Value>) {
            assert_eq!(module, JS_TIMERS);
            self.calls.lock().push((method.to_string(), args));
        }
    }

    fn setup() -> (Arc<FrameClock>, Arc<RecordingJs>, TimingModule) {
        let clock = Arc::new(FrameClock::new(1000.0 / 60.0));
        let js = Arc::new(RecordingJs::default());
        let timing = TimingModule::new(Arc::clone(&clock), js.clone(), 1.0);
        timing.initialize();
        (clock, js, timing)
    }

    fn ids(list: &[i64]) -> Vec<Value> {
        vec![Value::Array(list.iter().map(|id| Value::from(*id)).collect())]
    }

    #[test]
    fn test_repeating_timer_fires_once_per_frame_until_deleted() {
        let (clock, js, timing) = setup();
        timing.create_timer(1, 1.0, 0.0, true);

        clock.do_frame(16.0);
        clock.do_frame(32.0);
        clock.do_frame(48.0);
        assert_eq!(js.timer_calls(), vec![ids(&[1]), ids(&[1]), ids(&[1])]);

        assert!(timing.delete_timer(1));
        clock.do_frame(64.0);
        clock.do_frame(80.0);
        assert_eq!(js.timer_calls().len(), 3);
    }

    #[test]
    fn test_one_shot_timer_fires_once() {
        let (clock, js, timing) = setup();
        timing.create_timer(7, 20.0, 0.0, false);

        clock.do_frame(16.0);
        assert!(js.timer_calls().is_empty());

        clock.do_frame(32.0);
        clock.do_frame(48.0);
        assert_eq!(js.timer_calls(), vec![ids(&[7])]);
        assert!(!timing.has_active_timers());
    }

    #[test]
    fn test_zero_duration_one_shot_fires_immediately() {
        let (_clock, js, timing) = setup();
        timing.create_timer(3, 0.0, 100.0, false);
        assert_eq!(js.timer_calls(), vec![ids(&[3])]);
        assert_eq!(timing.timer_count(), 0);
    }

    #[test]
    fn test_due_timers_are_batched_in_target_order() {
        let (clock, js, timing) = setup();
        timing.create_timer(2, 10.0, 0.0, false);
        timing.create_timer(1, 5.0, 0.0, false);

        clock.do_frame(16.0);
        assert_eq!(js.timer_calls(), vec![ids(&[1, 2])]);
    }

    #[test]
    fn test_paused_host_skips_frames() {
        let (clock, js, timing) = setup();
        timing.create_timer(1, 1.0, 0.0, true);

        timing.on_host_pause();
        clock.do_frame(16.0);
        assert!(js.timer_calls().is_empty());

        timing.on_host_resume();
        clock.do_frame(32.0);
        assert_eq!(js.timer_calls().len(), 1);
    }

    #[test]
    fn test_idle_callbacks_only_when_enabled() {
        let (clock, js, timing) = setup();
        clock.do_frame(16.0);
        assert_eq!(js.idle_calls(), 0);

        timing.set_send_idle_events(true);
        clock.do_frame(32.0);
        assert_eq!(js.idle_calls(), 1);
    }

    #[test]
    fn test_instance_destroy_unhooks_frame_callback() {
        let (clock, js, timing) = setup();
        timing.create_timer(1, 1.0, 0.0, true);
        timing.on_instance_destroy();

        clock.do_frame(16.0);
        assert!(js.timer_calls().is_empty());
        assert_eq!(clock.callback_count(), 0);
    }
}
