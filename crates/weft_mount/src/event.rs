//! Event pipeline
//!
//! Views emit events through their [`EventEmitter`]. The shared
//! [`EventDispatcher`] queues them, replacing a pending coalescable event
//! with the same `(tag, name)` in place, and requests an [`EventBeat`].
//! The beat runs once on the script-runtime queue, however many events
//! arrived since it was requested.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use weft_core::{Tag, Value};
use weft_queue::{MessageQueueThread, QueueResult};

/// Name of the layout-changed event
pub const TOP_LAYOUT: &str = "topLayout";

/// One event emitted by a view
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub tag: Tag,
    pub name: String,
    pub payload: Value,
    /// A newer event with the same `(tag, name)` may replace this one
    pub coalescable: bool,
}

impl Event {
    pub fn new(tag: Tag, name: impl Into<String>, payload: Value) -> Self {
        Self {
            tag,
            name: name.into(),
            payload,
            coalescable: false,
        }
    }

    pub fn coalescable(mut self) -> Self {
        self.coalescable = true;
        self
    }

    fn coalesces_with(&self, other: &Event) -> bool {
        self.coalescable && other.coalescable && self.tag == other.tag && self.name == other.name
    }
}

/// Requests that pending events be drained on the script-runtime queue
pub struct EventBeat {
    requested: Arc<AtomicBool>,
    queue: Arc<MessageQueueThread>,
    on_beat: Arc<dyn Fn() + Send + Sync>,
}

impl EventBeat {
    pub fn new(queue: Arc<MessageQueueThread>, on_beat: Arc<dyn Fn() + Send + Sync>) -> Self {
        Self {
            requested: Arc::new(AtomicBool::new(false)),
            queue,
            on_beat,
        }
    }

    /// Schedule a beat unless one is already pending
    pub fn request(&self) -> QueueResult<()> {
        if self.requested.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let requested = Arc::clone(&self.requested);
        let on_beat = Arc::clone(&self.on_beat);
        let scheduled = self.queue.run_on_queue(move || {
            requested.store(false, Ordering::SeqCst);
            on_beat();
        });

        if scheduled.is_err() {
            self.requested.store(false, Ordering::SeqCst);
        }
        scheduled
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for EventBeat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBeat")
            .field("queue", &self.queue.name())
            .field("requested", &self.is_requested())
            .finish()
    }
}

/// Queues view events until the next beat drains them
#[derive(Default)]
pub struct EventDispatcher {
    pending: Mutex<Vec<Event>>,
    beat: Mutex<Option<EventBeat>>,
    dispatched: AtomicU64,
    coalesced: AtomicU64,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the beat requested whenever an event is queued
    pub fn set_beat(&self, beat: EventBeat) {
        *self.beat.lock() = Some(beat);
    }

    /// Queue an event and request a beat
    pub fn dispatch(&self, event: Event) {
        {
            let mut pending = self.pending.lock();
            self.dispatched.fetch_add(1, Ordering::Relaxed);
            match pending.iter_mut().find(|p| p.coalesces_with(&event)) {
                Some(existing) => {
                    *existing = event;
                    self.coalesced.fetch_add(1, Ordering::Relaxed);
                }
                None => pending.push(event),
            }
        }

        if let Some(beat) = self.beat.lock().as_ref() {
            if let Err(e) = beat.request() {
                log::debug!("Dropping event beat: {}", e);
            }
        }
    }

    /// Take every pending event, oldest first
    pub fn drain(&self) -> Vec<Event> {
        std::mem::take(&mut *self.pending.lock())
    }

    /// Drop pending events of a view that no longer exists
    pub fn discard_for(&self, tag: Tag) {
        self.pending.lock().retain(|e| e.tag != tag);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Events dispatched so far, coalesced ones included
    pub fn dispatched_count(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    pub fn coalesced_count(&self) -> u64 {
        self.coalesced.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("pending", &self.pending_count())
            .field("dispatched", &self.dispatched_count())
            .finish()
    }
}

/// Event source bound to one view
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tag: Tag,
    dispatcher: Arc<EventDispatcher>,
}

impl EventEmitter {
    pub fn new(tag: Tag, dispatcher: Arc<EventDispatcher>) -> Self {
        Self { tag, dispatcher }
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn emit(&self, name: &str, payload: Value) {
        self.dispatcher.dispatch(Event::new(self.tag, name, payload));
    }

    /// Emit an event a newer one of the same name may replace
    pub fn emit_coalescable(&self, name: &str, payload: Value) {
        self.dispatcher
            .dispatch(Event::new(self.tag, name, payload).coalescable());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_queue::QueueRole;

    #[test]
    fn test_coalescable_events_replace_in_place() {
        let dispatcher = Arc::new(EventDispatcher::new());
        let scroll = EventEmitter::new(Tag::new(1), Arc::clone(&dispatcher));
        let other = EventEmitter::new(Tag::new(2), Arc::clone(&dispatcher));

        scroll.emit_coalescable("topScroll", Value::from(1));
        other.emit("topPress", Value::Null);
        scroll.emit_coalescable("topScroll", Value::from(2));

        let events = dispatcher.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].name, "topScroll");
        assert_eq!(events[0].payload, Value::from(2));
        assert_eq!(events[1].tag, Tag::new(2));
        assert_eq!(dispatcher.coalesced_count(), 1);
        assert_eq!(dispatcher.dispatched_count(), 3);
    }

    #[test]
    fn test_plain_events_are_never_coalesced() {
        let dispatcher = Arc::new(EventDispatcher::new());
        let emitter = EventEmitter::new(Tag::new(1), Arc::clone(&dispatcher));
        emitter.emit("topPress", Value::Null);
        emitter.emit("topPress", Value::Null);
        assert_eq!(dispatcher.pending_count(), 2);

        dispatcher.discard_for(Tag::new(1));
        assert_eq!(dispatcher.pending_count(), 0);
    }

    #[test]
    fn test_beat_runs_once_on_script_queue() {
        let queue = Arc::new(MessageQueueThread::spawn(QueueRole::ScriptRuntime, "test-beat").unwrap());
        let dispatcher = Arc::new(EventDispatcher::new());
        let drained = Arc::new(Mutex::new(Vec::new()));

        let (source, sink) = (Arc::clone(&dispatcher), Arc::clone(&drained));
        dispatcher.set_beat(EventBeat::new(
            Arc::clone(&queue),
            Arc::new(move || {
                let events = source.drain();
                sink.lock().push((QueueRole::current(), events.len()));
            }),
        ));

        // Hold the queue so all three events land before the beat runs
        let gate = Arc::new(parking_lot::Mutex::new(()));
        let held = gate.lock();
        let waiter = Arc::clone(&gate);
        queue.run_on_queue(move || drop(waiter.lock())).unwrap();

        let emitter = EventEmitter::new(Tag::new(3), Arc::clone(&dispatcher));
        emitter.emit("topA", Value::Null);
        emitter.emit("topB", Value::Null);
        emitter.emit("topC", Value::Null);
        drop(held);
        queue.run_on_queue_sync(|| ()).unwrap();

        assert_eq!(*drained.lock(), vec![(Some(QueueRole::ScriptRuntime), 3)]);
    }
}
