//! Fabric binding
//!
//! Owns the shadow trees of every surface and hands mutation lists to the
//! mounting manager on the UI queue.
//!
//! ```text
//!  commit(surface, root) ──► [commit lock] diff ──► UI queue ──► MountingManager
//!                                                                   │ events
//!  RCTEventEmitter.receiveEvent ◄── script queue ◄── EventBeat ◄────┘
//! ```
//!
//! The commit lock is held from the diff until the mutation list is
//! enqueued, so lists reach the UI queue in revision order even when
//! commits race on different threads. A list that cannot be enqueued
//! reverts its surface to the tree it had before.
//!
//! Batch listeners run on the UI queue after the mounting manager has been
//! released, so they may read the views they are told about.

use crate::error::{BridgeError, BridgeResult};
use parking_lot::Mutex;
use std::sync::Arc;
use weft_core::{SurfaceId, Tag, Value};
use weft_fabric::{MutationList, Props, ShadowNode, ShadowTreeRegistry, SurfaceState};
use weft_modules::JsFunctionCaller;
use weft_mount::{
    BatchListener, BatchListeners, EventBeat, EventDispatcher, MountConfig, MountError,
    MountingManager, ViewManagerRegistry,
};
use weft_queue::MessageQueueThread;

/// Script module receiving view events
pub const EVENT_EMITTER_MODULE: &str = "RCTEventEmitter";
/// Method of [`EVENT_EMITTER_MODULE`] receiving `(tag, name, payload)`
pub const RECEIVE_EVENT: &str = "receiveEvent";

/// Told about mounting failures on the UI queue, with whether the view
/// hierarchy is now untrustworthy
pub type MountFailureHandler = Arc<dyn Fn(MountError, bool) + Send + Sync>;

/// Commit and mount pipeline of one instance
pub struct FabricBinding {
    trees: Mutex<ShadowTreeRegistry>,
    mounting: Arc<Mutex<MountingManager>>,
    batch_listeners: Arc<BatchListeners>,
    events: Arc<EventDispatcher>,
    ui_queue: Arc<MessageQueueThread>,
    on_failure: MountFailureHandler,
}

impl FabricBinding {
    pub fn new(
        ui_queue: Arc<MessageQueueThread>,
        script_queue: Arc<MessageQueueThread>,
        view_managers: ViewManagerRegistry,
        config: MountConfig,
        js: Arc<dyn JsFunctionCaller>,
        on_failure: MountFailureHandler,
    ) -> Self {
        let events = Arc::new(EventDispatcher::new());

        let source = Arc::downgrade(&events);
        events.set_beat(EventBeat::new(
            script_queue,
            Arc::new(move || {
                let Some(events) = source.upgrade() else {
                    return;
                };
                for event in events.drain() {
                    js.call_function(
                        EVENT_EMITTER_MODULE,
                        RECEIVE_EVENT,
                        vec![Value::from(event.tag.raw()), Value::from(event.name), event.payload],
                    );
                }
            }),
        ));

        let mut mounting = MountingManager::new(view_managers, config, Arc::clone(&events));
        mounting.bind_to_queue(Arc::clone(&ui_queue));
        let batch_listeners = Arc::clone(mounting.batch_listeners());

        Self {
            trees: Mutex::new(ShadowTreeRegistry::new()),
            mounting: Arc::new(Mutex::new(mounting)),
            batch_listeners,
            events,
            ui_queue,
            on_failure,
        }
    }

    /// Start a surface and mount its root view
    pub fn start_surface(&self, surface_id: SurfaceId, initial_props: Props) -> BridgeResult<()> {
        let mut trees = self.trees.lock();
        let previous = trees.tree(surface_id).cloned();
        let list = trees.start_surface(surface_id, initial_props)?;
        if let Err(error) = self.enqueue_mount(list) {
            trees.revert(surface_id, previous);
            return Err(error);
        }
        Ok(())
    }

    /// Commit a new tree for `surface_id`; returns the new revision
    pub fn commit(&self, surface_id: SurfaceId, root: Arc<ShadowNode>) -> BridgeResult<u64> {
        let mut trees = self.trees.lock();
        let previous = trees.tree(surface_id).cloned();
        let list = trees.commit(surface_id, root)?;
        let revision = list.revision;
        if let Err(error) = self.enqueue_mount(list) {
            trees.revert(surface_id, previous);
            return Err(error);
        }
        Ok(revision)
    }

    /// Stop a surface. Batches already enqueued for it drain first.
    pub fn stop_surface(&self, surface_id: SurfaceId) -> BridgeResult<()> {
        let mut trees = self.trees.lock();
        let list = trees.stop_surface(surface_id)?;
        self.enqueue_mount(list)
    }

    /// Stop every running surface, logging failures
    pub fn stop_all_surfaces(&self) {
        let mut trees = self.trees.lock();
        for surface_id in trees.running_surfaces() {
            let result = trees
                .stop_surface(surface_id)
                .map_err(BridgeError::from)
                .and_then(|list| self.enqueue_mount(list));
            if let Err(e) = result {
                log::warn!("Failed to stop {}: {}", surface_id, e);
            }
        }
    }

    /// Run a view command on the UI queue. Failures are reported, never fatal.
    pub fn dispatch_command(&self, tag: Tag, command: &str, args: Vec<Value>) -> BridgeResult<()> {
        let mounting = Arc::clone(&self.mounting);
        let on_failure = Arc::clone(&self.on_failure);
        let command = command.to_string();

        self.ui_queue.run_on_queue(move || {
            let result = mounting.lock().dispatch_command(tag, &command, &args);
            if let Err(error) = result {
                log::warn!("Command {} on {} failed: {}", command, tag, error);
                on_failure(error, false);
            }
        })?;
        Ok(())
    }

    pub fn add_batch_listener(&self, listener: BatchListener) {
        self.batch_listeners.add(listener);
    }

    pub fn surface_state(&self, surface_id: SurfaceId) -> SurfaceState {
        self.trees.lock().state(surface_id)
    }

    pub fn revision(&self, surface_id: SurfaceId) -> Option<u64> {
        self.trees.lock().revision(surface_id)
    }

    pub fn committed_root(&self, surface_id: SurfaceId) -> Option<Arc<ShadowNode>> {
        self.trees.lock().committed_root(surface_id)
    }

    pub fn running_surfaces(&self) -> Vec<SurfaceId> {
        self.trees.lock().running_surfaces()
    }

    pub fn events(&self) -> &Arc<EventDispatcher> {
        &self.events
    }

    /// Inspect the mounted views
    pub fn with_mounting<R>(&self, f: impl FnOnce(&MountingManager) -> R) -> R {
        let mounting = self.mounting.lock();
        f(&mounting)
    }

    fn enqueue_mount(&self, list: MutationList) -> BridgeResult<()> {
        let mounting = Arc::clone(&self.mounting);
        let listeners = Arc::clone(&self.batch_listeners);
        let on_failure = Arc::clone(&self.on_failure);

        self.ui_queue.run_on_queue(move || {
            let result = mounting.lock().mount(&list);
            match result {
                Ok(report) => listeners.notify(&report),
                Err(error) => {
                    log::error!(
                        "Mounting {} revision {} failed: {}",
                        list.surface_id,
                        list.revision,
                        error
                    );
                    let fatal = error.is_fatal();
                    on_failure(error, fatal);
                }
            }
        })?;
        Ok(())
    }
}

impl std::fmt::Debug for FabricBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FabricBinding")
            .field("surfaces", &self.running_surfaces())
            .field("pending_events", &self.events.pending_count())
            .finish()
    }
}
