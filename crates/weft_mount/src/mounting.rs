//! Mounting manager
//!
//! Owns every live view by tag and applies mutation lists in order. A
//! batch is applied instruction by instruction; the first inconsistent
//! instruction aborts it and is returned as an error.
//!
//! `mount` never calls batch listeners itself. The owner signals
//! [`BatchListeners`] once it has released the manager, so a listener may
//! inspect the views it was told about.

use crate::config::MountConfig;
use crate::error::{MountError, MountResult};
use crate::event::{Event, EventDispatcher, EventEmitter, TOP_LAYOUT};
use crate::view_manager::{ViewInstance, ViewManager, ViewManagerRegistry};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use weft_core::{SurfaceId, Tag, Value};
use weft_fabric::{LayoutMetrics, MutationInstruction, MutationList, Props, ROOT_COMPONENT};
use weft_queue::MessageQueueThread;

/// Summary of one applied batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub surface_id: SurfaceId,
    pub revision: u64,
    pub instructions: usize,
}

/// Called after every fully applied batch
pub type BatchListener = Arc<dyn Fn(&BatchReport) + Send + Sync>;

/// Listeners of the end-of-batch signal
#[derive(Default)]
pub struct BatchListeners {
    listeners: RwLock<Vec<BatchListener>>,
}

impl BatchListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: BatchListener) {
        self.listeners.write().push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Call every listener. Listeners run without any lock held and may
    /// add further listeners, which are called from the next batch on.
    pub fn notify(&self, report: &BatchReport) {
        let listeners: Vec<BatchListener> = self.listeners.read().clone();
        for listener in listeners {
            listener(report);
        }
    }
}

impl std::fmt::Debug for BatchListeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchListeners")
            .field("listeners", &self.len())
            .finish()
    }
}

/// Mounting statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountStats {
    pub batches: u64,
    pub instructions: u64,
    pub views_created: u64,
    pub views_deleted: u64,
    pub commands: u64,
    /// Instructions corrected by defensive clamping
    pub clamped: u64,
}

/// Applies mutation lists to the live view hierarchy
pub struct MountingManager {
    views: HashMap<Tag, ViewInstance>,
    managers: ViewManagerRegistry,
    config: MountConfig,
    events: Arc<EventDispatcher>,
    batch_listeners: Arc<BatchListeners>,
    revisions: HashMap<SurfaceId, u64>,
    ui_queue: Option<Arc<MessageQueueThread>>,
    stats: MountStats,
}

impl MountingManager {
    /// Create a manager. A manager for surface roots is added when the
    /// registry has none.
    pub fn new(
        mut managers: ViewManagerRegistry,
        config: MountConfig,
        events: Arc<EventDispatcher>,
    ) -> Self {
        if !managers.contains(ROOT_COMPONENT) {
            let _ = managers.register(ViewManager::builder(ROOT_COMPONENT).build());
        }

        Self {
            views: HashMap::new(),
            managers,
            config,
            events,
            batch_listeners: Arc::new(BatchListeners::new()),
            revisions: HashMap::new(),
            ui_queue: None,
            stats: MountStats::default(),
        }
    }

    /// Refuse to mount anywhere but on `queue`
    pub fn bind_to_queue(&mut self, queue: Arc<MessageQueueThread>) {
        self.ui_queue = Some(queue);
    }

    /// Listeners to signal after each successful [`mount`](Self::mount)
    pub fn batch_listeners(&self) -> &Arc<BatchListeners> {
        &self.batch_listeners
    }

    /// Apply one mutation list, in order. Listeners are not called here.
    pub fn mount(&mut self, list: &MutationList) -> MountResult<BatchReport> {
        self.check_thread()?;
        self.check_revision(list)?;

        for instruction in &list.instructions {
            self.apply(instruction)?;
        }

        self.revisions.insert(list.surface_id, list.revision);
        self.stats.batches += 1;
        self.stats.instructions += list.instructions.len() as u64;

        let report = BatchReport {
            surface_id: list.surface_id,
            revision: list.revision,
            instructions: list.instructions.len(),
        };
        log::trace!(
            "Mounted {} revision {} ({} instructions)",
            report.surface_id,
            report.revision,
            report.instructions
        );
        Ok(report)
    }

    /// Run a view manager command on a mounted view
    pub fn dispatch_command(&mut self, tag: Tag, command: &str, args: &[Value]) -> MountResult<()> {
        self.check_thread()?;

        let view = self.views.get_mut(&tag).ok_or(MountError::UnknownView(tag))?;
        let manager = self.managers.get(view.component())?;
        manager.run_command(view, command, args)?;
        self.stats.commands += 1;
        Ok(())
    }

    pub fn view(&self, tag: Tag) -> Option<&ViewInstance> {
        self.views.get(&tag)
    }

    pub fn view_exists(&self, tag: Tag) -> bool {
        self.views.contains_key(&tag)
    }

    pub fn children_of(&self, tag: Tag) -> Option<&[Tag]> {
        self.views.get(&tag).map(|v| v.children())
    }

    pub fn view_count(&self) -> usize {
        self.views.len()
    }

    pub fn stats(&self) -> &MountStats {
        &self.stats
    }

    pub fn config(&self) -> &MountConfig {
        &self.config
    }

    pub fn events(&self) -> &Arc<EventDispatcher> {
        &self.events
    }

    fn check_thread(&self) -> MountResult<()> {
        if let Some(queue) = &self.ui_queue {
            queue.assert_is_on_thread()?;
        }
        Ok(())
    }

    fn check_revision(&self, list: &MutationList) -> MountResult<()> {
        // Revision 0 starts a surface afresh
        if list.revision == 0 {
            return Ok(());
        }
        match self.revisions.get(&list.surface_id) {
            Some(&last) if list.revision <= last => Err(MountError::StaleRevision {
                surface: list.surface_id,
                revision: list.revision,
                last,
            }),
            _ => Ok(()),
        }
    }

    fn apply(&mut self, instruction: &MutationInstruction) -> MountResult<()> {
        match instruction {
            MutationInstruction::Create {
                tag,
                component,
                props,
                layout,
            } => self.create(*tag, component, props, *layout),
            MutationInstruction::Insert { parent, child, index } => {
                self.insert(*parent, *child, *index)
            }
            MutationInstruction::Remove { parent, child, index } => {
                self.remove(*parent, *child, *index)
            }
            MutationInstruction::Delete { tag } => self.delete(*tag),
            MutationInstruction::Update { tag, props, layout } => {
                self.update(*tag, props, *layout)
            }
        }
    }

    fn create(&mut self, tag: Tag, component: &str, props: &Props, layout: LayoutMetrics) -> MountResult<()> {
        if self.views.contains_key(&tag) {
            return Err(MountError::DuplicateView(tag));
        }

        let manager = Arc::clone(self.managers.get(component)?);
        let emitter = EventEmitter::new(tag, Arc::clone(&self.events));
        let mut view = ViewInstance::new(tag, component, manager.create_native(tag), emitter);

        for (key, value) in props {
            manager.apply_prop(&mut view, key, value)?;
        }
        view.props = props.clone();
        view.layout = layout;

        self.views.insert(tag, view);
        self.stats.views_created += 1;

        if layout != LayoutMetrics::default() {
            self.emit_layout(tag, layout);
        }
        Ok(())
    }

    fn insert(&mut self, parent: Tag, child: Tag, index: usize) -> MountResult<()> {
        if parent == child {
            return Err(MountError::ChildMismatch { parent, child, index });
        }

        let child_view = self.views.get(&child).ok_or(MountError::UnknownView(child))?;
        if child_view.parent.is_some() {
            return Err(MountError::StillAttached(child));
        }

        let parent_view = self.views.get_mut(&parent).ok_or(MountError::UnknownView(parent))?;
        let len = parent_view.children.len();
        let position = if index > len {
            if !self.config.clamp_invalid_indices {
                return Err(MountError::IndexOutOfRange { parent, index, len });
            }
            log::warn!(
                "Clamping insert of {} into {} from index {} to {}",
                child,
                parent,
                index,
                len
            );
            self.stats.clamped += 1;
            len
        } else {
            index
        };
        parent_view.children.insert(position, child);

        if let Some(child_view) = self.views.get_mut(&child) {
            child_view.parent = Some(parent);
        }
        Ok(())
    }

    fn remove(&mut self, parent: Tag, child: Tag, index: usize) -> MountResult<()> {
        if !self.views.contains_key(&child) {
            return Err(MountError::UnknownView(child));
        }

        let parent_view = self.views.get_mut(&parent).ok_or(MountError::UnknownView(parent))?;
        let position = if parent_view.children.get(index) == Some(&child) {
            index
        } else {
            let found = parent_view.children.iter().position(|c| *c == child);
            match found {
                Some(found) if self.config.clamp_invalid_indices => {
                    log::warn!(
                        "Removing {} from {} at index {} instead of {}",
                        child,
                        parent,
                        found,
                        index
                    );
                    self.stats.clamped += 1;
                    found
                }
                _ => return Err(MountError::ChildMismatch { parent, child, index }),
            }
        };
        parent_view.children.remove(position);

        if let Some(child_view) = self.views.get_mut(&child) {
            child_view.parent = None;
        }
        Ok(())
    }

    fn delete(&mut self, tag: Tag) -> MountResult<()> {
        let view = self.views.get(&tag).ok_or(MountError::UnknownView(tag))?;
        if view.parent.is_some() || !view.children.is_empty() {
            return Err(MountError::StillAttached(tag));
        }

        if let Some(mut view) = self.views.remove(&tag) {
            if let Ok(manager) = self.managers.get(view.component()) {
                manager.drop_view(&mut view);
            }
        }
        self.events.discard_for(tag);
        self.stats.views_deleted += 1;
        Ok(())
    }

    fn update(&mut self, tag: Tag, props: &Props, layout: LayoutMetrics) -> MountResult<()> {
        let view = self.views.get_mut(&tag).ok_or(MountError::UnknownView(tag))?;
        let manager = self.managers.get(view.component())?;

        let changed: Vec<(String, Value)> = props
            .iter()
            .filter(|(key, value)| view.props.get(*key) != Some(*value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let removed: Vec<String> = view
            .props
            .keys()
            .filter(|key| !props.contains_key(*key))
            .cloned()
            .collect();

        for (key, value) in &changed {
            manager.apply_prop(view, key, value)?;
        }
        for key in &removed {
            manager.apply_prop(view, key, &Value::Null)?;
        }
        view.props = props.clone();

        let frame_changed = view.layout != layout;
        view.layout = layout;

        if frame_changed {
            self.emit_layout(tag, layout);
        }
        Ok(())
    }

    fn emit_layout(&self, tag: Tag, layout: LayoutMetrics) {
        if !self.config.emit_layout_events {
            return;
        }
        let mut payload = Value::object();
        payload.set("layout", layout.to_value());
        self.events
            .dispatch(Event::new(tag, TOP_LAYOUT, payload).coalescable());
    }
}

impl std::fmt::Debug for MountingManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountingManager")
            .field("views", &self.views.len())
            .field("config", &self.config)
            .field("stats", &self.stats)
            .finish()
    }
}
