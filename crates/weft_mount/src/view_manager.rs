//! View managers
//!
//! A view manager is a capability table for one component: a factory for
//! the native handle, prop setters keyed by prop name and command handlers
//! keyed by command name. Managers are composed from closures.

use crate::error::{MountError, MountResult};
use crate::event::EventEmitter;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use weft_core::{Tag, Value};
use weft_fabric::{LayoutMetrics, Props};

/// Creates the native handle of a new view
pub type ViewFactory = Arc<dyn Fn(Tag) -> Box<dyn Any + Send> + Send + Sync>;

/// Applies one prop value. A removed prop is applied as `Value::Null`.
pub type PropSetter = Arc<dyn Fn(&mut ViewInstance, &Value) -> Result<(), String> + Send + Sync>;

/// Runs one command on a view
pub type CommandHandler =
    Arc<dyn Fn(&mut ViewInstance, &[Value]) -> Result<(), String> + Send + Sync>;

type DropHook = Arc<dyn Fn(&mut ViewInstance) + Send + Sync>;

/// A live native view, owned by the mounting manager
pub struct ViewInstance {
    tag: Tag,
    component: String,
    pub(crate) props: Props,
    pub(crate) layout: LayoutMetrics,
    pub(crate) parent: Option<Tag>,
    pub(crate) children: Vec<Tag>,
    native: Box<dyn Any + Send>,
    emitter: EventEmitter,
}

impl ViewInstance {
    pub(crate) fn new(
        tag: Tag,
        component: &str,
        native: Box<dyn Any + Send>,
        emitter: EventEmitter,
    ) -> Self {
        Self {
            tag,
            component: component.to_string(),
            props: Props::new(),
            layout: LayoutMetrics::default(),
            parent: None,
            children: Vec::new(),
            native,
            emitter,
        }
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    /// Props as last applied
    pub fn props(&self) -> &Props {
        &self.props
    }

    pub fn layout(&self) -> LayoutMetrics {
        self.layout
    }

    pub fn parent(&self) -> Option<Tag> {
        self.parent
    }

    pub fn children(&self) -> &[Tag] {
        &self.children
    }

    /// The native handle, if it has type `T`
    pub fn native<T: 'static>(&self) -> Option<&T> {
        self.native.downcast_ref::<T>()
    }

    pub fn native_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.native.downcast_mut::<T>()
    }

    /// Emitter for events originating from this view
    pub fn emitter(&self) -> &EventEmitter {
        &self.emitter
    }
}

impl fmt::Debug for ViewInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewInstance")
            .field("tag", &self.tag)
            .field("component", &self.component)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .finish()
    }
}

/// Capability table of one component
pub struct ViewManager {
    name: String,
    factory: ViewFactory,
    props: HashMap<String, PropSetter>,
    commands: HashMap<String, CommandHandler>,
    on_drop: Option<DropHook>,
}

impl ViewManager {
    pub fn builder(name: impl Into<String>) -> ViewManagerBuilder {
        ViewManagerBuilder {
            manager: ViewManager {
                name: name.into(),
                factory: Arc::new(|_: Tag| Box::new(()) as Box<dyn Any + Send>),
                props: HashMap::new(),
                commands: HashMap::new(),
                on_drop: None,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn create_native(&self, tag: Tag) -> Box<dyn Any + Send> {
        (self.factory)(tag)
    }

    /// Apply one prop. Props without a setter are kept in the snapshot only.
    pub(crate) fn apply_prop(&self, view: &mut ViewInstance, key: &str, value: &Value) -> MountResult<()> {
        match self.props.get(key) {
            Some(setter) => setter(view, value).map_err(|reason| MountError::PropRejected {
                tag: view.tag(),
                prop: key.to_string(),
                reason,
            }),
            None => {
                log::trace!("{} ignores prop {}", self.name, key);
                Ok(())
            }
        }
    }

    pub(crate) fn run_command(
        &self,
        view: &mut ViewInstance,
        command: &str,
        args: &[Value],
    ) -> MountResult<()> {
        let handler = self
            .commands
            .get(command)
            .ok_or_else(|| MountError::UnknownCommand {
                component: self.name.clone(),
                command: command.to_string(),
            })?;
        handler(view, args).map_err(|reason| MountError::CommandFailed {
            tag: view.tag(),
            command: command.to_string(),
            reason,
        })
    }

    pub(crate) fn drop_view(&self, view: &mut ViewInstance) {
        if let Some(hook) = &self.on_drop {
            hook(view);
        }
    }

    pub fn has_command(&self, command: &str) -> bool {
        self.commands.contains_key(command)
    }
}

impl fmt::Debug for ViewManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut props: Vec<&str> = self.props.keys().map(String::as_str).collect();
        props.sort_unstable();
        f.debug_struct("ViewManager")
            .field("name", &self.name)
            .field("props", &props)
            .finish()
    }
}

/// Builder for [`ViewManager`]
pub struct ViewManagerBuilder {
    manager: ViewManager,
}

impl ViewManagerBuilder {
    /// Factory producing the native handle of each new view
    pub fn factory<T, F>(mut self, factory: F) -> Self
    where
        T: Any + Send,
        F: Fn(Tag) -> T + Send + Sync + 'static,
    {
        self.manager.factory =
            Arc::new(move |tag: Tag| Box::new(factory(tag)) as Box<dyn Any + Send>);
        self
    }

    pub fn prop<F>(mut self, name: &str, setter: F) -> Self
    where
        F: Fn(&mut ViewInstance, &Value) -> Result<(), String> + Send + Sync + 'static,
    {
        self.manager.props.insert(name.to_string(), Arc::new(setter));
        self
    }

    pub fn command<F>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(&mut ViewInstance, &[Value]) -> Result<(), String> + Send + Sync + 'static,
    {
        self.manager.commands.insert(name.to_string(), Arc::new(handler));
        self
    }

    /// Hook run right before a view is released
    pub fn on_drop<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut ViewInstance) + Send + Sync + 'static,
    {
        self.manager.on_drop = Some(Arc::new(hook));
        self
    }

    pub fn build(self) -> ViewManager {
        self.manager
    }
}

/// View managers keyed by component name
#[derive(Debug, Default)]
pub struct ViewManagerRegistry {
    managers: HashMap<String, Arc<ViewManager>>,
}

impl ViewManagerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, manager: ViewManager) -> MountResult<()> {
        if self.managers.contains_key(manager.name()) {
            return Err(MountError::DuplicateManager(manager.name().to_string()));
        }
        self.managers
            .insert(manager.name().to_string(), Arc::new(manager));
        Ok(())
    }

    pub fn get(&self, component: &str) -> MountResult<&Arc<ViewManager>> {
        self.managers
            .get(component)
            .ok_or_else(|| MountError::UnknownComponent(component.to_string()))
    }

    pub fn contains(&self, component: &str) -> bool {
        self.managers.contains_key(component)
    }

    pub fn len(&self) -> usize {
        self.managers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }
}
