//! Queue configuration - the three role queues of one instance

use crate::queue::{MessageQueueThread, QueueExceptionHandler, QueueResult, QueueRole};
use std::sync::Arc;

/// Thread names for the three role queues
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfigurationSpec {
    pub script_runtime_name: String,
    pub native_modules_name: String,
    pub ui_name: String,
}

impl Default for QueueConfigurationSpec {
    fn default() -> Self {
        Self {
            script_runtime_name: "weft-js".to_string(),
            native_modules_name: "weft-native-modules".to_string(),
            ui_name: "weft-ui".to_string(),
        }
    }
}

impl QueueConfigurationSpec {
    /// Prefix every queue name, e.g. to tell instances apart in thread dumps
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.script_runtime_name = format!("{prefix}-{}", self.script_runtime_name);
        self.native_modules_name = format!("{prefix}-{}", self.native_modules_name);
        self.ui_name = format!("{prefix}-{}", self.ui_name);
        self
    }
}

/// The running queues of one instance
#[derive(Debug)]
pub struct QueueConfiguration {
    script_runtime: Arc<MessageQueueThread>,
    native_modules: Arc<MessageQueueThread>,
    ui: Arc<MessageQueueThread>,
}

impl QueueConfiguration {
    /// Spawn all three queues. Every queue reports task panics to `handler`.
    pub fn create(
        spec: &QueueConfigurationSpec,
        handler: QueueExceptionHandler,
    ) -> QueueResult<Self> {
        let spawn = |role, name: &str| -> QueueResult<Arc<MessageQueueThread>> {
            let queue = MessageQueueThread::spawn(role, name)?;
            queue.set_exception_handler(Arc::clone(&handler));
            Ok(Arc::new(queue))
        };

        let ui = spawn(QueueRole::Ui, &spec.ui_name)?;
        let native_modules = spawn(QueueRole::NativeModules, &spec.native_modules_name)?;
        let script_runtime = spawn(QueueRole::ScriptRuntime, &spec.script_runtime_name)?;

        Ok(Self {
            script_runtime,
            native_modules,
            ui,
        })
    }

    pub fn script_runtime(&self) -> &Arc<MessageQueueThread> {
        &self.script_runtime
    }

    pub fn native_modules(&self) -> &Arc<MessageQueueThread> {
        &self.native_modules
    }

    pub fn ui(&self) -> &Arc<MessageQueueThread> {
        &self.ui
    }

    /// Queue bound to `role`
    pub fn queue(&self, role: QueueRole) -> &Arc<MessageQueueThread> {
        match role {
            QueueRole::ScriptRuntime => &self.script_runtime,
            QueueRole::NativeModules => &self.native_modules,
            QueueRole::Ui => &self.ui,
        }
    }

    /// Whether the calling thread belongs to one of these queues
    pub fn current_role(&self) -> Option<QueueRole> {
        [QueueRole::ScriptRuntime, QueueRole::NativeModules, QueueRole::Ui]
            .into_iter()
            .find(|role| self.queue(*role).is_on_thread())
    }

    /// Quit every queue: native modules first, then the script runtime,
    /// then UI. Each queue drains before it is joined.
    pub fn destroy(&self) {
        self.native_modules.quit_synchronous();
        self.script_runtime.quit_synchronous();
        self.ui.quit_synchronous();
    }
}
