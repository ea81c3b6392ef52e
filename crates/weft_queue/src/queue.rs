//! Single-threaded FIFO task executors
//!
//! A `MessageQueueThread` owns one OS thread bound to a [`QueueRole`]. Any
//! thread may enqueue; only the owning thread runs tasks, strictly in
//! enqueue order.

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use thiserror::Error;

/// The logical role a queue is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueRole {
    /// Runs the script runtime and drains its event queue
    ScriptRuntime,
    /// Runs native module methods
    NativeModules,
    /// Applies mount batches to the native view hierarchy
    Ui,
}

impl QueueRole {
    /// Role of the queue the calling thread belongs to, if any
    pub fn current() -> Option<QueueRole> {
        CURRENT.with(|current| current.borrow().as_ref().map(|shared| shared.role))
    }
}

impl fmt::Display for QueueRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScriptRuntime => write!(f, "script-runtime"),
            Self::NativeModules => write!(f, "native-modules"),
            Self::Ui => write!(f, "ui"),
        }
    }
}

/// Errors from queue operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("queue '{0}' has been stopped")]
    Stopped(String),

    #[error("blocking call from '{from}' into '{to}' would deadlock")]
    WouldDeadlock { from: String, to: String },

    #[error("task panicked on '{queue}': {message}")]
    TaskPanicked { queue: String, message: String },

    #[error("failed to spawn queue thread '{name}': {reason}")]
    SpawnFailed { name: String, reason: String },

    #[error("expected to run on '{expected}' but running on '{actual}'")]
    WrongThread { expected: String, actual: String },
}

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Receives panics that escaped a queue task
pub type QueueExceptionHandler = Arc<dyn Fn(QueueRole, &str) + Send + Sync>;

type Task = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Run(Task),
    Quit,
}

static NEXT_QUEUE_ID: AtomicU64 = AtomicU64::new(1);

struct QueueShared {
    id: u64,
    role: QueueRole,
    name: String,
    accepting: AtomicBool,
    /// Id of the queue this queue's thread is blocked on (0 = none)
    waiting_on: AtomicU64,
    exception_handler: RwLock<Option<QueueExceptionHandler>>,
}

thread_local! {
    static CURRENT: RefCell<Option<Arc<QueueShared>>> = const { RefCell::new(None) };
}

/// A strictly single-threaded FIFO executor
pub struct MessageQueueThread {
    shared: Arc<QueueShared>,
    sender: Sender<Message>,
    thread_id: ThreadId,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl MessageQueueThread {
    /// Spawn a new queue thread bound to `role`
    pub fn spawn(role: QueueRole, name: impl Into<String>) -> QueueResult<Self> {
        let name = name.into();
        let (sender, receiver) = unbounded();

        let shared = Arc::new(QueueShared {
            id: NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed),
            role,
            name: name.clone(),
            accepting: AtomicBool::new(true),
            waiting_on: AtomicU64::new(0),
            exception_handler: RwLock::new(None),
        });

        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_loop(worker_shared, receiver))
            .map_err(|e| QueueError::SpawnFailed {
                name: name.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            shared,
            sender,
            thread_id: handle.thread().id(),
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Queue name (also the thread name)
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Role this queue is bound to
    pub fn role(&self) -> QueueRole {
        self.shared.role
    }

    /// Whether the queue still accepts tasks
    pub fn is_running(&self) -> bool {
        self.shared.accepting.load(Ordering::SeqCst)
    }

    /// Install the handler that receives panics escaping tasks
    pub fn set_exception_handler(&self, handler: QueueExceptionHandler) {
        *self.shared.exception_handler.write() = Some(handler);
    }

    /// Whether the calling thread is this queue's thread
    pub fn is_on_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Fail unless the calling thread is this queue's thread
    pub fn assert_is_on_thread(&self) -> QueueResult<()> {
        if self.is_on_thread() {
            return Ok(());
        }
        let actual = CURRENT
            .with(|current| current.borrow().as_ref().map(|shared| shared.name.clone()))
            .unwrap_or_else(|| {
                thread::current()
                    .name()
                    .unwrap_or("<unnamed>")
                    .to_string()
            });
        Err(QueueError::WrongThread {
            expected: self.shared.name.clone(),
            actual,
        })
    }

    /// Enqueue a task. Returns immediately.
    pub fn run_on_queue<F>(&self, task: F) -> QueueResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if !self.is_running() {
            return Err(QueueError::Stopped(self.shared.name.clone()));
        }
        self.sender
            .send(Message::Run(Box::new(task)))
            .map_err(|_| QueueError::Stopped(self.shared.name.clone()))
    }

    /// Run a task on this queue and block the caller until it returns.
    ///
    /// Fails with `WouldDeadlock` when called from this queue itself, or from
    /// a queue this queue is currently blocked on.
    pub fn run_on_queue_sync<T, F>(&self, task: F) -> QueueResult<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let caller = CURRENT.with(|current| current.borrow().clone());

        if let Some(caller) = &caller {
            if caller.id == self.shared.id {
                return Err(self.deadlock_error(caller));
            }
            caller.waiting_on.store(self.shared.id, Ordering::SeqCst);
            if self.shared.waiting_on.load(Ordering::SeqCst) == caller.id {
                caller.waiting_on.store(0, Ordering::SeqCst);
                return Err(self.deadlock_error(caller));
            }
        }

        let (result_tx, result_rx) = bounded(1);
        let enqueued = self.run_on_queue(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(task))
                .map_err(|payload| panic_message(payload.as_ref()));
            let _ = result_tx.send(result);
        });

        let received = match enqueued {
            Ok(()) => result_rx.recv().ok(),
            Err(_) => None,
        };

        if let Some(caller) = &caller {
            caller.waiting_on.store(0, Ordering::SeqCst);
        }

        match received {
            Some(Ok(value)) => Ok(value),
            Some(Err(message)) => Err(QueueError::TaskPanicked {
                queue: self.shared.name.clone(),
                message,
            }),
            None => Err(QueueError::Stopped(self.shared.name.clone())),
        }
    }

    /// Stop accepting tasks, let already-enqueued tasks drain, then join.
    ///
    /// When called from the queue's own thread the join is skipped; the
    /// thread exits after the current task.
    pub fn quit_synchronous(&self) {
        if self.shared.accepting.swap(false, Ordering::SeqCst) {
            let _ = self.sender.send(Message::Quit);
        }

        if self.is_on_thread() {
            return;
        }

        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                log::error!("Queue '{}' thread terminated abnormally", self.shared.name);
            }
        }
    }

    fn deadlock_error(&self, caller: &QueueShared) -> QueueError {
        QueueError::WouldDeadlock {
            from: caller.name.clone(),
            to: self.shared.name.clone(),
        }
    }
}

impl Drop for MessageQueueThread {
    fn drop(&mut self) {
        self.quit_synchronous();
    }
}

impl fmt::Debug for MessageQueueThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageQueueThread")
            .field("name", &self.shared.name)
            .field("role", &self.shared.role)
            .field("running", &self.is_running())
            .finish()
    }
}

fn run_loop(shared: Arc<QueueShared>, receiver: Receiver<Message>) {
    CURRENT.with(|current| *current.borrow_mut() = Some(Arc::clone(&shared)));
    log::debug!("Queue '{}' started", shared.name);

    while let Ok(message) = receiver.recv() {
        match message {
            Message::Run(task) => {
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
                    let message = panic_message(payload.as_ref());
                    log::error!("Task panicked on queue '{}': {}", shared.name, message);
                    let handler = shared.exception_handler.read().clone();
                    if let Some(handler) = handler {
                        handler(shared.role, &message);
                    }
                }
            }
            Message::Quit => break,
        }
    }

    let dropped = receiver.try_iter().count();
    if dropped > 0 {
        log::debug!(
            "Queue '{}' dropped {} task(s) enqueued after quit",
            shared.name,
            dropped
        );
    }

    CURRENT.with(|current| *current.borrow_mut() = None);
    log::debug!("Queue '{}' stopped", shared.name);
}

/// Extract a readable message from a caught panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn queue(role: QueueRole, name: &str) -> Arc<MessageQueueThread> {
        let _ = env_logger::builder().is_test(true).try_init();
        Arc::new(MessageQueueThread::spawn(role, name).unwrap())
    }

    #[test]
    fn test_tasks_run_in_enqueue_order() {
        let q = queue(QueueRole::NativeModules, "test-fifo");
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..100 {
            let seen = Arc::clone(&seen);
            q.run_on_queue(move || seen.lock().push(i)).unwrap();
        }
        q.run_on_queue_sync(|| ()).unwrap();

        assert_eq!(*seen.lock(), (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_role_is_visible_inside_tasks() {
        let q = queue(QueueRole::Ui, "test-role");
        let role = q.run_on_queue_sync(QueueRole::current).unwrap();
        assert_eq!(role, Some(QueueRole::Ui));
        assert_eq!(QueueRole::current(), None);
    }

    #[test]
    fn test_assert_is_on_thread() {
        let q = queue(QueueRole::Ui, "test-assert");
        assert!(q.assert_is_on_thread().is_err());

        let inner = Arc::clone(&q);
        let result = q.run_on_queue_sync(move || inner.assert_is_on_thread()).unwrap();
        assert!(result.is_ok());
    }

    #[test]
    fn test_sync_call_into_same_queue_is_refused() {
        let q = queue(QueueRole::NativeModules, "test-self");
        let inner = Arc::clone(&q);
        let result = q
            .run_on_queue_sync(move || inner.run_on_queue_sync(|| 1))
            .unwrap();
        assert!(matches!(result, Err(QueueError::WouldDeadlock { .. })));
    }

    #[test]
    fn test_nested_blocking_on_same_pair_is_refused() {
        let a = queue(QueueRole::ScriptRuntime, "test-a");
        let b = queue(QueueRole::NativeModules, "test-b");

        let a_inner = Arc::clone(&a);
        let b_inner = Arc::clone(&b);
        // a blocks on b, and b then tries to block on a
        let result = a
            .run_on_queue_sync(move || {
                b_inner.run_on_queue_sync(move || a_inner.run_on_queue_sync(|| 7))
            })
            .unwrap();

        let inner = result.unwrap();
        assert!(matches!(inner, Err(QueueError::WouldDeadlock { .. })));
    }

    #[test]
    fn test_panicking_task_is_reported_and_queue_survives() {
        let q = queue(QueueRole::NativeModules, "test-panic");
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reports);
        q.set_exception_handler(Arc::new(move |role: QueueRole, message: &str| {
            sink.lock().push((role, message.to_string()));
        }));

        q.run_on_queue(|| panic!("boom")).unwrap();
        assert_eq!(q.run_on_queue_sync(|| 5).unwrap(), 5);

        let reports = reports.lock();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].0, QueueRole::NativeModules);
        assert!(reports[0].1.contains("boom"));
    }

    #[test]
    fn test_panicking_sync_task_returns_error() {
        let q = queue(QueueRole::NativeModules, "test-sync-panic");
        let result: QueueResult<()> = q.run_on_queue_sync(|| panic!("sync boom"));
        assert!(matches!(result, Err(QueueError::TaskPanicked { .. })));
    }

    #[test]
    fn test_quit_drains_pending_tasks_and_rejects_new_ones() {
        let q = queue(QueueRole::ScriptRuntime, "test-quit");
        let ran = Arc::new(AtomicU64::new(0));

        for _ in 0..10 {
            let ran = Arc::clone(&ran);
            q.run_on_queue(move || {
                thread::sleep(Duration::from_millis(1));
                ran.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        q.quit_synchronous();
        assert_eq!(ran.load(Ordering::SeqCst), 10);
        assert!(!q.is_running());
        assert!(matches!(q.run_on_queue(|| ()), Err(QueueError::Stopped(_))));
        assert!(matches!(q.run_on_queue_sync(|| ()), Err(QueueError::Stopped(_))));
    }
}
