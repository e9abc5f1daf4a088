use crate::attach_arguments::AttachArguments;
use crate::error::{BridgeError, JniError, Result};
use crate::runtime::{AttachOutcome, Fault, Runtime};
use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};
use tracing::{debug, info, warn};

/// Who created a thread context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOrigin {
    /// A host thread asked to be attached.
    Host,
    /// The Java VM called into Rust on one of its own threads.
    Callback,
}

/// Proof that the current thread is attached to a Java VM.
///
/// Every cross-runtime operation takes a `&ThreadContext`. Contexts are tied to the thread that
/// created them and can't be sent to another one.
#[derive(Clone)]
pub struct ThreadContext {
    vm: u64,
    id: u64,
    origin: AttachOrigin,
    contexts: Arc<ThreadContexts>,
    _not_send: PhantomData<*const ()>,
}

impl ThreadContext {
    pub fn vm_id(&self) -> u64 {
        self.vm
    }

    pub fn origin(&self) -> AttachOrigin {
        self.origin
    }

    /// Whether the context still holds the thread's attachment.
    pub fn is_attached(&self) -> bool {
        self.contexts.current_id() == Some(self.id)
    }

    /// Fail unless the context is still attached to the VM `vm`.
    pub(crate) fn verify(&self, vm: u64) -> Result<()> {
        if self.vm != vm {
            return Err(BridgeError::ThreadNotAttached);
        }
        if self.contexts.closed.load(Ordering::Acquire) {
            return Err(BridgeError::VmShutDown);
        }
        if !self.is_attached() {
            return Err(BridgeError::ThreadNotAttached);
        }
        Ok(())
    }
}

impl PartialEq for ThreadContext {
    fn eq(&self, other: &Self) -> bool {
        self.vm == other.vm && self.id == other.id
    }
}

impl Eq for ThreadContext {}

impl fmt::Debug for ThreadContext {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ThreadContext")
            .field("vm", &self.vm)
            .field("id", &self.id)
            .field("origin", &self.origin)
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
struct AttachRecord {
    id: u64,
    origin: AttachOrigin,
    /// The thread was attached before we saw it; it is not ours to detach.
    foreign: bool,
}

/// The attachment table of one Java VM.
pub struct ThreadContexts {
    vm: u64,
    runtime: Arc<dyn Runtime>,
    attached: Mutex<HashMap<ThreadId, AttachRecord>>,
    /// Threads still attached when the table was closed. They detach on their own thread.
    orphaned: Mutex<HashMap<ThreadId, AttachRecord>>,
    next_id: AtomicU64,
    leaked: AtomicUsize,
    closed: AtomicBool,
}

impl fmt::Debug for ThreadContexts {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ThreadContexts")
            .field("vm", &self.vm)
            .field("attached", &self.attached_count())
            .field("leaked", &self.leaked_count())
            .finish()
    }
}

impl ThreadContexts {
    pub(crate) fn new(vm: u64, runtime: Arc<dyn Runtime>) -> Self {
        ThreadContexts {
            vm,
            runtime,
            attached: Mutex::new(HashMap::new()),
            orphaned: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            leaked: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Attach the current thread, or return its existing context.
    pub fn ensure_attached(
        self: &Arc<Self>,
        arguments: &AttachArguments,
    ) -> Result<ThreadContext> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BridgeError::VmShutDown);
        }
        let thread = thread::current().id();
        if let Some(record) = self.attached.lock().get(&thread).cloned() {
            return Ok(self.context(record));
        }
        let outcome = self
            .runtime
            .attach_current_thread(arguments)
            .map_err(attach_error)?;
        let record = AttachRecord {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            origin: AttachOrigin::Host,
            foreign: outcome == AttachOutcome::AlreadyAttached,
        };
        self.attached.lock().insert(thread, record);
        watch_thread_exit(thread, self);
        info!(
            vm = self.vm,
            context = record.id,
            thread = ?arguments.thread_name(),
            daemon = arguments.is_daemon(),
            foreign = record.foreign,
            "attached thread"
        );
        Ok(self.context(record))
    }

    /// Detach the thread owning `context`. Threads attached by other code stay attached to the
    /// Java VM but lose their context.
    ///
    /// Works after the VM was shut down too, for threads that were still attached then.
    pub fn detach(&self, context: ThreadContext) -> Result<()> {
        if context.vm != self.vm {
            return Err(BridgeError::ThreadNotAttached);
        }
        let thread = thread::current().id();
        let record = take_record(&self.attached, thread, context.id)
            .or_else(|| take_record(&self.orphaned, thread, context.id))
            .ok_or(BridgeError::ThreadNotAttached)?;
        if !record.foreign {
            self.runtime
                .detach_current_thread()
                .map_err(attach_error)?;
        }
        info!(vm = self.vm, context = record.id, "detached thread");
        Ok(())
    }

    /// A context for a Java thread calling into Rust. The flag says whether the context was
    /// created for this call and must be handed back to [`exit_callback`](#method.exit_callback).
    pub(crate) fn enter_callback(self: &Arc<Self>) -> Result<(ThreadContext, bool)> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BridgeError::VmShutDown);
        }
        let thread = thread::current().id();
        if let Some(record) = self.attached.lock().get(&thread).cloned() {
            return Ok((self.context(record), false));
        }
        if !self.runtime.is_current_thread_attached() {
            return Err(BridgeError::ThreadNotAttached);
        }
        let record = AttachRecord {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            origin: AttachOrigin::Callback,
            foreign: true,
        };
        self.attached.lock().insert(thread, record);
        debug!(vm = self.vm, context = record.id, "entered callback");
        Ok((self.context(record), true))
    }

    /// Forget a callback context. The thread belongs to the Java VM and stays attached.
    pub(crate) fn exit_callback(&self, context: ThreadContext, created: bool) {
        if !created {
            return;
        }
        let thread = thread::current().id();
        if take_record(&self.attached, thread, context.id).is_none() {
            take_record(&self.orphaned, thread, context.id);
        }
    }

    pub fn is_current_thread_attached(&self) -> bool {
        self.current_id().is_some()
    }

    /// Threads currently holding a context.
    pub fn attached_count(&self) -> usize {
        self.attached.lock().len()
    }

    /// Threads that exited without detaching.
    pub fn leaked_count(&self) -> usize {
        self.leaked.load(Ordering::Relaxed)
    }

    /// Threads that were attached when the table closed and have not detached since.
    pub fn orphaned_count(&self) -> usize {
        self.orphaned.lock().len()
    }

    /// Invalidate every context. Returns whether the current thread must be detached from the
    /// VM. Other threads keep their attachment until they detach or exit.
    pub(crate) fn close(&self) -> bool {
        self.closed.store(true, Ordering::Release);
        let mut attached = self.attached.lock();
        let current = attached.remove(&thread::current().id());
        let mut orphaned = self.orphaned.lock();
        for (thread, record) in attached.drain() {
            if record.origin == AttachOrigin::Host {
                warn!(
                    vm = self.vm,
                    context = record.id,
                    foreign = record.foreign,
                    "thread is still attached at shutdown"
                );
            }
            orphaned.insert(thread, record);
        }
        current.map(|record| !record.foreign).unwrap_or(false)
    }

    fn current_id(&self) -> Option<u64> {
        self.attached
            .lock()
            .get(&thread::current().id())
            .map(|record| record.id)
    }

    fn context(self: &Arc<Self>, record: AttachRecord) -> ThreadContext {
        ThreadContext {
            vm: self.vm,
            id: record.id,
            origin: record.origin,
            contexts: self.clone(),
            _not_send: PhantomData,
        }
    }

    /// Called from the exiting thread itself, after its other thread-locals may be gone.
    fn thread_exited(&self, thread: ThreadId) {
        let record = self.attached.lock().remove(&thread);
        let record = match record.or_else(|| self.orphaned.lock().remove(&thread)) {
            Some(record) => record,
            None => return,
        };
        self.leaked.fetch_add(1, Ordering::Relaxed);
        warn!(
            vm = self.vm,
            context = record.id,
            "thread exited while attached to the Java VM"
        );
        if !record.foreign {
            if let Err(fault) = self.runtime.detach_current_thread() {
                warn!(vm = self.vm, ?fault, "failed to detach an exiting thread");
            }
        }
    }
}

fn take_record(
    table: &Mutex<HashMap<ThreadId, AttachRecord>>,
    thread: ThreadId,
    id: u64,
) -> Option<AttachRecord> {
    let mut table = table.lock();
    match table.get(&thread) {
        Some(record) if record.id == id => table.remove(&thread),
        _ => None,
    }
}

fn attach_error(fault: Fault) -> BridgeError {
    match fault {
        Fault::Jni(error) => BridgeError::Attach(error),
        Fault::OutOfMemory => BridgeError::Attach(JniError::NotEnoughMemory),
        Fault::Thrown(_) => BridgeError::Attach(JniError::Unknown(jni_sys::JNI_ERR)),
    }
}

/// Per-thread list of attachment tables to notify when the thread exits.
struct ExitWatch {
    thread: Option<ThreadId>,
    tables: Vec<Weak<ThreadContexts>>,
}

impl Drop for ExitWatch {
    fn drop(&mut self) {
        let thread = match self.thread {
            Some(thread) => thread,
            None => return,
        };
        for table in self.tables.drain(..) {
            if let Some(table) = table.upgrade() {
                table.thread_exited(thread);
            }
        }
    }
}

thread_local! {
    static EXIT_WATCH: RefCell<ExitWatch> = RefCell::new(ExitWatch {
        thread: None,
        tables: vec![],
    });
}

fn watch_thread_exit(thread: ThreadId, table: &Arc<ThreadContexts>) {
    let watched = EXIT_WATCH.try_with(|watch| {
        let mut watch = watch.borrow_mut();
        watch.thread = Some(thread);
        watch.tables.retain(|other| other.strong_count() > 0);
        if !watch
            .tables
            .iter()
            .any(|other| ptr_eq(other, table))
        {
            watch.tables.push(Arc::downgrade(table));
        }
    });
    if watched.is_err() {
        debug!("thread is exiting, not watching it");
    }
}

fn ptr_eq(weak: &Weak<ThreadContexts>, table: &Arc<ThreadContexts>) -> bool {
    weak.upgrade()
        .map(|other| Arc::ptr_eq(&other, table))
        .unwrap_or(false)
}

#[cfg(test)]
mod thread_context_tests {
    use super::*;
    use crate::config::Configuration;
    use crate::testing::FakeRuntime;
    use std::sync::mpsc;

    fn setup() -> (Arc<FakeRuntime>, Arc<ThreadContexts>) {
        let runtime = Arc::new(FakeRuntime::new());
        let contexts = Arc::new(ThreadContexts::new(3, runtime.clone()));
        (runtime, contexts)
    }

    fn arguments() -> AttachArguments {
        AttachArguments::new(&Configuration::new())
    }

    #[test]
    fn ensure_attached_is_idempotent() {
        let (runtime, contexts) = setup();
        let first = contexts.ensure_attached(&arguments()).unwrap();
        let second = contexts.ensure_attached(&arguments()).unwrap();
        assert_eq!(first, second);
        assert_eq!(runtime.stats().attaches, 1);
        assert_eq!(contexts.attached_count(), 1);
        assert_eq!(first.origin(), AttachOrigin::Host);
    }

    #[test]
    fn detach() {
        let (runtime, contexts) = setup();
        let context = contexts.ensure_attached(&arguments()).unwrap();
        let copy = context.clone();
        contexts.detach(context).unwrap();
        assert!(!copy.is_attached());
        assert_eq!(runtime.stats().detaches, 1);
        match copy.verify(3) {
            Err(BridgeError::ThreadNotAttached) => {}
            other => panic!("unexpected result {:?}", other),
        }
        match contexts.detach(copy) {
            Err(BridgeError::ThreadNotAttached) => {}
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn reattach_gets_a_new_context() {
        let (_runtime, contexts) = setup();
        let first = contexts.ensure_attached(&arguments()).unwrap();
        let copy = first.clone();
        contexts.detach(first).unwrap();
        let second = contexts.ensure_attached(&arguments()).unwrap();
        assert_ne!(copy, second);
        assert!(second.is_attached());
    }

    #[test]
    fn foreign_thread_is_not_detached() {
        let (runtime, contexts) = setup();
        runtime.adopt_current_thread();
        let context = contexts.ensure_attached(&arguments()).unwrap();
        contexts.detach(context).unwrap();
        assert_eq!(runtime.stats().detaches, 0);
        assert!(runtime.is_current_thread_attached());
    }

    #[test]
    fn attach_failure() {
        let (runtime, contexts) = setup();
        runtime.fail_next_attach(JniError::NotEnoughMemory);
        match contexts.ensure_attached(&arguments()) {
            Err(BridgeError::Attach(JniError::NotEnoughMemory)) => {}
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(contexts.attached_count(), 0);
    }

    #[test]
    fn thread_exit_while_attached() {
        let (runtime, contexts) = setup();
        let table = contexts.clone();
        thread::spawn(move || {
            table.ensure_attached(&arguments()).unwrap();
        })
        .join()
        .unwrap();
        assert_eq!(contexts.leaked_count(), 1);
        assert_eq!(contexts.attached_count(), 0);
        assert_eq!(runtime.stats().detaches, 1);
    }

    #[test]
    fn thread_exit_after_detach() {
        let (runtime, contexts) = setup();
        let table = contexts.clone();
        thread::spawn(move || {
            let context = table.ensure_attached(&arguments()).unwrap();
            table.detach(context).unwrap();
        })
        .join()
        .unwrap();
        assert_eq!(contexts.leaked_count(), 0);
        assert_eq!(runtime.stats().detaches, 1);
    }

    #[test]
    fn callbacks() {
        let (runtime, contexts) = setup();
        match contexts.enter_callback() {
            Err(BridgeError::ThreadNotAttached) => {}
            other => panic!("unexpected result {:?}", other),
        }
        runtime.adopt_current_thread();
        let (context, created) = contexts.enter_callback().unwrap();
        assert!(created);
        assert_eq!(context.origin(), AttachOrigin::Callback);
        let (nested, nested_created) = contexts.enter_callback().unwrap();
        assert!(!nested_created);
        assert_eq!(nested, context);
        contexts.exit_callback(nested, nested_created);
        assert!(context.is_attached());
        contexts.exit_callback(context, created);
        assert_eq!(contexts.attached_count(), 0);
        assert!(runtime.is_current_thread_attached());
    }

    #[test]
    fn close() {
        let (_runtime, contexts) = setup();
        let context = contexts.ensure_attached(&arguments()).unwrap();
        assert!(contexts.close());
        match context.verify(3) {
            Err(BridgeError::VmShutDown) => {}
            other => panic!("unexpected result {:?}", other),
        }
        match contexts.ensure_attached(&arguments()) {
            Err(BridgeError::VmShutDown) => {}
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn close_leaves_other_threads_to_detach() {
        let (runtime, contexts) = setup();
        let (attached_tx, attached_rx) = mpsc::channel();
        let (closed_tx, closed_rx) = mpsc::channel();
        let table = contexts.clone();
        let worker = thread::spawn(move || {
            let context = table.ensure_attached(&arguments()).unwrap();
            attached_tx.send(()).unwrap();
            closed_rx.recv().unwrap();
            assert!(!context.is_attached());
            table.detach(context)
        });
        attached_rx.recv().unwrap();
        assert!(!contexts.close());
        assert_eq!(contexts.attached_count(), 0);
        assert_eq!(contexts.orphaned_count(), 1);
        closed_tx.send(()).unwrap();
        worker.join().unwrap().unwrap();
        assert_eq!(contexts.orphaned_count(), 0);
        assert_eq!(contexts.leaked_count(), 0);
        let stats = runtime.stats();
        assert_eq!(stats.attaches, 1);
        assert_eq!(stats.detaches, 1);
    }

    #[test]
    fn close_then_thread_exit() {
        let (runtime, contexts) = setup();
        let (attached_tx, attached_rx) = mpsc::channel();
        let (closed_tx, closed_rx) = mpsc::channel::<()>();
        let table = contexts.clone();
        let worker = thread::spawn(move || {
            table.ensure_attached(&arguments()).unwrap();
            attached_tx.send(()).unwrap();
            closed_rx.recv().unwrap();
        });
        attached_rx.recv().unwrap();
        contexts.close();
        closed_tx.send(()).unwrap();
        worker.join().unwrap();
        assert_eq!(contexts.orphaned_count(), 0);
        assert_eq!(contexts.leaked_count(), 1);
        assert_eq!(runtime.stats().detaches, 1);
    }

    #[test]
    fn wrong_vm() {
        let (_runtime, contexts) = setup();
        let context = contexts.ensure_attached(&arguments()).unwrap();
        match context.verify(4) {
            Err(BridgeError::ThreadNotAttached) => {}
            other => panic!("unexpected result {:?}", other),
        }
    }
}
