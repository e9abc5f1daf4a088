use crate::attach_arguments::AttachArguments;
use crate::config::Configuration;
use crate::error::{BridgeError, Result};
use crate::exception::ExceptionTranslator;
use crate::jni::JniRuntime;
use crate::marshal::{ArrayStrategy, Marshaller};
use crate::proxy::{self, ProxyHandle, ProxyRegistration, ProxyTable, ProxyTarget, ReleaseOutcome};
use crate::registry::{JavaObject, NativeRef, ReferenceRegistry};
use crate::runtime::{AttachOutcome, Runtime};
use crate::thread::{ThreadContext, ThreadContexts};
use crate::types::{MethodSignature, TypeCache, TypeDescriptor};
use crate::value::Value;
use crate::version::JniVersion;
use lazy_static::lazy_static;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Creates the runtime behind a new [`VmHandle`](struct.VmHandle.html).
#[cfg_attr(test, mockall::automock)]
pub trait Launcher: Send + Sync {
    fn launch(&self, configuration: &Configuration) -> Result<Arc<dyn Runtime>>;
}

/// Launches a Java VM in this process with `JNI_CreateJavaVM`.
///
/// Requires the `libjvm` feature; without it launching fails with
/// [`Startup`](enum.BridgeError.html#variant.Startup).
#[derive(Debug, Default, Clone, Copy)]
pub struct JniLauncher;

impl Launcher for JniLauncher {
    fn launch(&self, configuration: &Configuration) -> Result<Arc<dyn Runtime>> {
        Ok(Arc::new(JniRuntime::create(configuration)?))
    }
}

/// Resource counts of a running VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VmStats {
    /// Outstanding [`NativeRef`](struct.NativeRef.html) leases.
    pub live_references: usize,
    pub attached_threads: usize,
    /// Threads that exited while attached.
    pub leaked_threads: usize,
    /// Reverse calls currently running a proxy target.
    pub in_flight_calls: usize,
    pub live_proxies: usize,
    pub cached_types: usize,
}

impl VmStats {
    fn outstanding(&self) -> bool {
        self.live_references > 0
            || self.attached_threads > 0
            || self.in_flight_calls > 0
            || self.live_proxies > 0
    }
}

impl fmt::Display for VmStats {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "{} live references, {} attached threads, {} calls in flight, {} live proxies",
            self.live_references, self.attached_threads, self.in_flight_calls, self.live_proxies
        )
    }
}

struct VmShared {
    id: u64,
    runtime: Arc<dyn Runtime>,
    registry: Arc<ReferenceRegistry>,
    threads: Arc<ThreadContexts>,
    types: TypeCache,
    proxies: ProxyTable,
    configuration: Configuration,
    /// Whether shutting down destroys the Java VM.
    owned: bool,
    alive: AtomicBool,
    in_flight: AtomicUsize,
}

impl Drop for VmShared {
    fn drop(&mut self) {
        LIVE_VMS.lock().remove(&self.id);
        if self.alive.load(Ordering::Acquire) {
            debug!(vm = self.id, "dropped the last handle of a running VM");
        }
    }
}

static NEXT_VM_ID: AtomicU64 = AtomicU64::new(1);

lazy_static! {
    /// Running VMs by id, for calls arriving from Java.
    static ref LIVE_VMS: Mutex<HashMap<u64, Weak<VmShared>>> = Mutex::new(HashMap::new());
    static ref GLOBAL: Embedding = Embedding::new();
}

/// A running embedded Java VM.
///
/// Cheap to clone; clones share one VM. Once the VM is shut down, every operation fails with
/// [`VmShutDown`](enum.BridgeError.html#variant.VmShutDown).
#[derive(Clone)]
pub struct VmHandle(Arc<VmShared>);

impl VmHandle {
    fn new(runtime: Arc<dyn Runtime>, configuration: &Configuration, owned: bool) -> Self {
        let id = NEXT_VM_ID.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::new(VmShared {
            id,
            registry: Arc::new(ReferenceRegistry::new(id, runtime.clone())),
            threads: Arc::new(ThreadContexts::new(id, runtime.clone())),
            runtime,
            types: TypeCache::new(),
            proxies: ProxyTable::new(),
            configuration: configuration.clone(),
            owned,
            alive: AtomicBool::new(true),
            in_flight: AtomicUsize::new(0),
        });
        LIVE_VMS.lock().insert(id, Arc::downgrade(&shared));
        VmHandle(shared)
    }

    /// The running VM with this id, if any.
    pub(crate) fn lookup(id: u64) -> Option<VmHandle> {
        let weak = LIVE_VMS.lock().get(&id).cloned()?;
        weak.upgrade()
            .map(VmHandle)
            .filter(|vm| vm.is_alive())
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn version(&self) -> JniVersion {
        self.0.runtime.version()
    }

    pub fn configuration(&self) -> &Configuration {
        &self.0.configuration
    }

    pub fn is_alive(&self) -> bool {
        self.0.alive.load(Ordering::Acquire)
    }

    /// Whether shutting down destroys the Java VM, i.e. it was started rather than adopted.
    pub fn is_owned(&self) -> bool {
        self.0.owned
    }

    fn check_alive(&self) -> Result<()> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(BridgeError::VmShutDown)
        }
    }

    /// Attach the current thread, or return its existing context.
    pub fn ensure_attached(&self, arguments: &AttachArguments) -> Result<ThreadContext> {
        self.check_alive()?;
        let context = self.0.threads.ensure_attached(arguments)?;
        self.0.registry.flush();
        Ok(context)
    }

    /// Attach the current thread with the default arguments of this VM's configuration.
    pub fn attach(&self) -> Result<ThreadContext> {
        self.ensure_attached(&AttachArguments::new(&self.0.configuration))
    }

    pub fn detach(&self, context: ThreadContext) -> Result<()> {
        self.0.registry.flush();
        self.0.threads.detach(context)
    }

    pub fn is_thread_attached(&self) -> bool {
        self.0.threads.is_current_thread_attached()
    }

    pub fn threads(&self) -> &Arc<ThreadContexts> {
        &self.0.threads
    }

    pub fn registry(&self) -> &Arc<ReferenceRegistry> {
        &self.0.registry
    }

    /// Take ownership of a lease.
    pub fn wrap(&self, reference: NativeRef) -> JavaObject {
        JavaObject::new(reference, self.0.registry.clone())
    }

    pub fn types(&self) -> &TypeCache {
        &self.0.types
    }

    /// A marshaller using the configured array strategy.
    pub fn marshaller(&self) -> Marshaller<'_> {
        let strategy = if self.0.configuration.enable_bulk_numeric() {
            ArrayStrategy::Bulk
        } else {
            ArrayStrategy::ElementWise
        };
        Marshaller::new(
            &*self.0.runtime,
            &self.0.registry,
            &self.0.types,
            self.0.id,
            strategy,
        )
    }

    /// See [`Marshaller::to_native`](struct.Marshaller.html#method.to_native).
    pub fn to_native(
        &self,
        context: &ThreadContext,
        value: &Value,
        target: &TypeDescriptor,
    ) -> Result<Option<NativeRef>> {
        self.check_alive()?;
        self.marshaller().to_native(context, value, target)
    }

    /// See [`Marshaller::to_host`](struct.Marshaller.html#method.to_host).
    pub fn to_host(
        &self,
        context: &ThreadContext,
        reference: NativeRef,
        expected: &TypeDescriptor,
    ) -> Result<Value> {
        self.check_alive()?;
        self.marshaller().to_host(context, reference, expected)
    }

    pub fn exceptions(&self) -> ExceptionTranslator<'_> {
        ExceptionTranslator::new(&*self.0.runtime, &self.0.registry)
    }

    /// Take, clear and translate the current thread's pending Java exception.
    pub fn check_pending(&self, context: &ThreadContext) -> Result<()> {
        context.verify(self.0.id)?;
        self.exceptions().check_pending(context)
    }

    /// Implement Java interfaces, given by binary or internal names, with `target`.
    pub fn register_proxy(
        &self,
        context: &ThreadContext,
        interfaces: &[&str],
        target: impl ProxyTarget + 'static,
    ) -> Result<ProxyHandle> {
        self.check_alive()?;
        proxy::register(self, context, interfaces, Box::new(target))
    }

    /// Release a proxy. Calls in flight finish first; pinned proxies stay registered.
    pub fn release_proxy(&self, handle: ProxyHandle) -> ReleaseOutcome {
        proxy::release(self, handle)
    }

    /// Call a proxy the way the Java VM would, see [`ProxyTarget`](trait.ProxyTarget.html).
    pub fn dispatch(
        &self,
        context: &ThreadContext,
        registration: &ProxyRegistration,
        method: &MethodSignature,
        arguments: &[Option<NativeRef>],
    ) -> Result<Option<NativeRef>> {
        self.check_alive()?;
        proxy::dispatch(self, context, registration, method, arguments)
    }

    pub fn stats(&self) -> VmStats {
        VmStats {
            live_references: self.0.registry.live_count(),
            attached_threads: self.0.threads.attached_count(),
            leaked_threads: self.0.threads.leaked_count(),
            in_flight_calls: self.0.in_flight.load(Ordering::Acquire),
            live_proxies: self.0.proxies.len(),
            cached_types: self.0.types.len(),
        }
    }

    pub(crate) fn runtime(&self) -> &dyn Runtime {
        &*self.0.runtime
    }

    pub(crate) fn proxies(&self) -> &ProxyTable {
        &self.0.proxies
    }

    pub(crate) fn begin_call(&self) {
        self.0.in_flight.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn end_call(&self) {
        self.0.in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    /// Tear the VM down. The handle stays alive only when shutdown is refused.
    fn shut_down(&self, force: bool) -> Result<()> {
        let shared = &self.0;
        if shared
            .alive
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(BridgeError::VmShutDown);
        }
        let stats = self.stats();
        if stats.outstanding() {
            if !force {
                shared.alive.store(true, Ordering::Release);
                return Err(BridgeError::Shutdown(stats.to_string()));
            }
            warn!(vm = self.id(), %stats, "forcing shutdown");
        }
        LIVE_VMS.lock().remove(&shared.id);
        let proxies = shared.proxies.release_all();
        let arguments = AttachArguments::named(&shared.configuration, "rust-jni-bridge-shutdown");
        let attached_here = match shared.runtime.attach_current_thread(&arguments) {
            Ok(outcome) => outcome == AttachOutcome::Attached,
            Err(fault) => {
                warn!(vm = shared.id, ?fault, "could not attach to delete references");
                false
            }
        };
        let references = shared.registry.invalidate_all();
        let detach = shared.threads.close() || attached_here;
        let orphaned = shared.threads.orphaned_count();
        if detach {
            if let Err(fault) = shared.runtime.detach_current_thread() {
                warn!(vm = shared.id, ?fault, "could not detach the shutting down thread");
            }
        }
        if shared.owned {
            shared.runtime.destroy().map_err(|fault| {
                BridgeError::Shutdown(format!("DestroyJavaVM failed: {:?}", fault))
            })?;
        }
        info!(
            vm = shared.id,
            force,
            references,
            proxies,
            orphaned,
            destroyed = shared.owned,
            "shut down the Java VM"
        );
        Ok(())
    }
}

impl PartialEq for VmHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for VmHandle {}

impl fmt::Debug for VmHandle {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("VmHandle")
            .field("id", &self.0.id)
            .field("alive", &self.is_alive())
            .field("owned", &self.0.owned)
            .finish()
    }
}

#[derive(Debug)]
enum EmbeddingState {
    Vacant,
    Running(VmHandle),
    TornDown,
    /// Startup failed with this message.
    Poisoned(String),
}

/// Owner of the one Java VM a process may embed.
///
/// A Java VM can be created once per process and never restarted, so an embedding moves from
/// vacant to running to torn down, or to poisoned when startup fails. The process-wide instance
/// is [`Embedding::global`](#method.global).
#[derive(Debug)]
pub struct Embedding {
    state: Mutex<EmbeddingState>,
}

impl Default for Embedding {
    fn default() -> Self {
        Embedding {
            state: Mutex::new(EmbeddingState::Vacant),
        }
    }
}

impl Embedding {
    /// A separate embedding, for running against a runtime other than the process's JVM.
    pub fn new() -> Self {
        Default::default()
    }

    pub fn global() -> &'static Embedding {
        &GLOBAL
    }

    /// Launch the VM.
    ///
    /// Fails with [`AlreadyStarted`](enum.BridgeError.html#variant.AlreadyStarted) when a VM
    /// was started before, even if it has been shut down since. A startup failure is final:
    /// later calls fail with the same [`Startup`](enum.BridgeError.html#variant.Startup) error.
    pub fn start(&self, configuration: &Configuration, launcher: &dyn Launcher) -> Result<VmHandle> {
        let mut state = self.state.lock();
        Self::check_vacant(&state)?;
        info!(version = %configuration.version(), "starting the Java VM");
        match launcher.launch(configuration) {
            Ok(runtime) => {
                let vm = VmHandle::new(runtime, configuration, true);
                info!(vm = vm.id(), "started the Java VM");
                *state = EmbeddingState::Running(vm.clone());
                Ok(vm)
            }
            Err(error) => {
                let message = match error {
                    BridgeError::Startup(message) => message,
                    other => other.to_string(),
                };
                warn!(%message, "failed to start the Java VM");
                *state = EmbeddingState::Poisoned(message.clone());
                Err(BridgeError::Startup(message))
            }
        }
    }

    /// Take over a Java VM created elsewhere, e.g. the one passed to `JNI_OnLoad`.
    /// Shutting it down does not destroy it.
    ///
    /// # Safety
    ///
    /// `java_vm` must point to a running Java VM that outlives the returned handle.
    pub unsafe fn adopt(
        &self,
        java_vm: *mut jni_sys::JavaVM,
        configuration: &Configuration,
    ) -> Result<VmHandle> {
        let runtime = JniRuntime::adopt(java_vm, configuration)?;
        self.adopt_runtime(Arc::new(runtime), configuration)
    }

    /// Take over a runtime that is already running. Shutting it down does not destroy it.
    pub fn adopt_runtime(
        &self,
        runtime: Arc<dyn Runtime>,
        configuration: &Configuration,
    ) -> Result<VmHandle> {
        let mut state = self.state.lock();
        Self::check_vacant(&state)?;
        let vm = VmHandle::new(runtime, configuration, false);
        info!(vm = vm.id(), "adopted a running Java VM");
        *state = EmbeddingState::Running(vm.clone());
        Ok(vm)
    }

    fn check_vacant(state: &EmbeddingState) -> Result<()> {
        match state {
            EmbeddingState::Vacant => Ok(()),
            EmbeddingState::Running(_) | EmbeddingState::TornDown => {
                Err(BridgeError::AlreadyStarted)
            }
            EmbeddingState::Poisoned(message) => Err(BridgeError::Startup(message.clone())),
        }
    }

    /// Shut the VM down.
    ///
    /// Without `force`, fails with [`Shutdown`](enum.BridgeError.html#variant.Shutdown) while
    /// references, attached threads, calls in flight or proxies remain; the caller's own thread
    /// must be detached too. With `force`, outstanding references go stale, proxies are
    /// released and calls in flight fail when their target returns.
    pub fn shutdown(&self, vm: VmHandle, force: bool) -> Result<()> {
        let mut state = self.state.lock();
        match &*state {
            EmbeddingState::Running(current) if *current == vm => {}
            _ => return Err(BridgeError::VmShutDown),
        }
        match vm.shut_down(force) {
            Ok(()) => {
                *state = EmbeddingState::TornDown;
                Ok(())
            }
            Err(error) if !vm.is_alive() => {
                warn!(vm = vm.id(), %error, "the Java VM failed to shut down");
                *state = EmbeddingState::Poisoned(error.to_string());
                Err(error)
            }
            Err(error) => Err(error),
        }
    }

    pub fn is_started(&self) -> bool {
        match &*self.state.lock() {
            EmbeddingState::Running(_) => true,
            _ => false,
        }
    }

    /// The running VM, if any.
    pub fn current(&self) -> Option<VmHandle> {
        match &*self.state.lock() {
            EmbeddingState::Running(vm) => Some(vm.clone()),
            _ => None,
        }
    }
}

/// Launch the process's Java VM with `JNI_CreateJavaVM`.
pub fn start(configuration: &Configuration) -> Result<VmHandle> {
    Embedding::global().start(configuration, &JniLauncher)
}

/// Shut the process's Java VM down, see [`Embedding::shutdown`](struct.Embedding.html#method.shutdown).
pub fn shutdown(vm: VmHandle, force: bool) -> Result<()> {
    Embedding::global().shutdown(vm, force)
}

#[cfg(test)]
mod embedding_tests {
    use super::*;
    use crate::error::JniError;
    use crate::testing::FakeRuntime;
    use crate::types::PrimitiveKind;
    use std::sync::mpsc;

    fn launcher(runtime: &Arc<FakeRuntime>) -> MockLauncher {
        let runtime = runtime.clone();
        let mut launcher = MockLauncher::new();
        launcher
            .expect_launch()
            .times(1)
            .returning(move |_| Ok(runtime.clone() as Arc<dyn Runtime>));
        launcher
    }

    #[test]
    fn start_once() {
        let runtime = Arc::new(FakeRuntime::new());
        let launcher = launcher(&runtime);
        let embedding = Embedding::new();
        assert!(!embedding.is_started());
        let vm = embedding.start(&Configuration::new(), &launcher).unwrap();
        assert!(embedding.is_started());
        assert_eq!(embedding.current(), Some(vm.clone()));
        assert!(vm.is_owned());
        match embedding.start(&Configuration::new(), &launcher) {
            Err(BridgeError::AlreadyStarted) => {}
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn startup_failure_is_final() {
        let mut launcher = MockLauncher::new();
        launcher
            .expect_launch()
            .times(1)
            .returning(|_| Err(BridgeError::Startup("bad classpath".to_owned())));
        let embedding = Embedding::new();
        for _ in 0..2 {
            match embedding.start(&Configuration::new(), &launcher) {
                Err(BridgeError::Startup(message)) => assert_eq!(message, "bad classpath"),
                other => panic!("unexpected result {:?}", other),
            }
        }
        assert!(!embedding.is_started());
    }

    #[test]
    fn no_restart() {
        let runtime = Arc::new(FakeRuntime::new());
        let embedding = Embedding::new();
        let vm = embedding
            .start(&Configuration::new(), &launcher(&runtime))
            .unwrap();
        embedding.shutdown(vm.clone(), false).unwrap();
        assert!(runtime.stats().destroyed);
        assert!(!embedding.is_started());
        assert_eq!(embedding.current(), None);
        match embedding.start(&Configuration::new(), &MockLauncher::new()) {
            Err(BridgeError::AlreadyStarted) => {}
            other => panic!("unexpected result {:?}", other),
        }
        match vm.attach() {
            Err(BridgeError::VmShutDown) => {}
            other => panic!("unexpected result {:?}", other),
        }
        match embedding.shutdown(vm, true) {
            Err(BridgeError::VmShutDown) => {}
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn shutdown_refuses_live_references() {
        let runtime = Arc::new(FakeRuntime::new());
        let embedding = Embedding::new();
        let vm = embedding
            .start(&Configuration::new(), &launcher(&runtime))
            .unwrap();
        let context = vm.attach().unwrap();
        let reference = vm
            .to_native(&context, &Value::from(5), &TypeDescriptor::object())
            .unwrap()
            .unwrap();
        match embedding.shutdown(vm.clone(), false) {
            Err(BridgeError::Shutdown(message)) => assert_eq!(
                message,
                "1 live references, 1 attached threads, 0 calls in flight, 0 live proxies"
            ),
            other => panic!("unexpected result {:?}", other),
        }
        assert!(vm.is_alive());
        assert_eq!(
            vm.to_host(&context, reference, &TypeDescriptor::primitive(PrimitiveKind::Int))
                .unwrap(),
            Value::from(5)
        );
        vm.registry().release(reference);
        vm.detach(context).unwrap();
        embedding.shutdown(vm, false).unwrap();
        let stats = runtime.stats();
        assert_eq!(stats.globals_created, stats.globals_deleted);
        assert!(stats.destroyed);
    }

    #[test]
    fn forced_shutdown_invalidates() {
        let runtime = Arc::new(FakeRuntime::new());
        let embedding = Embedding::new();
        let vm = embedding
            .start(&Configuration::new(), &launcher(&runtime))
            .unwrap();
        let context = vm.attach().unwrap();
        let reference = vm
            .to_native(&context, &Value::from("kept"), &TypeDescriptor::string())
            .unwrap()
            .unwrap();
        embedding.shutdown(vm.clone(), true).unwrap();
        assert!(!vm.is_alive());
        assert!(!vm.registry().is_live(reference));
        match vm.registry().resolve(reference) {
            Err(BridgeError::StaleReference) => {}
            other => panic!("unexpected result {:?}", other),
        }
        match vm.to_host(&context, reference, &TypeDescriptor::string()) {
            Err(BridgeError::VmShutDown) => {}
            other => panic!("unexpected result {:?}", other),
        }
        vm.registry().release(reference);
        let stats = runtime.stats();
        assert_eq!(stats.globals_created, stats.globals_deleted);
        assert_eq!(stats.double_deletes, 0);
        assert!(!runtime.is_current_thread_attached());
        assert!(VmHandle::lookup(vm.id()).is_none());
    }

    #[test]
    fn forced_shutdown_lets_attached_workers_detach() {
        let runtime = Arc::new(FakeRuntime::new());
        let embedding = Embedding::new();
        let vm = embedding
            .start(&Configuration::new(), &launcher(&runtime))
            .unwrap();
        let (attached_tx, attached_rx) = mpsc::channel();
        let (closed_tx, closed_rx) = mpsc::channel();
        let worker_vm = vm.clone();
        let worker_runtime = runtime.clone();
        let worker = std::thread::spawn(move || {
            let context = worker_vm.attach().unwrap();
            attached_tx.send(()).unwrap();
            closed_rx.recv().unwrap();
            worker_vm.detach(context).unwrap();
            worker_runtime.is_current_thread_attached()
        });
        attached_rx.recv().unwrap();
        embedding.shutdown(vm.clone(), true).unwrap();
        assert_eq!(vm.threads().orphaned_count(), 1);
        closed_tx.send(()).unwrap();
        assert!(!worker.join().unwrap());
        assert_eq!(vm.threads().orphaned_count(), 0);
        let stats = runtime.stats();
        assert_eq!(stats.attaches, 2);
        assert_eq!(stats.detaches, 2);
    }

    #[test]
    fn destroy_failure_poisons() {
        let runtime = Arc::new(FakeRuntime::new());
        let embedding = Embedding::new();
        let vm = embedding
            .start(&Configuration::new(), &launcher(&runtime))
            .unwrap();
        runtime.fail_destroy(JniError::Unknown(-1));
        match embedding.shutdown(vm.clone(), false) {
            Err(BridgeError::Shutdown(message)) => assert!(message.contains("DestroyJavaVM"), "{}", message),
            other => panic!("unexpected result {:?}", other),
        }
        assert!(!vm.is_alive());
        assert!(!embedding.is_started());
        assert_eq!(embedding.current(), None);
        match embedding.start(&Configuration::new(), &MockLauncher::new()) {
            Err(BridgeError::Startup(message)) => assert!(message.contains("DestroyJavaVM"), "{}", message),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn refused_shutdown_keeps_running() {
        let runtime = Arc::new(FakeRuntime::new());
        let embedding = Embedding::new();
        let vm = embedding
            .start(&Configuration::new(), &launcher(&runtime))
            .unwrap();
        let context = vm.attach().unwrap();
        assert!(embedding.shutdown(vm.clone(), false).is_err());
        assert!(vm.is_alive());
        assert!(embedding.is_started());
        assert_eq!(VmHandle::lookup(vm.id()), Some(vm.clone()));
        vm.detach(context).unwrap();
        embedding.shutdown(vm, false).unwrap();
    }

    #[test]
    fn adopted_runtime_is_not_destroyed() {
        let runtime = Arc::new(FakeRuntime::new());
        let embedding = Embedding::new();
        let vm = embedding
            .adopt_runtime(runtime.clone(), &Configuration::new())
            .unwrap();
        assert!(!vm.is_owned());
        assert_eq!(VmHandle::lookup(vm.id()), Some(vm.clone()));
        embedding.shutdown(vm, false).unwrap();
        assert!(!runtime.stats().destroyed);
    }

    #[test]
    fn handles_are_per_vm() {
        let first = Embedding::new()
            .adopt_runtime(Arc::new(FakeRuntime::new()), &Configuration::new())
            .unwrap();
        let second = Embedding::new()
            .adopt_runtime(Arc::new(FakeRuntime::new()), &Configuration::new())
            .unwrap();
        assert_ne!(first, second);
        assert_ne!(first.id(), second.id());
        let context = first.attach().unwrap();
        match second.to_native(&context, &Value::from(1), &TypeDescriptor::object()) {
            Err(BridgeError::ThreadNotAttached) => {}
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn bulk_strategy_follows_configuration() {
        let vm = Embedding::new()
            .adopt_runtime(
                Arc::new(FakeRuntime::new()),
                &Configuration::new().with_bulk_numeric(false),
            )
            .unwrap();
        assert_eq!(vm.marshaller().strategy(), ArrayStrategy::ElementWise);
        let vm = Embedding::new()
            .adopt_runtime(Arc::new(FakeRuntime::new()), &Configuration::new())
            .unwrap();
        assert_eq!(vm.marshaller().strategy(), ArrayStrategy::Bulk);
    }

    #[test]
    fn stats() {
        let vm = Embedding::new()
            .adopt_runtime(Arc::new(FakeRuntime::new()), &Configuration::new())
            .unwrap();
        assert_eq!(vm.stats(), VmStats::default());
        let context = vm.attach().unwrap();
        vm.types().signature("[J").unwrap();
        assert_eq!(
            vm.stats(),
            VmStats {
                attached_threads: 1,
                cached_types: 1,
                ..VmStats::default()
            }
        );
        vm.detach(context).unwrap();
        assert!(!vm.is_thread_attached());
    }
}
