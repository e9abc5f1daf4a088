use crate::error::{BridgeError, HostError, Result};
use crate::java_string::{to_binary_name, to_internal_name, to_utf16};
use crate::registry::{JavaObject, NativeRef};
use crate::runtime::{RawHandle, Runtime};
use crate::thread::ThreadContext;
use crate::types::{MethodSignature, TypeDescriptor};
use crate::value::{PrimitiveValue, Value};
use crate::vm::VmHandle;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Rust code implementing Java interfaces.
///
/// `invoke` receives the interface method being called and its arguments converted to host
/// values. Returning an error makes the Java caller observe a throwable, see
/// [`HostError`](struct.HostError.html).
#[cfg_attr(test, mockall::automock)]
pub trait ProxyTarget: Send + Sync {
    fn invoke(
        &self,
        context: &ThreadContext,
        method: &MethodSignature,
        arguments: Vec<Value>,
    ) -> Result<Value>;
}

impl<F> ProxyTarget for F
where
    F: Fn(&ThreadContext, &MethodSignature, Vec<Value>) -> Result<Value> + Send + Sync,
{
    fn invoke(
        &self,
        context: &ThreadContext,
        method: &MethodSignature,
        arguments: Vec<Value>,
    ) -> Result<Value> {
        self(context, method, arguments)
    }
}

type Handler = Box<dyn Fn(&ThreadContext, Vec<Value>) -> Result<Value> + Send + Sync>;

/// A [`ProxyTarget`](trait.ProxyTarget.html) dispatching on method names.
///
/// Calls to a method without a handler fail with `java.lang.UnsupportedOperationException`.
///
/// # Example
/// ```
/// use rust_jni_bridge::{MethodTable, Value};
///
/// let table = MethodTable::new()
///     .method("applyAsInt", |_context, arguments| {
///         let left = arguments[0].as_primitive();
///         let right = arguments[1].as_primitive();
///         match (left, right) {
///             (Some(left), Some(right)) => Ok(Value::from(format!("{}{}", left, right))),
///             _ => Ok(Value::Null),
///         }
///     });
/// assert!(table.handles("applyAsInt"));
/// ```
#[derive(Default)]
pub struct MethodTable {
    handlers: HashMap<String, Handler>,
}

impl MethodTable {
    pub fn new() -> Self {
        Default::default()
    }

    /// Handle every overload of `name`.
    pub fn method(
        mut self,
        name: &str,
        handler: impl Fn(&ThreadContext, Vec<Value>) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        self.handlers.insert(name.to_owned(), Box::new(handler));
        self
    }

    pub fn handles(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }
}

impl ProxyTarget for MethodTable {
    fn invoke(
        &self,
        context: &ThreadContext,
        method: &MethodSignature,
        arguments: Vec<Value>,
    ) -> Result<Value> {
        match self.handlers.get(method.name()) {
            Some(handler) => handler(context, arguments),
            None => Err(BridgeError::Host(
                HostError::new(format!("{} is not implemented", method))
                    .with_class("java.lang.UnsupportedOperationException"),
            )),
        }
    }
}

impl fmt::Debug for MethodTable {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.handlers.keys().collect();
        names.sort();
        formatter.debug_struct("MethodTable").field("methods", &names).finish()
    }
}

/// Lifecycle of a proxy registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyState {
    /// Idle and accepting calls.
    Registered,
    /// At least one call is running the target.
    Invoked,
    /// The target returned and the result is being converted.
    Returned,
    /// Accepts no more calls.
    Released,
}

/// Result of asking to release a proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released,
    /// Calls are in flight; the last one to return finishes the release.
    Deferred,
    /// The registration is pinned and stays registered.
    Pinned,
}

#[derive(Debug)]
struct CallState {
    state: ProxyState,
    in_flight: usize,
    release_requested: bool,
    pinned: bool,
}

/// A [`ProxyTarget`](trait.ProxyTarget.html) bound to a set of Java interfaces.
pub struct ProxyRegistration {
    id: u64,
    vm: u64,
    interfaces: Vec<String>,
    methods: Vec<MethodSignature>,
    target: Box<dyn ProxyTarget>,
    calls: Mutex<CallState>,
}

impl ProxyRegistration {
    pub(crate) fn new(
        id: u64,
        vm: u64,
        interfaces: Vec<String>,
        methods: Vec<MethodSignature>,
        target: Box<dyn ProxyTarget>,
    ) -> Self {
        ProxyRegistration {
            id,
            vm,
            interfaces,
            methods,
            target,
            calls: Mutex::new(CallState {
                state: ProxyState::Registered,
                in_flight: 0,
                release_requested: false,
                pinned: false,
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn vm_id(&self) -> u64 {
        self.vm
    }

    /// Binary names of the implemented interfaces.
    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    /// Every method of the implemented interfaces.
    pub fn methods(&self) -> &[MethodSignature] {
        &self.methods
    }

    pub fn state(&self) -> ProxyState {
        self.calls.lock().state
    }

    pub fn in_flight(&self) -> usize {
        self.calls.lock().in_flight
    }

    pub fn is_pinned(&self) -> bool {
        self.calls.lock().pinned
    }

    /// Keep the registration alive regardless of [`release`](struct.VmHandle.html#method.release_proxy).
    pub fn pin(&self) {
        self.calls.lock().pinned = true;
    }

    pub fn unpin(&self) {
        self.calls.lock().pinned = false;
    }

    /// Whether one of the interfaces declares `method`.
    pub fn declares(&self, method: &MethodSignature) -> bool {
        self.methods.iter().any(|declared| declared == method)
    }

    /// The declared method matching a call, or why there is none.
    fn resolve(&self, method: &MethodSignature) -> Result<&MethodSignature> {
        if let Some(declared) = self.methods.iter().find(|declared| *declared == method) {
            return Ok(declared);
        }
        let named: Vec<&MethodSignature> = self
            .methods
            .iter()
            .filter(|declared| declared.name() == method.name())
            .collect();
        let message = if named.is_empty() {
            format!(
                "no method {} on {}",
                method.name(),
                self.interfaces.join(", ")
            )
        } else if named
            .iter()
            .all(|declared| declared.parameters().len() != method.parameters().len())
        {
            format!(
                "{} takes {} arguments, {} declared",
                method,
                method.parameters().len(),
                named[0].parameters().len()
            )
        } else {
            format!("{} does not match {}", method, named[0])
        };
        Err(BridgeError::SignatureMismatch(message))
    }

    pub(crate) fn begin_call(&self) -> Result<()> {
        let mut calls = self.calls.lock();
        if calls.state == ProxyState::Released || calls.release_requested {
            return Err(BridgeError::ProxyReleased);
        }
        calls.in_flight += 1;
        calls.state = ProxyState::Invoked;
        Ok(())
    }

    pub(crate) fn mark_returned(&self) {
        let mut calls = self.calls.lock();
        if calls.state == ProxyState::Invoked {
            calls.state = ProxyState::Returned;
        }
    }

    /// Returns whether the call completed a deferred release.
    pub(crate) fn end_call(&self) -> bool {
        let mut calls = self.calls.lock();
        calls.in_flight = calls.in_flight.saturating_sub(1);
        if calls.in_flight > 0 || calls.state == ProxyState::Released {
            return false;
        }
        if calls.release_requested {
            calls.state = ProxyState::Released;
            true
        } else {
            calls.state = ProxyState::Registered;
            false
        }
    }

    pub(crate) fn request_release(&self) -> ReleaseOutcome {
        let mut calls = self.calls.lock();
        if calls.state == ProxyState::Released {
            return ReleaseOutcome::Released;
        }
        if calls.pinned {
            return ReleaseOutcome::Pinned;
        }
        calls.release_requested = true;
        if calls.in_flight > 0 {
            ReleaseOutcome::Deferred
        } else {
            calls.state = ProxyState::Released;
            ReleaseOutcome::Released
        }
    }

    /// Release now, ignoring pins and calls in flight.
    pub(crate) fn force_release(&self) {
        let mut calls = self.calls.lock();
        calls.release_requested = true;
        calls.pinned = false;
        calls.state = ProxyState::Released;
    }
}

impl fmt::Debug for ProxyRegistration {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ProxyRegistration")
            .field("id", &self.id)
            .field("vm", &self.vm)
            .field("interfaces", &self.interfaces)
            .field("calls", &*self.calls.lock())
            .finish()
    }
}

#[cfg(test)]
mod proxy_registration_tests {
    use super::*;

    fn registration() -> ProxyRegistration {
        ProxyRegistration::new(
            1,
            1,
            vec!["java.lang.Runnable".to_owned()],
            vec![MethodSignature::parse("run", "()V").unwrap()],
            Box::new(MethodTable::new()),
        )
    }

    #[test]
    fn call_cycle() {
        let registration = registration();
        assert_eq!(registration.state(), ProxyState::Registered);
        registration.begin_call().unwrap();
        assert_eq!(registration.state(), ProxyState::Invoked);
        registration.mark_returned();
        assert_eq!(registration.state(), ProxyState::Returned);
        assert!(!registration.end_call());
        assert_eq!(registration.state(), ProxyState::Registered);
        assert_eq!(registration.in_flight(), 0);
    }

    #[test]
    fn release_while_in_flight() {
        let registration = registration();
        registration.begin_call().unwrap();
        registration.begin_call().unwrap();
        assert_eq!(registration.request_release(), ReleaseOutcome::Deferred);
        match registration.begin_call() {
            Err(BridgeError::ProxyReleased) => {}
            other => panic!("unexpected result {:?}", other),
        }
        assert!(!registration.end_call());
        assert_eq!(registration.state(), ProxyState::Invoked);
        assert!(registration.end_call());
        assert_eq!(registration.state(), ProxyState::Released);
        assert_eq!(registration.request_release(), ReleaseOutcome::Released);
    }

    #[test]
    fn pinned() {
        let registration = registration();
        registration.pin();
        assert_eq!(registration.request_release(), ReleaseOutcome::Pinned);
        assert!(registration.begin_call().is_ok());
        assert!(!registration.end_call());
        registration.unpin();
        assert_eq!(registration.request_release(), ReleaseOutcome::Released);
    }

    #[test]
    fn force_release() {
        let registration = registration();
        registration.pin();
        registration.begin_call().unwrap();
        registration.force_release();
        assert_eq!(registration.state(), ProxyState::Released);
        assert!(!registration.end_call());
        assert_eq!(registration.state(), ProxyState::Released);
    }

    #[test]
    fn resolve() {
        let registration = ProxyRegistration::new(
            1,
            1,
            vec!["java.util.function.IntBinaryOperator".to_owned()],
            vec![MethodSignature::parse("applyAsInt", "(II)I").unwrap()],
            Box::new(MethodTable::new()),
        );
        assert!(registration
            .resolve(&MethodSignature::parse("applyAsInt", "(II)I").unwrap())
            .is_ok());
        match registration.resolve(&MethodSignature::parse("run", "()V").unwrap()) {
            Err(BridgeError::SignatureMismatch(message)) => assert_eq!(
                message,
                "no method run on java.util.function.IntBinaryOperator"
            ),
            other => panic!("unexpected result {:?}", other),
        }
        match registration.resolve(&MethodSignature::parse("applyAsInt", "(I)I").unwrap()) {
            Err(BridgeError::SignatureMismatch(message)) => {
                assert_eq!(message, "applyAsInt(I)I takes 1 arguments, 2 declared")
            }
            other => panic!("unexpected result {:?}", other),
        }
        match registration.resolve(&MethodSignature::parse("applyAsInt", "(JJ)I").unwrap()) {
            Err(BridgeError::SignatureMismatch(message)) => {
                assert_eq!(message, "applyAsInt(JJ)I does not match applyAsInt(II)I")
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn method_table() {
        let table = MethodTable::new().method("run", |_, _| Ok(Value::Null));
        assert!(table.handles("run"));
        assert!(!table.handles("call"));
        assert_eq!(format!("{:?}", table), "MethodTable { methods: [\"run\"] }");
    }
}

/// Registrations of one VM, keyed by the id the Java proxy object carries.
#[derive(Debug)]
pub(crate) struct ProxyTable {
    next_id: AtomicU64,
    entries: Mutex<HashMap<u64, Arc<ProxyRegistration>>>,
}

impl ProxyTable {
    pub(crate) fn new() -> Self {
        ProxyTable {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn insert(&self, registration: Arc<ProxyRegistration>) {
        self.entries.lock().insert(registration.id, registration);
    }

    pub(crate) fn get(&self, id: u64) -> Option<Arc<ProxyRegistration>> {
        self.entries.lock().get(&id).cloned()
    }

    fn remove(&self, id: u64) {
        self.entries.lock().remove(&id);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Force-release every registration. Returns how many there were.
    pub(crate) fn release_all(&self) -> usize {
        let entries: Vec<Arc<ProxyRegistration>> =
            self.entries.lock().drain().map(|(_, entry)| entry).collect();
        for entry in &entries {
            entry.force_release();
        }
        entries.len()
    }
}

/// A registered proxy and the Java object implementing its interfaces.
#[derive(Debug, Clone)]
pub struct ProxyHandle {
    registration: Arc<ProxyRegistration>,
    object: JavaObject,
}

impl ProxyHandle {
    pub fn registration(&self) -> &Arc<ProxyRegistration> {
        &self.registration
    }

    /// The `java.lang.reflect.Proxy` instance to hand to Java code.
    pub fn object(&self) -> &JavaObject {
        &self.object
    }

    pub fn native_ref(&self) -> NativeRef {
        self.object.native_ref()
    }
}

pub(crate) fn register(
    vm: &VmHandle,
    context: &ThreadContext,
    interfaces: &[&str],
    target: Box<dyn ProxyTarget>,
) -> Result<ProxyHandle> {
    context.verify(vm.id())?;
    if interfaces.is_empty() {
        return Err(BridgeError::SignatureMismatch(
            "a proxy needs at least one interface".to_owned(),
        ));
    }
    let runtime = vm.runtime();
    let translator = vm.exceptions();
    let internal: Vec<String> = interfaces.iter().map(|name| to_internal_name(name)).collect();
    let mut methods: Vec<MethodSignature> = vec![];
    for interface in &internal {
        let declared = runtime
            .interface_methods(interface)
            .map_err(|fault| translator.fault(context, fault))?;
        for description in declared {
            let method = vm.types().method(&description.name, &description.descriptor)?;
            if !methods.contains(&method) {
                methods.push((*method).clone());
            }
        }
    }
    let proxies = vm.proxies();
    let registration = Arc::new(ProxyRegistration::new(
        proxies.next_id(),
        vm.id(),
        internal.iter().map(|name| to_binary_name(name)).collect(),
        methods,
        target,
    ));
    proxies.insert(registration.clone());
    let object = runtime
        .new_proxy(vm.id(), registration.id, &internal)
        .map_err(|fault| translator.fault(context, fault))
        .and_then(|local| vm.registry().register(context, local));
    let object = match object {
        Ok(reference) => JavaObject::new(reference, vm.registry().clone()),
        Err(error) => {
            proxies.remove(registration.id);
            return Err(error);
        }
    };
    info!(
        vm = vm.id(),
        proxy = registration.id,
        interfaces = %registration.interfaces.join(", "),
        "registered proxy"
    );
    Ok(ProxyHandle {
        registration,
        object,
    })
}

pub(crate) fn release(vm: &VmHandle, handle: ProxyHandle) -> ReleaseOutcome {
    let ProxyHandle {
        registration,
        object,
    } = handle;
    drop(object);
    let outcome = registration.request_release();
    if outcome == ReleaseOutcome::Released {
        vm.proxies().remove(registration.id);
    }
    info!(vm = vm.id(), proxy = registration.id, ?outcome, "released proxy");
    outcome
}

/// Counts a call on the registration and on the VM for as long as it lives.
struct CallGuard<'a> {
    vm: &'a VmHandle,
    registration: &'a ProxyRegistration,
}

impl<'a> CallGuard<'a> {
    fn begin(vm: &'a VmHandle, registration: &'a ProxyRegistration) -> Result<Self> {
        registration.begin_call()?;
        vm.begin_call();
        Ok(CallGuard { vm, registration })
    }
}

impl<'a> Drop for CallGuard<'a> {
    fn drop(&mut self) {
        self.vm.end_call();
        if self.registration.end_call() {
            self.vm.proxies().remove(self.registration.id);
            info!(
                vm = self.vm.id(),
                proxy = self.registration.id,
                "finished a deferred proxy release"
            );
        }
    }
}

fn mismatch(method: &MethodSignature, error: BridgeError) -> BridgeError {
    match error {
        BridgeError::UnsupportedConversion { value, target } => BridgeError::SignatureMismatch(
            format!("{}: can't convert {} to {}", method, value, target),
        ),
        other => other,
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}

/// Run the target for a declared method with converted arguments.
fn invoke_target(
    vm: &VmHandle,
    context: &ThreadContext,
    registration: &ProxyRegistration,
    method: &MethodSignature,
    arguments: Vec<Value>,
) -> Result<Value> {
    let _guard = CallGuard::begin(vm, registration)?;
    debug!(vm = vm.id(), proxy = registration.id, %method, "invoking proxy target");
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        registration.target.invoke(context, method, arguments)
    }))
    .unwrap_or_else(|payload| {
        let message = panic_message(payload);
        warn!(proxy = registration.id, %method, %message, "proxy target panicked");
        Err(BridgeError::Host(HostError::new(format!(
            "{} panicked: {}",
            method, message
        ))))
    });
    registration.mark_returned();
    if !vm.is_alive() {
        return Err(BridgeError::VmShutDown);
    }
    let value = result?;
    if *method.result() == TypeDescriptor::Void && !value.is_null() {
        return Err(BridgeError::SignatureMismatch(format!(
            "{} returns void, got {}",
            method,
            value.type_name()
        )));
    }
    Ok(value)
}

/// Call a proxy as the Java VM would.
///
/// The method must be declared by one of the registration's interfaces, with the same parameter
/// types, and the arguments must convert to those types; otherwise the call fails with
/// [`SignatureMismatch`](enum.BridgeError.html#variant.SignatureMismatch) without reaching the
/// target. `None` arguments and results stand for Java `null`.
pub(crate) fn dispatch(
    vm: &VmHandle,
    context: &ThreadContext,
    registration: &ProxyRegistration,
    method: &MethodSignature,
    arguments: &[Option<NativeRef>],
) -> Result<Option<NativeRef>> {
    context.verify(vm.id())?;
    if registration.vm != vm.id() {
        return Err(BridgeError::ProxyReleased);
    }
    let declared = registration.resolve(method)?;
    if arguments.len() != declared.parameters().len() {
        return Err(BridgeError::SignatureMismatch(format!(
            "{} takes {} arguments, got {}",
            declared,
            declared.parameters().len(),
            arguments.len()
        )));
    }
    let marshaller = vm.marshaller();
    let values = arguments
        .iter()
        .zip(declared.parameters())
        .map(|(argument, parameter)| match argument {
            Some(reference) => marshaller.to_host(context, *reference, parameter),
            None if parameter.is_reference() => Ok(Value::Null),
            None => Err(BridgeError::unsupported("null", parameter)),
        })
        .collect::<Result<Vec<Value>>>()
        .map_err(|error| mismatch(declared, error))?;
    let value = invoke_target(vm, context, registration, declared, values)?;
    match declared.result() {
        TypeDescriptor::Void => Ok(None),
        result => marshaller
            .to_native(context, &value, result)
            .map_err(|error| mismatch(declared, error)),
    }
}

/// Entry point for calls made by the Java VM on a proxy object.
///
/// Returns the local reference to hand back to Java. On failure the error is thrown as a Java
/// exception on the current thread and `None` is returned.
pub fn invoke_from_runtime(
    vm: &VmHandle,
    proxy: u64,
    proxy_object: RawHandle,
    method: RawHandle,
    arguments: Option<RawHandle>,
) -> Option<RawHandle> {
    let threads = vm.threads();
    let (context, created) = match threads.enter_callback() {
        Ok(entered) => entered,
        Err(error) => {
            throw_illegal_state(vm.runtime(), &error.to_string());
            return None;
        }
    };
    let result = answer(vm, &context, proxy, proxy_object, method, arguments);
    let returned = match result {
        Ok(returned) => returned,
        Err(error) => {
            debug!(vm = vm.id(), proxy, %error, "reverse call failed");
            vm.exceptions().throw(&context, &error);
            None
        }
    };
    threads.exit_callback(context, created);
    returned
}

fn answer(
    vm: &VmHandle,
    context: &ThreadContext,
    proxy: u64,
    proxy_object: RawHandle,
    method: RawHandle,
    arguments: Option<RawHandle>,
) -> Result<Option<RawHandle>> {
    let runtime = vm.runtime();
    let translator = vm.exceptions();
    let registration = vm.proxies().get(proxy).ok_or(BridgeError::ProxyReleased)?;
    let description = runtime
        .describe_method(method)
        .map_err(|fault| translator.fault(context, fault))?;
    let signature = vm.types().method(&description.name, &description.descriptor)?;
    if !registration.declares(&signature) {
        if let Some(answer) =
            object_method(vm, context, &registration, proxy_object, &signature, arguments)?
        {
            return Ok(Some(answer));
        }
    }
    let declared = registration.resolve(&signature)?;
    let marshaller = vm.marshaller();
    let length = match arguments {
        Some(array) => runtime
            .array_length(array)
            .map_err(|fault| translator.fault(context, fault))?,
        None => 0,
    };
    if length != declared.parameters().len() {
        return Err(BridgeError::SignatureMismatch(format!(
            "{} takes {} arguments, got {}",
            declared,
            declared.parameters().len(),
            length
        )));
    }
    let mut values = Vec::with_capacity(length);
    if let Some(array) = arguments {
        for (index, parameter) in declared.parameters().iter().enumerate() {
            let element = runtime
                .object_element(array, index)
                .map_err(|fault| translator.fault(context, fault))?;
            let value = match element {
                Some(local) => {
                    let value = marshaller.raw_to_host(context, local, parameter);
                    runtime.delete_local_ref(local);
                    value
                }
                None if parameter.is_reference() => Ok(Value::Null),
                None => Err(BridgeError::unsupported("null", parameter)),
            };
            values.push(value.map_err(|error| mismatch(declared, error))?);
        }
    }
    let value = invoke_target(vm, context, &registration, declared, values)?;
    match declared.result() {
        TypeDescriptor::Void => Ok(None),
        result => marshaller
            .to_local(context, &value, result)
            .map_err(|error| mismatch(declared, error)),
    }
}

/// Answer the `java.lang.Object` methods the interfaces leave to the proxy.
fn object_method(
    vm: &VmHandle,
    context: &ThreadContext,
    registration: &ProxyRegistration,
    proxy_object: RawHandle,
    method: &MethodSignature,
    arguments: Option<RawHandle>,
) -> Result<Option<RawHandle>> {
    let runtime = vm.runtime();
    let translator = vm.exceptions();
    let descriptor = method.descriptor();
    let answer = match (method.name(), descriptor.as_str()) {
        ("toString", "()Ljava/lang/String;") => {
            let text = format!(
                "{}@{:x}",
                registration.interfaces.join(","),
                registration.id
            );
            runtime.new_string(&to_utf16(&text))
        }
        ("hashCode", "()I") => {
            runtime.box_primitive(PrimitiveValue::Int(registration.id as i32))
        }
        ("equals", "(Ljava/lang/Object;)Z") => {
            let other = match arguments {
                Some(array) => runtime
                    .object_element(array, 0)
                    .map_err(|fault| translator.fault(context, fault))?,
                None => None,
            };
            let same = match other {
                Some(other) => {
                    let same = runtime.is_same_object(proxy_object, other);
                    runtime.delete_local_ref(other);
                    same
                }
                None => false,
            };
            runtime.box_primitive(PrimitiveValue::Boolean(same))
        }
        _ => return Ok(None),
    };
    answer
        .map(Some)
        .map_err(|fault| translator.fault(context, fault))
}

/// Throw a `java.lang.IllegalStateException` without a thread context.
pub(crate) fn throw_illegal_state(runtime: &dyn Runtime, message: &str) {
    match runtime.new_throwable("java/lang/IllegalStateException", Some(message), None) {
        Ok(throwable) => {
            if let Err(fault) = runtime.throw(throwable) {
                warn!(?fault, "could not throw an exception");
            }
            runtime.delete_local_ref(throwable);
        }
        Err(fault) => warn!(?fault, "could not create an exception"),
    }
}
