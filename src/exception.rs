use crate::error::{BridgeError, JniError, Result};
use crate::java_string::{from_utf16, to_binary_name, to_internal_name};
use crate::registry::{JavaObject, NativeRef, ReferenceRegistry};
use crate::runtime::{Fault, RawHandle, Runtime, RuntimeResult};
use crate::thread::ThreadContext;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Cause chains deeper than this are cut.
const MAX_CAUSE_DEPTH: usize = 32;

const RUNTIME_EXCEPTION: &str = "java/lang/RuntimeException";

/// Where a throwable sits in the Java exception hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionKind {
    /// A `java.lang.Error`.
    Error,
    /// A `java.lang.RuntimeException`.
    RuntimeException,
    /// Any other `java.lang.Exception`.
    CheckedException,
    /// A direct `java.lang.Throwable` subclass.
    Throwable,
}

/// A Java throwable translated into a Rust error.
///
/// Keeps the class name, the message and the chain of causes. When translated from a live
/// throwable it also holds the original object, so that passing the error back to Java rethrows
/// the very same throwable.
#[derive(Debug, Clone)]
pub struct JavaException {
    class_name: String,
    message: Option<String>,
    cause: Option<Box<JavaException>>,
    ancestry: Vec<String>,
    throwable: Option<JavaObject>,
}

impl JavaException {
    /// An exception that has no Java object yet. `class_name` is a binary or internal name.
    pub fn new(class_name: &str, message: Option<String>) -> Self {
        JavaException {
            class_name: to_binary_name(class_name),
            message,
            cause: None,
            ancestry: vec![],
            throwable: None,
        }
    }

    pub fn with_cause(mut self, cause: JavaException) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Binary name of the throwable's class, e.g. `java.lang.IllegalStateException`.
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn cause(&self) -> Option<&JavaException> {
        self.cause.as_deref()
    }

    /// Superclasses of the throwable's class, nearest first.
    pub fn ancestry(&self) -> &[String] {
        &self.ancestry
    }

    /// The original Java throwable, if there is one.
    pub fn throwable(&self) -> Option<&JavaObject> {
        self.throwable.as_ref()
    }

    /// Whether the throwable is an instance of a class, given by binary or internal name.
    /// Only superclasses are known, interfaces are not.
    pub fn is_instance_of(&self, class_name: &str) -> bool {
        let class_name = to_binary_name(class_name);
        self.class_name == class_name || self.ancestry.iter().any(|name| *name == class_name)
    }

    pub fn kind(&self) -> ExceptionKind {
        if self.is_instance_of("java.lang.Error") {
            ExceptionKind::Error
        } else if self.is_instance_of("java.lang.RuntimeException") {
            ExceptionKind::RuntimeException
        } else if self.is_instance_of("java.lang.Exception") {
            ExceptionKind::CheckedException
        } else {
            ExceptionKind::Throwable
        }
    }
}

impl fmt::Display for JavaException {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(formatter, "{}: {}", self.class_name, message),
            None => formatter.write_str(&self.class_name),
        }
    }
}

impl Error for JavaException {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause.as_ref().map(|cause| &**cause as &(dyn Error + 'static))
    }
}


/// Translates throwables into [`JavaException`s](struct.JavaException.html) and bridge errors
/// into throwables.
pub struct ExceptionTranslator<'vm> {
    runtime: &'vm dyn Runtime,
    registry: Option<&'vm Arc<ReferenceRegistry>>,
}

impl<'vm> ExceptionTranslator<'vm> {
    pub(crate) fn new(runtime: &'vm dyn Runtime, registry: &'vm Arc<ReferenceRegistry>) -> Self {
        ExceptionTranslator {
            runtime,
            registry: Some(registry),
        }
    }

    /// A translator that does not keep the original throwable alive.
    pub(crate) fn detached(runtime: &'vm dyn Runtime) -> Self {
        ExceptionTranslator {
            runtime,
            registry: None,
        }
    }

    /// Translate a throwable. The handle is borrowed, not consumed.
    pub fn to_host_error(&self, context: &ThreadContext, throwable: RawHandle) -> JavaException {
        let mut seen = vec![];
        self.translate(context, throwable, &mut seen)
    }

    fn translate(
        &self,
        context: &ThreadContext,
        throwable: RawHandle,
        seen: &mut Vec<RawHandle>,
    ) -> JavaException {
        let runtime = self.runtime;
        let class_name = self
            .salvage(runtime.class_name(throwable))
            .unwrap_or_else(|| "java.lang.Throwable".to_owned());
        let ancestry = self
            .salvage(runtime.class_ancestry(throwable))
            .unwrap_or_default();
        let message = match self.salvage(runtime.throwable_message(throwable)) {
            Some(Some(message)) => {
                let units = runtime.string_units(message);
                runtime.delete_local_ref(message);
                self.salvage(units).and_then(|units| match from_utf16(&units) {
                    Ok(message) => Some(message),
                    Err(error) => {
                        warn!(
                            class = %class_name,
                            %error,
                            message = %String::from_utf16_lossy(&units),
                            "dropped a malformed exception message"
                        );
                        None
                    }
                })
            }
            _ => None,
        };
        let throwable_object = self.registry.and_then(|registry| {
            let local = self.salvage(runtime.new_local_ref(throwable))?;
            let reference = registry.register(context, local).ok()?;
            Some(JavaObject::new(reference, registry.clone()))
        });
        seen.push(throwable);
        let cause = match self.salvage(runtime.throwable_cause(throwable)) {
            Some(Some(cause)) => {
                let cyclic = seen
                    .iter()
                    .any(|previous| runtime.is_same_object(*previous, cause));
                let translated = if cyclic {
                    debug!(class = %class_name, "cut a cyclic cause chain");
                    None
                } else if seen.len() >= MAX_CAUSE_DEPTH {
                    debug!(class = %class_name, "cut a deep cause chain");
                    None
                } else {
                    Some(Box::new(self.translate(context, cause, seen)))
                };
                runtime.delete_local_ref(cause);
                translated
            }
            _ => None,
        };
        JavaException {
            class_name,
            message,
            cause,
            ancestry,
            throwable: throwable_object,
        }
    }

    /// The value of a best-effort runtime call. A throwable raised by the call itself is dropped.
    fn salvage<T>(&self, result: RuntimeResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(Fault::Thrown(secondary)) => {
                debug!("dropped an exception raised while translating another one");
                self.runtime.delete_local_ref(secondary);
                None
            }
            Err(_) => None,
        }
    }

    /// Build the Java throwable for an error and register it.
    ///
    /// A translated Java exception yields its original throwable. A
    /// [`HostError`](struct.HostError.html) yields its requested class (by default
    /// `java.lang.RuntimeException`) with its message and cause. Any other error yields a
    /// `java.lang.RuntimeException` carrying the error's text.
    pub fn to_native_throwable(
        &self,
        context: &ThreadContext,
        error: &BridgeError,
    ) -> Result<NativeRef> {
        let registry = self
            .registry
            .ok_or_else(|| BridgeError::Jni(JniError::InvalidArguments))?;
        let (handle, local) = self.throwable_for(context, error)?;
        if local {
            registry.register(context, handle)
        } else {
            let local = self
                .runtime
                .new_local_ref(handle)
                .map_err(|fault| self.fault(context, fault))?;
            registry.register(context, local)
        }
    }

    /// Make the throwable for `error` pending on the current thread.
    pub fn throw(&self, context: &ThreadContext, error: &BridgeError) {
        let (handle, local) = match self.throwable_for(context, error) {
            Ok(throwable) => throwable,
            Err(failure) => {
                warn!(%error, %failure, "could not build a throwable, throwing a plain one");
                let message = error.to_string();
                match self.new_throwable(context, RUNTIME_EXCEPTION, Some(message.as_str()), None) {
                    Ok(handle) => (handle, true),
                    Err(_) => return,
                }
            }
        };
        if let Err(fault) = self.runtime.throw(handle) {
            warn!(?fault, "could not throw an exception");
        }
        if local {
            self.runtime.delete_local_ref(handle);
        }
    }

    /// The throwable for an error, and whether it is a local reference owned by the caller.
    fn throwable_for(&self, context: &ThreadContext, error: &BridgeError) -> Result<(RawHandle, bool)> {
        match error {
            BridgeError::Java(exception) => {
                if let (Some(object), Some(registry)) = (exception.throwable(), self.registry) {
                    if let Ok(global) = registry.resolve(object.native_ref()) {
                        return Ok((global, false));
                    }
                }
                let cause = match exception.cause() {
                    Some(cause) => {
                        Some(self.throwable_for(context, &BridgeError::Java(cause.clone()))?)
                    }
                    None => None,
                };
                let result = self.new_throwable(
                    context,
                    &to_internal_name(exception.class_name()),
                    exception.message(),
                    cause.map(|(handle, _)| handle),
                );
                self.release(cause);
                result.map(|handle| (handle, true))
            }
            BridgeError::Host(host) => {
                let cause = match host.cause() {
                    Some(cause) => Some(self.throwable_for(context, cause)?),
                    None => None,
                };
                let class = host
                    .class_name()
                    .map(to_internal_name)
                    .unwrap_or_else(|| RUNTIME_EXCEPTION.to_owned());
                let result = self.new_throwable(
                    context,
                    &class,
                    Some(host.message()),
                    cause.map(|(handle, _)| handle),
                );
                self.release(cause);
                result.map(|handle| (handle, true))
            }
            other => self
                .new_throwable(context, RUNTIME_EXCEPTION, Some(other.to_string().as_str()), None)
                .map(|handle| (handle, true)),
        }
    }

    fn release(&self, throwable: Option<(RawHandle, bool)>) {
        if let Some((handle, true)) = throwable {
            self.runtime.delete_local_ref(handle);
        }
    }

    /// Instantiate `class`, falling back to `java.lang.RuntimeException` when it can't be.
    fn new_throwable(
        &self,
        context: &ThreadContext,
        class: &str,
        message: Option<&str>,
        cause: Option<RawHandle>,
    ) -> Result<RawHandle> {
        match self.runtime.new_throwable(class, message, cause) {
            Ok(handle) => Ok(handle),
            Err(fault) if class != RUNTIME_EXCEPTION => {
                let failure = self.fault(context, fault);
                debug!(class, %failure, "falling back to java.lang.RuntimeException");
                self.runtime
                    .new_throwable(RUNTIME_EXCEPTION, message, cause)
                    .map_err(|fault| self.fault(context, fault))
            }
            Err(fault) => Err(self.fault(context, fault)),
        }
    }

    /// Turn a runtime failure into a bridge error. Consumes the thrown handle.
    pub(crate) fn fault(&self, context: &ThreadContext, fault: Fault) -> BridgeError {
        match fault {
            Fault::Thrown(throwable) => {
                let exception = self.to_host_error(context, throwable);
                self.runtime.delete_local_ref(throwable);
                BridgeError::Java(exception)
            }
            Fault::OutOfMemory => {
                BridgeError::ResourceExhausted("the Java VM is out of memory".to_owned())
            }
            Fault::Jni(JniError::ThreadDetached) => BridgeError::ThreadNotAttached,
            Fault::Jni(error) => BridgeError::Jni(error),
        }
    }

    /// Take, clear and translate the current thread's pending exception.
    pub fn check_pending(&self, context: &ThreadContext) -> Result<()> {
        match self.runtime.take_pending_exception() {
            Some(throwable) => Err(self.fault(context, Fault::Thrown(throwable))),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod exception_translator_tests {
    use super::*;
    use crate::attach_arguments::AttachArguments;
    use crate::config::Configuration;
    use crate::error::HostError;
    use crate::testing::FakeRuntime;
    use crate::thread::ThreadContexts;

    struct Setup {
        runtime: Arc<FakeRuntime>,
        registry: Arc<ReferenceRegistry>,
        context: ThreadContext,
    }

    fn setup() -> Setup {
        let runtime = Arc::new(FakeRuntime::new());
        let registry = Arc::new(ReferenceRegistry::new(1, runtime.clone()));
        let contexts = Arc::new(ThreadContexts::new(1, runtime.clone()));
        let context = contexts
            .ensure_attached(&AttachArguments::new(&Configuration::new()))
            .unwrap();
        Setup {
            runtime,
            registry,
            context,
        }
    }

    #[test]
    fn translate_chain() {
        let setup = setup();
        let runtime = &*setup.runtime;
        let root = runtime
            .new_throwable("java/io/IOException", Some("disk"), None)
            .unwrap();
        let outer = runtime
            .new_throwable("java/lang/IllegalStateException", Some("broken"), Some(root))
            .unwrap();
        let translator = ExceptionTranslator::new(runtime, &setup.registry);
        let exception = translator.to_host_error(&setup.context, outer);
        assert_eq!(exception.class_name(), "java.lang.IllegalStateException");
        assert_eq!(exception.message(), Some("broken"));
        assert_eq!(exception.kind(), ExceptionKind::RuntimeException);
        let cause = exception.cause().unwrap();
        assert_eq!(cause.class_name(), "java.io.IOException");
        assert_eq!(cause.message(), Some("disk"));
        assert_eq!(cause.kind(), ExceptionKind::CheckedException);
        assert!(cause.cause().is_none());
        assert!(exception.throwable().is_some());
    }

    #[test]
    fn cyclic_chain() {
        let setup = setup();
        let runtime = &*setup.runtime;
        let first = runtime
            .new_throwable("java/lang/RuntimeException", Some("first"), None)
            .unwrap();
        let second = runtime
            .new_throwable("java/lang/RuntimeException", Some("second"), Some(first))
            .unwrap();
        runtime.set_cause(first, second);
        let exception = ExceptionTranslator::detached(runtime).to_host_error(&setup.context, first);
        let second = exception.cause().unwrap();
        assert_eq!(second.message(), Some("second"));
        assert!(second.cause().is_none());
    }

    #[test]
    fn rethrow_original() {
        let setup = setup();
        let runtime = &*setup.runtime;
        let throwable = runtime
            .new_throwable("java/lang/ArithmeticException", Some("/ by zero"), None)
            .unwrap();
        let translator = ExceptionTranslator::new(runtime, &setup.registry);
        let error = BridgeError::Java(translator.to_host_error(&setup.context, throwable));
        translator.throw(&setup.context, &error);
        let pending = runtime.take_pending_exception().unwrap();
        assert!(runtime.is_same_object(pending, throwable));
    }

    #[test]
    fn host_error_with_class_and_cause() {
        let setup = setup();
        let runtime = &*setup.runtime;
        let translator = ExceptionTranslator::new(runtime, &setup.registry);
        let error = BridgeError::Host(
            HostError::new("bad input")
                .with_class("java.lang.IllegalArgumentException")
                .with_cause(BridgeError::Encoding("lone surrogate".to_owned())),
        );
        let reference = translator
            .to_native_throwable(&setup.context, &error)
            .unwrap();
        let throwable = setup.registry.resolve(reference).unwrap();
        let exception = translator.to_host_error(&setup.context, throwable);
        assert_eq!(exception.class_name(), "java.lang.IllegalArgumentException");
        assert_eq!(exception.message(), Some("bad input"));
        let cause = exception.cause().unwrap();
        assert_eq!(cause.class_name(), "java.lang.RuntimeException");
        assert_eq!(cause.message(), Some("malformed string: lone surrogate"));
    }

    #[test]
    fn unknown_host_class_falls_back() {
        let setup = setup();
        let runtime = &*setup.runtime;
        let translator = ExceptionTranslator::new(runtime, &setup.registry);
        let error = BridgeError::Host(HostError::new("nope").with_class("com.example.Missing"));
        translator.throw(&setup.context, &error);
        let error = translator.check_pending(&setup.context).unwrap_err();
        let exception = error.as_java().unwrap();
        assert_eq!(exception.class_name(), "java.lang.RuntimeException");
        assert_eq!(exception.message(), Some("nope"));
        assert!(runtime.take_pending_exception().is_none());
    }

    #[test]
    fn other_errors_become_runtime_exceptions() {
        let setup = setup();
        let runtime = &*setup.runtime;
        let translator = ExceptionTranslator::new(runtime, &setup.registry);
        translator.throw(&setup.context, &BridgeError::StaleReference);
        let error = translator.check_pending(&setup.context).unwrap_err();
        assert_eq!(
            error.to_string(),
            "java.lang.RuntimeException: the Java reference has been released"
        );
    }

    #[test]
    fn malformed_message_is_dropped() {
        let setup = setup();
        let runtime = &*setup.runtime;
        let throwable = runtime
            .new_throwable("java/lang/IllegalStateException", Some("placeholder"), None)
            .unwrap();
        runtime.set_message_units(throwable, &[0x6f, 0x6b, 0xdc00]);
        let exception = ExceptionTranslator::detached(runtime).to_host_error(&setup.context, throwable);
        assert_eq!(exception.class_name(), "java.lang.IllegalStateException");
        assert_eq!(exception.message(), None);
        assert_eq!(exception.to_string(), "java.lang.IllegalStateException");
    }

    #[test]
    fn null_message_stays_null() {
        let setup = setup();
        let runtime = &*setup.runtime;
        let translator = ExceptionTranslator::new(runtime, &setup.registry);
        let error = BridgeError::Java(
            JavaException::new("java.lang.IllegalStateException", None)
                .with_cause(JavaException::new("java.io.IOException", Some("disk".to_owned()))),
        );
        let reference = translator
            .to_native_throwable(&setup.context, &error)
            .unwrap();
        let throwable = setup.registry.resolve(reference).unwrap();
        assert_eq!(runtime.class_of(throwable), "java.lang.IllegalStateException");
        assert_eq!(runtime.message_of(throwable), None);
        let cause = runtime.throwable_cause(throwable).unwrap().unwrap();
        assert_eq!(runtime.message_of(cause), Some("disk".to_owned()));
        let exception = translator.to_host_error(&setup.context, throwable);
        assert_eq!(exception.message(), None);
    }

    #[test]
    fn faults() {
        let setup = setup();
        let translator = ExceptionTranslator::detached(&*setup.runtime);
        match translator.fault(&setup.context, Fault::OutOfMemory) {
            BridgeError::ResourceExhausted(_) => {}
            other => panic!("unexpected error {:?}", other),
        }
        match translator.fault(&setup.context, Fault::Jni(JniError::ThreadDetached)) {
            BridgeError::ThreadNotAttached => {}
            other => panic!("unexpected error {:?}", other),
        }
        assert!(translator.check_pending(&setup.context).is_ok());
    }
}
