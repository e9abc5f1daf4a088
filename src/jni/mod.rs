//! The [`Runtime`](../trait.Runtime.html) backed by a real Java VM through the JNI function
//! tables.

mod native;

use crate::attach_arguments::AttachArguments;
use crate::config::Configuration;
use crate::error::{BridgeError, JniError, Result};
use crate::java_string::{to_internal_name, to_java_string};
use crate::runtime::{AttachOutcome, Fault, MethodDescription, RawHandle, Runtime, RuntimeResult};
use crate::types::PrimitiveKind;
use crate::value::{ArrayRegion, ArrayRegionMut, PrimitiveValue};
use crate::version::JniVersion;
use cfg_if::cfg_if;
use jni_sys;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::convert::TryFrom;
use std::fmt;
use std::os::raw::{c_char, c_void};
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

include!("call_jni_method.rs");

const HANDLER_CLASS: &str = "org/rustjni/bridge/NativeInvocationHandler";
const STATIC_MODIFIER: i32 = 0x0008;

cfg_if! {
    if #[cfg(rust_jni_bridge_handler)] {
        const HANDLER_BYTECODE: Option<&[u8]> = Some(include_bytes!(concat!(
            env!("OUT_DIR"),
            "/org/rustjni/bridge/NativeInvocationHandler.class"
        )));
    } else {
        const HANDLER_BYTECODE: Option<&[u8]> = None;
    }
}

/// A raw `JavaVM` pointer.
///
/// [JNI documentation](https://docs.oracle.com/javase/10/docs/specs/jni/invocation.html#jni_createjavavm)
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct JavaVMRef {
    java_vm: *mut jni_sys::JavaVM,
}

/// Guaranteed to be safe by JNI.
///
/// [JNI documentation](https://docs.oracle.com/javase/10/docs/specs/jni/invocation.html#jni_createjavavm)
unsafe impl Send for JavaVMRef {}

/// Guaranteed to be safe by JNI.
///
/// [JNI documentation](https://docs.oracle.com/javase/10/docs/specs/jni/invocation.html#jni_createjavavm)
unsafe impl Sync for JavaVMRef {}

impl JavaVMRef {
    fn raw_jvm(&self) -> *mut jni_sys::JavaVM {
        self.java_vm
    }
}

/// The `JNIEnv` of the current thread. Never leaves the thread it was obtained on.
#[derive(Clone, Copy)]
struct Env {
    jni_env: *mut jni_sys::JNIEnv,
}

impl Env {
    fn raw_env(&self) -> *mut jni_sys::JNIEnv {
        self.jni_env
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Dispatch {
    Instance,
    Static,
}

type MethodKey = (String, String, String, Dispatch);

/// A [`Runtime`](../trait.Runtime.html) over a Java VM loaded into this process.
///
/// Classes and method ids are looked up once and cached; cached classes are held by global
/// references.
pub struct JniRuntime {
    java_vm: JavaVMRef,
    version: JniVersion,
    classes: Mutex<HashMap<String, usize>>,
    methods: Mutex<HashMap<MethodKey, usize>>,
    handler: Mutex<Option<usize>>,
    destroyed: AtomicBool,
}

impl JniRuntime {
    /// Create a Java VM with the specified configuration.
    ///
    /// [Only one](https://docs.oracle.com/javase/10/docs/specs/jni/invocation.html#jni_createjavavm)
    /// Java VM per process is supported.
    ///
    /// [JNI documentation](https://docs.oracle.com/javase/10/docs/specs/jni/invocation.html#jni_createjavavm)
    pub fn create(configuration: &Configuration) -> Result<Self> {
        if !LIBJVM_LINKED {
            return Err(BridgeError::Startup(
                "built without the `libjvm` feature".to_owned(),
            ));
        }
        let mut java_vm: *mut jni_sys::JavaVM = ptr::null_mut();
        let mut jni_env: *mut jni_sys::JNIEnv = ptr::null_mut();
        let mut strings_buffer = vec![];
        let mut options_buffer = vec![];
        let mut raw_arguments = configuration.to_raw(&mut strings_buffer, &mut options_buffer)?;
        debug!(
            version = %configuration.version(),
            options = raw_arguments.raw_arguments.nOptions,
            "creating a Java VM"
        );
        // Safe because we pass pointers to valid values which we just initialized.
        let error = JniError::from_raw(unsafe {
            JNI_CreateJavaVM(
                (&mut java_vm) as *mut *mut jni_sys::JavaVM,
                (&mut jni_env) as *mut *mut jni_sys::JNIEnv as *mut *mut c_void,
                &mut raw_arguments.raw_arguments as *mut jni_sys::JavaVMInitArgs as *mut c_void,
            )
        });
        match error {
            None => {
                let runtime = Self::new(java_vm, configuration.version());
                // `JNI_CreateJavaVM` attaches the creating thread. Threads attach through
                // `ThreadContexts` only, so undo that here.
                runtime.detach_current_thread().map_err(|fault| {
                    BridgeError::Startup(format!(
                        "could not detach the creating thread: {:?}",
                        fault
                    ))
                })?;
                info!(version = %configuration.version(), "created a Java VM");
                Ok(runtime)
            }
            Some(JniError::VmExists) => Err(BridgeError::AlreadyStarted),
            Some(error) => Err(BridgeError::Startup(format!(
                "JNI_CreateJavaVM failed: {}",
                error
            ))),
        }
    }

    /// Wrap a Java VM created elsewhere.
    ///
    /// # Safety
    ///
    /// `java_vm` must be a valid `JavaVM` pointer that outlives the runtime.
    pub unsafe fn adopt(java_vm: *mut jni_sys::JavaVM, configuration: &Configuration) -> Result<Self> {
        if java_vm.is_null() {
            return Err(BridgeError::Startup("null Java VM pointer".to_owned()));
        }
        Ok(Self::new(java_vm, configuration.version()))
    }

    fn new(java_vm: *mut jni_sys::JavaVM, version: JniVersion) -> Self {
        JniRuntime {
            java_vm: JavaVMRef { java_vm },
            version,
            classes: Mutex::new(HashMap::new()),
            methods: Mutex::new(HashMap::new()),
            handler: Mutex::new(None),
            destroyed: AtomicBool::new(false),
        }
    }

    /// The raw `JavaVM` pointer.
    ///
    /// This function provides low-level access to all of JNI and thus is unsafe.
    pub unsafe fn raw_jvm(&self) -> *mut jni_sys::JavaVM {
        self.java_vm.raw_jvm()
    }

    /// [JNI documentation](https://docs.oracle.com/javase/10/docs/specs/jni/invocation.html#getenv)
    fn env(&self) -> RuntimeResult<Env> {
        let mut jni_env: *mut c_void = ptr::null_mut();
        // Safe because the pointer is valid for the lifetime of the runtime.
        let status = unsafe {
            call_vm_method!(
                self.java_vm,
                GetEnv,
                &mut jni_env as *mut *mut c_void,
                self.version.to_raw()
            )
        };
        match JniError::from_raw(status) {
            None if !jni_env.is_null() => Ok(Env {
                jni_env: jni_env as *mut jni_sys::JNIEnv,
            }),
            None => Err(Fault::Jni(JniError::ThreadDetached)),
            Some(error) => Err(Fault::Jni(error)),
        }
    }

    /// Turn a pending exception into [`Fault::Thrown`](../enum.Fault.html).
    fn check(&self, env: Env) -> RuntimeResult<()> {
        // Safe because `env` belongs to the current thread.
        let exception = unsafe { call_jni_method!(env, ExceptionOccurred) };
        match RawHandle::from_jobject(exception) {
            None => Ok(()),
            Some(exception) => {
                unsafe { call_jni_method!(env, ExceptionClear) };
                Err(Fault::Thrown(exception))
            }
        }
    }

    /// Check for an exception, then treat a null result as an allocation failure.
    fn non_null(&self, env: Env, object: jni_sys::jobject) -> RuntimeResult<RawHandle> {
        self.check(env)?;
        RawHandle::from_jobject(object).ok_or(Fault::OutOfMemory)
    }

    fn nullable(&self, env: Env, object: jni_sys::jobject) -> RuntimeResult<Option<RawHandle>> {
        self.check(env)?;
        Ok(RawHandle::from_jobject(object))
    }

    fn delete_local(&self, env: Env, object: jni_sys::jobject) {
        if !object.is_null() {
            unsafe { call_jni_method!(env, DeleteLocalRef, object) };
        }
    }

    /// A cached global reference to a class. `name` is an internal name or array signature.
    fn class(&self, env: Env, name: &str) -> RuntimeResult<jni_sys::jclass> {
        if let Some(class) = self.classes.lock().get(name) {
            return Ok(*class as jni_sys::jclass);
        }
        let raw_name = to_java_string(name);
        // Safe because `raw_name` is a null-terminated modified UTF-8 string.
        let local = unsafe { call_jni_method!(env, FindClass, raw_name.as_ptr() as *const c_char) };
        let local = self.non_null(env, local)?;
        self.cache_class(env, name, local.as_jobject())
    }

    fn cache_class(
        &self,
        env: Env,
        name: &str,
        local: jni_sys::jclass,
    ) -> RuntimeResult<jni_sys::jclass> {
        let global = unsafe { call_jni_method!(env, NewGlobalRef, local) };
        self.delete_local(env, local);
        if global.is_null() {
            return Err(Fault::OutOfMemory);
        }
        let mut classes = self.classes.lock();
        match classes.get(name) {
            Some(existing) => {
                // Another thread cached it first.
                unsafe { call_jni_method!(env, DeleteGlobalRef, global) };
                Ok(*existing as jni_sys::jclass)
            }
            None => {
                classes.insert(name.to_owned(), global as usize);
                Ok(global)
            }
        }
    }

    fn method_id(
        &self,
        env: Env,
        class: &str,
        name: &str,
        descriptor: &str,
        dispatch: Dispatch,
    ) -> RuntimeResult<jni_sys::jmethodID> {
        let key = (
            class.to_owned(),
            name.to_owned(),
            descriptor.to_owned(),
            dispatch,
        );
        if let Some(method) = self.methods.lock().get(&key) {
            return Ok(*method as jni_sys::jmethodID);
        }
        let raw_class = self.class(env, class)?;
        let raw_name = to_java_string(name);
        let raw_descriptor = to_java_string(descriptor);
        // Safe because the strings are null-terminated and `raw_class` is a valid class.
        let method = unsafe {
            match dispatch {
                Dispatch::Instance => call_jni_method!(
                    env,
                    GetMethodID,
                    raw_class,
                    raw_name.as_ptr() as *const c_char,
                    raw_descriptor.as_ptr() as *const c_char
                ),
                Dispatch::Static => call_jni_method!(
                    env,
                    GetStaticMethodID,
                    raw_class,
                    raw_name.as_ptr() as *const c_char,
                    raw_descriptor.as_ptr() as *const c_char
                ),
            }
        };
        self.check(env)?;
        if method.is_null() {
            return Err(Fault::Jni(JniError::InvalidArguments));
        }
        self.methods.lock().insert(key, method as usize);
        Ok(method)
    }

    fn call_object(
        &self,
        env: Env,
        object: jni_sys::jobject,
        class: &str,
        name: &str,
        descriptor: &str,
        arguments: &[jni_sys::jvalue],
    ) -> RuntimeResult<Option<RawHandle>> {
        let method = self.method_id(env, class, name, descriptor, Dispatch::Instance)?;
        let result =
            unsafe { call_jni_method!(env, CallObjectMethodA, object, method, arguments.as_ptr()) };
        self.nullable(env, result)
    }

    fn call_static_object(
        &self,
        env: Env,
        class: &str,
        name: &str,
        descriptor: &str,
        arguments: &[jni_sys::jvalue],
    ) -> RuntimeResult<Option<RawHandle>> {
        let method = self.method_id(env, class, name, descriptor, Dispatch::Static)?;
        let raw_class = self.class(env, class)?;
        let result = unsafe {
            call_jni_method!(
                env,
                CallStaticObjectMethodA,
                raw_class,
                method,
                arguments.as_ptr()
            )
        };
        self.nullable(env, result)
    }

    fn call_int(
        &self,
        env: Env,
        object: jni_sys::jobject,
        class: &str,
        name: &str,
    ) -> RuntimeResult<i32> {
        let method = self.method_id(env, class, name, "()I", Dispatch::Instance)?;
        let no_arguments: [jni_sys::jvalue; 0] = [];
        let result =
            unsafe { call_jni_method!(env, CallIntMethodA, object, method, no_arguments.as_ptr()) };
        self.check(env)?;
        Ok(result)
    }

    fn units(&self, env: Env, string: jni_sys::jstring) -> RuntimeResult<Vec<u16>> {
        let length = unsafe { call_jni_method!(env, GetStringLength, string) };
        self.check(env)?;
        let mut units = vec![0; length as usize];
        unsafe {
            call_jni_method!(
                env,
                GetStringRegion,
                string,
                0,
                length,
                units.as_mut_ptr()
            )
        };
        self.check(env)?;
        Ok(units)
    }

    /// Binary name of a class object.
    fn name_of_class(&self, env: Env, class: jni_sys::jclass) -> RuntimeResult<String> {
        let name = self
            .call_object(env, class, "java/lang/Class", "getName", "()Ljava/lang/String;", &[])?
            .ok_or(Fault::OutOfMemory)?;
        let units = self.units(env, name.as_jobject());
        self.delete_local(env, name.as_jobject());
        Ok(String::from_utf16_lossy(&units?))
    }

    /// JNI type signature of a class object.
    fn signature_of_class(&self, env: Env, class: jni_sys::jclass) -> RuntimeResult<String> {
        let name = self.name_of_class(env, class)?;
        if name.is_empty() {
            warn!("unexpected empty class name");
            return Err(Fault::Jni(JniError::InvalidArguments));
        }
        Ok(java_name_signature(&name))
    }

    fn system_class_loader(&self, env: Env) -> RuntimeResult<RawHandle> {
        self.call_static_object(
            env,
            "java/lang/ClassLoader",
            "getSystemClassLoader",
            "()Ljava/lang/ClassLoader;",
            &[],
        )?
        .ok_or(Fault::OutOfMemory)
    }

    /// The invocation handler class, with its native method registered.
    fn handler_class(&self, env: Env) -> RuntimeResult<jni_sys::jclass> {
        if let Some(class) = *self.handler.lock() {
            return Ok(class as jni_sys::jclass);
        }
        let class = match (self.class(env, HANDLER_CLASS), HANDLER_BYTECODE) {
            (Ok(class), _) => class,
            (Err(Fault::Thrown(error)), Some(bytecode)) => {
                self.delete_local(env, error.as_jobject());
                debug!("defining the invocation handler class");
                self.define_handler(env, bytecode)?
            }
            (Err(fault), _) => return Err(fault),
        };
        let mut name = to_java_string("invoke0");
        let mut signature = to_java_string(native::INVOKE_SIGNATURE);
        let methods = [jni_sys::JNINativeMethod {
            name: name.as_mut_ptr() as *mut c_char,
            signature: signature.as_mut_ptr() as *mut c_char,
            fnPtr: native::invoke0 as *mut c_void,
        }];
        // Safe because the method table outlives the call and matches the Java declaration.
        let status =
            unsafe { call_jni_method!(env, RegisterNatives, class, methods.as_ptr(), 1) };
        self.check(env)?;
        if let Some(error) = JniError::from_raw(status) {
            return Err(Fault::Jni(error));
        }
        *self.handler.lock() = Some(class as usize);
        Ok(class)
    }

    fn define_handler(&self, env: Env, bytecode: &[u8]) -> RuntimeResult<jni_sys::jclass> {
        let loader = self.system_class_loader(env)?;
        let raw_name = to_java_string(HANDLER_CLASS);
        let local = unsafe {
            call_jni_method!(
                env,
                DefineClass,
                raw_name.as_ptr() as *const c_char,
                loader.as_jobject(),
                bytecode.as_ptr() as *const jni_sys::jbyte,
                bytecode.len() as jni_sys::jsize
            )
        };
        self.delete_local(env, loader.as_jobject());
        let local = self.non_null(env, local)?;
        self.cache_class(env, HANDLER_CLASS, local.as_jobject())
    }

    fn release_caches(&self, env: Option<Env>) {
        self.methods.lock().clear();
        *self.handler.lock() = None;
        let classes: Vec<usize> = self.classes.lock().drain().map(|(_, class)| class).collect();
        match env {
            Some(env) => {
                for class in classes {
                    unsafe { call_jni_method!(env, DeleteGlobalRef, class as jni_sys::jobject) };
                }
            }
            None if !classes.is_empty() => {
                debug!(
                    classes = classes.len(),
                    "dropping cached classes from a detached thread"
                );
            }
            None => {}
        }
    }
}

/// Type signature for a `Class.getName()` result: `int`, `[I`, `java.lang.String`.
fn java_name_signature(name: &str) -> String {
    if name == "void" {
        return "V".to_owned();
    }
    if let Some(kind) = PrimitiveKind::ALL.iter().find(|kind| kind.java_name() == name) {
        return kind.signature().to_string();
    }
    if name.starts_with('[') {
        return to_internal_name(name);
    }
    format!("L{};", to_internal_name(name))
}

fn size(value: usize) -> RuntimeResult<jni_sys::jsize> {
    jni_sys::jsize::try_from(value).map_err(|_| Fault::Jni(JniError::InvalidArguments))
}

fn status(code: jni_sys::jint) -> RuntimeResult<()> {
    match JniError::from_raw(code) {
        None => Ok(()),
        Some(error) => Err(Fault::Jni(error)),
    }
}

fn argument(value: PrimitiveValue) -> jni_sys::jvalue {
    match value {
        PrimitiveValue::Boolean(value) => jni_sys::jvalue {
            z: value as jni_sys::jboolean,
        },
        PrimitiveValue::Byte(value) => jni_sys::jvalue { b: value },
        PrimitiveValue::Char(value) => jni_sys::jvalue { c: value },
        PrimitiveValue::Short(value) => jni_sys::jvalue { s: value },
        PrimitiveValue::Int(value) => jni_sys::jvalue { i: value },
        PrimitiveValue::Long(value) => jni_sys::jvalue { j: value },
        PrimitiveValue::Float(value) => jni_sys::jvalue { f: value },
        PrimitiveValue::Double(value) => jni_sys::jvalue { d: value },
    }
}

fn object_argument(object: Option<RawHandle>) -> jni_sys::jvalue {
    jni_sys::jvalue {
        l: object.map_or(ptr::null_mut(), RawHandle::as_jobject),
    }
}

impl Runtime for JniRuntime {
    fn version(&self) -> JniVersion {
        self.version
    }

    fn attach_current_thread(&self, arguments: &AttachArguments) -> RuntimeResult<AttachOutcome> {
        if self.is_current_thread_attached() {
            return Ok(AttachOutcome::AlreadyAttached);
        }
        let mut buffer = vec![];
        let mut raw_arguments = arguments.to_raw(&mut buffer);
        let mut jni_env: *mut c_void = ptr::null_mut();
        let raw_env = &mut jni_env as *mut *mut c_void;
        let raw_attach =
            &mut raw_arguments.raw_arguments as *mut jni_sys::JavaVMAttachArgs as *mut c_void;
        // Safe because the arguments are valid for the duration of the call.
        let code = unsafe {
            if arguments.is_daemon() {
                call_vm_method!(self.java_vm, AttachCurrentThreadAsDaemon, raw_env, raw_attach)
            } else {
                call_vm_method!(self.java_vm, AttachCurrentThread, raw_env, raw_attach)
            }
        };
        status(code)?;
        Ok(AttachOutcome::Attached)
    }

    fn detach_current_thread(&self) -> RuntimeResult<()> {
        status(unsafe { call_vm_method!(self.java_vm, DetachCurrentThread) })
    }

    fn is_current_thread_attached(&self) -> bool {
        self.env().is_ok()
    }

    fn destroy(&self) -> RuntimeResult<()> {
        self.release_caches(self.env().ok());
        self.destroyed.store(true, Ordering::Release);
        status(unsafe { call_vm_method!(self.java_vm, DestroyJavaVM) })
    }

    fn new_global_ref(&self, object: RawHandle) -> RuntimeResult<RawHandle> {
        let env = self.env()?;
        let global = unsafe { call_jni_method!(env, NewGlobalRef, object.as_jobject()) };
        RawHandle::from_jobject(global).ok_or(Fault::OutOfMemory)
    }

    fn delete_global_ref(&self, object: RawHandle) {
        match self.env() {
            Ok(env) => unsafe { call_jni_method!(env, DeleteGlobalRef, object.as_jobject()) },
            Err(fault) => warn!(?fault, "could not delete a global reference"),
        }
    }

    fn new_local_ref(&self, object: RawHandle) -> RuntimeResult<RawHandle> {
        let env = self.env()?;
        let local = unsafe { call_jni_method!(env, NewLocalRef, object.as_jobject()) };
        RawHandle::from_jobject(local).ok_or(Fault::OutOfMemory)
    }

    fn delete_local_ref(&self, object: RawHandle) {
        match self.env() {
            Ok(env) => self.delete_local(env, object.as_jobject()),
            Err(fault) => warn!(?fault, "could not delete a local reference"),
        }
    }

    fn is_same_object(&self, first: RawHandle, second: RawHandle) -> bool {
        match self.env() {
            Ok(env) => {
                let same = unsafe {
                    call_jni_method!(env, IsSameObject, first.as_jobject(), second.as_jobject())
                };
                same != jni_sys::JNI_FALSE
            }
            Err(_) => false,
        }
    }

    fn identity_hash(&self, object: RawHandle) -> RuntimeResult<i32> {
        let env = self.env()?;
        let method = self.method_id(
            env,
            "java/lang/System",
            "identityHashCode",
            "(Ljava/lang/Object;)I",
            Dispatch::Static,
        )?;
        let class = self.class(env, "java/lang/System")?;
        let arguments = [object_argument(Some(object))];
        let hash = unsafe {
            call_jni_method!(env, CallStaticIntMethodA, class, method, arguments.as_ptr())
        };
        self.check(env)?;
        Ok(hash)
    }

    fn class_name(&self, object: RawHandle) -> RuntimeResult<String> {
        let env = self.env()?;
        let class = unsafe { call_jni_method!(env, GetObjectClass, object.as_jobject()) };
        let class = self.non_null(env, class)?;
        let name = self.name_of_class(env, class.as_jobject());
        self.delete_local(env, class.as_jobject());
        name
    }

    fn class_ancestry(&self, object: RawHandle) -> RuntimeResult<Vec<String>> {
        let env = self.env()?;
        let mut class = unsafe { call_jni_method!(env, GetObjectClass, object.as_jobject()) };
        self.non_null(env, class)?;
        let mut ancestry = vec![];
        loop {
            let superclass = unsafe { call_jni_method!(env, GetSuperclass, class) };
            self.delete_local(env, class);
            if superclass.is_null() {
                return Ok(ancestry);
            }
            match self.name_of_class(env, superclass) {
                Ok(name) => ancestry.push(name),
                Err(fault) => {
                    self.delete_local(env, superclass);
                    return Err(fault);
                }
            }
            class = superclass;
        }
    }

    fn is_instance_of(&self, object: RawHandle, class: &str) -> RuntimeResult<bool> {
        let env = self.env()?;
        let class = self.class(env, class)?;
        let instance = unsafe { call_jni_method!(env, IsInstanceOf, object.as_jobject(), class) };
        Ok(instance != jni_sys::JNI_FALSE)
    }

    fn box_primitive(&self, value: PrimitiveValue) -> RuntimeResult<RawHandle> {
        let env = self.env()?;
        let kind = value.kind();
        let descriptor = format!("({})L{};", kind.signature(), kind.box_class());
        self.call_static_object(env, kind.box_class(), "valueOf", &descriptor, &[argument(value)])?
            .ok_or(Fault::OutOfMemory)
    }

    fn unbox_primitive(
        &self,
        object: RawHandle,
        kind: PrimitiveKind,
    ) -> RuntimeResult<PrimitiveValue> {
        let env = self.env()?;
        let name = format!("{}Value", kind.java_name());
        let descriptor = format!("(){}", kind.signature());
        let method = self.method_id(env, kind.box_class(), &name, &descriptor, Dispatch::Instance)?;
        let object = object.as_jobject();
        let no_arguments: [jni_sys::jvalue; 0] = [];
        let arguments = no_arguments.as_ptr();
        // Safe because `method` was looked up on the box class of `kind`.
        let value = unsafe {
            match kind {
                PrimitiveKind::Boolean => PrimitiveValue::Boolean(
                    call_jni_method!(env, CallBooleanMethodA, object, method, arguments)
                        != jni_sys::JNI_FALSE,
                ),
                PrimitiveKind::Byte => PrimitiveValue::Byte(call_jni_method!(
                    env,
                    CallByteMethodA,
                    object,
                    method,
                    arguments
                )),
                PrimitiveKind::Char => PrimitiveValue::Char(call_jni_method!(
                    env,
                    CallCharMethodA,
                    object,
                    method,
                    arguments
                )),
                PrimitiveKind::Short => PrimitiveValue::Short(call_jni_method!(
                    env,
                    CallShortMethodA,
                    object,
                    method,
                    arguments
                )),
                PrimitiveKind::Int => PrimitiveValue::Int(call_jni_method!(
                    env,
                    CallIntMethodA,
                    object,
                    method,
                    arguments
                )),
                PrimitiveKind::Long => PrimitiveValue::Long(call_jni_method!(
                    env,
                    CallLongMethodA,
                    object,
                    method,
                    arguments
                )),
                PrimitiveKind::Float => PrimitiveValue::Float(call_jni_method!(
                    env,
                    CallFloatMethodA,
                    object,
                    method,
                    arguments
                )),
                PrimitiveKind::Double => PrimitiveValue::Double(call_jni_method!(
                    env,
                    CallDoubleMethodA,
                    object,
                    method,
                    arguments
                )),
            }
        };
        self.check(env)?;
        Ok(value)
    }

    fn new_string(&self, units: &[u16]) -> RuntimeResult<RawHandle> {
        let env = self.env()?;
        let length = size(units.len())?;
        let string = unsafe { call_jni_method!(env, NewString, units.as_ptr(), length) };
        self.non_null(env, string)
    }

    fn string_units(&self, string: RawHandle) -> RuntimeResult<Vec<u16>> {
        let env = self.env()?;
        self.units(env, string.as_jobject())
    }

    fn new_primitive_array(&self, kind: PrimitiveKind, length: usize) -> RuntimeResult<RawHandle> {
        let env = self.env()?;
        let length = size(length)?;
        let array = unsafe {
            match kind {
                PrimitiveKind::Boolean => call_jni_method!(env, NewBooleanArray, length),
                PrimitiveKind::Byte => call_jni_method!(env, NewByteArray, length),
                PrimitiveKind::Char => call_jni_method!(env, NewCharArray, length),
                PrimitiveKind::Short => call_jni_method!(env, NewShortArray, length),
                PrimitiveKind::Int => call_jni_method!(env, NewIntArray, length),
                PrimitiveKind::Long => call_jni_method!(env, NewLongArray, length),
                PrimitiveKind::Float => call_jni_method!(env, NewFloatArray, length),
                PrimitiveKind::Double => call_jni_method!(env, NewDoubleArray, length),
            }
        };
        self.non_null(env, array)
    }

    fn new_object_array(&self, element_class: &str, length: usize) -> RuntimeResult<RawHandle> {
        let env = self.env()?;
        let length = size(length)?;
        let class = self.class(env, element_class)?;
        let array =
            unsafe { call_jni_method!(env, NewObjectArray, length, class, ptr::null_mut()) };
        self.non_null(env, array)
    }

    fn array_length(&self, array: RawHandle) -> RuntimeResult<usize> {
        let env = self.env()?;
        let length = unsafe { call_jni_method!(env, GetArrayLength, array.as_jobject()) };
        self.check(env)?;
        Ok(length as usize)
    }

    fn read_region(
        &self,
        array: RawHandle,
        start: usize,
        region: ArrayRegionMut<'_>,
    ) -> RuntimeResult<()> {
        let env = self.env()?;
        let array = array.as_jobject();
        let start = size(start)?;
        let length = size(region.len())?;
        // Safe because each buffer holds `length` elements of the array's element type.
        unsafe {
            match region {
                ArrayRegionMut::Boolean(values) => {
                    let mut buffer = vec![jni_sys::JNI_FALSE; values.len()];
                    call_jni_method!(
                        env,
                        GetBooleanArrayRegion,
                        array,
                        start,
                        length,
                        buffer.as_mut_ptr()
                    );
                    for (value, raw) in values.iter_mut().zip(buffer) {
                        *value = raw != jni_sys::JNI_FALSE;
                    }
                }
                ArrayRegionMut::Byte(values) => call_jni_method!(
                    env,
                    GetByteArrayRegion,
                    array,
                    start,
                    length,
                    values.as_mut_ptr()
                ),
                ArrayRegionMut::Char(values) => call_jni_method!(
                    env,
                    GetCharArrayRegion,
                    array,
                    start,
                    length,
                    values.as_mut_ptr()
                ),
                ArrayRegionMut::Short(values) => call_jni_method!(
                    env,
                    GetShortArrayRegion,
                    array,
                    start,
                    length,
                    values.as_mut_ptr()
                ),
                ArrayRegionMut::Int(values) => call_jni_method!(
                    env,
                    GetIntArrayRegion,
                    array,
                    start,
                    length,
                    values.as_mut_ptr()
                ),
                ArrayRegionMut::Long(values) => call_jni_method!(
                    env,
                    GetLongArrayRegion,
                    array,
                    start,
                    length,
                    values.as_mut_ptr()
                ),
                ArrayRegionMut::Float(values) => call_jni_method!(
                    env,
                    GetFloatArrayRegion,
                    array,
                    start,
                    length,
                    values.as_mut_ptr()
                ),
                ArrayRegionMut::Double(values) => call_jni_method!(
                    env,
                    GetDoubleArrayRegion,
                    array,
                    start,
                    length,
                    values.as_mut_ptr()
                ),
            }
        }
        self.check(env)
    }

    fn write_region(
        &self,
        array: RawHandle,
        start: usize,
        region: ArrayRegion<'_>,
    ) -> RuntimeResult<()> {
        let env = self.env()?;
        let array = array.as_jobject();
        let start = size(start)?;
        let length = size(region.len())?;
        // Safe because each buffer holds `length` elements of the array's element type.
        unsafe {
            match region {
                ArrayRegion::Boolean(values) => {
                    let buffer: Vec<jni_sys::jboolean> = values
                        .iter()
                        .map(|value| *value as jni_sys::jboolean)
                        .collect();
                    call_jni_method!(
                        env,
                        SetBooleanArrayRegion,
                        array,
                        start,
                        length,
                        buffer.as_ptr()
                    )
                }
                ArrayRegion::Byte(values) => call_jni_method!(
                    env,
                    SetByteArrayRegion,
                    array,
                    start,
                    length,
                    values.as_ptr()
                ),
                ArrayRegion::Char(values) => call_jni_method!(
                    env,
                    SetCharArrayRegion,
                    array,
                    start,
                    length,
                    values.as_ptr()
                ),
                ArrayRegion::Short(values) => call_jni_method!(
                    env,
                    SetShortArrayRegion,
                    array,
                    start,
                    length,
                    values.as_ptr()
                ),
                ArrayRegion::Int(values) => call_jni_method!(
                    env,
                    SetIntArrayRegion,
                    array,
                    start,
                    length,
                    values.as_ptr()
                ),
                ArrayRegion::Long(values) => call_jni_method!(
                    env,
                    SetLongArrayRegion,
                    array,
                    start,
                    length,
                    values.as_ptr()
                ),
                ArrayRegion::Float(values) => call_jni_method!(
                    env,
                    SetFloatArrayRegion,
                    array,
                    start,
                    length,
                    values.as_ptr()
                ),
                ArrayRegion::Double(values) => call_jni_method!(
                    env,
                    SetDoubleArrayRegion,
                    array,
                    start,
                    length,
                    values.as_ptr()
                ),
            }
        }
        self.check(env)
    }

    fn object_element(&self, array: RawHandle, index: usize) -> RuntimeResult<Option<RawHandle>> {
        let env = self.env()?;
        let index = size(index)?;
        let element =
            unsafe { call_jni_method!(env, GetObjectArrayElement, array.as_jobject(), index) };
        self.nullable(env, element)
    }

    fn set_object_element(
        &self,
        array: RawHandle,
        index: usize,
        value: Option<RawHandle>,
    ) -> RuntimeResult<()> {
        let env = self.env()?;
        let index = size(index)?;
        let value = value.map_or(ptr::null_mut(), RawHandle::as_jobject);
        unsafe {
            call_jni_method!(
                env,
                SetObjectArrayElement,
                array.as_jobject(),
                index,
                value
            )
        };
        self.check(env)
    }

    fn throw(&self, throwable: RawHandle) -> RuntimeResult<()> {
        let env = self.env()?;
        status(unsafe { call_jni_method!(env, Throw, throwable.as_jobject()) })
    }

    fn take_pending_exception(&self) -> Option<RawHandle> {
        let env = self.env().ok()?;
        match self.check(env) {
            Err(Fault::Thrown(exception)) => Some(exception),
            _ => None,
        }
    }

    fn new_throwable(
        &self,
        class: &str,
        message: Option<&str>,
        cause: Option<RawHandle>,
    ) -> RuntimeResult<RawHandle> {
        let env = self.env()?;
        let message = match message {
            Some(message) => {
                let units: Vec<u16> = message.encode_utf16().collect();
                Some(self.new_string(&units)?)
            }
            None => None,
        };
        let created = self
            .method_id(env, class, "<init>", "(Ljava/lang/String;)V", Dispatch::Instance)
            .and_then(|constructor| {
                let raw_class = self.class(env, class)?;
                let arguments = [object_argument(message)];
                let throwable = unsafe {
                    call_jni_method!(env, NewObjectA, raw_class, constructor, arguments.as_ptr())
                };
                self.non_null(env, throwable)
            });
        if let Some(message) = message {
            self.delete_local(env, message.as_jobject());
        }
        let throwable = created?;
        if let Some(cause) = cause {
            let result = self.call_object(
                env,
                throwable.as_jobject(),
                "java/lang/Throwable",
                "initCause",
                "(Ljava/lang/Throwable;)Ljava/lang/Throwable;",
                &[object_argument(Some(cause))],
            );
            match result {
                Ok(itself) => {
                    self.delete_local(env, itself.map_or(ptr::null_mut(), RawHandle::as_jobject))
                }
                Err(fault) => {
                    self.delete_local(env, throwable.as_jobject());
                    return Err(fault);
                }
            }
        }
        Ok(throwable)
    }

    fn throwable_message(&self, throwable: RawHandle) -> RuntimeResult<Option<RawHandle>> {
        let env = self.env()?;
        self.call_object(
            env,
            throwable.as_jobject(),
            "java/lang/Throwable",
            "getMessage",
            "()Ljava/lang/String;",
            &[],
        )
    }

    fn throwable_cause(&self, throwable: RawHandle) -> RuntimeResult<Option<RawHandle>> {
        let env = self.env()?;
        self.call_object(
            env,
            throwable.as_jobject(),
            "java/lang/Throwable",
            "getCause",
            "()Ljava/lang/Throwable;",
            &[],
        )
    }

    fn interface_methods(&self, interface: &str) -> RuntimeResult<Vec<MethodDescription>> {
        let env = self.env()?;
        let class = self.class(env, interface)?;
        let methods = self
            .call_object(
                env,
                class,
                "java/lang/Class",
                "getMethods",
                "()[Ljava/lang/reflect/Method;",
                &[],
            )?
            .ok_or(Fault::OutOfMemory)?;
        let result = (|| -> RuntimeResult<Vec<MethodDescription>> {
            let length = self.array_length(methods)?;
            let mut seen = HashSet::new();
            let mut signatures = vec![];
            for index in 0..length {
                let method = match self.object_element(methods, index)? {
                    Some(method) => method,
                    None => continue,
                };
                let described = self
                    .call_int(
                        env,
                        method.as_jobject(),
                        "java/lang/reflect/Method",
                        "getModifiers",
                    )
                    .and_then(|modifiers| {
                        if modifiers & STATIC_MODIFIER != 0 {
                            Ok(None)
                        } else {
                            self.describe_method(method).map(Some)
                        }
                    });
                self.delete_local(env, method.as_jobject());
                if let Some(description) = described? {
                    if seen.insert(description.clone()) {
                        signatures.push(description);
                    }
                }
            }
            Ok(signatures)
        })();
        self.delete_local(env, methods.as_jobject());
        result
    }

    fn describe_method(&self, method: RawHandle) -> RuntimeResult<MethodDescription> {
        let env = self.env()?;
        let reflect = "java/lang/reflect/Method";
        let method = method.as_jobject();
        let name = self
            .call_object(env, method, reflect, "getName", "()Ljava/lang/String;", &[])?
            .ok_or(Fault::OutOfMemory)?;
        let units = self.units(env, name.as_jobject());
        self.delete_local(env, name.as_jobject());
        let name = String::from_utf16_lossy(&units?);

        let parameter_types = self
            .call_object(
                env,
                method,
                reflect,
                "getParameterTypes",
                "()[Ljava/lang/Class;",
                &[],
            )?
            .ok_or(Fault::OutOfMemory)?;
        let parameters = (|| -> RuntimeResult<String> {
            let length = self.array_length(parameter_types)?;
            let mut parameters = String::new();
            for index in 0..length {
                let class = self
                    .object_element(parameter_types, index)?
                    .ok_or(Fault::OutOfMemory)?;
                let parameter = self.signature_of_class(env, class.as_jobject());
                self.delete_local(env, class.as_jobject());
                parameters.push_str(&parameter?);
            }
            Ok(parameters)
        })();
        self.delete_local(env, parameter_types.as_jobject());
        let parameters = parameters?;

        let return_type = self
            .call_object(env, method, reflect, "getReturnType", "()Ljava/lang/Class;", &[])?
            .ok_or(Fault::OutOfMemory)?;
        let result = self.signature_of_class(env, return_type.as_jobject());
        self.delete_local(env, return_type.as_jobject());
        Ok(MethodDescription {
            name,
            descriptor: format!("({}){}", parameters, result?),
        })
    }

    fn new_proxy(&self, vm: u64, proxy: u64, interfaces: &[String]) -> RuntimeResult<RawHandle> {
        let env = self.env()?;
        let handler_class = self.handler_class(env)?;
        let constructor = self.method_id(env, HANDLER_CLASS, "<init>", "(JJ)V", Dispatch::Instance)?;
        let arguments = [
            jni_sys::jvalue { j: vm as jni_sys::jlong },
            jni_sys::jvalue {
                j: proxy as jni_sys::jlong,
            },
        ];
        let handler = unsafe {
            call_jni_method!(env, NewObjectA, handler_class, constructor, arguments.as_ptr())
        };
        let handler = self.non_null(env, handler)?;

        let mut locals = vec![handler];
        let created = (|| -> RuntimeResult<RawHandle> {
            let classes = self.new_object_array("java/lang/Class", interfaces.len())?;
            locals.push(classes);
            for (index, interface) in interfaces.iter().enumerate() {
                let class = self.class(env, interface)?;
                self.set_object_element(classes, index, RawHandle::from_jobject(class))?;
            }
            let first = match interfaces.first() {
                Some(first) => self.class(env, first)?,
                None => return Err(Fault::Jni(JniError::InvalidArguments)),
            };
            let loader = match self.call_object(
                env,
                first,
                "java/lang/Class",
                "getClassLoader",
                "()Ljava/lang/ClassLoader;",
                &[],
            )? {
                Some(loader) => loader,
                None => self.system_class_loader(env)?,
            };
            locals.push(loader);
            self.call_static_object(
                env,
                "java/lang/reflect/Proxy",
                "newProxyInstance",
                "(Ljava/lang/ClassLoader;[Ljava/lang/Class;Ljava/lang/reflect/InvocationHandler;)Ljava/lang/Object;",
                &[
                    object_argument(Some(loader)),
                    object_argument(Some(classes)),
                    object_argument(Some(handler)),
                ],
            )?
            .ok_or(Fault::OutOfMemory)
        })();
        for local in locals {
            self.delete_local(env, local.as_jobject());
        }
        created
    }
}

impl Drop for JniRuntime {
    fn drop(&mut self) {
        if self.destroyed.load(Ordering::Acquire) || self.classes.get_mut().is_empty() {
            return;
        }
        self.release_caches(self.env().ok());
    }
}

impl fmt::Debug for JniRuntime {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("JniRuntime")
            .field("java_vm", &self.java_vm.java_vm)
            .field("version", &self.version)
            .field("cached_classes", &self.classes.lock().len())
            .finish()
    }
}

#[cfg(test)]
// JNI API.
#[allow(non_snake_case)]
// We're not using the non-test function.
#[allow(dead_code)]
#[mockall::automock]
mod ffi {
    extern "C" {
        pub fn JNI_CreateJavaVM(
            java_vm: *mut *mut jni_sys::JavaVM,
            jni_env: *mut *mut ::std::os::raw::c_void,
            arguments: *mut ::std::os::raw::c_void,
        ) -> jni_sys::jint;
    }
}

cfg_if! {
    if #[cfg(test)] {
        use self::mock_ffi::JNI_CreateJavaVM;
        const LIBJVM_LINKED: bool = true;
    } else if #[cfg(all(not(test), feature = "libjvm"))] {
        use jni_sys::JNI_CreateJavaVM;
        const LIBJVM_LINKED: bool = true;
    } else if #[cfg(all(not(test), not(feature = "libjvm")))] {
        const LIBJVM_LINKED: bool = false;

        /// This is a stub for when we can't link to libjvm.
        // JNI API.
        #[allow(non_snake_case)]
        unsafe extern "system" fn JNI_CreateJavaVM(
            _java_vm: *mut *mut jni_sys::JavaVM,
            _jni_env: *mut *mut c_void,
            _arguments: *mut c_void,
        ) -> jni_sys::jint {
            jni_sys::JNI_ERR
        }
    }
}

/// Function tables with every entry missing, to be filled in by tests.
#[cfg(test)]
pub(crate) mod raw_tables {
    use std::mem;
    use std::ptr;

    pub fn empty_raw_java_vm() -> jni_sys::JNIInvokeInterface_ {
        jni_sys::JNIInvokeInterface_ {
            reserved0: ptr::null_mut(),
            reserved1: ptr::null_mut(),
            reserved2: ptr::null_mut(),
            DestroyJavaVM: None,
            AttachCurrentThread: None,
            DetachCurrentThread: None,
            GetEnv: None,
            AttachCurrentThreadAsDaemon: None,
        }
    }

    pub fn empty_raw_jni_env() -> jni_sys::JNINativeInterface_ {
        // Safe because every field is a nullable pointer.
        unsafe { mem::zeroed() }
    }
}


#[cfg(test)]
mod jni_runtime_tests {
    use super::raw_tables::{empty_raw_java_vm, empty_raw_jni_env};
    use super::*;
    use serial_test::serial;
    use std::sync::atomic::AtomicUsize;

    static ENV: AtomicUsize = AtomicUsize::new(0);
    static PENDING: AtomicUsize = AtomicUsize::new(0);
    static CLEARS: AtomicUsize = AtomicUsize::new(0);
    static ATTACHES: AtomicUsize = AtomicUsize::new(0);

    unsafe extern "system" fn get_env(
        _java_vm: *mut jni_sys::JavaVM,
        jni_env: *mut *mut c_void,
        _version: jni_sys::jint,
    ) -> jni_sys::jint {
        match ENV.load(Ordering::SeqCst) {
            0 => {
                *jni_env = ptr::null_mut();
                jni_sys::JNI_EDETACHED
            }
            env => {
                *jni_env = env as *mut c_void;
                jni_sys::JNI_OK
            }
        }
    }

    unsafe extern "system" fn attach_thread(
        _java_vm: *mut jni_sys::JavaVM,
        _jni_env: *mut *mut c_void,
        arguments: *mut c_void,
    ) -> jni_sys::jint {
        let arguments = &*(arguments as *mut jni_sys::JavaVMAttachArgs);
        assert_eq!(arguments.version, JniVersion::V8.to_raw());
        ATTACHES.fetch_add(1, Ordering::SeqCst);
        jni_sys::JNI_OK
    }

    unsafe extern "system" fn exception_occurred(
        _jni_env: *mut jni_sys::JNIEnv,
    ) -> jni_sys::jthrowable {
        PENDING.load(Ordering::SeqCst) as jni_sys::jthrowable
    }

    unsafe extern "system" fn exception_clear(_jni_env: *mut jni_sys::JNIEnv) {
        PENDING.store(0, Ordering::SeqCst);
        CLEARS.fetch_add(1, Ordering::SeqCst);
    }

    unsafe extern "system" fn new_global_ref(
        _jni_env: *mut jni_sys::JNIEnv,
        object: jni_sys::jobject,
    ) -> jni_sys::jobject {
        match object as usize {
            0x66 => ptr::null_mut(),
            object => (object + 1) as jni_sys::jobject,
        }
    }

    fn raw_java_vm() -> jni_sys::JNIInvokeInterface_ {
        jni_sys::JNIInvokeInterface_ {
            GetEnv: Some(get_env),
            AttachCurrentThread: Some(attach_thread),
            ..empty_raw_java_vm()
        }
    }

    fn raw_jni_env() -> jni_sys::JNINativeInterface_ {
        jni_sys::JNINativeInterface_ {
            ExceptionOccurred: Some(exception_occurred),
            ExceptionClear: Some(exception_clear),
            NewGlobalRef: Some(new_global_ref),
            ..empty_raw_jni_env()
        }
    }

    fn handle(value: usize) -> RawHandle {
        RawHandle::from_raw(value).unwrap()
    }

    #[test]
    #[serial]
    fn unattached_thread() {
        let raw_java_vm = raw_java_vm();
        let raw_java_vm_ptr = &mut (&raw_java_vm as jni_sys::JavaVM) as *mut jni_sys::JavaVM;
        ENV.store(0, Ordering::SeqCst);
        let runtime = unsafe { JniRuntime::adopt(raw_java_vm_ptr, &Configuration::default()) }
            .unwrap();
        assert!(!runtime.is_current_thread_attached());
        assert_eq!(
            runtime.new_global_ref(handle(0x10)),
            Err(Fault::Jni(JniError::ThreadDetached))
        );
        assert_eq!(runtime.take_pending_exception(), None);
        assert!(!runtime.is_same_object(handle(0x10), handle(0x10)));
    }

    #[test]
    #[serial]
    fn attach() {
        let raw_java_vm = raw_java_vm();
        let raw_java_vm_ptr = &mut (&raw_java_vm as jni_sys::JavaVM) as *mut jni_sys::JavaVM;
        let raw_jni_env = raw_jni_env();
        let raw_jni_env_ptr =
            &mut (&raw_jni_env as jni_sys::JNIEnv) as *mut jni_sys::JNIEnv as usize;
        let configuration = Configuration::default();
        ENV.store(0, Ordering::SeqCst);
        ATTACHES.store(0, Ordering::SeqCst);
        let runtime = unsafe { JniRuntime::adopt(raw_java_vm_ptr, &configuration) }.unwrap();
        assert_eq!(
            runtime.attach_current_thread(&AttachArguments::named(&configuration, "worker")),
            Ok(AttachOutcome::Attached)
        );
        ENV.store(raw_jni_env_ptr, Ordering::SeqCst);
        assert_eq!(
            runtime.attach_current_thread(&AttachArguments::new(&configuration)),
            Ok(AttachOutcome::AlreadyAttached)
        );
        assert_eq!(ATTACHES.load(Ordering::SeqCst), 1);
        ENV.store(0, Ordering::SeqCst);
    }

    #[test]
    #[serial]
    fn pending_exception() {
        let raw_java_vm = raw_java_vm();
        let raw_java_vm_ptr = &mut (&raw_java_vm as jni_sys::JavaVM) as *mut jni_sys::JavaVM;
        let raw_jni_env = raw_jni_env();
        let raw_jni_env_ptr =
            &mut (&raw_jni_env as jni_sys::JNIEnv) as *mut jni_sys::JNIEnv as usize;
        ENV.store(raw_jni_env_ptr, Ordering::SeqCst);
        CLEARS.store(0, Ordering::SeqCst);
        PENDING.store(0x99, Ordering::SeqCst);
        let runtime = unsafe { JniRuntime::adopt(raw_java_vm_ptr, &Configuration::default()) }
            .unwrap();
        assert_eq!(runtime.take_pending_exception(), Some(handle(0x99)));
        assert_eq!(runtime.take_pending_exception(), None);
        assert_eq!(CLEARS.load(Ordering::SeqCst), 1);
        ENV.store(0, Ordering::SeqCst);
    }

    #[test]
    #[serial]
    fn global_refs() {
        let raw_java_vm = raw_java_vm();
        let raw_java_vm_ptr = &mut (&raw_java_vm as jni_sys::JavaVM) as *mut jni_sys::JavaVM;
        let raw_jni_env = raw_jni_env();
        let raw_jni_env_ptr =
            &mut (&raw_jni_env as jni_sys::JNIEnv) as *mut jni_sys::JNIEnv as usize;
        ENV.store(raw_jni_env_ptr, Ordering::SeqCst);
        let runtime = unsafe { JniRuntime::adopt(raw_java_vm_ptr, &Configuration::default()) }
            .unwrap();
        assert_eq!(runtime.new_global_ref(handle(0x10)), Ok(handle(0x11)));
        assert_eq!(
            runtime.new_global_ref(handle(0x66)),
            Err(Fault::OutOfMemory)
        );
        ENV.store(0, Ordering::SeqCst);
    }

    #[test]
    fn sizes() {
        assert_eq!(size(12), Ok(12));
        assert_eq!(
            size(usize::max_value()),
            Err(Fault::Jni(JniError::InvalidArguments))
        );
    }

    #[test]
    fn primitive_arguments() {
        unsafe {
            assert_eq!(argument(PrimitiveValue::Boolean(true)).z, jni_sys::JNI_TRUE);
            assert_eq!(argument(PrimitiveValue::Long(-5)).j, -5);
            assert_eq!(argument(PrimitiveValue::Char(0x41)).c, 0x41);
        }
        unsafe {
            assert!(object_argument(None).l.is_null());
        }
    }

    #[test]
    fn class_name_signatures() {
        assert_eq!(java_name_signature("void"), "V");
        assert_eq!(java_name_signature("boolean"), "Z");
        assert_eq!(java_name_signature("long"), "J");
        assert_eq!(java_name_signature("[I"), "[I");
        assert_eq!(
            java_name_signature("[Ljava.lang.String;"),
            "[Ljava/lang/String;"
        );
        assert_eq!(
            java_name_signature("java.util.function.IntBinaryOperator"),
            "Ljava/util/function/IntBinaryOperator;"
        );
    }
}
