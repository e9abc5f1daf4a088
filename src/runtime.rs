use crate::attach_arguments::AttachArguments;
use crate::error::JniError;
use crate::types::PrimitiveKind;
use crate::value::{ArrayRegion, ArrayRegionMut, PrimitiveValue};
use crate::version::JniVersion;
use jni_sys;
use std::fmt;
use std::num::NonZeroUsize;

/// A non-null reference into the embedded VM: a JNI local or global reference.
///
/// Runtime methods return local references; the caller deletes them (or promotes them via the
/// [`ReferenceRegistry`](struct.ReferenceRegistry.html)) when done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandle(NonZeroUsize);

impl RawHandle {
    pub fn from_raw(value: usize) -> Option<Self> {
        NonZeroUsize::new(value).map(RawHandle)
    }

    pub fn as_raw(self) -> usize {
        self.0.get()
    }

    pub(crate) fn from_jobject(object: jni_sys::jobject) -> Option<Self> {
        Self::from_raw(object as usize)
    }

    pub(crate) fn as_jobject(self) -> jni_sys::jobject {
        self.0.get() as jni_sys::jobject
    }
}

/// How a runtime operation failed.
#[derive(Debug, PartialEq, Eq)]
pub enum Fault {
    /// The operation threw. The pending exception has been cleared and handed over as a
    /// local reference.
    Thrown(RawHandle),
    /// The VM could not allocate memory for the operation.
    OutOfMemory,
    /// A JNI function returned an error code.
    Jni(JniError),
}

pub type RuntimeResult<T> = std::result::Result<T, Fault>;

/// A method as the runtime reports it, e.g. `applyAsInt` and `(II)I`.
///
/// The bridge parses descriptors through its [`TypeCache`](struct.TypeCache.html).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescription {
    pub name: String,
    /// JNI method descriptor.
    pub descriptor: String,
}

/// Result of attaching the current thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    /// The thread was attached by this call.
    Attached,
    /// The thread was already attached, e.g. it is a Java thread or attached by other code.
    AlreadyAttached,
}

/// The primitive operations the bridge needs from an embedded Java VM.
///
/// Every operation except the attachment ones acts on behalf of the current thread and fails
/// with [`Fault::Jni(JniError::ThreadDetached)`](enum.Fault.html) when it is not attached.
/// Class arguments are internal names (`java/lang/String`) or array signatures (`[I`); class
/// names in results are binary names as `Class.getName()` returns them.
pub trait Runtime: Send + Sync + fmt::Debug {
    fn version(&self) -> JniVersion;

    /// [JNI documentation](https://docs.oracle.com/javase/10/docs/specs/jni/invocation.html#attachcurrentthread)
    fn attach_current_thread(&self, arguments: &AttachArguments) -> RuntimeResult<AttachOutcome>;

    /// [JNI documentation](https://docs.oracle.com/javase/10/docs/specs/jni/invocation.html#detachcurrentthread)
    fn detach_current_thread(&self) -> RuntimeResult<()>;

    fn is_current_thread_attached(&self) -> bool;

    /// [JNI documentation](https://docs.oracle.com/javase/10/docs/specs/jni/invocation.html#destroyjavavm)
    fn destroy(&self) -> RuntimeResult<()>;

    /// Fails with [`Fault::OutOfMemory`](enum.Fault.html) when the VM can't allocate the
    /// reference.
    fn new_global_ref(&self, object: RawHandle) -> RuntimeResult<RawHandle>;
    fn delete_global_ref(&self, object: RawHandle);
    fn new_local_ref(&self, object: RawHandle) -> RuntimeResult<RawHandle>;
    fn delete_local_ref(&self, object: RawHandle);
    fn is_same_object(&self, first: RawHandle, second: RawHandle) -> bool;
    /// `System.identityHashCode`.
    fn identity_hash(&self, object: RawHandle) -> RuntimeResult<i32>;

    /// Binary name of the object's class.
    fn class_name(&self, object: RawHandle) -> RuntimeResult<String>;
    /// Binary names of the superclasses of the object's class, nearest first.
    fn class_ancestry(&self, object: RawHandle) -> RuntimeResult<Vec<String>>;
    fn is_instance_of(&self, object: RawHandle, class: &str) -> RuntimeResult<bool>;

    /// `Integer.valueOf` and friends.
    fn box_primitive(&self, value: PrimitiveValue) -> RuntimeResult<RawHandle>;
    /// `Integer.intValue` and friends. `object` must be an instance of `kind`'s box class.
    fn unbox_primitive(&self, object: RawHandle, kind: PrimitiveKind)
        -> RuntimeResult<PrimitiveValue>;

    fn new_string(&self, units: &[u16]) -> RuntimeResult<RawHandle>;
    fn string_units(&self, string: RawHandle) -> RuntimeResult<Vec<u16>>;

    fn new_primitive_array(&self, kind: PrimitiveKind, length: usize) -> RuntimeResult<RawHandle>;
    fn new_object_array(&self, element_class: &str, length: usize) -> RuntimeResult<RawHandle>;
    fn array_length(&self, array: RawHandle) -> RuntimeResult<usize>;
    /// Copy `region.len()` elements starting at `start` out of a primitive array, in one call.
    fn read_region(
        &self,
        array: RawHandle,
        start: usize,
        region: ArrayRegionMut<'_>,
    ) -> RuntimeResult<()>;
    /// Copy `region` into a primitive array starting at `start`, in one call.
    fn write_region(&self, array: RawHandle, start: usize, region: ArrayRegion<'_>)
        -> RuntimeResult<()>;
    fn object_element(&self, array: RawHandle, index: usize) -> RuntimeResult<Option<RawHandle>>;
    fn set_object_element(
        &self,
        array: RawHandle,
        index: usize,
        value: Option<RawHandle>,
    ) -> RuntimeResult<()>;

    /// Make `throwable` the pending exception of the current thread.
    fn throw(&self, throwable: RawHandle) -> RuntimeResult<()>;
    /// Clear the pending exception, returning it.
    fn take_pending_exception(&self) -> Option<RawHandle>;
    fn new_throwable(
        &self,
        class: &str,
        message: Option<&str>,
        cause: Option<RawHandle>,
    ) -> RuntimeResult<RawHandle>;
    /// `Throwable.getMessage`, as a `java.lang.String`.
    fn throwable_message(&self, throwable: RawHandle) -> RuntimeResult<Option<RawHandle>>;
    /// `Throwable.getCause`.
    fn throwable_cause(&self, throwable: RawHandle) -> RuntimeResult<Option<RawHandle>>;

    /// Public instance methods of an interface, including inherited ones.
    fn interface_methods(&self, interface: &str) -> RuntimeResult<Vec<MethodDescription>>;
    /// Name and descriptor of a `java.lang.reflect.Method`.
    fn describe_method(&self, method: RawHandle) -> RuntimeResult<MethodDescription>;
    /// A `java.lang.reflect.Proxy` implementing `interfaces` whose calls reach
    /// [`invoke_from_runtime`](fn.invoke_from_runtime.html) with `vm` and `proxy`.
    fn new_proxy(&self, vm: u64, proxy: u64, interfaces: &[String]) -> RuntimeResult<RawHandle>;
}
