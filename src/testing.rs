//! An in-memory stand-in for a Java VM, for tests that can't start a real one.
//!
//! [`FakeRuntime`](struct.FakeRuntime.html) implements [`Runtime`](../trait.Runtime.html) over
//! a small class table and object heap. It keeps JNI's rules where the bridge relies on them:
//! operations fail on threads that are not attached, local and global references are counted
//! separately, and exceptions stay pending until taken.

use crate::attach_arguments::AttachArguments;
use crate::config::Configuration;
use crate::error::{JniError, Result};
use crate::java_string::{to_binary_name, to_utf16};
use crate::proxy::{invoke_from_runtime, throw_illegal_state};
use crate::runtime::{AttachOutcome, Fault, MethodDescription, RawHandle, Runtime, RuntimeResult};
use crate::types::{MethodSignature, PrimitiveKind};
use crate::value::{ArrayRegion, ArrayRegionMut, PrimitiveArray, PrimitiveValue};
use crate::version::JniVersion;
use crate::vm::{Launcher, VmHandle};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread::{self, ThreadId};

/// Operation counts of a [`FakeRuntime`](struct.FakeRuntime.html).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FakeStats {
    pub attaches: usize,
    pub detaches: usize,
    pub globals_created: usize,
    pub globals_deleted: usize,
    /// Deletes of references that were already deleted, or of the wrong kind.
    pub double_deletes: usize,
    /// Operations attempted on a thread that is not attached.
    pub unattached_calls: usize,
    pub region_reads: usize,
    pub region_writes: usize,
    pub destroyed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandleKind {
    Local,
    Global,
}

#[derive(Debug)]
enum ObjectData {
    Plain,
    String(Vec<u16>),
    Boxed(PrimitiveValue),
    PrimitiveArray(PrimitiveArray),
    ObjectArray(Vec<Option<u64>>),
    Throwable {
        message: Option<Vec<u16>>,
        cause: Option<u64>,
    },
    Method(MethodSignature),
    Proxy {
        vm: u64,
        proxy: u64,
    },
}

#[derive(Debug)]
struct FakeObject {
    /// Internal name, or signature for arrays.
    class: String,
    data: ObjectData,
}

#[derive(Debug)]
struct FakeClass {
    superclass: Option<String>,
    interfaces: Vec<String>,
    methods: Vec<MethodSignature>,
    is_interface: bool,
}

#[derive(Debug, Default)]
struct FakeState {
    classes: HashMap<String, FakeClass>,
    objects: HashMap<u64, FakeObject>,
    next_object: u64,
    handles: HashMap<usize, (u64, HandleKind)>,
    next_handle: usize,
    attached: HashSet<ThreadId>,
    pending: HashMap<ThreadId, u64>,
    stats: FakeStats,
    failing_global_refs: usize,
    failing_attach: Option<JniError>,
    failing_destroy: Option<JniError>,
    identity_collisions: bool,
}

const CLASSES: &[(&str, Option<&str>, &[&str])] = &[
    ("java/lang/Object", None, &[]),
    (
        "java/lang/String",
        Some("java/lang/Object"),
        &["java/io/Serializable", "java/lang/Comparable", "java/lang/CharSequence"],
    ),
    ("java/lang/Number", Some("java/lang/Object"), &["java/io/Serializable"]),
    (
        "java/lang/Boolean",
        Some("java/lang/Object"),
        &["java/io/Serializable", "java/lang/Comparable"],
    ),
    (
        "java/lang/Character",
        Some("java/lang/Object"),
        &["java/io/Serializable", "java/lang/Comparable"],
    ),
    ("java/lang/Byte", Some("java/lang/Number"), &["java/lang/Comparable"]),
    ("java/lang/Short", Some("java/lang/Number"), &["java/lang/Comparable"]),
    ("java/lang/Integer", Some("java/lang/Number"), &["java/lang/Comparable"]),
    ("java/lang/Long", Some("java/lang/Number"), &["java/lang/Comparable"]),
    ("java/lang/Float", Some("java/lang/Number"), &["java/lang/Comparable"]),
    ("java/lang/Double", Some("java/lang/Number"), &["java/lang/Comparable"]),
    ("java/lang/Throwable", Some("java/lang/Object"), &["java/io/Serializable"]),
    ("java/lang/Exception", Some("java/lang/Throwable"), &[]),
    ("java/lang/Error", Some("java/lang/Throwable"), &[]),
    ("java/lang/RuntimeException", Some("java/lang/Exception"), &[]),
    ("java/lang/IllegalStateException", Some("java/lang/RuntimeException"), &[]),
    ("java/lang/IllegalArgumentException", Some("java/lang/RuntimeException"), &[]),
    ("java/lang/UnsupportedOperationException", Some("java/lang/RuntimeException"), &[]),
    ("java/lang/ArithmeticException", Some("java/lang/RuntimeException"), &[]),
    ("java/lang/NullPointerException", Some("java/lang/RuntimeException"), &[]),
    ("java/lang/ClassCastException", Some("java/lang/RuntimeException"), &[]),
    ("java/lang/ArrayStoreException", Some("java/lang/RuntimeException"), &[]),
    ("java/lang/IndexOutOfBoundsException", Some("java/lang/RuntimeException"), &[]),
    (
        "java/lang/ArrayIndexOutOfBoundsException",
        Some("java/lang/IndexOutOfBoundsException"),
        &[],
    ),
    ("java/io/IOException", Some("java/lang/Exception"), &[]),
    ("java/lang/LinkageError", Some("java/lang/Error"), &[]),
    ("java/lang/NoClassDefFoundError", Some("java/lang/LinkageError"), &[]),
    ("java/lang/VirtualMachineError", Some("java/lang/Error"), &[]),
    ("java/lang/OutOfMemoryError", Some("java/lang/VirtualMachineError"), &[]),
    ("java/lang/reflect/Method", Some("java/lang/Object"), &[]),
    ("java/lang/reflect/Proxy", Some("java/lang/Object"), &["java/io/Serializable"]),
];

const INTERFACES: &[(&str, &[(&str, &str)])] = &[
    ("java/io/Serializable", &[]),
    ("java/lang/Cloneable", &[]),
    ("java/lang/CharSequence", &[("length", "()I"), ("charAt", "(I)C")]),
    ("java/lang/Comparable", &[("compareTo", "(Ljava/lang/Object;)I")]),
    ("java/lang/Runnable", &[("run", "()V")]),
    ("java/util/concurrent/Callable", &[("call", "()Ljava/lang/Object;")]),
    ("java/util/function/Supplier", &[("get", "()Ljava/lang/Object;")]),
    (
        "java/util/function/Function",
        &[("apply", "(Ljava/lang/Object;)Ljava/lang/Object;")],
    ),
    ("java/util/function/IntBinaryOperator", &[("applyAsInt", "(II)I")]),
    (
        "java/util/Comparator",
        &[("compare", "(Ljava/lang/Object;Ljava/lang/Object;)I")],
    ),
];

fn parse_methods(methods: &[(&str, &str)]) -> Vec<MethodSignature> {
    methods
        .iter()
        .map(|(name, descriptor)| {
            MethodSignature::parse(name, descriptor).expect("built-in method descriptors are valid")
        })
        .collect()
}

/// `Ljava/lang/String;` -> `java/lang/String`, `[I` -> `[I`, `I` -> `None`.
fn element_class(signature: &str) -> Option<&str> {
    if signature.starts_with('[') {
        Some(signature)
    } else if signature.starts_with('L') && signature.ends_with(';') {
        Some(&signature[1..signature.len() - 1])
    } else {
        None
    }
}

fn read_slice<T: Copy>(array: &[T], region: &mut [T], start: usize) {
    region.copy_from_slice(&array[start..start + region.len()]);
}

fn write_slice<T: Copy>(array: &mut [T], region: &[T], start: usize) {
    array[start..start + region.len()].copy_from_slice(region);
}

/// Copy between a stored array and a region of the same kind. `false` when the kinds differ.
macro_rules! copy_region {
    (@kinds $array:expr, $region:expr, $region_type:ident, $copy:ident, $start:expr, $($variant:ident),*) => {
        match ($array, $region) {
            $(
                (PrimitiveArray::$variant(array), $region_type::$variant(region)) => {
                    $copy(array, region, $start);
                    true
                }
            )*
            _ => false,
        }
    };
    ($array:expr, $region:expr, $region_type:ident, $copy:ident, $start:expr) => {
        copy_region!(
            @kinds $array, $region, $region_type, $copy, $start,
            Boolean, Byte, Char, Short, Int, Long, Float, Double
        )
    };
}

impl FakeState {
    fn define(
        &mut self,
        name: &str,
        superclass: Option<&str>,
        interfaces: &[&str],
        methods: Vec<MethodSignature>,
        is_interface: bool,
    ) {
        self.classes.insert(
            name.to_owned(),
            FakeClass {
                superclass: superclass.map(str::to_owned),
                interfaces: interfaces.iter().map(|name| (*name).to_owned()).collect(),
                methods,
                is_interface,
            },
        );
    }

    fn current_thread_attached(&self) -> bool {
        self.attached.contains(&thread::current().id())
    }

    fn check_attached(&mut self) -> RuntimeResult<()> {
        if self.current_thread_attached() {
            Ok(())
        } else {
            self.stats.unattached_calls += 1;
            Err(Fault::Jni(JniError::ThreadDetached))
        }
    }

    fn allocate(&mut self, class: &str, data: ObjectData) -> u64 {
        self.next_object += 1;
        self.objects.insert(
            self.next_object,
            FakeObject {
                class: class.to_owned(),
                data,
            },
        );
        self.next_object
    }

    fn new_handle(&mut self, object: u64, kind: HandleKind) -> RawHandle {
        self.next_handle += 8;
        self.handles.insert(self.next_handle, (object, kind));
        RawHandle::from_raw(self.next_handle).expect("handles are never null")
    }

    fn new_local(&mut self, class: &str, data: ObjectData) -> RawHandle {
        let object = self.allocate(class, data);
        self.new_handle(object, HandleKind::Local)
    }

    fn object_id(&self, handle: RawHandle) -> u64 {
        match self.handles.get(&handle.as_raw()) {
            Some((object, _)) => *object,
            None => panic!("use of a deleted reference {:#x}", handle.as_raw()),
        }
    }

    fn object(&self, handle: RawHandle) -> &FakeObject {
        &self.objects[&self.object_id(handle)]
    }

    fn object_mut(&mut self, handle: RawHandle) -> &mut FakeObject {
        let object = self.object_id(handle);
        self.objects
            .get_mut(&object)
            .expect("objects are never collected")
    }

    fn is_known(&self, class: &str) -> bool {
        let element = class.trim_start_matches('[');
        if element.len() == class.len() {
            return self.classes.contains_key(class);
        }
        if element.len() == 1 {
            return PrimitiveKind::ALL
                .iter()
                .any(|kind| element.starts_with(kind.signature()));
        }
        match element_class(element) {
            Some(name) => self.classes.contains_key(name),
            None => false,
        }
    }

    fn is_assignable(&self, from: &str, to: &str) -> bool {
        if from == to || to == "java/lang/Object" {
            return true;
        }
        if from.starts_with('[') {
            if !to.starts_with('[') {
                return to == "java/lang/Cloneable" || to == "java/io/Serializable";
            }
            let (from, to) = (&from[1..], &to[1..]);
            return match (element_class(from), element_class(to)) {
                (Some(from), Some(to)) => self.is_assignable(from, to),
                _ => from == to,
            };
        }
        let mut pending = vec![from.to_owned()];
        while let Some(class) = pending.pop() {
            if class == to {
                return true;
            }
            if let Some(definition) = self.classes.get(&class) {
                pending.extend(definition.superclass.iter().cloned());
                pending.extend(definition.interfaces.iter().cloned());
            }
        }
        false
    }

    fn superclasses(&self, class: &str) -> Vec<String> {
        if class.starts_with('[') {
            return vec!["java/lang/Object".to_owned()];
        }
        let mut superclasses = vec![];
        let mut current = self
            .classes
            .get(class)
            .and_then(|definition| definition.superclass.clone());
        while let Some(class) = current {
            current = self
                .classes
                .get(&class)
                .and_then(|definition| definition.superclass.clone());
            superclasses.push(class);
        }
        superclasses
    }

    /// A thrown exception, already cleared, as `Fault::Thrown` hands it over.
    fn thrown(&mut self, class: &str, message: &str) -> Fault {
        Fault::Thrown(self.new_local(
            class,
            ObjectData::Throwable {
                message: Some(to_utf16(message)),
                cause: None,
            },
        ))
    }

    fn check_known(&mut self, class: &str) -> RuntimeResult<()> {
        if self.is_known(class) {
            Ok(())
        } else {
            Err(self.thrown("java/lang/NoClassDefFoundError", class))
        }
    }

    fn out_of_bounds(&mut self, index: usize, length: usize) -> Fault {
        self.thrown(
            "java/lang/ArrayIndexOutOfBoundsException",
            &format!("Index {} out of bounds for length {}", index, length),
        )
    }

    fn array_length(&self, handle: RawHandle) -> Option<usize> {
        match &self.object(handle).data {
            ObjectData::PrimitiveArray(array) => Some(array.len()),
            ObjectData::ObjectArray(elements) => Some(elements.len()),
            _ => None,
        }
    }

    fn take_pending(&mut self) -> Option<RawHandle> {
        let object = self.pending.remove(&thread::current().id())?;
        Some(self.new_handle(object, HandleKind::Local))
    }

    fn interface_methods(&self, interface: &str, methods: &mut Vec<MethodSignature>) {
        if let Some(definition) = self.classes.get(interface) {
            for method in &definition.methods {
                if !methods.contains(method) {
                    methods.push(method.clone());
                }
            }
            for parent in &definition.interfaces {
                self.interface_methods(parent, methods);
            }
        }
    }
}

/// An in-memory [`Runtime`](../trait.Runtime.html).
#[derive(Debug)]
pub struct FakeRuntime {
    state: Mutex<FakeState>,
}

impl Default for FakeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRuntime {
    /// A runtime knowing `java.lang.Object`, strings, boxes, the common throwables and a few
    /// functional interfaces. No thread is attached.
    pub fn new() -> Self {
        let mut state = FakeState::default();
        for (name, superclass, interfaces) in CLASSES {
            state.define(name, *superclass, interfaces, vec![], false);
        }
        for (name, methods) in INTERFACES {
            state.define(name, None, &[], parse_methods(methods), true);
        }
        FakeRuntime {
            state: Mutex::new(state),
        }
    }

    pub fn stats(&self) -> FakeStats {
        self.state.lock().stats
    }

    pub fn live_global_refs(&self) -> usize {
        self.state
            .lock()
            .handles
            .values()
            .filter(|(_, kind)| *kind == HandleKind::Global)
            .count()
    }

    /// Whether the reference has not been deleted.
    pub fn is_valid_handle(&self, handle: RawHandle) -> bool {
        self.state.lock().handles.contains_key(&handle.as_raw())
    }

    /// Make the next `count` global reference allocations fail with `OutOfMemory`.
    pub fn fail_next_global_refs(&self, count: usize) {
        self.state.lock().failing_global_refs = count;
    }

    pub fn fail_next_attach(&self, error: JniError) {
        self.state.lock().failing_attach = Some(error);
    }

    /// Make `destroy` fail with `error`, leaving the runtime running.
    pub fn fail_destroy(&self, error: JniError) {
        self.state.lock().failing_destroy = Some(error);
    }

    /// Give every object the same identity hash.
    pub fn force_identity_collisions(&self, enable: bool) {
        self.state.lock().identity_collisions = enable;
    }

    /// Attach the current thread as if it were a Java thread or attached by other code.
    pub fn adopt_current_thread(&self) {
        self.state.lock().attached.insert(thread::current().id());
    }

    /// Forget the current thread's attachment, as when a Java thread ends.
    pub fn release_current_thread(&self) {
        let mut state = self.state.lock();
        let thread = thread::current().id();
        state.attached.remove(&thread);
        state.pending.remove(&thread);
    }

    /// Add a class. Names are internal.
    pub fn define_class(&self, name: &str, superclass: &str, interfaces: &[&str]) {
        self.state
            .lock()
            .define(name, Some(superclass), interfaces, vec![], false);
    }

    /// Add an interface with `(name, descriptor)` methods.
    pub fn define_interface(&self, name: &str, extends: &[&str], methods: &[(&str, &str)]) {
        self.state
            .lock()
            .define(name, None, extends, parse_methods(methods), true);
    }

    /// A local reference to a new instance of a known class, on any thread.
    pub fn new_object(&self, class: &str) -> RawHandle {
        let mut state = self.state.lock();
        assert!(state.is_known(class), "unknown class {}", class);
        state.new_local(class, ObjectData::Plain)
    }

    pub fn new_java_string(&self, string: &str) -> RawHandle {
        self.new_string_units(&to_utf16(string))
    }

    /// A string that may hold unpaired surrogates.
    pub fn new_string_units(&self, units: &[u16]) -> RawHandle {
        self.state
            .lock()
            .new_local("java/lang/String", ObjectData::String(units.to_vec()))
    }

    /// Contents of a string object.
    pub fn string(&self, handle: RawHandle) -> String {
        match &self.state.lock().object(handle).data {
            ObjectData::String(units) => String::from_utf16_lossy(units),
            other => panic!("not a string: {:?}", other),
        }
    }

    /// Binary name of the object's class.
    pub fn class_of(&self, handle: RawHandle) -> String {
        to_binary_name(&self.state.lock().object(handle).class)
    }

    pub fn message_of(&self, handle: RawHandle) -> Option<String> {
        match &self.state.lock().object(handle).data {
            ObjectData::Throwable { message, .. } => {
                message.as_ref().map(|units| String::from_utf16_lossy(units))
            }
            _ => None,
        }
    }

    /// The value of a boxed primitive.
    pub fn boxed_value(&self, handle: RawHandle) -> Option<PrimitiveValue> {
        match &self.state.lock().object(handle).data {
            ObjectData::Boxed(value) => Some(*value),
            _ => None,
        }
    }

    /// Replace a throwable's cause, e.g. to build a cycle.
    pub fn set_cause(&self, throwable: RawHandle, cause: RawHandle) {
        let mut state = self.state.lock();
        let cause = state.object_id(cause);
        match &mut state.object_mut(throwable).data {
            ObjectData::Throwable { cause: current, .. } => *current = Some(cause),
            other => panic!("not a throwable: {:?}", other),
        }
    }

    /// Replace a throwable's message with raw UTF-16 code units.
    pub fn set_message_units(&self, throwable: RawHandle, units: &[u16]) {
        match &mut self.state.lock().object_mut(throwable).data {
            ObjectData::Throwable { message, .. } => *message = Some(units.to_vec()),
            other => panic!("not a throwable: {:?}", other),
        }
    }

    /// Class name of the current thread's pending exception, without clearing it.
    pub fn pending_exception(&self) -> Option<String> {
        let state = self.state.lock();
        let object = state.pending.get(&thread::current().id())?;
        Some(to_binary_name(&state.objects[object].class))
    }

    /// Call a method on a proxy object the way `java.lang.reflect.Proxy` does.
    ///
    /// Returns the result as a local reference, or the throwable the call threw, cleared.
    pub fn invoke_proxy(
        &self,
        proxy_object: RawHandle,
        method: &MethodSignature,
        arguments: &[Option<RawHandle>],
    ) -> std::result::Result<Option<RawHandle>, RawHandle> {
        let (vm, proxy, method_object, array) = {
            let state = &mut *self.state.lock();
            let (vm, proxy) = match state.object(proxy_object).data {
                ObjectData::Proxy { vm, proxy } => (vm, proxy),
                ref other => panic!("not a proxy: {:?}", other),
            };
            let method_object =
                state.new_local("java/lang/reflect/Method", ObjectData::Method(method.clone()));
            let array = if arguments.is_empty() {
                None
            } else {
                let elements = arguments
                    .iter()
                    .map(|argument| argument.map(|handle| state.object_id(handle)))
                    .collect();
                Some(state.new_local("[Ljava/lang/Object;", ObjectData::ObjectArray(elements)))
            };
            (vm, proxy, method_object, array)
        };
        let result = match VmHandle::lookup(vm) {
            Some(vm) => invoke_from_runtime(&vm, proxy, proxy_object, method_object, array),
            None => {
                throw_illegal_state(self, "the Java VM has been shut down");
                None
            }
        };
        let mut state = self.state.lock();
        state.handles.remove(&method_object.as_raw());
        if let Some(array) = array {
            state.handles.remove(&array.as_raw());
        }
        match state.take_pending() {
            Some(throwable) => Err(throwable),
            None => Ok(result),
        }
    }
}

fn describe(signature: &MethodSignature) -> MethodDescription {
    MethodDescription {
        name: signature.name().to_owned(),
        descriptor: signature.descriptor(),
    }
}

impl Runtime for FakeRuntime {
    fn version(&self) -> JniVersion {
        JniVersion::V8
    }

    fn attach_current_thread(&self, _arguments: &AttachArguments) -> RuntimeResult<AttachOutcome> {
        let mut state = self.state.lock();
        if let Some(error) = state.failing_attach.take() {
            return Err(Fault::Jni(error));
        }
        if !state.attached.insert(thread::current().id()) {
            return Ok(AttachOutcome::AlreadyAttached);
        }
        state.stats.attaches += 1;
        Ok(AttachOutcome::Attached)
    }

    fn detach_current_thread(&self) -> RuntimeResult<()> {
        let mut state = self.state.lock();
        let thread = thread::current().id();
        if state.attached.remove(&thread) {
            state.stats.detaches += 1;
            state.pending.remove(&thread);
        }
        Ok(())
    }

    fn is_current_thread_attached(&self) -> bool {
        self.state.lock().current_thread_attached()
    }

    fn destroy(&self) -> RuntimeResult<()> {
        let mut state = self.state.lock();
        if let Some(error) = state.failing_destroy.take() {
            return Err(Fault::Jni(error));
        }
        state.stats.destroyed = true;
        Ok(())
    }

    fn new_global_ref(&self, object: RawHandle) -> RuntimeResult<RawHandle> {
        let mut state = self.state.lock();
        state.check_attached()?;
        if state.failing_global_refs > 0 {
            state.failing_global_refs -= 1;
            return Err(Fault::OutOfMemory);
        }
        let object = state.object_id(object);
        state.stats.globals_created += 1;
        Ok(state.new_handle(object, HandleKind::Global))
    }

    fn delete_global_ref(&self, object: RawHandle) {
        let mut state = self.state.lock();
        if state.check_attached().is_err() {
            return;
        }
        match state.handles.get(&object.as_raw()) {
            Some((_, HandleKind::Global)) => {
                state.handles.remove(&object.as_raw());
                state.stats.globals_deleted += 1;
            }
            _ => state.stats.double_deletes += 1,
        }
    }

    fn new_local_ref(&self, object: RawHandle) -> RuntimeResult<RawHandle> {
        let mut state = self.state.lock();
        state.check_attached()?;
        let object = state.object_id(object);
        Ok(state.new_handle(object, HandleKind::Local))
    }

    fn delete_local_ref(&self, object: RawHandle) {
        let mut state = self.state.lock();
        if state.check_attached().is_err() {
            return;
        }
        match state.handles.get(&object.as_raw()) {
            Some((_, HandleKind::Local)) => {
                state.handles.remove(&object.as_raw());
            }
            _ => state.stats.double_deletes += 1,
        }
    }

    fn is_same_object(&self, first: RawHandle, second: RawHandle) -> bool {
        let mut state = self.state.lock();
        if state.check_attached().is_err() {
            return false;
        }
        state.object_id(first) == state.object_id(second)
    }

    fn identity_hash(&self, object: RawHandle) -> RuntimeResult<i32> {
        let mut state = self.state.lock();
        state.check_attached()?;
        let object = state.object_id(object);
        if state.identity_collisions {
            Ok(7)
        } else {
            Ok(object as i32)
        }
    }

    fn class_name(&self, object: RawHandle) -> RuntimeResult<String> {
        let mut state = self.state.lock();
        state.check_attached()?;
        Ok(to_binary_name(&state.object(object).class))
    }

    fn class_ancestry(&self, object: RawHandle) -> RuntimeResult<Vec<String>> {
        let mut state = self.state.lock();
        state.check_attached()?;
        let class = state.object(object).class.clone();
        Ok(state
            .superclasses(&class)
            .iter()
            .map(|name| to_binary_name(name))
            .collect())
    }

    fn is_instance_of(&self, object: RawHandle, class: &str) -> RuntimeResult<bool> {
        let mut state = self.state.lock();
        state.check_attached()?;
        state.check_known(class)?;
        let from = state.object(object).class.clone();
        Ok(state.is_assignable(&from, class))
    }

    fn box_primitive(&self, value: PrimitiveValue) -> RuntimeResult<RawHandle> {
        let mut state = self.state.lock();
        state.check_attached()?;
        Ok(state.new_local(value.kind().box_class(), ObjectData::Boxed(value)))
    }

    fn unbox_primitive(
        &self,
        object: RawHandle,
        kind: PrimitiveKind,
    ) -> RuntimeResult<PrimitiveValue> {
        let mut state = self.state.lock();
        state.check_attached()?;
        match state.object(object).data {
            ObjectData::Boxed(value) if value.kind() == kind => Ok(value),
            _ => Err(Fault::Jni(JniError::InvalidArguments)),
        }
    }

    fn new_string(&self, units: &[u16]) -> RuntimeResult<RawHandle> {
        let mut state = self.state.lock();
        state.check_attached()?;
        Ok(state.new_local("java/lang/String", ObjectData::String(units.to_vec())))
    }

    fn string_units(&self, string: RawHandle) -> RuntimeResult<Vec<u16>> {
        let mut state = self.state.lock();
        state.check_attached()?;
        match &state.object(string).data {
            ObjectData::String(units) => Ok(units.clone()),
            _ => Err(Fault::Jni(JniError::InvalidArguments)),
        }
    }

    fn new_primitive_array(&self, kind: PrimitiveKind, length: usize) -> RuntimeResult<RawHandle> {
        let mut state = self.state.lock();
        state.check_attached()?;
        Ok(state.new_local(
            &format!("[{}", kind.signature()),
            ObjectData::PrimitiveArray(PrimitiveArray::zeroed(kind, length)),
        ))
    }

    fn new_object_array(&self, element_class: &str, length: usize) -> RuntimeResult<RawHandle> {
        let mut state = self.state.lock();
        state.check_attached()?;
        state.check_known(element_class)?;
        let class = if element_class.starts_with('[') {
            format!("[{}", element_class)
        } else {
            format!("[L{};", element_class)
        };
        Ok(state.new_local(&class, ObjectData::ObjectArray(vec![None; length])))
    }

    fn array_length(&self, array: RawHandle) -> RuntimeResult<usize> {
        let mut state = self.state.lock();
        state.check_attached()?;
        state
            .array_length(array)
            .ok_or(Fault::Jni(JniError::InvalidArguments))
    }

    fn read_region(
        &self,
        array: RawHandle,
        start: usize,
        region: ArrayRegionMut<'_>,
    ) -> RuntimeResult<()> {
        let mut state = self.state.lock();
        state.check_attached()?;
        state.stats.region_reads += 1;
        let length = state
            .array_length(array)
            .ok_or(Fault::Jni(JniError::InvalidArguments))?;
        if start + region.len() > length {
            return Err(state.out_of_bounds(start + region.len(), length));
        }
        let copied = match &state.object(array).data {
            ObjectData::PrimitiveArray(source) => {
                copy_region!(source, region, ArrayRegionMut, read_slice, start)
            }
            _ => false,
        };
        if copied {
            Ok(())
        } else {
            Err(Fault::Jni(JniError::InvalidArguments))
        }
    }

    fn write_region(
        &self,
        array: RawHandle,
        start: usize,
        region: ArrayRegion<'_>,
    ) -> RuntimeResult<()> {
        let mut state = self.state.lock();
        state.check_attached()?;
        state.stats.region_writes += 1;
        let length = state
            .array_length(array)
            .ok_or(Fault::Jni(JniError::InvalidArguments))?;
        if start + region.len() > length {
            return Err(state.out_of_bounds(start + region.len(), length));
        }
        let copied = match &mut state.object_mut(array).data {
            ObjectData::PrimitiveArray(target) => {
                copy_region!(target, region, ArrayRegion, write_slice, start)
            }
            _ => false,
        };
        if copied {
            Ok(())
        } else {
            Err(Fault::Jni(JniError::InvalidArguments))
        }
    }

    fn object_element(&self, array: RawHandle, index: usize) -> RuntimeResult<Option<RawHandle>> {
        let mut state = self.state.lock();
        state.check_attached()?;
        let element = match &state.object(array).data {
            ObjectData::ObjectArray(elements) => elements.get(index).cloned().ok_or(elements.len()),
            _ => return Err(Fault::Jni(JniError::InvalidArguments)),
        };
        match element {
            Ok(Some(object)) => Ok(Some(state.new_handle(object, HandleKind::Local))),
            Ok(None) => Ok(None),
            Err(length) => Err(state.out_of_bounds(index, length)),
        }
    }

    fn set_object_element(
        &self,
        array: RawHandle,
        index: usize,
        value: Option<RawHandle>,
    ) -> RuntimeResult<()> {
        let mut state = self.state.lock();
        state.check_attached()?;
        let class = state.object(array).class.clone();
        let element = match class.strip_prefix('[').and_then(element_class) {
            Some(element) => element.to_owned(),
            None => return Err(Fault::Jni(JniError::InvalidArguments)),
        };
        let value = match value {
            Some(handle) => {
                let stored = state.object(handle).class.clone();
                if !state.is_assignable(&stored, &element) {
                    return Err(state.thrown("java/lang/ArrayStoreException", &to_binary_name(&stored)));
                }
                Some(state.object_id(handle))
            }
            None => None,
        };
        let length = state.array_length(array).unwrap_or(0);
        let stored = match &mut state.object_mut(array).data {
            ObjectData::ObjectArray(elements) if index < length => {
                elements[index] = value;
                true
            }
            _ => false,
        };
        if stored {
            Ok(())
        } else {
            Err(state.out_of_bounds(index, length))
        }
    }

    fn throw(&self, throwable: RawHandle) -> RuntimeResult<()> {
        let mut state = self.state.lock();
        state.check_attached()?;
        let object = state.object_id(throwable);
        state.pending.insert(thread::current().id(), object);
        Ok(())
    }

    fn take_pending_exception(&self) -> Option<RawHandle> {
        let mut state = self.state.lock();
        state.check_attached().ok()?;
        state.take_pending()
    }

    fn new_throwable(
        &self,
        class: &str,
        message: Option<&str>,
        cause: Option<RawHandle>,
    ) -> RuntimeResult<RawHandle> {
        let mut state = self.state.lock();
        state.check_attached()?;
        state.check_known(class)?;
        if !state.is_assignable(class, "java/lang/Throwable") {
            return Err(state.thrown("java/lang/ClassCastException", &to_binary_name(class)));
        }
        let cause = cause.map(|cause| state.object_id(cause));
        Ok(state.new_local(
            class,
            ObjectData::Throwable {
                message: message.map(to_utf16),
                cause,
            },
        ))
    }

    fn throwable_message(&self, throwable: RawHandle) -> RuntimeResult<Option<RawHandle>> {
        let mut state = self.state.lock();
        state.check_attached()?;
        let message = match &state.object(throwable).data {
            ObjectData::Throwable { message, .. } => message.clone(),
            _ => return Err(Fault::Jni(JniError::InvalidArguments)),
        };
        Ok(message.map(|units| state.new_local("java/lang/String", ObjectData::String(units))))
    }

    fn throwable_cause(&self, throwable: RawHandle) -> RuntimeResult<Option<RawHandle>> {
        let mut state = self.state.lock();
        state.check_attached()?;
        let cause = match &state.object(throwable).data {
            ObjectData::Throwable { cause, .. } => *cause,
            _ => return Err(Fault::Jni(JniError::InvalidArguments)),
        };
        Ok(cause.map(|cause| state.new_handle(cause, HandleKind::Local)))
    }

    fn interface_methods(&self, interface: &str) -> RuntimeResult<Vec<MethodDescription>> {
        let mut state = self.state.lock();
        state.check_attached()?;
        state.check_known(interface)?;
        if !state.classes[interface].is_interface {
            return Err(state.thrown(
                "java/lang/IllegalArgumentException",
                &format!("{} is not an interface", to_binary_name(interface)),
            ));
        }
        let mut methods = vec![];
        state.interface_methods(interface, &mut methods);
        Ok(methods.iter().map(describe).collect())
    }

    fn describe_method(&self, method: RawHandle) -> RuntimeResult<MethodDescription> {
        let mut state = self.state.lock();
        state.check_attached()?;
        match &state.object(method).data {
            ObjectData::Method(signature) => Ok(describe(signature)),
            _ => Err(Fault::Jni(JniError::InvalidArguments)),
        }
    }

    fn new_proxy(&self, vm: u64, proxy: u64, interfaces: &[String]) -> RuntimeResult<RawHandle> {
        let mut state = self.state.lock();
        state.check_attached()?;
        for interface in interfaces {
            state.check_known(interface)?;
            if !state.classes[interface.as_str()].is_interface {
                return Err(state.thrown(
                    "java/lang/IllegalArgumentException",
                    &format!("{} is not an interface", to_binary_name(interface)),
                ));
            }
        }
        let class = format!("jdk/proxy1/$Proxy{}", state.next_object + 1);
        let interfaces: Vec<&str> = interfaces.iter().map(String::as_str).collect();
        state.define(&class, Some("java/lang/reflect/Proxy"), &interfaces, vec![], false);
        Ok(state.new_local(&class, ObjectData::Proxy { vm, proxy }))
    }
}

/// A [`Launcher`](../trait.Launcher.html) handing out a [`FakeRuntime`](struct.FakeRuntime.html).
#[derive(Debug, Clone)]
pub struct FakeLauncher {
    runtime: Arc<FakeRuntime>,
}

impl FakeLauncher {
    pub fn new(runtime: Arc<FakeRuntime>) -> Self {
        FakeLauncher { runtime }
    }
}

impl Launcher for FakeLauncher {
    fn launch(&self, _configuration: &Configuration) -> Result<Arc<dyn Runtime>> {
        Ok(self.runtime.clone())
    }
}

#[cfg(test)]
mod fake_runtime_tests {
    use super::*;

    fn attached() -> FakeRuntime {
        let runtime = FakeRuntime::new();
        runtime.adopt_current_thread();
        runtime
    }

    #[test]
    fn unattached_calls_fail() {
        let runtime = FakeRuntime::new();
        assert_eq!(
            runtime.new_string(&[]),
            Err(Fault::Jni(JniError::ThreadDetached))
        );
        assert_eq!(runtime.stats().unattached_calls, 1);
    }

    #[test]
    fn instance_of() {
        let runtime = attached();
        let string = runtime.new_java_string("text");
        assert_eq!(runtime.is_instance_of(string, "java/lang/CharSequence"), Ok(true));
        assert_eq!(runtime.is_instance_of(string, "java/lang/Number"), Ok(false));
        let array = runtime.new_object_array("java/lang/String", 1).unwrap();
        assert_eq!(runtime.class_of(array), "[Ljava.lang.String;");
        assert_eq!(runtime.is_instance_of(array, "[Ljava/lang/Object;"), Ok(true));
        assert_eq!(runtime.is_instance_of(array, "[I"), Ok(false));
        match runtime.is_instance_of(string, "com/example/Missing") {
            Err(Fault::Thrown(throwable)) => {
                assert_eq!(runtime.class_of(throwable), "java.lang.NoClassDefFoundError")
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn array_store_checks_elements() {
        let runtime = attached();
        let array = runtime.new_object_array("java/lang/String", 1).unwrap();
        let object = runtime.new_object("java/lang/Object");
        match runtime.set_object_element(array, 0, Some(object)) {
            Err(Fault::Thrown(throwable)) => {
                assert_eq!(runtime.class_of(throwable), "java.lang.ArrayStoreException")
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert!(runtime.set_object_element(array, 1, None).is_err());
    }

    #[test]
    fn regions() {
        let runtime = attached();
        let array = runtime.new_primitive_array(PrimitiveKind::Int, 3).unwrap();
        runtime
            .write_region(array, 1, ArrayRegion::Int(&[5, 6]))
            .unwrap();
        let mut values = [0; 3];
        runtime
            .read_region(array, 0, ArrayRegionMut::Int(&mut values))
            .unwrap();
        assert_eq!(values, [0, 5, 6]);
        assert!(runtime
            .read_region(array, 0, ArrayRegionMut::Long(&mut [0; 1]))
            .is_err());
        assert!(runtime
            .write_region(array, 2, ArrayRegion::Int(&[1, 2]))
            .is_err());
    }

    #[test]
    fn reference_kinds() {
        let runtime = attached();
        let local = runtime.new_object("java/lang/Object");
        let global = runtime.new_global_ref(local).unwrap();
        runtime.delete_local_ref(global);
        assert_eq!(runtime.stats().double_deletes, 1);
        runtime.delete_global_ref(global);
        runtime.delete_global_ref(global);
        let stats = runtime.stats();
        assert_eq!((stats.globals_deleted, stats.double_deletes), (1, 2));
        assert_eq!(runtime.live_global_refs(), 0);
        assert!(runtime.is_valid_handle(local));
    }

    #[test]
    fn pending_exceptions_are_per_thread() {
        let runtime = Arc::new(attached());
        let throwable = runtime
            .new_throwable("java/lang/IllegalStateException", Some("state"), None)
            .unwrap();
        runtime.throw(throwable).unwrap();
        let other = runtime.clone();
        let seen = thread::spawn(move || {
            other.adopt_current_thread();
            other.pending_exception()
        })
        .join()
        .unwrap();
        assert_eq!(seen, None);
        assert_eq!(
            runtime.pending_exception(),
            Some("java.lang.IllegalStateException".to_owned())
        );
        let taken = runtime.take_pending_exception().unwrap();
        assert_eq!(runtime.message_of(taken), Some("state".to_owned()));
        assert_eq!(runtime.pending_exception(), None);
    }

    #[test]
    fn inherited_interface_methods() {
        let runtime = attached();
        runtime.define_interface(
            "com/example/Task",
            &["java/lang/Runnable"],
            &[("name", "()Ljava/lang/String;")],
        );
        let methods = runtime.interface_methods("com/example/Task").unwrap();
        let names: Vec<&str> = methods.iter().map(|method| method.name.as_str()).collect();
        assert_eq!(names, vec!["name", "run"]);
        assert_eq!(methods[0].descriptor, "()Ljava/lang/String;");
        assert!(runtime.interface_methods("java/lang/String").is_err());
    }
}
