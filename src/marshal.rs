use crate::error::{BridgeError, Result};
use crate::exception::ExceptionTranslator;
use crate::java_string::{from_utf16, to_utf16};
use crate::registry::{JavaObject, NativeRef, ReferenceRegistry};
use crate::runtime::{Fault, RawHandle, Runtime};
use crate::thread::ThreadContext;
use crate::types::{PrimitiveKind, TypeCache, TypeDescriptor};
use crate::value::{PrimitiveArray, Value};
use std::sync::Arc;
use tracing::debug;

/// Classes a Java string can be passed as.
const STRING_SUPERTYPES: [&str; 5] = [
    "java/lang/String",
    "java/lang/Object",
    "java/lang/CharSequence",
    "java/lang/Comparable",
    "java/io/Serializable",
];

/// How primitive arrays are copied across the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayStrategy {
    /// One region call per element. Always available.
    ElementWise,
    /// One region call for the whole array.
    Bulk,
}

/// A reference produced while marshalling.
#[derive(Debug, Clone, Copy)]
enum Handle {
    /// Created by the conversion; the converter deletes it.
    Local(RawHandle),
    /// Borrowed from the registry.
    Global(RawHandle),
}

impl Handle {
    fn raw(self) -> RawHandle {
        match self {
            Handle::Local(handle) | Handle::Global(handle) => handle,
        }
    }

    fn release(self, runtime: &dyn Runtime) {
        if let Handle::Local(handle) = self {
            runtime.delete_local_ref(handle);
        }
    }
}

/// Converts values between their host form ([`Value`](enum.Value.html)) and Java objects.
///
/// Primitives cross as their boxes (`java.lang.Integer` and friends). Every conversion checks
/// the value against the expected [`TypeDescriptor`](enum.TypeDescriptor.html) and fails with
/// [`UnsupportedConversion`](enum.BridgeError.html#variant.UnsupportedConversion) when it doesn't
/// fit.
pub struct Marshaller<'vm> {
    runtime: &'vm dyn Runtime,
    registry: &'vm Arc<ReferenceRegistry>,
    types: &'vm TypeCache,
    vm: u64,
    strategy: ArrayStrategy,
}

impl<'vm> Marshaller<'vm> {
    pub(crate) fn new(
        runtime: &'vm dyn Runtime,
        registry: &'vm Arc<ReferenceRegistry>,
        types: &'vm TypeCache,
        vm: u64,
        strategy: ArrayStrategy,
    ) -> Self {
        Marshaller {
            runtime,
            registry,
            types,
            vm,
            strategy,
        }
    }

    /// Force an array strategy.
    pub fn with_strategy(self, strategy: ArrayStrategy) -> Self {
        Marshaller { strategy, ..self }
    }

    pub fn strategy(&self) -> ArrayStrategy {
        self.strategy
    }

    /// Convert a host value into a Java object of type `target`. Java `null` is `None`.
    ///
    /// Primitives are boxed, after a widening conversion when `target` is wider. A
    /// [`JavaObject`](struct.JavaObject.html) yields a new lease on the same object.
    pub fn to_native(
        &self,
        context: &ThreadContext,
        value: &Value,
        target: &TypeDescriptor,
    ) -> Result<Option<NativeRef>> {
        context.verify(self.vm)?;
        if let Value::Object(object) = value {
            self.check_object(context, object, target)?;
            return self.registry.duplicate(object.native_ref()).map(Some);
        }
        match self.to_handle(context, value, target)? {
            Some(handle) => self.registry.register(context, handle.raw()).map(Some),
            None => Ok(None),
        }
    }

    /// Convert a Java object into a host value shaped like `expected`.
    ///
    /// With `java.lang.Object` as the expected type, boxed primitives are unboxed, strings and
    /// arrays are converted, and anything else becomes a [`JavaObject`](struct.JavaObject.html).
    pub fn to_host(
        &self,
        context: &ThreadContext,
        reference: NativeRef,
        expected: &TypeDescriptor,
    ) -> Result<Value> {
        context.verify(self.vm)?;
        let global = self.registry.resolve(reference)?;
        self.handle_to_host(context, global, expected)
    }

    /// Like [`to_host`](#method.to_host), for a handle the caller keeps ownership of.
    pub(crate) fn raw_to_host(
        &self,
        context: &ThreadContext,
        handle: RawHandle,
        expected: &TypeDescriptor,
    ) -> Result<Value> {
        context.verify(self.vm)?;
        self.handle_to_host(context, handle, expected)
    }

    /// Like [`to_native`](#method.to_native), returning a new local reference.
    pub(crate) fn to_local(
        &self,
        context: &ThreadContext,
        value: &Value,
        target: &TypeDescriptor,
    ) -> Result<Option<RawHandle>> {
        context.verify(self.vm)?;
        match self.to_handle(context, value, target)? {
            Some(Handle::Local(handle)) => Ok(Some(handle)),
            Some(Handle::Global(handle)) => self
                .runtime
                .new_local_ref(handle)
                .map(Some)
                .map_err(|fault| self.fault(context, fault)),
            None => Ok(None),
        }
    }

    fn to_handle(
        &self,
        context: &ThreadContext,
        value: &Value,
        target: &TypeDescriptor,
    ) -> Result<Option<Handle>> {
        let runtime = self.runtime;
        let unsupported = || BridgeError::unsupported(value.type_name(), target);
        let handle = match value {
            Value::Null if target.is_reference() => return Ok(None),
            Value::Null => return Err(unsupported()),
            Value::Primitive(primitive) => {
                let boxed = match target {
                    TypeDescriptor::Primitive(kind) => primitive.widen(*kind),
                    TypeDescriptor::Class(_) if target.is_object() => Some(*primitive),
                    TypeDescriptor::Class(name) if name == "java/lang/Number" => {
                        match primitive.kind() {
                            PrimitiveKind::Boolean | PrimitiveKind::Char => None,
                            _ => Some(*primitive),
                        }
                    }
                    TypeDescriptor::Class(name) => {
                        PrimitiveKind::from_box_class(name).and_then(|kind| primitive.widen(kind))
                    }
                    _ => None,
                }
                .ok_or_else(unsupported)?;
                runtime.box_primitive(boxed)
            }
            Value::String(string) => {
                if !STRING_SUPERTYPES.iter().any(|name| target.is_class(name)) {
                    return Err(unsupported());
                }
                runtime.new_string(&to_utf16(string))
            }
            Value::Array(array) => {
                let matches = target.primitive_element() == Some(array.kind()) || target.is_object();
                if !matches {
                    return Err(unsupported());
                }
                return self.new_primitive_array(context, array).map(Some);
            }
            Value::ObjectArray(values) => {
                let object = TypeDescriptor::object();
                let element = match target.element() {
                    Some(element) if element.is_reference() => element,
                    None if target.is_object() => &object,
                    _ => return Err(unsupported()),
                };
                return self
                    .new_object_array(context, values, element)
                    .map(Some);
            }
            Value::Object(object) => {
                let global = self.check_object(context, object, target)?;
                return Ok(Some(Handle::Global(global)));
            }
        };
        handle
            .map(|handle| Some(Handle::Local(handle)))
            .map_err(|fault| self.fault(context, fault))
    }

    /// The object's global reference, if it is an instance of `target`.
    fn check_object(
        &self,
        context: &ThreadContext,
        object: &JavaObject,
        target: &TypeDescriptor,
    ) -> Result<RawHandle> {
        let global = self.registry.resolve(object.native_ref())?;
        let class = match target {
            TypeDescriptor::Primitive(kind) => kind.box_class().to_owned(),
            TypeDescriptor::Void => {
                return Err(BridgeError::unsupported("object", target));
            }
            _ if target.is_object() => return Ok(global),
            other => other.lookup_name(),
        };
        let instance = self
            .runtime
            .is_instance_of(global, &class)
            .map_err(|fault| self.fault(context, fault))?;
        if instance {
            Ok(global)
        } else {
            let class_name = self
                .runtime
                .class_name(global)
                .map_err(|fault| self.fault(context, fault))?;
            Err(BridgeError::unsupported(class_name, target))
        }
    }

    fn new_primitive_array(&self, context: &ThreadContext, array: &PrimitiveArray) -> Result<Handle> {
        let runtime = self.runtime;
        let length = array.len();
        let handle = runtime
            .new_primitive_array(array.kind(), length)
            .map_err(|fault| self.fault(context, fault))?;
        let region = array.as_region();
        let written = match self.strategy {
            ArrayStrategy::Bulk if length == 0 => Ok(()),
            ArrayStrategy::Bulk => runtime.write_region(handle, 0, region),
            ArrayStrategy::ElementWise => (0..length)
                .try_for_each(|index| runtime.write_region(handle, index, region.subregion(index, 1))),
        };
        if let Err(fault) = written {
            runtime.delete_local_ref(handle);
            return Err(self.fault(context, fault));
        }
        Ok(Handle::Local(handle))
    }

    fn new_object_array(
        &self,
        context: &ThreadContext,
        values: &[Value],
        element: &TypeDescriptor,
    ) -> Result<Handle> {
        let runtime = self.runtime;
        let array = runtime
            .new_object_array(&element.lookup_name(), values.len())
            .map_err(|fault| self.fault(context, fault))?;
        for (index, value) in values.iter().enumerate() {
            let stored = self.to_handle(context, value, element).and_then(|handle| {
                let result = runtime
                    .set_object_element(array, index, handle.map(Handle::raw))
                    .map_err(|fault| self.fault(context, fault));
                if let Some(handle) = handle {
                    handle.release(runtime);
                }
                result
            });
            if let Err(error) = stored {
                runtime.delete_local_ref(array);
                return Err(error);
            }
        }
        Ok(Handle::Local(array))
    }

    fn handle_to_host(
        &self,
        context: &ThreadContext,
        handle: RawHandle,
        expected: &TypeDescriptor,
    ) -> Result<Value> {
        let runtime = self.runtime;
        let class_name = runtime
            .class_name(handle)
            .map_err(|fault| self.fault(context, fault))?;
        let unsupported = || BridgeError::unsupported(&class_name, expected);
        match expected {
            TypeDescriptor::Void => Err(unsupported()),
            TypeDescriptor::Primitive(kind) => {
                let source = PrimitiveKind::from_box_class(&class_name).ok_or_else(unsupported)?;
                let value = runtime
                    .unbox_primitive(handle, source)
                    .map_err(|fault| self.fault(context, fault))?;
                value.widen(*kind).map(Value::Primitive).ok_or_else(unsupported)
            }
            TypeDescriptor::Array(_) => {
                if !self.is_instance_of(context, handle, &expected.lookup_name())? {
                    return Err(unsupported());
                }
                self.array_to_host(context, handle, expected)
            }
            TypeDescriptor::Class(_) if expected.is_object() => {
                if class_name == "java.lang.String" {
                    return self.string_to_host(context, handle);
                }
                if let Some(kind) = PrimitiveKind::from_box_class(&class_name) {
                    return runtime
                        .unbox_primitive(handle, kind)
                        .map(Value::Primitive)
                        .map_err(|fault| self.fault(context, fault));
                }
                if class_name.starts_with('[') {
                    let descriptor = self.types.java_name(&class_name)?;
                    return self.array_to_host(context, handle, &descriptor);
                }
                self.wrap(context, handle)
            }
            TypeDescriptor::Class(name) => {
                if !self.is_instance_of(context, handle, name)? {
                    return Err(unsupported());
                }
                if class_name == "java.lang.String"
                    && STRING_SUPERTYPES.iter().any(|supertype| expected.is_class(supertype))
                {
                    return self.string_to_host(context, handle);
                }
                if let Some(kind) = PrimitiveKind::from_box_class(name) {
                    return runtime
                        .unbox_primitive(handle, kind)
                        .map(Value::Primitive)
                        .map_err(|fault| self.fault(context, fault));
                }
                self.wrap(context, handle)
            }
        }
    }

    fn string_to_host(&self, context: &ThreadContext, handle: RawHandle) -> Result<Value> {
        let units = self
            .runtime
            .string_units(handle)
            .map_err(|fault| self.fault(context, fault))?;
        from_utf16(&units).map(Value::String)
    }

    fn array_to_host(
        &self,
        context: &ThreadContext,
        handle: RawHandle,
        descriptor: &TypeDescriptor,
    ) -> Result<Value> {
        let runtime = self.runtime;
        let length = runtime
            .array_length(handle)
            .map_err(|fault| self.fault(context, fault))?;
        if let Some(kind) = descriptor.primitive_element() {
            let mut array = PrimitiveArray::zeroed(kind, length);
            let read = match self.strategy {
                ArrayStrategy::Bulk if length == 0 => Ok(()),
                ArrayStrategy::Bulk => runtime.read_region(handle, 0, array.as_region_mut()),
                ArrayStrategy::ElementWise => (0..length).try_for_each(|index| {
                    runtime.read_region(handle, index, array.as_region_mut().subregion(index, 1))
                }),
            };
            read.map_err(|fault| self.fault(context, fault))?;
            debug!(%kind, length, strategy = ?self.strategy, "read a primitive array");
            return Ok(Value::Array(array));
        }
        let object = TypeDescriptor::object();
        let element = descriptor.element().unwrap_or(&object);
        let mut values = Vec::with_capacity(length);
        for index in 0..length {
            let value = match runtime
                .object_element(handle, index)
                .map_err(|fault| self.fault(context, fault))?
            {
                Some(local) => {
                    let value = self.handle_to_host(context, local, element);
                    runtime.delete_local_ref(local);
                    value?
                }
                None => Value::Null,
            };
            values.push(value);
        }
        Ok(Value::ObjectArray(values))
    }

    fn wrap(&self, context: &ThreadContext, handle: RawHandle) -> Result<Value> {
        let local = self
            .runtime
            .new_local_ref(handle)
            .map_err(|fault| self.fault(context, fault))?;
        let reference = self.registry.register(context, local)?;
        Ok(Value::Object(JavaObject::new(reference, self.registry.clone())))
    }

    fn is_instance_of(&self, context: &ThreadContext, handle: RawHandle, class: &str) -> Result<bool> {
        self.runtime
            .is_instance_of(handle, class)
            .map_err(|fault| self.fault(context, fault))
    }

    fn fault(&self, context: &ThreadContext, fault: Fault) -> BridgeError {
        ExceptionTranslator::new(self.runtime, self.registry).fault(context, fault)
    }
}
