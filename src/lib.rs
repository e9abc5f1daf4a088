//! Embed a Java VM in a Rust program and move values, references, exceptions and interface
//! implementations across the boundary.
//!
//! ```no_run
//! use rust_jni_bridge::{Configuration, TypeDescriptor, Value};
//!
//! let vm = rust_jni_bridge::start(&Configuration::new().with_classpath("app.jar")).unwrap();
//! let context = vm.attach().unwrap();
//! let greeting = vm
//!     .to_native(&context, &Value::from("hello"), &TypeDescriptor::string())
//!     .unwrap()
//!     .unwrap();
//! let back = vm.to_host(&context, greeting, &TypeDescriptor::string()).unwrap();
//! assert_eq!(back.as_str(), Some("hello"));
//! vm.registry().release(greeting);
//! vm.detach(context).unwrap();
//! rust_jni_bridge::shutdown(vm, false).unwrap();
//! ```

mod attach_arguments;
mod config;
mod error;
mod exception;
mod java_string;
mod jni;
mod marshal;
mod proxy;
mod registry;
mod runtime;
#[doc(hidden)]
pub mod testing;
mod thread;
mod types;
mod value;
mod version;
mod vm;

pub use crate::attach_arguments::AttachArguments;
pub use crate::config::{Configuration, JvmOption, JvmVerboseOption};
pub use crate::error::{BridgeError, HostError, JniError, Result, Side};
pub use crate::exception::{ExceptionKind, ExceptionTranslator, JavaException};
pub use crate::jni::JniRuntime;
pub use crate::marshal::{ArrayStrategy, Marshaller};
pub use crate::proxy::{
    invoke_from_runtime, MethodTable, ProxyHandle, ProxyRegistration, ProxyState, ProxyTarget,
    ReleaseOutcome,
};
pub use crate::registry::{JavaObject, NativeRef, ReferenceRegistry};
pub use crate::runtime::{
    AttachOutcome, Fault, MethodDescription, RawHandle, Runtime, RuntimeResult,
};
pub use crate::thread::{AttachOrigin, ThreadContext, ThreadContexts};
pub use crate::types::{MethodSignature, PrimitiveKind, TypeCache, TypeDescriptor};
pub use crate::value::{ArrayRegion, ArrayRegionMut, PrimitiveArray, PrimitiveValue, Value};
pub use crate::version::JniVersion;
pub use crate::vm::{shutdown, start, Embedding, JniLauncher, Launcher, VmHandle, VmStats};
