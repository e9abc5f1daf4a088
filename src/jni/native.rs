use crate::error::JniError;
use crate::java_string::to_java_string;
use crate::proxy::invoke_from_runtime;
use crate::runtime::RawHandle;
use crate::vm::VmHandle;
use jni_sys;
use std::os::raw::c_char;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use tracing::error;

/// JNI descriptor of `NativeInvocationHandler.invoke0`.
pub(super) const INVOKE_SIGNATURE: &str =
    "(JJLjava/lang/Object;Ljava/lang/reflect/Method;[Ljava/lang/Object;)Ljava/lang/Object;";

/// Throw a new exception of `class_name` straight through the function table, for when no
/// runtime is around to do it.
///
/// Unsafe because an incorrect pointer can be passed as an argument.
unsafe fn throw_new(raw_env: *mut jni_sys::JNIEnv, class_name: &str, message: &str) {
    let message = to_java_string(message);
    let class_name = to_java_string(class_name);
    let find_class = (**raw_env).FindClass.unwrap();
    let class = find_class(raw_env, class_name.as_ptr() as *const c_char);
    if class.is_null() {
        // `FindClass` left its own exception pending.
        return;
    }
    let throw_new_fn = (**raw_env).ThrowNew.unwrap();
    let status = throw_new_fn(raw_env, class, message.as_ptr() as *const c_char);
    if let Some(status) = JniError::from_raw(status) {
        error!(%status, "could not throw an exception into Java");
    }
    let delete_local_ref = (**raw_env).DeleteLocalRef.unwrap();
    delete_local_ref(raw_env, class);
}

/// `NativeInvocationHandler.invoke0`: routes a call on a Java proxy to the Rust target
/// registered under `proxy` in the Java VM `vm`.
///
/// Never unwinds into Java: panics become a `java.lang.RuntimeException`.
pub(super) unsafe extern "system" fn invoke0(
    raw_env: *mut jni_sys::JNIEnv,
    _class: jni_sys::jclass,
    vm: jni_sys::jlong,
    proxy: jni_sys::jlong,
    proxy_object: jni_sys::jobject,
    method: jni_sys::jobject,
    arguments: jni_sys::jobjectArray,
) -> jni_sys::jobject {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let (proxy_object, method) = match (
            RawHandle::from_jobject(proxy_object),
            RawHandle::from_jobject(method),
        ) {
            (Some(proxy_object), Some(method)) => (proxy_object, method),
            _ => {
                throw_new(
                    raw_env,
                    "java/lang/NullPointerException",
                    "proxy invoked without a receiver or method",
                );
                return ptr::null_mut();
            }
        };
        match VmHandle::lookup(vm as u64) {
            Some(vm) => invoke_from_runtime(
                &vm,
                proxy as u64,
                proxy_object,
                method,
                RawHandle::from_jobject(arguments),
            )
            .map_or(ptr::null_mut(), RawHandle::as_jobject),
            None => {
                throw_new(
                    raw_env,
                    "java/lang/IllegalStateException",
                    "the Java VM has been shut down",
                );
                ptr::null_mut()
            }
        }
    }));
    match result {
        Ok(result) => result,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|message| (*message).to_owned())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_owned());
            error!(%message, "panic in a proxy call");
            throw_new(
                raw_env,
                "java/lang/RuntimeException",
                &format!("Rust panic in a proxy call: {}", message),
            );
            ptr::null_mut()
        }
    }
}

#[cfg(test)]
mod invoke_tests {
    use super::super::raw_tables::empty_raw_jni_env;
    use super::*;
    use parking_lot::Mutex;
    use serial_test::serial;
    use std::ffi::CStr;

    lazy_static::lazy_static! {
        static ref THROWN: Mutex<Vec<(usize, String)>> = Mutex::new(vec![]);
        static ref CLASSES: Mutex<Vec<String>> = Mutex::new(vec![]);
    }

    unsafe extern "system" fn find_class(
        _jni_env: *mut jni_sys::JNIEnv,
        name: *const c_char,
    ) -> jni_sys::jclass {
        let name = CStr::from_ptr(name).to_string_lossy().into_owned();
        CLASSES.lock().push(name);
        0x10 as jni_sys::jclass
    }

    unsafe extern "system" fn throw_new_impl(
        _jni_env: *mut jni_sys::JNIEnv,
        class: jni_sys::jclass,
        message: *const c_char,
    ) -> jni_sys::jint {
        let message = CStr::from_ptr(message).to_string_lossy().into_owned();
        THROWN.lock().push((class as usize, message));
        jni_sys::JNI_OK
    }

    unsafe extern "system" fn delete_local_ref(
        _jni_env: *mut jni_sys::JNIEnv,
        _object: jni_sys::jobject,
    ) {
    }

    fn raw_jni_env() -> jni_sys::JNINativeInterface_ {
        jni_sys::JNINativeInterface_ {
            FindClass: Some(find_class),
            ThrowNew: Some(throw_new_impl),
            DeleteLocalRef: Some(delete_local_ref),
            ..empty_raw_jni_env()
        }
    }

    #[test]
    #[serial]
    fn unknown_vm() {
        THROWN.lock().clear();
        CLASSES.lock().clear();
        let raw_jni_env = raw_jni_env();
        let raw_jni_env_ptr = &mut (&raw_jni_env as jni_sys::JNIEnv) as *mut jni_sys::JNIEnv;
        let result = unsafe {
            invoke0(
                raw_jni_env_ptr,
                ptr::null_mut(),
                987_654,
                1,
                0x20 as jni_sys::jobject,
                0x30 as jni_sys::jobject,
                ptr::null_mut(),
            )
        };
        assert!(result.is_null());
        assert_eq!(
            *CLASSES.lock(),
            vec!["java/lang/IllegalStateException".to_owned()]
        );
        assert_eq!(
            *THROWN.lock(),
            vec![(0x10, "the Java VM has been shut down".to_owned())]
        );
    }

    #[test]
    #[serial]
    fn null_receiver() {
        THROWN.lock().clear();
        CLASSES.lock().clear();
        let raw_jni_env = raw_jni_env();
        let raw_jni_env_ptr = &mut (&raw_jni_env as jni_sys::JNIEnv) as *mut jni_sys::JNIEnv;
        let result = unsafe {
            invoke0(
                raw_jni_env_ptr,
                ptr::null_mut(),
                1,
                1,
                ptr::null_mut(),
                0x30 as jni_sys::jobject,
                ptr::null_mut(),
            )
        };
        assert!(result.is_null());
        assert_eq!(
            *CLASSES.lock(),
            vec!["java/lang/NullPointerException".to_owned()]
        );
    }

    #[test]
    fn signature_parses() {
        let signature =
            crate::types::MethodSignature::parse("invoke0", INVOKE_SIGNATURE).unwrap();
        assert_eq!(signature.parameters().len(), 5);
        assert_eq!(signature.descriptor(), INVOKE_SIGNATURE);
    }
}
