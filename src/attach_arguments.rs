use crate::config::Configuration;
use crate::java_string::*;
use crate::version::JniVersion;
use jni_sys;
use std::marker::PhantomData;
use std::os::raw::c_char;
use std::ptr;

/// Arguments for attaching a thread to the JVM.
///
/// [JNI documentation](https://docs.oracle.com/javase/10/docs/specs/jni/invocation.html#attachcurrentthread)
///
/// # Example
/// ```
/// use rust_jni_bridge::{AttachArguments, Configuration, JniVersion};
///
/// let configuration = Configuration::new().with_version(JniVersion::V8);
/// let attach_arguments = AttachArguments::named(&configuration, "worker-1").daemon();
///
/// assert_eq!(attach_arguments.version(), JniVersion::V8);
/// assert_eq!(attach_arguments.thread_name(), Some("worker-1"));
/// assert!(attach_arguments.is_daemon());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachArguments {
    version: JniVersion,
    thread_name: Option<String>,
    daemon: bool,
}

impl AttachArguments {
    /// Create attach arguments with the default thread name.
    ///
    /// [JNI documentation](https://docs.oracle.com/javase/10/docs/specs/jni/invocation.html#attachcurrentthread)
    pub fn new(configuration: &Configuration) -> Self {
        AttachArguments {
            version: configuration.version(),
            thread_name: None,
            daemon: false,
        }
    }

    /// Create attach arguments with a specified thread name.
    ///
    /// [JNI documentation](https://docs.oracle.com/javase/10/docs/specs/jni/invocation.html#attachcurrentthread)
    pub fn named(configuration: &Configuration, thread_name: &str) -> Self {
        AttachArguments {
            thread_name: Some(thread_name.to_owned()),
            ..AttachArguments::new(configuration)
        }
    }

    /// Attach as a daemon thread, which does not keep the Java VM alive.
    ///
    /// [JNI documentation](https://docs.oracle.com/javase/10/docs/specs/jni/invocation.html#attachcurrentthreadasdaemon)
    pub fn daemon(mut self) -> Self {
        self.daemon = true;
        self
    }

    /// Return the JNI version these arguments will request when attaching a thread to a Java VM.
    pub fn version(&self) -> JniVersion {
        self.version
    }

    pub fn thread_name(&self) -> Option<&str> {
        self.thread_name.as_deref()
    }

    pub fn is_daemon(&self) -> bool {
        self.daemon
    }

    /// Convert to `jni_sys::JavaVMAttachArgs`. Uses a buffer for storing
    /// the Java string with the thread name.
    pub(crate) fn to_raw<'a>(&self, buffer: &'a mut Vec<u8>) -> RawAttachArguments<'a> {
        let raw_arguments = jni_sys::JavaVMAttachArgs {
            version: self.version.to_raw(),
            name: match self.thread_name {
                None => ptr::null_mut(),
                Some(ref thread_name) => {
                    *buffer = to_java_string(thread_name);
                    buffer.as_ptr() as *mut c_char
                }
            },
            group: ptr::null_mut(),
        };
        RawAttachArguments {
            raw_arguments,
            _buffer: PhantomData,
        }
    }
}

/// A wrapper around `jni_sys::JavaVMAttachArgs` with a lifetime to ensure
/// there's no access to freed memory.
pub(crate) struct RawAttachArguments<'a> {
    pub raw_arguments: jni_sys::JavaVMAttachArgs,
    _buffer: PhantomData<&'a Vec<u8>>,
}

#[cfg(test)]
mod attach_arguments_tests {
    use super::*;

    #[test]
    fn new() {
        let configuration = Configuration::new().with_version(JniVersion::V4);
        assert_eq!(
            AttachArguments::new(&configuration),
            AttachArguments {
                thread_name: None,
                version: JniVersion::V4,
                daemon: false,
            }
        );
    }

    #[test]
    fn named_daemon() {
        let configuration = Configuration::new().with_version(JniVersion::V4);
        assert_eq!(
            AttachArguments::named(&configuration, "test-name").daemon(),
            AttachArguments {
                thread_name: Some("test-name".to_owned()),
                version: JniVersion::V4,
                daemon: true,
            }
        );
    }
}

#[cfg(test)]
mod to_raw_tests {
    use super::*;
    use std::ffi::CStr;

    #[test]
    fn to_raw() {
        let arguments = AttachArguments::new(&Configuration::new());
        let mut buffer: Vec<u8> = vec![];
        let raw_arguments = arguments.to_raw(&mut buffer);
        assert_eq!(raw_arguments.raw_arguments.group, ptr::null_mut());
        assert_eq!(raw_arguments.raw_arguments.name, ptr::null_mut());
        assert_eq!(raw_arguments.raw_arguments.version, JniVersion::V8.to_raw());
    }

    #[test]
    fn to_raw_named() {
        let test_name = "test-name \u{1d11e}";
        let arguments = AttachArguments::named(&Configuration::new(), test_name);
        let mut buffer: Vec<u8> = vec![];
        let raw_arguments = arguments.to_raw(&mut buffer);
        assert_eq!(raw_arguments.raw_arguments.group, ptr::null_mut());
        let name = unsafe { CStr::from_ptr(raw_arguments.raw_arguments.name) };
        assert_eq!(from_java_string(name.to_bytes()).unwrap(), test_name);
    }
}
