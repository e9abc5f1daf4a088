use crate::exception::JavaException;
use std::fmt;
use thiserror::Error;

/// Errors returned by JNI functions.
///
/// [JNI documentation](https://docs.oracle.com/javase/10/docs/specs/jni/functions.html#return-codes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum JniError {
    /// Unknown error.
    /// Needed for forward compability.
    #[error("unknown JNI error {0}")]
    Unknown(i32),
    /// Returned when the currect thread is not attached to a Java VM.
    #[error("the current thread is not attached to the Java VM")]
    ThreadDetached,
    /// Returned when requesting a VM with an unsupported version.
    #[error("unsupported JNI version")]
    UnsupportedVersion,
    /// Returned when there isn't enough memory for the operation.
    #[error("not enough memory")]
    NotEnoughMemory,
    /// Returned when trying to create a new Java VM when
    /// one already exists in the current process.
    /// See [JNI documentation](https://docs.oracle.com/javase/10/docs/specs/jni/invocation.html#jni_createjavavm)
    /// for more details.
    #[error("a Java VM already exists in this process")]
    VmExists,
    /// Returned when passing invalid arguments to JNI calls.
    #[error("invalid arguments")]
    InvalidArguments,
}

impl JniError {
    /// Convert from a raw `jint` error.
    pub(crate) fn from_raw(error: jni_sys::jint) -> Option<JniError> {
        match error {
            jni_sys::JNI_OK => None,
            jni_sys::JNI_EDETACHED => Some(JniError::ThreadDetached),
            jni_sys::JNI_EVERSION => Some(JniError::UnsupportedVersion),
            jni_sys::JNI_ENOMEM => Some(JniError::NotEnoughMemory),
            jni_sys::JNI_EEXIST => Some(JniError::VmExists),
            jni_sys::JNI_EINVAL => Some(JniError::InvalidArguments),
            error => Some(JniError::Unknown(error)),
        }
    }
}


/// Which runtime raised an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The Rust side of the bridge.
    Host,
    /// The embedded Java VM.
    Embedded,
}

impl fmt::Display for Side {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Host => formatter.write_str("host"),
            Side::Embedded => formatter.write_str("embedded"),
        }
    }
}

/// An error raised by Rust code that has to cross into Java.
///
/// When a [`ProxyTarget`](trait.ProxyTarget.html) returns a `HostError`, the Java caller
/// observes a throwable of [`class_name`](#method.class_name) (by default
/// `java.lang.RuntimeException`) carrying the same message and cause.
#[derive(Debug, Clone)]
pub struct HostError {
    class_name: Option<String>,
    message: String,
    cause: Option<Box<BridgeError>>,
}

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        HostError {
            class_name: None,
            message: message.into(),
            cause: None,
        }
    }

    /// Request a specific Java throwable class, e.g. `java.lang.IllegalArgumentException`.
    pub fn with_class(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = Some(class_name.into());
        self
    }

    pub fn with_cause(mut self, cause: BridgeError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn class_name(&self) -> Option<&str> {
        self.class_name.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&BridgeError> {
        self.cause.as_deref()
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.class_name {
            Some(class_name) => write!(formatter, "{}: {}", class_name, self.message),
            None => formatter.write_str(&self.message),
        }
    }
}

/// Every failure the bridge can report.
///
/// Errors are always surfaced to the immediate caller. Use [`side`](#method.side) to find out
/// which runtime raised one.
#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    /// The Java VM could not be initialised. The embedding stays unusable afterwards.
    #[error("failed to start the Java VM: {0}")]
    Startup(String),
    /// A Java VM is already running (or has been torn down) in this process.
    #[error("a Java VM has already been started in this process")]
    AlreadyStarted,
    /// The Java VM refused to shut down.
    #[error("failed to shut down the Java VM: {0}")]
    Shutdown(String),
    /// The Java VM this handle refers to is no longer running.
    #[error("the Java VM has been shut down")]
    VmShutDown,
    /// The value can't be represented as the requested type.
    #[error("can't convert {value} to {target}")]
    UnsupportedConversion { value: String, target: String },
    /// Malformed text crossed the boundary.
    #[error("malformed string: {0}")]
    Encoding(String),
    /// The Java VM ran out of memory.
    #[error("resources exhausted: {0}")]
    ResourceExhausted(String),
    /// A reverse call did not match the interface method it targets.
    #[error("signature mismatch: {0}")]
    SignatureMismatch(String),
    /// A Java throwable.
    #[error("{0}")]
    Java(JavaException),
    /// An error raised by Rust code.
    #[error("{0}")]
    Host(HostError),
    /// The current thread has no attached context for this Java VM.
    #[error("the current thread is not attached to the Java VM")]
    ThreadNotAttached,
    /// Attaching or detaching the current thread failed.
    #[error("thread attachment failed: {0}")]
    Attach(JniError),
    /// A JNI call returned an error code.
    #[error("JNI call failed: {0}")]
    Jni(JniError),
    /// The reference was released or invalidated.
    #[error("the Java reference has been released")]
    StaleReference,
    /// The proxy registration is released and accepts no calls.
    #[error("the proxy has been released")]
    ProxyReleased,
}

impl BridgeError {
    pub(crate) fn unsupported(value: impl fmt::Display, target: impl fmt::Display) -> Self {
        BridgeError::UnsupportedConversion {
            value: value.to_string(),
            target: target.to_string(),
        }
    }

    /// The runtime that raised the error.
    pub fn side(&self) -> Side {
        match self {
            BridgeError::Startup(_)
            | BridgeError::Shutdown(_)
            | BridgeError::ResourceExhausted(_)
            | BridgeError::Java(_)
            | BridgeError::Attach(_)
            | BridgeError::Jni(_) => Side::Embedded,
            BridgeError::AlreadyStarted
            | BridgeError::VmShutDown
            | BridgeError::UnsupportedConversion { .. }
            | BridgeError::Encoding(_)
            | BridgeError::SignatureMismatch(_)
            | BridgeError::Host(_)
            | BridgeError::ThreadNotAttached
            | BridgeError::StaleReference
            | BridgeError::ProxyReleased => Side::Host,
        }
    }

    /// The translated Java exception, if this error is one.
    pub fn as_java(&self) -> Option<&JavaException> {
        match self {
            BridgeError::Java(exception) => Some(exception),
            _ => None,
        }
    }
}

impl From<JavaException> for BridgeError {
    fn from(exception: JavaException) -> Self {
        BridgeError::Java(exception)
    }
}

impl From<HostError> for BridgeError {
    fn from(error: HostError) -> Self {
        BridgeError::Host(error)
    }
}

/// Result of a bridge operation.
pub type Result<T> = std::result::Result<T, BridgeError>;
