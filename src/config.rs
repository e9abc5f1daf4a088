use crate::error::{BridgeError, Result};
use crate::version::JniVersion;
use jni_sys;
use std::env;
use std::ffi::CString;
use std::marker::PhantomData;
use std::os::raw::c_char;
use std::path::{Path, PathBuf};
use std::ptr;

/// Verbose options for starting a Java VM.
///
/// [JNI documentation](https://docs.oracle.com/javase/10/docs/specs/jni/invocation.html#jni_createjavavm)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JvmVerboseOption {
    /// Verbose class option.
    ///
    /// Passed to the JVM as `-verbose:class`.
    Class,
    /// Verbose GC option.
    ///
    /// Passed to the JVM as `-verbose:gc`.
    Gc,
    /// Verbose JNI option.
    ///
    /// Passed to the JVM as `-verbose:jni`.
    Jni,
}

impl JvmVerboseOption {
    fn as_str(&self) -> &'static str {
        match self {
            JvmVerboseOption::Class => "class",
            JvmVerboseOption::Gc => "gc",
            JvmVerboseOption::Jni => "jni",
        }
    }
}

/// Options for starting a Java VM.
///
/// [JNI documentation](https://docs.oracle.com/javase/10/docs/specs/jni/invocation.html#jni_createjavavm)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JvmOption {
    /// Verbose option.
    ///
    /// Passed to the JVM as `-verbose:${verbose_option}`.
    Verbose(JvmVerboseOption),
    /// System property option string. Must have a key and a value.
    ///
    /// Is formatted as `-D{key}=${value}`.
    SystemProperty(String, String),
    /// Enable checking JNI calls.
    ///
    /// Passed to the JVM as `-Xcheck:jni`.
    CheckedJni,
    /// Unknown option.
    /// Needed for forward compability and to set custom options.
    /// The string value is passed to the JVM without change.
    Unknown(String),
}

impl JvmOption {
    /// Parse an option string the way the JVM would receive it.
    pub fn parse(option: &str) -> Self {
        let system_property_prefix = "-D";
        match option {
            "-verbose:gc" => JvmOption::Verbose(JvmVerboseOption::Gc),
            "-verbose:jni" => JvmOption::Verbose(JvmVerboseOption::Jni),
            "-verbose:class" => JvmOption::Verbose(JvmVerboseOption::Class),
            "-Xcheck:jni" => JvmOption::CheckedJni,
            option if option.starts_with(system_property_prefix) => {
                let parts: Vec<&str> = option[system_property_prefix.len()..]
                    .splitn(2, '=')
                    .collect();
                if parts.len() != 2 || parts[0].is_empty() {
                    JvmOption::Unknown(option.to_owned())
                } else {
                    JvmOption::SystemProperty(parts[0].to_owned(), parts[1].to_owned())
                }
            }
            option => JvmOption::Unknown(option.to_owned()),
        }
    }

    /// The option string passed to the JVM.
    pub fn to_option_string(&self) -> String {
        match self {
            JvmOption::CheckedJni => "-Xcheck:jni".to_owned(),
            JvmOption::Verbose(option) => format!("-verbose:{}", option.as_str()),
            JvmOption::SystemProperty(key, value) => format!("-D{}={}", key, value),
            JvmOption::Unknown(value) => value.clone(),
        }
    }

    /// Unsafe because one can pass an option without a valid null-terminated string.
    #[cfg(test)]
    unsafe fn from_raw(option: &jni_sys::JavaVMOption) -> Result<Self> {
        let option_string = std::ffi::CStr::from_ptr(option.optionString);
        crate::java_string::from_java_string(option_string.to_bytes())
            .map(|option| JvmOption::parse(&option))
    }
}


/// Everything needed to start (or adopt) the embedded Java VM.
///
/// Configuration is always explicit: nothing is read from the environment.
///
/// # Example
/// ```
/// use rust_jni_bridge::{Configuration, JniVersion, JvmOption, JvmVerboseOption};
///
/// let configuration = Configuration::new()
///     .with_classpath("target/java/classes")
///     .with_max_heap(256 * 1024 * 1024)
///     .with_option(JvmOption::Verbose(JvmVerboseOption::Gc));
///
/// assert_eq!(configuration.version(), JniVersion::V8);
/// assert_eq!(
///     configuration.option_strings().unwrap(),
///     vec![
///         "-Djava.class.path=target/java/classes".to_owned(),
///         "-Xmx256m".to_owned(),
///         "-verbose:gc".to_owned(),
///     ]
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    classpath: Vec<PathBuf>,
    library_path: Vec<PathBuf>,
    options: Vec<JvmOption>,
    enable_bulk_numeric: bool,
    initial_heap: Option<usize>,
    max_heap: Option<usize>,
    version: JniVersion,
    ignore_unrecognized: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            classpath: vec![],
            library_path: vec![],
            options: vec![],
            enable_bulk_numeric: true,
            initial_heap: None,
            max_heap: None,
            version: JniVersion::default(),
            ignore_unrecognized: false,
        }
    }
}

impl Configuration {
    pub fn new() -> Self {
        Default::default()
    }

    /// Append a classpath entry. Entries keep their order.
    pub fn with_classpath(mut self, path: impl Into<PathBuf>) -> Self {
        self.classpath.push(path.into());
        self
    }

    /// Append a `java.library.path` entry.
    pub fn with_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.library_path.push(path.into());
        self
    }

    /// Add init options to the Java VM init arguments.
    ///
    /// [JNI documentation](https://docs.oracle.com/javase/10/docs/specs/jni/invocation.html#jni_createjavavm)
    pub fn with_options(mut self, options: &[JvmOption]) -> Self {
        self.options.extend_from_slice(options);
        self
    }

    /// Add an init option to the Java VM init arguments.
    ///
    /// [JNI documentation](https://docs.oracle.com/javase/10/docs/specs/jni/invocation.html#jni_createjavavm)
    pub fn with_option(self, option: JvmOption) -> Self {
        self.with_options(&[option])
    }

    /// Add a raw option string, e.g. `-Xss2m`.
    pub fn with_option_string(self, option: &str) -> Self {
        self.with_option(JvmOption::parse(option))
    }

    /// Use one bulk copy per numeric array instead of one copy per element.
    pub fn with_bulk_numeric(mut self, enable: bool) -> Self {
        self.enable_bulk_numeric = enable;
        self
    }

    /// Initial heap size in bytes (`-Xms`).
    pub fn with_initial_heap(mut self, bytes: usize) -> Self {
        self.initial_heap = Some(bytes);
        self
    }

    /// Maximum heap size in bytes (`-Xmx`).
    pub fn with_max_heap(mut self, bytes: usize) -> Self {
        self.max_heap = Some(bytes);
        self
    }

    pub fn with_version(mut self, version: JniVersion) -> Self {
        self.version = version;
        self
    }

    /// Disable checking JNI calls for correctness.
    pub fn unchecked(mut self) -> Self {
        self.options.retain(|option| *option != JvmOption::CheckedJni);
        self
    }

    /// Enable checking JNI calls for correctness.
    pub fn checked(self) -> Self {
        self.with_option(JvmOption::CheckedJni)
    }

    /// Request for JVM to ignore unrecognized options on startup.
    ///
    /// [JNI documentation](https://docs.oracle.com/javase/10/docs/specs/jni/invocation.html#jni_createjavavm)
    pub fn ignore_unrecognized_options(mut self) -> Self {
        self.ignore_unrecognized = true;
        self
    }

    /// Request for JVM to fail in presence of unrecognized options on startup.
    ///
    /// [JNI documentation](https://docs.oracle.com/javase/10/docs/specs/jni/invocation.html#jni_createjavavm)
    pub fn fail_on_unrecognized_options(mut self) -> Self {
        self.ignore_unrecognized = false;
        self
    }

    pub fn classpath(&self) -> &[PathBuf] {
        &self.classpath
    }

    pub fn library_path(&self) -> &[PathBuf] {
        &self.library_path
    }

    pub fn options(&self) -> &[JvmOption] {
        &self.options
    }

    pub fn enable_bulk_numeric(&self) -> bool {
        self.enable_bulk_numeric
    }

    pub fn initial_heap(&self) -> Option<usize> {
        self.initial_heap
    }

    pub fn max_heap(&self) -> Option<usize> {
        self.max_heap
    }

    /// The JNI version requested when creating the Java VM and attaching threads.
    pub fn version(&self) -> JniVersion {
        self.version
    }

    pub fn ignores_unrecognized_options(&self) -> bool {
        self.ignore_unrecognized
    }

    /// Render the JVM option strings: classpath, library path, heap sizes, then user options.
    pub fn option_strings(&self) -> Result<Vec<String>> {
        let mut strings = vec![];
        if !self.classpath.is_empty() {
            strings.push(format!(
                "-Djava.class.path={}",
                join_paths("classpath", &self.classpath)?
            ));
        }
        if !self.library_path.is_empty() {
            strings.push(format!(
                "-Djava.library.path={}",
                join_paths("library path", &self.library_path)?
            ));
        }
        if let (Some(initial), Some(max)) = (self.initial_heap, self.max_heap) {
            if initial > max {
                return Err(BridgeError::Startup(format!(
                    "initial heap size {} exceeds maximum heap size {}",
                    initial, max
                )));
            }
        }
        if let Some(initial) = self.initial_heap {
            strings.push(format!("-Xms{}", memory_size(initial)));
        }
        if let Some(max) = self.max_heap {
            strings.push(format!("-Xmx{}", memory_size(max)));
        }
        strings.extend(self.options.iter().map(JvmOption::to_option_string));
        Ok(strings)
    }
}

fn join_paths(what: &str, paths: &[PathBuf]) -> Result<String> {
    let joined = env::join_paths(paths.iter().map(PathBuf::as_path))
        .map_err(|error| BridgeError::Startup(format!("invalid {}: {}", what, error)))?;
    joined
        .into_string()
        .map_err(|joined| {
            BridgeError::Startup(format!(
                "{} is not valid UTF-8: {}",
                what,
                Path::new(&joined).display()
            ))
        })
}

fn memory_size(bytes: usize) -> String {
    const KILOBYTE: usize = 1024;
    const MEGABYTE: usize = 1024 * KILOBYTE;
    const GIGABYTE: usize = 1024 * MEGABYTE;
    match bytes {
        0 => "0".to_owned(),
        bytes if bytes % GIGABYTE == 0 => format!("{}g", bytes / GIGABYTE),
        bytes if bytes % MEGABYTE == 0 => format!("{}m", bytes / MEGABYTE),
        bytes if bytes % KILOBYTE == 0 => format!("{}k", bytes / KILOBYTE),
        bytes => bytes.to_string(),
    }
}

/// A wrapper around `jni_sys::JavaVMInitArgs` with a lifetime to ensure
/// there's no access to freed memory.
pub(crate) struct RawInitArguments<'a> {
    pub raw_arguments: jni_sys::JavaVMInitArgs,
    _buffer: PhantomData<&'a Vec<CString>>,
}

impl Configuration {
    /// Convert to `jni_sys::JavaVMInitArgs`. The option strings live in `strings_buffer`.
    pub(crate) fn to_raw<'a>(
        &self,
        strings_buffer: &'a mut Vec<CString>,
        options_buffer: &'a mut Vec<jni_sys::JavaVMOption>,
    ) -> Result<RawInitArguments<'a>> {
        *strings_buffer = self
            .option_strings()?
            .into_iter()
            .map(|option| {
                CString::new(option.clone()).map_err(|_| {
                    BridgeError::Startup(format!("option {:?} contains a NUL byte", option))
                })
            })
            .collect::<Result<_>>()?;
        *options_buffer = strings_buffer
            .iter()
            .map(|option| jni_sys::JavaVMOption {
                optionString: option.as_ptr() as *mut c_char,
                extraInfo: ptr::null_mut(),
            })
            .collect();
        Ok(RawInitArguments {
            raw_arguments: jni_sys::JavaVMInitArgs {
                version: self.version.to_raw(),
                nOptions: options_buffer.len() as jni_sys::jint,
                options: options_buffer.as_mut_ptr(),
                ignoreUnrecognized: if self.ignore_unrecognized {
                    jni_sys::JNI_TRUE
                } else {
                    jni_sys::JNI_FALSE
                },
            },
            _buffer: PhantomData,
        })
    }
}
