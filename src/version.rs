use jni_sys;
use std::fmt;

/// JNI Version enum.
///
/// Maps to the `jni_sys::JNI_VERSION_1_*` constants.
///
/// [JNI documentation](https://docs.oracle.com/javase/9/docs/specs/jni/functions.html#version-constants)
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum JniVersion {
    /// JNI 1.1.
    V1,
    /// JNI 1.2.
    V2,
    /// JNI 1.4.
    V4,
    /// JNI 1.6.
    V6,
    /// JNI 1.8.
    V8,
    /// Unknown version.
    /// Needed for forward compability and to request a version that has not been added yet.
    Unknown(i32),
}

impl JniVersion {
    /// Convert from a raw `jint` version.
    pub(crate) fn from_raw(version: jni_sys::jint) -> JniVersion {
        match version {
            jni_sys::JNI_VERSION_1_1 => JniVersion::V1,
            jni_sys::JNI_VERSION_1_2 => JniVersion::V2,
            jni_sys::JNI_VERSION_1_4 => JniVersion::V4,
            jni_sys::JNI_VERSION_1_6 => JniVersion::V6,
            jni_sys::JNI_VERSION_1_8 => JniVersion::V8,
            _ => JniVersion::Unknown(version),
        }
    }

    /// Convert to a raw `jint` version.
    pub(crate) fn to_raw(self) -> jni_sys::jint {
        match self {
            JniVersion::V1 => jni_sys::JNI_VERSION_1_1,
            JniVersion::V2 => jni_sys::JNI_VERSION_1_2,
            JniVersion::V4 => jni_sys::JNI_VERSION_1_4,
            JniVersion::V6 => jni_sys::JNI_VERSION_1_6,
            JniVersion::V8 => jni_sys::JNI_VERSION_1_8,
            JniVersion::Unknown(version) => version,
        }
    }
}

/// The newest version `jni-sys` knows about.
impl Default for JniVersion {
    fn default() -> Self {
        JniVersion::V8
    }
}

impl fmt::Display for JniVersion {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let raw = self.to_raw();
        write!(formatter, "{}.{}", raw >> 16, raw & 0xffff)
    }
}


#[cfg(test)]
mod to_raw_tests {
    use super::*;

    #[test]
    fn to_raw_version() {
        assert_eq!(JniVersion::V1.to_raw(), jni_sys::JNI_VERSION_1_1);
        assert_eq!(JniVersion::V8.to_raw(), jni_sys::JNI_VERSION_1_8);
    }

    #[test]
    fn to_unknown_raw_version() {
        assert_eq!(JniVersion::Unknown(7).to_raw(), 7);
    }

    #[test]
    fn display() {
        assert_eq!(JniVersion::V1.to_string(), "1.1");
        assert_eq!(JniVersion::V8.to_string(), "1.8");
    }
}
