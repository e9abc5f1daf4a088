/// Java uses
/// [modified UTF-8 strings](https://docs.oracle.com/javase/10/docs/specs/jni/types.html#modified-utf-8-strings)
/// for class names, method names and signatures and UTF-16 for `java.lang.String` contents.
/// JNI in addition uses null-terminated modified UTF-8 strings.
/// This module maps Rust UTF-8 strings to both encodings and back, strictly: malformed input
/// is an [`Encoding`](enum.BridgeError.html#variant.Encoding) error, never a replacement character.
use crate::error::{BridgeError, Result};
use cesu8;
use std::char;

/// Convert a Rust UTF-8 string into a buffer with a null-terminated Java modified UTF-8 string.
///
/// [JNI documentation](https://docs.oracle.com/javase/10/docs/specs/jni/types.html#modified-utf-8-strings)
pub fn to_java_string(string: &str) -> Vec<u8> {
    let mut buffer = cesu8::to_java_cesu8(string).into_owned();
    buffer.push(0);
    buffer
}

#[cfg(test)]
mod to_java_string_tests {
    use super::*;

    #[test]
    fn to() {
        assert_eq!(
            to_java_string("test"),
            vec!['t' as u8, 'e' as u8, 's' as u8, 't' as u8, 0]
        );
    }

    #[test]
    fn embedded_nul() {
        // Modified UTF-8 encodes U+0000 as two bytes so the terminator stays unique.
        assert_eq!(to_java_string("a\0b"), vec![b'a', 0xc0, 0x80, b'b', 0]);
    }
}

/// Convert a buffer with a Java modified UTF-8 string into a Rust UTF-8 string.
/// A trailing null terminator is accepted and dropped.
///
/// [JNI documentation](https://docs.oracle.com/javase/10/docs/specs/jni/types.html#modified-utf-8-strings)
pub fn from_java_string(buffer: &[u8]) -> Result<String> {
    let buffer = match buffer.split_last() {
        Some((0, rest)) => rest,
        _ => buffer,
    };
    cesu8::from_java_cesu8(buffer)
        .map(|string| string.into_owned())
        .map_err(|_| BridgeError::Encoding("invalid modified UTF-8 sequence".to_owned()))
}

#[cfg(test)]
mod from_java_string_tests {
    use super::*;

    #[test]
    fn from() {
        let buffer = vec!['t' as u8, 'e' as u8, 's' as u8, 't' as u8, 0];
        assert_eq!(from_java_string(&buffer).unwrap(), "test");
    }

    #[test]
    fn supplementary_characters() {
        let string = "clef \u{1d11e}";
        assert_eq!(from_java_string(&to_java_string(string)).unwrap(), string);
    }

    #[test]
    fn malformed() {
        match from_java_string(&[b'a', 0xff, 0]) {
            Err(BridgeError::Encoding(_)) => {}
            other => panic!("unexpected result {:?}", other),
        }
    }
}

/// Encode a Rust string as the UTF-16 code units of a `java.lang.String`.
pub fn to_utf16(string: &str) -> Vec<u16> {
    string.encode_utf16().collect()
}

/// Decode the UTF-16 code units of a `java.lang.String`.
///
/// Fails on an unpaired surrogate.
pub fn from_utf16(units: &[u16]) -> Result<String> {
    let mut string = String::with_capacity(units.len());
    let mut index = 0;
    for decoded in char::decode_utf16(units.iter().cloned()) {
        match decoded {
            Ok(character) => {
                index += character.len_utf16();
                string.push(character);
            }
            Err(error) => {
                return Err(BridgeError::Encoding(format!(
                    "unpaired surrogate {:#06x} at index {}",
                    error.unpaired_surrogate(),
                    index
                )));
            }
        }
    }
    Ok(string)
}

#[cfg(test)]
mod utf16_tests {
    use super::*;

    #[test]
    fn surrogate_pair() {
        let units = to_utf16("\u{1f600}!");
        assert_eq!(units, vec![0xd83d, 0xde00, 0x21]);
        assert_eq!(from_utf16(&units).unwrap(), "\u{1f600}!");
    }

    #[test]
    fn lone_high_surrogate() {
        match from_utf16(&[0x61, 0xd83d, 0x62]) {
            Err(BridgeError::Encoding(message)) => {
                assert_eq!(message, "unpaired surrogate 0xd83d at index 1")
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn lone_low_surrogate() {
        assert!(from_utf16(&[0xde00]).is_err());
    }
}

/// `java.lang.String` -> `java/lang/String`.
pub fn to_internal_name(name: &str) -> String {
    name.replace('.', "/")
}

/// `java/lang/String` -> `java.lang.String`.
pub fn to_binary_name(name: &str) -> String {
    name.replace('/', ".")
}

#[cfg(test)]
mod name_tests {
    use super::*;

    #[test]
    fn names() {
        assert_eq!(to_internal_name("java.util.Map$Entry"), "java/util/Map$Entry");
        assert_eq!(to_binary_name("java/util/Map$Entry"), "java.util.Map$Entry");
        assert_eq!(to_internal_name("java/lang/Object"), "java/lang/Object");
    }
}
