use crate::registry::JavaObject;
use crate::types::PrimitiveKind;
use std::fmt;

/// A single Java primitive value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PrimitiveValue {
    Boolean(bool),
    Byte(i8),
    /// A UTF-16 code unit.
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
}

impl PrimitiveValue {
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            PrimitiveValue::Boolean(_) => PrimitiveKind::Boolean,
            PrimitiveValue::Byte(_) => PrimitiveKind::Byte,
            PrimitiveValue::Char(_) => PrimitiveKind::Char,
            PrimitiveValue::Short(_) => PrimitiveKind::Short,
            PrimitiveValue::Int(_) => PrimitiveKind::Int,
            PrimitiveValue::Long(_) => PrimitiveKind::Long,
            PrimitiveValue::Float(_) => PrimitiveKind::Float,
            PrimitiveValue::Double(_) => PrimitiveKind::Double,
        }
    }

    /// Apply a Java widening primitive conversion. `None` if `target` would narrow.
    pub fn widen(self, target: PrimitiveKind) -> Option<PrimitiveValue> {
        use self::PrimitiveValue::*;
        if !self.kind().widens_to(target) {
            return None;
        }
        // Only widening pairs are left; `as` is exact or rounds to nearest like Java.
        let widened = match (self, target) {
            (value, _) if value.kind() == target => value,
            (Byte(value), PrimitiveKind::Short) => Short(value as i16),
            (Byte(value), PrimitiveKind::Int) => Int(value as i32),
            (Byte(value), PrimitiveKind::Long) => Long(value as i64),
            (Byte(value), PrimitiveKind::Float) => Float(value as f32),
            (Byte(value), PrimitiveKind::Double) => Double(value as f64),
            (Short(value), PrimitiveKind::Int) => Int(value as i32),
            (Short(value), PrimitiveKind::Long) => Long(value as i64),
            (Short(value), PrimitiveKind::Float) => Float(value as f32),
            (Short(value), PrimitiveKind::Double) => Double(value as f64),
            (Char(value), PrimitiveKind::Int) => Int(value as i32),
            (Char(value), PrimitiveKind::Long) => Long(value as i64),
            (Char(value), PrimitiveKind::Float) => Float(value as f32),
            (Char(value), PrimitiveKind::Double) => Double(value as f64),
            (Int(value), PrimitiveKind::Long) => Long(value as i64),
            (Int(value), PrimitiveKind::Float) => Float(value as f32),
            (Int(value), PrimitiveKind::Double) => Double(value as f64),
            (Long(value), PrimitiveKind::Float) => Float(value as f32),
            (Long(value), PrimitiveKind::Double) => Double(value as f64),
            (Float(value), PrimitiveKind::Double) => Double(value as f64),
            _ => return None,
        };
        Some(widened)
    }
}

impl fmt::Display for PrimitiveValue {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimitiveValue::Boolean(value) => write!(formatter, "{}", value),
            PrimitiveValue::Byte(value) => write!(formatter, "{}", value),
            PrimitiveValue::Char(value) => write!(formatter, "'\\u{:04x}'", value),
            PrimitiveValue::Short(value) => write!(formatter, "{}", value),
            PrimitiveValue::Int(value) => write!(formatter, "{}", value),
            PrimitiveValue::Long(value) => write!(formatter, "{}L", value),
            PrimitiveValue::Float(value) => write!(formatter, "{}f", value),
            PrimitiveValue::Double(value) => write!(formatter, "{}d", value),
        }
    }
}

macro_rules! primitive_value_from {
    ($($rust_type:ty => $variant:ident),*) => {
        $(
            impl From<$rust_type> for PrimitiveValue {
                fn from(value: $rust_type) -> Self {
                    PrimitiveValue::$variant(value)
                }
            }

            impl From<$rust_type> for Value {
                fn from(value: $rust_type) -> Self {
                    Value::Primitive(PrimitiveValue::$variant(value))
                }
            }
        )*
    };
}

primitive_value_from!(
    bool => Boolean,
    i8 => Byte,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double
);

#[cfg(test)]
mod primitive_value_tests {
    use super::*;

    #[test]
    fn widen() {
        assert_eq!(
            PrimitiveValue::Byte(-3).widen(PrimitiveKind::Long),
            Some(PrimitiveValue::Long(-3))
        );
        assert_eq!(
            PrimitiveValue::Char(0xffff).widen(PrimitiveKind::Int),
            Some(PrimitiveValue::Int(65535))
        );
        assert_eq!(
            PrimitiveValue::Int(16_777_217).widen(PrimitiveKind::Float),
            Some(PrimitiveValue::Float(16_777_216.0))
        );
        assert_eq!(
            PrimitiveValue::Boolean(true).widen(PrimitiveKind::Boolean),
            Some(PrimitiveValue::Boolean(true))
        );
    }

    #[test]
    fn no_narrowing() {
        assert_eq!(PrimitiveValue::Long(1).widen(PrimitiveKind::Int), None);
        assert_eq!(PrimitiveValue::Short(1).widen(PrimitiveKind::Char), None);
        assert_eq!(PrimitiveValue::Double(1.0).widen(PrimitiveKind::Float), None);
    }
}

/// A one-dimensional Java primitive array, stored host side.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimitiveArray {
    Boolean(Vec<bool>),
    Byte(Vec<i8>),
    Char(Vec<u16>),
    Short(Vec<i16>),
    Int(Vec<i32>),
    Long(Vec<i64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
}

/// Borrowed contents of a primitive array.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArrayRegion<'a> {
    Boolean(&'a [bool]),
    Byte(&'a [i8]),
    Char(&'a [u16]),
    Short(&'a [i16]),
    Int(&'a [i32]),
    Long(&'a [i64]),
    Float(&'a [f32]),
    Double(&'a [f64]),
}

/// Mutably borrowed contents of a primitive array.
#[derive(Debug, PartialEq)]
pub enum ArrayRegionMut<'a> {
    Boolean(&'a mut [bool]),
    Byte(&'a mut [i8]),
    Char(&'a mut [u16]),
    Short(&'a mut [i16]),
    Int(&'a mut [i32]),
    Long(&'a mut [i64]),
    Float(&'a mut [f32]),
    Double(&'a mut [f64]),
}

/// Run `$body` with `$values` bound to the inner collection of any variant of `$enum`.
macro_rules! each_kind {
    ($enum:ident, $value:expr, $values:ident => $body:expr) => {
        match $value {
            $enum::Boolean($values) => $body,
            $enum::Byte($values) => $body,
            $enum::Char($values) => $body,
            $enum::Short($values) => $body,
            $enum::Int($values) => $body,
            $enum::Long($values) => $body,
            $enum::Float($values) => $body,
            $enum::Double($values) => $body,
        }
    };
}

/// Like `each_kind!`, but rebuilds the same variant of `$target` from `$body`.
macro_rules! map_kind {
    ($enum:ident => $target:ident, $value:expr, $values:ident => $body:expr) => {
        match $value {
            $enum::Boolean($values) => $target::Boolean($body),
            $enum::Byte($values) => $target::Byte($body),
            $enum::Char($values) => $target::Char($body),
            $enum::Short($values) => $target::Short($body),
            $enum::Int($values) => $target::Int($body),
            $enum::Long($values) => $target::Long($body),
            $enum::Float($values) => $target::Float($body),
            $enum::Double($values) => $target::Double($body),
        }
    };
}

impl PrimitiveArray {
    /// An array of `length` default (zero or `false`) elements.
    pub fn zeroed(kind: PrimitiveKind, length: usize) -> Self {
        match kind {
            PrimitiveKind::Boolean => PrimitiveArray::Boolean(vec![false; length]),
            PrimitiveKind::Byte => PrimitiveArray::Byte(vec![0; length]),
            PrimitiveKind::Char => PrimitiveArray::Char(vec![0; length]),
            PrimitiveKind::Short => PrimitiveArray::Short(vec![0; length]),
            PrimitiveKind::Int => PrimitiveArray::Int(vec![0; length]),
            PrimitiveKind::Long => PrimitiveArray::Long(vec![0; length]),
            PrimitiveKind::Float => PrimitiveArray::Float(vec![0.0; length]),
            PrimitiveKind::Double => PrimitiveArray::Double(vec![0.0; length]),
        }
    }

    pub fn kind(&self) -> PrimitiveKind {
        self.as_region().kind()
    }

    pub fn len(&self) -> usize {
        each_kind!(PrimitiveArray, self, values => values.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<PrimitiveValue> {
        each_kind!(PrimitiveArray, self, values => values.get(index).map(|value| PrimitiveValue::from(*value)))
    }

    pub fn as_region(&self) -> ArrayRegion<'_> {
        map_kind!(PrimitiveArray => ArrayRegion, self, values => &values[..])
    }

    pub fn as_region_mut(&mut self) -> ArrayRegionMut<'_> {
        map_kind!(PrimitiveArray => ArrayRegionMut, self, values => &mut values[..])
    }
}

impl From<u16> for PrimitiveValue {
    fn from(value: u16) -> Self {
        PrimitiveValue::Char(value)
    }
}

macro_rules! primitive_array_from {
    ($($rust_type:ty => $variant:ident),*) => {
        $(
            impl From<Vec<$rust_type>> for PrimitiveArray {
                fn from(values: Vec<$rust_type>) -> Self {
                    PrimitiveArray::$variant(values)
                }
            }

            impl From<Vec<$rust_type>> for Value {
                fn from(values: Vec<$rust_type>) -> Self {
                    Value::Array(PrimitiveArray::$variant(values))
                }
            }
        )*
    };
}

primitive_array_from!(
    bool => Boolean,
    i8 => Byte,
    u16 => Char,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double
);

impl<'a> ArrayRegion<'a> {
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            ArrayRegion::Boolean(_) => PrimitiveKind::Boolean,
            ArrayRegion::Byte(_) => PrimitiveKind::Byte,
            ArrayRegion::Char(_) => PrimitiveKind::Char,
            ArrayRegion::Short(_) => PrimitiveKind::Short,
            ArrayRegion::Int(_) => PrimitiveKind::Int,
            ArrayRegion::Long(_) => PrimitiveKind::Long,
            ArrayRegion::Float(_) => PrimitiveKind::Float,
            ArrayRegion::Double(_) => PrimitiveKind::Double,
        }
    }

    pub fn len(&self) -> usize {
        each_kind!(ArrayRegion, self, values => values.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `length` elements starting at `start`. Panics when out of bounds, like slicing.
    pub fn subregion(self, start: usize, length: usize) -> ArrayRegion<'a> {
        map_kind!(ArrayRegion => ArrayRegion, self, values => &values[start..start + length])
    }
}

impl<'a> ArrayRegionMut<'a> {
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            ArrayRegionMut::Boolean(_) => PrimitiveKind::Boolean,
            ArrayRegionMut::Byte(_) => PrimitiveKind::Byte,
            ArrayRegionMut::Char(_) => PrimitiveKind::Char,
            ArrayRegionMut::Short(_) => PrimitiveKind::Short,
            ArrayRegionMut::Int(_) => PrimitiveKind::Int,
            ArrayRegionMut::Long(_) => PrimitiveKind::Long,
            ArrayRegionMut::Float(_) => PrimitiveKind::Float,
            ArrayRegionMut::Double(_) => PrimitiveKind::Double,
        }
    }

    pub fn len(&self) -> usize {
        each_kind!(ArrayRegionMut, self, values => values.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `length` elements starting at `start`. Panics when out of bounds, like slicing.
    pub fn subregion(self, start: usize, length: usize) -> ArrayRegionMut<'a> {
        map_kind!(ArrayRegionMut => ArrayRegionMut, self, values => &mut values[start..start + length])
    }
}

#[cfg(test)]
mod primitive_array_tests {
    use super::*;

    #[test]
    fn zeroed() {
        let array = PrimitiveArray::zeroed(PrimitiveKind::Double, 3);
        assert_eq!(array, PrimitiveArray::Double(vec![0.0, 0.0, 0.0]));
        assert_eq!(array.kind(), PrimitiveKind::Double);
        assert_eq!(array.len(), 3);
    }

    #[test]
    fn get() {
        let array = PrimitiveArray::from(vec![1i64, 2, 3]);
        assert_eq!(array.get(2), Some(PrimitiveValue::Long(3)));
        assert_eq!(array.get(3), None);
    }

    #[test]
    fn subregion() {
        let mut array = PrimitiveArray::from(vec![1i32, 2, 3, 4]);
        assert_eq!(
            array.as_region().subregion(1, 2),
            ArrayRegion::Int(&[2, 3])
        );
        if let ArrayRegionMut::Int(values) = array.as_region_mut().subregion(3, 1) {
            values[0] = 40;
        }
        assert_eq!(array, PrimitiveArray::Int(vec![1, 2, 3, 40]));
    }
}

/// A value crossing the bridge, in host form.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Java `null`, and the result of a `void` method.
    Null,
    Primitive(PrimitiveValue),
    String(String),
    /// A one-dimensional primitive array.
    Array(PrimitiveArray),
    /// An array of references, including nested arrays.
    ObjectArray(Vec<Value>),
    /// Any other Java object.
    Object(JavaObject),
}

impl Value {
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            _ => false,
        }
    }

    pub fn as_primitive(&self) -> Option<PrimitiveValue> {
        match self {
            Value::Primitive(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&JavaObject> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn into_object(self) -> Option<JavaObject> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    /// A short description of the value's type, used in conversion errors.
    pub fn type_name(&self) -> String {
        match self {
            Value::Null => "null".to_owned(),
            Value::Primitive(value) => value.kind().java_name().to_owned(),
            Value::String(_) => "string".to_owned(),
            Value::Array(array) => format!("{}[{}]", array.kind(), array.len()),
            Value::ObjectArray(values) => format!("object[{}]", values.len()),
            Value::Object(_) => "object".to_owned(),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<PrimitiveValue> for Value {
    fn from(value: PrimitiveValue) -> Self {
        Value::Primitive(value)
    }
}

impl From<PrimitiveArray> for Value {
    fn from(array: PrimitiveArray) -> Self {
        Value::Array(array)
    }
}

impl From<JavaObject> for Value {
    fn from(object: JavaObject) -> Self {
        Value::Object(object)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}
