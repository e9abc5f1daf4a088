use crate::error::{BridgeError, Result};
use crate::java_string::{to_binary_name, to_internal_name};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// The eight Java primitive types.
///
/// [JNI documentation](https://docs.oracle.com/javase/10/docs/specs/jni/types.html#primitive-types)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
}

impl PrimitiveKind {
    pub const ALL: [PrimitiveKind; 8] = [
        PrimitiveKind::Boolean,
        PrimitiveKind::Byte,
        PrimitiveKind::Char,
        PrimitiveKind::Short,
        PrimitiveKind::Int,
        PrimitiveKind::Long,
        PrimitiveKind::Float,
        PrimitiveKind::Double,
    ];

    /// The JNI type signature character.
    pub fn signature(self) -> char {
        match self {
            PrimitiveKind::Boolean => 'Z',
            PrimitiveKind::Byte => 'B',
            PrimitiveKind::Char => 'C',
            PrimitiveKind::Short => 'S',
            PrimitiveKind::Int => 'I',
            PrimitiveKind::Long => 'J',
            PrimitiveKind::Float => 'F',
            PrimitiveKind::Double => 'D',
        }
    }

    fn from_signature(signature: char) -> Option<Self> {
        PrimitiveKind::ALL
            .iter()
            .cloned()
            .find(|kind| kind.signature() == signature)
    }

    /// The Java keyword naming the type.
    pub fn java_name(self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "boolean",
            PrimitiveKind::Byte => "byte",
            PrimitiveKind::Char => "char",
            PrimitiveKind::Short => "short",
            PrimitiveKind::Int => "int",
            PrimitiveKind::Long => "long",
            PrimitiveKind::Float => "float",
            PrimitiveKind::Double => "double",
        }
    }

    /// Internal name of the boxing class, e.g. `java/lang/Integer`.
    pub fn box_class(self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "java/lang/Boolean",
            PrimitiveKind::Byte => "java/lang/Byte",
            PrimitiveKind::Char => "java/lang/Character",
            PrimitiveKind::Short => "java/lang/Short",
            PrimitiveKind::Int => "java/lang/Integer",
            PrimitiveKind::Long => "java/lang/Long",
            PrimitiveKind::Float => "java/lang/Float",
            PrimitiveKind::Double => "java/lang/Double",
        }
    }

    /// The primitive kind boxed by a class, given either its internal or binary name.
    pub fn from_box_class(class_name: &str) -> Option<Self> {
        let class_name = to_internal_name(class_name);
        PrimitiveKind::ALL
            .iter()
            .cloned()
            .find(|kind| kind.box_class() == class_name)
    }

    /// Size of one element in a JNI array buffer.
    pub fn width(self) -> usize {
        match self {
            PrimitiveKind::Boolean | PrimitiveKind::Byte => 1,
            PrimitiveKind::Char | PrimitiveKind::Short => 2,
            PrimitiveKind::Int | PrimitiveKind::Float => 4,
            PrimitiveKind::Long | PrimitiveKind::Double => 8,
        }
    }

    /// Whether a value of this type converts to `target` by identity or a Java widening
    /// primitive conversion.
    ///
    /// [JLS 5.1.2](https://docs.oracle.com/javase/specs/jls/se11/html/jls-5.html#jls-5.1.2)
    pub fn widens_to(self, target: PrimitiveKind) -> bool {
        use self::PrimitiveKind::*;
        if self == target {
            return true;
        }
        match self {
            Byte => [Short, Int, Long, Float, Double].contains(&target),
            Short | Char => [Int, Long, Float, Double].contains(&target),
            Int => [Long, Float, Double].contains(&target),
            Long => [Float, Double].contains(&target),
            Float => target == Double,
            Boolean | Double => false,
        }
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.java_name())
    }
}


/// A Java type: a primitive, an array, a class (by internal name) or `void`.
///
/// [JNI documentation](https://docs.oracle.com/javase/10/docs/specs/jni/types.html#type-signatures)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDescriptor {
    Void,
    Primitive(PrimitiveKind),
    Array(Box<TypeDescriptor>),
    /// Internal name, e.g. `java/lang/String`.
    Class(String),
}

impl TypeDescriptor {
    /// Parse a single JNI type signature such as `I`, `[J` or `Ljava/lang/String;`.
    pub fn parse(signature: &str) -> Result<Self> {
        match Self::parse_prefix(signature)? {
            (descriptor, "") => Ok(descriptor),
            _ => Err(malformed(signature)),
        }
    }

    fn parse_prefix(signature: &str) -> Result<(Self, &str)> {
        let mut characters = signature.chars();
        let descriptor = match characters.next() {
            Some('V') => TypeDescriptor::Void,
            Some('[') => {
                let (element, rest) = Self::parse_prefix(&signature[1..])?;
                if element == TypeDescriptor::Void {
                    return Err(malformed(signature));
                }
                return Ok((TypeDescriptor::Array(Box::new(element)), rest));
            }
            Some('L') => {
                let end = signature.find(';').ok_or_else(|| malformed(signature))?;
                if end == 1 {
                    return Err(malformed(signature));
                }
                return Ok((
                    TypeDescriptor::Class(signature[1..end].to_owned()),
                    &signature[end + 1..],
                ));
            }
            Some(character) => match PrimitiveKind::from_signature(character) {
                Some(kind) => TypeDescriptor::Primitive(kind),
                None => return Err(malformed(signature)),
            },
            None => return Err(malformed(signature)),
        };
        Ok((descriptor, characters.as_str()))
    }

    /// Parse a name as returned by `Class.getName()`: `int`, `java.lang.String`, `[I`,
    /// `[Ljava.lang.String;`.
    pub fn from_java_name(name: &str) -> Result<Self> {
        if name == "void" {
            return Ok(TypeDescriptor::Void);
        }
        if let Some(kind) = PrimitiveKind::ALL
            .iter()
            .cloned()
            .find(|kind| kind.java_name() == name)
        {
            return Ok(TypeDescriptor::Primitive(kind));
        }
        if name.starts_with('[') {
            return Self::parse(&to_internal_name(name));
        }
        if name.is_empty() {
            return Err(malformed(name));
        }
        Ok(TypeDescriptor::Class(to_internal_name(name)))
    }

    pub fn object() -> Self {
        TypeDescriptor::Class("java/lang/Object".to_owned())
    }

    pub fn string() -> Self {
        TypeDescriptor::Class("java/lang/String".to_owned())
    }

    /// A class type from either its binary or internal name.
    pub fn class(name: &str) -> Self {
        TypeDescriptor::Class(to_internal_name(name))
    }

    pub fn array(element: TypeDescriptor) -> Self {
        TypeDescriptor::Array(Box::new(element))
    }

    pub fn primitive(kind: PrimitiveKind) -> Self {
        TypeDescriptor::Primitive(kind)
    }

    /// The JNI type signature.
    pub fn signature(&self) -> String {
        match self {
            TypeDescriptor::Void => "V".to_owned(),
            TypeDescriptor::Primitive(kind) => kind.signature().to_string(),
            TypeDescriptor::Array(element) => format!("[{}", element.signature()),
            TypeDescriptor::Class(name) => format!("L{};", name),
        }
    }

    /// The name `FindClass` expects: the internal name of a class, the signature of an array.
    pub fn lookup_name(&self) -> String {
        match self {
            TypeDescriptor::Class(name) => name.clone(),
            other => other.signature(),
        }
    }

    /// The name `Class.getName()` returns.
    pub fn java_name(&self) -> String {
        match self {
            TypeDescriptor::Void => "void".to_owned(),
            TypeDescriptor::Primitive(kind) => kind.java_name().to_owned(),
            TypeDescriptor::Array(_) => to_binary_name(&self.signature()),
            TypeDescriptor::Class(name) => to_binary_name(name),
        }
    }

    pub fn is_reference(&self) -> bool {
        match self {
            TypeDescriptor::Array(_) | TypeDescriptor::Class(_) => true,
            _ => false,
        }
    }

    pub fn is_object(&self) -> bool {
        self.is_class("java/lang/Object")
    }

    pub fn is_string(&self) -> bool {
        self.is_class("java/lang/String")
    }

    pub(crate) fn is_class(&self, internal_name: &str) -> bool {
        match self {
            TypeDescriptor::Class(name) => name == internal_name,
            _ => false,
        }
    }

    pub fn element(&self) -> Option<&TypeDescriptor> {
        match self {
            TypeDescriptor::Array(element) => Some(element),
            _ => None,
        }
    }

    /// The element kind of a one-dimensional primitive array.
    pub fn primitive_element(&self) -> Option<PrimitiveKind> {
        match self.element() {
            Some(TypeDescriptor::Primitive(kind)) => Some(*kind),
            _ => None,
        }
    }
}

fn malformed(signature: &str) -> BridgeError {
    BridgeError::SignatureMismatch(format!("malformed type signature {:?}", signature))
}

/// Java source notation: `int`, `java.lang.String`, `long[][]`.
impl fmt::Display for TypeDescriptor {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Array(element) => write!(formatter, "{}[]", element),
            other => formatter.write_str(&other.java_name()),
        }
    }
}


/// A Java method: name, parameter types and result type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSignature {
    name: String,
    parameters: Vec<TypeDescriptor>,
    result: TypeDescriptor,
}

impl MethodSignature {
    pub fn new(
        name: impl Into<String>,
        parameters: Vec<TypeDescriptor>,
        result: TypeDescriptor,
    ) -> Self {
        MethodSignature {
            name: name.into(),
            parameters,
            result,
        }
    }

    /// Parse a JNI method descriptor, e.g. `parse("compare", "(II)I")`.
    pub fn parse(name: &str, descriptor: &str) -> Result<Self> {
        if !descriptor.starts_with('(') {
            return Err(malformed(descriptor));
        }
        let mut rest = &descriptor[1..];
        let mut parameters = vec![];
        while !rest.starts_with(')') {
            let (parameter, remaining) = TypeDescriptor::parse_prefix(rest)?;
            if parameter == TypeDescriptor::Void {
                return Err(malformed(descriptor));
            }
            parameters.push(parameter);
            rest = remaining;
        }
        let result = TypeDescriptor::parse(&rest[1..]).map_err(|_| malformed(descriptor))?;
        Ok(MethodSignature::new(name, parameters, result))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &[TypeDescriptor] {
        &self.parameters
    }

    pub fn result(&self) -> &TypeDescriptor {
        &self.result
    }

    /// The JNI method descriptor, e.g. `(ILjava/lang/String;)V`.
    pub fn descriptor(&self) -> String {
        let parameters: String = self
            .parameters
            .iter()
            .map(TypeDescriptor::signature)
            .collect();
        format!("({}){}", parameters, self.result.signature())
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}{}", self.name, self.descriptor())
    }
}

#[cfg(test)]
mod method_signature_tests {
    use super::*;

    #[test]
    fn parse() {
        let signature = MethodSignature::parse("apply", "(I[JLjava/lang/Object;)Z").unwrap();
        assert_eq!(signature.name(), "apply");
        assert_eq!(
            signature.parameters(),
            &[
                TypeDescriptor::Primitive(PrimitiveKind::Int),
                TypeDescriptor::array(TypeDescriptor::Primitive(PrimitiveKind::Long)),
                TypeDescriptor::object(),
            ]
        );
        assert_eq!(
            signature.result(),
            &TypeDescriptor::Primitive(PrimitiveKind::Boolean)
        );
        assert_eq!(signature.descriptor(), "(I[JLjava/lang/Object;)Z");
        assert_eq!(signature.to_string(), "apply(I[JLjava/lang/Object;)Z");
    }

    #[test]
    fn parse_malformed() {
        assert!(MethodSignature::parse("run", "V").is_err());
        assert!(MethodSignature::parse("run", "(V)V").is_err());
        assert!(MethodSignature::parse("run", "(I").is_err());
        assert!(MethodSignature::parse("run", "()").is_err());
    }
}

/// Parsed type descriptors and method signatures shared by every thread of one VM.
///
/// Lookups take a read lock; a miss parses outside any lock and inserts under the write lock.
#[derive(Debug, Default)]
pub struct TypeCache {
    signatures: RwLock<HashMap<String, Arc<TypeDescriptor>>>,
    names: RwLock<HashMap<String, Arc<TypeDescriptor>>>,
    /// Keyed by name followed by descriptor, e.g. `applyAsInt(II)I`.
    methods: RwLock<HashMap<String, Arc<MethodSignature>>>,
}

impl TypeCache {
    pub fn new() -> Self {
        Default::default()
    }

    /// Descriptor for a JNI type signature.
    pub fn signature(&self, signature: &str) -> Result<Arc<TypeDescriptor>> {
        Self::lookup(&self.signatures, signature, TypeDescriptor::parse)
    }

    /// Descriptor for a `Class.getName()` style name.
    pub fn java_name(&self, name: &str) -> Result<Arc<TypeDescriptor>> {
        Self::lookup(&self.names, name, TypeDescriptor::from_java_name)
    }

    /// Signature of the method `name` with the JNI descriptor `descriptor`.
    pub fn method(&self, name: &str, descriptor: &str) -> Result<Arc<MethodSignature>> {
        let key = format!("{}{}", name, descriptor);
        Self::lookup(&self.methods, &key, |_| MethodSignature::parse(name, descriptor))
    }

    pub fn len(&self) -> usize {
        self.signatures.read().len() + self.names.read().len() + self.methods.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup<T>(
        entries: &RwLock<HashMap<String, Arc<T>>>,
        key: &str,
        parse: impl FnOnce(&str) -> Result<T>,
    ) -> Result<Arc<T>> {
        if let Some(entry) = entries.read().get(key) {
            return Ok(entry.clone());
        }
        let entry = Arc::new(parse(key)?);
        Ok(entries
            .write()
            .entry(key.to_owned())
            .or_insert(entry)
            .clone())
    }
}
