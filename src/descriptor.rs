//! Field and method descriptor parsing.
//!
//! Only what the rewriter needs: parameter kinds, their local-variable slot
//! sizes and the boxing method for primitives.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed descriptor: {0}")]
pub struct DescriptorError(pub String);

/// A single parameter or return type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    /// Internal class name, e.g. `java/lang/String`.
    Object(String),
    /// Full array descriptor, e.g. `[[I`.
    Array(String),
}

impl FieldType {
    /// Local variable slots occupied by a value of this type.
    pub fn slot_size(&self) -> u16 {
        match self {
            FieldType::Long | FieldType::Double => 2,
            _ => 1,
        }
    }

    /// Operand stack words taken by a value of this type.
    pub fn stack_size(&self) -> u16 {
        self.slot_size()
    }

    /// Load opcode family for this type: `(short form base, general opcode)`.
    ///
    /// The short forms `xload_0..xload_3` are `base + slot`.
    pub fn load_opcodes(&self) -> (u8, u8) {
        match self {
            FieldType::Boolean | FieldType::Byte | FieldType::Char | FieldType::Short | FieldType::Int => (0x1a, 0x15),
            FieldType::Long => (0x1e, 0x16),
            FieldType::Float => (0x22, 0x17),
            FieldType::Double => (0x26, 0x18),
            FieldType::Object(_) | FieldType::Array(_) => (0x2a, 0x19),
        }
    }

    /// `(owner, descriptor)` of the static `valueOf` that boxes this
    /// primitive, `None` for references.
    pub fn boxing(&self) -> Option<(&'static str, &'static str)> {
        let b = match self {
            FieldType::Boolean => ("java/lang/Boolean", "(Z)Ljava/lang/Boolean;"),
            FieldType::Byte => ("java/lang/Byte", "(B)Ljava/lang/Byte;"),
            FieldType::Char => ("java/lang/Character", "(C)Ljava/lang/Character;"),
            FieldType::Short => ("java/lang/Short", "(S)Ljava/lang/Short;"),
            FieldType::Int => ("java/lang/Integer", "(I)Ljava/lang/Integer;"),
            FieldType::Long => ("java/lang/Long", "(J)Ljava/lang/Long;"),
            FieldType::Float => ("java/lang/Float", "(F)Ljava/lang/Float;"),
            FieldType::Double => ("java/lang/Double", "(D)Ljava/lang/Double;"),
            FieldType::Object(_) | FieldType::Array(_) => return None,
        };
        Some(b)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub params: Vec<FieldType>,
    /// `None` for `void`.
    pub ret: Option<FieldType>,
}

impl MethodDescriptor {
    /// Local slots used by the parameters, not counting `this`.
    pub fn param_slots(&self) -> u16 {
        self.params.iter().map(FieldType::slot_size).sum()
    }
}

pub fn parse_method_descriptor(desc: &str) -> Result<MethodDescriptor, DescriptorError> {
    let bad = || DescriptorError(desc.to_string());
    let rest = desc.strip_prefix('(').ok_or_else(bad)?;
    let close = rest.find(')').ok_or_else(bad)?;
    let (mut params_str, ret_str) = (&rest[..close], &rest[close + 1..]);

    let mut params = Vec::new();
    while !params_str.is_empty() {
        let (ty, used) = parse_one(params_str).ok_or_else(bad)?;
        params.push(ty);
        params_str = &params_str[used..];
    }

    let ret = if ret_str == "V" {
        None
    } else {
        match parse_one(ret_str) {
            Some((ty, used)) if used == ret_str.len() => Some(ty),
            _ => return Err(bad()),
        }
    };

    Ok(MethodDescriptor { params, ret })
}

pub fn parse_field_descriptor(desc: &str) -> Result<FieldType, DescriptorError> {
    match parse_one(desc) {
        Some((ty, used)) if used == desc.len() => Ok(ty),
        _ => Err(DescriptorError(desc.to_string())),
    }
}

/// Parses one field type from the front of `s`, returning it and the number
/// of bytes consumed.
fn parse_one(s: &str) -> Option<(FieldType, usize)> {
    let ty = match s.as_bytes().first()? {
        b'Z' => FieldType::Boolean,
        b'B' => FieldType::Byte,
        b'C' => FieldType::Char,
        b'S' => FieldType::Short,
        b'I' => FieldType::Int,
        b'J' => FieldType::Long,
        b'F' => FieldType::Float,
        b'D' => FieldType::Double,
        b'L' => {
            let end = s.find(';')?;
            if end < 2 {
                return None;
            }
            return Some((FieldType::Object(s[1..end].to_string()), end + 1));
        }
        b'[' => {
            let dims = s.bytes().take_while(|&b| b == b'[').count();
            if dims > 255 {
                return None;
            }
            let (_, used) = parse_one(&s[dims..])?;
            let len = dims + used;
            return Some((FieldType::Array(s[..len].to_string()), len));
        }
        _ => return None,
    };
    Some((ty, 1))
}

/// Converts a JVM type signature as returned by `GetClassSignature`
/// (`Lcom/example/Foo;`, `[I`) to the name `Class.getName()` would report
/// (`com.example.Foo`, `[I`).
pub fn signature_to_binary_name(sig: &str) -> String {
    if let Some(inner) = sig.strip_prefix('L').and_then(|s| s.strip_suffix(';')) {
        return inner.replace('/', ".");
    }
    sig.replace('/', ".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mixed_parameters() {
        let d = parse_method_descriptor("(IJLjava/lang/String;[[DZ)V").unwrap();
        assert_eq!(
            d.params,
            vec![
                FieldType::Int,
                FieldType::Long,
                FieldType::Object("java/lang/String".into()),
                FieldType::Array("[[D".into()),
                FieldType::Boolean,
            ]
        );
        assert_eq!(d.ret, None);
        assert_eq!(d.param_slots(), 6);
    }

    #[test]
    fn parses_return_type() {
        let d = parse_method_descriptor("()[Ljava/lang/Object;").unwrap();
        assert!(d.params.is_empty());
        assert_eq!(d.ret, Some(FieldType::Array("[Ljava/lang/Object;".into())));
    }

    #[test]
    fn rejects_malformed() {
        for bad in ["", "I)V", "(I", "(Q)V", "(Ljava/lang/String)V", "(I)VV", "(L;)V"] {
            assert!(parse_method_descriptor(bad).is_err(), "{bad}");
        }
        assert!(parse_field_descriptor("II").is_err());
    }

    #[test]
    fn binary_names_from_signatures() {
        assert_eq!(signature_to_binary_name("Lcom/example/Foo$Bar;"), "com.example.Foo$Bar");
        assert_eq!(signature_to_binary_name("[I"), "[I");
        assert_eq!(signature_to_binary_name("[Ljava/lang/String;"), "[Ljava.lang.String;");
    }
}
