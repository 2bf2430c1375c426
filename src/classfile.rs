//! Class file reader and writer.
//!
//! Parsing is deliberately shallow: only the structures whose code offsets
//! move when instructions are inserted at the start of a method are decoded
//! (`Code`, and inside it the exception table, `StackMapTable`,
//! `LineNumberTable`, `LocalVariableTable`, `LocalVariableTypeTable` and the
//! code-level type annotations). Every other attribute is kept as raw bytes,
//! so `ClassFile::parse(b)?.to_bytes()? == b` for any well-formed class.
//!
//! `Utf8` constants are stored as their raw modified-UTF-8 bytes for the same
//! reason.

use std::borrow::Cow;
use thiserror::Error;

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_FINAL: u16 = 0x0010;
pub const ACC_SUPER: u16 = 0x0020;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_NATIVE: u16 = 0x0100;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_ABSTRACT: u16 = 0x0400;
pub const ACC_SYNTHETIC: u16 = 0x1000;
pub const ACC_ANNOTATION: u16 = 0x2000;
pub const ACC_MODULE: u16 = 0x8000;

const MAGIC: u32 = 0xCAFE_BABE;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassFileError {
    #[error("unexpected end of class data")]
    UnexpectedEof,
    #[error("invalid magic: {0:#x}")]
    InvalidMagic(u32),
    #[error("invalid constant pool index: {0}")]
    InvalidConstantPoolIndex(u16),
    #[error("invalid constant pool tag: {0}")]
    InvalidConstantPoolTag(u8),
    #[error("constant pool entry {0} is not valid UTF-8")]
    InvalidUtf8(u16),
    #[error("malformed {0} attribute")]
    InvalidAttribute(&'static str),
    #[error("constant pool is full")]
    ConstantPoolOverflow,
    #[error("{what} too large: {len}")]
    TooLarge { what: &'static str, len: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: ConstantPool,
    pub access_flags: u16,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<MemberInfo>,
    pub methods: Vec<MemberInfo>,
    pub attributes: Vec<AttributeInfo>,
}

/// A field or method declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberInfo {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<AttributeInfo>,
}

impl MemberInfo {
    pub fn is_static(&self) -> bool {
        self.access_flags & ACC_STATIC != 0
    }

    pub fn code(&self) -> Option<&CodeAttribute> {
        self.attributes.iter().find_map(|a| match &a.kind {
            Attribute::Code(code) => Some(code),
            _ => None,
        })
    }

    pub fn code_mut(&mut self) -> Option<&mut CodeAttribute> {
        self.attributes.iter_mut().find_map(|a| match &mut a.kind {
            Attribute::Code(code) => Some(code),
            _ => None,
        })
    }
}

// =============================================================================
// Constant Pool
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum CpInfo {
    Utf8(Vec<u8>),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class { name_index: u16 },
    String { string_index: u16 },
    Fieldref { class_index: u16, name_and_type_index: u16 },
    Methodref { class_index: u16, name_and_type_index: u16 },
    InterfaceMethodref { class_index: u16, name_and_type_index: u16 },
    NameAndType { name_index: u16, descriptor_index: u16 },
    MethodHandle { reference_kind: u8, reference_index: u16 },
    MethodType { descriptor_index: u16 },
    Dynamic { bootstrap_method_attr_index: u16, name_and_type_index: u16 },
    InvokeDynamic { bootstrap_method_attr_index: u16, name_and_type_index: u16 },
    Module { name_index: u16 },
    Package { name_index: u16 },
}

/// Constant pool with 1-based indexing. Slot 0 and the slot after every
/// `Long`/`Double` are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantPool {
    entries: Vec<Option<CpInfo>>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPool {
    pub fn new() -> Self {
        Self { entries: vec![None] }
    }

    /// The `constant_pool_count` value as written to the class file.
    pub fn count(&self) -> u16 {
        self.entries.len() as u16
    }

    pub fn get(&self, index: u16) -> Result<&CpInfo, ClassFileError> {
        if index == 0 {
            return Err(ClassFileError::InvalidConstantPoolIndex(index));
        }
        self.entries
            .get(index as usize)
            .and_then(|e| e.as_ref())
            .ok_or(ClassFileError::InvalidConstantPoolIndex(index))
    }

    pub fn get_utf8_bytes(&self, index: u16) -> Result<&[u8], ClassFileError> {
        match self.get(index)? {
            CpInfo::Utf8(bytes) => Ok(bytes.as_slice()),
            _ => Err(ClassFileError::InvalidConstantPoolIndex(index)),
        }
    }

    /// Decodes a `Utf8` constant. Borrows when the bytes are also plain
    /// UTF-8, which is the common case.
    pub fn get_utf8(&self, index: u16) -> Result<Cow<'_, str>, ClassFileError> {
        decode_modified_utf8(self.get_utf8_bytes(index)?).ok_or(ClassFileError::InvalidUtf8(index))
    }

    /// Resolves a `Class` constant to its internal name.
    pub fn get_class_name(&self, index: u16) -> Result<Cow<'_, str>, ClassFileError> {
        match self.get(index)? {
            CpInfo::Class { name_index } => self.get_utf8(*name_index),
            _ => Err(ClassFileError::InvalidConstantPoolIndex(index)),
        }
    }

    fn push(&mut self, entry: CpInfo) -> Result<u16, ClassFileError> {
        let wide = matches!(entry, CpInfo::Long(_) | CpInfo::Double(_));
        let needed = if wide { 2 } else { 1 };
        if self.entries.len() + needed > u16::MAX as usize {
            return Err(ClassFileError::ConstantPoolOverflow);
        }
        let index = self.entries.len() as u16;
        self.entries.push(Some(entry));
        if wide {
            self.entries.push(None);
        }
        Ok(index)
    }

    fn find(&self, wanted: &CpInfo) -> Option<u16> {
        self.entries
            .iter()
            .position(|e| e.as_ref() == Some(wanted))
            .map(|i| i as u16)
    }

    fn find_or_push(&mut self, entry: CpInfo) -> Result<u16, ClassFileError> {
        match self.find(&entry) {
            Some(index) => Ok(index),
            None => self.push(entry),
        }
    }

    /// Adds (or reuses) a `Utf8` constant, stored in modified UTF-8.
    pub fn add_utf8(&mut self, s: &str) -> Result<u16, ClassFileError> {
        let bytes = encode_modified_utf8(s);
        if bytes.len() > u16::MAX as usize {
            return Err(ClassFileError::TooLarge { what: "Utf8 constant", len: bytes.len() });
        }
        self.find_or_push(CpInfo::Utf8(bytes))
    }

    pub fn add_class(&mut self, internal_name: &str) -> Result<u16, ClassFileError> {
        let name_index = self.add_utf8(internal_name)?;
        self.find_or_push(CpInfo::Class { name_index })
    }

    pub fn add_string(&mut self, s: &str) -> Result<u16, ClassFileError> {
        let string_index = self.add_utf8(s)?;
        self.find_or_push(CpInfo::String { string_index })
    }

    pub fn add_name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16, ClassFileError> {
        let name_index = self.add_utf8(name)?;
        let descriptor_index = self.add_utf8(descriptor)?;
        self.find_or_push(CpInfo::NameAndType { name_index, descriptor_index })
    }

    pub fn add_methodref(&mut self, class: &str, name: &str, descriptor: &str) -> Result<u16, ClassFileError> {
        let class_index = self.add_class(class)?;
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        self.find_or_push(CpInfo::Methodref { class_index, name_and_type_index })
    }
}

/// Encodes `s` the way class files store text: NUL as `C0 80`, characters
/// outside the BMP as two three-byte surrogates.
pub fn encode_modified_utf8(s: &str) -> Vec<u8> {
    if !s.bytes().any(|b| b == 0 || b >= 0xF0) {
        return s.as_bytes().to_vec();
    }
    let mut out = Vec::with_capacity(s.len() + 8);
    for unit in s.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | (unit >> 6) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | (unit >> 12) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}

/// Decodes modified UTF-8. `None` for malformed sequences and unpaired
/// surrogates.
pub fn decode_modified_utf8(bytes: &[u8]) -> Option<Cow<'_, str>> {
    // no NUL and no four-byte forms: the bytes are plain UTF-8 or invalid
    if !bytes.iter().any(|&b| b == 0 || b >= 0xF0) {
        if let Ok(s) = std::str::from_utf8(bytes) {
            return Some(Cow::Borrowed(s));
        }
    }
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        let (unit, used) = match b {
            0x01..=0x7F => (b as u16, 1),
            0xC0..=0xDF => {
                let b1 = continuation(bytes, i + 1)?;
                (((b as u16 & 0x1F) << 6) | b1, 2)
            }
            0xE0..=0xEF => {
                let b1 = continuation(bytes, i + 1)?;
                let b2 = continuation(bytes, i + 2)?;
                (((b as u16 & 0x0F) << 12) | (b1 << 6) | b2, 3)
            }
            _ => return None,
        };
        units.push(unit);
        i += used;
    }
    String::from_utf16(&units).ok().map(Cow::Owned)
}

fn continuation(bytes: &[u8], at: usize) -> Option<u16> {
    match bytes.get(at) {
        Some(&b) if b & 0xC0 == 0x80 => Some((b & 0x3F) as u16),
        _ => None,
    }
}

// =============================================================================
// Attributes
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeInfo {
    pub name_index: u16,
    pub kind: Attribute,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    Code(CodeAttribute),
    StackMapTable(Vec<StackMapFrame>),
    LineNumberTable(Vec<LineNumberEntry>),
    LocalVariableTable(Vec<LocalVariableEntry>),
    /// Same layout as `LocalVariableTable`; `descriptor_index` holds the signature.
    LocalVariableTypeTable(Vec<LocalVariableEntry>),
    RuntimeVisibleTypeAnnotations(Vec<TypeAnnotation>),
    RuntimeInvisibleTypeAnnotations(Vec<TypeAnnotation>),
    /// Any attribute whose contents do not reference code offsets.
    Raw(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionTableEntry>,
    pub attributes: Vec<AttributeInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionTableEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    pub catch_type: u16,
}

/// A `StackMapTable` frame. On write, `Same` and `SameLocals1StackItem`
/// switch to their extended encodings when the delta no longer fits.
#[derive(Debug, Clone, PartialEq)]
pub enum StackMapFrame {
    Same { offset_delta: u16 },
    SameLocals1StackItem { offset_delta: u16, stack: VerificationTypeInfo },
    SameLocals1StackItemExtended { offset_delta: u16, stack: VerificationTypeInfo },
    Chop { offset_delta: u16, k: u8 },
    SameExtended { offset_delta: u16 },
    Append { offset_delta: u16, locals: Vec<VerificationTypeInfo> },
    Full { offset_delta: u16, locals: Vec<VerificationTypeInfo>, stack: Vec<VerificationTypeInfo> },
}

impl StackMapFrame {
    pub fn offset_delta(&self) -> u16 {
        match self {
            StackMapFrame::Same { offset_delta }
            | StackMapFrame::SameLocals1StackItem { offset_delta, .. }
            | StackMapFrame::SameLocals1StackItemExtended { offset_delta, .. }
            | StackMapFrame::Chop { offset_delta, .. }
            | StackMapFrame::SameExtended { offset_delta }
            | StackMapFrame::Append { offset_delta, .. }
            | StackMapFrame::Full { offset_delta, .. } => *offset_delta,
        }
    }

    pub fn offset_delta_mut(&mut self) -> &mut u16 {
        match self {
            StackMapFrame::Same { offset_delta }
            | StackMapFrame::SameLocals1StackItem { offset_delta, .. }
            | StackMapFrame::SameLocals1StackItemExtended { offset_delta, .. }
            | StackMapFrame::Chop { offset_delta, .. }
            | StackMapFrame::SameExtended { offset_delta }
            | StackMapFrame::Append { offset_delta, .. }
            | StackMapFrame::Full { offset_delta, .. } => offset_delta,
        }
    }

    /// Every verification type carried by the frame, locals first.
    pub fn types_mut(&mut self) -> Vec<&mut VerificationTypeInfo> {
        match self {
            StackMapFrame::Same { .. } | StackMapFrame::SameExtended { .. } | StackMapFrame::Chop { .. } => Vec::new(),
            StackMapFrame::SameLocals1StackItem { stack, .. }
            | StackMapFrame::SameLocals1StackItemExtended { stack, .. } => vec![stack],
            StackMapFrame::Append { locals, .. } => locals.iter_mut().collect(),
            StackMapFrame::Full { locals, stack, .. } => locals.iter_mut().chain(stack.iter_mut()).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationTypeInfo {
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,
    UninitializedThis,
    Object(u16),
    /// Offset of the `new` instruction that created the value.
    Uninitialized(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumberEntry {
    pub start_pc: u16,
    pub line_number: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalVariableEntry {
    pub start_pc: u16,
    pub length: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub index: u16,
}

/// A type annotation on a `Code` attribute. Only the target is decoded; the
/// type path, type index and element values are kept verbatim in `rest`.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeAnnotation {
    pub target_type: u8,
    pub target_info: TargetInfo,
    pub rest: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TargetInfo {
    Localvar { table: Vec<LocalVarTarget> },
    Catch { exception_table_index: u16 },
    Offset { offset: u16 },
    TypeArgument { offset: u16, type_argument_index: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalVarTarget {
    pub start_pc: u16,
    pub length: u16,
    pub index: u16,
}

// =============================================================================
// Reader
// =============================================================================

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    fn read_u1(&mut self) -> Result<u8, ClassFileError> {
        if self.remaining() < 1 {
            return Err(ClassFileError::UnexpectedEof);
        }
        let v = self.data[self.pos];
        self.pos += 1;
        Ok(v)
    }

    fn read_u2(&mut self) -> Result<u16, ClassFileError> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn read_u4(&mut self) -> Result<u32, ClassFileError> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], ClassFileError> {
        if self.remaining() < len {
            return Err(ClassFileError::UnexpectedEof);
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }
}

/// Where an attribute table sits; decides which attributes are decoded.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Scope {
    Class,
    Member,
    Code,
}

impl ClassFile {
    pub fn parse(bytes: &[u8]) -> Result<Self, ClassFileError> {
        let mut r = Reader::new(bytes);
        let magic = r.read_u4()?;
        if magic != MAGIC {
            return Err(ClassFileError::InvalidMagic(magic));
        }

        let minor_version = r.read_u2()?;
        let major_version = r.read_u2()?;

        let constant_pool = parse_constant_pool(&mut r)?;

        let access_flags = r.read_u2()?;
        let this_class = r.read_u2()?;
        let super_class = r.read_u2()?;

        let interfaces_count = r.read_u2()?;
        let mut interfaces = Vec::with_capacity(interfaces_count as usize);
        for _ in 0..interfaces_count {
            interfaces.push(r.read_u2()?);
        }

        let fields_count = r.read_u2()?;
        let mut fields = Vec::with_capacity(fields_count as usize);
        for _ in 0..fields_count {
            fields.push(parse_member(&mut r, &constant_pool)?);
        }

        let methods_count = r.read_u2()?;
        let mut methods = Vec::with_capacity(methods_count as usize);
        for _ in 0..methods_count {
            methods.push(parse_member(&mut r, &constant_pool)?);
        }

        let attributes = parse_attributes(&mut r, &constant_pool, Scope::Class)?;

        Ok(Self {
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    /// Internal name of this class, e.g. `com/example/Foo`.
    pub fn class_name(&self) -> Result<Cow<'_, str>, ClassFileError> {
        self.constant_pool.get_class_name(self.this_class)
    }
}

fn parse_constant_pool(r: &mut Reader) -> Result<ConstantPool, ClassFileError> {
    let count = r.read_u2()? as usize;
    let mut entries: Vec<Option<CpInfo>> = Vec::with_capacity(count.max(1));
    entries.push(None); // index 0 is unused

    while entries.len() < count {
        let tag = r.read_u1()?;
        let entry = match tag {
            1 => {
                let len = r.read_u2()? as usize;
                CpInfo::Utf8(r.read_bytes(len)?.to_vec())
            }
            3 => CpInfo::Integer(r.read_u4()? as i32),
            4 => CpInfo::Float(f32::from_bits(r.read_u4()?)),
            5 | 6 => {
                let high = r.read_u4()? as u64;
                let low = r.read_u4()? as u64;
                let bits = (high << 32) | low;
                let entry = if tag == 5 { CpInfo::Long(bits as i64) } else { CpInfo::Double(f64::from_bits(bits)) };
                entries.push(Some(entry));
                entries.push(None);
                continue;
            }
            7 => CpInfo::Class { name_index: r.read_u2()? },
            8 => CpInfo::String { string_index: r.read_u2()? },
            9 => CpInfo::Fieldref { class_index: r.read_u2()?, name_and_type_index: r.read_u2()? },
            10 => CpInfo::Methodref { class_index: r.read_u2()?, name_and_type_index: r.read_u2()? },
            11 => CpInfo::InterfaceMethodref { class_index: r.read_u2()?, name_and_type_index: r.read_u2()? },
            12 => CpInfo::NameAndType { name_index: r.read_u2()?, descriptor_index: r.read_u2()? },
            15 => CpInfo::MethodHandle { reference_kind: r.read_u1()?, reference_index: r.read_u2()? },
            16 => CpInfo::MethodType { descriptor_index: r.read_u2()? },
            17 => CpInfo::Dynamic { bootstrap_method_attr_index: r.read_u2()?, name_and_type_index: r.read_u2()? },
            18 => CpInfo::InvokeDynamic { bootstrap_method_attr_index: r.read_u2()?, name_and_type_index: r.read_u2()? },
            19 => CpInfo::Module { name_index: r.read_u2()? },
            20 => CpInfo::Package { name_index: r.read_u2()? },
            _ => return Err(ClassFileError::InvalidConstantPoolTag(tag)),
        };
        entries.push(Some(entry));
    }

    Ok(ConstantPool { entries })
}

fn parse_member(r: &mut Reader, cp: &ConstantPool) -> Result<MemberInfo, ClassFileError> {
    let access_flags = r.read_u2()?;
    let name_index = r.read_u2()?;
    let descriptor_index = r.read_u2()?;
    let attributes = parse_attributes(r, cp, Scope::Member)?;
    Ok(MemberInfo { access_flags, name_index, descriptor_index, attributes })
}

fn parse_attributes(r: &mut Reader, cp: &ConstantPool, scope: Scope) -> Result<Vec<AttributeInfo>, ClassFileError> {
    let count = r.read_u2()? as usize;
    let mut attrs = Vec::with_capacity(count);
    for _ in 0..count {
        let name_index = r.read_u2()?;
        let length = r.read_u4()? as usize;
        let info = r.read_bytes(length)?;
        let name = cp.get_utf8_bytes(name_index)?;
        let mut sub = Reader::new(info);

        let kind = match (scope, name) {
            (Scope::Member, b"Code") => Attribute::Code(parse_code_attribute(&mut sub, cp)?),
            (Scope::Code, b"StackMapTable") => Attribute::StackMapTable(parse_stack_map_table(&mut sub)?),
            (Scope::Code, b"LineNumberTable") => {
                let n = sub.read_u2()? as usize;
                let mut entries = Vec::with_capacity(n);
                for _ in 0..n {
                    entries.push(LineNumberEntry { start_pc: sub.read_u2()?, line_number: sub.read_u2()? });
                }
                Attribute::LineNumberTable(entries)
            }
            (Scope::Code, b"LocalVariableTable") => Attribute::LocalVariableTable(parse_local_variables(&mut sub)?),
            (Scope::Code, b"LocalVariableTypeTable") => Attribute::LocalVariableTypeTable(parse_local_variables(&mut sub)?),
            (Scope::Code, b"RuntimeVisibleTypeAnnotations") => {
                Attribute::RuntimeVisibleTypeAnnotations(parse_code_type_annotations(&mut sub)?)
            }
            (Scope::Code, b"RuntimeInvisibleTypeAnnotations") => {
                Attribute::RuntimeInvisibleTypeAnnotations(parse_code_type_annotations(&mut sub)?)
            }
            _ => Attribute::Raw(info.to_vec()),
        };
        attrs.push(AttributeInfo { name_index, kind });
    }
    Ok(attrs)
}

fn parse_code_attribute(r: &mut Reader, cp: &ConstantPool) -> Result<CodeAttribute, ClassFileError> {
    let max_stack = r.read_u2()?;
    let max_locals = r.read_u2()?;
    let code_length = r.read_u4()? as usize;
    let code = r.read_bytes(code_length)?.to_vec();
    let exception_table_length = r.read_u2()? as usize;
    let mut exception_table = Vec::with_capacity(exception_table_length);
    for _ in 0..exception_table_length {
        exception_table.push(ExceptionTableEntry {
            start_pc: r.read_u2()?,
            end_pc: r.read_u2()?,
            handler_pc: r.read_u2()?,
            catch_type: r.read_u2()?,
        });
    }
    let attributes = parse_attributes(r, cp, Scope::Code)?;
    Ok(CodeAttribute { max_stack, max_locals, code, exception_table, attributes })
}

fn parse_local_variables(r: &mut Reader) -> Result<Vec<LocalVariableEntry>, ClassFileError> {
    let n = r.read_u2()? as usize;
    let mut entries = Vec::with_capacity(n);
    for _ in 0..n {
        entries.push(LocalVariableEntry {
            start_pc: r.read_u2()?,
            length: r.read_u2()?,
            name_index: r.read_u2()?,
            descriptor_index: r.read_u2()?,
            index: r.read_u2()?,
        });
    }
    Ok(entries)
}

fn parse_stack_map_table(r: &mut Reader) -> Result<Vec<StackMapFrame>, ClassFileError> {
    let num = r.read_u2()? as usize;
    let mut entries = Vec::with_capacity(num);
    for _ in 0..num {
        let frame_type = r.read_u1()?;
        let frame = match frame_type {
            0..=63 => StackMapFrame::Same { offset_delta: frame_type as u16 },
            64..=127 => {
                let stack = parse_verification_type_info(r)?;
                StackMapFrame::SameLocals1StackItem { offset_delta: (frame_type - 64) as u16, stack }
            }
            247 => {
                let offset_delta = r.read_u2()?;
                let stack = parse_verification_type_info(r)?;
                StackMapFrame::SameLocals1StackItemExtended { offset_delta, stack }
            }
            248..=250 => {
                let offset_delta = r.read_u2()?;
                StackMapFrame::Chop { offset_delta, k: 251u8 - frame_type }
            }
            251 => StackMapFrame::SameExtended { offset_delta: r.read_u2()? },
            252..=254 => {
                let offset_delta = r.read_u2()?;
                let count = (frame_type - 251) as usize;
                let mut locals = Vec::with_capacity(count);
                for _ in 0..count { locals.push(parse_verification_type_info(r)?); }
                StackMapFrame::Append { offset_delta, locals }
            }
            255 => {
                let offset_delta = r.read_u2()?;
                let num_locals = r.read_u2()? as usize;
                let mut locals = Vec::with_capacity(num_locals);
                for _ in 0..num_locals { locals.push(parse_verification_type_info(r)?); }
                let num_stack = r.read_u2()? as usize;
                let mut stack = Vec::with_capacity(num_stack);
                for _ in 0..num_stack { stack.push(parse_verification_type_info(r)?); }
                StackMapFrame::Full { offset_delta, locals, stack }
            }
            _ => return Err(ClassFileError::InvalidAttribute("StackMapTable")),
        };
        entries.push(frame);
    }
    Ok(entries)
}

fn parse_verification_type_info(r: &mut Reader) -> Result<VerificationTypeInfo, ClassFileError> {
    let tag = r.read_u1()?;
    let info = match tag {
        0 => VerificationTypeInfo::Top,
        1 => VerificationTypeInfo::Integer,
        2 => VerificationTypeInfo::Float,
        3 => VerificationTypeInfo::Double,
        4 => VerificationTypeInfo::Long,
        5 => VerificationTypeInfo::Null,
        6 => VerificationTypeInfo::UninitializedThis,
        7 => VerificationTypeInfo::Object(r.read_u2()?),
        8 => VerificationTypeInfo::Uninitialized(r.read_u2()?),
        _ => return Err(ClassFileError::InvalidAttribute("StackMapTable")),
    };
    Ok(info)
}

fn parse_code_type_annotations(r: &mut Reader) -> Result<Vec<TypeAnnotation>, ClassFileError> {
    let num = r.read_u2()? as usize;
    let mut annotations = Vec::with_capacity(num);
    for _ in 0..num {
        let target_type = r.read_u1()?;
        let target_info = match target_type {
            0x40 | 0x41 => {
                let table_length = r.read_u2()? as usize;
                let mut table = Vec::with_capacity(table_length);
                for _ in 0..table_length {
                    table.push(LocalVarTarget { start_pc: r.read_u2()?, length: r.read_u2()?, index: r.read_u2()? });
                }
                TargetInfo::Localvar { table }
            }
            0x42 => TargetInfo::Catch { exception_table_index: r.read_u2()? },
            0x43..=0x46 => TargetInfo::Offset { offset: r.read_u2()? },
            0x47..=0x4B => {
                let offset = r.read_u2()?;
                let type_argument_index = r.read_u1()?;
                TargetInfo::TypeArgument { offset, type_argument_index }
            }
            _ => return Err(ClassFileError::InvalidAttribute("RuntimeTypeAnnotations")),
        };

        let start = r.pos;
        let path_length = r.read_u1()? as usize;
        r.read_bytes(path_length * 2)?;
        skip_annotation(r)?;
        let rest = r.data[start..r.pos].to_vec();

        annotations.push(TypeAnnotation { target_type, target_info, rest });
    }
    Ok(annotations)
}

/// Skips `type_index` plus the element-value pairs of one annotation.
fn skip_annotation(r: &mut Reader) -> Result<(), ClassFileError> {
    r.read_u2()?;
    let num_pairs = r.read_u2()?;
    for _ in 0..num_pairs {
        r.read_u2()?;
        skip_element_value(r)?;
    }
    Ok(())
}

fn skip_element_value(r: &mut Reader) -> Result<(), ClassFileError> {
    match r.read_u1()? {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' | b'c' => {
            r.read_u2()?;
        }
        b'e' => {
            r.read_u4()?;
        }
        b'@' => skip_annotation(r)?,
        b'[' => {
            let num_values = r.read_u2()?;
            for _ in 0..num_values {
                skip_element_value(r)?;
            }
        }
        _ => return Err(ClassFileError::InvalidAttribute("annotation")),
    }
    Ok(())
}

// =============================================================================
// Writer
// =============================================================================

#[derive(Default)]
struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn u1(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn u2(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn u4(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn bytes(&mut self, b: &[u8]) {
        self.buf.extend_from_slice(b);
    }

    fn len_u2(&mut self, what: &'static str, len: usize) -> Result<(), ClassFileError> {
        let v = u16::try_from(len).map_err(|_| ClassFileError::TooLarge { what, len })?;
        self.u2(v);
        Ok(())
    }
}

impl ClassFile {
    /// Serializes the class back to class-file bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ClassFileError> {
        let mut w = Writer::default();
        w.u4(MAGIC);
        w.u2(self.minor_version);
        w.u2(self.major_version);
        write_constant_pool(&mut w, &self.constant_pool)?;
        w.u2(self.access_flags);
        w.u2(self.this_class);
        w.u2(self.super_class);
        w.len_u2("interfaces", self.interfaces.len())?;
        for &i in &self.interfaces {
            w.u2(i);
        }
        for members in [&self.fields, &self.methods] {
            w.len_u2("members", members.len())?;
            for m in members {
                w.u2(m.access_flags);
                w.u2(m.name_index);
                w.u2(m.descriptor_index);
                write_attributes(&mut w, &m.attributes)?;
            }
        }
        write_attributes(&mut w, &self.attributes)?;
        Ok(w.buf)
    }
}

fn write_constant_pool(w: &mut Writer, cp: &ConstantPool) -> Result<(), ClassFileError> {
    w.u2(cp.count());
    for entry in cp.entries.iter().flatten() {
        match entry {
            CpInfo::Utf8(bytes) => {
                w.u1(1);
                w.len_u2("Utf8 constant", bytes.len())?;
                w.bytes(bytes);
            }
            CpInfo::Integer(v) => { w.u1(3); w.u4(*v as u32); }
            CpInfo::Float(v) => { w.u1(4); w.u4(v.to_bits()); }
            CpInfo::Long(v) => { w.u1(5); w.bytes(&v.to_be_bytes()); }
            CpInfo::Double(v) => { w.u1(6); w.bytes(&v.to_bits().to_be_bytes()); }
            CpInfo::Class { name_index } => { w.u1(7); w.u2(*name_index); }
            CpInfo::String { string_index } => { w.u1(8); w.u2(*string_index); }
            CpInfo::Fieldref { class_index, name_and_type_index } => { w.u1(9); w.u2(*class_index); w.u2(*name_and_type_index); }
            CpInfo::Methodref { class_index, name_and_type_index } => { w.u1(10); w.u2(*class_index); w.u2(*name_and_type_index); }
            CpInfo::InterfaceMethodref { class_index, name_and_type_index } => { w.u1(11); w.u2(*class_index); w.u2(*name_and_type_index); }
            CpInfo::NameAndType { name_index, descriptor_index } => { w.u1(12); w.u2(*name_index); w.u2(*descriptor_index); }
            CpInfo::MethodHandle { reference_kind, reference_index } => { w.u1(15); w.u1(*reference_kind); w.u2(*reference_index); }
            CpInfo::MethodType { descriptor_index } => { w.u1(16); w.u2(*descriptor_index); }
            CpInfo::Dynamic { bootstrap_method_attr_index, name_and_type_index } => { w.u1(17); w.u2(*bootstrap_method_attr_index); w.u2(*name_and_type_index); }
            CpInfo::InvokeDynamic { bootstrap_method_attr_index, name_and_type_index } => { w.u1(18); w.u2(*bootstrap_method_attr_index); w.u2(*name_and_type_index); }
            CpInfo::Module { name_index } => { w.u1(19); w.u2(*name_index); }
            CpInfo::Package { name_index } => { w.u1(20); w.u2(*name_index); }
        }
    }
    Ok(())
}

fn write_attributes(w: &mut Writer, attrs: &[AttributeInfo]) -> Result<(), ClassFileError> {
    w.len_u2("attributes", attrs.len())?;
    for attr in attrs {
        let mut body = Writer::default();
        write_attribute_body(&mut body, &attr.kind)?;
        w.u2(attr.name_index);
        let len = u32::try_from(body.buf.len())
            .map_err(|_| ClassFileError::TooLarge { what: "attribute", len: body.buf.len() })?;
        w.u4(len);
        w.bytes(&body.buf);
    }
    Ok(())
}

fn write_attribute_body(w: &mut Writer, kind: &Attribute) -> Result<(), ClassFileError> {
    match kind {
        Attribute::Raw(bytes) => w.bytes(bytes),
        Attribute::Code(code) => {
            w.u2(code.max_stack);
            w.u2(code.max_locals);
            if code.code.is_empty() || code.code.len() > u16::MAX as usize {
                return Err(ClassFileError::TooLarge { what: "code", len: code.code.len() });
            }
            w.u4(code.code.len() as u32);
            w.bytes(&code.code);
            w.len_u2("exception table", code.exception_table.len())?;
            for e in &code.exception_table {
                w.u2(e.start_pc);
                w.u2(e.end_pc);
                w.u2(e.handler_pc);
                w.u2(e.catch_type);
            }
            write_attributes(w, &code.attributes)?;
        }
        Attribute::StackMapTable(frames) => {
            w.len_u2("StackMapTable", frames.len())?;
            for frame in frames {
                write_frame(w, frame);
            }
        }
        Attribute::LineNumberTable(entries) => {
            w.len_u2("LineNumberTable", entries.len())?;
            for e in entries {
                w.u2(e.start_pc);
                w.u2(e.line_number);
            }
        }
        Attribute::LocalVariableTable(entries) | Attribute::LocalVariableTypeTable(entries) => {
            w.len_u2("LocalVariableTable", entries.len())?;
            for e in entries {
                w.u2(e.start_pc);
                w.u2(e.length);
                w.u2(e.name_index);
                w.u2(e.descriptor_index);
                w.u2(e.index);
            }
        }
        Attribute::RuntimeVisibleTypeAnnotations(annotations)
        | Attribute::RuntimeInvisibleTypeAnnotations(annotations) => {
            w.len_u2("type annotations", annotations.len())?;
            for a in annotations {
                w.u1(a.target_type);
                match &a.target_info {
                    TargetInfo::Localvar { table } => {
                        w.len_u2("localvar target", table.len())?;
                        for t in table {
                            w.u2(t.start_pc);
                            w.u2(t.length);
                            w.u2(t.index);
                        }
                    }
                    TargetInfo::Catch { exception_table_index } => w.u2(*exception_table_index),
                    TargetInfo::Offset { offset } => w.u2(*offset),
                    TargetInfo::TypeArgument { offset, type_argument_index } => {
                        w.u2(*offset);
                        w.u1(*type_argument_index);
                    }
                }
                w.bytes(&a.rest);
            }
        }
    }
    Ok(())
}

fn write_frame(w: &mut Writer, frame: &StackMapFrame) {
    match frame {
        StackMapFrame::Same { offset_delta } if *offset_delta <= 63 => w.u1(*offset_delta as u8),
        StackMapFrame::Same { offset_delta } | StackMapFrame::SameExtended { offset_delta } => {
            w.u1(251);
            w.u2(*offset_delta);
        }
        StackMapFrame::SameLocals1StackItem { offset_delta, stack } if *offset_delta <= 63 => {
            w.u1(64 + *offset_delta as u8);
            write_verification_type(w, stack);
        }
        StackMapFrame::SameLocals1StackItem { offset_delta, stack }
        | StackMapFrame::SameLocals1StackItemExtended { offset_delta, stack } => {
            w.u1(247);
            w.u2(*offset_delta);
            write_verification_type(w, stack);
        }
        StackMapFrame::Chop { offset_delta, k } => {
            w.u1(251 - *k);
            w.u2(*offset_delta);
        }
        StackMapFrame::Append { offset_delta, locals } => {
            w.u1(251 + locals.len() as u8);
            w.u2(*offset_delta);
            for l in locals {
                write_verification_type(w, l);
            }
        }
        StackMapFrame::Full { offset_delta, locals, stack } => {
            w.u1(255);
            w.u2(*offset_delta);
            w.u2(locals.len() as u16);
            for l in locals {
                write_verification_type(w, l);
            }
            w.u2(stack.len() as u16);
            for s in stack {
                write_verification_type(w, s);
            }
        }
    }
}

fn write_verification_type(w: &mut Writer, info: &VerificationTypeInfo) {
    match info {
        VerificationTypeInfo::Top => w.u1(0),
        VerificationTypeInfo::Integer => w.u1(1),
        VerificationTypeInfo::Float => w.u1(2),
        VerificationTypeInfo::Double => w.u1(3),
        VerificationTypeInfo::Long => w.u1(4),
        VerificationTypeInfo::Null => w.u1(5),
        VerificationTypeInfo::UninitializedThis => w.u1(6),
        VerificationTypeInfo::Object(index) => {
            w.u1(7);
            w.u2(*index);
        }
        VerificationTypeInfo::Uninitialized(offset) => {
            w.u1(8);
            w.u2(*offset);
        }
    }
}
