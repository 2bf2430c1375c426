//! Method-entry patching.
//!
//! For every targeted method the rewriter prepends a straight-line prologue
//! that reports the call to [`PatchedCallHook`](crate::hook_class):
//!
//! ```text
//! aconst_null | aload_0          receiver (null for static methods)
//! ldc_w "SimpleName"
//! ldc_w "methodName"
//! <n>; anewarray Object
//! dup; <i>; xload slot; [T.valueOf]; aastore     (once per parameter)
//! invokestatic PatchedCallHook.handlePatchedCall
//! nop*                           pad to a multiple of four
//! ```
//!
//! The original body follows untouched. Padding keeps `tableswitch` and
//! `lookupswitch` operands aligned, and every table that stores a code
//! offset outside the instruction stream is shifted by the prologue length.

use crate::classfile::{
    Attribute, ClassFile, ClassFileError, CodeAttribute, ConstantPool, MemberInfo, StackMapFrame, TargetInfo,
    VerificationTypeInfo, ACC_ABSTRACT, ACC_ANNOTATION, ACC_INTERFACE, ACC_MODULE, ACC_NATIVE,
};
use crate::descriptor::{parse_method_descriptor, FieldType, MethodDescriptor};
use crate::error::RewriteError;
use crate::filter::is_candidate;
use crate::hook_class::{HOOK_CLASS, HOOK_DESCRIPTOR, HOOK_METHOD};
use crate::targets::TargetSpec;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

const MAX_CODE_LENGTH: usize = u16::MAX as usize;

mod op {
    pub const NOP: u8 = 0x00;
    pub const ACONST_NULL: u8 = 0x01;
    pub const ICONST_0: u8 = 0x03;
    pub const BIPUSH: u8 = 0x10;
    pub const SIPUSH: u8 = 0x11;
    pub const LDC_W: u8 = 0x13;
    pub const ALOAD_0: u8 = 0x2a;
    pub const AASTORE: u8 = 0x53;
    pub const DUP: u8 = 0x59;
    pub const INVOKESTATIC: u8 = 0xb8;
    pub const ANEWARRAY: u8 = 0xbd;
    pub const WIDE: u8 = 0xc4;
}

/// Why a class was returned unmodified.
#[derive(Debug)]
pub enum Unchanged {
    /// Blocked namespace.
    Filtered,
    /// No configured target for this simple name.
    NotTargeted,
    /// Interface, annotation or module descriptor.
    NoBodies,
    /// The bytes could not be parsed.
    Malformed(ClassFileError),
    /// Parsed, but no method matched or every match failed.
    NoMatch,
    /// Methods were patched but the class could not be written back.
    Serialize(ClassFileError),
}

impl fmt::Display for Unchanged {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unchanged::Filtered => f.write_str("filtered namespace"),
            Unchanged::NotTargeted => f.write_str("not a target type"),
            Unchanged::NoBodies => f.write_str("interface, annotation or module"),
            Unchanged::Malformed(e) => write!(f, "unparseable class: {}", e),
            Unchanged::NoMatch => f.write_str("no matching method"),
            Unchanged::Serialize(e) => write!(f, "could not write class: {}", e),
        }
    }
}

#[derive(Debug)]
pub enum RewriteOutcome {
    Unchanged(Unchanged),
    Rewritten {
        bytes: Vec<u8>,
        /// Names of the patched methods, in declaration order.
        patched: Vec<String>,
    },
}

impl RewriteOutcome {
    pub fn is_rewritten(&self) -> bool {
        matches!(self, RewriteOutcome::Rewritten { .. })
    }

    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            RewriteOutcome::Rewritten { bytes, .. } => Some(bytes),
            RewriteOutcome::Unchanged(_) => None,
        }
    }
}

/// Patches targeted methods in class files handed over by the VM.
///
/// Stateless apart from the shared target set, so one instance serves every
/// thread that loads classes.
#[derive(Debug, Clone)]
pub struct Rewriter {
    targets: Arc<TargetSpec>,
}

impl Rewriter {
    pub fn new(targets: Arc<TargetSpec>) -> Self {
        Self { targets }
    }

    pub fn targets(&self) -> &TargetSpec {
        &self.targets
    }

    /// Rewrites `bytes`, the class file of `name` (internal or binary form).
    ///
    /// Always starts from the given bytes, so retransforming an already
    /// patched class yields the same result as the first load.
    pub fn transform(&self, name: &str, bytes: &[u8]) -> RewriteOutcome {
        if !is_candidate(name) {
            return RewriteOutcome::Unchanged(Unchanged::Filtered);
        }
        let simple = simple_name(name);
        if !self.targets.wants_type(simple) {
            return RewriteOutcome::Unchanged(Unchanged::NotTargeted);
        }

        let mut class = match ClassFile::parse(bytes) {
            Ok(c) => c,
            Err(e) => {
                warn!(class = name, error = %e, "cannot parse class, leaving it unchanged");
                return RewriteOutcome::Unchanged(Unchanged::Malformed(e));
            }
        };
        if class.access_flags & (ACC_INTERFACE | ACC_ANNOTATION | ACC_MODULE) != 0 {
            return RewriteOutcome::Unchanged(Unchanged::NoBodies);
        }

        let ClassFile { constant_pool, methods, .. } = &mut class;
        let mut patched = Vec::new();
        for method in methods.iter_mut() {
            let Some(method_name) = self.wanted_method(constant_pool, method, simple) else {
                continue;
            };
            match patch_method(constant_pool, method, simple, &method_name) {
                Ok(()) => patched.push(method_name),
                Err(e) => warn!(class = name, method = %method_name, error = %e, "failed to instrument method"),
            }
        }

        if patched.is_empty() {
            return RewriteOutcome::Unchanged(Unchanged::NoMatch);
        }
        match class.to_bytes() {
            Ok(bytes) => {
                debug!(class = name, methods = ?patched, "rewrote class");
                RewriteOutcome::Rewritten { bytes, patched }
            }
            Err(e) => {
                warn!(class = name, error = %e, "cannot write instrumented class, leaving it unchanged");
                RewriteOutcome::Unchanged(Unchanged::Serialize(e))
            }
        }
    }

    /// The method's name if it is an ordinary method with a body that the
    /// targets select.
    fn wanted_method(&self, cp: &ConstantPool, method: &MemberInfo, simple: &str) -> Option<String> {
        if method.access_flags & (ACC_ABSTRACT | ACC_NATIVE) != 0 {
            return None;
        }
        let name = cp.get_utf8(method.name_index).ok()?;
        if name == "<init>" || name == "<clinit>" {
            return None;
        }
        self.targets.matches(simple, &name).then(|| name.into_owned())
    }
}

/// Text after the last `/` or `.`; nested classes keep `Outer$Inner`.
pub fn simple_name(name: &str) -> &str {
    match name.rfind(['/', '.']) {
        Some(i) => &name[i + 1..],
        None => name,
    }
}

fn patch_method(
    cp: &mut ConstantPool,
    method: &mut MemberInfo,
    simple: &str,
    method_name: &str,
) -> Result<(), RewriteError> {
    let descriptor = parse_method_descriptor(&cp.get_utf8(method.descriptor_index)?)?;
    let is_static = method.is_static();
    let code = method.code().ok_or(RewriteError::MissingCode)?;
    if code.code.len() > MAX_CODE_LENGTH {
        return Err(RewriteError::CodeTooLarge(code.code.len()));
    }

    let prologue = build_prologue(cp, simple, method_name, is_static, &descriptor)?;
    let new_len = prologue.code.len() + code.code.len();
    if new_len > MAX_CODE_LENGTH {
        return Err(RewriteError::CodeTooLarge(new_len));
    }

    let mut patched = code.clone();
    let shift = prologue.code.len() as u16;
    shift_offsets(&mut patched, shift)?;
    patched.code = prologue.code;
    patched.code.extend_from_slice(&code.code);
    patched.max_stack = patched.max_stack.max(prologue.max_stack);

    *method.code_mut().ok_or(RewriteError::MissingCode)? = patched;
    Ok(())
}

/// Instructions spliced in front of a method body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prologue {
    /// Always a multiple of four bytes long.
    pub code: Vec<u8>,
    /// Operand stack depth the prologue needs.
    pub max_stack: u16,
}

/// Emits the hook call for one method, adding the constants it references
/// to `cp`.
pub fn build_prologue(
    cp: &mut ConstantPool,
    simple: &str,
    method_name: &str,
    is_static: bool,
    descriptor: &MethodDescriptor,
) -> Result<Prologue, RewriteError> {
    let params = &descriptor.params;
    if params.len() > 255 {
        return Err(RewriteError::TooManyParameters(params.len()));
    }

    let hook = cp.add_methodref(HOOK_CLASS, HOOK_METHOD, HOOK_DESCRIPTOR)?;
    let type_string = cp.add_string(simple)?;
    let method_string = cp.add_string(method_name)?;
    let object_class = cp.add_class("java/lang/Object")?;

    let mut code = Vec::with_capacity(16 + params.len() * 8);
    code.push(if is_static { op::ACONST_NULL } else { op::ALOAD_0 });
    emit_u2(&mut code, op::LDC_W, type_string);
    emit_u2(&mut code, op::LDC_W, method_string);
    push_int(&mut code, params.len() as i32);
    emit_u2(&mut code, op::ANEWARRAY, object_class);

    let mut slot: u16 = if is_static { 0 } else { 1 };
    let mut widest = 0;
    for (i, param) in params.iter().enumerate() {
        code.push(op::DUP);
        push_int(&mut code, i as i32);
        emit_load(&mut code, param, slot);
        if let Some((owner, desc)) = param.boxing() {
            let value_of = cp.add_methodref(owner, "valueOf", desc)?;
            emit_u2(&mut code, op::INVOKESTATIC, value_of);
        }
        code.push(op::AASTORE);
        slot += param.slot_size();
        widest = widest.max(param.stack_size());
    }

    emit_u2(&mut code, op::INVOKESTATIC, hook);
    while code.len() % 4 != 0 {
        code.push(op::NOP);
    }

    // receiver, two strings and the array; then dup, index and one value
    let max_stack = if params.is_empty() { 4 } else { 4 + 2 + widest };
    Ok(Prologue { code, max_stack })
}

fn emit_u2(code: &mut Vec<u8>, opcode: u8, operand: u16) {
    code.push(opcode);
    code.extend_from_slice(&operand.to_be_bytes());
}

fn push_int(code: &mut Vec<u8>, v: i32) {
    match v {
        -1..=5 => code.push((op::ICONST_0 as i32 + v) as u8),
        -128..=127 => code.extend_from_slice(&[op::BIPUSH, v as i8 as u8]),
        _ => emit_u2(code, op::SIPUSH, v as i16 as u16),
    }
}

fn emit_load(code: &mut Vec<u8>, ty: &FieldType, slot: u16) {
    let (short_base, general) = ty.load_opcodes();
    match slot {
        0..=3 => code.push(short_base + slot as u8),
        4..=255 => code.extend_from_slice(&[general, slot as u8]),
        _ => {
            code.extend_from_slice(&[op::WIDE, general]);
            code.extend_from_slice(&slot.to_be_bytes());
        }
    }
}

fn bump(offset: &mut u16, by: u16) -> Result<(), RewriteError> {
    *offset = offset.checked_add(by).ok_or(RewriteError::OffsetOutOfRange(*offset))?;
    Ok(())
}

/// Shifts every stored code offset in `code` by `by` bytes.
///
/// Offset zero in the line number and local variable tables stays at zero so
/// the prologue is attributed to the method's first line and parameters stay
/// in scope for it; local variable ranges starting there grow instead.
fn shift_offsets(code: &mut CodeAttribute, by: u16) -> Result<(), RewriteError> {
    for entry in &mut code.exception_table {
        bump(&mut entry.start_pc, by)?;
        bump(&mut entry.end_pc, by)?;
        bump(&mut entry.handler_pc, by)?;
    }

    for attr in &mut code.attributes {
        match &mut attr.kind {
            Attribute::LineNumberTable(entries) => {
                for e in entries.iter_mut().filter(|e| e.start_pc != 0) {
                    bump(&mut e.start_pc, by)?;
                }
            }
            Attribute::LocalVariableTable(entries) | Attribute::LocalVariableTypeTable(entries) => {
                for e in entries {
                    shift_range(&mut e.start_pc, &mut e.length, by)?;
                }
            }
            Attribute::StackMapTable(frames) => shift_stack_map(frames, by)?,
            Attribute::RuntimeVisibleTypeAnnotations(annotations)
            | Attribute::RuntimeInvisibleTypeAnnotations(annotations) => {
                for a in annotations {
                    match &mut a.target_info {
                        TargetInfo::Offset { offset } | TargetInfo::TypeArgument { offset, .. } => bump(offset, by)?,
                        TargetInfo::Localvar { table } => {
                            for t in table {
                                shift_range(&mut t.start_pc, &mut t.length, by)?;
                            }
                        }
                        TargetInfo::Catch { .. } => {}
                    }
                }
            }
            Attribute::Code(_) | Attribute::Raw(_) => {}
        }
    }
    Ok(())
}

fn shift_range(start_pc: &mut u16, length: &mut u16, by: u16) -> Result<(), RewriteError> {
    if *start_pc == 0 {
        bump(length, by)
    } else {
        bump(start_pc, by)
    }
}

/// Only the first frame's delta is absolute; later frames are relative to
/// their predecessor and move with it.
fn shift_stack_map(frames: &mut [StackMapFrame], by: u16) -> Result<(), RewriteError> {
    if let Some(first) = frames.first_mut() {
        bump(first.offset_delta_mut(), by)?;
    }
    for frame in frames {
        for ty in frame.types_mut() {
            if let VerificationTypeInfo::Uninitialized(offset) = ty {
                bump(offset, by)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prologue_for(desc: &str, is_static: bool) -> Prologue {
        let mut cp = ConstantPool::new();
        build_prologue(&mut cp, "T", "m", is_static, &parse_method_descriptor(desc).unwrap()).unwrap()
    }

    #[test]
    fn prologue_is_padded() {
        for desc in ["()V", "(I)V", "(IJ)V", "(Ljava/lang/String;DZ)I"] {
            for is_static in [true, false] {
                assert_eq!(prologue_for(desc, is_static).code.len() % 4, 0, "{desc}");
            }
        }
    }

    #[test]
    fn max_stack_depends_on_widest_parameter() {
        assert_eq!(prologue_for("()V", true).max_stack, 4);
        assert_eq!(prologue_for("(ILjava/lang/Object;)V", false).max_stack, 7);
        assert_eq!(prologue_for("(IJ)V", false).max_stack, 8);
        assert_eq!(prologue_for("(D)V", true).max_stack, 8);
    }

    #[test]
    fn int_pushes_use_compact_forms() {
        let mut code = Vec::new();
        push_int(&mut code, 0);
        push_int(&mut code, 5);
        push_int(&mut code, 6);
        push_int(&mut code, 200);
        assert_eq!(code, vec![0x03, 0x08, op::BIPUSH, 6, op::SIPUSH, 0, 200]);
    }

    #[test]
    fn loads_pick_short_general_and_wide_forms() {
        let mut code = Vec::new();
        emit_load(&mut code, &FieldType::Int, 2);
        emit_load(&mut code, &FieldType::Long, 7);
        emit_load(&mut code, &FieldType::Object("x/Y".into()), 300);
        assert_eq!(code, vec![0x1c, 0x16, 7, op::WIDE, 0x19, 0x01, 0x2c]);
    }

    #[test]
    fn simple_names() {
        assert_eq!(simple_name("com/example/PlayerList"), "PlayerList");
        assert_eq!(simple_name("com.example.Outer$Inner"), "Outer$Inner");
        assert_eq!(simple_name("Bare"), "Bare");
    }
}
