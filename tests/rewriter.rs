mod common;

use call_logger::classfile::{
    Attribute, ClassFile, ConstantPool, CpInfo, MemberInfo, StackMapFrame, TargetInfo, VerificationTypeInfo,
};
use call_logger::hook_class::{HOOK_CLASS, HOOK_DESCRIPTOR, HOOK_METHOD};
use call_logger::rewriter::{RewriteOutcome, Rewriter, Unchanged};
use call_logger::targets::TargetSpec;
use common::*;
use std::sync::Arc;

fn rewriter(targets: &str) -> Rewriter {
    Rewriter::new(Arc::new(TargetSpec::parse(Some(targets))))
}

fn rewritten(outcome: RewriteOutcome) -> (ClassFile, Vec<String>) {
    match outcome {
        RewriteOutcome::Rewritten { bytes, patched } => (ClassFile::parse(&bytes).expect("rewritten class parses"), patched),
        RewriteOutcome::Unchanged(reason) => panic!("expected a rewrite, got {reason}"),
    }
}

fn method<'a>(class: &'a ClassFile, name: &str) -> &'a MemberInfo {
    class
        .methods
        .iter()
        .find(|m| class.constant_pool.get_utf8(m.name_index).unwrap() == name)
        .expect("method present")
}

fn u2_at(code: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([code[at], code[at + 1]])
}

fn string_constant(cp: &ConstantPool, index: u16) -> String {
    match cp.get(index).unwrap() {
        CpInfo::String { string_index } => cp.get_utf8(*string_index).unwrap().to_string(),
        other => panic!("not a string: {other:?}"),
    }
}

/// `(owner, name, descriptor)` of a Methodref constant.
fn methodref(cp: &ConstantPool, index: u16) -> (String, String, String) {
    match cp.get(index).unwrap() {
        CpInfo::Methodref { class_index, name_and_type_index } => match cp.get(*name_and_type_index).unwrap() {
            CpInfo::NameAndType { name_index, descriptor_index } => (
                cp.get_class_name(*class_index).unwrap().to_string(),
                cp.get_utf8(*name_index).unwrap().to_string(),
                cp.get_utf8(*descriptor_index).unwrap().to_string(),
            ),
            other => panic!("not a NameAndType: {other:?}"),
        },
        other => panic!("not a Methodref: {other:?}"),
    }
}

fn hook_ref() -> (String, String, String) {
    (HOOK_CLASS.to_string(), HOOK_METHOD.to_string(), HOOK_DESCRIPTOR.to_string())
}

const BODY: [u8; 3] = [0x00, 0x00, 0xb1];

#[test]
fn instance_method_gets_receiver_names_and_boxed_argument() {
    let bytes = build_class(
        ACC_PUBLIC,
        "com/example/PlayerList",
        &[MethodSpec::new(ACC_PUBLIC, "addOp", "(I)V", BODY.to_vec())],
    );
    let (class, patched) = rewritten(rewriter("PlayerList:addOp").transform("com/example/PlayerList", &bytes));
    assert_eq!(patched, vec!["addOp".to_string()]);

    let cp = &class.constant_pool;
    let code = method(&class, "addOp").code().unwrap();
    let c = &code.code;

    assert_eq!(c.len(), 24 + BODY.len());
    assert_eq!(&c[24..], &BODY);

    assert_eq!(c[0], 0x2a); // aload_0
    assert_eq!(c[1], 0x13);
    assert_eq!(string_constant(cp, u2_at(c, 2)), "PlayerList");
    assert_eq!(c[4], 0x13);
    assert_eq!(string_constant(cp, u2_at(c, 5)), "addOp");
    assert_eq!(c[7], 0x04); // iconst_1
    assert_eq!(c[8], 0xbd);
    assert_eq!(cp.get_class_name(u2_at(c, 9)).unwrap(), "java/lang/Object");
    assert_eq!(&c[11..14], &[0x59, 0x03, 0x1b]); // dup, iconst_0, iload_1
    assert_eq!(c[14], 0xb8);
    assert_eq!(
        methodref(cp, u2_at(c, 15)),
        ("java/lang/Integer".to_string(), "valueOf".to_string(), "(I)Ljava/lang/Integer;".to_string())
    );
    assert_eq!(c[17], 0x53); // aastore
    assert_eq!(c[18], 0xb8);
    assert_eq!(methodref(cp, u2_at(c, 19)), hook_ref());
    assert_eq!(&c[21..24], &[0, 0, 0]);

    assert_eq!(code.max_stack, 7);
}

#[test]
fn static_method_passes_null_and_loads_wide_values() {
    let bytes = build_class(
        ACC_PUBLIC,
        "Util",
        &[MethodSpec::new(ACC_PUBLIC | ACC_STATIC, "op", "(JLjava/lang/String;)V", BODY.to_vec())],
    );
    let (class, _) = rewritten(rewriter("Util:op").transform("Util", &bytes));
    let cp = &class.constant_pool;
    let code = method(&class, "op").code().unwrap();
    let c = &code.code;

    assert_eq!(c[0], 0x01); // aconst_null
    assert_eq!(c[7], 0x05); // iconst_2
    // dup, iconst_0, lload_0, Long.valueOf, aastore
    assert_eq!(&c[11..14], &[0x59, 0x03, 0x1e]);
    assert_eq!(methodref(cp, u2_at(c, 15)).0, "java/lang/Long");
    assert_eq!(c[17], 0x53);
    // dup, iconst_1, aload_2, aastore
    assert_eq!(&c[18..22], &[0x59, 0x04, 0x2c, 0x53]);
    assert_eq!(c[22], 0xb8);
    assert_eq!(methodref(cp, u2_at(c, 23)), hook_ref());
    assert_eq!(c.len() % 4, BODY.len() % 4);
    assert_eq!(&c[c.len() - BODY.len()..], &BODY);
    assert_eq!(code.max_stack, 8);
}

#[test]
fn high_parameter_slots_use_wide_loads() {
    let descriptor: &'static str = format!("({})V", "J".repeat(130)).leak();
    let bytes = build_class(ACC_PUBLIC, "Big", &[MethodSpec::new(ACC_PUBLIC | ACC_STATIC, "op", descriptor, BODY.to_vec())]);
    let (class, _) = rewritten(rewriter("Big:op").transform("Big", &bytes));
    let c = &method(&class, "op").code().unwrap().code;
    // parameter 128 lives in slot 256
    assert!(c.windows(4).any(|w| w == [0xc4, 0x16, 0x01, 0x00]));
}

#[test]
fn other_methods_constructors_and_bodiless_methods_are_untouched() {
    let bytes = build_class(
        ACC_PUBLIC | ACC_ABSTRACT,
        "PlayerList",
        &[
            MethodSpec::new(ACC_PUBLIC, "<init>", "()V", BODY.to_vec()),
            MethodSpec::new(ACC_PUBLIC, "size", "()I", vec![0x03, 0xac]),
            MethodSpec::bodiless(ACC_PUBLIC | ACC_ABSTRACT, "op", "()V"),
            MethodSpec::bodiless(ACC_PUBLIC | ACC_NATIVE, "addOp", "()V"),
            MethodSpec::new(ACC_PUBLIC, "addOp", "(Ljava/lang/Object;)V", BODY.to_vec()),
        ],
    );
    let spec = rewriter("PlayerList:<init>|size2|op|addOp");
    let (class, patched) = rewritten(spec.transform("PlayerList", &bytes));
    assert_eq!(patched, vec!["addOp".to_string()]);

    let original = ClassFile::parse(&bytes).unwrap();
    for i in 0..4 {
        assert_eq!(class.methods[i], original.methods[i], "method {i}");
    }
    assert_ne!(class.methods[4], original.methods[4]);
}

fn shifted_class() -> Vec<u8> {
    let mut lnt = Vec::new();
    for v in [2u16, 0, 5, 6, 7] {
        u2(&mut lnt, v);
    }
    let mut lvt = Vec::new();
    for v in [2u16, 0, 10, 1, 1, 0, 6, 4, 1, 1, 1] {
        u2(&mut lvt, v);
    }
    // same(6); same_locals_1_stack_item(1, Uninitialized(2))
    let smt = vec![0, 2, 6, 65, 8, 0, 2];
    // instanceof at 3; catch target 0
    let rvta = vec![0, 2, 0x43, 0, 3, 0, 0, 1, 0, 0, 0x42, 0, 0, 0, 0, 1, 0, 0];

    let code = CodeSpec {
        max_stack: 1,
        max_locals: 2,
        code: vec![0x00; 9].into_iter().chain([0xb1]).collect(),
        exceptions: vec![(0, 6, 7, 0)],
        attributes: vec![
            ("LineNumberTable", lnt),
            ("LocalVariableTable", lvt),
            ("StackMapTable", smt),
            ("RuntimeInvisibleTypeAnnotations", rvta),
        ],
    };
    build_class(ACC_PUBLIC, "p/Shift", &[MethodSpec { access: ACC_PUBLIC | ACC_STATIC, name: "op", descriptor: "()V", code: Some(code) }])
}

#[test]
fn offsets_outside_the_instruction_stream_are_shifted() {
    let (class, _) = rewritten(rewriter("Shift:op").transform("p/Shift", &shifted_class()));
    let code = method(&class, "op").code().unwrap();
    // no parameters: 14 bytes of prologue padded to 16
    let n = 16;
    assert_eq!(code.code.len(), n + 10);
    assert_eq!(code.max_stack, 4);

    let e = code.exception_table[0];
    assert_eq!((e.start_pc, e.end_pc, e.handler_pc), (n as u16, 6 + n as u16, 7 + n as u16));

    for attr in &code.attributes {
        match &attr.kind {
            Attribute::LineNumberTable(entries) => {
                assert_eq!((entries[0].start_pc, entries[0].line_number), (0, 5));
                assert_eq!((entries[1].start_pc, entries[1].line_number), (6 + n as u16, 7));
            }
            Attribute::LocalVariableTable(entries) => {
                assert_eq!((entries[0].start_pc, entries[0].length), (0, 10 + n as u16));
                assert_eq!((entries[1].start_pc, entries[1].length), (6 + n as u16, 4));
            }
            Attribute::StackMapTable(frames) => {
                assert_eq!(frames[0].offset_delta(), 6 + n as u16);
                assert_eq!(
                    frames[1],
                    StackMapFrame::SameLocals1StackItem {
                        offset_delta: 1,
                        stack: VerificationTypeInfo::Uninitialized(2 + n as u16)
                    }
                );
            }
            Attribute::RuntimeInvisibleTypeAnnotations(annotations) => {
                assert_eq!(annotations[0].target_info, TargetInfo::Offset { offset: 3 + n as u16 });
                assert_eq!(annotations[1].target_info, TargetInfo::Catch { exception_table_index: 0 });
            }
            other => panic!("unexpected attribute {other:?}"),
        }
    }
}

#[test]
fn first_frame_switches_to_extended_encoding() {
    let smt = vec![0, 1, 60];
    let code = CodeSpec {
        max_stack: 1,
        max_locals: 0,
        code: vec![0x00; 60].into_iter().chain([0xb1]).collect(),
        exceptions: Vec::new(),
        attributes: vec![("StackMapTable", smt)],
    };
    let bytes = build_class(ACC_PUBLIC, "F", &[MethodSpec { access: ACC_PUBLIC | ACC_STATIC, name: "op", descriptor: "()V", code: Some(code) }]);
    let out = rewriter("F:op").transform("F", &bytes).into_bytes().expect("rewritten");
    // frame type 251 (same_frame_extended), delta 76
    assert!(out.windows(5).any(|w| w == [0, 1, 251, 0, 76]));
    assert_eq!(ClassFile::parse(&out).unwrap().to_bytes().unwrap(), out);
}

#[test]
fn unchanged_outcomes() {
    let good = build_class(ACC_PUBLIC, "PlayerList", &[MethodSpec::new(ACC_PUBLIC, "op", "()V", BODY.to_vec())]);
    let r = rewriter("PlayerList:op");

    assert!(matches!(r.transform("java/lang/PlayerList", &good), RewriteOutcome::Unchanged(Unchanged::Filtered)));
    assert!(matches!(r.transform("Other", &good), RewriteOutcome::Unchanged(Unchanged::NotTargeted)));
    assert!(matches!(r.transform("PlayerList", &good[..20]), RewriteOutcome::Unchanged(Unchanged::Malformed(_))));
    assert!(matches!(
        rewriter("PlayerList:missing").transform("PlayerList", &good),
        RewriteOutcome::Unchanged(Unchanged::NoMatch)
    ));

    let iface = build_class(ACC_PUBLIC | ACC_INTERFACE | ACC_ABSTRACT, "PlayerList", &[MethodSpec::new(ACC_PUBLIC, "op", "()V", BODY.to_vec())]);
    assert!(matches!(r.transform("PlayerList", &iface), RewriteOutcome::Unchanged(Unchanged::NoBodies)));
    let annotation = build_class(ACC_PUBLIC | ACC_INTERFACE | ACC_ANNOTATION, "PlayerList", &[]);
    assert!(matches!(r.transform("PlayerList", &annotation), RewriteOutcome::Unchanged(Unchanged::NoBodies)));
}

#[test]
fn a_failing_method_does_not_stop_its_siblings() {
    let bytes = build_class(
        ACC_PUBLIC,
        "PlayerList",
        &[
            MethodSpec::new(ACC_PUBLIC, "op", "(Q)V", BODY.to_vec()),
            MethodSpec::new(ACC_PUBLIC, "addOp", "()V", vec![0x00; 65530].into_iter().chain([0xb1]).collect()),
            MethodSpec::new(ACC_PUBLIC, "op", "()V", BODY.to_vec()),
        ],
    );
    let (class, patched) = rewritten(rewriter("PlayerList:op|addOp").transform("PlayerList", &bytes));
    assert_eq!(patched, vec!["op".to_string()]);
    assert_eq!(class.methods[0].code().unwrap().code, BODY.to_vec());
    assert_eq!(class.methods[1].code().unwrap().code.len(), 65531);
    assert!(class.methods[2].code().unwrap().code.len() > BODY.len());
}

#[test]
fn any_type_mode_patches_set_op_only() {
    let bytes = build_class(
        ACC_PUBLIC,
        "org/example/Whatever",
        &[
            MethodSpec::new(ACC_PUBLIC, "setOp", "(Z)V", BODY.to_vec()),
            MethodSpec::new(ACC_PUBLIC, "addOp", "()V", BODY.to_vec()),
        ],
    );
    let (_, patched) = rewritten(rewriter("not-a-pair").transform("org/example/Whatever", &bytes));
    assert_eq!(patched, vec!["setOp".to_string()]);
}

#[test]
fn nested_classes_match_by_dollar_name() {
    let bytes = build_class(ACC_PUBLIC, "a/Outer$Inner", &[MethodSpec::new(ACC_PUBLIC, "op", "()V", BODY.to_vec())]);
    assert!(rewriter("Outer$Inner:op").transform("a/Outer$Inner", &bytes).is_rewritten());
    assert!(!rewriter("Inner:op").transform("a/Outer$Inner", &bytes).is_rewritten());
}

#[test]
fn rewriting_the_same_input_is_deterministic() {
    let bytes = build_class(ACC_PUBLIC, "PlayerList", &[MethodSpec::new(ACC_PUBLIC, "op", "(D[I)V", BODY.to_vec())]);
    let r = rewriter("PlayerList:op");
    let first = r.transform("PlayerList", &bytes).into_bytes().unwrap();
    let second = r.transform("PlayerList", &bytes).into_bytes().unwrap();
    assert_eq!(first, second);
}

#[test]
fn constants_are_reused_across_methods() {
    let bytes = build_class(
        ACC_PUBLIC,
        "PlayerList",
        &[
            MethodSpec::new(ACC_PUBLIC, "op", "(I)V", BODY.to_vec()),
            MethodSpec::new(ACC_PUBLIC, "addOp", "(I)V", BODY.to_vec()),
        ],
    );
    let (class, _) = rewritten(rewriter("PlayerList:op|addOp").transform("PlayerList", &bytes));
    let a = &method(&class, "op").code().unwrap().code;
    let b = &method(&class, "addOp").code().unwrap().code;
    // same type string, Object class, valueOf and hook references
    assert_eq!(u2_at(a, 2), u2_at(b, 2));
    assert_eq!(u2_at(a, 9), u2_at(b, 9));
    assert_eq!(u2_at(a, 15), u2_at(b, 15));
    assert_eq!(u2_at(a, 19), u2_at(b, 19));
    assert_ne!(u2_at(a, 5), u2_at(b, 5));
}

#[test]
fn supplementary_characters_in_names_are_patched() {
    let class_name = "games/Ledger\u{1D4DB}";
    let method_name = "op\u{1F600}";
    let bytes = build_class(ACC_PUBLIC, class_name, &[MethodSpec::new(ACC_PUBLIC, method_name, "()V", BODY.to_vec())]);

    let (class, patched) = rewritten(rewriter("Ledger\u{1D4DB}:op\u{1F600}").transform(class_name, &bytes));
    assert_eq!(patched, vec![method_name.to_string()]);

    let cp = &class.constant_pool;
    let c = &method(&class, method_name).code().unwrap().code;
    assert_eq!(string_constant(cp, u2_at(c, 2)), "Ledger\u{1D4DB}");
    assert_eq!(string_constant(cp, u2_at(c, 5)), method_name);
    let stored = match cp.get(u2_at(c, 5)).unwrap() {
        CpInfo::String { string_index } => cp.get_utf8_bytes(*string_index).unwrap().to_vec(),
        other => panic!("not a string: {other:?}"),
    };
    assert!(!stored.iter().any(|&b| b >= 0xF0), "four-byte form in {stored:?}");
}
