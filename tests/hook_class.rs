use call_logger::classfile::{ClassFile, ACC_NATIVE, ACC_PUBLIC, ACC_STATIC};
use call_logger::descriptor::{parse_method_descriptor, FieldType};
use call_logger::hook_class::{hook_class_bytes, HOOK_CLASS, HOOK_DESCRIPTOR, HOOK_METHOD};

#[test]
fn declares_a_single_static_native_hook() {
    let class = ClassFile::parse(&hook_class_bytes().unwrap()).unwrap();
    assert_eq!(class.class_name().unwrap(), HOOK_CLASS);
    assert_eq!(class.constant_pool.get_class_name(class.super_class).unwrap(), "java/lang/Object");
    assert_eq!(class.major_version, 52);
    assert!(class.fields.is_empty());
    assert_eq!(class.methods.len(), 1);

    let m = &class.methods[0];
    assert_eq!(class.constant_pool.get_utf8(m.name_index).unwrap(), HOOK_METHOD);
    assert_eq!(class.constant_pool.get_utf8(m.descriptor_index).unwrap(), HOOK_DESCRIPTOR);
    assert_eq!(m.access_flags, ACC_PUBLIC | ACC_STATIC | ACC_NATIVE);
    assert!(m.code().is_none());
}

#[test]
fn hook_signature_takes_receiver_names_and_arguments() {
    let d = parse_method_descriptor(HOOK_DESCRIPTOR).unwrap();
    assert_eq!(
        d.params,
        vec![
            FieldType::Object("java/lang/Object".into()),
            FieldType::Object("java/lang/String".into()),
            FieldType::Object("java/lang/String".into()),
            FieldType::Array("[Ljava/lang/Object;".into()),
        ]
    );
    assert_eq!(d.ret, None);
}

#[test]
fn hook_lives_in_the_filtered_namespace() {
    assert!(!call_logger::filter::is_candidate(HOOK_CLASS));
}
