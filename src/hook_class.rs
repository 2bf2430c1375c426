//! The Java-side entry point that patched methods call.
//!
//! The agent defines this class itself, in the bootstrap loader, so it is
//! reachable from every class loader without touching the application class
//! path:
//!
//! ```java
//! package jvmti.calllogger;
//!
//! public final class PatchedCallHook {
//!     public static native void handlePatchedCall(
//!         Object instance, String className, String methodName, Object[] args);
//! }
//! ```
//!
//! The native method is bound to Rust with `RegisterNatives` right after
//! definition. Its name and descriptor are baked into every rewritten class,
//! so they never change while the agent is loaded.

use crate::classfile::{
    ClassFile, ClassFileError, ConstantPool, MemberInfo, ACC_FINAL, ACC_NATIVE, ACC_PUBLIC, ACC_STATIC, ACC_SUPER,
    ACC_SYNTHETIC,
};

/// Internal name of the hook class.
pub const HOOK_CLASS: &str = "jvmti/calllogger/PatchedCallHook";
pub const HOOK_METHOD: &str = "handlePatchedCall";
pub const HOOK_DESCRIPTOR: &str = "(Ljava/lang/Object;Ljava/lang/String;Ljava/lang/String;[Ljava/lang/Object;)V";

/// Java 8, the oldest runtime the agent supports.
const CLASS_MAJOR_VERSION: u16 = 52;

/// Class file bytes for `PatchedCallHook`.
pub fn hook_class_bytes() -> Result<Vec<u8>, ClassFileError> {
    let mut cp = ConstantPool::new();
    let this_class = cp.add_class(HOOK_CLASS)?;
    let super_class = cp.add_class("java/lang/Object")?;
    let name_index = cp.add_utf8(HOOK_METHOD)?;
    let descriptor_index = cp.add_utf8(HOOK_DESCRIPTOR)?;

    let class = ClassFile {
        minor_version: 0,
        major_version: CLASS_MAJOR_VERSION,
        constant_pool: cp,
        access_flags: ACC_PUBLIC | ACC_FINAL | ACC_SUPER | ACC_SYNTHETIC,
        this_class,
        super_class,
        interfaces: Vec::new(),
        fields: Vec::new(),
        methods: vec![MemberInfo {
            access_flags: ACC_PUBLIC | ACC_STATIC | ACC_NATIVE,
            name_index,
            descriptor_index,
            attributes: Vec::new(),
        }],
        attributes: Vec::new(),
    };
    class.to_bytes()
}
