//! Raw FFI declarations for JNI and JVMTI.
//!
//! Only the slots the agent calls are typed; everything else in the
//! function tables is padding that keeps those slots at their header index.

pub mod jni;
pub mod jvmti;
