//! High-level environment wrappers for JVMTI and JNI.
//!
//! These wrap the raw environment pointers the VM hands the agent, handle
//! JVMTI-owned memory and string conversion, and return Rust types.
//!
//! # JVMTI Environment
//!
//! [`Jvmti`] covers what the call logger needs from the tool interface:
//!
//! - **Capabilities**: query potential capabilities and add the ones needed
//! - **Events**: install callbacks and enable notifications
//! - **Classes**: enumerate resident classes, check modifiability, retransform
//! - **Stack**: capture the current thread's frames and resolve them to
//!   declaring class, method name, source file and line
//! - **Properties**: read JVM system properties
//!
//! # JNI Environment
//!
//! [`JniEnv`] covers class definition, string and array access, virtual
//! `toString()` calls and exception hygiene.
//!
//! # Reference Guards
//!
//! [`LocalFrame`] pops a pushed local frame when dropped, releasing every
//! local reference created inside it.
//!
//! ```rust,ignore
//! use call_logger::env::{JniEnv, LocalFrame};
//!
//! fn inspect(jni: &JniEnv, args: jni::jobjectArray) {
//!     let _frame = LocalFrame::push(jni, 32).expect("frame");
//!     for i in 0..jni.get_array_length(args) {
//!         let _elem = jni.get_object_array_element(args, i);
//!     }
//!     // all locals released here
//! }
//! ```

pub use crate::jni_wrapper::{JniEnv, LocalFrame};
pub use crate::jvmti_wrapper::Jvmti;
