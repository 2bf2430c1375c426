//! Safe wrapper around the JNI environment.
//!
//! Covers the operations the call hook needs: class definition and lookup,
//! string conversion, array reads, `toString()` dispatch, exception hygiene
//! and local reference management.
//!
//! # Example
//!
//! ```rust,ignore
//! use call_logger::env::{JniEnv, LocalFrame};
//!
//! fn describe(jni: *mut jni::JNIEnv, obj: jni::jobject) -> Option<String> {
//!     let env = unsafe { JniEnv::from_raw(jni) };
//!     let _frame = LocalFrame::push(&env, 16).ok()?;
//!     let cls = env.get_object_class(obj);
//!     let mid = env.get_method_id(cls, "toString", "()Ljava/lang/String;")?;
//!     let s = env.call_object_method(obj, mid, &[]);
//!     if env.exception_check() {
//!         env.exception_clear();
//!         return None;
//!     }
//!     env.get_string_utf(s)
//! }
//! ```

use crate::classfile::decode_modified_utf8;
use crate::sys::jni;
use std::ffi::{CStr, CString};
use std::ptr;

/// Safe wrapper around a JNI environment pointer.
///
/// # Thread Safety
///
/// A `JniEnv` is tied to a specific thread and cannot be sent across threads.
/// Each JVM thread has its own JNI environment.
pub struct JniEnv {
    env: *mut jni::JNIEnv,
}

/// Generates a typed primitive array region read.
macro_rules! array_region {
    ($(#[$doc:meta])* $name:ident, $slot:ident, $elem:ty) => {
        $(#[$doc])*
        pub fn $name(&self, array: jni::jarray, start: jni::jsize, buf: &mut [$elem]) {
            unsafe {
                let vtable = *self.env;
                ((*vtable).$slot)(self.env, array, start, buf.len() as jni::jsize, buf.as_mut_ptr());
            }
        }
    };
}

impl JniEnv {
    /// Creates a JniEnv wrapper from a raw pointer.
    ///
    /// # Safety
    ///
    /// The caller must ensure the pointer is valid and comes from the current thread.
    pub unsafe fn from_raw(env: *mut jni::JNIEnv) -> Self {
        JniEnv { env }
    }

    /// Gets the JNI environment of the current thread, which must already be
    /// attached to `vm`.
    pub fn from_vm(vm: *mut jni::JavaVM) -> Result<Self, jni::jint> {
        let mut env_ptr: *mut std::ffi::c_void = ptr::null_mut();
        unsafe {
            let res = ((**vm).GetEnv)(vm, &mut env_ptr, jni::JNI_VERSION_1_6);
            if res != jni::JNI_OK {
                return Err(res);
            }
        }
        Ok(JniEnv { env: env_ptr as *mut jni::JNIEnv })
    }

    // =========================================================================
    // Class Operations
    // =========================================================================

    /// Finds a class by its internal name (e.g. "java/lang/String").
    ///
    /// A failed lookup leaves a pending `NoClassDefFoundError`; callers that
    /// continue running Java code must clear it.
    pub fn find_class(&self, name: &str) -> Option<jni::jclass> {
        let c_name = CString::new(name).ok()?;
        unsafe {
            let vtable = *self.env;
            let cls = ((*vtable).FindClass)(self.env, c_name.as_ptr());
            if cls.is_null() { None } else { Some(cls) }
        }
    }

    /// Defines a class from raw class-file bytes. A null `loader` means the
    /// bootstrap class loader.
    pub fn define_class(&self, name: &str, loader: jni::jobject, bytes: &[u8]) -> Option<jni::jclass> {
        let c_name = CString::new(name).ok()?;
        unsafe {
            let vtable = *self.env;
            let cls = ((*vtable).DefineClass)(
                self.env,
                c_name.as_ptr(),
                loader,
                bytes.as_ptr() as *const jni::jbyte,
                bytes.len() as jni::jsize,
            );
            if cls.is_null() { None } else { Some(cls) }
        }
    }

    /// Gets the class of an object.
    pub fn get_object_class(&self, obj: jni::jobject) -> jni::jclass {
        unsafe {
            let vtable = *self.env;
            ((*vtable).GetObjectClass)(self.env, obj)
        }
    }

    // =========================================================================
    // Exception Handling
    // =========================================================================

    /// Checks if an exception is pending.
    pub fn exception_check(&self) -> bool {
        unsafe {
            let vtable = *self.env;
            ((*vtable).ExceptionCheck)(self.env) != 0
        }
    }

    /// Clears any pending exception.
    pub fn exception_clear(&self) {
        unsafe {
            let vtable = *self.env;
            ((*vtable).ExceptionClear)(self.env);
        }
    }

    /// Clears a pending exception and reports whether there was one.
    pub fn take_exception(&self) -> bool {
        if self.exception_check() {
            self.exception_clear();
            true
        } else {
            false
        }
    }

    // =========================================================================
    // Strings
    // =========================================================================

    /// Gets a Rust string from a Java string.
    ///
    /// Returns `None` for a null reference. The JVM hands out modified UTF-8;
    /// surrogate pairs are joined and an unpaired surrogate is replaced.
    pub fn get_string_utf(&self, s: jni::jstring) -> Option<String> {
        if s.is_null() {
            return None;
        }
        unsafe {
            let vtable = *self.env;
            let chars = ((*vtable).GetStringUTFChars)(self.env, s, ptr::null_mut());
            if chars.is_null() {
                return None;
            }
            let raw = CStr::from_ptr(chars).to_bytes();
            let result = match decode_modified_utf8(raw) {
                Some(text) => text.into_owned(),
                None => String::from_utf8_lossy(raw).into_owned(),
            };
            ((*vtable).ReleaseStringUTFChars)(self.env, s, chars);
            Some(result)
        }
    }

    // =========================================================================
    // Methods
    // =========================================================================

    /// Gets the method ID for an instance method.
    pub fn get_method_id(&self, cls: jni::jclass, name: &str, sig: &str) -> Option<jni::jmethodID> {
        let c_name = CString::new(name).ok()?;
        let c_sig = CString::new(sig).ok()?;
        unsafe {
            let vtable = *self.env;
            let mid = ((*vtable).GetMethodID)(self.env, cls, c_name.as_ptr(), c_sig.as_ptr());
            if mid.is_null() { None } else { Some(mid) }
        }
    }

    /// Calls an instance method returning an object.
    pub fn call_object_method(&self, obj: jni::jobject, method_id: jni::jmethodID, args: &[jni::jvalue]) -> jni::jobject {
        unsafe {
            let vtable = *self.env;
            ((*vtable).CallObjectMethodA)(self.env, obj, method_id, args.as_ptr())
        }
    }

    // =========================================================================
    // References
    // =========================================================================

    /// Checks whether two references point at the same object.
    pub fn is_same_object(&self, ref1: jni::jobject, ref2: jni::jobject) -> bool {
        unsafe {
            let vtable = *self.env;
            ((*vtable).IsSameObject)(self.env, ref1, ref2) != 0
        }
    }

    /// Deletes a local reference.
    pub fn delete_local_ref(&self, obj: jni::jobject) {
        unsafe {
            let vtable = *self.env;
            ((*vtable).DeleteLocalRef)(self.env, obj);
        }
    }

    /// Pushes a new local reference frame.
    pub fn push_local_frame(&self, capacity: jni::jint) -> Result<(), jni::jint> {
        unsafe {
            let vtable = *self.env;
            let result = ((*vtable).PushLocalFrame)(self.env, capacity);
            if result == 0 { Ok(()) } else { Err(result) }
        }
    }

    /// Pops the current local reference frame, returning a reference in the previous frame.
    pub fn pop_local_frame(&self, result: jni::jobject) -> jni::jobject {
        unsafe {
            let vtable = *self.env;
            ((*vtable).PopLocalFrame)(self.env, result)
        }
    }

    // =========================================================================
    // Array Operations
    // =========================================================================

    /// Gets the length of an array.
    pub fn get_array_length(&self, array: jni::jarray) -> jni::jsize {
        unsafe {
            let vtable = *self.env;
            ((*vtable).GetArrayLength)(self.env, array)
        }
    }

    /// Gets an element from an object array.
    pub fn get_object_array_element(&self, array: jni::jobjectArray, index: jni::jsize) -> jni::jobject {
        unsafe {
            let vtable = *self.env;
            ((*vtable).GetObjectArrayElement)(self.env, array, index)
        }
    }

    array_region!(get_boolean_array_region, GetBooleanArrayRegion, jni::jboolean);
    array_region!(get_byte_array_region, GetByteArrayRegion, jni::jbyte);
    array_region!(get_char_array_region, GetCharArrayRegion, jni::jchar);
    array_region!(get_short_array_region, GetShortArrayRegion, jni::jshort);
    array_region!(
        /// Copies `buf.len()` ints starting at `start` out of `array`.
        get_int_array_region, GetIntArrayRegion, jni::jint
    );
    array_region!(get_long_array_region, GetLongArrayRegion, jni::jlong);
    array_region!(get_float_array_region, GetFloatArrayRegion, jni::jfloat);
    array_region!(get_double_array_region, GetDoubleArrayRegion, jni::jdouble);

    // =========================================================================
    // Native Method Registration
    // =========================================================================

    /// Registers native methods for a class.
    pub fn register_natives(&self, cls: jni::jclass, methods: &[jni::JNINativeMethod]) -> Result<(), jni::jint> {
        unsafe {
            let vtable = *self.env;
            let result = ((*vtable).RegisterNatives)(self.env, cls, methods.as_ptr(), methods.len() as jni::jint);
            if result == 0 { Ok(()) } else { Err(result) }
        }
    }
}

// =========================================================================
// Reference Guards (RAII wrappers)
// =========================================================================

/// A pushed local reference frame; every local created while it is alive is
/// released when it drops.
pub struct LocalFrame<'a> {
    env: &'a JniEnv,
}

impl<'a> LocalFrame<'a> {
    pub fn push(env: &'a JniEnv, capacity: jni::jint) -> Result<Self, jni::jint> {
        env.push_local_frame(capacity)?;
        Ok(LocalFrame { env })
    }
}

impl<'a> Drop for LocalFrame<'a> {
    fn drop(&mut self) {
        self.env.pop_local_frame(ptr::null_mut());
    }
}
