// call_logger/src/sys/jni.rs
//
// JNI bindings for the subset of the Java Native Interface the agent calls.
//
// The function table keeps the exact jni.h slot layout. Slots the agent never
// calls are kept as opaque padding so every typed slot sits at its JDK index;
// the index of each typed slot is noted next to it.

#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]

use std::ffi::c_void;
use std::os::raw::c_char;

// =============================================================================
// Primitive Types
// =============================================================================

pub type jint = i32;
pub type jlong = i64;
pub type jbyte = i8;
pub type jboolean = u8;
pub type jchar = u16;
pub type jshort = i16;
pub type jfloat = f32;
pub type jdouble = f64;
pub type jsize = jint;

// =============================================================================
// Reference Types (opaque pointers)
// =============================================================================

pub type jobject = *mut c_void;
pub type jclass = jobject;
pub type jstring = jobject;
pub type jarray = jobject;
pub type jthread = jobject;
pub type jobjectArray = jarray;

pub type jmethodID = *mut c_void;

#[repr(C)]
#[derive(Copy, Clone)]
pub union jvalue {
    pub z: jboolean,
    pub b: jbyte,
    pub c: jchar,
    pub s: jshort,
    pub i: jint,
    pub j: jlong,
    pub f: jfloat,
    pub d: jdouble,
    pub l: jobject,
}

// =============================================================================
// Constants
// =============================================================================

pub const JNI_OK: jint = 0;
pub const JNI_ERR: jint = -1;
pub const JNI_EDETACHED: jint = -2;
pub const JNI_EVERSION: jint = -3;

pub const JNI_TRUE: jboolean = 1;
pub const JNI_FALSE: jboolean = 0;

pub const JNI_VERSION_1_2: jint = 0x00010002;
pub const JNI_VERSION_1_6: jint = 0x00010006;
pub const JNI_VERSION_1_8: jint = 0x00010008;

// =============================================================================
// JNINativeMethod for RegisterNatives
// =============================================================================

#[repr(C)]
pub struct JNINativeMethod {
    pub name: *const c_char,
    pub signature: *const c_char,
    pub fnPtr: *mut c_void,
}

// =============================================================================
// JNINativeInterface_ - The JNI function table (vtable)
// =============================================================================
//
// JNIEnv is a pointer to a pointer to this struct. Order must match jni.h.
// Trailing slots after ExceptionCheck (229-235) are never read and omitted.

type Unused<const N: usize> = [*mut c_void; N];

#[repr(C)]
pub struct JNINativeInterface_ {
    // 0-4: reserved slots and GetVersion
    _slots_0_4: Unused<5>,

    // 5
    pub DefineClass: unsafe extern "system" fn(
        env: *mut JNIEnv,
        name: *const c_char,
        loader: jobject,
        buf: *const jbyte,
        len: jsize,
    ) -> jclass,
    // 6
    pub FindClass: unsafe extern "system" fn(env: *mut JNIEnv, name: *const c_char) -> jclass,

    // 7-16: reflection, Throw*, ExceptionOccurred, ExceptionDescribe
    _slots_7_16: Unused<10>,

    // 17
    pub ExceptionClear: unsafe extern "system" fn(env: *mut JNIEnv),

    // 18: FatalError
    _slot_18: Unused<1>,

    // 19-20
    pub PushLocalFrame: unsafe extern "system" fn(env: *mut JNIEnv, capacity: jint) -> jint,
    pub PopLocalFrame: unsafe extern "system" fn(env: *mut JNIEnv, result: jobject) -> jobject,

    // 21-22: global references
    _slots_21_22: Unused<2>,

    // 23-24
    pub DeleteLocalRef: unsafe extern "system" fn(env: *mut JNIEnv, obj: jobject),
    pub IsSameObject: unsafe extern "system" fn(env: *mut JNIEnv, obj1: jobject, obj2: jobject) -> jboolean,

    // 25-30: NewLocalRef, EnsureLocalCapacity, object allocation
    _slots_25_30: Unused<6>,

    // 31
    pub GetObjectClass: unsafe extern "system" fn(env: *mut JNIEnv, obj: jobject) -> jclass,

    // 32: IsInstanceOf
    _slot_32: Unused<1>,

    // 33
    pub GetMethodID: unsafe extern "system" fn(
        env: *mut JNIEnv,
        clazz: jclass,
        name: *const c_char,
        sig: *const c_char,
    ) -> jmethodID,

    // 34-35: CallObjectMethod, CallObjectMethodV
    _slots_34_35: Unused<2>,

    // 36
    pub CallObjectMethodA: unsafe extern "system" fn(
        env: *mut JNIEnv,
        obj: jobject,
        methodID: jmethodID,
        args: *const jvalue,
    ) -> jobject,

    // 37-168: remaining Call*, field access, static calls, strings
    _slots_37_168: Unused<132>,

    // 169-171
    pub GetStringUTFChars: unsafe extern "system" fn(
        env: *mut JNIEnv,
        str: jstring,
        isCopy: *mut jboolean,
    ) -> *const c_char,
    pub ReleaseStringUTFChars: unsafe extern "system" fn(env: *mut JNIEnv, str: jstring, chars: *const c_char),
    pub GetArrayLength: unsafe extern "system" fn(env: *mut JNIEnv, array: jarray) -> jsize,

    // 172: NewObjectArray
    _slot_172: Unused<1>,

    // 173
    pub GetObjectArrayElement:
        unsafe extern "system" fn(env: *mut JNIEnv, array: jobjectArray, index: jsize) -> jobject,

    // 174-198: SetObjectArrayElement, New*Array, Get/Release*ArrayElements
    _slots_174_198: Unused<25>,

    // 199-206: primitive array region reads
    pub GetBooleanArrayRegion:
        unsafe extern "system" fn(env: *mut JNIEnv, array: jarray, start: jsize, len: jsize, buf: *mut jboolean),
    pub GetByteArrayRegion:
        unsafe extern "system" fn(env: *mut JNIEnv, array: jarray, start: jsize, len: jsize, buf: *mut jbyte),
    pub GetCharArrayRegion:
        unsafe extern "system" fn(env: *mut JNIEnv, array: jarray, start: jsize, len: jsize, buf: *mut jchar),
    pub GetShortArrayRegion:
        unsafe extern "system" fn(env: *mut JNIEnv, array: jarray, start: jsize, len: jsize, buf: *mut jshort),
    pub GetIntArrayRegion:
        unsafe extern "system" fn(env: *mut JNIEnv, array: jarray, start: jsize, len: jsize, buf: *mut jint),
    pub GetLongArrayRegion:
        unsafe extern "system" fn(env: *mut JNIEnv, array: jarray, start: jsize, len: jsize, buf: *mut jlong),
    pub GetFloatArrayRegion:
        unsafe extern "system" fn(env: *mut JNIEnv, array: jarray, start: jsize, len: jsize, buf: *mut jfloat),
    pub GetDoubleArrayRegion:
        unsafe extern "system" fn(env: *mut JNIEnv, array: jarray, start: jsize, len: jsize, buf: *mut jdouble),

    // 207-214: Set*ArrayRegion
    _slots_207_214: Unused<8>,

    // 215
    pub RegisterNatives: unsafe extern "system" fn(
        env: *mut JNIEnv,
        clazz: jclass,
        methods: *const JNINativeMethod,
        nMethods: jint,
    ) -> jint,

    // 216-227: monitors, GetJavaVM, region/critical access, weak references
    _slots_216_227: Unused<12>,

    // 228
    pub ExceptionCheck: unsafe extern "system" fn(env: *mut JNIEnv) -> jboolean,
}

/// JNIEnv is directly the vtable pointer (C ABI definition)
pub type JNIEnv = *const JNINativeInterface_;

// =============================================================================
// JNIInvokeInterface_ - The JavaVM function table
// =============================================================================

#[repr(C)]
pub struct JNIInvokeInterface_ {
    pub reserved0: *mut c_void,
    pub reserved1: *mut c_void,
    pub reserved2: *mut c_void,

    pub DestroyJavaVM: unsafe extern "system" fn(vm: *mut JavaVM) -> jint,
    pub AttachCurrentThread:
        unsafe extern "system" fn(vm: *mut JavaVM, penv: *mut *mut c_void, args: *mut c_void) -> jint,
    pub DetachCurrentThread: unsafe extern "system" fn(vm: *mut JavaVM) -> jint,
    pub GetEnv:
        unsafe extern "system" fn(vm: *mut JavaVM, penv: *mut *mut c_void, version: jint) -> jint,
}

/// JavaVM is directly the vtable pointer (C ABI definition)
pub type JavaVM = *const JNIInvokeInterface_;

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    const SLOT: usize = size_of::<*mut c_void>();

    #[test]
    fn typed_slots_sit_at_their_jni_h_index() {
        assert_eq!(offset_of!(JNINativeInterface_, DefineClass), 5 * SLOT);
        assert_eq!(offset_of!(JNINativeInterface_, ExceptionClear), 17 * SLOT);
        assert_eq!(offset_of!(JNINativeInterface_, GetObjectClass), 31 * SLOT);
        assert_eq!(offset_of!(JNINativeInterface_, CallObjectMethodA), 36 * SLOT);
        assert_eq!(offset_of!(JNINativeInterface_, GetStringUTFChars), 169 * SLOT);
        assert_eq!(offset_of!(JNINativeInterface_, GetObjectArrayElement), 173 * SLOT);
        assert_eq!(offset_of!(JNINativeInterface_, GetBooleanArrayRegion), 199 * SLOT);
        assert_eq!(offset_of!(JNINativeInterface_, RegisterNatives), 215 * SLOT);
        assert_eq!(offset_of!(JNINativeInterface_, ExceptionCheck), 228 * SLOT);
        assert_eq!(offset_of!(JNIInvokeInterface_, GetEnv), 6 * SLOT);
    }
}
