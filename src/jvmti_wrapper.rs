// call_logger/src/jvmti_wrapper.rs
use crate::sys::jni;
use crate::sys::jvmti;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

/// Resolves a vtable slot, failing with `NOT_AVAILABLE` when the VM left it null.
macro_rules! jvmti_fn {
    ($env:expr, $name:ident) => {
        match (*(*$env).functions).$name {
            Some(f) => f,
            None => return Err(jvmti::jvmtiError::NOT_AVAILABLE),
        }
    };
}

/// A safe wrapper around the raw JVMTI Environment pointer.
pub struct Jvmti {
    env: *mut jvmti::jvmtiEnv,
}

// A jvmtiEnv is global to the VM and may be used from any thread.
unsafe impl Send for Jvmti {}
unsafe impl Sync for Jvmti {}

impl Jvmti {
    /// Connects to the JVM and retrieves the JVMTI environment.
    pub fn new(vm: *mut jni::JavaVM) -> Result<Self, jni::jint> {
        let mut env_ptr: *mut std::ffi::c_void = ptr::null_mut();

        unsafe {
            // vm: *mut JavaVM = *mut *const JNIInvokeInterface_
            let get_env_fn = (**vm).GetEnv;
            let res = get_env_fn(vm, &mut env_ptr, jvmti::JVMTI_VERSION_1_2);
            if res != jni::JNI_OK {
                return Err(res);
            }
        }

        Ok(Jvmti { env: env_ptr as *mut jvmti::jvmtiEnv })
    }

    /// Get the raw jvmtiEnv pointer
    pub fn raw(&self) -> *mut jvmti::jvmtiEnv {
        self.env
    }

    // =========================================================================
    // Capabilities & Events
    // =========================================================================

    pub fn get_potential_capabilities(&self) -> Result<jvmti::jvmtiCapabilities, jvmti::jvmtiError> {
        let mut caps = jvmti::jvmtiCapabilities::default();
        unsafe {
            let get_fn = jvmti_fn!(self.env, GetPotentialCapabilities);
            let err = get_fn(self.env, &mut caps);
            if err != jvmti::jvmtiError::NONE { return Err(err); }
        }
        Ok(caps)
    }

    pub fn add_capabilities(&self, new_caps: &jvmti::jvmtiCapabilities) -> Result<(), jvmti::jvmtiError> {
        unsafe {
            let add_fn = jvmti_fn!(self.env, AddCapabilities);
            let err = add_fn(self.env, new_caps);
            if err != jvmti::jvmtiError::NONE { return Err(err); }
        }
        Ok(())
    }

    pub fn set_event_callbacks(&self, callbacks: jvmti::jvmtiEventCallbacks) -> Result<(), jvmti::jvmtiError> {
        unsafe {
            let set_fn = jvmti_fn!(self.env, SetEventCallbacks);
            let size = std::mem::size_of::<jvmti::jvmtiEventCallbacks>() as jni::jint;
            let err = set_fn(self.env, &callbacks, size);
            if err != jvmti::jvmtiError::NONE { return Err(err); }
        }
        Ok(())
    }

    /// Enables or disables an event globally (`thread` may be null for all threads).
    pub fn set_event_notification_mode(&self, enable: bool, event_type: u32, thread: jni::jthread) -> Result<(), jvmti::jvmtiError> {
        unsafe {
            let set_mode_fn = jvmti_fn!(self.env, SetEventNotificationMode);
            let mode = if enable { jvmti::JVMTI_ENABLE } else { jvmti::JVMTI_DISABLE };
            let err = set_mode_fn(self.env, mode, event_type, thread);
            if err != jvmti::jvmtiError::NONE { return Err(err); }
        }
        Ok(())
    }

    // =========================================================================
    // Memory
    // =========================================================================

    pub fn allocate(&self, size: jni::jlong) -> Result<*mut u8, jvmti::jvmtiError> {
        let mut mem_ptr: *mut u8 = ptr::null_mut();
        unsafe {
            let allocate_fn = jvmti_fn!(self.env, Allocate);
            let err = allocate_fn(self.env, size, &mut mem_ptr);
            if err != jvmti::jvmtiError::NONE { return Err(err); }
        }
        Ok(mem_ptr)
    }

    /// Copies `bytes` into JVMTI-owned memory, as required for data handed back
    /// to the VM from a ClassFileLoadHook.
    pub fn allocate_copy(&self, bytes: &[u8]) -> Result<*mut u8, jvmti::jvmtiError> {
        let mem = self.allocate(bytes.len() as jni::jlong)?;
        if mem.is_null() {
            return Err(jvmti::jvmtiError::OUT_OF_MEMORY);
        }
        unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), mem, bytes.len()) };
        Ok(mem)
    }

    pub fn deallocate(&self, mem: *mut u8) -> Result<(), jvmti::jvmtiError> {
        if mem.is_null() {
            return Ok(());
        }
        unsafe {
            let deallocate_fn = jvmti_fn!(self.env, Deallocate);
            let err = deallocate_fn(self.env, mem);
            if err != jvmti::jvmtiError::NONE { return Err(err); }
        }
        Ok(())
    }

    /// Takes ownership of a JVMTI-allocated C string.
    unsafe fn take_string(&self, p: *mut c_char) -> Result<Option<String>, jvmti::jvmtiError> {
        if p.is_null() {
            return Ok(None);
        }
        let s = CStr::from_ptr(p).to_string_lossy().into_owned();
        self.deallocate(p as *mut u8)?;
        Ok(Some(s))
    }

    // =========================================================================
    // Classes
    // =========================================================================

    pub fn get_loaded_classes(&self) -> Result<Vec<jni::jclass>, jvmti::jvmtiError> {
        let mut class_count: jni::jint = 0;
        let mut classes_ptr: *mut jni::jclass = ptr::null_mut();
        unsafe {
            let get_fn = jvmti_fn!(self.env, GetLoadedClasses);
            let err = get_fn(self.env, &mut class_count, &mut classes_ptr);
            if err != jvmti::jvmtiError::NONE { return Err(err); }
            if classes_ptr.is_null() {
                return Ok(Vec::new());
            }
            let classes = std::slice::from_raw_parts(classes_ptr, class_count.max(0) as usize).to_vec();
            self.deallocate(classes_ptr as *mut u8)?;
            Ok(classes)
        }
    }

    /// Returns the JVM type signature of a class, e.g. `Lcom/example/Foo;`.
    pub fn get_class_signature(&self, klass: jni::jclass) -> Result<String, jvmti::jvmtiError> {
        let mut sig_ptr: *mut c_char = ptr::null_mut();
        let mut gen_ptr: *mut c_char = ptr::null_mut();
        unsafe {
            let get_fn = jvmti_fn!(self.env, GetClassSignature);
            let err = get_fn(self.env, klass, &mut sig_ptr, &mut gen_ptr);
            if err != jvmti::jvmtiError::NONE { return Err(err); }
            self.take_string(gen_ptr)?;
            self.take_string(sig_ptr)?.ok_or(jvmti::jvmtiError::NULL_POINTER)
        }
    }

    pub fn get_source_file_name(&self, klass: jni::jclass) -> Result<String, jvmti::jvmtiError> {
        let mut name_ptr: *mut c_char = ptr::null_mut();
        unsafe {
            let get_fn = jvmti_fn!(self.env, GetSourceFileName);
            let err = get_fn(self.env, klass, &mut name_ptr);
            if err != jvmti::jvmtiError::NONE { return Err(err); }
            self.take_string(name_ptr)?.ok_or(jvmti::jvmtiError::ABSENT_INFORMATION)
        }
    }

    pub fn is_modifiable_class(&self, klass: jni::jclass) -> Result<bool, jvmti::jvmtiError> {
        let mut res: jni::jboolean = 0;
        unsafe {
            let is_fn = jvmti_fn!(self.env, IsModifiableClass);
            let err = is_fn(self.env, klass, &mut res);
            if err != jvmti::jvmtiError::NONE { return Err(err); }
        }
        Ok(res != 0)
    }

    pub fn retransform_classes(&self, classes: &[jni::jclass]) -> Result<(), jvmti::jvmtiError> {
        unsafe {
            let retransform_fn = jvmti_fn!(self.env, RetransformClasses);
            let err = retransform_fn(self.env, classes.len() as jni::jint, classes.as_ptr());
            if err != jvmti::jvmtiError::NONE { return Err(err); }
        }
        Ok(())
    }

    // =========================================================================
    // Methods & Stack
    // =========================================================================

    /// Returns the method name; the signature and generic signature are dropped.
    pub fn get_method_name(&self, method: jni::jmethodID) -> Result<String, jvmti::jvmtiError> {
        let mut name_ptr: *mut c_char = ptr::null_mut();
        unsafe {
            let get_fn = jvmti_fn!(self.env, GetMethodName);
            let err = get_fn(self.env, method, &mut name_ptr, ptr::null_mut(), ptr::null_mut());
            if err != jvmti::jvmtiError::NONE { return Err(err); }
            self.take_string(name_ptr)?.ok_or(jvmti::jvmtiError::NULL_POINTER)
        }
    }

    pub fn get_method_declaring_class(&self, method: jni::jmethodID) -> Result<jni::jclass, jvmti::jvmtiError> {
        let mut klass: jni::jclass = ptr::null_mut();
        unsafe {
            let get_fn = jvmti_fn!(self.env, GetMethodDeclaringClass);
            let err = get_fn(self.env, method, &mut klass);
            if err != jvmti::jvmtiError::NONE { return Err(err); }
        }
        Ok(klass)
    }

    pub fn get_line_number_table(&self, method: jni::jmethodID) -> Result<Vec<jvmti::jvmtiLineNumberEntry>, jvmti::jvmtiError> {
        let mut entry_count: jni::jint = 0;
        let mut table_ptr: *mut jvmti::jvmtiLineNumberEntry = ptr::null_mut();
        unsafe {
            let get_fn = jvmti_fn!(self.env, GetLineNumberTable);
            let err = get_fn(self.env, method, &mut entry_count, &mut table_ptr);
            if err != jvmti::jvmtiError::NONE { return Err(err); }
            if table_ptr.is_null() {
                return Ok(Vec::new());
            }
            let table = std::slice::from_raw_parts(table_ptr, entry_count.max(0) as usize).to_vec();
            self.deallocate(table_ptr as *mut u8)?;
            Ok(table)
        }
    }

    pub fn is_method_native(&self, method: jni::jmethodID) -> Result<bool, jvmti::jvmtiError> {
        let mut res: jni::jboolean = 0;
        unsafe {
            let is_fn = jvmti_fn!(self.env, IsMethodNative);
            let err = is_fn(self.env, method, &mut res);
            if err != jvmti::jvmtiError::NONE { return Err(err); }
        }
        Ok(res != 0)
    }

    /// Stack of `thread`; a null thread means the current thread.
    pub fn get_stack_trace(&self, thread: jni::jthread, start_depth: jni::jint, max_frame_count: jni::jint) -> Result<Vec<jvmti::jvmtiFrameInfo>, jvmti::jvmtiError> {
        let mut frame_buffer = vec![jvmti::jvmtiFrameInfo::default(); max_frame_count.max(0) as usize];
        let mut count: jni::jint = 0;
        unsafe {
            let get_fn = jvmti_fn!(self.env, GetStackTrace);
            let err = get_fn(self.env, thread, start_depth, max_frame_count, frame_buffer.as_mut_ptr(), &mut count);
            if err != jvmti::jvmtiError::NONE { return Err(err); }
        }
        frame_buffer.truncate(count.max(0) as usize);
        Ok(frame_buffer)
    }

    // =========================================================================
    // Misc
    // =========================================================================

    /// Reads a JVM system property. Unset properties yield `Ok(None)`.
    pub fn get_system_property(&self, property: &str) -> Result<Option<String>, jvmti::jvmtiError> {
        let c_property = CString::new(property).map_err(|_| jvmti::jvmtiError::ILLEGAL_ARGUMENT)?;
        let mut value_ptr: *mut c_char = ptr::null_mut();
        unsafe {
            let get_fn = jvmti_fn!(self.env, GetSystemProperty);
            let err = get_fn(self.env, c_property.as_ptr(), &mut value_ptr);
            if err == jvmti::jvmtiError::NOT_AVAILABLE { return Ok(None); }
            if err != jvmti::jvmtiError::NONE { return Err(err); }
            self.take_string(value_ptr)
        }
    }
}
