//! The agent itself: JVMTI lifecycle, class patching on load, and the
//! native side of `PatchedCallHook.handlePatchedCall`.
//!
//! Startup sequence:
//!
//! 1. `Agent_OnLoad` / `Agent_OnAttach`: read the configuration, acquire
//!    capabilities, install callbacks, enable events.
//! 2. `VMInit` (or right away when attaching to a live VM): define the hook
//!    class in the bootstrap loader, bind its native method, then
//!    retransform classes that were loaded before the hook existed.
//! 3. From then on every `ClassFileLoadHook` goes through the [`Rewriter`].
//!
//! Classes are only rewritten once the hook class exists, so no patched code
//! can reference it before it is defined.

use crate::capture::{capture_arguments, ObjectSource, Shape};
use crate::classfile::decode_modified_utf8;
use crate::config::AgentConfig;
use crate::descriptor::signature_to_binary_name;
use crate::env::{JniEnv, Jvmti, LocalFrame};
use crate::error::{AgentError, JvmtiResultExt};
use crate::hook_class::{hook_class_bytes, HOOK_CLASS, HOOK_DESCRIPTOR, HOOK_METHOD};
use crate::record::{ArgValue, CallEvent, ReceiverType, StackFrame, TO_STRING_FAILED};
use crate::retransform::{retransform_resident, JvmtiHost};
use crate::rewriter::{RewriteOutcome, Rewriter};
use crate::sink::Sink;
use crate::sys::{jni, jvmti};
use crate::{get_default_callbacks, logging, Agent};
use std::cell::Cell;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_uchar};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use tracing::{debug, error, info, warn};

/// Deepest stack captured per call.
const MAX_STACK_DEPTH: jni::jint = 1024;

/// Local reference capacity requested for one hook invocation.
const HOOK_LOCAL_CAPACITY: jni::jint = 64;

static STATE: OnceLock<AgentState> = OnceLock::new();

/// `Object.toString()`, stored as an address since `jmethodID` is not `Sync`.
static TO_STRING_ID: OnceLock<usize> = OnceLock::new();

thread_local! {
    static IN_HOOK: Cell<bool> = const { Cell::new(false) };
}

/// The exported agent. All state lives in a process-wide `OnceLock` so the
/// native hook can reach it.
#[derive(Default)]
pub struct CallLoggerAgent;

struct AgentState {
    jvmti: Jvmti,
    config: AgentConfig,
    rewriter: Rewriter,
    sink: Sink,
    can_retransform: bool,
    hook_ready: AtomicBool,
}

impl Agent for CallLoggerAgent {
    fn on_load(&self, vm: *mut jni::JavaVM, options: &str) -> jni::jint {
        logging::init();
        match start(vm, options) {
            Ok(_) => jni::JNI_OK,
            Err(e) => {
                error!(error = %e, "call logger failed to start");
                jni::JNI_ERR
            }
        }
    }

    fn on_attach(&self, vm: *mut jni::JavaVM, options: &str) -> jni::jint {
        logging::init();
        let state = match start(vm, options) {
            Ok(state) => state,
            Err(e) => {
                error!(error = %e, "call logger failed to attach");
                return jni::JNI_ERR;
            }
        };
        let jni = match JniEnv::from_vm(vm) {
            Ok(jni) => jni,
            Err(code) => {
                error!(code, "no JNI environment on the attaching thread");
                return jni::JNI_ERR;
            }
        };
        match state.activate(&jni) {
            Ok(()) => jni::JNI_OK,
            Err(e) => {
                error!(error = %e, "call logger failed to install its hook");
                jni::JNI_ERR
            }
        }
    }

    fn on_unload(&self) {
        if let Some(state) = STATE.get() {
            state.hook_ready.store(false, Ordering::Release);
        }
        debug!("call logger unloaded");
    }

    fn vm_init(&self, jni: *mut jni::JNIEnv, _thread: jni::jthread) {
        let Some(state) = STATE.get() else { return };
        let jni = unsafe { JniEnv::from_raw(jni) };
        if let Err(e) = state.activate(&jni) {
            error!(error = %e, "call logger failed to install its hook, no method will be instrumented");
        }
    }

    fn vm_death(&self, _jni: *mut jni::JNIEnv) {
        if let Some(state) = STATE.get() {
            state.hook_ready.store(false, Ordering::Release);
        }
    }

    fn class_file_load_hook(&self, _jni: *mut jni::JNIEnv, _class_being_redefined: jni::jclass,
                            _loader: jni::jobject, name: *const c_char,
                            _protection_domain: jni::jobject, class_data_len: jni::jint,
                            class_data: *const c_uchar,
                            new_class_data_len: *mut jni::jint,
                            new_class_data: *mut *mut c_uchar) {
        let Some(state) = STATE.get() else { return };
        if !state.hook_ready.load(Ordering::Acquire) || name.is_null() || class_data.is_null() || class_data_len <= 0 {
            return;
        }
        let Some(name) = decode_modified_utf8(unsafe { CStr::from_ptr(name) }.to_bytes()) else { return };
        let name: &str = &name;
        let bytes = unsafe { std::slice::from_raw_parts(class_data, class_data_len as usize) };

        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| state.rewriter.transform(name, bytes))) {
            Ok(outcome) => outcome,
            Err(_) => {
                error!(class = name, "rewriter panicked, class left unchanged");
                return;
            }
        };

        if let RewriteOutcome::Rewritten { bytes, patched } = outcome {
            match state.jvmti.allocate_copy(&bytes) {
                Ok(mem) => unsafe {
                    *new_class_data_len = bytes.len() as jni::jint;
                    *new_class_data = mem;
                    info!(class = name, methods = ?patched, "instrumented");
                },
                Err(e) => warn!(class = name, error = ?e, "cannot allocate instrumented class"),
            }
        }
    }
}

fn start(vm: *mut jni::JavaVM, options: &str) -> Result<&'static AgentState, AgentError> {
    if STATE.get().is_some() {
        return Err(AgentError::AlreadyInitialized);
    }
    let jvmti = Jvmti::new(vm).map_err(AgentError::GetEnv)?;
    let config = AgentConfig::from_jvm(Some(options), &jvmti);
    info!(
        targets = %config.targets,
        console = config.print_to_console,
        file = ?config.log_file,
        "call logger starting"
    );

    let potential = jvmti.get_potential_capabilities().during("GetPotentialCapabilities")?;
    let mut caps = jvmti::jvmtiCapabilities::default();
    caps.set_can_generate_all_class_hook_events(potential.can_generate_all_class_hook_events());
    caps.set_can_retransform_classes(potential.can_retransform_classes());
    caps.set_can_get_line_numbers(potential.can_get_line_numbers());
    caps.set_can_get_source_file_name(potential.can_get_source_file_name());
    jvmti.add_capabilities(&caps).during("AddCapabilities")?;

    let state = AgentState {
        rewriter: Rewriter::new(config.targets.clone()),
        sink: config.sink(),
        can_retransform: caps.can_retransform_classes(),
        hook_ready: AtomicBool::new(false),
        config,
        jvmti,
    };
    STATE.set(state).map_err(|_| AgentError::AlreadyInitialized)?;
    let state = STATE.get().ok_or(AgentError::AlreadyInitialized)?;

    let jvmti = &state.jvmti;
    jvmti.set_event_callbacks(get_default_callbacks()).during("SetEventCallbacks")?;
    for event in [jvmti::JVMTI_EVENT_VM_INIT, jvmti::JVMTI_EVENT_VM_DEATH, jvmti::JVMTI_EVENT_CLASS_FILE_LOAD_HOOK] {
        jvmti.set_event_notification_mode(true, event, ptr::null_mut()).during("SetEventNotificationMode")?;
    }
    Ok(state)
}

impl AgentState {
    /// Defines the hook class, binds the native method and instruments the
    /// classes already loaded.
    fn activate(&self, jni: &JniEnv) -> Result<(), AgentError> {
        if self.hook_ready.load(Ordering::Acquire) {
            return Ok(());
        }
        let bytes = hook_class_bytes()?;
        let cls = match jni.define_class(HOOK_CLASS, ptr::null_mut(), &bytes) {
            Some(cls) => cls,
            None => {
                // already defined by an earlier load of the agent
                jni.take_exception();
                let found = jni.find_class(HOOK_CLASS);
                jni.take_exception();
                found.ok_or(AgentError::DefineHookClass(HOOK_CLASS))?
            }
        };

        let name = CString::new(HOOK_METHOD).map_err(|_| AgentError::DefineHookClass(HOOK_CLASS))?;
        let signature = CString::new(HOOK_DESCRIPTOR).map_err(|_| AgentError::DefineHookClass(HOOK_CLASS))?;
        let method = jni::JNINativeMethod {
            name: name.as_ptr(),
            signature: signature.as_ptr(),
            fnPtr: handle_patched_call as *mut std::ffi::c_void,
        };
        if let Err(code) = jni.register_natives(cls, &[method]) {
            jni.take_exception();
            return Err(AgentError::RegisterNatives(code));
        }
        jni.delete_local_ref(cls);

        self.hook_ready.store(true, Ordering::Release);
        info!(class = HOOK_CLASS, "call hook installed");

        let host = JvmtiHost::new(&self.jvmti, self.can_retransform);
        retransform_resident(&host, &self.config.targets);
        Ok(())
    }

    /// Builds the record for one call and hands it to the sink.
    fn report(
        &self,
        jni: &JniEnv,
        instance: jni::jobject,
        class_name: jni::jstring,
        method_name: jni::jstring,
        args: jni::jobjectArray,
    ) {
        if !self.sink.is_enabled() {
            return;
        }
        let Ok(_frame) = LocalFrame::push(jni, HOOK_LOCAL_CAPACITY) else {
            jni.take_exception();
            return;
        };

        let method_name = jni.get_string_utf(method_name).unwrap_or_default();
        let stack = capture_stack(jni, &self.jvmti);
        let receiver = if instance.is_null() {
            // static: the patched method is the innermost captured frame
            let simple_name = jni.get_string_utf(class_name).unwrap_or_default();
            ReceiverType::for_static_call(&simple_name, &method_name, &stack)
        } else {
            let cls = jni.get_object_class(instance);
            let name = self.class_binary_name(cls);
            if !cls.is_null() {
                jni.delete_local_ref(cls);
            }
            name.map_or(ReceiverType::Unavailable, ReceiverType::Runtime)
        };
        let args = capture_arguments(&JniSource { jni, jvmti: &self.jvmti }, args);

        let event = CallEvent { method_name, receiver, args, stack };
        self.sink.emit(&event.format());
        jni.take_exception();
    }

    fn class_binary_name(&self, cls: jni::jclass) -> Option<String> {
        if cls.is_null() {
            return None;
        }
        self.jvmti.get_class_signature(cls).ok().map(|sig| signature_to_binary_name(&sig))
    }
}

/// Marks the current thread as inside the hook; `None` when it already is.
struct ReentryGuard;

impl ReentryGuard {
    fn enter() -> Option<Self> {
        IN_HOOK.with(|flag| if flag.replace(true) { None } else { Some(ReentryGuard) })
    }
}

impl Drop for ReentryGuard {
    fn drop(&mut self) {
        IN_HOOK.with(|flag| flag.set(false));
    }
}

/// Native implementation of `PatchedCallHook.handlePatchedCall`.
///
/// Calls made while a record is being built on the same thread (for
/// instance from an argument's `toString()`) are not reported.
unsafe extern "system" fn handle_patched_call(
    env: *mut jni::JNIEnv,
    _cls: jni::jclass,
    instance: jni::jobject,
    class_name: jni::jstring,
    method_name: jni::jstring,
    args: jni::jobjectArray,
) {
    let Some(state) = STATE.get() else { return };
    let Some(_guard) = ReentryGuard::enter() else { return };
    let jni = JniEnv::from_raw(env);

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        state.report(&jni, instance, class_name, method_name, args);
    }));
    if result.is_err() {
        jni.take_exception();
        error!("call hook panicked, record dropped");
    }
}

/// Argument objects seen through JNI.
struct JniSource<'a> {
    jni: &'a JniEnv,
    jvmti: &'a Jvmti,
}

macro_rules! read_primitive_array {
    ($jni:expr, $array:expr, $len:expr, $method:ident, $zero:expr) => {{
        let mut buf = vec![$zero; $len];
        $jni.$method($array, 0, &mut buf);
        buf
    }};
}

impl ObjectSource for JniSource<'_> {
    type Ref = jni::jobject;

    fn is_null(&self, obj: jni::jobject) -> bool {
        obj.is_null()
    }

    fn shape(&self, obj: jni::jobject) -> Shape {
        let cls = self.jni.get_object_class(obj);
        let signature = self.jvmti.get_class_signature(cls).unwrap_or_default();
        self.jni.delete_local_ref(cls);

        let jni = self.jni;
        let len = || self.array_len(obj);
        let value = match signature.as_str() {
            "[Z" => ArgValue::Booleans(
                read_primitive_array!(jni, obj, len(), get_boolean_array_region, 0u8).into_iter().map(|b| b != 0).collect(),
            ),
            "[B" => ArgValue::Bytes(read_primitive_array!(jni, obj, len(), get_byte_array_region, 0i8)),
            "[C" => ArgValue::Chars(read_primitive_array!(jni, obj, len(), get_char_array_region, 0u16)),
            "[S" => ArgValue::Shorts(read_primitive_array!(jni, obj, len(), get_short_array_region, 0i16)),
            "[I" => ArgValue::Ints(read_primitive_array!(jni, obj, len(), get_int_array_region, 0i32)),
            "[J" => ArgValue::Longs(read_primitive_array!(jni, obj, len(), get_long_array_region, 0i64)),
            "[F" => ArgValue::Floats(read_primitive_array!(jni, obj, len(), get_float_array_region, 0f32)),
            "[D" => ArgValue::Doubles(read_primitive_array!(jni, obj, len(), get_double_array_region, 0f64)),
            s if s.starts_with('[') => return Shape::ObjectArray,
            _ => ArgValue::Scalar(self.to_string(obj)),
        };
        Shape::Value(value)
    }

    fn array_len(&self, array: jni::jobject) -> usize {
        self.jni.get_array_length(array).max(0) as usize
    }

    fn element(&self, array: jni::jobject, index: usize) -> jni::jobject {
        self.jni.get_object_array_element(array, index as jni::jsize)
    }

    fn release(&self, obj: jni::jobject) {
        if !obj.is_null() {
            self.jni.delete_local_ref(obj);
        }
    }

    fn same_object(&self, a: jni::jobject, b: jni::jobject) -> bool {
        self.jni.is_same_object(a, b)
    }
}

impl JniSource<'_> {
    /// `String.valueOf(obj)` for a non-null object.
    fn to_string(&self, obj: jni::jobject) -> String {
        let Some(mid) = to_string_method(self.jni) else {
            return TO_STRING_FAILED.to_string();
        };
        let s = self.jni.call_object_method(obj, mid, &[]);
        if self.jni.take_exception() {
            return TO_STRING_FAILED.to_string();
        }
        let text = self.jni.get_string_utf(s).unwrap_or_else(|| "null".to_string());
        if !s.is_null() {
            self.jni.delete_local_ref(s);
        }
        text
    }
}

fn to_string_method(jni: &JniEnv) -> Option<jni::jmethodID> {
    if let Some(&mid) = TO_STRING_ID.get() {
        return Some(mid as jni::jmethodID);
    }
    let object = jni.find_class("java/lang/Object");
    let mid = object.and_then(|cls| {
        let mid = jni.get_method_id(cls, "toString", "()Ljava/lang/String;");
        jni.delete_local_ref(cls);
        mid
    });
    if jni.take_exception() {
        return None;
    }
    let mid = mid?;
    let _ = TO_STRING_ID.set(mid as usize);
    Some(mid)
}

/// The current thread's stack below the hook's own native frame.
fn capture_stack(jni: &JniEnv, jvmti: &Jvmti) -> Vec<StackFrame> {
    let frames = match jvmti.get_stack_trace(ptr::null_mut(), 1, MAX_STACK_DEPTH) {
        Ok(frames) => frames,
        Err(e) => {
            debug!(error = ?e, "GetStackTrace failed");
            return Vec::new();
        }
    };
    frames.iter().filter_map(|f| resolve_frame(jni, jvmti, f)).collect()
}

fn resolve_frame(jni: &JniEnv, jvmti: &Jvmti, frame: &jvmti::jvmtiFrameInfo) -> Option<StackFrame> {
    let method_name = jvmti.get_method_name(frame.method).ok()?;
    let class = jvmti.get_method_declaring_class(frame.method).ok()?;
    let class_name = jvmti.get_class_signature(class).ok().map(|sig| signature_to_binary_name(&sig));
    let source_file = jvmti.get_source_file_name(class).ok();
    jni.delete_local_ref(class);
    let class_name = class_name?;
    let native = jvmti.is_method_native(frame.method).unwrap_or(false);
    let line = if native || frame.location < 0 {
        None
    } else {
        jvmti
            .get_line_number_table(frame.method)
            .ok()
            .and_then(|table| {
                table
                    .iter()
                    .filter(|e| e.start_location <= frame.location)
                    .max_by_key(|e| e.start_location)
                    .map(|e| e.line_number)
            })
            .and_then(|line| u32::try_from(line).ok())
    };
    Some(StackFrame { class_name, method_name, source_file, line, native })
}
