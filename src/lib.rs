//! # call_logger
//!
//! A JVMTI agent that logs every call to a configurable set of Java methods,
//! together with the receiver's class, the arguments and the call stack.
//!
//! Target methods are patched when their class is loaded: a short prologue
//! is spliced in front of the original body that hands the call to a native
//! method implemented in this crate. Classes that were already loaded when
//! the agent started are retransformed once.
//!
//! ## Usage
//!
//! ```bash
//! cargo build --release
//! java -agentpath:./target/release/libcall_logger.so=PlayerList:addOp|op,CraftEntity:setOp \
//!      -DdebugAgent.printToFile=/tmp/calls.log MyApp
//! ```
//!
//! The option string lists `Type:method|method` pairs separated by commas
//! (see [`targets`]). Output goes to stderr unless
//! `-DdebugAgent.printToConsole=false`, and is also appended to the file
//! named by `debugAgent.printToFile` when set. Diagnostics of the agent
//! itself are filtered by the `CALL_LOGGER_LOG` environment variable.
//!
//! The agent can also be loaded into a running VM through the Attach API.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │     agent: lifecycle, native hook, argument capture     │
//! ├─────────────────────────────────────────────────────────┤
//! │  targets · filter · rewriter · retransform · hook_class │
//! │        capture · record · sink · config · logging       │
//! │                          error                          │
//! ├─────────────────────────────────────────────────────────┤
//! │         classfile · descriptor (bytecode model)         │
//! ├─────────────────────────────────────────────────────────┤
//! │                env: Jvmti, JniEnv, LocalFrame           │
//! ├─────────────────────────────────────────────────────────┤
//! │                sys: raw JNI / JVMTI FFI                 │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything above `agent` is plain Rust and is tested without a JVM.

pub mod sys;
pub mod env;

// Implementation modules (use `env` module for the public API)
#[doc(hidden)]
pub mod jvmti_wrapper;
#[doc(hidden)]
pub mod jni_wrapper;

pub mod agent;
pub mod capture;
pub mod classfile;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod filter;
pub mod hook_class;
pub mod logging;
pub mod record;
pub mod retransform;
pub mod rewriter;
pub mod sink;
pub mod targets;

use std::sync::OnceLock;
pub use crate::sys::jni as jni;
use crate::sys::jvmti as jvmti;

/// The lifecycle and event surface of a JVMTI agent.
///
/// [`export_agent!`] creates one instance, stores it in [`GLOBAL_AGENT`] and
/// routes the VM's entry points and events to it. Events arrive on
/// arbitrary VM threads, hence `Sync + Send`.
pub trait Agent: Sync + Send {
    /// Called from `Agent_OnLoad` (`-agentpath` at startup).
    ///
    /// Return `JNI_OK` on success. Any other value aborts VM startup.
    fn on_load(&self, vm: *mut jni::JavaVM, options: &str) -> jni::jint;

    /// Called from `Agent_OnAttach` when loaded into a live VM.
    ///
    /// A non-`JNI_OK` return only fails the attach request.
    fn on_attach(&self, _vm: *mut jni::JavaVM, _options: &str) -> jni::jint {
        jni::JNI_ERR
    }

    /// Called when the agent library is unloaded.
    fn on_unload(&self) {}

    /// VM initialization is complete; JNI is fully usable.
    fn vm_init(&self, _jni: *mut jni::JNIEnv, _thread: jni::jthread) {}

    /// The VM is about to terminate.
    fn vm_death(&self, _jni: *mut jni::JNIEnv) {}

    /// Class bytes are about to be defined, redefined or retransformed.
    ///
    /// To replace them, allocate with `Jvmti::allocate`, copy the new bytes
    /// in and set `new_class_data_len` and `new_class_data`.
    fn class_file_load_hook(&self, _jni: *mut jni::JNIEnv, _class_being_redefined: jni::jclass,
                            _loader: jni::jobject, _name: *const std::os::raw::c_char,
                            _protection_domain: jni::jobject, _class_data_len: jni::jint,
                            _class_data: *const std::os::raw::c_uchar,
                            _new_class_data_len: *mut jni::jint,
                            _new_class_data: *mut *mut std::os::raw::c_uchar) {}
}

// This holds the Agent instance so static C functions can find it.
pub static GLOBAL_AGENT: OnceLock<Box<dyn Agent>> = OnceLock::new();

/// Helper to initialize the global agent (called by the macro)
pub fn set_global_agent(agent: Box<dyn Agent>) -> Result<(), ()> {
    GLOBAL_AGENT.set(agent).map_err(|_| ())
}

unsafe extern "system" fn trampoline_vm_init(_env: *mut jvmti::jvmtiEnv, jni: *mut jni::JNIEnv, thread: jni::jthread) {
    if let Some(agent) = GLOBAL_AGENT.get() { agent.vm_init(jni, thread); }
}
unsafe extern "system" fn trampoline_vm_death(_env: *mut jvmti::jvmtiEnv, jni: *mut jni::JNIEnv) {
    if let Some(agent) = GLOBAL_AGENT.get() { agent.vm_death(jni); }
}
unsafe extern "system" fn trampoline_class_file_load_hook(
    _env: *mut jvmti::jvmtiEnv, jni: *mut jni::JNIEnv,
    class_being_redefined: jni::jclass, loader: jni::jobject, name: *const std::os::raw::c_char,
    protection_domain: jni::jobject, class_data_len: jni::jint, class_data: *const std::os::raw::c_uchar,
    new_class_data_len: *mut jni::jint, new_class_data: *mut *mut std::os::raw::c_uchar
) {
    if let Some(agent) = GLOBAL_AGENT.get() {
        agent.class_file_load_hook(jni, class_being_redefined, loader, name, protection_domain, class_data_len, class_data, new_class_data_len, new_class_data);
    }
}

/// Returns a `jvmtiEventCallbacks` struct routing `VMInit`, `VMDeath` and
/// `ClassFileLoadHook` to the global [`Agent`].
///
/// Events still have to be enabled individually with
/// `Jvmti::set_event_notification_mode`.
pub fn get_default_callbacks() -> jvmti::jvmtiEventCallbacks {
    let mut callbacks = jvmti::jvmtiEventCallbacks::default();

    callbacks.VMInit = Some(trampoline_vm_init);
    callbacks.VMDeath = Some(trampoline_vm_death);
    callbacks.ClassFileLoadHook = Some(trampoline_class_file_load_hook);

    callbacks
}

/// Exports an agent type as a loadable JVMTI agent library.
///
/// Generates `Agent_OnLoad`, `Agent_OnAttach` and `Agent_OnUnload`. The type
/// must implement [`Agent`] and [`Default`]; one instance is created on
/// first load and kept for the life of the process.
///
/// ```rust,ignore
/// #[derive(Default)]
/// struct MyAgent;
///
/// impl call_logger::Agent for MyAgent {
///     fn on_load(&self, vm: *mut jni::JavaVM, options: &str) -> jni::jint {
///         jni::JNI_OK
///     }
/// }
///
/// call_logger::export_agent!(MyAgent);
/// ```
#[macro_export]
macro_rules! export_agent {
    ($agent_type:ty) => {
        #[no_mangle]
        pub unsafe extern "system" fn Agent_OnLoad(
            vm: *mut $crate::sys::jni::JavaVM,
            options: *mut std::ffi::c_char,
            _reserved: *mut std::ffi::c_void,
        ) -> $crate::sys::jni::jint {
            let agent = Box::new(<$agent_type>::default());
            if $crate::set_global_agent(agent).is_err() {
                return $crate::sys::jni::JNI_ERR;
            }

            let options_str = if options.is_null() {
                ""
            } else {
                std::ffi::CStr::from_ptr(options).to_str().unwrap_or("")
            };

            if let Some(global_agent) = $crate::GLOBAL_AGENT.get() {
                return global_agent.on_load(vm, options_str);
            }

            $crate::sys::jni::JNI_ERR
        }

        #[no_mangle]
        pub unsafe extern "system" fn Agent_OnAttach(
            vm: *mut $crate::sys::jni::JavaVM,
            options: *mut std::ffi::c_char,
            _reserved: *mut std::ffi::c_void,
        ) -> $crate::sys::jni::jint {
            // a second attach reuses the existing instance, which refuses it
            let _ = $crate::set_global_agent(Box::new(<$agent_type>::default()));

            let options_str = if options.is_null() {
                ""
            } else {
                std::ffi::CStr::from_ptr(options).to_str().unwrap_or("")
            };

            if let Some(global_agent) = $crate::GLOBAL_AGENT.get() {
                return global_agent.on_attach(vm, options_str);
            }

            $crate::sys::jni::JNI_ERR
        }

        #[no_mangle]
        pub unsafe extern "system" fn Agent_OnUnload(_vm: *mut $crate::sys::jni::JavaVM) {
            if let Some(agent) = $crate::GLOBAL_AGENT.get() {
                agent.on_unload();
            }
        }
    };
}

export_agent!(agent::CallLoggerAgent);
