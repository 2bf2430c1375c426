//! Error types.
//!
//! None of these ever reach the instrumented application: rewrite errors
//! degrade to an unchanged class, sink errors are reported and dropped, and
//! setup errors leave the agent inactive.

use crate::sys::jni::jint;
use crate::sys::jvmti::jvmtiError;
use std::fmt;
use thiserror::Error;

pub use crate::classfile::ClassFileError;
pub use crate::descriptor::DescriptorError;

/// A single method could not be patched.
#[derive(Debug, Error)]
pub enum RewriteError {
    #[error(transparent)]
    ClassFile(#[from] ClassFileError),
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    #[error("method has {0} parameters, the hook array is limited to 255")]
    TooManyParameters(usize),
    #[error("patched code would be {0} bytes, above the 65535 limit")]
    CodeTooLarge(usize),
    #[error("method has no Code attribute")]
    MissingCode,
    #[error("code offset {0} cannot be shifted past the prologue")]
    OffsetOutOfRange(u16),
}

/// Agent setup failures.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("GetEnv failed for JVMTI: {0}")]
    GetEnv(jint),
    #[error("{call} failed: {error}")]
    Jvmti { call: &'static str, error: JvmtiError },
    #[error("could not define the hook class {0}")]
    DefineHookClass(&'static str),
    #[error("RegisterNatives failed: {0}")]
    RegisterNatives(jint),
    #[error("agent already initialized")]
    AlreadyInitialized,
    #[error(transparent)]
    ClassFile(#[from] ClassFileError),
}

/// A raw JVMTI error code, displayed by its symbolic name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JvmtiError(pub jvmtiError);

impl fmt::Display for JvmtiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.0 .0)
    }
}

impl std::error::Error for JvmtiError {}

impl JvmtiError {
    pub fn name(&self) -> &'static str {
        match self.0 {
            jvmtiError::NONE => "JVMTI_ERROR_NONE",
            jvmtiError::INVALID_THREAD => "JVMTI_ERROR_INVALID_THREAD",
            jvmtiError::INVALID_CLASS => "JVMTI_ERROR_INVALID_CLASS",
            jvmtiError::UNMODIFIABLE_CLASS => "JVMTI_ERROR_UNMODIFIABLE_CLASS",
            jvmtiError::NOT_AVAILABLE => "JVMTI_ERROR_NOT_AVAILABLE",
            jvmtiError::MUST_POSSESS_CAPABILITY => "JVMTI_ERROR_MUST_POSSESS_CAPABILITY",
            jvmtiError::NULL_POINTER => "JVMTI_ERROR_NULL_POINTER",
            jvmtiError::ABSENT_INFORMATION => "JVMTI_ERROR_ABSENT_INFORMATION",
            jvmtiError::ILLEGAL_ARGUMENT => "JVMTI_ERROR_ILLEGAL_ARGUMENT",
            jvmtiError::OUT_OF_MEMORY => "JVMTI_ERROR_OUT_OF_MEMORY",
            jvmtiError::WRONG_PHASE => "JVMTI_ERROR_WRONG_PHASE",
            jvmtiError::INTERNAL => "JVMTI_ERROR_INTERNAL",
            _ => "JVMTI_ERROR_UNKNOWN",
        }
    }
}

impl From<jvmtiError> for JvmtiError {
    fn from(e: jvmtiError) -> Self {
        JvmtiError(e)
    }
}

pub trait JvmtiResultExt<T> {
    /// Tags a raw JVMTI failure with the call that produced it.
    fn during(self, call: &'static str) -> Result<T, AgentError>;
}

impl<T> JvmtiResultExt<T> for Result<T, jvmtiError> {
    fn during(self, call: &'static str) -> Result<T, AgentError> {
        self.map_err(|e| AgentError::Jvmti { call, error: JvmtiError(e) })
    }
}
