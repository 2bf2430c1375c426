//! Instrumenting classes that were loaded before the agent was ready.
//!
//! Retransforming a class re-runs the `ClassFileLoadHook` on its current
//! bytes, so the regular rewrite path does the actual patching.

use crate::descriptor::signature_to_binary_name;
use crate::env::Jvmti;
use crate::error::JvmtiError;
use crate::filter::is_candidate;
use crate::rewriter::simple_name;
use crate::sys::jni::jclass;
use crate::targets::TargetSpec;
use tracing::{debug, info, warn};

/// What the driver needs from the VM.
pub trait ClassHost {
    type Class: Copy;

    /// Whether retransformation is available in this VM.
    fn can_retransform(&self) -> bool;

    fn loaded_classes(&self) -> Result<Vec<Self::Class>, JvmtiError>;

    /// Binary name (`com.example.Foo`), `None` if it cannot be determined.
    fn class_name(&self, class: Self::Class) -> Option<String>;

    fn is_modifiable(&self, class: Self::Class) -> bool;

    fn retransform(&self, class: Self::Class) -> Result<(), JvmtiError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetransformReport {
    /// Classes handed to the VM for retransformation.
    pub requested: usize,
    /// Of those, how many the VM refused.
    pub failed: usize,
    pub unsupported: bool,
}

/// Requests retransformation of every resident class that is a candidate,
/// modifiable, and named by `targets`. Failures are logged per class and do
/// not stop the walk.
pub fn retransform_resident<H: ClassHost>(host: &H, targets: &TargetSpec) -> RetransformReport {
    let mut report = RetransformReport::default();
    if !host.can_retransform() {
        warn!("JVM does not support class retransformation, only classes loaded from now on are instrumented");
        report.unsupported = true;
        return report;
    }

    let classes = match host.loaded_classes() {
        Ok(classes) => classes,
        Err(e) => {
            warn!(error = %e, "cannot enumerate loaded classes");
            return report;
        }
    };

    for class in classes {
        let Some(name) = host.class_name(class) else {
            continue;
        };
        if !is_candidate(&name) || !targets.wants_type(simple_name(&name)) || !host.is_modifiable(class) {
            continue;
        }
        report.requested += 1;
        match host.retransform(class) {
            Ok(()) => debug!(class = %name, "retransformed"),
            Err(e) => {
                report.failed += 1;
                warn!(class = %name, error = %e, "retransform failed");
            }
        }
    }

    info!(requested = report.requested, failed = report.failed, "retransformed resident classes");
    report
}

/// [`ClassHost`] backed by a live JVMTI environment.
pub struct JvmtiHost<'a> {
    jvmti: &'a Jvmti,
    can_retransform: bool,
}

impl<'a> JvmtiHost<'a> {
    /// `can_retransform` is whether `can_retransform_classes` was acquired.
    pub fn new(jvmti: &'a Jvmti, can_retransform: bool) -> Self {
        Self { jvmti, can_retransform }
    }
}

impl ClassHost for JvmtiHost<'_> {
    type Class = jclass;

    fn can_retransform(&self) -> bool {
        self.can_retransform
    }

    fn loaded_classes(&self) -> Result<Vec<jclass>, JvmtiError> {
        self.jvmti.get_loaded_classes().map_err(JvmtiError)
    }

    fn class_name(&self, class: jclass) -> Option<String> {
        self.jvmti.get_class_signature(class).ok().map(|sig| signature_to_binary_name(&sig))
    }

    fn is_modifiable(&self, class: jclass) -> bool {
        self.jvmti.is_modifiable_class(class).unwrap_or(false)
    }

    fn retransform(&self, class: jclass) -> Result<(), JvmtiError> {
        self.jvmti.retransform_classes(&[class]).map_err(JvmtiError)
    }
}
