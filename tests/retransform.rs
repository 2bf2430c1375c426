use call_logger::error::JvmtiError;
use call_logger::retransform::{retransform_resident, ClassHost, RetransformReport};
use call_logger::sys::jvmti::jvmtiError;
use call_logger::targets::TargetSpec;
use std::cell::RefCell;

struct FakeClass {
    name: Option<&'static str>,
    modifiable: bool,
    refuses: bool,
}

struct FakeHost {
    supported: bool,
    enumerate_fails: bool,
    classes: Vec<FakeClass>,
    requested: RefCell<Vec<usize>>,
}

impl FakeHost {
    fn new(classes: Vec<FakeClass>) -> Self {
        Self { supported: true, enumerate_fails: false, classes, requested: RefCell::new(Vec::new()) }
    }

    fn requested_names(&self) -> Vec<&'static str> {
        self.requested.borrow().iter().filter_map(|&i| self.classes[i].name).collect()
    }
}

impl ClassHost for FakeHost {
    type Class = usize;

    fn can_retransform(&self) -> bool {
        self.supported
    }

    fn loaded_classes(&self) -> Result<Vec<usize>, JvmtiError> {
        if self.enumerate_fails {
            return Err(JvmtiError(jvmtiError::OUT_OF_MEMORY));
        }
        Ok((0..self.classes.len()).collect())
    }

    fn class_name(&self, class: usize) -> Option<String> {
        self.classes[class].name.map(String::from)
    }

    fn is_modifiable(&self, class: usize) -> bool {
        self.classes[class].modifiable
    }

    fn retransform(&self, class: usize) -> Result<(), JvmtiError> {
        self.requested.borrow_mut().push(class);
        if self.classes[class].refuses {
            Err(JvmtiError(jvmtiError::UNMODIFIABLE_CLASS))
        } else {
            Ok(())
        }
    }
}

fn class(name: &'static str) -> FakeClass {
    FakeClass { name: Some(name), modifiable: true, refuses: false }
}

#[test]
fn unsupported_vm_requests_nothing() {
    let mut host = FakeHost::new(vec![class("com.example.PlayerList")]);
    host.supported = false;

    let report = retransform_resident(&host, &TargetSpec::default());
    assert_eq!(report, RetransformReport { requested: 0, failed: 0, unsupported: true });
    assert!(host.requested.borrow().is_empty());
}

#[test]
fn only_targeted_modifiable_candidates_are_requested() {
    let host = FakeHost::new(vec![
        class("com.example.PlayerList"),
        class("com.example.Other"),
        class("java.util.PlayerList"),
        FakeClass { name: Some("org.game.PlayerList"), modifiable: false, refuses: false },
        FakeClass { name: None, modifiable: true, refuses: false },
        class("PlayerList"),
        class("com.example.PlayerList$Entry"),
    ]);

    let report = retransform_resident(&host, &TargetSpec::default());
    assert_eq!(host.requested_names(), vec!["com.example.PlayerList", "PlayerList"]);
    assert_eq!(report, RetransformReport { requested: 2, failed: 0, unsupported: false });
}

#[test]
fn refusals_are_counted_and_do_not_stop_the_walk() {
    let host = FakeHost::new(vec![
        FakeClass { name: Some("a.PlayerList"), modifiable: true, refuses: true },
        class("b.PlayerList"),
        FakeClass { name: Some("c.PlayerList"), modifiable: true, refuses: true },
    ]);

    let report = retransform_resident(&host, &TargetSpec::default());
    assert_eq!(host.requested_names(), vec!["a.PlayerList", "b.PlayerList", "c.PlayerList"]);
    assert_eq!(report.requested, 3);
    assert_eq!(report.failed, 2);
}

#[test]
fn any_type_mode_requests_every_candidate() {
    let host = FakeHost::new(vec![class("com.example.A"), class("sun.misc.B"), class("org.C")]);

    let targets = TargetSpec::parse(Some("garbage"));
    let report = retransform_resident(&host, &targets);
    assert_eq!(host.requested_names(), vec!["com.example.A", "org.C"]);
    assert_eq!(report.requested, 2);
}

#[test]
fn enumeration_failure_yields_empty_report() {
    let mut host = FakeHost::new(vec![class("com.example.PlayerList")]);
    host.enumerate_fails = true;

    let report = retransform_resident(&host, &TargetSpec::default());
    assert_eq!(report, RetransformReport::default());
}
