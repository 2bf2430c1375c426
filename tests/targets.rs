use call_logger::config::AgentConfig;
use call_logger::targets::{TargetMode, TargetSpec, ANY_TYPE_METHOD};
use std::collections::HashSet;
use std::path::PathBuf;

fn set(items: &[&str]) -> HashSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn parses_pairs_and_method_lists() {
    let spec = TargetSpec::parse(Some("A:x|y,B:z"));
    assert_eq!(spec.mode(), &TargetMode::Explicit);
    assert_eq!(spec.type_count(), 2);
    assert_eq!(spec.methods_for("A"), Some(&set(&["x", "y"])));
    assert_eq!(spec.methods_for("B"), Some(&set(&["z"])));
    assert_eq!(spec.methods_for("C"), None);
}

#[test]
fn absent_or_blank_input_loads_default() {
    for input in [None, Some(""), Some("   ")] {
        let spec = TargetSpec::parse(input);
        assert_eq!(spec, TargetSpec::default());
        assert_eq!(spec.methods_for("PlayerList"), Some(&set(&["addOp", "op"])));
        assert!(spec.matches("PlayerList", "op"));
        assert!(!spec.matches("Other", "setOp"));
    }
}

#[test]
fn plus_separator_whitespace_and_blanks() {
    let spec = TargetSpec::parse(Some(" A : x + y | ,, B:z "));
    assert_eq!(spec.methods_for("A"), Some(&set(&["x", "y"])));
    assert_eq!(spec.methods_for("B"), Some(&set(&["z"])));
}

#[test]
fn splits_on_first_colon_only() {
    let spec = TargetSpec::parse(Some("A:x:y"));
    assert_eq!(spec.methods_for("A"), Some(&set(&["x:y"])));
}

#[test]
fn repeated_types_accumulate() {
    let spec = TargetSpec::parse(Some("A:x,A:y|x"));
    assert_eq!(spec.type_count(), 1);
    assert_eq!(spec.methods_for("A"), Some(&set(&["x", "y"])));
}

#[test]
fn malformed_segments_are_skipped() {
    let spec = TargetSpec::parse(Some("nocolon,:x,A:,B:|,C:ok"));
    assert_eq!(spec.type_count(), 1);
    assert!(spec.matches("C", "ok"));
}

#[test]
fn nothing_valid_matches_set_op_everywhere() {
    let spec = TargetSpec::parse(Some("garbage,,:"));
    assert_eq!(spec.mode(), &TargetMode::AnyType { method: ANY_TYPE_METHOD.to_string() });
    assert_eq!(spec.type_count(), 0);
    assert!(spec.matches("Anything", "setOp"));
    assert!(!spec.matches("Anything", "addOp"));
    assert!(spec.wants_type("Whatever"));
}

#[test]
fn matching_is_case_sensitive() {
    let spec = TargetSpec::parse(Some("PlayerList:addOp"));
    assert!(spec.matches("PlayerList", "addOp"));
    assert!(!spec.matches("playerlist", "addOp"));
    assert!(!spec.matches("PlayerList", "addop"));
}

#[test]
fn display_is_sorted() {
    assert_eq!(TargetSpec::parse(Some("B:z,A:y|x")).to_string(), "A:x|y, B:z");
    assert_eq!(TargetSpec::parse(Some("junk")).to_string(), "*:setOp");
}

#[test]
fn config_output_settings() {
    let cfg = AgentConfig::from_parts(None, None, None);
    assert!(cfg.print_to_console);
    assert_eq!(cfg.log_file, None);
    assert_eq!(*cfg.targets, TargetSpec::default());

    let cfg = AgentConfig::from_parts(Some("A:x"), Some("FALSE"), Some(" /tmp/calls.log "));
    assert!(!cfg.print_to_console);
    assert_eq!(cfg.log_file, Some(PathBuf::from("/tmp/calls.log")));
    assert!(cfg.targets.matches("A", "x"));

    // Boolean.parseBoolean semantics: anything but "true" disables
    assert!(!AgentConfig::from_parts(None, Some("yes"), None).print_to_console);
    assert!(AgentConfig::from_parts(None, Some("True"), None).print_to_console);
    assert_eq!(AgentConfig::from_parts(None, None, Some("  ")).log_file, None);
}
