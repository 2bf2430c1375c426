//! Namespaces that are never instrumented.
//!
//! Rewriting platform classes risks bootstrap cycles (the hook itself calls
//! into `java.lang`), and rewriting the agent's own hook class would recurse.

/// Blocked prefixes in binary form. `/` in a candidate name compares equal
/// to `.`, so internal names are checked without conversion.
pub const BLOCKED_PREFIXES: &[&str] = &["java.", "javax.", "jdk.", "sun.", "com.sun.", "jvmti.calllogger."];

/// Returns `true` when `name` may be instrumented.
///
/// Accepts `com.example.Foo` and `com/example/Foo` alike. Empty names are
/// rejected.
pub fn is_candidate(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    !BLOCKED_PREFIXES.iter().any(|prefix| has_prefix(name.as_bytes(), prefix.as_bytes()))
}

fn has_prefix(name: &[u8], prefix: &[u8]) -> bool {
    name.len() >= prefix.len()
        && name.iter().zip(prefix).all(|(&n, &p)| n == p || (n == b'/' && p == b'.'))
}
