//! Which (type, method) pairs get instrumented.
//!
//! The option string has the form `Type:method|method,Other:method+method`.
//! Type names are simple names (no package); matching is case sensitive.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use tracing::{info, warn};

/// Method matched on every candidate type when a non-blank option string
/// yields no usable pair.
pub const ANY_TYPE_METHOD: &str = "setOp";

const DEFAULT_TYPE: &str = "PlayerList";
const DEFAULT_METHODS: [&str; 2] = ["addOp", "op"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetMode {
    /// Only the listed pairs match.
    Explicit,
    /// Every candidate type matches `method`.
    AnyType { method: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    mode: TargetMode,
    types: HashMap<String, HashSet<String>>,
}

impl Default for TargetSpec {
    /// `PlayerList: addOp, op`
    fn default() -> Self {
        let methods = DEFAULT_METHODS.iter().map(|m| m.to_string()).collect();
        let mut types = HashMap::new();
        types.insert(DEFAULT_TYPE.to_string(), methods);
        Self { mode: TargetMode::Explicit, types }
    }
}

impl TargetSpec {
    /// Parses the agent option string.
    ///
    /// Never fails: malformed segments are logged and skipped.
    pub fn parse(input: Option<&str>) -> Self {
        let raw = match input.map(str::trim) {
            Some(s) if !s.is_empty() => s,
            _ => {
                let spec = Self::default();
                info!("no targets configured, using default {}", spec);
                return spec;
            }
        };

        let mut types: HashMap<String, HashSet<String>> = HashMap::new();
        for segment in raw.split(',') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            let Some((type_name, methods)) = segment.split_once(':') else {
                warn!(segment, "ignoring target without ':'");
                continue;
            };
            let type_name = type_name.trim();
            if type_name.is_empty() {
                warn!(segment, "ignoring target with empty type name");
                continue;
            }
            let methods: Vec<&str> = methods
                .split(['|', '+'])
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .collect();
            if methods.is_empty() {
                warn!(segment, "ignoring target with no methods");
                continue;
            }
            types
                .entry(type_name.to_string())
                .or_default()
                .extend(methods.into_iter().map(String::from));
        }

        if types.is_empty() {
            let spec = Self { mode: TargetMode::AnyType { method: ANY_TYPE_METHOD.to_string() }, types };
            info!("no valid targets in {:?}, matching '{}' on every type", raw, ANY_TYPE_METHOD);
            return spec;
        }

        let spec = Self { mode: TargetMode::Explicit, types };
        info!("loaded {} target type(s): {}", spec.types.len(), spec);
        spec
    }

    pub fn mode(&self) -> &TargetMode {
        &self.mode
    }

    /// Number of configured types; zero in `AnyType` mode.
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Methods configured for `simple_name`, `None` when the type is not
    /// targeted. Not meaningful in `AnyType` mode; use [`matches`](Self::matches).
    pub fn methods_for(&self, simple_name: &str) -> Option<&HashSet<String>> {
        self.types.get(simple_name)
    }

    /// Whether `method` on the type `simple_name` should be instrumented.
    pub fn matches(&self, simple_name: &str, method: &str) -> bool {
        match &self.mode {
            TargetMode::AnyType { method: wanted } => wanted == method,
            TargetMode::Explicit => self.types.get(simple_name).is_some_and(|m| m.contains(method)),
        }
    }

    /// Whether any method of `simple_name` could match. Lets the rewriter
    /// skip a class before looking at its methods.
    pub fn wants_type(&self, simple_name: &str) -> bool {
        match &self.mode {
            TargetMode::AnyType { .. } => true,
            TargetMode::Explicit => self.types.contains_key(simple_name),
        }
    }
}

impl fmt::Display for TargetSpec {
    /// Sorted, so the banner is stable: `A:x|y, B:z`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let TargetMode::AnyType { method } = &self.mode {
            return write!(f, "*:{}", method);
        }
        let sorted: BTreeMap<&String, BTreeSet<&String>> =
            self.types.iter().map(|(t, m)| (t, m.iter().collect())).collect();
        for (i, (ty, methods)) in sorted.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}:", ty)?;
            for (j, m) in methods.iter().enumerate() {
                if j > 0 {
                    f.write_str("|")?;
                }
                f.write_str(m)?;
            }
        }
        Ok(())
    }
}
