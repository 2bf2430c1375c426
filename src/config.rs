//! Agent configuration.
//!
//! Targets come from the agent option string; the output destinations come
//! from JVM system properties:
//!
//! | Property | Default | Meaning |
//! |---|---|---|
//! | `debugAgent.printToConsole` | `true` | write records to stderr |
//! | `debugAgent.printToFile` | unset | append records to this file |

use crate::env::Jvmti;
use crate::sink::Sink;
use crate::targets::TargetSpec;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

pub const PRINT_TO_CONSOLE_PROPERTY: &str = "debugAgent.printToConsole";
pub const PRINT_TO_FILE_PROPERTY: &str = "debugAgent.printToFile";

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub targets: Arc<TargetSpec>,
    pub print_to_console: bool,
    pub log_file: Option<PathBuf>,
}

impl AgentConfig {
    /// Builds the configuration from raw values. `print_to_console` follows
    /// `Boolean.parseBoolean`: only a case-insensitive `true` enables it, and
    /// an absent value means enabled. A blank file path means no file.
    pub fn from_parts(options: Option<&str>, print_to_console: Option<&str>, print_to_file: Option<&str>) -> Self {
        let print_to_console = match print_to_console {
            None => true,
            Some(v) => v.trim().eq_ignore_ascii_case("true"),
        };
        let log_file = print_to_file.map(str::trim).filter(|p| !p.is_empty()).map(PathBuf::from);
        Self { targets: Arc::new(TargetSpec::parse(options)), print_to_console, log_file }
    }

    /// Reads the output properties from the VM. A property that cannot be
    /// read is treated as unset.
    pub fn from_jvm(options: Option<&str>, jvmti: &Jvmti) -> Self {
        let property = |name: &str| match jvmti.get_system_property(name) {
            Ok(value) => value,
            Err(e) => {
                warn!(property = name, error = ?e, "cannot read system property");
                None
            }
        };
        let console = property(PRINT_TO_CONSOLE_PROPERTY);
        let file = property(PRINT_TO_FILE_PROPERTY);
        Self::from_parts(options, console.as_deref(), file.as_deref())
    }

    pub fn sink(&self) -> Sink {
        Sink::new(self.print_to_console, self.log_file.clone())
    }
}
