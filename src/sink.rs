//! Where call records go.
//!
//! Records are written synchronously on the calling thread. The log file is
//! opened for every record with create+append and the record is handed to
//! the OS in a single `write_all`; a lock around that write keeps records
//! from different threads from interleaving.

use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub struct Sink {
    console: bool,
    file: Option<PathBuf>,
    file_lock: Mutex<()>,
}

impl Sink {
    pub fn new(console: bool, file: Option<PathBuf>) -> Self {
        Self { console, file, file_lock: Mutex::new(()) }
    }

    /// Whether any destination is configured. Callers skip building records
    /// when this is false.
    pub fn is_enabled(&self) -> bool {
        self.console || self.file.is_some()
    }

    pub fn console_enabled(&self) -> bool {
        self.console
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    /// Writes `record` to every enabled destination. Never fails; a file
    /// error is reported on the console when the console is enabled.
    pub fn emit(&self, record: &str) {
        if self.console {
            let _ = write_console(record);
        }
        if let Some(path) = &self.file {
            if let Err(e) = self.append(path, record) {
                if self.console {
                    let _ = writeln!(io::stderr(), "[DEBUG-AGENT] failed to write {}: {}", path.display(), e);
                }
            }
        }
    }

    fn append(&self, path: &Path, record: &str) -> io::Result<()> {
        let _guard = self.file_lock.lock();
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(record.as_bytes())
    }
}

/// The record followed by an empty line, as one write.
fn write_console(record: &str) -> io::Result<()> {
    let mut out = String::with_capacity(record.len() + 1);
    out.push_str(record);
    out.push('\n');
    io::stderr().lock().write_all(out.as_bytes())
}
