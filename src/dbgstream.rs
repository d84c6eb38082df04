//! Serialized debug output.
//!
//! All pipeline stages share one stderr sink behind a mutex so that
//! concurrent tasks never interleave partial lines.

use std::io::Write;
use std::sync::Mutex;

static SINK: Mutex<()> = Mutex::new(());

/// Write one line to the shared debug sink.
pub fn debug_line(msg: &str) {
    let _guard = SINK.lock().unwrap_or_else(|e| e.into_inner());
    let mut err = std::io::stderr().lock();
    let _ = writeln!(err, "{msg}");
}

/// Write a stage warning to the shared debug sink.
pub fn warn(stage: &str, msg: &str) {
    debug_line(&format!("{stage} warning: {msg}"));
}
