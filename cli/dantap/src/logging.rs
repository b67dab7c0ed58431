//! Logging initialization for the plugin.
//!
//! Diagnostics go to an append-only JSON log file. Standard output carries
//! the protocol result, so only warnings and errors are echoed to stderr.
//! Nothing here can fail a run: an unopenable log file or a failed write is
//! dropped silently.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::PluginConfig;

/// Append-only log writer that swallows I/O errors.
pub struct DiagnosticLog {
    file: Option<File>,
}

impl DiagnosticLog {
    /// Open `path` for appending. A file that cannot be opened disables the log.
    pub fn open(path: &Path) -> Self {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok();
        Self { file }
    }

    /// Returns true if writes reach a file.
    pub fn is_enabled(&self) -> bool {
        self.file.is_some()
    }
}

impl Write for DiagnosticLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(file) = &mut self.file {
            let _ = file.write_all(buf);
        }
        Ok(buf.len()) // Pretend we wrote everything
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(file) = &mut self.file {
            let _ = file.flush();
        }
        Ok(())
    }
}

/// Initialize logging. Safe to call more than once; later calls are no-ops.
pub fn init(config: &PluginConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let log = DiagnosticLog::open(&config.log_file);
    let file_layer = log.is_enabled().then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(Mutex::new(log))
            .with_filter(filter)
    });

    let stderr_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(io::stderr)
        .with_filter(LevelFilter::WARN);

    let _ = tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init();
}
