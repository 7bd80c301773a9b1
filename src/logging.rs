//! Logging setup.
//!
//! Every module logs through the `log` facade. `init` installs an
//! `env_logger` backend that timestamps each line and writes it to both
//! stdout and `<data_dir>/logs/hudsync.log`.

use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::paths;

/// Log file name inside the logs directory.
const LOG_FILE_NAME: &str = "hudsync.log";

/// Set once `init` has installed the backend.
static LOGGER_READY: AtomicBool = AtomicBool::new(false);

/// Writes to stdout and, when available, an append-only log file.
struct TeeWriter {
    file: Option<File>,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stdout().write_all(buf)?;
        if let Some(file) = self.file.as_mut() {
            // A failing log file must not take console logging down with it.
            let _ = file.write_all(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()?;
        if let Some(file) = self.file.as_mut() {
            let _ = file.flush();
        }
        Ok(())
    }
}

fn open_log_file(path: &Path) -> Option<File> {
    OpenOptions::new().create(true).append(true).open(path).ok()
}

/// Installs the global logger. Safe to call more than once; later calls are no-ops.
pub fn init() {
    let log_path = paths::get_logs_dir().join(LOG_FILE_NAME);
    let writer = TeeWriter {
        file: open_log_file(&log_path),
    };

    let installed = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {:<5} {}: {}",
                Local::now().format("%H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(writer)))
        .try_init();
    if installed.is_ok() {
        LOGGER_READY.store(true, Ordering::SeqCst);
    }
}

/// Logs panics (with location) through the installed backend, or straight
/// to stderr and the log file when the backend is not up yet.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let msg = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        let location = panic_info
            .location()
            .map(|loc| format!(" at {}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_default();

        let line = format!("[PANIC]{} {}", location, msg);
        let log_path = paths::get_logs_dir().join(LOG_FILE_NAME);
        record_panic(&line, LOGGER_READY.load(Ordering::SeqCst), &log_path);
    }));
}

fn record_panic(line: &str, logger_ready: bool, log_path: &Path) {
    if logger_ready {
        // The backend already tees into the log file.
        log::error!("{}", line);
        return;
    }
    eprintln!("{}", line);
    if let Some(mut file) = open_log_file(log_path) {
        let _ = writeln!(file, "{}", line);
    }
}
