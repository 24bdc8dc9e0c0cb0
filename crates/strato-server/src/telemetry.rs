//! Logging setup: stdout plus dated file output.
//!
//! File logs land under `LOG_BASE_DIR/YYYY-MM-DD/app.log`, one directory per
//! day, which is the layout the log cleanup loop garbage-collects.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Writer that reopens `base/<date>/app.log` whenever the UTC date rolls
/// over.
struct DailyDirWriter {
    base: PathBuf,
    state: Mutex<Option<(chrono::NaiveDate, File)>>,
}

impl DailyDirWriter {
    fn new(base: PathBuf) -> Self {
        Self {
            base,
            state: Mutex::new(None),
        }
    }

    fn open_for(&self, date: chrono::NaiveDate) -> std::io::Result<File> {
        let dir = self.base.join(date.format("%Y-%m-%d").to_string());
        std::fs::create_dir_all(&dir)?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("app.log"))
    }
}

impl Write for &DailyDirWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let today = chrono::Utc::now().date_naive();
        let mut state = self
            .state
            .lock()
            .map_err(|_| std::io::Error::other("log writer poisoned"))?;

        let reopen = !matches!(&*state, Some((date, _)) if *date == today);
        if reopen {
            *state = Some((today, self.open_for(today)?));
        }
        match state.as_mut() {
            Some((_, file)) => file.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| std::io::Error::other("log writer poisoned"))?;
        if let Some((_, file)) = state.as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}

/// Initialize tracing with an env-filtered stdout layer and a dated file
/// layer. Returns a guard that flushes the file writer on drop.
///
/// # Errors
///
/// Returns an error if the log base directory cannot be created.
pub fn init_telemetry(log_base_dir: &std::path::Path) -> anyhow::Result<tracing_appender::non_blocking::WorkerGuard> {
    std::fs::create_dir_all(log_base_dir)?;

    let writer = Box::leak(Box::new(DailyDirWriter::new(log_base_dir.to_path_buf())));
    let (file_writer, guard) = tracing_appender::non_blocking(&*writer);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,strato=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();

    Ok(guard)
}
