//! `tracing` initialization with size-based log rotation (ambient stack).
//!
//! `tracing-appender` only rotates on a time boundary, not a byte count, so
//! this module supplies its own `Write` sink (`updater.log`, `.1`, `.2`,
//! `.3`) wired into a `tracing_subscriber::fmt` layer the way the daemon this
//! engine descends from wires its own env-filtered fmt subscriber. The line
//! format (`<ISO8601> [LEVEL] <logger>: <msg>`) matches the Python reference's
//! `RotatingFileHandler` output exactly, via a custom `FormatEvent`.

use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing::Subscriber;
use tracing_subscriber::{
    fmt::{
        self,
        format::{FormatEvent, FormatFields, Writer},
        FmtContext,
    },
    registry::LookupSpan,
    EnvFilter,
};

use crate::constants::{LOG_BACKUP_COUNT, LOG_MAX_BYTES};

/// Renders `<ISO8601> [LEVEL] <logger>: <msg>`, the exact line shape the
/// Python reference's `logging.Formatter` produced.
struct LineFormat;

impl<S, N> FormatEvent<S, N> for LineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> core::fmt::Result {
        let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let metadata = event.metadata();
        write!(writer, "{now} [{}] {}: ", metadata.level(), metadata.target())?;
        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// A `Write` sink that rotates `updater.log` once it exceeds [`LOG_MAX_BYTES`],
/// keeping up to [`LOG_BACKUP_COUNT`] numbered backups.
struct RotatingFile {
    dir: PathBuf,
    base_name: String,
    file: File,
    size: u64,
}

impl RotatingFile {
    fn new(dir: PathBuf, base_name: &str) -> io::Result<Self> {
        fs::create_dir_all(&dir)?;
        let path = dir.join(base_name);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            dir,
            base_name: base_name.to_string(),
            file,
            size,
        })
    }

    fn rotate(&mut self) -> io::Result<()> {
        for index in (1..LOG_BACKUP_COUNT).rev() {
            let from = self.dir.join(format!("{}.{index}", self.base_name));
            let to = self.dir.join(format!("{}.{}", self.base_name, index + 1));
            if from.exists() {
                let _ = fs::rename(&from, &to);
            }
        }
        let current = self.dir.join(&self.base_name);
        let first_backup = self.dir.join(format!("{}.1", self.base_name));
        if current.exists() {
            fs::rename(&current, &first_backup)?;
        }
        self.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&current)?;
        self.size = 0;
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.size >= LOG_MAX_BYTES {
            self.rotate()?;
        }
        let written = self.file.write(buf)?;
        self.size += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

struct MutexWriter(Mutex<RotatingFile>);

impl Write for &MutexWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("log file mutex poisoned").write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.lock().expect("log file mutex poisoned").flush()
    }
}

/// Initializes the global `tracing` subscriber: writes to both `log_dir`
/// and stdout, filtered by `log_level` (or `RUST_LOG` when set).
pub fn init(log_dir: &Path, log_level: &str) -> io::Result<()> {
    let rotating = RotatingFile::new(log_dir.to_path_buf(), crate::constants::LOG_FILE_NAME)?;
    let writer: &'static MutexWriter = Box::leak(Box::new(MutexWriter(Mutex::new(rotating))));

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    let file_layer = fmt::layer()
        .with_ansi(false)
        .event_format(LineFormat)
        .with_writer(move || writer);

    let stdout_layer = fmt::layer().event_format(LineFormat);

    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .try_init()
        .map_err(|e| io::Error::other(e.to_string()))?;

    Ok(())
}
