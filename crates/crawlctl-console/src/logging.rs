use crate::config::Config;
use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use tracing_subscriber::{fmt::writer::BoxMakeWriter, EnvFilter};

/// Keeps the developer log file alive for the lifetime of the console.
pub struct LogGuard {
    file: Option<Arc<Mutex<File>>>,
    path: Option<PathBuf>,
}

impl LogGuard {
    fn discarded() -> Self {
        Self {
            file: None,
            path: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

struct FileWriter {
    file: Arc<Mutex<File>>,
}

impl Write for FileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Ok(mut file) = self.file.lock() {
            let _ = file.write_all(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Ok(mut file) = self.file.lock() {
            let _ = file.flush();
        }
        Ok(())
    }
}

/// The terminal belongs to the UI, so traces only ever go to a file. When the
/// file cannot be opened they are dropped.
pub fn init_logging(config: &Config) -> LogGuard {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    let guard = open_log_file(&config.log_dir).unwrap_or_else(|_| LogGuard::discarded());
    let make_writer = match guard.file.clone() {
        Some(file) => BoxMakeWriter::new(move || FileWriter { file: file.clone() }),
        None => BoxMakeWriter::new(io::sink),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(make_writer)
        .try_init();
    guard
}

pub fn open_log_file(log_dir: &Path) -> io::Result<LogGuard> {
    fs::create_dir_all(log_dir)?;
    let path = log_dir.join(log_file_name());
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    Ok(LogGuard {
        file: Some(Arc::new(Mutex::new(file))),
        path: Some(path),
    })
}

fn log_file_name() -> String {
    format!("crawlctl-{}.log", std::process::id())
}
