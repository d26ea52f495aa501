//! Logging setup.
//!
//! `env_logger` on stderr, optionally teed into a dated log file
//! (`capview_YYYY-MM-DD.log`) with old files cleaned up.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use env_logger::{Builder, Env, Target};

use crate::config::LogConfig;
use crate::error::CapviewResult;

/// Maximum number of log files to keep
const MAX_LOG_FILES: usize = 5;

/// Initialize logging. Returns `false` when a logger was already installed,
/// which makes repeated calls harmless.
pub fn init_logging(config: &LogConfig) -> CapviewResult<bool> {
    let mut builder = Builder::from_env(Env::default().default_filter_or(config.level.as_str()));
    builder.format(|buf, record| {
        writeln!(
            buf,
            "[{}] [{}] [{}] {}",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        )
    });

    let mut log_path = None;
    if config.file {
        let dir = config.resolved_dir();
        fs::create_dir_all(&dir)?;
        let path = current_log_path(&dir);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        builder.target(Target::Pipe(Box::new(Tee { file })));
        cleanup_old_logs(&dir);
        log_path = Some(path);
    }

    if builder.try_init().is_err() {
        return Ok(false);
    }

    log::info!("[LOGGING] Logging initialized (filter: {})", config.level);
    if let Some(path) = log_path {
        log::info!("[LOGGING] Log file: {}", path.display());
    }
    Ok(true)
}

/// Path for the current log file (one per day)
pub fn current_log_path(log_dir: &Path) -> PathBuf {
    let date = Local::now().format("%Y-%m-%d");
    log_dir.join(format!("capview_{}.log", date))
}

/// Keep only the most recent MAX_LOG_FILES log files
fn cleanup_old_logs(log_dir: &Path) {
    let Ok(entries) = fs::read_dir(log_dir) else {
        return;
    };

    let mut log_files: Vec<_> = entries
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .extension()
                .map(|ext| ext == "log")
                .unwrap_or(false)
        })
        .collect();

    // Newest first
    log_files.sort_by(|a, b| {
        let a_time = a.metadata().and_then(|m| m.modified()).ok();
        let b_time = b.metadata().and_then(|m| m.modified()).ok();
        b_time.cmp(&a_time)
    });

    for file in log_files.into_iter().skip(MAX_LOG_FILES) {
        let _ = fs::remove_file(file.path());
    }
}

/// Writes every record to stderr and the log file.
struct Tee {
    file: File,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let _ = io::stderr().write_all(buf);
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = io::stderr().flush();
        self.file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    #[test]
    fn test_current_log_path_is_dated() {
        let path = current_log_path(Path::new("/logs"));
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("capview_"));
        assert!(name.ends_with(".log"));
        assert_eq!(name.len(), "capview_YYYY-MM-DD.log".len());
    }

    #[test]
    fn test_cleanup_keeps_newest() {
        let dir = tempfile::tempdir().unwrap();
        let base = SystemTime::now() - Duration::from_secs(3600);

        for i in 0..8u64 {
            let path = dir.path().join(format!("capview_{}.log", i));
            let file = File::create(&path).unwrap();
            file.set_modified(base + Duration::from_secs(i * 60)).unwrap();
        }
        fs::write(dir.path().join("notes.txt"), b"keep").unwrap();

        cleanup_old_logs(dir.path());

        let mut left: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        left.sort();
        assert_eq!(
            left,
            vec![
                "capview_3.log",
                "capview_4.log",
                "capview_5.log",
                "capview_6.log",
                "capview_7.log",
                "notes.txt"
            ]
        );
    }

    #[test]
    fn test_init_twice_is_harmless() {
        let config = LogConfig::default();
        let _ = init_logging(&config).unwrap();
        assert!(!init_logging(&config).unwrap());
    }
}
