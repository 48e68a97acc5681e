use crate::paths::AppPaths;
use crate::Result;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const RUN_LOG_ROTATE_BYTES: u64 = 1024 * 1024;
const RUN_LOG_MAX_BACKUPS: usize = 3;

/// Append-only JSONL history of sync runs under `<base>/logs`.
///
/// Every event is also forwarded to the `log` facade so it shows up on
/// stderr when `RUST_LOG` allows it.
#[derive(Debug, Clone)]
pub struct RunLog {
    path: PathBuf,
}

impl RunLog {
    pub fn new(paths: &AppPaths) -> Self {
        Self {
            path: paths.run_log_path(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn log_line(&self, level: &str, event: &str, data: serde_json::Value) -> Result<()> {
        log::log!(target: "dailywall::run", log_level(level), "{event} {data}");

        let line = serde_json::json!({
            "ts_ms": now_ms(),
            "level": level,
            "event": event,
            "data": data
        })
        .to_string();

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        rotate_if_needed(&self.path)?;
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?
            .write_all(format!("{line}\n").as_bytes())?;
        Ok(())
    }
}

fn log_level(level: &str) -> log::Level {
    match level {
        "error" => log::Level::Error,
        "warn" => log::Level::Warn,
        "debug" => log::Level::Debug,
        _ => log::Level::Info,
    }
}

/// Keeps the run log bounded: once `sync.jsonl` passes the size limit it
/// becomes `sync.jsonl.1`, older backups shift up by one and the oldest is
/// dropped. A missing log is not an error; the next write creates it.
fn rotate_if_needed(path: &Path) -> std::io::Result<()> {
    let Ok(meta) = std::fs::metadata(path) else {
        return Ok(());
    };
    if meta.len() < RUN_LOG_ROTATE_BYTES {
        return Ok(());
    }

    let oldest = backup_path(path, RUN_LOG_MAX_BACKUPS);
    if oldest.exists() {
        std::fs::remove_file(&oldest)?;
    }
    for generation in (1..RUN_LOG_MAX_BACKUPS).rev() {
        let backup = backup_path(path, generation);
        if backup.exists() {
            std::fs::rename(&backup, backup_path(path, generation + 1))?;
        }
    }
    std::fs::rename(path, backup_path(path, 1))
}

/// `sync.jsonl` -> `sync.jsonl.<generation>`, next to the live log.
fn backup_path(path: &Path, generation: usize) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{generation}"));
    PathBuf::from(name)
}

/// Wall-clock timestamp for log entries. A clock set before 1970 logs 0
/// rather than failing the run.
fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
