use std::{
    fs::{self, File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::Result;
use log::{Level, LevelFilter, Log, Metadata, Record};
use parking_lot::Mutex;
use serde_json::json;

pub const LOG_JSON_PATH_ENV: &str = "BACKSWIPE_LOG_JSON_PATH";

/// Console lines plus optional JSON lines file, installed as the `log` backend.
pub struct Logger {
    level: LevelFilter,
    json_file: Mutex<Option<File>>,
}

impl Logger {
    pub fn from_env(level: LevelFilter) -> Result<Self> {
        let path = std::env::var(LOG_JSON_PATH_ENV).ok();
        Self::new(level, path.map(PathBuf::from))
    }

    pub fn new(level: LevelFilter, path: Option<PathBuf>) -> Result<Self> {
        let json_file = match path {
            Some(path) => {
                ensure_parent_dir(&path)?;
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                Some(file)
            }
            None => None,
        };
        Ok(Self {
            level,
            json_file: Mutex::new(json_file),
        })
    }

    pub fn install(self) -> Result<()> {
        let level = self.level;
        log::set_boxed_logger(Box::new(self))
            .map_err(|err| anyhow::anyhow!("logger already installed: {err}"))?;
        log::set_max_level(level);
        Ok(())
    }

    fn event(&self, level: Level, message: &str) {
        let mut guard = self.json_file.lock();
        let Some(file) = guard.as_mut() else {
            return;
        };

        let ts_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        let entry = json!({
            "ts_ms": ts_ms,
            "level": level.as_str().to_ascii_lowercase(),
            "msg": message,
        });

        let _ = writeln!(file, "{}", entry);
        let _ = file.flush();
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let message = record.args().to_string();
        match record.level() {
            Level::Error | Level::Warn => eprintln!("{message}"),
            _ => println!("{message}"),
        }
        self.event(record.level(), &message);
    }

    fn flush(&self) {
        if let Some(file) = self.json_file.lock().as_mut() {
            let _ = file.flush();
        }
    }
}

pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use serde_json::Value;

    use super::*;

    #[test]
    fn json_lines_carry_level_and_message() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("logs/run.jsonl");
        let logger = Logger::new(LevelFilter::Debug, Some(path.clone()))?;

        logger.event(Level::Info, "net: server_found endpoint=10.0.0.2:10086");
        logger.event(Level::Warn, "net: decode_failed seq=1");

        let raw = fs::read_to_string(&path)?;
        let lines = raw
            .lines()
            .map(serde_json::from_str::<Value>)
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["level"], "info");
        assert_eq!(lines[1]["level"], "warn");
        assert_eq!(lines[1]["msg"], "net: decode_failed seq=1");
        Ok(())
    }

    #[test]
    fn level_filter_gates_records() -> Result<()> {
        let logger = Logger::new(LevelFilter::Info, None)?;
        let debug = Metadata::builder().level(Level::Debug).build();
        let warn = Metadata::builder().level(Level::Warn).build();
        assert!(!logger.enabled(&debug));
        assert!(logger.enabled(&warn));
        Ok(())
    }
}
