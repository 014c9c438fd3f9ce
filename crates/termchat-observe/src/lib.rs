use anyhow::Result;
use chrono::Utc;
use serde_json::{Value, json};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Append-only event log shared by the session and the CLI.
#[derive(Debug, Clone)]
pub struct Observer {
    log_path: Option<PathBuf>,
    run_id: Uuid,
    verbose: bool,
    echo_stderr: bool,
}

impl Observer {
    /// Log to `observe.log` inside `dir`, creating the directory.
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            log_path: Some(dir.join("observe.log")),
            run_id: Uuid::now_v7(),
            verbose: false,
            echo_stderr: true,
        })
    }

    /// An observer that drops everything.
    pub fn disabled() -> Self {
        Self {
            log_path: None,
            run_id: Uuid::now_v7(),
            verbose: false,
            echo_stderr: false,
        }
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Enable or disable verbose logging to stderr.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Stderr must stay quiet while a full-screen UI owns the terminal.
    pub fn set_stderr_echo(&mut self, enabled: bool) {
        self.echo_stderr = enabled;
    }

    /// Record a named event with structured fields. Non-object `fields` are
    /// stored under `"data"`.
    pub fn record(&self, event: &str, fields: Value) {
        let mut body = json!({
            "run_id": self.run_id.to_string(),
            "event": event,
        });
        if let Some(obj) = body.as_object_mut() {
            match fields {
                Value::Object(extra) => {
                    for (key, value) in extra {
                        obj.entry(key).or_insert(value);
                    }
                }
                Value::Null => {}
                other => {
                    obj.insert("data".to_string(), other);
                }
            }
        }
        let line = format!("{} EVENT {}", Utc::now().to_rfc3339(), body);
        let _ = self.append_log_line(&line);
        self.verbose_log(&format!("{event} {body}"));
    }

    /// Log a message to stderr with `[termchat]` prefix when verbose mode is on.
    pub fn verbose_log(&self, msg: &str) {
        if self.verbose && self.echo_stderr {
            eprintln!("[termchat] {msg}");
        }
    }

    /// Log a warning to the log file, and to stderr unless echo is off.
    pub fn warn_log(&self, msg: &str) {
        if self.echo_stderr {
            eprintln!("[termchat WARN] {msg}");
        }
        let _ = self.append_log_line(&format!("{} WARN {msg}", Utc::now().to_rfc3339()));
    }

    fn append_log_line(&self, line: &str) -> Result<()> {
        let Some(path) = &self.log_path else {
            return Ok(());
        };
        let mut f = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(f, "{line}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_log(observer: &Observer) -> String {
        fs::read_to_string(observer.log_path().expect("log path")).expect("read log")
    }

    #[test]
    fn record_appends_timestamped_json_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut observer = Observer::new(&dir.path().join("logs")).expect("observer");
        observer.set_stderr_echo(false);
        observer.record("stream.completed", json!({"chars": 12, "fragments": 3}));
        observer.record("session.ended", Value::Null);

        let log = read_log(&observer);
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 2);
        let (stamp, rest) = lines[0].split_once(" EVENT ").expect("event marker");
        assert!(chrono::DateTime::parse_from_rfc3339(stamp).is_ok());
        let body: Value = serde_json::from_str(rest).expect("json body");
        assert_eq!(body["event"], "stream.completed");
        assert_eq!(body["chars"], 12);
        assert_eq!(body["run_id"], observer.run_id().to_string());
    }

    #[test]
    fn reserved_keys_are_not_overwritten_by_fields() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut observer = Observer::new(dir.path()).expect("observer");
        observer.set_stderr_echo(false);
        observer.record("model.changed", json!({"event": "spoofed", "model": "x"}));
        observer.record("custom", json!("scalar"));
        let log = read_log(&observer);
        assert!(log.contains("\"event\":\"model.changed\""));
        assert!(log.contains("\"data\":\"scalar\""));
    }

    #[test]
    fn warnings_are_written_even_without_echo() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut observer = Observer::new(dir.path()).expect("observer");
        observer.set_stderr_echo(false);
        observer.warn_log("disk full");
        assert!(read_log(&observer).contains(" WARN disk full"));
    }

    #[test]
    fn disabled_observer_is_silent() {
        let observer = Observer::disabled();
        observer.record("anything", json!({}));
        assert!(observer.log_path().is_none());
    }
}
