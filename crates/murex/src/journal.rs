//! Append-only audit journal of blocked invocations.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};

/// Records every denied invocation as one human-readable line:
/// an ISO-8601 timestamp, `[BLOCKED]`, the command with its argument
/// vector, and the denial reason.
///
/// The journal never interferes with request handling: the log directory is
/// created on demand, and a failed write is logged and swallowed. With no
/// configured path the journal is inert.
#[derive(Debug, Default)]
pub struct BlockJournal {
    path: Option<PathBuf>,
}

impl BlockJournal {
    /// Create a journal writing to `path`; `None` disables it.
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    /// A journal that records nothing.
    pub fn disabled() -> Self {
        Self { path: None }
    }

    /// Append one blocked-invocation line. Never fails the caller.
    pub fn record(&self, command: &str, args: &[String], reason: &str) {
        let Some(path) = &self.path else {
            return;
        };
        if let Err(err) = append_line(path, command, args, reason) {
            tracing::warn!(path = %path.display(), %err, "failed to write block journal entry");
        }
    }
}

fn append_line(path: &Path, command: &str, args: &[String], reason: &str) -> std::io::Result<()> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        std::fs::create_dir_all(dir)?;
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    writeln!(
        file,
        "{timestamp} [BLOCKED] Command: {command} {args:?} Reason: {reason}"
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_record_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocked.log");
        let journal = BlockJournal::new(Some(path.clone()));

        journal.record("rm", &["-rf".to_string(), "/".to_string()], "denied");
        journal.record("sudo", &[], "denied");

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("[BLOCKED]"));
        assert!(lines[0].contains("Command: rm [\"-rf\", \"/\"]"));
        assert!(lines[0].contains("Reason: denied"));
        assert!(lines[1].contains("Command: sudo []"));
    }

    #[test]
    fn test_log_directory_created_on_demand() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit").join("nested").join("blocked.log");
        let journal = BlockJournal::new(Some(path.clone()));

        journal.record("rm", &[], "denied");

        assert!(path.exists());
    }

    #[test]
    fn test_disabled_journal_is_inert() {
        let journal = BlockJournal::disabled();
        journal.record("rm", &[], "denied");
    }

    #[test]
    fn test_write_failure_never_panics() {
        // Parent exists as a file, so creating the directory must fail.
        let dir = tempfile::tempdir().unwrap();
        let obstacle = dir.path().join("occupied");
        std::fs::write(&obstacle, b"x").unwrap();
        let journal = BlockJournal::new(Some(obstacle.join("blocked.log")));

        journal.record("rm", &[], "denied");
    }
}
