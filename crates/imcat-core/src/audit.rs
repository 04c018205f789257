//! Audit log and checkpoint
//!
//! Every import item gets exactly one audit line recording its verdict.
//! The checkpoint file holds the timestamp of the last item whose verdict
//! was written, so an interrupted run resumes at item granularity.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::info;

/// Append-only per-item verdict log. Lines are
/// `<rfc3339 timestamp>\t<source id>\t<verdict>`.
pub struct AuditLog {
    writer: BufWriter<File>,
}

impl AuditLog {
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(AuditLog {
            writer: BufWriter::new(file),
        })
    }

    /// Append one verdict line and flush it. Flushing per item keeps the
    /// log usable as a crash-recovery trail.
    pub fn record(&mut self, source_id: &str, verdict: &str) -> std::io::Result<()> {
        let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        writeln!(self.writer, "{stamp}\t{source_id}\t{verdict}")?;
        self.writer.flush()
    }
}

/// Timestamp of the last fully processed item, persisted across runs.
pub struct Checkpoint {
    path: PathBuf,
}

impl Checkpoint {
    pub fn new(path: PathBuf) -> Self {
        Checkpoint { path }
    }

    /// Last saved timestamp, or None when no checkpoint exists yet. A
    /// malformed file is treated as absent and logged.
    pub fn load(&self) -> std::io::Result<Option<DateTime<Utc>>> {
        let mut contents = String::new();
        match File::open(&self.path) {
            Ok(mut file) => {
                file.read_to_string(&mut contents)?;
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err),
        }
        match DateTime::parse_from_rfc3339(contents.trim()) {
            Ok(stamp) => Ok(Some(stamp.with_timezone(&Utc))),
            Err(err) => {
                info!(path = %self.path.display(), %err, "ignoring malformed checkpoint");
                Ok(None)
            }
        }
    }

    pub fn save(&self, stamp: DateTime<Utc>) -> std::io::Result<()> {
        let mut file = File::create(&self.path)?;
        writeln!(file, "{}", stamp.to_rfc3339_opts(SecondsFormat::Secs, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_audit_lines_appended_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("import.log");
        {
            let mut log = AuditLog::open(&path).unwrap();
            log.record("marc:a.mrc:0:520", "loaded:/books/OL1M").unwrap();
            log.record("marc:a.mrc:520:410", "skipped:no title").unwrap();
        }
        {
            let mut log = AuditLog::open(&path).unwrap();
            log.record("ia:hamlet00shak", "matched:/books/OL1M").unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("marc:a.mrc:0:520\tloaded:/books/OL1M"));
        assert!(lines[1].ends_with("marc:a.mrc:520:410\tskipped:no title"));
        assert!(lines[2].ends_with("ia:hamlet00shak\tmatched:/books/OL1M"));
    }

    #[test]
    fn test_checkpoint_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint = Checkpoint::new(dir.path().join("state"));
        assert!(checkpoint.load().unwrap().is_none());

        let stamp = Utc.with_ymd_and_hms(2009, 3, 14, 15, 9, 26).unwrap();
        checkpoint.save(stamp).unwrap();
        assert_eq!(checkpoint.load().unwrap(), Some(stamp));
    }

    #[test]
    fn test_malformed_checkpoint_treated_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state");
        std::fs::write(&path, "not a timestamp\n").unwrap();
        let checkpoint = Checkpoint::new(path);
        assert!(checkpoint.load().unwrap().is_none());
    }
}
