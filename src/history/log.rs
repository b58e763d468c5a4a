//! JSONL writer/reader for request records.

use crate::history::RequestRecord;
use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Append-only request log, one file per day under one directory.
pub struct RequestLog {
    dir: PathBuf,
}

impl RequestLog {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create history directory: {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn day_path(&self, day: NaiveDate) -> PathBuf {
        self.dir.join(format!("requests-{}.jsonl", day))
    }

    /// Append a record to today's file. Flushes immediately so a crash
    /// cannot lose a decision that was already returned to a caller.
    pub fn append(&self, record: &RequestRecord) -> Result<()> {
        let path = self.day_path(record.timestamp.date_naive());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open history file: {}", path.display()))?;

        let json = serde_json::to_string(record).context("Failed to serialize request record")?;
        writeln!(file, "{}", json).context("Failed to write request record")?;
        file.flush().context("Failed to flush history file")?;
        Ok(())
    }

    fn read_day(&self, day: NaiveDate) -> Result<Vec<RequestRecord>> {
        let path = self.day_path(day);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read history file: {}", path.display()))?;

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .enumerate()
            .map(|(i, line)| {
                serde_json::from_str(line)
                    .with_context(|| format!("Bad history entry at line {}", i + 1))
            })
            .collect()
    }

    /// Today's records, newest first.
    pub fn today(&self) -> Result<Vec<RequestRecord>> {
        let mut records = self.read_day(Utc::now().date_naive())?;
        records.reverse();
        Ok(records)
    }

    /// How many requests a device has made today.
    pub fn today_count(&self, device_ip: &str) -> Result<u32> {
        let records = self.read_day(Utc::now().date_naive())?;
        Ok(records
            .iter()
            .filter(|r| r.device_ip == device_ip)
            .count() as u32)
    }

    /// The device's most recent records from today, newest first, capped at
    /// `limit`. The decision context window is the current day.
    pub fn recent(&self, device_ip: &str, limit: usize) -> Result<Vec<RequestRecord>> {
        let mut records: Vec<RequestRecord> = self
            .read_day(Utc::now().date_naive())?
            .into_iter()
            .filter(|r| r.device_ip == device_ip)
            .collect();
        records.reverse();
        records.truncate(limit);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::ScopePattern;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn record(device_ip: &str, url: &str, approved: bool) -> RequestRecord {
        RequestRecord {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            device_ip: device_ip.to_string(),
            device_name: None,
            url: url.to_string(),
            domain: "reddit.com".to_string(),
            reason: "testing".to_string(),
            room: Some("office".to_string()),
            approved,
            scope: ScopePattern::unrestricted(),
            duration_minutes: approved.then_some(30),
            message: "msg".to_string(),
            request_number_today: 1,
        }
    }

    #[test]
    fn test_append_and_read_back() {
        let tmp = TempDir::new().unwrap();
        let log = RequestLog::new(tmp.path()).unwrap();

        log.append(&record("10.0.0.2", "https://reddit.com/a", true)).unwrap();
        log.append(&record("10.0.0.2", "https://reddit.com/b", false)).unwrap();
        log.append(&record("10.0.0.3", "https://reddit.com/c", false)).unwrap();

        let today = log.today().unwrap();
        assert_eq!(today.len(), 3);
        // Newest first
        assert_eq!(today[0].url, "https://reddit.com/c");
        assert_eq!(today[2].url, "https://reddit.com/a");
    }

    #[test]
    fn test_today_count_is_per_device() {
        let tmp = TempDir::new().unwrap();
        let log = RequestLog::new(tmp.path()).unwrap();

        log.append(&record("10.0.0.2", "u1", true)).unwrap();
        log.append(&record("10.0.0.2", "u2", false)).unwrap();
        log.append(&record("10.0.0.3", "u3", false)).unwrap();

        assert_eq!(log.today_count("10.0.0.2").unwrap(), 2);
        assert_eq!(log.today_count("10.0.0.3").unwrap(), 1);
        assert_eq!(log.today_count("10.0.0.4").unwrap(), 0);
    }

    #[test]
    fn test_recent_is_capped_and_newest_first() {
        let tmp = TempDir::new().unwrap();
        let log = RequestLog::new(tmp.path()).unwrap();

        for i in 0..8 {
            log.append(&record("10.0.0.2", &format!("u{}", i), false)).unwrap();
        }

        let recent = log.recent("10.0.0.2", 5).unwrap();
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0].url, "u7");
        assert_eq!(recent[4].url, "u3");
    }

    #[test]
    fn test_empty_log_reads_empty() {
        let tmp = TempDir::new().unwrap();
        let log = RequestLog::new(tmp.path()).unwrap();
        assert!(log.today().unwrap().is_empty());
        assert_eq!(log.today_count("10.0.0.2").unwrap(), 0);
    }
}
