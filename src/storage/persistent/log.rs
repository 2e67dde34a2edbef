//! Append-only history log.
//!
//! Every history write is appended as a [`LogRecord`] before it is applied to
//! the in-memory cache. On open the log is replayed up to the first damaged
//! or torn record and the file is cut back to that point so new appends are
//! never hidden behind garbage.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Result as IoResult, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::info::LookupInfo;
use crate::storage::HistoryEntry;

use super::codec;

/// One logged history operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum LogRecord {
    Put {
        normalized_number: String,
        info: LookupInfo,
        last_modified: DateTime<Utc>,
    },
    Delete {
        normalized_numbers: Vec<String>,
    },
    Clear,
}

impl From<HistoryEntry> for LogRecord {
    fn from(entry: HistoryEntry) -> Self {
        Self::Put {
            normalized_number: entry.normalized_number,
            info: entry.info,
            last_modified: entry.last_modified,
        }
    }
}

/// Records recovered from disk.
#[derive(Debug, Default)]
pub struct Replay {
    pub records: Vec<LogRecord>,
    /// Bytes dropped from a damaged tail.
    pub discarded_bytes: u64,
}

/// Writer half of the history log. Not internally synchronized.
#[derive(Debug)]
pub struct HistoryLog {
    path: PathBuf,
    writer: BufWriter<File>,
    sync_on_write: bool,
}

impl HistoryLog {
    /// Opens (or creates) the log at `path` and replays it.
    pub fn open(path: &Path, sync_on_write: bool) -> IoResult<(Self, Replay)> {
        let replay = if path.exists() && fs::metadata(path)?.len() >= codec::HEADER_LEN {
            recover(path)?
        } else {
            write_fresh(path, &[], sync_on_write)?;
            Replay::default()
        };

        let writer = BufWriter::new(OpenOptions::new().append(true).open(path)?);
        Ok((
            Self {
                path: path.to_path_buf(),
                writer,
                sync_on_write,
            },
            replay,
        ))
    }

    /// Appends and flushes one record.
    pub fn append(&mut self, record: &LogRecord) -> IoResult<()> {
        let bytes = codec::encode(record)?;
        self.writer.write_all(&bytes)?;
        self.writer.flush()?;
        if self.sync_on_write {
            self.writer.get_ref().sync_data()?;
        }
        Ok(())
    }

    pub fn size_bytes(&self) -> IoResult<u64> {
        Ok(fs::metadata(&self.path)?.len())
    }

    /// Replaces the log with `records`.
    ///
    /// The new log is written beside the old one and renamed over it, so a
    /// crash leaves one complete log or the other.
    pub fn rewrite(&mut self, records: &[LogRecord]) -> IoResult<()> {
        self.writer.flush()?;
        let tmp = self.path.with_extension("compact");
        write_fresh(&tmp, records, true)?;
        fs::rename(&tmp, &self.path)?;
        self.writer = BufWriter::new(OpenOptions::new().append(true).open(&self.path)?);
        Ok(())
    }
}

fn write_fresh(path: &Path, records: &[LogRecord], sync: bool) -> IoResult<()> {
    let mut file = BufWriter::new(
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?,
    );
    codec::write_header(&mut file)?;
    for record in records {
        file.write_all(&codec::encode(record)?)?;
    }
    file.flush()?;
    if sync {
        file.get_ref().sync_all()?;
    }
    Ok(())
}

fn recover(path: &Path) -> IoResult<Replay> {
    let file_len = fs::metadata(path)?.len();
    let mut reader = BufReader::new(File::open(path)?);
    codec::read_header(&mut reader)?;

    let mut records = Vec::new();
    let mut valid_len = codec::HEADER_LEN;
    while valid_len < file_len {
        match codec::decode::<LogRecord>(&mut reader) {
            Ok((record, consumed)) => {
                records.push(record);
                valid_len += consumed;
            }
            Err(e) => {
                if e.kind() != ErrorKind::UnexpectedEof {
                    tracing::warn!(offset = valid_len, error = %e, "damaged history record");
                }
                break;
            }
        }
    }

    let discarded_bytes = file_len - valid_len;
    if discarded_bytes > 0 {
        tracing::warn!(discarded_bytes, "truncating history log to last good record");
        OpenOptions::new().write(true).open(path)?.set_len(valid_len)?;
    }
    Ok(Replay {
        records,
        discarded_bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn put(n: &str) -> LogRecord {
        LogRecord::Put {
            normalized_number: n.to_string(),
            info: LookupInfo::default(),
            last_modified: Utc::now(),
        }
    }

    #[test]
    fn appends_replay_in_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.log");
        {
            let (mut log, replay) = HistoryLog::open(&path, false).unwrap();
            assert!(replay.records.is_empty());
            log.append(&put("a")).unwrap();
            log.append(&LogRecord::Delete {
                normalized_numbers: vec!["a".into()],
            })
            .unwrap();
        }

        let (_, replay) = HistoryLog::open(&path, false).unwrap();
        assert_eq!(replay.records.len(), 2);
        assert!(matches!(replay.records[1], LogRecord::Delete { .. }));
    }

    #[test]
    fn torn_tail_is_cut_and_appends_continue() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.log");
        {
            let (mut log, _) = HistoryLog::open(&path, false).unwrap();
            log.append(&put("a")).unwrap();
        }
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[1, 200, 0]).unwrap();
        drop(file);

        {
            let (mut log, replay) = HistoryLog::open(&path, false).unwrap();
            assert_eq!(replay.records.len(), 1);
            assert_eq!(replay.discarded_bytes, 3);
            log.append(&put("b")).unwrap();
        }

        let (_, replay) = HistoryLog::open(&path, false).unwrap();
        assert_eq!(replay.records.len(), 2);
        assert_eq!(replay.discarded_bytes, 0);
    }

    #[test]
    fn rewrite_replaces_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.log");
        let (mut log, _) = HistoryLog::open(&path, false).unwrap();
        for n in ["a", "b", "c"] {
            log.append(&put(n)).unwrap();
        }
        let before = log.size_bytes().unwrap();
        log.rewrite(&[put("c")]).unwrap();
        assert!(log.size_bytes().unwrap() < before);
        log.append(&put("d")).unwrap();
        drop(log);

        let (_, replay) = HistoryLog::open(&path, false).unwrap();
        assert_eq!(replay.records.len(), 2);
    }
}
