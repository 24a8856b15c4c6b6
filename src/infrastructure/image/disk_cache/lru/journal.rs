//! Append-only journal of LRU disk cache operations. Replaying it rebuilds the
//! entry index and its access order without rescanning the cache directory.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use lru::LruCache;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub(super) const JOURNAL_FILE: &str = "journal.jsonl";
const JOURNAL_TMP_FILE: &str = "journal.jsonl.tmp";
const JOURNAL_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(super) enum JournalRecord {
    Header { version: u32 },
    Dirty { key: String },
    Clean { key: String, len: u64 },
    Remove { key: String },
    Read { key: String },
}

/// State recovered from a journal.
#[derive(Debug, Default)]
pub(super) struct Replay {
    /// Committed entries, least recently used first.
    pub entries: Vec<(String, u64)>,
    /// Keys whose last edit never completed. Their files are garbage.
    pub abandoned: Vec<String>,
    /// Number of records read.
    pub records: usize,
    /// True if a torn final line was skipped.
    pub truncated: bool,
}

pub(super) struct Journal {
    path: PathBuf,
    file: File,
}

impl Journal {
    /// Reads the journal in `dir`. Returns `Ok(None)` if there is none.
    ///
    /// A malformed record anywhere but the last line is an error.
    pub(super) fn replay(dir: &Path) -> io::Result<Option<Replay>> {
        let file = match File::open(dir.join(JOURNAL_FILE)) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let lines: Vec<String> = BufReader::new(file)
            .lines()
            .collect::<io::Result<_>>()?;
        let lines: Vec<&str> = lines
            .iter()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty())
            .collect();

        let mut order: LruCache<String, Option<u64>> = LruCache::unbounded();
        let mut dirty: HashSet<String> = HashSet::new();
        let mut replay = Replay::default();

        for (index, line) in lines.iter().enumerate() {
            let record: JournalRecord = match serde_json::from_str(line) {
                Ok(record) => record,
                Err(e) if index + 1 == lines.len() && index > 0 => {
                    warn!(error = %e, "Skipping torn final journal record");
                    replay.truncated = true;
                    break;
                }
                Err(e) => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("invalid journal line {}: {e}", index + 1),
                    ));
                }
            };
            replay.records += 1;

            match record {
                JournalRecord::Header { version } if index == 0 => {
                    if version != JOURNAL_VERSION {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!("unsupported journal version {version}"),
                        ));
                    }
                }
                _ if index == 0 => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "journal header missing",
                    ));
                }
                JournalRecord::Header { .. } => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "unexpected journal header",
                    ));
                }
                JournalRecord::Dirty { key } => {
                    if order.get(&key).is_none() {
                        order.put(key.clone(), None);
                    }
                    dirty.insert(key);
                }
                JournalRecord::Clean { key, len } => {
                    dirty.remove(&key);
                    order.put(key, Some(len));
                }
                JournalRecord::Remove { key } => {
                    dirty.remove(&key);
                    order.pop(&key);
                }
                JournalRecord::Read { key } => {
                    order.get(&key);
                }
            }
        }

        for (key, len) in order.iter().rev() {
            match len {
                Some(len) if !dirty.contains(key) => replay.entries.push((key.clone(), *len)),
                _ => replay.abandoned.push(key.clone()),
            }
        }
        Ok(Some(replay))
    }

    /// Opens the existing journal in `dir` for appending.
    pub(super) fn open_append(dir: &Path) -> io::Result<Self> {
        let path = dir.join(JOURNAL_FILE);
        let file = OpenOptions::new().append(true).open(&path)?;
        Ok(Self { path, file })
    }

    /// Writes a compact journal describing `entries` (oldest first) and `editing`,
    /// replacing any previous journal atomically.
    pub(super) fn rewrite<'a>(
        dir: &Path,
        entries: impl Iterator<Item = (&'a String, &'a u64)>,
        editing: impl Iterator<Item = &'a String>,
    ) -> io::Result<Self> {
        let tmp_path = dir.join(JOURNAL_TMP_FILE);
        {
            let mut out = io::BufWriter::new(File::create(&tmp_path)?);
            write_record(
                &mut out,
                &JournalRecord::Header {
                    version: JOURNAL_VERSION,
                },
            )?;
            for (key, len) in entries {
                write_record(
                    &mut out,
                    &JournalRecord::Clean {
                        key: key.clone(),
                        len: *len,
                    },
                )?;
            }
            for key in editing {
                write_record(&mut out, &JournalRecord::Dirty { key: key.clone() })?;
            }
            out.flush()?;
            out.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, dir.join(JOURNAL_FILE))?;
        Self::open_append(dir)
    }

    pub(super) fn append(&mut self, record: &JournalRecord) -> io::Result<()> {
        write_record(&mut self.file, record)?;
        self.file.flush()
    }

    pub(super) fn path(&self) -> &Path {
        &self.path
    }
}

fn write_record(out: &mut impl Write, record: &JournalRecord) -> io::Result<()> {
    let mut line = serde_json::to_vec(record)?;
    line.push(b'\n');
    out.write_all(&line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_lines(dir: &Path, records: &[JournalRecord]) {
        let mut out = File::create(dir.join(JOURNAL_FILE)).unwrap();
        for record in records {
            write_record(&mut out, record).unwrap();
        }
    }

    fn key(name: &str) -> String {
        name.to_string()
    }

    #[test]
    fn test_replay_keeps_access_order() {
        let dir = TempDir::new().unwrap();
        write_lines(
            dir.path(),
            &[
                JournalRecord::Header { version: 1 },
                JournalRecord::Dirty { key: key("a") },
                JournalRecord::Clean { key: key("a"), len: 1 },
                JournalRecord::Dirty { key: key("b") },
                JournalRecord::Clean { key: key("b"), len: 2 },
                JournalRecord::Read { key: key("a") },
            ],
        );

        let replay = Journal::replay(dir.path()).unwrap().unwrap();

        assert_eq!(replay.entries, vec![(key("b"), 2), (key("a"), 1)]);
        assert!(replay.abandoned.is_empty());
        assert_eq!(replay.records, 6);
    }

    #[test]
    fn test_replay_reports_unfinished_edits() {
        let dir = TempDir::new().unwrap();
        write_lines(
            dir.path(),
            &[
                JournalRecord::Header { version: 1 },
                JournalRecord::Dirty { key: key("a") },
                JournalRecord::Clean { key: key("a"), len: 1 },
                JournalRecord::Dirty { key: key("b") },
                JournalRecord::Dirty { key: key("a") },
            ],
        );

        let replay = Journal::replay(dir.path()).unwrap().unwrap();

        assert!(replay.entries.is_empty());
        assert_eq!(replay.abandoned.len(), 2);
    }

    #[test]
    fn test_replay_skips_torn_last_line() {
        let dir = TempDir::new().unwrap();
        write_lines(
            dir.path(),
            &[
                JournalRecord::Header { version: 1 },
                JournalRecord::Clean { key: key("a"), len: 3 },
            ],
        );
        let mut file = OpenOptions::new()
            .append(true)
            .open(dir.path().join(JOURNAL_FILE))
            .unwrap();
        file.write_all(b"{\"op\":\"cle").unwrap();

        let replay = Journal::replay(dir.path()).unwrap().unwrap();

        assert!(replay.truncated);
        assert_eq!(replay.entries, vec![(key("a"), 3)]);
    }

    #[test]
    fn test_replay_rejects_corrupt_middle_line() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(JOURNAL_FILE),
            "{\"op\":\"header\",\"version\":1}\ngarbage\n{\"op\":\"read\",\"key\":\"a\"}\n",
        )
        .unwrap();

        let err = Journal::replay(dir.path()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_missing_journal_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(Journal::replay(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_rewrite_round_trips_entries() {
        let dir = TempDir::new().unwrap();
        let entries = [(key("x"), 5u64), (key("y"), 7u64)];
        let mut journal = Journal::rewrite(
            dir.path(),
            entries.iter().map(|(k, v)| (k, v)),
            std::iter::empty(),
        )
        .unwrap();
        journal
            .append(&JournalRecord::Read { key: key("x") })
            .unwrap();

        let replay = Journal::replay(dir.path()).unwrap().unwrap();
        assert_eq!(replay.entries, vec![(key("y"), 7), (key("x"), 5)]);
    }
}
