//! Resumable reads of one log file.
//!
//! `LogTail` picks up where the previous run left off. The byte offset of the
//! last complete line consumed is kept in a small JSON state file together
//! with the device and inode of the log, so a rotated or truncated log is
//! noticed and read again from the start.
//!
//! Only complete, newline terminated lines are returned. A trailing partial
//! line is left for the next run, when the writer will have finished it.

use serde_json;
use std::fs;
use std::io::{self, BufRead, Seek, Write};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use time;

/// Where a previous run stopped reading.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Offset {
    /// Device of the file the offset belongs to.
    pub dev: u64,
    /// Inode of the file the offset belongs to.
    pub ino: u64,
    /// Bytes consumed.
    pub offset: u64,
}

/// A stable, flat name for `logfile`, usable as a file name.
///
/// # Examples
///
/// ```
/// use logster::tail::state_key;
/// use std::path::Path;
///
/// assert_eq!(state_key(Path::new("/var/log/nginx/access.log")), "var-log-nginx-access.log");
/// ```
pub fn state_key(logfile: &Path) -> String {
    let raw = logfile.to_string_lossy();
    raw.trim_start_matches('/')
        .chars()
        .map(|c| match c {
            '/' | '\\' => '-',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect()
}

/// A log file opened at the offset its last run saved.
pub struct LogTail {
    path: PathBuf,
    state_path: PathBuf,
    reader: io::BufReader<fs::File>,
    file_id: (u64, u64),
    position: u64,
    previous_run: Option<SystemTime>,
    error: Option<io::Error>,
}

impl LogTail {
    /// Open `path`, resuming from the offset recorded in `state_path` if it
    /// still refers to the same file.
    pub fn open<P, S>(path: P, state_path: S) -> io::Result<LogTail>
    where
        P: Into<PathBuf>,
        S: Into<PathBuf>,
    {
        let path = path.into();
        let state_path = state_path.into();

        let (saved, previous_run) = match fs::File::open(&state_path) {
            Ok(fp) => {
                let modified = fp.metadata()?.modified().ok();
                let saved: Offset = serde_json::from_reader(fp).map_err(|e| {
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("corrupt state file {}: {}", state_path.display(), e),
                    )
                })?;
                (Some(saved), modified)
            }
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => (None, None),
            Err(e) => return Err(e),
        };

        let fp = fs::File::open(&path)?;
        let metadata = fp.metadata()?;
        let file_id = (metadata.dev(), metadata.ino());

        let position = match saved {
            Some(saved) if (saved.dev, saved.ino) != file_id => {
                info!("{} was rotated, reading from the start", path.display());
                0
            }
            Some(saved) if saved.offset > metadata.len() => {
                info!("{} was truncated, reading from the start", path.display());
                0
            }
            Some(saved) => saved.offset,
            None => 0,
        };

        let mut reader = io::BufReader::new(fp);
        reader.seek(io::SeekFrom::Start(position))?;
        debug!("reading {} from offset {}", path.display(), position);

        Ok(LogTail {
            path: path,
            state_path: state_path,
            reader: reader,
            file_id: file_id,
            position: position,
            previous_run: previous_run,
            error: None,
        })
    }

    /// The log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte offset just past the last complete line returned.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// When the state file was last written, if there is one.
    pub fn previous_run(&self) -> Option<SystemTime> {
        self.previous_run
    }

    /// Seconds since the previous run, or `default` on the first run.
    pub fn duration_secs(&self, default: f64) -> f64 {
        match self.previous_run {
            Some(t) => time::elapsed_millis(t) as f64 / 1_000.0,
            None => default,
        }
    }

    /// Read the next complete line, without its line terminator. `Ok(None)`
    /// at end of data, including when only a partial line remains.
    pub fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut buf = Vec::new();
        let read = self.reader.read_until(b'\n', &mut buf)?;
        if read == 0 {
            return Ok(None);
        }
        if buf.last() != Some(&b'\n') {
            let back = -(read as i64);
            self.reader.seek(io::SeekFrom::Current(back))?;
            return Ok(None);
        }
        self.position += read as u64;
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
        Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
    }

    /// The read error that ended iteration, if any.
    pub fn take_error(&mut self) -> Option<io::Error> {
        self.error.take()
    }

    /// Record the current position so the next run starts after the lines
    /// read here. The state file is replaced atomically.
    pub fn commit(&self) -> io::Result<()> {
        let state = Offset {
            dev: self.file_id.0,
            ino: self.file_id.1,
            offset: self.position,
        };
        let mut tmp = self.state_path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        {
            let mut fp = fs::File::create(&tmp)?;
            serde_json::to_writer(&mut fp, &state)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            fp.write_all(b"\n")?;
            fp.sync_all()?;
        }
        fs::rename(&tmp, &self.state_path)?;
        debug!(
            "committed offset {} for {}",
            self.position,
            self.path.display()
        );
        Ok(())
    }
}

/// Lines are yielded until the end of data or the first read error, which is
/// kept for `take_error`.
impl Iterator for LogTail {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.error.is_some() {
            return None;
        }
        match self.read_line() {
            Ok(line) => line,
            Err(e) => {
                self.error = Some(e);
                None
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs::{File, OpenOptions};
    use tempdir::TempDir;

    fn append(path: &Path, s: &str) {
        let mut fp = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        fp.write_all(s.as_bytes()).unwrap();
    }

    #[test]
    fn key_flattens_path() {
        assert_eq!(state_key(Path::new("/var/log/access.log")), "var-log-access.log");
        assert_eq!(state_key(Path::new("access.log")), "access.log");
        assert_eq!(state_key(Path::new("/tmp/my log")), "tmp-my_log");
    }

    #[test]
    fn resumes_at_committed_offset() {
        let dir = TempDir::new("logster-tail").unwrap();
        let log = dir.path().join("access.log");
        let state = dir.path().join("access.state");
        append(&log, "one\ntwo\n");

        let mut tail = LogTail::open(&log, &state).unwrap();
        assert!(tail.previous_run().is_none());
        assert_eq!(tail.duration_secs(60.0), 60.0);
        let lines: Vec<String> = tail.by_ref().collect();
        assert_eq!(lines, vec!["one", "two"]);
        assert_eq!(tail.position(), 8);
        assert!(tail.take_error().is_none());
        tail.commit().unwrap();

        append(&log, "three\n");
        let mut tail = LogTail::open(&log, &state).unwrap();
        assert!(tail.previous_run().is_some());
        assert!(tail.duration_secs(60.0) < 60.0);
        let lines: Vec<String> = tail.by_ref().collect();
        assert_eq!(lines, vec!["three"]);
    }

    #[test]
    fn uncommitted_reads_are_repeated() {
        let dir = TempDir::new("logster-tail").unwrap();
        let log = dir.path().join("access.log");
        let state = dir.path().join("access.state");
        append(&log, "one\n");

        let tail = LogTail::open(&log, &state).unwrap();
        assert_eq!(tail.collect::<Vec<String>>(), vec!["one"]);
        let tail = LogTail::open(&log, &state).unwrap();
        assert_eq!(tail.collect::<Vec<String>>(), vec!["one"]);
    }

    #[test]
    fn partial_line_is_left_for_later() {
        let dir = TempDir::new("logster-tail").unwrap();
        let log = dir.path().join("access.log");
        let state = dir.path().join("access.state");
        append(&log, "one\r\ntw");

        let mut tail = LogTail::open(&log, &state).unwrap();
        assert_eq!(tail.read_line().unwrap(), Some("one".to_string()));
        assert_eq!(tail.read_line().unwrap(), None);
        assert_eq!(tail.read_line().unwrap(), None);
        assert_eq!(tail.position(), 5);
        tail.commit().unwrap();

        append(&log, "o\n");
        let tail = LogTail::open(&log, &state).unwrap();
        assert_eq!(tail.collect::<Vec<String>>(), vec!["two"]);
    }

    #[test]
    fn truncation_restarts_at_zero() {
        let dir = TempDir::new("logster-tail").unwrap();
        let log = dir.path().join("access.log");
        let state = dir.path().join("access.state");
        append(&log, "a long first line\nand another\n");
        let mut tail = LogTail::open(&log, &state).unwrap();
        assert_eq!(tail.by_ref().count(), 2);
        tail.commit().unwrap();

        File::create(&log).unwrap();
        append(&log, "short\n");
        let tail = LogTail::open(&log, &state).unwrap();
        assert_eq!(tail.position(), 0);
        assert_eq!(tail.collect::<Vec<String>>(), vec!["short"]);
    }

    #[test]
    fn rotation_restarts_at_zero() {
        let dir = TempDir::new("logster-tail").unwrap();
        let log = dir.path().join("access.log");
        let state = dir.path().join("access.state");
        append(&log, "old\n");
        let mut tail = LogTail::open(&log, &state).unwrap();
        assert_eq!(tail.by_ref().count(), 1);
        tail.commit().unwrap();

        fs::rename(&log, dir.path().join("access.log.1")).unwrap();
        append(&log, "new one\nnew two\n");
        let tail = LogTail::open(&log, &state).unwrap();
        assert_eq!(tail.collect::<Vec<String>>(), vec!["new one", "new two"]);
    }

    #[test]
    fn state_file_is_json() {
        let dir = TempDir::new("logster-tail").unwrap();
        let log = dir.path().join("access.log");
        let state = dir.path().join("access.state");
        append(&log, "x\n");
        let mut tail = LogTail::open(&log, &state).unwrap();
        assert_eq!(tail.by_ref().count(), 1);
        tail.commit().unwrap();

        let saved: Offset = serde_json::from_reader(File::open(&state).unwrap()).unwrap();
        let meta = fs::metadata(&log).unwrap();
        assert_eq!(
            saved,
            Offset {
                dev: meta.dev(),
                ino: meta.ino(),
                offset: 2,
            }
        );
    }

    #[test]
    fn corrupt_state_is_an_error() {
        let dir = TempDir::new("logster-tail").unwrap();
        let log = dir.path().join("access.log");
        let state = dir.path().join("access.state");
        append(&log, "x\n");
        append(&state, "{not json");
        match LogTail::open(&log, &state) {
            Err(e) => assert_eq!(e.kind(), io::ErrorKind::InvalidData),
            Ok(_) => panic!("expected an error"),
        }
    }

    #[test]
    fn missing_log_is_an_error() {
        let dir = TempDir::new("logster-tail").unwrap();
        let res = LogTail::open(dir.path().join("nope.log"), dir.path().join("nope.state"));
        assert!(res.is_err());
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let dir = TempDir::new("logster-tail").unwrap();
        let log = dir.path().join("access.log");
        {
            let mut fp = File::create(&log).unwrap();
            fp.write_all(b"ok\n\xff\xfe bad\n").unwrap();
        }
        let tail = LogTail::open(&log, dir.path().join("s")).unwrap();
        let lines: Vec<String> = tail.collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].ends_with(" bad"));
    }
}
