// Copyright 2024 FastLabs Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fs;
use std::fs::File;
use std::fs::Metadata;
use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use jiff::Zoned;
use jiff::tz::TimeZone;

use crate::Error;
use crate::retention::Retention;
use crate::rotation::Rotation;
use crate::rotation::RotationChecker;
use crate::trap::DefaultTrap;
use crate::trap::Trap;

const ARCHIVE_STAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S_%6f";

/// A file writer that rotates its file in place.
///
/// Before each write a [`RotationChecker`] built from the [`Rotation`] is asked whether the
/// file must roll over. When it must,
/// the current file is renamed to `<stem>.<YYYY-MM-DD_HH-MM-SS_ffffff>.<ext>` next to it, a fresh
/// file is opened under the original name, and the [`Retention`] prunes old archives.
#[derive(Debug)]
pub struct RotatingFileWriter {
    state: State,
    writer: File,
}

impl RotatingFileWriter {
    /// Creates a new [`RotatingFileWriterBuilder`] for the file at `path`.
    #[must_use]
    pub fn builder(path: impl Into<PathBuf>) -> RotatingFileWriterBuilder {
        RotatingFileWriterBuilder::new(path)
    }
}

impl Drop for RotatingFileWriter {
    fn drop(&mut self) {
        if let Err(err) = self.writer.flush() {
            let err = Error::unexpected("failed to flush file writer on dropped").with_source(err);
            self.state.trap.trap(&err);
        }
    }
}

impl Write for RotatingFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let writer = &mut self.writer;

        if self.state.should_rotate() {
            self.state.refresh_writer(writer);
        }

        writer
            .write(buf)
            .inspect(|&n| self.state.current_filesize += n as u64)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// A builder for configuring [`RotatingFileWriter`].
#[derive(Debug)]
pub struct RotatingFileWriterBuilder {
    // required
    path: PathBuf,

    // has default
    rotation: Option<Rotation>,
    retention: Option<Retention>,
    timezone: Option<TimeZone>,
    trap: Arc<dyn Trap>,
}

impl RotatingFileWriterBuilder {
    /// Creates a new [`RotatingFileWriterBuilder`].
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            rotation: None,
            retention: None,
            timezone: None,
            trap: Arc::new(DefaultTrap::default()),
        }
    }

    /// Set the rotation policy.
    #[must_use]
    pub fn rotation(mut self, rotation: Option<Rotation>) -> Self {
        self.rotation = rotation;
        self
    }

    /// Set the retention policy of rotated files.
    #[must_use]
    pub fn retention(mut self, retention: Option<Retention>) -> Self {
        self.retention = retention;
        self
    }

    /// Set the timezone of the daily rotation boundary. Defaults to the system timezone.
    #[must_use]
    pub fn timezone(mut self, timezone: Option<TimeZone>) -> Self {
        self.timezone = timezone;
        self
    }

    /// Set the trap for the rotating file writer.
    #[must_use]
    pub fn trap(mut self, trap: Arc<dyn Trap>) -> Self {
        self.trap = trap;
        self
    }

    /// Builds the [`RotatingFileWriter`], creating the file and its directory when missing.
    pub fn build(self) -> Result<RotatingFileWriter, Error> {
        let Self {
            path,
            rotation,
            retention,
            timezone,
            trap,
        } = self;

        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                Error::config("filename must not be empty").with_context("path", path.display())
            })?;
        let (stem, ext) = match filename.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem.to_string(), Some(ext.to_string())),
            _ => (filename.to_string(), None),
        };
        let log_dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&log_dir).map_err(|err| {
            Error::unexpected("failed to create log directory")
                .with_context("path", log_dir.display())
                .with_source(err)
        })?;

        let writer = open_log_file(&path)?;
        let current_filesize = writer.metadata().map(|m| m.len()).unwrap_or(0);
        let rotation = rotation.map(|rotation| match timezone {
            Some(tz) => rotation.checker().timezone(tz),
            None => rotation.checker(),
        });
        let state = State {
            path,
            log_dir,
            stem,
            ext,
            rotation,
            retention,
            current_filesize,
            trap,
        };

        if let Err(err) = state.apply_retention() {
            state.trap.trap(&err);
        }
        Ok(RotatingFileWriter { state, writer })
    }
}

fn open_log_file(path: &Path) -> Result<File, Error> {
    OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .map_err(|err| {
            Error::unexpected("failed to open log file")
                .with_context("path", path.display())
                .with_source(err)
        })
}

#[derive(Debug)]
struct Archive {
    filepath: PathBuf,
    metadata: Metadata,
    stamp: String,
    count: usize,
}

#[derive(Debug)]
struct State {
    path: PathBuf,
    log_dir: PathBuf,
    stem: String,
    ext: Option<String>,
    rotation: Option<RotationChecker>,
    retention: Option<Retention>,
    current_filesize: u64,
    trap: Arc<dyn Trap>,
}

impl State {
    fn should_rotate(&self) -> bool {
        self.rotation
            .as_ref()
            .is_some_and(|rotation| rotation.should_rotate(&self.path, self.current_filesize))
    }

    fn archive_name(&self, stamp: &str, count: usize) -> String {
        let stem = &self.stem;
        match (&self.ext, count) {
            (Some(ext), 0) => format!("{stem}.{stamp}.{ext}"),
            (Some(ext), n) => format!("{stem}.{stamp}.{n}.{ext}"),
            (None, 0) => format!("{stem}.{stamp}"),
            (None, n) => format!("{stem}.{stamp}.{n}"),
        }
    }

    fn archive_path(&self, now: &Zoned) -> PathBuf {
        let stamp = now.strftime(ARCHIVE_STAMP_FORMAT).to_string();
        let mut count = 0;
        loop {
            let candidate = self.log_dir.join(self.archive_name(&stamp, count));
            if !fs::exists(&candidate).unwrap_or(false) {
                return candidate;
            }
            count += 1;
        }
    }

    fn list_archives(&self) -> Result<Vec<Archive>, Error> {
        let read_dir = fs::read_dir(&self.log_dir).map_err(|err| {
            Error::unexpected(format!(
                "failed to read log dir: {}",
                self.log_dir.display()
            ))
            .with_source(err)
        })?;

        let files = read_dir
            .filter_map(|entry| {
                let entry = entry.ok()?;
                let filepath = entry.path();

                let metadata = entry.metadata().ok()?;
                // the writer only creates files, not directories or symlinks
                if !metadata.is_file() {
                    return None;
                }

                let filename = entry.file_name();
                // if the filename is not a UTF-8 string, skip it.
                let filename = filename.to_str()?;
                let mut rest = filename.strip_prefix(&self.stem)?.strip_prefix('.')?;
                if let Some(ext) = &self.ext {
                    rest = rest.strip_suffix(ext.as_str())?.strip_suffix('.')?;
                }

                let (stamp, count) = match rest.split_once('.') {
                    Some((stamp, count)) => (stamp, count.parse().ok()?),
                    None => (rest, 0),
                };
                if !is_archive_stamp(stamp) {
                    return None;
                }

                Some(Archive {
                    filepath,
                    metadata,
                    stamp: stamp.to_string(),
                    count,
                })
            })
            .collect::<Vec<_>>();

        Ok(files)
    }

    fn apply_retention(&self) -> Result<(), Error> {
        let Some(retention) = self.retention else {
            return Ok(());
        };

        let mut archives = self.list_archives()?;
        let expired = match retention {
            Retention::Files(max_files) => {
                if archives.len() <= max_files {
                    return Ok(());
                }
                // oldest first
                archives.sort_by(|a, b| (&a.stamp, a.count).cmp(&(&b.stamp, b.count)));
                let excess = archives.len() - max_files;
                archives.truncate(excess);
                archives
            }
            Retention::Age(max_age) => {
                let now = SystemTime::now();
                archives
                    .into_iter()
                    .filter(|archive| {
                        archive
                            .metadata
                            .modified()
                            .ok()
                            .and_then(|mtime| now.duration_since(mtime).ok())
                            .is_some_and(|age| age > max_age)
                    })
                    .collect()
            }
        };

        for archive in expired {
            let filepath = &archive.filepath;
            fs::remove_file(filepath).map_err(|err| {
                Error::unexpected(format!("failed to remove old log: {}", filepath.display()))
                    .with_source(err)
            })?;
        }

        Ok(())
    }

    fn rotate_log_writer(&self) -> Result<File, Error> {
        let archive_filepath = self.archive_path(&Zoned::now());
        fs::rename(&self.path, &archive_filepath).map_err(|err| {
            Error::unexpected(format!("failed to archive log: {}", self.path.display()))
                .with_source(err)
        })?;

        if let Err(err) = self.apply_retention() {
            let err = Error::unexpected("failed to delete oldest logs").with_source(err);
            self.trap.trap(&err);
        }

        open_log_file(&self.path)
    }

    fn refresh_writer(&mut self, file: &mut File) {
        if let Err(err) = file.flush() {
            let err = Error::unexpected("failed to flush previous writer").with_source(err);
            self.trap.trap(&err);
        }

        match self.rotate_log_writer() {
            Ok(new_file) => {
                *file = new_file;
                self.current_filesize = 0;
            }
            Err(err) => {
                let err = Error::unexpected("failed to rotate log writer").with_source(err);
                self.trap.trap(&err);
            }
        }
    }
}

fn is_archive_stamp(stamp: &str) -> bool {
    // YYYY-MM-DD_HH-MM-SS_ffffff
    stamp.len() == 26
        && stamp.bytes().enumerate().all(|(i, b)| match i {
            4 | 7 | 13 | 16 => b == b'-',
            10 | 19 => b == b'_',
            _ => b.is_ascii_digit(),
        })
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::Write;
    use std::time::Duration;

    use rand::Rng;
    use rand::distr::Alphanumeric;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_archive_stamp() {
        assert!(is_archive_stamp("2024-08-10_00-00-01_000123"));
        assert!(!is_archive_stamp("2024-08-10T00:00:01.000123"));
        assert!(!is_archive_stamp("2024-08-10"));
    }

    #[test]
    fn test_file_rolling_via_file_size() {
        test_file_rolling_for_specific_file_size(3, 1000);
        test_file_rolling_for_specific_file_size(3, 10000);
        test_file_rolling_for_specific_file_size(10, 8888);
    }

    fn test_file_rolling_for_specific_file_size(max_files: usize, max_size: u64) {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let path = temp_dir.path().join("app.log");

        let mut writer = RotatingFileWriter::builder(&path)
            .rotation(Some(Rotation::size(max_size)))
            .retention(Some(Retention::Files(max_files)))
            .build()
            .unwrap();

        for i in 1..=(max_files * 2) {
            let mut expected_file_size = 0;
            while expected_file_size < max_size {
                let rand_str = generate_random_string();
                expected_file_size += rand_str.len() as u64;
                assert_eq!(writer.write(rand_str.as_bytes()).unwrap(), rand_str.len());
                assert_eq!(writer.state.current_filesize, expected_file_size);
            }

            writer.flush().unwrap();
            // the current file plus at most `max_files` archives
            assert_eq!(
                fs::read_dir(temp_dir.path()).unwrap().count(),
                i.min(max_files + 1)
            );
        }

        assert!(path.exists());
        let archives = writer.state.list_archives().unwrap();
        assert_eq!(archives.len(), max_files);
    }

    #[test]
    fn test_archive_names() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let path = temp_dir.path().join("demo.std.all.log");

        let mut writer = RotatingFileWriter::builder(&path)
            .rotation(Some(Rotation::size(1)))
            .build()
            .unwrap();
        writer.write_all(b"first\n").unwrap();
        writer.write_all(b"second\n").unwrap();
        writer.write_all(b"third\n").unwrap();
        writer.flush().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "third\n");
        let mut archives = writer.state.list_archives().unwrap();
        assert_eq!(archives.len(), 2);
        archives.sort_by(|a, b| (&a.stamp, a.count).cmp(&(&b.stamp, b.count)));
        assert_eq!(fs::read_to_string(&archives[0].filepath).unwrap(), "first\n");
        assert_eq!(fs::read_to_string(&archives[1].filepath).unwrap(), "second\n");

        let name = archives[0].filepath.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("demo.std.all."), "{name}");
        assert!(name.ends_with(".log"), "{name}");
    }

    #[test]
    fn test_each_writer_anchors_its_own_rotation() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let path = temp_dir.path().join("app.log");
        let rotation = Rotation::daily(jiff::civil::time(0, 0, 0, 0));

        let mut first = RotatingFileWriter::builder(&path)
            .rotation(Some(rotation))
            .timezone(Some(TimeZone::UTC))
            .build()
            .unwrap();
        first.write_all(b"first mount\n").unwrap();
        let anchored = first.state.rotation.as_ref().unwrap().next_rotation_at();
        assert!(anchored.is_some());
        drop(first);

        let second = RotatingFileWriter::builder(&path)
            .rotation(Some(rotation))
            .build()
            .unwrap();
        let checker = second.state.rotation.as_ref().unwrap();
        assert_eq!(checker.next_rotation_at(), None);
        assert_eq!(checker.daily_boundary(), Some(jiff::civil::time(0, 0, 0, 0)));
    }

    #[test]
    fn test_retention_by_age() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let dir = temp_dir.path();

        let stale = dir.join("app.2024-01-01_00-00-00_000000.log");
        let fresh = dir.join("app.2024-01-02_00-00-00_000000.log");
        let unrelated = dir.join("other.2024-01-01_00-00-00_000000.log");
        for path in [&stale, &fresh, &unrelated] {
            fs::write(path, "old\n").unwrap();
        }
        let long_ago = SystemTime::now() - Duration::from_secs(3 * 24 * 3600);
        for path in [&stale, &unrelated] {
            File::options()
                .write(true)
                .open(path)
                .unwrap()
                .set_modified(long_ago)
                .unwrap();
        }

        let _writer = RotatingFileWriter::builder(dir.join("app.log"))
            .retention(Some(Retention::Age(Duration::from_secs(24 * 3600))))
            .build()
            .unwrap();

        assert!(!stale.exists());
        assert!(fresh.exists());
        assert!(unrelated.exists());
        assert!(dir.join("app.log").exists());
    }

    #[test]
    fn test_reopen_appends() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let path = temp_dir.path().join("nested").join("app.log");

        {
            let mut writer = RotatingFileWriter::builder(&path).build().unwrap();
            writer.write_all(b"before restart\n").unwrap();
        }
        let mut writer = RotatingFileWriter::builder(&path).build().unwrap();
        assert_eq!(writer.state.current_filesize, 15);
        writer.write_all(b"after restart\n").unwrap();
        writer.flush().unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "before restart\nafter restart\n"
        );
    }

    fn generate_random_string() -> String {
        let mut rng = rand::rng();
        let len = rng.random_range(50..=100);
        let random_string: String = std::iter::repeat(())
            .map(|()| rng.sample(Alphanumeric))
            .map(char::from)
            .take(len)
            .collect();

        random_string
    }
}
