//! Open file and directory handles.
//!
//! A [`Handle`] is what `VolumeManager::open` hands out: an open regular
//! file, an open directory stream, or nothing at all. The Arduino-style
//! methods never fail loudly. Errors are logged and the method returns
//! `0`, `None` or `false` instead. For `?`-friendly access the handle also
//! implements [`std::io::Read`], [`std::io::Write`] and [`std::io::Seek`].

use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use nix::dir::{Dir, OwningIter};
use nix::fcntl::OFlag;
use nix::sys::stat::Mode;

use crate::error::StorageError;
use crate::path;
use crate::volume::VolumeManager;

/// `O_READ` in the SdFat flag set.
pub const FILE_READ: u8 = 0x01;
/// `O_READ | O_WRITE | O_APPEND | O_CREAT` in the SdFat flag set.
pub const FILE_WRITE: u8 = 0x47;

/// Access mode requested from `open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileMode {
    /// Read-only, positioned at the start.
    #[default]
    Read,
    /// Read and append, creating the file when absent.
    Write,
}

impl TryFrom<u8> for FileMode {
    type Error = StorageError;

    fn try_from(mode: u8) -> Result<Self, Self::Error> {
        match mode {
            FILE_READ => Ok(FileMode::Read),
            FILE_WRITE => Ok(FileMode::Write),
            other => Err(StorageError::InvalidMode(other)),
        }
    }
}

impl From<FileMode> for u8 {
    fn from(mode: FileMode) -> Self {
        match mode {
            FileMode::Read => FILE_READ,
            FileMode::Write => FILE_WRITE,
        }
    }
}

/// A directory opened with `opendir(3)`.
///
/// Entries come straight from `readdir(3)`, so `.` and `..` are included
/// in whatever order the filesystem reports them.
pub(crate) struct DirStream {
    entries: OwningIter,
    resolved: PathBuf,
    volume: VolumeManager,
}

impl DirStream {
    pub(crate) fn open(resolved: PathBuf, volume: VolumeManager) -> Result<Self, StorageError> {
        let entries = open_dir(&resolved)?;
        Ok(Self {
            entries,
            resolved,
            volume,
        })
    }

    fn next_name(&mut self) -> Option<String> {
        match self.entries.next()? {
            Ok(entry) => Some(entry.file_name().to_string_lossy().into_owned()),
            Err(errno) => {
                log::error!("readdir failed on {}: {}", self.resolved.display(), errno);
                None
            }
        }
    }

    fn rewind(&mut self) -> Result<(), StorageError> {
        self.entries = open_dir(&self.resolved)?;
        Ok(())
    }
}

fn open_dir(resolved: &std::path::Path) -> Result<OwningIter, StorageError> {
    let dir = Dir::open(
        resolved,
        OFlag::O_RDONLY | OFlag::O_DIRECTORY | OFlag::O_CLOEXEC,
        Mode::empty(),
    )
    .map_err(|errno| StorageError::Open {
        path: resolved.to_path_buf(),
        source: io::Error::from(errno),
    })?;
    Ok(dir.into_iter())
}

enum Stream {
    Empty,
    File(File),
    Directory(DirStream),
}

/// An open file, an open directory, or the empty "not found" result.
pub struct Handle {
    stream: Stream,
    path: String,
    name: String,
}

impl Default for Handle {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.stream {
            Stream::Empty => "empty",
            Stream::File(_) => "file",
            Stream::Directory(_) => "directory",
        };
        f.debug_struct("Handle")
            .field("kind", &kind)
            .field("path", &self.path)
            .finish()
    }
}

impl Handle {
    /// The handle returned when nothing could be opened.
    pub fn empty() -> Self {
        Self {
            stream: Stream::Empty,
            path: String::new(),
            name: String::new(),
        }
    }

    pub(crate) fn file(file: File, logical: &str) -> Self {
        Self::with_stream(Stream::File(file), logical)
    }

    pub(crate) fn directory(dir: DirStream, logical: &str) -> Self {
        Self::with_stream(Stream::Directory(dir), logical)
    }

    fn with_stream(stream: Stream, logical: &str) -> Self {
        Self {
            stream,
            path: logical.to_string(),
            name: path::base_name(logical),
        }
    }

    fn file_mut(&mut self, op: &str) -> Option<&mut File> {
        match &mut self.stream {
            Stream::File(file) => Some(file),
            Stream::Directory(_) => {
                log::error!("{} on directory handle {}", op, self.path);
                None
            }
            Stream::Empty => {
                log::error!("{} on empty or closed handle", op);
                None
            }
        }
    }

    /// Base name of the logical path this handle was opened with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The logical path this handle was opened with.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether a file or directory stream is held.
    pub fn is_open(&self) -> bool {
        !matches!(self.stream, Stream::Empty)
    }

    pub fn write_byte(&mut self, byte: u8) -> usize {
        self.write(&[byte])
    }

    /// Write `buf` at the current position. Returns the number of bytes
    /// written, `0` on a directory or empty handle.
    pub fn write(&mut self, buf: &[u8]) -> usize {
        let Some(file) = self.file_mut("write") else {
            return 0;
        };
        match file.write_all(buf) {
            Ok(()) => buf.len(),
            Err(e) => {
                log::error!("write to {} failed: {}", self.path, e);
                0
            }
        }
    }

    pub fn write_str(&mut self, text: &str) -> usize {
        self.write(text.as_bytes())
    }

    /// Next byte, or `None` at end of file.
    pub fn read(&mut self) -> Option<u8> {
        let file = self.file_mut("read")?;
        let mut byte = [0u8; 1];
        loop {
            match file.read(&mut byte) {
                Ok(0) => return None,
                Ok(_) => return Some(byte[0]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    log::error!("read from {} failed: {}", self.path, e);
                    return None;
                }
            }
        }
    }

    /// Fill `buf` as far as the file allows. Returns the count read.
    pub fn read_buf(&mut self, buf: &mut [u8]) -> usize {
        let Some(file) = self.file_mut("read") else {
            return 0;
        };
        let mut total = 0;
        while total < buf.len() {
            match file.read(&mut buf[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::error!("read from {} failed: {}", self.path, e);
                    break;
                }
            }
        }
        total
    }

    /// Next byte without consuming it.
    pub fn peek(&mut self) -> Option<u8> {
        self.file_mut("peek")?;
        let byte = self.read()?;
        let file = self.file_mut("peek")?;
        if let Err(e) = file.seek(SeekFrom::Current(-1)) {
            log::error!("peek could not restore position: {}", e);
        }
        Some(byte)
    }

    /// Bytes between the current position and the end of the file.
    pub fn available(&mut self) -> u64 {
        match self.extent("available") {
            Some((current, end)) => end.saturating_sub(current),
            None => 0,
        }
    }

    /// Total length of the file.
    pub fn size(&mut self) -> u64 {
        self.extent("size").map(|(_, end)| end).unwrap_or(0)
    }

    /// Current position and end offset, found by seeking to the end and
    /// back. Not atomic with respect to other users of the same handle.
    fn extent(&mut self, op: &str) -> Option<(u64, u64)> {
        let file = self.file_mut(op)?;
        match measure(file) {
            Ok(extent) => Some(extent),
            Err(e) => {
                log::error!("{} on {} failed: {}", op, self.path, e);
                None
            }
        }
    }

    /// Move to an absolute offset. Returns whether the seek succeeded.
    pub fn seek(&mut self, offset: u64) -> bool {
        match self.file_mut("seek") {
            Some(file) => file.seek(SeekFrom::Start(offset)).is_ok(),
            None => false,
        }
    }

    pub fn position(&mut self) -> u64 {
        self.file_mut("position")
            .and_then(|file| file.stream_position().ok())
            .unwrap_or(0)
    }

    pub fn flush(&mut self) {
        if let Stream::File(file) = &mut self.stream {
            if let Err(e) = file.flush() {
                log::error!("flush of {} failed: {}", self.path, e);
            }
        }
    }

    /// True for a directory handle. An empty handle is reported as an
    /// error and answers `false`, same as a file.
    pub fn is_directory(&self) -> bool {
        match self.stream {
            Stream::Directory(_) => true,
            Stream::File(_) => false,
            Stream::Empty => {
                log::error!("isDirectory failed: handle not initialized");
                false
            }
        }
    }

    /// Open the next entry of this directory.
    ///
    /// One `.` entry and then one `..` entry are skipped, in that order and
    /// only if they come first; this is not a filter over the whole stream.
    /// Returns an empty handle once the directory is exhausted, and also
    /// when the entry cannot be opened.
    pub fn open_next_file(&mut self, mode: FileMode) -> Handle {
        let Some(name) = self.next_entry_name() else {
            return Handle::empty();
        };
        let Stream::Directory(dir) = &self.stream else {
            return Handle::empty();
        };

        let child = path::child(&self.path, &name);
        dir.volume.open(&child, mode)
    }

    /// Name of the next directory entry, with the same `.`/`..` skip as
    /// [`Handle::open_next_file`] but without opening (or creating) it.
    pub fn next_entry_name(&mut self) -> Option<String> {
        let Stream::Directory(dir) = &mut self.stream else {
            log::error!("openNextFile on non-directory handle {}", self.path);
            return None;
        };
        skip_dot_entries(|| dir.next_name())
    }

    /// Restart directory iteration from the first entry.
    pub fn rewind_directory(&mut self) {
        match &mut self.stream {
            Stream::Directory(dir) => {
                if let Err(e) = dir.rewind() {
                    log::error!("rewindDirectory failed: {}", e);
                }
            }
            _ => log::error!("rewindDirectory on non-directory handle {}", self.path),
        }
    }

    /// Release the underlying stream. Closing twice is harmless.
    pub fn close(&mut self) {
        if self.is_open() {
            log::debug!("Closing {}", self.path);
        }
        self.stream = Stream::Empty;
    }

    fn io_file(&mut self) -> io::Result<&mut File> {
        match &mut self.stream {
            Stream::File(file) => Ok(file),
            _ => Err(StorageError::NotAFile.into()),
        }
    }
}

/// Pull the next name from `next`, passing over a leading `.` and then a
/// `..` directly after it.
fn skip_dot_entries(mut next: impl FnMut() -> Option<String>) -> Option<String> {
    let mut name = next()?;
    if name == "." {
        name = next()?;
    }
    if name == ".." {
        name = next()?;
    }
    Some(name)
}

fn measure(file: &mut File) -> io::Result<(u64, u64)> {
    let current = file.stream_position()?;
    let end = file.seek(SeekFrom::End(0))?;
    file.seek(SeekFrom::Start(current))?;
    Ok((current, end))
}

impl Read for Handle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.io_file()?.read(buf)
    }
}

impl Write for Handle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.io_file()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.io_file()?.flush()
    }
}

impl Seek for Handle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.io_file()?.seek(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VolumeConfig;
    use tempfile::TempDir;

    fn volume() -> (TempDir, VolumeManager) {
        let dir = TempDir::new().unwrap();
        let volume = VolumeManager::new(VolumeConfig::new(dir.path()));
        (dir, volume)
    }

    fn file_with(volume: &VolumeManager, logical: &str, content: &[u8]) {
        let mut handle = volume.open(logical, FileMode::Write);
        assert_eq!(handle.write(content), content.len());
        handle.close();
    }

    #[test]
    fn mode_from_raw_byte() {
        assert_eq!(FileMode::try_from(FILE_READ).unwrap(), FileMode::Read);
        assert_eq!(FileMode::try_from(FILE_WRITE).unwrap(), FileMode::Write);
        assert!(matches!(
            FileMode::try_from(0x02u8),
            Err(StorageError::InvalidMode(0x02))
        ));
        assert_eq!(u8::from(FileMode::Write), FILE_WRITE);
    }

    #[test]
    fn empty_handle_is_closed() {
        let mut handle = Handle::default();
        assert!(!handle.is_open());
        assert!(!handle.is_directory());
        assert_eq!(handle.name(), "");
        assert_eq!(handle.write(b"data"), 0);
        assert_eq!(handle.read(), None);
        assert_eq!(handle.size(), 0);
        assert!(!handle.seek(0));

        handle.close();
        handle.close();
        assert!(!handle.is_open());
    }

    #[test]
    fn byte_reads_and_peek() {
        let (_dir, volume) = volume();
        file_with(&volume, "abc.txt", b"abc");

        let mut handle = volume.open("abc.txt", FileMode::Read);
        assert_eq!(handle.peek(), Some(b'a'));
        assert_eq!(handle.read(), Some(b'a'));
        assert_eq!(handle.peek(), Some(b'b'));
        assert_eq!(handle.position(), 1);
        assert_eq!(handle.read(), Some(b'b'));
        assert_eq!(handle.read(), Some(b'c'));
        assert_eq!(handle.peek(), None);
        assert_eq!(handle.read(), None);
    }

    #[test]
    fn read_buf_stops_at_end() {
        let (_dir, volume) = volume();
        file_with(&volume, "data.bin", b"0123456789");

        let mut handle = volume.open("data.bin", FileMode::Read);
        let mut buf = [0u8; 4];
        assert_eq!(handle.read_buf(&mut buf), 4);
        assert_eq!(&buf, b"0123");

        let mut rest = [0u8; 16];
        assert_eq!(handle.read_buf(&mut rest), 6);
        assert_eq!(&rest[..6], b"456789");
        assert_eq!(handle.read_buf(&mut rest), 0);
    }

    #[test]
    fn available_and_size_restore_position() {
        let (_dir, volume) = volume();
        file_with(&volume, "size.txt", b"hello world");

        let mut handle = volume.open("size.txt", FileMode::Read);
        assert_eq!(handle.size(), 11);
        assert_eq!(handle.available(), 11);

        assert!(handle.seek(6));
        assert_eq!(handle.available(), 5);
        assert_eq!(handle.size(), 11);
        assert_eq!(handle.position(), 6);
        assert_eq!(handle.read(), Some(b'w'));
    }

    #[test]
    fn write_mode_appends() {
        let (_dir, volume) = volume();
        file_with(&volume, "log.txt", b"one");

        let mut handle = volume.open("log.txt", FileMode::Write);
        assert!(handle.seek(0));
        handle.write_str(",two");
        handle.write_byte(b'!');
        handle.flush();
        assert_eq!(handle.size(), 8);

        assert!(handle.seek(0));
        let mut buf = [0u8; 8];
        assert_eq!(handle.read_buf(&mut buf), 8);
        assert_eq!(&buf, b"one,two!");
    }

    #[test]
    fn read_mode_rejects_writes() {
        let (_dir, volume) = volume();
        file_with(&volume, "ro.txt", b"x");

        let mut handle = volume.open("ro.txt", FileMode::Read);
        assert_eq!(handle.write(b"more"), 0);
        assert_eq!(handle.size(), 1);
    }

    #[test]
    fn names_come_from_logical_path() {
        let (_dir, volume) = volume();
        volume.make_directory("logs").unwrap();

        let handle = volume.open("logs/today.txt", FileMode::Write);
        assert_eq!(handle.name(), "today.txt");
        assert_eq!(handle.path(), "logs/today.txt");
    }

    #[test]
    fn close_keeps_name() {
        let (_dir, volume) = volume();
        let mut handle = volume.open("keep.txt", FileMode::Write);
        handle.close();
        assert!(!handle.is_open());
        assert_eq!(handle.name(), "keep.txt");
    }

    #[test]
    fn directory_handle_refuses_file_ops() {
        let (_dir, volume) = volume();
        volume.make_directory("d").unwrap();

        let mut handle = volume.open("d", FileMode::Read);
        assert!(handle.is_directory());
        assert_eq!(handle.write(b"x"), 0);
        assert_eq!(handle.read(), None);
        assert_eq!(handle.available(), 0);
    }

    #[test]
    fn open_next_file_visits_every_child_once() {
        let (_dir, volume) = volume();
        volume.make_directory("dir").unwrap();
        file_with(&volume, "dir/a.txt", b"a");
        file_with(&volume, "dir/b.txt", b"bb");
        volume.make_directory("dir/sub").unwrap();

        let mut dir = volume.open("dir", FileMode::Read);
        let mut seen = Vec::new();
        loop {
            let entry = dir.open_next_file(FileMode::Read);
            if !entry.is_open() {
                break;
            }
            seen.push((entry.name().to_string(), entry.is_directory()));
        }
        seen.sort();

        assert_eq!(
            seen,
            vec![
                ("a.txt".to_string(), false),
                ("b.txt".to_string(), false),
                ("sub".to_string(), true),
            ]
        );
    }

    #[test]
    fn open_next_file_child_paths_are_logical() {
        let (_dir, volume) = volume();
        volume.make_directory("only").unwrap();
        file_with(&volume, "only/file.txt", b"content");

        let mut dir = volume.open("only", FileMode::Read);
        let mut child = dir.open_next_file(FileMode::Read);
        assert_eq!(child.path(), "only/file.txt");
        assert_eq!(child.size(), 7);
        assert!(!dir.open_next_file(FileMode::Read).is_open());
    }

    #[test]
    fn rewind_restarts_iteration() {
        let (_dir, volume) = volume();
        volume.make_directory("r").unwrap();
        file_with(&volume, "r/one", b"1");

        let mut dir = volume.open("r", FileMode::Read);
        assert!(dir.open_next_file(FileMode::Read).is_open());
        assert!(!dir.open_next_file(FileMode::Read).is_open());

        dir.rewind_directory();
        let again = dir.open_next_file(FileMode::Read);
        assert_eq!(again.name(), "one");
    }

    fn skipped(names: &[&str]) -> Option<String> {
        let mut names = names.iter().map(|name| name.to_string());
        skip_dot_entries(|| names.next())
    }

    #[test]
    fn dot_entries_skipped_only_in_order() {
        assert_eq!(skipped(&[".", "..", "x"]), Some("x".to_string()));
        assert_eq!(skipped(&["..", ".", "x"]), Some(".".to_string()));
        assert_eq!(skipped(&["x", ".", ".."]), Some("x".to_string()));
        assert_eq!(skipped(&["..", "x"]), Some("x".to_string()));
        assert_eq!(skipped(&[".", "x"]), Some("x".to_string()));
    }

    #[test]
    fn exhausted_during_dot_skip() {
        assert_eq!(skipped(&[".", ".."]), None);
        assert_eq!(skipped(&["."]), None);
        assert_eq!(skipped(&[]), None);
    }

    #[test]
    fn open_next_file_on_empty_directory() {
        let (_dir, volume) = volume();
        volume.make_directory("empty").unwrap();

        let mut dir = volume.open("empty", FileMode::Read);
        assert!(dir.is_directory());
        assert!(!dir.open_next_file(FileMode::Read).is_open());
        assert_eq!(dir.next_entry_name(), None);
    }

    #[test]
    fn next_entry_name_does_not_open() {
        let (root, volume) = volume();
        let outside = TempDir::new().unwrap();
        let target = outside.path().join("target.txt");
        volume.make_directory("links").unwrap();
        std::os::unix::fs::symlink(&target, root.path().join("links/dangling")).unwrap();

        let mut dir = volume.open("links", FileMode::Read);
        assert_eq!(dir.next_entry_name(), Some("dangling".to_string()));
        assert_eq!(dir.next_entry_name(), None);
        assert!(!target.exists());
    }

    #[test]
    fn peek_on_directory_is_none() {
        let (_dir, volume) = volume();
        volume.make_directory("p").unwrap();

        let mut handle = volume.open("p", FileMode::Read);
        assert_eq!(handle.peek(), None);
        assert_eq!(Handle::empty().peek(), None);
    }

    #[test]
    fn open_next_file_on_file_handle_is_empty() {
        let (_dir, volume) = volume();
        let mut handle = volume.open("plain.txt", FileMode::Write);
        assert!(!handle.open_next_file(FileMode::Read).is_open());
    }

    #[test]
    fn io_traits_work_on_files() {
        let (_dir, volume) = volume();
        let mut handle = volume.open("io.txt", FileMode::Write);
        writeln!(handle, "line {}", 1).unwrap();
        Seek::seek(&mut handle, SeekFrom::Start(0)).unwrap();

        let mut text = String::new();
        handle.read_to_string(&mut text).unwrap();
        assert_eq!(text, "line 1\n");
    }

    #[test]
    fn io_traits_fail_on_empty() {
        let mut handle = Handle::empty();
        let err = handle.read_to_end(&mut Vec::new()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }
}
