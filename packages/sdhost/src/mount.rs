//! Reader for the host mount table (`/etc/mtab`, `/proc/mounts`).
//!
//! Each line holds whitespace-separated fields
//! `fsname dir type opts freq passno`. Fields escape blanks and
//! backslashes as three-digit octal sequences (`\040` for a space), the
//! same encoding `getmntent(3)` undoes.

use std::fs;
use std::path::Path;

use crate::error::StorageError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub fs_name: String,
    pub dir: String,
    pub fs_type: String,
    pub options: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountTable {
    entries: Vec<MountEntry>,
}

impl MountTable {
    /// Read and parse the table at `path`. Nothing is cached.
    pub fn read(path: &Path) -> Result<Self, StorageError> {
        let text = fs::read_to_string(path).map_err(|source| StorageError::MountTable {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&text))
    }

    /// Parse table text, skipping blank, comment and truncated lines.
    pub fn parse(text: &str) -> Self {
        let entries = text.lines().filter_map(parse_line).collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[MountEntry] {
        &self.entries
    }

    /// Exact string match against each entry's mount directory.
    pub fn find_dir(&self, dir: &str) -> Option<&MountEntry> {
        self.entries.iter().find(|entry| entry.dir == dir)
    }

    pub fn is_mounted(&self, dir: &str) -> bool {
        self.find_dir(dir).is_some()
    }
}

fn parse_line(line: &str) -> Option<MountEntry> {
    let line = line.trim_start();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let mut fields = line.split_whitespace();
    let fs_name = unescape(fields.next()?);
    let dir = unescape(fields.next()?);
    let fs_type = fields.next().map(unescape).unwrap_or_default();
    let options = fields.next().map(unescape).unwrap_or_default();

    Some(MountEntry {
        fs_name,
        dir,
        fs_type,
        options,
    })
}

/// Decode `\ooo` octal escapes. Malformed sequences are kept verbatim.
fn unescape(field: &str) -> String {
    if !field.contains('\\') {
        return field.to_string();
    }

    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|d| (b'0'..=b'7').contains(d)) {
                let value = digits
                    .iter()
                    .fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0'));
                if let Ok(byte) = u8::try_from(value) {
                    out.push(byte);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}
