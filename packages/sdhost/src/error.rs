//! Error types for the volume and handle layers.

use std::io;
use std::path::PathBuf;

/// Outcome of a create/remove call on the volume.
///
/// `Ok(())` stands for the native primitive returning zero. Callers that
/// port code which tested the raw return value must compare against
/// `is_ok()`, never treat a "truthy" result as failure.
pub type FsStatus = Result<(), StorageError>;

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("Unable to read mount table {path}: {source}")]
    MountTable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Unable to locate SD mount path: {mount_point}")]
    NotMounted { mount_point: PathBuf },

    #[error("File mode error: {0:#04x} is neither FILE_READ nor FILE_WRITE")]
    InvalidMode(u8),

    #[error("Failed to stat file {path}: {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("not a file and not a directory {path}")]
    UnsupportedFileType { path: PathBuf },

    #[error("Logical path escapes the mount point: {path}")]
    PathEscapes { path: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Handle does not wrap an open file")]
    NotAFile,

    #[error("Invalid configuration: {message}")]
    Config { message: String },
}

impl StorageError {
    /// The `io::ErrorKind` closest to this error, for callers that want to
    /// branch on the native cause (e.g. `DirectoryNotEmpty`).
    pub fn kind(&self) -> io::ErrorKind {
        match self {
            StorageError::MountTable { source, .. }
            | StorageError::Stat { source, .. }
            | StorageError::Open { source, .. }
            | StorageError::Io { source, .. } => source.kind(),
            StorageError::NotMounted { .. } => io::ErrorKind::NotFound,
            StorageError::InvalidMode(_)
            | StorageError::PathEscapes { .. }
            | StorageError::Config { .. } => io::ErrorKind::InvalidInput,
            StorageError::UnsupportedFileType { .. } | StorageError::NotAFile => {
                io::ErrorKind::Unsupported
            }
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<StorageError> for io::Error {
    fn from(error: StorageError) -> Self {
        io::Error::new(error.kind(), error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn not_mounted_display() {
        let e = StorageError::NotMounted {
            mount_point: PathBuf::from("/media/mmcblk0p1"),
        };
        assert!(format!("{}", e).contains("/media/mmcblk0p1"));
        assert_eq!(e.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn invalid_mode_display() {
        let e = StorageError::InvalidMode(0x09);
        let display = format!("{}", e);
        assert!(display.contains("File mode error"));
        assert!(display.contains("0x09"));
    }

    #[test]
    fn io_kind_passes_through() {
        let e = StorageError::io(
            "/media/mmcblk0p1/dir",
            io::Error::from(io::ErrorKind::DirectoryNotEmpty),
        );
        assert_eq!(e.kind(), io::ErrorKind::DirectoryNotEmpty);
        assert!(StdError::source(&e).is_some());
    }

    #[test]
    fn config_error_has_no_source() {
        let e = StorageError::Config {
            message: "mount point must be absolute".to_string(),
        };
        assert!(StdError::source(&e).is_none());
        assert_eq!(e.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn converts_into_io_error() {
        let e: io::Error = StorageError::NotAFile.into();
        assert_eq!(e.kind(), io::ErrorKind::Unsupported);
    }
}
