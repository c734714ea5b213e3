//! The storage volume: mount check, path resolution and open/create/remove.

use std::fs::{self, DirBuilder, File, OpenOptions};
use std::io;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

use crate::config::VolumeConfig;
use crate::error::{FsStatus, StorageError};
use crate::handle::{DirStream, FileMode, Handle};
use crate::mount::MountTable;
use crate::path;

/// `S_IRWXU`, the mode new directories are created with.
const DIRECTORY_MODE: u32 = 0o700;

/// Host-backed replacement for the board's `SD` object.
///
/// Construct one per volume and pass it to whatever needs storage. It holds
/// only configuration, so cloning is cheap and clones address the same
/// volume.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeManager {
    config: VolumeConfig,
}

impl VolumeManager {
    pub fn new(config: VolumeConfig) -> Self {
        Self { config }
    }

    pub fn with_mount_point(mount_point: impl Into<PathBuf>) -> Self {
        Self::new(VolumeConfig::new(mount_point))
    }

    pub fn config(&self) -> &VolumeConfig {
        &self.config
    }

    pub fn mount_point(&self) -> &Path {
        &self.config.mount_point
    }

    /// Whether the mount point is listed in the mount table. The table is
    /// re-read on every call.
    pub fn check_mounted(&self) -> Result<(), StorageError> {
        let table = MountTable::read(&self.config.mount_table)?;
        let mount_point = self.config.mount_point.to_string_lossy();

        if table.is_mounted(&mount_point) {
            Ok(())
        } else {
            Err(StorageError::NotMounted {
                mount_point: self.config.mount_point.clone(),
            })
        }
    }

    /// Arduino `SD.begin`. The chip-select pin has no meaning on the host.
    pub fn begin(&self, _cs_pin: u8) -> bool {
        match self.check_mounted() {
            Ok(()) => true,
            Err(e) => {
                log::error!("{}", e);
                false
            }
        }
    }

    /// `<mount point>/<logical>`, subject to the containment setting.
    pub fn resolve(&self, logical: &str) -> Result<PathBuf, StorageError> {
        let resolved = path::resolve(
            &self.config.mount_point,
            logical,
            self.config.contain_paths,
        )?;
        log::debug!("Resolved {:?} to {}", logical, resolved.display());
        Ok(resolved)
    }

    /// Open `logical`, reporting failures through the log and answering
    /// with an empty handle.
    pub fn open(&self, logical: &str, mode: FileMode) -> Handle {
        self.try_open(logical, mode).unwrap_or_else(|e| {
            log::error!("{}", e);
            Handle::empty()
        })
    }

    /// Open with a raw `FILE_READ`/`FILE_WRITE` byte.
    pub fn open_raw(&self, logical: &str, mode: u8) -> Handle {
        match FileMode::try_from(mode) {
            Ok(mode) => self.open(logical, mode),
            Err(e) => {
                log::error!("{}", e);
                Handle::empty()
            }
        }
    }

    /// Same decision as [`VolumeManager::open`], with the cause on failure.
    ///
    /// A missing path is created as a file opened for append whatever the
    /// requested mode. An existing directory gives a directory handle, an
    /// existing regular file is opened according to `mode`, and anything
    /// else is refused.
    pub fn try_open(&self, logical: &str, mode: FileMode) -> Result<Handle, StorageError> {
        let resolved = self.resolve(logical)?;

        let metadata = match fs::metadata(&resolved) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("{} does not exist, creating it", resolved.display());
                let file = open_file(&resolved, FileMode::Write)?;
                return Ok(Handle::file(file, logical));
            }
            Err(source) => {
                return Err(StorageError::Stat {
                    path: resolved,
                    source,
                })
            }
        };

        if metadata.is_dir() {
            let dir = DirStream::open(resolved, self.clone())?;
            Ok(Handle::directory(dir, logical))
        } else if metadata.is_file() {
            let file = open_file(&resolved, mode)?;
            Ok(Handle::file(file, logical))
        } else {
            Err(StorageError::UnsupportedFileType { path: resolved })
        }
    }

    /// True iff `stat` succeeds on the resolved path, whatever its type.
    pub fn exists(&self, logical: &str) -> bool {
        match self.resolve(logical) {
            Ok(resolved) => fs::metadata(resolved).is_ok(),
            Err(e) => {
                log::error!("{}", e);
                false
            }
        }
    }

    /// Create `logical` and any missing parents.
    ///
    /// Every intermediate component is attempted and its failure ignored;
    /// only the creation of the final component decides the result. An
    /// already existing final directory is therefore an `AlreadyExists`
    /// error.
    pub fn make_directory(&self, logical: &str) -> FsStatus {
        let target = logical.strip_suffix('/').unwrap_or(logical);

        let separators = target
            .char_indices()
            .skip(1)
            .filter(|&(_, c)| c == '/')
            .map(|(idx, _)| idx);
        for idx in separators {
            if let Err(e) = self.create_one_directory(&target[..idx]) {
                log::debug!("Ignoring failure creating {:?}: {}", &target[..idx], e);
            }
        }

        self.create_one_directory(target)
    }

    fn create_one_directory(&self, logical: &str) -> FsStatus {
        let resolved = self.resolve(logical)?;
        DirBuilder::new()
            .mode(DIRECTORY_MODE)
            .create(&resolved)
            .map_err(|source| StorageError::io(resolved, source))
    }

    /// Delete the file at `logical`.
    pub fn remove_file(&self, logical: &str) -> FsStatus {
        let resolved = self.resolve(logical)?;
        fs::remove_file(&resolved).map_err(|source| StorageError::io(resolved, source))
    }

    /// Delete the empty directory at `logical`.
    pub fn remove_directory(&self, logical: &str) -> FsStatus {
        let resolved = self.resolve(logical)?;
        fs::remove_dir(&resolved).map_err(|source| StorageError::io(resolved, source))
    }
}

fn open_file(resolved: &Path, mode: FileMode) -> Result<File, StorageError> {
    let opened = match mode {
        FileMode::Read => File::open(resolved),
        FileMode::Write => OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(resolved),
    };

    opened.map_err(|source| StorageError::Open {
        path: resolved.to_path_buf(),
        source,
    })
}
