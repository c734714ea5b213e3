//! # sdhost
//!
//! The Arduino SD-card storage API backed by a host filesystem.
//!
//! Sketches written against `SD.open`/`File` run on a general-purpose OS by
//! translating each call into POSIX file and directory operations rooted at
//! a fixed mount point (`/media/mmcblk0p1` unless configured otherwise).
//!
//! ## Mapping
//!
//! ```text
//! SD.begin(cs)        VolumeManager::begin       mount table lookup
//! SD.open(p, mode)    VolumeManager::open        stat + open/opendir
//! SD.exists(p)        VolumeManager::exists      stat
//! SD.mkdir(p)         VolumeManager::make_directory   mkdir -p
//! SD.remove(p)        VolumeManager::remove_file      unlink
//! SD.rmdir(p)         VolumeManager::remove_directory rmdir
//! File                Handle
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use sdhost::{FileMode, VolumeConfig, VolumeManager};
//!
//! let sd = VolumeManager::new(VolumeConfig::default());
//! if !sd.begin(4) {
//!     return;
//! }
//!
//! sd.make_directory("logs").ok();
//! let mut log = sd.open("logs/boot.txt", FileMode::Write);
//! log.write_str("booted\n");
//! log.close();
//! ```

pub mod config;
pub mod error;
pub mod handle;
pub mod mount;
pub mod path;
pub mod volume;

pub use config::VolumeConfig;
pub use error::{FsStatus, StorageError};
pub use handle::{FileMode, Handle, FILE_READ, FILE_WRITE};
pub use mount::{MountEntry, MountTable};
pub use volume::VolumeManager;
