//! Shell command execution.
//!
//! Commands:
//! - `check` - Verify the card is listed in the mount table
//! - `ls [path]` - List a directory (the card root by default)
//! - `cat <path>` - Print a file
//! - `write <path> <text>` - Append text to a file, creating it if needed
//! - `mkdir <path>` - Create a directory and its parents
//! - `rm <path>` - Delete a file
//! - `rmdir <path>` - Delete an empty directory
//! - `stat <path>` - Describe a path as JSON

use std::io::Read;

use clap::Subcommand;
use nu_ansi_term::Color;
use serde_json::json;

use sdhost::{FileMode, VolumeManager};

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Check that the card is mounted
    Check,
    /// List the entries of a directory
    Ls {
        #[arg(default_value = "")]
        path: String,
    },
    /// Print the contents of a file
    Cat { path: String },
    /// Append text to a file
    Write {
        path: String,
        text: String,
        /// Do not append a trailing newline
        #[arg(short = 'n', long)]
        no_newline: bool,
    },
    /// Create a directory, including missing parents
    Mkdir { path: String },
    /// Delete a file
    Rm { path: String },
    /// Delete an empty directory
    Rmdir { path: String },
    /// Show what a path is
    Stat { path: String },
}

/// Result of executing a command
#[derive(Debug, PartialEq, Eq)]
pub enum CommandResult {
    /// Command succeeded, optionally with output to display
    Ok { display: Option<String> },
    /// Command failed with an error message
    Error(String),
}

impl CommandResult {
    fn ok_display(display: impl Into<String>) -> Self {
        CommandResult::Ok {
            display: Some(display.into()),
        }
    }

    fn ok_none() -> Self {
        CommandResult::Ok { display: None }
    }
}

pub fn execute(command: &Command, volume: &VolumeManager, color: bool) -> CommandResult {
    match command {
        Command::Check => {
            if volume.begin(0) {
                CommandResult::ok_display(format!(
                    "{} is mounted",
                    volume.mount_point().display()
                ))
            } else {
                CommandResult::Error(format!(
                    "{} is not mounted",
                    volume.mount_point().display()
                ))
            }
        }
        Command::Ls { path } => list(volume, path, color),
        Command::Cat { path } => cat(volume, path),
        Command::Write {
            path,
            text,
            no_newline,
        } => {
            let mut handle = volume.open(path, FileMode::Write);
            if !handle.is_open() || handle.is_directory() {
                return CommandResult::Error(format!("Cannot write to {}", path));
            }
            let mut written = handle.write_str(text);
            if !no_newline {
                written += handle.write_byte(b'\n');
            }
            handle.close();
            CommandResult::ok_display(format!("{} bytes written", written))
        }
        Command::Mkdir { path } => status(volume.make_directory(path), "mkdir", path),
        Command::Rm { path } => status(volume.remove_file(path), "rm", path),
        Command::Rmdir { path } => status(volume.remove_directory(path), "rmdir", path),
        Command::Stat { path } => stat(volume, path),
    }
}

fn status(result: sdhost::FsStatus, op: &str, path: &str) -> CommandResult {
    match result {
        Ok(()) => CommandResult::ok_none(),
        Err(e) => CommandResult::Error(format!("{} {}: {}", op, path, e)),
    }
}

fn list(volume: &VolumeManager, path: &str, color: bool) -> CommandResult {
    if !volume.exists(path) {
        return CommandResult::Error(format!("No such directory: {}", path));
    }

    let mut dir = volume.open(path, FileMode::Read);
    if !dir.is_open() || !dir.is_directory() {
        return CommandResult::Error(format!("Not a directory: {}", path));
    }

    let mut lines = Vec::new();
    while let Some(name) = dir.next_entry_name() {
        // Opening an entry that does not resolve (a dangling link) would
        // create its target.
        let child = sdhost::path::child(path, &name);
        if !volume.exists(&child) {
            lines.push(format!("{:<32} {:>10}", name, "(dangling)"));
            continue;
        }

        let mut entry = volume.open(&child, FileMode::Read);
        let line = if !entry.is_open() {
            format!("{:<32} {:>10}", name, "(special)")
        } else if entry.is_directory() {
            let name = format!("{}/", name);
            if color {
                Color::Blue.bold().paint(name).to_string()
            } else {
                name
            }
        } else {
            let size = entry.size();
            format!("{:<32} {:>10}", name, size)
        };
        lines.push(line);
        entry.close();
    }

    CommandResult::ok_display(lines.join("\n"))
}

fn cat(volume: &VolumeManager, path: &str) -> CommandResult {
    // Opening a missing path would create it.
    if !volume.exists(path) {
        return CommandResult::Error(format!("No such file: {}", path));
    }

    let mut handle = volume.open(path, FileMode::Read);
    if !handle.is_open() || handle.is_directory() {
        return CommandResult::Error(format!("Not a file: {}", path));
    }

    let mut buffer = Vec::new();
    match Read::read_to_end(&mut handle, &mut buffer) {
        Ok(_) => CommandResult::ok_display(String::from_utf8_lossy(&buffer).into_owned()),
        Err(e) => CommandResult::Error(format!("cat {}: {}", path, e)),
    }
}

fn stat(volume: &VolumeManager, path: &str) -> CommandResult {
    if !volume.exists(path) {
        return CommandResult::ok_display(json!({"path": path, "exists": false}).to_string());
    }

    let mut handle = volume.open(path, FileMode::Read);
    let value = if !handle.is_open() {
        json!({"path": path, "exists": true, "type": "other"})
    } else if handle.is_directory() {
        json!({"path": path, "exists": true, "type": "directory"})
    } else {
        let size = handle.size();
        json!({
            "path": path,
            "exists": true,
            "type": "file",
            "name": handle.name(),
            "size": size,
        })
    };

    match serde_json::to_string_pretty(&value) {
        Ok(text) => CommandResult::ok_display(text),
        Err(e) => CommandResult::Error(format!("Failed to format stat result: {}", e)),
    }
}
