use std::path::PathBuf;

use clap::Parser;

use sdhost::{VolumeConfig, VolumeManager};

mod commands;

use commands::{Command, CommandResult};

/// sdshell - inspect and modify an SD volume through the sdhost API
#[derive(Parser, Debug)]
#[command(name = "sdshell")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON config file (defaults to <config dir>/sdhost/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host directory the card is mounted on
    #[arg(long)]
    mount_point: Option<PathBuf>,

    /// Mount table to check the mount point against
    #[arg(long)]
    mount_table: Option<PathBuf>,

    /// Refuse paths containing `..`
    #[arg(long)]
    contain: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

fn load_config(args: &Args) -> Result<VolumeConfig, sdhost::StorageError> {
    let mut config = match &args.config {
        Some(path) => VolumeConfig::from_json_file(path)?
            .apply_env(|key| std::env::var(key).ok())?,
        None => VolumeConfig::load()?,
    };

    if let Some(mount_point) = &args.mount_point {
        config.mount_point = mount_point.clone();
    }
    if let Some(mount_table) = &args.mount_table {
        config.mount_table = mount_table.clone();
    }
    if args.contain {
        config.contain_paths = true;
    }

    config.validate()?;
    Ok(config)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    log::debug!("Using volume config {:?}", config);

    let volume = VolumeManager::new(config);
    match commands::execute(&args.command, &volume, !args.no_color) {
        CommandResult::Ok { display } => {
            if let Some(text) = display {
                if !text.is_empty() {
                    println!("{}", text);
                }
            }
        }
        CommandResult::Error(message) => {
            eprintln!("Error: {}", message);
            std::process::exit(1);
        }
    }
}
