//! Demo CLI: register backends from a mount table or a host directory
//! and read files through the registry.

pub mod fs;

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use evfs::config::MountTable;
use evfs::jail::JailFs;
use evfs::{OpenFlags, Registry};

use fs::HostFs;

#[derive(Parser)]
#[command(about = "Poke at EVFS backends from the command line")]
struct Cli {
    /// TOML mount table to apply before running the command.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host directory to register as the "host" backend.
    #[arg(long)]
    host: Option<PathBuf>,

    /// Register the host backend read-only.
    #[arg(long)]
    read_only: bool,

    /// Additionally register a "jail" shim confining the host backend
    /// to this subtree.
    #[arg(long)]
    jail: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a file's contents.
    Cat {
        path: String,
        #[arg(long)]
        vfs: Option<String>,
    },
    /// List a directory.
    Ls {
        path: String,
        #[arg(long)]
        vfs: Option<String>,
    },
    /// Print a path's metadata.
    Stat {
        path: String,
        #[arg(long)]
        vfs: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let registry = Registry::new();

    if let Some(config) = &cli.config {
        let text = std::fs::read_to_string(config)?;
        MountTable::from_toml_str(&text)?.apply(&registry)?;
    }
    if let Some(dir) = &cli.host {
        let mut host = HostFs::new("host", dir.clone());
        if cli.read_only {
            host = host.read_only();
        }
        registry.register(Arc::new(host), true)?;
        if let Some(root) = &cli.jail {
            let inner = registry.find("host").expect("host backend just registered");
            registry.register(Arc::new(JailFs::new("jail", inner, root)?), false)?;
        }
    }

    match &cli.command {
        Command::Cat { path, vfs } => {
            let mut file = registry.open(vfs.as_deref(), path, OpenFlags::READ)?;
            let mut buf = [0u8; 4096];
            let mut stdout = io::stdout().lock();
            loop {
                let n = file.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                stdout.write_all(&buf[..n])?;
            }
        }
        Command::Ls { path, vfs } => {
            let mut dir = registry.open_dir(vfs.as_deref(), path)?;
            while let Some(entry) = dir.read()? {
                let marker = if entry.info.is_dir { "/" } else { "" };
                println!("{:>10}  {}{}", entry.info.size, entry.name, marker);
            }
        }
        Command::Stat { path, vfs } => {
            let info = registry.stat(vfs.as_deref(), path)?;
            println!(
                "size={} mtime={} dir={}",
                info.size, info.mtime, info.is_dir
            );
        }
    }
    Ok(())
}
