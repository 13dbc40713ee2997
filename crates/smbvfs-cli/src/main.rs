//! smbvfs operator tool.
//!
//! Checks mount configuration and path routing without touching a share,
//! and prints the streaming config and locators a host would use.
//!
//! Usage:
//!   smbvfs mounts --env ~/.agents/nas_smb/secrets/.env
//!   smbvfs route --agents-root ~/.agents nas_smb/home/movies/a.mp4
//!   smbvfs config --file stream.toml
//!   smbvfs locator --token <hex> --name "Holiday.mp4"

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use smbvfs_kernel::nas_smb::config::load_from_env_text;
use smbvfs_kernel::{
    AgentsVfs, DisabledClient, EnvFileMounts, LocalBackend, MountConfig, NasSmbVfs, Route,
};
use smbvfs_media::{MediaUriBuilder, StreamConfig};

#[derive(Parser, Debug)]
#[command(name = "smbvfs")]
#[command(about = "Inspect smbvfs mounts, routing and streaming config")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a mounts env file and list its mounts (credentials are never printed)
    Mounts {
        /// Path to the `.env` file
        #[arg(long)]
        env: PathBuf,

        /// Print JSON instead of one line per mount
        #[arg(long)]
        json: bool,
    },

    /// Show whether a path is served locally or from a remote mount
    Route {
        /// The agents directory
        #[arg(long)]
        agents_root: PathBuf,

        /// Path relative to the agents root, or absolute under it
        path: PathBuf,
    },

    /// Print the effective streaming config as TOML
    Config {
        /// TOML file to load; defaults apply to missing keys
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Build the opaque locator for a ticket token
    Locator {
        #[arg(long)]
        token: String,

        /// Display name carried in the last path segment
        #[arg(long)]
        name: String,

        /// Locator authority (default from the streaming config)
        #[arg(long)]
        authority: Option<String>,
    },
}

/// What `mounts` prints for one mount.
#[derive(Debug, Serialize, PartialEq, Eq)]
struct MountSummary {
    name: String,
    remote_dir: String,
    guest: bool,
    read_only: bool,
}

impl From<&MountConfig> for MountSummary {
    fn from(mount: &MountConfig) -> Self {
        Self {
            name: mount.mount_name.clone(),
            remote_dir: format!("/{}", mount.remote_dir),
            guest: mount.guest,
            read_only: mount.read_only,
        }
    }
}

impl MountSummary {
    fn line(&self) -> String {
        format!(
            "{}\t{}\tguest={}\tread_only={}",
            self.name, self.remote_dir, self.guest, self.read_only
        )
    }
}

fn cmd_mounts(env: &Path, json: bool) -> Result<()> {
    let text = std::fs::read_to_string(env)
        .with_context(|| format!("reading {}", env.display()))?;
    let mounts = load_from_env_text(&text).context("invalid mount configuration")?;
    info!(count = mounts.len(), "mounts loaded");

    let summaries: Vec<MountSummary> = mounts.iter().map(MountSummary::from).collect();
    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else {
        for summary in &summaries {
            println!("{}", summary.line());
        }
    }
    Ok(())
}

fn cmd_route(agents_root: &Path, path: &Path) -> Result<()> {
    // Read-only and without a share client: routing never needs either.
    let local = Arc::new(LocalBackend::read_only(agents_root));
    let root = local.root().to_path_buf();
    let mounts = Arc::new(EnvFileMounts::new(local.clone()));
    let remote = Arc::new(NasSmbVfs::new(mounts, Arc::new(DisabledClient)));
    let vfs = AgentsVfs::new(root, local, remote);

    let route = vfs
        .route(path)
        .with_context(|| format!("routing {}", path.display()))?;
    if let Route::Remote(vp) = &route {
        let configured = vfs
            .remote()
            .mounts_by_name()
            .map(|m| m.contains_key(&vp.mount_name.to_lowercase()))
            .unwrap_or(false);
        if !configured {
            warn!(mount = %vp.mount_name, "mount is not configured");
        }
    }
    println!("{route}");
    Ok(())
}

fn load_config(file: Option<&Path>) -> Result<StreamConfig> {
    let config = match file {
        Some(path) => {
            StreamConfig::load(path).with_context(|| format!("loading {}", path.display()))?
        }
        None => StreamConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn cmd_config(file: Option<&Path>) -> Result<()> {
    let config = load_config(file)?;
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn cmd_locator(token: &str, name: &str, authority: Option<String>) -> Result<()> {
    let authority = authority.unwrap_or_else(|| StreamConfig::default().authority);
    let locator = MediaUriBuilder::new(authority).build(token, name)?;
    println!("{locator}");
    Ok(())
}

fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match args.command {
        Command::Mounts { env, json } => cmd_mounts(&env, json),
        Command::Route { agents_root, path } => cmd_route(&agents_root, &path),
        Command::Config { file } => cmd_config(file.as_deref()),
        Command::Locator {
            token,
            name,
            authority,
        } => cmd_locator(&token, &name, authority),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn args_are_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn parses_route() {
        let args = Args::try_parse_from([
            "smbvfs",
            "route",
            "--agents-root",
            "/home/a/.agents",
            "nas_smb/home/x.mkv",
        ])
        .unwrap();
        match args.command {
            Command::Route { agents_root, path } => {
                assert_eq!(agents_root, PathBuf::from("/home/a/.agents"));
                assert_eq!(path, PathBuf::from("nas_smb/home/x.mkv"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn summary_leaves_out_connection_details() {
        let mount = MountConfig::guest("home", "users")
            .with_remote_dir("media/movies")
            .with_read_only(true);
        let summary = MountSummary::from(&mount);
        assert_eq!(summary.line(), "home\t/media/movies\tguest=true\tread_only=true");

        let json = serde_json::to_string(&summary).unwrap();
        assert!(!json.contains("users"));
        assert!(!json.contains("localhost"));
    }

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = load_config(None).unwrap();
        let text = toml::to_string_pretty(&config).unwrap();
        assert_eq!(StreamConfig::from_toml_str(&text).unwrap(), config);
    }
}
