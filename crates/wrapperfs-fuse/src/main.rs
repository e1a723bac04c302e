//! wrapperfs binary
//!
//! Mirrors a host directory at a mount point.
//!
//! ## Usage
//!
//! ```bash
//! wrapperfs --basedir /srv/data /mnt/data
//! wrapperfs -b /srv/data -o allow_other,fsname=data -d /mnt/data
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use fuse3::path::Session;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use wrapperfs_fuse::{FuseBridge, MountOption, mount_options};
use wrapperfs_kernel::{Config, Passthrough};

#[derive(Parser, Debug)]
#[command(name = "wrapperfs", version, about = "Passthrough FUSE filesystem over a host directory")]
struct Cli {
    /// Where to mount the filesystem
    mountpoint: PathBuf,

    /// Host directory to expose at the mount point
    #[arg(short, long, value_name = "DIR")]
    basedir: PathBuf,

    /// Mount options: allow_other, default_permissions, fsname=NAME
    #[arg(short = 'o', value_name = "OPT[,OPT...]", value_delimiter = ',')]
    options: Vec<MountOption>,

    /// Log every filesystem operation
    #[arg(short, long)]
    debug: bool,
}

fn env_filter(debug: bool) -> EnvFilter {
    if debug {
        EnvFilter::new("info,wrapperfs_fuse=debug,wrapperfs_kernel=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

#[cfg(feature = "telemetry")]
fn init_logging(debug: bool) -> Option<wrapperfs_telemetry::OtelGuard> {
    let registry = tracing_subscriber::registry()
        .with(env_filter(debug))
        .with(fmt::layer().with_writer(std::io::stderr));

    if !wrapperfs_telemetry::otel_enabled() {
        registry.init();
        return None;
    }

    match wrapperfs_telemetry::otel_layer("wrapperfs") {
        Ok((otel_layer, guard)) => {
            registry.with(otel_layer).init();
            Some(guard)
        }
        Err(e) => {
            registry.init();
            tracing::warn!(error = %e, "OpenTelemetry export disabled");
            None
        }
    }
}

#[cfg(not(feature = "telemetry"))]
fn init_logging(debug: bool) {
    tracing_subscriber::registry()
        .with(env_filter(debug))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _otel_guard = init_logging(cli.debug);

    let config = match Config::new(&cli.basedir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("wrapperfs: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        "mounting {} over {}",
        cli.mountpoint.display(),
        config.base_dir().display()
    );

    match run(config, &cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("wrapperfs: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config, cli: &Cli) -> anyhow::Result<()> {
    let bridge = FuseBridge::new(Passthrough::new(Arc::new(config)));
    let uid = nix::unistd::getuid().as_raw();
    let gid = nix::unistd::getgid().as_raw();
    let options = mount_options(&cli.options, uid, gid);

    let mut mount_handle = Session::new(options)
        .mount_with_unprivileged(bridge, &cli.mountpoint)
        .await
        .with_context(|| format!("failed to mount {}", cli.mountpoint.display()))?;

    let handle = &mut mount_handle;
    tokio::select! {
        res = handle => res.context("filesystem session failed")?,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, unmounting {}", cli.mountpoint.display());
            mount_handle.unmount().await.context("failed to unmount")?;
        }
    }

    info!("unmounted {}", cli.mountpoint.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use clap::error::ErrorKind;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_basedir_short_and_long() {
        let short = Cli::try_parse_from(["wrapperfs", "-b", "/srv/data", "/mnt/data"]).unwrap();
        let long = Cli::try_parse_from(["wrapperfs", "--basedir", "/srv/data", "/mnt/data"]).unwrap();
        assert_eq!(short.basedir, PathBuf::from("/srv/data"));
        assert_eq!(long.basedir, short.basedir);
        assert_eq!(long.mountpoint, PathBuf::from("/mnt/data"));
        assert!(long.options.is_empty());
        assert!(!long.debug);
    }

    #[test]
    fn test_basedir_required() {
        let err = Cli::try_parse_from(["wrapperfs", "/mnt/data"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_mount_options_split_on_comma() {
        let cli = Cli::try_parse_from([
            "wrapperfs",
            "-b",
            "/srv/data",
            "-o",
            "allow_other,fsname=x",
            "-o",
            "default_permissions",
            "-d",
            "/mnt/data",
        ])
        .unwrap();
        assert_eq!(
            cli.options,
            [
                MountOption::AllowOther,
                MountOption::FsName("x".to_string()),
                MountOption::DefaultPermissions,
            ]
        );
        assert!(cli.debug);
    }

    #[test]
    fn test_unsupported_mount_option_rejected() {
        let err = Cli::try_parse_from(["wrapperfs", "-b", "/srv", "-o", "allow_other,ro", "/mnt"])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn test_missing_basedir_fails_before_mount() {
        let cli = Cli::try_parse_from(["wrapperfs", "-b", "/nonexistent/wrapperfs/base", "/mnt"])
            .unwrap();
        assert!(Config::new(&cli.basedir).is_err());
    }
}
