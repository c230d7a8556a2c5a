mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use dchess_installer::install::download::{self, HttpFetcher};
use dchess_installer::install::staging::ResourceBundle;
use dchess_installer::{Installer, InstallerConfig};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

fn main() {
    // Parse before logging so usage errors go straight to stderr
    let args = cli::Args::parse();

    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "[{} {} {}:{}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("FATAL: Failed to create Tokio runtime: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = rt.block_on(real_main(args)) {
        error!("{e:#}");
        std::process::exit(1);
    }
}

async fn real_main(args: cli::Args) -> Result<()> {
    let config = InstallerConfig::load().context("Failed to load installer configuration")?;

    let mut profile = download::resolve().context("Cannot pick a runtime for this host")?;
    if let Some(url) = &config.runtime_url {
        info!("Using runtime mirror {url}");
        profile = profile.with_download_url(url.clone());
    }

    let progress = ProgressBar::new(0);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{bar:50.green/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})  {msg}")
            .context("Invalid progress bar template")?
            .progress_chars("█▓░"),
    );
    progress.set_message("runtime");
    let fetcher = HttpFetcher::new(config.connect_timeout(), config.inactivity_timeout())
        .with_progress(progress);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupted, stopping installation");
                on_signal.cancel();
            }
            Err(e) => warn!("Failed to listen for Ctrl-C: {e}"),
        }
    });

    let installer = Installer::new(
        &args.install_dir,
        profile,
        fetcher,
        ResourceBundle::from_dir(&config.resources_dir),
    )
    .with_packager(config.packager_command()?)
    .with_limits(config.packager_limits())
    .with_output_dir_name(&config.output_dir_name)
    .with_cancellation(cancel);

    let report = installer
        .run()
        .await
        .with_context(|| format!("Installation into {} failed", args.install_dir.display()))?;

    if let Some(output) = &report.output_dir {
        println!("DChess installed to {}", output.display());
    }
    Ok(())
}
