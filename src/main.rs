use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use owo_colors::OwoColorize;

use volcp::cli::{Cli, Commands};
use volcp::config::{self, Config};
use volcp::logging::init_logging;
use volcp::render::{RenderMode, render_events};
use volcp::transfer::{self, DownloadRequest, HttpTransport, Scope, TransferHandle, UploadRequest};
use volcp::{CancelToken, TransferError};

const EXIT_CANCELLED: u8 = 130;

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(TransferError::UserCancelled) = e.downcast_ref::<TransferError>() {
                eprintln!("Transfer cancelled by user");
                return ExitCode::from(EXIT_CANCELLED);
            }
            eprintln!("{} {:#}", "error:".red(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let flags = cli.command.flags().clone();
    let log_dir = if flags.verbose {
        Some(config::storage_dir()?.join("logs"))
    } else {
        None
    };
    let _log_guard = init_logging(log_dir.as_deref())?;

    let config = Config::init()?;
    config.ensure_ready()?;
    let scope = Scope::new(
        config.project_id.clone(),
        flags.region.clone().unwrap_or_else(|| config.region.clone()),
    );
    let options = config.transfer_options(flags.simple);
    let transport = Arc::new(HttpTransport::new(config.api_url.clone(), config.api_token.clone())?);

    let cancel = CancelToken::new();
    cancel.install_signal_handlers().context("failed to install signal handlers")?;

    let handle = match cli.command {
        Commands::Cp { local, remote, .. } => {
            tracing::info!("cp {} -> {}", local.display(), remote);
            transfer::upload(
                transport,
                UploadRequest { local_root: local, remote_root: remote, scope },
                options,
                cancel,
            )?
        }
        Commands::Download { remote, local, .. } => {
            tracing::info!("download {} -> {}", remote, local.display());
            transfer::download(
                transport,
                DownloadRequest { remote_root: remote, local_root: local, scope },
                options,
                cancel,
            )?
        }
    };
    let mode = if flags.simple {
        RenderMode::Simple
    } else {
        RenderMode::Interactive
    };
    finish(handle, mode)
}

fn finish(handle: TransferHandle, mode: RenderMode) -> anyhow::Result<()> {
    render_events(handle.events(), mode)?;
    let summary = handle.wait()?;
    tracing::info!(
        "{} finished: {} files, {} bytes",
        summary.direction,
        summary.files,
        summary.bytes
    );
    Ok(())
}
