// src/bin/adapter-launcher.rs

use adapter_launcher::{
    cli::Cli,
    core::{
        environment::EnvSnapshot,
        platform::Platform,
        session::{self, AdapterRequest},
        settings::{self, Settings},
    },
    system::{launcher::Launcher, output_log::LogSink},
};
use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use std::sync::Arc;

/// The main entry point of `adapter-launcher`.
/// It sets up logging, parses arguments, runs the session on a tokio runtime
/// and performs centralized error handling.
fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("\n{}: could not start the async runtime: {}", "Error".red().bold(), e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run_cli(cli)) {
        eprintln!("\n{}: {:#}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

/// Launches one adapter session and supervises it until it exits or the user
/// interrupts.
async fn run_cli(cli: Cli) -> Result<()> {
    log::debug!("CLI args parsed: {:?}", cli);

    let settings = Settings::load_or_default(cli.config.as_deref())?;
    if let Some(path) = settings.source() {
        log::debug!("Using settings from '{}'", path.display());
    }

    let workspace_root = match &cli.workspace {
        Some(raw) => settings::expand_user_path(raw)?,
        None => std::env::current_dir().context("Could not determine the current directory")?,
    };
    let request = AdapterRequest {
        extension_path: settings::expand_user_path(&cli.extension_path)?,
        workspace_root: Some(workspace_root),
        params: cli.params_object()?,
        timeout: cli.timeout(),
    };

    // The environment is captured once and shared read-only from here on.
    let launcher = Launcher::new(Platform::current(), EnvSnapshot::capture(), Arc::new(LogSink));
    let session = session::start_debug_adapter(&settings, request, &launcher)
        .await
        .context("Debug adapter failed to start")?;

    println!(
        "{} {}",
        "Debug adapter listening on".green(),
        session.endpoint().to_string().yellow().bold()
    );

    let exit = tokio::select! {
        info = session.wait() => info,
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => {
                    println!("{}", "Stopping debug adapter...".dimmed());
                    session.terminate();
                }
                Err(e) => log::warn!("Failed to listen for Ctrl+C: {}", e),
            }
            session.wait().await
        }
    };

    println!("{}", format!("Debug adapter exited ({exit}).").dimmed());
    Ok(())
}
