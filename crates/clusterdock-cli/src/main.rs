//! clusterdock CLI binary entrypoint.

use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use clusterdock_cli::cli::{Cli, Commands};
use clusterdock_cli::commands::{ExecCommand, NukeCommand, PsCommand, StartCommand};
use clusterdock_cli::output::OutputFormat;
use clusterdock_core::Settings;
use clusterdock_runtime::{DockerRuntime, Runtime};

const DOCKER_TIMEOUT_SECS: u64 = 120;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "clusterdock=debug" } else { "clusterdock=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn connect(cli: &Cli) -> anyhow::Result<Arc<dyn Runtime>> {
    let docker = match &cli.docker_url {
        Some(url) => DockerRuntime::connect_with_url(url, DOCKER_TIMEOUT_SECS),
        None => DockerRuntime::connect(),
    }
    .context("failed to connect to Docker")?;
    Ok(Arc::new(docker))
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let settings = Settings::load(cli.settings.as_deref()).context("failed to load settings")?;
    let runtime = connect(&cli)?;
    let format = OutputFormat::new(cli.format);
    let mut stdout = io::stdout().lock();

    match &cli.command {
        Commands::Start(args) => {
            let cmd = StartCommand::new(runtime, settings);
            cmd.execute(&mut stdout, &format, args)
                .await
                .with_context(|| format!("failed to start cluster from {}", args.topology.display()))?;
        }
        Commands::Ps => {
            let cmd = PsCommand::new(runtime, settings);
            cmd.execute(&mut stdout, &format).await?;
        }
        Commands::Exec(args) => {
            let cmd = ExecCommand::new(runtime, settings);
            let report = cmd.execute(&mut stdout, &format, args).await?;
            if !report.all_succeeded() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Nuke(args) => {
            let cmd = NukeCommand::new(runtime, settings);
            cmd.execute(&mut stdout, &format, args).await?;
        }
    }

    Ok(ExitCode::SUCCESS)
}
