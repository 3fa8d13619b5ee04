//! winrs - run commands on Windows hosts over WinRM
//!
//! This is the main entry point for the winrs CLI.

mod cli;

use anyhow::{Context, Result};
use cli::Cli;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use winrs::config::WinRmConfig;
use winrs::{powershell, Client};

/// Application version information
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_logging(cli.verbosity());

    if cli.verbosity() >= 2 {
        eprintln!("winrs v{}", VERSION);
    }

    let base = match &cli.config {
        Some(path) => WinRmConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => WinRmConfig::default(),
    };
    let config = cli.apply(base);
    let client = Client::from_config(&config).context("creating WinRM client")?;

    let mut command = cli.command_line();
    if cli.powershell {
        command = powershell::encode(&command);
    }
    debug!(host = %config.host, transport = client.transport_name(), "running remote command");

    let mut stdout = tokio::io::stdout();
    let mut stderr = tokio::io::stderr();
    let exit_code = if cli.no_stdin {
        client.run(&command, &mut stdout, &mut stderr).await
    } else {
        let mut stdin = tokio::io::stdin();
        client
            .run_with_input(&command, &mut stdout, &mut stderr, &mut stdin)
            .await
    };

    match exit_code {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("winrs: {}", e);
            std::process::exit(e.sentinel_exit_code().unwrap_or(1));
        }
    }
}

/// Initialize logging based on verbosity level
fn init_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(verbosity >= 3))
        .with(env_filter)
        .init();
}
