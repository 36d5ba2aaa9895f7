use std::process::ExitCode;

use awsp::{cli::Cli, Error};
use clap::{CommandFactory, Parser};
use tracing::{subscriber, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[::tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match cli.execute().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => match e.downcast_ref::<Error>() {
            Some(Error::NoProfilesFound(path)) => {
                eprintln!("{e}");
                eprintln!(
                    "Add a section such as [profile my-profile] to {} and run awsp again.",
                    path.display()
                );
                ExitCode::SUCCESS
            }
            Some(Error::InvalidCliOption(_)) => {
                eprintln!("error: {e}\n\n{}", Cli::command().render_usage());
                ExitCode::from(2)
            }
            _ => {
                eprintln!("Error: {e:#}");
                ExitCode::FAILURE
            }
        },
    }
}

fn init_logging(verbose: u8) -> anyhow::Result<()> {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    // stdout is reserved for output meant to be eval'd
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose >= 2)
        .compact()
        .finish();

    subscriber::set_global_default(subscriber)?;

    Ok(())
}
