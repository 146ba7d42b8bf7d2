#![warn(missing_docs)]
//! dedupctl: control in-band deduplication and content-based storage

use std::process::ExitCode;

use clap::Parser;
use dedupctl::cli::{usage_error, Cli};
use dedupctl::CtlError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => {
            let err = usage_error(&e);
            eprint!("{}", err);
            return ExitCode::from(err.exit_code() as u8);
        }
        Err(e) => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level()));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("ERROR: {:#}", err);
            let code = err
                .downcast_ref::<CtlError>()
                .map(CtlError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code as u8)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    tracing::debug!(command = ?cli.command, "dedupctl starting");
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    cli.run(&mut out)?;
    Ok(())
}
