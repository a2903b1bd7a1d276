mod commands;

use clap::Parser;
use snappk_core::domain::PkError;

pub fn run_from_env() -> i32 {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(args) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("{}", error.diagnostic_line());
            error.exit_code()
        }
    }
}

pub fn run<I, S>(args: I) -> Result<i32, CliError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let full_args: Vec<String> = std::iter::once("snappk".to_string())
        .chain(args.into_iter().map(Into::into))
        .collect();
    parse_and_dispatch(full_args)
}

fn parse_and_dispatch(args: Vec<String>) -> Result<i32, CliError> {
    match Cli::try_parse_from(&args) {
        Ok(cli) => dispatch_parsed(cli.command),
        Err(err) => match err.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                print!("{}", err);
                Ok(0)
            }
            _ => Err(CliError::Usage(err.to_string())),
        },
    }
}

#[derive(Parser)]
#[command(name = "snappk", about = "Matter power spectra from Gadget snapshots")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(clap::Subcommand)]
enum CliCommand {
    /// Compute auto-, cross- and combined power spectra for a snapshot
    Pk(commands::PkArgs),
    /// Print the parsed header of a snapshot
    Header(commands::HeaderArgs),
}

fn dispatch_parsed(command: CliCommand) -> Result<i32, CliError> {
    match command {
        CliCommand::Pk(args) => commands::run_pk_command(args),
        CliCommand::Header(args) => commands::run_header_command(args),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    Compute(#[from] PkError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CliError {
    fn diagnostic_line(&self) -> String {
        match self {
            Self::Usage(message) => format!("ERROR: [InputValidationError] {message}"),
            Self::Compute(error) => error.diagnostic_line(),
            Self::Internal(error) => format!("ERROR: [IoSystemError] {error:#}"),
        }
    }

    fn exit_code(&self) -> i32 {
        match self {
            Self::Usage(_) => 2,
            Self::Compute(error) => error.exit_code(),
            Self::Internal(_) => 3,
        }
    }
}
