use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "pybox",
    author,
    version,
    about = "Disposable Python environments for packaging integration tests",
    disable_help_subcommand = true
)]
pub struct PyboxCli {
    #[arg(
        short,
        long,
        action = ArgAction::Count,
        help = "Increase logging (-vv reaches trace)",
        global = true
    )]
    pub verbose: u8,
    #[arg(long, help = "Force trace logging regardless of -v", global = true)]
    pub trace: bool,
    #[arg(long, help = "Disable colored human output", global = true)]
    pub no_color: bool,
    #[command(subcommand)]
    pub command: CommandCli,
}

#[derive(Subcommand, Debug)]
pub enum CommandCli {
    #[command(
        about = "Build the project wheel and its pinned dependencies into DIR for offline installs.",
        override_usage = "pybox wheelhouse <DIR>"
    )]
    Wheelhouse(WheelhouseArgs),
    #[command(
        about = "Run a command inside a throwaway environment, then remove it.",
        override_usage = "pybox run [--wheelhouse DIR | --isolated] -- <PROGRAM> [ARG]..."
    )]
    Run(RunArgs),
    #[command(about = "Print installed versions of packaging tools for the host interpreter.")]
    Report,
    #[command(about = "List sample packages and the sdist checksums that apply to the host.")]
    Packages(PackagesArgs),
}

#[derive(Args, Debug)]
pub struct WheelhouseArgs {
    #[arg(value_name = "DIR")]
    pub dir: PathBuf,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[arg(
        long,
        value_name = "DIR",
        help = "Install only from this prebuilt wheelhouse",
        conflicts_with = "isolated"
    )]
    pub wheelhouse: Option<PathBuf>,
    #[arg(long, help = "Build a wheelhouse first and install only from it")]
    pub isolated: bool,
    #[arg(required = true, trailing_var_arg = true, value_name = "PROGRAM")]
    pub command: Vec<String>,
}

#[derive(Args, Debug)]
pub struct PackagesArgs {
    #[arg(long, help = "Emit the registry as JSON")]
    pub json: bool,
}
