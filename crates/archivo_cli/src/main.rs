//! `archivo` command-line front end.
//!
//! Every subcommand opens the configured store, restores the saved session
//! token when one exists, and calls into `archivo_core`.

mod commands;

use clap::{Parser, Subcommand};
use commands::Runtime;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "archivo")]
#[command(about = "Archive inventory and document loan manager", long_about = None)]
struct Cli {
    /// Path to the TOML config file; defaults apply when it does not exist.
    #[arg(short, long, default_value = "archivo.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the store and optionally seed the first administrator
    Init(commands::account::InitArgs),
    /// Register a new account
    SignUp(commands::account::SignUpArgs),
    /// Sign in and remember the session
    SignIn(commands::account::SignInArgs),
    /// End the remembered session
    SignOut,
    /// Show the signed-in account
    Whoami,
    /// Issue a password reset token
    ResetRequest(commands::account::ResetRequestArgs),
    /// Set a new password with a reset token
    ResetPassword(commands::account::ResetPasswordArgs),
    /// Change an account's role (administrators only)
    SetRole(commands::account::SetRoleArgs),
    /// Inventory documents
    #[command(subcommand)]
    Doc(commands::doc::DocCommand),
    /// Loan requests and returns
    #[command(subcommand)]
    Loan(commands::loan::LoanCommand),
    /// List navigation entries visible to the signed-in role
    Nav,
    /// Check where a path would take the signed-in account
    Route(commands::nav::RouteArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), commands::CliError> {
    let mut runtime = Runtime::open(&cli.config)?;
    match cli.command {
        Commands::Init(args) => commands::account::init(&mut runtime, args),
        Commands::SignUp(args) => commands::account::sign_up(&mut runtime, args),
        Commands::SignIn(args) => commands::account::sign_in(&mut runtime, args),
        Commands::SignOut => commands::account::sign_out(&mut runtime),
        Commands::Whoami => commands::account::whoami(&runtime),
        Commands::ResetRequest(args) => commands::account::reset_request(&runtime, args),
        Commands::ResetPassword(args) => commands::account::reset_password(&runtime, args),
        Commands::SetRole(args) => commands::account::set_role(&runtime, args),
        Commands::Doc(command) => commands::doc::run(&runtime, command),
        Commands::Loan(command) => commands::loan::run(&runtime, command),
        Commands::Nav => commands::nav::nav(&runtime),
        Commands::Route(args) => commands::nav::route(&runtime, args),
    }
}
