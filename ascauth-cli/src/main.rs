//! ascauth CLI
//!
//! Manage and check the signing credentials used for API requests.
//!
//! # Usage
//!
//! ```bash
//! # Create an empty per-user config file
//! ascauth init
//!
//! # Store a named credential
//! ascauth login --name work --key-id ABC123 --issuer-id 69a6de7f-... --private-key AuthKey_ABC123.p8
//!
//! # Show what would be used
//! ascauth status
//!
//! # Prove the resolved identity can sign (and optionally call the API)
//! ascauth validate --network
//!
//! # Diagnose, then repair permissions
//! ascauth doctor
//! ascauth doctor --fix --confirm
//! ```

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use ascauth_cli::commands::{doctor, init, login, logout, status, switch, validate};
use ascauth_cli::exit::{self, ExitStatus};
use ascauth_cli::{Context, OutputFormat};
use ascauth_core::{CleanupGuard, ProcessEnv, Settings};
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(name = "ascauth")]
#[command(about = "Credential resolution and diagnostics for API request signing")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this stored credential instead of the default
    #[arg(long, global = true, value_name = "NAME")]
    profile: Option<String>,

    /// Fail when the identity mixes stored and environment values
    #[arg(long, global = true)]
    strict_auth: bool,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty config file
    Init(init::InitArgs),

    /// Store a named credential
    Login(login::LoginArgs),

    /// Change the default credential
    Switch(switch::SwitchArgs),

    /// Remove one or all credentials
    Logout(logout::LogoutArgs),

    /// Show the active store and stored credentials
    Status(status::StatusArgs),

    /// Resolve the current identity and sign a token
    Validate(validate::ValidateArgs),

    /// Diagnose the credential setup
    Doctor(doctor::DoctorArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Removes materialized inline keys on every return path below.
    let _cleanup = CleanupGuard::new();

    let result = tokio::select! {
        result = run(cli) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted");
            return ExitCode::from(exit::INTERRUPTED);
        }
    };

    match result {
        Ok(()) => ExitStatus::Success.into(),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            exit::exit_status(&e).into()
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let env = Arc::new(ProcessEnv);
    let cwd = std::env::current_dir()?;
    let mut settings = Settings::from_env(env.as_ref(), &cwd)?;
    if cli.profile.is_some() {
        settings.profile = cli.profile;
    }
    settings.strict |= cli.strict_auth;

    let ctx = Context::new(settings, env, cli.output);
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Commands::Init(args) => init::execute(&ctx, &args, &mut out),
        Commands::Login(args) => login::execute(&ctx, &args, &mut out).await,
        Commands::Switch(args) => switch::execute(&ctx, &args, &mut out),
        Commands::Logout(args) => logout::execute(&ctx, &args, &mut out),
        Commands::Status(args) => status::execute(&ctx, &args, &mut out),
        Commands::Validate(args) => validate::execute(&ctx, &args, &mut out).await,
        Commands::Doctor(args) => doctor::execute(&ctx, &args, &mut out),
    }?;
    out.flush()?;
    Ok(())
}
