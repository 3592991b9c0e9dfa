// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Zapflow - WhatsApp chatbot instance management.
//!
//! This is the binary entry point for the `zapflow` CLI and server.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod app;
mod commands;
mod connect;
mod output;
mod serve;
mod status;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use zapflow_config::model::ZapflowConfig;
use zapflow_config::ConfigError;
use zapflow_security::SecretRegistry;

/// Zapflow - WhatsApp chatbot instance management.
#[derive(Parser, Debug)]
#[command(name = "zapflow", version, about, long_about = None)]
struct Cli {
    /// Configuration file to load instead of the default search path.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print machine-readable JSON instead of human output.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the webhook gateway, pollers and startup reconciliation.
    Serve,
    /// Resolve an instance name to its remote id, creating it if absent.
    Resolve {
        name: String,
        /// Only look the instance up; never create it.
        #[arg(long)]
        no_create: bool,
    },
    /// Show the connection state of an instance.
    Status {
        name: String,
        /// Keep polling until interrupted.
        #[arg(long)]
        watch: bool,
    },
    /// Fetch a QR code for an instance and wait for the phone to pair.
    Connect {
        name: String,
        /// Where to write the QR image (default: `<name>-qr.png`).
        #[arg(long)]
        out: Option<PathBuf>,
        /// Exit after showing the QR code.
        #[arg(long)]
        no_wait: bool,
    },
    /// Unpair the phone from an instance so a new QR code can be scanned.
    Logout { name: String },
    /// Bring an owner's stored instance ids and conversations up to date.
    Reconcile {
        /// Owner (user) id.
        owner: String,
    },
    /// Print the conversation key for an instance id and phone.
    Key { instance_id: String, phone: String },
    /// Create a chatbot configuration and bind it to an instance.
    Configure(ConfigureArgs),
    /// Register a new account.
    Signup(SignupArgs),
    /// Confirm a signup with the emailed code.
    Verify { email: String, code: String },
}

#[derive(Args, Debug)]
pub struct ConfigureArgs {
    /// Owner id to act as (service credentials).
    #[arg(long, conflicts_with = "email", required_unless_present = "email")]
    pub owner: Option<String>,
    /// Sign in as this user; the password is prompted.
    #[arg(long)]
    pub email: Option<String>,
    #[arg(long)]
    pub bot_name: String,
    #[arg(long)]
    pub company: Option<String>,
    #[arg(long)]
    pub category: Option<String>,
    #[arg(long)]
    pub tone: Option<String>,
    /// Explicit instance name; derived from bot name and company otherwise.
    #[arg(long)]
    pub instance_name: Option<String>,
}

#[derive(Args, Debug)]
pub struct SignupArgs {
    #[arg(long)]
    pub email: String,
    #[arg(long)]
    pub full_name: String,
    #[arg(long)]
    pub company: Option<String>,
    #[arg(long)]
    pub phone: Option<String>,
    #[arg(long)]
    pub plan: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("zapflow: use --help for available commands");
        return;
    };

    // Pure computation; works without any configuration.
    if let Commands::Key { instance_id, phone } = &command {
        commands::run_key(instance_id, phone, cli.json);
        return;
    }

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(errors) => {
            zapflow_config::render_errors(&errors);
            std::process::exit(2);
        }
    };

    let secrets = SecretRegistry::new();
    app::register_secrets(&config, &secrets);
    app::init_tracing(&config.app.log_level, secrets);

    if let Err(e) = run(command, config, cli.json).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<ZapflowConfig, Vec<ConfigError>> {
    match path {
        Some(path) => zapflow_config::load_and_validate_path(path),
        None => zapflow_config::load_and_validate(),
    }
}

async fn run(
    command: Commands,
    config: ZapflowConfig,
    json: bool,
) -> Result<(), zapflow_core::ZapflowError> {
    if matches!(command, Commands::Serve) {
        return serve::run_serve(config).await;
    }

    let app = app::App::build(config).await?;
    let result = match command {
        Commands::Resolve { name, no_create } => {
            commands::run_resolve(&app, &name, no_create, json).await
        }
        Commands::Status { name, watch } => status::run_status(&app, &name, watch, json).await,
        Commands::Connect { name, out, no_wait } => {
            connect::run_connect(&app, &name, out, no_wait, json).await
        }
        Commands::Logout { name } => commands::run_logout(&app, &name, json).await,
        Commands::Reconcile { owner } => commands::run_reconcile(&app, &owner, json).await,
        Commands::Configure(args) => commands::run_configure(&app, args, json).await,
        Commands::Signup(args) => commands::run_signup(&app, args, json).await,
        Commands::Verify { email, code } => commands::run_verify(&app, &email, &code, json).await,
        Commands::Serve | Commands::Key { .. } => Ok(()),
    };
    app.close().await;
    result
}
