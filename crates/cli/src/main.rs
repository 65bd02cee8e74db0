//! Depot CLI - Database migrations and operator tools.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! depot-cli migrate
//!
//! # Create an account
//! depot-cli user create -e admin@example.com -p 'correct horse' -r admin
//!
//! # Grant the admin role to an existing account
//! depot-cli user promote -e someone@example.com
//!
//! # Delete expired sessions and stale reset tokens
//! depot-cli prune
//! ```
//!
//! All commands read the same environment as the server
//! (`DEPOT_DATABASE_URL`, `DEPOT_BASE_URL`, ...).

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use depot_core::Role;

mod commands;

#[derive(Parser)]
#[command(name = "depot-cli")]
#[command(author, version, about = "Depot CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage accounts
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Delete expired sessions and used or expired reset tokens
    Prune,
}

#[derive(Subcommand)]
enum UserAction {
    /// Create a new account
    Create {
        /// Email address
        #[arg(short, long)]
        email: String,

        /// Initial password
        #[arg(short, long)]
        password: String,

        /// Role (`user` or `admin`)
        #[arg(short, long, default_value = "user")]
        role: Role,
    },
    /// Change an account's role
    Promote {
        /// Email address
        #[arg(short, long)]
        email: String,

        /// Role to grant
        #[arg(short, long, default_value = "admin")]
        role: Role,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::User { action } => match action {
            UserAction::Create {
                email,
                password,
                role,
            } => commands::user::create(&email, &password, role).await?,
            UserAction::Promote { email, role } => commands::user::promote(&email, role).await?,
        },
        Commands::Prune => commands::prune::run().await?,
    }
    Ok(())
}
