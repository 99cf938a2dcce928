//! Forkline CLI - migrations and operator tools.
//!
//! # Usage
//!
//! ```bash
//! # Apply database migrations
//! fl-cli migrate
//!
//! # Make user 1 an admin (bootstrap; bypasses the admin-only API)
//! fl-cli user grant-role --user-id 1 --role admin
//!
//! # Mint a development bearer token
//! fl-cli token issue --subject idp|42 --email cook@kitchen.io --ttl-minutes 60
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "fl-cli")]
#[command(author, version, about = "Forkline CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply database migrations
    Migrate,
    /// Manage user accounts
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Bearer tokens for local development
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Add a role to a user
    GrantRole {
        /// Numeric user id
        #[arg(short, long)]
        user_id: i32,

        /// Role (`customer`, `manager`, `delivery`, `admin`)
        #[arg(short, long)]
        role: String,
    },
}

#[derive(Subcommand)]
enum TokenAction {
    /// Sign a token with the configured secret
    Issue {
        /// Identity-provider subject (`sub` claim)
        #[arg(short, long)]
        subject: String,

        /// Email claim
        #[arg(short, long)]
        email: String,

        /// Lifetime in minutes
        #[arg(short, long, default_value_t = 60)]
        ttl_minutes: i64,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::User { action } => match action {
            UserAction::GrantRole { user_id, role } => {
                commands::user::grant_role(user_id, &role).await?;
            }
        },
        Commands::Token { action } => match action {
            TokenAction::Issue {
                subject,
                email,
                ttl_minutes,
            } => commands::token::issue(&subject, &email, ttl_minutes)?,
        },
    }
    Ok(())
}
