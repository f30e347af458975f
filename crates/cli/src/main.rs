//! Marketplace CLI - Database migrations and management tools.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! mp-cli migrate
//!
//! # Create an admin account
//! mp-cli admin create -e admin@example.com -n "Admin Name" -p 'a long password'
//!
//! # Give an existing account admin rights
//! mp-cli admin promote -e someone@example.com
//!
//! # Insert the default categories
//! mp-cli seed categories
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "mp-cli")]
#[command(author, version, about = "Marketplace CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage admin accounts
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
    /// Insert starter data
    Seed {
        #[command(subcommand)]
        target: SeedTarget,
    },
}

#[derive(Subcommand)]
enum AdminAction {
    /// Create a new admin account
    Create {
        /// Admin email address
        #[arg(short, long)]
        email: String,

        /// Admin display name
        #[arg(short, long)]
        name: String,

        /// Initial password (at least 8 characters)
        #[arg(short, long)]
        password: String,
    },
    /// Grant the admin role to an existing account
    Promote {
        /// Account email address
        #[arg(short, long)]
        email: String,
    },
}

#[derive(Subcommand)]
enum SeedTarget {
    /// Insert the default product categories
    Categories,
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
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Admin { action } => match action {
            AdminAction::Create {
                email,
                name,
                password,
            } => {
                commands::admin::create(&email, &name, &password).await?;
            }
            AdminAction::Promote { email } => commands::admin::promote(&email).await?,
        },
        Commands::Seed { target } => match target {
            SeedTarget::Categories => commands::seed::categories().await?,
        },
    }
    Ok(())
}
