//! Association portal CLI - migrations, user management and a local demo.
//!
//! # Usage
//!
//! ```bash
//! # Create the profile schema
//! portal-cli migrate
//!
//! # List registered users
//! portal-cli users list
//!
//! # Let a user publish as the BDE and the PNC
//! portal-cli users grant -u 3f2a9c -a bde,pnc
//!
//! # Run the identity flow against in-memory collaborators
//! portal-cli demo
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run profile store migrations
//! - `users list` - List user profiles
//! - `users grant` - Grant publishing rights
//! - `demo` - Sign in, edit, race and sign out with every emission logged

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "portal-cli")]
#[command(author, version, about = "Association portal CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run profile store migrations
    Migrate,
    /// Manage user profiles
    Users {
        #[command(subcommand)]
        action: UsersAction,
    },
    /// Run the identity flow against in-memory collaborators
    Demo,
}

#[derive(Subcommand)]
enum UsersAction {
    /// List every user profile
    List,
    /// Grant publishing rights to a user
    Grant {
        /// User identifier
        #[arg(short, long)]
        user: String,

        /// Association codes (bde, bds, bdc, bdj, bda, bdh, pnc)
        #[arg(short, long, value_delimiter = ',', required = true)]
        associations: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    // Defaults to info level for our crates if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "asso_portal_identity=info,portal_cli=info".into());
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

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
        Commands::Users { action } => match action {
            UsersAction::List => commands::users::list().await?,
            UsersAction::Grant { user, associations } => {
                commands::users::grant(&user, &associations).await?;
            }
        },
        Commands::Demo => commands::demo::run().await?,
    }
    Ok(())
}
