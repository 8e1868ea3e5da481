//! Plura CLI - Database migrations and management tools.
//!
//! # Usage
//!
//! ```bash
//! # Run dashboard database migrations
//! plura-cli migrate
//!
//! # Create a user directly, optionally attached to an agency
//! plura-cli user create -e owner@example.com -n "Owner Name" -r AGENCY_OWNER -a agency-id
//!
//! # Record an invitation; it is accepted on the invitee's next sign-in
//! plura-cli invitation create -e member@example.com -a agency-id -r SUBACCOUNT_USER
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `user create` - Create or update a user
//! - `invitation create` - Record a pending invitation

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use plura_core::Role;

mod commands;

#[derive(Parser)]
#[command(name = "plura-cli")]
#[command(author, version, about = "Plura dashboard CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run dashboard database migrations
    Migrate,
    /// Manage users
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Manage invitations
    Invitation {
        #[command(subcommand)]
        action: InvitationAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Create a user, or update the one holding the email
    Create {
        /// Email address
        #[arg(short, long)]
        email: String,

        /// Display name
        #[arg(short, long)]
        name: String,

        /// Role (`AGENCY_OWNER`, `AGENCY_ADMIN`, `SUBACCOUNT_USER`, `SUBACCOUNT_GUEST`)
        #[arg(short, long, default_value = "SUBACCOUNT_USER")]
        role: Role,

        /// Agency the user belongs to
        #[arg(short, long)]
        agency: Option<String>,
    },
}

#[derive(Subcommand)]
enum InvitationAction {
    /// Record a pending invitation to an agency
    Create {
        /// Email address to invite
        #[arg(short, long)]
        email: String,

        /// Agency to invite into
        #[arg(short, long)]
        agency: String,

        /// Role granted on acceptance (`AGENCY_ADMIN`, `SUBACCOUNT_USER`, `SUBACCOUNT_GUEST`)
        #[arg(short, long, default_value = "SUBACCOUNT_USER")]
        role: Role,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::CommandError> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::User { action } => match action {
            UserAction::Create {
                email,
                name,
                role,
                agency,
            } => {
                commands::users::create(&email, &name, role, agency.as_deref()).await?;
            }
        },
        Commands::Invitation { action } => match action {
            InvitationAction::Create {
                email,
                agency,
                role,
            } => {
                commands::invitations::create(&email, &agency, role).await?;
            }
        },
    }
    Ok(())
}
