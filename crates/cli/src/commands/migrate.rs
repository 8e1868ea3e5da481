//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! plura-cli migrate
//! ```
//!
//! Migrations live in `crates/dashboard/migrations/`.

use super::{CommandError, connect};

/// Run dashboard database migrations.
///
/// # Errors
///
/// Returns `CommandError` if the database is unreachable or a migration fails.
pub async fn run() -> Result<(), CommandError> {
    let store = connect().await?;

    tracing::info!("Running dashboard migrations...");
    sqlx::migrate!("../dashboard/migrations")
        .run(store.pool())
        .await?;

    tracing::info!("Dashboard migrations complete!");
    Ok(())
}
