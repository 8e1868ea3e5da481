//! User management commands.
//!
//! # Usage
//!
//! ```bash
//! plura-cli user create -e owner@example.com -n "Owner Name" -r AGENCY_OWNER -a agency-id
//! ```
//!
//! The user's identity-provider account is linked by email on their first
//! sign-in. Their role metadata is not written from here.

use plura_core::{AgencyId, Email, Role, UserId};
use plura_dashboard::db::Store;
use plura_dashboard::models::{NewUser, User, UserPatch};

use super::{CommandError, connect};

/// Create a user, or update the role and agency of the one holding `email`.
///
/// # Errors
///
/// Returns `CommandError` for an invalid email or name, an unknown agency,
/// or a database failure.
pub async fn create(
    email: &str,
    name: &str,
    role: Role,
    agency: Option<&str>,
) -> Result<User, CommandError> {
    let email = Email::parse(email)?;
    let name = name.trim();
    if name.is_empty() {
        return Err(CommandError::InvalidArgument("name is required".to_string()));
    }

    let store = connect().await?;
    let agency_id = match agency.map(AgencyId::from).filter(|id| !id.is_blank()) {
        Some(id) => {
            if store.agency(&id).await?.is_none() {
                return Err(CommandError::InvalidArgument(format!("unknown agency: {id}")));
            }
            Some(id)
        }
        None => None,
    };

    tracing::info!("Creating user: {} ({})", email, role);
    let user = store
        .upsert_user(
            &NewUser {
                id: UserId::generate(),
                name: name.to_string(),
                avatar_url: String::new(),
                email: email.clone(),
                role,
                agency_id: agency_id.clone(),
            },
            &UserPatch {
                role: Some(role),
                agency_id,
                ..UserPatch::default()
            },
        )
        .await?;

    tracing::info!(
        "User saved! ID: {}, Email: {}, Role: {}",
        user.id,
        user.email,
        user.role
    );
    Ok(user)
}
