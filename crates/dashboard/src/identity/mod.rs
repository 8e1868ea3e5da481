//! Identity provider adapter.
//!
//! The dashboard never authenticates anyone itself. It asks the identity
//! provider who owns a session token, and it mirrors each user's role into
//! the provider's private metadata so other surfaces can read it without a
//! datastore round-trip.
//!
//! - [`IdentityClient`] talks to the provider's backend API over HTTP.
//! - [`MemoryIdentity`] keeps principals in process for local runs and tests.

mod client;
mod memory;

pub use client::IdentityClient;
pub use memory::{MemoryIdentity, SentInvitation};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use plura_core::{Email, Role, UserId};

/// The currently authenticated identity-provider user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub id: UserId,
    /// First and last name joined by a space.
    pub name: String,
    pub email: Email,
    pub avatar_url: String,
    /// Role mirrored into the provider's private metadata, if any.
    pub role_metadata: Option<Role>,
}

/// Errors that can occur when talking to the identity provider.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("identity provider returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The provider's response could not be understood.
    #[error("could not decode identity response: {0}")]
    Decode(String),
}

/// Operations the dashboard needs from the identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve the principal that owns `session_token`.
    ///
    /// Returns `Ok(None)` for an unknown or expired session.
    async fn current_principal(
        &self,
        session_token: &str,
    ) -> Result<Option<Principal>, IdentityError>;

    /// Write `role` into the principal's private metadata; `None` clears it.
    async fn update_role_metadata(
        &self,
        principal_id: &UserId,
        role: Option<Role>,
    ) -> Result<(), IdentityError>;

    /// Ask the provider to email an invitation that lands on `redirect_url`.
    async fn create_invitation(
        &self,
        email: &Email,
        role: Role,
        redirect_url: &str,
    ) -> Result<(), IdentityError>;
}
