//! In-process identity provider.
//!
//! Sessions are registered up front with [`MemoryIdentity::sign_in`].
//! Metadata writes and invitations are recorded so callers can inspect
//! them, and either can be switched to fail.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use plura_core::{Email, Role, UserId};

use super::{IdentityError, IdentityProvider, Principal};

/// An invitation handed to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentInvitation {
    pub email: Email,
    pub role: Role,
    pub redirect_url: String,
}

#[derive(Debug, Default)]
pub struct MemoryIdentity {
    sessions: RwLock<HashMap<String, Principal>>,
    metadata_writes: RwLock<Vec<(UserId, Option<Role>)>>,
    invitations: RwLock<Vec<SentInvitation>>,
    fail_metadata: AtomicBool,
    fail_invitations: AtomicBool,
}

impl MemoryIdentity {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `principal` as the owner of `session_token`.
    pub async fn sign_in(&self, session_token: impl Into<String>, principal: Principal) {
        self.sessions
            .write()
            .await
            .insert(session_token.into(), principal);
    }

    /// Make every following metadata write fail (or succeed again).
    pub fn fail_metadata_writes(&self, fail: bool) {
        self.fail_metadata.store(fail, Ordering::SeqCst);
    }

    /// Make every following invitation fail (or succeed again).
    pub fn fail_invitations(&self, fail: bool) {
        self.fail_invitations.store(fail, Ordering::SeqCst);
    }

    /// Metadata writes accepted so far, oldest first.
    pub async fn metadata_writes(&self) -> Vec<(UserId, Option<Role>)> {
        self.metadata_writes.read().await.clone()
    }

    /// Invitations accepted so far, oldest first.
    pub async fn sent_invitations(&self) -> Vec<SentInvitation> {
        self.invitations.read().await.clone()
    }

    fn unavailable() -> IdentityError {
        IdentityError::Status {
            status: 503,
            body: "identity provider unavailable".to_string(),
        }
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentity {
    async fn current_principal(
        &self,
        session_token: &str,
    ) -> Result<Option<Principal>, IdentityError> {
        Ok(self.sessions.read().await.get(session_token).cloned())
    }

    async fn update_role_metadata(
        &self,
        principal_id: &UserId,
        role: Option<Role>,
    ) -> Result<(), IdentityError> {
        if self.fail_metadata.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        for principal in self.sessions.write().await.values_mut() {
            if &principal.id == principal_id {
                principal.role_metadata = role;
            }
        }
        self.metadata_writes
            .write()
            .await
            .push((principal_id.clone(), role));
        Ok(())
    }

    async fn create_invitation(
        &self,
        email: &Email,
        role: Role,
        redirect_url: &str,
    ) -> Result<(), IdentityError> {
        if self.fail_invitations.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.invitations.write().await.push(SentInvitation {
            email: email.clone(),
            role,
            redirect_url: redirect_url.to_string(),
        });
        Ok(())
    }
}
