//! HTTP client for the identity provider's backend API.
//!
//! Principals are cached per session token; the whole cache is dropped
//! after every metadata write so a changed role is visible on the next
//! request.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use plura_core::{Email, Role, UserId};

use super::{IdentityError, IdentityProvider, Principal};
use crate::config::IdentityConfig;

/// Client for the identity provider.
#[derive(Clone)]
pub struct IdentityClient {
    inner: Arc<IdentityClientInner>,
}

struct IdentityClientInner {
    client: reqwest::Client,
    api_url: String,
    secret_key: SecretString,
    principals: Cache<String, Principal>,
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    id: String,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    image_url: String,
    #[serde(default)]
    email_addresses: Vec<ApiEmailAddress>,
    #[serde(default)]
    private_metadata: ApiMetadata,
}

#[derive(Debug, Deserialize)]
struct ApiEmailAddress {
    email_address: String,
}

#[derive(Debug, Default, Deserialize)]
struct ApiMetadata {
    #[serde(default)]
    role: Option<String>,
}

impl TryFrom<ApiUser> for Principal {
    type Error = IdentityError;

    fn try_from(user: ApiUser) -> Result<Self, Self::Error> {
        let address = user
            .email_addresses
            .first()
            .ok_or_else(|| IdentityError::Decode(format!("user {} has no email", user.id)))?;
        let email = Email::parse(&address.email_address)
            .map_err(|e| IdentityError::Decode(e.to_string()))?;

        let name = [user.first_name, user.last_name]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        // Metadata is written by us, but anything unrecognized is treated as unset.
        let role_metadata = user
            .private_metadata
            .role
            .and_then(|role| role.parse::<Role>().ok());

        Ok(Self {
            id: UserId::new(user.id),
            name,
            email,
            avatar_url: user.image_url,
            role_metadata,
        })
    }
}

impl std::fmt::Debug for IdentityClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityClient")
            .field("api_url", &self.inner.api_url)
            .field("secret_key", &self.inner.secret_key)
            .finish_non_exhaustive()
    }
}

impl IdentityClient {
    /// Create a new identity provider client.
    #[must_use]
    pub fn new(config: &IdentityConfig) -> Self {
        let principals = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(Duration::from_secs(config.cache_ttl_secs))
            .build();

        Self {
            inner: Arc::new(IdentityClientInner {
                client: reqwest::Client::new(),
                api_url: config.api_url.trim_end_matches('/').to_string(),
                secret_key: config.secret_key.clone(),
                principals,
            }),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.inner.api_url)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, IdentityError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::error!(
            status = %status,
            body = %body.chars().take(500).collect::<String>(),
            "Identity provider returned non-success status"
        );
        Err(IdentityError::Status {
            status: status.as_u16(),
            body: body.chars().take(200).collect(),
        })
    }
}

#[async_trait]
impl IdentityProvider for IdentityClient {
    #[instrument(skip(self, session_token))]
    async fn current_principal(
        &self,
        session_token: &str,
    ) -> Result<Option<Principal>, IdentityError> {
        if let Some(principal) = self.inner.principals.get(session_token).await {
            debug!(principal_id = %principal.id, "Principal cache hit");
            return Ok(Some(principal));
        }

        let response = self
            .inner
            .client
            .get(self.url("/v1/me"))
            .bearer_auth(self.inner.secret_key.expose_secret())
            .header("X-Session-Token", session_token)
            .send()
            .await?;

        if matches!(
            response.status(),
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::NOT_FOUND
        ) {
            return Ok(None);
        }

        let text = Self::check(response).await?.text().await?;
        let user: ApiUser =
            serde_json::from_str(&text).map_err(|e| IdentityError::Decode(e.to_string()))?;
        let principal = Principal::try_from(user)?;

        self.inner
            .principals
            .insert(session_token.to_string(), principal.clone())
            .await;
        Ok(Some(principal))
    }

    #[instrument(skip(self), fields(principal_id = %principal_id))]
    async fn update_role_metadata(
        &self,
        principal_id: &UserId,
        role: Option<Role>,
    ) -> Result<(), IdentityError> {
        let response = self
            .inner
            .client
            .patch(self.url(&format!("/v1/users/{principal_id}/metadata")))
            .bearer_auth(self.inner.secret_key.expose_secret())
            .json(&json!({ "private_metadata": { "role": role } }))
            .send()
            .await?;
        Self::check(response).await?;

        self.inner.principals.invalidate_all();
        Ok(())
    }

    #[instrument(skip(self), fields(email = %email, role = %role.as_str()))]
    async fn create_invitation(
        &self,
        email: &Email,
        role: Role,
        redirect_url: &str,
    ) -> Result<(), IdentityError> {
        let response = self
            .inner
            .client
            .post(self.url("/v1/invitations"))
            .bearer_auth(self.inner.secret_key.expose_secret())
            .json(&json!({
                "email_address": email,
                "redirect_url": redirect_url,
                "public_metadata": { "throughInvitation": true, "role": role },
            }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn api_user(json: serde_json::Value) -> ApiUser {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_principal_from_api_user() {
        let principal = Principal::try_from(api_user(json!({
            "id": "user_1",
            "first_name": "Ada",
            "last_name": "Lovelace",
            "image_url": "https://img.test/a.png",
            "email_addresses": [{ "email_address": "ada@x.com" }],
            "private_metadata": { "role": "AGENCY_ADMIN" }
        })))
        .unwrap();

        assert_eq!(principal.id.as_str(), "user_1");
        assert_eq!(principal.name, "Ada Lovelace");
        assert_eq!(principal.email.as_str(), "ada@x.com");
        assert_eq!(principal.role_metadata, Some(Role::AgencyAdmin));
    }

    #[test]
    fn test_unknown_metadata_role_is_unset() {
        let principal = Principal::try_from(api_user(json!({
            "id": "user_1",
            "first_name": "Ada",
            "email_addresses": [{ "email_address": "ada@x.com" }],
            "private_metadata": { "role": "SUPERUSER" }
        })))
        .unwrap();

        assert_eq!(principal.name, "Ada");
        assert_eq!(principal.role_metadata, None);
    }

    #[test]
    fn test_secret_key_stays_redacted() {
        let client = IdentityClient::new(&IdentityConfig {
            api_url: "https://api.identity.test/".to_string(),
            secret_key: SecretString::from("sk_test_4kPz8wQe"),
            cache_ttl_secs: 30,
        });

        let debug = format!("{client:?}");
        assert!(!debug.contains("sk_test_4kPz8wQe"));
        assert_eq!(client.inner.secret_key.expose_secret(), "sk_test_4kPz8wQe");
        assert_eq!(client.url("/v1/me"), "https://api.identity.test/v1/me");
    }

    #[test]
    fn test_user_without_email_is_rejected() {
        let result = Principal::try_from(api_user(json!({ "id": "user_1" })));
        assert!(matches!(result, Err(IdentityError::Decode(_))));
    }
}
