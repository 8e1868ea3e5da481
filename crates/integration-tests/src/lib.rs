//! Integration tests for the Plura dashboard.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p plura-integration-tests
//! ```
//!
//! Every test runs against the in-memory datastore and identity provider,
//! so no database or network is needed. [`TestContext`] builds the same
//! router the server binary serves on top of them.
//!
//! # Test Categories
//!
//! - `access` - Authorization and landing decisions
//! - `invitations` - Sending and accepting invitations
//! - `tenancy` - Agencies, sub-accounts and permissions
//! - `pipelines` - Lane and ticket ordering
//! - `http` - Requests through the full router

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use serde_json::Value;
use tower::ServiceExt;

use plura_core::{AgencyId, Email, Role, SubAccountId, UserId};
use plura_dashboard::db::{MemoryStore, Store};
use plura_dashboard::identity::{IdentityProvider, MemoryIdentity, Principal};
use plura_dashboard::services::{TenancyService, UpsertAgencyInput, UpsertSubAccountInput};
use plura_dashboard::state::AppState;

/// Agency seeded by [`TestContext::seeded`].
pub const AGENCY: &str = "agency_acme";
/// Sub-account seeded by [`TestContext::seeded`].
pub const SUB_ACCOUNT: &str = "sub_acme_shop";
/// Session token of the seeded agency owner.
pub const OWNER_TOKEN: &str = "session_owner";

/// Largest response body the tests will read.
const BODY_LIMIT: usize = 1024 * 1024;

/// A dashboard wired to in-memory backends.
pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub identity: Arc<MemoryIdentity>,
    pub state: AppState,
    pub owner: Principal,
}

/// A response read in full.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestContext {
    /// An empty dashboard.
    #[must_use]
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let identity = Arc::new(MemoryIdentity::new());
        let dyn_store: Arc<dyn Store> = store.clone();
        let dyn_identity: Arc<dyn IdentityProvider> = identity.clone();
        let state = AppState::new("https://app.plura.test", dyn_store, dyn_identity);
        Self {
            store,
            identity,
            state,
            owner: principal("user_olive", "Olive Owner", "olive@acme.test"),
        }
    }

    /// Agency [`AGENCY`] owned by a signed-in owner, with one sub-account
    /// [`SUB_ACCOUNT`].
    pub async fn seeded() -> Self {
        let ctx = Self::new();
        ctx.identity.sign_in(OWNER_TOKEN, ctx.owner.clone()).await;

        let tenancy = ctx.tenancy();
        tenancy
            .init_user(&ctx.owner, Some(Role::AgencyOwner))
            .await
            .unwrap_or_else(|e| panic!("seed owner: {e}"));
        tenancy
            .upsert_agency(&agency_input(AGENCY, ctx.owner.email.as_str()))
            .await
            .unwrap_or_else(|e| panic!("seed agency: {e}"));
        tenancy
            .upsert_sub_account(&sub_account_input(SUB_ACCOUNT, AGENCY))
            .await
            .unwrap_or_else(|e| panic!("seed sub-account: {e}"))
            .unwrap_or_else(|| panic!("seed sub-account: agency has no owner"));
        ctx
    }

    #[must_use]
    pub fn tenancy(&self) -> TenancyService<'_> {
        TenancyService::new(self.state.store(), self.state.identity())
    }

    /// The application router, as served by the binary.
    #[must_use]
    pub fn app(&self) -> Router {
        plura_dashboard::build_router(self.state.clone())
    }

    /// Sign `principal` in under `token`.
    pub async fn sign_in(&self, token: &str, principal: &Principal) {
        self.identity.sign_in(token, principal.clone()).await;
    }

    /// Send one request through the router.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let request = builder
            .body(body)
            .unwrap_or_else(|e| panic!("build request: {e}"));

        let response = self
            .app()
            .oneshot(request)
            .await
            .unwrap_or_else(|e| match e {});
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), BODY_LIMIT)
            .await
            .unwrap_or_else(|e| panic!("read body: {e}"));
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        TestResponse {
            status,
            headers,
            body,
        }
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// An identity-provider user.
#[must_use]
pub fn principal(id: &str, name: &str, email: &str) -> Principal {
    Principal {
        id: UserId::new(id),
        name: name.to_string(),
        email: Email::parse(email).unwrap_or_else(|e| panic!("bad test email {email}: {e}")),
        avatar_url: format!("https://img.plura.test/{id}.png"),
        role_metadata: None,
    }
}

#[must_use]
pub fn agency_input(id: &str, company_email: &str) -> UpsertAgencyInput {
    UpsertAgencyInput {
        id: AgencyId::new(id),
        name: "Acme Agency".to_string(),
        agency_logo: "https://img.plura.test/acme.png".to_string(),
        company_email: company_email.to_string(),
        company_phone: "555-0100".to_string(),
        white_label: true,
        address: "1 Main St".to_string(),
        city: "Springfield".to_string(),
        zip_code: "12345".to_string(),
        state: "IL".to_string(),
        country: "US".to_string(),
        connect_account_id: None,
        goal: None,
    }
}

#[must_use]
pub fn sub_account_input(id: &str, agency_id: &str) -> UpsertSubAccountInput {
    UpsertSubAccountInput {
        id: SubAccountId::new(id),
        agency_id: AgencyId::new(agency_id),
        name: "Acme Shop".to_string(),
        sub_account_logo: "https://img.plura.test/shop.png".to_string(),
        company_email: "shop@acme.test".to_string(),
        company_phone: "555-0101".to_string(),
        address: "2 Main St".to_string(),
        city: "Springfield".to_string(),
        zip_code: "12345".to_string(),
        state: "IL".to_string(),
        country: "US".to_string(),
        connect_account_id: None,
        goal: None,
    }
}
