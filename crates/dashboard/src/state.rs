//! Application state shared across handlers.

use std::sync::Arc;

use crate::db::Store;
use crate::identity::IdentityProvider;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    base_url: String,
    store: Arc<dyn Store>,
    identity: Arc<dyn IdentityProvider>,
}

impl AppState {
    /// `base_url` is the dashboard's public URL; invitations redirect to
    /// `{base_url}/agency`.
    #[must_use]
    pub fn new(
        base_url: impl Into<String>,
        store: Arc<dyn Store>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                base_url: base_url.into(),
                store,
                identity,
            }),
        }
    }

    #[must_use]
    pub fn store(&self) -> &dyn Store {
        self.inner.store.as_ref()
    }

    #[must_use]
    pub fn identity(&self) -> &dyn IdentityProvider {
        self.inner.identity.as_ref()
    }

    #[must_use]
    pub fn invitation_redirect_url(&self) -> String {
        format!("{}/agency", self.inner.base_url.trim_end_matches('/'))
    }
}
