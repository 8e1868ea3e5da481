//! Sub-account funnels.

use serde::Deserialize;
use tracing::{info, instrument};

use plura_core::{FunnelId, SubAccountId};

use crate::db::Store;
use crate::error::AppError;
use crate::models::{Funnel, FunnelRecord};
use crate::validation::{ValidationError, Validator};

/// Product list of a funnel that has none.
pub const NO_LIVE_PRODUCTS: &str = "[]";

/// Funnel create-or-update request. A missing or blank id creates a new
/// funnel.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertFunnelInput {
    #[serde(default)]
    pub id: Option<FunnelId>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sub_domain_name: Option<String>,
    #[serde(default)]
    pub favicon: Option<String>,
    /// JSON array of product references.
    #[serde(default)]
    pub live_products: Option<String>,
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl UpsertFunnelInput {
    /// # Errors
    ///
    /// Returns every offending field.
    pub fn validate(&self) -> Result<FunnelRecord, ValidationError> {
        let mut v = Validator::new();
        let name = v.required("name", &self.name);
        let live_products =
            non_blank(self.live_products.as_ref()).unwrap_or_else(|| NO_LIVE_PRODUCTS.to_string());
        v.check(
            serde_json::from_str::<Vec<serde_json::Value>>(&live_products).is_ok(),
            "liveProducts",
            "must be a JSON array",
        );
        let id = self
            .id
            .clone()
            .filter(|id| !id.is_blank())
            .unwrap_or_else(FunnelId::generate);
        v.finish(FunnelRecord {
            id,
            name,
            description: non_blank(self.description.as_ref()),
            sub_domain_name: non_blank(self.sub_domain_name.as_ref()),
            favicon: non_blank(self.favicon.as_ref()),
            live_products,
        })
    }
}

/// Funnel service.
pub struct FunnelService<'a> {
    store: &'a dyn Store,
}

impl<'a> FunnelService<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// # Errors
    ///
    /// Returns `AppError::Validation` for bad input, `AppError::BadRequest`
    /// for a taken subdomain or unknown sub-account, or a database error.
    #[instrument(skip(self, input), fields(sub_account_id = %sub_account_id))]
    pub async fn upsert_funnel(
        &self,
        sub_account_id: &SubAccountId,
        input: &UpsertFunnelInput,
    ) -> Result<Funnel, AppError> {
        let record = input.validate()?;
        let funnel = self
            .store
            .upsert_funnel(sub_account_id, &record)
            .await
            .map_err(AppError::from_write)?;
        info!(funnel_id = %funnel.id, "Funnel saved");
        Ok(funnel)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::fixtures::{self, SUB_ACCOUNT};

    fn input(sub_domain: Option<&str>) -> UpsertFunnelInput {
        UpsertFunnelInput {
            id: None,
            name: "Spring Sale".to_string(),
            description: None,
            sub_domain_name: sub_domain.map(str::to_string),
            favicon: None,
            live_products: None,
        }
    }

    #[test]
    fn test_live_products_default_and_shape() {
        let record = input(None).validate().unwrap();
        assert_eq!(record.live_products, NO_LIVE_PRODUCTS);

        let bad = UpsertFunnelInput {
            live_products: Some("{\"not\":\"a list\"}".to_string()),
            ..input(None)
        };
        assert!(bad.validate().unwrap_err().has_field("liveProducts"));
    }

    #[tokio::test]
    async fn test_upsert_creates_then_updates() {
        let f = fixtures::agency_with_sub_account().await;
        let service = FunnelService::new(&f.store);
        let sub_account_id = SubAccountId::new(SUB_ACCOUNT);

        let created = service
            .upsert_funnel(&sub_account_id, &input(Some("spring")))
            .await
            .unwrap();
        assert!(!created.published);

        let renamed = UpsertFunnelInput {
            id: Some(created.id.clone()),
            name: "Summer Sale".to_string(),
            ..input(Some("spring"))
        };
        let updated = service.upsert_funnel(&sub_account_id, &renamed).await.unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.name, "Summer Sale");
    }

    #[tokio::test]
    async fn test_taken_subdomain_is_bad_request() {
        let f = fixtures::agency_with_sub_account().await;
        let service = FunnelService::new(&f.store);
        let sub_account_id = SubAccountId::new(SUB_ACCOUNT);

        service
            .upsert_funnel(&sub_account_id, &input(Some("spring")))
            .await
            .unwrap();
        let result = service
            .upsert_funnel(&sub_account_id, &input(Some("spring")))
            .await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }
}
