//! Navigation for the signed-in user.

use serde::Serialize;

use crate::models::{SidebarOption, SubAccount, UserDetails};
use crate::services::access::AccessScope;

/// Logo used when the agency has none.
pub const DEFAULT_LOGO: &str = "/assets/plura-logo.svg";

/// Everything the sidebar of an agency or sub-account page shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sidebar {
    pub logo: String,
    /// Name of the agency or sub-account being shown.
    pub name: String,
    pub sidebar_options: Vec<SidebarOption>,
    /// Sub-accounts of the agency the user holds a granted permission for.
    pub sub_accounts: Vec<SubAccount>,
}

/// Build the sidebar for `target` from the user's loaded details.
///
/// Returns `None` if the user has no agency or `target` is not part of it.
/// White-label agencies show their own logo everywhere; otherwise a
/// sub-account shows its own logo.
#[must_use]
pub fn sidebar(details: &UserDetails, target: &AccessScope) -> Option<Sidebar> {
    let agency = details.agency.as_ref()?;
    let agency_logo = if agency.agency.agency_logo.is_empty() {
        DEFAULT_LOGO.to_string()
    } else {
        agency.agency.agency_logo.clone()
    };

    let (logo, name, sidebar_options) = match target {
        AccessScope::Agency(id) => {
            if &agency.agency.id != id {
                return None;
            }
            (
                agency_logo,
                agency.agency.name.clone(),
                agency.sidebar_options.clone(),
            )
        }
        AccessScope::SubAccount(id) => {
            let sub_account = agency.sub_accounts.iter().find(|s| &s.sub_account.id == id)?;
            let logo = if agency.agency.white_label || sub_account.sub_account.sub_account_logo.is_empty() {
                agency_logo
            } else {
                sub_account.sub_account.sub_account_logo.clone()
            };
            (
                logo,
                sub_account.sub_account.name.clone(),
                sub_account.sidebar_options.clone(),
            )
        }
    };

    let sub_accounts = agency
        .sub_accounts
        .iter()
        .filter(|s| {
            details
                .accessible_sub_accounts()
                .any(|id| id == &s.sub_account.id)
        })
        .map(|s| s.sub_account.clone())
        .collect();

    Some(Sidebar {
        logo,
        name,
        sidebar_options,
        sub_accounts,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::Store;
    use crate::services::fixtures::{self, AGENCY, SUB_ACCOUNT};
    use crate::services::tenancy::TenancyService;
    use plura_core::{AgencyId, SubAccountId};

    async fn details(f: &fixtures::Fixture) -> UserDetails {
        f.store
            .user_details(&f.owner_principal.email)
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_agency_sidebar() {
        let f = fixtures::agency_with_sub_account().await;
        let details = details(&f).await;

        let bar = sidebar(&details, &AccessScope::Agency(AgencyId::new(AGENCY))).unwrap();
        assert_eq!(bar.name, "Acme");
        assert_eq!(bar.logo, "https://img.plura.test/acme.png");
        assert_eq!(bar.sidebar_options.len(), 6);
        assert_eq!(bar.sub_accounts.len(), 1);
    }

    #[tokio::test]
    async fn test_white_label_uses_agency_logo() {
        let f = fixtures::agency_with_sub_account().await;
        let target = AccessScope::SubAccount(SubAccountId::new(SUB_ACCOUNT));

        let bar = sidebar(&details(&f).await, &target).unwrap();
        assert_eq!(bar.logo, "https://img.plura.test/acme.png");
        assert_eq!(bar.sidebar_options.len(), 8);

        let mut input = fixtures::agency_input(AGENCY, f.owner_principal.email.as_str());
        input.white_label = false;
        TenancyService::new(&f.store, &f.identity)
            .upsert_agency(&input)
            .await
            .unwrap();
        let bar = sidebar(&details(&f).await, &target).unwrap();
        assert_eq!(bar.logo, "https://img.plura.test/shop.png");
    }

    #[tokio::test]
    async fn test_unknown_target_is_none() {
        let f = fixtures::agency_with_sub_account().await;
        let details = details(&f).await;

        assert!(sidebar(&details, &AccessScope::Agency(AgencyId::new("ag2"))).is_none());
        assert!(
            sidebar(&details, &AccessScope::SubAccount(SubAccountId::new("missing"))).is_none()
        );
    }
}
