//! Agencies, sub-accounts, their members and permissions.
//!
//! Creating a tenant materializes its navigation in the same write: six
//! sidebar entries for an agency, and for a sub-account eight entries plus
//! a "Lead Cycle" pipeline and an access grant for the agency owner.
//!
//! Role changes are mirrored into the identity provider's metadata after
//! the datastore write. A failed mirror is logged and otherwise ignored;
//! the datastore stays authoritative.

use serde::Deserialize;
use tracing::{error, info, instrument, warn};

use plura_core::{AgencyId, Email, PermissionId, Role, SubAccountId, UserId};

use crate::db::Store;
use crate::error::AppError;
use crate::identity::{IdentityProvider, Principal};
use crate::models::{
    Agency, AgencyPatch, AgencyRecord, NewUser, Permission, PermissionWithSubAccount, SidebarSeed,
    SubAccount, SubAccountRecord, SubAccountSeed, User, UserDetails, UserPatch,
};
use crate::validation::{ValidationError, Validator};

pub const DEFAULT_GOAL: i32 = 5;
pub const DEFAULT_PIPELINE_NAME: &str = "Lead Cycle";

/// Agency create-or-update request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertAgencyInput {
    pub id: AgencyId,
    pub name: String,
    pub agency_logo: String,
    pub company_email: String,
    pub company_phone: String,
    pub white_label: bool,
    pub address: String,
    pub city: String,
    pub zip_code: String,
    pub state: String,
    pub country: String,
    #[serde(default)]
    pub connect_account_id: Option<String>,
    #[serde(default)]
    pub goal: Option<i32>,
}

impl UpsertAgencyInput {
    /// Check every field and build the record to store.
    ///
    /// # Errors
    ///
    /// Returns every offending field.
    pub fn validate(&self) -> Result<AgencyRecord, ValidationError> {
        let mut v = Validator::new();
        v.required_id("id", &self.id);
        let record = AgencyRecord {
            id: self.id.clone(),
            name: v.required("name", &self.name),
            agency_logo: v.required("agencyLogo", &self.agency_logo),
            company_email: v.required("companyEmail", &self.company_email),
            company_phone: v.required("companyPhone", &self.company_phone),
            white_label: self.white_label,
            address: v.required("address", &self.address),
            city: v.required("city", &self.city),
            zip_code: v.required("zipCode", &self.zip_code),
            state: v.required("state", &self.state),
            country: v.required("country", &self.country),
            connect_account_id: self.connect_account_id.clone().unwrap_or_default(),
            goal: self.goal.unwrap_or(DEFAULT_GOAL),
        };
        v.finish(record)
    }
}

/// Sub-account create-or-update request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertSubAccountInput {
    pub id: SubAccountId,
    pub agency_id: AgencyId,
    pub name: String,
    pub sub_account_logo: String,
    pub company_email: String,
    pub company_phone: String,
    pub address: String,
    pub city: String,
    pub zip_code: String,
    pub state: String,
    pub country: String,
    #[serde(default)]
    pub connect_account_id: Option<String>,
    #[serde(default)]
    pub goal: Option<i32>,
}

impl UpsertSubAccountInput {
    /// Check every field and build the record to store.
    ///
    /// # Errors
    ///
    /// Returns every offending field.
    pub fn validate(&self) -> Result<SubAccountRecord, ValidationError> {
        let mut v = Validator::new();
        v.required_id("id", &self.id);
        v.required_id("agencyId", &self.agency_id);
        let record = SubAccountRecord {
            id: self.id.clone(),
            agency_id: self.agency_id.clone(),
            name: v.required("name", &self.name),
            sub_account_logo: v.required("subAccountLogo", &self.sub_account_logo),
            company_email: v.required("companyEmail", &self.company_email),
            company_phone: v.required("companyPhone", &self.company_phone),
            address: v.required("address", &self.address),
            city: v.required("city", &self.city),
            zip_code: v.required("zipCode", &self.zip_code),
            state: v.required("state", &self.state),
            country: v.required("country", &self.country),
            connect_account_id: self.connect_account_id.clone().unwrap_or_default(),
            goal: self.goal.unwrap_or(DEFAULT_GOAL),
        };
        v.finish(record)
    }
}

/// Navigation created with a new agency.
#[must_use]
pub fn agency_sidebar(id: &AgencyId) -> Vec<SidebarSeed> {
    let base = format!("/agency/{id}");
    [
        ("Dashboard", "category", ""),
        ("Launchpad", "clipboardIcon", "/launchpad"),
        ("Billing", "payment", "/billing"),
        ("Settings", "settings", "/settings"),
        ("Sub Accounts", "person", "/all-subaccounts"),
        ("Team", "shield", "/team"),
    ]
    .into_iter()
    .map(|(name, icon, path)| SidebarSeed {
        name,
        icon,
        link: format!("{base}{path}"),
    })
    .collect()
}

/// Navigation created with a new sub-account.
#[must_use]
pub fn sub_account_sidebar(id: &SubAccountId) -> Vec<SidebarSeed> {
    let base = format!("/subaccount/{id}");
    [
        ("Launchpad", "clipboardIcon", "/launchpad"),
        ("Settings", "settings", "/settings"),
        ("Funnels", "pipelines", "/funnels"),
        ("Media", "database", "/media"),
        ("Automations", "chip", "/automations"),
        ("Pipelines", "flag", "/pipelines"),
        ("Contacts", "person", "/contacts"),
        ("Dashboard", "category", ""),
    ]
    .into_iter()
    .map(|(name, icon, path)| SidebarSeed {
        name,
        icon,
        link: format!("{base}{path}"),
    })
    .collect()
}

/// Tenancy service.
pub struct TenancyService<'a> {
    store: &'a dyn Store,
    identity: &'a dyn IdentityProvider,
}

impl<'a> TenancyService<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn Store, identity: &'a dyn IdentityProvider) -> Self {
        Self { store, identity }
    }

    /// Mirror `role` into the principal's metadata, logging any failure.
    async fn sync_role(&self, user_id: &UserId, role: Option<Role>) {
        if let Err(e) = self.identity.update_role_metadata(user_id, role).await {
            warn!(error = %e, user_id = %user_id, "Failed to sync role metadata");
        }
    }

    // --- Users ---

    /// Create the principal's user on first sign-in, or update its role.
    ///
    /// New users default to `SUBACCOUNT_USER`.
    ///
    /// # Errors
    ///
    /// Returns a database error if the upsert fails.
    #[instrument(skip(self, principal), fields(email = %principal.email))]
    pub async fn init_user(
        &self,
        principal: &Principal,
        role: Option<Role>,
    ) -> Result<User, AppError> {
        let create = NewUser {
            id: principal.id.clone(),
            name: principal.name.clone(),
            avatar_url: principal.avatar_url.clone(),
            email: principal.email.clone(),
            role: role.unwrap_or_default(),
            agency_id: None,
        };
        let update = UserPatch {
            role,
            ..UserPatch::default()
        };
        let user = self.store.upsert_user(&create, &update).await?;

        self.sync_role(&user.id, Some(user.role)).await;
        info!(user_id = %user.id, role = %user.role.as_str(), "User initialized");
        Ok(user)
    }

    /// Apply `patch` to the user with `email`.
    ///
    /// # Errors
    ///
    /// Returns a database error if the update fails.
    #[instrument(skip(self, patch), fields(email = %email))]
    pub async fn update_user(
        &self,
        email: &Email,
        patch: &UserPatch,
    ) -> Result<Option<User>, AppError> {
        let Some(user) = self.store.update_user(email, patch).await? else {
            return Ok(None);
        };
        self.sync_role(&user.id, Some(user.role)).await;
        Ok(Some(user))
    }

    /// Delete a user, then clear their role metadata.
    ///
    /// # Errors
    ///
    /// Returns a database error if the delete fails.
    #[instrument(skip(self))]
    pub async fn delete_user(&self, id: &UserId) -> Result<Option<User>, AppError> {
        let deleted = self.store.delete_user(id).await?;
        if deleted.is_some() {
            self.sync_role(id, None).await;
            info!(user_id = %id, "User deleted");
        }
        Ok(deleted)
    }

    /// # Errors
    ///
    /// Returns a database error if the lookup fails.
    pub async fn user(&self, id: &UserId) -> Result<Option<User>, AppError> {
        Ok(self.store.user_by_id(id).await?)
    }

    /// The user with their agency (navigation and sub-accounts included)
    /// and permissions.
    ///
    /// # Errors
    ///
    /// Returns a database error if the lookup fails.
    pub async fn user_details(&self, email: &Email) -> Result<Option<UserDetails>, AppError> {
        Ok(self.store.user_details(email).await?)
    }

    /// # Errors
    ///
    /// Returns a database error if the lookup fails.
    pub async fn user_permissions(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<PermissionWithSubAccount>, AppError> {
        Ok(self.store.permissions_for_user(user_id).await?)
    }

    /// # Errors
    ///
    /// Returns a database error if the lookup fails.
    pub async fn team_members(&self, agency_id: &AgencyId) -> Result<Vec<User>, AppError> {
        Ok(self.store.team_members(agency_id).await?)
    }

    /// Grant or revoke a user's access to a sub-account.
    ///
    /// Updates `permission_id` when given and present, otherwise the grant
    /// for (`email`, `sub_account_id`). A failed write is logged and
    /// reported as `None`.
    #[instrument(skip(self), fields(email = %email, sub_account_id = %sub_account_id))]
    pub async fn change_user_permission(
        &self,
        permission_id: Option<PermissionId>,
        email: &Email,
        sub_account_id: &SubAccountId,
        access: bool,
    ) -> Option<Permission> {
        let id = permission_id.unwrap_or_else(PermissionId::generate);
        match self
            .store
            .upsert_permission(&id, email, sub_account_id, access)
            .await
        {
            Ok(permission) => Some(permission),
            Err(e) => {
                error!(error = %e, "Could not change permission");
                None
            }
        }
    }

    // --- Agencies ---

    /// Validate, then update the agency or create it with its navigation.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` before any write if a field is
    /// invalid, or a database error.
    #[instrument(skip(self, input), fields(agency_id = %input.id))]
    pub async fn upsert_agency(&self, input: &UpsertAgencyInput) -> Result<Agency, AppError> {
        let record = input.validate()?;
        let agency = self
            .store
            .upsert_agency(&record, &agency_sidebar(&record.id))
            .await
            .map_err(AppError::from_write)?;

        info!(agency_id = %agency.id, "Agency saved");
        Ok(agency)
    }

    /// # Errors
    ///
    /// Returns a database error if the update fails.
    #[instrument(skip(self, patch))]
    pub async fn update_agency_details(
        &self,
        id: &AgencyId,
        patch: &AgencyPatch,
    ) -> Result<Option<Agency>, AppError> {
        Ok(self.store.update_agency(id, patch).await?)
    }

    /// Delete an agency and everything it owns.
    ///
    /// # Errors
    ///
    /// Returns a database error if the delete fails.
    #[instrument(skip(self))]
    pub async fn delete_agency(&self, id: &AgencyId) -> Result<bool, AppError> {
        let deleted = self.store.delete_agency(id).await?;
        if deleted {
            info!(agency_id = %id, "Agency deleted");
        }
        Ok(deleted)
    }

    // --- Sub-accounts ---

    /// Validate, then update the sub-account or create it with its seed
    /// rows.
    ///
    /// Requires an agency owner for the parent agency. Without one the
    /// refusal is logged and `None` returned, with nothing written.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` before any write if a field is
    /// invalid, or a database error.
    #[instrument(skip(self, input), fields(sub_account_id = %input.id, agency_id = %input.agency_id))]
    pub async fn upsert_sub_account(
        &self,
        input: &UpsertSubAccountInput,
    ) -> Result<Option<SubAccount>, AppError> {
        let record = input.validate()?;

        let Some(owner) = self.store.agency_owner(&record.agency_id).await? else {
            error!("Could not create sub-account: agency has no owner");
            return Ok(None);
        };

        let seed = SubAccountSeed {
            owner_email: owner.email,
            permission_id: PermissionId::generate(),
            pipeline_name: DEFAULT_PIPELINE_NAME.to_string(),
            sidebar: sub_account_sidebar(&record.id),
        };
        let sub_account = self
            .store
            .upsert_sub_account(&record, &seed)
            .await
            .map_err(AppError::from_write)?;

        info!("Sub-account saved");
        Ok(Some(sub_account))
    }

    /// # Errors
    ///
    /// Returns a database error if the lookup fails.
    pub async fn sub_account_details(
        &self,
        id: &SubAccountId,
    ) -> Result<Option<SubAccount>, AppError> {
        Ok(self.store.sub_account(id).await?)
    }

    /// Delete a sub-account and everything scoped to it.
    ///
    /// # Errors
    ///
    /// Returns a database error if the delete fails.
    #[instrument(skip(self))]
    pub async fn delete_sub_account(
        &self,
        id: &SubAccountId,
    ) -> Result<Option<SubAccount>, AppError> {
        let deleted = self.store.delete_sub_account(id).await?;
        if deleted.is_some() {
            info!(sub_account_id = %id, "Sub-account deleted");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::fixtures::{self, AGENCY, SUB_ACCOUNT};

    #[test]
    fn test_agency_sidebar_links() {
        let links: Vec<String> = agency_sidebar(&AgencyId::new("ag1"))
            .into_iter()
            .map(|s| s.link)
            .collect();
        assert_eq!(
            links,
            vec![
                "/agency/ag1",
                "/agency/ag1/launchpad",
                "/agency/ag1/billing",
                "/agency/ag1/settings",
                "/agency/ag1/all-subaccounts",
                "/agency/ag1/team",
            ]
        );
    }

    #[test]
    fn test_sub_account_sidebar_names() {
        let seeds = sub_account_sidebar(&SubAccountId::new("sa1"));
        let names: Vec<&str> = seeds.iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec![
                "Launchpad",
                "Settings",
                "Funnels",
                "Media",
                "Automations",
                "Pipelines",
                "Contacts",
                "Dashboard",
            ]
        );
        assert_eq!(seeds[7].link, "/subaccount/sa1");
    }

    #[test]
    fn test_validate_applies_defaults_and_trims() {
        let mut input = fixtures::agency_input(AGENCY, "owner@x.com");
        input.name = "  Acme  ".to_string();
        input.goal = None;
        input.connect_account_id = None;

        let record = input.validate().unwrap();
        assert_eq!(record.name, "Acme");
        assert_eq!(record.goal, DEFAULT_GOAL);
        assert_eq!(record.connect_account_id, "");
    }

    #[test]
    fn test_validate_reports_every_field() {
        let mut input = fixtures::agency_input(AGENCY, "owner@x.com");
        input.name = "   ".to_string();
        input.city = String::new();

        let err = input.validate().unwrap_err();
        assert!(err.has_field("name"));
        assert!(err.has_field("city"));
        assert_eq!(err.fields.len(), 2);
    }

    #[tokio::test]
    async fn test_create_agency_attaches_company_email_user() {
        let f = fixtures::agency_with_sub_account().await;

        let details = f
            .store
            .user_details(&f.owner_principal.email)
            .await
            .unwrap()
            .unwrap();
        let agency = details.agency.unwrap();
        assert_eq!(agency.agency.id.as_str(), AGENCY);
        assert_eq!(agency.sidebar_options.len(), 6);
        assert_eq!(agency.sub_accounts.len(), 1);
        assert_eq!(agency.sub_accounts[0].sidebar_options.len(), 8);
    }

    #[tokio::test]
    async fn test_invalid_agency_update_leaves_record() {
        let f = fixtures::agency_with_sub_account().await;
        let service = TenancyService::new(&f.store, &f.identity);

        let mut input = fixtures::agency_input(AGENCY, "owner@x.com");
        input.name = String::new();
        input.city = "Elsewhere".to_string();
        let result = service.upsert_agency(&input).await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        let agency = f.store.agency(&AgencyId::new(AGENCY)).await.unwrap().unwrap();
        assert_eq!(agency.name, "Acme");
        assert_eq!(agency.city, "Springfield");
    }

    #[tokio::test]
    async fn test_sub_account_creation_seeds_rows() {
        let f = fixtures::agency_with_sub_account().await;
        let sub_account_id = SubAccountId::new(SUB_ACCOUNT);

        let pipelines = f.store.pipelines_for_sub_account(&sub_account_id).await.unwrap();
        assert_eq!(pipelines.len(), 1);
        assert_eq!(pipelines[0].name, DEFAULT_PIPELINE_NAME);

        let permissions = f.store.permissions_for_user(&f.owner_principal.id).await.unwrap();
        assert_eq!(permissions.len(), 1);
        assert!(permissions[0].permission.access);
        assert_eq!(permissions[0].sub_account.id, sub_account_id);
    }

    #[tokio::test]
    async fn test_sub_account_update_does_not_reseed() {
        let f = fixtures::agency_with_sub_account().await;
        let service = TenancyService::new(&f.store, &f.identity);

        let mut input = fixtures::sub_account_input(SUB_ACCOUNT, AGENCY);
        input.name = "Renamed".to_string();
        let updated = service.upsert_sub_account(&input).await.unwrap().unwrap();
        assert_eq!(updated.name, "Renamed");

        let sub_account_id = SubAccountId::new(SUB_ACCOUNT);
        let pipelines = f.store.pipelines_for_sub_account(&sub_account_id).await.unwrap();
        assert_eq!(pipelines.len(), 1);
        let details = f.store.user_details(&f.owner_principal.email).await.unwrap().unwrap();
        assert_eq!(details.agency.unwrap().sub_accounts[0].sidebar_options.len(), 8);
    }

    #[tokio::test]
    async fn test_sub_account_without_owner_writes_nothing() {
        let f = fixtures::Fixture::empty();
        let service = TenancyService::new(&f.store, &f.identity);
        service
            .upsert_agency(&fixtures::agency_input("ag2", "nobody@x.com"))
            .await
            .unwrap();

        let result = service
            .upsert_sub_account(&fixtures::sub_account_input("sa2", "ag2"))
            .await
            .unwrap();
        assert!(result.is_none());
        assert!(f.store.sub_account(&SubAccountId::new("sa2")).await.unwrap().is_none());
        assert!(
            f.store
                .pipelines_for_sub_account(&SubAccountId::new("sa2"))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_init_user_defaults_role_and_syncs_metadata() {
        let f = fixtures::Fixture::empty();
        let service = TenancyService::new(&f.store, &f.identity);
        let principal = fixtures::principal("user_9", "Sam Sub", "sam@x.com");

        let user = service.init_user(&principal, None).await.unwrap();
        assert_eq!(user.role, Role::SubaccountUser);
        assert_eq!(
            f.identity.metadata_writes().await,
            vec![(UserId::new("user_9"), Some(Role::SubaccountUser))]
        );

        // A second sign-in without a role keeps the stored one.
        let again = service.init_user(&principal, None).await.unwrap();
        assert_eq!(again.id, user.id);
        assert_eq!(again.role, Role::SubaccountUser);
    }

    #[tokio::test]
    async fn test_metadata_failure_does_not_fail_update() {
        let f = fixtures::agency_with_sub_account().await;
        f.identity.fail_metadata_writes(true);
        let service = TenancyService::new(&f.store, &f.identity);

        let patch = UserPatch {
            name: Some("Olive O.".to_string()),
            ..UserPatch::default()
        };
        let user = service
            .update_user(&f.owner_principal.email, &patch)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.name, "Olive O.");
    }

    #[tokio::test]
    async fn test_change_permission_failure_is_none() {
        let f = fixtures::agency_with_sub_account().await;
        let service = TenancyService::new(&f.store, &f.identity);

        let result = service
            .change_user_permission(
                None,
                &f.owner_principal.email,
                &SubAccountId::new("missing"),
                true,
            )
            .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_delete_user_clears_metadata() {
        let f = fixtures::agency_with_sub_account().await;
        let service = TenancyService::new(&f.store, &f.identity);

        let deleted = service.delete_user(&f.owner_principal.id).await.unwrap();
        assert!(deleted.is_some());
        let writes = f.identity.metadata_writes().await;
        assert_eq!(writes.last(), Some(&(f.owner_principal.id.clone(), None)));
    }
}
