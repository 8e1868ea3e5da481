//! Sub-account media library.

use serde::Deserialize;
use tracing::{info, instrument};

use plura_core::{MediaId, SubAccountId};

use crate::db::Store;
use crate::error::AppError;
use crate::models::{Media, NewMedia, SubAccountMedia};
use crate::validation::{ValidationError, Validator};

/// An uploaded file to register. The link must not already be in the
/// library.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMediaInput {
    #[serde(rename = "type", default)]
    pub media_type: Option<String>,
    pub name: String,
    pub link: String,
}

impl CreateMediaInput {
    /// # Errors
    ///
    /// Returns every offending field.
    pub fn validate(&self) -> Result<NewMedia, ValidationError> {
        let mut v = Validator::new();
        let name = v.required("name", &self.name);
        let link = v.required("link", &self.link);
        v.finish(NewMedia {
            id: MediaId::generate(),
            media_type: self.media_type.clone(),
            name,
            link,
        })
    }
}

/// Media service.
pub struct MediaService<'a> {
    store: &'a dyn Store,
}

impl<'a> MediaService<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// The sub-account with its media, newest first.
    ///
    /// # Errors
    ///
    /// Returns a database error if the lookup fails.
    pub async fn sub_account_media(
        &self,
        sub_account_id: &SubAccountId,
    ) -> Result<Option<SubAccountMedia>, AppError> {
        Ok(self.store.sub_account_media(sub_account_id).await?)
    }

    /// # Errors
    ///
    /// Returns `AppError::Validation` for a blank name or link,
    /// `AppError::BadRequest` for a duplicate link or unknown sub-account,
    /// or a database error.
    #[instrument(skip(self, input), fields(sub_account_id = %sub_account_id))]
    pub async fn create_media(
        &self,
        sub_account_id: &SubAccountId,
        input: &CreateMediaInput,
    ) -> Result<Media, AppError> {
        let media = input.validate()?;
        let created = self
            .store
            .create_media(sub_account_id, &media)
            .await
            .map_err(AppError::from_write)?;
        info!(media_id = %created.id, "Media uploaded");
        Ok(created)
    }

    /// # Errors
    ///
    /// Returns a database error if the delete fails.
    #[instrument(skip(self))]
    pub async fn delete_media(
        &self,
        sub_account_id: &SubAccountId,
        id: &MediaId,
    ) -> Result<Option<Media>, AppError> {
        Ok(self.store.delete_media(sub_account_id, id).await?)
    }
}
