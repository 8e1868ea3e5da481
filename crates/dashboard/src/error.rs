//! Unified error handling for the dashboard.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::identity::IdentityError;
use crate::validation::ValidationError;

/// Application-level error type for the dashboard.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Identity provider call failed.
    #[error("Identity provider error: {0}")]
    Identity(#[from] IdentityError),

    /// Input failed validation; nothing was written.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The principal may not access the requested scope.
    #[error("Unauthorized")]
    Unauthorized,

    /// User lacks permission for this action.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A notification could not be tied to an agency.
    #[error("Missing scope: neither an agency nor a sub-account could be resolved")]
    MissingScope,

    /// A reorder batch was rolled back.
    #[error("could not save order")]
    OrderNotSaved,

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Map a failed client-driven write. Constraint violations (a taken
    /// email, subdomain or link) are the client's to fix.
    #[must_use]
    pub fn from_write(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict(message) => Self::BadRequest(message),
            other => Self::Database(other),
        }
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Identity(_) => StatusCode::BAD_GATEWAY,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) | Self::MissingScope => StatusCode::BAD_REQUEST,
            Self::OrderNotSaved => StatusCode::CONFLICT,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log server errors with Sentry
        if matches!(
            self,
            Self::Database(_) | Self::Internal(_) | Self::Identity(_)
        ) {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Dashboard request error"
            );
        }

        let status = self.status();

        // Don't expose internal error details to clients
        let body = match &self {
            Self::Database(_) | Self::Internal(_) => json!({ "error": "Internal server error" }),
            Self::Identity(_) => json!({ "error": "External service error" }),
            Self::Validation(err) => json!({ "error": "Invalid input", "fields": err.fields }),
            _ => json!({ "error": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

/// Set the Sentry user context for the signed-in principal.
pub fn set_sentry_user(user_id: &str, email: &str) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: Some(email.to_string()),
            ..Default::default()
        }));
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("pipeline p1".to_string());
        assert_eq!(err.to_string(), "Not found: pipeline p1");
        assert_eq!(AppError::OrderNotSaved.to_string(), "could not save order");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            AppError::NotFound("x".to_string()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(AppError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::Forbidden("x".to_string()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(AppError::MissingScope.status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::OrderNotSaved.status(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::Database(RepositoryError::NotFound).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_from_write_maps_conflict() {
        let err = AppError::from_write(RepositoryError::Conflict("email taken".to_string()));
        assert!(matches!(err, AppError::BadRequest(ref m) if m == "email taken"));
        let err = AppError::from_write(RepositoryError::NotFound);
        assert!(matches!(err, AppError::Database(RepositoryError::NotFound)));
    }

    #[tokio::test]
    async fn test_unauthorized_body() {
        let (status, body) = body_json(AppError::Unauthorized).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({ "error": "Unauthorized" }));
    }

    #[tokio::test]
    async fn test_validation_lists_fields() {
        let err = ValidationError::single("name", "must not be empty");
        let (status, body) = body_json(AppError::Validation(err)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["fields"][0]["field"], "name");
    }

    #[tokio::test]
    async fn test_database_details_hidden() {
        let err = AppError::Database(RepositoryError::DataCorruption("bad row".to_string()));
        let (_, body) = body_json(err).await;
        assert_eq!(body, json!({ "error": "Internal server error" }));
    }
}
