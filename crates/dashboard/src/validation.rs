//! Input validation for write operations.
//!
//! Validators collect every failing field before returning, so a client
//! sees the full list of problems in one response. Nothing is written to
//! the datastore until validation has passed.

use std::fmt;

use serde::Serialize;

use plura_core::Email;

/// One rejected input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Input failed validation. Lists every offending field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
pub struct ValidationError {
    pub fields: Vec<FieldError>,
}

impl ValidationError {
    /// A validation error for a single field.
    #[must_use]
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        Self {
            fields: vec![FieldError {
                field: field.to_string(),
                message: message.into(),
            }],
        }
    }

    /// Returns true if `field` is among the offending fields.
    #[must_use]
    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f.field == field)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid input: ")?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} ({})", field.field, field.message)?;
        }
        Ok(())
    }
}

/// Accumulates field errors while an input is being checked.
///
/// ```
/// use plura_dashboard::validation::Validator;
///
/// let mut v = Validator::new();
/// let name = v.required("name", "  Acme  ");
/// let city = v.required("city", "");
/// let err = v.finish((name, city)).unwrap_err();
/// assert!(err.has_field("city"));
/// assert!(!err.has_field("name"));
/// ```
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.to_string(),
            message: message.into(),
        });
    }

    /// Trim a required string; records an error if nothing is left.
    pub fn required(&mut self, field: &str, value: &str) -> String {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            self.push(field, "must not be empty");
        }
        trimmed.to_string()
    }

    /// Require a non-empty identifier. Identifiers are not trimmed.
    pub fn required_id<T: AsRef<str>>(&mut self, field: &str, value: &T) {
        if value.as_ref().is_empty() {
            self.push(field, "must not be empty");
        }
    }

    /// Parse an email address; records the parse error on failure.
    pub fn email(&mut self, field: &str, value: &str) -> Option<Email> {
        match Email::parse(value) {
            Ok(email) => Some(email),
            Err(e) => {
                self.push(field, e.to_string());
                None
            }
        }
    }

    /// Record `message` against `field` unless `ok` holds.
    pub fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.push(field, message);
        }
    }

    /// Returns `value` if no errors were recorded.
    ///
    /// # Errors
    ///
    /// Returns every recorded field error.
    pub fn finish<T>(self, value: T) -> Result<T, ValidationError> {
        if self.errors.is_empty() {
            Ok(value)
        } else {
            Err(ValidationError {
                fields: self.errors,
            })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_collects_all_fields() {
        let mut v = Validator::new();
        v.required("name", " ");
        v.required("city", "");
        v.required("state", "ok");
        let err = v.finish(()).unwrap_err();
        assert_eq!(err.fields.len(), 2);
        assert!(err.has_field("name"));
        assert!(err.has_field("city"));
    }

    #[test]
    fn test_ids_are_not_trimmed() {
        let mut v = Validator::new();
        v.required_id("id", &" ");
        assert!(v.finish(()).is_ok());
    }

    #[test]
    fn test_email_field() {
        let mut v = Validator::new();
        assert!(v.email("email", "bad").is_none());
        let err = v.finish(()).unwrap_err();
        assert_eq!(err.fields[0].field, "email");
    }

    #[test]
    fn test_display_lists_fields() {
        let err = ValidationError::single("name", "must not be empty");
        assert_eq!(err.to_string(), "invalid input: name (must not be empty)");
    }
}
