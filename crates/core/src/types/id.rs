//! Newtype IDs for tenant-scoped entities.
//!
//! Every entity is keyed by an opaque string. Agencies and sub-accounts get
//! their id from the client that creates them, users get theirs from the
//! identity provider, everything else is a generated UUID. Wrapping each in
//! its own type keeps a `LaneId` from ever being passed where a
//! `PipelineId` is expected.

/// Define a string-backed ID wrapper.
///
/// The generated type is `#[serde(transparent)]`, hashable and orderable,
/// and (with the `postgres` feature) encodes as `TEXT`.
///
/// # Example
///
/// ```rust
/// # use plura_core::define_id;
/// define_id!(WidgetId);
///
/// let id = WidgetId::new("w-1");
/// assert_eq!(id.as_str(), "w-1");
/// assert_ne!(WidgetId::generate(), WidgetId::generate());
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing id.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Generate a fresh random (UUID v4) id.
            #[must_use]
            pub fn generate() -> Self {
                Self(::uuid::Uuid::new_v4().to_string())
            }

            /// Borrow the id as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns true if the id is empty or whitespace.
            #[must_use]
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }

            /// Consume the wrapper and return the inner string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        #[cfg(feature = "postgres")]
        impl ::sqlx::Type<::sqlx::Postgres> for $name {
            fn type_info() -> ::sqlx::postgres::PgTypeInfo {
                <String as ::sqlx::Type<::sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &::sqlx::postgres::PgTypeInfo) -> bool {
                <String as ::sqlx::Type<::sqlx::Postgres>>::compatible(ty)
            }
        }

        #[cfg(feature = "postgres")]
        impl<'r> ::sqlx::Decode<'r, ::sqlx::Postgres> for $name {
            fn decode(
                value: ::sqlx::postgres::PgValueRef<'r>,
            ) -> ::core::result::Result<Self, ::sqlx::error::BoxDynError> {
                let id = <String as ::sqlx::Decode<::sqlx::Postgres>>::decode(value)?;
                Ok(Self(id))
            }
        }

        #[cfg(feature = "postgres")]
        impl ::sqlx::Encode<'_, ::sqlx::Postgres> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut ::sqlx::postgres::PgArgumentBuffer,
            ) -> ::std::result::Result<::sqlx::encode::IsNull, ::sqlx::error::BoxDynError> {
                <String as ::sqlx::Encode<::sqlx::Postgres>>::encode_by_ref(&self.0, buf)
            }
        }
    };
}

// Tenants
define_id!(AgencyId);
define_id!(SubAccountId);

// People and access
define_id!(UserId);
define_id!(PermissionId);
define_id!(InvitationId);
define_id!(NotificationId);

// Sales pipeline
define_id!(PipelineId);
define_id!(LaneId);
define_id!(TicketId);
define_id!(TagId);
define_id!(ContactId);

// Assets and navigation
define_id!(MediaId);
define_id!(FunnelId);
define_id!(SidebarOptionId);

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_uuids() {
        let id = PipelineId::generate();
        assert!(uuid::Uuid::parse_str(id.as_str()).is_ok());
    }

    #[test]
    fn test_blank_detection() {
        assert!(AgencyId::new("").is_blank());
        assert!(AgencyId::new("   ").is_blank());
        assert!(!AgencyId::new("ag1").is_blank());
    }

    #[test]
    fn test_serde_is_transparent() {
        let id = SubAccountId::new("sa1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"sa1\"");
        let back: SubAccountId = serde_json::from_str("\"sa1\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_display_matches_inner() {
        assert_eq!(LaneId::new("lane-7").to_string(), "lane-7");
    }
}
