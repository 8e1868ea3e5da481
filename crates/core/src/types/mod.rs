//! Core types for Plura.

pub mod email;
pub mod id;
pub mod role;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use role::{Privilege, Role, RoleParseError};
pub use status::InvitationStatus;
