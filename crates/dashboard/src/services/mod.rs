//! Business logic layer.
//!
//! Each service borrows the [`Store`](crate::db::Store) (and the identity
//! provider where it needs one) for the duration of a request:
//!
//! - [`access`] - Authorization and the agency / sub-account entry flows
//! - [`invitations`] - Sending and accepting agency invitations
//! - [`tenancy`] - Agencies, sub-accounts, users and permissions
//! - [`notifications`] - Activity log
//! - [`pipelines`] - Pipelines, lanes, tickets and their ordering
//! - [`media`] - Sub-account media library
//! - [`funnels`] - Sub-account funnels
//! - [`sidebar`] - Navigation for the signed-in user

pub mod access;
pub mod funnels;
pub mod invitations;
pub mod media;
pub mod notifications;
pub mod pipelines;
pub mod sidebar;
pub mod tenancy;

pub use access::{Access, AccessDecision, AccessScope, AccessService, Entry, Landing};
pub use funnels::{FunnelService, UpsertFunnelInput};
pub use invitations::InvitationService;
pub use media::{CreateMediaInput, MediaService};
pub use notifications::{NotificationScope, NotificationService};
pub use pipelines::{
    PipelineService, UpsertContactInput, UpsertLaneInput, UpsertPipelineInput, UpsertTagInput,
    UpsertTicketInput,
};
pub use sidebar::{Sidebar, sidebar};
pub use tenancy::{TenancyService, UpsertAgencyInput, UpsertSubAccountInput};
