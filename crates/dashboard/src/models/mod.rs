//! Domain models for the dashboard.
//!
//! These are the validated shapes the [`Store`](crate::db::Store) reads and
//! writes and the HTTP layer serializes (camelCase JSON). `*Record` types
//! are write inputs that have already passed validation.

pub mod agency;
pub mod funnel;
pub mod invitation;
pub mod media;
pub mod notification;
pub mod permission;
pub mod pipeline;
pub mod sidebar;
pub mod sub_account;
pub mod user;

pub use agency::{Agency, AgencyDetails, AgencyPatch, AgencyRecord};
pub use funnel::{Funnel, FunnelRecord};
pub use invitation::{Invitation, NewInvitation};
pub use media::{Media, NewMedia, SubAccountMedia};
pub use notification::{NewNotification, Notification, NotificationWithUser};
pub use permission::{Permission, PermissionWithSubAccount};
pub use pipeline::{
    Contact, ContactRecord, Lane, LaneDetail, LaneOrder, LaneRecord, Pipeline, PipelineRecord,
    Tag, TagRecord, Ticket, TicketDetail, TicketOrder, TicketRecord,
};
pub use sidebar::{SidebarOption, SidebarSeed};
pub use sub_account::{SubAccount, SubAccountDetails, SubAccountRecord, SubAccountSeed};
pub use user::{NewUser, User, UserDetails, UserPatch};
