//! Request extractors shared by the route handlers.
//!
//! - [`auth`] - Session token lookup and the current principal

pub mod auth;
