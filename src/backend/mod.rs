//! Hosted backend access: REST tables, password auth and the workshop
//! operations built on them.

pub mod api_types;
pub mod auth;
pub mod client;
#[cfg(test)]
pub(crate) mod fake;
pub mod types;
pub mod workshop;

pub use auth::Session;
pub use client::BackendClient;
pub use workshop::WorkshopClient;
