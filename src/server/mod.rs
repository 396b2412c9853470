pub mod access;
pub mod api_keys;
pub mod auth;
pub mod dashboard;
pub mod dto;
pub mod invites;
pub mod response;
pub mod router;
pub mod runs;
pub mod sites;
pub mod tenants;
pub mod validation;
pub mod webhooks;

pub use router::{AppState, create_router};
