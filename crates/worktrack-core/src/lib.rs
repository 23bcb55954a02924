//! Session credential lifecycle for the worktrack client.
//!
//! - [`auth`]: session-scoped credential storage and non-verifying claim
//!   inspection
//! - [`api`]: the authenticated request pipeline with single-flight renewal
//! - [`config`]: connection settings

pub mod api;
pub mod auth;
pub mod config;

pub use api::{ApiClient, ApiError, HttpResponse, Method};
pub use auth::{Claims, CredentialPair, CredentialStore};
pub use config::Config;
