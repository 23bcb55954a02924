//! REST API client module for the worktrack backend.
//!
//! This module provides the `ApiClient`, which attaches the session's access
//! credential to every request and transparently renews it on a 401. The
//! renewal itself is single-flight: see `RefreshCoordinator`.

pub mod client;
pub mod coordinator;
pub mod error;
pub mod transport;

pub use client::ApiClient;
pub use coordinator::{RefreshCoordinator, RenewalOutcome};
pub use error::{ApiError, RenewalError, TransportError};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport};
