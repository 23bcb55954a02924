//! Session credential storage and inspection.
//!
//! This module provides:
//! - `CredentialStore`: session-scoped owner of the access/refresh pair
//! - `claims`: non-verifying payload decoding and expiry checks
//!
//! The pair lives in memory for the lifetime of the session and is never
//! written to disk.

pub mod claims;
pub mod store;

pub use claims::{Claims, CredentialKind, DEFAULT_EXPIRY_SKEW_SECS};
pub use store::{CredentialPair, CredentialStore, MemoryStorage, SessionStorage, StorageError};
