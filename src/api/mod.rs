//! Remote resource client: typed request functions per resource.

pub mod client;
pub mod types;
pub mod wire;

pub use client::{ApiClient, SessionGuard};
