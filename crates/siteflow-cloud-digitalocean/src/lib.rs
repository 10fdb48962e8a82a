//! DigitalOcean provider for SiteFlow
//!
//! Implements the `ServerProvider` contract against the DigitalOcean v2
//! REST API. Droplet statuses are normalized into the canonical
//! `ServerState`, list endpoints go through the shared response cache, and
//! resize is handled as an asynchronous action polled by the orchestrator.

pub mod api;
pub mod error;
pub mod images;
pub mod provider;

pub use error::{DigitalOceanError, Result};
pub use provider::DigitalOceanProvider;
