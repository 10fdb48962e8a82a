//! Custom/self-hosted server pseudo-provider
//!
//! Normalizes a server the operator already owns (a bare-metal box, a VM on
//! an unsupported cloud) into the same contract as a real provider. There
//! is no backend to call: provisioning hands back the configured static IP
//! with a fresh instance id, and details always report the instance as
//! active.
//!
//! One concrete type parameterized by [`CustomServerConfig`] covers every
//! custom provider variant; region, size, and SSH key labels are purely
//! cosmetic.

pub mod provider;

pub use provider::{CustomServerConfig, CustomServerProvider};
