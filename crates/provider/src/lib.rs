//! # Fleet Provider
//!
//! Capabilities the host supplies to the NeuroFleetX client: outbound HTTP,
//! session-scoped storage, and wall-clock time.

mod provider;

pub use crate::provider::*;
