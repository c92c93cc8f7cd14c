//! Subprocess CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the Subprocess controller.

pub mod subprocess;

pub use subprocess::*;
