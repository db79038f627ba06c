//! hacs-core: Core abstractions and configuration for the HACS device agent
//!
//! This crate provides shared types, the error taxonomy, the local engine
//! trait, and configuration structures used by the agent.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use traits::IntentEngine;
pub use types::{ConnectionState, DeviceId, Generation, SessionStatus};
