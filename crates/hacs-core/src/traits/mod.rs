//! Core trait definitions

mod engine;

pub use engine::IntentEngine;
