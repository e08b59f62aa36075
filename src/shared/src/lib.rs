//! Shared types for the OmniFlow connector platform

pub mod types;

// Export all types from types module
pub use types::*;
