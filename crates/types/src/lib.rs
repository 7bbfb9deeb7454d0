/// Shared types for the Ambient record sync engine
///
/// This crate provides the keys, indexer record shapes, session update types
/// and price math that are used by the sync engine and its tests.

pub mod constants;
pub mod errors;
pub mod keys;
pub mod math;
pub mod records;
pub mod session;

// Re-export all public types
pub use constants::*;
pub use errors::*;
pub use keys::*;
pub use math::*;
pub use records::*;
pub use session::*;

/// Result type alias using the shared error type
pub type RecordResult<T> = std::result::Result<T, RecordError>;
