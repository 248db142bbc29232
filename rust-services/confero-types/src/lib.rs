//! Confero Types
//!
//! Shared type definitions for bus messages, client frames, session
//! identity, and the client-facing error catalogue used across all
//! Confero services.

pub mod error;
pub mod frames;
pub mod messages;
pub mod session;

pub use error::*;
pub use frames::*;
pub use messages::*;
pub use session::*;
