//! Shared building blocks for slashbot: configuration loading, the error taxonomy,
//! and inbound request signature verification.

pub mod config;
pub mod errors;
pub mod signature;

pub use errors::{ApplicationError, InterfaceError, RequestError, GENERIC_ERROR_TEXT};
pub use signature::{
    Clock, FixedClock, SignatureVerifier, SystemClock, VerificationError, VerificationResult,
};
