//! Passive OS fingerprint (p0f) signature source.
//!
//! - [`Signature`]: one fingerprinting rule with its field constraints
//! - [`SignatureSource`]: ordered signatures plus the label index
//! - [`SignatureDatabase`]: JSON-backed implementation
//!
//! Signature order is significant: it is the curator's precedence order and
//! becomes the installed match priority.

mod database;
mod error;
mod signature;

pub use database::{SignatureDatabase, SignatureSource, UNKNOWN_LABEL};
pub use error::{SigDbError, SigDbResult};
pub use signature::{FieldConstraint, Signature};
