//! P4Runtime error types and status handling.
//!
//! Device RPCs fail with a canonical status code (the gRPC code set used by
//! P4Runtime). This module carries that code in [`P4rtError`] alongside the
//! schema-resolution failures raised before anything reaches a device.

use std::fmt;
use thiserror::Error;

/// Canonical status codes returned by a P4Runtime server.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Ok = 0,
    Cancelled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl StatusCode {
    /// Returns the canonical upper-case name (e.g. `ALREADY_EXISTS`).
    pub fn name(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::Cancelled => "CANCELLED",
            StatusCode::Unknown => "UNKNOWN",
            StatusCode::InvalidArgument => "INVALID_ARGUMENT",
            StatusCode::DeadlineExceeded => "DEADLINE_EXCEEDED",
            StatusCode::NotFound => "NOT_FOUND",
            StatusCode::AlreadyExists => "ALREADY_EXISTS",
            StatusCode::PermissionDenied => "PERMISSION_DENIED",
            StatusCode::ResourceExhausted => "RESOURCE_EXHAUSTED",
            StatusCode::FailedPrecondition => "FAILED_PRECONDITION",
            StatusCode::Aborted => "ABORTED",
            StatusCode::OutOfRange => "OUT_OF_RANGE",
            StatusCode::Unimplemented => "UNIMPLEMENTED",
            StatusCode::Internal => "INTERNAL",
            StatusCode::Unavailable => "UNAVAILABLE",
            StatusCode::DataLoss => "DATA_LOSS",
            StatusCode::Unauthenticated => "UNAUTHENTICATED",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error type for P4Runtime client operations.
#[derive(Debug, Clone, Error)]
pub enum P4rtError {
    /// The device answered an RPC with a non-OK status.
    #[error("P4Runtime RPC failed: {details} ({code})")]
    Rpc { code: StatusCode, details: String },

    /// The connection to the device could not be used.
    #[error("Transport failure towards {address}: {message}")]
    Transport { address: String, message: String },

    /// A name or id could not be resolved against the P4Info schema.
    #[error("Unknown {kind} '{name}'")]
    UnknownName { kind: &'static str, name: String },

    /// A value or match shape does not fit the schema.
    #[error("Invalid entry for {context}: {message}")]
    InvalidEntry { context: String, message: String },

    /// The P4Info document could not be loaded.
    #[error("Failed to load P4Info: {message}")]
    Schema { message: String },
}

impl P4rtError {
    /// Creates an RPC status error.
    pub fn rpc(code: StatusCode, details: impl Into<String>) -> Self {
        P4rtError::Rpc {
            code,
            details: details.into(),
        }
    }

    /// Creates a transport error.
    pub fn transport(address: impl Into<String>, message: impl Into<String>) -> Self {
        P4rtError::Transport {
            address: address.into(),
            message: message.into(),
        }
    }

    pub fn unknown_name(kind: &'static str, name: impl Into<String>) -> Self {
        P4rtError::UnknownName {
            kind,
            name: name.into(),
        }
    }

    pub fn invalid_entry(context: impl Into<String>, message: impl Into<String>) -> Self {
        P4rtError::InvalidEntry {
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn schema(message: impl Into<String>) -> Self {
        P4rtError::Schema {
            message: message.into(),
        }
    }

    /// Returns the RPC status code if this is an RPC error.
    pub fn code(&self) -> Option<StatusCode> {
        match self {
            P4rtError::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns true if the device refused the request because another
    /// controller holds mastership.
    pub fn is_permission_denied(&self) -> bool {
        self.code() == Some(StatusCode::PermissionDenied)
    }
}

/// Result type for P4Runtime client operations.
pub type P4rtResult<T> = Result<T, P4rtError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_error_display() {
        let err = P4rtError::rpc(StatusCode::PermissionDenied, "not master");
        assert!(err.is_permission_denied());
        assert_eq!(
            err.to_string(),
            "P4Runtime RPC failed: not master (PERMISSION_DENIED)"
        );
    }

    #[test]
    fn test_error_classification() {
        assert_eq!(
            P4rtError::rpc(StatusCode::AlreadyExists, "dup").code(),
            Some(StatusCode::AlreadyExists)
        );
        assert_eq!(P4rtError::unknown_name("table", "x").code(), None);
        assert!(!P4rtError::transport("127.0.0.1:50051", "refused").is_permission_denied());
    }
}
