//! Controller error taxonomy.
//!
//! Every variant maps to the [`Stage`] it aborts, which the binary prints in
//! its final diagnostic line.

use crate::events::Stage;
use p0f_sigdb::SigDbError;
use p4_runtime::P4rtError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for controller operations.
pub type Result<T> = std::result::Result<T, ControllerError>;

#[derive(Debug, Error)]
pub enum ControllerError {
    /// Malformed route or signature data.
    #[error("Invalid {context}: {message}")]
    Validation { context: String, message: String },

    /// A compiled rule does not resolve against the pipeline schema.
    #[error("Rule '{rule}' rejected by schema: {source}")]
    Schema {
        rule: String,
        #[source]
        source: P4rtError,
    },

    /// Another controller holds mastership of the device.
    #[error("Mastership arbitration failed on {device}: {source}")]
    ArbitrationConflict {
        device: String,
        #[source]
        source: P4rtError,
    },

    /// The device rejected the forwarding pipeline.
    #[error("Pipeline configuration failed on {device}: {source}")]
    PipelineConfig {
        device: String,
        #[source]
        source: P4rtError,
    },

    /// An entry failed to install.
    #[error("Failed to write {entry} to {device}: {source}")]
    Write {
        device: String,
        stage: Stage,
        entry: String,
        #[source]
        source: P4rtError,
    },

    /// The session with a device could not be used.
    #[error("Transport failure on {device} during {stage}: {source}")]
    Transport {
        device: String,
        stage: Stage,
        #[source]
        source: P4rtError,
    },

    #[error(transparent)]
    SignatureDb(#[from] SigDbError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An unparseable result line.
    #[error("Line {line}: {message}")]
    Decode { line: usize, message: String },

    #[error("Interrupted")]
    Interrupted,
}

impl ControllerError {
    pub fn validation(context: impl Into<String>, message: impl Into<String>) -> Self {
        ControllerError::Validation {
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        ControllerError::Config(message.into())
    }

    /// Classifies a session failure. Mastership refusals become
    /// `ArbitrationConflict` regardless of the stage they surface in.
    pub fn from_session(device: &str, stage: Stage, source: P4rtError) -> Self {
        let device = device.to_string();
        if source.is_permission_denied() {
            return ControllerError::ArbitrationConflict { device, source };
        }
        match (stage, &source) {
            (_, P4rtError::Transport { .. }) => ControllerError::Transport {
                device,
                stage,
                source,
            },
            (Stage::Arbitration, _) => ControllerError::ArbitrationConflict { device, source },
            (Stage::PipelineConfig, _) => ControllerError::PipelineConfig { device, source },
            _ => ControllerError::Transport {
                device,
                stage,
                source,
            },
        }
    }

    /// The stage this error terminates.
    pub fn stage(&self) -> Stage {
        match self {
            ControllerError::Validation { .. } | ControllerError::Schema { .. } => Stage::Compile,
            ControllerError::ArbitrationConflict { .. } => Stage::Arbitration,
            ControllerError::PipelineConfig { .. } => Stage::PipelineConfig,
            ControllerError::Write { stage, .. } | ControllerError::Transport { stage, .. } => {
                *stage
            }
            ControllerError::SignatureDb(_) | ControllerError::Config(_) => Stage::Config,
            ControllerError::Io { .. } | ControllerError::Decode { .. } => Stage::Decode,
            ControllerError::Interrupted => Stage::Shutdown,
        }
    }

    /// Returns true for failures confined to one device, after which the
    /// run continues with its siblings.
    pub fn is_device_local(&self) -> bool {
        matches!(
            self,
            ControllerError::ArbitrationConflict { .. }
                | ControllerError::PipelineConfig { .. }
                | ControllerError::Transport {
                    stage: Stage::Connect | Stage::Arbitration | Stage::PipelineConfig,
                    ..
                }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p4_runtime::StatusCode;

    #[test]
    fn test_session_error_classification() {
        let denied = P4rtError::rpc(StatusCode::PermissionDenied, "election_id 5 is master");
        let err = ControllerError::from_session("s1", Stage::PipelineConfig, denied);
        assert!(matches!(err, ControllerError::ArbitrationConflict { .. }));
        assert_eq!(err.stage(), Stage::Arbitration);
        assert!(err.is_device_local());

        let rejected = P4rtError::rpc(StatusCode::InvalidArgument, "bad config");
        let err = ControllerError::from_session("s3", Stage::PipelineConfig, rejected);
        assert_eq!(err.stage(), Stage::PipelineConfig);

        let refused = P4rtError::transport("127.0.0.1:50051", "connection refused");
        let err = ControllerError::from_session("s1", Stage::Connect, refused);
        assert_eq!(err.stage(), Stage::Connect);
        assert!(err.is_device_local());
    }

    #[test]
    fn test_write_error_stage() {
        let err = ControllerError::Write {
            device: "s1".into(),
            stage: Stage::SignatureInstall,
            entry: "p0f rule #2".into(),
            source: P4rtError::rpc(StatusCode::Internal, "boom"),
        };
        assert_eq!(err.stage(), Stage::SignatureInstall);
        assert!(!err.is_device_local());
        assert_eq!(
            err.to_string(),
            "Failed to write p0f rule #2 to s1: P4Runtime RPC failed: boom (INTERNAL)"
        );
    }
}
