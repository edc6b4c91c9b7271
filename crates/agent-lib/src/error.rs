//! Error types for the sampling and delivery pipeline
//!
//! None of these errors ever leave the poll loop: the scheduler logs them and
//! drops the affected metric group or payload for the current cycle.

use std::path::PathBuf;
use thiserror::Error;

/// Failure reading or parsing a meminfo-style statistics source
#[derive(Debug, Error)]
pub enum MemInfoError {
    /// The source could not be opened or read
    #[error("memory statistics source {} unavailable: {source}", path.display())]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A value could not be turned into a byte count
    #[error("invalid value {value:?} for {key}: {reason}")]
    Parse {
        key: String,
        value: String,
        reason: String,
    },
}

/// Failure of a single sampler during a poll cycle
#[derive(Debug, Error)]
pub enum SamplerError {
    #[error(transparent)]
    Memory(#[from] MemInfoError),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Counter source present but not in the expected shape
    #[error("malformed counters in {source_name}: {detail}")]
    Malformed { source_name: String, detail: String },

    /// Delta sampler called before it has a previous snapshot
    #[error("no baseline snapshot yet, sample discarded")]
    NoBaseline,
}

/// Failure turning a batch into a compressed payload
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("metric {name} has non-finite value {value}")]
    NonFiniteValue { name: String, value: f64 },

    #[error("failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to compress payload: {0}")]
    Compress(#[from] std::io::Error),
}

/// Delivery gave up after exhausting the retry policy
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The last attempt reached the endpoint but got a non-success status
    #[error("endpoint rejected payload with status {status} after {attempts} attempts")]
    Rejected {
        status: u16,
        body: Vec<u8>,
        attempts: u32,
    },

    /// The last attempt failed before a response arrived
    #[error("transport failure after {attempts} attempts: {message}")]
    Transport { message: String, attempts: u32 },
}

impl DeliveryError {
    /// Number of attempts made before giving up
    pub fn attempts(&self) -> u32 {
        match self {
            DeliveryError::Rejected { attempts, .. }
            | DeliveryError::Transport { attempts, .. } => *attempts,
        }
    }

    /// Response body of the final attempt (empty for transport failures)
    pub fn body(&self) -> &[u8] {
        match self {
            DeliveryError::Rejected { body, .. } => body,
            DeliveryError::Transport { .. } => &[],
        }
    }

    /// Status code of the final attempt, if one was received
    pub fn status(&self) -> Option<u16> {
        match self {
            DeliveryError::Rejected { status, .. } => Some(*status),
            DeliveryError::Transport { .. } => None,
        }
    }
}
