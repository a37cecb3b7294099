//! Error types and Result alias.

use crate::card::KeyType;
use crate::transport::TransportError;
use thiserror::Error;

/// Result type alias for card access operations
pub type Result<T> = std::result::Result<T, AccessError>;

/// Errors that can occur when accessing a Mifare Classic card
#[derive(Debug, Error)]
pub enum AccessError {
    /// I/O error while reading a key list or invoking a tool
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Block address outside the 1K card's address space
    #[error("invalid block {block} (valid range 0-63)")]
    InvalidBlock {
        /// The offending block address
        block: u8,
    },

    /// Sector index outside the 1K card's sector range
    #[error("invalid sector {sector} (valid range 0-15)")]
    InvalidSector {
        /// The offending sector index
        sector: u8,
    },

    /// Key string did not decode to exactly 6 bytes
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Write payload was not exactly 32 hex characters
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Unrecognized data format or key type tag
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// Key load or authenticate command was rejected by the card
    #[error("authentication failed for block {block} with key type {key_type}")]
    AuthenticationFailed {
        /// Block the authentication targeted
        block: u8,
        /// Key type used for the attempt
        key_type: KeyType,
    },

    /// Underlying reader command failed
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    /// Post-write re-read did not match the intended payload
    #[error("write verification failed for block {block}: expected {expected}, received {received}")]
    VerificationMismatch {
        /// Block that was written
        block: u8,
        /// Hex rendering of the intended payload
        expected: String,
        /// Hex rendering of what the card returned
        received: String,
    },

    /// External recovery binary is not on PATH
    #[error("required tool not found on PATH: {0}")]
    ToolNotFound(String),

    /// External recovery binary ran but exited unsuccessfully
    #[error("{tool} exited with a failure status")]
    ToolFailed {
        /// Name of the tool that failed
        tool: String,
        /// Exit code, if the process terminated normally
        code: Option<i32>,
    },

    /// Operation is not available on this platform
    #[error("unsupported: {0}")]
    Unsupported(String),
}
