// Copyright 2025 Stoolap Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error types for autoindex
//!
//! Advisory failures are recovered inside the advisor. Nothing in this enum
//! is ever allowed to fail the query that triggered an observation.

use thiserror::Error;

use super::types::{AttributeId, RelationId};

/// Result type alias for autoindex operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the advisor and its collaborators
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // =========================================================================
    // Frequency store errors
    // =========================================================================
    /// The durable counter backing cannot be read or written
    #[error("frequency store unavailable: {0}")]
    StoreUnavailable(String),

    /// The frequency store has been closed
    #[error("frequency store is closed")]
    StoreClosed,

    /// Another process holds the store directory
    #[error("frequency store is locked by another process")]
    DatabaseLocked,

    /// On-disk data failed validation
    #[error("corrupted store data: {0}")]
    Corrupted(String),

    // =========================================================================
    // Catalog errors
    // =========================================================================
    /// Relation not found in the catalog
    #[error("relation {0} not found")]
    RelationNotFound(RelationId),

    /// Attribute not found on the relation
    #[error("attribute {attribute_id} not found on relation {relation_id}")]
    AttributeNotFound {
        relation_id: RelationId,
        attribute_id: AttributeId,
    },

    /// Index already exists
    #[error("index '{0}' already exists")]
    IndexAlreadyExists(String),

    /// Failed to acquire a relation lock
    #[error("failed to acquire lock: {0}")]
    LockAcquisitionFailed(String),

    // =========================================================================
    // Build errors
    // =========================================================================
    /// Catalog index creation failed inside a build worker
    #[error("index build failed on relation {relation_id} attribute {attribute_id}: {message}")]
    BuildFailed {
        relation_id: RelationId,
        attribute_id: AttributeId,
        message: String,
    },

    /// The process-management facility could not start a worker
    #[error("could not register background worker: {0}")]
    SpawnFailed(String),

    // =========================================================================
    // Other errors
    // =========================================================================
    /// Parse error (DSN, legacy files)
    #[error("parse error: {0}")]
    Parse(String),

    /// IO error (wrapped)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Internal error for unexpected conditions
    #[error("{message}")]
    Internal { message: String },
}

impl Error {
    /// Create a new StoreUnavailable error
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Error::StoreUnavailable(message.into())
    }

    /// Create a new BuildFailed error
    pub fn build_failed(
        relation_id: RelationId,
        attribute_id: AttributeId,
        message: impl Into<String>,
    ) -> Self {
        Error::BuildFailed {
            relation_id,
            attribute_id,
            message: message.into(),
        }
    }

    /// Create a new SpawnFailed error
    pub fn spawn_failed(message: impl Into<String>) -> Self {
        Error::SpawnFailed(message.into())
    }

    /// Create a new Parse error
    pub fn parse(message: impl Into<String>) -> Self {
        Error::Parse(message.into())
    }

    /// Create a new IO error
    pub fn io(message: impl Into<String>) -> Self {
        Error::Io {
            message: message.into(),
        }
    }

    /// Create a new Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal {
            message: message.into(),
        }
    }

    /// Check if this error means the frequency store could not serve a request
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            Error::StoreUnavailable(_)
                | Error::StoreClosed
                | Error::DatabaseLocked
                | Error::Corrupted(_)
                | Error::Io { .. }
        )
    }

    /// Check if this is a "not found" type error
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::RelationNotFound(_) | Error::AttributeNotFound { .. }
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::store_unavailable("disk full").to_string(),
            "frequency store unavailable: disk full"
        );
        assert_eq!(Error::RelationNotFound(16384).to_string(), "relation 16384 not found");
        assert_eq!(
            Error::IndexAlreadyExists("auto_1_2".to_string()).to_string(),
            "index 'auto_1_2' already exists"
        );
        assert_eq!(
            Error::DatabaseLocked.to_string(),
            "frequency store is locked by another process"
        );
    }

    #[test]
    fn test_structured_error_display() {
        let err = Error::build_failed(7, 3, "relation dropped");
        assert_eq!(
            err.to_string(),
            "index build failed on relation 7 attribute 3: relation dropped"
        );

        let err = Error::AttributeNotFound {
            relation_id: 7,
            attribute_id: 9,
        };
        assert_eq!(err.to_string(), "attribute 9 not found on relation 7");

        let err = Error::spawn_failed("max_workers (4) reached");
        assert_eq!(
            err.to_string(),
            "could not register background worker: max_workers (4) reached"
        );
    }

    #[test]
    fn test_error_classification() {
        assert!(Error::store_unavailable("x").is_store_failure());
        assert!(Error::StoreClosed.is_store_failure());
        assert!(Error::io("x").is_store_failure());
        assert!(!Error::RelationNotFound(1).is_store_failure());

        assert!(Error::RelationNotFound(1).is_not_found());
        assert!(!Error::internal("x").is_not_found());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io { .. }));
        assert!(err.to_string().contains("file not found"));
    }
}
