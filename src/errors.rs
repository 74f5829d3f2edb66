//! Typed error hierarchy for DMS task operations.
//!
//! - `DmsError`: every failure a registry, generator, lifecycle or directory
//!   operation can report
//! - `ValidationError`: field-level rejections collected before any write
//! - `PlantMatchError`: the two reasons the plant auto-fill can fail
//! - `StoreError`: file store I/O and (de)serialization failures

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fields::InstanceStatus;

/// A single rejected field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Collected field errors for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationError {
    pub details: Vec<FieldError>,
}

impl ValidationError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut err = Self::new();
        err.push(field, message);
        err
    }

    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.details.push(FieldError {
            field: field.to_string(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.details.is_empty()
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.details.iter().any(|d| d.field == field)
    }

    /// `Ok(())` when nothing was collected.
    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.details.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .details
            .iter()
            .map(|d| format!("{}: {}", d.field, d.message))
            .collect::<Vec<_>>()
            .join("; ");
        write!(f, "Validation failed: {joined}")
    }
}

impl std::error::Error for ValidationError {}

/// Why an assignee's plant could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlantMatchError {
    #[error("Employee {employee} has no plant assigned")]
    NoPlantOnEmployee { employee: String },

    #[error("No plant matches '{plant}' for employee {employee}")]
    NoMatch { employee: String, plant: String },
}

/// Errors from the JSON file store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to access store at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse store at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize store: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// Errors from task, directory and settings operations.
#[derive(Debug, Error)]
pub enum DmsError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{resource} {id} not found")]
    NotFound { resource: &'static str, id: u64 },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Cannot move task instance from {from:?} to {to:?}")]
    InvalidTransition {
        from: InstanceStatus,
        to: InstanceStatus,
    },

    #[error(transparent)]
    PlantMatch(#[from] PlantMatchError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DmsError {
    pub fn not_found(resource: &'static str, id: u64) -> Self {
        DmsError::NotFound { resource, id }
    }

    /// Stable machine-readable code carried in the HTTP error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            DmsError::Validation(_) => "VALIDATION_ERROR",
            DmsError::NotFound { .. } => "NOT_FOUND",
            DmsError::Conflict(_) => "CONFLICT",
            DmsError::Forbidden(_) => "FORBIDDEN",
            DmsError::InvalidTransition { .. } => "INVALID_TRANSITION",
            DmsError::PlantMatch(PlantMatchError::NoPlantOnEmployee { .. }) => "EMPLOYEE_NO_PLANT",
            DmsError::PlantMatch(PlantMatchError::NoMatch { .. }) => "PLANT_NOT_MATCHED",
            DmsError::Store(_) => "STORE_ERROR",
        }
    }
}
