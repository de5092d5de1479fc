//! Error handling for the tracker core
//!
//! A single `TrackerError` covers every failure the core can surface.
//! Callers usually care about the error *class* (validation, ambiguity,
//! structural, transient, fatal) rather than the concrete variant, so
//! `class()` provides that mapping.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, TrackerError>;

/// Main error type for the tracker core
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("invalid record {source_id}/{external_id}: {reason}")]
    Validation {
        source_id: String,
        external_id: String,
        reason: String,
    },

    #[error("ambiguous match for {source_id}/{external_id}: {} candidate(s) within margin", .candidates.len())]
    AmbiguousMatch {
        source_id: String,
        external_id: String,
        review_item_id: Uuid,
        candidates: Vec<(Uuid, f64)>,
    },

    #[error("edge {superior} -> {subordinate} would close a cycle: {path:?}")]
    CycleDetected {
        superior: Uuid,
        subordinate: Uuid,
        path: Vec<Uuid>,
    },

    #[error("illegal {entity} transition: {from} -> {to}")]
    IllegalTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("sync already running for source '{source_id}'")]
    SyncInProgress { source_id: String },

    #[error("sync cancelled for source '{source_id}'")]
    Cancelled { source_id: String },

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse error classes used for sync bookkeeping and retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed input, rejected without persisting anything
    Validation,
    /// Resolver could not decide; queued for manual review
    AmbiguousMatch,
    /// Cycle or illegal state transition; store unchanged
    Structural,
    /// Store or connector unavailable; safe to retry the whole run
    Transient,
    /// Internal invariant violation; abort immediately
    Fatal,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validation => "validation",
            Self::AmbiguousMatch => "ambiguous_match",
            Self::Structural => "structural",
            Self::Transient => "transient",
            Self::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

impl TrackerError {
    pub fn validation(
        source_id: impl Into<String>,
        external_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Validation {
            source_id: source_id.into(),
            external_id: external_id.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Validation { .. } | Self::Config(_) => ErrorClass::Validation,
            Self::AmbiguousMatch { .. } => ErrorClass::AmbiguousMatch,
            Self::CycleDetected { .. }
            | Self::IllegalTransition { .. }
            | Self::NotFound { .. }
            | Self::SyncInProgress { .. } => ErrorClass::Structural,
            Self::Transient(_) | Self::Cancelled { .. } | Self::Io(_) => ErrorClass::Transient,
            Self::Invariant(_) | Self::Serialization(_) => ErrorClass::Fatal,
        }
    }

    /// Only transient failures are worth a caller-driven retry.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation { .. } | Self::Config(_) => 400,
            Self::NotFound { .. } => 404,
            Self::AmbiguousMatch { .. } => 202,
            Self::CycleDetected { .. } | Self::IllegalTransition { .. } => 422,
            Self::SyncInProgress { .. } => 409,
            Self::Transient(_) | Self::Cancelled { .. } | Self::Io(_) => 503,
            Self::Invariant(_) | Self::Serialization(_) => 500,
        }
    }
}
