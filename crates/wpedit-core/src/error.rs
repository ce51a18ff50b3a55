use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::api::ApiError;
use crate::model::WorkPackageId;

/// Machine-readable error codes for callers that branch on failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ValidationFailed,
    SaveInFlight,
    TransportFailed,
    ServerRejected,
    VersionConflict,
    NotFound,
    ConfigParseError,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ValidationFailed => "E1001",
            Self::SaveInFlight => "E1002",
            Self::TransportFailed => "E2001",
            Self::ServerRejected => "E2002",
            Self::VersionConflict => "E2003",
            Self::NotFound => "E2004",
            Self::ConfigParseError => "E3001",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ValidationFailed => "Change-set failed validation",
            Self::SaveInFlight => "Save already in flight",
            Self::TransportFailed => "Transport failure",
            Self::ServerRejected => "Server rejected the request",
            Self::VersionConflict => "Work package was modified concurrently",
            Self::NotFound => "Work package not found",
            Self::ConfigParseError => "Config file parse error",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to the user.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ValidationFailed => Some("Correct the highlighted fields and save again."),
            Self::SaveInFlight => Some("Wait for the pending save to finish."),
            Self::TransportFailed => Some("Check the connection and retry the save."),
            Self::ServerRejected => None,
            Self::VersionConflict => {
                Some("Reload the work package, reapply your edits and save again.")
            }
            Self::NotFound => None,
            Self::ConfigParseError => Some("Fix syntax in .wpedit/config.toml and retry."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ---------------------------------------------------------------------------
// ValidationErrors
// ---------------------------------------------------------------------------

/// Field-level validation messages, keyed by attribute name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    fields: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, attribute: impl Into<String>, message: impl Into<String>) {
        self.fields
            .entry(attribute.into())
            .or_default()
            .push(message.into());
    }

    pub fn merge(&mut self, other: &BTreeMap<String, Vec<String>>) {
        for (attribute, messages) in other {
            for message in messages {
                self.add(attribute.clone(), message.clone());
            }
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    #[must_use]
    pub fn messages_for(&self, attribute: &str) -> &[String] {
        self.fields.get(attribute).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn attributes(&self) -> Vec<&str> {
        self.fields.keys().map(String::as_str).collect()
    }

    #[must_use]
    pub const fn fields(&self) -> &BTreeMap<String, Vec<String>> {
        &self.fields
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (attribute, messages) in &self.fields {
            for message in messages {
                if !first {
                    write!(f, "; ")?;
                }
                write!(f, "{attribute} {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

// ---------------------------------------------------------------------------
// EditError
// ---------------------------------------------------------------------------

/// Errors surfaced by the editing service to its callers.
#[derive(Debug, Error)]
pub enum EditError {
    /// Local validation failed; nothing was submitted.
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    /// The change-set already has a save in flight.
    #[error("a save for work package {id} is already in flight")]
    SaveInFlight { id: WorkPackageId },

    /// Transport or server failure, passed through unmodified.
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl EditError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::ValidationFailed,
            Self::SaveInFlight { .. } => ErrorCode::SaveInFlight,
            Self::Api(err) => err.code(),
        }
    }

    /// Optional remediation hint for the user.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }

    /// Field-level messages when this is a local or server-side validation failure.
    #[must_use]
    pub const fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            Self::Validation(errors) | Self::Api(ApiError::Rejected(errors)) => Some(errors),
            _ => None,
        }
    }
}
