//! Unified error taxonomy with stable error codes for the test-case
//! management service.
//!
//! Every service error carries an [`ErrorCode`] (a machine-readable, stable
//! string tag), a human-readable message, an optional cause chain, and
//! arbitrary key-value context.  Use the builder returned by [`MtError::new`]
//! to construct errors fluently.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Broad family that an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Result lifecycle / status-transition errors.
    Result,
    /// Test-run and run-membership errors.
    Run,
    /// Authentication and session errors.
    Auth,
    /// Account management errors (registration, activation, passwords).
    Account,
    /// Data-layer errors.
    Store,
    /// Configuration errors.
    Config,
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Result => "result",
            Self::Run => "run",
            Self::Auth => "auth",
            Self::Account => "account",
            Self::Store => "store",
            Self::Config => "config",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable error code.
///
/// Each variant serialises to a `SCREAMING_SNAKE_CASE` string that is
/// guaranteed not to change across patch releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // -- Result --
    /// A payload named a status outside the closed passed/failed/invalidated set.
    ResultStatusUnknown,
    /// A finishing transition was invoked on an already-terminal result.
    ResultAlreadyFinished,

    // -- Run --
    /// Requested run does not exist.
    RunNotFound,
    /// Requested run/caseversion link does not exist.
    RunCaseVersionNotFound,
    /// Requested environment does not exist.
    EnvironmentNotFound,

    // -- Auth --
    /// Username/password pair did not authenticate.
    AuthBadCredentials,
    /// API key missing or not valid for the named user.
    AuthApiKeyInvalid,
    /// No session for a route that requires one.
    AuthSessionRequired,
    /// Too many login attempts for one username.
    AuthRateLimited,

    // -- Account --
    /// Requested user does not exist.
    UserNotFound,
    /// Username already taken at registration or rename.
    UsernameTaken,
    /// Activation key unknown or already consumed.
    ActivationKeyInvalid,
    /// Password-reset token unknown or expired.
    ResetTokenInvalid,

    // -- Store --
    /// Snapshot file could not be read or written.
    StoreIoFailed,
    /// Snapshot file exists but did not decode.
    StoreDecodeFailed,

    // -- Config --
    /// Configuration file or value is invalid.
    ConfigInvalid,

    // -- Internal --
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl ErrorCode {
    /// Returns the broad [`ErrorCategory`] this code belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ResultStatusUnknown | Self::ResultAlreadyFinished => ErrorCategory::Result,

            Self::RunNotFound | Self::RunCaseVersionNotFound | Self::EnvironmentNotFound => {
                ErrorCategory::Run
            }

            Self::AuthBadCredentials
            | Self::AuthApiKeyInvalid
            | Self::AuthSessionRequired
            | Self::AuthRateLimited => ErrorCategory::Auth,

            Self::UserNotFound
            | Self::UsernameTaken
            | Self::ActivationKeyInvalid
            | Self::ResetTokenInvalid => ErrorCategory::Account,

            Self::StoreIoFailed | Self::StoreDecodeFailed => ErrorCategory::Store,

            Self::ConfigInvalid => ErrorCategory::Config,

            Self::Internal => ErrorCategory::Internal,
        }
    }

    /// Stable `&'static str` representation of the code (e.g.
    /// `"RESULT_STATUS_UNKNOWN"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResultStatusUnknown => "RESULT_STATUS_UNKNOWN",
            Self::ResultAlreadyFinished => "RESULT_ALREADY_FINISHED",
            Self::RunNotFound => "RUN_NOT_FOUND",
            Self::RunCaseVersionNotFound => "RUN_CASE_VERSION_NOT_FOUND",
            Self::EnvironmentNotFound => "ENVIRONMENT_NOT_FOUND",
            Self::AuthBadCredentials => "AUTH_BAD_CREDENTIALS",
            Self::AuthApiKeyInvalid => "AUTH_API_KEY_INVALID",
            Self::AuthSessionRequired => "AUTH_SESSION_REQUIRED",
            Self::AuthRateLimited => "AUTH_RATE_LIMITED",
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::UsernameTaken => "USERNAME_TAKEN",
            Self::ActivationKeyInvalid => "ACTIVATION_KEY_INVALID",
            Self::ResetTokenInvalid => "RESET_TOKEN_INVALID",
            Self::StoreIoFailed => "STORE_IO_FAILED",
            Self::StoreDecodeFailed => "STORE_DECODE_FAILED",
            Self::ConfigInvalid => "CONFIG_INVALID",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// MtError
// ---------------------------------------------------------------------------

/// Unified service error.
///
/// Carries a stable [`ErrorCode`], a human-readable message, an optional
/// source error for cause-chaining, and arbitrary structured context.
///
/// # Builder usage
///
/// ```
/// use mt_error::{ErrorCode, MtError};
///
/// let err = MtError::new(ErrorCode::RunNotFound, "run 17 does not exist")
///     .with_context("run_id", 17);
/// ```
pub struct MtError {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Optional underlying cause.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    /// Arbitrary structured context for diagnostics.
    pub context: BTreeMap<String, serde_json::Value>,
}

impl MtError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
            context: BTreeMap::new(),
        }
    }

    /// Attach a key-value pair to the diagnostic context.
    ///
    /// The value is converted via [`serde_json::to_value`]; if serialisation
    /// fails, the entry is silently skipped.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Attach an underlying cause.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Shorthand for `self.code.category()`.
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }
}

impl fmt::Debug for MtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("MtError");
        d.field("code", &self.code);
        d.field("message", &self.message);
        if let Some(ref src) = self.source {
            d.field("source", &src.to_string());
        }
        if !self.context.is_empty() {
            d.field("context", &self.context);
        }
        d.finish()
    }
}

impl fmt::Display for MtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)?;
        if !self.context.is_empty() {
            // Deterministic output thanks to BTreeMap.
            if let Ok(ctx) = serde_json::to_string(&self.context) {
                write!(f, " {ctx}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for MtError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

// ---------------------------------------------------------------------------
// Serialization support
// ---------------------------------------------------------------------------

/// Serialisable snapshot of an [`MtError`] (without the opaque source).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MtErrorDto {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Structured context.
    pub context: BTreeMap<String, serde_json::Value>,
    /// String representation of the source error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_message: Option<String>,
}

impl From<&MtError> for MtErrorDto {
    fn from(err: &MtError) -> Self {
        Self {
            code: err.code,
            message: err.message.clone(),
            context: err.context.clone(),
            source_message: err.source.as_ref().map(|s| s.to_string()),
        }
    }
}

impl From<MtErrorDto> for MtError {
    fn from(dto: MtErrorDto) -> Self {
        Self {
            code: dto.code,
            message: dto.message,
            source: None,
            context: dto.context,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
