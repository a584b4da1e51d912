// SPDX-License-Identifier: MIT OR Apache-2.0
//! The result entity and its status-transition policy.
//!
//! A [`TestResult`] records the outcome of executing one run/caseversion link
//! in one environment by one tester.  It is created pending and finished by
//! exactly one of [`TestResult::finish_succeed`], [`TestResult::finish_fail`],
//! or [`TestResult::finish_invalidate`]; the `status` field is never assigned
//! directly by callers.

use crate::Id;
use chrono::{DateTime, Utc};
use mt_error::{ErrorCode, MtError};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ResultStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a [`TestResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    /// Created but not yet finished.
    Pending,
    /// The tested case passed.
    Passed,
    /// The tested case failed.
    Failed,
    /// The result was invalidated (e.g. the case itself was broken).
    Invalidated,
}

impl ResultStatus {
    /// Returns `true` if this status represents a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Passed | Self::Failed | Self::Invalidated)
    }

    /// Stable wire representation, matching the REST payload strings.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Invalidated => "invalidated",
        }
    }

    /// Parse a *finishing* status from its wire string.
    ///
    /// Only the three terminal statuses are accepted; `"pending"` is not a
    /// finishing status and unknown strings fail loudly rather than mapping
    /// to a default.
    pub fn parse_finishing(s: &str) -> Result<Self, MtError> {
        match s {
            "passed" => Ok(Self::Passed),
            "failed" => Ok(Self::Failed),
            "invalidated" => Ok(Self::Invalidated),
            other => Err(MtError::new(
                ErrorCode::ResultStatusUnknown,
                format!("unknown result status '{other}'"),
            )
            .with_context("status", other)),
        }
    }
}

impl std::fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Failure detail
// ---------------------------------------------------------------------------

/// Failure-specific payload carried by a failed result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// Tester's comment describing the failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// One-based number of the step that failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_step_number: Option<u32>,
    /// Link to a filed bug, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bug_url: Option<String>,
}

// ---------------------------------------------------------------------------
// TestResult
// ---------------------------------------------------------------------------

/// Outcome of executing one run/caseversion link in one environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    /// Primary key.
    pub id: Id,
    /// The run/caseversion link this result belongs to.
    pub runcaseversion: Id,
    /// Environment the case was executed in.
    pub environment: Id,
    /// User who performed the testing.
    pub tester: Id,
    /// User who recorded the result (usually the API caller).
    pub created_by: Id,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the finishing transition, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Current lifecycle status.
    pub status: ResultStatus,
    /// Failure detail; present only on failed results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
    /// Invalidation comment; present only on invalidated results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalidation_comment: Option<String>,
}

impl TestResult {
    /// Create a pending result with no status-specific payload.
    pub fn pending(
        id: Id,
        runcaseversion: Id,
        environment: Id,
        tester: Id,
        created_by: Id,
    ) -> Self {
        Self {
            id,
            runcaseversion,
            environment,
            tester,
            created_by,
            created_at: Utc::now(),
            completed_at: None,
            status: ResultStatus::Pending,
            failure: None,
            invalidation_comment: None,
        }
    }

    fn guard_not_finished(&self) -> Result<(), MtError> {
        if self.status.is_terminal() {
            return Err(MtError::new(
                ErrorCode::ResultAlreadyFinished,
                format!("result {} is already {}", self.id, self.status),
            )
            .with_context("result_id", self.id)
            .with_context("status", self.status.as_str()));
        }
        Ok(())
    }

    /// Finish this result as passed.
    ///
    /// Errors with `RESULT_ALREADY_FINISHED` if a finishing transition was
    /// already applied; the result is left unchanged in that case.
    pub fn finish_succeed(&mut self) -> Result<(), MtError> {
        self.guard_not_finished()?;
        self.status = ResultStatus::Passed;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Finish this result as failed, recording the failure detail.
    pub fn finish_fail(&mut self, failure: Failure) -> Result<(), MtError> {
        self.guard_not_finished()?;
        self.status = ResultStatus::Failed;
        self.failure = Some(failure);
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Finish this result as invalidated, recording the reason.
    pub fn finish_invalidate(&mut self, comment: Option<String>) -> Result<(), MtError> {
        self.guard_not_finished()?;
        self.status = ResultStatus::Invalidated;
        self.invalidation_comment = comment;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Apply one [`Finish`] operation.
    pub fn finish(&mut self, op: Finish) -> Result<(), MtError> {
        match op {
            Finish::Succeed => self.finish_succeed(),
            Finish::Fail(failure) => self.finish_fail(failure),
            Finish::Invalidate { comment } => self.finish_invalidate(comment),
        }
    }
}

// ---------------------------------------------------------------------------
// Finish
// ---------------------------------------------------------------------------

/// One of the three terminal transitions, with its payload.
///
/// Callers select exactly one variant per result lifecycle; there is no
/// variant for `pending`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finish {
    /// Mark the result passed.
    Succeed,
    /// Mark the result failed with failure detail.
    Fail(Failure),
    /// Mark the result invalidated with an optional reason.
    Invalidate {
        /// Why the result was invalidated.
        comment: Option<String>,
    },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
