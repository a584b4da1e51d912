// SPDX-License-Identifier: MIT OR Apache-2.0
//! Test runs, versioned cases, and the run/case join entity.

use crate::Id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RunStatus
// ---------------------------------------------------------------------------

/// Editorial status of a [`Run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Being assembled; not yet visible to testers.
    Draft,
    /// Open for testing.
    Active,
    /// Closed to further testing.
    Disabled,
}

impl RunStatus {
    /// Stable wire representation, matching the REST filter strings.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Disabled => "disabled",
        }
    }

    /// Parse from the wire string; `None` for unknown values.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "active" => Some(Self::Active),
            "disabled" => Some(Self::Disabled),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// A test run against one product version, covering a set of environments
/// and a set of versioned cases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    /// Primary key.
    pub id: Id,
    /// Display name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Editorial status.
    pub status: RunStatus,
    /// Product version this run targets.
    pub productversion: Id,
    /// Environments attached to this run.
    pub environments: Vec<Id>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// One version of a test case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseVersion {
    /// Primary key.
    pub id: Id,
    /// Display name.
    pub name: String,
    /// Product version this case version applies to.
    pub productversion: Id,
}

/// Join entity linking a [`Run`] to one [`CaseVersion`].
///
/// Results sit under this link: one per execution attempt in one
/// environment by one tester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCaseVersion {
    /// Primary key.
    pub id: Id,
    /// The run.
    pub run: Id,
    /// The versioned case.
    pub caseversion: Id,
    /// Position of this case within the run.
    #[serde(default)]
    pub order: u32,
}
