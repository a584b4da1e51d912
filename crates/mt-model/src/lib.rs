// SPDX-License-Identifier: MIT OR Apache-2.0
//! Domain entities for the test-case management service.
//!
//! The one real policy here is the result status-transition contract in
//! [`result`]: a [`TestResult`] starts pending and is finished by exactly one
//! of three terminal transitions.  Everything else is plain data.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Users, API keys, and password hashing.
pub mod auth;
/// Products, product versions, and environments.
pub mod product;
/// Result entity and the status-transition policy.
pub mod result;
/// Runs, versioned cases, and the run/case join entity.
pub mod run;

pub use auth::{ApiKey, User};
pub use product::{Environment, Product, ProductVersion};
pub use result::{Failure, Finish, ResultStatus, TestResult};
pub use run::{CaseVersion, Run, RunCaseVersion, RunStatus};

/// Integer primary key shared by all persisted entities.
pub type Id = u64;
