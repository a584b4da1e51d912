// SPDX-License-Identifier: MIT OR Apache-2.0
//! REST resources under `/api/v1`.
//!
//! Serialization is explicit: each response struct lists its exact output
//! fields, including the denormalized `product_name` / `productversion_name`
//! (runs) and `run_id` (run/caseversion links) convenience fields.  Run list
//! responses carry environment *references* only; detail responses embed the
//! full environment objects.
//!
//! The result resource is create-only and authenticated by API key: the
//! acting user is named by the `username` query parameter and proven by
//! `api_key`.  Creation never assigns `status` directly — the payload's
//! status string selects exactly one finishing transition.

use crate::{ApiError, AppState};
use axum::{
    Json,
    extract::{Path as AxPath, Query, State},
    http::StatusCode,
};
use mt_error::ErrorCode;
use mt_model::{
    CaseVersion, Environment, Failure, Finish, Id, ResultStatus, Run, RunCaseVersion, RunStatus,
    TestResult, User,
};
use mt_store::RunFilter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

// ---------------------------------------------------------------------------
// Run resource
// ---------------------------------------------------------------------------

/// Query parameters accepted by the run list endpoint.
#[derive(Debug, Deserialize)]
pub struct RunListQuery {
    /// Restrict to runs of this product version.
    pub productversion: Option<Id>,
    /// Restrict to runs with this status (`draft`/`active`/`disabled`).
    pub status: Option<String>,
}

/// Environment reference (list responses).
#[derive(Debug, Serialize, Deserialize)]
pub struct EnvironmentRef {
    /// Environment primary key.
    pub id: Id,
}

/// Full environment representation (detail responses).
#[derive(Debug, Serialize, Deserialize)]
pub struct EnvironmentOut {
    /// Environment primary key.
    pub id: Id,
    /// Element names composing the environment.
    pub elements: Vec<String>,
    /// Joined display name.
    pub name: String,
}

impl From<Environment> for EnvironmentOut {
    fn from(env: Environment) -> Self {
        let name = env.name();
        Self {
            id: env.id,
            elements: env.elements,
            name,
        }
    }
}

/// Environments as they appear in a run response: references on list,
/// full objects on detail.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum RunEnvironments {
    /// Reference-only form.
    Refs(Vec<EnvironmentRef>),
    /// Fully embedded form.
    Full(Vec<EnvironmentOut>),
}

/// Serialized run.
#[derive(Debug, Serialize)]
pub struct RunOut {
    /// Run primary key.
    pub id: Id,
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Editorial status.
    pub status: RunStatus,
    /// Product version primary key.
    pub productversion: Id,
    /// Denormalized version string of the product version.
    pub productversion_name: String,
    /// Denormalized name of the owning product.
    pub product_name: String,
    /// Environments attached to the run.
    pub environments: RunEnvironments,
    /// Run/caseversion links belonging to the run.
    pub runcaseversions: Vec<Id>,
}

async fn serialize_run(state: &AppState, run: Run, full_envs: bool) -> Result<RunOut, ApiError> {
    let (product_name, productversion_name) = state
        .store
        .product_version_names(run.productversion)
        .await
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("run {} references a missing product version", run.id),
            )
        })?;

    let environments = if full_envs {
        let mut full = Vec::with_capacity(run.environments.len());
        for env_id in &run.environments {
            if let Some(env) = state.store.environment(*env_id).await {
                full.push(EnvironmentOut::from(env));
            }
        }
        RunEnvironments::Full(full)
    } else {
        RunEnvironments::Refs(
            run.environments
                .iter()
                .map(|id| EnvironmentRef { id: *id })
                .collect(),
        )
    };

    let runcaseversions = state
        .store
        .list_run_case_versions(Some(run.id), None)
        .await
        .into_iter()
        .map(|rcv| rcv.id)
        .collect();

    Ok(RunOut {
        id: run.id,
        name: run.name,
        description: run.description,
        status: run.status,
        productversion: run.productversion,
        productversion_name,
        product_name,
        environments,
        runcaseversions,
    })
}

/// `GET /api/v1/runs` — list runs with reference-only environments.
pub async fn cmd_list_runs(
    Query(q): Query<RunListQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<RunOut>>, ApiError> {
    let status = match q.status.as_deref() {
        None => None,
        Some(s) => Some(RunStatus::parse(s).ok_or_else(|| {
            ApiError::new(
                StatusCode::BAD_REQUEST,
                format!("unknown run status filter '{s}'"),
            )
        })?),
    };

    let runs = state
        .store
        .list_runs(RunFilter {
            productversion: q.productversion,
            status,
        })
        .await;

    let mut out = Vec::with_capacity(runs.len());
    for run in runs {
        out.push(serialize_run(&state, run, false).await?);
    }
    Ok(Json(out))
}

/// `GET /api/v1/runs/{id}` — run detail with full environments.
pub async fn cmd_get_run(
    AxPath(run_id): AxPath<Id>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<RunOut>, ApiError> {
    let run = state
        .store
        .run(run_id)
        .await
        .ok_or_else(|| {
            ApiError::coded(StatusCode::NOT_FOUND, ErrorCode::RunNotFound, "run not found")
        })?;
    Ok(Json(serialize_run(&state, run, true).await?))
}

// ---------------------------------------------------------------------------
// RunCaseVersion resource
// ---------------------------------------------------------------------------

/// Query parameters accepted by the run/caseversion list endpoint.
#[derive(Debug, Deserialize)]
pub struct RunCaseVersionListQuery {
    /// Restrict to links of this run.
    pub run: Option<Id>,
    /// Restrict to links of this case version.
    pub caseversion: Option<Id>,
}

/// Serialized case version, embedded in its run link.
#[derive(Debug, Serialize, Deserialize)]
pub struct CaseVersionOut {
    /// Case version primary key.
    pub id: Id,
    /// Display name.
    pub name: String,
    /// Product version primary key.
    pub productversion: Id,
}

impl From<CaseVersion> for CaseVersionOut {
    fn from(cv: CaseVersion) -> Self {
        Self {
            id: cv.id,
            name: cv.name,
            productversion: cv.productversion,
        }
    }
}

/// Serialized run/caseversion link.  `run_id` duplicates `run` for client
/// convenience.
#[derive(Debug, Serialize)]
pub struct RunCaseVersionOut {
    /// Link primary key.
    pub id: Id,
    /// Run primary key.
    pub run: Id,
    /// Run primary key again, as clients historically consume it.
    pub run_id: Id,
    /// The embedded case version.
    pub caseversion: CaseVersionOut,
}

async fn serialize_rcv(
    state: &AppState,
    rcv: RunCaseVersion,
) -> Result<RunCaseVersionOut, ApiError> {
    let caseversion = state
        .store
        .case_version(rcv.caseversion)
        .await
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("link {} references a missing case version", rcv.id),
            )
        })?;
    Ok(RunCaseVersionOut {
        id: rcv.id,
        run: rcv.run,
        run_id: rcv.run,
        caseversion: caseversion.into(),
    })
}

/// `GET /api/v1/runcaseversions` — list run/caseversion links.
pub async fn cmd_list_run_case_versions(
    Query(q): Query<RunCaseVersionListQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<RunCaseVersionOut>>, ApiError> {
    let links = state
        .store
        .list_run_case_versions(q.run, q.caseversion)
        .await;
    let mut out = Vec::with_capacity(links.len());
    for rcv in links {
        out.push(serialize_rcv(&state, rcv).await?);
    }
    Ok(Json(out))
}

/// `GET /api/v1/runcaseversions/{id}` — single link.
pub async fn cmd_get_run_case_version(
    AxPath(rcv_id): AxPath<Id>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<RunCaseVersionOut>, ApiError> {
    let rcv = state
        .store
        .run_case_version(rcv_id)
        .await
        .ok_or_else(|| {
            ApiError::coded(
                StatusCode::NOT_FOUND,
                ErrorCode::RunCaseVersionNotFound,
                "runcaseversion not found",
            )
        })?;
    Ok(Json(serialize_rcv(&state, rcv).await?))
}

// ---------------------------------------------------------------------------
// Result resource (create-only)
// ---------------------------------------------------------------------------

/// API-key credentials carried as query parameters.
#[derive(Debug, Deserialize)]
pub struct ApiCredentials {
    /// Acting username.
    pub username: Option<String>,
    /// API key owned by that user.
    pub api_key: Option<String>,
}

/// Create payload for the result resource.
#[derive(Debug, Serialize, Deserialize)]
pub struct ResultCreate {
    /// Run/caseversion link the result belongs to.
    pub runcaseversion: Id,
    /// Environment the case was executed in.
    pub environment: Id,
    /// User who performed the testing.
    pub tester: Id,
    /// Finishing status: `"passed"`, `"failed"`, or `"invalidated"`.
    pub status: String,
    /// Comment (failure detail or invalidation reason).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// One-based number of the failed step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_step_number: Option<u32>,
    /// Link to a filed bug.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bug_url: Option<String>,
}

async fn authenticate_api_key(
    state: &AppState,
    creds: &ApiCredentials,
) -> Result<User, ApiError> {
    let (Some(username), Some(api_key)) = (creds.username.as_deref(), creds.api_key.as_deref())
    else {
        return Err(ApiError::coded(
            StatusCode::UNAUTHORIZED,
            ErrorCode::AuthApiKeyInvalid,
            "username and api_key query parameters are required",
        ));
    };
    state
        .store
        .verify_api_key(username, api_key)
        .await
        .ok_or_else(|| {
            ApiError::coded(
                StatusCode::UNAUTHORIZED,
                ErrorCode::AuthApiKeyInvalid,
                "invalid API key",
            )
        })
}

/// `POST /api/v1/results` — record one result.
///
/// Resolves the foreign keys from the payload, creates the pending result,
/// and applies the finishing transition selected by the `status` field.
pub async fn cmd_create_result(
    Query(creds): Query<ApiCredentials>,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ResultCreate>,
) -> Result<(StatusCode, Json<TestResult>), ApiError> {
    let user = authenticate_api_key(&state, &creds).await?;

    let status = ResultStatus::parse_finishing(&payload.status).map_err(ApiError::from)?;

    let op = match status {
        ResultStatus::Passed => Finish::Succeed,
        ResultStatus::Failed => Finish::Fail(Failure {
            comment: payload.comment,
            failed_step_number: payload.failed_step_number,
            bug_url: payload.bug_url,
        }),
        ResultStatus::Invalidated => Finish::Invalidate {
            comment: payload.comment,
        },
        // parse_finishing never yields Pending.
        ResultStatus::Pending => {
            return Err(ApiError::coded(
                StatusCode::BAD_REQUEST,
                ErrorCode::ResultStatusUnknown,
                "pending is not a finishing status",
            ));
        }
    };

    let result = state
        .store
        .record_result(
            payload.runcaseversion,
            payload.environment,
            payload.tester,
            user.id,
            op,
        )
        .await?;

    info!(
        result_id = result.id,
        status = %result.status,
        created_by = %user.username,
        "result recorded via API"
    );

    Ok((StatusCode::CREATED, Json(result)))
}
