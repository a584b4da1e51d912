// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared entity store for the test-case management service.
//!
//! A [`Store`] keeps every persisted entity in per-type maps behind one
//! `tokio::sync::RwLock`, hands out monotonically increasing integer primary
//! keys, and (when a data directory is configured) writes a pretty-printed
//! JSON snapshot after each mutation and re-hydrates it at startup.
//!
//! Consistency relies on the single lock: every read sees a complete
//! snapshot, and result creation plus its finishing transition happen under
//! one write guard.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use mt_model::{
    ApiKey, CaseVersion, Environment, Finish, Id, Product, ProductVersion, Run, RunCaseVersion,
    RunStatus, TestResult, User,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A referenced entity does not exist.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind (e.g. `"run"`, `"environment"`).
        entity: &'static str,
        /// Primary key that was requested.
        id: Id,
    },

    /// A username is already taken.
    #[error("username '{username}' is already taken")]
    UsernameTaken {
        /// The conflicting name.
        username: String,
    },

    /// A domain rule rejected the operation (e.g. double finish).
    #[error(transparent)]
    Domain(#[from] mt_error::MtError),

    /// Snapshot I/O failure.
    #[error("snapshot io: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot exists but did not decode.
    #[error("snapshot decode: {0}")]
    Decode(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Filter parameters for run listing.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunFilter {
    /// Restrict to runs of this product version.
    pub productversion: Option<Id>,
    /// Restrict to runs with this status.
    pub status: Option<RunStatus>,
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
struct Tables {
    next_id: Id,
    products: HashMap<Id, Product>,
    productversions: HashMap<Id, ProductVersion>,
    environments: HashMap<Id, Environment>,
    runs: HashMap<Id, Run>,
    caseversions: HashMap<Id, CaseVersion>,
    runcaseversions: HashMap<Id, RunCaseVersion>,
    results: HashMap<Id, TestResult>,
    users: HashMap<Id, User>,
    api_keys: Vec<ApiKey>,
}

impl Tables {
    fn alloc(&mut self) -> Id {
        self.next_id += 1;
        self.next_id
    }
}

const SNAPSHOT_FILE: &str = "store.json";

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// The shared data layer.  Cheap to share via `Arc`.
#[derive(Debug)]
pub struct Store {
    tables: RwLock<Tables>,
    data_dir: Option<PathBuf>,
}

impl Store {
    /// Create an empty store.  When `data_dir` is `Some`, mutations persist a
    /// JSON snapshot there.
    pub fn new(data_dir: Option<PathBuf>) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            data_dir,
        }
    }

    /// In-memory store for tests.
    pub fn in_memory() -> Self {
        Self::new(None)
    }

    // -- Persistence ------------------------------------------------------

    /// Load the snapshot from the data directory, if one exists.
    pub async fn hydrate(&self) -> Result<(), StoreError> {
        let Some(dir) = self.data_dir.as_deref() else {
            return Ok(());
        };
        let path = snapshot_path(dir);
        let bytes = match fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no snapshot to hydrate");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let tables: Tables = serde_json::from_slice(&bytes)?;
        info!(
            path = %path.display(),
            runs = tables.runs.len(),
            results = tables.results.len(),
            users = tables.users.len(),
            "hydrated store snapshot"
        );
        *self.tables.write().await = tables;
        Ok(())
    }

    async fn persist(&self, tables: &Tables) -> Result<(), StoreError> {
        let Some(dir) = self.data_dir.as_deref() else {
            return Ok(());
        };
        fs::create_dir_all(dir).await?;
        let bytes = serde_json::to_vec_pretty(tables)?;
        fs::write(snapshot_path(dir), bytes).await?;
        Ok(())
    }

    // -- Products / versions / environments -------------------------------

    /// Insert a product.
    pub async fn add_product(&self, name: impl Into<String>) -> Result<Product, StoreError> {
        let mut t = self.tables.write().await;
        let id = t.alloc();
        let product = Product {
            id,
            name: name.into(),
        };
        t.products.insert(id, product.clone());
        self.persist(&t).await?;
        Ok(product)
    }

    /// Insert a version of an existing product.
    pub async fn add_product_version(
        &self,
        product: Id,
        version: impl Into<String>,
    ) -> Result<ProductVersion, StoreError> {
        let mut t = self.tables.write().await;
        if !t.products.contains_key(&product) {
            return Err(StoreError::NotFound {
                entity: "product",
                id: product,
            });
        }
        let id = t.alloc();
        let pv = ProductVersion {
            id,
            product,
            version: version.into(),
        };
        t.productversions.insert(id, pv.clone());
        self.persist(&t).await?;
        Ok(pv)
    }

    /// Insert an environment.
    pub async fn add_environment(
        &self,
        elements: Vec<String>,
    ) -> Result<Environment, StoreError> {
        let mut t = self.tables.write().await;
        let id = t.alloc();
        let env = Environment { id, elements };
        t.environments.insert(id, env.clone());
        self.persist(&t).await?;
        Ok(env)
    }

    /// Look up an environment.
    pub async fn environment(&self, id: Id) -> Option<Environment> {
        self.tables.read().await.environments.get(&id).cloned()
    }

    /// Look up a product version together with its product name.
    pub async fn product_version_names(&self, id: Id) -> Option<(String, String)> {
        let t = self.tables.read().await;
        let pv = t.productversions.get(&id)?;
        let product = t.products.get(&pv.product)?;
        Some((product.name.clone(), pv.version.clone()))
    }

    // -- Runs ---------------------------------------------------------------

    /// Insert a run against an existing product version.
    pub async fn add_run(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        status: RunStatus,
        productversion: Id,
        environments: Vec<Id>,
    ) -> Result<Run, StoreError> {
        let mut t = self.tables.write().await;
        if !t.productversions.contains_key(&productversion) {
            return Err(StoreError::NotFound {
                entity: "productversion",
                id: productversion,
            });
        }
        for env in &environments {
            if !t.environments.contains_key(env) {
                return Err(StoreError::NotFound {
                    entity: "environment",
                    id: *env,
                });
            }
        }
        let id = t.alloc();
        let run = Run {
            id,
            name: name.into(),
            description: description.into(),
            status,
            productversion,
            environments,
            created_at: chrono::Utc::now(),
        };
        t.runs.insert(id, run.clone());
        self.persist(&t).await?;
        Ok(run)
    }

    /// Look up a run.
    pub async fn run(&self, id: Id) -> Option<Run> {
        self.tables.read().await.runs.get(&id).cloned()
    }

    /// List runs matching `filter`, ordered by id.
    pub async fn list_runs(&self, filter: RunFilter) -> Vec<Run> {
        let t = self.tables.read().await;
        let mut out: Vec<Run> = t
            .runs
            .values()
            .filter(|r| {
                filter
                    .productversion
                    .is_none_or(|pv| r.productversion == pv)
                    && filter.status.is_none_or(|s| r.status == s)
            })
            .cloned()
            .collect();
        out.sort_unstable_by_key(|r| r.id);
        out
    }

    // -- Case versions / run membership --------------------------------------

    /// Insert a case version.
    pub async fn add_case_version(
        &self,
        name: impl Into<String>,
        productversion: Id,
    ) -> Result<CaseVersion, StoreError> {
        let mut t = self.tables.write().await;
        if !t.productversions.contains_key(&productversion) {
            return Err(StoreError::NotFound {
                entity: "productversion",
                id: productversion,
            });
        }
        let id = t.alloc();
        let cv = CaseVersion {
            id,
            name: name.into(),
            productversion,
        };
        t.caseversions.insert(id, cv.clone());
        self.persist(&t).await?;
        Ok(cv)
    }

    /// Look up a case version.
    pub async fn case_version(&self, id: Id) -> Option<CaseVersion> {
        self.tables.read().await.caseversions.get(&id).cloned()
    }

    /// Link a case version into a run.
    pub async fn add_run_case_version(
        &self,
        run: Id,
        caseversion: Id,
        order: u32,
    ) -> Result<RunCaseVersion, StoreError> {
        let mut t = self.tables.write().await;
        if !t.runs.contains_key(&run) {
            return Err(StoreError::NotFound {
                entity: "run",
                id: run,
            });
        }
        if !t.caseversions.contains_key(&caseversion) {
            return Err(StoreError::NotFound {
                entity: "caseversion",
                id: caseversion,
            });
        }
        let id = t.alloc();
        let rcv = RunCaseVersion {
            id,
            run,
            caseversion,
            order,
        };
        t.runcaseversions.insert(id, rcv.clone());
        self.persist(&t).await?;
        Ok(rcv)
    }

    /// Look up a run/caseversion link.
    pub async fn run_case_version(&self, id: Id) -> Option<RunCaseVersion> {
        self.tables.read().await.runcaseversions.get(&id).cloned()
    }

    /// List run/caseversion links, optionally restricted by run or case
    /// version, ordered by id.
    pub async fn list_run_case_versions(
        &self,
        run: Option<Id>,
        caseversion: Option<Id>,
    ) -> Vec<RunCaseVersion> {
        let t = self.tables.read().await;
        let mut out: Vec<RunCaseVersion> = t
            .runcaseversions
            .values()
            .filter(|rcv| {
                run.is_none_or(|r| rcv.run == r)
                    && caseversion.is_none_or(|cv| rcv.caseversion == cv)
            })
            .cloned()
            .collect();
        out.sort_unstable_by_key(|rcv| rcv.id);
        out
    }

    // -- Results --------------------------------------------------------------

    /// Record a result: resolve the foreign keys, create the pending result,
    /// and apply exactly one finishing transition — all under one write
    /// guard, so a failed transition never leaves a stray pending row.
    pub async fn record_result(
        &self,
        runcaseversion: Id,
        environment: Id,
        tester: Id,
        created_by: Id,
        op: Finish,
    ) -> Result<TestResult, StoreError> {
        let mut t = self.tables.write().await;
        if !t.runcaseversions.contains_key(&runcaseversion) {
            return Err(StoreError::NotFound {
                entity: "runcaseversion",
                id: runcaseversion,
            });
        }
        if !t.environments.contains_key(&environment) {
            return Err(StoreError::NotFound {
                entity: "environment",
                id: environment,
            });
        }
        if !t.users.contains_key(&tester) {
            return Err(StoreError::NotFound {
                entity: "tester",
                id: tester,
            });
        }

        let id = t.alloc();
        let mut result = TestResult::pending(id, runcaseversion, environment, tester, created_by);
        result.finish(op)?;
        t.results.insert(id, result.clone());
        self.persist(&t).await?;
        debug!(result_id = id, status = %result.status, "result recorded");
        Ok(result)
    }

    /// Look up a result.
    pub async fn result(&self, id: Id) -> Option<TestResult> {
        self.tables.read().await.results.get(&id).cloned()
    }

    /// Number of stored results.
    pub async fn result_count(&self) -> usize {
        self.tables.read().await.results.len()
    }

    // -- Users -----------------------------------------------------------------

    /// Register an inactive user with a fresh activation key.
    pub async fn register_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<User, StoreError> {
        let mut t = self.tables.write().await;
        if t.users.values().any(|u| u.username == username) {
            return Err(StoreError::UsernameTaken {
                username: username.into(),
            });
        }
        let id = t.alloc();
        let user = User::register(id, username, email, password);
        t.users.insert(id, user.clone());
        self.persist(&t).await?;
        Ok(user)
    }

    /// Insert an already-active user (fixtures, admin bootstrap).
    pub async fn add_active_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<User, StoreError> {
        let mut t = self.tables.write().await;
        if t.users.values().any(|u| u.username == username) {
            return Err(StoreError::UsernameTaken {
                username: username.into(),
            });
        }
        let id = t.alloc();
        let user = User::active(id, username, email, password);
        t.users.insert(id, user.clone());
        self.persist(&t).await?;
        Ok(user)
    }

    /// Look up a user by primary key.
    pub async fn user(&self, id: Id) -> Option<User> {
        self.tables.read().await.users.get(&id).cloned()
    }

    /// Look up a user by username.
    pub async fn user_by_username(&self, username: &str) -> Option<User> {
        self.tables
            .read()
            .await
            .users
            .values()
            .find(|u| u.username == username)
            .cloned()
    }

    /// Look up a user by email.
    pub async fn user_by_email(&self, email: &str) -> Option<User> {
        self.tables
            .read()
            .await
            .users
            .values()
            .find(|u| u.email == email)
            .cloned()
    }

    /// Activate the account holding `activation_key`.  Returns the activated
    /// user, or `None` when the key is unknown.
    pub async fn activate_user(&self, activation_key: &str) -> Result<Option<User>, StoreError> {
        let mut t = self.tables.write().await;
        let Some(user) = t
            .users
            .values_mut()
            .find(|u| u.activation_key.as_deref() == Some(activation_key))
        else {
            return Ok(None);
        };
        user.is_active = true;
        user.activation_key = None;
        let user = user.clone();
        self.persist(&t).await?;
        Ok(Some(user))
    }

    /// Replace a user's password.
    pub async fn set_user_password(&self, id: Id, password: &str) -> Result<User, StoreError> {
        let mut t = self.tables.write().await;
        let Some(user) = t.users.get_mut(&id) else {
            return Err(StoreError::NotFound { entity: "user", id });
        };
        user.set_password(password);
        let user = user.clone();
        self.persist(&t).await?;
        Ok(user)
    }

    /// Rename a user, rejecting collisions.
    pub async fn rename_user(&self, id: Id, username: &str) -> Result<User, StoreError> {
        let mut t = self.tables.write().await;
        if t.users
            .values()
            .any(|u| u.username == username && u.id != id)
        {
            return Err(StoreError::UsernameTaken {
                username: username.into(),
            });
        }
        let Some(user) = t.users.get_mut(&id) else {
            return Err(StoreError::NotFound { entity: "user", id });
        };
        user.username = username.into();
        let user = user.clone();
        self.persist(&t).await?;
        Ok(user)
    }

    // -- API keys ---------------------------------------------------------------

    /// Generate an API key owned by `owner`, created by `created_by`.
    pub async fn create_api_key(&self, owner: Id, created_by: Id) -> Result<ApiKey, StoreError> {
        let mut t = self.tables.write().await;
        if !t.users.contains_key(&owner) {
            return Err(StoreError::NotFound {
                entity: "user",
                id: owner,
            });
        }
        let key = ApiKey::generate(owner, created_by);
        t.api_keys.push(key.clone());
        self.persist(&t).await?;
        Ok(key)
    }

    /// Resolve `username` + `key` to the owning user, if the key is active
    /// and actually owned by that user.
    pub async fn verify_api_key(&self, username: &str, key: &str) -> Option<User> {
        let t = self.tables.read().await;
        let user = t.users.values().find(|u| u.username == username)?;
        t.api_keys
            .iter()
            .find(|k| k.active && k.key == key && k.owner == user.id)?;
        Some(user.clone())
    }

    /// List API keys owned by `owner`.
    pub async fn api_keys_for(&self, owner: Id) -> Vec<ApiKey> {
        self.tables
            .read()
            .await
            .api_keys
            .iter()
            .filter(|k| k.owner == owner)
            .cloned()
            .collect()
    }
}

fn snapshot_path(dir: &Path) -> PathBuf {
    dir.join(SNAPSHOT_FILE)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
