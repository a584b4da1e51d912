// SPDX-License-Identifier: MIT OR Apache-2.0
//! Users, API keys, and password hashing.

use crate::Id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Password hashing
// ---------------------------------------------------------------------------

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Salted SHA-256 digest of `password`, hex-encoded.
fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b"$");
    hasher.update(password.as_bytes());
    hex(&hasher.finalize())
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A registered account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Primary key.
    pub id: Id,
    /// Login name, unique per deployment.
    pub username: String,
    /// Contact address; activation and reset tokens are "sent" here.
    pub email: String,
    /// Per-user random salt.
    pub password_salt: String,
    /// Salted password digest.
    pub password_hash: String,
    /// Whether the account has been activated.
    pub is_active: bool,
    /// Pending activation key, cleared on activation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation_key: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create an inactive account with a fresh activation key.
    pub fn register(id: Id, username: impl Into<String>, email: impl Into<String>, password: &str) -> Self {
        let salt = Uuid::new_v4().simple().to_string();
        let password_hash = hash_password(&salt, password);
        Self {
            id,
            username: username.into(),
            email: email.into(),
            password_salt: salt,
            password_hash,
            is_active: false,
            activation_key: Some(Uuid::new_v4().simple().to_string()),
            created_at: Utc::now(),
        }
    }

    /// Create an already-active account (fixtures, admin bootstrap).
    pub fn active(id: Id, username: impl Into<String>, email: impl Into<String>, password: &str) -> Self {
        let mut user = Self::register(id, username, email, password);
        user.is_active = true;
        user.activation_key = None;
        user
    }

    /// Replace the stored password, re-salting.
    pub fn set_password(&mut self, password: &str) {
        self.password_salt = Uuid::new_v4().simple().to_string();
        self.password_hash = hash_password(&self.password_salt, password);
    }

    /// Constant-shape credential check.
    pub fn check_password(&self, password: &str) -> bool {
        hash_password(&self.password_salt, password) == self.password_hash
    }
}

// ---------------------------------------------------------------------------
// ApiKey
// ---------------------------------------------------------------------------

/// A generated API credential scoped to an owner.
///
/// Keys are created by an authorized requester on behalf of the owner (the
/// admin generates a key and hands it to the user).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
    /// The secret itself.
    pub key: String,
    /// User this key authenticates as.
    pub owner: Id,
    /// User who generated the key.
    pub created_by: Id,
    /// Whether the key is still accepted.
    pub active: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl ApiKey {
    /// Generate a fresh key owned by `owner`, recorded as created by
    /// `created_by`.
    pub fn generate(owner: Id, created_by: Id) -> Self {
        Self {
            key: Uuid::new_v4().simple().to_string(),
            owner,
            created_by,
            active: true,
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
