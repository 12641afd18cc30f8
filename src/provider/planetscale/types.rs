//! # PlanetScale API Types
//!
//! Request and response bodies of the PlanetScale REST API v1.
//! Only the fields the provider reads or writes are modelled.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Database as returned by `GET /organizations/{org}/databases/{name}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct DatabaseInfo {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    /// pending, importing, ready, sleeping, ...
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub region: Option<Region>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl DatabaseInfo {
    pub fn region_slug(&self) -> Option<&str> {
        self.region.as_ref().map(|r| r.slug.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Region {
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Body of `POST /organizations/{org}/databases`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateDatabaseRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Organization, database and branch a password belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BranchRef {
    pub organization: String,
    pub database: String,
    pub branch: String,
}

impl BranchRef {
    pub fn new(
        organization: impl Into<String>,
        database: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        Self {
            organization: organization.into(),
            database: database.into(),
            branch: branch.into(),
        }
    }
}

impl fmt::Display for BranchRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.organization, self.database, self.branch)
    }
}

/// Branch password
///
/// `plain_text` is only present in the response to a create call.
#[derive(Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct PasswordInfo {
    pub id: String,
    /// Display name
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plain_text: Option<String>,
    #[serde(default)]
    pub access_host_url: Option<String>,
    #[serde(default)]
    pub database_branch: Option<BranchInfo>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl PasswordInfo {
    /// Host to connect to, preferring the branch host
    pub fn host(&self) -> Option<&str> {
        self.database_branch
            .as_ref()
            .and_then(|b| b.access_host_url.as_deref())
            .or(self.access_host_url.as_deref())
    }
}

impl fmt::Debug for PasswordInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordInfo")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("role", &self.role)
            .field("username", &self.username)
            .field("plain_text", &self.plain_text.as_ref().map(|_| "<redacted>"))
            .field("access_host_url", &self.host())
            .field("created_at", &self.created_at)
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct BranchInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub access_host_url: Option<String>,
}

/// Body of `POST .../branches/{branch}/passwords`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatePasswordRequest {
    /// Display name
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// One page of a list response
#[derive(Debug, Deserialize)]
pub(crate) struct Page<T> {
    #[serde(default)]
    pub data: Vec<T>,
    #[serde(default)]
    pub next_page: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_debug_redacts_plain_text() {
        let password = PasswordInfo {
            id: "pw-1".to_string(),
            name: "orders-api".to_string(),
            plain_text: Some("pscale_pw_secret".to_string()),
            ..Default::default()
        };
        let debug = format!("{password:?}");
        assert!(!debug.contains("pscale_pw_secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_password_host_prefers_branch_host() {
        let password: PasswordInfo = serde_json::from_value(serde_json::json!({
            "id": "pw-1",
            "name": "orders-api",
            "access_host_url": "fallback.psdb.cloud",
            "database_branch": { "name": "main", "access_host_url": "aws.connect.psdb.cloud" }
        }))
        .unwrap();
        assert_eq!(password.host(), Some("aws.connect.psdb.cloud"));
    }

    #[test]
    fn test_database_region_slug() {
        let db: DatabaseInfo = serde_json::from_value(serde_json::json!({
            "name": "orders",
            "state": "ready",
            "region": { "slug": "eu-west", "display_name": "AWS eu-west-1" }
        }))
        .unwrap();
        assert_eq!(db.region_slug(), Some("eu-west"));
    }
}
