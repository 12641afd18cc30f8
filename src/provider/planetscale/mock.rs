//! # In-Memory PlanetScale
//!
//! A [`PlanetScaleApi`] implementation backed by in-process maps. Used by the
//! reconciliation tests to count external calls, inject failures and simulate
//! responses that are lost after the server applied the change.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::error::ApiError;
use super::types::{
    BranchInfo, BranchRef, CreateDatabaseRequest, CreatePasswordRequest, DatabaseInfo,
    PasswordInfo, Region,
};
use super::PlanetScaleApi;

const MOCK_ACCESS_HOST: &str = "aws.connect.psdb.cloud";

/// API operation, used to count calls and target injected failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    GetDatabase,
    CreateDatabase,
    DeleteDatabase,
    GetPassword,
    ListPasswords,
    CreatePassword,
    DeletePassword,
}

/// Failure injected into the next call of an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockFailure {
    /// Fail before touching state
    Unauthorized,
    /// Fail before touching state with an HTTP status
    Status(u16),
    /// Apply the change, then fail as if the response was lost
    LostResponse,
}

#[derive(Debug, Default)]
struct MockState {
    databases: BTreeMap<(String, String), DatabaseInfo>,
    passwords: BTreeMap<BranchRef, Vec<PasswordInfo>>,
    calls: HashMap<MockOp, usize>,
    failures: HashMap<MockOp, VecDeque<MockFailure>>,
    next_id: u64,
    initial_database_state: Option<String>,
}

/// In-memory PlanetScale API
#[derive(Debug, Default)]
pub struct MockPlanetScale {
    state: Mutex<MockState>,
    latency: Mutex<Option<Duration>>,
}

impl MockPlanetScale {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap_or_else(PoisonError::into_inner) = Some(latency);
    }

    /// State given to databases created from now on (default "pending")
    pub fn set_initial_database_state(&self, state: &str) {
        self.lock().initial_database_state = Some(state.to_string());
    }

    /// Queue a failure for the next call of `op`
    pub fn fail_next(&self, op: MockOp, failure: MockFailure) {
        self.lock().failures.entry(op).or_default().push_back(failure);
    }

    pub fn calls(&self, op: MockOp) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Insert or replace a database
    pub fn insert_database(&self, organization: &str, database: DatabaseInfo) {
        self.lock()
            .databases
            .insert((organization.to_string(), database.name.clone()), database);
    }

    pub fn database(&self, organization: &str, name: &str) -> Option<DatabaseInfo> {
        self.lock()
            .databases
            .get(&(organization.to_string(), name.to_string()))
            .cloned()
    }

    pub fn database_count(&self) -> usize {
        self.lock().databases.len()
    }

    pub fn set_database_state(&self, organization: &str, name: &str, state: &str) {
        if let Some(db) = self
            .lock()
            .databases
            .get_mut(&(organization.to_string(), name.to_string()))
        {
            db.state = Some(state.to_string());
        }
    }

    /// Remove a database out of band
    pub fn remove_database(&self, organization: &str, name: &str) {
        self.lock()
            .databases
            .remove(&(organization.to_string(), name.to_string()));
    }

    /// Insert a password out of band; returns its ID
    pub fn insert_password(&self, branch: &BranchRef, display_name: &str, role: Option<&str>) -> String {
        let mut state = self.lock();
        let password = new_password(&mut state, display_name, role);
        let id = password.id.clone();
        state.passwords.entry(branch.clone()).or_default().push(password);
        id
    }

    /// Stored passwords of a branch, without their plain text
    pub fn passwords(&self, branch: &BranchRef) -> Vec<PasswordInfo> {
        self.lock()
            .passwords
            .get(branch)
            .cloned()
            .unwrap_or_default()
    }

    /// Remove a password out of band
    pub fn remove_password(&self, branch: &BranchRef, id: &str) {
        if let Some(list) = self.lock().passwords.get_mut(branch) {
            list.retain(|p| p.id != id);
        }
    }

    /// Count the call and pop the next injected failure for `op`
    async fn enter(&self, op: MockOp) -> Option<MockFailure> {
        let latency = *self.latency.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let mut state = self.lock();
        *state.calls.entry(op).or_insert(0) += 1;
        state.failures.get_mut(&op).and_then(VecDeque::pop_front)
    }
}

fn new_password(state: &mut MockState, display_name: &str, role: Option<&str>) -> PasswordInfo {
    state.next_id += 1;
    let n = state.next_id;
    PasswordInfo {
        id: format!("pw-{n}"),
        name: display_name.to_string(),
        role: Some(role.unwrap_or("admin").to_string()),
        username: Some(format!("user-{n}")),
        plain_text: None,
        access_host_url: Some(MOCK_ACCESS_HOST.to_string()),
        database_branch: None,
        created_at: Some(chrono::Utc::now().to_rfc3339()),
    }
}

/// Failure checked before the call has any effect
fn fail_early(failure: Option<&MockFailure>) -> Result<(), ApiError> {
    match failure {
        Some(MockFailure::Unauthorized) => Err(ApiError::Unauthorized("injected".to_string())),
        Some(MockFailure::Status(status)) => Err(ApiError::from_response(*status, "injected")),
        Some(MockFailure::LostResponse) | None => Ok(()),
    }
}

/// Failure reported after the call took effect
fn fail_late(failure: Option<&MockFailure>) -> Result<(), ApiError> {
    match failure {
        Some(MockFailure::LostResponse) => Err(ApiError::Http {
            status: 504,
            code: None,
            message: "response lost".to_string(),
        }),
        _ => Ok(()),
    }
}

fn not_found(what: &str) -> ApiError {
    ApiError::NotFound(format!("{what} not found"))
}

#[async_trait]
impl PlanetScaleApi for MockPlanetScale {
    async fn get_database(&self, organization: &str, name: &str) -> Result<DatabaseInfo, ApiError> {
        let failure = self.enter(MockOp::GetDatabase).await;
        fail_early(failure.as_ref())?;
        self.database(organization, name)
            .ok_or_else(|| not_found("database"))
    }

    async fn create_database(
        &self,
        organization: &str,
        request: &CreateDatabaseRequest,
    ) -> Result<DatabaseInfo, ApiError> {
        let failure = self.enter(MockOp::CreateDatabase).await;
        fail_early(failure.as_ref())?;
        let key = (organization.to_string(), request.name.clone());
        let created = {
            let mut state = self.lock();
            if state.databases.contains_key(&key) {
                return Err(ApiError::AlreadyExists(format!(
                    "database {} already exists",
                    request.name
                )));
            }
            state.next_id += 1;
            let db = DatabaseInfo {
                id: Some(format!("db-{}", state.next_id)),
                name: request.name.clone(),
                state: Some(
                    state
                        .initial_database_state
                        .clone()
                        .unwrap_or_else(|| "pending".to_string()),
                ),
                region: Some(Region {
                    slug: request.region.clone().unwrap_or_else(|| "us-east".to_string()),
                    display_name: None,
                }),
                notes: request.notes.clone(),
                html_url: Some(format!(
                    "https://app.planetscale.com/{organization}/{}",
                    request.name
                )),
                created_at: Some(chrono::Utc::now().to_rfc3339()),
            };
            state.databases.insert(key, db.clone());
            db
        };
        fail_late(failure.as_ref())?;
        Ok(created)
    }

    async fn delete_database(&self, organization: &str, name: &str) -> Result<(), ApiError> {
        let failure = self.enter(MockOp::DeleteDatabase).await;
        fail_early(failure.as_ref())?;
        self.lock()
            .databases
            .remove(&(organization.to_string(), name.to_string()))
            .ok_or_else(|| not_found("database"))?;
        fail_late(failure.as_ref())
    }

    async fn get_password(&self, branch: &BranchRef, id: &str) -> Result<PasswordInfo, ApiError> {
        let failure = self.enter(MockOp::GetPassword).await;
        fail_early(failure.as_ref())?;
        self.passwords(branch)
            .into_iter()
            .find(|p| p.id == id)
            .ok_or_else(|| not_found("password"))
    }

    async fn list_passwords(&self, branch: &BranchRef) -> Result<Vec<PasswordInfo>, ApiError> {
        let failure = self.enter(MockOp::ListPasswords).await;
        fail_early(failure.as_ref())?;
        Ok(self.passwords(branch))
    }

    async fn create_password(
        &self,
        branch: &BranchRef,
        request: &CreatePasswordRequest,
    ) -> Result<PasswordInfo, ApiError> {
        let failure = self.enter(MockOp::CreatePassword).await;
        fail_early(failure.as_ref())?;
        let mut created = {
            let mut state = self.lock();
            let password = new_password(&mut state, &request.name, request.role.as_deref());
            state
                .passwords
                .entry(branch.clone())
                .or_default()
                .push(password.clone());
            password
        };
        fail_late(failure.as_ref())?;
        created.plain_text = Some(format!("pscale_pw_{}", created.id));
        created.database_branch = Some(BranchInfo {
            name: Some(branch.branch.clone()),
            access_host_url: Some(MOCK_ACCESS_HOST.to_string()),
        });
        Ok(created)
    }

    async fn delete_password(&self, branch: &BranchRef, id: &str) -> Result<(), ApiError> {
        let failure = self.enter(MockOp::DeletePassword).await;
        fail_early(failure.as_ref())?;
        {
            let mut state = self.lock();
            let list = state
                .passwords
                .get_mut(branch)
                .ok_or_else(|| not_found("password"))?;
            let before = list.len();
            list.retain(|p| p.id != id);
            if list.len() == before {
                return Err(not_found("password"));
            }
        }
        fail_late(failure.as_ref())
    }
}
