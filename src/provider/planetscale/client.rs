//! # PlanetScale REST Client
//!
//! Native REST implementation of [`PlanetScaleApi`] using reqwest with rustls.
//!
//! API Reference: https://api-docs.planetscale.com/reference

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use tracing::debug;
use zeroize::Zeroizing;

use super::error::ApiError;
use super::types::{
    BranchRef, CreateDatabaseRequest, CreatePasswordRequest, DatabaseInfo, Page, PasswordInfo,
};
use super::PlanetScaleApi;

/// PlanetScale REST API client authenticated with a service token
#[derive(Clone)]
pub struct PlanetScaleClient {
    http: Client,
    base_url: Url,
    token: Zeroizing<String>,
}

impl fmt::Debug for PlanetScaleClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanetScaleClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl PlanetScaleClient {
    /// Create a client for `base_url` (e.g. `https://api.planetscale.com/v1`)
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self, ApiError> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| ApiError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(base_url.to_string()));
        }
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("provider-planetscale/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url,
            token: Zeroizing::new(token.to_string()),
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Base URL extended by `segments`, each percent-encoded as one path segment
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn database_url(&self, organization: &str, name: Option<&str>) -> Result<Url, ApiError> {
        match name {
            Some(name) => self.endpoint(&["organizations", organization, "databases", name]),
            None => self.endpoint(&["organizations", organization, "databases"]),
        }
    }

    fn password_url(&self, branch: &BranchRef, id: Option<&str>) -> Result<Url, ApiError> {
        let mut segments = vec![
            "organizations",
            branch.organization.as_str(),
            "databases",
            branch.database.as_str(),
            "branches",
            branch.branch.as_str(),
            "passwords",
        ];
        segments.extend(id);
        self.endpoint(&segments)
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let response = request
            .bearer_auth(self.token.as_str())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        debug!(status = status.as_u16(), "PlanetScale API request failed");
        Err(ApiError::from_response(status.as_u16(), &body))
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = self.send(request).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl PlanetScaleApi for PlanetScaleClient {
    async fn get_database(&self, organization: &str, name: &str) -> Result<DatabaseInfo, ApiError> {
        let url = self.database_url(organization, Some(name))?;
        self.send_json(self.http.get(url)).await
    }

    async fn create_database(
        &self,
        organization: &str,
        request: &CreateDatabaseRequest,
    ) -> Result<DatabaseInfo, ApiError> {
        let url = self.database_url(organization, None)?;
        self.send_json(self.http.post(url).json(request)).await
    }

    async fn delete_database(&self, organization: &str, name: &str) -> Result<(), ApiError> {
        let url = self.database_url(organization, Some(name))?;
        self.send(self.http.delete(url)).await?;
        Ok(())
    }

    async fn get_password(&self, branch: &BranchRef, id: &str) -> Result<PasswordInfo, ApiError> {
        let url = self.password_url(branch, Some(id))?;
        self.send_json(self.http.get(url)).await
    }

    async fn list_passwords(&self, branch: &BranchRef) -> Result<Vec<PasswordInfo>, ApiError> {
        let url = self.password_url(branch, None)?;
        let mut passwords = Vec::new();
        let mut page = 1u32;
        loop {
            let request = self.http.get(url.clone()).query(&[("page", page)]);
            let current: Page<PasswordInfo> = self.send_json(request).await?;
            passwords.extend(current.data);
            match current.next_page {
                Some(next) if next > page => page = next,
                _ => break,
            }
        }
        Ok(passwords)
    }

    async fn create_password(
        &self,
        branch: &BranchRef,
        request: &CreatePasswordRequest,
    ) -> Result<PasswordInfo, ApiError> {
        let url = self.password_url(branch, None)?;
        self.send_json(self.http.post(url).json(request)).await
    }

    async fn delete_password(&self, branch: &BranchRef, id: &str) -> Result<(), ApiError> {
        let url = self.password_url(branch, Some(id))?;
        self.send(self.http.delete(url)).await?;
        Ok(())
    }
}
