//! # Password External Client
//!
//! PlanetScale assigns password IDs, so a Password has no external name until
//! it is created. Until then it is looked up by display name, which is the
//! resource name. The plain-text password is only returned by the create call.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use kube::ResourceExt;
use tracing::{debug, info, warn};

use super::connector::PlanetScaleResource;
use super::context::OpContext;
use super::external::{
    ConnectionDetails, ExternalClient, ExternalCreation, ExternalError, ExternalObservation,
    ExternalUpdate, Readiness,
};
use crate::crd::{Managed, Password, PasswordObservation};
use crate::observability::metrics;
use crate::provider::planetscale::{
    ApiError, BranchRef, CreatePasswordRequest, PasswordInfo, PlanetScaleApi,
};

const KIND: &str = "Password";

impl PlanetScaleResource for Password {
    fn external_client(api: Arc<dyn PlanetScaleApi>) -> Box<dyn ExternalClient<Self>> {
        Box::new(PasswordClient::new(api))
    }
}

/// External client for branch passwords
#[derive(Debug, Clone)]
pub struct PasswordClient {
    api: Arc<dyn PlanetScaleApi>,
}

fn branch_ref(mg: &Password) -> BranchRef {
    let params = &mg.spec.for_provider;
    BranchRef::new(&params.organization, &params.database, &params.branch)
}

pub fn observation(password: &PasswordInfo) -> PasswordObservation {
    PasswordObservation {
        id: Some(password.id.clone()),
        display_name: Some(password.name.clone()),
        role: password.role.clone(),
        access_host_url: password.host().map(str::to_string),
        created_at: password.created_at.clone(),
    }
}

/// Display name must be the resource name; an unset role expresses no preference
pub fn is_up_to_date(mg: &Password, password: &PasswordInfo) -> bool {
    let name_matches = password.name == mg.name_any();
    let role_matches = mg
        .spec
        .for_provider
        .role
        .as_deref()
        .map_or(true, |role| password.role.as_deref() == Some(role));
    name_matches && role_matches
}

/// Connection details available from a create response
pub fn connection_details(mg: &Password, password: &PasswordInfo) -> ConnectionDetails {
    let mut details = ConnectionDetails::new();
    if let Some(host) = password.host() {
        details.insert("host", host);
    }
    details.insert(
        "username",
        password.username.as_deref().unwrap_or(&password.id),
    );
    if let Some(plain_text) = password.plain_text.as_deref() {
        details.insert("password", plain_text);
    }
    details.insert("database", mg.spec.for_provider.database.as_str());
    details
}

impl PasswordClient {
    pub fn new(api: Arc<dyn PlanetScaleApi>) -> Self {
        Self { api }
    }

    /// Passwords on the branch whose display name is `display_name`
    async fn find_by_display_name(
        &self,
        ctx: &OpContext,
        branch: &BranchRef,
        display_name: &str,
    ) -> Result<Vec<PasswordInfo>, ApiError> {
        let passwords = ctx.run(self.api.list_passwords(branch)).await?;
        Ok(passwords
            .into_iter()
            .filter(|p| p.name == display_name)
            .collect())
    }

    async fn lookup(
        &self,
        ctx: &OpContext,
        mg: &Password,
    ) -> Result<Option<(PasswordInfo, bool)>, ApiError> {
        let branch = branch_ref(mg);
        if let Some(id) = mg.external_name() {
            return match ctx.run(self.api.get_password(&branch, id)).await {
                Ok(password) => Ok(Some((password, false))),
                Err(e) if e.is_not_found() => Ok(None),
                Err(e) => Err(e),
            };
        }

        let mut matches = self
            .find_by_display_name(ctx, &branch, &mg.name_any())
            .await?;
        if matches.len() > 1 {
            warn!(
                branch = %branch,
                display_name = %mg.name_any(),
                count = matches.len(),
                "Several passwords share this display name; adopting the first"
            );
        }
        Ok(if matches.is_empty() {
            None
        } else {
            Some((matches.swap_remove(0), true))
        })
    }
}

#[async_trait]
impl ExternalClient<Password> for PasswordClient {
    async fn observe(
        &self,
        ctx: &OpContext,
        mg: &Password,
    ) -> Result<ExternalObservation<PasswordObservation>, ExternalError> {
        let start = Instant::now();
        let result = self.lookup(ctx, mg).await;
        metrics::record_external_operation(
            KIND,
            "observe",
            result.is_ok(),
            start.elapsed().as_secs_f64(),
        );

        let Some((password, adopted)) = result? else {
            debug!(password = %mg.name_any(), "Password does not exist");
            return Ok(ExternalObservation::absent());
        };

        let mut observed = ExternalObservation::present(
            is_up_to_date(mg, &password),
            Readiness::Available,
            observation(&password),
        );
        if adopted {
            observed.external_name = Some(password.id.clone());
        }
        Ok(observed)
    }

    async fn create(
        &self,
        ctx: &OpContext,
        mg: &Password,
    ) -> Result<ExternalCreation<PasswordObservation>, ExternalError> {
        let branch = branch_ref(mg);
        let request = CreatePasswordRequest {
            name: mg.name_any(),
            role: mg.spec.for_provider.role.clone(),
        };

        let start = Instant::now();
        let result = ctx.run(self.api.create_password(&branch, &request)).await;
        metrics::record_external_operation(
            KIND,
            "create",
            result.is_ok(),
            start.elapsed().as_secs_f64(),
        );

        match result {
            Ok(password) => Ok(ExternalCreation {
                external_name: Some(password.id.clone()),
                at_provider: Some(observation(&password)),
                connection_details: connection_details(mg, &password),
            }),
            Err(e) if e.is_already_exists() => {
                let existing = self
                    .find_by_display_name(ctx, &branch, &request.name)
                    .await?
                    .into_iter()
                    .next()
                    .ok_or(e)?;
                info!(
                    branch = %branch,
                    external_name = %existing.id,
                    "Password already exists, adopting it without its plain text"
                );
                Ok(ExternalCreation {
                    external_name: Some(existing.id.clone()),
                    at_provider: Some(observation(&existing)),
                    connection_details: connection_details(mg, &existing),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update(
        &self,
        _ctx: &OpContext,
        mg: &Password,
    ) -> Result<ExternalUpdate, ExternalError> {
        debug!(
            password = %mg.name_any(),
            "Password parameters drifted; PlanetScale offers no update for them"
        );
        Ok(ExternalUpdate::default())
    }

    async fn delete(&self, ctx: &OpContext, mg: &Password) -> Result<(), ExternalError> {
        let branch = branch_ref(mg);
        let ids: Vec<String> = match mg.external_name() {
            Some(id) => vec![id.to_string()],
            None => self
                .find_by_display_name(ctx, &branch, &mg.name_any())
                .await?
                .into_iter()
                .map(|p| p.id)
                .collect(),
        };

        for id in ids {
            let start = Instant::now();
            let result = ctx.run(self.api.delete_password(&branch, &id)).await;
            metrics::record_external_operation(
                KIND,
                "delete",
                result.is_ok() || result.as_ref().is_err_and(ApiError::is_not_found),
                start.elapsed().as_secs_f64(),
            );
            match result {
                Ok(()) => info!(branch = %branch, external_name = %id, "Deleted password"),
                Err(e) if e.is_not_found() => {
                    debug!(branch = %branch, external_name = %id, "Password already gone");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{PasswordParameters, PasswordSpec, ResourceSpec};
    use crate::provider::planetscale::mock::{MockFailure, MockOp};
    use crate::provider::planetscale::MockPlanetScale;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn password(role: Option<&str>) -> Password {
        Password::new(
            "orders-api",
            PasswordSpec {
                resource: ResourceSpec::default(),
                for_provider: PasswordParameters {
                    organization: "acme".to_string(),
                    database: "orders".to_string(),
                    branch: "main".to_string(),
                    role: role.map(str::to_string),
                },
            },
        )
    }

    fn branch() -> BranchRef {
        BranchRef::new("acme", "orders", "main")
    }

    fn ctx() -> OpContext {
        OpContext::new(Duration::from_secs(5), &CancellationToken::new())
    }

    fn client(api: &Arc<MockPlanetScale>) -> PasswordClient {
        PasswordClient::new(Arc::clone(api) as Arc<dyn PlanetScaleApi>)
    }

    #[test]
    fn test_matching_display_name_is_up_to_date() {
        let info = PasswordInfo {
            id: "pw-1".to_string(),
            name: "orders-api".to_string(),
            role: Some("writer".to_string()),
            ..Default::default()
        };
        assert!(is_up_to_date(&password(None), &info));
        assert!(is_up_to_date(&password(Some("writer")), &info));
        assert!(!is_up_to_date(&password(Some("admin")), &info));

        let renamed = PasswordInfo {
            name: "something-else".to_string(),
            ..info
        };
        assert!(!is_up_to_date(&password(None), &renamed));
    }

    #[tokio::test]
    async fn test_create_returns_connection_details() {
        let api = Arc::new(MockPlanetScale::new());
        let created = client(&api).create(&ctx(), &password(None)).await.unwrap();
        let id = created.external_name.unwrap();
        let details = created.connection_details;
        assert_eq!(details.get("username"), Some(b"user-1".as_slice()));
        assert_eq!(
            details.get("password"),
            Some(format!("pscale_pw_{id}").as_bytes())
        );
        assert_eq!(details.get("database"), Some(b"orders".as_slice()));
        assert_eq!(
            details.get("host"),
            Some(b"aws.connect.psdb.cloud".as_slice())
        );
    }

    #[tokio::test]
    async fn test_observe_without_id_adopts_by_display_name() {
        let api = Arc::new(MockPlanetScale::new());
        let id = api.insert_password(&branch(), "orders-api", None);
        api.insert_password(&branch(), "unrelated", None);
        let observed = client(&api).observe(&ctx(), &password(None)).await.unwrap();
        assert!(observed.resource_exists);
        assert_eq!(observed.external_name, Some(id));
        assert_eq!(api.calls(MockOp::GetPassword), 0);
    }

    #[tokio::test]
    async fn test_observe_with_missing_id_is_absent() {
        let api = Arc::new(MockPlanetScale::new());
        let mut pw = password(None);
        pw.set_external_name("pw-gone");
        let observed = client(&api).observe(&ctx(), &pw).await.unwrap();
        assert!(!observed.resource_exists);
        assert_eq!(api.calls(MockOp::ListPasswords), 0);
    }

    #[tokio::test]
    async fn test_observe_propagates_unauthorized() {
        let api = Arc::new(MockPlanetScale::new());
        api.fail_next(MockOp::ListPasswords, MockFailure::Unauthorized);
        assert!(client(&api).observe(&ctx(), &password(None)).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_without_id_removes_orphans_by_display_name() {
        let api = Arc::new(MockPlanetScale::new());
        api.insert_password(&branch(), "orders-api", None);
        api.insert_password(&branch(), "orders-api", None);
        let keep = api.insert_password(&branch(), "reporting", None);
        client(&api).delete(&ctx(), &password(None)).await.unwrap();
        let remaining: Vec<_> = api.passwords(&branch()).into_iter().map(|p| p.id).collect();
        assert_eq!(remaining, vec![keep]);
    }

    #[tokio::test]
    async fn test_delete_missing_id_succeeds() {
        let api = Arc::new(MockPlanetScale::new());
        let mut pw = password(None);
        pw.set_external_name("pw-gone");
        client(&api).delete(&ctx(), &pw).await.unwrap();
    }
}
