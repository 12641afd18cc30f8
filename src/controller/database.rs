//! # Database External Client
//!
//! The database name is the external name, or the resource name until one is
//! bound. Region and notes are compared for drift; neither can be changed
//! through the API, so drift is reported and left alone.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use kube::ResourceExt;
use tracing::{debug, info};

use super::connector::PlanetScaleResource;
use super::context::OpContext;
use super::external::{
    ConnectionDetails, ExternalClient, ExternalCreation, ExternalError, ExternalObservation,
    ExternalUpdate, Readiness,
};
use crate::crd::{Database, DatabaseObservation, DatabaseParameters, Managed};
use crate::observability::metrics;
use crate::provider::planetscale::{CreateDatabaseRequest, DatabaseInfo, PlanetScaleApi};

const KIND: &str = "Database";
const READY_STATE: &str = "ready";

impl PlanetScaleResource for Database {
    fn external_client(api: Arc<dyn PlanetScaleApi>) -> Box<dyn ExternalClient<Self>> {
        Box::new(DatabaseClient::new(api))
    }
}

/// External client for PlanetScale databases
#[derive(Debug, Clone)]
pub struct DatabaseClient {
    api: Arc<dyn PlanetScaleApi>,
}

impl DatabaseClient {
    pub fn new(api: Arc<dyn PlanetScaleApi>) -> Self {
        Self { api }
    }
}

/// External database name of a managed Database
pub fn database_name(mg: &Database) -> String {
    mg.external_name()
        .map_or_else(|| mg.name_any(), str::to_string)
}

pub fn observation(db: &DatabaseInfo) -> DatabaseObservation {
    DatabaseObservation {
        state: db.state.clone(),
        region: db.region_slug().map(str::to_string),
        html_url: db.html_url.clone(),
        created_at: db.created_at.clone(),
    }
}

/// Unset parameters express no preference
pub fn is_up_to_date(params: &DatabaseParameters, db: &DatabaseInfo) -> bool {
    let region_matches = params
        .region
        .as_deref()
        .map_or(true, |region| db.region_slug() == Some(region));
    let notes_match = params
        .notes
        .as_deref()
        .map_or(true, |notes| db.notes.as_deref().unwrap_or_default() == notes);
    region_matches && notes_match
}

pub fn readiness(db: &DatabaseInfo) -> Readiness {
    match db.state.as_deref() {
        Some(READY_STATE) => Readiness::Available,
        Some(state) => Readiness::Unavailable(format!("database is {state}")),
        None => Readiness::Unavailable("database state unknown".to_string()),
    }
}

#[async_trait]
impl ExternalClient<Database> for DatabaseClient {
    async fn observe(
        &self,
        ctx: &OpContext,
        mg: &Database,
    ) -> Result<ExternalObservation<DatabaseObservation>, ExternalError> {
        let organization = &mg.spec.for_provider.organization;
        let name = database_name(mg);
        let start = Instant::now();
        let result = ctx.run(self.api.get_database(organization, &name)).await;
        metrics::record_external_operation(
            KIND,
            "observe",
            result.is_ok() || result.as_ref().is_err_and(|e| e.is_not_found()),
            start.elapsed().as_secs_f64(),
        );

        let db = match result {
            Ok(db) => db,
            Err(e) if e.is_not_found() => {
                debug!(database = %name, "Database does not exist");
                return Ok(ExternalObservation::absent());
            }
            Err(e) => return Err(e.into()),
        };

        let mut observed = ExternalObservation::present(
            is_up_to_date(&mg.spec.for_provider, &db),
            readiness(&db),
            observation(&db),
        );
        if mg.external_name().is_none() {
            observed.external_name = Some(db.name.clone());
        }
        Ok(observed)
    }

    async fn create(
        &self,
        ctx: &OpContext,
        mg: &Database,
    ) -> Result<ExternalCreation<DatabaseObservation>, ExternalError> {
        let params = &mg.spec.for_provider;
        let request = CreateDatabaseRequest {
            name: database_name(mg),
            region: params.region.clone(),
            notes: params.notes.clone(),
        };

        let start = Instant::now();
        let result = ctx
            .run(self.api.create_database(&params.organization, &request))
            .await;
        metrics::record_external_operation(
            KIND,
            "create",
            result.is_ok(),
            start.elapsed().as_secs_f64(),
        );

        let db = match result {
            Ok(db) => db,
            Err(e) if e.is_already_exists() => {
                info!(database = %request.name, "Database already exists, adopting it");
                ctx.run(self.api.get_database(&params.organization, &request.name))
                    .await?
            }
            Err(e) => return Err(e.into()),
        };

        Ok(ExternalCreation {
            external_name: Some(db.name.clone()),
            at_provider: Some(observation(&db)),
            connection_details: ConnectionDetails::new(),
        })
    }

    async fn update(
        &self,
        _ctx: &OpContext,
        mg: &Database,
    ) -> Result<ExternalUpdate, ExternalError> {
        debug!(
            database = %database_name(mg),
            "Database parameters drifted; PlanetScale offers no update for them"
        );
        Ok(ExternalUpdate::default())
    }

    async fn delete(&self, ctx: &OpContext, mg: &Database) -> Result<(), ExternalError> {
        let organization = &mg.spec.for_provider.organization;
        let name = database_name(mg);
        let start = Instant::now();
        let result = ctx.run(self.api.delete_database(organization, &name)).await;
        metrics::record_external_operation(
            KIND,
            "delete",
            result.is_ok() || result.as_ref().is_err_and(|e| e.is_not_found()),
            start.elapsed().as_secs_f64(),
        );
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!(database = %name, "Database already gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
