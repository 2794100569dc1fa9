//! HTTP handlers for ID allocation and assignment.
//!
//! [`LedgerApi`] owns one [`AllocationService`] and one
//! [`AssignmentService`] over the same store and snapshot cache. Handlers are
//! thin: they validate the JSON body, call a service, and shape the result.
//! All coordination between concurrent requests happens in the store's
//! conditional writes, so handlers share no mutable state.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use rangeid::{AllocationService, AssignmentService, ConsumptionLedger, SnapshotCache};

use super::request::{
    GetNextRequest, GetNextResponse, StoreAssignmentRequest, SyncIdsRequest, UpdatedResponse,
    validate_app_id,
};
use crate::server::{config::ServerConfig, error::Result, store::ServerStore};

/// Shared state of all routes.
#[derive(Debug, Clone)]
pub struct LedgerApi {
    allocation: AllocationService<Arc<ServerStore>>,
    assignment: AssignmentService<Arc<ServerStore>>,
    max_ranges: usize,
}

impl LedgerApi {
    pub fn new(store: ServerStore, config: &ServerConfig) -> Self {
        let store = Arc::new(store);
        let mut allocation =
            AllocationService::new(Arc::clone(&store)).with_policy(config.policy);
        let mut assignment = AssignmentService::new(store).with_policy(config.policy);

        if config.cache_snapshots {
            let cache = Arc::new(SnapshotCache::new());
            allocation = allocation.with_cache(Arc::clone(&cache));
            assignment = assignment.with_cache(cache);
        }

        Self {
            allocation,
            assignment,
            max_ranges: config.max_ranges,
        }
    }
}

/// Builds the router serving every endpoint over `api`.
pub fn router(api: LedgerApi) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v2/getNext", get(probe_next).post(reserve_next))
        .route(
            "/v2/storeAssignment",
            axum::routing::post(store_assignment).delete(remove_assignment),
        )
        .route("/v2/syncIds", axum::routing::post(sync_ids))
        .route("/v2/consumption/{app_id}", get(consumption))
        .with_state(api)
}

async fn health() -> &'static str {
    "ok"
}

async fn probe_next(
    State(api): State<LedgerApi>,
    Json(body): Json<GetNextRequest>,
) -> Result<Json<GetNextResponse>> {
    next(&api, body, false).await
}

async fn reserve_next(
    State(api): State<LedgerApi>,
    Json(body): Json<GetNextRequest>,
) -> Result<Json<GetNextResponse>> {
    next(&api, body, true).await
}

#[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(app_id = %body.app_id, key = %body.key, reserve = reserve)))]
async fn next(api: &LedgerApi, body: GetNextRequest, reserve: bool) -> Result<Json<GetNextResponse>> {
    let request = body.into_allocation(reserve, api.max_ranges)?;
    let response = api.allocation.allocate(&request).await?;
    Ok(Json(response.into()))
}

#[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(app_id = %body.app_id, id = body.id)))]
async fn store_assignment(
    State(api): State<LedgerApi>,
    Json(body): Json<StoreAssignmentRequest>,
) -> Result<Json<UpdatedResponse>> {
    let request = body.into_assignment()?;
    let response = api.assignment.store(&request).await?;
    Ok(Json(UpdatedResponse {
        updated: response.updated,
    }))
}

#[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(app_id = %body.app_id, id = body.id)))]
async fn remove_assignment(
    State(api): State<LedgerApi>,
    Json(body): Json<StoreAssignmentRequest>,
) -> Result<Json<UpdatedResponse>> {
    let request = body.into_assignment()?;
    let response = api.assignment.remove(&request).await?;
    Ok(Json(UpdatedResponse {
        updated: response.updated,
    }))
}

#[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(app_id = %body.app_id, merge = body.merge)))]
async fn sync_ids(
    State(api): State<LedgerApi>,
    Json(body): Json<SyncIdsRequest>,
) -> Result<Json<UpdatedResponse>> {
    let request = body.into_sync()?;
    let response = api.assignment.synchronize(&request).await?;
    Ok(Json(UpdatedResponse {
        updated: response.updated,
    }))
}

#[cfg_attr(feature = "tracing", tracing::instrument(skip(api)))]
async fn consumption(
    State(api): State<LedgerApi>,
    Path(app_id): Path<String>,
) -> Result<Json<ConsumptionLedger>> {
    validate_app_id(&app_id)?;
    Ok(Json(api.allocation.consumption(&app_id).await?))
}
