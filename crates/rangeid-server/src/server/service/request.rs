//! JSON shapes of the `/v2` endpoints and their conversion into library
//! requests.
//!
//! Conversion is where requests are validated: by the time a request reaches
//! a service its ranges and ids are well formed and within server limits.

use rangeid::{
    AllocatedId, AllocationRequest, AllocationResponse, AssignmentRequest, Consumption, Range,
    StorageKey, SyncMode, SyncRequest, validate_ranges,
};
use serde::{Deserialize, Serialize};

use crate::server::error::{ApiError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetNextRequest {
    pub app_id: String,
    /// Storage key, either `category` or `category_parentId`.
    #[serde(rename = "type")]
    pub key: StorageKey,
    pub ranges: Vec<Range>,
    #[serde(default)]
    pub per_range: bool,
    pub require: Option<u32>,
    #[serde(default)]
    pub redirect_extensions: bool,
    pub user: Option<String>,
}

impl GetNextRequest {
    pub fn into_allocation(self, reserve: bool, max_ranges: usize) -> Result<AllocationRequest> {
        validate_app_id(&self.app_id)?;
        if self.ranges.len() > max_ranges {
            return Err(ApiError::invalid(format!(
                "{} ranges exceed the limit of {max_ranges}",
                self.ranges.len()
            )));
        }
        validate_ranges(&self.ranges)?;
        self.key.validate()?;
        if self.require == Some(0) {
            return Err(rangeid::Error::InvalidId(0).into());
        }

        let mut request = AllocationRequest::new(self.app_id, self.key, self.ranges)
            .redirect_extensions(self.redirect_extensions)
            .reserve(reserve);
        if self.per_range {
            request = request.per_range();
        }
        if let Some(required) = self.require {
            request = request.require(required);
        }
        if let Some(user) = self.user {
            request = request.with_user(user);
        }
        Ok(request)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetNextResponse {
    pub id: AllocatedId,
    pub available: bool,
    pub updated: bool,
    pub update_attempts: u32,
    pub has_consumption: bool,
}

impl From<AllocationResponse> for GetNextResponse {
    fn from(response: AllocationResponse) -> Self {
        Self {
            id: response.id,
            available: response.available,
            updated: response.updated,
            update_attempts: response.attempts,
            has_consumption: response.had_prior_consumption,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreAssignmentRequest {
    pub app_id: String,
    /// Object category, e.g. `table`.
    #[serde(rename = "type")]
    pub object_type: String,
    /// Object id, or the parent object id when `field_id` is set.
    pub id: u32,
    /// Id of a field nested in the object `id`.
    pub field_id: Option<u32>,
    #[serde(default)]
    pub redirect_extensions: bool,
    pub user: Option<String>,
}

impl StoreAssignmentRequest {
    /// Resolves the storage key and the id to record under it.
    pub fn into_assignment(self) -> Result<AssignmentRequest> {
        validate_app_id(&self.app_id)?;
        if self.object_type.is_empty() {
            return Err(ApiError::invalid("type must not be empty"));
        }
        if self.id == 0 || self.field_id == Some(0) {
            return Err(rangeid::Error::InvalidId(0).into());
        }

        let (mut key, id) = match self.field_id {
            Some(field_id) => (StorageKey::nested(self.object_type, self.id), field_id),
            None => (StorageKey::object(self.object_type), self.id),
        };
        if self.redirect_extensions {
            key = key.redirect_extension();
        }
        key.validate()?;

        let mut request = AssignmentRequest::new(self.app_id, key, id);
        if let Some(user) = self.user {
            request = request.with_user(user);
        }
        Ok(request)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncIdsRequest {
    pub app_id: String,
    pub ids: Consumption,
    /// Union with stored consumption instead of replacing it.
    #[serde(default)]
    pub merge: bool,
    pub user: Option<String>,
}

impl SyncIdsRequest {
    pub fn into_sync(self) -> Result<SyncRequest> {
        validate_app_id(&self.app_id)?;
        if self.ids.values().flatten().any(|&id| id == 0) {
            return Err(rangeid::Error::InvalidId(0).into());
        }
        for key in self.ids.keys() {
            key.validate()?;
        }

        let mode = if self.merge {
            SyncMode::Merge
        } else {
            SyncMode::Replace
        };
        let mut request = SyncRequest::new(self.app_id, self.ids, mode);
        if let Some(user) = self.user {
            request = request.with_user(user);
        }
        Ok(request)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatedResponse {
    pub updated: bool,
}

pub fn validate_app_id(app_id: &str) -> Result<()> {
    if app_id.is_empty() {
        return Err(ApiError::invalid("appId must not be empty"));
    }
    Ok(())
}
