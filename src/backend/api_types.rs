//! Serde types matching the backend's REST and auth responses.
//!
//! These types are separate from domain types to allow clean deserialization
//! while keeping domain types focused on application needs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{
  Asset, AssetRef, CommentStatus, Machine, NewRepair, Repair, RepairComment, RepairStatus, Role,
  User, Vehicle,
};
use crate::error::BackendError;

// ============================================================================
// Table rows
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiRepair {
  pub id: String,
  pub vehicle_id: Option<String>,
  pub machine_id: Option<String>,
  pub mechanic_id: String,
  pub status: RepairStatus,
  #[serde(default)]
  pub description: String,
  pub started_at: DateTime<Utc>,
  pub completed_at: Option<DateTime<Utc>>,
  pub created_at: DateTime<Utc>,
  // Embedded relations, present when selected
  #[serde(default)]
  pub vehicle: Option<Vehicle>,
  #[serde(default)]
  pub machine: Option<Machine>,
}

impl ApiRepair {
  /// Convert into a domain repair, enforcing that exactly one asset is referenced.
  pub fn into_domain(self) -> Result<Repair, BackendError> {
    let asset_ref = match (self.vehicle_id, self.machine_id) {
      (Some(v), None) => AssetRef::Vehicle(v),
      (None, Some(m)) => AssetRef::Machine(m),
      (Some(_), Some(_)) => {
        return Err(BackendError::Malformed {
          table: "repairs",
          id: self.id,
          reason: "references both a vehicle and a machine",
        })
      }
      (None, None) => {
        return Err(BackendError::Malformed {
          table: "repairs",
          id: self.id,
          reason: "references no asset",
        })
      }
    };

    let asset = match &asset_ref {
      AssetRef::Vehicle(_) => self.vehicle.map(Asset::Vehicle),
      AssetRef::Machine(_) => self.machine.map(Asset::Machine),
    };

    Ok(Repair {
      id: self.id,
      asset_ref,
      mechanic_id: self.mechanic_id,
      status: self.status,
      description: self.description,
      started_at: self.started_at,
      completed_at: self.completed_at,
      created_at: self.created_at,
      asset,
    })
  }
}

/// Convert a batch of rows, logging and skipping any that break the asset invariant.
pub fn repairs_from_rows(rows: Vec<ApiRepair>) -> Vec<Repair> {
  rows
    .into_iter()
    .filter_map(|row| match row.into_domain() {
      Ok(repair) => Some(repair),
      Err(e) => {
        tracing::warn!("Skipping repair: {}", e);
        None
      }
    })
    .collect()
}

#[derive(Debug, Deserialize)]
pub struct ApiComment {
  pub id: String,
  pub repair_id: String,
  pub user_id: String,
  #[serde(default)]
  pub comment: String,
  pub status: CommentStatus,
  pub created_at: DateTime<Utc>,
  pub updated_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub user: Option<User>,
  #[serde(default)]
  pub repair: Option<ApiRepair>,
}

impl ApiComment {
  pub fn into_domain(self) -> RepairComment {
    let repair = self.repair.and_then(|r| match r.into_domain() {
      Ok(repair) => Some(repair),
      Err(e) => {
        tracing::warn!(comment = %self.id, "Ignoring embedded repair: {}", e);
        None
      }
    });

    RepairComment {
      id: self.id,
      repair_id: self.repair_id,
      user_id: self.user_id,
      comment: self.comment,
      status: self.status,
      created_at: self.created_at,
      updated_at: self.updated_at,
      author: self.user,
      repair,
    }
  }
}

/// Row shape for `select=status`
#[derive(Debug, Deserialize)]
pub struct ApiStatusRow {
  pub status: RepairStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiSetting {
  pub value: String,
}

// ============================================================================
// Insert payloads
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ApiNewRepair<'a> {
  pub mechanic_id: &'a str,
  pub description: &'a str,
  pub status: RepairStatus,
  pub started_at: DateTime<Utc>,
  pub vehicle_id: Option<&'a str>,
  pub machine_id: Option<&'a str>,
}

impl<'a> ApiNewRepair<'a> {
  /// Build the insert row for an already validated repair.
  pub fn new(repair: &'a NewRepair, mechanic_id: &'a str, now: DateTime<Utc>) -> Option<Self> {
    let (vehicle_id, machine_id) = repair.asset.as_ref()?.columns();
    Some(Self {
      mechanic_id,
      description: repair.description.trim(),
      status: RepairStatus::Pending,
      started_at: now,
      vehicle_id,
      machine_id,
    })
  }
}

#[derive(Debug, Serialize)]
pub struct ApiNewComment<'a> {
  pub repair_id: &'a str,
  pub user_id: &'a str,
  pub comment: &'a str,
  pub status: CommentStatus,
}

// ============================================================================
// Auth
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ApiPasswordGrant<'a> {
  pub email: &'a str,
  pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ApiRefreshGrant<'a> {
  pub refresh_token: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ApiSignUp<'a> {
  pub email: &'a str,
  pub password: &'a str,
  pub data: ApiSignUpMetadata<'a>,
}

#[derive(Debug, Serialize)]
pub struct ApiSignUpMetadata<'a> {
  pub full_name: &'a str,
  pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct ApiAuthUser {
  pub id: String,
  #[serde(default)]
  pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiSession {
  pub access_token: String,
  pub refresh_token: String,
  #[serde(default)]
  pub expires_in: i64,
  pub expires_at: Option<i64>,
  pub user: ApiAuthUser,
}

/// Sign-up either returns a session (auto-confirm) or just the new user
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiSignUpResponse {
  Session(ApiSession),
  User(ApiAuthUser),
}

impl ApiSignUpResponse {
  pub fn user_id(&self) -> &str {
    match self {
      ApiSignUpResponse::Session(s) => &s.user.id,
      ApiSignUpResponse::User(u) => &u.id,
    }
  }
}

// ============================================================================
// Errors
// ============================================================================

/// Error body; the REST and auth services each use a different field
#[derive(Debug, Default, Deserialize)]
pub struct ApiErrorBody {
  pub message: Option<String>,
  pub msg: Option<String>,
  pub error_description: Option<String>,
  pub error: Option<String>,
}

impl ApiErrorBody {
  pub fn into_message(self) -> Option<String> {
    self
      .message
      .or(self.msg)
      .or(self.error_description)
      .or(self.error)
  }
}

/// Extract a human readable message from an error response body.
pub fn error_message(body: &str) -> String {
  serde_json::from_str::<ApiErrorBody>(body)
    .ok()
    .and_then(ApiErrorBody::into_message)
    .unwrap_or_else(|| body.trim().to_string())
}
