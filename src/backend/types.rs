//! Domain types for the workshop.
//!
//! These are the shapes the rest of the application works with. Wire
//! representations live in `api_types` and are converted into these.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{TransitionError, ValidationError};

/// Application role attached to every user profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
  Admin,
  Mechanic,
}

impl Role {
  pub fn label(&self) -> &'static str {
    match self {
      Role::Admin => "Administrator",
      Role::Mechanic => "Mechanic",
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Role::Admin => "admin",
      Role::Mechanic => "mechanic",
    }
  }
}

/// User profile row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
  pub id: String,
  pub email: String,
  pub role: Role,
  pub full_name: String,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleType {
  Truck,
  Vehicle,
  Equipment,
}

impl VehicleType {
  pub const ALL: [VehicleType; 3] = [VehicleType::Truck, VehicleType::Vehicle, VehicleType::Equipment];

  pub fn label(&self) -> &'static str {
    match self {
      VehicleType::Truck => "Truck",
      VehicleType::Vehicle => "Vehicle",
      VehicleType::Equipment => "Equipment",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
  pub id: String,
  pub code: String,
  #[serde(rename = "type")]
  pub vehicle_type: VehicleType,
  pub brand: String,
  pub model: String,
  pub year: i32,
  pub serial_number: String,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Machine {
  pub id: String,
  pub code: String,
  pub plant: String,
  pub name: String,
  pub serial_number: String,
  pub created_at: DateTime<Utc>,
}

/// Something that can be repaired
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Asset {
  Vehicle(Vehicle),
  Machine(Machine),
}

impl Asset {
  pub fn id(&self) -> &str {
    match self {
      Asset::Vehicle(v) => &v.id,
      Asset::Machine(m) => &m.id,
    }
  }

  pub fn code(&self) -> &str {
    match self {
      Asset::Vehicle(v) => &v.code,
      Asset::Machine(m) => &m.code,
    }
  }

  /// Human readable name without the code
  pub fn name(&self) -> String {
    match self {
      Asset::Vehicle(v) => format!("{} {}", v.brand, v.model),
      Asset::Machine(m) => m.name.clone(),
    }
  }

  /// "CODE - name", used in lists, pickers and reports
  pub fn label(&self) -> String {
    format!("{} - {}", self.code(), self.name())
  }

  pub fn asset_ref(&self) -> AssetRef {
    match self {
      Asset::Vehicle(v) => AssetRef::Vehicle(v.id.clone()),
      Asset::Machine(m) => AssetRef::Machine(m.id.clone()),
    }
  }
}

/// Foreign reference from a repair to exactly one asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum AssetRef {
  Vehicle(String),
  Machine(String),
}

impl AssetRef {
  pub fn id(&self) -> &str {
    match self {
      AssetRef::Vehicle(id) | AssetRef::Machine(id) => id,
    }
  }

  pub fn is_vehicle(&self) -> bool {
    matches!(self, AssetRef::Vehicle(_))
  }

  /// Split into the `(vehicle_id, machine_id)` column pair
  pub fn columns(&self) -> (Option<&str>, Option<&str>) {
    match self {
      AssetRef::Vehicle(id) => (Some(id), None),
      AssetRef::Machine(id) => (None, Some(id)),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairStatus {
  Pending,
  InProgress,
  Completed,
}

impl RepairStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      RepairStatus::Pending => "pending",
      RepairStatus::InProgress => "in_progress",
      RepairStatus::Completed => "completed",
    }
  }

  pub fn label(&self) -> &'static str {
    match self {
      RepairStatus::Pending => "Pending",
      RepairStatus::InProgress => "In progress",
      RepairStatus::Completed => "Completed",
    }
  }

  /// The only status this one may move to
  pub fn next(&self) -> Option<RepairStatus> {
    match self {
      RepairStatus::Pending => Some(RepairStatus::InProgress),
      RepairStatus::InProgress => Some(RepairStatus::Completed),
      RepairStatus::Completed => None,
    }
  }

  pub fn is_active(&self) -> bool {
    !matches!(self, RepairStatus::Completed)
  }
}

impl fmt::Display for RepairStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repair {
  pub id: String,
  pub asset_ref: AssetRef,
  pub mechanic_id: String,
  pub status: RepairStatus,
  pub description: String,
  pub started_at: DateTime<Utc>,
  pub completed_at: Option<DateTime<Utc>>,
  pub created_at: DateTime<Utc>,
  /// Embedded asset row, present when the query asked for it
  pub asset: Option<Asset>,
}

/// Column patch sent when a repair changes status.
///
/// `completed_at` is always serialized so that moving to a non-final
/// status clears it on the backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusPatch {
  pub status: RepairStatus,
  pub completed_at: Option<DateTime<Utc>>,
}

impl Repair {
  /// Validate a status change and build the patch for it.
  pub fn transition_to(
    &self,
    next: RepairStatus,
    now: DateTime<Utc>,
  ) -> Result<StatusPatch, TransitionError> {
    if self.status.next() != Some(next) {
      return Err(TransitionError::Repair {
        from: self.status,
        to: next,
      });
    }
    Ok(StatusPatch {
      status: next,
      completed_at: (next == RepairStatus::Completed).then_some(now),
    })
  }

  /// Local copy of the row after the backend accepted `patch`.
  pub fn apply(&mut self, patch: &StatusPatch) {
    self.status = patch.status;
    self.completed_at = patch.completed_at;
  }

  pub fn asset_label(&self) -> String {
    self
      .asset
      .as_ref()
      .map(Asset::label)
      .unwrap_or_else(|| "N/A".to_string())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentStatus {
  Pending,
  Read,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairComment {
  pub id: String,
  pub repair_id: String,
  pub user_id: String,
  pub comment: String,
  pub status: CommentStatus,
  pub created_at: DateTime<Utc>,
  pub updated_at: Option<DateTime<Utc>>,
  pub author: Option<User>,
  pub repair: Option<Repair>,
}

/// Patch sent when a comment is acknowledged
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadPatch {
  pub status: CommentStatus,
  pub updated_at: DateTime<Utc>,
}

impl RepairComment {
  pub fn mark_read(&self, now: DateTime<Utc>) -> Result<ReadPatch, TransitionError> {
    if self.status != CommentStatus::Pending {
      return Err(TransitionError::CommentAlreadyRead);
    }
    Ok(ReadPatch {
      status: CommentStatus::Read,
      updated_at: now,
    })
  }
}

/// Repair counts per status for the dashboard
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairStats {
  pub pending: usize,
  pub in_progress: usize,
  pub completed: usize,
}

impl RepairStats {
  pub fn count<I: IntoIterator<Item = RepairStatus>>(statuses: I) -> Self {
    statuses
      .into_iter()
      .fold(Self::default(), |mut stats, status| {
        match status {
          RepairStatus::Pending => stats.pending += 1,
          RepairStatus::InProgress => stats.in_progress += 1,
          RepairStatus::Completed => stats.completed += 1,
        }
        stats
      })
  }
}

// ============================================================================
// Creation payloads
// ============================================================================

fn required(field: &'static str, value: &str) -> Result<(), ValidationError> {
  if value.trim().is_empty() {
    Err(ValidationError::Missing(field))
  } else {
    Ok(())
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewVehicle {
  pub code: String,
  #[serde(rename = "type")]
  pub vehicle_type: VehicleType,
  pub brand: String,
  pub model: String,
  pub year: i32,
  pub serial_number: String,
}

impl NewVehicle {
  pub fn validate(&self) -> Result<(), ValidationError> {
    required("code", &self.code)?;
    required("brand", &self.brand)?;
    required("model", &self.model)?;
    required("serial number", &self.serial_number)?;
    if !(1900..=2100).contains(&self.year) {
      return Err(ValidationError::Invalid {
        field: "year",
        reason: format!("{} is not a plausible model year", self.year),
      });
    }
    Ok(())
  }
}

/// Machine codes are assigned by the backend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewMachine {
  pub plant: String,
  pub name: String,
  pub serial_number: String,
}

impl NewMachine {
  pub fn validate(&self) -> Result<(), ValidationError> {
    required("plant", &self.plant)?;
    required("name", &self.name)?;
    required("serial number", &self.serial_number)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewRepair {
  pub asset: Option<AssetRef>,
  pub description: String,
}

impl NewRepair {
  pub fn validate(&self) -> Result<(), ValidationError> {
    match &self.asset {
      None => return Err(ValidationError::Missing("asset")),
      Some(asset) if asset.id().is_empty() => return Err(ValidationError::Missing("asset")),
      Some(_) => {}
    }
    required("description", &self.description)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewComment {
  pub repair_id: String,
  pub comment: String,
}

impl NewComment {
  pub fn validate(&self) -> Result<(), ValidationError> {
    required("repair", &self.repair_id)?;
    required("comment", &self.comment)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
  pub email: String,
  pub password: String,
  pub full_name: String,
  pub role: Role,
}

impl NewUser {
  pub fn validate(&self) -> Result<(), ValidationError> {
    required("email", &self.email)?;
    required("password", &self.password)?;
    required("full name", &self.full_name)?;
    if !self.email.contains('@') {
      return Err(ValidationError::Invalid {
        field: "email",
        reason: "must be an email address".to_string(),
      });
    }
    if self.password.chars().count() < 6 {
      return Err(ValidationError::Invalid {
        field: "password",
        reason: "must be at least 6 characters".to_string(),
      });
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn ts(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 12, hour, 0, 0).unwrap()
  }

  fn repair(status: RepairStatus) -> Repair {
    Repair {
      id: "r1".to_string(),
      asset_ref: AssetRef::Vehicle("v1".to_string()),
      mechanic_id: "m1".to_string(),
      status,
      description: "Cambio de aceite".to_string(),
      started_at: ts(8),
      completed_at: None,
      created_at: ts(8),
      asset: None,
    }
  }

  #[test]
  fn test_repair_moves_forward_only() {
    assert_eq!(RepairStatus::Pending.next(), Some(RepairStatus::InProgress));
    assert_eq!(RepairStatus::InProgress.next(), Some(RepairStatus::Completed));
    assert_eq!(RepairStatus::Completed.next(), None);

    let err = repair(RepairStatus::InProgress)
      .transition_to(RepairStatus::Pending, ts(9))
      .unwrap_err();
    assert!(matches!(err, TransitionError::Repair { .. }));

    // skipping a step is not allowed either
    assert!(repair(RepairStatus::Pending)
      .transition_to(RepairStatus::Completed, ts(9))
      .is_err());
  }

  #[test]
  fn test_completed_at_only_set_on_completion() {
    let start = repair(RepairStatus::Pending)
      .transition_to(RepairStatus::InProgress, ts(9))
      .unwrap();
    assert_eq!(start.completed_at, None);

    let finish = repair(RepairStatus::InProgress)
      .transition_to(RepairStatus::Completed, ts(10))
      .unwrap();
    assert_eq!(finish.completed_at, Some(ts(10)));
  }

  #[test]
  fn test_status_patch_serializes_null_completion() {
    let patch = StatusPatch {
      status: RepairStatus::InProgress,
      completed_at: None,
    };
    let json = serde_json::to_value(&patch).unwrap();
    assert_eq!(json["status"], "in_progress");
    assert!(json["completed_at"].is_null());
    assert!(json.as_object().unwrap().contains_key("completed_at"));
  }

  #[test]
  fn test_comment_read_is_one_way() {
    let mut comment = RepairComment {
      id: "c1".to_string(),
      repair_id: "r1".to_string(),
      user_id: "u1".to_string(),
      comment: "Falta repuesto".to_string(),
      status: CommentStatus::Pending,
      created_at: ts(8),
      updated_at: None,
      author: None,
      repair: None,
    };
    let patch = comment.mark_read(ts(9)).unwrap();
    assert_eq!(patch.status, CommentStatus::Read);

    comment.status = CommentStatus::Read;
    assert!(matches!(
      comment.mark_read(ts(10)),
      Err(TransitionError::CommentAlreadyRead)
    ));
  }

  #[test]
  fn test_asset_labels() {
    let vehicle = Asset::Vehicle(Vehicle {
      id: "v1".to_string(),
      code: "CAM-01".to_string(),
      vehicle_type: VehicleType::Truck,
      brand: "Volvo".to_string(),
      model: "FH16".to_string(),
      year: 2020,
      serial_number: "SN1".to_string(),
      created_at: ts(1),
    });
    let machine = Asset::Machine(Machine {
      id: "m1".to_string(),
      code: "MAQ-07".to_string(),
      plant: "Norte".to_string(),
      name: "Compresor".to_string(),
      serial_number: "SN2".to_string(),
      created_at: ts(1),
    });

    assert_eq!(vehicle.label(), "CAM-01 - Volvo FH16");
    assert_eq!(machine.label(), "MAQ-07 - Compresor");
    assert!(vehicle.asset_ref().is_vehicle());
    assert_eq!(machine.asset_ref().columns(), (None, Some("m1")));
  }

  #[test]
  fn test_stats_count() {
    let stats = RepairStats::count([
      RepairStatus::Pending,
      RepairStatus::Completed,
      RepairStatus::Pending,
      RepairStatus::InProgress,
    ]);
    assert_eq!(
      stats,
      RepairStats {
        pending: 2,
        in_progress: 1,
        completed: 1
      }
    );
  }

  #[test]
  fn test_new_repair_requires_asset_and_description() {
    let mut new_repair = NewRepair {
      asset: None,
      description: "Cambio de aceite".to_string(),
    };
    assert_eq!(
      new_repair.validate(),
      Err(ValidationError::Missing("asset"))
    );

    new_repair.asset = Some(AssetRef::Machine("m1".to_string()));
    new_repair.description = "   ".to_string();
    assert_eq!(
      new_repair.validate(),
      Err(ValidationError::Missing("description"))
    );

    new_repair.description = "Cambio de aceite".to_string();
    assert!(new_repair.validate().is_ok());
  }

  #[test]
  fn test_new_user_validation() {
    let user = NewUser {
      email: "mecanico@taller.com".to_string(),
      password: "123".to_string(),
      full_name: "Juan".to_string(),
      role: Role::Mechanic,
    };
    assert!(matches!(
      user.validate(),
      Err(ValidationError::Invalid {
        field: "password",
        ..
      })
    ));
  }
}
