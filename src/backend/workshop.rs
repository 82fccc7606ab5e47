//! Data access used by the views.
//!
//! Reads go through the [`CacheLayer`] under fixed keys so that a failed
//! request can fall back to the last good payload. Writes go straight to the
//! backend; once one succeeds, the cached reads it affects are edited to
//! match or dropped, so no screen serves the pre-write rows.

use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};

use super::api_types::{
  repairs_from_rows, ApiComment, ApiNewComment, ApiNewRepair, ApiRepair, ApiSetting, ApiStatusRow,
};
use super::client::{BackendClient, Order, TableQuery};
use super::types::{
  CommentStatus, Machine, NewComment, NewMachine, NewRepair, NewUser, NewVehicle, Repair,
  RepairComment, RepairStats, RepairStatus, StatusPatch, User, Vehicle,
};
use crate::cache::{CacheLayer, CacheResult, FetchOptions};
use crate::error::{AuthError, BackendError};

const REPAIR_WITH_ASSET: &str = "*, vehicle:vehicles(*), machine:machines(*)";
const COMMENT_WITH_CONTEXT: &str =
  "*, user:users(*), repair:repairs(*, vehicle:vehicles(*), machine:machines(*))";

const USERS_KEY: &str = "dashboard-users";
const STATS_KEY: &str = "dashboard-repairs-stats";
const ACTIVE_REPAIRS_KEY: &str = "repairs-active";
const HISTORY_REPAIRS_KEY: &str = "history-repairs";
const PENDING_COMMENTS_KEY: &str = "pending-comments";

/// Which screen a shared read belongs to. Each screen keeps its own cache
/// entries for the asset lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
  Dashboard,
  Repairs,
  History,
}

impl Scope {
  fn prefix(&self) -> &'static str {
    match self {
      Scope::Dashboard => "dashboard",
      Scope::Repairs => "repairs",
      Scope::History => "history",
    }
  }

  pub fn key(&self, what: &str) -> String {
    format!("{}-{}", self.prefix(), what)
  }

  const ALL: [Scope; 3] = [Scope::Dashboard, Scope::Repairs, Scope::History];
}

/// Everything the admin dashboard shows
#[derive(Debug, Clone)]
pub struct DashboardData {
  pub users: Vec<User>,
  pub vehicles: Vec<Vehicle>,
  pub machines: Vec<Machine>,
  pub stats: RepairStats,
  /// At least one part came from a stale cache fallback
  pub stale: bool,
}

#[derive(Debug, Clone)]
pub struct RepairsData {
  pub vehicles: Vec<Vehicle>,
  pub machines: Vec<Machine>,
  pub repairs: Vec<Repair>,
  pub stale: bool,
}

#[derive(Debug, Clone)]
pub struct HistoryData {
  pub vehicles: Vec<Vehicle>,
  pub machines: Vec<Machine>,
  pub repairs: Vec<Repair>,
  pub stale: bool,
}

/// Workshop operations over one backend client and one cache.
#[derive(Clone)]
pub struct WorkshopClient {
  backend: BackendClient,
  cache: CacheLayer,
}

impl WorkshopClient {
  pub fn new(backend: BackendClient, cache: CacheLayer) -> Self {
    Self { backend, cache }
  }

  pub fn backend(&self) -> &BackendClient {
    &self.backend
  }

  /// Forget every cached read, then end the session.
  ///
  /// The cache goes first so nothing of this user's data is served while
  /// the remote logout is pending. Reads still in flight are not stored.
  pub async fn sign_out(&self) {
    self.cache.clear();
    self.backend.sign_out().await;
  }

  async fn cached_select<T>(
    &self,
    key: &str,
    query: TableQuery,
    options: FetchOptions,
  ) -> Result<CacheResult<Vec<T>>, BackendError>
  where
    T: Serialize + DeserializeOwned,
  {
    let backend = &self.backend;
    let query = &query;
    self
      .cache
      .fetch(key, move || backend.select::<T>(query), options)
      .await
  }

  async fn cached_repairs(
    &self,
    key: &str,
    query: TableQuery,
    options: FetchOptions,
  ) -> Result<CacheResult<Vec<Repair>>, BackendError> {
    let backend = &self.backend;
    let query = &query;
    self
      .cache
      .fetch(
        key,
        move || async move {
          let rows: Vec<ApiRepair> = backend.select(query).await?;
          Ok(repairs_from_rows(rows))
        },
        options,
      )
      .await
  }

  // ==========================================================================
  // Reads
  // ==========================================================================

  /// Profile row of a user; always goes to the network first.
  pub async fn profile(&self, user_id: &str) -> Result<CacheResult<User>, BackendError> {
    let backend = &self.backend;
    let query = TableQuery::from("users").eq("id", user_id).limit(1);
    let query = &query;

    self
      .cache
      .fetch(
        &format!("user-{}", user_id),
        move || async move {
          let rows: Vec<User> = backend.select(query).await?;
          rows.into_iter().next().ok_or_else(|| BackendError::NotFound {
            what: "user",
            id: user_id.to_string(),
          })
        },
        FetchOptions::forced(),
      )
      .await
  }

  pub async fn dashboard_users(
    &self,
    options: FetchOptions,
  ) -> Result<CacheResult<Vec<User>>, BackendError> {
    let query = TableQuery::from("users").order("created_at", Order::Desc);
    self.cached_select(USERS_KEY, query, options).await
  }

  pub async fn vehicles(
    &self,
    scope: Scope,
    options: FetchOptions,
  ) -> Result<CacheResult<Vec<Vehicle>>, BackendError> {
    let query = TableQuery::from("vehicles").order("code", Order::Asc);
    self
      .cached_select(&scope.key("vehicles"), query, options)
      .await
  }

  pub async fn machines(
    &self,
    scope: Scope,
    options: FetchOptions,
  ) -> Result<CacheResult<Vec<Machine>>, BackendError> {
    let query = TableQuery::from("machines").order("code", Order::Asc);
    self
      .cached_select(&scope.key("machines"), query, options)
      .await
  }

  pub async fn repair_stats(
    &self,
    options: FetchOptions,
  ) -> Result<CacheResult<RepairStats>, BackendError> {
    let backend = &self.backend;
    let query = TableQuery::from("repairs").select("status");
    let query = &query;

    self
      .cache
      .fetch(
        STATS_KEY,
        move || async move {
          let rows: Vec<ApiStatusRow> = backend.select(query).await?;
          Ok(RepairStats::count(rows.into_iter().map(|r| r.status)))
        },
        options,
      )
      .await
  }

  /// Pending and in-progress repairs, newest first, with their asset
  pub async fn active_repairs(
    &self,
    options: FetchOptions,
  ) -> Result<CacheResult<Vec<Repair>>, BackendError> {
    let query = TableQuery::from("repairs")
      .select(REPAIR_WITH_ASSET)
      .in_list(
        "status",
        &[RepairStatus::Pending.as_str(), RepairStatus::InProgress.as_str()],
      )
      .order("created_at", Order::Desc);
    self.cached_repairs(ACTIVE_REPAIRS_KEY, query, options).await
  }

  /// Every repair, newest first, with its asset
  pub async fn repair_history(
    &self,
    options: FetchOptions,
  ) -> Result<CacheResult<Vec<Repair>>, BackendError> {
    let query = TableQuery::from("repairs")
      .select(REPAIR_WITH_ASSET)
      .order("created_at", Order::Desc);
    self.cached_repairs(HISTORY_REPAIRS_KEY, query, options).await
  }

  pub async fn pending_comments(
    &self,
    options: FetchOptions,
  ) -> Result<CacheResult<Vec<RepairComment>>, BackendError> {
    let backend = &self.backend;
    let query = TableQuery::from("repair_comments")
      .select(COMMENT_WITH_CONTEXT)
      .eq("status", "pending")
      .order("created_at", Order::Desc);
    let query = &query;

    self
      .cache
      .fetch(
        PENDING_COMMENTS_KEY,
        move || async move {
          let rows: Vec<ApiComment> = backend.select(query).await?;
          Ok(rows.into_iter().map(ApiComment::into_domain).collect())
        },
        options,
      )
      .await
  }

  /// Value of a row in `system_settings`, if present.
  pub async fn setting(&self, key: &str) -> Result<Option<String>, BackendError> {
    let query = TableQuery::from("system_settings")
      .select("value")
      .eq("key", key)
      .limit(1);
    let rows: CacheResult<Vec<ApiSetting>> = self
      .cached_select(&format!("setting-{}", key), query, FetchOptions::default())
      .await?;
    Ok(rows.data.into_iter().next().map(|s| s.value))
  }

  // Screen bundles, fetched in parallel

  pub async fn dashboard(&self, options: FetchOptions) -> Result<DashboardData, BackendError> {
    let (users, vehicles, machines, stats) = futures::try_join!(
      self.dashboard_users(options),
      self.vehicles(Scope::Dashboard, options),
      self.machines(Scope::Dashboard, options),
      self.repair_stats(options),
    )?;

    Ok(DashboardData {
      stale: users.is_stale() || vehicles.is_stale() || machines.is_stale() || stats.is_stale(),
      users: users.data,
      vehicles: vehicles.data,
      machines: machines.data,
      stats: stats.data,
    })
  }

  pub async fn repairs_screen(&self, options: FetchOptions) -> Result<RepairsData, BackendError> {
    let (vehicles, machines, repairs) = futures::try_join!(
      self.vehicles(Scope::Repairs, options),
      self.machines(Scope::Repairs, options),
      self.active_repairs(options),
    )?;

    Ok(RepairsData {
      stale: vehicles.is_stale() || machines.is_stale() || repairs.is_stale(),
      vehicles: vehicles.data,
      machines: machines.data,
      repairs: repairs.data,
    })
  }

  pub async fn history(&self, options: FetchOptions) -> Result<HistoryData, BackendError> {
    let (vehicles, machines, repairs) = futures::try_join!(
      self.vehicles(Scope::History, options),
      self.machines(Scope::History, options),
      self.repair_history(options),
    )?;

    Ok(HistoryData {
      stale: vehicles.is_stale() || machines.is_stale() || repairs.is_stale(),
      vehicles: vehicles.data,
      machines: machines.data,
      repairs: repairs.data,
    })
  }

  // ==========================================================================
  // Writes
  // ==========================================================================

  fn signed_in_user(&self) -> Result<String, BackendError> {
    self
      .backend
      .current_session()
      .map(|s| s.user_id)
      .ok_or(BackendError::NoSession)
  }

  pub async fn create_vehicle(&self, vehicle: &NewVehicle) -> Result<Vehicle, BackendError> {
    vehicle.validate()?;
    let created: Vec<Vehicle> = self.backend.insert("vehicles", &[vehicle]).await?;
    self.forget_scoped("vehicles");
    first_row("vehicles", created)
  }

  pub async fn create_machine(&self, machine: &NewMachine) -> Result<Machine, BackendError> {
    machine.validate()?;
    let created: Vec<Machine> = self.backend.insert("machines", &[machine]).await?;
    self.forget_scoped("machines");
    first_row("machines", created)
  }

  /// Open a repair assigned to the signed-in user, in `pending` status.
  pub async fn create_repair(&self, repair: &NewRepair) -> Result<Repair, BackendError> {
    repair.validate()?;
    let mechanic_id = self.signed_in_user()?;
    let row = ApiNewRepair::new(repair, &mechanic_id, Utc::now())
      .ok_or(crate::error::ValidationError::Missing("asset"))?;

    let created: Vec<ApiRepair> = self.backend.insert("repairs", &[row]).await?;
    self
      .cache
      .invalidate(&[ACTIVE_REPAIRS_KEY, HISTORY_REPAIRS_KEY, STATS_KEY]);
    let created = created
      .into_iter()
      .next()
      .ok_or_else(|| BackendError::NotFound {
        what: "inserted row in",
        id: "repairs".to_string(),
      })?;

    let repair = created.into_domain()?;
    tracing::info!(repair = %repair.id, "Repair created");
    Ok(repair)
  }

  /// pending -> in_progress
  pub async fn start_repair(&self, repair: &Repair) -> Result<(), BackendError> {
    self.transition(repair, RepairStatus::InProgress).await
  }

  /// in_progress -> completed, stamping the completion time
  pub async fn finish_repair(&self, repair: &Repair) -> Result<(), BackendError> {
    self.transition(repair, RepairStatus::Completed).await
  }

  async fn transition(&self, repair: &Repair, next: RepairStatus) -> Result<(), BackendError> {
    let patch = repair.transition_to(next, Utc::now())?;
    self
      .backend
      .update("repairs", "id", &repair.id, &patch)
      .await?;
    self.patch_cached_repair(&repair.id, &patch);
    tracing::info!(repair = %repair.id, from = %repair.status, to = %next, "Repair status changed");
    Ok(())
  }

  pub async fn add_comment(&self, comment: &NewComment) -> Result<RepairComment, BackendError> {
    comment.validate()?;
    let user_id = self.signed_in_user()?;
    let row = ApiNewComment {
      repair_id: &comment.repair_id,
      user_id: &user_id,
      comment: comment.comment.trim(),
      status: CommentStatus::Pending,
    };

    let created: Vec<ApiComment> = self.backend.insert("repair_comments", &[row]).await?;
    self.cache.invalidate(&[PENDING_COMMENTS_KEY]);
    let created = first_row("repair_comments", created)?;
    Ok(created.into_domain())
  }

  pub async fn mark_comment_read(&self, comment: &RepairComment) -> Result<(), BackendError> {
    let patch = comment.mark_read(Utc::now())?;
    self
      .backend
      .update("repair_comments", "id", &comment.id, &patch)
      .await?;
    self.forget_comment(&comment.id);
    Ok(())
  }

  /// Create a login for a new staff member.
  pub async fn create_user(&self, user: &NewUser) -> Result<String, AuthError> {
    let id = self.backend.sign_up(user).await?;
    self.cache.invalidate(&[USERS_KEY]);
    Ok(id)
  }

  // Cache upkeep after a successful write

  fn forget_scoped(&self, what: &str) {
    let keys = Scope::ALL.map(|scope| scope.key(what));
    let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
    self.cache.invalidate(&keys);
  }

  /// The cached lists keep serving as offline fallback, so they are edited
  /// to the new status instead of dropped. Only the counts are refetched.
  fn patch_cached_repair(&self, id: &str, patch: &StatusPatch) {
    self.cache.update::<Vec<Repair>, _>(HISTORY_REPAIRS_KEY, |repairs| {
      repairs
        .iter_mut()
        .filter(|r| r.id == id)
        .for_each(|r| r.apply(patch));
    });
    self.cache.update::<Vec<Repair>, _>(ACTIVE_REPAIRS_KEY, |repairs| {
      for repair in repairs.iter_mut().filter(|r| r.id == id) {
        repair.apply(patch);
      }
      repairs.retain(|r| r.status.is_active());
    });
    self.cache.invalidate(&[STATS_KEY]);
  }

  fn forget_comment(&self, id: &str) {
    self
      .cache
      .update::<Vec<RepairComment>, _>(PENDING_COMMENTS_KEY, |comments| {
        comments.retain(|c| c.id != id)
      });
  }
}

fn first_row<T>(table: &'static str, rows: Vec<T>) -> Result<T, BackendError> {
  rows.into_iter().next().ok_or_else(|| BackendError::NotFound {
    what: "inserted row in",
    id: table.to_string(),
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::backend::fake::FakeBackend;
  use crate::backend::types::{AssetRef, VehicleType};
  use crate::cache::traits::CacheSource;
  use crate::cache::MemoryStorage;
  use crate::config::Config;
  use crate::error::ValidationError;
  use crate::store::SessionStore;
  use serde_json::{json, Value};

  fn workshop() -> WorkshopClient {
    let config = Config::for_tests("https://abc.supabase.co");
    let backend =
      BackendClient::new(&config, "anon".to_string(), SessionStore::in_memory().unwrap()).unwrap();
    WorkshopClient::new(backend, CacheLayer::new(MemoryStorage::new()))
  }

  fn repair_row(id: &str, status: &str) -> Value {
    json!({
      "id": id,
      "vehicle_id": "v1",
      "machine_id": null,
      "mechanic_id": "u1",
      "status": status,
      "description": "Cambio de aceite",
      "started_at": "2024-03-01T08:00:00Z",
      "completed_at": null,
      "created_at": "2024-03-01T08:00:00Z",
    })
  }

  fn comment_row(id: &str) -> Value {
    json!({
      "id": id,
      "repair_id": "r1",
      "user_id": "u1",
      "comment": "Falta repuesto",
      "status": "pending",
      "created_at": "2024-03-01T09:00:00Z",
      "updated_at": null,
    })
  }

  #[test]
  fn test_scope_keys() {
    assert_eq!(Scope::Dashboard.key("vehicles"), "dashboard-vehicles");
    assert_eq!(Scope::Repairs.key("machines"), "repairs-machines");
    assert_eq!(Scope::History.key("vehicles"), "history-vehicles");
  }

  #[tokio::test]
  async fn test_writes_validate_before_sending() {
    let workshop = workshop();
    let missing_asset = NewRepair {
      asset: None,
      description: "Cambio de aceite".to_string(),
    };

    match workshop.create_repair(&missing_asset).await {
      Err(BackendError::Validation(ValidationError::Missing("asset"))) => {}
      other => panic!("unexpected {other:?}"),
    }
  }

  #[tokio::test]
  async fn test_writes_need_a_session() {
    let workshop = workshop();
    let comment = NewComment {
      repair_id: "r1".to_string(),
      comment: "Falta repuesto".to_string(),
    };

    assert!(matches!(
      workshop.add_comment(&comment).await,
      Err(BackendError::NoSession)
    ));
  }

  #[tokio::test]
  async fn test_invalid_transition_is_rejected_locally() {
    let workshop = workshop();
    let now = Utc::now();
    let repair = Repair {
      id: "r1".to_string(),
      asset_ref: AssetRef::Vehicle("v1".to_string()),
      mechanic_id: "u1".to_string(),
      status: RepairStatus::Completed,
      description: "Frenos".to_string(),
      started_at: now,
      completed_at: Some(now),
      created_at: now,
      asset: None,
    };

    assert!(matches!(
      workshop.start_repair(&repair).await,
      Err(BackendError::Transition(_))
    ));
  }

  #[tokio::test]
  async fn test_read_comment_stays_out_of_pending_fallback() {
    let backend = FakeBackend::start().await;
    backend.route("GET", "repair_comments", 200, json!([comment_row("c1"), comment_row("c2")]));
    backend.route("PATCH", "repair_comments", 204, Value::Null);
    let workshop = backend.workshop();

    let pending = workshop
      .pending_comments(FetchOptions::default())
      .await
      .unwrap();
    workshop.mark_comment_read(&pending.data[0]).await.unwrap();

    backend.stop();
    let pending = workshop
      .pending_comments(FetchOptions::forced())
      .await
      .unwrap();
    assert!(pending.is_stale());
    let ids: Vec<&str> = pending.data.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["c2"]);
  }

  #[tokio::test]
  async fn test_failed_mark_read_keeps_comment_pending() {
    let backend = FakeBackend::start().await;
    backend.route("GET", "repair_comments", 200, json!([comment_row("c1")]));
    backend.route("PATCH", "repair_comments", 400, json!({ "message": "row is locked" }));
    let workshop = backend.workshop();

    let pending = workshop
      .pending_comments(FetchOptions::default())
      .await
      .unwrap();
    assert!(workshop.mark_comment_read(&pending.data[0]).await.is_err());

    let pending = workshop
      .pending_comments(FetchOptions::default())
      .await
      .unwrap();
    assert_eq!(pending.source, CacheSource::CacheFresh);
    assert_eq!(pending.data.len(), 1);
  }

  #[tokio::test]
  async fn test_finished_repair_shows_completed_everywhere() {
    let backend = FakeBackend::start().await;
    backend.route(
      "GET",
      "repairs",
      200,
      json!([repair_row("r1", "in_progress"), repair_row("r2", "pending")]),
    );
    backend.route("PATCH", "repairs", 204, Value::Null);
    let workshop = backend.workshop();

    let history = workshop
      .repair_history(FetchOptions::default())
      .await
      .unwrap();
    workshop
      .active_repairs(FetchOptions::default())
      .await
      .unwrap();
    let stats = workshop.repair_stats(FetchOptions::default()).await.unwrap();
    assert_eq!(stats.data.in_progress, 1);

    workshop.finish_repair(&history.data[0]).await.unwrap();
    backend.stop();

    // served from the edited entries without a request
    let history = workshop
      .repair_history(FetchOptions::default())
      .await
      .unwrap();
    assert_eq!(history.source, CacheSource::CacheFresh);
    assert_eq!(history.data[0].status, RepairStatus::Completed);
    assert!(history.data[0].completed_at.is_some());
    assert_eq!(history.data[1].status, RepairStatus::Pending);

    let active = workshop
      .active_repairs(FetchOptions::default())
      .await
      .unwrap();
    let ids: Vec<&str> = active.data.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["r2"]);

    // counts were dropped, so the next read has to reach the backend
    assert!(workshop.repair_stats(FetchOptions::default()).await.is_err());
  }

  #[tokio::test]
  async fn test_started_repair_stays_active() {
    let backend = FakeBackend::start().await;
    backend.route("GET", "repairs", 200, json!([repair_row("r1", "pending")]));
    backend.route("PATCH", "repairs", 204, Value::Null);
    let workshop = backend.workshop();

    let active = workshop
      .active_repairs(FetchOptions::default())
      .await
      .unwrap();
    workshop.start_repair(&active.data[0]).await.unwrap();
    backend.stop();

    let active = workshop
      .active_repairs(FetchOptions::default())
      .await
      .unwrap();
    assert_eq!(active.data.len(), 1);
    assert_eq!(active.data[0].status, RepairStatus::InProgress);
    assert_eq!(active.data[0].completed_at, None);
  }

  #[tokio::test]
  async fn test_new_vehicle_drops_every_vehicle_list() {
    let backend = FakeBackend::start().await;
    backend.route("GET", "vehicles", 200, json!([]));
    backend.route("GET", "machines", 200, json!([]));
    backend.route(
      "POST",
      "vehicles",
      201,
      json!([{
        "id": "v9",
        "code": "T-01",
        "type": "truck",
        "brand": "Volvo",
        "model": "FH",
        "year": 2019,
        "serial_number": "SN-1",
        "created_at": "2024-03-01T08:00:00Z",
      }]),
    );
    let workshop = backend.workshop();
    for scope in Scope::ALL {
      workshop.vehicles(scope, FetchOptions::default()).await.unwrap();
    }
    workshop
      .machines(Scope::Repairs, FetchOptions::default())
      .await
      .unwrap();

    let vehicle = NewVehicle {
      code: "T-01".to_string(),
      vehicle_type: VehicleType::Truck,
      brand: "Volvo".to_string(),
      model: "FH".to_string(),
      year: 2019,
      serial_number: "SN-1".to_string(),
    };
    let created = workshop.create_vehicle(&vehicle).await.unwrap();
    assert_eq!(created.id, "v9");
    backend.stop();

    for scope in Scope::ALL {
      assert!(workshop.vehicles(scope, FetchOptions::default()).await.is_err());
    }
    assert!(workshop
      .machines(Scope::Repairs, FetchOptions::default())
      .await
      .is_ok());
  }

  #[tokio::test]
  async fn test_created_repair_is_assigned_to_signed_in_user() {
    let backend = FakeBackend::start().await;
    backend.route("POST", "repairs", 201, json!([repair_row("r7", "pending")]));
    let workshop = backend.signed_in_workshop("u1").await;

    let repair = workshop
      .create_repair(&NewRepair {
        asset: Some(AssetRef::Vehicle("v1".to_string())),
        description: "Cambio de aceite".to_string(),
      })
      .await
      .unwrap();

    assert_eq!(repair.status, RepairStatus::Pending);
    assert_eq!(repair.mechanic_id, "u1");
    assert!(backend.seen().contains(&"POST repairs".to_string()));
  }

  #[tokio::test]
  async fn test_sign_out_forgets_cached_reads() {
    let backend = FakeBackend::start().await;
    backend.route("GET", "users", 200, json!([]));
    backend.route("POST", "auth/v1/logout", 204, Value::Null);
    let workshop = backend.signed_in_workshop("u1").await;
    workshop.dashboard_users(FetchOptions::default()).await.unwrap();

    workshop.sign_out().await;
    assert!(workshop.backend().current_session().is_none());
    assert!(backend.seen().contains(&"POST auth/v1/logout".to_string()));

    backend.stop();
    assert!(workshop
      .dashboard_users(FetchOptions::default())
      .await
      .is_err());
  }
}
