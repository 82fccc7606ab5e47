use reqwest::{Method, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use url::Url;

use super::api_types::error_message;
use super::auth::Session;
use crate::config::Config;
use crate::error::BackendError;
use crate::store::{session_key, SessionStore};

const APPLICATION_NAME: &str = "taller";

/// Sort direction for `order=`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
  Asc,
  Desc,
}

/// A read against one table.
///
/// Renders to the query string understood by the REST service, e.g.
/// `select=*&status=in.(pending,in_progress)&order=created_at.desc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableQuery {
  table: &'static str,
  select: String,
  filters: Vec<(String, String)>,
  order: Option<(String, Order)>,
  limit: Option<usize>,
}

impl TableQuery {
  pub fn from(table: &'static str) -> Self {
    Self {
      table,
      select: "*".to_string(),
      filters: Vec::new(),
      order: None,
      limit: None,
    }
  }

  pub fn select(mut self, columns: &str) -> Self {
    self.select = columns.split_whitespace().collect();
    self
  }

  pub fn eq(mut self, column: &str, value: &str) -> Self {
    self.filters.push((column.to_string(), format!("eq.{}", value)));
    self
  }

  pub fn in_list(mut self, column: &str, values: &[&str]) -> Self {
    self
      .filters
      .push((column.to_string(), format!("in.({})", values.join(","))));
    self
  }

  pub fn order(mut self, column: &str, order: Order) -> Self {
    self.order = Some((column.to_string(), order));
    self
  }

  pub fn limit(mut self, limit: usize) -> Self {
    self.limit = Some(limit);
    self
  }

  pub fn table(&self) -> &'static str {
    self.table
  }

  /// Key/value pairs for the request query string
  pub fn params(&self) -> Vec<(String, String)> {
    let mut params = vec![("select".to_string(), self.select.clone())];
    params.extend(self.filters.iter().cloned());
    if let Some((column, order)) = &self.order {
      let dir = match order {
        Order::Asc => "asc",
        Order::Desc => "desc",
      };
      params.push(("order".to_string(), format!("{}.{}", column, dir)));
    }
    if let Some(limit) = self.limit {
      params.push(("limit".to_string(), limit.to_string()));
    }
    params
  }
}

/// Client for the hosted backend's REST and auth services.
///
/// Cheap to clone; clones share the HTTP pool, the session and the
/// session store.
#[derive(Clone)]
pub struct BackendClient {
  pub(super) http: reqwest::Client,
  pub(super) base: Url,
  pub(super) anon_key: String,
  liveness_path: String,
  pub(super) session: Arc<watch::Sender<Option<Session>>>,
  pub(super) store: Arc<SessionStore>,
  pub(super) store_key: String,
}

impl BackendClient {
  pub fn new(
    config: &Config,
    anon_key: String,
    store: SessionStore,
  ) -> Result<Self, BackendError> {
    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.connection.request_timeout_secs))
      .build()?;

    // Url::join drops the last segment unless the base ends with '/'
    let mut base = Url::parse(&config.backend.url)?;
    if !base.path().ends_with('/') {
      base.set_path(&format!("{}/", base.path()));
    }

    let store_key = session_key(&config.backend.url);
    let restored = store
      .get(&store_key)
      .and_then(|raw| match serde_json::from_str::<Session>(&raw) {
        Ok(session) => Some(session),
        Err(e) => {
          tracing::warn!("Discarding unreadable stored session: {}", e);
          None
        }
      });
    if restored.is_some() {
      tracing::info!("Restored persisted session");
    }

    let (session, _) = watch::channel(restored);

    Ok(Self {
      http,
      base,
      anon_key,
      liveness_path: config.connection.liveness_path.clone(),
      session: Arc::new(session),
      store: Arc::new(store),
      store_key,
    })
  }

  /// Shared HTTP pool, for downloads outside the backend API
  pub fn http(&self) -> &reqwest::Client {
    &self.http
  }

  pub(super) fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
    Ok(self.base.join(path.trim_start_matches('/'))?)
  }

  /// Attach the api key and the bearer token (user token when signed in).
  pub(super) fn authorized(&self, method: Method, url: Url) -> RequestBuilder {
    let bearer = self
      .session
      .borrow()
      .as_ref()
      .map(|s| s.access_token.clone())
      .unwrap_or_else(|| self.anon_key.clone());

    self
      .http
      .request(method, url)
      .header("apikey", &self.anon_key)
      .bearer_auth(bearer)
      .header("x-application-name", APPLICATION_NAME)
      .header("Cache-Control", "no-cache")
  }

  /// Read rows from a table.
  pub async fn select<T: DeserializeOwned>(&self, query: &TableQuery) -> Result<Vec<T>, BackendError> {
    let url = self.endpoint(&format!("rest/v1/{}", query.table()))?;
    tracing::debug!(table = query.table(), params = ?query.params(), "select");

    let response = self
      .authorized(Method::GET, url)
      .query(&query.params())
      .send()
      .await?;

    decode(query.table(), response).await
  }

  /// Insert rows and return them as stored.
  pub async fn insert<B, T>(&self, table: &'static str, rows: &B) -> Result<Vec<T>, BackendError>
  where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
  {
    let url = self.endpoint(&format!("rest/v1/{}", table))?;
    tracing::debug!(table, "insert");

    let response = self
      .authorized(Method::POST, url)
      .header("Prefer", "return=representation")
      .json(rows)
      .send()
      .await?;

    decode(table, response).await
  }

  /// Patch the rows matching `column = value`.
  pub async fn update<P: Serialize + ?Sized>(
    &self,
    table: &'static str,
    column: &str,
    value: &str,
    patch: &P,
  ) -> Result<(), BackendError> {
    let url = self.endpoint(&format!("rest/v1/{}", table))?;
    tracing::debug!(table, column, value, "update");

    let response = self
      .authorized(Method::PATCH, url)
      .query(&[(column, format!("eq.{}", value))])
      .header("Prefer", "return=minimal")
      .json(patch)
      .send()
      .await?;

    check(response).await.map(|_| ())
  }

  /// Lightweight reachability check; any HTTP answer counts as reachable.
  pub async fn ping(&self) -> bool {
    let url = match self.endpoint(&self.liveness_path) {
      Ok(url) => url,
      Err(e) => {
        tracing::error!("Invalid liveness path: {}", e);
        return false;
      }
    };

    match self
      .http
      .head(url)
      .header("apikey", &self.anon_key)
      .send()
      .await
    {
      Ok(_) => true,
      Err(e) => {
        tracing::debug!("Liveness probe failed: {}", e);
        false
      }
    }
  }
}

/// Turn a non-2xx response into a `BackendError::Status`.
pub(super) async fn check(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
  let status = response.status();
  if status.is_success() {
    return Ok(response);
  }

  let body = response.text().await.unwrap_or_default();
  let message = if body.trim().is_empty() {
    status
      .canonical_reason()
      .unwrap_or("request failed")
      .to_string()
  } else {
    error_message(&body)
  };
  Err(BackendError::Status {
    status: status.as_u16(),
    message,
  })
}

async fn decode<T: DeserializeOwned>(
  what: &'static str,
  response: reqwest::Response,
) -> Result<Vec<T>, BackendError> {
  let response = check(response).await?;
  if response.status() == StatusCode::NO_CONTENT {
    return Ok(Vec::new());
  }
  let bytes = response.bytes().await?;
  serde_json::from_slice(&bytes).map_err(|source| BackendError::Decode { what, source })
}
