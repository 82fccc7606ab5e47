//! Password authentication against the backend's auth service.
//!
//! The active session lives in a `watch` channel owned by the
//! [`BackendClient`]; every sign-in, sign-out and token refresh replaces it
//! and writes it through to the [`SessionStore`](crate::store::SessionStore).

use chrono::{DateTime, Duration, TimeZone, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::api_types::{
  ApiPasswordGrant, ApiRefreshGrant, ApiSession, ApiSignUp, ApiSignUpMetadata, ApiSignUpResponse,
};
use super::client::{check, BackendClient};
use super::types::NewUser;
use crate::error::{AuthError, BackendError};

/// Backend-issued credentials for the signed-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
  pub access_token: String,
  pub refresh_token: String,
  pub expires_at: DateTime<Utc>,
  pub user_id: String,
  #[serde(default)]
  pub email: Option<String>,
}

impl Session {
  fn from_api(api: ApiSession, now: DateTime<Utc>) -> Self {
    let expires_at = api
      .expires_at
      .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
      .unwrap_or_else(|| now + Duration::seconds(api.expires_in));

    Self {
      access_token: api.access_token,
      refresh_token: api.refresh_token,
      expires_at,
      user_id: api.user.id,
      email: api.user.email,
    }
  }

  /// Whether the access token expires within `margin` of `now`
  pub fn expires_within(&self, margin: Duration, now: DateTime<Utc>) -> bool {
    self.expires_at - now < margin
  }
}

/// Normalize an email the way it is stored by the auth service
pub fn normalize_email(email: &str) -> String {
  email.trim().to_lowercase()
}

impl BackendClient {
  /// Sign in with email and password.
  pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
    let email = normalize_email(email);
    if email.is_empty() || password.is_empty() {
      return Err(AuthError::MissingCredentials);
    }

    tracing::info!(email = %email, "Signing in");
    let grant = ApiPasswordGrant {
      email: &email,
      password,
    };
    let session = self.token_request("password", &grant).await?;
    self.set_session(Some(session.clone()));
    Ok(session)
  }

  /// Revoke the session remotely and forget it locally.
  ///
  /// The local session is always cleared, even when the remote call fails.
  pub async fn sign_out(&self) {
    if self.current_session().is_some() {
      let result = match self.endpoint("auth/v1/logout") {
        Ok(url) => match self.authorized(Method::POST, url).send().await {
          Ok(response) => check(response).await.map(|_| ()),
          Err(e) => Err(BackendError::from(e)),
        },
        Err(e) => Err(e),
      };
      if let Err(e) = result {
        tracing::warn!("Remote sign-out failed: {}", e);
      }
    }
    self.set_session(None);
    tracing::info!("Signed out");
  }

  pub fn current_session(&self) -> Option<Session> {
    self.session.borrow().clone()
  }

  /// Receiver that observes every session change
  pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
    self.session.subscribe()
  }

  /// Exchange the refresh token for a new session.
  ///
  /// A refresh token the backend rejects ends the session. Transport
  /// failures keep it, so a later attempt can still succeed.
  pub async fn refresh_session(&self) -> Result<Session, AuthError> {
    let Some(current) = self.current_session() else {
      return Err(AuthError::Backend(BackendError::NoSession));
    };

    let grant = ApiRefreshGrant {
      refresh_token: &current.refresh_token,
    };
    match self.token_request("refresh_token", &grant).await {
      Ok(session) => {
        tracing::debug!(expires_at = %session.expires_at, "Session refreshed");
        self.set_session(Some(session.clone()));
        Ok(session)
      }
      Err(err @ (AuthError::InvalidCredentials | AuthError::Rejected(_))) => {
        tracing::warn!("Refresh token rejected, ending session: {}", err);
        self.set_session(None);
        Err(err)
      }
      Err(err) => Err(err),
    }
  }

  /// Refresh the session if it expires within `margin`.
  ///
  /// Returns whether a usable session exists afterwards.
  pub async fn ensure_fresh_session(&self, margin: Duration) -> bool {
    let Some(session) = self.current_session() else {
      return false;
    };
    if !session.expires_within(margin, Utc::now()) {
      return true;
    }

    match self.refresh_session().await {
      Ok(_) => true,
      Err(e) => {
        tracing::error!("Error refreshing session: {}", e);
        false
      }
    }
  }

  /// Register a new account. The current session is left untouched.
  ///
  /// Returns the id of the created user; the backend creates the matching
  /// profile row from the metadata.
  pub async fn sign_up(&self, user: &NewUser) -> Result<String, AuthError> {
    user.validate()?;
    let email = normalize_email(&user.email);
    let body = ApiSignUp {
      email: &email,
      password: &user.password,
      data: ApiSignUpMetadata {
        full_name: user.full_name.trim(),
        role: user.role,
      },
    };

    let url = self.endpoint("auth/v1/signup").map_err(AuthError::Backend)?;
    let response = self
      .http
      .post(url)
      .header("apikey", &self.anon_key)
      .json(&body)
      .send()
      .await?;
    let response = auth_check(response).await?;
    let created: ApiSignUpResponse = response.json().await?;

    tracing::info!(user_id = created.user_id(), role = user.role.as_str(), "User created");
    Ok(created.user_id().to_string())
  }

  async fn token_request<B: Serialize>(&self, grant_type: &str, body: &B) -> Result<Session, AuthError> {
    let url = self.endpoint("auth/v1/token").map_err(AuthError::Backend)?;
    let response = self
      .http
      .post(url)
      .query(&[("grant_type", grant_type)])
      .header("apikey", &self.anon_key)
      .json(body)
      .send()
      .await?;
    let response = auth_check(response).await?;
    let api: ApiSession = response.json().await?;
    Ok(Session::from_api(api, Utc::now()))
  }

  fn set_session(&self, session: Option<Session>) {
    match &session {
      Some(s) => match serde_json::to_string(s) {
        Ok(raw) => self.store.set(&self.store_key, &raw),
        Err(e) => tracing::error!("Failed to serialize session: {}", e),
      },
      None => self.store.remove(&self.store_key),
    }
    self.session.send_replace(session);
  }
}

/// Like `check`, but maps the auth service's messages onto `AuthError`.
async fn auth_check(response: reqwest::Response) -> Result<reqwest::Response, AuthError> {
  match check(response).await {
    Ok(response) => Ok(response),
    Err(BackendError::Status { status, message }) if (400..500).contains(&status) => {
      Err(AuthError::from_message(&message))
    }
    Err(e) => Err(AuthError::Backend(e)),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::Config;
  use crate::store::{session_key, SessionStore};

  fn session(expires_at: DateTime<Utc>) -> Session {
    Session {
      access_token: "at".to_string(),
      refresh_token: "rt".to_string(),
      expires_at,
      user_id: "u1".to_string(),
      email: Some("admin@taller.com".to_string()),
    }
  }

  fn client(store: SessionStore) -> BackendClient {
    let config = Config::for_tests("https://abc.supabase.co");
    BackendClient::new(&config, "anon".to_string(), store).unwrap()
  }

  #[test]
  fn test_normalize_email() {
    assert_eq!(normalize_email("  Admin@Taller.COM "), "admin@taller.com");
  }

  #[test]
  fn test_expiry_from_absolute_or_relative() {
    let now = Utc.with_ymd_and_hms(2025, 1, 12, 10, 0, 0).unwrap();
    let absolute: ApiSession = serde_json::from_value(serde_json::json!({
      "access_token": "at",
      "refresh_token": "rt",
      "expires_in": 3600,
      "expires_at": now.timestamp() + 60,
      "user": {"id": "u1"}
    }))
    .unwrap();
    assert_eq!(
      Session::from_api(absolute, now).expires_at,
      now + Duration::seconds(60)
    );

    let relative: ApiSession = serde_json::from_value(serde_json::json!({
      "access_token": "at",
      "refresh_token": "rt",
      "expires_in": 3600,
      "user": {"id": "u1"}
    }))
    .unwrap();
    assert_eq!(
      Session::from_api(relative, now).expires_at,
      now + Duration::hours(1)
    );
  }

  #[test]
  fn test_expires_within_margin() {
    let now = Utc::now();
    let margin = Duration::minutes(5);
    assert!(session(now + Duration::minutes(4)).expires_within(margin, now));
    assert!(session(now - Duration::minutes(1)).expires_within(margin, now));
    assert!(!session(now + Duration::minutes(30)).expires_within(margin, now));
  }

  #[tokio::test]
  async fn test_missing_credentials_rejected_locally() {
    let client = client(SessionStore::in_memory().unwrap());
    assert!(matches!(
      client.sign_in("   ", "secret").await,
      Err(AuthError::MissingCredentials)
    ));
    assert!(matches!(
      client.sign_in("a@b.c", "").await,
      Err(AuthError::MissingCredentials)
    ));
  }

  #[tokio::test]
  async fn test_session_is_persisted_and_restored() {
    let dir = std::env::temp_dir().join(format!("taller-auth-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("session.db");

    let first = client(SessionStore::open_at(&path).unwrap());
    let mut rx = first.subscribe();
    let stored = session(Utc::now() + Duration::hours(1));
    first.set_session(Some(stored.clone()));
    assert!(rx.has_changed().unwrap());
    assert_eq!(*rx.borrow_and_update(), Some(stored.clone()));

    let second = client(SessionStore::open_at(&path).unwrap());
    assert_eq!(second.current_session(), Some(stored));

    // sign-out without network still clears everything locally
    second.set_session(None);
    let store = SessionStore::open_at(&path).unwrap();
    assert_eq!(store.get(&session_key("https://abc.supabase.co")), None);

    let _ = std::fs::remove_dir_all(&dir);
  }

  #[tokio::test]
  async fn test_no_session_is_not_fresh() {
    let client = client(SessionStore::in_memory().unwrap());
    assert!(!client.ensure_fresh_session(Duration::minutes(5)).await);
  }

  #[tokio::test]
  async fn test_session_far_from_expiry_needs_no_refresh() {
    let client = client(SessionStore::in_memory().unwrap());
    client.set_session(Some(session(Utc::now() + Duration::hours(1))));
    // no request is made, so this passes without a backend
    assert!(client.ensure_fresh_session(Duration::minutes(5)).await);
  }
}
