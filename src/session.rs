//! Who is signed in, and which screens they get.
//!
//! The gate watches the backend session. Whenever it changes (including at
//! start-up) the user's profile row is fetched again, bypassing the cache,
//! and the role on that row decides the UI mode.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::watch;

use crate::backend::types::{Role, User};
use crate::backend::{Session, WorkshopClient};
use crate::query::{Query, QueryState};

/// The two screen sets the application offers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiMode {
  /// Everything: dashboard, comments, repairs, history
  Admin,
  /// Repair tickets only
  Mechanic,
}

impl From<Role> for UiMode {
  fn from(role: Role) -> Self {
    match role {
      Role::Admin => UiMode::Admin,
      Role::Mechanic => UiMode::Mechanic,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
  /// A session exists and its profile is being fetched
  Loading,
  Unauthenticated,
  Authenticated(User),
}

impl AuthState {
  pub fn user(&self) -> Option<&User> {
    match self {
      AuthState::Authenticated(user) => Some(user),
      _ => None,
    }
  }

  pub fn mode(&self) -> Option<UiMode> {
    self.user().map(|u| UiMode::from(u.role))
  }
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type ProfileLoader = Arc<dyn Fn(String) -> BoxFuture<Result<User, String>> + Send + Sync>;

pub struct AuthGate {
  sessions: watch::Receiver<Option<Session>>,
  loader: ProfileLoader,
  profile: Option<Query<User>>,
  /// User whose profile was last requested
  user_id: Option<String>,
}

impl AuthGate {
  /// Gate backed by the workshop's profile read.
  pub fn new(workshop: WorkshopClient) -> Self {
    let sessions = workshop.backend().subscribe();
    Self::with_loader(sessions, move |user_id| {
      let workshop = workshop.clone();
      async move {
        workshop
          .profile(&user_id)
          .await
          .map(|result| result.data)
          .map_err(|e| {
            tracing::error!(user = %user_id, "Error fetching profile: {}", e);
            e.user_message()
          })
      }
    })
  }

  pub fn with_loader<F, Fut>(mut sessions: watch::Receiver<Option<Session>>, loader: F) -> Self
  where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<User, String>> + Send + 'static,
  {
    let loader: ProfileLoader = Arc::new(move |id| Box::pin(loader(id)));
    let initial = sessions.borrow_and_update().clone();

    let mut gate = Self {
      sessions,
      loader,
      profile: None,
      user_id: None,
    };
    gate.resolve(initial.as_ref());
    gate
  }

  /// Pick up session changes and profile results. Returns `true` when the
  /// auth state may have changed.
  pub fn poll(&mut self) -> bool {
    let mut changed = false;

    if self.sessions.has_changed().unwrap_or(false) {
      let session = self.sessions.borrow_and_update().clone();
      // a token refresh for the same user still re-reads the profile
      self.resolve(session.as_ref());
      changed = true;
    }

    if let Some(profile) = &mut self.profile {
      changed |= profile.poll();
    }

    changed
  }

  pub fn state(&self) -> AuthState {
    match &self.profile {
      None => AuthState::Unauthenticated,
      Some(query) => match query.state() {
        QueryState::Idle | QueryState::Loading => AuthState::Loading,
        QueryState::Success(user) | QueryState::Refreshing(user) => {
          AuthState::Authenticated(user.clone())
        }
        QueryState::Error(_) => AuthState::Unauthenticated,
      },
    }
  }

  /// Why the profile could not be loaded, if it could not
  pub fn error(&self) -> Option<&str> {
    self.profile.as_ref().and_then(|q| q.error())
  }

  fn resolve(&mut self, session: Option<&Session>) {
    let Some(session) = session else {
      if self.user_id.take().is_some() {
        tracing::info!("Session ended");
      }
      self.profile = None;
      return;
    };

    if self.user_id.as_deref() == Some(session.user_id.as_str()) {
      if let Some(profile) = &mut self.profile {
        // same user: keep them signed in while the profile reloads
        profile.refresh();
        return;
      }
    }

    let user_id = session.user_id.clone();
    let loader = self.loader.clone();
    let id = user_id.clone();
    let mut query = Query::new(move |_| loader(id.clone()));
    query.load();

    tracing::debug!(user = %user_id, "Loading profile");
    self.profile = Some(query);
    self.user_id = Some(user_id);
  }
}
