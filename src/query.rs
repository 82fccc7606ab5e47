//! Background fetches polled from the UI tick.
//!
//! A [`Query`] owns a fetcher closure and at most one request in flight.
//! The fetcher receives the [`FetchOptions`] for that request, so the same
//! query serves both the normal cache-first load and a forced refresh:
//!
//! ```ignore
//! let workshop = workshop.clone();
//! let mut repairs = Query::new(move |options| {
//!     let workshop = workshop.clone();
//!     async move {
//!         workshop
//!             .active_repairs(options)
//!             .await
//!             .map(|r| r.data)
//!             .map_err(|e| e.user_message())
//!     }
//! });
//! repairs.load();     // cache-first
//! // on every tick
//! repairs.poll();
//! // user pressed 'r': rows stay visible until the new ones arrive
//! repairs.refresh();
//! ```

use std::future::Future;
use std::pin::Pin;
use tokio::sync::oneshot;

use crate::cache::FetchOptions;

#[derive(Debug, Clone)]
pub enum QueryState<T> {
  /// Nothing requested yet
  Idle,
  /// First request in flight, nothing to show
  Loading,
  /// Forced reload in flight; holds the previous data
  Refreshing(T),
  Success(T),
  /// User-facing message
  Error(String),
}

impl<T> QueryState<T> {
  pub fn data(&self) -> Option<&T> {
    match self {
      QueryState::Success(data) | QueryState::Refreshing(data) => Some(data),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&str> {
    match self {
      QueryState::Error(e) => Some(e),
      _ => None,
    }
  }
}

type Pending<T> = Pin<Box<dyn Future<Output = Result<T, String>> + Send>>;
type Fetcher<T> = Box<dyn Fn(FetchOptions) -> Pending<T> + Send + Sync>;

pub struct Query<T> {
  state: QueryState<T>,
  fetcher: Fetcher<T>,
  inflight: Option<oneshot::Receiver<Result<T, String>>>,
}

impl<T: Send + 'static> Query<T> {
  pub fn new<F, Fut>(fetcher: F) -> Self
  where
    F: Fn(FetchOptions) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, String>> + Send + 'static,
  {
    Self {
      state: QueryState::Idle,
      fetcher: Box::new(move |options| Box::pin(fetcher(options))),
      inflight: None,
    }
  }

  /// A query for a single write: `action` ignores fetch options and is
  /// started right away.
  pub fn action<F, Fut>(action: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, String>> + Send + 'static,
  {
    let mut query = Self::new(move |_| action());
    query.load();
    query
  }

  pub fn state(&self) -> &QueryState<T> {
    &self.state
  }

  /// Current data, including the old data shown during a refresh.
  pub fn data(&self) -> Option<&T> {
    self.state.data()
  }

  pub fn error(&self) -> Option<&str> {
    self.state.error()
  }

  /// A request is in flight.
  pub fn is_pending(&self) -> bool {
    self.inflight.is_some()
  }

  pub fn is_success(&self) -> bool {
    matches!(self.state, QueryState::Success(_))
  }

  /// Cache-first load. Ignored while a request is in flight.
  pub fn load(&mut self) {
    if self.is_pending() {
      return;
    }
    self.state = QueryState::Loading;
    self.start(FetchOptions::default());
  }

  /// Forced reload that keeps the current data on screen until it lands.
  /// Supersedes a request already in flight.
  pub fn refresh(&mut self) {
    self.state = match std::mem::replace(&mut self.state, QueryState::Idle) {
      QueryState::Success(data) | QueryState::Refreshing(data) => QueryState::Refreshing(data),
      _ => QueryState::Loading,
    };
    self.start(FetchOptions::forced());
  }

  /// Take the result if it has arrived. Returns `true` when the state changed.
  pub fn poll(&mut self) -> bool {
    let Some(rx) = &mut self.inflight else {
      return false;
    };
    let outcome = match rx.try_recv() {
      Ok(result) => result,
      Err(oneshot::error::TryRecvError::Empty) => return false,
      Err(oneshot::error::TryRecvError::Closed) => Err("Request was interrupted".to_string()),
    };
    self.inflight = None;
    self.state = match outcome {
      Ok(data) => QueryState::Success(data),
      Err(error) => QueryState::Error(error),
    };
    true
  }

  fn start(&mut self, options: FetchOptions) {
    let (tx, rx) = oneshot::channel();
    // dropping an older receiver discards its result
    self.inflight = Some(rx);
    let request = (self.fetcher)(options);
    tokio::spawn(async move {
      let _ = tx.send(request.await);
    });
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Query<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Query")
      .field("state", &self.state)
      .field("pending", &self.inflight.is_some())
      .finish_non_exhaustive()
  }
}
