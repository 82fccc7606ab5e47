//! Error types shared across the backend, cache and views.

use crate::backend::types::RepairStatus;

/// Failure talking to the hosted backend
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
  /// Network, DNS, TLS or timeout failure
  #[error("request failed: {0}")]
  Transport(#[from] reqwest::Error),

  /// The backend answered with a non-2xx status
  #[error("backend returned HTTP {status}: {message}")]
  Status { status: u16, message: String },

  #[error("failed to decode {what}: {source}")]
  Decode {
    what: &'static str,
    #[source]
    source: serde_json::Error,
  },

  /// A row broke an invariant the client relies on
  #[error("malformed {table} row {id}: {reason}")]
  Malformed {
    table: &'static str,
    id: String,
    reason: &'static str,
  },

  #[error("{what} {id} not found")]
  NotFound { what: &'static str, id: String },

  #[error("invalid backend url: {0}")]
  Url(#[from] url::ParseError),

  #[error("no active session")]
  NoSession,

  #[error(transparent)]
  Validation(#[from] ValidationError),

  #[error(transparent)]
  Transition(#[from] TransitionError),
}

impl BackendError {
  /// Whether the failure looks like a connectivity problem rather than
  /// something the backend rejected.
  pub fn is_transient(&self) -> bool {
    match self {
      BackendError::Transport(_) => true,
      BackendError::Status { status, .. } => *status >= 500 || *status == 429,
      _ => false,
    }
  }

  /// Short message for a view's error line
  pub fn user_message(&self) -> String {
    if self.is_transient() {
      "Connection error. Please check your internet connection and try again.".to_string()
    } else {
      self.to_string()
    }
  }
}

/// Sign-in and sign-up failures, each displayed as-is to the user
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
  #[error("Please enter your email and password.")]
  MissingCredentials,

  #[error("Invalid credentials. Please check your email and password.")]
  InvalidCredentials,

  #[error("This email has not been confirmed. Please contact the administrator.")]
  EmailNotConfirmed,

  #[error("This email address is already registered.")]
  AlreadyRegistered,

  #[error("No internet connection. Please check your connection and try again.")]
  Offline,

  #[error("Connection error. Please check your internet connection and try again.")]
  Network(#[source] reqwest::Error),

  #[error("{0}")]
  Rejected(String),

  #[error(transparent)]
  Backend(#[from] BackendError),

  #[error(transparent)]
  Validation(#[from] ValidationError),
}

impl AuthError {
  /// Map a backend auth message onto a specific variant.
  pub fn from_message(message: &str) -> Self {
    if message.contains("Invalid login credentials") {
      AuthError::InvalidCredentials
    } else if message.contains("Email not confirmed") {
      AuthError::EmailNotConfirmed
    } else if message.contains("User already registered") {
      AuthError::AlreadyRegistered
    } else {
      AuthError::Rejected(message.to_string())
    }
  }
}

impl From<reqwest::Error> for AuthError {
  fn from(err: reqwest::Error) -> Self {
    AuthError::Network(err)
  }
}

/// Form input rejected before any remote call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
  #[error("Please fill in the {0} field.")]
  Missing(&'static str),

  #[error("Invalid {field}: {reason}.")]
  Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
  #[error("a repair cannot move from {from} to {to}")]
  Repair {
    from: RepairStatus,
    to: RepairStatus,
  },

  #[error("comment has already been read")]
  CommentAlreadyRead,
}
