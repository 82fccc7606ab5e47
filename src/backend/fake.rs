//! Local HTTP stand-in for the hosted backend, used by tests.
//!
//! Answers `METHOD path` with a canned status and JSON body. REST paths are
//! matched by table name (`/rest/v1/repairs?...` is `repairs`), anything
//! else by its path without the leading slash (`auth/v1/token`). Routes can
//! be replaced while a test runs, and `stop` makes every later request fail
//! to connect.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use super::{BackendClient, WorkshopClient};
use crate::cache::{CacheLayer, MemoryStorage};
use crate::config::Config;
use crate::retry::RetryPolicy;
use crate::store::SessionStore;

type Routes = Arc<Mutex<HashMap<(String, String), (u16, Value)>>>;
/// `METHOD path` and raw body of each request, in arrival order
type Seen = Arc<Mutex<Vec<(String, String)>>>;

pub struct FakeBackend {
  addr: SocketAddr,
  routes: Routes,
  seen: Seen,
  server: JoinHandle<()>,
}

impl FakeBackend {
  pub async fn start() -> Self {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let routes: Routes = Arc::default();
    let seen: Seen = Arc::default();

    let server = {
      let routes = routes.clone();
      let seen = seen.clone();
      tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
          tokio::spawn(serve(socket, routes.clone(), seen.clone()));
        }
      })
    };

    Self {
      addr,
      routes,
      seen,
      server,
    }
  }

  pub fn url(&self) -> String {
    format!("http://{}", self.addr)
  }

  pub fn route(&self, method: &str, path: &str, status: u16, body: Value) {
    self
      .routes
      .lock()
      .unwrap()
      .insert((method.to_string(), path.to_string()), (status, body));
  }

  /// `METHOD path` of every request answered so far
  pub fn seen(&self) -> Vec<String> {
    self.seen.lock().unwrap().iter().map(|(r, _)| r.clone()).collect()
  }

  /// JSON body of the latest `METHOD path` request
  pub fn last_body(&self, request: &str) -> Option<Value> {
    self
      .seen
      .lock()
      .unwrap()
      .iter()
      .rev()
      .find(|(r, _)| r == request)
      .and_then(|(_, body)| serde_json::from_str(body).ok())
  }

  /// Stop listening; later requests are refused.
  pub fn stop(&self) {
    self.server.abort();
  }

  /// A client with its own cache that makes a single attempt per read.
  pub fn workshop(&self) -> WorkshopClient {
    let config = Config::for_tests(&self.url());
    let backend =
      BackendClient::new(&config, "anon".to_string(), SessionStore::in_memory().unwrap()).unwrap();
    let cache = CacheLayer::new(MemoryStorage::new())
      .with_retry(RetryPolicy::new(1, std::time::Duration::ZERO));
    WorkshopClient::new(backend, cache)
  }

  /// Same as [`FakeBackend::workshop`], signed in as `user_id`.
  pub async fn signed_in_workshop(&self, user_id: &str) -> WorkshopClient {
    self.route(
      "POST",
      "auth/v1/token",
      200,
      json!({
        "access_token": "access",
        "refresh_token": "refresh",
        "expires_in": 3600,
        "user": { "id": user_id, "email": "ana@taller.test" },
      }),
    );
    let workshop = self.workshop();
    workshop
      .backend()
      .sign_in("ana@taller.test", "secret")
      .await
      .unwrap();
    workshop
  }
}

impl Drop for FakeBackend {
  fn drop(&mut self) {
    self.server.abort();
  }
}

async fn serve(mut socket: TcpStream, routes: Routes, seen: Seen) {
  let Some((head, body)) = read_request(&mut socket).await else {
    return;
  };
  let mut parts = head.split_whitespace();
  let method = parts.next().unwrap_or_default().to_string();
  let target = parts.next().unwrap_or_default();
  let path = target.split('?').next().unwrap_or_default();
  let path = path
    .strip_prefix("/rest/v1/")
    .unwrap_or_else(|| path.trim_start_matches('/'))
    .to_string();

  seen.lock().unwrap().push((format!("{method} {path}"), body));
  let answer = routes.lock().unwrap().get(&(method, path)).cloned();
  let (status, body) = answer.unwrap_or((503, json!({ "message": "no route" })));

  let body = if status == 204 {
    String::new()
  } else {
    body.to_string()
  };
  let reply = format!(
    "HTTP/1.1 {status} {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
    reason(status),
    body.len(),
  );
  let _ = socket.write_all(reply.as_bytes()).await;
  let _ = socket.shutdown().await;
}

/// Read one full request and return its head and body.
async fn read_request(socket: &mut TcpStream) -> Option<(String, String)> {
  let mut buf = Vec::new();
  let mut chunk = [0u8; 4096];
  loop {
    let n = socket.read(&mut chunk).await.ok()?;
    if n == 0 {
      return None;
    }
    buf.extend_from_slice(&chunk[..n]);

    let text = String::from_utf8_lossy(&buf);
    let Some(end) = text.find("\r\n\r\n") else {
      continue;
    };
    let body_len = text[..end]
      .lines()
      .filter_map(|line| line.split_once(':'))
      .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
      .and_then(|(_, value)| value.trim().parse::<usize>().ok())
      .unwrap_or(0);
    if buf.len() >= end + 4 + body_len {
      let body = String::from_utf8_lossy(&buf[end + 4..end + 4 + body_len]).into_owned();
      return Some((text[..end].to_string(), body));
    }
  }
}

fn reason(status: u16) -> &'static str {
  match status {
    200 => "OK",
    201 => "Created",
    204 => "No Content",
    400 => "Bad Request",
    _ => "Service Unavailable",
  }
}
