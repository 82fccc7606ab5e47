use crate::backend::types::User;
use crate::backend::WorkshopClient;
use crate::commands::Command;
use crate::config::Config;
use crate::connection::{ConnectionMonitor, ConnectionNotice, ConnectionTracker};
use crate::event::{Event, EventHandler};
use crate::keepalive::{self, KeepaliveHandle, KeepaliveSettings};
use crate::session::{AuthGate, AuthState, UiMode};
use crate::ui;
use crate::ui::components::{CommandEvent, CommandInput, KeyResult};
use crate::ui::renderfns::HeaderInfo;
use crate::ui::view::{View, ViewAction};
use crate::ui::views::{
  CommentsView, DashboardView, HistoryView, LoginView, RepairsView, ViewContext,
};
use color_eyre::Result;
use crossterm::event::{DisableFocusChange, EnableFocusChange, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::stdout;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Which screen set is mounted
#[derive(Debug, Clone, PartialEq, Eq)]
enum Screen {
  /// Session present, profile not loaded yet
  Splash,
  Login,
  Home { user_id: String, mode: UiMode },
}

impl Screen {
  /// The screen for `state`. A profile reload for the user already on
  /// screen keeps the current screen instead of flashing the splash.
  fn for_state(current: &Screen, state: &AuthState) -> Screen {
    match state {
      AuthState::Loading => match current {
        Screen::Home { .. } => current.clone(),
        _ => Screen::Splash,
      },
      AuthState::Unauthenticated => Screen::Login,
      AuthState::Authenticated(user) => Screen::Home {
        user_id: user.id.clone(),
        mode: UiMode::from(user.role),
      },
    }
  }
}

/// Main application state
pub struct App {
  config: Arc<Config>,
  title: String,
  workshop: WorkshopClient,

  /// Session watcher deciding who is signed in
  gate: AuthGate,
  screen: Screen,
  user: Option<User>,

  keepalive: Option<KeepaliveHandle>,
  monitor: ConnectionMonitor,
  tracker: ConnectionTracker,

  /// Navigation stack - root is always at index 0
  view_stack: Vec<Box<dyn View>>,
  command_input: CommandInput,

  should_quit: bool,
}

impl App {
  /// Must be called inside the tokio runtime: the keepalive and the
  /// connection monitor start right away.
  pub fn new(config: Config, workshop: WorkshopClient) -> Self {
    let backend = Arc::new(workshop.backend().clone());
    let monitor = ConnectionMonitor::spawn(
      backend.clone(),
      Duration::from_secs(config.connection.probe_interval_secs),
    );
    let keepalive = keepalive::spawn(backend, KeepaliveSettings::from_config(&config));
    let gate = AuthGate::new(workshop.clone());

    let mut app = Self {
      title: config.display_title(),
      config: Arc::new(config),
      workshop,
      gate,
      screen: Screen::Splash,
      user: None,
      keepalive: Some(keepalive),
      monitor,
      tracker: ConnectionTracker::default(),
      view_stack: Vec::new(),
      command_input: CommandInput::new(UiMode::Mechanic),
      should_quit: false,
    };
    app.sync_auth();
    app
  }

  pub async fn run(&mut self) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    stdout().execute(EnableFocusChange)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = self.event_loop(&mut terminal).await;

    // Cleanup terminal
    stdout().execute(DisableFocusChange)?;
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    if let Some(keepalive) = self.keepalive.take() {
      keepalive.shutdown().await;
    }

    result
  }

  async fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>) -> Result<()> {
    let mut events = EventHandler::new(Duration::from_millis(250));

    while !self.should_quit {
      terminal.draw(|frame| ui::draw(frame, self))?;

      match events.next().await {
        Some(event) => self.handle_event(event),
        None => break,
      }
    }
    Ok(())
  }

  fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) => self.handle_key(key),
      Event::FocusLost => {
        if let Some(keepalive) = &self.keepalive {
          keepalive.set_backgrounded(true);
        }
      }
      Event::FocusGained => {
        if let Some(keepalive) = &self.keepalive {
          keepalive.set_backgrounded(false);
        }
        self.monitor.recheck();
      }
      Event::Tick => {}
    }
    self.tick();
  }

  /// Poll the session, the connection and every view's queries
  fn tick(&mut self) {
    self.sync_auth();

    if let Some(online) = self.monitor.changed() {
      if self.tracker.observe(online, Instant::now()) {
        if let Some(keepalive) = &self.keepalive {
          keepalive.network_changed(online);
        }
      }
    }

    for view in &mut self.view_stack {
      view.tick();
    }
  }

  fn sync_auth(&mut self) {
    self.gate.poll();
    let state = self.gate.state();
    if let Some(user) = state.user() {
      self.user = Some(user.clone());
    }

    let next = Screen::for_state(&self.screen, &state);
    if next == self.screen && !self.view_stack.is_empty() {
      return;
    }
    if next == Screen::Splash && self.screen == Screen::Splash {
      return;
    }

    tracing::debug!(from = ?self.screen, to = ?next, "Switching screens");
    self.view_stack.clear();
    match &next {
      Screen::Splash => {}
      Screen::Login => {
        self.user = None;
        let notice = self.gate.error().map(str::to_string);
        self.view_stack.push(Box::new(LoginView::new(
          self.workshop.backend().clone(),
          self.monitor.subscribe(),
          notice,
        )));
      }
      Screen::Home { mode, .. } => {
        self.command_input = CommandInput::new(*mode);
        if let Some(ctx) = self.view_context() {
          let home: Box<dyn View> = match mode {
            UiMode::Admin => Box::new(DashboardView::new(ctx)),
            UiMode::Mechanic => Box::new(RepairsView::new(ctx)),
          };
          self.view_stack.push(home);
        }
      }
    }
    self.screen = next;
  }

  fn view_context(&self) -> Option<ViewContext> {
    Some(ViewContext {
      workshop: self.workshop.clone(),
      config: self.config.clone(),
      user: self.user.clone()?,
    })
  }

  fn mode(&self) -> Option<UiMode> {
    match &self.screen {
      Screen::Home { mode, .. } => Some(*mode),
      _ => None,
    }
  }

  fn handle_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
      self.should_quit = true;
      return;
    }

    let view_owns_keys = self
      .view_stack
      .last()
      .is_some_and(|v| v.captures_input());
    if self.mode().is_some() && (self.command_input.is_active() || !view_owns_keys) {
      match self.command_input.handle_key(key) {
        KeyResult::Event(CommandEvent::Run(cmd)) => {
          self.execute_command(cmd);
          return;
        }
        KeyResult::Event(CommandEvent::Unknown(input)) => {
          tracing::debug!(input = %input, "Unknown command");
          return;
        }
        KeyResult::Event(CommandEvent::Cancelled) | KeyResult::Handled => return,
        KeyResult::NotHandled => {}
      }
    }

    let Some(view) = self.view_stack.last_mut() else {
      return;
    };
    match view.handle_key(key) {
      ViewAction::None => {}
      ViewAction::Push(view) => self.view_stack.push(view),
      ViewAction::Pop => {
        if self.view_stack.len() > 1 {
          self.view_stack.pop();
        } else {
          self.should_quit = true;
        }
      }
    }
  }

  fn execute_command(&mut self, cmd: &Command) {
    tracing::debug!(command = cmd.name, "Running command");
    match cmd.name {
      "logout" => self.sign_out(),
      "quit" => self.should_quit = true,
      name => {
        let Some(ctx) = self.view_context() else {
          return;
        };
        let root: Box<dyn View> = match name {
          "dashboard" => Box::new(DashboardView::new(ctx)),
          "comments" => Box::new(CommentsView::new(ctx)),
          "history" => Box::new(HistoryView::new(ctx)),
          _ => Box::new(RepairsView::new(ctx)),
        };
        self.view_stack = vec![root];
      }
    }
  }

  fn sign_out(&mut self) {
    let workshop = self.workshop.clone();
    tokio::spawn(async move { workshop.sign_out().await });
  }

  // Accessors for the draw function

  pub fn current_view(&self) -> Option<&dyn View> {
    self.view_stack.last().map(|v| v.as_ref())
  }

  pub fn current_view_mut(&mut self) -> Option<&mut (dyn View + 'static)> {
    self.view_stack.last_mut().map(|v| v.as_mut())
  }

  pub fn header_info(&self) -> HeaderInfo<'_> {
    HeaderInfo {
      title: &self.title,
      user: self.user.as_ref(),
      online: self.tracker.is_online(),
      reconnecting: self.tracker.is_reconnecting(Instant::now()),
    }
  }

  pub fn breadcrumb(&self) -> Vec<String> {
    self.view_stack.iter().map(|v| v.breadcrumb_label()).collect()
  }

  pub fn command_input(&self) -> &CommandInput {
    &self.command_input
  }

  pub fn connection_notice(&self) -> Option<ConnectionNotice> {
    self.tracker.notice(Instant::now())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::backend::types::Role;
  use chrono::Utc;

  fn user(id: &str, role: Role) -> User {
    User {
      id: id.to_string(),
      email: format!("{id}@taller.com"),
      role,
      full_name: "Ana".to_string(),
      created_at: Utc::now(),
    }
  }

  fn home(id: &str, mode: UiMode) -> Screen {
    Screen::Home {
      user_id: id.to_string(),
      mode,
    }
  }

  #[test]
  fn test_role_picks_home_screen() {
    let admin = AuthState::Authenticated(user("a1", Role::Admin));
    assert_eq!(Screen::for_state(&Screen::Splash, &admin), home("a1", UiMode::Admin));

    let mechanic = AuthState::Authenticated(user("m1", Role::Mechanic));
    assert_eq!(Screen::for_state(&Screen::Login, &mechanic), home("m1", UiMode::Mechanic));
  }

  #[test]
  fn test_profile_reload_keeps_home() {
    let current = home("a1", UiMode::Admin);
    assert_eq!(Screen::for_state(&current, &AuthState::Loading), current);
    assert_eq!(Screen::for_state(&Screen::Login, &AuthState::Loading), Screen::Splash);
  }

  #[test]
  fn test_role_change_switches_home() {
    let current = home("a1", UiMode::Admin);
    let demoted = AuthState::Authenticated(user("a1", Role::Mechanic));
    assert_eq!(Screen::for_state(&current, &demoted), home("a1", UiMode::Mechanic));
  }

  #[test]
  fn test_sign_out_shows_login() {
    let current = home("m1", UiMode::Mechanic);
    assert_eq!(Screen::for_state(&current, &AuthState::Unauthenticated), Screen::Login);
  }
}
