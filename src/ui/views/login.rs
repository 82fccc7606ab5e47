use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use tokio::sync::watch;

use crate::backend::BackendClient;
use crate::error::AuthError;
use crate::query::{Query, QueryState};
use crate::ui::components::{InputResult, TextInput};
use crate::ui::view::{ShortcutInfo, View, ViewAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
  Email,
  Password,
}

/// Email and password sign-in.
///
/// A successful sign-in changes the backend session; the App notices and
/// swaps this view for the role's home screen.
pub struct LoginView {
  backend: BackendClient,
  online: watch::Receiver<bool>,
  email: TextInput,
  password: TextInput,
  focus: Focus,
  sign_in: Option<Query<()>>,
  error: Option<String>,
}

impl LoginView {
  /// `notice` is shown as the initial error, e.g. a profile that failed to load
  pub fn new(backend: BackendClient, online: watch::Receiver<bool>, notice: Option<String>) -> Self {
    Self {
      backend,
      online,
      email: TextInput::new(),
      password: TextInput::masked(),
      focus: Focus::Email,
      sign_in: None,
      error: notice,
    }
  }

  fn is_online(&self) -> bool {
    *self.online.borrow()
  }

  fn is_signing_in(&self) -> bool {
    self.sign_in.as_ref().is_some_and(|q| q.is_pending())
  }

  fn submit(&mut self) {
    if self.is_signing_in() {
      return;
    }
    if !self.is_online() {
      self.error = Some(AuthError::Offline.to_string());
      return;
    }

    let backend = self.backend.clone();
    let email = self.email.value().to_string();
    let password = self.password.value().to_string();
    let query = Query::action(move || {
      let backend = backend.clone();
      let email = email.clone();
      let password = password.clone();
      async move {
        backend
          .sign_in(&email, &password)
          .await
          .map(|_| ())
          .map_err(|e| e.to_string())
      }
    });
    self.sign_in = Some(query);
    self.error = None;
  }

  fn focused_input(&mut self) -> &mut TextInput {
    match self.focus {
      Focus::Email => &mut self.email,
      Focus::Password => &mut self.password,
    }
  }
}

fn field_line(label: &'static str, input: &TextInput, focused: bool) -> Line<'static> {
  let label_style = if focused {
    Style::default().fg(Color::Cyan).bold()
  } else {
    Style::default().fg(Color::DarkGray)
  };
  let mut spans = vec![Span::styled(format!("{:<10}", label), label_style)];
  spans.extend(input.spans(focused));
  Line::from(spans)
}

impl View for LoginView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Tab | KeyCode::BackTab | KeyCode::Down | KeyCode::Up => {
        self.focus = match self.focus {
          Focus::Email => Focus::Password,
          Focus::Password => Focus::Email,
        };
        return ViewAction::None;
      }
      KeyCode::Enter if self.focus == Focus::Email => {
        self.focus = Focus::Password;
        return ViewAction::None;
      }
      _ => {}
    }

    match self.focused_input().handle_key(key) {
      InputResult::Submitted(_) => self.submit(),
      InputResult::Consumed => self.error = None,
      InputResult::Cancelled | InputResult::NotHandled => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let width = 50.min(area.width);
    let height = 11.min(area.height);
    let rect = Rect::new(
      area.x + area.width.saturating_sub(width) / 2,
      area.y + area.height.saturating_sub(height) / 2,
      width,
      height,
    );

    let block = Block::default()
      .title(" Sign in ")
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    let mut lines = vec![
      Line::raw(""),
      field_line("Email", &self.email, self.focus == Focus::Email),
      Line::raw(""),
      field_line("Password", &self.password, self.focus == Focus::Password),
      Line::raw(""),
    ];

    if !self.is_online() {
      lines.push(Line::styled(
        "No internet connection. Sign-in is unavailable.",
        Style::default().fg(Color::Yellow),
      ));
    }

    match self.sign_in.as_ref().map(|q| q.state()) {
      Some(QueryState::Loading) => {
        lines.push(Line::styled("Signing in...", Style::default().fg(Color::Yellow)));
      }
      _ => {
        if let Some(error) = &self.error {
          lines.push(Line::styled(error.clone(), Style::default().fg(Color::Red)));
        }
      }
    }

    let paragraph = Paragraph::new(lines)
      .block(block)
      .wrap(Wrap { trim: true });
    frame.render_widget(paragraph, rect);
  }

  fn breadcrumb_label(&self) -> String {
    "Sign in".to_string()
  }

  fn captures_input(&self) -> bool {
    true
  }

  fn tick(&mut self) {
    if let Some(query) = &mut self.sign_in {
      if query.poll() {
        if let Some(error) = query.error() {
          self.error = Some(error.to_string());
          self.password.clear();
        }
      }
    }
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new("Tab", "next field").with_priority(10),
      ShortcutInfo::new("Enter", "sign in").with_priority(20),
      ShortcutInfo::new("Ctrl-C", "quit").with_priority(90),
    ]
  }
}
