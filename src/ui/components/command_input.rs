use super::input::{InputResult, TextInput};
use super::KeyResult;
use crate::commands::{self, Command};
use crate::session::UiMode;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph};

const MAX_SUGGESTIONS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandEvent {
  /// A command the current role may run
  Run(&'static Command),
  /// Enter on text that matches nothing available
  Unknown(String),
  Cancelled,
}

/// The `:` palette. Only offers, and only resolves, the commands the
/// signed-in role may run.
#[derive(Debug, Clone)]
pub struct CommandInput {
  mode: UiMode,
  input: TextInput,
  active: bool,
  /// Matches for the current text, best first
  suggestions: Vec<&'static Command>,
  highlighted: usize,
}

impl CommandInput {
  pub fn new(mode: UiMode) -> Self {
    Self {
      mode,
      input: TextInput::new(),
      active: false,
      suggestions: Vec::new(),
      highlighted: 0,
    }
  }

  pub fn is_active(&self) -> bool {
    self.active
  }

  pub fn activate(&mut self) {
    self.active = true;
    self.input.clear();
    self.refresh_suggestions();
  }

  fn close(&mut self) {
    self.active = false;
    self.input.clear();
    self.suggestions.clear();
    self.highlighted = 0;
  }

  fn refresh_suggestions(&mut self) {
    self.suggestions = commands::get_suggestions(self.input.value(), self.mode);
    self.highlighted = 0;
  }

  fn move_highlight(&mut self, forward: bool) {
    let len = self.suggestions.len().min(MAX_SUGGESTIONS);
    if len == 0 {
      return;
    }
    self.highlighted = if forward {
      (self.highlighted + 1) % len
    } else {
      (self.highlighted + len - 1) % len
    };
  }

  /// The highlighted suggestion wins; otherwise the typed text must name
  /// an available command or alias.
  fn chosen(&self) -> CommandEvent {
    if let Some(cmd) = self.suggestions.get(self.highlighted) {
      return CommandEvent::Run(cmd);
    }
    let typed = self.input.value().trim();
    match commands::resolve(typed, self.mode) {
      Some(cmd) => CommandEvent::Run(cmd),
      None => CommandEvent::Unknown(typed.to_string()),
    }
  }

  /// Opens on `:`; while open, owns every key.
  pub fn handle_key(&mut self, key: KeyEvent) -> KeyResult<CommandEvent> {
    if !self.active {
      if key.code == KeyCode::Char(':') {
        self.activate();
        return KeyResult::Handled;
      }
      return KeyResult::NotHandled;
    }

    match key.code {
      KeyCode::Tab | KeyCode::Down => self.move_highlight(true),
      KeyCode::BackTab | KeyCode::Up => self.move_highlight(false),
      _ => match self.input.handle_key(key) {
        InputResult::Submitted(_) => {
          let event = self.chosen();
          self.close();
          return KeyResult::Event(event);
        }
        InputResult::Cancelled => {
          self.close();
          return KeyResult::Event(CommandEvent::Cancelled);
        }
        InputResult::Consumed => self.refresh_suggestions(),
        InputResult::NotHandled => {}
      },
    }
    KeyResult::Handled
  }

  /// Drawn over the top-left of `area` while open.
  pub fn render_overlay(&self, frame: &mut Frame, area: Rect) {
    if !self.active {
      return;
    }

    let shown = self.suggestions.len().min(MAX_SUGGESTIONS) as u16;
    let width = (area.width * 3 / 5).clamp(30, 60).min(area.width);
    let height = (3 + shown).min(area.height);
    let overlay = Rect::new(area.x + 1, area.y + 1, width.saturating_sub(1), height);
    frame.render_widget(Clear, overlay);

    let title = match self.mode {
      UiMode::Admin => " Command ",
      UiMode::Mechanic => " Command (mechanic) ",
    };
    let block = Block::default()
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Yellow))
      .title(title);
    let inner = block.inner(overlay);
    frame.render_widget(block, overlay);
    if inner.height == 0 {
      return;
    }

    let [prompt_area, list_area] =
      Layout::vertical([Constraint::Length(1), Constraint::Min(0)]).areas(inner);

    let mut prompt = vec![Span::styled(":", Style::default().fg(Color::Yellow))];
    prompt.extend(self.input.spans(true));
    frame.render_widget(Paragraph::new(Line::from(prompt)), prompt_area);

    if self.suggestions.is_empty() || list_area.height == 0 {
      return;
    }
    let items: Vec<ListItem> = self
      .suggestions
      .iter()
      .take(MAX_SUGGESTIONS)
      .map(|cmd| {
        ListItem::new(Line::from(vec![
          Span::styled(format!("{:<12}", cmd.name), Style::default().fg(Color::Cyan)),
          Span::styled(cmd.description, Style::default().fg(Color::DarkGray)),
        ]))
      })
      .collect();
    let list = List::new(items).highlight_style(Style::default().bg(Color::DarkGray).fg(Color::White));
    let mut state = ListState::default().with_selected(Some(self.highlighted));
    frame.render_stateful_widget(list, list_area, &mut state);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crossterm::event::KeyModifiers;

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  fn type_str(input: &mut CommandInput, s: &str) {
    for c in s.chars() {
      input.handle_key(key(KeyCode::Char(c)));
    }
  }

  fn run_name(result: KeyResult<CommandEvent>) -> Option<&'static str> {
    match result {
      KeyResult::Event(CommandEvent::Run(cmd)) => Some(cmd.name),
      _ => None,
    }
  }

  #[test]
  fn test_colon_activates() {
    let mut input = CommandInput::new(UiMode::Admin);
    assert_eq!(input.handle_key(key(KeyCode::Char('x'))), KeyResult::NotHandled);
    assert_eq!(input.handle_key(key(KeyCode::Char(':'))), KeyResult::Handled);
    assert!(input.is_active());
  }

  #[test]
  fn test_submit_runs_best_match() {
    let mut input = CommandInput::new(UiMode::Admin);
    input.activate();
    type_str(&mut input, "hist");
    assert_eq!(run_name(input.handle_key(key(KeyCode::Enter))), Some("history"));
    assert!(!input.is_active());
  }

  #[test]
  fn test_tab_moves_highlight() {
    let mut input = CommandInput::new(UiMode::Mechanic);
    input.activate();
    // mechanic sees repairs, logout, quit
    input.handle_key(key(KeyCode::Tab));
    assert_eq!(run_name(input.handle_key(key(KeyCode::Enter))), Some("logout"));

    input.activate();
    input.handle_key(key(KeyCode::BackTab));
    assert_eq!(run_name(input.handle_key(key(KeyCode::Enter))), Some("quit"));
  }

  #[test]
  fn test_mechanic_cannot_reach_admin_commands() {
    let mut input = CommandInput::new(UiMode::Mechanic);
    input.activate();
    type_str(&mut input, "dashboard");
    assert_eq!(
      input.handle_key(key(KeyCode::Enter)),
      KeyResult::Event(CommandEvent::Unknown("dashboard".to_string()))
    );
  }

  #[test]
  fn test_escape_cancels() {
    let mut input = CommandInput::new(UiMode::Admin);
    input.activate();
    type_str(&mut input, "rep");
    assert_eq!(
      input.handle_key(key(KeyCode::Esc)),
      KeyResult::Event(CommandEvent::Cancelled)
    );
    assert!(!input.is_active());
  }
}
