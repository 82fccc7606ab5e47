use super::input::{InputResult, TextInput};
use super::KeyResult;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};

#[derive(Debug, Clone)]
enum FieldKind {
  Text(TextInput),
  Choice { options: Vec<String>, selected: usize },
}

#[derive(Debug, Clone)]
struct Field {
  name: &'static str,
  label: &'static str,
  kind: FieldKind,
}

/// Values of a submitted form, looked up by field name
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FormValues {
  values: Vec<(&'static str, FieldValue)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FieldValue {
  Text(String),
  Choice(usize),
}

impl FormValues {
  /// Trimmed text of a text field; empty when absent
  pub fn text(&self, name: &str) -> String {
    self
      .values
      .iter()
      .find_map(|(n, v)| match v {
        FieldValue::Text(s) if *n == name => Some(s.trim().to_string()),
        _ => None,
      })
      .unwrap_or_default()
  }

  /// Text exactly as typed, for passwords
  pub fn raw(&self, name: &str) -> String {
    self
      .values
      .iter()
      .find_map(|(n, v)| match v {
        FieldValue::Text(s) if *n == name => Some(s.clone()),
        _ => None,
      })
      .unwrap_or_default()
  }

  /// Selected option index of a choice field
  pub fn choice(&self, name: &str) -> Option<usize> {
    self.values.iter().find_map(|(n, v)| match v {
      FieldValue::Choice(i) if *n == name => Some(*i),
      _ => None,
    })
  }
}

/// Events emitted by the form that parent needs to handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormEvent {
  Submitted(FormValues),
  Cancelled,
}

/// Modal overlay form with text and choice fields.
///
/// Tab and arrow keys move between fields, Left/Right cycle a choice,
/// Enter submits and Esc cancels. The form stays open after a submit so
/// the parent can show a validation error or keep it busy while saving;
/// the parent hides it once the save succeeds.
#[derive(Debug, Clone, Default)]
pub struct Form {
  active: bool,
  title: String,
  fields: Vec<Field>,
  focused: usize,
  error: Option<String>,
  busy: bool,
}

impl Form {
  pub fn new(title: impl Into<String>) -> Self {
    Self {
      title: title.into(),
      ..Self::default()
    }
  }

  pub fn text(mut self, name: &'static str, label: &'static str) -> Self {
    self.fields.push(Field {
      name,
      label,
      kind: FieldKind::Text(TextInput::new()),
    });
    self
  }

  pub fn password(mut self, name: &'static str, label: &'static str) -> Self {
    self.fields.push(Field {
      name,
      label,
      kind: FieldKind::Text(TextInput::masked()),
    });
    self
  }

  pub fn choice(mut self, name: &'static str, label: &'static str, options: Vec<String>) -> Self {
    self.fields.push(Field {
      name,
      label,
      kind: FieldKind::Choice {
        options,
        selected: 0,
      },
    });
    self
  }

  pub fn is_active(&self) -> bool {
    self.active
  }

  /// Open the form, resetting every field
  pub fn show(&mut self) {
    for field in &mut self.fields {
      match &mut field.kind {
        FieldKind::Text(input) => input.clear(),
        FieldKind::Choice { selected, .. } => *selected = 0,
      }
    }
    self.focused = 0;
    self.error = None;
    self.busy = false;
    self.active = true;
  }

  pub fn hide(&mut self) {
    self.active = false;
    self.busy = false;
    self.error = None;
  }

  pub fn set_error(&mut self, error: impl Into<String>) {
    self.error = Some(error.into());
    self.busy = false;
  }

  pub fn set_busy(&mut self, busy: bool) {
    self.busy = busy;
    if busy {
      self.error = None;
    }
  }

  /// Preselect an option in a choice field
  pub fn select(&mut self, name: &str, index: usize) {
    if let Some(field) = self.fields.iter_mut().find(|f| f.name == name) {
      if let FieldKind::Choice { options, selected } = &mut field.kind {
        *selected = index.min(options.len().saturating_sub(1));
      }
    }
  }

  fn values(&self) -> FormValues {
    FormValues {
      values: self
        .fields
        .iter()
        .map(|f| {
          let value = match &f.kind {
            FieldKind::Text(input) => FieldValue::Text(input.value().to_string()),
            FieldKind::Choice { selected, .. } => FieldValue::Choice(*selected),
          };
          (f.name, value)
        })
        .collect(),
    }
  }

  fn move_focus(&mut self, forward: bool) {
    if self.fields.is_empty() {
      return;
    }
    let n = self.fields.len();
    self.focused = if forward {
      (self.focused + 1) % n
    } else {
      (self.focused + n - 1) % n
    };
  }

  pub fn handle_key(&mut self, key: KeyEvent) -> KeyResult<FormEvent> {
    if !self.active {
      return KeyResult::NotHandled;
    }

    match key.code {
      KeyCode::Esc => {
        self.hide();
        return KeyResult::Event(FormEvent::Cancelled);
      }
      // ignore input while a save is in flight
      _ if self.busy => return KeyResult::Handled,
      KeyCode::Enter => return KeyResult::Event(FormEvent::Submitted(self.values())),
      KeyCode::Tab | KeyCode::Down => {
        self.move_focus(true);
        return KeyResult::Handled;
      }
      KeyCode::BackTab | KeyCode::Up => {
        self.move_focus(false);
        return KeyResult::Handled;
      }
      _ => {}
    }

    let Some(field) = self.fields.get_mut(self.focused) else {
      return KeyResult::Handled;
    };

    match &mut field.kind {
      FieldKind::Choice { options, selected } => {
        let n = options.len().max(1);
        match key.code {
          KeyCode::Right | KeyCode::Char(' ') | KeyCode::Char('l') => *selected = (*selected + 1) % n,
          KeyCode::Left | KeyCode::Char('h') => *selected = (*selected + n - 1) % n,
          _ => {}
        }
      }
      FieldKind::Text(input) => {
        if input.handle_key(key) == InputResult::Consumed {
          self.error = None;
        }
      }
    }
    KeyResult::Handled
  }

  pub fn render_overlay(&self, frame: &mut Frame, area: Rect) {
    if !self.active {
      return;
    }

    let width = (area.width * 60 / 100).clamp(40.min(area.width), 70.min(area.width));
    let height = (self.fields.len() as u16 + 5).min(area.height);
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    let overlay_area = Rect::new(x, y, width, height);

    frame.render_widget(Clear, overlay_area);

    let block = Block::default()
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Yellow))
      .title(format!(" {} ", self.title));
    let inner = block.inner(overlay_area);
    frame.render_widget(block, overlay_area);

    let label_width = self
      .fields
      .iter()
      .map(|f| f.label.chars().count())
      .max()
      .unwrap_or(0)
      + 2;

    let mut lines: Vec<Line> = self
      .fields
      .iter()
      .enumerate()
      .map(|(i, field)| {
        let focused = i == self.focused;
        let label_style = if focused {
          Style::default().fg(Color::Cyan).bold()
        } else {
          Style::default().fg(Color::DarkGray)
        };
        let mut spans = vec![Span::styled(
          format!("{:<width$}", format!("{}:", field.label), width = label_width),
          label_style,
        )];
        match &field.kind {
          FieldKind::Text(input) => {
            spans.extend(input.spans(focused && !self.busy));
          }
          FieldKind::Choice { options, selected } => {
            let value = options.get(*selected).map(String::as_str).unwrap_or("-");
            spans.push(Span::styled(
              format!("< {} >", value),
              Style::default().fg(Color::White),
            ));
          }
        }
        Line::from(spans)
      })
      .collect();

    lines.push(Line::raw(""));
    lines.push(if self.busy {
      Line::styled("Saving...", Style::default().fg(Color::Yellow))
    } else if let Some(error) = &self.error {
      Line::styled(error.clone(), Style::default().fg(Color::Red))
    } else {
      Line::styled(
        "Tab: next field  ←/→: change option  Enter: save  Esc: cancel",
        Style::default().fg(Color::DarkGray),
      )
    });

    frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }), inner);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crossterm::event::KeyModifiers;

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  fn type_str(form: &mut Form, s: &str) {
    for c in s.chars() {
      form.handle_key(key(KeyCode::Char(c)));
    }
  }

  fn machine_form() -> Form {
    Form::new("New machine")
      .text("plant", "Plant")
      .text("name", "Name")
      .choice("kind", "Kind", vec!["Compressor".to_string(), "Lathe".to_string()])
  }

  #[test]
  fn test_fill_and_submit() {
    let mut form = machine_form();
    form.show();
    type_str(&mut form, " Norte ");
    form.handle_key(key(KeyCode::Tab));
    type_str(&mut form, "Torno");
    form.handle_key(key(KeyCode::Tab));
    form.handle_key(key(KeyCode::Right));

    let KeyResult::Event(FormEvent::Submitted(values)) = form.handle_key(key(KeyCode::Enter)) else {
      panic!("expected submit");
    };
    assert_eq!(values.text("plant"), "Norte");
    assert_eq!(values.raw("plant"), " Norte ");
    assert_eq!(values.text("name"), "Torno");
    assert_eq!(values.choice("kind"), Some(1));
    // stays open until the parent hides it
    assert!(form.is_active());
  }

  #[test]
  fn test_busy_form_ignores_input_but_can_cancel() {
    let mut form = machine_form();
    form.show();
    form.set_busy(true);
    type_str(&mut form, "x");
    assert_eq!(form.handle_key(key(KeyCode::Enter)), KeyResult::Handled);
    assert_eq!(
      form.handle_key(key(KeyCode::Esc)),
      KeyResult::Event(FormEvent::Cancelled)
    );
    assert!(!form.is_active());
  }

  #[test]
  fn test_show_resets_fields() {
    let mut form = machine_form();
    form.show();
    type_str(&mut form, "Sur");
    form.select("kind", 1);
    form.hide();

    form.show();
    let KeyResult::Event(FormEvent::Submitted(values)) = form.handle_key(key(KeyCode::Enter)) else {
      panic!("expected submit");
    };
    assert_eq!(values.text("plant"), "");
    assert_eq!(values.choice("kind"), Some(0));
  }

  #[test]
  fn test_choice_wraps_backwards() {
    let mut form = machine_form();
    form.show();
    form.handle_key(key(KeyCode::BackTab));
    form.handle_key(key(KeyCode::Left));
    let KeyResult::Event(FormEvent::Submitted(values)) = form.handle_key(key(KeyCode::Enter)) else {
      panic!("expected submit");
    };
    assert_eq!(values.choice("kind"), Some(1));
  }
}
