use crossterm::event::KeyEvent;
use ratatui::prelude::*;

/// Key hint shown in the header, lowest priority first
#[derive(Debug, Clone)]
pub struct ShortcutInfo {
  pub key: &'static str,
  pub label: &'static str,
  pub priority: u8,
}

impl ShortcutInfo {
  pub const fn new(key: &'static str, label: &'static str) -> Self {
    Self {
      key,
      label,
      priority: 100,
    }
  }

  pub const fn with_priority(mut self, priority: u8) -> Self {
    self.priority = priority;
    self
  }
}

/// Navigation requested by a view
pub enum ViewAction {
  None,
  Push(Box<dyn View>),
  /// Back; at the root this quits
  Pop,
}

/// One screen on the App's stack.
///
/// Views own their data queries and overlays. The App forwards keys the
/// command palette does not take, calls `tick` after every event so
/// queries can be polled, and draws the top view each frame.
pub trait View {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction;

  fn render(&mut self, frame: &mut Frame, area: Rect);

  /// Footer breadcrumb segment
  fn breadcrumb_label(&self) -> String;

  /// True while a text field or overlay of the view has the keyboard,
  /// so `:` and `q` are typed instead of acted on
  fn captures_input(&self) -> bool {
    false
  }

  fn tick(&mut self) {}

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("q", "back").with_priority(90),
    ]
  }
}
