use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

use crate::backend::types::User;
use crate::ui::view::ShortcutInfo;

/// What the header shows besides the shortcuts
pub struct HeaderInfo<'a> {
  pub title: &'a str,
  pub user: Option<&'a User>,
  pub online: bool,
  pub reconnecting: bool,
}

/// Draw the header bar with title, signed-in user, connection state and shortcuts
pub fn draw_header(frame: &mut Frame, area: Rect, info: &HeaderInfo, shortcuts: &[ShortcutInfo]) {
  let separator = Span::styled("│", Style::default().fg(Color::DarkGray));

  let mut spans = vec![
    Span::styled(format!(" {} ", info.title), Style::default().fg(Color::Cyan).bold()),
    separator.clone(),
  ];

  if let Some(user) = info.user {
    spans.push(Span::styled(
      format!(" {} ", user.full_name),
      Style::default().fg(Color::White),
    ));
    spans.push(Span::styled(
      format!("({}) ", user.role.label()),
      Style::default().fg(Color::Yellow),
    ));
    spans.push(separator.clone());
  }

  let (dot, label) = connection_label(info.online, info.reconnecting);
  spans.push(Span::styled(format!(" ● {} ", label), Style::default().fg(dot)));
  spans.push(Span::raw("  "));

  let mut shortcuts = shortcuts.to_vec();
  shortcuts.sort_by_key(|s| s.priority);
  for (i, shortcut) in shortcuts.iter().enumerate() {
    if i > 0 {
      spans.push(Span::raw("   "));
    }
    spans.push(Span::styled(
      format!("<{}>", shortcut.key),
      Style::default().fg(Color::Cyan),
    ));
    spans.push(Span::styled(
      format!(" {}", shortcut.label),
      Style::default().fg(Color::DarkGray),
    ));
  }

  let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
  frame.render_widget(paragraph, area);
}

fn connection_label(online: bool, reconnecting: bool) -> (Color, &'static str) {
  match (online, reconnecting) {
    (false, _) => (Color::Red, "offline"),
    (true, true) => (Color::Yellow, "reconnecting"),
    (true, false) => (Color::Green, "online"),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_connection_label() {
    assert_eq!(connection_label(false, false), (Color::Red, "offline"));
    assert_eq!(connection_label(true, true), (Color::Yellow, "reconnecting"));
    assert_eq!(connection_label(true, false), (Color::Green, "online"));
  }
}
