pub mod components;
pub mod renderfns;
pub mod view;
pub mod views;

use crate::app::App;
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// Main draw function
pub fn draw(frame: &mut Frame, app: &mut App) {
  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .constraints([
      Constraint::Length(1), // Header
      Constraint::Min(1),    // Main content
      Constraint::Length(1), // Footer
    ])
    .split(frame.area());

  let shortcuts = app.current_view().map(|v| v.shortcuts()).unwrap_or_default();
  renderfns::draw_header(frame, chunks[0], &app.header_info(), &shortcuts);

  match app.current_view_mut() {
    Some(view) => view.render(frame, chunks[1]),
    None => {
      let splash = Paragraph::new("Loading profile...")
        .alignment(Alignment::Center)
        .style(Style::default().fg(Color::DarkGray));
      let area = Rect::new(chunks[1].x, chunks[1].y + chunks[1].height / 2, chunks[1].width, 1);
      frame.render_widget(splash, area);
    }
  }

  renderfns::draw_footer(frame, chunks[2], &app.breadcrumb());

  app.command_input().render_overlay(frame, chunks[1]);

  if let Some(notice) = app.connection_notice() {
    renderfns::draw_notice(frame, chunks[1], notice);
  }
}

/// Clamp a list selection to `len` items; select the first item when
/// nothing is selected and the list is not empty.
pub fn ensure_valid_selection(selected: Option<usize>, len: usize) -> Option<usize> {
  if len == 0 {
    return None;
  }
  Some(selected.map_or(0, |i| i.min(len - 1)))
}
