use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, Paragraph};

use crate::connection::ConnectionNotice;

/// Draw the transient connection notice in the bottom-right corner of `area`
pub fn draw_notice(frame: &mut Frame, area: Rect, notice: ConnectionNotice) {
  let message = notice.message();
  let color = match notice {
    ConnectionNotice::Offline => Color::Red,
    ConnectionNotice::Reconnecting => Color::Yellow,
    ConnectionNotice::Restored => Color::Green,
  };

  let width = (message.chars().count() as u16 + 4).min(area.width);
  let height = 3.min(area.height);
  let rect = Rect::new(
    area.x + area.width.saturating_sub(width + 1),
    area.y + area.height.saturating_sub(height),
    width,
    height,
  );

  frame.render_widget(Clear, rect);
  let block = Block::default()
    .borders(Borders::ALL)
    .border_style(Style::default().fg(color));
  let paragraph = Paragraph::new(message)
    .style(Style::default().fg(color).bold())
    .alignment(Alignment::Center)
    .block(block);
  frame.render_widget(paragraph, rect);
}
