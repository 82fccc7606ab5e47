use ratatui::prelude::Color;

use crate::backend::types::RepairStatus;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Get the display color for a repair status
pub fn status_color(status: RepairStatus) -> Color {
  match status {
    RepairStatus::Completed => Color::Green,
    RepairStatus::InProgress => Color::Yellow,
    RepairStatus::Pending => Color::Red,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_truncate_short_string() {
    assert_eq!(truncate("hello", 10), "hello");
  }

  #[test]
  fn test_truncate_exact_length() {
    assert_eq!(truncate("hello", 5), "hello");
  }

  #[test]
  fn test_truncate_long_string() {
    assert_eq!(truncate("hello world", 8), "hello...");
  }

  #[test]
  fn test_truncate_multibyte() {
    assert_eq!(truncate("Revisión de frenos", 10), "Revisió...");
  }

  #[test]
  fn test_status_colors() {
    assert_eq!(status_color(RepairStatus::Completed), Color::Green);
    assert_eq!(status_color(RepairStatus::InProgress), Color::Yellow);
    assert_eq!(status_color(RepairStatus::Pending), Color::Red);
  }
}
