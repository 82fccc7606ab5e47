//! Palette commands and their matching rules.

use crate::session::UiMode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub description: &'static str,
  /// Hidden from mechanics
  pub admin_only: bool,
}

impl Command {
  pub fn available_to(&self, mode: UiMode) -> bool {
    !self.admin_only || mode == UiMode::Admin
  }
}

/// All available commands
pub const COMMANDS: &[Command] = &[
  Command {
    name: "dashboard",
    aliases: &["d", "home"],
    description: "Workshop overview",
    admin_only: true,
  },
  Command {
    name: "comments",
    aliases: &["c", "pending"],
    description: "Unread mechanic comments",
    admin_only: true,
  },
  Command {
    name: "repairs",
    aliases: &["r", "repair"],
    description: "Active repairs",
    admin_only: false,
  },
  Command {
    name: "history",
    aliases: &["h", "report"],
    description: "Repair history and PDF export",
    admin_only: true,
  },
  Command {
    name: "logout",
    aliases: &["signout", "exit-session"],
    description: "Sign out",
    admin_only: false,
  },
  Command {
    name: "quit",
    aliases: &["q", "exit"],
    description: "Exit taller",
    admin_only: false,
  },
];

/// Get autocomplete suggestions for a given input
pub fn get_suggestions(input: &str, mode: UiMode) -> Vec<&'static Command> {
  let input_lower = input.to_lowercase();
  let available = COMMANDS.iter().filter(|cmd| cmd.available_to(mode));

  if input_lower.is_empty() {
    return available.collect();
  }

  let mut matches: Vec<(&Command, u32)> = Vec::new();

  for cmd in available {
    // Exact match on name
    if cmd.name == input_lower {
      matches.push((cmd, 0));
      continue;
    }

    // Exact match on alias
    if cmd.aliases.contains(&input_lower.as_str()) {
      matches.push((cmd, 1));
      continue;
    }

    // Prefix match on name
    if cmd.name.starts_with(&input_lower) {
      matches.push((cmd, 2));
      continue;
    }

    // Prefix match on alias
    if cmd.aliases.iter().any(|a| a.starts_with(&input_lower)) {
      matches.push((cmd, 3));
      continue;
    }

    // Fuzzy match (contains)
    if cmd.name.contains(&input_lower) {
      matches.push((cmd, 4));
      continue;
    }

    // Fuzzy match on alias
    if cmd.aliases.iter().any(|a| a.contains(&input_lower)) {
      matches.push((cmd, 5));
    }
  }

  // Sort by priority
  matches.sort_by_key(|(_, priority)| *priority);

  matches.into_iter().map(|(cmd, _)| cmd).collect()
}

/// Resolve typed text to a command the user may run
pub fn resolve(input: &str, mode: UiMode) -> Option<&'static Command> {
  let input_lower = input.trim().to_lowercase();
  COMMANDS
    .iter()
    .filter(|cmd| cmd.available_to(mode))
    .find(|cmd| cmd.name == input_lower || cmd.aliases.contains(&input_lower.as_str()))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_input_returns_all_for_admin() {
    let suggestions = get_suggestions("", UiMode::Admin);
    assert_eq!(suggestions.len(), COMMANDS.len());
  }

  #[test]
  fn test_mechanic_sees_only_shared_commands() {
    let names: Vec<&str> = get_suggestions("", UiMode::Mechanic)
      .iter()
      .map(|c| c.name)
      .collect();
    assert_eq!(names, vec!["repairs", "logout", "quit"]);
    assert!(get_suggestions("dash", UiMode::Mechanic).is_empty());
  }

  #[test]
  fn test_exact_match() {
    let suggestions = get_suggestions("history", UiMode::Admin);
    assert_eq!(suggestions[0].name, "history");
  }

  #[test]
  fn test_alias_match() {
    let suggestions = get_suggestions("c", UiMode::Admin);
    assert_eq!(suggestions[0].name, "comments");
  }

  #[test]
  fn test_prefix_match() {
    let suggestions = get_suggestions("rep", UiMode::Admin);
    assert_eq!(suggestions[0].name, "repairs");
  }

  #[test]
  fn test_fuzzy_match() {
    let suggestions = get_suggestions("board", UiMode::Admin);
    assert_eq!(suggestions[0].name, "dashboard");
  }

  #[test]
  fn test_resolve_respects_role() {
    assert_eq!(resolve("h", UiMode::Admin).map(|c| c.name), Some("history"));
    assert!(resolve("history", UiMode::Mechanic).is_none());
    assert_eq!(resolve(" Quit ", UiMode::Mechanic).map(|c| c.name), Some("quit"));
  }
}
