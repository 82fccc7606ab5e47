use std::collections::HashSet;

use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap};

use super::ViewContext;
use crate::backend::types::RepairComment;
use crate::backend::WorkshopClient;
use crate::query::{Query, QueryState};
use crate::report::format_timestamp;
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::truncate;
use crate::ui::view::{ShortcutInfo, View, ViewAction};

/// Unread mechanic comments. Marking one read removes it from the list.
pub struct CommentsView {
  ctx: ViewContext,
  query: Query<Vec<RepairComment>>,
  /// Rows on screen; a read comment is dropped here right away
  comments: Vec<RepairComment>,
  /// Marked read from this screen; never shown again, whatever a reload returns
  read: HashSet<String>,
  list_state: ListState,
  action: Option<(String, Query<String>)>,
  status: Option<String>,
}

impl CommentsView {
  pub fn new(ctx: ViewContext) -> Self {
    let query = load(&ctx.workshop);
    Self {
      ctx,
      query,
      comments: Vec::new(),
      read: HashSet::new(),
      list_state: ListState::default(),
      action: None,
      status: None,
    }
  }

  fn mark_selected_read(&mut self) {
    if self.action.is_some() {
      return;
    }
    let Some(comment) = self
      .list_state
      .selected()
      .and_then(|i| self.comments.get(i))
      .cloned()
    else {
      return;
    };

    let id = comment.id.clone();
    let workshop = self.ctx.workshop.clone();
    let query = Query::action(move || {
      let workshop = workshop.clone();
      let comment = comment.clone();
      async move {
        workshop
          .mark_comment_read(&comment)
          .await
          .map(|_| "Comment marked as read".to_string())
          .map_err(|e| {
            tracing::error!("Error marking comment as read: {}", e);
            e.user_message()
          })
      }
    });
    self.action = Some((id, query));
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    self
      .list_state
      .select(ensure_valid_selection(self.list_state.selected(), self.comments.len()));

    let title = match self.query.state() {
      QueryState::Loading if self.comments.is_empty() => " Pending comments (loading...) ".to_string(),
      _ => format!(" Pending comments ({}) ", self.comments.len()),
    };
    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if self.comments.is_empty() {
      let content = match self.query.state() {
        QueryState::Error(e) => format!("{} Press 'r' to retry.", e),
        QueryState::Loading => String::new(),
        _ => "No pending comments.".to_string(),
      };
      let paragraph = Paragraph::new(content)
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    }

    let items: Vec<ListItem> = self
      .comments
      .iter()
      .map(|c| {
        let author = c
          .author
          .as_ref()
          .map(|u| u.full_name.clone())
          .unwrap_or_else(|| "Unknown".to_string());
        let asset = c
          .repair
          .as_ref()
          .map(|r| r.asset_label())
          .unwrap_or_else(|| "N/A".to_string());
        ListItem::new(Line::from(vec![
          Span::styled(
            format!("{:<17}", format_timestamp(&c.created_at)),
            Style::default().fg(Color::DarkGray),
          ),
          Span::raw(" "),
          Span::styled(format!("{:<18}", truncate(&author, 18)), Style::default().fg(Color::Yellow)),
          Span::raw(" "),
          Span::styled(format!("{:<24}", truncate(&asset, 24)), Style::default().fg(Color::Cyan)),
          Span::raw(" "),
          Span::raw(truncate(&c.comment, 60)),
        ]))
      })
      .collect();

    let list = List::new(items)
      .block(block)
      .highlight_style(
        Style::default()
          .bg(Color::DarkGray)
          .add_modifier(Modifier::BOLD),
      )
      .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut self.list_state);
  }

  fn render_detail(&self, frame: &mut Frame, area: Rect) {
    let block = Block::default()
      .title(" Comment ")
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::DarkGray));

    let Some(comment) = self.list_state.selected().and_then(|i| self.comments.get(i)) else {
      frame.render_widget(block, area);
      return;
    };

    let mut lines = Vec::new();
    if let Some(repair) = &comment.repair {
      lines.push(Line::styled(
        format!("{}: {}", repair.asset_label(), repair.description),
        Style::default().fg(Color::DarkGray),
      ));
      lines.push(Line::raw(""));
    }
    lines.push(Line::raw(comment.comment.clone()));

    frame.render_widget(
      Paragraph::new(lines).block(block).wrap(Wrap { trim: false }),
      area,
    );
  }
}

fn load(workshop: &WorkshopClient) -> Query<Vec<RepairComment>> {
  let workshop = workshop.clone();
  let mut query = Query::new(move |options| {
    let workshop = workshop.clone();
    async move {
      workshop
        .pending_comments(options)
        .await
        .map(|result| result.data)
        .map_err(|e| {
          tracing::error!("Error fetching pending comments: {}", e);
          e.user_message()
        })
    }
  });
  query.refresh();
  query
}

impl View for CommentsView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Enter | KeyCode::Char('m') => self.mark_selected_read(),
      KeyCode::Char('r') => {
        self.status = None;
        self.query.refresh();
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([
        Constraint::Min(5),
        Constraint::Length(7),
        Constraint::Length(1),
      ])
      .split(area);

    self.render_list(frame, chunks[0]);
    self.render_detail(frame, chunks[1]);

    if let Some(status) = &self.status {
      frame.render_widget(
        Paragraph::new(format!(" {}", status)).style(Style::default().fg(Color::Yellow)),
        chunks[2],
      );
    }
  }

  fn breadcrumb_label(&self) -> String {
    "Comments".to_string()
  }

  fn tick(&mut self) {
    if self.query.poll() {
      if let Some(comments) = self.query.data() {
        self.comments = comments
          .iter()
          .filter(|c| !self.read.contains(&c.id))
          .cloned()
          .collect();
      }
    }

    let Some((id, action)) = &mut self.action else {
      return;
    };
    if !action.poll() {
      return;
    }

    let id = id.clone();
    let outcome = match action.state() {
      QueryState::Success(message) => Ok(message.clone()),
      QueryState::Error(error) => Err(error.clone()),
      _ => return,
    };
    self.action = None;

    match outcome {
      Ok(message) => {
        self.comments.retain(|c| c.id != id);
        self.read.insert(id);
        self.status = Some(message);
        // refresh the cached list in the background; the rows on screen stay
        self.query.refresh();
      }
      Err(error) => self.status = Some(error),
    }
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("Enter", "mark read").with_priority(20),
      ShortcutInfo::new("r", "refresh").with_priority(30),
      ShortcutInfo::new("q", "back").with_priority(90),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::backend::fake::FakeBackend;
  use crate::backend::types::Role;
  use crate::ui::views::testing::{context, tick_until};
  use crossterm::event::KeyModifiers;
  use serde_json::{json, Value};

  fn comment_row(id: &str, text: &str) -> Value {
    json!({
      "id": id,
      "repair_id": "r1",
      "user_id": "u2",
      "comment": text,
      "status": "pending",
      "created_at": "2024-03-01T09:00:00Z",
      "updated_at": null,
    })
  }

  async fn loaded(backend: &FakeBackend) -> CommentsView {
    let mut view = CommentsView::new(context(backend.workshop(), Role::Admin));
    tick_until(&mut view, |v| v.query.is_success()).await;
    view
  }

  fn ids(view: &CommentsView) -> Vec<&str> {
    view.comments.iter().map(|c| c.id.as_str()).collect()
  }

  fn press(view: &mut CommentsView, code: KeyCode) {
    view.handle_key(KeyEvent::new(code, KeyModifiers::NONE));
  }

  #[tokio::test]
  async fn test_mark_read_removes_comment() {
    let backend = FakeBackend::start().await;
    backend.route(
      "GET",
      "repair_comments",
      200,
      json!([comment_row("c1", "Falta repuesto"), comment_row("c2", "Cliente llamo")]),
    );
    backend.route("PATCH", "repair_comments", 204, Value::Null);
    let mut view = loaded(&backend).await;
    assert_eq!(ids(&view), vec!["c1", "c2"]);

    backend.route("GET", "repair_comments", 200, json!([comment_row("c2", "Cliente llamo")]));
    view.list_state.select(Some(0));
    press(&mut view, KeyCode::Enter);
    tick_until(&mut view, |v| v.action.is_none() && !v.query.is_pending()).await;

    assert_eq!(ids(&view), vec!["c2"]);
    assert_eq!(view.status.as_deref(), Some("Comment marked as read"));
    let patch = backend.last_body("PATCH repair_comments").unwrap();
    assert_eq!(patch["status"], "read");
  }

  #[tokio::test]
  async fn test_read_comment_not_restored_when_reload_fails() {
    let backend = FakeBackend::start().await;
    backend.route("GET", "repair_comments", 200, json!([comment_row("c1", "Falta repuesto")]));
    backend.route("PATCH", "repair_comments", 204, Value::Null);
    let mut view = loaded(&backend).await;

    // the reload after the write falls back to the cached list
    backend.route("GET", "repair_comments", 503, json!({ "message": "unavailable" }));
    view.list_state.select(Some(0));
    press(&mut view, KeyCode::Enter);
    tick_until(&mut view, |v| v.action.is_none() && !v.query.is_pending()).await;

    assert!(view.comments.is_empty());
  }

  #[tokio::test]
  async fn test_read_comment_not_restored_by_lagging_backend() {
    let backend = FakeBackend::start().await;
    backend.route("GET", "repair_comments", 200, json!([comment_row("c1", "Falta repuesto")]));
    backend.route("PATCH", "repair_comments", 204, Value::Null);
    let mut view = loaded(&backend).await;

    view.list_state.select(Some(0));
    press(&mut view, KeyCode::Enter);
    tick_until(&mut view, |v| v.action.is_none() && !v.query.is_pending()).await;
    assert!(view.comments.is_empty());

    press(&mut view, KeyCode::Char('r'));
    tick_until(&mut view, |v| !v.query.is_pending()).await;
    assert!(view.comments.is_empty());
  }

  #[tokio::test]
  async fn test_failed_mark_read_keeps_comment() {
    let backend = FakeBackend::start().await;
    backend.route("GET", "repair_comments", 200, json!([comment_row("c1", "Falta repuesto")]));
    backend.route("PATCH", "repair_comments", 400, json!({ "message": "row is locked" }));
    let mut view = loaded(&backend).await;

    view.list_state.select(Some(0));
    press(&mut view, KeyCode::Enter);
    tick_until(&mut view, |v| v.action.is_none()).await;

    assert_eq!(ids(&view), vec!["c1"]);
    assert!(view.status.is_some());
  }
}
