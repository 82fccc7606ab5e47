use chrono::Utc;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap};

use super::ViewContext;
use crate::backend::types::{Asset, NewComment, NewRepair, Repair, RepairStatus};
use crate::backend::workshop::RepairsData;
use crate::backend::WorkshopClient;
use crate::query::{Query, QueryState};
use crate::report::format_timestamp;
use crate::ui::components::{Form, FormEvent, FormValues, KeyResult};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{status_color, truncate};
use crate::ui::view::{ShortcutInfo, View, ViewAction};

/// Which assets the repair list shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum KindFilter {
  #[default]
  All,
  Vehicles,
  Machines,
}

impl KindFilter {
  fn next(self) -> Self {
    match self {
      KindFilter::All => KindFilter::Vehicles,
      KindFilter::Vehicles => KindFilter::Machines,
      KindFilter::Machines => KindFilter::All,
    }
  }

  fn label(self) -> &'static str {
    match self {
      KindFilter::All => "all",
      KindFilter::Vehicles => "vehicles",
      KindFilter::Machines => "machines",
    }
  }

  fn matches(self, repair: &Repair) -> bool {
    match self {
      KindFilter::All => true,
      KindFilter::Vehicles => repair.asset_ref.is_vehicle(),
      KindFilter::Machines => !repair.asset_ref.is_vehicle(),
    }
  }
}

/// Pending and in-progress repairs. The only screen mechanics get.
pub struct RepairsView {
  ctx: ViewContext,
  query: Query<RepairsData>,
  filter: KindFilter,
  list_state: ListState,
  repair_form: Form,
  /// Assets offered by the open repair form, in option order
  form_assets: Vec<Asset>,
  comment_form: Form,
  /// Repair the open comment form is about
  comment_target: Option<String>,
  action: Option<Query<String>>,
  status: Option<String>,
  /// Open the new repair form as soon as assets are loaded
  pending_new_repair: bool,
}

impl RepairsView {
  pub fn new(ctx: ViewContext) -> Self {
    let query = load(&ctx.workshop);
    Self {
      ctx,
      query,
      filter: KindFilter::All,
      list_state: ListState::default(),
      repair_form: Form::new("New repair"),
      form_assets: Vec::new(),
      comment_form: Form::new("Add comment").text("comment", "Comment"),
      comment_target: None,
      action: None,
      status: None,
      pending_new_repair: false,
    }
  }

  /// Open with the new repair form showing
  pub fn with_new_repair(ctx: ViewContext) -> Self {
    let mut view = Self::new(ctx);
    view.pending_new_repair = true;
    view
  }

  fn visible(&self) -> Vec<&Repair> {
    self
      .query
      .data()
      .map(|d| d.repairs.iter().filter(|r| self.filter.matches(r)).collect())
      .unwrap_or_default()
  }

  fn selected(&self) -> Option<Repair> {
    let idx = self.list_state.selected()?;
    self.visible().get(idx).map(|r| (*r).clone())
  }

  fn reload(&mut self) {
    self.query.refresh();
  }

  fn open_repair_form(&mut self) {
    let Some(data) = self.query.data() else {
      self.pending_new_repair = true;
      return;
    };

    let mut assets: Vec<Asset> = data
      .vehicles
      .iter()
      .cloned()
      .map(Asset::Vehicle)
      .chain(data.machines.iter().cloned().map(Asset::Machine))
      .collect();
    assets.sort_by(|a, b| a.code().cmp(b.code()));

    if assets.is_empty() {
      self.status = Some("Register a vehicle or machine before opening a repair.".to_string());
      return;
    }

    self.repair_form = Form::new("New repair")
      .choice("asset", "Asset", assets.iter().map(Asset::label).collect())
      .text("description", "Description");
    self.form_assets = assets;
    self.repair_form.show();
  }

  fn submit_repair(&mut self, values: FormValues) {
    let repair = NewRepair {
      asset: values
        .choice("asset")
        .and_then(|i| self.form_assets.get(i))
        .map(Asset::asset_ref),
      description: values.text("description"),
    };
    if let Err(e) = repair.validate() {
      self.repair_form.set_error(e.to_string());
      return;
    }

    let workshop = self.ctx.workshop.clone();
    self.action = Some(Query::action(move || {
      let workshop = workshop.clone();
      let repair = repair.clone();
      async move {
        workshop
          .create_repair(&repair)
          .await
          .map(|_| "Repair created".to_string())
          .map_err(|e| {
            tracing::error!("Error creating repair: {}", e);
            e.user_message()
          })
      }
    }));
    self.repair_form.set_busy(true);
  }

  fn submit_comment(&mut self, values: FormValues) {
    let Some(repair_id) = self.comment_target.clone() else {
      self.comment_form.hide();
      return;
    };
    let comment = NewComment {
      repair_id,
      comment: values.text("comment"),
    };
    if let Err(e) = comment.validate() {
      self.comment_form.set_error(e.to_string());
      return;
    }

    let workshop = self.ctx.workshop.clone();
    self.action = Some(Query::action(move || {
      let workshop = workshop.clone();
      let comment = comment.clone();
      async move {
        workshop
          .add_comment(&comment)
          .await
          .map(|_| "Comment sent".to_string())
          .map_err(|e| {
            tracing::error!("Error adding comment: {}", e);
            e.user_message()
          })
      }
    }));
    self.comment_form.set_busy(true);
  }

  fn advance(&mut self, next: RepairStatus) {
    let Some(repair) = self.selected() else {
      return;
    };
    if let Err(e) = repair.transition_to(next, Utc::now()) {
      self.status = Some(e.to_string());
      return;
    }

    let workshop = self.ctx.workshop.clone();
    self.action = Some(Query::action(move || {
      let workshop = workshop.clone();
      let repair = repair.clone();
      async move {
        let result = match next {
          RepairStatus::Completed => workshop.finish_repair(&repair).await,
          _ => workshop.start_repair(&repair).await,
        };
        result
          .map(|_| format!("Repair marked {}", next.label().to_lowercase()))
          .map_err(|e| {
            tracing::error!("Error updating repair: {}", e);
            e.user_message()
          })
      }
    }));
    self.status = Some("Saving...".to_string());
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.visible().len();
    self
      .list_state
      .select(ensure_valid_selection(self.list_state.selected(), len));

    let stale = self.query.data().is_some_and(|d| d.stale);
    let title = match self.query.state() {
      QueryState::Loading => " Active repairs (loading...) ".to_string(),
      QueryState::Error(_) => " Active repairs (error) ".to_string(),
      _ => format!(
        " Active repairs [{}] ({}){} ",
        self.filter.label(),
        len,
        if stale { " offline copy" } else { "" }
      ),
    };

    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if len == 0 {
      let content = match self.query.state() {
        QueryState::Loading => String::new(),
        QueryState::Error(e) => format!("{} Press 'r' to retry.", e),
        _ => "No active repairs.".to_string(),
      };
      let paragraph = Paragraph::new(content)
        .block(block)
        .wrap(Wrap { trim: true })
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    }

    let items: Vec<ListItem> = self
      .visible()
      .iter()
      .map(|repair| {
        let line = Line::from(vec![
          Span::styled(
            format!("{:<12}", repair.status.label()),
            Style::default().fg(status_color(repair.status)),
          ),
          Span::raw(" "),
          Span::styled(
            format!("{:<28}", truncate(&repair.asset_label(), 28)),
            Style::default().fg(Color::Cyan),
          ),
          Span::raw(" "),
          Span::raw(truncate(&repair.description, 50)),
        ]);
        ListItem::new(line)
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
      .title(" Details ")
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::DarkGray));

    let Some(repair) = self.selected() else {
      frame.render_widget(block, area);
      return;
    };

    let label = |text: &'static str| Span::styled(text, Style::default().fg(Color::DarkGray));
    let lines = vec![
      Line::from(vec![label("Asset:    "), Span::raw(repair.asset_label())]),
      Line::from(vec![
        label("Status:   "),
        Span::styled(
          repair.status.label(),
          Style::default().fg(status_color(repair.status)),
        ),
      ]),
      Line::from(vec![label("Started:  "), Span::raw(format_timestamp(&repair.started_at))]),
      Line::raw(""),
      Line::raw(repair.description.clone()),
    ];

    frame.render_widget(
      Paragraph::new(lines).block(block).wrap(Wrap { trim: false }),
      area,
    );
  }
}

fn load(workshop: &WorkshopClient) -> Query<RepairsData> {
  let workshop = workshop.clone();
  let mut query = Query::new(move |options| {
    let workshop = workshop.clone();
    async move {
      workshop.repairs_screen(options).await.map_err(|e| {
        tracing::error!("Error fetching repairs: {}", e);
        e.user_message()
      })
    }
  });
  query.refresh();
  query
}

impl View for RepairsView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    if self.repair_form.is_active() {
      if let KeyResult::Event(FormEvent::Submitted(values)) = self.repair_form.handle_key(key) {
        self.submit_repair(values);
      }
      return ViewAction::None;
    }
    if self.comment_form.is_active() {
      match self.comment_form.handle_key(key) {
        KeyResult::Event(FormEvent::Submitted(values)) => self.submit_comment(values),
        KeyResult::Event(FormEvent::Cancelled) => self.comment_target = None,
        _ => {}
      }
      return ViewAction::None;
    }

    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('f') => {
        self.filter = self.filter.next();
        self.list_state.select(Some(0));
      }
      KeyCode::Char('n') => self.open_repair_form(),
      KeyCode::Char('s') => self.advance(RepairStatus::InProgress),
      KeyCode::Char('d') => self.advance(RepairStatus::Completed),
      KeyCode::Char('c') => {
        if let Some(repair) = self.selected() {
          self.comment_target = Some(repair.id);
          self.comment_form.show();
        }
      }
      KeyCode::Char('r') => {
        self.status = None;
        self.reload();
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
        Constraint::Length(8),
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

    self.repair_form.render_overlay(frame, area);
    self.comment_form.render_overlay(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    "Repairs".to_string()
  }

  fn captures_input(&self) -> bool {
    self.repair_form.is_active() || self.comment_form.is_active()
  }

  fn tick(&mut self) {
    if self.query.poll() && self.pending_new_repair && self.query.is_success() {
      self.pending_new_repair = false;
      self.open_repair_form();
    }

    let Some(action) = &mut self.action else {
      return;
    };
    if !action.poll() {
      return;
    }

    let outcome = match action.state() {
      QueryState::Success(message) => Ok(message.clone()),
      QueryState::Error(error) => Err(error.clone()),
      _ => return,
    };
    self.action = None;

    match outcome {
      Ok(message) => {
        self.repair_form.hide();
        self.comment_form.hide();
        self.comment_target = None;
        self.status = Some(message);
        self.reload();
      }
      Err(error) => {
        if self.repair_form.is_active() {
          self.repair_form.set_error(error);
        } else if self.comment_form.is_active() {
          self.comment_form.set_error(error);
        } else {
          self.status = Some(error);
        }
      }
    }
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("n", "new").with_priority(20),
      ShortcutInfo::new("s/d", "start/finish").with_priority(30),
      ShortcutInfo::new("c", "comment").with_priority(40),
      ShortcutInfo::new("f", "filter").with_priority(50),
      ShortcutInfo::new("r", "refresh").with_priority(60),
    ]
  }
}
