use chrono::Local;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Row, Table, TableState};

use super::ViewContext;
use crate::backend::types::Asset;
use crate::backend::workshop::HistoryData;
use crate::backend::WorkshopClient;
use crate::query::{Query, QueryState};
use crate::report::{self, assets_with_repairs, AssetFilter, HistoryReport};
use crate::ui::components::{KeyResult, Picker, PickerEvent};
use crate::ui::ensure_valid_selection;
use crate::ui::view::{ShortcutInfo, View, ViewAction};

/// Every repair ever opened, filterable by asset, with PDF export.
pub struct HistoryView {
  ctx: ViewContext,
  query: Query<HistoryData>,
  filter: AssetFilter,
  picker: Picker,
  /// Assets behind the picker options, after the leading "All assets"
  picker_assets: Vec<Asset>,
  table_state: TableState,
  export: Option<Query<String>>,
  status: Option<String>,
}

impl HistoryView {
  pub fn new(ctx: ViewContext) -> Self {
    let query = load(&ctx.workshop);
    Self {
      ctx,
      query,
      filter: AssetFilter::All,
      picker: Picker::new(),
      picker_assets: Vec::new(),
      table_state: TableState::default(),
      export: None,
      status: None,
    }
  }

  fn generated_by(&self) -> String {
    if self.ctx.user.full_name.trim().is_empty() {
      self.ctx.user.email.clone()
    } else {
      self.ctx.user.full_name.clone()
    }
  }

  fn report(&self) -> Option<HistoryReport> {
    let data = self.query.data()?;
    Some(HistoryReport::build(
      &data.repairs,
      &self.filter,
      &self.generated_by(),
      Local::now(),
    ))
  }

  fn open_picker(&mut self) {
    let Some(data) = self.query.data() else {
      return;
    };
    let assets = assets_with_repairs(&data.vehicles, &data.machines, &data.repairs);

    let mut options = vec![AssetFilter::All.label()];
    options.extend(assets.iter().map(Asset::label));
    let current = match &self.filter {
      AssetFilter::All => 0,
      AssetFilter::Only(asset) => assets
        .iter()
        .position(|a| a.asset_ref() == asset.asset_ref())
        .map(|i| i + 1)
        .unwrap_or(0),
    };

    self.picker.show("Filter by asset", options, current);
    self.picker_assets = assets;
  }

  fn export(&mut self) {
    if self.export.as_ref().is_some_and(|q| q.is_pending()) {
      return;
    }
    let Some(report) = self.report() else {
      self.status = Some("History is not loaded yet.".to_string());
      return;
    };

    let workshop = self.ctx.workshop.clone();
    let config = self.ctx.config.clone();
    self.export = Some(Query::action(move || {
      let workshop = workshop.clone();
      let config = config.clone();
      let report = report.clone();
      async move {
        let logo = report::load_logo(&workshop, &config).await;
        report
          .write_to(&config.output_dir(), logo.as_deref())
          .map(|path| format!("Report saved to {}", path.display()))
          .map_err(|e| {
            tracing::error!("Error generating PDF: {}", e);
            e.to_string()
          })
      }
    }));
    self.status = Some("Generating PDF...".to_string());
  }
}

fn load(workshop: &WorkshopClient) -> Query<HistoryData> {
  let workshop = workshop.clone();
  let mut query = Query::new(move |options| {
    let workshop = workshop.clone();
    async move {
      workshop.history(options).await.map_err(|e| {
        tracing::error!("Error fetching repair history: {}", e);
        e.user_message()
      })
    }
  });
  query.refresh();
  query
}

impl View for HistoryView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match self.picker.handle_key(key) {
      KeyResult::Event(PickerEvent::Selected(0)) => {
        self.filter = AssetFilter::All;
        return ViewAction::None;
      }
      KeyResult::Event(PickerEvent::Selected(i)) => {
        if let Some(asset) = self.picker_assets.get(i - 1) {
          self.filter = AssetFilter::Only(asset.clone());
        }
        self.table_state.select(Some(0));
        return ViewAction::None;
      }
      KeyResult::Event(PickerEvent::Cancelled) | KeyResult::Handled => return ViewAction::None,
      KeyResult::NotHandled => {}
    }

    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.table_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.table_state.select_previous(),
      KeyCode::Char('a') => self.open_picker(),
      KeyCode::Char('p') => self.export(),
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
      .constraints([Constraint::Min(5), Constraint::Length(1)])
      .split(area);

    let rows = self.report().map(|r| r.rows).unwrap_or_default();
    self
      .table_state
      .select(ensure_valid_selection(self.table_state.selected(), rows.len()));

    let stale = self.query.data().is_some_and(|d| d.stale);
    let title = match self.query.state() {
      QueryState::Loading => " Repair history (loading...) ".to_string(),
      _ => format!(
        " Repair history [{}] ({}){} ",
        self.filter.label(),
        rows.len(),
        if stale { " offline copy" } else { "" }
      ),
    };
    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if rows.is_empty() {
      let content = match self.query.state() {
        QueryState::Error(e) => format!("{} Press 'r' to retry.", e),
        QueryState::Loading => String::new(),
        _ => "No repairs recorded.".to_string(),
      };
      frame.render_widget(
        Paragraph::new(content)
          .block(block)
          .style(Style::default().fg(Color::DarkGray)),
        chunks[0],
      );
    } else {
      let table_rows: Vec<Row> = rows
        .into_iter()
        .map(|row| {
          Row::new(vec![
            row.date,
            row.asset,
            row.status,
            row.description,
            row.started,
            row.completed,
          ])
        })
        .collect();
      let table = Table::new(
        table_rows,
        [
          Constraint::Length(17),
          Constraint::Percentage(20),
          Constraint::Length(12),
          Constraint::Min(20),
          Constraint::Length(17),
          Constraint::Length(17),
        ],
      )
      .header(
        Row::new(["Date", "Asset", "Status", "Description", "Start", "Completion"])
          .style(Style::default().fg(Color::DarkGray).bold()),
      )
      .block(block)
      .row_highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
      .highlight_symbol("> ");
      frame.render_stateful_widget(table, chunks[0], &mut self.table_state);
    }

    if let Some(status) = &self.status {
      frame.render_widget(
        Paragraph::new(format!(" {}", status)).style(Style::default().fg(Color::Yellow)),
        chunks[1],
      );
    }

    self.picker.render_overlay(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    "History".to_string()
  }

  fn captures_input(&self) -> bool {
    self.picker.is_active()
  }

  fn tick(&mut self) {
    self.query.poll();

    if let Some(export) = &mut self.export {
      if export.poll() {
        self.status = match export.state() {
          QueryState::Success(message) => Some(message.clone()),
          QueryState::Error(error) => Some(error.clone()),
          _ => None,
        };
        self.export = None;
      }
    }
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("a", "asset filter").with_priority(20),
      ShortcutInfo::new("p", "export PDF").with_priority(30),
      ShortcutInfo::new("r", "refresh").with_priority(40),
    ]
  }
}
