use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState};

use super::{CommentsView, RepairsView, ViewContext};
use crate::backend::types::{NewMachine, NewUser, NewVehicle, Role, User, VehicleType};
use crate::backend::workshop::DashboardData;
use crate::backend::WorkshopClient;
use crate::error::ValidationError;
use crate::query::{Query, QueryState};
use crate::ui::components::{Form, FormEvent, FormValues, KeyResult};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::truncate;
use crate::ui::view::{ShortcutInfo, View, ViewAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Panel {
  Vehicles,
  Machines,
  Users,
}

impl Panel {
  fn next(self) -> Self {
    match self {
      Panel::Vehicles => Panel::Machines,
      Panel::Machines => Panel::Users,
      Panel::Users => Panel::Vehicles,
    }
  }

  fn index(self) -> usize {
    self as usize
  }
}

const ROLE_OPTIONS: [Role; 2] = [Role::Mechanic, Role::Admin];

/// Administrator home: repair counts and the vehicle, machine and user
/// registries, with forms to add to each.
pub struct DashboardView {
  ctx: ViewContext,
  query: Query<DashboardData>,
  panel: Panel,
  tables: [TableState; 3],
  vehicle_form: Form,
  machine_form: Form,
  user_form: Form,
  action: Option<Query<String>>,
  status: Option<String>,
}

impl DashboardView {
  pub fn new(ctx: ViewContext) -> Self {
    let query = load(&ctx.workshop);
    Self {
      ctx,
      query,
      panel: Panel::Vehicles,
      tables: Default::default(),
      vehicle_form: Form::new("New vehicle")
        .text("code", "Code")
        .choice(
          "type",
          "Type",
          VehicleType::ALL.iter().map(|t| t.label().to_string()).collect(),
        )
        .text("brand", "Brand")
        .text("model", "Model")
        .text("year", "Year")
        .text("serial_number", "Serial number"),
      machine_form: Form::new("New machine")
        .text("plant", "Plant")
        .text("name", "Name")
        .text("serial_number", "Serial number"),
      user_form: Form::new("New user")
        .text("full_name", "Full name")
        .text("email", "Email")
        .password("password", "Password")
        .choice(
          "role",
          "Role",
          ROLE_OPTIONS.iter().map(|r| r.label().to_string()).collect(),
        ),
      action: None,
      status: None,
    }
  }

  fn active_form(&mut self) -> Option<&mut Form> {
    [&mut self.vehicle_form, &mut self.machine_form, &mut self.user_form]
      .into_iter()
      .find(|f| f.is_active())
  }

  fn submit_vehicle(&mut self, values: FormValues) {
    let year = match values.text("year").parse::<i32>() {
      Ok(year) => year,
      Err(_) => {
        let err = ValidationError::Invalid {
          field: "year",
          reason: "must be a number".to_string(),
        };
        self.vehicle_form.set_error(err.to_string());
        return;
      }
    };
    let vehicle = NewVehicle {
      code: values.text("code"),
      vehicle_type: VehicleType::ALL[values.choice("type").unwrap_or(0)],
      brand: values.text("brand"),
      model: values.text("model"),
      year,
      serial_number: values.text("serial_number"),
    };
    if let Err(e) = vehicle.validate() {
      self.vehicle_form.set_error(e.to_string());
      return;
    }

    let workshop = self.ctx.workshop.clone();
    self.action = Some(Query::action(move || {
      let workshop = workshop.clone();
      let vehicle = vehicle.clone();
      async move {
        workshop
          .create_vehicle(&vehicle)
          .await
          .map(|v| format!("Vehicle {} created", v.code))
          .map_err(|e| {
            tracing::error!("Error creating vehicle: {}", e);
            e.user_message()
          })
      }
    }));
    self.vehicle_form.set_busy(true);
  }

  fn submit_machine(&mut self, values: FormValues) {
    let machine = NewMachine {
      plant: values.text("plant"),
      name: values.text("name"),
      serial_number: values.text("serial_number"),
    };
    if let Err(e) = machine.validate() {
      self.machine_form.set_error(e.to_string());
      return;
    }

    let workshop = self.ctx.workshop.clone();
    self.action = Some(Query::action(move || {
      let workshop = workshop.clone();
      let machine = machine.clone();
      async move {
        workshop
          .create_machine(&machine)
          .await
          .map(|m| format!("Machine {} created", m.code))
          .map_err(|e| {
            tracing::error!("Error creating machine: {}", e);
            e.user_message()
          })
      }
    }));
    self.machine_form.set_busy(true);
  }

  fn submit_user(&mut self, values: FormValues) {
    let user = NewUser {
      email: values.text("email"),
      password: values.raw("password"),
      full_name: values.text("full_name"),
      role: ROLE_OPTIONS[values.choice("role").unwrap_or(0)],
    };
    if let Err(e) = user.validate() {
      self.user_form.set_error(e.to_string());
      return;
    }

    let workshop = self.ctx.workshop.clone();
    self.action = Some(Query::action(move || {
      let workshop = workshop.clone();
      let user = user.clone();
      async move {
        workshop
          .create_user(&user)
          .await
          .map(|_| format!("User {} created", user.email))
          .map_err(|e| {
            tracing::error!("Error creating user: {}", e);
            e.to_string()
          })
      }
    }));
    self.user_form.set_busy(true);
  }

  fn render_stats(&self, frame: &mut Frame, area: Rect) {
    let stale = self.query.data().is_some_and(|d| d.stale);
    let title = match self.query.state() {
      QueryState::Loading => " Repairs (loading...) ".to_string(),
      _ if stale => " Repairs (offline copy) ".to_string(),
      _ => " Repairs ".to_string(),
    };
    let block = Block::default()
      .title(title)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    let line = match self.query.state() {
      QueryState::Error(e) => Line::styled(
        format!("{}  Press 'r' to retry.", e),
        Style::default().fg(Color::Red),
      ),
      _ => {
        let stats = self.query.data().map(|d| d.stats).unwrap_or_default();
        Line::from(vec![
          Span::styled(" Pending ", Style::default().fg(Color::Red)),
          Span::styled(stats.pending.to_string(), Style::default().bold()),
          Span::raw("    "),
          Span::styled("In progress ", Style::default().fg(Color::Yellow)),
          Span::styled(stats.in_progress.to_string(), Style::default().bold()),
          Span::raw("    "),
          Span::styled("Completed ", Style::default().fg(Color::Green)),
          Span::styled(stats.completed.to_string(), Style::default().bold()),
        ])
      }
    };

    frame.render_widget(Paragraph::new(line).block(block), area);
  }

  fn render_table(&mut self, frame: &mut Frame, area: Rect, panel: Panel) {
    let (title, header, widths, rows): (&str, Vec<&str>, Vec<Constraint>, Vec<Row>) = {
      let data = self.query.data();
      match panel {
        Panel::Vehicles => (
          "Vehicles",
          vec!["Code", "Type", "Brand", "Model", "Year", "Serial"],
          vec![
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Percentage(20),
            Constraint::Percentage(20),
            Constraint::Length(6),
            Constraint::Min(10),
          ],
          data
            .map(|d| d.vehicles.as_slice())
            .unwrap_or(&[])
            .iter()
            .map(|v| {
              Row::new(vec![
                Cell::from(v.code.clone()).style(Style::default().fg(Color::Cyan)),
                Cell::from(v.vehicle_type.label()),
                Cell::from(v.brand.clone()),
                Cell::from(v.model.clone()),
                Cell::from(v.year.to_string()),
                Cell::from(v.serial_number.clone()),
              ])
            })
            .collect(),
        ),
        Panel::Machines => (
          "Machines",
          vec!["Code", "Plant", "Name", "Serial"],
          vec![
            Constraint::Length(10),
            Constraint::Percentage(25),
            Constraint::Percentage(35),
            Constraint::Min(10),
          ],
          data
            .map(|d| d.machines.as_slice())
            .unwrap_or(&[])
            .iter()
            .map(|m| {
              Row::new(vec![
                Cell::from(m.code.clone()).style(Style::default().fg(Color::Cyan)),
                Cell::from(m.plant.clone()),
                Cell::from(m.name.clone()),
                Cell::from(m.serial_number.clone()),
              ])
            })
            .collect(),
        ),
        Panel::Users => (
          "Users",
          vec!["Name", "Email", "Role", "Since"],
          vec![
            Constraint::Percentage(30),
            Constraint::Percentage(35),
            Constraint::Length(14),
            Constraint::Min(10),
          ],
          newest_first(data.map(|d| d.users.as_slice()).unwrap_or(&[]))
            .into_iter()
            .map(|u| {
              Row::new(vec![
                Cell::from(truncate(&u.full_name, 30)),
                Cell::from(u.email.clone()),
                Cell::from(u.role.label()),
                Cell::from(u.created_at.format("%d/%m/%Y").to_string()),
              ])
            })
            .collect(),
        ),
      }
    };

    let focused = self.panel == panel;
    let state = &mut self.tables[panel.index()];
    state.select(ensure_valid_selection(state.selected(), rows.len()));

    let block = Block::default()
      .title(format!(" {} ({}) ", title, rows.len()))
      .borders(Borders::ALL)
      .border_style(if focused {
        Style::default().fg(Color::Yellow)
      } else {
        Style::default().fg(Color::Blue)
      });

    let table = Table::new(rows, widths)
      .header(Row::new(header).style(Style::default().fg(Color::DarkGray).bold()))
      .block(block)
      .row_highlight_style(if focused {
        Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD)
      } else {
        Style::default()
      })
      .highlight_symbol("> ");

    frame.render_stateful_widget(table, area, state);
  }
}

/// Users table order: most recently created on top
fn newest_first(users: &[User]) -> Vec<&User> {
  let mut users: Vec<&User> = users.iter().collect();
  users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
  users
}

fn load(workshop: &WorkshopClient) -> Query<DashboardData> {
  let workshop = workshop.clone();
  let mut query = Query::new(move |options| {
    let workshop = workshop.clone();
    async move {
      workshop.dashboard(options).await.map_err(|e| {
        tracing::error!("Error fetching dashboard data: {}", e);
        e.user_message()
      })
    }
  });
  query.refresh();
  query
}

impl View for DashboardView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    if let Some(form) = self.active_form() {
      if let KeyResult::Event(FormEvent::Submitted(values)) = form.handle_key(key) {
        if self.vehicle_form.is_active() {
          self.submit_vehicle(values);
        } else if self.machine_form.is_active() {
          self.submit_machine(values);
        } else {
          self.submit_user(values);
        }
      }
      return ViewAction::None;
    }

    match key.code {
      KeyCode::Tab => self.panel = self.panel.next(),
      KeyCode::Char('j') | KeyCode::Down => self.tables[self.panel.index()].select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.tables[self.panel.index()].select_previous(),
      KeyCode::Char('r') => {
        self.status = None;
        self.query.refresh();
      }
      KeyCode::Char('v') => self.vehicle_form.show(),
      KeyCode::Char('m') => self.machine_form.show(),
      KeyCode::Char('u') => self.user_form.show(),
      KeyCode::Char('n') => {
        return ViewAction::Push(Box::new(RepairsView::with_new_repair(self.ctx.clone())));
      }
      KeyCode::Char('c') => {
        return ViewAction::Push(Box::new(CommentsView::new(self.ctx.clone())));
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
        Constraint::Length(3),
        Constraint::Percentage(40),
        Constraint::Percentage(30),
        Constraint::Min(4),
        Constraint::Length(1),
      ])
      .split(area);

    self.render_stats(frame, chunks[0]);
    self.render_table(frame, chunks[1], Panel::Vehicles);
    self.render_table(frame, chunks[2], Panel::Machines);
    self.render_table(frame, chunks[3], Panel::Users);

    if let Some(status) = &self.status {
      frame.render_widget(
        Paragraph::new(format!(" {}", status)).style(Style::default().fg(Color::Green)),
        chunks[4],
      );
    }

    self.vehicle_form.render_overlay(frame, area);
    self.machine_form.render_overlay(frame, area);
    self.user_form.render_overlay(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    "Dashboard".to_string()
  }

  fn captures_input(&self) -> bool {
    self.vehicle_form.is_active() || self.machine_form.is_active() || self.user_form.is_active()
  }

  fn tick(&mut self) {
    self.query.poll();

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
        if let Some(form) = self.active_form() {
          form.hide();
        }
        self.status = Some(message);
        self.query.refresh();
      }
      Err(error) => match self.active_form() {
        Some(form) => form.set_error(error),
        None => self.status = Some(error),
      },
    }
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("Tab", "panel").with_priority(20),
      ShortcutInfo::new("v/m/u", "new vehicle/machine/user").with_priority(30),
      ShortcutInfo::new("n", "new repair").with_priority(40),
      ShortcutInfo::new("c", "comments").with_priority(50),
      ShortcutInfo::new("r", "refresh").with_priority(60),
    ]
  }
}
