//! Terminal dashboard for a cafe server, refreshed every two seconds.
//!
//! Overview (chef agent state)
//! Jobs (job run history)
//! Queue (runs waiting for the worker)

use std::error::Error;
use std::io;
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Duration;

use cafe::client::CafeClient;
use cafe::config::ClientConfig;
use cafe::models::{ChefStatus, ServerStatus};
use cafe::status::{ScheduledTaskStatus, TaskState};
use chrono::Utc;
use crossterm::{
  event::{self, DisableMouseCapture, EnableMouseCapture, Event as CEvent, KeyCode},
  execute,
  terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use tokio::runtime::Runtime;
use tui::{
  backend::{Backend, CrosstermBackend},
  layout::{Constraint, Direction, Layout, Rect},
  style::{Color, Modifier, Style},
  text::{Span, Spans},
  widgets::{Block, Borders, List, ListItem, Paragraph, Tabs},
  Terminal,
};

const REFRESH: Duration = Duration::from_secs(2);
const REDRAW: Duration = Duration::from_millis(500);

#[derive(Clone, Copy)]
enum DashboardTab {
  Overview,
  Jobs,
  Queue,
}

struct App {
  current_tab: DashboardTab,
  server: Option<ServerStatus>,
  error: Option<String>,
}

impl App {
  fn new() -> Self {
    Self {
      current_tab: DashboardTab::Overview,
      server: None,
      error: None,
    }
  }

  fn next_tab(&mut self) {
    self.current_tab = match self.current_tab {
      DashboardTab::Overview => DashboardTab::Jobs,
      DashboardTab::Jobs => DashboardTab::Queue,
      DashboardTab::Queue => DashboardTab::Overview,
    }
  }

  fn previous_tab(&mut self) {
    self.current_tab = match self.current_tab {
      DashboardTab::Overview => DashboardTab::Queue,
      DashboardTab::Jobs => DashboardTab::Overview,
      DashboardTab::Queue => DashboardTab::Jobs,
    }
  }

  fn jobs_in(&self, state: Option<TaskState>) -> Vec<&ScheduledTaskStatus> {
    self
      .server
      .iter()
      .flat_map(|server| server.jobs.iter())
      .filter(|job| state.is_none_or(|s| job.state == s))
      .collect()
  }
}

fn main() -> Result<(), Box<dyn Error>> {
  let config = ClientConfig::from_env();
  let client = CafeClient::new(config.base_url());

  let (tx, rx) = mpsc::channel::<Result<ServerStatus, String>>();
  thread::spawn(move || {
    let rt_bg = match Runtime::new() {
      Ok(rt) => rt,
      Err(e) => {
        let _ = tx.send(Err(e.to_string()));
        return;
      }
    };
    loop {
      let state = rt_bg.block_on(client.server_status()).map_err(|e| e.to_string());
      if tx.send(state).is_err() {
        break;
      }
      thread::sleep(REFRESH);
    }
  });

  enable_raw_mode()?;
  execute!(io::stdout(), EnterAlternateScreen, EnableMouseCapture)?;
  let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;

  // Restore the terminal even when drawing failed.
  let outcome = run_app(&mut terminal, &rx);
  disable_raw_mode()?;
  execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
  terminal.show_cursor()?;
  outcome
}

fn run_app<B: Backend>(
  terminal: &mut Terminal<B>,
  updates: &Receiver<Result<ServerStatus, String>>,
) -> Result<(), Box<dyn Error>> {
  let mut app = App::new();
  loop {
    for update in updates.try_iter() {
      match update {
        Ok(server) => {
          app.server = Some(server);
          app.error = None;
        }
        Err(e) => app.error = Some(e),
      }
    }
    terminal.draw(|f| ui(f, &app))?;

    if !event::poll(REDRAW)? {
      continue;
    }
    if let CEvent::Key(key) = event::read()? {
      match key.code {
        KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
        KeyCode::Right | KeyCode::Tab => app.next_tab(),
        KeyCode::Left | KeyCode::BackTab => app.previous_tab(),
        _ => {}
      }
    }
  }
}

fn ui<B: Backend>(f: &mut tui::Frame<B>, app: &App) {
  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .margin(1)
    .constraints([Constraint::Length(3), Constraint::Min(0), Constraint::Length(3)].as_ref())
    .split(f.size());

  let tab_titles = vec!["Overview", "Jobs", "Queue"];
  let tabs = Tabs::new(
    tab_titles
      .iter()
      .map(|t| Spans::from(Span::styled(*t, Style::default().fg(Color::Yellow))))
      .collect(),
  )
    .block(Block::default().borders(Borders::ALL).title("Cafe"))
    .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
    .select(match app.current_tab {
      DashboardTab::Overview => 0,
      DashboardTab::Jobs => 1,
      DashboardTab::Queue => 2,
    });
  f.render_widget(tabs, chunks[0]);

  match app.current_tab {
    DashboardTab::Overview => render_overview(f, app, chunks[1]),
    DashboardTab::Jobs => render_jobs(f, app, chunks[1]),
    DashboardTab::Queue => render_queue(f, app, chunks[1]),
  }

  let footer_text = match &app.error {
    Some(e) => format!("Server unreachable: {} | q: quit", e),
    None => "←/→ or Tab: switch tabs | q: quit".to_string(),
  };
  let footer = Paragraph::new(footer_text)
    .style(Style::default().fg(Color::White))
    .block(Block::default().borders(Borders::ALL));
  f.render_widget(footer, chunks[2]);
}

fn chef_lines(chef: &ChefStatus) -> Vec<Spans<'static>> {
  let optional = |value: Option<String>| value.unwrap_or_else(|| "N/A".into());
  vec![
    Spans::from(Span::styled(
      if chef.is_running { "Chef is running" } else { "Chef is idle" },
      Style::default().add_modifier(Modifier::BOLD),
    )),
    Spans::from(Span::raw(format!("Version: {}", optional(chef.version.clone())))),
    Spans::from(Span::raw(format!("Interval: {}", optional(chef.interval.map(|s| format!("{}s", s)))))),
    Spans::from(Span::raw(format!("Last run: {}", optional(chef.last_run.map(|t| t.to_rfc3339()))))),
    Spans::from(Span::raw(format!("Next run: {}", optional(chef.expected_next_run.map(|t| t.to_rfc3339()))))),
  ]
}

fn job_item(job: &ScheduledTaskStatus) -> ListItem<'static> {
  let color = match (&job.state, &job.result) {
    (TaskState::Finished, Some(result)) if result.is_success() => Color::Green,
    (TaskState::Finished, _) => Color::Red,
    (TaskState::Running, _) => Color::Cyan,
    (TaskState::NotStarted, _) => Color::Yellow,
  };
  let mut lines = vec![Spans::from(Span::styled(job.to_string(), Style::default().fg(color)))];
  if let Some(message) = &job.current_message {
    lines.push(Spans::from(Span::raw(format!("    {}", message))));
  }
  ListItem::new(lines)
}

fn render_overview<B: Backend>(f: &mut tui::Frame<B>, app: &App, area: Rect) {
  let chunks = Layout::default()
    .direction(Direction::Horizontal)
    .constraints([Constraint::Percentage(50), Constraint::Percentage(50)].as_ref())
    .split(area);

  let chef = app
    .server
    .as_ref()
    .and_then(|server| server.chef.as_ref())
    .map(chef_lines)
    .unwrap_or_else(|| vec![Spans::from(Span::raw("Waiting for server..."))]);
  let chef_panel = Paragraph::new(chef).block(Block::default().borders(Borders::ALL).title("Chef"));
  f.render_widget(chef_panel, chunks[0]);

  let active: Vec<ListItem> = app.jobs_in(Some(TaskState::Running)).into_iter().map(job_item).collect();
  let active_list = List::new(if active.is_empty() { vec![ListItem::new(Spans::from(Span::raw("No active job runs")))] } else { active })
    .block(Block::default().borders(Borders::ALL).title(format!("Active ({})", Utc::now().format("%H:%M:%S"))));
  f.render_widget(active_list, chunks[1]);
}

fn render_jobs<B: Backend>(f: &mut tui::Frame<B>, app: &App, area: Rect) {
  let items: Vec<ListItem> = app.jobs_in(None).into_iter().rev().map(job_item).collect();
  let list = List::new(items)
    .block(Block::default().borders(Borders::ALL).title("Job Runs (newest first)"));
  f.render_widget(list, area);
}

fn render_queue<B: Backend>(f: &mut tui::Frame<B>, app: &App, area: Rect) {
  let items: Vec<ListItem> = app.jobs_in(Some(TaskState::NotStarted)).into_iter().map(job_item).collect();
  let queued = app.server.as_ref().map(|server| server.queue_length).unwrap_or(0);
  let list = List::new(items)
    .block(Block::default().borders(Borders::ALL).title(format!("Queued Job Runs ({})", queued)));
  f.render_widget(list, area);
}
