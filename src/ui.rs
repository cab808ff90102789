use std::io;
use std::time::Duration as StdDuration;

use anyhow::Result;
use crossterm::event::{self, Event as CEvent, KeyCode, KeyEventKind};
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode};
use crossterm::{ExecutableCommand, execute};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use tracing::info;

use crate::controller::{Command, Dashboard};
use crate::domain::{Range, format_minutes, format_timestamp};
use crate::runtime::Executor;
use crate::views::{ChartSeries, EditField, Selector, Tab, TaskRow};

const FOCUSED_PANEL_BORDER_COLOR: Color = Color::Yellow;
const INACTIVE_PANEL_BORDER_COLOR: Color = Color::DarkGray;
const HIGHLIGHT_BACKGROUND_COLOR: Color = Color::Rgb(42, 45, 52);
const BAR_COLOR: Color = Color::Cyan;
const MAX_LABEL_WIDTH: usize = 18;

pub fn run_dashboard(dashboard: &mut Dashboard, executor: &Executor) -> Result<()> {
	enable_raw_mode()?;
	let mut stdout = io::stdout();
	stdout.execute(EnterAlternateScreen)?;
	let backend = CrosstermBackend::new(stdout);
	let mut terminal = Terminal::new(backend)?;

	let result = run_event_loop(&mut terminal, dashboard, executor);

	disable_raw_mode()?;
	execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
	terminal.show_cursor()?;

	result
}

fn run_event_loop(
	terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
	dashboard: &mut Dashboard,
	executor: &Executor,
) -> Result<()> {
	let mut app = App::default();
	executor.submit_all(dashboard.start());

	loop {
		for completion in executor.drain() {
			executor.submit_all(dashboard.resume(completion));
		}

		app.clamp_selection(dashboard.task_list.len());
		terminal.draw(|frame| draw_dashboard(frame, &app, dashboard))?;

		if event::poll(StdDuration::from_millis(250))? {
			if let CEvent::Key(key) = event::read()? {
				if key.kind != KeyEventKind::Press {
					continue;
				}

				let action = if dashboard.confirmation.is_some() {
					confirm_key_action(&mut app, key.code)
				} else if dashboard.modal.is_visible() {
					modal_key_action(key.code)
				} else {
					let mode = app.mode;
					match mode {
						InputMode::EditingDescription => {
							edit_text(&mut app, &mut dashboard.task_input, key.code, true)
						}
						InputMode::EditingMinutes => {
							edit_text(&mut app, &mut dashboard.minutes_input, key.code, false)
						}
						InputMode::Normal => normal_key_action(&app, dashboard, key.code),
					}
				};

				match action {
					KeyAction::Quit => break,
					KeyAction::Run(command) => executor.submit_all(dashboard.dispatch(command)),
					KeyAction::Enter(mode) => app.mode = mode,
					KeyAction::MoveList(delta) => app.move_selection(delta, dashboard.task_list.len()),
					KeyAction::Nothing => {}
				}
			}
		}
	}

	info!(in_flight = dashboard.in_flight(), "dashboard closed");
	Ok(())
}

fn draw_dashboard(frame: &mut Frame, app: &App, dashboard: &Dashboard) {
	let layout = Layout::default()
		.direction(Direction::Vertical)
		.constraints([
			Constraint::Length(3),
			Constraint::Min(10),
			Constraint::Length(4),
			Constraint::Length(4),
		])
		.split(frame.area());

	render_header(frame, layout[0], dashboard);
	match dashboard.tabs.active() {
		Tab::Overview => render_overview(frame, layout[1], dashboard),
		Tab::TaskLog => render_task_log(frame, layout[1], app, dashboard),
	}
	render_inputs(frame, layout[2], app, dashboard);
	render_footer(frame, layout[3], app, dashboard);

	if dashboard.modal.is_visible() {
		render_edit_popup(frame, dashboard);
	}
	if let Some(confirmation) = &dashboard.confirmation {
		render_confirm_popup(frame, app, &confirmation.prompt());
	}
}

fn render_header(frame: &mut Frame, area: Rect, dashboard: &Dashboard) {
	let mut spans = Vec::new();
	for (index, tab) in Tab::ALL.iter().enumerate() {
		if index > 0 {
			spans.push(Span::styled(" | ", Style::default().fg(Color::DarkGray)));
		}
		let style = if dashboard.tabs.is_visible(*tab) {
			Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
		} else {
			Style::default().fg(Color::Gray)
		};
		spans.push(Span::styled(tab.title(), style));
	}

	spans.push(Span::raw("      "));
	for (index, range) in Range::ALL.iter().enumerate() {
		let style = if *range == dashboard.state.current_range {
			Style::default().fg(Color::Black).bg(Color::Yellow).add_modifier(Modifier::BOLD)
		} else {
			Style::default()
		};
		spans.push(Span::styled(format!(" {} {} ", index + 1, range.label()), style));
		spans.push(Span::raw(" "));
	}

	let title = if dashboard.gate.is_engaged() {
		"Chronos Dashboard (working...)"
	} else {
		"Chronos Dashboard"
	};
	let header = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL).title(title));
	frame.render_widget(header, area);
}

fn render_overview(frame: &mut Frame, area: Rect, dashboard: &Dashboard) {
	let rows = Layout::default()
		.direction(Direction::Vertical)
		.constraints([Constraint::Length(3), Constraint::Min(6)])
		.split(area);
	let charts = Layout::default()
		.direction(Direction::Horizontal)
		.constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
		.split(rows[1]);

	let current_style = if dashboard.current_task.is_active() {
		Style::default().fg(Color::LightGreen)
	} else {
		Style::default().fg(Color::DarkGray)
	};
	let current = Paragraph::new(Line::from(Span::styled(
		dashboard.current_task.to_string(),
		current_style,
	)))
	.block(Block::default().borders(Borders::ALL).title("Current Task"));
	frame.render_widget(current, rows[0]);

	render_chart_panel(frame, charts[0], &dashboard.project_chart);
	render_chart_panel(frame, charts[1], &dashboard.type_chart);
}

fn render_chart_panel(frame: &mut Frame, area: Rect, chart: &ChartSeries) {
	let label_width = chart
		.labels()
		.iter()
		.map(|label| label.chars().count())
		.max()
		.unwrap_or(0)
		.min(MAX_LABEL_WIDTH);
	let bar_width = (area.width as usize).saturating_sub(label_width + 16).max(1);

	let mut lines = Vec::new();
	if chart.is_empty() {
		lines.push(Line::from("(no data)"));
	} else {
		for row in chart.bar_rows(bar_width) {
			let label = truncate(&row.label, label_width);
			lines.push(Line::from(vec![
				Span::raw(format!("{label:<label_width$} ")),
				Span::styled(row.bar, Style::default().fg(BAR_COLOR)),
				Span::raw(format!(" {}", row.value)),
			]));
		}
	}

	let total = chart.values().iter().filter(|value| value.is_finite()).sum::<f64>();
	let title = format!("{} | total {}", chart.title(), format_minutes(total));
	let panel = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title));
	frame.render_widget(panel, area);
}

fn render_task_log(frame: &mut Frame, area: Rect, app: &App, dashboard: &Dashboard) {
	let list = &dashboard.task_list;
	let items = if let Some(notice) = list.notice() {
		vec![ListItem::new(Line::from(Span::styled(
			notice.to_string(),
			Style::default().fg(Color::LightRed),
		)))]
	} else if list.is_empty() {
		vec![ListItem::new("(no tasks for this range)")]
	} else {
		list.entries()
			.iter()
			.map(|entry| {
				let row = TaskRow::from_entry(entry);
				ListItem::new(vec![
					Line::from(vec![
						Span::styled(row.title, Style::default().add_modifier(Modifier::BOLD)),
						Span::styled(format!("  {}", row.when), Style::default().fg(Color::Gray)),
					]),
					Line::from(Span::styled(
						format!("  {}", row.categories),
						Style::default().fg(Color::DarkGray),
					)),
				])
			})
			.collect::<Vec<_>>()
	};

	let mut state = ListState::default();
	if !list.is_empty() {
		state.select(Some(app.list_index.min(list.len() - 1)));
	}

	let title = format!("Recent Tasks ({}) | {}", list.len(), dashboard.state.current_range.label());
	let widget = List::new(items)
		.block(
			Block::default()
				.borders(Borders::ALL)
				.title(title)
				.border_style(border_style(app.mode == InputMode::Normal)),
		)
		.highlight_style(Style::default().bg(HIGHLIGHT_BACKGROUND_COLOR).add_modifier(Modifier::BOLD));

	frame.render_stateful_widget(widget, area, &mut state);
}

fn render_inputs(frame: &mut Frame, area: Rect, app: &App, dashboard: &Dashboard) {
	let field = |label: &str, value: &str, editing: bool| {
		let style = if editing {
			Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
		} else {
			Style::default()
		};
		Line::from(vec![
			Span::styled(format!("{label}: "), Style::default().fg(Color::Gray)),
			Span::styled(format!("{value}{}", if editing { "_" } else { "" }), style),
		])
	};

	let lines = vec![
		field(
			"Task description",
			&dashboard.task_input,
			app.mode == InputMode::EditingDescription,
		),
		field(
			"Clear last minutes",
			&dashboard.minutes_input,
			app.mode == InputMode::EditingMinutes,
		),
	];

	let editing = app.mode != InputMode::Normal;
	let panel = Paragraph::new(lines).block(
		Block::default()
			.borders(Borders::ALL)
			.title("Log Task")
			.border_style(border_style(editing)),
	);
	frame.render_widget(panel, area);
}

fn render_footer(frame: &mut Frame, area: Rect, app: &App, dashboard: &Dashboard) {
	let shortcuts = if dashboard.confirmation.is_some() {
		"j/k or arrows move | Enter choose | y confirm | n/Esc cancel"
	} else if dashboard.modal.is_visible() {
		"Tab switch list | j/k or arrows move | Enter save | Esc close"
	} else {
		match app.mode {
			InputMode::EditingDescription => "type description | Enter log task | Esc stop editing",
			InputMode::EditingMinutes => "type minutes | Enter/Esc stop editing",
			InputMode::Normal => {
				"1-4 range | Tab switch tab | i description | m minutes | l log | s stop | x clear | j/k move | Enter/e edit | q quit"
			}
		}
	};

	let footer = Paragraph::new(vec![Line::from(shortcuts), Line::from(dashboard.status.clone())])
		.block(Block::default().borders(Borders::ALL).title("Shortcuts"));
	frame.render_widget(footer, area);
}

fn render_edit_popup(frame: &mut Frame, dashboard: &Dashboard) {
	let area = centered_rect(64, 60, frame.area());
	frame.render_widget(Clear, area);

	let block = Block::default().borders(Borders::ALL).title("Edit Task Categories");
	let inner = block.inner(area);
	frame.render_widget(block, area);

	let rows = Layout::default()
		.direction(Direction::Vertical)
		.constraints([Constraint::Length(2), Constraint::Min(4)])
		.split(inner);
	let lists = Layout::default()
		.direction(Direction::Horizontal)
		.constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
		.split(rows[1]);

	let (description, when) = dashboard
		.state
		.editing
		.as_ref()
		.map(|entry| (entry.short_description(), format_timestamp(&entry.timestamp)))
		.unwrap_or_default();
	let heading = Paragraph::new(vec![
		Line::from(Span::styled(description, Style::default().add_modifier(Modifier::BOLD))),
		Line::from(Span::styled(when, Style::default().fg(Color::Gray))),
	]);
	frame.render_widget(heading, rows[0]);

	let modal = &dashboard.modal;
	render_selector(frame, lists[0], "Project", &modal.project, modal.focus == EditField::Project);
	render_selector(frame, lists[1], "Task Type", &modal.task_type, modal.focus == EditField::TaskType);
}

fn render_selector(frame: &mut Frame, area: Rect, title: &str, selector: &Selector, focused: bool) {
	let items = if selector.options().is_empty() {
		vec![ListItem::new("(no choices)")]
	} else {
		selector
			.options()
			.iter()
			.map(|option| ListItem::new(option.clone()))
			.collect::<Vec<_>>()
	};

	let selected = selector.value().unwrap_or("(none)");
	let list = List::new(items)
		.block(
			Block::default()
				.borders(Borders::ALL)
				.title(format!("{title}: {selected}"))
				.border_style(border_style(focused)),
		)
		.highlight_symbol(">> ")
		.highlight_style(Style::default().bg(HIGHLIGHT_BACKGROUND_COLOR));

	let mut state = ListState::default();
	state.select(selector.selected_index());
	frame.render_stateful_widget(list, area, &mut state);
}

fn render_confirm_popup(frame: &mut Frame, app: &App, prompt: &str) {
	let area = centered_rect(50, 30, frame.area());
	frame.render_widget(Clear, area);

	let block = Block::default().borders(Borders::ALL).title("Confirm");
	let inner = block.inner(area);
	frame.render_widget(block, area);

	let rows = Layout::default()
		.direction(Direction::Vertical)
		.constraints([Constraint::Min(2), Constraint::Length(2)])
		.split(inner);

	frame.render_widget(Paragraph::new(prompt.to_string()).wrap(Wrap { trim: true }), rows[0]);

	let items = ConfirmChoice::ALL
		.iter()
		.map(|choice| ListItem::new(choice.label()))
		.collect::<Vec<_>>();
	let list = List::new(items)
		.highlight_symbol(">> ")
		.highlight_style(Style::default().bg(HIGHLIGHT_BACKGROUND_COLOR));
	let mut state = ListState::default();
	state.select(Some(app.confirm_choice.index()));
	frame.render_stateful_widget(list, rows[1], &mut state);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
	let popup_layout = Layout::default()
		.direction(Direction::Vertical)
		.constraints([
			Constraint::Percentage((100 - percent_y) / 2),
			Constraint::Percentage(percent_y),
			Constraint::Percentage((100 - percent_y) / 2),
		])
		.split(area);
	Layout::default()
		.direction(Direction::Horizontal)
		.constraints([
			Constraint::Percentage((100 - percent_x) / 2),
			Constraint::Percentage(percent_x),
			Constraint::Percentage((100 - percent_x) / 2),
		])
		.split(popup_layout[1])[1]
}

fn border_style(focused: bool) -> Style {
	if focused {
		Style::default()
			.fg(FOCUSED_PANEL_BORDER_COLOR)
			.add_modifier(Modifier::BOLD)
	} else {
		Style::default().fg(INACTIVE_PANEL_BORDER_COLOR)
	}
}

fn truncate(text: &str, width: usize) -> String {
	if text.chars().count() <= width {
		return text.to_string();
	}
	let mut out = text.chars().take(width.saturating_sub(1)).collect::<String>();
	out.push('~');
	out
}

fn normal_key_action(app: &App, dashboard: &Dashboard, code: KeyCode) -> KeyAction {
	let gated = dashboard.gate.is_engaged();
	match code {
		KeyCode::Char('q') => KeyAction::Quit,
		KeyCode::Char(digit @ '1'..='4') => {
			let index = digit as usize - '1' as usize;
			KeyAction::Run(Command::SwitchRange(Range::ALL[index]))
		}
		KeyCode::Tab | KeyCode::BackTab => KeyAction::Run(Command::ShowTab(dashboard.tabs.next())),
		KeyCode::Char('i') => KeyAction::Enter(InputMode::EditingDescription),
		KeyCode::Char('m') => KeyAction::Enter(InputMode::EditingMinutes),
		KeyCode::Char('l') if !gated => KeyAction::Run(Command::LogTask),
		KeyCode::Char('s') if !gated => KeyAction::Run(Command::StopTask),
		KeyCode::Char('x') if !gated => KeyAction::Run(Command::ClearRecent),
		KeyCode::Up | KeyCode::Char('k') if dashboard.tabs.is_visible(Tab::TaskLog) => {
			KeyAction::MoveList(-1)
		}
		KeyCode::Down | KeyCode::Char('j') if dashboard.tabs.is_visible(Tab::TaskLog) => {
			KeyAction::MoveList(1)
		}
		KeyCode::Enter | KeyCode::Char('e') if dashboard.tabs.is_visible(Tab::TaskLog) => {
			KeyAction::Run(Command::OpenEditor(app.list_index))
		}
		_ => KeyAction::Nothing,
	}
}

/// Text entry for the description and minutes fields. Enter in the
/// description field logs the task even while the gate is engaged.
fn edit_text(app: &mut App, buffer: &mut String, code: KeyCode, submit_on_enter: bool) -> KeyAction {
	match code {
		KeyCode::Esc => KeyAction::Enter(InputMode::Normal),
		KeyCode::Enter => {
			app.mode = InputMode::Normal;
			if submit_on_enter {
				KeyAction::Run(Command::LogTask)
			} else {
				KeyAction::Nothing
			}
		}
		KeyCode::Backspace => {
			buffer.pop();
			KeyAction::Nothing
		}
		KeyCode::Char(value) => {
			buffer.push(value);
			KeyAction::Nothing
		}
		_ => KeyAction::Nothing,
	}
}

fn modal_key_action(code: KeyCode) -> KeyAction {
	match code {
		KeyCode::Esc => KeyAction::Run(Command::CloseEditor),
		KeyCode::Tab | KeyCode::BackTab | KeyCode::Left | KeyCode::Right => {
			KeyAction::Run(Command::ToggleEditorField)
		}
		KeyCode::Up | KeyCode::Char('k') => KeyAction::Run(Command::MoveEditorSelection(-1)),
		KeyCode::Down | KeyCode::Char('j') => KeyAction::Run(Command::MoveEditorSelection(1)),
		KeyCode::Enter => KeyAction::Run(Command::SaveEdit),
		_ => KeyAction::Nothing,
	}
}

fn confirm_key_action(app: &mut App, code: KeyCode) -> KeyAction {
	let decision = match code {
		KeyCode::Up | KeyCode::Down | KeyCode::Char('k') | KeyCode::Char('j') => {
			app.confirm_choice = app.confirm_choice.toggle();
			return KeyAction::Nothing;
		}
		KeyCode::Char('y') => ConfirmChoice::Confirm,
		KeyCode::Char('n') | KeyCode::Esc => ConfirmChoice::Cancel,
		KeyCode::Enter => app.confirm_choice,
		_ => return KeyAction::Nothing,
	};

	app.confirm_choice = ConfirmChoice::Cancel;
	match decision {
		ConfirmChoice::Confirm => KeyAction::Run(Command::Confirm),
		ConfirmChoice::Cancel => KeyAction::Run(Command::Cancel),
	}
}

#[derive(Debug, Clone, PartialEq)]
enum KeyAction {
	Quit,
	Run(Command),
	Enter(InputMode),
	MoveList(i32),
	Nothing,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum InputMode {
	#[default]
	Normal,
	EditingDescription,
	EditingMinutes,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum ConfirmChoice {
	Confirm,
	#[default]
	Cancel,
}

impl ConfirmChoice {
	const ALL: [ConfirmChoice; 2] = [ConfirmChoice::Confirm, ConfirmChoice::Cancel];

	fn label(self) -> &'static str {
		match self {
			ConfirmChoice::Confirm => "Confirm",
			ConfirmChoice::Cancel => "Cancel",
		}
	}

	fn index(self) -> usize {
		match self {
			ConfirmChoice::Confirm => 0,
			ConfirmChoice::Cancel => 1,
		}
	}

	fn toggle(self) -> Self {
		match self {
			ConfirmChoice::Confirm => ConfirmChoice::Cancel,
			ConfirmChoice::Cancel => ConfirmChoice::Confirm,
		}
	}
}

#[derive(Debug, Clone, Default)]
struct App {
	mode: InputMode,
	list_index: usize,
	confirm_choice: ConfirmChoice,
}

impl App {
	fn clamp_selection(&mut self, len: usize) {
		self.list_index = if len == 0 { 0 } else { self.list_index.min(len - 1) };
	}

	fn move_selection(&mut self, delta: i32, len: usize) {
		if len == 0 {
			self.list_index = 0;
			return;
		}

		if delta > 0 {
			self.list_index = (self.list_index + delta as usize).min(len - 1);
		} else {
			self.list_index = self.list_index.saturating_sub(delta.unsigned_abs() as usize);
		}
	}
}
