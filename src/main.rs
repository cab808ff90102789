mod config;
mod controller;
mod domain;
mod gateway;
mod runtime;
mod ui;
mod views;

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{
	DashboardConfig, default_log_path, load_config, pick_server_url, resolve_config_path, server_url_from_env,
};
use crate::controller::{Dashboard, mutation_outcome, parse_minutes};
use crate::domain::{CategoryLists, Range, StatsResponse};
use crate::gateway::{ApiCall, Gateway, HttpGateway};
use crate::runtime::Executor;
use crate::ui::run_dashboard;
use crate::views::{ChartSeries, CurrentTaskView, TaskRow};

const DASHBOARD_LOG_FILTER: &str = "chronos_dashboard=info";
const CLI_LOG_FILTER: &str = "warn";
const CLI_BAR_WIDTH: usize = 24;

#[derive(Debug, Parser)]
#[command(name = "chronos-dashboard", about = "Terminal dashboard for the task tracking server")]
struct Cli {
	/// Base URL of the tracking server.
	#[arg(long)]
	server: Option<String>,
	#[arg(long)]
	config: Option<PathBuf>,
	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
	Dashboard,
	Log {
		#[arg(long)]
		description: String,
	},
	Stop,
	Clear {
		#[arg(long)]
		minutes: String,
		/// Skip the interactive confirmation; required to actually delete.
		#[arg(long)]
		yes: bool,
	},
	Stats {
		#[arg(long, value_enum)]
		range: Option<Range>,
	},
	Categories,
}

fn main() {
	if let Err(err) = run() {
		eprintln!("error: {err:#}");
		std::process::exit(1);
	}
}

fn run() -> Result<()> {
	let cli = Cli::parse();

	let config_path = resolve_config_path(cli.config);
	let config = match &config_path {
		Some(path) => load_config(path)?,
		None => DashboardConfig::default(),
	};
	let command = cli.command.unwrap_or(Command::Dashboard);
	init_logging(&command, &config)?;

	let server_url = pick_server_url(cli.server, server_url_from_env(), &config);
	let gateway = HttpGateway::new(&server_url)?;
	info!(server = gateway.base_url(), config = ?config_path, "starting");

	match command {
		Command::Dashboard => {
			let mut dashboard = Dashboard::new(config.default_range, config.stale_responses);
			let executor = Executor::new(Arc::new(gateway));
			run_dashboard(&mut dashboard, &executor)?;
		}
		Command::Log { description } => {
			let description = description.trim();
			if description.is_empty() {
				bail!("Please enter a task description.");
			}
			let result = gateway.send(&ApiCall::LogTask {
				description: description.to_string(),
			});
			mutation_outcome(result, "Failed to log task")
				.map_err(|message| anyhow!("Error logging task: {message}. Is the backend server running?"))?;
			println!("Task logged successfully!");
		}
		Command::Stop => {
			let reply = mutation_outcome(gateway.send(&ApiCall::StopTask), "Failed to stop task")
				.map_err(|message| anyhow!("Error stopping task: {message}."))?;
			println!("{}", reply.message.unwrap_or_else(|| "Task stopped.".to_string()));
		}
		Command::Clear { minutes, yes } => {
			let minutes = parse_minutes(&minutes)
				.ok_or_else(|| anyhow!("Please enter a valid number of minutes (greater than 0)."))?;
			if !yes {
				bail!("refusing to delete entries from the last {minutes} minute(s) without --yes");
			}
			let reply = mutation_outcome(
				gateway.send(&ApiCall::ClearRecent { minutes }),
				"Failed to clear logs",
			)
			.map_err(|message| anyhow!("Error clearing logs: {message}."))?;
			println!("Successfully cleared {} entries.", reply.cleared_count.unwrap_or(0));
		}
		Command::Stats { range } => {
			print_stats(&gateway, range.unwrap_or(config.default_range))?;
		}
		Command::Categories => {
			print_categories(&gateway)?;
		}
	}

	Ok(())
}

fn init_logging(command: &Command, config: &DashboardConfig) -> Result<()> {
	let init_result = match command {
		Command::Dashboard => {
			let path = default_log_path(config);
			if let Some(parent) = path.parent() {
				if !parent.as_os_str().is_empty() {
					fs::create_dir_all(parent)
						.with_context(|| format!("failed to create log directory {}", parent.display()))?;
				}
			}
			let file = OpenOptions::new()
				.create(true)
				.append(true)
				.open(&path)
				.with_context(|| format!("failed to open log file {}", path.display()))?;

			tracing_subscriber::fmt()
				.with_env_filter(env_filter(DASHBOARD_LOG_FILTER)?)
				.with_writer(Mutex::new(file))
				.with_ansi(false)
				.try_init()
		}
		_ => tracing_subscriber::fmt()
			.with_env_filter(env_filter(CLI_LOG_FILTER)?)
			.with_writer(std::io::stderr)
			.try_init(),
	};

	init_result.map_err(|err| anyhow!("failed to initialize logging: {err}"))
}

fn env_filter(default_directive: &str) -> Result<EnvFilter> {
	EnvFilter::try_from_default_env()
		.or_else(|_| EnvFilter::try_new(default_directive))
		.map_err(|err| anyhow!("invalid RUST_LOG filter: {err}"))
}

fn print_stats(gateway: &dyn Gateway, range: Range) -> Result<()> {
	let value = gateway
		.send(&ApiCall::GetStats { range })
		.map_err(|err| anyhow!("Error fetching stats: {err}"))?;
	let stats: StatsResponse = serde_json::from_value(value).context("invalid stats response")?;
	if let Some(error) = &stats.error {
		bail!("Error fetching stats: {error}");
	}

	println!("stats for {}", range.label());
	if let Some(message) = &stats.message {
		println!("{message}");
	}
	println!("{}", CurrentTaskView::from_info(stats.active_task()));

	if stats.projects.is_empty() && stats.types.is_empty() {
		println!("\nno time recorded for this range");
	} else {
		for (title, totals) in [("by project", &stats.projects), ("by task type", &stats.types)] {
			let mut chart = ChartSeries::new(title);
			chart.replace(totals);
			print_chart(&chart);
		}
	}

	println!("\nrecent tasks:");
	let tasks = stats.visible_tasks();
	if tasks.is_empty() {
		println!("no tasks for this range");
	}
	for task in &tasks {
		let row = TaskRow::from_entry(task);
		println!("{} | {} | {}", row.when, row.categories, row.title);
	}

	Ok(())
}

fn print_chart(chart: &ChartSeries) {
	println!("\n{}:", chart.title());
	if chart.is_empty() {
		println!("(none)");
		return;
	}

	let width = chart
		.labels()
		.iter()
		.map(|label| label.chars().count())
		.max()
		.unwrap_or(0);
	for row in chart.bar_rows(CLI_BAR_WIDTH) {
		println!("{:<width$} | {:>10} | {}", row.label, row.value, row.bar);
	}
}

fn print_categories(gateway: &dyn Gateway) -> Result<()> {
	let value = gateway
		.send(&ApiCall::GetCategories)
		.map_err(|err| anyhow!("Error loading categories: {err}"))?;
	let lists: CategoryLists = serde_json::from_value(value).context("invalid categories response")?;

	for (title, categories) in [
		("projects", &lists.project_categories),
		("task types", &lists.task_type_categories),
	] {
		println!("{title}:");
		if categories.is_empty() {
			println!("  (none)");
		}
		for category in categories {
			match category.description.as_deref().map(str::trim) {
				Some(description) if !description.is_empty() => {
					println!("  {} | {}", category.name, description)
				}
				_ => println!("  {}", category.name),
			}
		}
	}

	Ok(())
}
