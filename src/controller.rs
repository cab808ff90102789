use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::domain::{CategoryLists, MutationReply, Range, StatsResponse, TaskLogEntry};
use crate::gateway::{ApiCall, GatewayError, UNKNOWN_ERROR};
use crate::views::{
    ButtonGate, CategoryCache, ChartSeries, CurrentTaskView, EditModal, Tab, TabBar, TaskList,
};

/// What to do with a stats response that arrives after a newer refresh was issued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StaleResponsePolicy {
    #[default]
    Apply,
    Discard,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SwitchRange(Range),
    ShowTab(Tab),
    LogTask,
    StopTask,
    ClearRecent,
    Confirm,
    Cancel,
    OpenEditor(usize),
    MoveEditorSelection(i32),
    ToggleEditorField,
    SaveEdit,
    CloseEditor,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    StopTask,
    ClearRecent { minutes: u32 },
}

impl Confirmation {
    pub fn prompt(&self) -> String {
        match self {
            Confirmation::StopTask => {
                "Are you sure you want to stop timing the current task?".to_string()
            }
            Confirmation::ClearRecent { minutes } => format!(
                "Delete all log entries from the last {minutes} minute(s)? This cannot be undone."
            ),
        }
    }
}

/// A request the dashboard wants executed; the result comes back as a
/// [`Completion`] carrying the same ticket.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub ticket: u64,
    pub call: ApiCall,
}

#[derive(Debug)]
pub struct Completion {
    pub ticket: u64,
    pub result: Result<Value, GatewayError>,
}

#[derive(Debug, Clone, PartialEq)]
enum Continuation {
    LoadCategories,
    Refresh { range: Range, generation: u64 },
    LogTask,
    StopTask,
    ClearRecent { minutes: u32 },
    SaveCategories,
}

#[derive(Debug, Clone, Default)]
pub struct ViewState {
    pub current_range: Range,
    pub editing: Option<TaskLogEntry>,
    pub categories: CategoryCache,
}

pub struct Dashboard {
    pub state: ViewState,
    pub project_chart: ChartSeries,
    pub type_chart: ChartSeries,
    pub current_task: CurrentTaskView,
    pub task_list: TaskList,
    pub modal: EditModal,
    pub tabs: TabBar,
    pub gate: ButtonGate,
    pub status: String,
    pub task_input: String,
    pub minutes_input: String,
    pub confirmation: Option<Confirmation>,
    stale_policy: StaleResponsePolicy,
    refresh_generation: u64,
    next_ticket: u64,
    in_flight: HashMap<u64, Continuation>,
}

impl Dashboard {
    pub fn new(range: Range, stale_policy: StaleResponsePolicy) -> Self {
        Self {
            state: ViewState {
                current_range: range,
                ..ViewState::default()
            },
            project_chart: ChartSeries::new("Time per Project"),
            type_chart: ChartSeries::new("Time per Task Type"),
            current_task: CurrentTaskView::Idle,
            task_list: TaskList::default(),
            modal: EditModal::default(),
            tabs: TabBar::default(),
            gate: ButtonGate::default(),
            status: "Ready".to_string(),
            task_input: String::new(),
            minutes_input: String::new(),
            confirmation: None,
            stale_policy,
            refresh_generation: 0,
            next_ticket: 0,
            in_flight: HashMap::new(),
        }
    }

    /// Loads the category vocabularies; the first refresh follows once they settle.
    pub fn start(&mut self) -> Vec<Outbound> {
        if self.state.categories != CategoryCache::Unloaded {
            return Vec::new();
        }

        self.state.categories = CategoryCache::Loading;
        vec![self.issue(ApiCall::GetCategories, Continuation::LoadCategories)]
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn dispatch(&mut self, command: Command) -> Vec<Outbound> {
        match command {
            Command::SwitchRange(range) => vec![self.refresh(range)],
            Command::ShowTab(tab) => {
                self.tabs.show(tab);
                Vec::new()
            }
            Command::LogTask => self.log_task(),
            Command::StopTask => {
                self.confirmation = Some(Confirmation::StopTask);
                Vec::new()
            }
            Command::ClearRecent => {
                match parse_minutes(&self.minutes_input) {
                    Some(minutes) => {
                        self.confirmation = Some(Confirmation::ClearRecent { minutes })
                    }
                    None => {
                        self.status =
                            "Please enter a valid number of minutes (greater than 0).".to_string()
                    }
                }
                Vec::new()
            }
            Command::Confirm => match self.confirmation.take() {
                Some(Confirmation::StopTask) => self.stop_task(),
                Some(Confirmation::ClearRecent { minutes }) => self.clear_recent(minutes),
                None => Vec::new(),
            },
            Command::Cancel => {
                self.confirmation = None;
                Vec::new()
            }
            Command::OpenEditor(index) => {
                self.open_editor(index);
                Vec::new()
            }
            Command::MoveEditorSelection(delta) => {
                if self.modal.is_visible() {
                    self.modal.focused_selector_mut().move_by(delta);
                }
                Vec::new()
            }
            Command::ToggleEditorField => {
                if self.modal.is_visible() {
                    self.modal.focus = self.modal.focus.toggle();
                }
                Vec::new()
            }
            Command::SaveEdit => self.save_edit(),
            Command::CloseEditor => {
                self.hide_editor();
                Vec::new()
            }
        }
    }

    pub fn resume(&mut self, completion: Completion) -> Vec<Outbound> {
        let Some(continuation) = self.in_flight.remove(&completion.ticket) else {
            warn!(ticket = completion.ticket, "completion for unknown request");
            return Vec::new();
        };
        debug!(
            ticket = completion.ticket,
            ok = completion.result.is_ok(),
            "request completed"
        );

        match continuation {
            Continuation::LoadCategories => self.finish_categories(completion.result),
            Continuation::Refresh { range, generation } => {
                self.finish_refresh(range, generation, completion.result);
                Vec::new()
            }
            Continuation::LogTask => self.finish_log_task(completion.result),
            Continuation::StopTask => self.finish_stop_task(completion.result),
            Continuation::ClearRecent { minutes } => {
                self.finish_clear_recent(minutes, completion.result)
            }
            Continuation::SaveCategories => self.finish_save(completion.result),
        }
    }

    pub fn refresh(&mut self, range: Range) -> Outbound {
        self.status = format!("Fetching stats for {range}...");
        self.gate.engage();
        self.state.current_range = range;
        self.refresh_generation += 1;
        let generation = self.refresh_generation;
        self.issue(
            ApiCall::GetStats { range },
            Continuation::Refresh { range, generation },
        )
    }

    fn issue(&mut self, call: ApiCall, continuation: Continuation) -> Outbound {
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        debug!(ticket, method = %call.method(), path = %call.path(), "issuing request");
        self.in_flight.insert(ticket, continuation);
        Outbound { ticket, call }
    }

    fn finish_categories(&mut self, result: Result<Value, GatewayError>) -> Vec<Outbound> {
        let lists = result.and_then(|value| {
            serde_json::from_value::<CategoryLists>(value)
                .map_err(|err| GatewayError::Decode(err.to_string()))
        });

        match lists {
            Ok(lists) => {
                info!(
                    projects = lists.project_categories.len(),
                    task_types = lists.task_type_categories.len(),
                    "categories loaded"
                );
                self.modal.populate(&lists);
                self.state.categories = CategoryCache::Loaded(lists);
            }
            Err(err) => {
                warn!(error = %err, "failed to load categories");
                self.status = format!("Error loading categories: {err}");
                self.state.categories = CategoryCache::Failed(err.to_string());
            }
        }

        vec![self.refresh(self.state.current_range)]
    }

    fn finish_refresh(
        &mut self,
        range: Range,
        generation: u64,
        result: Result<Value, GatewayError>,
    ) {
        let latest = self.refresh_generation;
        if generation != latest {
            match self.stale_policy {
                StaleResponsePolicy::Discard => {
                    debug!(%range, generation, latest, "discarding stale refresh");
                    return;
                }
                StaleResponsePolicy::Apply => {
                    debug!(%range, generation, latest, "applying superseded refresh");
                }
            }
        }

        let stats = result.and_then(|value| {
            serde_json::from_value::<StatsResponse>(value)
                .map_err(|err| GatewayError::Decode(err.to_string()))
        });

        match stats {
            Ok(stats) => {
                if let Some(error) = stats.error.as_deref() {
                    self.reset_views();
                    self.task_list.show_notice(format!("Error: {error}"));
                    self.status = format!("Error fetching stats: {error}");
                } else {
                    self.project_chart.replace(&stats.projects);
                    self.type_chart.replace(&stats.types);
                    self.current_task = CurrentTaskView::from_info(stats.current_task.as_ref());
                    self.status = stats
                        .message
                        .clone()
                        .unwrap_or_else(|| format!("Stats updated for {range}."));
                    self.task_list.replace(stats.visible_tasks());
                }
            }
            Err(err) => {
                warn!(%range, error = %err, "failed to fetch stats");
                self.reset_views();
                self.task_list.show_notice(format!("Error loading tasks: {err}"));
                self.status = format!("Error fetching stats: {err}");
            }
        }

        self.gate.release();
    }

    fn reset_views(&mut self) {
        self.project_chart.blank();
        self.type_chart.blank();
        self.current_task = CurrentTaskView::Idle;
    }

    fn log_task(&mut self) -> Vec<Outbound> {
        let description = self.task_input.trim().to_string();
        if description.is_empty() {
            self.status = "Please enter a task description.".to_string();
            return Vec::new();
        }

        self.gate.engage();
        self.status = "Logging task and categorizing (this may take a moment)...".to_string();
        vec![self.issue(ApiCall::LogTask { description }, Continuation::LogTask)]
    }

    fn finish_log_task(&mut self, result: Result<Value, GatewayError>) -> Vec<Outbound> {
        let outcome = mutation_outcome(result, "Failed to log task");
        self.gate.release();

        match outcome {
            Ok(_) => {
                self.status = "Task logged successfully!".to_string();
                self.task_input.clear();
                vec![self.refresh(self.state.current_range)]
            }
            Err(message) => {
                self.status =
                    format!("Error logging task: {message}. Is the backend server running?");
                Vec::new()
            }
        }
    }

    fn stop_task(&mut self) -> Vec<Outbound> {
        self.gate.engage();
        self.status = "Stopping current task...".to_string();
        vec![self.issue(ApiCall::StopTask, Continuation::StopTask)]
    }

    fn finish_stop_task(&mut self, result: Result<Value, GatewayError>) -> Vec<Outbound> {
        let outcome = mutation_outcome(result, "Failed to stop task");
        self.gate.release();

        match outcome {
            Ok(reply) => {
                self.status = reply.message.unwrap_or_else(|| "Task stopped.".to_string());
                self.current_task = CurrentTaskView::Idle;
                vec![self.refresh(self.state.current_range)]
            }
            Err(message) => {
                self.status = format!("Error stopping task: {message}.");
                Vec::new()
            }
        }
    }

    fn clear_recent(&mut self, minutes: u32) -> Vec<Outbound> {
        self.gate.engage();
        self.status = format!("Clearing entries from the last {minutes} minutes...");
        vec![self.issue(
            ApiCall::ClearRecent { minutes },
            Continuation::ClearRecent { minutes },
        )]
    }

    fn finish_clear_recent(
        &mut self,
        minutes: u32,
        result: Result<Value, GatewayError>,
    ) -> Vec<Outbound> {
        let outcome = mutation_outcome(result, "Failed to clear logs");
        self.gate.release();

        match outcome {
            Ok(reply) => {
                info!(minutes, cleared = reply.cleared_count, "cleared recent entries");
                self.status = format!(
                    "Successfully cleared {} entries.",
                    reply.cleared_count.unwrap_or(0)
                );
                self.minutes_input.clear();
                vec![self.refresh(self.state.current_range)]
            }
            Err(message) => {
                self.status = format!("Error clearing logs: {message}.");
                Vec::new()
            }
        }
    }

    fn open_editor(&mut self, index: usize) {
        match &self.state.categories {
            CategoryCache::Loaded(_) => {}
            CategoryCache::Failed(message) => {
                self.status = format!("Categories unavailable: {message}");
                return;
            }
            CategoryCache::Unloaded | CategoryCache::Loading => {
                self.status = "Categories are still loading.".to_string();
                return;
            }
        }

        let Some(entry) = self.task_list.get(index).cloned() else {
            self.status = "No task at that position.".to_string();
            return;
        };

        self.modal.show_for(&entry);
        self.state.editing = Some(entry);
    }

    fn hide_editor(&mut self) {
        self.modal.hide();
        self.state.editing = None;
    }

    fn save_edit(&mut self) -> Vec<Outbound> {
        let Some(target) = self.state.editing.as_ref() else {
            self.status = "No task selected for editing.".to_string();
            return Vec::new();
        };
        let selection = (self.modal.project.value(), self.modal.task_type.value());
        let (Some(project), Some(task_type)) = selection else {
            self.status = "Select a project and a task type first.".to_string();
            return Vec::new();
        };
        let call = ApiCall::UpdateTaskCategories {
            timestamp: target.timestamp.clone(),
            project: project.to_string(),
            task_type: task_type.to_string(),
        };

        self.gate.engage();
        self.status = "Saving categories...".to_string();
        vec![self.issue(call, Continuation::SaveCategories)]
    }

    fn finish_save(&mut self, result: Result<Value, GatewayError>) -> Vec<Outbound> {
        let outcome = mutation_outcome(result, "Failed to update categories");
        self.gate.release();

        match outcome {
            Ok(_) => {
                self.status = "Categories updated successfully".to_string();
                self.hide_editor();
                vec![self.refresh(self.state.current_range)]
            }
            Err(message) => {
                self.status = format!("Error updating categories: {message}");
                Vec::new()
            }
        }
    }
}

/// Structural success: the call went through and the body says `"success"`.
/// Failures carry the server's message, or `fallback` when it sent none.
pub fn mutation_outcome(
    result: Result<Value, GatewayError>,
    fallback: &str,
) -> Result<MutationReply, String> {
    let value = match result {
        Ok(value) => value,
        Err(GatewayError::Status { message, .. }) => {
            return Err(server_message(Some(message), fallback));
        }
        Err(err) => return Err(err.to_string()),
    };
    let reply: MutationReply = serde_json::from_value(value).map_err(|_| fallback.to_string())?;
    if reply.is_success() {
        return Ok(reply);
    }

    Err(server_message(reply.message, fallback))
}

fn server_message(message: Option<String>, fallback: &str) -> String {
    message
        .filter(|message| !message.trim().is_empty() && message != UNKNOWN_ERROR)
        .unwrap_or_else(|| fallback.to_string())
}

pub fn parse_minutes(input: &str) -> Option<u32> {
    input
        .trim()
        .parse::<u32>()
        .ok()
        .filter(|minutes| *minutes > 0)
}
