use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Local};

use crate::domain::{
    CategoryLists, CurrentTaskInfo, MinuteTotals, TaskLogEntry, format_duration, format_minutes,
    format_timestamp, parse_instant,
};

const BAR_GLYPH: &str = "=";

/// A single horizontal bar series. Each refresh replaces the whole dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSeries {
    title: &'static str,
    labels: Vec<String>,
    values: Vec<f64>,
}

impl ChartSeries {
    pub fn new(title: &'static str) -> Self {
        Self {
            title,
            labels: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn title(&self) -> &'static str {
        self.title
    }

    pub fn replace(&mut self, totals: &MinuteTotals) {
        self.labels = totals.labels();
        self.values = totals.values();
    }

    pub fn blank(&mut self) {
        self.labels.clear();
        self.values.clear();
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn bar_rows(&self, max_width: usize) -> Vec<BarRow> {
        let max_value = self
            .values
            .iter()
            .copied()
            .filter(|value| value.is_finite())
            .fold(0.0_f64, f64::max);

        self.labels
            .iter()
            .zip(&self.values)
            .map(|(label, value)| {
                let width = if max_value > 0.0 && *value > 0.0 {
                    ((value / max_value) * max_width as f64).round() as usize
                } else {
                    0
                };
                BarRow {
                    label: label.clone(),
                    bar: if *value > 0.0 {
                        BAR_GLYPH.repeat(width.max(1))
                    } else {
                        String::new()
                    },
                    value: format_minutes(*value),
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BarRow {
    pub label: String,
    pub bar: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CurrentTaskView {
    Idle,
    Working {
        description: String,
        project: String,
        task_type: String,
        since: Option<DateTime<Local>>,
    },
}

impl CurrentTaskView {
    pub fn from_info(info: Option<&CurrentTaskInfo>) -> Self {
        match info {
            Some(info) if !info.is_stopped() => CurrentTaskView::Working {
                description: info.description.clone(),
                project: info.project.clone(),
                task_type: info.task_type.clone(),
                since: parse_instant(&info.start_time),
            },
            _ => CurrentTaskView::Idle,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, CurrentTaskView::Working { .. })
    }
}

impl Display for CurrentTaskView {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CurrentTaskView::Idle => f.write_str("No task active."),
            CurrentTaskView::Working {
                description,
                project,
                task_type,
                since,
            } => {
                write!(
                    f,
                    "Currently working on: \"{description}\" (Project: {project}, Type: {task_type})"
                )?;
                match since {
                    Some(since) => write!(f, " since {}", since.format("%H:%M:%S")),
                    None => f.write_str(" - Invalid start time."),
                }
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskList {
    entries: Vec<TaskLogEntry>,
    notice: Option<String>,
}

impl TaskList {
    pub fn replace(&mut self, entries: Vec<TaskLogEntry>) {
        self.entries = entries;
        self.notice = None;
    }

    pub fn show_notice(&mut self, notice: impl Into<String>) {
        self.entries.clear();
        self.notice = Some(notice.into());
    }

    pub fn entries(&self) -> &[TaskLogEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&TaskLogEntry> {
        self.entries.get(index)
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskRow {
    pub title: String,
    pub when: String,
    pub categories: String,
}

impl TaskRow {
    pub fn from_entry(entry: &TaskLogEntry) -> Self {
        let when = match entry.duration() {
            Some(duration) => format!(
                "{} ({})",
                format_timestamp(&entry.timestamp),
                format_duration(duration)
            ),
            None => format_timestamp(&entry.timestamp),
        };
        Self {
            title: entry.short_description(),
            when,
            categories: format!("Project: {} | Type: {}", entry.project, entry.task_type),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum CategoryCache {
    #[default]
    Unloaded,
    Loading,
    Loaded(CategoryLists),
    Failed(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selector {
    options: Vec<String>,
    selected: Option<usize>,
}

impl Selector {
    pub fn set_options(&mut self, options: Vec<String>) {
        self.selected = if options.is_empty() { None } else { Some(0) };
        self.options = options;
    }

    /// Selects `value` if it is one of the options; otherwise nothing stays selected.
    pub fn select_value(&mut self, value: &str) {
        self.selected = self.options.iter().position(|option| option == value);
    }

    pub fn move_by(&mut self, delta: i32) {
        if self.options.is_empty() {
            self.selected = None;
            return;
        }

        let current = self.selected.unwrap_or(0);
        let next = if delta > 0 {
            (current + delta as usize).min(self.options.len() - 1)
        } else {
            current.saturating_sub(delta.unsigned_abs() as usize)
        };
        self.selected = Some(next);
    }

    pub fn value(&self) -> Option<&str> {
        self.selected
            .and_then(|index| self.options.get(index))
            .map(String::as_str)
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.selected
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EditField {
    #[default]
    Project,
    TaskType,
}

impl EditField {
    pub fn toggle(self) -> Self {
        match self {
            EditField::Project => EditField::TaskType,
            EditField::TaskType => EditField::Project,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ModalVisibility {
    #[default]
    Hidden,
    Visible,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditModal {
    visibility: ModalVisibility,
    pub project: Selector,
    pub task_type: Selector,
    pub focus: EditField,
}

impl EditModal {
    pub fn populate(&mut self, lists: &CategoryLists) {
        self.project.set_options(lists.project_names());
        self.task_type.set_options(lists.task_type_names());
    }

    pub fn show_for(&mut self, entry: &TaskLogEntry) {
        self.project.select_value(&entry.project);
        self.task_type.select_value(&entry.task_type);
        self.focus = EditField::Project;
        self.visibility = ModalVisibility::Visible;
    }

    pub fn hide(&mut self) {
        self.visibility = ModalVisibility::Hidden;
    }

    pub fn is_visible(&self) -> bool {
        self.visibility == ModalVisibility::Visible
    }

    pub fn focused_selector_mut(&mut self) -> &mut Selector {
        match self.focus {
            EditField::Project => &mut self.project,
            EditField::TaskType => &mut self.task_type,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Tab {
    #[default]
    Overview,
    TaskLog,
}

impl Tab {
    pub const ALL: [Tab; 2] = [Tab::Overview, Tab::TaskLog];

    pub fn title(self) -> &'static str {
        match self {
            Tab::Overview => "Overview",
            Tab::TaskLog => "Task Log",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TabBar {
    active: Tab,
}

impl TabBar {
    pub fn show(&mut self, tab: Tab) {
        self.active = tab;
    }

    pub fn active(&self) -> Tab {
        self.active
    }

    pub fn is_visible(&self, tab: Tab) -> bool {
        self.active == tab
    }

    pub fn next(&self) -> Tab {
        let index = Tab::ALL
            .iter()
            .position(|tab| *tab == self.active)
            .unwrap_or(0);
        Tab::ALL[(index + 1) % Tab::ALL.len()]
    }
}

/// Advisory disable flag for the log, stop and clear controls. It does not
/// queue or refuse anything on its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ButtonGate {
    engaged: bool,
}

impl ButtonGate {
    pub fn engage(&mut self) {
        self.engaged = true;
    }

    pub fn release(&mut self) {
        self.engaged = false;
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::{Category, CategoryLists, CurrentTaskInfo, MinuteTotals, TaskLogEntry};

    use super::{ChartSeries, CurrentTaskView, EditModal, Tab, TabBar, TaskRow};

    fn entry(project: &str, task_type: &str) -> TaskLogEntry {
        TaskLogEntry {
            timestamp: "2024-01-01T10:00:00".to_string(),
            project: project.to_string(),
            task_type: task_type.to_string(),
            task_description: "write tests\nsecond line".to_string(),
            duration_seconds: Some(1800.0),
        }
    }

    fn lists() -> CategoryLists {
        let category = |name: &str| Category {
            name: name.to_string(),
            description: None,
        };
        CategoryLists {
            project_categories: vec![category("A"), category("B")],
            task_type_categories: vec![category("coding"), category("meeting")],
        }
    }

    #[test]
    fn chart_replaces_previous_dataset() {
        let mut chart = ChartSeries::new("Projects");
        chart.replace(&MinuteTotals(vec![
            ("A".to_string(), 30.0),
            ("B".to_string(), 15.0),
        ]));
        chart.replace(&MinuteTotals(vec![("C".to_string(), 5.0)]));

        assert_eq!(chart.labels(), ["C".to_string()]);
        assert_eq!(chart.values(), [5.0]);
    }

    #[test]
    fn bar_rows_scale_to_largest_value() {
        let mut chart = ChartSeries::new("Types");
        chart.replace(&MinuteTotals(vec![
            ("coding".to_string(), 60.0),
            ("meeting".to_string(), 15.0),
            ("idle".to_string(), 0.0),
        ]));

        let rows = chart.bar_rows(16);
        assert_eq!(rows[0].bar.len(), 16);
        assert_eq!(rows[1].bar.len(), 4);
        assert!(rows[2].bar.is_empty());
        assert_eq!(rows[0].value, "60.0 min");
    }

    #[test]
    fn degrades_current_task_with_bad_start_time() {
        let info = CurrentTaskInfo {
            description: "deploy".to_string(),
            project: "A".to_string(),
            task_type: "ops".to_string(),
            start_time: "garbage".to_string(),
        };
        let view = CurrentTaskView::from_info(Some(&info));
        assert_eq!(
            view.to_string(),
            "Currently working on: \"deploy\" (Project: A, Type: ops) - Invalid start time."
        );

        let stopped = CurrentTaskInfo {
            project: crate::domain::STOP_MARKER.to_string(),
            ..info
        };
        assert_eq!(
            CurrentTaskView::from_info(Some(&stopped)).to_string(),
            "No task active."
        );
        assert_eq!(CurrentTaskView::from_info(None), CurrentTaskView::Idle);
    }

    #[test]
    fn modal_preselects_known_values_only() {
        let mut modal = EditModal::default();
        modal.populate(&lists());

        modal.show_for(&entry("B", "meeting"));
        assert!(modal.is_visible());
        assert_eq!(modal.project.value(), Some("B"));
        assert_eq!(modal.task_type.value(), Some("meeting"));

        modal.show_for(&entry("Un-categorized", "coding"));
        assert_eq!(modal.project.value(), None);
        assert_eq!(modal.task_type.value(), Some("coding"));

        modal.focused_selector_mut().move_by(1);
        assert_eq!(modal.project.value(), Some("B"));

        modal.hide();
        assert!(!modal.is_visible());
    }

    #[test]
    fn tab_bar_keeps_one_tab_active() {
        let mut tabs = TabBar::default();
        assert_eq!(tabs.active(), Tab::Overview);

        tabs.show(tabs.next());
        assert!(tabs.is_visible(Tab::TaskLog));
        assert!(!tabs.is_visible(Tab::Overview));
        assert_eq!(tabs.next(), Tab::Overview);
    }

    #[test]
    fn task_row_degrades_huge_durations() {
        let huge = TaskLogEntry {
            duration_seconds: Some(1e17),
            ..entry("A", "coding")
        };
        let row = TaskRow::from_entry(&huge);
        assert_eq!(row.when, "2024-01-01 10:00:00");

        let stats: crate::domain::StatsResponse = serde_json::from_str(
            r#"{"tasks":[{"timestamp":"bad","project":"A","task_type":"t","task_description":"d","duration_seconds":-5}]}"#,
        )
        .expect("stats should parse");
        let row = TaskRow::from_entry(&stats.visible_tasks()[0]);
        assert_eq!(row.when, "bad");
    }

    #[test]
    fn task_row_shows_first_line_and_categories() {
        let row = TaskRow::from_entry(&entry("A", "coding"));
        assert_eq!(row.title, "write tests");
        assert_eq!(row.categories, "Project: A | Type: coding");
        assert!(row.when.ends_with("(00:30:00)"));
    }
}
