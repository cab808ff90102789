use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Duration, Local, LocalResult, NaiveDateTime, TimeZone};
use clap::ValueEnum;
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};

pub const STOP_MARKER: &str = "--STOPPED--";

const NAIVE_TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Range {
    #[default]
    Today,
    Week,
    Month,
    All,
}

impl Range {
    pub const ALL: [Range; 4] = [Range::Today, Range::Week, Range::Month, Range::All];

    pub fn as_str(self) -> &'static str {
        match self {
            Range::Today => "today",
            Range::Week => "week",
            Range::Month => "month",
            Range::All => "all",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Range::Today => "Today",
            Range::Week => "This Week",
            Range::Month => "This Month",
            Range::All => "All Time",
        }
    }
}

impl Display for Range {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CategoryLists {
    #[serde(default)]
    pub project_categories: Vec<Category>,
    #[serde(default)]
    pub task_type_categories: Vec<Category>,
}

impl CategoryLists {
    pub fn project_names(&self) -> Vec<String> {
        self.project_categories
            .iter()
            .map(|category| category.name.clone())
            .collect()
    }

    pub fn task_type_names(&self) -> Vec<String> {
        self.task_type_categories
            .iter()
            .map(|category| category.name.clone())
            .collect()
    }
}

/// One row of the backend log. `timestamp` is kept verbatim because the
/// backend identifies entries by exact string match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskLogEntry {
    pub timestamp: String,
    pub project: String,
    pub task_type: String,
    pub task_description: String,
    #[serde(default, skip_serializing)]
    pub duration_seconds: Option<f64>,
}

impl TaskLogEntry {
    pub fn is_stop_marker(&self) -> bool {
        self.project == STOP_MARKER
    }

    pub fn short_description(&self) -> String {
        self.task_description
            .lines()
            .next()
            .unwrap_or("(no description)")
            .to_string()
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration_seconds
            .filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
            .and_then(|seconds| Duration::try_seconds(seconds.round() as i64))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CurrentTaskInfo {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub project: String,
    #[serde(rename = "type", default)]
    pub task_type: String,
    #[serde(default)]
    pub start_time: String,
}

impl CurrentTaskInfo {
    pub fn is_stopped(&self) -> bool {
        self.project == STOP_MARKER
    }
}

/// Category name to minutes, in the order the backend sent them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MinuteTotals(pub Vec<(String, f64)>);

impl MinuteTotals {
    pub fn labels(&self) -> Vec<String> {
        self.0.iter().map(|(label, _)| label.clone()).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.0.iter().map(|(_, value)| *value).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for MinuteTotals {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct TotalsVisitor;

        impl<'de> Visitor<'de> for TotalsVisitor {
            type Value = MinuteTotals;

            fn expecting(&self, f: &mut Formatter<'_>) -> fmt::Result {
                f.write_str("a map of category names to minutes")
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(MinuteTotals::default())
            }

            fn visit_none<E>(self) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(MinuteTotals::default())
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut rows = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((label, minutes)) = access.next_entry::<String, f64>()? {
                    rows.push((label, minutes));
                }
                Ok(MinuteTotals(rows))
            }
        }

        deserializer.deserialize_any(TotalsVisitor)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StatsResponse {
    #[serde(default)]
    pub projects: MinuteTotals,
    #[serde(default)]
    pub types: MinuteTotals,
    #[serde(default)]
    pub current_task: Option<CurrentTaskInfo>,
    #[serde(default)]
    pub tasks: Option<Vec<TaskLogEntry>>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl StatsResponse {
    pub fn visible_tasks(&self) -> Vec<TaskLogEntry> {
        self.tasks
            .iter()
            .flatten()
            .filter(|task| !task.is_stop_marker())
            .cloned()
            .collect()
    }

    pub fn active_task(&self) -> Option<&CurrentTaskInfo> {
        self.current_task.as_ref().filter(|task| !task.is_stopped())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MutationReply {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub cleared_count: Option<u64>,
}

impl MutationReply {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

/// Parses the instants the backend emits: RFC 3339 when a zone is present,
/// otherwise a naive ISO-8601 value in the local zone.
pub fn parse_instant(raw: &str) -> Option<DateTime<Local>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(timestamp.with_timezone(&Local));
    }

    NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .and_then(local_from_naive)
}

fn local_from_naive(naive: NaiveDateTime) -> Option<DateTime<Local>> {
    match Local.from_local_datetime(&naive) {
        LocalResult::Single(local_datetime) => Some(local_datetime),
        LocalResult::Ambiguous(first, second) => Some(first.min(second)),
        LocalResult::None => None,
    }
}

pub fn format_timestamp(raw: &str) -> String {
    parse_instant(raw)
        .map(|timestamp| timestamp.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| raw.to_string())
}

pub fn format_minutes(minutes: f64) -> String {
    format!("{minutes:.1} min")
}

pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.num_seconds().max(0);
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Timelike};

    use super::{
        CurrentTaskInfo, MinuteTotals, Range, StatsResponse, TaskLogEntry, format_duration,
        format_timestamp, parse_instant,
    };

    #[test]
    fn keeps_minute_totals_in_wire_order() {
        let stats: StatsResponse = serde_json::from_str(
            r#"{"projects":{"Zeta":12.5,"Alpha":30,"Mid":1},"types":null,"tasks":[]}"#,
        )
        .expect("stats should parse");

        assert_eq!(stats.projects.labels(), vec!["Zeta", "Alpha", "Mid"]);
        assert_eq!(stats.projects.values(), vec![12.5, 30.0, 1.0]);
        assert_eq!(stats.types, MinuteTotals::default());
    }

    #[test]
    fn hides_stop_markers_from_visible_tasks() {
        let stats: StatsResponse = serde_json::from_str(
            r#"{
                "projects": {},
                "types": {},
                "tasks": [
                    {"timestamp":"2024-01-01T10:00:00","project":"A","task_type":"coding","task_description":"x"},
                    {"timestamp":"2024-01-01T11:00:00","project":"--STOPPED--","task_type":"--STOPPED--","task_description":"Task Stopped"}
                ],
                "current_task": {"description":"Task Stopped","project":"--STOPPED--","type":"--STOPPED--","start_time":"2024-01-01T11:00:00"}
            }"#,
        )
        .expect("stats should parse");

        let visible = stats.visible_tasks();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].task_description, "x");
        assert!(stats.active_task().is_none());
    }

    #[test]
    fn parses_zoned_and_naive_instants() {
        let zoned = parse_instant("2024-01-01T10:00:00Z").expect("rfc3339 should parse");
        assert_eq!(zoned.naive_utc().hour(), 10);

        let naive = parse_instant("2024-01-01T10:15:30.123456").expect("naive iso should parse");
        assert_eq!(naive.minute(), 15);
        assert_eq!(naive.second(), 30);

        assert!(parse_instant("yesterday-ish").is_none());
        assert!(parse_instant("").is_none());
    }

    #[test]
    fn falls_back_to_raw_text_for_unparseable_timestamps() {
        assert_eq!(format_timestamp("not a date"), "not a date");
        assert_eq!(format_timestamp("2024-03-04T05:06:07"), "2024-03-04 05:06:07");
    }

    #[test]
    fn reads_current_task_type_field() {
        let info: CurrentTaskInfo = serde_json::from_str(
            r#"{"description":"write docs","project":"A","type":"writing","start_time":"2024-01-01T10:00:00"}"#,
        )
        .expect("current task should parse");
        assert_eq!(info.task_type, "writing");
        assert!(!info.is_stopped());
    }

    #[test]
    fn out_of_range_durations_are_dropped() {
        let entry = |duration_seconds: Option<f64>| TaskLogEntry {
            timestamp: "2024-01-01T10:00:00".to_string(),
            project: "A".to_string(),
            task_type: "coding".to_string(),
            task_description: "x".to_string(),
            duration_seconds,
        };

        assert_eq!(entry(Some(1e17)).duration(), None);
        assert_eq!(entry(Some(-30.0)).duration(), None);
        assert_eq!(entry(Some(f64::NAN)).duration(), None);
        assert_eq!(entry(Some(90.4)).duration(), Some(Duration::seconds(90)));
    }

    #[test]
    fn range_query_values_match_backend_names() {
        let names = Range::ALL.iter().map(|range| range.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["today", "week", "month", "all"]);
        assert_eq!(format_duration(Duration::seconds(3725)), "01:02:05");
    }
}
